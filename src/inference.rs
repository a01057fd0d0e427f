//! Inference adapter
//!
//! Loads the model artifact once and serves predictions from it. A
//! [`Predictor`] is cheap to clone and safe to share across threads; the
//! artifact behind it is never mutated after load.

use crate::error::ForecastError;
use crate::features::FeatureDeriver;
use crate::model::{TrainedModel, MODEL_FILENAME};
use crate::types::{ClassProbabilities, PredictionRequest, PredictionResponse};
use crate::weather::WeatherSnapshot;
use chrono::{DateTime, FixedOffset};
use std::path::Path;
use std::sync::Arc;

pub const HIGH_RISK_LABEL: &str = "High Risk";
pub const LOW_RISK_LABEL: &str = "Low Risk";

/// Shared, read-only predictor
#[derive(Debug, Clone)]
pub struct Predictor {
    model: Arc<TrainedModel>,
}

impl Predictor {
    pub fn new(model: TrainedModel) -> Self {
        Self {
            model: Arc::new(model),
        }
    }

    /// Load `behavior_predictor.bin` from a model directory
    pub fn load(model_dir: &Path) -> Result<Self, ForecastError> {
        Ok(Self::new(TrainedModel::load(&model_dir.join(MODEL_FILENAME))?))
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    pub fn decision_threshold(&self) -> f64 {
        self.model.decision_threshold
    }

    /// Predict escalation risk for one request as of `now`.
    ///
    /// The label is high risk iff P(escalation) reaches the threshold stored
    /// in the artifact.
    pub fn predict(
        &self,
        request: &PredictionRequest,
        weather: Option<&WeatherSnapshot>,
        now: DateTime<FixedOffset>,
    ) -> PredictionResponse {
        let derived = FeatureDeriver::derive(request, weather, now);
        let [low, high] = self.model.predict_proba(&derived.vector);
        let prediction = self.model.classify(high);

        log::debug!(
            "P(escalation)={:.3} threshold={:.3} -> {}",
            high,
            self.model.decision_threshold,
            prediction
        );

        PredictionResponse {
            prediction,
            prediction_label: if prediction == 1 {
                HIGH_RISK_LABEL
            } else {
                LOW_RISK_LABEL
            }
            .to_string(),
            confidence: round3(low.max(high)),
            probabilities: ClassProbabilities {
                low_risk: round3(low),
                high_risk: round3(high),
            },
            decision_threshold: round3(self.model.decision_threshold),
            calculated_values: derived.calculated,
            weather_used: derived.weather_used,
        }
    }

    /// Parse a JSON request body and predict.
    ///
    /// Only a body that is not a JSON object is rejected; malformed fields
    /// inside an object degrade to defaults.
    pub fn predict_json(
        &self,
        body: &str,
        weather: Option<&WeatherSnapshot>,
        now: DateTime<FixedOffset>,
    ) -> Result<PredictionResponse, ForecastError> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| ForecastError::ParseError(e.to_string()))?;
        if !value.is_object() {
            return Err(ForecastError::ParseError(
                "request body must be a JSON object".to_string(),
            ));
        }
        let request: PredictionRequest =
            serde_json::from_value(value).map_err(|e| ForecastError::ParseError(e.to_string()))?;
        Ok(self.predict(&request, weather, now))
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
