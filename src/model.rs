//! Trained model artifact
//!
//! One opaque bincode blob holding everything inference needs: the ordered
//! feature names, the fitted scaler, the forest and the decision threshold.

use crate::error::ForecastError;
use crate::forest::RandomForest;
use crate::scaler::StandardScaler;
use crate::types::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use uuid::Uuid;

/// File name of the persisted model inside the model directory
pub const MODEL_FILENAME: &str = "behavior_predictor.bin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Training run that produced this artifact
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    /// Crate version that wrote the artifact
    pub version: String,
    /// Feature names in fit order
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub forest: RandomForest,
    /// High-risk iff P(escalation) >= this
    pub decision_threshold: f64,
}

impl TrainedModel {
    /// Class probabilities `[low, high]` for one feature vector
    pub fn predict_proba(&self, features: &FeatureVector) -> [f64; 2] {
        let scaled = self.scaler.transform_partial(&features.values());
        self.forest.predict_proba(&scaled)
    }

    /// Label under the stored threshold
    pub fn classify(&self, high_risk_probability: f64) -> u8 {
        u8::from(high_risk_probability >= self.decision_threshold)
    }

    /// Check the stored feature order against the runtime feature order
    pub fn validate_schema(&self) -> Result<(), ForecastError> {
        let matches = self.feature_names.len() == FEATURE_COUNT
            && self
                .feature_names
                .iter()
                .zip(FEATURE_NAMES)
                .all(|(stored, expected)| stored == expected);

        if matches {
            Ok(())
        } else {
            Err(ForecastError::SchemaMismatch {
                expected: self.feature_names.clone(),
                found: FeatureVector::names(),
            })
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ForecastError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode an artifact and validate its feature schema
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ForecastError> {
        let model: TrainedModel = bincode::deserialize(bytes)?;
        model.validate_schema()?;
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<(), ForecastError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;
        log::debug!("model artifact written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ForecastError> {
        if !path.exists() {
            return Err(ForecastError::Artifact(format!(
                "model not found at {}. Train it first with `forecast train`",
                path.display()
            )));
        }
        let reader = BufReader::new(File::open(path)?);
        let model: TrainedModel = bincode::deserialize_from(reader)?;
        model.validate_schema()?;

        log::info!(
            "loaded model {} ({} trees, threshold {:.2})",
            model.run_id,
            model.forest.trees().len(),
            model.decision_threshold
        );
        Ok(model)
    }
}
