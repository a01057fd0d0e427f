//! ABA Forecast - behavioral escalation risk forecasting
//!
//! Forecast turns situational context (sleep, meals, toileting, transitions,
//! social setting, weather) into a probability that an individual escalates,
//! through four stages: synthetic risk profile sampling → training a
//! random-forest classifier with a tuned decision threshold → feature
//! derivation from raw requests → inference against the trained artifact.
//!
//! ## Modules
//!
//! - **Sampler / Dataset**: Generate labeled synthetic records and store them as CSV
//! - **Training**: Fit scaler + forest, tune the threshold, write artifact and metrics
//! - **Features / Inference**: Derive the feature vector from a request and predict

pub mod dataset;
pub mod error;
pub mod features;
pub mod forest;
pub mod inference;
pub mod metrics;
pub mod model;
pub mod sampler;
pub mod scaler;
pub mod training;
pub mod types;
pub mod weather;

pub use error::ForecastError;
pub use features::{DerivedFeatures, FeatureDeriver};
pub use inference::Predictor;
pub use model::TrainedModel;
pub use sampler::{generate_samples, RiskProfileSampler, SamplerConfig};
pub use training::{train, MetricsReport, TrainConfig};
pub use types::{FeatureVector, PredictionRequest, PredictionResponse, FEATURE_NAMES};
pub use weather::{WeatherCache, WeatherSnapshot};

/// Forecast version recorded in every model artifact
pub const FORECAST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by tooling
pub const PRODUCER_NAME: &str = "aba-forecast";
