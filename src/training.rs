//! Training pipeline
//!
//! Loads the labeled dataset, fits the scaler and forest on a stratified
//! training partition, tunes the decision threshold on the validation
//! partition and persists the model artifact plus a metrics report.

use crate::dataset::{self, LabeledTable, DATASET_FILENAME, DEFAULT_DATA_DIR};
use crate::error::ForecastError;
use crate::forest::{ForestParams, RandomForest};
use crate::metrics::{self, ClassificationReport};
use crate::model::{TrainedModel, MODEL_FILENAME};
use crate::scaler::StandardScaler;
use crate::types::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::FORECAST_VERSION;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File name of the metrics report inside the model directory
pub const METRICS_FILENAME: &str = "behavior_predictor_metrics.json";

/// Default directory for model artifacts
pub const DEFAULT_MODEL_DIR: &str = "models";

/// Number of ranked importances kept in the report
pub const TOP_IMPORTANCES: usize = 10;

/// Training run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data_path: PathBuf,
    pub model_dir: PathBuf,
    /// Fraction of each class held out for validation
    pub test_size: f64,
    pub random_seed: u64,
    pub forest: ForestParams,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path: Path::new(DEFAULT_DATA_DIR).join(DATASET_FILENAME),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            test_size: 0.2,
            random_seed: 42,
            forest: ForestParams::default(),
        }
    }
}

impl TrainConfig {
    /// Read a JSON config; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ForecastError> {
        let content = fs::read_to_string(path)?;
        let config: TrainConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        self.forest.validate()
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(MODEL_FILENAME)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.model_dir.join(METRICS_FILENAME)
    }
}

/// One ranked feature importance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
    /// Share of the total importance
    pub relative_importance: f64,
}

/// Metrics written once per training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub accuracy: f64,
    pub macro_f1: f64,
    /// Label shares over the full dataset, keyed "0" / "1", 4 decimals
    pub class_distribution: BTreeMap<String, f64>,
    pub classification_report: ClassificationReport,
    pub model_path: String,
    pub train_samples: usize,
    pub val_samples: usize,
    pub top_feature_importance: Vec<FeatureImportance>,
    pub decision_threshold: f64,
}

/// Fitted model plus its report, before anything is written to disk
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub report: MetricsReport,
}

/// Run the full pipeline: load, fit, evaluate, persist
pub fn train(config: &TrainConfig) -> Result<MetricsReport, ForecastError> {
    config.validate()?;

    // Stage 1: load features and target (leakage columns are never read)
    let table = dataset::load_labeled_table(&config.data_path)?;

    // Stages 2-6: split, fit, tune, evaluate
    let outcome = fit_model(&table, config)?;

    // Stage 7: persist artifact and report side by side
    let model_path = config.model_path();
    outcome.model.save(&model_path)?;

    let metrics_path = config.metrics_path();
    fs::write(&metrics_path, serde_json::to_string_pretty(&outcome.report)?)?;

    log::info!(
        "saved model to {} and metrics to {}",
        model_path.display(),
        metrics_path.display()
    );
    Ok(outcome.report)
}

/// Fit and evaluate on an in-memory table
pub fn fit_model(
    table: &LabeledTable,
    config: &TrainConfig,
) -> Result<TrainingOutcome, ForecastError> {
    config.validate()?;
    if table.is_empty() {
        return Err(ForecastError::EmptyDataset);
    }
    let class_distribution = class_distribution(&table.labels);
    if class_distribution.len() < 2 {
        return Err(ForecastError::SingleClass);
    }

    // Stage 2: stratified split
    let (train_idx, val_idx) =
        stratified_split(&table.labels, config.test_size, config.random_seed);
    if val_idx.is_empty() {
        return Err(ForecastError::InvalidConfig(
            "validation partition is empty; use more rows or a larger test_size".to_string(),
        ));
    }
    let (x_train, y_train) = select(table, &train_idx);
    let (x_val, y_val) = select(table, &val_idx);
    log::debug!("split: {} train / {} validation", y_train.len(), y_val.len());

    // Stage 3: standardize on the training partition, then fit the forest
    let scaler = StandardScaler::fit(&x_train)?;
    let forest = RandomForest::fit(
        &scaler.transform(&x_train),
        &y_train,
        &config.forest,
        config.random_seed,
    )?;

    // Stage 4: tune the decision threshold on validation probabilities
    let val_proba = forest.predict_high_risk(&scaler.transform(&x_val));
    let search = metrics::optimize_threshold(&y_val, &val_proba);

    // Stage 5: evaluate at the chosen threshold
    let y_pred = metrics::apply_threshold(&val_proba, search.threshold);
    let classification_report = ClassificationReport::new(&y_val, &y_pred);

    // Stage 6: rank importances
    let top_feature_importance = rank_importances(forest.feature_importances(), TOP_IMPORTANCES);

    let run_id = Uuid::new_v4();
    let trained_at = Utc::now();

    let report = MetricsReport {
        run_id,
        trained_at,
        accuracy: dataset::round_to(classification_report.accuracy, 4),
        macro_f1: dataset::round_to(search.macro_f1, 4),
        class_distribution,
        classification_report,
        model_path: config.model_path().display().to_string(),
        train_samples: y_train.len(),
        val_samples: y_val.len(),
        top_feature_importance,
        decision_threshold: dataset::round_to(search.threshold, 3),
    };

    log::info!(
        "run {}: accuracy {:.4}, macro-F1 {:.4}, threshold {:.2}",
        run_id,
        report.accuracy,
        report.macro_f1,
        search.threshold
    );

    let model = TrainedModel {
        run_id,
        trained_at,
        version: FORECAST_VERSION.to_string(),
        feature_names: FeatureVector::names(),
        scaler,
        forest,
        decision_threshold: search.threshold,
    };

    Ok(TrainingOutcome { model, report })
}

/// Split row indices per class.
///
/// Each class is shuffled with the seed and `round(count * test_size)` of its
/// rows go to validation, at least one when the class has two or more rows
/// and never all of them. Both index lists come back sorted.
pub fn stratified_split(labels: &[u8], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut val = Vec::new();

    for class in [0u8, 1u8] {
        let mut idx: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == class)
            .map(|(i, _)| i)
            .collect();
        idx.shuffle(&mut rng);

        let count = idx.len();
        let n_val = if count >= 2 {
            ((count as f64 * test_size).round() as usize).clamp(1, count - 1)
        } else {
            0
        };

        val.extend_from_slice(&idx[..n_val]);
        train.extend_from_slice(&idx[n_val..]);
    }

    train.sort_unstable();
    val.sort_unstable();
    (train, val)
}

/// Relabel forest importances with feature names, rank them and keep `top`
pub fn rank_importances(
    importances: &[f64; FEATURE_COUNT],
    top: usize,
) -> Vec<FeatureImportance> {
    let total: f64 = importances.iter().sum();
    let mut ranked: Vec<(usize, f64)> = importances.iter().copied().enumerate().collect();
    // Stable sort keeps feature order among ties
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    ranked
        .into_iter()
        .take(top)
        .map(|(idx, importance)| FeatureImportance {
            feature: FEATURE_NAMES[idx].to_string(),
            importance: dataset::round_to(importance, 4),
            relative_importance: if total > 0.0 {
                dataset::round_to(importance / total, 4)
            } else {
                0.0
            },
        })
        .collect()
}

/// Share of each label, rounded to 4 decimals
fn class_distribution(labels: &[u8]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(label.to_string()).or_insert(0) += 1;
    }
    let total = labels.len().max(1) as f64;
    counts
        .into_iter()
        .map(|(label, count)| (label, dataset::round_to(count as f64 / total, 4)))
        .collect()
}

fn select(table: &LabeledTable, idx: &[usize]) -> (Vec<[f64; FEATURE_COUNT]>, Vec<u8>) {
    let x = idx.iter().map(|&i| table.features[i]).collect();
    let y = idx.iter().map(|&i| table.labels[i]).collect();
    (x, y)
}
