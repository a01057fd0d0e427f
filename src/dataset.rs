//! Dataset persistence
//!
//! The sampler's output is stored as a header-named CSV table, one row per
//! sample. Training reads it back by column name, drops the leakage columns
//! and keeps only the classifier features plus the target.

use crate::error::ForecastError;
use crate::types::{
    BehaviorSample, FeatureVector, FEATURE_COUNT, FEATURE_NAMES, LEAKAGE_COLUMNS, TARGET_COLUMN,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the generated dataset
pub const DATASET_FILENAME: &str = "synthetic_behavior_data.csv";

/// Default output directory for generated data
pub const DEFAULT_DATA_DIR: &str = "data";

/// Feature matrix and labels ready for fitting
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable {
    /// Rows in `FEATURE_NAMES` order
    pub features: Vec<[f64; FEATURE_COUNT]>,
    pub labels: Vec<u8>,
}

impl LabeledTable {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Build directly from generated samples (no leakage columns involved)
    pub fn from_samples(samples: &[BehaviorSample]) -> Self {
        let features = samples
            .iter()
            .map(|s| FeatureVector::from_sample(s).to_row())
            .collect();
        let labels = samples
            .iter()
            .map(|s| u8::from(s.escalation_label != 0))
            .collect();
        Self { features, labels }
    }
}

/// Quick descriptive statistics printed after generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub samples: usize,
    pub accident_rate: f64,
    pub escalation_rate: f64,
    pub sleep_quality_mean: f64,
    /// Sample standard deviation (n - 1)
    pub sleep_quality_std: f64,
}

/// Write samples as CSV into `output_dir`, returning the file path
pub fn save_dataset(
    samples: &[BehaviorSample],
    output_dir: &Path,
) -> Result<PathBuf, ForecastError> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(DATASET_FILENAME);
    write_samples(samples, &path)?;
    Ok(path)
}

/// Write samples as CSV to an explicit path
pub fn write_samples(samples: &[BehaviorSample], path: &Path) -> Result<(), ForecastError> {
    let mut writer = csv::Writer::from_path(path)?;
    for sample in samples {
        writer.serialize(sample)?;
    }
    writer.flush()?;
    log::debug!("wrote {} rows to {}", samples.len(), path.display());
    Ok(())
}

/// Read full samples back (all columns)
pub fn read_samples(path: &Path) -> Result<Vec<BehaviorSample>, ForecastError> {
    ensure_exists(path)?;
    let mut reader = csv::Reader::from_path(path)?;
    let mut samples = Vec::new();
    for row in reader.deserialize() {
        let sample: BehaviorSample = row?;
        samples.push(sample);
    }
    Ok(samples)
}

/// Load the classifier features and target from a dataset file.
///
/// Columns are located by header name; leakage columns and any other extra
/// columns are ignored.
pub fn load_labeled_table(path: &Path) -> Result<LabeledTable, ForecastError> {
    ensure_exists(path)?;
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let column_index = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
    };

    let target_idx = column_index(TARGET_COLUMN)?;
    let mut feature_idx = [0usize; FEATURE_COUNT];
    for (slot, name) in feature_idx.iter_mut().zip(FEATURE_NAMES) {
        *slot = column_index(name)?;
    }

    let dropped: Vec<&str> = LEAKAGE_COLUMNS
        .iter()
        .copied()
        .filter(|c| headers.iter().any(|h| h.trim() == *c))
        .collect();
    if !dropped.is_empty() {
        log::debug!("dropping leakage columns: {}", dropped.join(", "));
    }

    let mut features = Vec::new();
    let mut labels = Vec::new();

    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1
        let row = row_idx + 2;

        let mut values = [0.0; FEATURE_COUNT];
        for (value, (&idx, name)) in values
            .iter_mut()
            .zip(feature_idx.iter().zip(FEATURE_NAMES))
        {
            *value = parse_cell(&record, idx, name, row)?;
        }

        let label = parse_cell(&record, target_idx, TARGET_COLUMN, row)?;
        labels.push(u8::from(label != 0.0));
        features.push(values);
    }

    log::info!("loaded {} rows from {}", labels.len(), path.display());
    Ok(LabeledTable { features, labels })
}

/// Descriptive statistics of a generated dataset
pub fn summarize(samples: &[BehaviorSample]) -> DatasetSummary {
    let n = samples.len();
    if n == 0 {
        return DatasetSummary {
            samples: 0,
            accident_rate: 0.0,
            escalation_rate: 0.0,
            sleep_quality_mean: 0.0,
            sleep_quality_std: 0.0,
        };
    }

    let count = n as f64;
    let accidents = samples
        .iter()
        .filter(|s| s.recent_accident_flag == 1)
        .count() as f64;
    let escalations = samples
        .iter()
        .filter(|s| s.escalation_label == 1)
        .count() as f64;
    let sleep_mean = samples
        .iter()
        .map(|s| s.sleep_quality_numeric as f64)
        .sum::<f64>()
        / count;
    let sleep_std = if n > 1 {
        (samples
            .iter()
            .map(|s| (s.sleep_quality_numeric as f64 - sleep_mean).powi(2))
            .sum::<f64>()
            / (count - 1.0))
            .sqrt()
    } else {
        0.0
    };

    DatasetSummary {
        samples: n,
        accident_rate: round_to(accidents / count, 3),
        escalation_rate: round_to(escalations / count, 3),
        sleep_quality_mean: round_to(sleep_mean, 3),
        sleep_quality_std: round_to(sleep_std, 3),
    }
}

fn ensure_exists(path: &Path) -> Result<(), ForecastError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ForecastError::DatasetNotFound {
            path: path.to_path_buf(),
        })
    }
}

fn parse_cell(
    record: &csv::StringRecord,
    idx: usize,
    column: &str,
    row: usize,
) -> Result<f64, ForecastError> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ForecastError::InvalidValue {
            column: column.to_string(),
            row,
            value: raw.to_string(),
        })
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
