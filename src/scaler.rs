//! Per-feature standardization
//!
//! Fitted on the training split only and stored inside the model artifact so
//! inference applies the exact same transform.

use crate::error::ForecastError;
use crate::types::FEATURE_COUNT;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Zero-mean, unit-variance scaler over the fixed feature set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: [f64; FEATURE_COUNT],
    /// Population standard deviation; constant columns store 1.0
    pub scale: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    /// Fit means and standard deviations column by column
    pub fn fit(rows: &[[f64; FEATURE_COUNT]]) -> Result<Self, ForecastError> {
        let data = Array2::from_shape_fn((rows.len(), FEATURE_COUNT), |(i, j)| rows[i][j]);
        let column_mean = data
            .mean_axis(Axis(0))
            .ok_or(ForecastError::EmptyDataset)?;
        let column_std = data.std_axis(Axis(0), 0.0);

        let mut mean = [0.0; FEATURE_COUNT];
        let mut scale = [1.0; FEATURE_COUNT];
        for (j, (&m, &std)) in column_mean.iter().zip(column_std.iter()).enumerate() {
            mean[j] = m;
            scale[j] = if std > f64::EPSILON { std } else { 1.0 };
        }

        Ok(Self { mean, scale })
    }

    pub fn transform_row(&self, row: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (j, value) in row.iter().enumerate() {
            out[j] = (value - self.mean[j]) / self.scale[j];
        }
        out
    }

    pub fn transform(&self, rows: &[[f64; FEATURE_COUNT]]) -> Vec<[f64; FEATURE_COUNT]> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }

    /// Transform a row with possibly missing values.
    ///
    /// A missing value is imputed with the training mean, i.e. it lands on 0
    /// after scaling.
    pub fn transform_partial(&self, row: &[Option<f64>; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (j, value) in row.iter().enumerate() {
            out[j] = match value {
                Some(v) if v.is_finite() => (v - self.mean[j]) / self.scale[j],
                _ => 0.0,
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows() -> Vec<[f64; FEATURE_COUNT]> {
        let mut a = [0.0; FEATURE_COUNT];
        let mut b = [0.0; FEATURE_COUNT];
        let mut c = [0.0; FEATURE_COUNT];
        for j in 0..FEATURE_COUNT {
            a[j] = 1.0;
            b[j] = 2.0;
            c[j] = 3.0;
        }
        // Column 5 is constant
        a[5] = 7.0;
        b[5] = 7.0;
        c[5] = 7.0;
        vec![a, b, c]
    }

    #[test]
    fn test_fit_uses_population_std() {
        let scaler = StandardScaler::fit(&rows()).unwrap();

        assert_eq!(scaler.mean[0], 2.0);
        assert!((scaler.scale[0] - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_keeps_unit_scale() {
        let scaler = StandardScaler::fit(&rows()).unwrap();

        assert_eq!(scaler.mean[5], 7.0);
        assert_eq!(scaler.scale[5], 1.0);
        assert_eq!(scaler.transform_row(&rows()[0])[5], 0.0);
    }

    #[test]
    fn test_transformed_columns_are_standardized() {
        let data = rows();
        let scaler = StandardScaler::fit(&data).unwrap();
        let scaled = scaler.transform(&data);

        let mean: f64 = scaled.iter().map(|r| r[0]).sum::<f64>() / 3.0;
        let var: f64 = scaled.iter().map(|r| r[0].powi(2)).sum::<f64>() / 3.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_values_land_on_zero() {
        let scaler = StandardScaler::fit(&rows()).unwrap();
        let mut partial = [Some(3.0); FEATURE_COUNT];
        partial[0] = None;
        partial[1] = Some(f64::NAN);

        let out = scaler.transform_partial(&partial);

        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], scaler.transform_row(&[3.0; FEATURE_COUNT])[2]);
    }

    #[test]
    fn test_fit_empty_fails() {
        assert!(matches!(
            StandardScaler::fit(&[]),
            Err(ForecastError::EmptyDataset)
        ));
    }
}
