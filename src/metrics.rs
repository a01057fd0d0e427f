//! Classification metrics and decision-threshold search

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Number of candidate thresholds (0.10, 0.11, ..., 0.90)
pub const THRESHOLD_STEPS: usize = 81;

/// Precision/recall/F1 for one class or one average
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class report keyed by class label ("0", "1") plus averages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    #[serde(flatten)]
    pub classes: BTreeMap<String, ClassMetrics>,
    pub accuracy: f64,
    #[serde(rename = "macro avg")]
    pub macro_avg: ClassMetrics,
    #[serde(rename = "weighted avg")]
    pub weighted_avg: ClassMetrics,
}

/// Outcome of the threshold sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSearch {
    pub threshold: f64,
    pub macro_f1: f64,
}

/// Apply a decision threshold: high risk iff `p >= threshold`
pub fn apply_threshold(proba: &[f64], threshold: f64) -> Vec<u8> {
    proba.iter().map(|&p| u8::from(p >= threshold)).collect()
}

pub fn accuracy(y_true: &[u8], y_pred: &[u8]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred)
        .filter(|(truth, pred)| truth == pred)
        .count();
    correct as f64 / y_true.len() as f64
}

fn class_metrics(y_true: &[u8], y_pred: &[u8], class: u8) -> ClassMetrics {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    for (&truth, &pred) in y_true.iter().zip(y_pred) {
        match (truth == class, pred == class) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    ClassMetrics {
        precision,
        recall,
        f1_score,
        support: tp + fn_,
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Labels present in either the truth or the predictions
fn observed_classes(y_true: &[u8], y_pred: &[u8]) -> BTreeSet<u8> {
    y_true.iter().chain(y_pred).copied().collect()
}

/// Unweighted mean F1 over the observed classes.
///
/// A class with no true and no predicted positives contributes F1 = 0.
pub fn macro_f1(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let classes = observed_classes(y_true, y_pred);
    if classes.is_empty() {
        return 0.0;
    }
    let sum: f64 = classes
        .iter()
        .map(|&c| class_metrics(y_true, y_pred, c).f1_score)
        .sum();
    sum / classes.len() as f64
}

/// Sweep thresholds 0.10..=0.90 in steps of 0.01 and keep the one with the
/// highest macro-F1. Ties keep the lowest threshold.
pub fn optimize_threshold(y_true: &[u8], proba: &[f64]) -> ThresholdSearch {
    let mut best = ThresholdSearch {
        threshold: 0.5,
        macro_f1: f64::NEG_INFINITY,
    };

    for step in 0..THRESHOLD_STEPS {
        let threshold = (10 + step) as f64 / 100.0;
        let score = macro_f1(y_true, &apply_threshold(proba, threshold));
        if score > best.macro_f1 {
            best = ThresholdSearch {
                threshold,
                macro_f1: score,
            };
        }
    }

    log::debug!(
        "best threshold {:.2} (macro-F1 {:.4})",
        best.threshold,
        best.macro_f1
    );
    best
}

impl ClassificationReport {
    pub fn new(y_true: &[u8], y_pred: &[u8]) -> Self {
        let observed = observed_classes(y_true, y_pred);
        let per_class: Vec<(u8, ClassMetrics)> = observed
            .iter()
            .map(|&c| (c, class_metrics(y_true, y_pred, c)))
            .collect();

        let k = per_class.len().max(1) as f64;
        let total_support: usize = per_class.iter().map(|(_, m)| m.support).sum();
        let weight_den = total_support.max(1) as f64;

        let mut macro_avg = ClassMetrics {
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            support: total_support,
        };
        let mut weighted_avg = macro_avg;

        for (_, m) in &per_class {
            macro_avg.precision += m.precision / k;
            macro_avg.recall += m.recall / k;
            macro_avg.f1_score += m.f1_score / k;

            let w = m.support as f64 / weight_den;
            weighted_avg.precision += m.precision * w;
            weighted_avg.recall += m.recall * w;
            weighted_avg.f1_score += m.f1_score * w;
        }

        Self {
            classes: per_class
                .into_iter()
                .map(|(c, m)| (c.to_string(), m))
                .collect(),
            accuracy: accuracy(y_true, y_pred),
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (label, m) in &self.classes {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                label, m.precision, m.recall, m.f1_score, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (label, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                label, m.precision, m.recall, m.f1_score, m.support
            )?;
        }
        Ok(())
    }
}
