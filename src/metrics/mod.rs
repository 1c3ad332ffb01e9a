//! Metric evaluator
//!
//! Classification and regression performance metrics computed from model
//! predictions against ground truth. Pure functions, no state.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Declared prediction task of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Classification,
    Regression,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Regression => "regression",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task-tagged performance metrics.
///
/// Classification values are raw fractions in [0, 1]; converting to percent is
/// a presentation concern and never happens inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelMetrics {
    Classification {
        accuracy: f64,
        precision: f64,
        recall: f64,
        f1_score: f64,
    },
    Regression {
        mse: f64,
        rmse: f64,
        mae: f64,
        r2_score: f64,
    },
}

impl ModelMetrics {
    pub fn task_type(&self) -> TaskType {
        match self {
            ModelMetrics::Classification { .. } => TaskType::Classification,
            ModelMetrics::Regression { .. } => TaskType::Regression,
        }
    }

    /// The metric performance drift is measured on: accuracy for
    /// classification, RMSE for regression.
    pub fn primary(&self) -> f64 {
        match self {
            ModelMetrics::Classification { accuracy, .. } => *accuracy,
            ModelMetrics::Regression { rmse, .. } => *rmse,
        }
    }
}

fn require_matching_lengths(y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    if y_true.is_empty() {
        return Err(EngineError::Computation(
            "cannot compute metrics over zero samples".to_string(),
        ));
    }
    if y_true.len() != y_pred.len() {
        return Err(EngineError::Computation(format!(
            "prediction length {} does not match truth length {}",
            y_pred.len(),
            y_true.len()
        )));
    }
    Ok(())
}

fn unique_labels(values: &[f64]) -> Vec<f64> {
    let mut labels: Vec<f64> = values.to_vec();
    labels.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    labels.dedup();
    labels
}

/// Classification metrics via confusion-matrix counts, macro-averaged over
/// the union of observed labels.
///
/// Disjoint true/predicted label sets fail with a computation error: that
/// almost always means the wrong target column was evaluated, and a hard
/// failure signals it far more reliably than a silently near-zero accuracy.
pub fn classification_metrics(y_true: &[f64], y_pred: &[f64]) -> Result<ModelMetrics> {
    require_matching_lengths(y_true, y_pred)?;

    let true_labels = unique_labels(y_true);
    let pred_labels = unique_labels(y_pred);
    let overlap = pred_labels.iter().any(|p| true_labels.contains(p));
    if !overlap {
        return Err(EngineError::Computation(format!(
            "predicted and true label sets are disjoint ({} true vs {} predicted classes); \
             check the target column",
            true_labels.len(),
            pred_labels.len()
        )));
    }

    let n = y_true.len() as f64;
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count() as f64;
    let accuracy = correct / n;

    let mut classes = true_labels;
    for label in pred_labels {
        if !classes.contains(&label) {
            classes.push(label);
        }
    }

    let mut precision_sum = 0.0;
    let mut recall_sum = 0.0;
    let mut f1_sum = 0.0;
    for &class in &classes {
        let mut tp = 0.0;
        let mut fp = 0.0;
        let mut fn_ = 0.0;
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == class, p == class) {
                (true, true) => tp += 1.0,
                (false, true) => fp += 1.0,
                (true, false) => fn_ += 1.0,
                (false, false) => {}
            }
        }
        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        precision_sum += precision;
        recall_sum += recall;
        f1_sum += f1;
    }

    let k = classes.len() as f64;
    Ok(ModelMetrics::Classification {
        accuracy,
        precision: precision_sum / k,
        recall: recall_sum / k,
        f1_score: f1_sum / k,
    })
}

/// Regression metrics: MSE, RMSE, MAE and R².
pub fn regression_metrics(y_true: &[f64], y_pred: &[f64]) -> Result<ModelMetrics> {
    require_matching_lengths(y_true, y_pred)?;

    let n = y_true.len() as f64;
    let mse = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n;
    let mae = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n;

    let mean = y_true.iter().sum::<f64>() / n;
    let ss_tot = y_true.iter().map(|&t| (t - mean).powi(2)).sum::<f64>();
    let ss_res = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>();
    // Constant target: R² is undefined, report 0 instead of dividing by zero.
    let r2_score = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    Ok(ModelMetrics::Regression {
        mse,
        rmse: mse.sqrt(),
        mae,
        r2_score,
    })
}
