//! Performance evaluator
//!
//! Runs a stored model against a dataset, scores it with the metric
//! evaluator, and compares the result to the model's persisted baseline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result};
use crate::metrics::{self, ModelMetrics, TaskType};
use crate::model::Baseline;
use crate::registry::UploadRegistry;

/// Relative primary-metric change (percent) above which performance drift is
/// flagged. Strictly greater-than: exactly 5.0 is not drift.
pub const PERFORMANCE_DRIFT_THRESHOLD: f64 = 5.0;

/// Outcome of evaluating one model against one dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub id: String,
    pub model_id: String,
    pub model_name: String,
    pub dataset_id: String,
    pub dataset_name: String,
    pub task_type: TaskType,
    pub metrics: ModelMetrics,
    /// Snapshot of the baseline this evaluation was compared against.
    /// `None` on the evaluation that established the baseline.
    pub baseline_metrics: Option<ModelMetrics>,
    pub drift_detected: bool,
    /// Quick error indicator: `1 - accuracy` for classification, RMSE for
    /// regression.
    pub drift_score: f64,
    /// Relative primary-metric degradation in percent; positive always means
    /// "got worse" regardless of task type. `None` without a baseline.
    pub drift_percentage: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

/// One row of a multi-model comparison. A model that fails to evaluate gets
/// an error string instead of failing the whole comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub model_id: String,
    pub model_name: Option<String>,
    pub metrics: Option<ModelMetrics>,
    pub error: Option<String>,
}

/// Relative degradation of the primary metric in percent.
///
/// Accuracy is higher-is-better and RMSE lower-is-better; the sign is
/// inverted per task so that a positive value uniformly means the model got
/// worse. `None` when the baseline primary is zero.
pub fn drift_percentage(task_type: TaskType, baseline: f64, current: f64) -> Option<f64> {
    if baseline == 0.0 {
        return None;
    }
    let pct = match task_type {
        TaskType::Classification => (baseline - current) / baseline * 100.0,
        TaskType::Regression => (current - baseline) / baseline * 100.0,
    };
    Some(pct)
}

pub fn exceeds_drift_threshold(pct: f64) -> bool {
    pct.abs() > PERFORMANCE_DRIFT_THRESHOLD
}

#[derive(Clone)]
pub struct PerformanceEvaluator {
    registry: Arc<UploadRegistry>,
}

impl PerformanceEvaluator {
    pub fn new(registry: Arc<UploadRegistry>) -> Self {
        Self { registry }
    }

    /// Evaluate a model on a dataset and compare against its baseline.
    ///
    /// The first successful evaluation of a model installs its metrics as the
    /// baseline; that report carries `baseline_metrics = None`. Replacing an
    /// existing baseline is only ever the explicit [`rebaseline`] operation.
    ///
    /// [`rebaseline`]: PerformanceEvaluator::rebaseline
    pub fn evaluate(
        &self,
        model_id: &str,
        dataset_id: &str,
        target_column: &str,
        task_type: TaskType,
        token: &CancelToken,
    ) -> Result<EvaluationReport> {
        let model = self.registry.model(model_id)?;
        let dataset = self.registry.dataset(dataset_id)?;

        if !dataset.has_column(target_column) {
            return Err(EngineError::unknown_column(
                target_column,
                dataset.column_names(),
            ));
        }
        if model.task_type != task_type {
            return Err(EngineError::validation(format!(
                "model '{}' is a {} model, requested {}",
                model.name, model.task_type, task_type
            )));
        }

        token.check()?;
        let computed = self.score(&model.id, &dataset.id, target_column, task_type)?;
        token.check()?;

        let drift_score = match &computed {
            ModelMetrics::Classification { accuracy, .. } => 1.0 - accuracy,
            ModelMetrics::Regression { rmse, .. } => *rmse,
        };

        // First-evaluation-is-truth: installation is atomic-if-absent so a
        // concurrent first evaluation cannot overwrite an existing baseline.
        let existing = self.registry.install_baseline_if_absent(
            model_id,
            Baseline {
                metrics: computed.clone(),
                dataset_id: dataset_id.to_string(),
                created_at: Utc::now(),
            },
        )?;

        let (baseline_metrics, pct) = match existing {
            Some(baseline) => {
                let pct = drift_percentage(task_type, baseline.metrics.primary(), computed.primary());
                (Some(baseline.metrics), pct)
            }
            None => (None, None),
        };
        let drift_detected = pct.map(exceeds_drift_threshold).unwrap_or(false);

        info!(
            model = %model_id,
            dataset = %dataset_id,
            task = %task_type,
            drift_pct = ?pct,
            drift = drift_detected,
            "Model evaluation complete"
        );

        Ok(EvaluationReport {
            id: UploadRegistry::generate_id(),
            model_id: model_id.to_string(),
            model_name: model.name.clone(),
            dataset_id: dataset_id.to_string(),
            dataset_name: dataset.name.clone(),
            task_type,
            metrics: computed,
            baseline_metrics,
            drift_detected,
            drift_score,
            drift_percentage: pct,
            computed_at: Utc::now(),
        })
    }

    /// Evaluate several models against the same dataset.
    pub fn compare(
        &self,
        model_ids: &[String],
        dataset_id: &str,
        target_column: &str,
        task_type: TaskType,
        token: &CancelToken,
    ) -> Result<Vec<ComparisonEntry>> {
        // Fail fast on the shared inputs; per-model failures are collected.
        let dataset = self.registry.dataset(dataset_id)?;
        if !dataset.has_column(target_column) {
            return Err(EngineError::unknown_column(
                target_column,
                dataset.column_names(),
            ));
        }

        let mut entries = Vec::with_capacity(model_ids.len());
        for model_id in model_ids {
            token.check()?;
            match self.registry.model(model_id) {
                Ok(model) => {
                    match self.score(&model.id, dataset_id, target_column, task_type) {
                        Ok(metrics) => entries.push(ComparisonEntry {
                            model_id: model_id.clone(),
                            model_name: Some(model.name.clone()),
                            metrics: Some(metrics),
                            error: None,
                        }),
                        Err(err) => entries.push(ComparisonEntry {
                            model_id: model_id.clone(),
                            model_name: Some(model.name.clone()),
                            metrics: None,
                            error: Some(err.to_string()),
                        }),
                    }
                }
                Err(err) => entries.push(ComparisonEntry {
                    model_id: model_id.clone(),
                    model_name: None,
                    metrics: None,
                    error: Some(err.to_string()),
                }),
            }
        }
        Ok(entries)
    }

    /// Explicitly replace a model's baseline with a fresh evaluation.
    pub fn rebaseline(
        &self,
        model_id: &str,
        dataset_id: &str,
        target_column: &str,
        token: &CancelToken,
    ) -> Result<Baseline> {
        let model = self.registry.model(model_id)?;
        let dataset = self.registry.dataset(dataset_id)?;
        if !dataset.has_column(target_column) {
            return Err(EngineError::unknown_column(
                target_column,
                dataset.column_names(),
            ));
        }

        token.check()?;
        let metrics = self.score(&model.id, dataset_id, target_column, model.task_type)?;
        let baseline = Baseline {
            metrics,
            dataset_id: dataset_id.to_string(),
            created_at: Utc::now(),
        };
        self.registry.replace_baseline(model_id, baseline.clone())?;
        info!(model = %model_id, dataset = %dataset_id, "Baseline replaced");
        Ok(baseline)
    }

    /// Predict and score, excluding rows whose target value is missing.
    fn score(
        &self,
        model_id: &str,
        dataset_id: &str,
        target_column: &str,
        task_type: TaskType,
    ) -> Result<ModelMetrics> {
        let model = self.registry.model(model_id)?;
        let dataset = self.registry.dataset(dataset_id)?;

        let features = dataset.frame().drop(target_column)?;
        let truths = dataset.numeric_column(target_column)?;
        let predictions = model.predict(&features)?;
        if predictions.len() != truths.len() {
            return Err(EngineError::Computation(format!(
                "model produced {} predictions for {} rows",
                predictions.len(),
                truths.len()
            )));
        }

        let (y_true, y_pred): (Vec<f64>, Vec<f64>) = truths
            .iter()
            .zip(predictions.iter())
            .filter(|(t, _)| t.is_finite())
            .map(|(t, p)| (*t, *p))
            .unzip();

        match task_type {
            TaskType::Classification => metrics::classification_metrics(&y_true, &y_pred),
            TaskType::Regression => metrics::regression_metrics(&y_true, &y_pred),
        }
    }
}
