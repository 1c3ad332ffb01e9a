//! Model records and prediction seam
//!
//! A model is an immutable reference to a trained artifact plus the
//! [`Predictor`] implementation that runs it. The engine never trains
//! anything; it only evaluates stored models against datasets.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::metrics::{ModelMetrics, TaskType};

/// Prediction seam between the engine and a stored model artifact.
///
/// Implementations must be pure: the same feature frame always yields the
/// same predictions.
pub trait Predictor: Send + Sync {
    /// Predict one value per row of the feature frame.
    fn predict(&self, features: &DataFrame) -> Result<Vec<f64>>;
}

/// Frozen performance snapshot a model's later evaluations are compared
/// against. Owned by exactly one model; immutable once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub metrics: ModelMetrics,
    /// Dataset the baseline was computed on.
    pub dataset_id: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable reference to an uploaded model artifact.
#[derive(Clone)]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub framework: String,
    pub task_type: TaskType,
    pub uploaded_at: DateTime<Utc>,
    predictor: Arc<dyn Predictor>,
}

/// Serializable listing projection of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub framework: String,
    pub task_type: TaskType,
    pub has_baseline: bool,
    pub uploaded_at: DateTime<Utc>,
}

impl ModelRecord {
    pub fn new(
        id: String,
        name: String,
        owner: String,
        framework: String,
        task_type: TaskType,
        predictor: Arc<dyn Predictor>,
    ) -> Self {
        Self {
            id,
            name,
            owner,
            framework,
            task_type,
            uploaded_at: Utc::now(),
            predictor,
        }
    }

    pub fn predict(&self, features: &DataFrame) -> Result<Vec<f64>> {
        self.predictor.predict(features)
    }

    pub fn summary(&self, has_baseline: bool) -> ModelSummary {
        ModelSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            framework: self.framework.clone(),
            task_type: self.task_type,
            has_baseline,
            uploaded_at: self.uploaded_at,
        }
    }
}

impl std::fmt::Debug for ModelRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("task_type", &self.task_type)
            .finish()
    }
}

/// JSON model artifact accepted by the upload endpoint.
///
/// An explicit coefficient artifact rather than an opaque serialized
/// estimator: covers the linear family and keeps loading safe and
/// deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    #[serde(default = "default_framework")]
    pub framework: String,
    pub task_type: TaskType,
    /// Feature name -> coefficient.
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub intercept: f64,
}

fn default_framework() -> String {
    "linear".to_string()
}

/// Linear predictor over named feature columns.
///
/// Regression emits the raw affine score; classification squashes it through
/// a sigmoid and thresholds at 0.5 into the labels {0, 1}.
#[derive(Debug, Clone)]
pub struct LinearModel {
    weights: Vec<(String, f64)>,
    intercept: f64,
    task_type: TaskType,
}

impl LinearModel {
    pub fn from_artifact(artifact: &ModelArtifact) -> Self {
        let mut weights: Vec<(String, f64)> =
            artifact.weights.iter().map(|(k, v)| (k.clone(), *v)).collect();
        weights.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            weights,
            intercept: artifact.intercept,
            task_type: artifact.task_type,
        }
    }

    fn feature_values(features: &DataFrame, name: &str) -> Result<Vec<f64>> {
        let column = features.column(name).map_err(|_| {
            EngineError::validation(format!("model requires feature column '{name}'"))
        })?;
        let cast = column.as_materialized_series().cast(&DataType::Float64)?;
        cast.f64()?
            .into_iter()
            .map(|v| {
                v.ok_or_else(|| {
                    EngineError::validation(format!("feature column '{name}' contains nulls"))
                })
            })
            .collect()
    }
}

impl Predictor for LinearModel {
    fn predict(&self, features: &DataFrame) -> Result<Vec<f64>> {
        let rows = features.height();
        let mut scores = vec![self.intercept; rows];
        for (name, weight) in &self.weights {
            let values = Self::feature_values(features, name)?;
            for (score, value) in scores.iter_mut().zip(values.iter()) {
                *score += weight * value;
            }
        }

        match self.task_type {
            TaskType::Regression => Ok(scores),
            TaskType::Classification => Ok(scores
                .into_iter()
                .map(|s| {
                    let p = 1.0 / (1.0 + (-s).exp());
                    if p >= 0.5 {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect()),
        }
    }
}
