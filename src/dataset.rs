//! Dataset records
//!
//! Immutable references to tabular data. A dataset is registered once (by the
//! upload collaborator) and never mutated afterwards, which is what makes the
//! drift computations deterministic and safely parallel.

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Inferred type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// One column of a dataset's schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
}

/// Immutable reference to an uploaded tabular dataset.
#[derive(Debug, Clone)]
pub struct DatasetRecord {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub rows: usize,
    pub columns: Vec<ColumnInfo>,
    pub uploaded_at: DateTime<Utc>,
    frame: DataFrame,
}

/// Serializable listing projection of a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub rows: usize,
    pub columns: Vec<ColumnInfo>,
    pub uploaded_at: DateTime<Utc>,
}

impl DatasetRecord {
    pub fn new(id: String, name: String, owner: String, frame: DataFrame) -> Self {
        let columns = frame
            .get_columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                kind: if col.dtype().is_numeric() {
                    ColumnKind::Numeric
                } else {
                    ColumnKind::Categorical
                },
            })
            .collect();

        Self {
            id,
            name,
            owner,
            rows: frame.height(),
            columns,
            uploaded_at: Utc::now(),
            frame,
        }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.kind)
    }

    /// Extract a column as f64 values. Nulls become NaN so the statistics
    /// layer can exclude them and report the exclusion count.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let column = self
            .frame
            .column(name)
            .map_err(|_| EngineError::NotFound(format!("column '{name}' not in dataset {}", self.id)))?;
        let series = column.as_materialized_series();
        if !series.dtype().is_numeric() {
            return Err(EngineError::validation(format!(
                "column '{name}' is not numeric"
            )));
        }
        let cast = series.cast(&DataType::Float64)?;
        let values = cast
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        Ok(values)
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            rows: self.rows,
            columns: self.columns.clone(),
            uploaded_at: self.uploaded_at,
        }
    }
}
