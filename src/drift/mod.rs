//! Drift analyzer
//!
//! Orchestrates per-feature distribution comparison between a reference and a
//! current dataset. Every excluded feature is surfaced in the report with a
//! reason; nothing is silently dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::Array1;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::dataset::{ColumnKind, DatasetRecord};
use crate::error::{EngineError, Result};
use crate::registry::UploadRegistry;
use crate::stats::{self, FeatureStats, DEFAULT_PSI_BINS};

/// PSI above this is the "moderate shift" convention and flags drift.
pub const PSI_DRIFT_THRESHOLD: f64 = 0.1;
/// KS p-value below this flags drift.
pub const KS_ALPHA: f64 = 0.05;
/// Columns longer than this are deterministically subsampled.
pub const SAMPLE_CAP: usize = 100_000;
/// Fixed seed for the subsample; stored on the report for reproducibility.
pub const SAMPLE_SEED: u64 = 42;

/// Drift measurements for one shared feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftResult {
    pub feature_name: String,
    pub psi_score: f64,
    pub ks_statistic: f64,
    pub ks_p_value: f64,
    /// Relative mean shift in percent; `None` when the reference mean is
    /// exactly zero.
    pub mean_change_percent: Option<f64>,
    /// Primary drift indicator; defined as the PSI score.
    pub drift_score: f64,
    pub drift_detected: bool,
    pub reference_stats: FeatureStats,
    pub current_stats: FeatureStats,
}

/// A column the analyzer could not compare, with the reason it was excluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedColumn {
    pub name: String,
    pub reason: String,
}

/// Per-feature drift comparison of a (reference, current) dataset pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub id: String,
    pub reference_dataset_id: String,
    pub current_dataset_id: String,
    pub reference_dataset: String,
    pub current_dataset: String,
    /// Ordered by the reference dataset's schema. Serialized as
    /// `drift_results`, the field name consumers of the API expect.
    #[serde(rename = "drift_results")]
    pub results: Vec<DriftResult>,
    pub skipped: Vec<SkippedColumn>,
    /// Report-level Wasserstein summary (mean over compared features).
    pub avg_wasserstein: Option<f64>,
    pub total_features: usize,
    pub features_with_drift: usize,
    /// Set when either side exceeded [`SAMPLE_CAP`] and was subsampled.
    pub sample_seed: Option<u64>,
    pub computed_at: DateTime<Utc>,
}

/// Computes [`DriftReport`]s from registered dataset pairs.
///
/// Stateless apart from the injected registry: concurrent `analyze` calls on
/// different dataset pairs share nothing mutable.
#[derive(Clone)]
pub struct DriftAnalyzer {
    registry: Arc<UploadRegistry>,
}

impl DriftAnalyzer {
    pub fn new(registry: Arc<UploadRegistry>) -> Self {
        Self { registry }
    }

    /// Compare every shared numeric feature of the two datasets.
    ///
    /// Fails with `NotFound` for unknown ids and `Computation` when the
    /// datasets share no numeric columns. Cancellation is checked between
    /// features and aborts without producing a report.
    pub fn analyze(
        &self,
        reference_dataset_id: &str,
        current_dataset_id: &str,
        token: &CancelToken,
    ) -> Result<DriftReport> {
        let reference = self.registry.dataset(reference_dataset_id)?;
        let current = self.registry.dataset(current_dataset_id)?;

        let sampled = reference.rows > SAMPLE_CAP || current.rows > SAMPLE_CAP;
        let mut results = Vec::new();
        let mut skipped = Vec::new();
        let mut wasserstein_sum = 0.0;

        // Reference schema order keeps reports stable and reproducible.
        for column in &reference.columns {
            token.check()?;
            let name = &column.name;

            if !current.has_column(name) {
                skipped.push(SkippedColumn {
                    name: name.clone(),
                    reason: "only present in reference dataset".to_string(),
                });
                continue;
            }
            if column.kind != ColumnKind::Numeric {
                skipped.push(SkippedColumn {
                    name: name.clone(),
                    reason: "not numeric".to_string(),
                });
                continue;
            }
            if current.column_kind(name) != Some(ColumnKind::Numeric) {
                skipped.push(SkippedColumn {
                    name: name.clone(),
                    reason: "not numeric in current dataset".to_string(),
                });
                continue;
            }

            match self.compare_feature(&reference, &current, name) {
                Ok((result, distance)) => {
                    debug!(
                        feature = %name,
                        psi = result.psi_score,
                        ks_p = result.ks_p_value,
                        drift = result.drift_detected,
                        "Feature compared"
                    );
                    wasserstein_sum += distance;
                    results.push(result);
                }
                Err(err @ (EngineError::EmptyColumn(_) | EngineError::InsufficientData(_))) => {
                    skipped.push(SkippedColumn {
                        name: name.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        // Columns the current dataset has but the reference does not.
        for column in &current.columns {
            if !reference.has_column(&column.name) {
                skipped.push(SkippedColumn {
                    name: column.name.clone(),
                    reason: "only present in current dataset".to_string(),
                });
            }
        }

        let shares_numeric = reference.columns.iter().any(|c| {
            c.kind == ColumnKind::Numeric
                && current.column_kind(&c.name) == Some(ColumnKind::Numeric)
        });
        if !shares_numeric {
            return Err(EngineError::Computation(
                "datasets share no numeric columns".to_string(),
            ));
        }

        let features_with_drift = results.iter().filter(|r| r.drift_detected).count();
        let avg_wasserstein = if results.is_empty() {
            None
        } else {
            Some(wasserstein_sum / results.len() as f64)
        };

        info!(
            reference = %reference_dataset_id,
            current = %current_dataset_id,
            features = results.len(),
            drifted = features_with_drift,
            skipped = skipped.len(),
            "Drift analysis complete"
        );

        Ok(DriftReport {
            id: UploadRegistry::generate_id(),
            reference_dataset_id: reference_dataset_id.to_string(),
            current_dataset_id: current_dataset_id.to_string(),
            reference_dataset: reference.name.clone(),
            current_dataset: current.name.clone(),
            total_features: results.len(),
            features_with_drift,
            results,
            skipped,
            avg_wasserstein,
            sample_seed: sampled.then_some(SAMPLE_SEED),
            computed_at: Utc::now(),
        })
    }

    fn compare_feature(
        &self,
        reference: &DatasetRecord,
        current: &DatasetRecord,
        name: &str,
    ) -> Result<(DriftResult, f64)> {
        let ref_array = Array1::from_vec(subsample(reference.numeric_column(name)?));
        let cur_array = Array1::from_vec(subsample(current.numeric_column(name)?));

        let reference_stats = stats::describe(name, &ref_array)?;
        let current_stats = stats::describe(name, &cur_array)?;

        let psi_score = stats::psi(&ref_array, &cur_array, DEFAULT_PSI_BINS)?;
        let (ks_statistic, ks_p_value) = stats::ks_test(&ref_array, &cur_array)?;
        let distance = stats::wasserstein(&ref_array, &cur_array)?;

        let mean_change_percent = if reference_stats.mean == 0.0 {
            None
        } else {
            Some((current_stats.mean - reference_stats.mean) / reference_stats.mean.abs() * 100.0)
        };

        let drift_detected = psi_score > PSI_DRIFT_THRESHOLD || ks_p_value < KS_ALPHA;

        Ok((
            DriftResult {
                feature_name: name.to_string(),
                psi_score,
                ks_statistic,
                ks_p_value,
                mean_change_percent,
                drift_score: psi_score,
                drift_detected,
                reference_stats,
                current_stats,
            },
            distance,
        ))
    }
}

/// Deterministic subsample for oversized columns: same seed and length give
/// the same indices, so sibling columns of one dataset stay row-aligned.
fn subsample(values: Vec<f64>) -> Vec<f64> {
    if values.len() <= SAMPLE_CAP {
        return values;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(SAMPLE_SEED);
    let indices = rand::seq::index::sample(&mut rng, values.len(), SAMPLE_CAP);
    indices.into_iter().map(|i| values[i]).collect()
}
