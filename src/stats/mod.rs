//! Statistics library
//!
//! Pure functions behind the drift analyzer: descriptive statistics and the
//! three distribution-shift tests (PSI, two-sample KS, Wasserstein). No state,
//! no randomness; identical inputs always produce identical outputs.
//!
//! NaN and infinite values are excluded before computation, never coerced to
//! zero. [`FeatureStats::excluded`] records how many values were dropped.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{EngineError, Result};

/// Default number of PSI buckets.
pub const DEFAULT_PSI_BINS: usize = 10;

/// Floor substituted for a zero bucket percentage to keep the PSI log finite.
const PSI_EPSILON: f64 = 1e-4;

/// Descriptive statistics for one column of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    /// Number of valid (finite) values the statistics were computed from.
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub q25: f64,
    pub q75: f64,
    /// Number of NaN/infinite values excluded before computation.
    pub excluded: usize,
}

fn finite_values(data: &Array1<f64>) -> (Vec<f64>, usize) {
    let values: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    let excluded = data.len() - values.len();
    (values, excluded)
}

fn sort_unstable_f64(values: &mut [f64]) {
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
}

/// Fraction of `sorted` values <= `x` (empirical CDF).
fn ecdf(sorted: &[f64], x: f64) -> f64 {
    let count = sorted.partition_point(|&v| v <= x);
    count as f64 / sorted.len() as f64
}

fn require_two_valid(name: &str, values: &[f64]) -> Result<()> {
    if values.len() < 2 {
        return Err(EngineError::InsufficientData(format!(
            "{name} requires at least 2 valid values, got {}",
            values.len()
        )));
    }
    Ok(())
}

/// Compute descriptive statistics over a column.
///
/// Fails with [`EngineError::EmptyColumn`] when the column has zero valid
/// values after NaN exclusion.
pub fn describe(name: &str, data: &Array1<f64>) -> Result<FeatureStats> {
    let (mut values, excluded) = finite_values(data);
    if values.is_empty() {
        return Err(EngineError::EmptyColumn(name.to_string()));
    }
    sort_unstable_f64(&mut values);

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n as f64;

    let median = if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    };

    Ok(FeatureStats {
        count: n,
        mean,
        std: variance.sqrt(),
        min: values[0],
        max: values[n - 1],
        median,
        q25: values[n / 4],
        q75: values[(3 * n) / 4],
        excluded,
    })
}

/// Equal-frequency bucket edges from the reference distribution.
///
/// Quantile-based rather than equal-width so a heavy-tailed reference does not
/// degenerate into mostly-empty buckets.
fn quantile_edges(sorted_reference: &[f64], bins: usize) -> Vec<f64> {
    let mut edges = Vec::with_capacity(bins + 1);
    edges.push(f64::NEG_INFINITY);
    for i in 1..bins {
        let idx = (i * sorted_reference.len() / bins).min(sorted_reference.len() - 1);
        edges.push(sorted_reference[idx]);
    }
    edges.push(f64::INFINITY);
    edges
}

/// Bucket proportions with the zero-percentage epsilon floor applied.
fn bucket_proportions(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    let mut counts = vec![0usize; edges.len() - 1];
    for &value in values {
        for i in 0..counts.len() {
            if value > edges[i] && value <= edges[i + 1] {
                counts[i] += 1;
                break;
            }
        }
    }
    counts
        .iter()
        .map(|&c| (c as f64 / n).max(PSI_EPSILON))
        .collect()
}

/// Population Stability Index between a reference and a current sample.
///
/// The reference defines the bucket edges; the current sample is binned into
/// them, so the function is deliberately asymmetric in its arguments.
pub fn psi(reference: &Array1<f64>, current: &Array1<f64>, bins: usize) -> Result<f64> {
    let (mut ref_values, _) = finite_values(reference);
    let (cur_values, _) = finite_values(current);
    require_two_valid("psi reference", &ref_values)?;
    require_two_valid("psi current", &cur_values)?;

    sort_unstable_f64(&mut ref_values);
    let edges = quantile_edges(&ref_values, bins.max(2));

    let ref_pct = bucket_proportions(&ref_values, &edges);
    let cur_pct = bucket_proportions(&cur_values, &edges);

    let psi = ref_pct
        .iter()
        .zip(cur_pct.iter())
        .map(|(&r, &c)| (c - r) * (c / r).ln())
        .sum::<f64>();

    // Identical distributions can produce -0.0 through float rounding.
    Ok(psi.max(0.0))
}

/// Two-sample Kolmogorov-Smirnov test.
///
/// Returns `(statistic, p_value)`; the statistic is the maximum absolute
/// difference between the two empirical CDFs, the p-value the asymptotic
/// Kolmogorov distribution tail.
pub fn ks_test(reference: &Array1<f64>, current: &Array1<f64>) -> Result<(f64, f64)> {
    let (mut ref_values, _) = finite_values(reference);
    let (mut cur_values, _) = finite_values(current);
    require_two_valid("ks_test reference", &ref_values)?;
    require_two_valid("ks_test current", &cur_values)?;

    sort_unstable_f64(&mut ref_values);
    sort_unstable_f64(&mut cur_values);

    let mut support: Vec<f64> = ref_values.iter().chain(cur_values.iter()).copied().collect();
    sort_unstable_f64(&mut support);
    support.dedup();

    let statistic = support
        .iter()
        .map(|&x| (ecdf(&ref_values, x) - ecdf(&cur_values, x)).abs())
        .fold(0.0, f64::max);

    let n1 = ref_values.len() as f64;
    let n2 = cur_values.len() as f64;
    let n_eff = (n1 * n2) / (n1 + n2);
    let lambda = statistic * n_eff.sqrt();

    Ok((statistic.clamp(0.0, 1.0), ks_p_value(lambda)))
}

/// Asymptotic p-value for the KS statistic:
/// `P(D > d) = 2 * sum_{k>=1} (-1)^{k+1} exp(-2 k^2 lambda^2)`.
fn ks_p_value(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    let mut p = 0.0;
    for k in 1..=100u32 {
        let sign = if k % 2 == 1 { 1.0 } else { -1.0 };
        let term = sign * (-2.0 * f64::from(k).powi(2) * lambda.powi(2)).exp();
        p += term;
        if term.abs() < 1e-10 {
            break;
        }
    }
    (2.0 * p).clamp(0.0, 1.0)
}

/// 1-D Wasserstein (earth-mover) distance between two empirical distributions:
/// the integral of the absolute ECDF difference over the merged support.
pub fn wasserstein(reference: &Array1<f64>, current: &Array1<f64>) -> Result<f64> {
    let (mut ref_values, _) = finite_values(reference);
    let (mut cur_values, _) = finite_values(current);
    require_two_valid("wasserstein reference", &ref_values)?;
    require_two_valid("wasserstein current", &cur_values)?;

    sort_unstable_f64(&mut ref_values);
    sort_unstable_f64(&mut cur_values);

    let mut support: Vec<f64> = ref_values.iter().chain(cur_values.iter()).copied().collect();
    sort_unstable_f64(&mut support);
    support.dedup();

    let mut distance = 0.0;
    for window in support.windows(2) {
        let gap = window[1] - window[0];
        let diff = (ecdf(&ref_values, window[0]) - ecdf(&cur_values, window[0])).abs();
        distance += diff * gap;
    }

    Ok(distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bimodal() -> Array1<f64> {
        let mut values = vec![1.0; 500];
        values.extend(vec![2.0; 500]);
        Array1::from_vec(values)
    }

    #[test]
    fn test_describe_basic() {
        let data = Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        let stats = describe("x", &data).unwrap();
        assert_eq!(stats.count, 10);
        assert!((stats.mean - 5.5).abs() < 1e-12);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 10.0);
        assert_eq!(stats.excluded, 0);
    }

    #[test]
    fn test_describe_excludes_nan() {
        let data = Array1::from_vec(vec![1.0, f64::NAN, 3.0, f64::INFINITY]);
        let stats = describe("x", &data).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.excluded, 2);
        assert!((stats.mean - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_describe_empty_column() {
        let data = Array1::from_vec(vec![f64::NAN, f64::NAN]);
        assert!(matches!(
            describe("age", &data),
            Err(EngineError::EmptyColumn(name)) if name == "age"
        ));
    }

    #[test]
    fn test_psi_identical_is_zero() {
        let data = bimodal();
        let score = psi(&data, &data, DEFAULT_PSI_BINS).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_psi_shift_is_positive() {
        let reference = Array1::from_vec((0..200).map(|i| (i % 20) as f64).collect());
        let current = Array1::from_vec((0..200).map(|i| 50.0 + (i % 20) as f64).collect());
        let score = psi(&reference, &current, DEFAULT_PSI_BINS).unwrap();
        assert!(score > 0.25, "shifted distribution should score high, got {score}");
    }

    #[test]
    fn test_psi_insufficient_data() {
        let one = Array1::from_vec(vec![1.0]);
        let many = Array1::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            psi(&one, &many, DEFAULT_PSI_BINS),
            Err(EngineError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_ks_bounds() {
        let reference = Array1::from_vec((0..100).map(|i| i as f64).collect());
        let current = Array1::from_vec((0..100).map(|i| (i * 3) as f64).collect());
        let (statistic, p_value) = ks_test(&reference, &current).unwrap();
        assert!((0.0..=1.0).contains(&statistic));
        assert!((0.0..=1.0).contains(&p_value));
    }

    #[test]
    fn test_ks_identical_high_p() {
        let data = bimodal();
        let (statistic, p_value) = ks_test(&data, &data).unwrap();
        assert_eq!(statistic, 0.0);
        assert_eq!(p_value, 1.0);
    }

    #[test]
    fn test_ks_disjoint_low_p() {
        let reference = Array1::from_vec((0..100).map(|i| i as f64).collect());
        let current = Array1::from_vec((0..100).map(|i| 1000.0 + i as f64).collect());
        let (statistic, p_value) = ks_test(&reference, &current).unwrap();
        assert_eq!(statistic, 1.0);
        assert!(p_value < 0.001);
    }

    #[test]
    fn test_wasserstein_translation() {
        let reference = Array1::from_vec((0..100).map(|i| i as f64).collect());
        let current = Array1::from_vec((0..100).map(|i| i as f64 + 7.0).collect());
        let distance = wasserstein(&reference, &current).unwrap();
        assert!((distance - 7.0).abs() < 1e-9, "translation by 7 should cost 7, got {distance}");
    }

    #[test]
    fn test_wasserstein_identical_is_zero() {
        let data = bimodal();
        assert_eq!(wasserstein(&data, &data).unwrap(), 0.0);
    }
}
