//! Alert classification
//!
//! Turns finished drift and evaluation reports into a severity-ranked alert
//! feed. Classification is a pure function of the report; re-classifying the
//! same report is idempotent and never duplicates alerts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::drift::{DriftReport, PSI_DRIFT_THRESHOLD};
use crate::evaluate::{EvaluationReport, PERFORMANCE_DRIFT_THRESHOLD};
use crate::registry::UploadRegistry;

/// PSI above this raises a critical alert instead of a warning.
pub const PSI_CRITICAL_THRESHOLD: f64 = 0.25;
/// Absolute performance drift percentage above this is critical.
pub const PERFORMANCE_CRITICAL_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    /// Report the alert was derived from.
    pub source_report_id: String,
    pub severity: AlertSeverity,
    /// Feature name for drift alerts, "performance" for evaluation alerts.
    pub category: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Severity-ranked alert feed, keyed by (report, category) so the same
/// finding never appears twice.
#[derive(Default)]
pub struct AlertClassifier {
    alerts: RwLock<HashMap<(String, String), Alert>>,
}

impl AlertClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise alerts for every drifted feature in the report.
    pub fn classify_drift(&self, report: &DriftReport) -> Vec<Alert> {
        let mut raised = Vec::new();
        for result in &report.results {
            // Severity comes from PSI alone; a KS-only detection marks the
            // report but does not raise an alert.
            let severity = if result.psi_score > PSI_CRITICAL_THRESHOLD {
                AlertSeverity::Critical
            } else if result.psi_score > PSI_DRIFT_THRESHOLD {
                AlertSeverity::Warning
            } else {
                continue;
            };
            let message = format!(
                "feature '{}' drifted (PSI {:.4}, KS p {:.4})",
                result.feature_name, result.psi_score, result.ks_p_value
            );
            raised.push(self.raise(report.id.clone(), severity, result.feature_name.clone(), message));
        }
        raised
    }

    /// Raise an alert when an evaluation crossed the performance drift
    /// threshold. No-op for evaluations without a prior baseline.
    pub fn classify_evaluation(&self, report: &EvaluationReport) -> Option<Alert> {
        let pct = report.drift_percentage?;
        let severity = if pct.abs() > PERFORMANCE_CRITICAL_THRESHOLD {
            AlertSeverity::Critical
        } else if pct.abs() > PERFORMANCE_DRIFT_THRESHOLD {
            AlertSeverity::Warning
        } else {
            return None;
        };
        let message = format!(
            "model '{}' performance moved {:.2}% from baseline",
            report.model_name, pct
        );
        Some(self.raise(report.id.clone(), severity, "performance".to_string(), message))
    }

    fn raise(
        &self,
        source_report_id: String,
        severity: AlertSeverity,
        category: String,
        message: String,
    ) -> Alert {
        let key = (source_report_id.clone(), category.clone());
        let mut alerts = self.alerts.write();
        if let Some(existing) = alerts.get(&key) {
            return existing.clone();
        }
        let alert = Alert {
            id: UploadRegistry::generate_id(),
            source_report_id,
            severity,
            category,
            message,
            created_at: Utc::now(),
            acknowledged: false,
        };
        info!(
            alert_id = %alert.id,
            severity = ?alert.severity,
            category = %alert.category,
            "alert raised"
        );
        alerts.insert(key, alert.clone());
        alert
    }

    /// Mark an alert acknowledged. The only mutation alerts support.
    pub fn acknowledge(&self, alert_id: &str) -> crate::error::Result<Alert> {
        let mut alerts = self.alerts.write();
        for alert in alerts.values_mut() {
            if alert.id == alert_id {
                alert.acknowledged = true;
                return Ok(alert.clone());
            }
        }
        Err(crate::error::EngineError::NotFound(format!(
            "alert '{alert_id}'"
        )))
    }

    /// Current feed, most severe first, newest first within a severity.
    pub fn feed(&self) -> Vec<Alert> {
        let mut feed: Vec<Alert> = self.alerts.read().values().cloned().collect();
        feed.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then(b.created_at.cmp(&a.created_at))
        });
        feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::DriftResult;
    use crate::metrics::{ModelMetrics, TaskType};
    use crate::stats::FeatureStats;

    fn stats() -> FeatureStats {
        FeatureStats {
            count: 10,
            mean: 0.0,
            std: 1.0,
            min: -1.0,
            max: 1.0,
            median: 0.0,
            q25: -0.5,
            q75: 0.5,
            excluded: 0,
        }
    }

    fn drift_report(psi: f64, detected: bool) -> DriftReport {
        DriftReport {
            id: "rep-1".to_string(),
            reference_dataset_id: "a".to_string(),
            current_dataset_id: "b".to_string(),
            reference_dataset: "a.csv".to_string(),
            current_dataset: "b.csv".to_string(),
            results: vec![DriftResult {
                feature_name: "age".to_string(),
                psi_score: psi,
                ks_statistic: 0.2,
                ks_p_value: 0.01,
                mean_change_percent: Some(3.0),
                drift_score: psi,
                drift_detected: detected,
                reference_stats: stats(),
                current_stats: stats(),
            }],
            skipped: Vec::new(),
            avg_wasserstein: None,
            total_features: 1,
            features_with_drift: usize::from(detected),
            sample_seed: None,
            computed_at: Utc::now(),
        }
    }

    fn evaluation_report(pct: Option<f64>) -> EvaluationReport {
        EvaluationReport {
            id: "eval-1".to_string(),
            model_id: "m".to_string(),
            model_name: "churn".to_string(),
            dataset_id: "d".to_string(),
            dataset_name: "d.csv".to_string(),
            task_type: TaskType::Classification,
            metrics: ModelMetrics::Classification {
                accuracy: 0.8,
                precision: 0.8,
                recall: 0.8,
                f1_score: 0.8,
            },
            baseline_metrics: None,
            drift_detected: pct.map(|p| p.abs() > PERFORMANCE_DRIFT_THRESHOLD).unwrap_or(false),
            drift_score: 0.2,
            drift_percentage: pct,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_drift_severity_bands() {
        let classifier = AlertClassifier::new();
        let critical = classifier.classify_drift(&drift_report(0.3, true));
        assert_eq!(critical[0].severity, AlertSeverity::Critical);

        let classifier = AlertClassifier::new();
        let warning = classifier.classify_drift(&drift_report(0.15, true));
        assert_eq!(warning[0].severity, AlertSeverity::Warning);

        let classifier = AlertClassifier::new();
        assert!(classifier.classify_drift(&drift_report(0.02, false)).is_empty());
    }

    #[test]
    fn test_ks_only_detection_raises_no_alert() {
        // Drift flagged by the KS p-value alone, PSI under the warning line.
        let classifier = AlertClassifier::new();
        assert!(classifier.classify_drift(&drift_report(0.05, true)).is_empty());
        assert!(classifier.feed().is_empty());
    }

    #[test]
    fn test_classification_is_idempotent() {
        let classifier = AlertClassifier::new();
        let report = drift_report(0.3, true);
        let first = classifier.classify_drift(&report);
        let second = classifier.classify_drift(&report);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(classifier.feed().len(), 1);
    }

    #[test]
    fn test_evaluation_thresholds() {
        let classifier = AlertClassifier::new();
        assert!(classifier.classify_evaluation(&evaluation_report(None)).is_none());
        assert!(classifier.classify_evaluation(&evaluation_report(Some(3.0))).is_none());

        let warning = classifier
            .classify_evaluation(&evaluation_report(Some(-7.0)))
            .unwrap();
        assert_eq!(warning.severity, AlertSeverity::Warning);
    }

    #[test]
    fn test_feed_ordering_and_acknowledge() {
        let classifier = AlertClassifier::new();
        classifier.classify_evaluation(&evaluation_report(Some(7.0)));
        classifier.classify_drift(&drift_report(0.5, true));

        let feed = classifier.feed();
        assert_eq!(feed[0].severity, AlertSeverity::Critical);
        assert_eq!(feed[1].severity, AlertSeverity::Warning);

        let acked = classifier.acknowledge(&feed[0].id).unwrap();
        assert!(acked.acknowledged);
        assert!(classifier.acknowledge("missing").is_err());
    }
}
