//! Integration test: performance evaluation lifecycle

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use driftwatch::alerts::{AlertClassifier, AlertSeverity};
use driftwatch::cancel::CancelToken;
use driftwatch::evaluate::PerformanceEvaluator;
use driftwatch::history::{HistoryKind, HistoryStore, MemoryHistory};
use driftwatch::metrics::TaskType;
use driftwatch::model::{LinearModel, ModelArtifact};
use driftwatch::registry::UploadRegistry;
use polars::prelude::*;

fn register_classifier(registry: &Arc<UploadRegistry>) -> String {
    let mut weights = HashMap::new();
    weights.insert("x".to_string(), 2.0);
    let artifact = ModelArtifact {
        name: "churn-clf".to_string(),
        framework: "linear".to_string(),
        task_type: TaskType::Classification,
        weights,
        intercept: 1.0,
    };
    registry
        .register_model(
            "tester".to_string(),
            &artifact,
            Arc::new(LinearModel::from_artifact(&artifact)),
        )
        .id
        .clone()
}

fn register_labels(registry: &Arc<UploadRegistry>, name: &str, labels: [f64; 6]) -> String {
    // sigmoid(2x + 1) thresholded at 0.5 predicts [0, 0, 0, 1, 1, 1].
    let frame = df![
        "x" => [-5.0, -3.0, -2.0, 2.0, 3.0, 5.0],
        "y" => labels,
    ]
    .unwrap();
    registry
        .register_dataset(name.to_string(), "tester".to_string(), frame)
        .unwrap()
        .id
        .clone()
}

#[test]
fn test_evaluation_lifecycle_with_history_and_alerts() {
    let registry = Arc::new(UploadRegistry::new());
    let model_id = register_classifier(&registry);
    let clean = register_labels(&registry, "clean.csv", [0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    let noisy = register_labels(&registry, "noisy.csv", [1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);

    let evaluator = PerformanceEvaluator::new(Arc::clone(&registry));
    let history = MemoryHistory::new();
    let alerts = AlertClassifier::new();
    let token = CancelToken::new();

    // First evaluation: perfect accuracy becomes the baseline.
    let first = evaluator
        .evaluate(&model_id, &clean, "y", TaskType::Classification, &token)
        .unwrap();
    assert!(first.baseline_metrics.is_none());
    assert_eq!(first.metrics.primary(), 1.0);
    history.record_evaluation(&first).unwrap();
    assert!(alerts.classify_evaluation(&first).is_none());

    // Second evaluation on mislabelled data: accuracy halves, 50% drift.
    let second = evaluator
        .evaluate(&model_id, &noisy, "y", TaskType::Classification, &token)
        .unwrap();
    assert!(second.drift_detected);
    assert_eq!(second.drift_percentage, Some(50.0));
    history.record_evaluation(&second).unwrap();

    let alert = alerts.classify_evaluation(&second).unwrap();
    assert_eq!(alert.severity, AlertSeverity::Critical);
    assert_eq!(alert.category, "performance");

    // Both evaluations land in history under the model name, oldest first.
    let grouped = history
        .query_grouped(HistoryKind::Performance, Utc::now() - Duration::hours(1))
        .unwrap();
    let entries = &grouped["churn-clf"];
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].score, 1.0);
    assert_eq!(entries[1].score, 0.5);
    assert!(entries[1].metrics.is_some());
}

#[test]
fn test_rebaseline_resets_comparison() {
    let registry = Arc::new(UploadRegistry::new());
    let model_id = register_classifier(&registry);
    let clean = register_labels(&registry, "clean.csv", [0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    let noisy = register_labels(&registry, "noisy.csv", [1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);

    let evaluator = PerformanceEvaluator::new(Arc::clone(&registry));
    let token = CancelToken::new();

    evaluator
        .evaluate(&model_id, &clean, "y", TaskType::Classification, &token)
        .unwrap();

    // Explicitly move the baseline to the noisy dataset.
    let baseline = evaluator.rebaseline(&model_id, &noisy, "y", &token).unwrap();
    assert_eq!(baseline.metrics.primary(), 0.5);

    // Against the new baseline, the noisy dataset shows no drift.
    let report = evaluator
        .evaluate(&model_id, &noisy, "y", TaskType::Classification, &token)
        .unwrap();
    assert_eq!(report.drift_percentage, Some(0.0));
    assert!(!report.drift_detected);
}

#[test]
fn test_compare_ranks_models_on_shared_dataset() {
    let registry = Arc::new(UploadRegistry::new());
    let good = register_classifier(&registry);

    // A constant-zero model misclassifies the positive half.
    let artifact = ModelArtifact {
        name: "zero-clf".to_string(),
        framework: "linear".to_string(),
        task_type: TaskType::Classification,
        weights: HashMap::new(),
        intercept: -1.0,
    };
    let bad = registry
        .register_model(
            "tester".to_string(),
            &artifact,
            Arc::new(LinearModel::from_artifact(&artifact)),
        )
        .id
        .clone();

    let dataset = register_labels(&registry, "clean.csv", [0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    let evaluator = PerformanceEvaluator::new(registry);

    let entries = evaluator
        .compare(
            &[good, bad],
            &dataset,
            "y",
            TaskType::Classification,
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].metrics.as_ref().unwrap().primary(), 1.0);
    assert_eq!(entries[1].metrics.as_ref().unwrap().primary(), 0.5);
}
