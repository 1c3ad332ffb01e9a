//! Integration test: drift analysis pipeline with history

use std::sync::Arc;

use chrono::{Duration, Utc};
use driftwatch::cancel::CancelToken;
use driftwatch::drift::DriftAnalyzer;
use driftwatch::history::{HistoryKind, HistoryStore, JsonlHistory, MemoryHistory};
use driftwatch::registry::UploadRegistry;
use polars::prelude::*;

fn seed(registry: &Arc<UploadRegistry>, name: &str, offset: f64) -> String {
    let frame =
        df!["x" => (0..300).map(|i| offset + (i % 30) as f64).collect::<Vec<_>>()].unwrap();
    registry
        .register_dataset(name.to_string(), "tester".to_string(), frame)
        .unwrap()
        .id
        .clone()
}

#[test]
fn test_concurrent_analyses_match_sequential() {
    let registry = Arc::new(UploadRegistry::new());
    let a = seed(&registry, "a.csv", 0.0);
    let b = seed(&registry, "b.csv", 5.0);
    let c = seed(&registry, "c.csv", 0.0);
    let d = seed(&registry, "d.csv", 50.0);

    let analyzer = DriftAnalyzer::new(Arc::clone(&registry));
    let sequential_ab = analyzer.analyze(&a, &b, &CancelToken::new()).unwrap();
    let sequential_cd = analyzer.analyze(&c, &d, &CancelToken::new()).unwrap();

    // Disjoint pairs analyzed in parallel must produce identical measurements.
    let handles: Vec<_> = [(a, b), (c, d)]
        .into_iter()
        .map(|(reference, current)| {
            let analyzer = analyzer.clone();
            std::thread::spawn(move || {
                analyzer.analyze(&reference, &current, &CancelToken::new()).unwrap()
            })
        })
        .collect();
    let mut parallel: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let parallel_cd = parallel.pop().unwrap();
    let parallel_ab = parallel.pop().unwrap();

    assert_eq!(parallel_ab.results[0].psi_score, sequential_ab.results[0].psi_score);
    assert_eq!(parallel_ab.results[0].ks_statistic, sequential_ab.results[0].ks_statistic);
    assert_eq!(parallel_cd.results[0].psi_score, sequential_cd.results[0].psi_score);
    assert_eq!(
        parallel_cd.results[0].mean_change_percent,
        sequential_cd.results[0].mean_change_percent
    );
}

#[test]
fn test_reports_feed_history_per_feature() {
    let registry = Arc::new(UploadRegistry::new());
    let frame_a = df![
        "age" => (0..100).map(|i| (i % 10) as f64).collect::<Vec<_>>(),
        "income" => (0..100).map(|i| (i % 50) as f64).collect::<Vec<_>>(),
    ]
    .unwrap();
    let frame_b = frame_a.clone();
    let a = registry
        .register_dataset("a.csv".into(), "tester".into(), frame_a)
        .unwrap()
        .id
        .clone();
    let b = registry
        .register_dataset("b.csv".into(), "tester".into(), frame_b)
        .unwrap()
        .id
        .clone();

    let analyzer = DriftAnalyzer::new(registry);
    let report = analyzer.analyze(&a, &b, &CancelToken::new()).unwrap();

    let history = MemoryHistory::new();
    let entries = history.record_drift(&report).unwrap();
    assert_eq!(entries.len(), 2);

    let grouped = history
        .query_grouped(HistoryKind::DataDrift, Utc::now() - Duration::hours(1))
        .unwrap();
    assert!(grouped.contains_key("age"));
    assert!(grouped.contains_key("income"));
}

#[test]
fn test_jsonl_history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");

    let registry = Arc::new(UploadRegistry::new());
    let a = seed(&registry, "a.csv", 0.0);
    let b = seed(&registry, "b.csv", 100.0);
    let analyzer = DriftAnalyzer::new(registry);
    let report = analyzer.analyze(&a, &b, &CancelToken::new()).unwrap();

    {
        let history = JsonlHistory::open(path.clone()).unwrap();
        history.record_drift(&report).unwrap();
    }

    let reopened = JsonlHistory::open(path).unwrap();
    let entries = reopened
        .query("x", Utc::now() - Duration::hours(1))
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].score, report.results[0].drift_score);
}
