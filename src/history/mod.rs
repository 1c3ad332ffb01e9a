//! History store
//!
//! Append-only, time-indexed record of drift and performance measurements,
//! queried for trend charts. Entries are never edited; retention compaction
//! is an explicit maintenance operation, never a side effect of writing.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::drift::DriftReport;
use crate::error::{EngineError, Result};
use crate::evaluate::EvaluationReport;
use crate::metrics::ModelMetrics;
use crate::registry::UploadRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    DataDrift,
    Performance,
}

/// Compact, time-stamped projection of one report measurement.
///
/// Drift reports produce one entry per feature (subject = feature name);
/// evaluations produce one entry per model (subject = model name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub subject: String,
    pub kind: HistoryKind,
    /// Drift score for data drift; primary metric for performance.
    pub score: f64,
    /// Full metrics snapshot for performance entries.
    pub metrics: Option<ModelMetrics>,
    pub recorded_at: DateTime<Utc>,
}

/// Per-subject aggregate over a recent window, for the summary feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub subject: String,
    pub avg_score: f64,
    pub max_score: f64,
    pub count: usize,
    pub status: String,
}

/// Append-only history persistence seam.
///
/// `append` must be atomic with respect to concurrent writers; everything
/// else is provided in terms of it and `snapshot`.
pub trait HistoryStore: Send + Sync {
    fn append(&self, entries: Vec<HistoryEntry>) -> Result<()>;

    fn snapshot(&self) -> Result<Vec<HistoryEntry>>;

    /// Downsample entries recorded before `cutoff`, keeping the newest entry
    /// per subject per `bucket`. Returns the number of entries removed.
    fn compact(&self, cutoff: DateTime<Utc>, bucket: Duration) -> Result<usize>;

    fn record_drift(&self, report: &DriftReport) -> Result<Vec<HistoryEntry>> {
        let entries: Vec<HistoryEntry> = report
            .results
            .iter()
            .map(|r| HistoryEntry {
                id: UploadRegistry::generate_id(),
                subject: r.feature_name.clone(),
                kind: HistoryKind::DataDrift,
                score: r.drift_score,
                metrics: None,
                recorded_at: report.computed_at,
            })
            .collect();
        self.append(entries.clone())?;
        Ok(entries)
    }

    fn record_evaluation(&self, report: &EvaluationReport) -> Result<HistoryEntry> {
        let entry = HistoryEntry {
            id: UploadRegistry::generate_id(),
            subject: report.model_name.clone(),
            kind: HistoryKind::Performance,
            score: report.metrics.primary(),
            metrics: Some(report.metrics.clone()),
            recorded_at: report.computed_at,
        };
        self.append(vec![entry.clone()])?;
        Ok(entry)
    }

    /// Entries for one subject within the window, oldest first.
    fn query(&self, subject: &str, since: DateTime<Utc>) -> Result<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self
            .snapshot()?
            .into_iter()
            .filter(|e| e.subject == subject && e.recorded_at >= since)
            .collect();
        entries.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        Ok(entries)
    }

    /// All entries of one kind within the window, grouped by subject,
    /// chronological within each group.
    fn query_grouped(
        &self,
        kind: HistoryKind,
        since: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Vec<HistoryEntry>>> {
        let mut grouped: BTreeMap<String, Vec<HistoryEntry>> = BTreeMap::new();
        for entry in self.snapshot()? {
            if entry.kind == kind && entry.recorded_at >= since {
                grouped.entry(entry.subject.clone()).or_default().push(entry);
            }
        }
        for entries in grouped.values_mut() {
            entries.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        }
        Ok(grouped)
    }

    /// Per-subject aggregates over the window, highest average first.
    fn summarize(&self, kind: HistoryKind, since: DateTime<Utc>) -> Result<Vec<SubjectSummary>> {
        let grouped = self.query_grouped(kind, since)?;
        let mut summaries: Vec<SubjectSummary> = grouped
            .into_iter()
            .map(|(subject, entries)| {
                let count = entries.len();
                let sum: f64 = entries.iter().map(|e| e.score).sum();
                let avg_score = sum / count as f64;
                let max_score = entries.iter().map(|e| e.score).fold(f64::NEG_INFINITY, f64::max);
                let status = if avg_score > 0.2 {
                    "high"
                } else if avg_score > 0.1 {
                    "medium"
                } else {
                    "low"
                };
                SubjectSummary {
                    subject,
                    avg_score,
                    max_score,
                    count,
                    status: status.to_string(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.avg_score.partial_cmp(&a.avg_score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(summaries)
    }
}

/// Downsampling shared by both backends: keep everything after the cutoff,
/// and the newest entry per (subject, bucket) before it.
fn compact_entries(
    entries: &[HistoryEntry],
    cutoff: DateTime<Utc>,
    bucket: Duration,
) -> (Vec<HistoryEntry>, usize) {
    let bucket_secs = bucket.num_seconds().max(1);
    let mut keep: Vec<HistoryEntry> = Vec::with_capacity(entries.len());
    let mut newest: BTreeMap<(String, i64), HistoryEntry> = BTreeMap::new();

    for entry in entries {
        if entry.recorded_at >= cutoff {
            keep.push(entry.clone());
        } else {
            let slot = (cutoff - entry.recorded_at).num_seconds() / bucket_secs;
            let key = (entry.subject.clone(), slot);
            match newest.get(&key) {
                Some(existing) if existing.recorded_at >= entry.recorded_at => {}
                _ => {
                    newest.insert(key, entry.clone());
                }
            }
        }
    }

    keep.extend(newest.into_values());
    keep.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
    let removed = entries.len() - keep.len();
    (keep, removed)
}

/// In-memory history backend.
#[derive(Default)]
pub struct MemoryHistory {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistory {
    fn append(&self, mut entries: Vec<HistoryEntry>) -> Result<()> {
        self.entries.write().append(&mut entries);
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.entries.read().clone())
    }

    fn compact(&self, cutoff: DateTime<Utc>, bucket: Duration) -> Result<usize> {
        let mut entries = self.entries.write();
        let (kept, removed) = compact_entries(&entries, cutoff, bucket);
        *entries = kept;
        Ok(removed)
    }
}

struct JsonlInner {
    entries: Vec<HistoryEntry>,
}

/// JSON-lines file backend: one serialized entry per line, appended under a
/// lock so concurrent writers cannot interleave partial lines.
pub struct JsonlHistory {
    path: PathBuf,
    inner: Mutex<JsonlInner>,
}

impl JsonlHistory {
    pub fn open(path: PathBuf) -> Result<Self> {
        let mut entries = Vec::new();
        if path.exists() {
            let file = std::fs::File::open(&path)
                .map_err(|e| EngineError::Storage(format!("open {}: {e}", path.display())))?;
            for line in BufReader::new(file).lines() {
                let line = line
                    .map_err(|e| EngineError::Storage(format!("read {}: {e}", path.display())))?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: HistoryEntry = serde_json::from_str(&line)
                    .map_err(|e| EngineError::Storage(format!("parse history line: {e}")))?;
                entries.push(entry);
            }
        }
        Ok(Self {
            path,
            inner: Mutex::new(JsonlInner { entries }),
        })
    }

    fn rewrite(&self, entries: &[HistoryEntry]) -> Result<()> {
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut file = std::fs::File::create(&tmp)
                .map_err(|e| EngineError::Storage(format!("create {}: {e}", tmp.display())))?;
            for entry in entries {
                let line = serde_json::to_string(entry)
                    .map_err(|e| EngineError::Storage(format!("serialize entry: {e}")))?;
                writeln!(file, "{line}")
                    .map_err(|e| EngineError::Storage(format!("write {}: {e}", tmp.display())))?;
            }
        }
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| EngineError::Storage(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }
}

impl HistoryStore for JsonlHistory {
    fn append(&self, entries: Vec<HistoryEntry>) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EngineError::Storage(format!("open {}: {e}", self.path.display())))?;
        for entry in &entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| EngineError::Storage(format!("serialize entry: {e}")))?;
            writeln!(file, "{line}")
                .map_err(|e| EngineError::Storage(format!("append {}: {e}", self.path.display())))?;
        }
        inner.entries.extend(entries);
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.inner.lock().entries.clone())
    }

    fn compact(&self, cutoff: DateTime<Utc>, bucket: Duration) -> Result<usize> {
        let mut inner = self.inner.lock();
        let (kept, removed) = compact_entries(&inner.entries, cutoff, bucket);
        self.rewrite(&kept)?;
        inner.entries = kept;
        Ok(removed)
    }
}
