//! Upload registry
//!
//! In-process stand-in for the upload/storage collaborator: holds registered
//! datasets and models, per-model baselines, and the reports derived from
//! them. Injected into the analyzers rather than reached as a global.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use polars::prelude::DataFrame;
use uuid::Uuid;

use crate::dataset::{DatasetRecord, DatasetSummary};
use crate::drift::DriftReport;
use crate::error::{EngineError, Result};
use crate::evaluate::EvaluationReport;
use crate::model::{Baseline, ModelArtifact, ModelRecord, ModelSummary, Predictor};

#[derive(Default)]
pub struct UploadRegistry {
    datasets: RwLock<HashMap<String, Arc<DatasetRecord>>>,
    models: RwLock<HashMap<String, Arc<ModelRecord>>>,
    baselines: RwLock<HashMap<String, Baseline>>,
    drift_reports: RwLock<Vec<DriftReport>>,
    evaluations: RwLock<Vec<EvaluationReport>>,
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()[..8].to_string()
    }

    // ------------------------------------------------------------------
    // Datasets
    // ------------------------------------------------------------------

    pub fn register_dataset(
        &self,
        name: String,
        owner: String,
        frame: DataFrame,
    ) -> Result<Arc<DatasetRecord>> {
        if frame.height() == 0 {
            return Err(EngineError::validation("dataset has no rows"));
        }
        let id = Self::generate_id();
        let record = Arc::new(DatasetRecord::new(id.clone(), name, owner, frame));
        self.datasets.write().insert(id, Arc::clone(&record));
        Ok(record)
    }

    pub fn dataset(&self, id: &str) -> Result<Arc<DatasetRecord>> {
        self.datasets
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("dataset '{id}'")))
    }

    pub fn list_datasets(&self) -> Vec<DatasetSummary> {
        let mut summaries: Vec<DatasetSummary> =
            self.datasets.read().values().map(|d| d.summary()).collect();
        summaries.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        summaries
    }

    /// Delete a dataset.
    ///
    /// Fails with `Conflict` while any drift report uses it as the reference
    /// side; reports that used it as the current side are purged along with
    /// its evaluations.
    pub fn delete_dataset(&self, id: &str) -> Result<()> {
        let mut datasets = self.datasets.write();
        if !datasets.contains_key(id) {
            return Err(EngineError::NotFound(format!("dataset '{id}'")));
        }

        let mut drift_reports = self.drift_reports.write();
        if drift_reports.iter().any(|r| r.reference_dataset_id == id) {
            return Err(EngineError::Conflict(format!(
                "dataset '{id}' is the reference of existing drift reports"
            )));
        }

        drift_reports.retain(|r| r.current_dataset_id != id);
        self.evaluations.write().retain(|e| e.dataset_id != id);
        datasets.remove(id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Models & baselines
    // ------------------------------------------------------------------

    pub fn register_model(
        &self,
        owner: String,
        artifact: &ModelArtifact,
        predictor: Arc<dyn Predictor>,
    ) -> Arc<ModelRecord> {
        let id = Self::generate_id();
        let record = Arc::new(ModelRecord::new(
            id.clone(),
            artifact.name.clone(),
            owner,
            artifact.framework.clone(),
            artifact.task_type,
            predictor,
        ));
        self.models.write().insert(id, Arc::clone(&record));
        record
    }

    pub fn model(&self, id: &str) -> Result<Arc<ModelRecord>> {
        self.models
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("model '{id}'")))
    }

    pub fn list_models(&self) -> Vec<ModelSummary> {
        // Lock order is models before baselines everywhere baselines are
        // touched; see install_baseline_if_absent.
        let models = self.models.read();
        let baselines = self.baselines.read();
        let mut summaries: Vec<ModelSummary> = models
            .values()
            .map(|m| m.summary(baselines.contains_key(&m.id)))
            .collect();
        summaries.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        summaries
    }

    pub fn delete_model(&self, id: &str) -> Result<()> {
        let mut models = self.models.write();
        if models.remove(id).is_none() {
            return Err(EngineError::NotFound(format!("model '{id}'")));
        }
        self.baselines.write().remove(id);
        self.evaluations.write().retain(|e| e.model_id != id);
        Ok(())
    }

    pub fn baseline(&self, model_id: &str) -> Option<Baseline> {
        self.baselines.read().get(model_id).cloned()
    }

    /// Install a baseline only if the model has none yet.
    ///
    /// Returns the pre-existing baseline when one was already installed, so a
    /// racing first evaluation can still compare against it. This is what
    /// keeps baseline attachment monotonic.
    pub fn install_baseline_if_absent(
        &self,
        model_id: &str,
        baseline: Baseline,
    ) -> Result<Option<Baseline>> {
        if !self.models.read().contains_key(model_id) {
            return Err(EngineError::NotFound(format!("model '{model_id}'")));
        }
        let mut baselines = self.baselines.write();
        if let Some(existing) = baselines.get(model_id) {
            return Ok(Some(existing.clone()));
        }
        baselines.insert(model_id.to_string(), baseline);
        Ok(None)
    }

    /// Explicit baseline replacement; never happens implicitly.
    pub fn replace_baseline(&self, model_id: &str, baseline: Baseline) -> Result<()> {
        if !self.models.read().contains_key(model_id) {
            return Err(EngineError::NotFound(format!("model '{model_id}'")));
        }
        self.baselines.write().insert(model_id.to_string(), baseline);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Persisted reports
    // ------------------------------------------------------------------

    pub fn insert_drift_report(&self, report: DriftReport) {
        self.drift_reports.write().push(report);
    }

    pub fn insert_evaluation(&self, report: EvaluationReport) {
        self.evaluations.write().push(report);
    }

    pub fn drift_report_count(&self) -> usize {
        self.drift_reports.read().len()
    }

    pub fn evaluation_count(&self) -> usize {
        self.evaluations.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn frame() -> DataFrame {
        df!["x" => [1.0, 2.0, 3.0]].unwrap()
    }

    fn dummy_report(id: &str, reference: &str, current: &str) -> DriftReport {
        DriftReport {
            id: id.to_string(),
            reference_dataset_id: reference.to_string(),
            current_dataset_id: current.to_string(),
            reference_dataset: "ref.csv".into(),
            current_dataset: "cur.csv".into(),
            results: Vec::new(),
            skipped: Vec::new(),
            avg_wasserstein: None,
            total_features: 0,
            features_with_drift: 0,
            sample_seed: None,
            computed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_register_and_lookup_dataset() {
        let registry = UploadRegistry::new();
        let record = registry
            .register_dataset("a.csv".into(), "tester".into(), frame())
            .unwrap();
        assert_eq!(registry.dataset(&record.id).unwrap().name, "a.csv");
        assert!(registry.dataset("nope").is_err());
        assert_eq!(registry.list_datasets().len(), 1);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let registry = UploadRegistry::new();
        let empty = DataFrame::empty();
        assert!(registry
            .register_dataset("a.csv".into(), "tester".into(), empty)
            .is_err());
    }

    #[test]
    fn test_delete_dataset_conflict_on_reference() {
        let registry = UploadRegistry::new();
        let a = registry
            .register_dataset("a.csv".into(), "tester".into(), frame())
            .unwrap();
        let b = registry
            .register_dataset("b.csv".into(), "tester".into(), frame())
            .unwrap();
        registry.insert_drift_report(dummy_report("r1", &a.id, &b.id));

        // Reference side is protected, current side is purged.
        assert!(matches!(
            registry.delete_dataset(&a.id),
            Err(EngineError::Conflict(_))
        ));
        registry.delete_dataset(&b.id).unwrap();
        assert_eq!(registry.drift_report_count(), 0);
        // With its dependent report gone, the reference can be deleted.
        registry.delete_dataset(&a.id).unwrap();
    }

    #[test]
    fn test_baseline_is_monotonic() {
        use crate::metrics::{ModelMetrics, TaskType};
        use crate::model::{LinearModel, ModelArtifact};

        let registry = UploadRegistry::new();
        let artifact = ModelArtifact {
            name: "m".into(),
            framework: "linear".into(),
            task_type: TaskType::Classification,
            weights: HashMap::new(),
            intercept: 0.0,
        };
        let model = registry.register_model(
            "tester".into(),
            &artifact,
            Arc::new(LinearModel::from_artifact(&artifact)),
        );

        let baseline = |accuracy: f64| Baseline {
            metrics: ModelMetrics::Classification {
                accuracy,
                precision: accuracy,
                recall: accuracy,
                f1_score: accuracy,
            },
            dataset_id: "d".into(),
            created_at: chrono::Utc::now(),
        };

        assert!(registry
            .install_baseline_if_absent(&model.id, baseline(0.9))
            .unwrap()
            .is_none());
        // Second install reports the existing baseline and does not replace.
        let existing = registry
            .install_baseline_if_absent(&model.id, baseline(0.5))
            .unwrap()
            .unwrap();
        assert_eq!(existing.metrics.primary(), 0.9);

        registry.replace_baseline(&model.id, baseline(0.5)).unwrap();
        assert_eq!(registry.baseline(&model.id).unwrap().metrics.primary(), 0.5);
    }

    #[test]
    fn test_concurrent_listing_installs_and_registrations() {
        use crate::metrics::{ModelMetrics, TaskType};
        use crate::model::{LinearModel, ModelArtifact};

        fn baseline() -> Baseline {
            Baseline {
                metrics: ModelMetrics::Classification {
                    accuracy: 0.9,
                    precision: 0.9,
                    recall: 0.9,
                    f1_score: 0.9,
                },
                dataset_id: "d".into(),
                created_at: chrono::Utc::now(),
            }
        }

        let registry = Arc::new(UploadRegistry::new());
        let artifact = ModelArtifact {
            name: "m".into(),
            framework: "linear".into(),
            task_type: TaskType::Classification,
            weights: HashMap::new(),
            intercept: 0.0,
        };
        let model_id = registry
            .register_model(
                "tester".into(),
                &artifact,
                Arc::new(LinearModel::from_artifact(&artifact)),
            )
            .id
            .clone();

        // Listing, baseline writes, and registrations race each other; all
        // must complete because every path takes models before baselines.
        let lister = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    registry.list_models();
                }
            })
        };
        let installer = {
            let registry = Arc::clone(&registry);
            let model_id = model_id.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    registry.replace_baseline(&model_id, baseline()).unwrap();
                }
            })
        };
        let registrar = {
            let registry = Arc::clone(&registry);
            let artifact = artifact.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    registry.register_model(
                        "tester".into(),
                        &artifact,
                        Arc::new(LinearModel::from_artifact(&artifact)),
                    );
                }
            })
        };

        lister.join().unwrap();
        installer.join().unwrap();
        registrar.join().unwrap();
        assert!(registry.baseline(&model_id).is_some());
        assert_eq!(registry.list_models().len(), 201);
    }
}
