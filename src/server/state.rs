//! Application state management

use std::sync::Arc;

use crate::alerts::AlertClassifier;
use crate::drift::DriftAnalyzer;
use crate::evaluate::PerformanceEvaluator;
use crate::history::{HistoryStore, JsonlHistory, MemoryHistory};
use crate::registry::UploadRegistry;

use super::ServerConfig;

/// Application state shared across handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<UploadRegistry>,
    pub history: Arc<dyn HistoryStore>,
    pub alerts: AlertClassifier,
    pub analyzer: DriftAnalyzer,
    pub evaluator: PerformanceEvaluator,
}

impl AppState {
    /// Build state with the configured history backend; a missing history
    /// path selects the in-memory store.
    pub fn new(config: ServerConfig) -> crate::error::Result<Self> {
        let history: Arc<dyn HistoryStore> = match &config.history_path {
            Some(path) => Arc::new(JsonlHistory::open(path.clone())?),
            None => Arc::new(MemoryHistory::new()),
        };
        Ok(Self::with_history(config, history))
    }

    pub fn with_history(config: ServerConfig, history: Arc<dyn HistoryStore>) -> Self {
        let registry = Arc::new(UploadRegistry::new());
        let analyzer = DriftAnalyzer::new(Arc::clone(&registry));
        let evaluator = PerformanceEvaluator::new(Arc::clone(&registry));
        Self {
            config,
            registry,
            history,
            alerts: AlertClassifier::new(),
            analyzer,
            evaluator,
        }
    }
}
