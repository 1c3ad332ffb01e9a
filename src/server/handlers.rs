//! API request handlers

use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use chrono::{Duration, Utc};
use polars::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::history::{HistoryKind, HistoryStore};
use crate::metrics::TaskType;
use crate::model::{LinearModel, ModelArtifact};

use super::{error::Result, state::AppState, ServerError};

const DEFAULT_OWNER: &str = "anonymous";
const DEFAULT_HISTORY_DAYS: i64 = 30;

// ============================================================================
// Upload handlers
// ============================================================================

pub async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let mut owner = DEFAULT_OWNER.to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let field_name = field.name().unwrap_or("file").to_string();
        if field_name == "owner" {
            owner = field
                .text()
                .await
                .map_err(|e| ServerError::BadRequest(e.to_string()))?;
            continue;
        }

        let file_name = field.file_name().unwrap_or("data.csv").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(e.to_string()))?;

        info!(file = %file_name, bytes = data.len(), "Received dataset upload");

        let df = if file_name.ends_with(".csv") {
            CsvReadOptions::default()
                .with_infer_schema_length(Some(1000))
                .with_has_header(true)
                .into_reader_with_file_handle(Cursor::new(&data))
                .finish()?
        } else if file_name.ends_with(".json") {
            JsonReader::new(Cursor::new(&data)).finish()?
        } else {
            return Err(ServerError::BadRequest(
                "Unsupported file format. Use CSV or JSON.".to_string(),
            ));
        };

        let record = state.registry.register_dataset(file_name, owner, df)?;
        return Ok(Json(json!({
            "success": true,
            "dataset": record.summary(),
        })));
    }

    Err(ServerError::BadRequest("No file uploaded".to_string()))
}

pub async fn list_datasets(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "datasets": state.registry.list_datasets() }))
}

pub async fn delete_dataset(
    State(state): State<Arc<AppState>>,
    Path(dataset_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.registry.delete_dataset(&dataset_id)?;
    Ok(Json(json!({ "success": true, "deleted": dataset_id })))
}

#[derive(Deserialize)]
pub struct UploadModelRequest {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(flatten)]
    pub artifact: ModelArtifact,
}

pub async fn upload_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadModelRequest>,
) -> Result<Json<serde_json::Value>> {
    let owner = request.owner.unwrap_or_else(|| DEFAULT_OWNER.to_string());
    let predictor = Arc::new(LinearModel::from_artifact(&request.artifact));
    let record = state.registry.register_model(owner, &request.artifact, predictor);

    info!(model = %record.id, name = %record.name, "Model registered");
    Ok(Json(json!({
        "success": true,
        "model": record.summary(false),
    })))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "models": state.registry.list_models() }))
}

pub async fn delete_model(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.registry.delete_model(&model_id)?;
    Ok(Json(json!({ "success": true, "deleted": model_id })))
}

// ============================================================================
// Drift analysis
// ============================================================================

#[derive(Deserialize)]
pub struct AnalyzeDriftRequest {
    pub reference_dataset_id: String,
    pub current_dataset_id: String,
}

pub async fn analyze_drift(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeDriftRequest>,
) -> Result<Json<serde_json::Value>> {
    let token = CancelToken::new();
    let report = state.analyzer.analyze(
        &request.reference_dataset_id,
        &request.current_dataset_id,
        &token,
    )?;

    state.registry.insert_drift_report(report.clone());
    state.alerts.classify_drift(&report);

    let history_recorded = match state.history.record_drift(&report) {
        Ok(_) => true,
        Err(err) => {
            warn!(report = %report.id, error = %err, "History write failed, retrying in background");
            let report = report.clone();
            retry_history(Arc::clone(&state.history), move |h| {
                h.record_drift(&report).map(|_| ())
            });
            false
        }
    };

    let mut body = serde_json::to_value(&report)?;
    body["history_recorded"] = json!(history_recorded);
    Ok(Json(body))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub days: Option<i64>,
}

pub async fn drift_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>> {
    let since = Utc::now() - Duration::days(query.days.unwrap_or(DEFAULT_HISTORY_DAYS));
    let history = state.history.query_grouped(HistoryKind::DataDrift, since)?;
    Ok(Json(json!({ "history": history })))
}

pub async fn drift_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>> {
    let since = Utc::now() - Duration::days(query.days.unwrap_or(DEFAULT_HISTORY_DAYS));
    let summary = state.history.summarize(HistoryKind::DataDrift, since)?;
    Ok(Json(json!({ "summary": summary })))
}

// ============================================================================
// Model performance drift
// ============================================================================

#[derive(Deserialize)]
pub struct EvaluateRequest {
    pub model_id: String,
    pub dataset_id: String,
    pub target_column: String,
    pub task_type: TaskType,
}

pub async fn evaluate_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<serde_json::Value>> {
    let token = CancelToken::new();
    let report = state.evaluator.evaluate(
        &request.model_id,
        &request.dataset_id,
        &request.target_column,
        request.task_type,
        &token,
    )?;

    state.registry.insert_evaluation(report.clone());
    state.alerts.classify_evaluation(&report);

    let history_recorded = match state.history.record_evaluation(&report) {
        Ok(_) => true,
        Err(err) => {
            warn!(report = %report.id, error = %err, "History write failed, retrying in background");
            let report = report.clone();
            retry_history(Arc::clone(&state.history), move |h| {
                h.record_evaluation(&report).map(|_| ())
            });
            false
        }
    };

    let mut body = serde_json::to_value(&report)?;
    body["history_recorded"] = json!(history_recorded);
    Ok(Json(body))
}

#[derive(Deserialize)]
pub struct CompareRequest {
    pub model_ids: Vec<String>,
    pub dataset_id: String,
    pub target_column: String,
    pub task_type: TaskType,
}

pub async fn compare_models(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<serde_json::Value>> {
    let token = CancelToken::new();
    let entries = state.evaluator.compare(
        &request.model_ids,
        &request.dataset_id,
        &request.target_column,
        request.task_type,
        &token,
    )?;
    Ok(Json(json!({ "comparison": entries })))
}

pub async fn model_drift_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>> {
    let since = Utc::now() - Duration::days(query.days.unwrap_or(DEFAULT_HISTORY_DAYS));
    let history = state.history.query_grouped(HistoryKind::Performance, since)?;
    Ok(Json(json!({ "history": history })))
}

#[derive(Deserialize)]
pub struct RebaselineRequest {
    pub model_id: String,
    pub dataset_id: String,
    pub target_column: String,
}

pub async fn set_baseline(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RebaselineRequest>,
) -> Result<Json<serde_json::Value>> {
    let token = CancelToken::new();
    let baseline = state.evaluator.rebaseline(
        &request.model_id,
        &request.dataset_id,
        &request.target_column,
        &token,
    )?;
    Ok(Json(json!({
        "success": true,
        "model_id": request.model_id,
        "baseline": baseline,
    })))
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub include_acknowledged: bool,
}

pub async fn get_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> Json<serde_json::Value> {
    let mut alerts = state.alerts.feed();
    if !query.include_acknowledged {
        alerts.retain(|a| !a.acknowledged);
    }
    Json(json!({ "alerts": alerts }))
}

pub async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(alert_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let alert = state.alerts.acknowledge(&alert_id)?;
    Ok(Json(json!({ "success": true, "alert": alert })))
}

// ============================================================================
// System
// ============================================================================

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// History retry
// ============================================================================

const HISTORY_RETRY_ATTEMPTS: u32 = 3;

/// Bounded background retry for a failed history write. The report itself was
/// already returned to the caller with `history_recorded: false`.
fn retry_history<F>(history: Arc<dyn HistoryStore>, write: F)
where
    F: Fn(&dyn HistoryStore) -> crate::error::Result<()> + Send + 'static,
{
    tokio::spawn(async move {
        for attempt in 1..=HISTORY_RETRY_ATTEMPTS {
            tokio::time::sleep(std::time::Duration::from_secs(2u64.pow(attempt))).await;
            match write(history.as_ref()) {
                Ok(()) => {
                    info!(attempt, "History write retry succeeded");
                    return;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "History write retry failed");
                }
            }
        }
    });
}
