//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::EngineError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message, available_columns) = match self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ServerError::Engine(engine) => match engine {
                EngineError::NotFound(what) => {
                    (StatusCode::NOT_FOUND, format!("{what} not found"), None)
                }
                EngineError::Validation {
                    message,
                    available_columns,
                } => (StatusCode::BAD_REQUEST, message, available_columns),
                err @ (EngineError::EmptyColumn(_)
                | EngineError::InsufficientData(_)
                | EngineError::Computation(_)) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string(), None)
                }
                EngineError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
                EngineError::Storage(msg) => {
                    tracing::error!(detail = %msg, "Storage error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "A storage error occurred".to_string(),
                        None,
                    )
                }
                EngineError::Cancelled => (
                    // Nginx convention for client-closed requests.
                    StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                    "operation cancelled".to_string(),
                    None,
                ),
                EngineError::Io(e) => {
                    tracing::error!(detail = %e, "IO error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "A file system error occurred".to_string(),
                        None,
                    )
                }
                EngineError::Polars(e) => {
                    let msg = e.to_string();
                    // Only expose safe parts of Polars errors
                    let safe_msg = if msg.contains("not found") || msg.contains("column") {
                        msg
                    } else {
                        "Data processing error. Check your data format.".to_string()
                    };
                    (StatusCode::BAD_REQUEST, safe_msg, None)
                }
                EngineError::Json(_) => {
                    (StatusCode::BAD_REQUEST, "Invalid JSON format".to_string(), None)
                }
            },
            ServerError::Io(e) => {
                tracing::error!(detail = %e, "IO error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A file system error occurred".to_string(),
                    None,
                )
            }
            ServerError::Polars(e) => {
                let msg = e.to_string();
                let safe_msg = if msg.contains("not found") || msg.contains("column") {
                    msg
                } else {
                    "Data processing error. Check your data format.".to_string()
                };
                (StatusCode::BAD_REQUEST, safe_msg, None)
            }
            ServerError::Json(_) => {
                (StatusCode::BAD_REQUEST, "Invalid JSON format".to_string(), None)
            }
        };

        let mut body = json!({
            "error": true,
            "message": message,
        });
        if let Some(columns) = available_columns {
            body["available_columns"] = json!(columns);
        }

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
