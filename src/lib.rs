//! Driftwatch - Drift and performance evaluation engine
//!
//! Backend engine for ML observability: compares feature distributions
//! between datasets, evaluates stored models against labelled data, tracks
//! both over time, and raises alerts when things move.
//!
//! # Modules
//!
//! ## Core engine
//! - [`stats`] - Statistical primitives (PSI, KS test, Wasserstein)
//! - [`metrics`] - Classification and regression metric evaluation
//! - [`drift`] - Per-feature drift analysis between dataset pairs
//! - [`evaluate`] - Model performance evaluation against baselines
//!
//! ## Records and state
//! - [`dataset`] - Dataset records with schema inspection
//! - [`model`] - Model records and the prediction seam
//! - [`registry`] - In-process store for datasets, models, and reports
//!
//! ## Observability
//! - [`history`] - Append-only history of drift and performance scores
//! - [`alerts`] - Severity-ranked alert classification
//!
//! ## Services
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

pub mod error;

// Core engine
pub mod stats;
pub mod metrics;
pub mod drift;
pub mod evaluate;

// Records and state
pub mod dataset;
pub mod model;
pub mod registry;

// Observability
pub mod history;
pub mod alerts;

// Services
pub mod server;
pub mod cli;

// Support
pub mod cancel;

pub use cancel::CancelToken;
pub use error::{EngineError, Result};
