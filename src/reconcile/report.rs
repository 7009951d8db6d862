//! Error reporting for reconciliation.
//!
//! # Responsibilities
//! - Define the sink every per-item problem is reported to
//! - Provide logging and collecting sinks
//!
//! # Design Decisions
//! - Reporting never fails and never changes control flow
//! - `code` is a stable identifier; `message` is for humans

use std::sync::Mutex;

use serde::Serialize;

/// Sink for per-item configuration problems.
pub trait ErrorReporter: Send + Sync {
    fn report_error(&self, code: &str, item_id: &str, message: &str);
}

impl<F> ErrorReporter for F
where
    F: Fn(&str, &str, &str) + Send + Sync,
{
    fn report_error(&self, code: &str, item_id: &str, message: &str) {
        self(code, item_id, message)
    }
}

/// Writes every error to the log at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorReporter;

impl ErrorReporter for LoggingErrorReporter {
    fn report_error(&self, code: &str, item_id: &str, message: &str) {
        tracing::warn!(code = %code, item_id = %item_id, "{}", message);
    }
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedError {
    pub code: String,
    pub item_id: String,
    pub message: String,
}

/// Keeps every reported error in memory.
#[derive(Debug, Default)]
pub struct CollectingErrorReporter {
    errors: Mutex<Vec<ReportedError>>,
}

impl CollectingErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far.
    pub fn errors(&self) -> Vec<ReportedError> {
        self.errors.lock().expect("error reporter mutex poisoned").clone()
    }

    /// Codes reported so far, in order.
    pub fn codes(&self) -> Vec<String> {
        self.errors().into_iter().map(|e| e.code).collect()
    }

    /// Drain everything reported so far.
    pub fn take(&self) -> Vec<ReportedError> {
        std::mem::take(&mut *self.errors.lock().expect("error reporter mutex poisoned"))
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().expect("error reporter mutex poisoned").is_empty()
    }
}

impl ErrorReporter for CollectingErrorReporter {
    fn report_error(&self, code: &str, item_id: &str, message: &str) {
        self.errors
            .lock()
            .expect("error reporter mutex poisoned")
            .push(ReportedError {
                code: code.to_string(),
                item_id: item_id.to_string(),
                message: message.to_string(),
            });
    }
}

/// Problems found while applying a structurally valid snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("route '{route_id}' references unknown cluster '{cluster_id}'")]
    UnresolvedClusterReference { route_id: String, cluster_id: String },
}

impl ReconcileError {
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::UnresolvedClusterReference { .. } => "UnresolvedClusterReference",
        }
    }

    pub fn item_id(&self) -> String {
        match self {
            ReconcileError::UnresolvedClusterReference { route_id, .. } => route_id.clone(),
        }
    }
}
