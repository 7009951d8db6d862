//! Reconciliation subsystem.
//!
//! # Data Flow
//! ```text
//! ConfigSnapshot
//!     → validate_snapshot (per-item errors → ErrorReporter)
//!     → clusters: add / republish config / keep last-known-good
//!         → destinations: add / republish / replace on address change / remove
//!     → routes: resolve cluster id (unresolved → reported, kept unpublished)
//!     → recompute DynamicState of mutated clusters
//!     → DynamicEndpointTable::update (once, only if routes changed)
//!     → ActiveHealthCheckMonitor::update_tracked_clusters
//!     → drop removed clusters
//! ```
//!
//! # Design Decisions
//! - Partial failure: one bad item never blocks a good one
//! - Every publish replaces a whole immutable value

pub mod reconciler;
pub mod report;

pub use reconciler::ConfigReconciler;
pub use report::{
    CollectingErrorReporter, ErrorReporter, LoggingErrorReporter, ReconcileError, ReportedError,
};
