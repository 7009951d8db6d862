//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Init logging/metrics → Build reconciler
//!     → Apply initial snapshot → Start watcher → Start admin API
//!
//! Running:
//!     Config file change → reload → apply
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop admin API → Stop passive observer
//!     → Stop every prober (awaited) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Fail fast: a config that cannot be loaded at startup is fatal; a bad
//!   reload is not

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_reconciler, run, StartupError};
