//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & check process settings)
//!     → ProxyConfig::snapshot() (immutable ConfigSnapshot)
//!     → ConfigReconciler::apply
//!         → validation.rs (per-item structural checks)
//!         → runtime model updated item by item
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → sent over mpsc to the startup loop
//!     → applied like the initial snapshot
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; changes require a new snapshot
//! - All fields have defaults to allow minimal configs
//! - Validation is per item: a bad cluster never blocks a good one

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ActiveHealthCheckConfig, AdminConfig, ClusterConfig, ConfigSnapshot, DestinationConfig,
    HealthCheckConfig, HealthProbeConfig, ObservabilityConfig, PassiveHealthCheckConfig,
    ProxyConfig, RouteConfig, RouteMatch,
};
pub use validation::{validate_snapshot, ValidationError, ValidationReport};
