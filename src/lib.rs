//! Reverse proxy runtime core library.

pub mod admin;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod model;
pub mod observability;
pub mod reconcile;
pub mod routing;

pub use config::schema::{ConfigSnapshot, ProxyConfig};
pub use lifecycle::Shutdown;
pub use reconcile::ConfigReconciler;
