//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! ConfigReconciler (once per apply, only if routes changed)
//!     → RouteEndpoint per resolved route (matcher compiled here)
//!     → endpoint_table.rs publishes the list, fires old ChangeToken
//!
//! Serving layer
//!     → reads endpoints() + change_token()
//!     → rebuilds its dispatch structure when the token fires
//!     → find(RequestContext) for a first-match lookup
//! ```
//!
//! # Design Decisions
//! - Endpoint lists are immutable once published
//! - Deterministic: higher priority first, ties broken by route id
//! - Routes with an unresolved cluster never reach the table

pub mod endpoint;
pub mod endpoint_table;
pub mod matcher;

pub use endpoint::RouteEndpoint;
pub use endpoint_table::{ChangeToken, DynamicEndpointTable};
pub use matcher::RequestContext;
