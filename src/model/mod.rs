//! Runtime entity model.
//!
//! # Data Flow
//! ```text
//! ConfigReconciler
//!     → creates/removes ClusterState, DestinationState, RouteState
//!     → publishes new config values through AtomicSlot
//!
//! Prober / passive observer
//!     → DestinationState.health (AtomicSlot)
//!     → on_change → ClusterState.update_dynamic_state()
//!
//! Request path
//!     → ClusterState.dynamic_state() (lock-free read)
//!     → load balancing policy picks a DestinationState
//! ```
//!
//! # Design Decisions
//! - Every value the request path reads sits behind an `AtomicSlot`;
//!   published values are never mutated in place
//! - No cross-slot atomicity: a new cluster config may be visible before
//!   the dynamic state derived from it
//! - Non-owning components look entities up by id and must tolerate them
//!   disappearing between reads

pub mod atomic_slot;
pub mod cluster;
pub mod counter;
pub mod destination;
pub mod route;

pub use atomic_slot::{AtomicSlot, SlotSnapshot};
pub use cluster::{ClusterDynamicState, ClusterState};
pub use counter::AtomicCounter;
pub use destination::{DestinationHealthState, DestinationState, HealthStatus, RequestGuard};
pub use route::RouteState;
