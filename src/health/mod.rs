//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     ConfigReconciler::apply
//!     → update_tracked_clusters (start / replace / stop probers)
//!     → prober.rs: one loop per destination, interval timer
//!     → shared semaphore permit → transport.rs probe
//!     → DestinationState Active = Healthy | Unhealthy
//!
//! Passive health checks (passive.rs):
//!     Request outcome observed by the forwarder
//!     → Increment failure count
//!     → Passive = Unhealthy once threshold reached
//!     → Reactivation timer → Passive = Unknown
//!
//! Either write republishes the destination's health slot, which
//! recomputes the owning cluster's available destinations.
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - No smoothing on the active side: one failed probe is enough
//! - Health state is per-destination, not per-cluster

pub mod active;
pub mod passive;
pub mod prober;
pub mod transport;

pub use active::ActiveHealthCheckMonitor;
pub use passive::{PassiveHealthObserver, RequestOutcome};
pub use transport::{HttpProbeTransport, ProbeOutcome, ProbeRequest, ProbeTransport};
