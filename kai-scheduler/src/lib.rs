//! The scheduling engine: cache/snapshot (C1), fair-share (C2), the
//! action pipeline and scenario solvers (C3), layered on the plugin
//! framework in `plugins` (which also carries the GPU/DRA accounting
//! plugins, C4).

pub mod actions;
pub mod cache;
pub mod cycle_state;
pub mod fairshare;
pub mod plugins;
pub mod session;
pub mod solver;
pub mod statement;

pub use cache::{Cache, ClusterInfo};
pub use fairshare::{compute_fair_share, AllocationStatus, QueueFairShare};
pub use session::Session;
pub use statement::Statement;
