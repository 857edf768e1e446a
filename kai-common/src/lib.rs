//! Shared data model for the KAI scheduler core.
//!
//! Every CRD-shaped type the scheduler and binder crates exchange lives
//! here so neither has to guess at the other's field names. Nothing in
//! this crate talks to a Kubernetes API server: callers own translating
//! real CRDs into these types.

pub mod bindrequest;
pub mod config;
pub mod error;
pub mod gpu_group;
pub mod node;
pub mod podgroup;
pub mod queue;
pub mod resources;
pub mod task;
pub mod taint;
pub mod topology;

pub use bindrequest::{
    BindRequest, BindRequestPhase, ReceivedGpu, ReceivedResourceType, ResourceClaimAllocation,
};
pub use config::{BinderConfig, SchedulerConfig};
pub use error::SchedulerError;
pub use gpu_group::{reservation_pod_should_exist, GpuGroupRegistry};
pub use node::{
    Affinity, GpuDevice, GpuInventory, NodeAffinity, NodeInfo, NodeSelector, NodeSelectorOperator,
    NodeSelectorRequirement, NodeSelectorTerm, NodeSpec, PodAffinityTerm, PreferredSchedulingTerm,
    PreferredSchedulingTerms,
};
pub use podgroup::{PodGroup, PodGroupStatus, SubGroup, TopologyConstraint, ROOT_SUBGROUP};
pub use queue::{Preemptibility, Queue, QueueResources, QueueStatus};
pub use resources::{Quantity, QuotaResources, ResourceName, Resources};
pub use task::{
    DraClaimRef, GpuDemand, PodSpec, QueuedInfo, ResourceClaimInfo, Task, TaskPhase,
};
pub use taint::{Taint, TaintEffect, TaintKey, Toleration, TolerationOperator};
pub use topology::{Topology, TopologyLevel, HOSTNAME_LABEL};
