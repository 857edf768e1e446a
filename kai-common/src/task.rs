//! The pod-as-scheduled-unit type (spec §3 "Pod / Task"), generalized
//! from `libscheduler::models::{PodInfo, PodSpec, QueuedInfo}`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::node::{Affinity, NodeInfo};
use crate::resources::Resources;
use crate::taint::Toleration;

/// Spec §3: "Pod / Task ... scheduling state is one of ...".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPhase {
    Pending,
    Allocated,
    Pipelined,
    Binding,
    Bound,
    Running,
    Releasing,
    Succeeded,
    Failed,
}

/// Spec §4.4 "Demand classes": a pod expresses GPU demand via exactly one
/// of these. `Whole` and `Mig` are `Regular`; `Fraction` and `Memory` are
/// `Fraction`-class; `Dra` is accounted separately by the dynamic-resources
/// plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GpuDemand {
    None,
    /// `nvidia.com/gpu = N`.
    Whole { count: u32 },
    /// `gpu-fraction=f` [, `gpu-fraction-num-devices=k`].
    Fraction { fraction: f64, num_devices: u32 },
    /// `gpu-memory=M` MiB.
    Memory { mib: u64 },
    /// `nvidia.com/mig-<profile> = N`.
    Mig { profile: String, count: u32 },
    /// One or more `PodResourceClaim` references.
    Dra { claims: Vec<DraClaimRef> },
}

impl GpuDemand {
    pub fn is_regular(&self) -> bool {
        matches!(self, GpuDemand::Whole { .. } | GpuDemand::Mig { .. })
    }

    pub fn is_fraction(&self) -> bool {
        matches!(self, GpuDemand::Fraction { .. } | GpuDemand::Memory { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraClaimRef {
    pub claim_name: String,
    pub device_class: String,
    /// Mirrors the `ResourceClaim`'s device `shareable` attribute (spec
    /// §4.4): whether more than one pod may reserve the same device.
    pub shareable: bool,
}

/// The proposed (or bound) outcome of a DRA claim allocation, cloned
/// verbatim into `Statement` journal entries so rollback is byte-identical
/// (spec §8 property 6).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceClaimInfo {
    pub claim_name: String,
    pub driver: String,
    pub pool: String,
    pub device: String,
    pub request: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodSpec {
    pub resources: Resources,
    pub priority: i64,
    pub scheduling_gates: Vec<String>,
    pub tolerations: Vec<Toleration>,
    pub node_name: Option<String>,
    pub node_selector: HashMap<String, String>,
    pub affinity: Option<Affinity>,
    pub gpu_demand: GpuDemand,
    pub preemptible: bool,
}

impl Default for GpuDemand {
    fn default() -> Self {
        GpuDemand::None
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueuedInfo {
    pub attempts: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Task {
    pub name: String,
    pub namespace: String,
    pub pod_group_name: String,
    pub subgroup_name: Option<String>,
    pub queue_name: String,
    pub spec: PodSpec,
    pub queued_info: QueuedInfo,
    pub phase: Option<TaskPhase>,
    pub scheduled_node: Option<String>,
    pub gpu_groups: Vec<String>,
    pub resource_claims: Vec<ResourceClaimInfo>,
    /// Wall-clock the task entered `Running`, used by the `reclaim-min-runtime`
    /// grace period (spec §4.2) and the min-runtime plugin.
    pub running_since: Option<std::time::Instant>,
    /// Node a prior preemption cycle nominated for this task, carried so a
    /// later cycle can try it first (spec §4.3 built-ins: `nominated-node`).
    pub nominated_node_name: Option<String>,
}

impl Task {
    pub fn is_scheduled(&self) -> bool {
        self.scheduled_node.is_some()
    }

    /// `true` once a later, strictly-higher-priority, non-preemptible
    /// reclaimer is the only kind of queue allowed to touch this pod
    /// (spec §4.2 "Non-preemption threshold").
    pub fn is_preemptible(&self) -> bool {
        self.spec.preemptible
    }

    pub fn fits_on(&self, node: &NodeInfo) -> bool {
        self.spec.resources.fits_within(&node.idle())
    }
}
