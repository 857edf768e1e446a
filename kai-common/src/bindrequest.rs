//! The `BindRequest` CRD (spec §3 / §4.5): the scheduler-to-binder
//! handoff. New relative to the teacher, whose scheduler writes the
//! assignment straight back into its store (`XlineStore::insert_pod_yaml`)
//! with no intermediate object or state machine.

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindRequestPhase {
    Pending,
    Binding,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceivedResourceType {
    Regular,
    Fraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReceivedGpu {
    pub count: u32,
    pub portion: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceClaimAllocation {
    pub claim_name: String,
    pub driver: String,
    pub pool: String,
    pub device: String,
    pub request: String,
    /// DRA `shareable: true` on the underlying device (spec §4.4): a
    /// shareable device's claim may be reserved by more than one pod; a
    /// non-shareable one may only ever have a single reserver.
    pub shareable: bool,
}

#[derive(Debug, Clone)]
pub struct BindRequest {
    pub pod_name: String,
    pub namespace: String,
    pub selected_node: String,
    pub selected_gpu_groups: Vec<String>,
    pub received_resource_type: ReceivedResourceType,
    pub received_gpu: ReceivedGpu,
    pub resource_claim_allocations: Vec<ResourceClaimAllocation>,
    pub phase: BindRequestPhase,
    pub reason: String,
    pub message: String,
    pub created_at: Instant,
}

impl BindRequest {
    pub fn new(pod_name: impl Into<String>, namespace: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            pod_name: pod_name.into(),
            namespace: namespace.into(),
            selected_node: node.into(),
            selected_gpu_groups: Vec::new(),
            received_resource_type: ReceivedResourceType::Regular,
            received_gpu: ReceivedGpu::default(),
            resource_claim_allocations: Vec::new(),
            phase: BindRequestPhase::Pending,
            reason: String::new(),
            message: String::new(),
            created_at: Instant::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            BindRequestPhase::Succeeded | BindRequestPhase::Failed
        )
    }

    /// Spec §4.5 / §4.1: a BindRequest non-terminal for longer than the
    /// configured allocation timeout is treated as failed for planning.
    pub fn is_stale(&self, timeout: std::time::Duration) -> bool {
        !self.is_terminal() && self.created_at.elapsed() > timeout
    }

    pub fn fail(&mut self, reason: impl Into<String>, message: impl Into<String>) {
        self.phase = BindRequestPhase::Failed;
        self.reason = reason.into();
        self.message = message.into();
    }

    pub fn succeed(&mut self) {
        self.phase = BindRequestPhase::Succeeded;
    }
}
