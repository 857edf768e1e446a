//! Scheduler plugins.
//!
//! The plugin point names and trait shapes (`PreFilter`, `Filter`,
//! `PreScore`, `Score`, `Reserve`, `Permit`, `PreBind`, `Bind`,
//! `PostBind`, `EnqueueExtension`) generalize `libscheduler::plugins`
//! verbatim, retargeted from the teacher's flat `PodInfo`/`NodeInfo` to
//! `kai_common::{Task, NodeInfo}`. The action-level plugin kinds the
//! distilled spec names that the teacher's framework has no use for
//! (`TaskOrderFn`, `JobOrderFn`, `QueueOrderFn`, `GangSchedulingFn`,
//! `ReclaimableFn`, `PreemptableFn`, `AllocatableFn`) live in `ordering`.

use bitflags::bitflags;
use kai_common::{NodeInfo, Task};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cycle_state::CycleState;

pub mod balanced_allocation;
pub mod dynamic_resources;
pub mod elastic;
pub mod gpu_pack;
pub mod gpu_spread;
pub mod min_runtime;
pub mod node_affinity;
pub mod node_name;
pub mod node_resources_fit;
pub mod node_unschedulable;
pub mod nominated_node;
pub mod ordering;
pub mod pod_affinity;
pub mod proportion;
pub mod resource_type;
pub mod scheduling_gates;
pub mod snapshot;
pub mod taint_toleration;
pub mod task_order;
pub mod topology;

pub trait Plugin {
    fn name(&self) -> &str;
}

/// Plugin called before adding a task to the active queue. Should be
/// lightweight (no expensive external calls).
pub trait PreEnqueuePlugin: Plugin + Send + Sync {
    fn pre_enqueue(&self, task: &Task) -> Status;
}

pub struct ClusterEventWithHint {
    pub event: ClusterEvent,
    /// Signals whether the event can make a task, rejected in a past
    /// cycle, schedulable again. Called before a task moves from
    /// unschedulable back to backoff/active.
    pub queueing_hint_fn: Option<Box<dyn Fn(Task, EventInner) -> Result<QueueingHint, String> + Send + Sync>>,
}

pub struct ClusterEvent {
    pub resource: EventResource,
    pub action_type: ActionType,
}

bitflags! {
    pub struct ActionType: u32 {
        const Add = 1;
        const Delete = 1 << 1;
        const UpdateNodeLabel = 1 << 2;
        const UpdateNodeTaint = 1 << 3;
        const UpdatePodLabel = 1 << 4;
        const UpdatePodToleration = 1 << 5;
        const UpdateNodeAllocatable = 1 << 6;
    }
}

pub enum EventResource {
    Pod,
    Node,
}

/// In Kubernetes this carries `oldObj, newObj interface{}`; an enum keeps
/// us out of `Box<dyn Any>`.
#[derive(Debug, Clone)]
pub enum EventInner {
    Pod(Option<Task>, Option<Task>),
    Node(Option<NodeInfo>, NodeInfo),
}

pub enum QueueingHint {
    Skip,
    Queue,
}

pub trait EnqueueExtension: Plugin + Send + Sync {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint>;
}

pub struct PreFilterResult {
    pub node_names: Vec<String>,
}

pub trait PreFilterPlugin: Plugin + Send + Sync {
    /// Executes at scheduling cycle start. All plugins must return
    /// success or the task is rejected. May narrow the node set
    /// evaluated downstream. Skip bypasses the matching Filter.
    fn pre_filter(&self, state: &mut CycleState, task: &Task, nodes: &[NodeInfo]) -> (PreFilterResult, Status);
}

/// Evaluates whether a node can run a task. Returns Success,
/// Unschedulable, or Error.
pub trait FilterPlugin: Plugin + Send + Sync {
    fn filter(&self, state: &mut CycleState, task: &Task, node: &NodeInfo) -> Status;
}

#[derive(Clone, Default)]
pub struct NodeToStatus {
    node_to_status: HashMap<String, Status>,
}

impl NodeToStatus {
    pub fn insert(&mut self, node_name: String, status: Status) {
        self.node_to_status.insert(node_name, status);
    }

    pub fn get(&self, node_name: &str) -> Option<&Status> {
        self.node_to_status.get(node_name)
    }
}

/// Runs after every node has been rejected at Filter; may make the task
/// schedulable again (preemption, gang abandonment).
pub trait PostFilterPlugin: Plugin + Send + Sync {
    fn post_filter(&self, state: &mut CycleState, task: &Task, filtered: &NodeToStatus) -> Status;
}

/// Informational plugin called with the nodes that passed Filter.
pub trait PreScorePlugin: Plugin + Send + Sync {
    fn pre_score(&self, state: &mut CycleState, task: &Task, nodes: &[NodeInfo]) -> Status;
}

pub trait ScorePlugin: Plugin + Send + Sync {
    /// Higher is better. Must return success.
    fn score(&self, state: &mut CycleState, task: &Task, node: &NodeInfo) -> (i64, Status);

    fn score_extension(&self) -> Box<dyn ScoreExtension>;
}

pub trait ScoreExtension {
    fn normalize_score(&self, state: &CycleState, task: &Task, scores: &mut [i64]) -> Status;
}

pub struct DefaultNormalizeScore {
    pub max_score: i64,
    pub reverse: bool,
}

impl ScoreExtension for DefaultNormalizeScore {
    fn normalize_score(&self, _: &CycleState, _: &Task, scores: &mut [i64]) -> Status {
        let max = scores.iter().copied().fold(0_i64, i64::max);
        if max == 0 {
            if self.reverse {
                scores.iter_mut().for_each(|s| *s = self.max_score);
            }
            return Status::default();
        }
        for score in scores.iter_mut() {
            *score = self.max_score * (*score) / max;
        }
        Status::default()
    }
}

/// Manages bookkeeping when a task is tentatively reserved on a node.
pub trait ReservePlugin: Plugin + Send + Sync {
    /// On failure, Unreserve is called for every plugin that already
    /// reserved, so implementations must be idempotent to unreserve.
    fn reserve(&self, state: &mut CycleState, task: &Task, node_name: &str) -> Status;
    fn unreserve(&self, state: &mut CycleState, task: &Task, node_name: &str);
}

pub trait PreBindPlugin: Plugin + Send + Sync {
    fn pre_bind_pre_flight(&self, state: &mut CycleState, task: &Task, node_name: &str) -> Status;
    fn pre_bind(&self, state: &mut CycleState, task: &Task, node_name: &str) -> Status;
}

pub trait PostBindPlugin: Plugin + Send + Sync {
    fn post_bind(&self, state: &mut CycleState, task: &Task, node_name: &str);
}

/// May delay or block binding; used for gang-scheduling readiness.
pub trait PermitPlugin: Plugin + Send + Sync {
    fn permit(&self, state: &mut CycleState, task: &Task, node_name: &str) -> (Status, Duration);
}

pub trait BindPlugin: Plugin + Send + Sync {
    fn bind(&self, state: &mut CycleState, task: &Task, node_name: &str) -> Status;
}

#[derive(Clone)]
pub struct Status {
    pub code: Code,
    pub reasons: Vec<String>,
    pub err: String,
    pub plugin: String,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            code: Code::Success,
            reasons: vec![],
            err: String::new(),
            plugin: String::new(),
        }
    }
}

impl Status {
    pub fn new(code: Code, reasons: Vec<String>) -> Self {
        Status {
            code,
            reasons,
            err: String::new(),
            plugin: String::new(),
        }
    }

    pub fn error(error: &str) -> Self {
        Self {
            code: Code::Error,
            err: error.to_string(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.code, Code::Success | Code::Skip)
    }
}

/// The Status code/type returned from plugins.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Code {
    Success,
    /// Internal plugin error, not an expected scheduling failure.
    Error,
    /// A plugin found the task unschedulable; postFilter plugins
    /// (preemption) may still get it scheduled.
    Unschedulable,
    /// Unschedulable, and no postFilter plugin would change that.
    UnschedulableAndUnresolvable,
    /// A Permit plugin wants the task to wait.
    Wait,
    /// Bypass the coupled extension point for this task.
    Skip,
    /// Stop the cycle here without a backoff penalty.
    Pending,
}

/// Registry of all available plugins, composed once at session open
/// (spec §4.3), generalizing `libscheduler::plugins::Registry`.
#[derive(Clone, Default)]
pub struct Registry {
    pub pre_enqueue: Vec<Arc<dyn PreEnqueuePlugin>>,
    pub pre_filter: Vec<Arc<dyn PreFilterPlugin>>,
    pub filter: Vec<Arc<dyn FilterPlugin>>,
    pub post_filter: Vec<Arc<dyn PostFilterPlugin>>,
    pub pre_score: Vec<Arc<dyn PreScorePlugin>>,
    pub score: Vec<(Arc<dyn ScorePlugin>, i64)>,
    pub reserve: Vec<Arc<dyn ReservePlugin>>,
    pub permit: Vec<Arc<dyn PermitPlugin>>,
    pub pre_bind: Vec<Arc<dyn PreBindPlugin>>,
    pub bind: Vec<Arc<dyn BindPlugin>>,
    pub post_bind: Vec<Arc<dyn PostBindPlugin>>,
    pub enqueue_extensions: Vec<Arc<dyn EnqueueExtension>>,
    pub task_order: Vec<Arc<dyn ordering::TaskOrderFn>>,
    pub job_order: Vec<Arc<dyn ordering::JobOrderFn>>,
    pub queue_order: Vec<Arc<dyn ordering::QueueOrderFn>>,
    pub gang_scheduling: Vec<Arc<dyn ordering::GangSchedulingFn>>,
    pub reclaimable: Vec<Arc<dyn ordering::ReclaimableFn>>,
    pub preemptable: Vec<Arc<dyn ordering::PreemptableFn>>,
    pub allocatable: Vec<Arc<dyn ordering::AllocatableFn>>,
}

impl Registry {
    /// All Filter plugins must return success for `node`, or the first
    /// non-success short circuits.
    pub fn run_filters(&self, state: &mut CycleState, task: &Task, node: &NodeInfo) -> Status {
        for plugin in &self.filter {
            let status = plugin.filter(state, task, node);
            if !status.is_success() {
                return status;
            }
        }
        Status::default()
    }

    /// Weighted sum of every Score plugin's result for `node`.
    pub fn run_scores(&self, state: &mut CycleState, task: &Task, node: &NodeInfo) -> i64 {
        let mut total = 0_i64;
        for (plugin, weight) in &self.score {
            let (score, status) = plugin.score(state, task, node);
            if status.is_success() {
                total += score * weight;
            }
        }
        total
    }

    pub fn default_with(queue_label_key: impl Into<String>) -> Self {
        let node_affinity = Arc::new(node_affinity::NodeAffinity);
        let node_name = Arc::new(node_name::NodeName);
        let fit = Arc::new(node_resources_fit::Fit);
        let node_unschedulable = Arc::new(node_unschedulable::NodeUnschedulable);
        let scheduling_gates = Arc::new(scheduling_gates::SchedulingGates);
        let taint_toleration = Arc::new(taint_toleration::TaintToleration);
        let balanced_allocation = Arc::new(balanced_allocation::BalancedAllocation::default());
        let gpu_pack = Arc::new(gpu_pack::GpuPack);
        let gpu_spread = Arc::new(gpu_spread::GpuSpread);
        let resource_type = Arc::new(resource_type::ResourceType);
        let pod_affinity = Arc::new(pod_affinity::PodAffinity);
        let topology = Arc::new(topology::Topology);
        let proportion = Arc::new(proportion::Proportion::new(queue_label_key.into()));

        Self {
            pre_enqueue: vec![scheduling_gates.clone()],
            pre_filter: vec![node_affinity.clone(), fit.clone()],
            filter: vec![
                node_affinity.clone(),
                fit.clone(),
                taint_toleration.clone(),
                node_name.clone(),
                node_unschedulable.clone(),
                resource_type.clone(),
                topology.clone(),
                pod_affinity.clone(),
            ],
            post_filter: vec![],
            pre_score: vec![
                node_affinity.clone(),
                fit.clone(),
                balanced_allocation.clone(),
                taint_toleration.clone(),
            ],
            score: vec![
                (node_affinity.clone(), 2),
                (fit.clone(), 1),
                (balanced_allocation.clone(), 1),
                (taint_toleration.clone(), 3),
                (gpu_pack.clone(), 1),
                (gpu_spread.clone(), 1),
            ],
            reserve: vec![],
            permit: vec![],
            pre_bind: vec![],
            bind: vec![],
            post_bind: vec![],
            enqueue_extensions: vec![balanced_allocation, node_affinity, node_name, fit, taint_toleration],
            task_order: vec![],
            job_order: vec![],
            queue_order: vec![proportion.clone()],
            gang_scheduling: vec![],
            reclaimable: vec![proportion.clone()],
            preemptable: vec![],
            allocatable: vec![proportion],
        }
    }
}

/// Named plugin + score weight, as carried in a scoring-strategy config
/// (spec §6).
#[derive(Clone)]
pub struct PluginInfo {
    pub name: String,
    pub weight: i64,
}
