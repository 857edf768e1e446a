//! Cache & Snapshotter (C1). Generalizes `libscheduler::cache::Cache`
//! (two `HashMap`s of pods/nodes behind mutators called from an etcd
//! watch loop) to the six object kinds the spec's cache mirrors, plus the
//! node-name/GPU-group secondary indices, `Snapshot()`, and the
//! BindRequest-aware idle-resource accounting. The actual watch/informer
//! machinery that drives these mutators is Kubernetes-API-server
//! plumbing and stays out of scope (spec §1) — callers (the binder, a
//! test, an external watch loop) call the mutators directly.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use kai_common::{BindRequest, NodeInfo, PodGroup, Queue, SchedulerError, Task, TaskPhase, Topology};

/// One session's immutable, pointer-stable view of the cluster (spec
/// §4.1's `ClusterInfo`).
#[derive(Debug, Clone, Default)]
pub struct ClusterInfo {
    pub nodes: Vec<NodeInfo>,
    pub tasks: Vec<Task>,
    pub podgroups: Vec<PodGroup>,
    pub queues: Vec<Queue>,
    pub topologies: Vec<Topology>,
}

impl ClusterInfo {
    pub fn node(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn queue(&self, name: &str) -> Option<&Queue> {
        self.queues.iter().find(|q| q.name == name)
    }

    pub fn pending_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.phase == Some(TaskPhase::Pending))
    }
}

#[derive(Default)]
pub struct Cache {
    pods: HashMap<String, Task>,
    nodes: HashMap<String, NodeInfo>,
    podgroups: HashMap<String, PodGroup>,
    queues: HashMap<String, Queue>,
    topologies: HashMap<String, Topology>,
    /// Keyed by the pod name the request targets; at most one open
    /// BindRequest per pod (spec §3 BindRequest ownership).
    bind_requests: HashMap<String, BindRequest>,
    pods_by_node: HashMap<String, HashSet<String>>,
    pods_by_gpu_group: HashMap<String, HashSet<String>>,
    synced: bool,
    allocation_timeout: Duration,
}

impl Cache {
    pub fn new(allocation_timeout: Duration) -> Self {
        Self {
            allocation_timeout,
            ..Default::default()
        }
    }

    /// `WaitForCacheSync`'s completion signal: flipped once the external
    /// watch loop has delivered its initial list for every object kind.
    pub fn mark_synced(&mut self) {
        self.synced = true;
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn update_pod(&mut self, pod: Task) -> Option<Task> {
        if let Some(node_name) = &pod.scheduled_node {
            self.pods_by_node
                .entry(node_name.clone())
                .or_default()
                .insert(pod.name.clone());
        }
        for group in &pod.gpu_groups {
            self.pods_by_gpu_group
                .entry(group.clone())
                .or_default()
                .insert(pod.name.clone());
        }
        self.pods.insert(pod.name.clone(), pod)
    }

    pub fn remove_pod(&mut self, pod_name: &str) {
        if let Some(pod) = self.pods.remove(pod_name) {
            if let Some(node_name) = &pod.scheduled_node {
                if let Some(set) = self.pods_by_node.get_mut(node_name) {
                    set.remove(pod_name);
                }
            }
            for group in &pod.gpu_groups {
                if let Some(set) = self.pods_by_gpu_group.get_mut(group) {
                    set.remove(pod_name);
                }
            }
        }
    }

    pub fn get_pod(&self, pod_name: &str) -> Option<&Task> {
        self.pods.get(pod_name)
    }

    pub fn update_node(&mut self, node: NodeInfo) {
        self.nodes.insert(node.name.clone(), node);
    }

    pub fn remove_node(&mut self, node_name: &str) {
        self.nodes.remove(node_name);
        self.pods_by_node.remove(node_name);
    }

    pub fn update_queue(&mut self, queue: Queue) {
        self.queues.insert(queue.name.clone(), queue);
    }

    pub fn remove_queue(&mut self, queue_name: &str) {
        self.queues.remove(queue_name);
    }

    pub fn update_podgroup(&mut self, podgroup: PodGroup) {
        self.podgroups.insert(podgroup.name.clone(), podgroup);
    }

    pub fn remove_podgroup(&mut self, name: &str) {
        self.podgroups.remove(name);
    }

    pub fn update_topology(&mut self, topology: Topology) {
        self.topologies.insert(topology.name.clone(), topology);
    }

    pub fn remove_topology(&mut self, name: &str) {
        self.topologies.remove(name);
    }

    pub fn upsert_bind_request(&mut self, request: BindRequest) {
        self.bind_requests.insert(request.pod_name.clone(), request);
    }

    pub fn remove_bind_request(&mut self, pod_name: &str) {
        self.bind_requests.remove(pod_name);
    }

    /// Pods currently indexed as resident on `node_name` (spec §4.1
    /// "indexes pods by node name ... to make reservation sync O(1)").
    pub fn pods_on_node(&self, node_name: &str) -> Vec<&Task> {
        self.pods_by_node
            .get(node_name)
            .into_iter()
            .flatten()
            .filter_map(|name| self.pods.get(name))
            .collect()
    }

    /// Pods sharing `group_id`, whatever node they're on (there should be
    /// exactly one, by construction, but indexing by group id directly
    /// keeps the reservation-sync lookup O(1) regardless).
    pub fn pods_in_gpu_group(&self, group_id: &str) -> Vec<&Task> {
        self.pods_by_gpu_group
            .get(group_id)
            .into_iter()
            .flatten()
            .filter_map(|name| self.pods.get(name))
            .collect()
    }

    pub fn active_bind_requests_for_gpu_group(&self, group_id: &str) -> usize {
        self.bind_requests
            .values()
            .filter(|br| !br.is_terminal() && !br.is_stale(self.allocation_timeout))
            .filter(|br| br.selected_gpu_groups.iter().any(|g| g == group_id))
            .count()
    }

    /// Produces the session's immutable `ClusterInfo` (spec §4.1
    /// `Snapshot()`). A pod with an open, non-stale `Pending`/`Binding`
    /// BindRequest is surfaced as `Binding` on its selected node, with
    /// that node's idle pool already reduced by the pod's request — the
    /// session never double-allocates resources the binder is mid-flight
    /// on. A BindRequest stuck `Pending` past the allocation timeout is
    /// treated as failed for planning and ignored here.
    pub fn snapshot(&self) -> Result<ClusterInfo, SchedulerError> {
        if !self.synced {
            return Err(SchedulerError::Fatal("cache snapshot requested before sync completed".into()));
        }

        let mut nodes = self.nodes.clone();
        let mut tasks = self.pods.clone();

        for request in self.bind_requests.values() {
            if request.is_terminal() || request.is_stale(self.allocation_timeout) {
                continue;
            }
            let Some(task) = tasks.get_mut(&request.pod_name) else {
                continue;
            };
            task.phase = Some(TaskPhase::Binding);
            task.scheduled_node = Some(request.selected_node.clone());
            if let Some(node) = nodes.get_mut(&request.selected_node) {
                node.requested = node.requested + task.spec.resources;
            }
        }

        Ok(ClusterInfo {
            nodes: nodes.into_values().collect(),
            tasks: tasks.into_values().collect(),
            podgroups: self.podgroups.values().cloned().collect(),
            queues: self.queues.values().cloned().collect(),
            topologies: self.topologies.values().cloned().collect(),
        })
    }
}
