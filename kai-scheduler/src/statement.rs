//! The rollback-capable mutation journal (spec §4.3 "Statement", §9
//! "Statement/rollback", testable property 6). New relative to the
//! teacher, whose scheduler commits an assignment straight to its store
//! with no tentative/rollback phase at all.
//!
//! Implemented as a journal of typed events for observability, backed by
//! a stack of task pre-image snapshots (one map per open checkpoint) so
//! `Rollback` restores exactly the fields a solver touched, including the
//! `ResourceClaimInfo` blobs, without needing per-event inverse logic.

use std::collections::HashMap;

use kai_common::{NodeInfo, ResourceClaimInfo, Task, TaskPhase};

use crate::cache::ClusterInfo;

#[derive(Debug, Clone)]
pub enum JournalEntry {
    Allocate { task: String, node: String },
    Pipeline { task: String, node: String },
    Evict { task: String, reason: String, metadata: HashMap<String, String> },
    Unpipeline { task: String },
}

#[derive(Debug, Clone)]
struct TaskSnapshot {
    phase: Option<TaskPhase>,
    scheduled_node: Option<String>,
    resource_claims: Vec<ResourceClaimInfo>,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        TaskSnapshot {
            phase: task.phase,
            scheduled_node: task.scheduled_node.clone(),
            resource_claims: task.resource_claims.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    level: usize,
    journal_len: usize,
}

pub struct Statement<'a> {
    cluster: &'a mut ClusterInfo,
    journal: Vec<JournalEntry>,
    dirty_stack: Vec<HashMap<String, TaskSnapshot>>,
}

impl<'a> Statement<'a> {
    pub fn new(cluster: &'a mut ClusterInfo) -> Self {
        Self {
            cluster,
            journal: Vec::new(),
            dirty_stack: vec![HashMap::new()],
        }
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// Read-only view of the working node set, for actions that need to
    /// rank candidates against a statement's in-progress mutations.
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.cluster.nodes
    }

    pub fn tasks(&self) -> &[Task] {
        &self.cluster.tasks
    }

    pub fn checkpoint(&mut self) -> Checkpoint {
        self.dirty_stack.push(HashMap::new());
        Checkpoint {
            level: self.dirty_stack.len() - 1,
            journal_len: self.journal.len(),
        }
    }

    /// Undoes every mutation recorded since `cp`, restoring each touched
    /// task's phase, node assignment, and DRA claim blobs bit-for-bit.
    pub fn rollback(&mut self, cp: Checkpoint) {
        while self.dirty_stack.len() > cp.level {
            let level = self.dirty_stack.pop().expect("checkpoint level underflow");
            for (name, snapshot) in level {
                self.restore(&name, snapshot);
            }
        }
        if self.dirty_stack.is_empty() {
            self.dirty_stack.push(HashMap::new());
        }
        self.journal.truncate(cp.journal_len);
    }

    fn restore(&mut self, task_name: &str, snapshot: TaskSnapshot) {
        let Some(task) = self.cluster.tasks.iter_mut().find(|t| t.name == task_name) else {
            return;
        };
        let prior_node = task.scheduled_node.clone();
        task.phase = snapshot.phase;
        task.scheduled_node = snapshot.scheduled_node.clone();
        task.resource_claims = snapshot.resource_claims;
        sync_node_reservation(self.cluster, task_name, prior_node.as_deref(), snapshot.scheduled_node.as_deref());
    }

    fn record_pre_image(&mut self, task_name: &str) {
        let Some(task) = self.cluster.tasks.iter().find(|t| t.name == task_name) else {
            return;
        };
        let snapshot = TaskSnapshot::from(task);
        let top = self.dirty_stack.last_mut().expect("dirty stack never empty");
        top.entry(task_name.to_string()).or_insert(snapshot);
    }

    fn find_task_mut(&mut self, task_name: &str) -> Option<&mut Task> {
        self.cluster.tasks.iter_mut().find(|t| t.name == task_name)
    }

    /// Tentatively assigns `task` to `node`, marking it `Allocated`.
    pub fn allocate(&mut self, task_name: &str, node: &str) {
        self.record_pre_image(task_name);
        let prior_node = self.find_task_mut(task_name).and_then(|t| t.scheduled_node.clone());
        if let Some(task) = self.find_task_mut(task_name) {
            task.phase = Some(TaskPhase::Allocated);
            task.scheduled_node = Some(node.to_string());
        }
        sync_node_reservation(self.cluster, task_name, prior_node.as_deref(), Some(node));
        self.journal.push(JournalEntry::Allocate {
            task: task_name.to_string(),
            node: node.to_string(),
        });
    }

    /// Tentatively assigns `task` to `node` without yet handing it to the
    /// binder (used by Consolidate's migration scenarios).
    pub fn pipeline(&mut self, task_name: &str, node: &str) {
        self.record_pre_image(task_name);
        let prior_node = self.find_task_mut(task_name).and_then(|t| t.scheduled_node.clone());
        if let Some(task) = self.find_task_mut(task_name) {
            task.phase = Some(TaskPhase::Pipelined);
            task.scheduled_node = Some(node.to_string());
        }
        sync_node_reservation(self.cluster, task_name, prior_node.as_deref(), Some(node));
        self.journal.push(JournalEntry::Pipeline {
            task: task_name.to_string(),
            node: node.to_string(),
        });
    }

    /// Reverts `task` to `Pending` and releases the resources it held,
    /// recording why (used by Reclaim/Preempt).
    pub fn evict(&mut self, task_name: &str, reason: &str, metadata: HashMap<String, String>) {
        self.record_pre_image(task_name);
        let prior_node = self.find_task_mut(task_name).and_then(|t| t.scheduled_node.clone());
        if let Some(task) = self.find_task_mut(task_name) {
            task.phase = Some(TaskPhase::Pending);
            task.scheduled_node = None;
        }
        sync_node_reservation(self.cluster, task_name, prior_node.as_deref(), None);
        self.journal.push(JournalEntry::Evict {
            task: task_name.to_string(),
            reason: reason.to_string(),
            metadata,
        });
    }

    /// Reverts a `pipeline` decision specifically (Consolidate backing
    /// out of a migration it could not complete).
    pub fn unpipeline(&mut self, task_name: &str) {
        self.record_pre_image(task_name);
        let prior_node = self.find_task_mut(task_name).and_then(|t| t.scheduled_node.clone());
        if let Some(task) = self.find_task_mut(task_name) {
            task.phase = Some(TaskPhase::Pending);
            task.scheduled_node = None;
        }
        sync_node_reservation(self.cluster, task_name, prior_node.as_deref(), None);
        self.journal.push(JournalEntry::Unpipeline { task: task_name.to_string() });
    }
}

/// Moves `task`'s resource footprint off `from` and onto `to` in the
/// working snapshot's node `requested` totals.
fn sync_node_reservation(cluster: &mut ClusterInfo, task_name: &str, from: Option<&str>, to: Option<&str>) {
    let Some(resources) = cluster.tasks.iter().find(|t| t.name == task_name).map(|t| t.spec.resources) else {
        return;
    };
    if from == to {
        return;
    }
    if let Some(from_node) = from.and_then(|n| find_node_mut(cluster, n)) {
        from_node.requested = from_node.requested.saturating_sub(&resources);
    }
    if let Some(to_node) = to.and_then(|n| find_node_mut(cluster, n)) {
        to_node.requested = to_node.requested + resources;
    }
}

fn find_node_mut<'a>(cluster: &'a mut ClusterInfo, name: &str) -> Option<&'a mut NodeInfo> {
    cluster.nodes.iter_mut().find(|n| n.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::{NodeInfo, PodSpec, Resources};

    fn cluster() -> ClusterInfo {
        ClusterInfo {
            nodes: vec![NodeInfo {
                name: "n1".into(),
                allocatable: Resources::new(4000, 0, 0.0),
                ..Default::default()
            }],
            tasks: vec![Task {
                name: "t1".into(),
                phase: Some(TaskPhase::Pending),
                spec: PodSpec {
                    resources: Resources::new(1000, 0, 0.0),
                    ..Default::default()
                },
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn rollback_restores_phase_and_node_and_resource_claims() {
        let mut cluster = cluster();
        cluster.tasks[0].resource_claims = vec![ResourceClaimInfo {
            claim_name: "c1".into(),
            driver: "d".into(),
            pool: "p".into(),
            device: "dev".into(),
            request: "r".into(),
        }];
        let before = cluster.tasks[0].resource_claims.clone();

        let mut statement = Statement::new(&mut cluster);
        let cp = statement.checkpoint();
        statement.allocate("t1", "n1");
        statement.evict("t1", "reclaimed", HashMap::new());
        statement.rollback(cp);

        assert_eq!(cluster.tasks[0].phase, Some(TaskPhase::Pending));
        assert_eq!(cluster.tasks[0].scheduled_node, None);
        assert_eq!(cluster.tasks[0].resource_claims, before);
        assert_eq!(cluster.nodes[0].requested.cpu_millis, 0);
    }

    #[test]
    fn allocate_reserves_node_capacity() {
        let mut cluster = cluster();
        let mut statement = Statement::new(&mut cluster);
        statement.allocate("t1", "n1");
        assert_eq!(cluster.nodes[0].requested.cpu_millis, 1000);
        assert_eq!(cluster.tasks[0].phase, Some(TaskPhase::Allocated));
    }

    #[test]
    fn nested_checkpoints_roll_back_independently() {
        let mut cluster = cluster();
        let mut statement = Statement::new(&mut cluster);
        let outer = statement.checkpoint();
        statement.allocate("t1", "n1");
        let inner = statement.checkpoint();
        statement.evict("t1", "test", HashMap::new());
        statement.rollback(inner);
        assert_eq!(cluster.tasks[0].phase, Some(TaskPhase::Allocated));
        statement.rollback(outer);
        assert_eq!(cluster.tasks[0].phase, Some(TaskPhase::Pending));
    }
}
