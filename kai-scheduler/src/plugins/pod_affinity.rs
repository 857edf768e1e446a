//! `PodAffinity` filter plugin: rejects a node that fails the task's
//! pod-(anti-)affinity terms against the labels of tasks already resident
//! there. Generalizes `libscheduler::plugins::node_affinity`'s filter shape
//! onto `kai_common::Affinity::pod_affinity_satisfied`, which the teacher
//! has no equivalent of (its affinity story was node-only).

use kai_common::{NodeInfo, Task};

use crate::cycle_state::CycleState;
use crate::plugins::{Code, FilterPlugin, Plugin, Status};

pub struct PodAffinity;

impl Plugin for PodAffinity {
    fn name(&self) -> &str {
        "PodAffinity"
    }
}

impl FilterPlugin for PodAffinity {
    fn filter(&self, _: &mut CycleState, task: &Task, node: &NodeInfo) -> Status {
        let Some(affinity) = &task.spec.affinity else {
            return Status::default();
        };
        if affinity.pod_affinity.is_empty() && affinity.pod_anti_affinity.is_empty() {
            return Status::default();
        }
        if affinity.pod_affinity_satisfied(node) {
            Status::default()
        } else {
            Status::new(
                Code::Unschedulable,
                vec!["node(s) didn't match pod affinity/anti-affinity rules".to_string()],
            )
        }
    }
}
