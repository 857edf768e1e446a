use kai_common::{NodeInfo, Task, Taint, TaintEffect, TaintKey};

use crate::cycle_state::CycleState;
use crate::plugins::{Code, FilterPlugin, Plugin, Status};

pub struct NodeUnschedulable;

impl Plugin for NodeUnschedulable {
    fn name(&self) -> &str {
        "NodeUnschedulable"
    }
}

impl FilterPlugin for NodeUnschedulable {
    fn filter(&self, _: &mut CycleState, task: &Task, node: &NodeInfo) -> Status {
        if !node.spec.unschedulable {
            return Status::default();
        }
        let unschedulable_taint = Taint::new(TaintKey::NodeUnschedulable, TaintEffect::NoSchedule);
        if task.spec.tolerations.iter().any(|t| t.tolerate(&unschedulable_taint)) {
            return Status::default();
        }
        Status::new(Code::UnschedulableAndUnresolvable, vec!["node(s) were unschedulable".to_string()])
    }
}
