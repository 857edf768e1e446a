use kai_common::{NodeInfo, Task};

use crate::cycle_state::CycleState;
use crate::plugins::{ActionType, ClusterEvent, ClusterEventWithHint, Code, EnqueueExtension, EventResource, FilterPlugin, Plugin, Status};

pub struct NodeName;

impl Plugin for NodeName {
    fn name(&self) -> &str {
        "NodeName"
    }
}

impl FilterPlugin for NodeName {
    fn filter(&self, _: &mut CycleState, task: &Task, node: &NodeInfo) -> Status {
        match &task.spec.node_name {
            Some(name) if name != &node.name => Status::new(
                Code::UnschedulableAndUnresolvable,
                vec!["node(s) didn't match the requested node name".to_string()],
            ),
            _ => Status::default(),
        }
    }
}

impl EnqueueExtension for NodeName {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint> {
        vec![ClusterEventWithHint {
            event: ClusterEvent {
                resource: EventResource::Node,
                action_type: ActionType::Add,
            },
            queueing_hint_fn: None,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::PodSpec;

    #[test]
    fn no_node_name_always_fits() {
        let plugin = NodeName;
        let mut state = CycleState::default();
        let task = Task::default();
        let node = NodeInfo::default();
        assert_eq!(plugin.filter(&mut state, &task, &node).code, Code::Success);
    }

    #[test]
    fn mismatched_node_name_is_unresolvable() {
        let plugin = NodeName;
        let mut state = CycleState::default();
        let task = Task {
            spec: PodSpec {
                node_name: Some("node-a".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let node = NodeInfo {
            name: "node-b".into(),
            ..Default::default()
        };
        assert_eq!(plugin.filter(&mut state, &task, &node).code, Code::UnschedulableAndUnresolvable);
    }
}
