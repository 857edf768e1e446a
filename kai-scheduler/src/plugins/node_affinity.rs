use std::collections::HashMap;

use kai_common::{NodeInfo, NodeSelector, PreferredSchedulingTerms, Task};

use crate::cycle_state::CycleState;
use crate::plugins::{
    ActionType, ClusterEvent, ClusterEventWithHint, Code, DefaultNormalizeScore, EnqueueExtension,
    EventInner, EventResource, FilterPlugin, Plugin, PreFilterPlugin, PreFilterResult,
    PreScorePlugin, QueueingHint, ScoreExtension, ScorePlugin, Status,
};

pub struct NodeAffinity;

impl Plugin for NodeAffinity {
    fn name(&self) -> &str {
        "NodeAffinity"
    }
}

impl EnqueueExtension for NodeAffinity {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint> {
        vec![ClusterEventWithHint {
            event: ClusterEvent {
                resource: EventResource::Node,
                action_type: ActionType::Add | ActionType::UpdateNodeLabel,
            },
            queueing_hint_fn: Some(Box::new(is_schedulable_after_node_change)),
        }]
    }
}

fn is_schedulable_after_node_change(task: Task, event: EventInner) -> Result<QueueingHint, String> {
    match event {
        EventInner::Pod(_, _) => Err(format!("event inner {event:?} does not match event resource node")),
        EventInner::Node(original, modified) => {
            let required = get_required_node_affinity(&task);
            if !required.matches(&modified) {
                return Ok(QueueingHint::Skip);
            }
            match original {
                Some(old) if required.matches(&old) => Ok(QueueingHint::Skip),
                _ => Ok(QueueingHint::Queue),
            }
        }
    }
}

struct RequiredNodeAffinity {
    label_selector: HashMap<String, String>,
    node_selector: NodeSelector,
}

impl RequiredNodeAffinity {
    fn matches(&self, node: &NodeInfo) -> bool {
        let label_match = self
            .label_selector
            .iter()
            .all(|(key, value)| matches!(node.labels.get(key), Some(v) if v == value));
        label_match && self.node_selector.matches(node)
    }
}

fn get_required_node_affinity(task: &Task) -> RequiredNodeAffinity {
    let label_selector = task.spec.node_selector.clone();
    let node_selector = task
        .spec
        .affinity
        .as_ref()
        .and_then(|a| a.node_affinity.as_ref())
        .and_then(|na| na.required_during_scheduling_ignored_during_execution.clone())
        .unwrap_or_default();
    RequiredNodeAffinity {
        label_selector,
        node_selector,
    }
}

struct PreFilterState {
    required: RequiredNodeAffinity,
}

impl PreFilterPlugin for NodeAffinity {
    fn pre_filter(&self, state: &mut CycleState, task: &Task, _nodes: &[NodeInfo]) -> (PreFilterResult, Status) {
        let has_required_affinity = task
            .spec
            .affinity
            .as_ref()
            .and_then(|a| a.node_affinity.as_ref())
            .is_some_and(|na| na.required_during_scheduling_ignored_during_execution.is_some());
        if !has_required_affinity && task.spec.node_selector.is_empty() {
            return (PreFilterResult { node_names: vec![] }, Status::new(Code::Skip, vec![]));
        }

        state.write(
            "PreFilterNodeAffinity",
            Box::new(PreFilterState {
                required: get_required_node_affinity(task),
            }),
        );
        (PreFilterResult { node_names: vec![] }, Status::default())
    }
}

const ERR_REASON_POD: &str = "node(s) didn't match pod's node affinity/selector";

impl FilterPlugin for NodeAffinity {
    fn filter(&self, state: &mut CycleState, _task: &Task, node: &NodeInfo) -> Status {
        match state.read::<PreFilterState>("PreFilterNodeAffinity") {
            Some(s) if !s.required.matches(node) => Status::new(Code::UnschedulableAndUnresolvable, vec![ERR_REASON_POD.to_string()]),
            _ => Status::default(),
        }
    }
}

struct PreScoreState {
    preferred: PreferredSchedulingTerms,
}

const PRE_SCORE_KEY: &str = "PreScoreNodeAffinity";

impl PreScorePlugin for NodeAffinity {
    fn pre_score(&self, state: &mut CycleState, task: &Task, _nodes: &[NodeInfo]) -> Status {
        let preferred = get_task_preferred_node_affinity(task);
        if preferred.terms.is_empty() {
            return Status::new(Code::Skip, vec![]);
        }
        state.write(PRE_SCORE_KEY, Box::new(PreScoreState { preferred }));
        Status::default()
    }
}

fn get_task_preferred_node_affinity(task: &Task) -> PreferredSchedulingTerms {
    task.spec
        .affinity
        .as_ref()
        .and_then(|a| a.node_affinity.as_ref())
        .and_then(|na| na.preferred_during_scheduling_ignored_during_execution.clone())
        .unwrap_or_default()
}

impl ScorePlugin for NodeAffinity {
    fn score(&self, state: &mut CycleState, _task: &Task, node: &NodeInfo) -> (i64, Status) {
        match state.read::<PreScoreState>(PRE_SCORE_KEY) {
            Some(s) => (s.preferred.score(node), Status::default()),
            None => (0, Status::error("NodeAffinity scoring error reading pre-score state")),
        }
    }

    fn score_extension(&self) -> Box<dyn ScoreExtension> {
        Box::new(DefaultNormalizeScore {
            max_score: 100,
            reverse: false,
        })
    }
}
