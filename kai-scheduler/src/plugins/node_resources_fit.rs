use kai_common::{NodeInfo, Resources, Task};

use crate::cycle_state::CycleState;
use crate::plugins::{
    ActionType, ClusterEvent, ClusterEventWithHint, Code, DefaultNormalizeScore, EnqueueExtension,
    EventInner, EventResource, FilterPlugin, Plugin, PreFilterPlugin, PreFilterResult,
    PreScorePlugin, QueueingHint, ScoreExtension, ScorePlugin, Status,
};

pub struct Fit;

const SCORING_STRATEGY_CONFIG_KEY: &str = "ScoringStrategyConfig";

#[derive(Clone, Default)]
pub enum ScoringStrategy {
    #[default]
    LeastAllocated,
    MostAllocated,
    RequestedToCapacityRatio,
}

impl Plugin for Fit {
    fn name(&self) -> &str {
        "NodeResourcesFit"
    }
}

impl EnqueueExtension for Fit {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint> {
        vec![
            ClusterEventWithHint {
                event: ClusterEvent {
                    resource: EventResource::Pod,
                    action_type: ActionType::Delete,
                },
                queueing_hint_fn: Some(Box::new(is_schedulable_after_pod_event)),
            },
            ClusterEventWithHint {
                event: ClusterEvent {
                    resource: EventResource::Node,
                    action_type: ActionType::Add | ActionType::UpdateNodeAllocatable,
                },
                queueing_hint_fn: Some(Box::new(is_schedulable_after_node_change)),
            },
        ]
    }
}

fn is_schedulable_after_pod_event(task: Task, event: EventInner) -> Result<QueueingHint, String> {
    match event {
        EventInner::Pod(_original, modified) => {
            if modified.is_none() {
                log::trace!("task was deleted, may make unscheduled task schedulable. task {:?}", task);
                Ok(QueueingHint::Queue)
            } else {
                Ok(QueueingHint::Skip)
            }
        }
        _ => Err(format!("event inner {:?} does not match event resource pod", event)),
    }
}

fn is_schedulable_after_node_change(task: Task, event: EventInner) -> Result<QueueingHint, String> {
    match event {
        EventInner::Node(original, modified) => {
            if is_fit(&task.spec.resources, &modified) {
                log::trace!("node {:?} now fits task {:?}", modified, task);
                Ok(QueueingHint::Queue)
            } else {
                let _ = original;
                Ok(QueueingHint::Skip)
            }
        }
        _ => Err(format!("event inner {:?} does not match event resource node", event)),
    }
}

struct PreFilterState {
    requests: Resources,
}

impl PreFilterPlugin for Fit {
    fn pre_filter(&self, state: &mut CycleState, task: &Task, _nodes: &[NodeInfo]) -> (PreFilterResult, Status) {
        state.write(
            "PreFilterNodeResourcesFit",
            Box::new(PreFilterState {
                requests: task.spec.resources.clone(),
            }),
        );
        (PreFilterResult { node_names: vec![] }, Status::default())
    }
}

fn is_fit(requests: &Resources, node: &NodeInfo) -> bool {
    requests.fits_within(&node.idle())
}

const ERR_REASON_RESOURCES: &str = "node(s) didn't have enough resource(s)";

impl FilterPlugin for Fit {
    fn filter(&self, state: &mut CycleState, _task: &Task, node: &NodeInfo) -> Status {
        match state.read::<PreFilterState>("PreFilterNodeResourcesFit") {
            Some(s) if !is_fit(&s.requests, node) => Status::new(Code::Unschedulable, vec![ERR_REASON_RESOURCES.to_string()]),
            Some(_) => Status::default(),
            None => Status::error("failed to read pre-filter state"),
        }
    }
}

struct PreScoreState {
    requests: Resources,
}

const PRE_SCORE_KEY: &str = "PreScoreNodeResourcesFit";

impl PreScorePlugin for Fit {
    fn pre_score(&self, state: &mut CycleState, task: &Task, _nodes: &[NodeInfo]) -> Status {
        state.write(
            PRE_SCORE_KEY,
            Box::new(PreScoreState {
                requests: task.spec.resources.clone(),
            }),
        );
        Status::default()
    }
}

impl ScorePlugin for Fit {
    fn score(&self, state: &mut CycleState, _task: &Task, node: &NodeInfo) -> (i64, Status) {
        let Some(s) = state.read::<PreScoreState>(PRE_SCORE_KEY) else {
            return (0, Status::error("NodeResourcesFit scoring error reading pre-score state"));
        };
        let strategy = state
            .read::<ScoringStrategy>(SCORING_STRATEGY_CONFIG_KEY)
            .cloned()
            .unwrap_or_default();
        let score = match strategy {
            ScoringStrategy::MostAllocated => calculate_most_allocated_score(&s.requests, node),
            ScoringStrategy::LeastAllocated => calculate_least_allocated_score(&s.requests, node),
            // Only two dimensions (cpu/memory) feed the ratio today, so this
            // collapses to MostAllocated until a per-resource weight config lands.
            ScoringStrategy::RequestedToCapacityRatio => calculate_most_allocated_score(&s.requests, node),
        };
        (score, Status::default())
    }

    fn score_extension(&self) -> Box<dyn ScoreExtension> {
        Box::new(DefaultNormalizeScore {
            max_score: 100,
            reverse: false,
        })
    }
}

fn calculate_most_allocated_score(requests: &Resources, node: &NodeInfo) -> i64 {
    let allocatable = &node.allocatable;
    let requested = &node.requested;

    let cpu_utilization = if allocatable.cpu_millis > 0 {
        (requested.cpu_millis + requests.cpu_millis) as f64 / allocatable.cpu_millis as f64
    } else {
        0.0
    };

    let memory_utilization = if allocatable.memory_bytes > 0 {
        (requested.memory_bytes + requests.memory_bytes) as f64 / allocatable.memory_bytes as f64
    } else {
        0.0
    };

    let avg_utilization = (cpu_utilization + memory_utilization) / 2.0;
    (avg_utilization * 100.0) as i64
}

fn calculate_least_allocated_score(requests: &Resources, node: &NodeInfo) -> i64 {
    ((1.0 - calculate_most_allocated_score(requests, node) as f64 / 100.0) * 100.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::NodeSpec;
    use std::collections::HashMap;

    fn node(allocatable_cpu_millis: u64) -> NodeInfo {
        NodeInfo {
            name: "n1".into(),
            labels: HashMap::new(),
            spec: NodeSpec::default(),
            allocatable: Resources {
                cpu_millis: allocatable_cpu_millis,
                memory_bytes: 8 * 1024 * 1024 * 1024,
                gpu: 0.0,
            },
            requested: Resources::ZERO,
            gpu_inventory: Default::default(),
            max_pods: 110,
            occupant_task_labels: Vec::new(),
        }
    }

    #[test]
    fn most_allocated_favors_fuller_nodes() {
        let requests = Resources {
            cpu_millis: 1000,
            memory_bytes: 0,
            gpu: 0.0,
        };
        let empty = node(4000);
        let mut full = node(4000);
        full.requested.cpu_millis = 3000;
        assert!(calculate_most_allocated_score(&requests, &full) > calculate_most_allocated_score(&requests, &empty));
    }
}
