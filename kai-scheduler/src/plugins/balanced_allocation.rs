//! `NodeResourcesBalancedAllocation` score plugin: favors nodes whose
//! post-allocation cpu/memory utilization is most even, discouraging a node
//! that is cpu-hot but memory-cold (or vice versa). Generalized from
//! `libscheduler::plugins::balanced_allocation` onto `kai_common::{Task,
//! NodeInfo}` and the current `PreScorePlugin`/`ScorePlugin` borrow-based
//! signatures.

use kai_common::{NodeInfo, Resources, Task};

use crate::cycle_state::CycleState;
use crate::plugins::{
    ActionType, ClusterEvent, ClusterEventWithHint, Code, DefaultNormalizeScore, EnqueueExtension,
    EventInner, EventResource, Plugin, PreScorePlugin, QueueingHint, ScoreExtension, ScorePlugin,
    Status,
};

#[derive(Clone, Debug)]
enum ResourceName {
    Cpu,
    Memory,
}

pub struct BalancedAllocation {
    resources: Vec<ResourceName>,
}

impl Default for BalancedAllocation {
    fn default() -> Self {
        Self {
            // No per-resource weighting config yet; cpu+memory only.
            resources: vec![ResourceName::Cpu, ResourceName::Memory],
        }
    }
}

impl Plugin for BalancedAllocation {
    fn name(&self) -> &str {
        "NodeResourcesBalancedAllocation"
    }
}

impl EnqueueExtension for BalancedAllocation {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint> {
        vec![
            ClusterEventWithHint {
                event: ClusterEvent {
                    resource: EventResource::Pod,
                    action_type: ActionType::Delete,
                },
                queueing_hint_fn: Some(Box::new(is_schedulable_after_task_event)),
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

fn is_schedulable_after_task_event(task: Task, event: EventInner) -> Result<QueueingHint, String> {
    match event {
        EventInner::Pod(_original, modified) => {
            if modified.is_none() {
                log::trace!("task was deleted, may make unscheduled task schedulable. task {:?}", task);
                Ok(QueueingHint::Queue)
            } else {
                Ok(QueueingHint::Skip)
            }
        }
        _ => Err(format!("event inner {event:?} does not match event resource pod")),
    }
}

fn is_schedulable_after_node_change(task: Task, event: EventInner) -> Result<QueueingHint, String> {
    match event {
        EventInner::Node(_original, modified) => {
            if is_fit(&task.spec.resources, &modified) {
                Ok(QueueingHint::Queue)
            } else {
                Ok(QueueingHint::Skip)
            }
        }
        _ => Err(format!("event inner {event:?} does not match event resource node")),
    }
}

fn is_fit(requests: &Resources, node: &NodeInfo) -> bool {
    requests.fits_within(&node.idle())
}

struct PreScoreState {
    task_requests: Resources,
}

const PRE_SCORE_KEY: &str = "PreScoreNodeResourcesBalancedAllocation";

impl PreScorePlugin for BalancedAllocation {
    fn pre_score(&self, state: &mut CycleState, task: &Task, _nodes: &[NodeInfo]) -> Status {
        let task_requests = task.spec.resources;
        if self.is_best_effort(&task_requests) {
            return Status::new(Code::Skip, vec![]);
        }
        state.write(PRE_SCORE_KEY, Box::new(PreScoreState { task_requests }));
        Status::default()
    }
}

impl BalancedAllocation {
    fn is_best_effort(&self, requests: &Resources) -> bool {
        requests.cpu_millis == 0 && requests.memory_bytes == 0
    }

    fn requested_list(&self, requests: &Resources) -> Vec<u64> {
        self.resources
            .iter()
            .map(|r| match r {
                ResourceName::Cpu => requests.cpu_millis,
                ResourceName::Memory => requests.memory_bytes,
            })
            .collect()
    }

    fn allocatable_list(&self, node: &NodeInfo) -> Vec<u64> {
        self.resources
            .iter()
            .map(|r| match r {
                ResourceName::Cpu => node.allocatable.cpu_millis,
                ResourceName::Memory => node.allocatable.memory_bytes,
            })
            .collect()
    }

    fn requested_on_node_list(&self, node: &NodeInfo) -> Vec<u64> {
        self.resources
            .iter()
            .map(|r| match r {
                ResourceName::Cpu => node.requested.cpu_millis,
                ResourceName::Memory => node.requested.memory_bytes,
            })
            .collect()
    }

    fn balanced_resource_scorer(&self, requested: &[u64], allocatable: &[u64]) -> i64 {
        let mut fractions = Vec::new();
        let mut total = 0.0;
        for i in 0..requested.len() {
            if allocatable[i] == 0 {
                continue;
            }
            let fraction = (requested[i] as f64 / allocatable[i] as f64).min(1.0);
            total += fraction;
            fractions.push(fraction);
        }

        let std = if fractions.len() == 2 {
            (fractions[0] - fractions[1]).abs() / 2.0
        } else if fractions.len() > 2 {
            let mean = total / fractions.len() as f64;
            let variance = fractions.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / fractions.len() as f64;
            variance.sqrt()
        } else {
            0.0
        };

        ((1.0 - std) * 100.0) as i64
    }
}

impl ScorePlugin for BalancedAllocation {
    fn score(&self, state: &mut CycleState, _task: &Task, node: &NodeInfo) -> (i64, Status) {
        let Some(s) = state.read::<PreScoreState>(PRE_SCORE_KEY) else {
            return (0, Status::error("BalancedAllocation scoring error reading pre-score state"));
        };
        let requested = self.requested_list(&s.task_requests);
        let allocatable = self.allocatable_list(node);
        let already_requested = self.requested_on_node_list(node);
        let total: Vec<u64> = requested.iter().zip(already_requested).map(|(r, a)| r + a).collect();
        (self.balanced_resource_scorer(&total, &allocatable), Status::default())
    }

    fn score_extension(&self) -> Box<dyn ScoreExtension> {
        Box::new(DefaultNormalizeScore {
            max_score: 100,
            reverse: false,
        })
    }
}
