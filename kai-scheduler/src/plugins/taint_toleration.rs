use kai_common::{NodeInfo, Task, Taint, TaintEffect, Toleration};

use crate::cycle_state::CycleState;
use crate::plugins::{
    ActionType, ClusterEvent, ClusterEventWithHint, Code, DefaultNormalizeScore, EnqueueExtension,
    EventInner, EventResource, FilterPlugin, Plugin, PreScorePlugin, QueueingHint, ScoreExtension,
    ScorePlugin, Status,
};

pub struct TaintToleration;

impl Plugin for TaintToleration {
    fn name(&self) -> &str {
        "TaintToleration"
    }
}

impl FilterPlugin for TaintToleration {
    fn filter(&self, _: &mut CycleState, task: &Task, node: &NodeInfo) -> Status {
        let blocking = |t: &&Taint| matches!(t.effect, TaintEffect::NoSchedule | TaintEffect::NoExecute);
        match find_untolerated_taint(&node.spec.taints, &task.spec.tolerations, blocking) {
            Some(t) => Status::new(
                Code::UnschedulableAndUnresolvable,
                vec![format!("node(s) had untolerated taint {{{:#?}: {}}}", t.key, t.value)],
            ),
            None => Status::new(Code::Success, vec![]),
        }
    }
}

fn tolerations_tolerate_taint(tolerations: &[Toleration], taint: &Taint) -> bool {
    tolerations.iter().any(|to| to.tolerate(taint))
}

fn find_untolerated_taint<'a>(taints: &'a [Taint], tolerations: &[Toleration], p: impl FnMut(&&Taint) -> bool) -> Option<&'a Taint> {
    taints.iter().filter(p).find(|&t| !tolerations_tolerate_taint(tolerations, t))
}

const PRE_SCORE_KEY: &str = "PreScoreTaintToleration";

impl PreScorePlugin for TaintToleration {
    fn pre_score(&self, state: &mut CycleState, task: &Task, _: &[NodeInfo]) -> Status {
        let prefer_no_schedule: Vec<_> = task
            .spec
            .tolerations
            .iter()
            .filter(|t| matches!(t.effect, Some(TaintEffect::PreferNoSchedule) | None))
            .cloned()
            .collect();
        state.write(PRE_SCORE_KEY, Box::new(prefer_no_schedule));
        Status::default()
    }
}

impl ScorePlugin for TaintToleration {
    fn score(&self, state: &mut CycleState, _: &Task, node: &NodeInfo) -> (i64, Status) {
        let Some(tolerations) = state.read::<Vec<Toleration>>(PRE_SCORE_KEY) else {
            return (0, Status::error("PreScoreState not found"));
        };
        let score = node
            .spec
            .taints
            .iter()
            .filter(|&t| matches!(t.effect, TaintEffect::PreferNoSchedule) && tolerations_tolerate_taint(tolerations, t))
            .count();
        (score as i64, Status::default())
    }

    fn score_extension(&self) -> Box<dyn ScoreExtension> {
        Box::new(DefaultNormalizeScore {
            max_score: 100,
            reverse: true,
        })
    }
}

impl EnqueueExtension for TaintToleration {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint> {
        vec![
            ClusterEventWithHint {
                event: ClusterEvent {
                    resource: EventResource::Node,
                    action_type: ActionType::Add | ActionType::UpdateNodeTaint,
                },
                queueing_hint_fn: Some(Box::new(is_schedulable_after_node_change)),
            },
            ClusterEventWithHint {
                event: ClusterEvent {
                    resource: EventResource::Pod,
                    action_type: ActionType::UpdatePodToleration,
                },
                queueing_hint_fn: Some(Box::new(is_schedulable_after_task_toleration_change)),
            },
        ]
    }
}

fn do_not_schedule_taints_filter(t: &Taint) -> bool {
    matches!(t.effect, TaintEffect::NoSchedule | TaintEffect::NoExecute)
}

fn is_schedulable_after_node_change(task: Task, event: EventInner) -> Result<QueueingHint, String> {
    match event {
        EventInner::Pod(_, _) => Err(format!("event inner {event:?} does not match event resource node")),
        EventInner::Node(old, new) => {
            let was_untolerated = match &old {
                None => true,
                Some(old) => find_untolerated_taint(&old.spec.taints, &task.spec.tolerations, |&t| do_not_schedule_taints_filter(t)).is_some(),
            };
            let is_untolerated = find_untolerated_taint(&new.spec.taints, &task.spec.tolerations, |&t| do_not_schedule_taints_filter(t)).is_some();
            if was_untolerated && !is_untolerated {
                Ok(QueueingHint::Queue)
            } else {
                Ok(QueueingHint::Skip)
            }
        }
    }
}

fn is_schedulable_after_task_toleration_change(task: Task, event: EventInner) -> Result<QueueingHint, String> {
    match event {
        EventInner::Node(_, _) => Err(format!("event inner {event:?} does not match event resource pod")),
        EventInner::Pod(_old, new) => match new {
            Some(new) if new.name == task.name => Ok(QueueingHint::Queue),
            _ => Ok(QueueingHint::Skip),
        },
    }
}
