//! The Preempt action (spec §4.3, §4.2): within the same queue, a
//! higher-priority preemptible pending pod may evict a lower-priority
//! preemptible running pod to make room. Unlike Reclaim, this never
//! crosses a queue boundary and never consults fair-share buckets —
//! it is pure priority order gated by the preemptibility matrix and
//! each victim queue's `reclaim-min-runtime` grace period. New relative
//! to the teacher, which has no preemptibility policy or priority-based
//! eviction at all; built in the same checkpoint-then-commit-or-rollback
//! shape `allocate`/`reclaim` use.

use kai_common::{NodeInfo, Queue, Resources, Task, TaskPhase};

use crate::plugins::min_runtime::MinRuntime;
use crate::plugins::ordering::PreemptableFn;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct PreemptOutcome {
    pub preemptor_task: String,
    pub node: String,
    pub evicted: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PreemptReport {
    pub outcomes: Vec<PreemptOutcome>,
}

fn queue_for<'a>(queues: &'a [Queue], name: &str) -> Option<&'a Queue> {
    queues.iter().find(|q| q.name == name)
}

/// Spec §4.2 "Non-preemption threshold": a non-preemptible victim can
/// only be evicted by a strictly-higher-priority, non-preemptible
/// preemptor; a preemptible victim just needs a strictly higher
/// priority preemptor, regardless of the preemptor's own policy.
fn preemption_gate(preemptor: &Task, victim: &Task, queue: &Queue) -> bool {
    if preemptor.spec.priority <= victim.spec.priority {
        return false;
    }
    if victim.spec.preemptible {
        return true;
    }
    queue.preemptibility == kai_common::Preemptibility::NonPreemptible
}

/// Same-queue victims on `node`, ordered lowest-priority first so the
/// smallest-priority pods are the first offered up.
fn minimal_victim_set(node: &NodeInfo, preemptor: &Task, queue: &Queue, tasks: &[Task]) -> Option<Vec<String>> {
    if preemptor.fits_on(node) {
        return Some(Vec::new());
    }

    let mut victims: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.scheduled_node.as_deref() == Some(node.name.as_str()))
        .filter(|t| t.queue_name == queue.name)
        .filter(|t| t.name != preemptor.name)
        .filter(|t| matches!(t.phase, Some(TaskPhase::Running)))
        .filter(|victim| {
            if !preemption_gate(preemptor, victim, queue) {
                return false;
            }
            if let Some(grace) = queue.reclaim_min_runtime {
                if !MinRuntime::new(grace).preemptable(preemptor, victim) {
                    return false;
                }
            }
            true
        })
        .collect();

    victims.sort_by(|a, b| a.spec.priority.cmp(&b.spec.priority));

    let mut freed = Resources::ZERO;
    let mut chosen = Vec::new();
    for victim in victims {
        freed = freed + victim.spec.resources;
        chosen.push(victim.name.clone());
        let idle = node.idle() + freed;
        if preemptor.spec.resources.fits_within(&idle) {
            return Some(chosen);
        }
    }
    None
}

/// Runs the Preempt action: every still-pending task tries, node by
/// node, to find the smallest same-queue victim set that the
/// preemptibility matrix allows and that frees enough room; the first
/// node with a feasible (possibly empty) victim set wins.
pub fn run(session: &mut Session) -> PreemptReport {
    let mut report = PreemptReport::default();

    let mut pending: Vec<Task> = session.cluster.pending_tasks().cloned().collect();
    pending.sort_by(|a, b| b.spec.priority.cmp(&a.spec.priority));

    for task in pending {
        if !task.spec.preemptible {
            continue;
        }
        let Some(queue) = queue_for(&session.cluster.queues, &task.queue_name).cloned() else {
            continue;
        };

        let nodes = session.cluster.nodes.clone();
        let mut best: Option<(String, Vec<String>)> = None;
        for node in &nodes {
            let Some(victims) = minimal_victim_set(node, &task, &queue, &session.cluster.tasks) else {
                continue;
            };
            let is_better = best.as_ref().map(|(_, v)| victims.len() < v.len()).unwrap_or(true);
            if is_better {
                best = Some((node.name.clone(), victims));
                if best.as_ref().unwrap().1.is_empty() {
                    break;
                }
            }
        }

        let Some((node_name, victim_names)) = best else {
            continue;
        };

        let mut statement = session.statement();
        let checkpoint = statement.checkpoint();
        for victim in &victim_names {
            statement.evict(victim, "preempted", Default::default());
        }
        let node_snapshot = statement.nodes().iter().find(|n| n.name == node_name).cloned();
        let fits = node_snapshot.map(|n| task.fits_on(&n)).unwrap_or(false);
        if fits {
            statement.allocate(&task.name, &node_name);
            report.outcomes.push(PreemptOutcome {
                preemptor_task: task.name.clone(),
                node: node_name,
                evicted: victim_names,
            });
        } else {
            statement.rollback(checkpoint);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::{Preemptibility, PodSpec, QueueResources, QueueStatus, Resources};
    use std::sync::Arc;

    fn queue(name: &str, preemptibility: Preemptibility, reclaim_min_runtime: Option<std::time::Duration>) -> Queue {
        Queue {
            name: name.into(),
            parent: None,
            resources: QueueResources::unlimited(),
            priority: 0,
            preemptibility,
            reclaim_min_runtime,
            status: QueueStatus::default(),
        }
    }

    fn running_task(name: &str, queue: &str, node: &str, cpu: u64, priority: i64, preemptible: bool) -> Task {
        Task {
            name: name.into(),
            queue_name: queue.into(),
            pod_group_name: name.into(),
            phase: Some(TaskPhase::Running),
            scheduled_node: Some(node.into()),
            spec: PodSpec {
                resources: Resources::new(cpu, 0, 0.0),
                priority,
                preemptible,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn pending_task(name: &str, queue: &str, cpu: u64, priority: i64) -> Task {
        Task {
            name: name.into(),
            queue_name: queue.into(),
            pod_group_name: name.into(),
            phase: Some(TaskPhase::Pending),
            spec: PodSpec {
                resources: Resources::new(cpu, 0, 0.0),
                priority,
                preemptible: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn session_with(nodes: Vec<kai_common::NodeInfo>, tasks: Vec<Task>, queues: Vec<Queue>) -> Session {
        let cluster = crate::cache::ClusterInfo { nodes, tasks, podgroups: vec![], queues, topologies: vec![] };
        let registry = Arc::new(crate::plugins::Registry::default_with("kai.scheduler/queue"));
        Session::open(cluster, registry, kai_common::SchedulerConfig::default())
    }

    #[test]
    fn higher_priority_pod_preempts_lower_priority_same_queue_pod() {
        let node = kai_common::NodeInfo {
            name: "n1".into(),
            allocatable: Resources::new(1000, 0, 0.0),
            requested: Resources::new(1000, 0, 0.0),
            ..Default::default()
        };
        let victim = running_task("victim", "q", "n1", 1000, 1, true);
        let preemptor = pending_task("preemptor", "q", 1000, 10);
        let queue = queue("q", Preemptibility::Preemptible, None);

        let mut session = session_with(vec![node], vec![victim, preemptor], vec![queue]);
        let report = run(&mut session);

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].evicted, vec!["victim".to_string()]);
        assert_eq!(session.cluster.task("victim").unwrap().phase, Some(TaskPhase::Pending));
        assert_eq!(session.cluster.task("preemptor").unwrap().scheduled_node.as_deref(), Some("n1"));
    }

    #[test]
    fn non_preemptible_victim_protected_from_preemptible_preemptor() {
        let node = kai_common::NodeInfo {
            name: "n1".into(),
            allocatable: Resources::new(1000, 0, 0.0),
            requested: Resources::new(1000, 0, 0.0),
            ..Default::default()
        };
        let victim = running_task("victim", "q", "n1", 1000, 1, false);
        let preemptor = pending_task("preemptor", "q", 1000, 10);
        let queue = queue("q", Preemptibility::Preemptible, None);

        let mut session = session_with(vec![node], vec![victim, preemptor], vec![queue]);
        let report = run(&mut session);

        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn victim_within_min_runtime_grace_is_protected() {
        let node = kai_common::NodeInfo {
            name: "n1".into(),
            allocatable: Resources::new(1000, 0, 0.0),
            requested: Resources::new(1000, 0, 0.0),
            ..Default::default()
        };
        let mut victim = running_task("victim", "q", "n1", 1000, 1, true);
        victim.running_since = Some(std::time::Instant::now());
        let preemptor = pending_task("preemptor", "q", 1000, 10);
        let queue = queue("q", Preemptibility::Preemptible, Some(std::time::Duration::from_secs(3600)));

        let mut session = session_with(vec![node], vec![victim, preemptor], vec![queue]);
        let report = run(&mut session);

        assert!(report.outcomes.is_empty());
    }
}
