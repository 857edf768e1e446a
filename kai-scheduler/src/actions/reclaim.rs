//! The Reclaim action (spec §4.3, §4.2): a reclaimer queue at or below
//! its fair share (UQ/UFS) may take resources from a queue over its fair
//! share (OFS/OQ) by evicting its pods, provided the reclaim eligibility
//! rule holds and the smallest victim set on some node covers the
//! reclaiming task's demand. New relative to the teacher, which has no
//! queue/quota concept and therefore no reclaim action at all; built in
//! the same checkpoint-then-commit-or-rollback shape `allocate` uses.

use kai_common::{NodeInfo, Queue, Resources, Task, TaskPhase};

use crate::fairshare::{allocation_status, AllocationStatus};
use crate::plugins::min_runtime::MinRuntime;
use crate::plugins::ordering::PreemptableFn;
use crate::session::Session;
use crate::solver::{gpu_demand_scalar, AccumulatedIdleGpus};

#[derive(Debug, Clone)]
pub struct ReclaimOutcome {
    pub reclaimer_task: String,
    pub node: String,
    pub evicted: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReclaimReport {
    pub outcomes: Vec<ReclaimOutcome>,
}

fn queue_for<'a>(queues: &'a [Queue], name: &str) -> Option<&'a Queue> {
    queues.iter().find(|q| q.name == name)
}

fn queue_status(session: &Session, queue: &Queue) -> AllocationStatus {
    let fs = session.fair_share.get(&queue.name).cloned().unwrap_or_default();
    allocation_status(&queue.status.allocated, &fs, &queue.resources.limit)
}

fn is_reclaimer_eligible(status: AllocationStatus) -> bool {
    matches!(status, AllocationStatus::UnderQuota | AllocationStatus::UnderFairShare)
}

fn is_victim_eligible(status: AllocationStatus) -> bool {
    matches!(status, AllocationStatus::OverFairShare | AllocationStatus::OverQuota)
}

fn reclaimable(session: &Session, reclaimer_queue: &Queue, victim_queue: &Queue) -> bool {
    session
        .registry
        .reclaimable
        .iter()
        .all(|plugin| plugin.reclaimable(reclaimer_queue, victim_queue))
}

/// Attempts to free enough room on `node` for `reclaimer` by evicting the
/// smallest ordered prefix of eligible victims, returning their names if
/// the prefix (possibly empty, if the task already fits) suffices. When
/// the reclaimer carries GPU demand, an `AccumulatedIdleGpus` scenario
/// tracks device-level idle capacity alongside the coarser
/// `Resources::fits_within` check, growing incrementally as each
/// candidate victim is tentatively added (spec §4.3 "Scenario solvers").
fn minimal_victim_set(
    session: &Session,
    node: &NodeInfo,
    reclaimer: &Task,
    reclaimer_queue: &Queue,
    gpu_demand: f64,
) -> Option<Vec<String>> {
    let mut gpu_scenario = (gpu_demand > 0.0).then(|| AccumulatedIdleGpus::new(&session.cluster));
    let gpu_satisfied = |scenario: &Option<AccumulatedIdleGpus>| {
        scenario.as_ref().map(|s| s.idle_on(&node.name) + f64::EPSILON >= gpu_demand).unwrap_or(true)
    };

    if reclaimer.fits_on(node) && gpu_satisfied(&gpu_scenario) {
        return Some(Vec::new());
    }

    let mut victims: Vec<&Task> = session
        .cluster
        .tasks
        .iter()
        .filter(|t| t.scheduled_node.as_deref() == Some(node.name.as_str()))
        .filter(|t| t.queue_name != reclaimer_queue.name)
        .filter(|t| matches!(t.phase, Some(TaskPhase::Running) | Some(TaskPhase::Bound) | Some(TaskPhase::Allocated)))
        .filter(|victim| {
            let Some(victim_queue) = queue_for(&session.cluster.queues, &victim.queue_name) else {
                return false;
            };
            if !is_victim_eligible(queue_status(session, victim_queue)) {
                return false;
            }
            if !reclaimable(session, reclaimer_queue, victim_queue) {
                return false;
            }
            if let Some(grace) = victim_queue.reclaim_min_runtime {
                if !MinRuntime::new(grace).preemptable(reclaimer, victim) {
                    return false;
                }
            }
            preemption_gate(reclaimer, victim, reclaimer_queue, victim_queue)
        })
        .collect();

    victims.sort_by(|a, b| a.spec.priority.cmp(&b.spec.priority));

    let mut freed = Resources::ZERO;
    let mut chosen = Vec::new();
    for victim in victims {
        freed = freed + victim.spec.resources;
        chosen.push(victim.name.clone());
        if let Some(scenario) = gpu_scenario.as_mut() {
            scenario.add_victim(&session.cluster, &victim.name);
        }
        let idle = node.idle() + freed;
        if reclaimer.spec.resources.fits_within(&idle) && gpu_satisfied(&gpu_scenario) {
            return Some(chosen);
        }
    }
    None
}

/// Spec §4.2 "Non-preemption threshold": a non-preemptible victim can
/// only be reclaimed by a strictly-higher-priority, non-preemptible
/// reclaimer; preemptible victims are always fair game once the quota
/// eligibility and min-runtime grace checks pass.
fn preemption_gate(reclaimer: &Task, victim: &Task, reclaimer_queue: &Queue, victim_queue: &Queue) -> bool {
    if victim_queue.preemptibility == kai_common::Preemptibility::Preemptible {
        return true;
    }
    reclaimer_queue.preemptibility == kai_common::Preemptibility::NonPreemptible
        && reclaimer.spec.priority > victim.spec.priority
}

/// Runs the Reclaim action: every still-pending task whose queue is UQ/UFS
/// tries, node by node, to find the smallest victim set among OFS/OQ
/// queues that frees enough room; the first node with a feasible (possibly
/// empty) victim set wins.
pub fn run(session: &mut Session) -> ReclaimReport {
    let mut report = ReclaimReport::default();

    let mut pending: Vec<Task> = session.cluster.pending_tasks().cloned().collect();
    pending.sort_by(|a, b| b.spec.priority.cmp(&a.spec.priority));

    for task in pending {
        let Some(reclaimer_queue) = queue_for(&session.cluster.queues, &task.queue_name).cloned() else {
            continue;
        };
        if !is_reclaimer_eligible(queue_status(session, &reclaimer_queue)) {
            continue;
        }

        let gpu_demand = gpu_demand_scalar(&task.spec.gpu_demand);
        let mut nodes = session.cluster.nodes.clone();
        if gpu_demand > 0.0 {
            let gpu_order = AccumulatedIdleGpus::new(&session.cluster);
            nodes.sort_by(|a, b| {
                gpu_order
                    .idle_on(&b.name)
                    .partial_cmp(&gpu_order.idle_on(&a.name))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        let mut best: Option<(String, Vec<String>)> = None;
        for node in &nodes {
            let Some(victims) = minimal_victim_set(session, node, &task, &reclaimer_queue, gpu_demand) else {
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

        // The victim queues must still individually clear the eligibility
        // bucket check once assembled; re-verify atomically under one
        // checkpoint so a rejected scenario never partially evicts.
        let mut statement = session.statement();
        let checkpoint = statement.checkpoint();
        for victim in &victim_names {
            statement.evict(victim, "reclaimed", Default::default());
        }
        let node_snapshot = statement.nodes().iter().find(|n| n.name == node_name).cloned();
        let fits = node_snapshot.map(|n| task.fits_on(&n)).unwrap_or(false);
        if fits {
            statement.allocate(&task.name, &node_name);
            report.outcomes.push(ReclaimOutcome {
                reclaimer_task: task.name.clone(),
                node: node_name,
                evicted: victim_names,
            });
        } else {
            statement.rollback(checkpoint);
        }
    }

    report
}
