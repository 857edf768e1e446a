//! The Consolidate action (spec §4.3): tries to create room for a
//! pending podgroup by migrating *pipelined* (tentatively placed, not
//! yet bound) workloads elsewhere — never touching anything already
//! `Running` or `Bound`, so consolidation never costs production work a
//! restart. New relative to the teacher, which has no tentative/pipeline
//! placement phase to migrate out of; built in the same
//! checkpoint-then-commit-or-rollback shape as `allocate`/`reclaim`.

use kai_common::{NodeInfo, Resources, Task, TaskPhase};

use crate::actions::feasible_nodes_sorted;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct ConsolidateOutcome {
    pub pending_task: String,
    pub node: String,
    pub migrated: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidateReport {
    pub outcomes: Vec<ConsolidateOutcome>,
}

/// Pipelined tasks resident on `node`, smallest resource footprint first
/// — migrating the fewest, smallest placements is preferred over
/// uprooting a large one.
fn pipelined_on_node<'a>(tasks: &'a [Task], node_name: &str) -> Vec<&'a Task> {
    let mut candidates: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.phase == Some(TaskPhase::Pipelined) && t.scheduled_node.as_deref() == Some(node_name))
        .collect();
    candidates.sort_by(|a, b| a.spec.resources.cpu_millis.cmp(&b.spec.resources.cpu_millis));
    candidates
}

/// Runs the Consolidate action: every still-pending task tries each node
/// it doesn't already fit on, migrating the smallest prefix of that
/// node's pipelined occupants to other nodes with room until the pending
/// task fits or no more occupants can be relocated.
pub fn run(session: &mut Session) -> ConsolidateReport {
    let mut report = ConsolidateReport::default();
    let registry = session.registry.clone();

    let mut pending: Vec<Task> = session.cluster.pending_tasks().cloned().collect();
    pending.sort_by(|a, b| b.spec.priority.cmp(&a.spec.priority));

    for task in pending {
        let nodes = session.cluster.nodes.clone();
        let mut placed = false;

        for node in &nodes {
            if task.fits_on(node) {
                continue; // Allocate already would have placed this; nothing to consolidate.
            }

            let mut statement = session.statement();
            let checkpoint = statement.checkpoint();
            let occupants: Vec<String> = pipelined_on_node(statement.tasks(), &node.name)
                .into_iter()
                .map(|t| t.name.clone())
                .collect();

            let mut migrated = Vec::new();
            let mut freed = Resources::ZERO;
            for occupant_name in occupants {
                let Some(occupant) = statement.tasks().iter().find(|t| t.name == occupant_name).cloned() else {
                    continue;
                };
                let other_nodes: Vec<NodeInfo> = statement.nodes().iter().filter(|n| n.name != node.name).cloned().collect();
                let ranked = feasible_nodes_sorted(&registry, &occupant, &other_nodes, None);
                let Some((destination, _)) = ranked.into_iter().next() else {
                    continue;
                };
                statement.pipeline(&occupant.name, &destination);
                migrated.push((occupant.name.clone(), destination));
                freed = freed + occupant.spec.resources;

                let current_node = statement.nodes().iter().find(|n| n.name == node.name).cloned();
                if current_node.map(|n| task.fits_on(&n)).unwrap_or(false) {
                    break;
                }
            }

            let node_after = statement.nodes().iter().find(|n| n.name == node.name).cloned();
            if node_after.map(|n| task.fits_on(&n)).unwrap_or(false) {
                statement.allocate(&task.name, &node.name);
                report.outcomes.push(ConsolidateOutcome {
                    pending_task: task.name.clone(),
                    node: node.name.clone(),
                    migrated,
                });
                placed = true;
                break;
            }
            statement.rollback(checkpoint);
            let _ = freed;
        }

        if placed {
            continue;
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::{PodSpec, Resources};
    use std::sync::Arc;

    fn node(name: &str, cpu: u64) -> NodeInfo {
        NodeInfo {
            name: name.into(),
            allocatable: Resources::new(cpu, 0, 0.0),
            ..Default::default()
        }
    }

    fn node_with_requested(name: &str, cpu: u64, requested_cpu: u64) -> NodeInfo {
        NodeInfo {
            requested: Resources::new(requested_cpu, 0, 0.0),
            ..node(name, cpu)
        }
    }

    fn pipelined_task(name: &str, node: &str, cpu: u64) -> Task {
        Task {
            name: name.into(),
            pod_group_name: name.into(),
            phase: Some(TaskPhase::Pipelined),
            scheduled_node: Some(node.into()),
            spec: PodSpec {
                resources: Resources::new(cpu, 0, 0.0),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn pending_task(name: &str, cpu: u64, priority: i64) -> Task {
        Task {
            name: name.into(),
            pod_group_name: name.into(),
            phase: Some(TaskPhase::Pending),
            spec: PodSpec {
                resources: Resources::new(cpu, 0, 0.0),
                priority,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn session_with(nodes: Vec<NodeInfo>, tasks: Vec<Task>) -> Session {
        let cluster = crate::cache::ClusterInfo {
            nodes,
            tasks,
            podgroups: vec![],
            queues: vec![],
            topologies: vec![],
        };
        let registry = Arc::new(crate::plugins::Registry::default_with("kai.scheduler/queue"));
        Session::open(cluster, registry, kai_common::SchedulerConfig::default())
    }

    #[test]
    fn migrates_pipelined_occupant_to_make_room() {
        let mut session = session_with(
            vec![node_with_requested("n1", 1000, 500), node("n2", 1000)],
            vec![pipelined_task("occupant", "n1", 500), pending_task("newcomer", 1000, 10)],
        );
        let report = run(&mut session);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].node, "n1");
        assert_eq!(session.cluster.task("occupant").unwrap().scheduled_node.as_deref(), Some("n2"));
        assert_eq!(session.cluster.task("newcomer").unwrap().scheduled_node.as_deref(), Some("n1"));
    }

    #[test]
    fn never_migrates_running_tasks() {
        let mut running = pipelined_task("occupant", "n1", 500);
        running.phase = Some(TaskPhase::Running);
        let mut session = session_with(vec![node_with_requested("n1", 1000, 500)], vec![running, pending_task("newcomer", 1000, 10)]);
        let report = run(&mut session);
        assert!(report.outcomes.is_empty());
        assert_eq!(session.cluster.task("occupant").unwrap().scheduled_node.as_deref(), Some("n1"));
    }
}
