//! The Allocate action (spec §4.3): for each eligible pending podgroup,
//! ordered by queue priority then podgroup priority, try to place the
//! gang's minimum required members onto nodes using node-order plugins as
//! scoring and predicate plugins as feasibility. A podgroup that cannot
//! gang-schedule is rolled back in full — no partial placement survives.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use kai_common::{PodGroup, Queue, Task, Topology};

use crate::actions::{feasible_nodes_sorted, group_by_podgroup};
use crate::session::Session;
use crate::solver::topology_aware_idle_gpus::SubgroupDemand;
use crate::solver::{gpu_demand_scalar, TopologyAwareIdleGpus};

#[derive(Debug, Clone)]
pub struct Placement {
    pub podgroup: String,
    pub task: String,
    pub node: String,
}

#[derive(Debug, Clone, Default)]
pub struct AllocateReport {
    pub placed: Vec<Placement>,
    /// Podgroups that had at least one pending member but could not reach
    /// gang size and were rolled back.
    pub unschedulable_podgroups: Vec<String>,
}

fn queue_for<'a>(cluster_queues: &'a [Queue], name: &str) -> Option<&'a Queue> {
    cluster_queues.iter().find(|q| q.name == name)
}

/// Podgroup-priority ordering: queue ordering first (starved queues
/// first, per the registry's `QueueOrderFn`), then the registry's
/// `JobOrderFn` if one is registered, then falling back to the
/// podgroup's own priority field, higher first.
fn compare_podgroups(session: &Session, a: &PodGroup, b: &PodGroup) -> Ordering {
    let queues = &session.cluster.queues;
    if let (Some(qa), Some(qb)) = (queue_for(queues, &a.queue), queue_for(queues, &b.queue)) {
        for cmp in &session.registry.queue_order {
            let ord = cmp.compare(qa, qb);
            if ord != Ordering::Equal {
                return ord;
            }
        }
    }
    for cmp in &session.registry.job_order {
        let ord = cmp.compare(a, b);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    b.priority.cmp(&a.priority)
}

fn compare_tasks(session: &Session, a: &Task, b: &Task) -> Ordering {
    for cmp in &session.registry.task_order {
        let ord = cmp.compare(a, b);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    match b.spec.priority.cmp(&a.spec.priority) {
        Ordering::Equal => a.queued_info.attempts.cmp(&b.queued_info.attempts),
        higher_priority_first => higher_priority_first,
    }
}

fn job_ready(registry: &crate::plugins::Registry, job: &PodGroup, bound_members: u32) -> bool {
    if let Some(plugin) = registry.gang_scheduling.first() {
        return plugin.job_ready(job, bound_members);
    }
    bound_members >= job.min_member.max(1)
}

/// Runs `TopologyAwareIdleGpus` once per podgroup for every subgroup that
/// carries a `requiredLevel` topology constraint, returning each such
/// subgroup's chosen domain as `(level_label_key, domain_value)` so the
/// per-task placement loop can pin every member of that subgroup to it
/// (spec §4.4 "topology-aware placement"). Subgroups without a required
/// level, or with no pending GPU demand, are left unpinned. `None` means
/// the scenario must be rejected outright — some required-level subgroup
/// could not be matched to any domain with enough idle capacity.
fn subgroup_domain_pins(session: &Session, podgroup: &PodGroup, pending: &[Task]) -> Option<HashMap<String, (String, String)>> {
    let demands: Vec<SubgroupDemand> = podgroup
        .subgroups
        .iter()
        .filter_map(|sg| {
            let constraint = sg.topology_constraint.as_ref()?;
            let level = constraint.required_level.as_ref()?;
            let gpu_demand: f64 = pending
                .iter()
                .filter(|t| t.subgroup_name.as_deref() == Some(sg.name.as_str()))
                .map(|t| gpu_demand_scalar(&t.spec.gpu_demand))
                .sum();
            if gpu_demand <= 0.0 {
                return None;
            }
            Some(SubgroupDemand {
                subgroup_key: sg.name.clone(),
                topology: constraint.topology.clone(),
                level: level.clone(),
                gpu_demand,
            })
        })
        .collect();

    if demands.is_empty() {
        return Some(HashMap::new());
    }

    let wanted: HashSet<&str> = demands.iter().map(|d| d.topology.as_str()).collect();
    let topologies: Vec<Topology> = session.cluster.topologies.iter().filter(|t| wanted.contains(t.name.as_str())).cloned().collect();

    let mut solver = TopologyAwareIdleGpus::new(&session.cluster, &topologies);
    let assignment = solver.assign(&demands)?;

    let mut pins = HashMap::new();
    for demand in &demands {
        if let Some(value) = assignment.get(&demand.subgroup_key) {
            pins.insert(demand.subgroup_key.clone(), (demand.level.clone(), value.clone()));
        }
    }
    Some(pins)
}

/// Runs the Allocate action over every pending podgroup in `session`,
/// mutating it via a fresh `Statement` and returning what was placed.
pub fn run(session: &mut Session) -> AllocateReport {
    let mut report = AllocateReport::default();
    let registry = session.registry.clone();

    let pending_by_podgroup = group_by_podgroup(session.cluster.pending_tasks());
    let mut podgroups: Vec<&PodGroup> = session
        .cluster
        .podgroups
        .iter()
        .filter(|pg| pending_by_podgroup.contains_key(&pg.name))
        .collect();
    podgroups.sort_by(|a, b| compare_podgroups(session, a, b));
    let podgroup_names: Vec<String> = podgroups.iter().map(|pg| pg.name.clone()).collect();

    for podgroup_name in podgroup_names {
        let Some(podgroup) = session.cluster.podgroups.iter().find(|pg| pg.name == podgroup_name).cloned() else {
            continue;
        };
        let queue = queue_for(&session.cluster.queues, &podgroup.queue).cloned();

        let mut pending: Vec<Task> = session
            .cluster
            .pending_tasks()
            .filter(|t| t.pod_group_name == podgroup_name)
            .cloned()
            .collect();
        pending.sort_by(|a, b| compare_tasks(session, a, b));

        let Some(pins) = subgroup_domain_pins(session, &podgroup, &pending) else {
            report.unschedulable_podgroups.push(podgroup_name);
            continue;
        };

        let gang_size = podgroup.min_member.max(1) as usize;
        let mut statement = session.statement();
        let checkpoint = statement.checkpoint();
        let mut placed = Vec::new();

        for task in pending.iter().take(gang_size) {
            let nodes = statement.nodes();
            let candidate_nodes: Vec<_> = nodes
                .iter()
                .filter(|n| queue.as_ref().map(|q| allocatable(&registry, q, n)).unwrap_or(true))
                .cloned()
                .collect();
            let pinned_domain = task
                .subgroup_name
                .as_ref()
                .and_then(|sg| pins.get(sg))
                .map(|(key, value)| (key.as_str(), value.as_str()));
            let ranked = feasible_nodes_sorted(&registry, task, &candidate_nodes, pinned_domain);
            let Some((node_name, _)) = ranked.into_iter().next() else {
                break;
            };
            statement.allocate(&task.name, &node_name);
            placed.push(Placement {
                podgroup: podgroup_name.clone(),
                task: task.name.clone(),
                node: node_name,
            });
        }

        if job_ready(&registry, &podgroup, placed.len() as u32) {
            report.placed.extend(placed);
        } else {
            statement.rollback(checkpoint);
            report.unschedulable_podgroups.push(podgroup_name);
        }
    }

    report
}

fn allocatable(registry: &crate::plugins::Registry, queue: &Queue, node: &kai_common::NodeInfo) -> bool {
    registry.allocatable.iter().all(|plugin| plugin.allocatable(queue, node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::{
        NodeInfo, Preemptibility, PodGroupStatus, PodSpec, Queue, QueueResources, QueueStatus, Resources, TaskPhase,
    };
    use std::sync::Arc;

    fn node(name: &str, cpu: u64) -> NodeInfo {
        NodeInfo {
            name: name.into(),
            allocatable: Resources::new(cpu, 0, 0.0),
            max_pods: 110,
            ..Default::default()
        }
    }

    fn task(name: &str, podgroup: &str, queue: &str, cpu: u64) -> Task {
        Task {
            name: name.into(),
            pod_group_name: podgroup.into(),
            queue_name: queue.into(),
            phase: Some(TaskPhase::Pending),
            spec: PodSpec {
                resources: Resources::new(cpu, 0, 0.0),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn podgroup(name: &str, queue: &str, min_member: u32) -> PodGroup {
        PodGroup {
            name: name.into(),
            namespace: "ns".into(),
            queue: queue.into(),
            min_member,
            priority_class: None,
            priority: 0,
            preemptibility: Preemptibility::Preemptible,
            subgroups: vec![],
            status: PodGroupStatus::default(),
        }
    }

    fn unlimited_queue(name: &str) -> Queue {
        Queue {
            name: name.into(),
            parent: None,
            resources: QueueResources::unlimited(),
            priority: 0,
            preemptibility: Preemptibility::Preemptible,
            reclaim_min_runtime: None,
            status: QueueStatus::default(),
        }
    }

    fn session_with(nodes: Vec<NodeInfo>, tasks: Vec<Task>, podgroups: Vec<PodGroup>, queues: Vec<Queue>) -> Session {
        let cluster = crate::cache::ClusterInfo { nodes, tasks, podgroups, queues, ..Default::default() };
        let registry = Arc::new(crate::plugins::Registry::default_with("kai.scheduler/queue"));
        Session::open(cluster, registry, kai_common::SchedulerConfig::default())
    }

    #[test]
    fn gang_places_all_members_when_capacity_allows() {
        let mut session = session_with(
            vec![node("n1", 4000)],
            vec![task("p1", "pg", "q", 1000), task("p2", "pg", "q", 1000)],
            vec![podgroup("pg", "q", 2)],
            vec![unlimited_queue("q")],
        );
        let report = run(&mut session);
        assert_eq!(report.placed.len(), 2);
        assert!(report.unschedulable_podgroups.is_empty());
    }

    #[test]
    fn gang_rolls_back_when_capacity_insufficient_for_min_member() {
        let mut session = session_with(
            vec![node("n1", 1500)],
            vec![task("p1", "pg", "q", 1000), task("p2", "pg", "q", 1000)],
            vec![podgroup("pg", "q", 2)],
            vec![unlimited_queue("q")],
        );
        let report = run(&mut session);
        assert!(report.placed.is_empty());
        assert_eq!(report.unschedulable_podgroups, vec!["pg".to_string()]);
        assert_eq!(session.cluster.task("p1").unwrap().phase, Some(TaskPhase::Pending));
        assert_eq!(session.cluster.node("n1").unwrap().requested.cpu_millis, 0);
    }

    #[test]
    fn gang_with_required_topology_level_is_pinned_to_the_domain_with_more_idle_gpus() {
        let mut rack_a = node("rack-a", 1000);
        rack_a.labels.insert("rack".into(), "rack-a".into());
        rack_a.gpu_inventory = kai_common::GpuInventory {
            devices: vec![kai_common::GpuDevice {
                group_id: "rack-a-gpu0".into(),
                fraction_capacity: 1.0,
                fraction_allocated: 0.0,
                memory_mib: 0,
                memory_allocated_mib: 0,
            }],
            ..Default::default()
        };
        let mut rack_b = node("rack-b", 1000);
        rack_b.labels.insert("rack".into(), "rack-b".into());
        rack_b.gpu_inventory = kai_common::GpuInventory {
            devices: (0..2)
                .map(|i| kai_common::GpuDevice {
                    group_id: format!("rack-b-gpu{i}"),
                    fraction_capacity: 1.0,
                    fraction_allocated: 0.0,
                    memory_mib: 0,
                    memory_allocated_mib: 0,
                })
                .collect(),
            ..Default::default()
        };

        let mut gpu_task = task("p1", "pg", "q", 100);
        gpu_task.subgroup_name = Some("sg".into());
        gpu_task.spec.gpu_demand = kai_common::GpuDemand::Whole { count: 2 };

        let mut pg = podgroup("pg", "q", 1);
        pg.subgroups = vec![kai_common::SubGroup {
            name: "sg".into(),
            parent: kai_common::ROOT_SUBGROUP.into(),
            min_member: 1,
            topology_constraint: Some(kai_common::TopologyConstraint {
                topology: "t".into(),
                required_level: Some("rack".into()),
                preferred_level: None,
            }),
            pod_names: vec!["p1".into()],
        }];

        let mut session = session_with(vec![rack_a, rack_b], vec![gpu_task], vec![pg], vec![unlimited_queue("q")]);
        session.cluster.topologies = vec![kai_common::Topology {
            name: "t".into(),
            levels: vec![kai_common::TopologyLevel { node_label: "rack".into() }],
        }];

        let report = run(&mut session);
        assert_eq!(report.placed.len(), 1);
        assert_eq!(report.placed[0].node, "rack-b");
    }

    #[test]
    fn queue_furthest_below_deserved_allocates_before_satisfied_queue() {
        let tasks = vec![task("low-p", "low-pg", "low", 1000), task("high-p", "high-pg", "high", 1000)];
        let mut high_queue = unlimited_queue("high");
        high_queue.resources.deserved = kai_common::QuotaResources {
            cpu: kai_common::Quantity::Limited(1000.0),
            memory: kai_common::Quantity::Unlimited,
            gpu: kai_common::Quantity::Unlimited,
        };
        high_queue.status.allocated = Resources::ZERO;
        high_queue.status.fair_share = Resources::new(1000, 0, 0.0);
        let mut low_queue = unlimited_queue("low");
        low_queue.resources.deserved = high_queue.resources.deserved;
        low_queue.status.allocated = Resources::new(1000, 0, 0.0);
        low_queue.status.fair_share = Resources::new(1000, 0, 0.0);

        let mut session = session_with(
            vec![node("n1", 1000)],
            tasks,
            vec![podgroup("low-pg", "low", 1), podgroup("high-pg", "high", 1)],
            vec![low_queue, high_queue],
        );
        let report = run(&mut session);
        assert_eq!(report.placed.len(), 1);
        assert_eq!(report.placed[0].task, "high-p");
    }
}
