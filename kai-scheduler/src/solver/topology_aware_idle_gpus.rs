//! `TopologyAwareIdleGpus` (spec §4.3, §9 canonical-variant decision): the
//! richer `SubGroupSet`-aware filter. For each `(topology, level)` pair it
//! maintains a descending-by-idle-capacity list of domains (one entry per
//! distinct label value nodes carry at that level); as victims are added
//! their freed GPUs grow the domain containing their node and the list is
//! repositioned left in place, never re-sorted wholesale. Subgroup demands
//! sharing a `(topology, level)` are then greedily matched, largest first,
//! against the domain with the most uncommitted capacity, with a virtual
//! allocation preventing two subgroups from being assigned the same
//! capacity twice.

use std::collections::HashMap;

use kai_common::Topology;

use crate::cache::ClusterInfo;

use super::accumulated_idle_gpus::idle_gpu_capacity;
use super::gpu_demand_scalar;

type GroupKey = (String, String);

struct Domain {
    value: String,
    idle_gpus: f64,
    /// Virtual allocation consumed by `assign` within the current
    /// scenario attempt; reset by constructing a fresh instance per
    /// scenario rather than mutated in place across scenarios.
    committed: f64,
}

pub struct SubgroupDemand {
    pub subgroup_key: String,
    pub topology: String,
    pub level: String,
    pub gpu_demand: f64,
}

pub struct TopologyAwareIdleGpus {
    domains: HashMap<GroupKey, Vec<Domain>>,
    node_domain_value: HashMap<String, HashMap<GroupKey, String>>,
}

impl TopologyAwareIdleGpus {
    pub fn new(cluster: &ClusterInfo, topologies: &[Topology]) -> Self {
        let mut domains: HashMap<GroupKey, Vec<Domain>> = HashMap::new();
        let mut node_domain_value: HashMap<String, HashMap<GroupKey, String>> = HashMap::new();

        for topology in topologies {
            for level in &topology.levels {
                let key = (topology.name.clone(), level.node_label.clone());
                let mut by_value: HashMap<String, f64> = HashMap::new();
                for node in &cluster.nodes {
                    let Some(value) = node.label_at(&level.node_label) else {
                        continue;
                    };
                    *by_value.entry(value.to_string()).or_insert(0.0) += idle_gpu_capacity(node);
                    node_domain_value
                        .entry(node.name.clone())
                        .or_default()
                        .insert(key.clone(), value.to_string());
                }
                let mut list: Vec<Domain> = by_value
                    .into_iter()
                    .map(|(value, idle_gpus)| Domain { value, idle_gpus, committed: 0.0 })
                    .collect();
                list.sort_by(|a, b| b.idle_gpus.partial_cmp(&a.idle_gpus).unwrap_or(std::cmp::Ordering::Equal));
                domains.insert(key, list);
            }
        }

        Self { domains, node_domain_value }
    }

    /// Grows the idle-capacity of every domain containing the victim's
    /// node by the demand it frees, repositioning that domain leftward
    /// without re-sorting the rest of the list.
    pub fn add_victim(&mut self, cluster: &ClusterInfo, victim_task: &str) {
        let Some(task) = cluster.tasks.iter().find(|t| t.name == victim_task) else {
            return;
        };
        let Some(node_name) = task.scheduled_node.clone() else {
            return;
        };
        let freed = gpu_demand_scalar(&task.spec.gpu_demand);
        if freed <= 0.0 {
            return;
        }
        let Some(node_keys) = self.node_domain_value.get(&node_name).cloned() else {
            return;
        };
        for (key, value) in node_keys {
            let Some(list) = self.domains.get_mut(&key) else { continue };
            let Some(pos) = list.iter().position(|d| d.value == value) else { continue };
            list[pos].idle_gpus += freed;
            reposition(list, pos);
        }
    }

    /// Greedily assigns each subgroup demand to the topology domain with
    /// the most uncommitted capacity, grouped and processed largest-first
    /// within each `(topology, level)`. Returns `None` — the scenario is
    /// rejected — if any subgroup cannot be matched.
    pub fn assign(&mut self, demands: &[SubgroupDemand]) -> Option<HashMap<String, String>> {
        let mut by_group: HashMap<GroupKey, Vec<&SubgroupDemand>> = HashMap::new();
        for demand in demands {
            by_group.entry((demand.topology.clone(), demand.level.clone())).or_default().push(demand);
        }

        let mut assignment = HashMap::new();
        for (key, mut group_demands) in by_group {
            group_demands.sort_by(|a, b| b.gpu_demand.partial_cmp(&a.gpu_demand).unwrap_or(std::cmp::Ordering::Equal));
            let domains = self.domains.get_mut(&key)?;
            for demand in group_demands {
                let best = domains
                    .iter_mut()
                    .filter(|d| d.idle_gpus - d.committed + f64::EPSILON >= demand.gpu_demand)
                    .max_by(|a, b| (a.idle_gpus - a.committed).partial_cmp(&(b.idle_gpus - b.committed)).unwrap())?;
                best.committed += demand.gpu_demand;
                assignment.insert(demand.subgroup_key.clone(), best.value.clone());
            }
        }
        Some(assignment)
    }
}

fn reposition(list: &mut [Domain], pos: usize) {
    let mut i = pos;
    while i > 0 && list[i - 1].idle_gpus < list[i].idle_gpus {
        list.swap(i - 1, i);
        i -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::{GpuDemand, GpuDevice, GpuInventory, NodeInfo, PodSpec, Resources, Task, TopologyLevel};
    use std::collections::HashMap as StdHashMap;

    fn node(name: &str, rack: &str, idle_gpus: usize) -> NodeInfo {
        let mut labels = StdHashMap::new();
        labels.insert("rack".to_string(), rack.to_string());
        NodeInfo {
            name: name.into(),
            labels,
            gpu_inventory: GpuInventory {
                devices: (0..idle_gpus)
                    .map(|i| GpuDevice {
                        group_id: format!("{name}-{i}"),
                        fraction_capacity: 1.0,
                        fraction_allocated: 0.0,
                        memory_mib: 0,
                        memory_allocated_mib: 0,
                    })
                    .collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn rack_topology() -> Topology {
        Topology {
            name: "t".into(),
            levels: vec![TopologyLevel { node_label: "rack".into() }],
        }
    }

    #[test]
    fn assigns_larger_demand_to_domain_with_more_capacity() {
        let cluster = ClusterInfo {
            nodes: vec![node("n0", "rack-a", 1), node("n1", "rack-b", 4)],
            ..Default::default()
        };
        let mut solver = TopologyAwareIdleGpus::new(&cluster, &[rack_topology()]);
        let demands = vec![SubgroupDemand {
            subgroup_key: "sg1".into(),
            topology: "t".into(),
            level: "rack".into(),
            gpu_demand: 3.0,
        }];
        let assignment = solver.assign(&demands).unwrap();
        assert_eq!(assignment["sg1"], "rack-b");
    }

    #[test]
    fn rejects_when_no_domain_has_enough_capacity() {
        let cluster = ClusterInfo {
            nodes: vec![node("n0", "rack-a", 1)],
            ..Default::default()
        };
        let mut solver = TopologyAwareIdleGpus::new(&cluster, &[rack_topology()]);
        let demands = vec![SubgroupDemand {
            subgroup_key: "sg1".into(),
            topology: "t".into(),
            level: "rack".into(),
            gpu_demand: 5.0,
        }];
        assert!(solver.assign(&demands).is_none());
    }

    #[test]
    fn add_victim_grows_domain_capacity() {
        let cluster = ClusterInfo {
            nodes: vec![node("n0", "rack-a", 0)],
            tasks: vec![Task {
                name: "victim".into(),
                scheduled_node: Some("n0".into()),
                spec: PodSpec {
                    gpu_demand: GpuDemand::Whole { count: 2 },
                    resources: Resources::new(0, 0, 2.0),
                    ..Default::default()
                },
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut solver = TopologyAwareIdleGpus::new(&cluster, &[rack_topology()]);
        let demands = vec![SubgroupDemand {
            subgroup_key: "sg1".into(),
            topology: "t".into(),
            level: "rack".into(),
            gpu_demand: 2.0,
        }];
        assert!(solver.assign(&demands).is_none());
        solver.add_victim(&cluster, "victim");
        assert!(solver.assign(&demands).is_some());
    }
}
