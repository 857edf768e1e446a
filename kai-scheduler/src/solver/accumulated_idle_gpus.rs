//! `AccumulatedIdleGpus` (spec §4.3): tracks idle GPU capacity per node as
//! victims are tentatively added to a scenario, kept as a descending list
//! repositioned in place rather than re-sorted, so the solver can
//! cheaply ask "does my best-fit node still cover the largest remaining
//! preemptor demand?" after every victim.

use kai_common::NodeInfo;

use crate::cache::ClusterInfo;

use super::gpu_demand_scalar;

pub(crate) fn idle_gpu_capacity(node: &NodeInfo) -> f64 {
    let device_idle: f64 = node
        .gpu_inventory
        .devices
        .iter()
        .map(|d| (d.fraction_capacity - d.fraction_allocated).max(0.0))
        .sum();
    let mig_idle: f64 = node.gpu_inventory.mig_profiles.values().map(|&c| c as f64).sum();
    device_idle + mig_idle
}

pub struct AccumulatedIdleGpus {
    /// Sorted descending by idle GPU capacity.
    by_node: Vec<(String, f64)>,
}

impl AccumulatedIdleGpus {
    pub fn new(cluster: &ClusterInfo) -> Self {
        let mut by_node: Vec<(String, f64)> = cluster.nodes.iter().map(|n| (n.name.clone(), idle_gpu_capacity(n))).collect();
        by_node.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Self { by_node }
    }

    /// Adds `victim_task`'s freed GPU demand back to its node's idle pool
    /// and repositions that node leftward to keep the list sorted.
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
        if let Some(entry) = self.by_node.iter_mut().find(|(n, _)| *n == node_name) {
            entry.1 += freed;
        }
        self.reposition(&node_name);
    }

    fn reposition(&mut self, node_name: &str) {
        let Some(mut i) = self.by_node.iter().position(|(n, _)| n == node_name) else {
            return;
        };
        while i > 0 && self.by_node[i - 1].1 < self.by_node[i].1 {
            self.by_node.swap(i - 1, i);
            i -= 1;
        }
    }

    /// The node with the most idle capacity right now, if any node can
    /// cover `demand`.
    pub fn best_fit(&self, demand: f64) -> Option<&str> {
        self.by_node.first().filter(|(_, idle)| *idle + f64::EPSILON >= demand).map(|(n, _)| n.as_str())
    }

    /// Whether the scenario, as it stands, can possibly accommodate a
    /// preemptor demanding `demand` GPU-equivalents on a single node.
    pub fn can_accommodate(&self, demand: f64) -> bool {
        self.best_fit(demand).is_some()
    }

    pub fn idle_on(&self, node_name: &str) -> f64 {
        self.by_node.iter().find(|(n, _)| n == node_name).map(|(_, idle)| *idle).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::{GpuDevice, GpuInventory, PodSpec, Resources, Task};

    fn node_with_gpus(name: &str, whole: usize) -> NodeInfo {
        NodeInfo {
            name: name.into(),
            gpu_inventory: GpuInventory {
                devices: (0..whole)
                    .map(|i| GpuDevice {
                        group_id: format!("{name}-gpu{i}"),
                        fraction_capacity: 1.0,
                        fraction_allocated: 1.0,
                        memory_mib: 0,
                        memory_allocated_mib: 0,
                    })
                    .collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn repositions_node_after_freeing_capacity() {
        let cluster = ClusterInfo {
            nodes: vec![node_with_gpus("n1", 1), node_with_gpus("n2", 2)],
            tasks: vec![Task {
                name: "victim".into(),
                scheduled_node: Some("n1".into()),
                spec: PodSpec {
                    gpu_demand: kai_common::GpuDemand::Whole { count: 1 },
                    resources: Resources::new(0, 0, 1.0),
                    ..Default::default()
                },
                ..Default::default()
            }],
            ..Default::default()
        };

        let mut solver = AccumulatedIdleGpus::new(&cluster);
        assert!(!solver.can_accommodate(1.0));
        solver.add_victim(&cluster, "victim");
        assert!(solver.can_accommodate(1.0));
        assert_eq!(solver.best_fit(1.0), Some("n1"));
    }
}
