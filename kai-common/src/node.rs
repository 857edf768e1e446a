//! Node inventory, node-affinity selectors, and the derived GPU-group map.
//!
//! `NodeSelector`/`Affinity` generalize `libscheduler::models::{NodeSelector,
//! NodeAffinity, Affinity, PreferredSchedulingTerm(s)}`; `GpuInventory` is
//! new (the teacher has no GPU concept at all).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::resources::Resources;
use crate::taint::Taint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: NodeSelectorOperator,
    pub values: Vec<String>,
}

impl NodeSelectorRequirement {
    fn matches(&self, labels: &HashMap<String, String>) -> bool {
        let label_value = labels.get(&self.key);
        match self.operator {
            NodeSelectorOperator::Exists => label_value.is_some(),
            NodeSelectorOperator::DoesNotExist => label_value.is_none(),
            NodeSelectorOperator::In => {
                matches!(label_value, Some(v) if self.values.iter().any(|want| want == v))
            }
            NodeSelectorOperator::NotIn => {
                !matches!(label_value, Some(v) if self.values.iter().any(|want| want == v))
            }
            NodeSelectorOperator::Gt => numeric_cmp(label_value, &self.values, |a, b| a > b),
            NodeSelectorOperator::Lt => numeric_cmp(label_value, &self.values, |a, b| a < b),
        }
    }
}

fn numeric_cmp(
    label_value: Option<&String>,
    values: &[String],
    cmp: impl Fn(f64, f64) -> bool,
) -> bool {
    let Some(label_value) = label_value else {
        return false;
    };
    let Ok(lv) = label_value.parse::<f64>() else {
        return false;
    };
    values
        .first()
        .and_then(|v| v.parse::<f64>().ok())
        .is_some_and(|want| cmp(lv, want))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelectorTerm {
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

/// A disjunction of conjunctions: matches if any term matches, a term
/// matches if every requirement in it matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelector {
    pub terms: Vec<NodeSelectorTerm>,
}

impl NodeSelector {
    pub fn matches(&self, node: &NodeInfo) -> bool {
        if self.terms.is_empty() {
            return true;
        }
        self.terms.iter().any(|term| {
            term.match_expressions
                .iter()
                .all(|req| req.matches(&node.labels))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredSchedulingTerm {
    pub weight: i64,
    pub match_label: NodeSelectorRequirement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredSchedulingTerms {
    pub terms: Vec<PreferredSchedulingTerm>,
}

impl PreferredSchedulingTerms {
    /// Sum of the weights of every term whose single requirement matches.
    pub fn score(&self, node: &NodeInfo) -> i64 {
        self.terms
            .iter()
            .filter(|t| t.match_label.matches(&node.labels))
            .map(|t| t.weight)
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAffinity {
    pub required_during_scheduling_ignored_during_execution: Option<NodeSelector>,
    pub preferred_during_scheduling_ignored_during_execution: Option<PreferredSchedulingTerms>,
}

/// A simplified pod-(anti-)affinity term: match is by label equality
/// against the labels carried by tasks already resident on a node, not a
/// full topology-key-spanning join (spec does not ask for the latter).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodAffinityTerm {
    pub label_selector: HashMap<String, String>,
}

impl PodAffinityTerm {
    fn matches(&self, occupant_labels: &HashMap<String, String>) -> bool {
        self.label_selector
            .iter()
            .all(|(k, v)| occupant_labels.get(k) == Some(v))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affinity {
    pub node_affinity: Option<NodeAffinity>,
    pub pod_affinity: Vec<PodAffinityTerm>,
    pub pod_anti_affinity: Vec<PodAffinityTerm>,
}

impl Affinity {
    /// `true` if every required pod-affinity term has a match among
    /// `node`'s occupants, and no pod-anti-affinity term does.
    pub fn pod_affinity_satisfied(&self, node: &NodeInfo) -> bool {
        let satisfied_by_any_occupant = |term: &PodAffinityTerm| {
            node.occupant_task_labels.iter().any(|labels| term.matches(labels))
        };
        self.pod_affinity.iter().all(satisfied_by_any_occupant)
            && !self.pod_anti_affinity.iter().any(satisfied_by_any_occupant)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub unschedulable: bool,
    pub taints: Vec<Taint>,
    pub node_pool: Option<String>,
}

/// One physical GPU's sharing-relevant capacity, keyed by a stable group
/// id in `NodeInfo::gpu_groups`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuDevice {
    pub group_id: String,
    /// Fractional capacity available for sharing, normally 1.0.
    pub fraction_capacity: f64,
    pub fraction_allocated: f64,
    pub memory_mib: u64,
    pub memory_allocated_mib: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuInventory {
    /// One entry per physical GPU on the node, whether whole or shared.
    pub devices: Vec<GpuDevice>,
    /// MIG profile name -> free slice count (e.g. "1g.5gb" -> 3).
    pub mig_profiles: HashMap<String, u32>,
    /// DRA device class -> free device-slice count.
    pub dra_device_slices: HashMap<String, u32>,
}

impl GpuInventory {
    pub fn whole_gpu_count(&self) -> u32 {
        self.devices.len() as u32
    }

    pub fn idle_whole_gpus(&self) -> u32 {
        self.devices
            .iter()
            .filter(|d| d.fraction_allocated <= f64::EPSILON)
            .count() as u32
    }

    pub fn group(&self, group_id: &str) -> Option<&GpuDevice> {
        self.devices.iter().find(|d| d.group_id == group_id)
    }

    pub fn group_mut(&mut self, group_id: &str) -> Option<&mut GpuDevice> {
        self.devices.iter_mut().find(|d| d.group_id == group_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub spec: NodeSpec,
    pub allocatable: Resources,
    pub requested: Resources,
    pub gpu_inventory: GpuInventory,
    /// Maximum number of pods this node will admit (used by the solvers'
    /// `maxPods` bound, e.g. the fraction-preemption scenario in spec §8).
    pub max_pods: u32,
    /// Labels of each task already resident on this node, kept by the
    /// snapshotter for pod-(anti-)affinity evaluation.
    pub occupant_task_labels: Vec<HashMap<String, String>>,
}

impl NodeInfo {
    pub fn idle(&self) -> Resources {
        self.allocatable.saturating_sub(&self.requested)
    }

    pub fn label_at(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with_label(k: &str, v: &str) -> NodeInfo {
        let mut labels = HashMap::new();
        labels.insert(k.to_string(), v.to_string());
        NodeInfo {
            name: "n".into(),
            labels,
            ..Default::default()
        }
    }

    #[test]
    fn node_selector_in_matches() {
        let selector = NodeSelector {
            terms: vec![NodeSelectorTerm {
                match_expressions: vec![NodeSelectorRequirement {
                    key: "disktype".into(),
                    operator: NodeSelectorOperator::In,
                    values: vec!["ssd".into()],
                }],
            }],
        };
        assert!(selector.matches(&node_with_label("disktype", "ssd")));
        assert!(!selector.matches(&node_with_label("disktype", "hdd")));
    }

    #[test]
    fn preferred_terms_sum_matching_weights() {
        let terms = PreferredSchedulingTerms {
            terms: vec![
                PreferredSchedulingTerm {
                    weight: 10,
                    match_label: NodeSelectorRequirement {
                        key: "zone".into(),
                        operator: NodeSelectorOperator::In,
                        values: vec!["us-west".into()],
                    },
                },
                PreferredSchedulingTerm {
                    weight: 5,
                    match_label: NodeSelectorRequirement {
                        key: "rack".into(),
                        operator: NodeSelectorOperator::In,
                        values: vec!["r1".into()],
                    },
                },
            ],
        };
        let mut node = node_with_label("zone", "us-west");
        node.labels.insert("rack".into(), "r1".into());
        assert_eq!(terms.score(&node), 15);
    }
}
