//! The `PodGroup` CRD (spec §3): a gang-scheduling unit whose subgroups
//! form a tree rooted implicitly at the podgroup itself. New relative to
//! the teacher, which schedules individual pods with no gang concept.

use crate::queue::Preemptibility;

pub const ROOT_SUBGROUP: &str = "";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyConstraint {
    pub topology: String,
    pub required_level: Option<String>,
    pub preferred_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubGroup {
    pub name: String,
    /// Empty string means "parented directly at the podgroup root".
    pub parent: String,
    pub min_member: u32,
    pub topology_constraint: Option<TopologyConstraint>,
    /// Names of the tasks (pods) that belong to this subgroup, populated
    /// only for leaf subgroups (spec §3 invariant).
    pub pod_names: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PodGroupStatus {
    pub pending: u32,
    pub bound: u32,
    pub running: u32,
    pub succeeded: u32,
    pub failed: u32,
}

#[derive(Debug, Clone)]
pub struct PodGroup {
    pub name: String,
    pub namespace: String,
    pub queue: String,
    pub min_member: u32,
    pub priority_class: Option<String>,
    pub priority: i64,
    pub preemptibility: Preemptibility,
    pub subgroups: Vec<SubGroup>,
    pub status: PodGroupStatus,
}

impl PodGroup {
    /// Validates the subgroup-name-uniqueness and parent-exists-or-root
    /// invariants from spec §3.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for sg in &self.subgroups {
            if !seen.insert(sg.name.as_str()) {
                return Err(format!("duplicate subgroup name {}", sg.name));
            }
        }
        for sg in &self.subgroups {
            if !sg.parent.is_empty() && !seen.contains(sg.parent.as_str()) {
                return Err(format!(
                    "subgroup {} has unknown parent {}",
                    sg.name, sg.parent
                ));
            }
        }
        Ok(())
    }

    pub fn leaf_subgroups(&self) -> Vec<&SubGroup> {
        let parents: std::collections::HashSet<&str> = self
            .subgroups
            .iter()
            .map(|sg| sg.parent.as_str())
            .collect();
        self.subgroups
            .iter()
            .filter(|sg| !parents.contains(sg.name.as_str()))
            .collect()
    }

    /// All task names owned by this podgroup, whether via subgroups or,
    /// if there are none, the flat pod set implied by `min_member`.
    pub fn all_pod_names(&self) -> Vec<&str> {
        self.subgroups
            .iter()
            .flat_map(|sg| sg.pod_names.iter().map(String::as_str))
            .collect()
    }
}
