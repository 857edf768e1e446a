//! The cluster-scoped `Topology` CRD (spec §3 / §6): an ordered sequence
//! of node-label levels from coarse to fine. New relative to the teacher.

pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyLevel {
    pub node_label: String,
}

#[derive(Debug, Clone)]
pub struct Topology {
    pub name: String,
    pub levels: Vec<TopologyLevel>,
}

impl Topology {
    /// `kubernetes.io/hostname` is only permitted as the last level.
    pub fn validate(&self) -> Result<(), String> {
        for (i, level) in self.levels.iter().enumerate() {
            if level.node_label == HOSTNAME_LABEL && i != self.levels.len() - 1 {
                return Err(format!(
                    "topology {}: {HOSTNAME_LABEL} must be the last level",
                    self.name
                ));
            }
        }
        Ok(())
    }

    pub fn level_index(&self, node_label: &str) -> Option<usize> {
        self.levels.iter().position(|l| l.node_label == node_label)
    }

    /// Every level coarser-than-or-equal-to `node_label`, coarsest first.
    pub fn levels_up_to(&self, node_label: &str) -> &[TopologyLevel] {
        match self.level_index(node_label) {
            Some(idx) => &self.levels[..=idx],
            None => &[],
        }
    }
}
