//! `Topology` filter plugin: once the gang-scheduling solver has pinned a
//! subgroup to a topology domain (spec §4.4 "Topology-aware placement"),
//! this plugin rejects any node outside that domain. The solver writes the
//! pinned domain into `CycleState` under [`PINNED_DOMAIN_KEY`] before the
//! per-node filter pass runs; absent that key every node passes, since the
//! actual domain selection is the solver's job, not a single node filter's.

use kai_common::{NodeInfo, Task};

use crate::cycle_state::CycleState;
use crate::plugins::{Code, FilterPlugin, Plugin, Status};

pub const PINNED_DOMAIN_KEY: &str = "TopologyPinnedDomain";

/// Written to `CycleState` by the scenario solver once it has chosen a
/// topology domain for the task's subgroup.
pub struct PinnedDomain {
    pub level_label_key: String,
    pub domain_value: String,
}

pub struct Topology;

impl Plugin for Topology {
    fn name(&self) -> &str {
        "Topology"
    }
}

impl FilterPlugin for Topology {
    fn filter(&self, state: &mut CycleState, _task: &Task, node: &NodeInfo) -> Status {
        let Some(pinned) = state.read::<PinnedDomain>(PINNED_DOMAIN_KEY) else {
            return Status::default();
        };

        match node.label_at(&pinned.level_label_key) {
            Some(value) if value == pinned.domain_value => Status::default(),
            _ => Status::new(
                Code::Unschedulable,
                vec![format!(
                    "node not in pinned topology domain {}={}",
                    pinned.level_label_key, pinned.domain_value
                )],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pinned_domain_passes_every_node() {
        let plugin = Topology;
        let mut state = CycleState::default();
        let status = plugin.filter(&mut state, &Task::default(), &NodeInfo::default());
        assert_eq!(status.code, Code::Success);
    }

    #[test]
    fn rejects_node_outside_pinned_domain() {
        let plugin = Topology;
        let mut state = CycleState::default();
        state.write(
            PINNED_DOMAIN_KEY,
            Box::new(PinnedDomain {
                level_label_key: "topology.kai.io/rack".into(),
                domain_value: "rack-a".into(),
            }),
        );
        let mut node = NodeInfo::default();
        node.labels.insert("topology.kai.io/rack".into(), "rack-b".into());
        let status = plugin.filter(&mut state, &Task::default(), &node);
        assert_eq!(status.code, Code::Unschedulable);
    }

    #[test]
    fn accepts_node_matching_pinned_domain() {
        let plugin = Topology;
        let mut state = CycleState::default();
        state.write(
            PINNED_DOMAIN_KEY,
            Box::new(PinnedDomain {
                level_label_key: "topology.kai.io/rack".into(),
                domain_value: "rack-a".into(),
            }),
        );
        let mut node = NodeInfo::default();
        node.labels.insert("topology.kai.io/rack".into(), "rack-a".into());
        let status = plugin.filter(&mut state, &Task::default(), &node);
        assert_eq!(status.code, Code::Success);
    }
}
