//! `NominatedNode` score plugin: gives a strong bonus to the node a prior
//! preemption cycle already nominated for this task (spec §4.3 built-ins
//! list), so a later cycle retries it first instead of re-exploring the
//! whole cluster. Pure score, not a filter — a nominated node that no
//! longer fits still loses on `NodeResourcesFit`.

use kai_common::{NodeInfo, Task};

use crate::cycle_state::CycleState;
use crate::plugins::{DefaultNormalizeScore, Plugin, ScoreExtension, ScorePlugin, Status};

const NOMINATION_BONUS: i64 = 100;

pub struct NominatedNode;

impl Plugin for NominatedNode {
    fn name(&self) -> &str {
        "NominatedNode"
    }
}

impl ScorePlugin for NominatedNode {
    fn score(&self, _: &mut CycleState, task: &Task, node: &NodeInfo) -> (i64, Status) {
        let score = if task.nominated_node_name.as_deref() == Some(node.name.as_str()) {
            NOMINATION_BONUS
        } else {
            0
        };
        (score, Status::default())
    }

    fn score_extension(&self) -> Box<dyn ScoreExtension> {
        Box::new(DefaultNormalizeScore {
            max_score: NOMINATION_BONUS,
            reverse: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominated_node_scores_higher() {
        let plugin = NominatedNode;
        let mut state = CycleState::default();
        let task = Task {
            nominated_node_name: Some("node-a".into()),
            ..Default::default()
        };
        let nominated = NodeInfo {
            name: "node-a".into(),
            ..Default::default()
        };
        let other = NodeInfo {
            name: "node-b".into(),
            ..Default::default()
        };
        let (nominated_score, _) = plugin.score(&mut state, &task, &nominated);
        let (other_score, _) = plugin.score(&mut state, &task, &other);
        assert!(nominated_score > other_score);
    }
}
