//! The action pipeline (spec §4.3): a session runs a fixed-by-configuration
//! sequence of actions — Allocate, Reclaim, Consolidate, Preempt — each
//! composing the plugin registry's node-order/predicate functions with a
//! `Statement` the action can roll back when a gang can't be fully placed.
//! New relative to the teacher, whose `schedule_one` commits a single pod
//! per cycle with no multi-action pipeline or rollback at all; the shape
//! (group pending work, order it, try nodes in score order, commit or
//! roll back) follows the teacher's `schedule_one` + `Registry` composition
//! one action at a time instead of one pod at a time.

pub mod allocate;
pub mod consolidate;
pub mod preempt;
pub mod reclaim;

use std::collections::HashMap;

use kai_common::{NodeInfo, Task};

use crate::cycle_state::CycleState;
use crate::plugins::topology::{PinnedDomain, PINNED_DOMAIN_KEY};
use crate::plugins::Registry;
use crate::session::Session;

/// The outcome of one full pass through the action pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub allocate: allocate::AllocateReport,
    pub reclaim: reclaim::ReclaimReport,
    pub consolidate: consolidate::ConsolidateReport,
    pub preempt: preempt::PreemptReport,
}

/// Runs the fixed-by-configuration action sequence (spec §4.3): Allocate,
/// Reclaim, Consolidate, Preempt, refreshing fair-share between stages so
/// each action sees the allocation/requested totals the prior stage left
/// behind.
pub fn run_pipeline(session: &mut Session) -> PipelineReport {
    let allocate = allocate::run(session);
    session.refresh_fair_share();
    let reclaim = reclaim::run(session);
    session.refresh_fair_share();
    let consolidate = consolidate::run(session);
    session.refresh_fair_share();
    let preempt = preempt::run(session);

    PipelineReport {
        allocate,
        reclaim,
        consolidate,
        preempt,
    }
}

/// Runs PreFilter once then Filter against every candidate node, returning
/// the subset that passed, each paired with its composed score — spec
/// §4.3's "node-order plugins as scoring and predicate plugins as
/// feasibility", generalizing the teacher's `schedule_one` Filter+Score
/// phases to be callable per task from any action. `pinned_domain`, when
/// set by a caller that ran the topology-aware solver, seeds the
/// `Topology` filter plugin so only nodes in the chosen domain pass.
pub(crate) fn feasible_nodes_sorted(
    registry: &Registry,
    task: &Task,
    nodes: &[NodeInfo],
    pinned_domain: Option<(&str, &str)>,
) -> Vec<(String, i64)> {
    let mut state = CycleState::default();
    if let Some((level_label_key, domain_value)) = pinned_domain {
        state.write(
            PINNED_DOMAIN_KEY,
            Box::new(PinnedDomain {
                level_label_key: level_label_key.to_string(),
                domain_value: domain_value.to_string(),
            }),
        );
    }
    for plugin in &registry.pre_filter {
        let (_, status) = plugin.pre_filter(&mut state, task, nodes);
        if !status.is_success() {
            return Vec::new();
        }
    }
    for plugin in &registry.pre_score {
        let status = plugin.pre_score(&mut state, task, nodes);
        if !status.is_success() {
            return Vec::new();
        }
    }

    let mut scored: Vec<(String, i64)> = nodes
        .iter()
        .filter(|node| registry.run_filters(&mut state, task, node).is_success())
        .map(|node| (node.name.clone(), registry.run_scores(&mut state, task, node)))
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
}

/// Groups tasks by the podgroup they belong to, preserving encounter
/// order within each group (callers re-sort as each action requires).
pub(crate) fn group_by_podgroup<'a>(tasks: impl Iterator<Item = &'a Task>) -> HashMap<String, Vec<&'a Task>> {
    let mut groups: HashMap<String, Vec<&Task>> = HashMap::new();
    for task in tasks {
        groups.entry(task.pod_group_name.clone()).or_default().push(task);
    }
    groups
}
