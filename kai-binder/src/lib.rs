//! kai-binder: the worker side of the bind hand-off (spec §4.5).
//!
//! `kai-scheduler` decides *where* a gang goes and writes a `BindRequest`;
//! this crate drains that queue, runs the pre-bind plugin chain against
//! each request, and performs (or simulates, absent a real API server)
//! the bind. Generalizes `rks::scheduler::Scheduler::run` — a single
//! task looping on a channel and writing results back to a store — into
//! an N-worker pool draining a shared queue, each worker running the
//! same pre-bind chain before its bind call, matching `rks::server`'s
//! "one spawned task per unit of concurrent work, a shared registry
//! guarded by locks" shape.
//!
//! Pre-bind plugins here are `async fn`, unlike `kai_scheduler::plugins`'
//! synchronous `PreBindPlugin`: the scheduler's solvers never suspend
//! (spec §5), but the binder's reservation-pod and DRA-claim work
//! genuinely waits on shared state, so it gets its own trait via
//! `async-trait` rather than forcing the scheduler's trait to suspend.

pub mod admission;
pub mod dra;
pub mod reconciler;
pub mod reservation;
pub mod state_machine;

use std::collections::HashMap;

/// The env/annotation/label mutations a pre-bind plugin wants applied to
/// the pod before it binds. `kai_common::task::PodSpec` has no such map
/// (the scheduler never needs one), so the binder carries its own
/// accumulator and merges every plugin's patch before the bind call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodPatch {
    pub env: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub labels: HashMap<String, String>,
}

impl PodPatch {
    /// Merges `other` into `self`, with `other` winning on key collision —
    /// later pre-bind plugins may refine an earlier one's annotation.
    pub fn merge(&mut self, other: PodPatch) {
        self.env.extend(other.env);
        self.annotations.extend(other.annotations);
        self.labels.extend(other.labels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_lets_later_patch_win_on_key_collision() {
        let mut a = PodPatch::default();
        a.env.insert("X".to_string(), "1".to_string());
        let mut b = PodPatch::default();
        b.env.insert("X".to_string(), "2".to_string());
        b.env.insert("Y".to_string(), "3".to_string());

        a.merge(b);
        assert_eq!(a.env.get("X").unwrap(), "2");
        assert_eq!(a.env.get("Y").unwrap(), "3");
    }
}
