//! `MinRuntime` preemptable-predicate plugin: a task that hasn't been
//! `Running` for at least its queue's `reclaim-min-runtime` grace period
//! (spec §4.2) is not yet a valid preemption victim. Constructed per
//! reclaim pass with the grace period the victim's queue carries, since
//! `PreemptableFn` only sees tasks, not queues.

use std::time::Duration;

use kai_common::Task;

use crate::plugins::ordering::PreemptableFn;
use crate::plugins::Plugin;

pub struct MinRuntime {
    grace_period: Duration,
}

impl MinRuntime {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }
}

impl Plugin for MinRuntime {
    fn name(&self) -> &str {
        "MinRuntime"
    }
}

impl PreemptableFn for MinRuntime {
    fn preemptable(&self, _preemptor: &Task, victim: &Task) -> bool {
        match victim.running_since {
            Some(started) => started.elapsed() >= self.grace_period,
            None => true,
        }
    }
}
