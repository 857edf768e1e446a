//! `Proportion` owns fair-share ordering and the three action-pipeline
//! predicates (spec §4.2, §4.3 built-ins list): it is the only plugin that
//! reasons about a queue's `deserved`/`limit`/`allocated` triple, everyone
//! else treats a queue as opaque. New relative to the teacher, which has
//! no queue/quota concept; shaped after the teacher's one-struct,
//! multi-trait plugins (e.g. `balanced_allocation::BalancedAllocation`).

use std::cmp::Ordering;

use kai_common::{resources::ResourceName, NodeInfo, Queue};

use crate::plugins::ordering::{AllocatableFn, QueueOrderFn, ReclaimableFn};
use crate::plugins::Plugin;

const AXES: [ResourceName; 3] = [ResourceName::Cpu, ResourceName::Memory, ResourceName::Gpu];

pub struct Proportion {
    /// Node label key carrying the node-pool a queue is restricted to, or
    /// empty to disable node-pool restriction.
    queue_label_key: String,
}

impl Proportion {
    pub fn new(queue_label_key: String) -> Self {
        Self { queue_label_key }
    }

    /// Sum over every axis of `allocated / deserved`, treating an
    /// unlimited deserved quota (or a zero one) as already-satisfied
    /// (ratio 0) since there's no deficit to chase.
    fn deficit(&self, queue: &Queue) -> f64 {
        AXES.iter()
            .map(|axis| {
                let deserved = queue.resources.deserved.get(*axis);
                if deserved.is_unlimited() {
                    return 0.0;
                }
                let deserved = deserved.as_f64();
                if deserved <= 0.0 {
                    return 0.0;
                }
                let allocated = queue.status.allocated.get(*axis);
                let fair_share = queue.status.fair_share.get(*axis).max(deserved);
                1.0 - (allocated / fair_share).min(1.0)
            })
            .sum()
    }

    /// `true` once `queue` has allocated at least its deserved share on
    /// every axis (spec §4.2's "at or above deserved" boundary for the
    /// UFS/OFS buckets).
    fn at_or_above_deserved(&self, queue: &Queue) -> bool {
        AXES.iter().all(|axis| {
            let deserved = queue.resources.deserved.get(*axis);
            deserved.is_unlimited() || queue.status.allocated.get(*axis) >= deserved.as_f64() - f64::EPSILON
        })
    }

    fn under_limit(&self, queue: &Queue, extra: &kai_common::Resources) -> bool {
        AXES.iter().all(|axis| {
            let limit = queue.resources.limit.get(*axis);
            limit.is_unlimited() || queue.status.allocated.get(*axis) + extra.get(*axis) <= limit.as_f64() + f64::EPSILON
        })
    }
}

impl Plugin for Proportion {
    fn name(&self) -> &str {
        "Proportion"
    }
}

impl QueueOrderFn for Proportion {
    /// Larger deficit (furthest below its deserved share) orders first.
    fn compare(&self, a: &Queue, b: &Queue) -> Ordering {
        self.deficit(b)
            .partial_cmp(&self.deficit(a))
            .unwrap_or(Ordering::Equal)
    }
}

impl ReclaimableFn for Proportion {
    /// A queue below its deserved share may reclaim from one already at or
    /// above it; two queues both below deserved, or both above, may not
    /// reclaim from each other (spec §4.2 UQ/OQ eligibility).
    fn reclaimable(&self, reclaimer_queue: &Queue, victim_queue: &Queue) -> bool {
        !self.at_or_above_deserved(reclaimer_queue) && self.at_or_above_deserved(victim_queue)
    }
}

impl AllocatableFn for Proportion {
    fn allocatable(&self, queue: &Queue, node: &NodeInfo) -> bool {
        if !self.queue_label_key.is_empty() {
            if let Some(pool) = node.label_at(&self.queue_label_key) {
                if pool != queue.name {
                    return false;
                }
            }
        }
        self.under_limit(queue, &kai_common::Resources::ZERO)
    }
}
