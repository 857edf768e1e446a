//! The `Queue` CRD (spec §3), new relative to the teacher — `libscheduler`
//! has no quota concept at all.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resources::{Quantity, QuotaResources, Resources};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preemptibility {
    Preemptible,
    NonPreemptible,
}

impl Default for Preemptibility {
    fn default() -> Self {
        Preemptibility::Preemptible
    }
}

/// The per-resource `{deserved, limit, overQuotaWeight}` triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueResources {
    pub deserved: QuotaResources,
    pub limit: QuotaResources,
    /// Non-negative; relative share of capacity beyond `deserved`.
    pub over_quota_weight_cpu: f64,
    pub over_quota_weight_memory: f64,
    pub over_quota_weight_gpu: f64,
}

impl QueueResources {
    pub fn unlimited() -> Self {
        Self {
            deserved: QuotaResources {
                cpu: Quantity::Unlimited,
                memory: Quantity::Unlimited,
                gpu: Quantity::Unlimited,
            },
            limit: QuotaResources {
                cpu: Quantity::Unlimited,
                memory: Quantity::Unlimited,
                gpu: Quantity::Unlimited,
            },
            over_quota_weight_cpu: 1.0,
            over_quota_weight_memory: 1.0,
            over_quota_weight_gpu: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    pub child_queues: Vec<String>,
    pub allocated: Resources,
    pub requested: Resources,
    pub fair_share: Resources,
}

#[derive(Debug, Clone)]
pub struct Queue {
    pub name: String,
    pub parent: Option<String>,
    pub resources: QueueResources,
    pub priority: i64,
    pub preemptibility: Preemptibility,
    pub reclaim_min_runtime: Option<Duration>,
    pub status: QueueStatus,
}

impl Queue {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.status.child_queues.is_empty()
    }
}
