//! Wraps one scheduling session's private snapshot, the plugin registry,
//! and the fair-share state the action pipeline reads, generalizing the
//! role `libscheduler::scheduler::Scheduler` plays for the teacher's
//! single-pod cycle into the multi-action, gang-aware session spec §4.3
//! describes.

use std::sync::Arc;

use kai_common::{Resources, SchedulerConfig};

use crate::cache::ClusterInfo;
use crate::fairshare::{compute_fair_share, QueueFairShare};
use crate::plugins::Registry;
use crate::statement::Statement;
use std::collections::HashMap;

pub struct Session {
    pub cluster: ClusterInfo,
    pub registry: Arc<Registry>,
    pub fair_share: HashMap<String, QueueFairShare>,
    pub config: SchedulerConfig,
}

impl Session {
    pub fn open(cluster: ClusterInfo, registry: Arc<Registry>, config: SchedulerConfig) -> Self {
        let capacity = cluster.nodes.iter().fold(Resources::ZERO, |acc, n| acc + n.allocatable);
        let fair_share = compute_fair_share(&cluster.queues, capacity, None, 0.0);
        Self {
            cluster,
            registry,
            fair_share,
            config,
        }
    }

    pub fn statement(&mut self) -> Statement<'_> {
        Statement::new(&mut self.cluster)
    }

    pub fn refresh_fair_share(&mut self) {
        let capacity = self.cluster.nodes.iter().fold(Resources::ZERO, |acc, n| acc + n.allocatable);
        self.fair_share = compute_fair_share(&self.cluster.queues, capacity, None, 0.0);
    }
}
