//! Configuration surface (spec §6): names, not flags. Deserialized from a
//! YAML file the way `rks::cli::Cli` reads its `--config` path with
//! `serde_yaml`, except we give the scheduler and binder their own
//! structs rather than one monolithic CLI.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_scheduler_name() -> String {
    "kai-scheduler".to_string()
}

fn default_queue_label_key() -> String {
    "kai.scheduler/queue".to_string()
}

fn default_allocation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_name")]
    pub scheduler_name: String,
    #[serde(default = "default_queue_label_key")]
    pub queue_label_key: String,
    pub node_pool_label_key: Option<String>,
    #[serde(default)]
    pub fake_gpu_mode: bool,
    #[serde(default)]
    pub dra_feature_gate: bool,
    #[serde(default = "default_true")]
    pub gpu_sharing_enabled: bool,
    pub client_qps: Option<f32>,
    pub client_burst: Option<u32>,
    pub metrics_address: Option<String>,
    pub probe_address: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_name: default_scheduler_name(),
            queue_label_key: default_queue_label_key(),
            node_pool_label_key: None,
            fake_gpu_mode: false,
            dra_feature_gate: false,
            gpu_sharing_enabled: true,
            client_qps: None,
            client_burst: None,
            metrics_address: None,
            probe_address: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinderConfig {
    pub reservation_namespace: String,
    pub reservation_service_account: String,
    pub reservation_pod_image: String,
    pub reservation_app_label: String,
    #[serde(default = "default_allocation_timeout_secs")]
    pub resource_reservation_allocation_timeout_secs: u64,
    pub scaling_pod_namespace: Option<String>,
    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,
    #[serde(default = "default_rate_limiter_base_delay_ms")]
    pub rate_limiter_base_delay_ms: u64,
    #[serde(default = "default_rate_limiter_max_delay_ms")]
    pub rate_limiter_max_delay_ms: u64,
    pub webhook_port: Option<u16>,
    #[serde(default = "default_volume_binding_timeout_secs")]
    pub volume_binding_timeout_secs: u64,
}

fn default_max_concurrent_reconciles() -> usize {
    4
}

fn default_rate_limiter_base_delay_ms() -> u64 {
    5
}

fn default_rate_limiter_max_delay_ms() -> u64 {
    1000
}

fn default_volume_binding_timeout_secs() -> u64 {
    600
}

impl BinderConfig {
    pub fn resource_reservation_allocation_timeout(&self) -> Duration {
        Duration::from_secs(self.resource_reservation_allocation_timeout_secs)
    }

    pub fn volume_binding_timeout(&self) -> Duration {
        Duration::from_secs(self.volume_binding_timeout_secs)
    }
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            reservation_namespace: "kai-resource-reservation".to_string(),
            reservation_service_account: "kai-resource-reservation".to_string(),
            reservation_pod_image: "kai-scheduler/resource-reservation:latest".to_string(),
            reservation_app_label: "kai-resource-reservation".to_string(),
            resource_reservation_allocation_timeout_secs: default_allocation_timeout_secs(),
            scaling_pod_namespace: None,
            max_concurrent_reconciles: default_max_concurrent_reconciles(),
            rate_limiter_base_delay_ms: default_rate_limiter_base_delay_ms(),
            rate_limiter_max_delay_ms: default_rate_limiter_max_delay_ms(),
            webhook_port: None,
            volume_binding_timeout_secs: default_volume_binding_timeout_secs(),
        }
    }
}
