//! Resource-reservation pre-bind plugin (spec §4.4, §4.5 step 2a). For
//! `Fraction`-class pods, ensures exactly one reservation pod exists for
//! the selected GPU group before the sharing pod may bind, waits for the
//! reservation pod to publish the device UUID it discovers once running,
//! then relays that UUID plus the fraction/memory demand into the
//! sharing pod's patch.
//!
//! No Kubernetes client lives in this crate, so the reservation pod
//! itself is modeled as an in-memory record rather than a real object;
//! the concurrency shape around it — one lock per GPU group, acquired
//! for the whole list-then-create-or-delete sequence — is
//! `kai_common::gpu_group::GpuGroupRegistry`, itself lifted from
//! `rks::server::NodeRegistry`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kai_common::{reservation_pod_should_exist, GpuDemand, GpuGroupRegistry, Task};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::PodPatch;

/// Stand-in for the real reservation Pod object (spec §4.4 steps 1-4).
#[derive(Debug, Clone)]
pub struct ReservationPod {
    pub group_id: String,
    pub node: String,
    pub namespace: String,
    pub running: bool,
    pub device_uuid: Option<String>,
}

impl ReservationPod {
    fn pending(group_id: &str, node: &str, namespace: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            node: node.to_string(),
            namespace: namespace.to_string(),
            running: false,
            device_uuid: None,
        }
    }
}

/// The reservation pods currently known to exist, keyed by GPU group.
/// Stands in for listing pods by the `runai-gpu-group` label against a
/// real API server.
#[derive(Default)]
pub struct ReservationStore {
    pods: Mutex<HashMap<String, ReservationPod>>,
}

impl ReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a previously-created reservation pod Running and records
    /// the device UUID it discovered in-container (spec §4.4 step 4).
    /// Exercised directly by tests standing in for the device-plugin
    /// sidecar that would normally report this.
    pub async fn mark_running(&self, group_id: &str, device_uuid: impl Into<String>) {
        if let Some(pod) = self.pods.lock().await.get_mut(group_id) {
            pod.running = true;
            pod.device_uuid = Some(device_uuid.into());
        }
    }

    pub async fn get(&self, group_id: &str) -> Option<ReservationPod> {
        self.pods.lock().await.get(group_id).cloned()
    }

    async fn upsert(&self, pod: ReservationPod) {
        self.pods.lock().await.insert(pod.group_id.clone(), pod);
    }

    async fn remove(&self, group_id: &str) {
        self.pods.lock().await.remove(group_id);
    }
}

/// Spec §4.4 "Sync for a GPU group": under the group's lock, create the
/// reservation pod if sharing pods or an open BindRequest need it and
/// none exists yet; delete it if neither condition holds any longer.
/// Never races informer lag into deleting a reservation a BindRequest
/// still depends on, because the caller holds the group lock for the
/// list-then-act sequence.
pub async fn sync_gpu_group(
    registry: &GpuGroupRegistry,
    store: &ReservationStore,
    group_id: &str,
    node: &str,
    namespace: &str,
    sharing_pod_count: usize,
    active_bind_request_count: usize,
) {
    let _guard = registry.lock(group_id).await;
    let should_exist = reservation_pod_should_exist(sharing_pod_count, active_bind_request_count);
    let exists = store.get(group_id).await.is_some();

    match (should_exist, exists) {
        (true, false) => store.upsert(ReservationPod::pending(group_id, node, namespace)).await,
        (false, true) => store.remove(group_id).await,
        _ => {}
    }
}

/// Resolves a `Fraction`-class pod's sharing-reservation env/annotation
/// patch (spec §4.5 step 2a): creates the reservation pod for the
/// selected GPU group if needed, waits up to `poll_timeout` for it to
/// report a device UUID, then stamps `NVIDIA_VISIBLE_DEVICES`,
/// `GPU_PORTION`, and `GPU_MEMORY_LIMIT` plus the `runai-gpu-group`
/// label into the patch. A non-fraction pod is a no-op success.
pub struct ResourceReservationPlugin {
    registry: Arc<GpuGroupRegistry>,
    store: Arc<ReservationStore>,
    reservation_namespace: String,
    poll_timeout: Duration,
}

impl ResourceReservationPlugin {
    pub fn new(registry: Arc<GpuGroupRegistry>, store: Arc<ReservationStore>, reservation_namespace: impl Into<String>, poll_timeout: Duration) -> Self {
        Self {
            registry,
            store,
            reservation_namespace: reservation_namespace.into(),
            poll_timeout,
        }
    }

    pub async fn pre_bind(&self, task: &Task, group_id: &str, node_name: &str, sharing_pod_count: usize, active_bind_request_count: usize) -> anyhow::Result<PodPatch> {
        if !task.spec.gpu_demand.is_fraction() {
            return Ok(PodPatch::default());
        }

        sync_gpu_group(
            &self.registry,
            &self.store,
            group_id,
            node_name,
            &self.reservation_namespace,
            sharing_pod_count,
            active_bind_request_count,
        )
        .await;

        let uuid = timeout(self.poll_timeout, self.wait_for_uuid(group_id))
            .await
            .map_err(|_| anyhow::anyhow!("reservation pod for gpu group {group_id} did not report a device UUID in time"))?;

        let mut patch = PodPatch::default();
        patch.env.insert("NVIDIA_VISIBLE_DEVICES".to_string(), uuid);
        patch.annotations.insert("runai-gpu-group".to_string(), group_id.to_string());
        if let GpuDemand::Fraction { fraction, .. } = task.spec.gpu_demand {
            patch.env.insert("GPU_PORTION".to_string(), fraction.to_string());
        }
        if let GpuDemand::Memory { mib } = task.spec.gpu_demand {
            patch.env.insert("GPU_MEMORY_LIMIT".to_string(), mib.to_string());
        }
        Ok(patch)
    }

    async fn wait_for_uuid(&self, group_id: &str) -> String {
        loop {
            if let Some(pod) = self.store.get(group_id).await {
                if let Some(uuid) = pod.device_uuid {
                    return uuid;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::PodSpec;

    fn fraction_task(name: &str) -> Task {
        Task {
            name: name.into(),
            spec: PodSpec {
                gpu_demand: GpuDemand::Fraction { fraction: 0.5, num_devices: 1 },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn non_fraction_pod_is_a_no_op() {
        let registry = Arc::new(GpuGroupRegistry::new());
        let store = Arc::new(ReservationStore::new());
        let plugin = ResourceReservationPlugin::new(registry, store, "kai-resource-reservation", Duration::from_millis(100));
        let patch = plugin.pre_bind(&Task::default(), "group-a", "n1", 0, 0).await.unwrap();
        assert!(patch.env.is_empty());
    }

    #[tokio::test]
    async fn fraction_pod_waits_for_device_uuid_then_patches_env() {
        let registry = Arc::new(GpuGroupRegistry::new());
        let store = Arc::new(ReservationStore::new());
        let plugin = ResourceReservationPlugin::new(registry, store.clone(), "kai-resource-reservation", Duration::from_secs(1));

        let task = fraction_task("p1");
        let store_clone = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store_clone.mark_running("group-a", "GPU-1234").await;
        });

        let patch = plugin.pre_bind(&task, "group-a", "n1", 1, 1).await.unwrap();
        assert_eq!(patch.env.get("NVIDIA_VISIBLE_DEVICES").unwrap(), "GPU-1234");
        assert_eq!(patch.env.get("GPU_PORTION").unwrap(), "0.5");
        assert_eq!(patch.annotations.get("runai-gpu-group").unwrap(), "group-a");
    }

    #[tokio::test]
    async fn times_out_if_reservation_pod_never_reports_uuid() {
        let registry = Arc::new(GpuGroupRegistry::new());
        let store = Arc::new(ReservationStore::new());
        let plugin = ResourceReservationPlugin::new(registry, store, "kai-resource-reservation", Duration::from_millis(20));
        let result = plugin.pre_bind(&fraction_task("p1"), "group-a", "n1", 1, 1).await;
        assert!(result.is_err());
    }
}
