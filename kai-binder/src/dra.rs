//! Dynamic Resource Allocation pre-bind plugin (spec §4.5 step 2b):
//! patches each `ResourceClaim` a `BindRequest` allocated against,
//! appending the bound pod to the claim's `ReservedFor` list without
//! disturbing devices other pods are already consuming (DRA permits a
//! device with `shareable: true` to be reserved by more than one pod).
//! A no-op when the scheduling config's DRA feature gate is off, mirroring
//! `SchedulerConfig::dra_feature_gate` gating the plugin in `kai-scheduler`.
//!
//! No claim CRD lives in this crate (nothing here talks to an API
//! server), so claim state is an in-memory table keyed by claim name,
//! analogous to `reservation::ReservationStore` standing in for the
//! reservation Pod.

use std::collections::HashMap;
use std::sync::Arc;

use kai_common::{BindRequest, ResourceClaimAllocation};
use tokio::sync::Mutex;

/// A `ResourceClaim`'s allocation result plus who currently holds it.
#[derive(Debug, Clone, Default)]
pub struct ClaimStatus {
    pub driver: String,
    pub pool: String,
    pub device: String,
    pub request: String,
    pub shareable: bool,
    pub reserved_for: Vec<String>,
}

#[derive(Default)]
pub struct ClaimStore {
    claims: Mutex<HashMap<String, ClaimStatus>>,
}

impl ClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, claim_name: &str) -> Option<ClaimStatus> {
        self.claims.lock().await.get(claim_name).cloned()
    }

    /// Records an allocation and adds `pod` to `reserved_for`, creating the
    /// claim entry on first reservation. A pod already present is left
    /// untouched rather than duplicated — reconciling the same
    /// `BindRequest` twice must be idempotent (spec §8 testable property).
    /// A claim already reserved for a *different* pod rejects the new
    /// reservation unless the device is `shareable` (spec §4.4).
    async fn reserve(&self, allocation: &ResourceClaimAllocation, pod: &str) -> anyhow::Result<()> {
        let mut claims = self.claims.lock().await;
        let status = claims.entry(allocation.claim_name.clone()).or_insert_with(|| ClaimStatus {
            driver: allocation.driver.clone(),
            pool: allocation.pool.clone(),
            device: allocation.device.clone(),
            request: allocation.request.clone(),
            shareable: allocation.shareable,
            reserved_for: Vec::new(),
        });

        if status.reserved_for.iter().any(|p| p == pod) {
            return Ok(());
        }
        if !status.reserved_for.is_empty() && !status.shareable {
            anyhow::bail!(
                "claim {} is not shareable: already reserved for {:?}, cannot also reserve for {pod}",
                allocation.claim_name,
                status.reserved_for
            );
        }
        status.reserved_for.push(pod.to_string());
        Ok(())
    }
}

/// Patches every `ResourceClaimAllocation` a `BindRequest` carries into
/// the claim store, reserving each claim for the request's pod. Returns
/// the number of claims touched, for the reconciler's logging.
pub struct DraClaimPlugin {
    store: Arc<ClaimStore>,
    feature_gate_enabled: bool,
}

impl DraClaimPlugin {
    pub fn new(store: Arc<ClaimStore>, feature_gate_enabled: bool) -> Self {
        Self { store, feature_gate_enabled }
    }

    pub async fn pre_bind(&self, request: &BindRequest) -> anyhow::Result<usize> {
        if !self.feature_gate_enabled || request.resource_claim_allocations.is_empty() {
            return Ok(0);
        }

        for allocation in &request.resource_claim_allocations {
            self.store.reserve(allocation, &request.pod_name).await?;
        }

        Ok(request.resource_claim_allocations.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocation(claim: &str, device: &str, shareable: bool) -> ResourceClaimAllocation {
        ResourceClaimAllocation {
            claim_name: claim.to_string(),
            driver: "gpu.nvidia.com".to_string(),
            pool: "pool-a".to_string(),
            device: device.to_string(),
            request: "req-1".to_string(),
            shareable,
        }
    }

    #[tokio::test]
    async fn disabled_feature_gate_is_a_no_op() {
        let store = Arc::new(ClaimStore::new());
        let plugin = DraClaimPlugin::new(store.clone(), false);
        let mut request = BindRequest::new("pod-a", "default", "node-1");
        request.resource_claim_allocations.push(allocation("claim-1", "gpu-0", false));

        let touched = plugin.pre_bind(&request).await.unwrap();
        assert_eq!(touched, 0);
        assert!(store.get("claim-1").await.is_none());
    }

    #[tokio::test]
    async fn reserves_claim_for_pod() {
        let store = Arc::new(ClaimStore::new());
        let plugin = DraClaimPlugin::new(store.clone(), true);
        let mut request = BindRequest::new("pod-a", "default", "node-1");
        request.resource_claim_allocations.push(allocation("claim-1", "gpu-0", false));

        plugin.pre_bind(&request).await.unwrap();
        let status = store.get("claim-1").await.unwrap();
        assert_eq!(status.reserved_for, vec!["pod-a".to_string()]);
    }

    #[tokio::test]
    async fn shareable_device_accumulates_multiple_reservations() {
        let store = Arc::new(ClaimStore::new());
        let plugin = DraClaimPlugin::new(store.clone(), true);

        let mut first = BindRequest::new("pod-a", "default", "node-1");
        first.resource_claim_allocations.push(allocation("claim-shared", "gpu-0", true));
        plugin.pre_bind(&first).await.unwrap();

        let mut second = BindRequest::new("pod-b", "default", "node-1");
        second.resource_claim_allocations.push(allocation("claim-shared", "gpu-0", true));
        plugin.pre_bind(&second).await.unwrap();

        let status = store.get("claim-shared").await.unwrap();
        assert_eq!(status.reserved_for, vec!["pod-a".to_string(), "pod-b".to_string()]);
    }

    #[tokio::test]
    async fn non_shareable_device_rejects_a_second_distinct_pod() {
        let store = Arc::new(ClaimStore::new());
        let plugin = DraClaimPlugin::new(store.clone(), true);

        let mut first = BindRequest::new("pod-a", "default", "node-1");
        first.resource_claim_allocations.push(allocation("claim-exclusive", "gpu-0", false));
        plugin.pre_bind(&first).await.unwrap();

        let mut second = BindRequest::new("pod-b", "default", "node-1");
        second.resource_claim_allocations.push(allocation("claim-exclusive", "gpu-0", false));
        let result = plugin.pre_bind(&second).await;

        assert!(result.is_err());
        let status = store.get("claim-exclusive").await.unwrap();
        assert_eq!(status.reserved_for, vec!["pod-a".to_string()]);
    }

    #[tokio::test]
    async fn reconciling_same_request_twice_is_idempotent() {
        let store = Arc::new(ClaimStore::new());
        let plugin = DraClaimPlugin::new(store.clone(), true);
        let mut request = BindRequest::new("pod-a", "default", "node-1");
        request.resource_claim_allocations.push(allocation("claim-1", "gpu-0", false));

        plugin.pre_bind(&request).await.unwrap();
        plugin.pre_bind(&request).await.unwrap();

        let status = store.get("claim-1").await.unwrap();
        assert_eq!(status.reserved_for, vec!["pod-a".to_string()]);
    }
}
