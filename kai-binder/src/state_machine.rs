//! The bind state machine (spec §4.5): `Pending -> Binding -> {Succeeded,
//! Failed}`. One `reconcile` call drives one `BindRequest` through
//! Validate, the pre-bind plugin chain, Bind, and Post-bind, exactly as
//! the teacher's `rks::scheduler::Scheduler::run` drives one assignment
//! through "write pod yaml, ack" — except here each step can fail the
//! request instead of the whole worker loop, because spec §4.5 step 5
//! says a failed bind is locally recovered: "the scheduler will observe
//! this in the next session and retry allocation".
//!
//! `Validator`, `VolumeBinder`, and `BindSink` are `async_trait`s so a
//! real deployment can swap in API-server-backed implementations without
//! touching this module; the in-memory ones here are what the reconciler
//! tests and `kai-binder`'s own `main.rs` run against absent a cluster.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kai_common::{BindRequest, Task};

use crate::dra::DraClaimPlugin;
use crate::reservation::ResourceReservationPlugin;
use crate::PodPatch;

#[async_trait]
pub trait Validator: Send + Sync {
    /// Spec §4.5 step 1: the pod still exists, still names this
    /// scheduler, and the target node still satisfies predicates. A
    /// `Some` return aborts the bind with that reason.
    async fn validate(&self, request: &BindRequest, task: &Task) -> Option<String>;
}

/// A validator that always passes, for callers (tests, `main.rs`'s
/// snapshot-driven run) with nothing to revalidate against.
pub struct AlwaysValid;

#[async_trait]
impl Validator for AlwaysValid {
    async fn validate(&self, _request: &BindRequest, _task: &Task) -> Option<String> {
        None
    }
}

#[async_trait]
pub trait VolumeBinder: Send + Sync {
    /// Spec §4.5 step 2, volume-binding plugin: wait for the pod's PVCs
    /// to bind. Returns whether binding succeeded before the caller's
    /// timeout.
    async fn wait_for_binding(&self, request: &BindRequest) -> bool;
}

/// No PVCs to wait on, for pods that don't use any — the common case in
/// the scenarios this crate's tests construct.
pub struct NoVolumes;

#[async_trait]
impl VolumeBinder for NoVolumes {
    async fn wait_for_binding(&self, _request: &BindRequest) -> bool {
        true
    }
}

#[async_trait]
pub trait BindSink: Send + Sync {
    /// Spec §4.5 step 3: set `spec.nodeName` via a binding API call, with
    /// `patch`'s env/annotations/labels applied first.
    async fn bind(&self, request: &BindRequest, patch: &PodPatch) -> anyhow::Result<()>;
}

/// Records every successful bind in memory; stands in for the real
/// Kubernetes binding subresource the way `rks`'s `XlineStore` stands in
/// for etcd.
#[derive(Default)]
pub struct InMemoryBindSink {
    bound: tokio::sync::Mutex<Vec<(String, String, PodPatch)>>,
}

impl InMemoryBindSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bound_pods(&self) -> Vec<(String, String, PodPatch)> {
        self.bound.lock().await.clone()
    }
}

#[async_trait]
impl BindSink for InMemoryBindSink {
    async fn bind(&self, request: &BindRequest, patch: &PodPatch) -> anyhow::Result<()> {
        self.bound
            .lock()
            .await
            .push((request.pod_name.clone(), request.selected_node.clone(), patch.clone()));
        Ok(())
    }
}

/// The extra, per-GPU-group inputs the resource-reservation pre-bind
/// plugin needs that don't live on `BindRequest` itself — supplied by the
/// reconciler from its cache view of sharing pods and open requests.
#[derive(Debug, Clone, Default)]
pub struct GpuGroupContext {
    pub group_id: Option<String>,
    pub sharing_pod_count: usize,
    pub active_bind_request_count: usize,
}

pub struct BindWorkflow {
    validator: Arc<dyn Validator>,
    reservation: Arc<ResourceReservationPlugin>,
    dra: Arc<DraClaimPlugin>,
    volumes: Arc<dyn VolumeBinder>,
    sink: Arc<dyn BindSink>,
    volume_binding_timeout: Duration,
}

impl BindWorkflow {
    pub fn new(
        validator: Arc<dyn Validator>,
        reservation: Arc<ResourceReservationPlugin>,
        dra: Arc<DraClaimPlugin>,
        volumes: Arc<dyn VolumeBinder>,
        sink: Arc<dyn BindSink>,
        volume_binding_timeout: Duration,
    ) -> Self {
        Self {
            validator,
            reservation,
            dra,
            volumes,
            sink,
            volume_binding_timeout,
        }
    }

    /// Drives `request` through the full state machine in place, mutating
    /// its `phase` to the terminal outcome. Never returns `Err`: every
    /// failure this function can detect is a terminal `BindRequest`
    /// phase, not a worker crash, matching spec §4.5 step 5's "on any
    /// failure, transition to Failed ... and return".
    pub async fn reconcile(&self, request: &mut BindRequest, task: &Task, gpu_group: &GpuGroupContext) {
        request.phase = kai_common::BindRequestPhase::Binding;

        if let Some(reason) = self.validator.validate(request, task).await {
            request.fail("ValidationFailed", reason);
            return;
        }

        let mut patch = PodPatch::default();

        if let Some(group_id) = gpu_group.group_id.as_deref() {
            match self
                .reservation
                .pre_bind(task, group_id, &request.selected_node, gpu_group.sharing_pod_count, gpu_group.active_bind_request_count)
                .await
            {
                Ok(p) => patch.merge(p),
                Err(err) => {
                    request.fail("ResourceReservationFailed", err.to_string());
                    return;
                }
            }
        }

        if let Err(err) = self.dra.pre_bind(request).await {
            request.fail("DraClaimPatchFailed", err.to_string());
            return;
        }

        if !tokio::time::timeout(self.volume_binding_timeout, self.volumes.wait_for_binding(request))
            .await
            .unwrap_or(false)
        {
            request.fail("VolumeBindingTimeout", format!("PVCs for pod {} did not bind in time", request.pod_name));
            return;
        }

        if let Err(err) = self.sink.bind(request, &patch).await {
            request.fail("BindCallFailed", err.to_string());
            return;
        }

        request.succeed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::ReservationStore;
    use kai_common::GpuGroupRegistry;

    fn task(name: &str) -> Task {
        Task {
            name: name.into(),
            ..Default::default()
        }
    }

    fn workflow(sink: Arc<InMemoryBindSink>) -> BindWorkflow {
        let reservation = Arc::new(ResourceReservationPlugin::new(
            Arc::new(GpuGroupRegistry::new()),
            Arc::new(ReservationStore::new()),
            "kai-resource-reservation",
            Duration::from_millis(100),
        ));
        let dra = Arc::new(crate::dra::DraClaimPlugin::new(Arc::new(crate::dra::ClaimStore::new()), true));
        BindWorkflow::new(Arc::new(AlwaysValid), reservation, dra, Arc::new(NoVolumes), sink, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn regular_pod_binds_straight_through() {
        let sink = Arc::new(InMemoryBindSink::new());
        let wf = workflow(sink.clone());
        let mut request = BindRequest::new("pod-a", "default", "node-1");
        let task = task("pod-a");

        wf.reconcile(&mut request, &task, &GpuGroupContext::default()).await;

        assert_eq!(request.phase, kai_common::BindRequestPhase::Succeeded);
        assert_eq!(sink.bound_pods().await.len(), 1);
    }

    #[tokio::test]
    async fn validation_failure_fails_request_without_binding() {
        struct AlwaysReject;
        #[async_trait::async_trait]
        impl Validator for AlwaysReject {
            async fn validate(&self, _request: &BindRequest, _task: &Task) -> Option<String> {
                Some("node no longer fits".to_string())
            }
        }

        let sink = Arc::new(InMemoryBindSink::new());
        let reservation = Arc::new(ResourceReservationPlugin::new(
            Arc::new(GpuGroupRegistry::new()),
            Arc::new(ReservationStore::new()),
            "kai-resource-reservation",
            Duration::from_millis(100),
        ));
        let dra = Arc::new(crate::dra::DraClaimPlugin::new(Arc::new(crate::dra::ClaimStore::new()), true));
        let wf = BindWorkflow::new(Arc::new(AlwaysReject), reservation, dra, Arc::new(NoVolumes), sink.clone(), Duration::from_millis(100));

        let mut request = BindRequest::new("pod-a", "default", "node-1");
        wf.reconcile(&mut request, &task("pod-a"), &GpuGroupContext::default()).await;

        assert_eq!(request.phase, kai_common::BindRequestPhase::Failed);
        assert_eq!(request.reason, "ValidationFailed");
        assert!(sink.bound_pods().await.is_empty());
    }

    #[tokio::test]
    async fn fraction_pod_without_reservation_pod_times_out_and_fails() {
        let sink = Arc::new(InMemoryBindSink::new());
        let wf = workflow(sink.clone());
        let mut request = BindRequest::new("pod-a", "default", "node-1");
        let mut task = task("pod-a");
        task.spec.gpu_demand = kai_common::GpuDemand::Fraction { fraction: 0.5, num_devices: 1 };

        let gpu_group = GpuGroupContext {
            group_id: Some("group-a".to_string()),
            sharing_pod_count: 1,
            active_bind_request_count: 1,
        };
        wf.reconcile(&mut request, &task, &gpu_group).await;

        assert_eq!(request.phase, kai_common::BindRequestPhase::Failed);
        assert_eq!(request.reason, "ResourceReservationFailed");
    }
}
