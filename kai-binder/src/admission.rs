//! The admission webhook contract (spec §6 line 135): "only their contract
//! matters here" — the real webhook server, TLS, and the apiserver's
//! `AdmissionReview` envelope are out of scope (spec §1). What's modeled
//! is the pure decision each hook makes, as a plain function so it is
//! exercised by unit tests even though nothing here binds it to an HTTP
//! listener, mirroring how `kai_scheduler::plugins` keeps plugin logic as
//! plain trait methods independent of any gRPC/HTTP transport.

use std::collections::HashMap;

use kai_common::Queue;

/// The subset of an incoming pod's fields the mutating/validating hooks
/// need. Stands in for the real `corev1.Pod` the apiserver would send.
#[derive(Debug, Clone, Default)]
pub struct IncomingPod {
    pub namespace: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub scheduler_name: Option<String>,
    pub requested_gpu_fraction: Option<f64>,
}

/// What the mutating hook wants applied to the pod (spec §6 line 135).
#[derive(Debug, Clone, PartialEq)]
pub struct PodMutation {
    pub scheduler_name: String,
    pub pod_group_annotation: String,
    pub queue_label: (String, String),
    pub runtime_class: Option<String>,
}

/// Spec §6 line 135, mutating hook: stamp `spec.schedulerName`, a derived
/// PodGroup annotation, the queue label, and — only for a GPU-fraction
/// request — a runtime class. `queue_label_key` and `scheduler_name` come
/// from `SchedulerConfig`; a pod that already names a queue label keeps
/// it, since the hook only fills gaps a workload controller left.
pub fn mutate(pod: &IncomingPod, scheduler_name: &str, queue_label_key: &str, pod_group_annotation_key: &str) -> PodMutation {
    let queue = pod
        .labels
        .get(queue_label_key)
        .cloned()
        .unwrap_or_else(|| "default".to_string());

    let pod_group_annotation = pod
        .annotations
        .get(pod_group_annotation_key)
        .cloned()
        .unwrap_or_else(|| format!("{queue}-podgroup"));

    let runtime_class = pod
        .requested_gpu_fraction
        .filter(|f| *f > 0.0 && *f < 1.0)
        .map(|_| "nvidia-fraction".to_string());

    PodMutation {
        scheduler_name: scheduler_name.to_string(),
        pod_group_annotation,
        queue_label: (queue_label_key.to_string(), queue),
        runtime_class,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionRejection {
    QueueNotFound { queue: String },
    QueueMissingResources { queue: String },
    QuotaViolatesParent { queue: String },
    DeleteQueueHasChildren { queue: String },
}

impl std::fmt::Display for AdmissionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdmissionRejection::QueueNotFound { queue } => write!(f, "queue {queue} does not exist"),
            AdmissionRejection::QueueMissingResources { queue } => write!(f, "queue {queue} is missing spec.resources"),
            AdmissionRejection::QuotaViolatesParent { queue } => write!(f, "queue {queue}'s quota exceeds its parent's"),
            AdmissionRejection::DeleteQueueHasChildren { queue } => write!(f, "queue {queue} still has child queues"),
        }
    }
}

/// Spec §6 line 135, validating hook, pod-creation path: reject a pod
/// whose queue label points at a queue that isn't in the cache's queue
/// set.
pub fn validate_pod_queue(pod: &IncomingPod, queue_label_key: &str, queues: &[Queue]) -> Result<(), AdmissionRejection> {
    let Some(queue_name) = pod.labels.get(queue_label_key) else {
        return Ok(());
    };
    if queues.iter().any(|q| &q.name == queue_name) {
        Ok(())
    } else {
        Err(AdmissionRejection::QueueNotFound { queue: queue_name.clone() })
    }
}

/// Spec §6 line 135, validating hook, queue-creation path: reject a queue
/// with no resources spec, or (when `enforce_quota` is set — spec §9's
/// quota-validation Open Question, on by default per DESIGN.md) one whose
/// deserved quota exceeds its parent's.
pub fn validate_queue_create(queue: &Queue, parent: Option<&Queue>, has_resources_spec: bool, enforce_quota: bool) -> Result<(), AdmissionRejection> {
    if !has_resources_spec {
        return Err(AdmissionRejection::QueueMissingResources { queue: queue.name.clone() });
    }
    if enforce_quota {
        if let Some(parent) = parent {
            use kai_common::ResourceName;
            for axis in [ResourceName::Cpu, ResourceName::Memory, ResourceName::Gpu] {
                let child = queue.resources.deserved.get(axis);
                let parent_quota = parent.resources.deserved.get(axis);
                if !parent_quota.is_unlimited() && child.as_f64() > parent_quota.as_f64() {
                    return Err(AdmissionRejection::QuotaViolatesParent { queue: queue.name.clone() });
                }
            }
        }
    }
    Ok(())
}

/// Spec §6 line 135, validating hook, queue-deletion path: reject
/// deleting a queue that still has children, since the parent-children
/// quota invariant and the fair-share tree both assume queues form a
/// forest with no dangling parents.
pub fn validate_queue_delete(queue: &Queue) -> Result<(), AdmissionRejection> {
    if queue.status.child_queues.is_empty() {
        Ok(())
    } else {
        Err(AdmissionRejection::DeleteQueueHasChildren { queue: queue.name.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::{Preemptibility, QueueResources, QueueStatus};

    fn queue(name: &str, children: Vec<&str>) -> Queue {
        Queue {
            name: name.to_string(),
            parent: None,
            resources: QueueResources::unlimited(),
            priority: 0,
            preemptibility: Preemptibility::Preemptible,
            reclaim_min_runtime: None,
            status: QueueStatus {
                child_queues: children.into_iter().map(String::from).collect(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn mutate_fills_gaps_without_clobbering_existing_queue_label() {
        let mut pod = IncomingPod::default();
        pod.labels.insert("kai.scheduler/queue".to_string(), "team-a".to_string());

        let mutation = mutate(&pod, "kai-scheduler", "kai.scheduler/queue", "kai.scheduler/podgroup");
        assert_eq!(mutation.queue_label, ("kai.scheduler/queue".to_string(), "team-a".to_string()));
        assert_eq!(mutation.pod_group_annotation, "team-a-podgroup");
        assert_eq!(mutation.scheduler_name, "kai-scheduler");
    }

    #[test]
    fn mutate_stamps_fraction_runtime_class_only_for_fractional_demand() {
        let mut pod = IncomingPod::default();
        pod.requested_gpu_fraction = Some(0.5);
        let mutation = mutate(&pod, "kai-scheduler", "kai.scheduler/queue", "kai.scheduler/podgroup");
        assert_eq!(mutation.runtime_class, Some("nvidia-fraction".to_string()));

        let mut whole = IncomingPod::default();
        whole.requested_gpu_fraction = Some(1.0);
        let mutation = mutate(&whole, "kai-scheduler", "kai.scheduler/queue", "kai.scheduler/podgroup");
        assert_eq!(mutation.runtime_class, None);
    }

    #[test]
    fn pod_rejected_when_queue_label_points_nowhere() {
        let mut pod = IncomingPod::default();
        pod.labels.insert("kai.scheduler/queue".to_string(), "ghost".to_string());
        let err = validate_pod_queue(&pod, "kai.scheduler/queue", &[queue("real", vec![])]).unwrap_err();
        assert_eq!(err, AdmissionRejection::QueueNotFound { queue: "ghost".to_string() });
    }

    #[test]
    fn queue_without_resources_spec_rejected() {
        let q = queue("team-a", vec![]);
        let err = validate_queue_create(&q, None, false, true).unwrap_err();
        assert_eq!(err, AdmissionRejection::QueueMissingResources { queue: "team-a".to_string() });
    }

    #[test]
    fn deleting_queue_with_children_rejected() {
        let q = queue("parent", vec!["child"]);
        assert!(validate_queue_delete(&q).is_err());
    }

    #[test]
    fn deleting_leaf_queue_allowed() {
        let q = queue("leaf", vec![]);
        assert!(validate_queue_delete(&q).is_ok());
    }
}
