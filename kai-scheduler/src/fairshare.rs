//! Hierarchical fair-share engine (C2). New relative to the teacher,
//! which schedules individual pods with no queue-quota concept at all;
//! grounded directly in spec §4.2's bottom-up/top-down algorithm.

use std::collections::HashMap;
use std::time::Duration;

use kai_common::{Quantity, QuotaResources, Queue, ResourceName, Resources};

/// A pluggable source of "how much has this queue actually used recently",
/// normalized into the time-aware weight adjustment. Absent or stale
/// (`None`) degrades the engine to static-weight distribution.
pub trait TimeAwareUsageProvider: Send + Sync {
    fn usage(&self, queue: &str, window: Duration) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AllocationStatus {
    UnderQuota,
    UnderFairShare,
    OverFairShare,
    OverQuota,
}

#[derive(Debug, Clone, Default)]
pub struct QueueFairShare {
    pub requested: Resources,
    pub deserved_clamped: Resources,
    pub fair_share: Resources,
}

const RESOURCES: [ResourceName; 3] = [ResourceName::Cpu, ResourceName::Memory, ResourceName::Gpu];
const EPSILON: f64 = 1e-9;

struct Node<'a> {
    queue: &'a Queue,
    children: Vec<usize>,
}

fn build_tree(queues: &[Queue]) -> (HashMap<&str, usize>, Vec<Node<'_>>, Vec<usize>) {
    let index: HashMap<&str, usize> = queues.iter().enumerate().map(|(i, q)| (q.name.as_str(), i)).collect();
    let mut nodes: Vec<Node> = queues.iter().map(|q| Node { queue: q, children: vec![] }).collect();
    let mut roots = Vec::new();
    for (i, q) in queues.iter().enumerate() {
        match &q.parent {
            Some(parent) => match index.get(parent.as_str()) {
                Some(&pidx) => nodes[pidx].children.push(i),
                None => roots.push(i),
            },
            None => roots.push(i),
        }
    }
    (index, nodes, roots)
}

/// Computes `requested`/`deserved_clamped`/`fair_share` for every queue in
/// the forest, given the total capacity available to the forest's roots
/// (normally the cluster's allocatable resources).
pub fn compute_fair_share(
    queues: &[Queue],
    cluster_capacity: Resources,
    usage: Option<&dyn TimeAwareUsageProvider>,
    time_aware_k: f64,
) -> HashMap<String, QueueFairShare> {
    let (_, mut nodes, roots) = build_tree(queues);
    let mut result: HashMap<String, QueueFairShare> = HashMap::new();

    for &root in &roots {
        aggregate_requested(&mut nodes, root, &mut result);
    }
    for resource in RESOURCES {
        distribute(&mut nodes, &roots, resource, cluster_capacity.get(resource), usage, time_aware_k, &mut result);
    }
    result
}

fn aggregate_requested(nodes: &mut [Node], idx: usize, out: &mut HashMap<String, QueueFairShare>) {
    let children = nodes[idx].children.clone();
    let requested = if children.is_empty() {
        nodes[idx].queue.status.requested
    } else {
        let mut sum = Resources::ZERO;
        for &child in &children {
            aggregate_requested(nodes, child, out);
            sum = sum + out[&nodes[child].queue.name].requested;
        }
        sum
    };
    out.entry(nodes[idx].queue.name.clone()).or_default().requested = requested;
}

fn clamp_deserved(deserved: Quantity, requested: f64) -> f64 {
    match deserved {
        Quantity::Unlimited => requested,
        Quantity::Limited(d) => d.min(requested),
    }
}

fn limit_headroom(limit: Quantity, deserved_clamped: f64, already_allocated: f64) -> f64 {
    match limit {
        Quantity::Unlimited => f64::INFINITY,
        Quantity::Limited(l) => (l - deserved_clamped - already_allocated).max(0.0),
    }
}

fn static_weight(queue: &Queue, resource: ResourceName) -> f64 {
    match resource {
        ResourceName::Cpu => queue.resources.over_quota_weight_cpu,
        ResourceName::Memory => queue.resources.over_quota_weight_memory,
        ResourceName::Gpu => queue.resources.over_quota_weight_gpu,
    }
}

fn quota_for(resources: &QuotaResources, resource: ResourceName) -> Quantity {
    resources.get(resource)
}

#[allow(clippy::too_many_arguments)]
fn distribute(
    nodes: &mut [Node],
    children: &[usize],
    resource: ResourceName,
    parent_share: f64,
    usage: Option<&dyn TimeAwareUsageProvider>,
    k: f64,
    out: &mut HashMap<String, QueueFairShare>,
) {
    if children.is_empty() {
        return;
    }

    let requested: Vec<f64> = children.iter().map(|&c| out[&nodes[c].queue.name].requested.get(resource)).collect();
    let deserved_clamped: Vec<f64> = children
        .iter()
        .zip(&requested)
        .map(|(&c, &req)| clamp_deserved(quota_for(&nodes[c].queue.resources.deserved, resource), req))
        .collect();

    let sum_deserved: f64 = deserved_clamped.iter().sum();
    let mut leftover = (parent_share - sum_deserved).max(0.0);

    let limits: Vec<Quantity> = children.iter().map(|&c| quota_for(&nodes[c].queue.resources.limit, resource)).collect();
    let unmet: Vec<f64> = requested.iter().zip(&deserved_clamped).map(|(r, d)| (r - d).max(0.0)).collect();

    let mut allocated_leftover = vec![0.0_f64; children.len()];
    let mut active: Vec<usize> = (0..children.len())
        .filter(|&i| unmet[i] > EPSILON && limit_headroom(limits[i], deserved_clamped[i], 0.0) > EPSILON)
        .collect();

    while leftover > EPSILON && !active.is_empty() {
        let weights = effective_weights(nodes, children, &active, resource, usage, k);
        let sum_w: f64 = weights.iter().sum();
        if sum_w <= EPSILON {
            break;
        }

        let mut still_active = Vec::new();
        let mut distributed = 0.0_f64;
        for (slot, &i) in active.iter().enumerate() {
            let share = leftover * weights[slot] / sum_w;
            let headroom = limit_headroom(limits[i], deserved_clamped[i], allocated_leftover[i]).min(unmet[i] - allocated_leftover[i]);
            let granted = share.min(headroom.max(0.0));
            allocated_leftover[i] += granted;
            distributed += granted;
            if headroom - granted > EPSILON {
                still_active.push(i);
            }
        }
        leftover -= distributed;
        if still_active.len() == active.len() {
            // nobody capped out this round — further rounds would be a no-op.
            break;
        }
        active = still_active;
    }

    for (slot, &c) in children.iter().enumerate() {
        let fair_share_value = deserved_clamped[slot] + allocated_leftover[slot];
        let entry = out.entry(nodes[c].queue.name.clone()).or_default();
        set_resource(&mut entry.deserved_clamped, resource, deserved_clamped[slot]);
        set_resource(&mut entry.fair_share, resource, fair_share_value);
        let grandchildren = nodes[c].children.clone();
        distribute(nodes, &grandchildren, resource, fair_share_value, usage, k, out);
    }
}

fn effective_weights(
    nodes: &[Node],
    children: &[usize],
    active: &[usize],
    resource: ResourceName,
    usage: Option<&dyn TimeAwareUsageProvider>,
    k: f64,
) -> Vec<f64> {
    let raw: Vec<f64> = active.iter().map(|&slot| static_weight(nodes[children[slot]].queue, resource)).collect();
    let sum_raw: f64 = raw.iter().sum();
    let static_normalized: Vec<f64> = if sum_raw > EPSILON {
        raw.iter().map(|w| w / sum_raw).collect()
    } else {
        vec![1.0 / active.len() as f64; active.len()]
    };

    let Some(provider) = usage else {
        return static_normalized;
    };

    let window = Duration::from_secs(3600);
    let raw_usage: Vec<Option<f64>> = active.iter().map(|&slot| provider.usage(&nodes[children[slot]].queue.name, window)).collect();
    if raw_usage.iter().any(|u| u.is_none()) {
        return static_normalized;
    }
    let raw_usage: Vec<f64> = raw_usage.into_iter().map(|u| u.unwrap()).collect();
    let sum_usage: f64 = raw_usage.iter().sum();
    if sum_usage <= EPSILON {
        return static_normalized;
    }
    let usage_normalized: Vec<f64> = raw_usage.iter().map(|u| u / sum_usage).collect();

    static_normalized
        .iter()
        .zip(&usage_normalized)
        .map(|(w, u)| (w + k * (w - u)).max(0.0))
        .collect()
}

fn set_resource(resources: &mut Resources, resource: ResourceName, value: f64) {
    match resource {
        ResourceName::Cpu => resources.cpu_millis = value.round() as u64,
        ResourceName::Memory => resources.memory_bytes = value.round() as u64,
        ResourceName::Gpu => resources.gpu = value,
    }
}

/// Classifies `allocated` against `deserved`/`fair_share`/`limit` per the
/// §4.2 bucket definitions, combined across resource dimensions by taking
/// the most severe bucket observed (a queue over quota on any one
/// dimension is not allowed to reclaim further along that axis).
pub fn allocation_status(allocated: &Resources, fs: &QueueFairShare, limit: &QuotaResources) -> AllocationStatus {
    RESOURCES
        .iter()
        .map(|&r| status_for_dimension(allocated.get(r), fs.deserved_clamped.get(r), fs.fair_share.get(r), quota_for(limit, r)))
        .max()
        .unwrap_or(AllocationStatus::UnderQuota)
}

/// Buckets are checked most-severe-first so each one's range excludes the
/// ones above it: OQ is "hit the hard limit", OFS is "above fair share but
/// under limit", UQ is "below deserved", UFS is everything left over
/// (`deserved <= allocated <= fairShare`).
fn status_for_dimension(allocated: f64, deserved: f64, fair_share: f64, limit: Quantity) -> AllocationStatus {
    if limit.less_than(allocated) {
        AllocationStatus::OverQuota
    } else if allocated > fair_share + EPSILON {
        AllocationStatus::OverFairShare
    } else if allocated < deserved - EPSILON {
        AllocationStatus::UnderQuota
    } else {
        AllocationStatus::UnderFairShare
    }
}
