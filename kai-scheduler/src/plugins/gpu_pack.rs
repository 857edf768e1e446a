//! `GpuPack` score plugin: favors nodes whose GPU devices are already most
//! utilized, so fragmented fractional capacity concentrates on as few
//! nodes as possible. New relative to the teacher (no GPU concept);
//! shaped like `node_resources_fit::Fit`'s score half, just on the GPU
//! axis instead of cpu/memory.

use kai_common::{GpuDemand, NodeInfo, Task};

use crate::cycle_state::CycleState;
use crate::plugins::{Code, DefaultNormalizeScore, Plugin, ScoreExtension, ScorePlugin, Status};

pub struct GpuPack;

impl Plugin for GpuPack {
    fn name(&self) -> &str {
        "GpuPack"
    }
}

/// Fraction of total device capacity currently idle, 0.0 (fully used) to
/// 1.0 (fully idle). `None` when the node carries no GPU devices at all.
pub(crate) fn idle_ratio(node: &NodeInfo) -> Option<f64> {
    let devices = &node.gpu_inventory.devices;
    if devices.is_empty() {
        return None;
    }
    let capacity: f64 = devices.iter().map(|d| d.fraction_capacity).sum();
    if capacity <= 0.0 {
        return None;
    }
    let idle: f64 = devices.iter().map(|d| d.fraction_capacity - d.fraction_allocated).sum();
    Some((idle / capacity).clamp(0.0, 1.0))
}

impl ScorePlugin for GpuPack {
    fn score(&self, _: &mut CycleState, task: &Task, node: &NodeInfo) -> (i64, Status) {
        if task.spec.gpu_demand == GpuDemand::None {
            return (0, Status::default());
        }
        let Some(idle) = idle_ratio(node) else {
            return (0, Status::new(Code::Skip, vec![]));
        };
        (((1.0 - idle) * 100.0) as i64, Status::default())
    }

    fn score_extension(&self) -> Box<dyn ScoreExtension> {
        Box::new(DefaultNormalizeScore {
            max_score: 100,
            reverse: false,
        })
    }
}
