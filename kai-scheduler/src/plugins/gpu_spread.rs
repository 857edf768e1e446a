//! `GpuSpread` score plugin: the inverse of `GpuPack`, favoring nodes with
//! the most idle GPU capacity so fractional demand spreads thin instead of
//! concentrating. Both ship enabled by default (spec leaves the choice of
//! packing vs. spreading to the scoring-strategy weights in config, spec
//! §6); a deployment picks one by zeroing the other's weight.

use kai_common::{GpuDemand, NodeInfo, Task};

use crate::cycle_state::CycleState;
use crate::plugins::gpu_pack::idle_ratio;
use crate::plugins::{Code, DefaultNormalizeScore, Plugin, ScoreExtension, ScorePlugin, Status};

pub struct GpuSpread;

impl Plugin for GpuSpread {
    fn name(&self) -> &str {
        "GpuSpread"
    }
}

impl ScorePlugin for GpuSpread {
    fn score(&self, _: &mut CycleState, task: &Task, node: &NodeInfo) -> (i64, Status) {
        if task.spec.gpu_demand == GpuDemand::None {
            return (0, Status::default());
        }
        let Some(idle) = idle_ratio(node) else {
            return (0, Status::new(Code::Skip, vec![]));
        };
        ((idle * 100.0) as i64, Status::default())
    }

    fn score_extension(&self) -> Box<dyn ScoreExtension> {
        Box::new(DefaultNormalizeScore {
            max_score: 100,
            reverse: false,
        })
    }
}
