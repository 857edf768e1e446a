//! Scenario solvers (spec §4.3 "Scenario solvers"). A scenario solver is
//! handed a growing set of tentative victims and answers, incrementally,
//! whether the freed capacity can fit a preemptor's demand — so the
//! action pipeline can prune infeasible scenarios without rebuilding the
//! whole accounting from scratch on every candidate victim.

pub mod accumulated_idle_gpus;
pub mod topology_aware_idle_gpus;

use kai_common::GpuDemand;

pub use accumulated_idle_gpus::AccumulatedIdleGpus;
pub use topology_aware_idle_gpus::TopologyAwareIdleGpus;

/// A pod's GPU demand collapsed to the single scalar (in GPU-equivalents)
/// these solvers reason about. `Memory`-class and `Dra`-class demand is
/// accounted by the dynamic-resources/resource-type plugins instead, not
/// by the idle-GPU solvers, so they contribute 0 here.
pub(crate) fn gpu_demand_scalar(demand: &GpuDemand) -> f64 {
    match demand {
        GpuDemand::None => 0.0,
        GpuDemand::Whole { count } => *count as f64,
        GpuDemand::Fraction { fraction, num_devices } => fraction * (*num_devices).max(1) as f64,
        GpuDemand::Memory { .. } => 0.0,
        GpuDemand::Mig { count, .. } => *count as f64,
        GpuDemand::Dra { .. } => 0.0,
    }
}
