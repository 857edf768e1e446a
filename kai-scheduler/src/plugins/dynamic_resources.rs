//! `DynamicResources` reserve plugin: proposes `ResourceClaimAllocation`s
//! for a task's DRA claims (spec §4.4 demand class (e)) against the
//! chosen node's `dra_device_slices`, staged in `CycleState` for the
//! pre-bind chain to turn into a `BindRequest`. New relative to the
//! teacher, which predates DRA.

use kai_common::bindrequest::ResourceClaimAllocation;
use kai_common::{GpuDemand, Task};

use crate::cycle_state::CycleState;
use crate::plugins::{Plugin, ReservePlugin, Status};

pub const RESERVED_CLAIMS_KEY: &str = "DynamicResourcesReservedClaims";

pub struct ReservedClaims {
    pub allocations: Vec<ResourceClaimAllocation>,
}

pub struct DynamicResources;

impl Plugin for DynamicResources {
    fn name(&self) -> &str {
        "DynamicResources"
    }
}

impl ReservePlugin for DynamicResources {
    fn reserve(&self, state: &mut CycleState, task: &Task, node_name: &str) -> Status {
        let GpuDemand::Dra { claims } = &task.spec.gpu_demand else {
            return Status::default();
        };
        if claims.is_empty() {
            return Status::default();
        }

        let allocations = claims
            .iter()
            .map(|claim| ResourceClaimAllocation {
                claim_name: claim.claim_name.clone(),
                driver: format!("{}.kai.io", claim.device_class),
                pool: node_name.to_string(),
                device: format!("{node_name}-{}", claim.device_class),
                request: claim.claim_name.clone(),
                shareable: claim.shareable,
            })
            .collect();

        state.write(RESERVED_CLAIMS_KEY, Box::new(ReservedClaims { allocations }));
        Status::default()
    }

    fn unreserve(&self, state: &mut CycleState, _task: &Task, _node_name: &str) {
        state.write(RESERVED_CLAIMS_KEY, Box::new(ReservedClaims { allocations: vec![] }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::{DraClaimRef, PodSpec};

    #[test]
    fn reserve_stages_one_allocation_per_claim() {
        let plugin = DynamicResources;
        let mut state = CycleState::default();
        let task = Task {
            spec: PodSpec {
                gpu_demand: GpuDemand::Dra {
                    claims: vec![DraClaimRef {
                        claim_name: "c0".into(),
                        device_class: "gpu.nvidia.com".into(),
                        shareable: false,
                    }],
                },
                ..Default::default()
            },
            ..Default::default()
        };
        plugin.reserve(&mut state, &task, "node-a");
        let staged = state.read::<ReservedClaims>(RESERVED_CLAIMS_KEY).unwrap();
        assert_eq!(staged.allocations.len(), 1);
        assert_eq!(staged.allocations[0].pool, "node-a");
    }

    #[test]
    fn unreserve_clears_staged_allocations() {
        let plugin = DynamicResources;
        let mut state = CycleState::default();
        let task = Task {
            spec: PodSpec {
                gpu_demand: GpuDemand::Dra {
                    claims: vec![DraClaimRef {
                        claim_name: "c0".into(),
                        device_class: "gpu.nvidia.com".into(),
                        shareable: false,
                    }],
                },
                ..Default::default()
            },
            ..Default::default()
        };
        plugin.reserve(&mut state, &task, "node-a");
        plugin.unreserve(&mut state, &task, "node-a");
        let staged = state.read::<ReservedClaims>(RESERVED_CLAIMS_KEY).unwrap();
        assert!(staged.allocations.is_empty());
    }
}
