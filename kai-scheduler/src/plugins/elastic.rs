//! `Elastic` gang-scheduling plugin: a job is ready the moment its bound
//! member count reaches `min_member` (spec §3/§4.3), regardless of how
//! many pods the job ultimately asked for. New relative to the teacher,
//! which schedules pods individually with no gang concept at all.

use kai_common::PodGroup;

use crate::plugins::ordering::GangSchedulingFn;
use crate::plugins::Plugin;

pub struct Elastic;

impl Plugin for Elastic {
    fn name(&self) -> &str {
        "Elastic"
    }
}

impl GangSchedulingFn for Elastic {
    fn job_ready(&self, job: &PodGroup, bound_members: u32) -> bool {
        bound_members >= job.min_member
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::{Preemptibility, PodGroupStatus};

    fn job(min_member: u32) -> PodGroup {
        PodGroup {
            name: "pg".into(),
            namespace: "ns".into(),
            queue: "q".into(),
            min_member,
            priority_class: None,
            priority: 0,
            preemptibility: Preemptibility::Preemptible,
            subgroups: vec![],
            status: PodGroupStatus::default(),
        }
    }

    #[test]
    fn ready_once_min_member_bound() {
        let plugin = Elastic;
        assert!(!plugin.job_ready(&job(3), 2));
        assert!(plugin.job_ready(&job(3), 3));
        assert!(plugin.job_ready(&job(3), 5));
    }
}
