use kai_common::Task;

use crate::plugins::{Code, Plugin, PreEnqueuePlugin, Status};

pub struct SchedulingGates;

impl Plugin for SchedulingGates {
    fn name(&self) -> &str {
        "SchedulingGates"
    }
}

impl PreEnqueuePlugin for SchedulingGates {
    fn pre_enqueue(&self, task: &Task) -> Status {
        if task.spec.scheduling_gates.is_empty() {
            Status::default()
        } else {
            Status::new(
                Code::UnschedulableAndUnresolvable,
                vec![format!("waiting for scheduling gates: {:?}", task.spec.scheduling_gates)],
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kai_common::PodSpec;

    #[test]
    fn no_gates_is_schedulable() {
        assert_eq!(SchedulingGates.pre_enqueue(&Task::default()).code, Code::Success);
    }

    #[test]
    fn open_gate_blocks() {
        let task = Task {
            spec: PodSpec {
                scheduling_gates: vec!["example.com/gate".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(SchedulingGates.pre_enqueue(&task).code, Code::UnschedulableAndUnresolvable);
    }
}
