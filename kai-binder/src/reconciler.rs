//! The N-worker reconciler (spec §4.5 intro, §5 "parallel I/O workers
//! for ... binder reconciliation"). Generalizes `rks::scheduler::Scheduler::run`
//! — a single task looping on an `mpsc::Receiver<Assignment>` — into a
//! fixed-size pool of workers all draining the same `BindRequest` queue,
//! the way `rks::server::serve` spawns one task per accepted connection
//! against a registry shared behind a lock; here the "registry" is the
//! `tokio::sync::mpsc` channel itself plus the `BindWorkflow`'s shared
//! `Arc` state, and the bounded worker count comes from
//! `BinderConfig::max_concurrent_reconciles` instead of one-task-per-unit.

use std::sync::Arc;

use kai_common::{BindRequest, Task};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::state_machine::{BindWorkflow, GpuGroupContext};

/// One unit of work: a request plus the task/GPU-group context its
/// pre-bind plugins need, since `BindRequest` alone doesn't carry the
/// pod's full spec or the cache's view of its GPU group's occupancy.
pub struct ReconcileJob {
    pub request: BindRequest,
    pub task: Task,
    pub gpu_group: GpuGroupContext,
}

/// Spawns `worker_count` tasks that each pull jobs from `rx` and drive
/// them through `workflow.reconcile`, forwarding the terminal
/// `BindRequest` to `on_done`. Mirrors `rks::scheduler::Scheduler::run`'s
/// `while let Some(item) = rx.recv().await` loop, replicated across a
/// pool instead of one task, and returns the workers' `JoinHandle`s so a
/// caller (tests, or a future real `main.rs` shutdown path) can await
/// them draining.
pub fn spawn_workers<F>(worker_count: usize, workflow: Arc<BindWorkflow>, rx: mpsc::Receiver<ReconcileJob>, on_done: F) -> Vec<JoinHandle<()>>
where
    F: Fn(BindRequest) + Send + Sync + Clone + 'static,
{
    let worker_count = worker_count.max(1);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    (0..worker_count)
        .map(|id| {
            let workflow = workflow.clone();
            let rx = rx.clone();
            let on_done = on_done.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(ReconcileJob { mut request, task, gpu_group }) = job else {
                        info!("reconcile worker {id} shutting down: queue closed");
                        break;
                    };

                    workflow.reconcile(&mut request, &task, &gpu_group).await;
                    match request.phase {
                        kai_common::BindRequestPhase::Succeeded => info!("worker {id} bound pod {}", request.pod_name),
                        kai_common::BindRequestPhase::Failed => warn!("worker {id} failed to bind pod {}: {}", request.pod_name, request.message),
                        _ => error!("worker {id} left BindRequest for pod {} in non-terminal phase {:?}", request.pod_name, request.phase),
                    }
                    on_done(request);
                }
            })
        })
        .collect()
}
