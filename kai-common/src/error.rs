//! The five error kinds from the error-handling design (spec §7), as a
//! `thiserror` enum so callers can match on kind instead of grepping
//! strings. The teacher keeps its own internals returning plain `bool`s
//! and pushes `anyhow::Error` only to its outermost (`rks`) boundary; we
//! do the same — `SchedulerError` is what the engine returns, `anyhow`
//! wraps it (and I/O, (de)serialization, etc.) at process entry points.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    /// API server conflict, watch disconnect, timeout — re-queue with backoff.
    #[error("transient error (retry in {retry_after:?}): {message}")]
    Transient {
        message: String,
        retry_after: Duration,
    },

    /// Node doesn't fit, topology violation, DRA device unavailable.
    #[error("predicate failed on node {node}: {reason}")]
    Predicate { node: String, reason: String },

    /// Detailed per-node reasons for an unschedulable pod.
    #[error("pod {pod} unschedulable: {reasons:?}")]
    FitError { pod: String, reasons: Vec<String> },

    /// Missing parent queue, PodGroup without queue, malformed SubGroup tree.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Cache cannot sync, scheme registration failed — terminate the process.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl SchedulerError {
    pub fn is_recoverable_locally(&self) -> bool {
        matches!(
            self,
            SchedulerError::Transient { .. } | SchedulerError::Predicate { .. }
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SchedulerError::Fatal(_))
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
