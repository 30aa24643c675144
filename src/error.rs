//! Error types for forkpool.

use crate::pool::JobId;
use std::sync::Arc;
use thiserror::Error;

/// Main error type for pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// Pool at capacity and a nonblocking fork was requested.
    #[error("Pool is busy: all {max_procs} worker slots are in use")]
    Busy { max_procs: usize },

    /// No pending jobs and no completed results remain.
    #[error("Pool is idle: no pending jobs and no completed results")]
    Idle,

    #[error("Job {0} is not known to this pool")]
    NotFound(JobId),

    /// The worker ran to completion but reported a failure.
    #[error("Worker failed: {}", describe_payload(.0))]
    Worker(Vec<String>),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("max_procs must be at least 1")]
    InvalidMaxProcs,

    /// An environment variable held a value that could not be used.
    #[error("Invalid value '{value}' for {name}: expected a positive integer")]
    InvalidEnv { name: &'static str, value: String },

    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    /// Whether the caller can reasonably keep using the pool after this error.
    ///
    /// Transport failures mean a worker died abnormally or its result file was
    /// damaged; treat them as fatal and abort.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Busy { .. } | Self::Idle | Self::NotFound(_) | Self::Worker(_)
        )
    }

    /// The worker's error payload, if this is a worker-reported failure.
    pub fn worker_payload(&self) -> Option<&[String]> {
        match self {
            Self::Worker(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Failure to obtain a valid result from a worker that is known to have exited.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The result file was empty: the worker crashed, was signaled, or exited
    /// without going through the normal write path.
    #[error("Worker {pid} terminated abnormally without writing a result")]
    Empty { pid: i32 },

    #[error("Failed to read result of worker {pid}: {source}")]
    Io {
        pid: i32,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The result file held a truncated or otherwise undecodable value.
    #[error("Corrupt result from worker {pid}: {source}")]
    Corrupt {
        pid: i32,
        #[source]
        source: Arc<rmp_serde::decode::Error>,
    },
}

impl TransportError {
    /// Process ID of the worker whose result could not be read.
    pub fn pid(&self) -> i32 {
        match self {
            Self::Empty { pid } | Self::Io { pid, .. } | Self::Corrupt { pid, .. } => *pid,
        }
    }
}

fn describe_payload(payload: &[String]) -> String {
    if payload.is_empty() {
        "(no details)".to_string()
    } else {
        payload.join(": ")
    }
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
