//! What a worker reports back to the pool.

use crate::error::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker placed first in payloads the pool synthesizes for undesignated
/// errors and panics.
pub const UNDESIGNATED_MARKER: &str = "_";

/// Result of one job, as written by the worker and read by the pool.
///
/// Transport failures never appear here; they are reported as
/// [`crate::error::TransportError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Outcome<T> {
    /// The computation returned normally.
    #[serde(rename = "value")]
    Value(T),

    /// The computation failed. The payload is either the one carried by a
    /// [`JobFailure`], or `["_", description]` / `["_", description, trace]`.
    #[serde(rename = "worker_error")]
    WorkerError(Vec<String>),
}

impl<T> Outcome<T> {
    /// Check if this outcome is a worker-reported failure.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::WorkerError(_))
    }

    /// Convert into a `Result`, turning a worker failure into
    /// [`PoolError::Worker`].
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Value(value) => Ok(value),
            Self::WorkerError(payload) => Err(PoolError::Worker(payload)),
        }
    }
}

/// Error a job raises on purpose to report a failure with a chosen payload.
///
/// ```
/// use forkpool::pool::JobFailure;
///
/// fn check(n: u32) -> anyhow::Result<u32> {
///     if n > 10 {
///         return Err(JobFailure::new(["too-large", &n.to_string()]).into());
///     }
///     Ok(n)
/// }
/// assert!(check(11).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure(Vec<String>);

impl JobFailure {
    /// Create a failure from an ordered list of strings.
    pub fn new<I, S>(payload: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(payload.into_iter().map(Into::into).collect())
    }

    pub fn payload(&self) -> &[String] {
        &self.0
    }

    pub fn into_payload(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for JobFailure {
    fn from(payload: Vec<String>) -> Self {
        Self(payload)
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job failed: {}", self.0.join(": "))
    }
}

impl std::error::Error for JobFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let json = serde_json::to_string(&Outcome::Value(42)).unwrap();
        assert!(json.contains("\"value\""));

        let parsed: Outcome<i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Outcome::Value(42));

        let json = serde_json::to_string(&Outcome::<i32>::WorkerError(vec!["foo".into()])).unwrap();
        assert!(json.contains("worker_error"));
    }

    #[test]
    fn test_into_result() {
        assert_eq!(Outcome::Value(1).into_result().unwrap(), 1);

        let err = Outcome::<i32>::WorkerError(vec!["foo".into()])
            .into_result()
            .unwrap_err();
        assert_eq!(err.worker_payload(), Some(&["foo".to_string()][..]));
    }

    #[test]
    fn test_job_failure_display_and_payload() {
        let failure = JobFailure::new(["exit", "2"]);
        assert_eq!(failure.payload(), ["exit", "2"]);
        assert_eq!(failure.to_string(), "job failed: exit: 2");
        assert_eq!(failure.into_payload(), vec!["exit", "2"]);
    }

    #[test]
    fn test_job_failure_survives_anyhow() {
        let err: anyhow::Error = JobFailure::new(["foo"]).into();
        let failure = err.downcast::<JobFailure>().unwrap();
        assert_eq!(failure.payload(), ["foo"]);
    }
}
