//! Process-wide job handle allocation.
//!
//! Handles are never derived from OS process IDs, which get recycled.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Next handle to hand out. Starts at 1 and only grows.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for one forked job.
///
/// Unique for the life of the process. A pool only recognizes handles it
/// issued itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    /// The raw counter value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Build a handle from a raw value. Such a handle was not issued by any
    /// pool, so every pool reports it as not found.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Allocate a fresh handle, strictly greater than every earlier one.
pub fn next_id() -> JobId {
    JobId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let a = next_id();
        let b = next_id();
        let c = next_id();
        assert!(a < b);
        assert!(b < c);
        assert!(a.get() >= 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(JobId::from_raw(5).to_string(), "job#5");
    }
}
