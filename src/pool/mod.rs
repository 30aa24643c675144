//! Bounded pool of forked worker processes.
//!
//! Each job runs in its own process created with `fork()`. The result
//! travels back through an unlinked temporary file, so jobs need no pipes
//! and no threads in the parent.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │  Parent (Pool)   │
//!                  │ pending/completed│
//!                  └────────┬─────────┘
//!                    fork() │ wait()/waitpid(WNOHANG)
//!           ┌───────────────┼───────────────┐
//!     ┌─────▼─────┐   ┌─────▼─────┐   ┌─────▼─────┐
//!     │  job#1    │   │  job#2    │   │  job#N    │
//!     │ (process) │   │ (process) │   │ (process) │
//!     └─────┬─────┘   └─────┬─────┘   └─────┬─────┘
//!           ▼               ▼               ▼
//!      unlinked file   unlinked file   unlinked file
//! ```
//!
//! # Example
//!
//! ```no_run
//! use forkpool::pool::{Outcome, Pool};
//!
//! let mut pool: Pool<u64> = Pool::new(4)?;
//! let id = pool.fork(|| Ok(6 * 7))?;
//! assert_eq!(pool.await_result(id)?, Outcome::Value(42));
//! # Ok::<(), forkpool::error::PoolError>(())
//! ```

mod id;
mod manager;
mod outcome;
mod probe;
mod transport;
mod worker;

pub use id::{JobId, next_id};
pub use manager::{
    ForkOptions, Pool, PoolConfig, PoolStats, env_max_procs, env_transport_dir,
};
pub use outcome::{JobFailure, Outcome, UNDESIGNATED_MARKER};
pub use probe::is_done;
pub use worker::{capture_traces, set_capture_traces};
