//! forkpool - run jobs in a bounded pool of forked worker processes.
//!
//! [`pool::Pool`] launches each job in its own process with `fork()` and
//! brings its result back through an unlinked temporary file. [`map::map`]
//! builds an ordered parallel map on top of it.
//!
//! Unix only. A pool must not be used from several threads at once, and the
//! host program must not reap children itself while jobs are outstanding.

pub mod cpus;
pub mod error;
pub mod logging;
pub mod map;
pub mod pool;
