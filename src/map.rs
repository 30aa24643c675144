//! Parallel map over a collection, one worker process per element.
//!
//! Built only on the public [`Pool`] operations. Results come back in input
//! order no matter which worker finishes first.

use crate::error::{PoolError, Result};
use crate::cpus;
use crate::pool::{Outcome, Pool, PoolConfig, env_max_procs, env_transport_dir};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tracing::{debug, instrument, warn};

/// Options for [`map`].
#[derive(Debug, Clone, Default)]
pub struct MapOptions {
    /// Worker limit (None = `FORKPOOL_MAX_PROCS` or the default worker count).
    pub max_procs: Option<usize>,
    /// On the first failure, kill all running siblings instead of letting
    /// them finish.
    pub fail_fast: bool,
    /// Directory for result transports (None = `FORKPOOL_TMPDIR` or automatic).
    pub transport_dir: Option<PathBuf>,
}

impl MapOptions {
    pub fn with_max_procs(mut self, max_procs: usize) -> Self {
        self.max_procs = Some(max_procs);
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Apply `f` to every item, each call in its own worker process.
///
/// On the first worker failure no further items are launched. With
/// `fail_fast` the running workers are killed; otherwise they are allowed to
/// finish. Either way the failure is then returned.
///
/// ```no_run
/// use forkpool::map::{MapOptions, map};
///
/// let squares = map(1..=4_u64, |n| Ok(n * n), &MapOptions::default())?;
/// assert_eq!(squares, vec![1, 4, 9, 16]);
/// # Ok::<(), forkpool::error::PoolError>(())
/// ```
#[instrument(level = "debug", skip_all, fields(fail_fast = options.fail_fast))]
pub fn map<I, T, F>(items: I, f: F, options: &MapOptions) -> Result<Vec<T>>
where
    I: IntoIterator,
    T: Serialize + DeserializeOwned,
    F: Fn(I::Item) -> anyhow::Result<T>,
{
    // Explicit options win; the core count is probed only as a last resort
    let max_procs = match options.max_procs {
        Some(max_procs) => max_procs,
        None => env_max_procs()?.unwrap_or_else(cpus::default_procs),
    };
    let mut config = PoolConfig::new(max_procs);
    if let Some(dir) = options.transport_dir.clone().or_else(env_transport_dir) {
        config = config.with_transport_dir(dir);
    }
    let mut pool: Pool<(usize, T)> = Pool::with_config(config)?;

    let items = items.into_iter();
    let mut slots: Vec<Option<T>> = Vec::with_capacity(items.size_hint().0);
    let f = &f;

    for (index, item) in items.enumerate() {
        slots.push(None);
        if let Err(e) = drain(&mut pool, &mut slots) {
            return Err(shut_down(&mut pool, e, options.fail_fast));
        }
        if let Err(e) = pool.fork(move || f(item).map(|value| (index, value))) {
            return Err(shut_down(&mut pool, e, true));
        }
    }

    loop {
        match pool.await_any_result() {
            Ok((_, outcome)) => {
                if let Err(e) = store(&mut slots, outcome) {
                    return Err(shut_down(&mut pool, e, options.fail_fast));
                }
            }
            Err(PoolError::Idle) => break,
            Err(e) => return Err(shut_down(&mut pool, e, options.fail_fast)),
        }
    }

    debug!(items = slots.len(), "Map finished");
    Ok(slots.into_iter().flatten().collect())
}

/// Move every result that is already available into its slot.
fn drain<T>(pool: &mut Pool<(usize, T)>, slots: &mut [Option<T>]) -> Result<()>
where
    T: Serialize + DeserializeOwned,
{
    while let Some((_, outcome)) = pool.any_result()? {
        store(slots, outcome)?;
    }
    Ok(())
}

fn store<T>(slots: &mut [Option<T>], outcome: Outcome<(usize, T)>) -> Result<()> {
    let (index, value) = outcome.into_result()?;
    slots[index] = Some(value);
    Ok(())
}

/// Stop the pool after `error` and hand the error back.
///
/// Worker failures honor `fail_fast`; anything else (lost results, fork or
/// I/O errors) always kills the remaining workers.
fn shut_down<T>(pool: &mut Pool<(usize, T)>, error: PoolError, fail_fast: bool) -> PoolError
where
    T: Serialize + DeserializeOwned,
{
    let hard = fail_fast || !matches!(error, PoolError::Worker(_));
    warn!(
        error = %error,
        pending = pool.pending_count(),
        hard,
        "Map stopping after failure"
    );
    if hard {
        pool.kill_all(true);
    } else {
        pool.await_all();
    }
    error
}
