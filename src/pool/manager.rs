//! Bounded pool of forked worker processes.
//!
//! Every operation starts by reconciling: pending jobs whose process has
//! exited get their result read from the transport and move to the
//! completed set. Blocking operations wait on "any child exited" and then
//! reconcile again, so it does not matter which child woke them up.
//!
//! The pool assumes a single caller. Do not fork or `wait()` on children
//! yourself while jobs are outstanding, and put the pool behind a mutex if
//! several threads need it.

use super::id::{JobId, next_id};
use super::outcome::Outcome;
use super::probe;
use super::transport::{Transport, transport_dir};
use super::worker::run_worker;
use crate::cpus;
use crate::error::{PoolError, Result, TransportError};
use nix::unistd::{ForkResult, Pid, fork};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument, warn};

/// Configuration for a [`Pool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of simultaneously running workers.
    pub max_procs: usize,
    /// Directory for result transports (None = `/dev/shm` or temp dir).
    pub transport_dir: Option<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(cpus::default_procs())
    }
}

impl PoolConfig {
    /// Config with an explicit worker limit and automatic transport directory.
    pub fn new(max_procs: usize) -> Self {
        Self {
            max_procs,
            transport_dir: None,
        }
    }

    pub fn with_max_procs(mut self, max_procs: usize) -> Self {
        self.max_procs = max_procs;
        self
    }

    pub fn with_transport_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transport_dir = Some(dir.into());
        self
    }

    /// Config from the environment.
    ///
    /// Reads from:
    /// - `FORKPOOL_MAX_PROCS` for the worker limit (detected core count if unset)
    /// - `FORKPOOL_TMPDIR` for the transport directory
    ///
    /// A worker limit that is not a positive integer is an error, the same
    /// as passing it to `forkpool run -j`.
    pub fn from_env() -> Result<Self> {
        let max_procs = env_max_procs()?.unwrap_or_else(cpus::default_procs);
        Ok(Self {
            max_procs,
            transport_dir: env_transport_dir(),
        })
    }
}

/// Worker limit from `FORKPOOL_MAX_PROCS`, if set.
pub fn env_max_procs() -> Result<Option<usize>> {
    match std::env::var("FORKPOOL_MAX_PROCS") {
        Ok(value) => parse_max_procs(&value).map(Some),
        Err(_) => Ok(None),
    }
}

/// Transport directory from `FORKPOOL_TMPDIR`, if set.
pub fn env_transport_dir() -> Option<PathBuf> {
    std::env::var_os("FORKPOOL_TMPDIR").map(PathBuf::from)
}

fn parse_max_procs(value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err(PoolError::InvalidMaxProcs),
        Ok(n) => Ok(n),
        Err(_) => Err(PoolError::InvalidEnv {
            name: "FORKPOOL_MAX_PROCS",
            value: value.to_string(),
        }),
    }
}

/// Per-call options for [`Pool::fork_with`].
#[derive(Default)]
pub struct ForkOptions<'a> {
    /// Fail with [`PoolError::Busy`] instead of waiting for a free slot.
    pub nonblocking: bool,
    /// Runs right before forking. Defaults to flushing stdout and stderr so
    /// buffered output is not duplicated into the child.
    pub prepare: Option<&'a mut dyn FnMut()>,
}

/// Counters over the lifetime of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs forked.
    pub forked: usize,
    /// Jobs whose process exited and whose transport was read.
    pub completed: usize,
    /// Pending jobs cancelled through `kill` or `kill_all`.
    pub killed: usize,
    /// Completed jobs whose result could not be read.
    pub transport_failures: usize,
}

/// A launched worker whose outcome is not yet known.
#[derive(Debug)]
struct PendingJob {
    pid: Pid,
    transport: Transport,
}

/// Stored outcome of an exited worker.
type Completion<T> = std::result::Result<Outcome<T>, TransportError>;

/// Bounded pool of forked worker processes producing values of type `T`.
#[derive(Debug)]
pub struct Pool<T> {
    max_procs: usize,
    transport_dir: PathBuf,
    pending: BTreeMap<JobId, PendingJob>,
    completed: BTreeMap<JobId, Completion<T>>,
    stats: PoolStats,
}

impl<T> Pool<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a pool running at most `max_procs` workers at a time.
    pub fn new(max_procs: usize) -> Result<Self> {
        Self::with_config(PoolConfig::new(max_procs))
    }

    /// Create a pool configured from `FORKPOOL_MAX_PROCS` and
    /// `FORKPOOL_TMPDIR`, sized to the default worker count when unset.
    pub fn with_default_procs() -> Result<Self> {
        Self::with_config(PoolConfig::from_env()?)
    }

    pub fn with_config(config: PoolConfig) -> Result<Self> {
        if config.max_procs == 0 {
            return Err(PoolError::InvalidMaxProcs);
        }
        let transport_dir = transport_dir(config.transport_dir.as_deref());
        debug!(
            max_procs = config.max_procs,
            transport_dir = %transport_dir.display(),
            "Created worker pool"
        );
        Ok(Self {
            max_procs: config.max_procs,
            transport_dir,
            pending: BTreeMap::new(),
            completed: BTreeMap::new(),
            stats: PoolStats::default(),
        })
    }

    pub fn max_procs(&self) -> usize {
        self.max_procs
    }

    /// Number of launched jobs not yet observed to have exited.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of results waiting to be retrieved.
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// True when there is nothing pending and nothing to retrieve.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.completed.is_empty()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Launch `f` in a new worker, waiting for a free slot if needed.
    pub fn fork<F>(&mut self, f: F) -> Result<JobId>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        self.fork_with(ForkOptions::default(), f)
    }

    /// Launch `f` in a new worker, failing with [`PoolError::Busy`] when the
    /// pool is at capacity.
    pub fn try_fork<F>(&mut self, f: F) -> Result<JobId>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        self.fork_with(
            ForkOptions {
                nonblocking: true,
                ..Default::default()
            },
            f,
        )
    }

    /// Launch `f` in a new worker process.
    ///
    /// In the child, `f` runs and its outcome is written to the job's
    /// transport; the child then exits and never returns to the caller.
    pub fn fork_with<F>(&mut self, options: ForkOptions<'_>, f: F) -> Result<JobId>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        self.reconcile();
        while self.pending.len() >= self.max_procs {
            if options.nonblocking {
                return Err(PoolError::Busy {
                    max_procs: self.max_procs,
                });
            }
            probe::wait_any();
            self.reconcile();
        }

        let id = next_id();
        let transport = Transport::open_in(&self.transport_dir)?;

        match options.prepare {
            Some(prepare) => prepare(),
            None => flush_std_streams(),
        }

        // SAFETY: the child only runs the job, writes the transport and
        // `_exit`s; it never returns into the caller's code.
        match unsafe { fork() }.map_err(PoolError::Fork)? {
            ForkResult::Child => {
                // Other jobs' bookkeeping belongs to the parent.
                self.pending.clear();
                self.completed.clear();
                run_worker(f, transport)
            }
            ForkResult::Parent { child } => {
                debug!(job = %id, pid = child.as_raw(), pending = self.pending.len() + 1, "Forked worker");
                self.pending.insert(
                    id,
                    PendingJob {
                        pid: child,
                        transport,
                    },
                );
                self.stats.forked += 1;
                Ok(id)
            }
        }
    }

    /// Move every pending job whose process has exited to the completed set.
    ///
    /// Never blocks. Returns how many jobs moved; a repeat call with no new
    /// exits returns 0 and changes nothing.
    pub fn reconcile(&mut self) -> usize {
        let finished: Vec<JobId> = self
            .pending
            .iter()
            .filter(|(_, job)| probe::is_done(job.pid))
            .map(|(id, _)| *id)
            .collect();

        for id in &finished {
            if let Some(job) = self.pending.remove(id) {
                let completion = job.transport.read_result(job.pid.as_raw());
                if let Err(e) = &completion {
                    self.stats.transport_failures += 1;
                    error!(job = %id, pid = job.pid.as_raw(), error = %e, "Worker result lost");
                } else {
                    debug!(job = %id, pid = job.pid.as_raw(), "Worker completed");
                }
                self.stats.completed += 1;
                self.completed.insert(*id, completion);
            }
        }
        finished.len()
    }

    /// Take the result of `id` if it is ready.
    ///
    /// Returns `Ok(None)` while the job is still running. Fails with
    /// [`PoolError::NotFound`] for unknown or already retrieved handles and
    /// with [`PoolError::Transport`] if the worker's result was lost.
    pub fn result(&mut self, id: JobId) -> Result<Option<Outcome<T>>> {
        self.reconcile();
        if let Some(completion) = self.completed.remove(&id) {
            return completion.map(Some).map_err(PoolError::from);
        }
        if self.pending.contains_key(&id) {
            return Ok(None);
        }
        Err(PoolError::NotFound(id))
    }

    /// Like [`Pool::result`] but leaves the result stored.
    pub fn peek_result(&mut self, id: JobId) -> Result<Option<&Outcome<T>>> {
        self.reconcile();
        match self.completed.get(&id) {
            Some(Ok(outcome)) => Ok(Some(outcome)),
            Some(Err(e)) => Err(e.clone().into()),
            None if self.pending.contains_key(&id) => Ok(None),
            None => Err(PoolError::NotFound(id)),
        }
    }

    /// Take any ready result. When several are ready, the lowest handle wins;
    /// callers should not rely on that order.
    pub fn any_result(&mut self) -> Result<Option<(JobId, Outcome<T>)>> {
        self.reconcile();
        match self.completed.pop_first() {
            Some((id, Ok(outcome))) => Ok(Some((id, outcome))),
            Some((_, Err(e))) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Like [`Pool::any_result`] but leaves the result stored.
    pub fn peek_any_result(&mut self) -> Result<Option<(JobId, &Outcome<T>)>> {
        self.reconcile();
        match self.completed.first_key_value() {
            Some((id, Ok(outcome))) => Ok(Some((*id, outcome))),
            Some((_, Err(e))) => Err(e.clone().into()),
            None => Ok(None),
        }
    }

    /// Block until the result of `id` is available, then take it.
    pub fn await_result(&mut self, id: JobId) -> Result<Outcome<T>> {
        loop {
            if let Some(outcome) = self.result(id)? {
                return Ok(outcome);
            }
            probe::wait_any();
        }
    }

    /// Block until any result is available, then take it.
    ///
    /// Fails with [`PoolError::Idle`] once nothing is pending and nothing is
    /// stored, which makes it a natural loop condition.
    pub fn await_any_result(&mut self) -> Result<(JobId, Outcome<T>)> {
        loop {
            if let Some(found) = self.any_result()? {
                return Ok(found);
            }
            if self.pending.is_empty() {
                return Err(PoolError::Idle);
            }
            probe::wait_any();
        }
    }

    /// Block until no job is pending. Results stay stored.
    #[instrument(level = "debug", skip(self), fields(pending = self.pending.len()))]
    pub fn await_all(&mut self) {
        loop {
            self.reconcile();
            if self.pending.is_empty() {
                return;
            }
            probe::wait_any();
        }
    }

    /// Drop every stored result without looking at it, except that a stored
    /// worker error is surfaced (the one with the lowest handle; the rest are
    /// discarded). Pending jobs are untouched.
    pub fn ignore_results(&mut self) -> Result<()> {
        self.reconcile();
        let mut surfaced = None;
        for (id, completion) in std::mem::take(&mut self.completed) {
            match completion {
                Ok(Outcome::WorkerError(payload)) => {
                    if surfaced.is_none() {
                        surfaced = Some(payload);
                    }
                }
                Ok(Outcome::Value(_)) => {}
                Err(e) => error!(job = %id, error = %e, "Discarding lost worker result"),
            }
        }
        match surfaced {
            Some(payload) => Err(PoolError::Worker(payload)),
            None => Ok(()),
        }
    }

    /// Cancel a job.
    ///
    /// A pending job is forgotten, its transport closed and its process sent
    /// SIGTERM unless it already exited. With `wait`, blocks until the process
    /// is gone. A completed job just has its result dropped.
    ///
    /// Without `wait` the pool stops tracking the process right away and does
    /// not reap it. It stays a zombie until some later blocking pool call (or
    /// the caller) happens to `wait()` for it.
    pub fn kill(&mut self, id: JobId, wait: bool) -> Result<()> {
        self.reconcile();
        if let Some(PendingJob { pid, transport }) = self.pending.remove(&id) {
            drop(transport);
            if !probe::is_done(pid) {
                probe::terminate(pid);
            }
            if wait {
                while !probe::is_done(pid) {
                    probe::wait_any();
                }
            }
            self.stats.killed += 1;
            debug!(job = %id, pid = pid.as_raw(), wait, "Killed worker");
            return Ok(());
        }
        if self.completed.remove(&id).is_some() {
            return Ok(());
        }
        Err(PoolError::NotFound(id))
    }

    /// Signal every pending worker, optionally wait for all of them, and
    /// reset the pool to empty.
    ///
    /// Without `wait` the signaled workers are left unreaped, as with
    /// [`Pool::kill`].
    pub fn kill_all(&mut self, wait: bool) {
        for job in self.pending.values() {
            if !probe::is_done(job.pid) {
                probe::terminate(job.pid);
            }
        }
        if wait {
            for job in self.pending.values() {
                while !probe::is_done(job.pid) {
                    probe::wait_any();
                }
            }
        }
        debug!(
            pending = self.pending.len(),
            completed = self.completed.len(),
            wait,
            "Killed all workers"
        );
        self.stats.killed += self.pending.len();
        self.pending.clear();
        self.completed.clear();
    }
}

impl<T> Drop for Pool<T> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            let pids: Vec<i32> = self.pending.values().map(|job| job.pid.as_raw()).collect();
            warn!(
                pending = pids.len(),
                ?pids,
                "Pool dropped with running workers; they are orphaned"
            );
        }
    }
}

fn flush_std_streams() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}
