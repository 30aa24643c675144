//! OS process observation for pool workers.
//!
//! Exit status is never inspected here. Whether a job succeeded is decided
//! solely by what its transport contains.

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, wait, waitpid};
use nix::unistd::Pid;
use tracing::{trace, warn};

/// Check whether a child has exited, without blocking.
///
/// Reaps the child if it has exited. "No such child" counts as exited: some
/// other blocking wait already reaped it.
pub fn is_done(pid: Pid) -> bool {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => return false,
            Ok(status) => {
                trace!(pid = pid.as_raw(), ?status, "Worker exited");
                return true;
            }
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => return true,
            Err(e) => {
                warn!(pid = pid.as_raw(), error = %e, "waitpid failed, treating worker as exited");
                return true;
            }
        }
    }
}

/// Block until some child process exits.
///
/// The reaped child may belong to anyone; callers re-check their own jobs
/// afterwards. Returns immediately when there are no children at all.
pub fn wait_any() {
    loop {
        match wait() {
            Ok(status) => {
                trace!(?status, "Woke up on child exit");
                return;
            }
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => return,
            Err(e) => {
                warn!(error = %e, "wait failed");
                return;
            }
        }
    }
}

/// Send SIGTERM to a worker. Failures are swallowed since the worker may have
/// raced to exit.
pub fn terminate(pid: Pid) {
    if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
        trace!(pid = pid.as_raw(), error = %e, "SIGTERM not delivered");
    }
}
