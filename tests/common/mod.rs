//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

static SERIAL: Mutex<()> = Mutex::new(());

/// Serialize tests that fork or reap children.
///
/// Pools reap with `wait()`, which would steal exits from pools owned by
/// other test threads.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sleep, then create `path`. Used to observe whether a worker got that far.
pub fn sleep_then_touch(delay: Duration, path: &Path) -> anyhow::Result<()> {
    std::thread::sleep(delay);
    std::fs::write(path, b"done")?;
    Ok(())
}

/// Number of markers created in `dir`.
pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
