//! Default worker count detection.
//!
//! Asks the host once, by running `nproc`, `getconf _NPROCESSORS_ONLN` or
//! `sysctl -n hw.ncpu` in that order, and caches the answer. Callers can
//! override the cached value or force a fresh probe.

use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Worker count used when no probe succeeds.
pub const FALLBACK_PROCS: usize = 4;

/// Cached default worker count (0 = not detected yet).
static DEFAULT_PROCS: AtomicUsize = AtomicUsize::new(0);

const PROBES: &[(&str, &[&str])] = &[
    ("nproc", &[]),
    ("getconf", &["_NPROCESSORS_ONLN"]),
    ("sysctl", &["-n", "hw.ncpu"]),
];

/// Probe the host for its core count, falling back to [`FALLBACK_PROCS`].
pub fn detect() -> usize {
    for (program, args) in PROBES {
        let count = Command::new(program)
            .args(*args)
            .output()
            .ok()
            .filter(|o| o.status.success())
            .and_then(|o| parse_count(&String::from_utf8_lossy(&o.stdout)));
        if let Some(count) = count {
            debug!(probe = *program, count, "Detected core count");
            return count;
        }
    }
    debug!(fallback = FALLBACK_PROCS, "Core count probes failed");
    FALLBACK_PROCS
}

/// The default worker count, probing the host on first use.
pub fn default_procs() -> usize {
    match DEFAULT_PROCS.load(Ordering::Relaxed) {
        0 => {
            let detected = detect();
            DEFAULT_PROCS.store(detected, Ordering::Relaxed);
            detected
        }
        cached => cached,
    }
}

/// Override the default worker count.
///
/// An explicit positive `count` wins. Otherwise `redetect` forces a new
/// probe; with neither, the cached value is kept. Returns the value now in
/// effect.
pub fn configure_default_procs(count: Option<usize>, redetect: bool) -> usize {
    match count.filter(|&n| n > 0) {
        Some(n) => {
            DEFAULT_PROCS.store(n, Ordering::Relaxed);
            n
        }
        None if redetect => {
            let detected = detect();
            DEFAULT_PROCS.store(detected, Ordering::Relaxed);
            detected
        }
        None => default_procs(),
    }
}

/// Parse probe output into a positive count.
fn parse_count(output: &str) -> Option<usize> {
    output.trim().parse::<usize>().ok().filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("8\n"), Some(8));
        assert_eq!(parse_count("  16  "), Some(16));
        assert_eq!(parse_count("0"), None);
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("eight"), None);
    }

    #[test]
    fn test_detect_is_positive() {
        assert!(detect() >= 1);
    }

    #[test]
    fn test_configure_default_procs() {
        assert_eq!(configure_default_procs(Some(3), false), 3);
        assert_eq!(default_procs(), 3);
        // Zero is not a valid override, so the cached value stays
        assert_eq!(configure_default_procs(Some(0), false), 3);

        let detected = configure_default_procs(None, true);
        assert!(detected >= 1);
        assert_eq!(default_procs(), detected);
    }
}
