//! Code that runs inside a freshly forked worker process.

use super::outcome::{JobFailure, Outcome, UNDESIGNATED_MARKER};
use super::transport::Transport;
use serde::Serialize;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether synthesized error payloads carry a backtrace.
static CAPTURE_TRACES: AtomicBool = AtomicBool::new(false);

/// Backtrace recorded by the worker's panic hook, taken after unwinding.
static PANIC_TRACE: Mutex<Option<String>> = Mutex::new(None);

/// Enable or disable backtraces in synthesized worker error payloads.
///
/// Process-wide. Workers read the value they inherited at fork time.
pub fn set_capture_traces(enabled: bool) {
    CAPTURE_TRACES.store(enabled, Ordering::Relaxed);
}

/// Check whether synthesized worker error payloads carry a backtrace.
pub fn capture_traces() -> bool {
    CAPTURE_TRACES.load(Ordering::Relaxed)
}

/// Worker entry point. Never returns.
///
/// Runs `f`, classifies what happened, writes the outcome to `transport` and
/// exits with status 0. If the outcome cannot be written, prints a diagnostic
/// and exits with status 1, leaving the transport empty or truncated.
pub(crate) fn run_worker<T, F>(f: F, transport: Transport) -> !
where
    T: Serialize,
    F: FnOnce() -> anyhow::Result<T>,
{
    if capture_traces() {
        install_panic_trace_hook();
    }

    let outcome = classify(panic::catch_unwind(AssertUnwindSafe(f)));

    match transport.write_result(&outcome) {
        Ok(()) => {
            drop(transport);
            exit(0)
        }
        Err(e) => {
            eprintln!(
                "forkpool worker {}: failed to write result: {}",
                std::process::id(),
                e
            );
            exit(1)
        }
    }
}

/// Map the result of running a job onto the outcome reported to the pool.
pub(crate) fn classify<T>(result: std::thread::Result<anyhow::Result<T>>) -> Outcome<T> {
    match result {
        Ok(Ok(value)) => Outcome::Value(value),
        Ok(Err(err)) => match err.downcast::<JobFailure>() {
            Ok(failure) => Outcome::WorkerError(failure.into_payload()),
            Err(err) => {
                let trace = capture_traces().then(|| match err.backtrace().status() {
                    BacktraceStatus::Captured => err.backtrace().to_string(),
                    _ => Backtrace::force_capture().to_string(),
                });
                Outcome::WorkerError(synthesize(format!("{:#}", err), trace))
            }
        },
        Err(panic) => {
            let trace = capture_traces().then(|| {
                take_panic_trace().unwrap_or_else(|| Backtrace::force_capture().to_string())
            });
            Outcome::WorkerError(synthesize(panic_message(panic.as_ref()), trace))
        }
    }
}

fn synthesize(description: String, trace: Option<String>) -> Vec<String> {
    let mut payload = vec![UNDESIGNATED_MARKER.to_string(), description];
    payload.extend(trace);
    payload
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panic: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panic: {}", msg)
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Record a backtrace at the panic site, then defer to the previous hook.
fn install_panic_trace_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if let Ok(mut slot) = PANIC_TRACE.lock() {
            *slot = Some(Backtrace::force_capture().to_string());
        }
        previous(info);
    }));
}

fn take_panic_trace() -> Option<String> {
    PANIC_TRACE.lock().ok().and_then(|mut slot| slot.take())
}

/// Flush std streams and end the worker process.
///
/// Never unwinds back into the caller's stack, so destructors of values the
/// parent owned (the pool included) do not run in the child.
fn exit(code: i32) -> ! {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
    std::process::exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_value() {
        let outcome = classify(Ok(Ok(42)));
        assert_eq!(outcome, Outcome::Value(42));
    }

    #[test]
    fn test_classify_designated_error() {
        let err: anyhow::Error = JobFailure::new(["foo"]).into();
        let outcome = classify::<i32>(Ok(Err(err)));
        assert_eq!(outcome, Outcome::WorkerError(vec!["foo".to_string()]));
    }

    #[test]
    fn test_classify_designated_error_with_context() {
        let err = anyhow::Error::from(JobFailure::new(["foo", "bar"])).context("while working");
        let outcome = classify::<i32>(Ok(Err(err)));
        assert_eq!(
            outcome,
            Outcome::WorkerError(vec!["foo".to_string(), "bar".to_string()])
        );
    }

    #[test]
    fn test_classify_undesignated_error() {
        let outcome = classify::<i32>(Ok(Err(anyhow::anyhow!("bad input 42"))));
        match outcome {
            Outcome::WorkerError(payload) => {
                assert_eq!(payload[0], UNDESIGNATED_MARKER);
                assert!(payload[1].contains("42"));
                if !capture_traces() {
                    assert_eq!(payload.len(), 2);
                }
            }
            other => panic!("Expected WorkerError, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_panic() {
        let result = panic::catch_unwind(|| -> anyhow::Result<i32> { panic!("boom") });
        match classify(result) {
            Outcome::WorkerError(payload) => {
                assert_eq!(payload[0], UNDESIGNATED_MARKER);
                assert!(payload[1].contains("boom"));
            }
            other => panic!("Expected WorkerError, got {:?}", other),
        }
    }

    #[test]
    fn test_synthesize_with_trace() {
        let payload = synthesize("oops".into(), Some("frame 0".into()));
        assert_eq!(payload, vec!["_", "oops", "frame 0"]);

        let payload = synthesize("oops".into(), None);
        assert_eq!(payload, vec!["_", "oops"]);
    }

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "panic: owned");

        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert!(panic_message(other.as_ref()).contains("non-string"));
    }
}
