//! Integration tests for the ordered parallel map.

mod common;

use common::{count_entries, serial, sleep_then_touch};
use forkpool::error::PoolError;
use forkpool::map::{MapOptions, map};
use forkpool::pool::JobFailure;
use std::time::{Duration, Instant};
use tempfile::tempdir;

#[test]
fn test_map_preserves_input_order() {
    let _guard = serial();
    // Later items finish first
    let items: Vec<u64> = (0..8).collect();
    let results = map(
        items,
        |n| {
            std::thread::sleep(Duration::from_millis((8 - n) * 20));
            Ok(n * 10)
        },
        &MapOptions::default().with_max_procs(8),
    )
    .unwrap();
    assert_eq!(results, vec![0, 10, 20, 30, 40, 50, 60, 70]);
}

#[test]
fn test_map_more_items_than_workers() {
    let _guard = serial();
    let results = map(0..20_u32, |n| Ok(n * n), &MapOptions::default().with_max_procs(3)).unwrap();
    assert_eq!(results.len(), 20);
    assert_eq!(results[19], 361);
}

#[test]
fn test_map_empty_input() {
    let _guard = serial();
    let results: Vec<u8> = map(Vec::<u8>::new(), Ok, &MapOptions::default()).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_map_rejects_zero_workers() {
    let _guard = serial();
    let err = map(0..2_u8, Ok, &MapOptions::default().with_max_procs(0)).unwrap_err();
    assert!(matches!(err, PoolError::InvalidMaxProcs));
}

#[test]
fn test_map_soft_cancel_lets_siblings_finish() {
    let _guard = serial();
    let dir = tempdir().unwrap();
    let markers = dir.path().to_path_buf();

    let start = Instant::now();
    let err = map(
        0..16_u32,
        |n| {
            if n == 10 {
                return Err(JobFailure::new(["item", "10"]).into());
            }
            sleep_then_touch(Duration::from_millis(1500), &markers.join(n.to_string()))?;
            Ok(n)
        },
        &MapOptions::default().with_max_procs(16),
    )
    .unwrap_err();

    assert_eq!(err.worker_payload(), Some(&["item".to_string(), "10".to_string()][..]));
    assert!(start.elapsed() >= Duration::from_millis(1500));
    // Everything launched before the failure was seen ran to completion
    assert!(count_entries(&markers) >= 10);
}

#[test]
fn test_map_fail_fast_is_faster_and_stops_siblings() {
    let _guard = serial();
    let slow_dir = tempdir().unwrap();
    let fast_dir = tempdir().unwrap();

    let run = |markers: std::path::PathBuf, fail_fast: bool| {
        let start = Instant::now();
        let err = map(
            0..16_u32,
            |n| {
                if n == 10 {
                    return Err(JobFailure::new(["item", "10"]).into());
                }
                sleep_then_touch(Duration::from_millis(1500), &markers.join(n.to_string()))?;
                Ok(n)
            },
            &MapOptions::default()
                .with_max_procs(16)
                .with_fail_fast(fail_fast),
        )
        .unwrap_err();
        assert!(err.worker_payload().is_some());
        start.elapsed()
    };

    let soft = run(slow_dir.path().to_path_buf(), false);
    let hard = run(fast_dir.path().to_path_buf(), true);

    assert!(hard < soft, "fail-fast took {hard:?}, soft cancel took {soft:?}");
    assert!(count_entries(fast_dir.path()) < count_entries(slow_dir.path()));
}

#[test]
fn test_map_lost_result_is_fatal() {
    let _guard = serial();
    let err = map(
        0..4_u8,
        |n| {
            if n == 2 {
                std::process::exit(3);
            }
            Ok(n)
        },
        &MapOptions::default().with_max_procs(2),
    )
    .unwrap_err();
    assert!(matches!(err, PoolError::Transport(_)));
}
