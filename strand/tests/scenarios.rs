///
/// # Scenario Tests for strand
///
/// Concrete compositions with known outputs: the bind orderings of each
/// style, the delayed-effect race, cycles, and loading a driver from a
/// configuration file on disk.
///

use std::collections::BTreeSet;
use std::fs;
use std::thread;
use std::time::Duration;

use strand::{bind, merge, Driver, Step, Stream, StreamConfig, StreamError, Style};
use tempfile::TempDir;

/// A unit of delay in the race scenarios.
const TICK: Duration = Duration::from_millis(60);

fn delay(ticks: u32) -> Stream<u32> {
    Stream::once(move || {
        thread::sleep(TICK * ticks);
        Ok(ticks)
    })
}

fn two_threads() -> Driver {
    Driver::new(StreamConfig::default().with_max_threads(2)).expect("Failed to build driver")
}

fn nested(style: Style) -> Stream<u32> {
    bind(Stream::iter(vec![1, 2]), |x| Stream::iter(vec![x, x + 10]), style)
}

#[test]
fn test_serial_bind_is_a_nested_loop() {
    let out = two_threads().to_vec(&nested(Style::Serial)).unwrap();
    insta::assert_snapshot!(format!("{:?}", out), @"[1, 11, 2, 12]");
}

#[test]
fn test_interleaved_bind_gives_new_inner_streams_a_turn() {
    let out = two_threads().to_vec(&nested(Style::Interleaved)).unwrap();
    insta::assert_snapshot!(format!("{:?}", out), @"[1, 2, 11, 12]");

    let three = bind(Stream::iter(vec![1, 2, 3]), |x| Stream::iter(vec![x, x + 10]), Style::Interleaved);
    let out = two_threads().to_vec(&three).unwrap();
    insta::assert_snapshot!(format!("{:?}", out), @"[1, 2, 11, 3, 12, 13]");
}

#[test]
fn test_parallel_bind_yields_the_same_set() {
    let out = two_threads().to_vec(&nested(Style::Parallel)).unwrap();
    assert_eq!(out.len(), 4);
    let set: BTreeSet<_> = out.into_iter().collect();
    insta::assert_snapshot!(format!("{:?}", set), @"{1, 2, 11, 12}");
}

#[test]
fn test_parallel_race_yields_faster_effect_first() {
    let driver = two_threads();
    let raced = merge(delay(3), delay(2), Style::Parallel);
    assert_eq!(driver.to_vec(&raced).unwrap(), vec![2, 3]);

    let stats = driver.stats();
    assert_eq!(stats.threads_spawned, 2);
    assert_eq!(stats.threads_live, 0);
}

#[test]
fn test_async_race_grows_past_one_worker() {
    let driver = two_threads();
    let raced = merge(delay(3), delay(2), Style::Async);
    assert_eq!(driver.to_vec(&raced).unwrap(), vec![2, 3]);
    assert!(driver.stats().budget_grows >= 1);
}

#[test]
fn test_serial_race_keeps_program_order() {
    let raced = merge(delay(3), delay(2), Style::Serial);
    assert_eq!(two_threads().to_vec(&raced).unwrap(), vec![3, 2]);
}

#[test]
fn test_method_forms_use_the_receiver_style() {
    let a = Stream::iter(vec![1, 3]).with_style(Style::Interleaved);
    let merged = a.merge(Stream::iter(vec![2, 4]));
    assert_eq!(merged.style(), Style::Interleaved);
    assert_eq!(strand::to_vec(&merged).unwrap(), vec![1, 2, 3, 4]);

    let looped = Stream::iter(vec![1, 2]).bind(|x| Stream::iter(vec![x, x * 10]));
    assert_eq!(strand::to_vec(&looped).unwrap(), vec![1, 10, 2, 20]);
}

#[test]
fn test_restyle_changes_only_the_schedule() {
    let serial = merge(Stream::iter(vec![1, 3]), Stream::iter(vec![2, 4]), Style::Serial);
    let interleaved = strand::with_style(serial.clone(), Style::Interleaved);

    assert_eq!(strand::to_vec(&serial).unwrap(), vec![1, 3, 2, 4]);
    assert_eq!(strand::to_vec(&interleaved).unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn test_unfold_counts_down_with_skips() {
    let countdown = Stream::unfold(6u32, |n| {
        Ok(match n {
            0 => Step::Stop,
            n if n % 2 == 1 => Step::Skip(n - 1),
            n => Step::Yield(n, n - 1),
        })
    });
    assert_eq!(strand::to_vec(&countdown).unwrap(), vec![6, 4, 2]);
}

#[test]
fn test_cycle_take_and_empty_cycle() {
    let cycled = Stream::iter(vec!['x', 'y']).cycle().take(5);
    let out: String = strand::to_vec(&cycled).unwrap().into_iter().collect();
    insta::assert_snapshot!(out, @"xyxyx");

    let empty = Stream::<u8>::empty().cycle();
    assert!(strand::to_vec(&empty).unwrap().is_empty());
}

#[test]
fn test_cons_runs_head_before_tail() {
    let stream = Stream::cons(|| Ok(0), Stream::iter(vec![1, 2]));
    assert_eq!(strand::run_fold(&stream, Vec::new(), |mut v, x| {
        v.push(x);
        v
    })
    .unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_error_messages() {
    let err = strand::to_vec(&Stream::<u8>::fail(|| StreamError::source_failure("disk unplugged")))
        .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"Source failed: disk unplugged");

    let err = Driver::new(StreamConfig::default().with_max_threads(0)).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"Scheduler exhausted: `max_threads` must be greater than zero (got 0)");
}

#[test]
fn test_driver_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strand.toml");
    fs::write(
        &path,
        r#"
[stream]
max_threads = 2
max_buffer = 3
"#,
    )
    .unwrap();

    let config = StreamConfig::from_file(&path).unwrap();
    assert_eq!(config.max_threads, 2);
    assert_eq!(config.max_buffer, 3);
    assert_eq!(config.yield_rate_limit, None);

    let driver = Driver::new(config).unwrap();
    let merged = Stream::merge_all(
        (0..4).map(|b| Stream::iter(vec![b; 10])),
        Style::Parallel,
    );
    assert_eq!(driver.drain(&merged).unwrap(), 40);

    let stats = driver.stats();
    assert!(stats.peak_queue_depth <= 3);
    assert_eq!(stats.threads_live, 0);
}

#[test]
fn test_bad_config_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strand.toml");
    fs::write(&path, "[stream]\nyield_rate_limit = -1.0\n").unwrap();

    let err = StreamConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, StreamError::InvalidRate(_)));

    let missing = dir.path().join("absent.toml");
    assert!(StreamConfig::from_file(&missing).is_err());
}
