///
/// Canonical scenarios
///
/// Each scenario builds one small composition, runs it under the chosen
/// style and returns the produced elements together with the driver's
/// scheduler counters.
///

use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use strand::{bind, merge, Driver, StatsSnapshot, Stream, StreamResult, Style};
use tracing::info;

#[derive(Debug, Serialize)]
pub struct Report {
    pub scenario: &'static str,
    pub style: Style,
    pub items: Vec<u64>,
    pub elapsed_ms: u128,
    pub stats: StatsSnapshot,
}

fn run(driver: &Driver, scenario: &'static str, style: Style, stream: &Stream<u64>) -> StreamResult<Report> {
    info!(scenario, %style, "running scenario");
    let start = Instant::now();
    let items = driver.to_vec(stream)?;
    Ok(Report {
        scenario,
        style,
        items,
        elapsed_ms: start.elapsed().as_millis(),
        stats: driver.stats(),
    })
}

/// `0..left` merged with `100..100 + right`.
pub fn merge_ranges(driver: &Driver, style: Style, left: u64, right: u64) -> StreamResult<Report> {
    let stream = merge(Stream::iter(0..left), Stream::iter(100..100 + right), style);
    run(driver, "merge", style, &stream)
}

/// For every `x` in `1..=outer`, the elements `x, x + 10, x + 20, ...`.
pub fn nested_loop(driver: &Driver, style: Style, outer: u64, inner: u64) -> StreamResult<Report> {
    let stream = bind(
        Stream::iter(1..=outer),
        move |x| Stream::iter((0..inner).map(move |i| x + 10 * i).collect::<Vec<_>>()),
        style,
    );
    run(driver, "bind", style, &stream)
}

/// A slow effect merged with a faster one; each element is its delay in ticks.
pub fn race(driver: &Driver, style: Style, tick: Duration) -> StreamResult<Report> {
    let delayed = |ticks: u32| {
        Stream::once(move || {
            thread::sleep(tick * ticks);
            Ok(u64::from(ticks))
        })
    };
    run(driver, "race", style, &merge(delayed(3), delayed(2), style))
}

/// The first `n` elements of two endless merged counters.
pub fn take_endless(driver: &Driver, style: Style, n: usize) -> StreamResult<Report> {
    let stream = merge(
        Stream::unfold(0u64, |i| Ok(strand::Step::Yield(i, i + 1))),
        Stream::unfold(1_000u64, |i| Ok(strand::Step::Yield(i, i + 1))),
        style,
    );
    run(driver, "take", style, &stream.take(n))
}
