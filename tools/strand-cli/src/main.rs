///
/// strand CLI - Run stream scenarios under any execution style
///
/// Provides commands for exercising the scheduler by hand:
/// - strand merge: Merge two finite ranges
/// - strand bind: Nested loop over an outer range
/// - strand race: Merge a slow and a fast delayed effect
/// - strand take: Take a prefix of two endless merged counters
/// - strand styles: List the execution styles
///

mod scenarios;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use scenarios::Report;
use strand::{Driver, StreamConfig, StreamResult, Style};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "strand")]
#[command(author, version, about = "Effectful streams with pluggable execution styles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Execution style (serial, interleaved, async, parallel)
    #[arg(long, global = true, default_value = "serial")]
    style: Style,

    /// Load scheduler settings from a TOML file with a [stream] table
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Upper bound on worker threads per concurrent region
    #[arg(long, global = true)]
    max_threads: Option<usize>,

    /// Capacity of the shared element queue
    #[arg(long, global = true)]
    max_buffer: Option<usize>,

    /// Maximum elements published per second by each concurrent region
    #[arg(long, global = true)]
    rate: Option<f64>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge 0..left with 100..100+right
    Merge {
        #[arg(long, default_value_t = 3)]
        left: u64,

        #[arg(long, default_value_t = 3)]
        right: u64,
    },

    /// For each x in 1..=outer, yield x, x+10, ... (inner elements)
    Bind {
        #[arg(long, default_value_t = 2)]
        outer: u64,

        #[arg(long, default_value_t = 2)]
        inner: u64,
    },

    /// Merge a 3-tick delay with a 2-tick delay
    Race {
        /// Length of one tick in milliseconds
        #[arg(long, default_value_t = 100)]
        tick_ms: u64,
    },

    /// Take the first n elements of two endless merged counters
    Take {
        #[arg(short, default_value_t = 10)]
        n: usize,
    },

    /// List the execution styles
    Styles,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(log_level(cli.verbose))
        .init();

    let report = build_config(&cli)
        .and_then(Driver::new)
        .and_then(|driver| run_command(&cli, &driver));

    match report {
        Ok(Some(report)) => print_report(&report, cli.json),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Config file first, then command-line overrides.
fn build_config(cli: &Cli) -> StreamResult<StreamConfig> {
    let mut config = match &cli.config {
        Some(path) => StreamConfig::from_file(path)?,
        None => StreamConfig::default(),
    };
    if let Some(max_threads) = cli.max_threads {
        config = config.with_max_threads(max_threads);
    }
    if let Some(max_buffer) = cli.max_buffer {
        config = config.with_max_buffer(max_buffer);
    }
    if let Some(rate) = cli.rate {
        config = config.with_yield_rate_limit(rate);
    }
    Ok(config)
}

fn run_command(cli: &Cli, driver: &Driver) -> StreamResult<Option<Report>> {
    let style = cli.style;
    let report = match cli.command {
        Commands::Merge { left, right } => scenarios::merge_ranges(driver, style, left, right)?,
        Commands::Bind { outer, inner } => scenarios::nested_loop(driver, style, outer, inner)?,
        Commands::Race { tick_ms } => scenarios::race(driver, style, Duration::from_millis(tick_ms))?,
        Commands::Take { n } => scenarios::take_endless(driver, style, n)?,
        Commands::Styles => {
            for style in Style::ALL {
                println!("{}", style);
            }
            return Ok(None);
        }
    };
    Ok(Some(report))
}

fn print_report(report: &Report, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing report: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let stats = &report.stats;
    println!("{} ({}): {:?}", report.scenario, report.style, report.items);
    println!("  elapsed:          {} ms", report.elapsed_ms);
    println!("  threads spawned:  {}", stats.threads_spawned);
    println!("  threads joined:   {}", stats.threads_joined);
    println!("  threads live:     {}", stats.threads_live);
    println!("  peak queue depth: {}", stats.peak_queue_depth);
    println!("  budget grows:     {}", stats.budget_grows);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).expect("arguments should parse")
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["strand", "merge"]);
        assert_eq!(cli.style, Style::Serial);
        assert!(!cli.json);
        assert!(matches!(cli.command, Commands::Merge { left: 3, right: 3 }));
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = parse(&["strand", "take", "-n", "5", "--style", "Parallel", "--max-threads", "2", "-vv"]);
        assert_eq!(cli.style, Style::Parallel);
        assert_eq!(cli.max_threads, Some(2));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Take { n: 5 }));
    }

    #[test]
    fn test_unknown_style_is_rejected() {
        assert!(Cli::try_parse_from(["strand", "merge", "--style", "eager"]).is_err());
    }

    #[test]
    fn test_overrides_applied_to_config() {
        let cli = parse(&["strand", "race", "--max-buffer", "8", "--rate", "50"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.max_buffer, 8);
        assert_eq!(config.yield_rate_limit, Some(50.0));
    }

    #[test]
    fn test_invalid_override_fails_driver_construction() {
        let cli = parse(&["strand", "merge", "--max-threads", "0"]);
        assert!(build_config(&cli).and_then(Driver::new).is_err());
    }

    #[test]
    fn test_styles_command_prints_without_report() {
        let cli = parse(&["strand", "styles"]);
        let report = run_command(&cli, &Driver::default()).unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn test_log_level_from_verbosity() {
        assert_eq!(log_level(0), Level::WARN);
        assert_eq!(log_level(2), Level::DEBUG);
        assert_eq!(log_level(9), Level::TRACE);
    }
}
