//!
//! strand - Effectful streams with pluggable execution styles
//!
//! A `Stream<T>` is a lazy sequence of effectful steps. Pipelines are built
//! from generation (`once`, `unfold`, `iter`, `repeat`), composition
//! (`append`, `merge`, `bind`) and transformation (`map`, `filter`, `take`)
//! steps, and run by a `Driver`.
//!
//! ## Execution Styles
//!
//! How the branches of a `merge` or `bind` are evaluated is a runtime
//! choice, carried as a `Style` tag on the composition:
//!
//! - `Serial` - input order, one branch after another, no threads
//! - `Interleaved` - fair turn-taking between branches, no threads
//! - `Async` - demand-driven worker threads, completion order
//! - `Parallel` - one eager worker per branch, arrival order
//!
//! ```rust,ignore
//! use strand::{bind, Stream, Style, to_vec};
//!
//! let outer = Stream::iter(vec![1, 2]);
//! let nested = bind(outer, |x| Stream::iter(vec![x, x + 10]), Style::Interleaved);
//! assert_eq!(to_vec(&nested)?, vec![1, 2, 11, 12]);
//! ```
//!
//! ## Concurrency
//!
//! Async and Parallel compositions run on OS threads that publish into a
//! bounded shared channel. The consumer blocks while it is empty, workers
//! block while it is full. Stopping early (via `take`, `take_while`, or a
//! fold returning `ControlFlow::Break`) cancels the region and joins every
//! worker before control returns. The first worker failure cancels its
//! siblings and is returned from the next pull.
//!

mod channel;
mod compose;
mod runtime;
mod scheduler;

pub mod config;
pub mod driver;
pub mod errors;
pub mod ops;
pub mod stats;
pub mod step;
pub mod stream;
pub mod style;

pub use config::StreamConfig;
pub use driver::{run_fold, run_fold_m, to_vec, Driver};
pub use errors::{BoxError, StreamError, StreamResult};
pub use stats::{SchedulerStats, StatsSnapshot};
pub use step::{Cursor, Step};
pub use stream::{bind, merge, with_style, Stream};
pub use style::Style;
