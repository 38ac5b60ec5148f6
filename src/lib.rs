//! Tiny adaptive micro-benchmarking harness.
//!
//! benchee runs candidate functions over and over, measures how long that takes, and reports throughput (operations
//! per second) and time per execution so implementations can be compared against each other. It supports one-off
//! measurements as well as suites of benchmarks organized into groups, with lifecycle callbacks for reporting
//! progress.
//!
//! # Measuring
//! Each benchmark is measured in rounds. The first round invokes the function `min_iterations` times. If the time
//! spent so far is shorter than `min_time`, the iteration count is scaled up towards that target and another round is
//! run, accumulating time and iterations across rounds until the target is met. With [`RunType::Fixed`] there is
//! always exactly one round.
//!
//! Benchmarks never run concurrently: groups run one after another in the order they were first added, and so do the
//! benchmarks inside each group. A configurable delay is awaited before every benchmark, so a suite cooperates with
//! the rest of the async runtime it lives in.
//!
//! A benchmark that panics (or, when added with [`Suite::add_fallible`], returns an error) is recorded with its
//! [`ExecutionError`] and zero throughput. The rest of the suite keeps running.
//!
//! # Usage
//!
//! ## As an executable
//! The `benchee` binary runs a handful of demo suites and prints their results:
//! ```console
//! $ RUST_LOG=info cargo run --release -- --min-time 1000
//! ```
//!
//! ## As a library
//! ```
//! use std::time::Duration;
//!
//! use benchee::{create_suite, Options};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let options = Options::default()
//!     .with_delay(Duration::ZERO)
//!     .with_min_time(Duration::from_millis(10))
//!     .on_group_complete(|group| {
//!         for result in &group.results {
//!             println!("[{}] {}: {} ops/sec", group.group, result.name, result.stats.ops);
//!         }
//!     });
//!
//! let suite = create_suite(Some(options));
//! suite
//!     .add_to_group("max", "comparison", || 1_u64.max(2))
//!     .add_to_group("or", "comparison", || 1_u64 | 2);
//!
//! let results = suite.run().await?;
//! assert_eq!(results["comparison"].len(), 2);
//! #     Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]

pub mod benchmarks;
pub mod error;
pub mod options;
pub mod results;
pub mod suite;
pub mod timer;

pub use benchmarks::{Benchmark, UNGROUPED};
pub use error::{BoxError, Error, ExecutionError};
pub use options::{Callbacks, Options, RunType};
pub use results::{sort_results, BenchmarkResult, GroupResults, Results, Stats};
pub use suite::Suite;

/// Creates a suite with the given options, or the defaults.
#[must_use]
pub fn create_suite(options: Option<Options>) -> Suite {
    Suite::new(options.unwrap_or_default())
}

/// Measures a single function outside of any suite.
///
/// # Errors
///
/// Returns [`Error::MissingResult`] if no result was recorded. A function that panics is not an error here, it
/// produces a result carrying an [`ExecutionError`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use benchee::{benchmark, Options};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let options = Options::default().with_delay(Duration::ZERO).with_min_time(Duration::from_millis(10));
/// let result = benchmark("sum", || 1_u64 + 2, Some(options)).await?;
///
/// assert!(result.is_ok());
/// assert!(result.stats.elapsed >= 10.0);
/// #     Ok(())
/// # }
/// ```
pub async fn benchmark<F, T>(name: &str, function: F, options: Option<Options>) -> Result<BenchmarkResult, Error>
where
    F: FnMut() -> T + Send + 'static,
{
    let suite = create_suite(options);
    suite.add(name, function);

    suite
        .run()
        .await?
        .get(UNGROUPED)
        .and_then(<[BenchmarkResult]>::first)
        .cloned()
        .ok_or_else(|| Error::MissingResult(name.to_string()))
}
