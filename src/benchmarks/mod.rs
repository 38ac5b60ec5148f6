//! Benchmarks queued on a suite.
//!
//! A [`Benchmark`] pairs a name and a group with the function under measurement, and keeps count of how many times
//! that function has been invoked so far. Benchmarks are normally created through [`crate::Suite::add`] and friends,
//! but they can also be built directly and driven round by round with [`Benchmark::run_round`].
//!
//! # Examples
//!
//! ```
//! use benchee::benchmarks::{Benchmark, UNGROUPED};
//!
//! let mut benchmark = Benchmark::new("sum", None, || 1 + 2);
//!
//! assert_eq!(benchmark.group, UNGROUPED);
//!
//! benchmark.run_round(5).expect("round failed");
//! benchmark.run_round(0).expect("round failed");
//!
//! assert_eq!(benchmark.iterations, 6);
//! ```

use std::{
    cell::Cell,
    fmt::{self, Debug, Formatter},
    hint::black_box,
    panic::{self, AssertUnwindSafe},
    sync::Once,
};

use crate::error::{BoxError, ExecutionError};

/// Group assigned to benchmarks added without an explicit group.
pub const UNGROUPED: &str = "ungrouped";

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
}

/// Wraps the current panic hook so panics raised inside a benchmark round are not reported by it.
///
/// The wrapper is installed once, the first time a round runs. Panics anywhere else, and panics inside rounds when a
/// hook is set after that point, reach the hook as usual.
fn silence_captured_panics() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !CAPTURING.with(Cell::get) {
                previous(info);
            }
        }));
    });
}

type BenchmarkFn = Box<dyn FnMut() -> Result<(), BoxError> + Send>;

/// A single named unit of measured work.
pub struct Benchmark {
    /// Identifying label; does not need to be unique.
    pub name: String,
    /// Group the benchmark runs in.
    pub group: String,
    /// Invocations of the function so far, across every round.
    pub iterations: u64,
    function: BenchmarkFn,
}

impl Debug for Benchmark {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Benchmark")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

impl Benchmark {
    /// Creates a benchmark for an infallible function.
    ///
    /// The function's return value is passed through [`black_box`] so the work is not optimized away. A panic inside
    /// the function is treated as a failure of the benchmark.
    ///
    /// Without a group the benchmark lands in [`UNGROUPED`]. Any label is accepted, including an empty one.
    pub fn new<F, T>(name: &str, group: Option<&str>, mut function: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        Self::from_boxed(
            name,
            group,
            Box::new(move || -> Result<(), BoxError> {
                black_box(function());
                Ok(())
            }),
        )
    }

    /// Creates a benchmark for a function that can fail by returning an error.
    pub fn fallible<F, T, E>(name: &str, group: Option<&str>, mut function: F) -> Self
    where
        F: FnMut() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::from_boxed(
            name,
            group,
            Box::new(move || -> Result<(), BoxError> {
                black_box(function().map_err(Into::<BoxError>::into)?);
                Ok(())
            }),
        )
    }

    fn from_boxed(name: &str, group: Option<&str>, function: BenchmarkFn) -> Self {
        Self {
            name: name.to_string(),
            group: group.unwrap_or(UNGROUPED).to_string(),
            iterations: 0,
            function,
        }
    }

    /// Whether the benchmark belongs to a named group.
    ///
    /// Neither [`UNGROUPED`] nor an empty label counts as a name.
    #[must_use]
    pub fn is_grouped(&self) -> bool {
        !self.group.is_empty() && self.group != UNGROUPED
    }

    /// Invokes the function `max(iterations, 1)` times back to back.
    ///
    /// Invocations that completed are added to [`Benchmark::iterations`] once the burst ends, whether or not it ended
    /// early. A panic inside the burst is captured as the round's failure and is not reported by the panic hook.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the function; the rest of the burst is skipped.
    pub fn run_round(&mut self, iterations: u64) -> Result<(), ExecutionError> {
        let runs = iterations.max(1);
        let mut completed = 0;
        let function = &mut self.function;

        silence_captured_panics();
        CAPTURING.with(|capturing| capturing.set(true));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), BoxError> {
            while completed < runs {
                function()?;
                completed += 1;
            }
            Ok(())
        }));
        CAPTURING.with(|capturing| capturing.set(false));

        self.iterations += completed;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ExecutionError::from(err)),
            Err(payload) => Err(ExecutionError::from_panic(payload.as_ref())),
        }
    }
}
