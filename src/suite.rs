//! Orchestration for running queued benchmarks.
//!
//! A [`Suite`] owns a queue of [`Benchmark`]s bucketed by group. [`Suite::run`] drains that queue one group at a time,
//! one benchmark at a time, measuring each with the adaptive timing loop and recording a [`BenchmarkResult`] for it.
//! A benchmark leaves the queue only when it is taken up for measurement, and goes back to the front of its group if
//! the run is dropped or unwinds before it finishes.
//! Lifecycle callbacks from [`crate::Options`] are invoked as results come in.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use benchee::{Options, Suite};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let options = Options::default()
//!     .with_delay(Duration::ZERO)
//!     .with_min_time(Duration::from_millis(5));
//!
//! let suite = Suite::new(options);
//! suite
//!     .add("max", || 1_u64.max(2))
//!     .add_to_group("sum", "arithmetic", || 1_u64 + 2);
//!
//! let results = suite.run().await?;
//!
//! assert_eq!(results["ungrouped"].len(), 1);
//! assert_eq!(results["arithmetic"][0].name, "sum");
//! #     Ok(())
//! # }
//! ```

use std::{
    collections::VecDeque,
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use tokio::{task, time};

use crate::{
    benchmarks::Benchmark,
    error::{BoxError, Error},
    options::{Options, RunType},
    results::{sort_results, BenchmarkResult, GroupResults, Results, Stats},
    timer,
};

/// Share of the projected iteration count used for the next adaptive round, so it lands just under `min_time`.
const REFINEMENT_FACTOR: f64 = 0.9;

#[derive(Default)]
struct State {
    pending: Vec<(String, VecDeque<Benchmark>)>,
    results: Results,
}

struct Inner {
    options: Options,
    running: AtomicBool,
    state: Mutex<State>,
}

/// Clears the running flag when a run ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A benchmark taken off the front of its group's queue for measurement.
///
/// Unless [`Checkout::finish`] is called, dropping it puts the benchmark back at the front of the queue with its
/// iteration count reset.
struct Checkout<'a> {
    state: &'a Mutex<State>,
    benchmark: Option<Benchmark>,
}

impl Checkout<'_> {
    fn finish(mut self) {
        self.benchmark = None;
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        let Some(mut benchmark) = self.benchmark.take() else {
            return;
        };

        log::debug!("[{}/{}] run was interrupted, requeueing benchmark...", benchmark.group, benchmark.name);
        benchmark.iterations = 0;
        let mut state = lock(self.state);
        match state.pending.iter().position(|(group, _)| *group == benchmark.group) {
            Some(index) => state.pending[index].1.push_front(benchmark),
            None => state
                .pending
                .push((benchmark.group.clone(), VecDeque::from([benchmark]))),
        }
    }
}

/// A queue of benchmarks and the results of running them.
///
/// `Suite` is a cheap handle: clones share the same queue, results, and running state.
#[derive(Clone)]
pub struct Suite {
    inner: Arc<Inner>,
}

impl Debug for Suite {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("options", &self.inner.options)
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Default for Suite {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Suite {
    /// Creates an empty suite.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                running: AtomicBool::new(false),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Options this suite was created with.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Whether a run is currently in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Number of benchmarks waiting to be measured.
    ///
    /// During a run this counts down as benchmarks are taken up.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().pending.iter().map(|(_, queue)| queue.len()).sum()
    }

    /// Snapshot of every result recorded so far.
    #[must_use]
    pub fn results(&self) -> Results {
        self.lock().results.clone()
    }

    /// Queues an ungrouped benchmark.
    pub fn add<F, T>(&self, name: &str, function: F) -> &Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        self.add_benchmark(Benchmark::new(name, None, function))
    }

    /// Queues a benchmark in the named group.
    ///
    /// An empty `group` is a group of its own, but like [`crate::UNGROUPED`] it does not trigger `on_group_start`.
    pub fn add_to_group<F, T>(&self, name: &str, group: &str, function: F) -> &Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        self.add_benchmark(Benchmark::new(name, Some(group), function))
    }

    /// Queues a benchmark whose function reports failure by returning an error.
    pub fn add_fallible<F, T, E>(&self, name: &str, group: Option<&str>, function: F) -> &Self
    where
        F: FnMut() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.add_benchmark(Benchmark::fallible(name, group, function))
    }

    /// Queues an already constructed benchmark.
    ///
    /// Benchmarks queued while a run is in progress wait for the next run, behind the ones the run is draining.
    pub fn add_benchmark(&self, benchmark: Benchmark) -> &Self {
        log::debug!("[{}/{}] queueing benchmark...", benchmark.group, benchmark.name);

        let mut state = self.lock();
        state.results.ensure_group(&benchmark.group);
        match state
            .pending
            .iter()
            .position(|(group, _)| *group == benchmark.group)
        {
            Some(index) => state.pending[index].1.push_back(benchmark),
            None => state
                .pending
                .push((benchmark.group.clone(), VecDeque::from([benchmark]))),
        }
        drop(state);

        self
    }

    /// Runs every queued benchmark and returns all results recorded by this suite so far.
    ///
    /// Groups run in the order they were first added, and benchmarks within a group run in the order they were
    /// queued. Nothing ever runs concurrently. A benchmark that fails is recorded with its error and zero throughput;
    /// it does not stop the run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if another run of this suite is in progress. Nothing is changed in that case.
    pub async fn run(&self) -> Result<Results, Error> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("suite is already running, refusing to start another run");
            return Err(Error::AlreadyRunning);
        }
        let _running = RunningGuard(&self.inner.running);

        // Only what is queued now belongs to this run; later additions sit behind it in the same queues.
        let planned: Vec<(String, usize)> = self
            .lock()
            .pending
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(group, queue)| (group.clone(), queue.len()))
            .collect();
        let total: usize = planned.iter().map(|(_, count)| count).sum();
        log::info!(
            "running {total} benchmarks in {} groups ({} mode)...",
            planned.len(),
            self.inner.options.run_type
        );

        let mut remaining = total;
        for (group, count) in planned {
            self.run_group(&group, count, &mut remaining).await;
        }

        let results = self.results();
        if total == 0 {
            if let Some(on_complete) = &self.inner.options.callbacks.on_complete {
                on_complete(&results);
            }
        }
        log::info!("finished running {total} benchmarks");

        Ok(results)
    }

    async fn run_group(&self, group: &str, count: usize, remaining: &mut usize) {
        log::debug!("[{group}] running {count} benchmarks...");

        for index in 0..count {
            let Some(mut checkout) = self.checkout(group) else {
                log::warn!("[{group}] queue drained early, skipping the rest of the group...");
                return;
            };
            let Some(benchmark) = checkout.benchmark.as_mut() else {
                return;
            };

            if index == 0 && benchmark.is_grouped() {
                if let Some(on_group_start) = &self.inner.options.callbacks.on_group_start {
                    on_group_start(group);
                }
            }

            time::sleep(self.inner.options.delay).await;

            let result = self.measure(benchmark).await;
            checkout.finish();
            *remaining -= 1;
            self.record(group, result, index + 1 == count, *remaining == 0);
        }
    }

    fn checkout(&self, group: &str) -> Option<Checkout<'_>> {
        let benchmark = self
            .lock()
            .pending
            .iter_mut()
            .find(|(name, _)| name == group)
            .and_then(|(_, queue)| queue.pop_front())?;

        Some(Checkout {
            state: &self.inner.state,
            benchmark: Some(benchmark),
        })
    }

    /// Adaptive timing loop for a single benchmark.
    ///
    /// Each round invokes the function a number of times; while the cumulative elapsed time since the first round is
    /// below `min_time` (and the suite is adaptive), the next round's count is scaled up to aim just under the target.
    async fn measure(&self, benchmark: &mut Benchmark) -> BenchmarkResult {
        let Options {
            min_iterations,
            min_time,
            run_type,
            ..
        } = &self.inner.options;
        let min_time = min_time.as_secs_f64() * 1000.0;

        log::debug!("[{}/{}] running benchmark...", benchmark.group, benchmark.name);

        let start_time = timer::now();
        let mut iterations = *min_iterations;
        let mut round = 1_u32;
        loop {
            let outcome = benchmark.run_round(iterations);
            let end_time = timer::now();

            if let Err(err) = outcome {
                log::warn!(
                    "[{}/{}] benchmark failed after {} iterations: {err}, continuing...",
                    benchmark.group,
                    benchmark.name,
                    benchmark.iterations
                );
                return BenchmarkResult {
                    name: benchmark.name.clone(),
                    error: Some(err),
                    stats: Stats::failed(start_time, end_time, benchmark.iterations),
                };
            }

            let elapsed = (end_time - start_time).max(1.0);
            log::trace!(
                "[{}/{}] round {round}: {iterations} iterations, {elapsed:.3}ms elapsed",
                benchmark.group,
                benchmark.name
            );

            if *run_type == RunType::Adaptive && elapsed < min_time {
                iterations = refine_iterations(iterations, min_time, elapsed);
                round += 1;
                task::yield_now().await;
                continue;
            }

            return BenchmarkResult {
                name: benchmark.name.clone(),
                error: None,
                stats: Stats::completed(start_time, end_time, benchmark.iterations),
            };
        }
    }

    fn record(&self, group: &str, result: BenchmarkResult, group_done: bool, suite_done: bool) {
        let callbacks = &self.inner.options.callbacks;

        if result.is_ok() {
            log::info!(
                "[{group}/{}] {} ops/sec ({} iterations in {:.2}ms)",
                result.name,
                result.stats.ops,
                result.stats.iterations,
                result.stats.elapsed
            );
        }

        // Snapshots are taken under the lock; callbacks run after it is released so they may use the suite.
        let (group_results, results) = {
            let mut state = self.lock();
            let recorded = state.results.push(group, result.clone());
            let group_results = (group_done && callbacks.on_group_complete.is_some()).then(|| {
                let mut results = recorded.to_vec();
                sort_results(&mut results);
                GroupResults {
                    group: group.to_string(),
                    results,
                }
            });
            let results = (suite_done && callbacks.on_complete.is_some()).then(|| state.results.clone());
            (group_results, results)
        };

        if let Some(on_result) = &callbacks.on_result {
            on_result(&result);
        }
        if let (Some(on_group_complete), Some(group_results)) = (&callbacks.on_group_complete, group_results) {
            on_group_complete(&group_results);
        }
        if let (Some(on_complete), Some(results)) = (&callbacks.on_complete, results) {
            on_complete(&results);
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.inner.state)
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Iteration count for the next adaptive round.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn refine_iterations(iterations: u64, min_time: f64, elapsed: f64) -> u64 {
    (iterations as f64 * min_time / elapsed * REFINEMENT_FACTOR) as u64
}
