//! Measurement records produced by a suite run.

use std::ops::Index;

use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::error::ExecutionError;

/// Immutable snapshot of a single benchmark's measurement.
///
/// Times are in milliseconds as reported by [`crate::timer::now`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Timestamp of the start of the first round.
    pub start_time: f64,
    /// Timestamp of the end of the last round.
    pub end_time: f64,
    /// Total time covered by the measurement.
    pub elapsed: f64,
    /// Total invocations counted towards the measurement.
    pub iterations: u64,
    /// Invocations per second, truncated.
    pub ops: u64,
    /// Time per execution.
    pub tpe: f64,
}

impl Stats {
    /// Stats for a measurement that completed every round.
    ///
    /// `elapsed` is floored to one millisecond so the ratios are always defined.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    #[must_use]
    pub fn completed(start_time: f64, end_time: f64, iterations: u64) -> Self {
        let elapsed = (end_time - start_time).max(1.0);
        let (ops, tpe) = if iterations == 0 {
            (0, 0.0)
        } else {
            (
                (iterations as f64 / (elapsed / 1000.0)) as u64,
                elapsed / iterations as f64,
            )
        };

        Self {
            start_time,
            end_time,
            elapsed,
            iterations,
            ops,
            tpe,
        }
    }

    /// Stats for a measurement that was cut short; throughput is reported as zero.
    #[must_use]
    pub fn failed(start_time: f64, end_time: f64, iterations: u64) -> Self {
        Self {
            start_time,
            end_time,
            elapsed: (end_time - start_time).max(0.0),
            iterations,
            ops: 0,
            tpe: 0.0,
        }
    }
}

/// Outcome of a single benchmark.
#[derive(Clone, Debug, Serialize)]
pub struct BenchmarkResult {
    /// Name the benchmark was added with.
    pub name: String,
    /// Why the measurement stopped early, if it did.
    pub error: Option<ExecutionError>,
    /// The measurement itself.
    pub stats: Stats,
}

impl BenchmarkResult {
    /// Whether the benchmark ran to completion.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Snapshot handed to the `on_group_complete` hook, sorted by throughput.
#[derive(Clone, Debug, Serialize)]
pub struct GroupResults {
    /// Name of the group that completed.
    pub group: String,
    /// Every result of the group, fastest first.
    pub results: Vec<BenchmarkResult>,
}

/// Results of a suite keyed by group.
///
/// Groups keep the order in which they were first added to the suite; results within a group keep the order in which
/// they were recorded. Serializes as a JSON object in that same order.
#[derive(Clone, Debug, Default)]
pub struct Results {
    groups: Vec<(String, Vec<BenchmarkResult>)>,
}

impl Results {
    /// Results recorded for `group`, if the group exists.
    #[must_use]
    pub fn get(&self, group: &str) -> Option<&[BenchmarkResult]> {
        self.groups
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, results)| results.as_slice())
    }

    /// Iterates over `(group, results)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[BenchmarkResult])> {
        self.groups
            .iter()
            .map(|(name, results)| (name.as_str(), results.as_slice()))
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Registers `group` with no results if it is not already known.
    pub(crate) fn ensure_group(&mut self, group: &str) {
        if self.get(group).is_none() {
            self.groups.push((group.to_string(), Vec::new()));
        }
    }

    /// Appends `result` to `group` and returns the group's results so far.
    pub(crate) fn push(&mut self, group: &str, result: BenchmarkResult) -> &[BenchmarkResult] {
        let index = match self.groups.iter().position(|(name, _)| name == group) {
            Some(index) => index,
            None => {
                self.groups.push((group.to_string(), Vec::new()));
                self.groups.len() - 1
            }
        };
        let results = &mut self.groups[index].1;
        results.push(result);
        results
    }
}

impl Index<&str> for Results {
    type Output = [BenchmarkResult];

    fn index(&self, group: &str) -> &Self::Output {
        self.get(group)
            .unwrap_or_else(|| panic!("no results for group ({group})"))
    }
}

impl Serialize for Results {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (group, results) in &self.groups {
            map.serialize_entry(group, results)?;
        }
        map.end()
    }
}

/// Sorts results by throughput, fastest first.
///
/// The sort is stable: results with equal `ops` keep their relative order.
///
/// # Examples
///
/// ```
/// use benchee::{sort_results, BenchmarkResult, Stats};
///
/// let result = |name: &str, ops| BenchmarkResult {
///     name: name.to_string(),
///     error: None,
///     stats: Stats { ops, ..Stats::completed(0.0, 1000.0, ops) },
/// };
///
/// let mut results = vec![result("slow", 10), result("fast", 100), result("also slow", 10)];
/// sort_results(&mut results);
///
/// let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
/// assert_eq!(names, ["fast", "slow", "also slow"]);
/// ```
pub fn sort_results(results: &mut [BenchmarkResult]) {
    results.sort_by(|a, b| b.stats.ops.cmp(&a.stats.ops));
}
