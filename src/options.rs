//! Suite configuration.
//!
//! [`Options`] carries the knobs that drive the adaptive timing loop along with the optional lifecycle callbacks.
//! Options can be built in code or loaded from JSON; in both cases any field left out takes its default value and any
//! field the harness does not recognize is kept as-is in [`Options::extra`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use benchee::{Options, RunType};
//!
//! let options = Options::from_json(r#"{ "minTime": 1000, "type": "fixed", "label": "nightly" }"#)
//!     .expect("could not parse options");
//!
//! assert_eq!(options.min_time, Duration::from_millis(1000));
//! assert_eq!(options.delay, Duration::from_millis(100));
//! assert_eq!(options.run_type, RunType::Fixed);
//! assert_eq!(options.extra["label"], "nightly");
//! ```

use std::{
    fmt::{self, Debug, Display, Formatter},
    fs,
    path::Path,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::Error,
    results::{BenchmarkResult, GroupResults, Results},
};

/// Default pause before each benchmark in a group.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);
/// Default iteration count for the first adaptive round.
pub const DEFAULT_MIN_ITERATIONS: u64 = 10;
/// Default minimum measured time before a measurement is accepted.
pub const DEFAULT_MIN_TIME: Duration = Duration::from_millis(500);

/// How many rounds a benchmark is measured for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    /// Keep refining the iteration count until the measurement takes at least `min_time`.
    #[default]
    Adaptive,
    /// Run exactly `min_iterations` invocations in a single round.
    Fixed,
}

impl Display for RunType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adaptive => write!(f, "adaptive"),
            Self::Fixed => write!(f, "fixed"),
        }
    }
}

impl FromStr for RunType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adaptive" => Ok(Self::Adaptive),
            "fixed" => Ok(Self::Fixed),
            other => Err(Error::Configuration(format!(
                "unknown run type ({other}), expected \"adaptive\" or \"fixed\""
            ))),
        }
    }
}

/// Called with every result as soon as it is recorded.
pub type ResultCallback = Arc<dyn Fn(&BenchmarkResult) + Send + Sync>;
/// Called with the group name before a named group's first benchmark runs.
pub type GroupStartCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Called with a throughput-sorted snapshot once a group's last benchmark is recorded.
pub type GroupCompleteCallback = Arc<dyn Fn(&GroupResults) + Send + Sync>;
/// Called with every result of the suite once nothing is left to run.
pub type CompleteCallback = Arc<dyn Fn(&Results) + Send + Sync>;

/// Optional lifecycle hooks.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// See [`ResultCallback`].
    pub on_result: Option<ResultCallback>,
    /// See [`GroupStartCallback`].
    pub on_group_start: Option<GroupStartCallback>,
    /// See [`GroupCompleteCallback`].
    pub on_group_complete: Option<GroupCompleteCallback>,
    /// See [`CompleteCallback`].
    pub on_complete: Option<CompleteCallback>,
}

impl Debug for Callbacks {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_result", &self.on_result.is_some())
            .field("on_group_start", &self.on_group_start.is_some())
            .field("on_group_complete", &self.on_group_complete.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Normalized suite configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Pause inserted before each benchmark of a group.
    #[serde(with = "millis")]
    pub delay: Duration,
    /// Iteration count of the first round (and of the only round for [`RunType::Fixed`]).
    pub min_iterations: u64,
    /// Minimum cumulative time a measurement must cover before it is accepted.
    #[serde(with = "millis")]
    pub min_time: Duration,
    /// Adaptive or fixed measurement.
    #[serde(rename = "type")]
    pub run_type: RunType,
    /// Fields the harness does not recognize, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Lifecycle hooks; never serialized.
    #[serde(skip)]
    pub callbacks: Callbacks,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            min_iterations: DEFAULT_MIN_ITERATIONS,
            min_time: DEFAULT_MIN_TIME,
            run_type: RunType::default(),
            extra: Map::new(),
            callbacks: Callbacks::default(),
        }
    }
}

impl Options {
    /// Parses options from a JSON object, filling absent fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the input is not a JSON object of the expected shape.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses options from a JSON file, see [`Options::from_json`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Json`] if it cannot be parsed.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        log::debug!("reading options from {}...", path.display());
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Layers a JSON object of overrides over these options.
    ///
    /// Keys present in `overrides` replace the current values, everything else (including callbacks) is kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `overrides` is not an object and [`Error::Json`] if the merged value does
    /// not form valid options.
    pub fn merge(&self, overrides: Value) -> Result<Self, Error> {
        let Value::Object(overrides) = overrides else {
            return Err(Error::Configuration(
                "option overrides must be a JSON object".to_string(),
            ));
        };

        let mut merged = match serde_json::to_value(self)? {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        merged.extend(overrides);

        let mut options: Self = serde_json::from_value(Value::Object(merged))?;
        options.callbacks = self.callbacks.clone();
        Ok(options)
    }

    /// Sets [`Options::delay`].
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets [`Options::min_iterations`].
    #[must_use]
    pub fn with_min_iterations(mut self, min_iterations: u64) -> Self {
        self.min_iterations = min_iterations;
        self
    }

    /// Sets [`Options::min_time`].
    #[must_use]
    pub fn with_min_time(mut self, min_time: Duration) -> Self {
        self.min_time = min_time;
        self
    }

    /// Sets [`Options::run_type`].
    #[must_use]
    pub fn with_run_type(mut self, run_type: RunType) -> Self {
        self.run_type = run_type;
        self
    }

    /// Installs an `on_result` hook.
    #[must_use]
    pub fn on_result(mut self, f: impl Fn(&BenchmarkResult) + Send + Sync + 'static) -> Self {
        self.callbacks.on_result = Some(Arc::new(f));
        self
    }

    /// Installs an `on_group_start` hook.
    #[must_use]
    pub fn on_group_start(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.callbacks.on_group_start = Some(Arc::new(f));
        self
    }

    /// Installs an `on_group_complete` hook.
    #[must_use]
    pub fn on_group_complete(mut self, f: impl Fn(&GroupResults) + Send + Sync + 'static) -> Self {
        self.callbacks.on_group_complete = Some(Arc::new(f));
        self
    }

    /// Installs an `on_complete` hook.
    #[must_use]
    pub fn on_complete(mut self, f: impl Fn(&Results) + Send + Sync + 'static) -> Self {
        self.callbacks.on_complete = Some(Arc::new(f));
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
