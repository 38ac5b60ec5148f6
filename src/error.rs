//! Error types for the harness.
//!
//! There are two distinct families of failure here. [`Error`] is returned from the API itself when the harness is
//! misused (reentrant runs or bad configuration). [`ExecutionError`] is never returned from an API call,
//! it is captured data inside a [`crate::BenchmarkResult`] describing why a single benchmark stopped early.

use std::{any::Any, error, sync::Arc};

use serde::{Serialize, Serializer};

/// Boxed error type that fallible benchmark functions may return.
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// Failure of a harness API call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An option value could not be understood.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// Options could not be parsed from JSON.
    #[error("could not parse options")]
    Json(#[from] serde_json::Error),
    /// Options could not be read from disk.
    #[error("could not read options")]
    Io(#[from] std::io::Error),
    /// [`crate::Suite::run`] was called while the suite was already running.
    #[error("suite is already running")]
    AlreadyRunning,
    /// A standalone benchmark finished without producing a result.
    #[error("no result was produced for benchmark ({0})")]
    MissingResult(String),
}

/// Why a single benchmark's measurement was cut short.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The benchmark function panicked.
    #[error("benchmark panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },
    /// The benchmark function returned an error.
    #[error("benchmark failed: {source}")]
    Failed {
        /// The error the function returned.
        #[source]
        source: Arc<dyn error::Error + Send + Sync + 'static>,
    },
}

impl ExecutionError {
    /// Normalizes a caught panic payload.
    ///
    /// String payloads (from `panic!("...")`) keep their text; anything else is reported with a generic message since
    /// the original value cannot be rendered.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { message }
    }
}

impl From<BoxError> for ExecutionError {
    fn from(err: BoxError) -> Self {
        Self::Failed {
            source: Arc::from(err),
        }
    }
}

impl Serialize for ExecutionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
