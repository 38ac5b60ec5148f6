//! Process-wide monotonic timestamps in fractional milliseconds.
//!
//! Timestamps are measured from an arbitrary but fixed epoch that depends on the selected provider. A small set of
//! clock providers is tried in order, each behind a capability probe, and the first one that passes is kept for the
//! rest of the process. Whatever provider is selected, readings never go backwards.

use std::{
    fmt::{self, Display, Formatter},
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
    time::Instant,
};

use chrono::{DateTime, Utc};

/// Which clock provider ended up backing [`now`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// High-resolution monotonic clock.
    Monotonic,
    /// Wall clock captured at load time plus a monotonic delta.
    AnchoredWallClock,
    /// Plain wall clock, clamped so it never decreases.
    WallClock,
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monotonic => write!(f, "monotonic"),
            Self::AnchoredWallClock => write!(f, "anchored wall clock"),
            Self::WallClock => write!(f, "wall clock"),
        }
    }
}

trait Clock: Send + Sync {
    fn source(&self) -> Source;
    /// Milliseconds since this clock's epoch.
    fn now(&self) -> f64;
}

struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    fn probe() -> Option<Self> {
        let epoch = Instant::now();
        // `Instant` is monotonic on every supported platform, but make sure it actually ticks forward.
        (Instant::now() >= epoch).then_some(Self { epoch })
    }
}

impl Clock for MonotonicClock {
    fn source(&self) -> Source {
        Source::Monotonic
    }

    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}

struct AnchoredWallClock {
    anchor: DateTime<Utc>,
    epoch: Instant,
}

impl AnchoredWallClock {
    fn probe() -> Option<Self> {
        let anchor = Utc::now();
        (anchor.timestamp_millis() > 0).then(|| Self {
            anchor,
            epoch: Instant::now(),
        })
    }
}

impl Clock for AnchoredWallClock {
    fn source(&self) -> Source {
        Source::AnchoredWallClock
    }

    #[allow(clippy::cast_precision_loss)]
    fn now(&self) -> f64 {
        // Epoch is the Unix epoch; only the anchor comes from the coarse clock.
        self.anchor.timestamp_millis() as f64 + self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}

struct WallClock {
    epoch_millis: i64,
    last: AtomicU64,
}

impl WallClock {
    fn probe() -> Option<Self> {
        let epoch_millis = Utc::now().timestamp_millis();
        (epoch_millis > 0).then(|| Self {
            epoch_millis,
            last: AtomicU64::new(0_f64.to_bits()),
        })
    }
}

impl Clock for WallClock {
    fn source(&self) -> Source {
        Source::WallClock
    }

    #[allow(clippy::cast_precision_loss)]
    fn now(&self) -> f64 {
        let reading = (Utc::now().timestamp_millis() - self.epoch_millis) as f64;
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                (reading > f64::from_bits(last)).then_some(reading.to_bits())
            })
            .unwrap_or_else(|last| last);
        reading.max(f64::from_bits(previous))
    }
}

fn select() -> Box<dyn Clock> {
    let providers: [fn() -> Option<Box<dyn Clock>>; 3] = [
        || MonotonicClock::probe().map(|c| Box::new(c) as Box<dyn Clock>),
        || AnchoredWallClock::probe().map(|c| Box::new(c) as Box<dyn Clock>),
        || WallClock::probe().map(|c| Box::new(c) as Box<dyn Clock>),
    ];

    for provider in providers {
        if let Some(clock) = provider() {
            log::debug!("using {} clock for timing", clock.source());
            return clock;
        }
    }

    log::warn!("no clock provider passed its probe, falling back to the wall clock anyway...");
    Box::new(WallClock {
        epoch_millis: Utc::now().timestamp_millis(),
        last: AtomicU64::new(0_f64.to_bits()),
    })
}

fn clock() -> &'static dyn Clock {
    static CLOCK: OnceLock<Box<dyn Clock>> = OnceLock::new();
    CLOCK.get_or_init(select).as_ref()
}

/// Milliseconds elapsed since the process-wide timing epoch.
///
/// Only differences between two readings are meaningful.
///
/// # Examples
///
/// ```
/// let start = benchee::timer::now();
/// let end = benchee::timer::now();
///
/// assert!(end >= start);
/// ```
#[must_use]
pub fn now() -> f64 {
    clock().now()
}

/// The clock provider selected for this process.
#[must_use]
pub fn source() -> Source {
    clock().source()
}
