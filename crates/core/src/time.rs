use chrono::{DateTime, Duration, Utc};

/// A simple clock abstraction for deterministic time in services and tests.
///
/// Countdown arithmetic always works from absolute timestamps read through this
/// clock, never from accumulated tick counts.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
    /// Wall time that advances with tokio's clock, starting at `origin`.
    ///
    /// Under a paused test runtime this follows virtual time, so timers and the
    /// countdown agree on how much time has passed.
    Runtime {
        origin: DateTime<Utc>,
        anchor: tokio::time::Instant,
    },
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns a clock reading `origin` now and advancing with tokio time.
    #[must_use]
    pub fn runtime(origin: DateTime<Utc>) -> Self {
        Self::Runtime {
            origin,
            anchor: tokio::time::Instant::now(),
        }
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
            Clock::Runtime { origin, anchor } => {
                let elapsed = Duration::from_std(anchor.elapsed()).unwrap_or(Duration::MAX);
                origin.checked_add_signed(elapsed).unwrap_or(*origin)
            }
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on the other variants.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}
