use std::env;
use std::time::Duration;

/// Timing knobs for one attempt session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// How often the countdown is recomputed.
    pub tick_period: Duration,
    /// Autosave cadence, unless the quiz's access rules name one.
    pub autosave_period: Duration,
    /// Wait between expiry and the automatic submit.
    pub expiry_grace: Duration,
    pub warning_threshold: Duration,
    /// Capacity of the session's event queue.
    pub event_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            autosave_period: Duration::from_secs(30),
            expiry_grace: Duration::from_secs(2),
            warning_threshold: Duration::from_secs(60),
            event_buffer: 64,
        }
    }
}

impl SessionSettings {
    /// Defaults overridden by `QUIZ_AUTOSAVE_SECS`, `QUIZ_EXPIRY_GRACE_SECS`
    /// and `QUIZ_WARNING_SECS`. Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(secs) = secs_var("QUIZ_AUTOSAVE_SECS").filter(|s| *s > 0) {
            settings.autosave_period = Duration::from_secs(secs);
        }
        if let Some(secs) = secs_var("QUIZ_EXPIRY_GRACE_SECS") {
            settings.expiry_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = secs_var("QUIZ_WARNING_SECS") {
            settings.warning_threshold = Duration::from_secs(secs);
        }
        settings
    }

    /// Prefer the quiz's own autosave period when it names a usable one.
    #[must_use]
    pub fn with_autosave_override(mut self, seconds: Option<u64>) -> Self {
        if let Some(secs) = seconds.filter(|s| *s > 0) {
            self.autosave_period = Duration::from_secs(secs);
        }
        self
    }
}

fn secs_var(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse::<u64>().ok())
}
