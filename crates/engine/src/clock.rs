use std::time::Duration;

use web_time::{Instant, SystemTime};

/// Per-request monotonic timer anchored to the wall clock.
///
/// Offsets are reported with nanosecond resolution so trace records can
/// order field resolutions that settle within the same microsecond.
#[derive(Debug, Clone)]
pub struct Clock {
    started_at: SystemTime,
    base: Instant,
}

impl Clock {
    pub fn start() -> Self {
        Clock {
            started_at: SystemTime::now(),
            base: Instant::now(),
        }
    }

    /// Wall-clock time at which this clock was started.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Wall-clock start as nanoseconds since the unix epoch.
    pub fn started_at_unix_nanos(&self) -> u64 {
        self.started_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }

    pub fn elapsed(&self) -> Duration {
        self.base.elapsed()
    }

    pub fn elapsed_nanos(&self) -> u64 {
        self.elapsed().as_nanos() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::start()
    }
}
