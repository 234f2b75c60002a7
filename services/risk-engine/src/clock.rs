//! Wall-clock access for time-of-day rules

use chrono::{DateTime, Local, Timelike, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Hour of day (0-23) in the server's local time zone
    fn local_hour(&self) -> u32;
}

/// The host clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }
}

/// A clock frozen at one local hour
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    hour: u32,
}

impl FixedClock {
    /// # Panics
    /// Panics if `hour` is not 0-23
    pub fn at_hour(hour: u32) -> Self {
        assert!(hour < 24, "hour must be 0-23");
        Self { hour }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_hour(&self) -> u32 {
        self.hour
    }
}
