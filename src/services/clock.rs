use std::sync::Mutex;

use mongodb::bson::DateTime;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime {
        DateTime::now()
    }
}

/// A clock that only moves when told to. Used for replaying data and in tests.
pub struct ManualClock {
    now: Mutex<DateTime>,
}

impl ManualClock {
    pub fn new(at: DateTime) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = at;
    }

    pub fn advance_minutes(&self, minutes: i64) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now = DateTime::from_millis(now.timestamp_millis() + minutes * 60_000);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}
