use chrono::{NaiveDate, NaiveDateTime, Utc};
use parking_lot::Mutex;

/// Source of "today" for hold/release and audit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Manually driven clock.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn at(date: NaiveDate) -> Self {
        Self {
            now: Mutex::new(date.and_time(chrono::NaiveTime::MIN)),
        }
    }

    pub fn set_today(&self, date: NaiveDate) {
        *self.now.lock() = date.and_time(chrono::NaiveTime::MIN);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}
