//! Wall clock used to stamp projections and derive today's slot.

use chrono::{DateTime, Local, NaiveDate, Utc};

/// Source of "now".
pub trait Clock: Send + Sync {
    /// Current instant, used for provenance timestamps.
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar date on the user's local calendar.
    fn today(&self) -> NaiveDate;
}

/// The system clock in the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
