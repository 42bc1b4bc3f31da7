//! Day indexing - mapping calendar time onto the annual grid.
//!
//! The grid has a fixed 365-slot cycle. A slot is the zero-based day of the
//! year on the local calendar, reduced modulo the cycle length:
//!
//! ```text
//! slot(t) = days_since(start_of_year(t), t) mod 365
//! ```
//!
//! The 366th day of a leap year (Dec 31) therefore lands on slot 0. This is
//! an accepted approximation of the on-chain encoding and is kept as-is.

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone};

use crate::error::{Error, Result};

/// Number of slots in one annual cycle.
pub const CYCLE_LEN: u16 = 365;

/// A position in the annual grid, always in `[0, CYCLE_LEN)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u16", into = "u16"))]
pub struct Slot(u16);

impl Slot {
    /// First slot of the cycle.
    pub const FIRST: Self = Self(0);

    /// Create a slot from a raw index.
    pub fn new(index: u16) -> Result<Self> {
        if index < CYCLE_LEN {
            Ok(Self(index))
        } else {
            Err(Error::SlotOutOfRange {
                slot: u64::from(index),
                cycle: CYCLE_LEN,
            })
        }
    }

    /// Slot for a calendar date.
    pub fn for_date(date: NaiveDate) -> Self {
        // ordinal0 is at most 365, so the cast and modulo are lossless
        Self((date.ordinal0() % u32::from(CYCLE_LEN)) as u16)
    }

    /// Slot for a point in time, using the calendar of its timezone.
    pub fn at<Tz: TimeZone>(t: &DateTime<Tz>) -> Self {
        Self::for_date(t.date_naive())
    }

    /// Slot for the current local day.
    pub fn today() -> Self {
        Self::at(&Local::now())
    }

    /// Raw index value.
    #[inline]
    pub const fn index(&self) -> u16 {
        self.0
    }

    /// The `dayIndex` argument sent with a ledger write.
    #[inline]
    pub const fn day_index(&self) -> u64 {
        self.0 as u64
    }

    /// Iterate every slot of the cycle in order.
    pub fn all() -> impl Iterator<Item = Slot> {
        (0..CYCLE_LEN).map(Slot)
    }
}

impl TryFrom<u16> for Slot {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<u64> for Slot {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self> {
        match u16::try_from(value) {
            Ok(v) if v < CYCLE_LEN => Ok(Self(v)),
            _ => Err(Error::SlotOutOfRange {
                slot: value,
                cycle: CYCLE_LEN,
            }),
        }
    }
}

impl From<Slot> for u16 {
    fn from(slot: Slot) -> Self {
        slot.0
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn first_and_last_day_of_common_year() {
        assert_eq!(Slot::for_date(date(2025, 1, 1)), Slot::FIRST);
        assert_eq!(Slot::for_date(date(2025, 1, 11)).index(), 10);
        assert_eq!(Slot::for_date(date(2025, 12, 31)).index(), 364);
    }

    #[test]
    fn leap_year_last_day_wraps_to_first_slot() {
        assert_eq!(Slot::for_date(date(2024, 12, 30)).index(), 364);
        assert_eq!(Slot::for_date(date(2024, 12, 31)), Slot::FIRST);
    }

    #[test]
    fn at_uses_calendar_of_timezone() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 23, 30, 0).unwrap();
        assert_eq!(Slot::at(&t), Slot::for_date(date(2025, 3, 1)));
    }

    #[test]
    fn new_rejects_out_of_range() {
        assert!(Slot::new(364).is_ok());
        assert_eq!(
            Slot::new(365),
            Err(Error::SlotOutOfRange { slot: 365, cycle: 365 })
        );
        assert!(Slot::try_from(u64::MAX).is_err());
    }

    #[test]
    fn all_covers_cycle() {
        let slots: Vec<Slot> = Slot::all().collect();
        assert_eq!(slots.len(), CYCLE_LEN as usize);
        assert_eq!(slots[0], Slot::FIRST);
        assert_eq!(slots[364].index(), 364);
    }

    proptest! {
        #[test]
        fn slot_always_in_range(days in 0i32..200_000) {
            let d = date(1900, 1, 1) + chrono::Duration::days(i64::from(days));
            prop_assert!(Slot::for_date(d).index() < CYCLE_LEN);
        }

        #[test]
        fn slot_non_decreasing_within_year(
            year in 1970i32..2200,
            a in 1u32..=365,
            b in 1u32..=365,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo = NaiveDate::from_yo_opt(year, lo).unwrap();
            let hi = NaiveDate::from_yo_opt(year, hi).unwrap();
            prop_assert!(Slot::for_date(lo) <= Slot::for_date(hi));
        }
    }
}
