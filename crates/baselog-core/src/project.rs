//! Optimistic projection.
//!
//! Fills one cell of a projection locally so the grid can change in the same
//! pass as the write submission, before the ledger has anything to say.

use chrono::{DateTime, Utc};

use crate::day::Slot;
use crate::grid::{GridProjection, Provenance, Source};
use crate::mood::MoodValue;

/// Project `mood` onto `slot`, keeping every other cell of `previous`.
///
/// With no previous projection the all-absent baseline is used.
pub fn project(
    mood: MoodValue,
    slot: Slot,
    previous: Option<&GridProjection>,
    now: DateTime<Utc>,
) -> GridProjection {
    let provenance = Provenance {
        source: Source::Optimistic,
        obtained_at: now,
    };
    match previous {
        Some(prev) => prev.with_cell(slot, mood, provenance),
        None => GridProjection::empty().with_cell(slot, mood, provenance),
    }
}
