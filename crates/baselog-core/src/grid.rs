//! Year-grid projections.
//!
//! A [`GridProjection`] always holds exactly one [`DaySlotEntry`] per slot,
//! ordered by slot. The provenance tag says where the data came from; a
//! projection without provenance is the "no data yet" sentinel.

use chrono::{DateTime, Utc};

use crate::day::{Slot, CYCLE_LEN};
use crate::error::{Error, Result};
use crate::mood::MoodValue;

/// One cell of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DaySlotEntry {
    pub slot: Slot,
    pub mood: Option<MoodValue>,
}

/// Where a projection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Source {
    /// Computed locally right after a selection.
    Optimistic,
    /// Read back from the ledger.
    Authoritative,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Optimistic => write!(f, "optimistic"),
            Self::Authoritative => write!(f, "authoritative"),
        }
    }
}

/// Provenance tag of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Provenance {
    pub source: Source,
    pub obtained_at: DateTime<Utc>,
}

/// The full annual grid plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GridProjection {
    entries: Vec<DaySlotEntry>,
    provenance: Option<Provenance>,
}

impl Default for GridProjection {
    fn default() -> Self {
        Self::empty()
    }
}

impl GridProjection {
    /// All-absent baseline with no provenance.
    pub fn empty() -> Self {
        Self {
            entries: Slot::all().map(|slot| DaySlotEntry { slot, mood: None }).collect(),
            provenance: None,
        }
    }

    /// Build an authoritative projection from logged days.
    ///
    /// Repeating a slot with the same mood is tolerated; repeating it with a
    /// different mood is an error.
    pub fn authoritative<I>(days: I, obtained_at: DateTime<Utc>) -> Result<Self>
    where
        I: IntoIterator<Item = (Slot, MoodValue)>,
    {
        let mut grid = Self::empty();
        for (slot, mood) in days {
            let cell = &mut grid.entries[usize::from(slot.index())];
            match cell.mood {
                Some(existing) if existing != mood => {
                    return Err(Error::ConflictingSlot(slot.index()));
                }
                _ => cell.mood = Some(mood),
            }
        }
        grid.provenance = Some(Provenance {
            source: Source::Authoritative,
            obtained_at,
        });
        Ok(grid)
    }

    /// Copy of this projection with one cell replaced and a new provenance.
    pub(crate) fn with_cell(&self, slot: Slot, mood: MoodValue, provenance: Provenance) -> Self {
        let mut entries = self.entries.clone();
        entries[usize::from(slot.index())].mood = Some(mood);
        Self {
            entries,
            provenance: Some(provenance),
        }
    }

    /// Every cell, ordered by slot.
    pub fn entries(&self) -> &[DaySlotEntry] {
        &self.entries
    }

    /// Mood recorded for a slot, if any.
    pub fn get(&self, slot: Slot) -> Option<MoodValue> {
        self.entries[usize::from(slot.index())].mood
    }

    /// Provenance tag, `None` for the "no data yet" sentinel.
    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    pub fn source(&self) -> Option<Source> {
        self.provenance.map(|p| p.source)
    }

    pub fn is_authoritative(&self) -> bool {
        self.source() == Some(Source::Authoritative)
    }

    pub fn is_optimistic(&self) -> bool {
        self.source() == Some(Source::Optimistic)
    }

    /// True for the "no data yet" sentinel.
    pub fn is_unset(&self) -> bool {
        self.provenance.is_none()
    }

    /// Filled cells only.
    pub fn filled(&self) -> impl Iterator<Item = (Slot, MoodValue)> + '_ {
        self.entries.iter().filter_map(|e| e.mood.map(|m| (e.slot, m)))
    }

    pub fn filled_count(&self) -> usize {
        self.filled().count()
    }

    /// Same cells, ignoring provenance.
    pub fn same_cells(&self, other: &GridProjection) -> bool {
        self.entries == other.entries
    }

    /// Check the one-entry-per-slot invariant.
    pub fn is_well_formed(&self) -> bool {
        self.entries.len() == usize::from(CYCLE_LEN)
            && self
                .entries
                .iter()
                .enumerate()
                .all(|(i, e)| usize::from(e.slot.index()) == i)
    }
}
