//! The mood catalog.
//!
//! Eight fixed variants. `value` is the `uint8 moodValue` sent with a ledger
//! write, so the numbering is part of the remote contract and must not change.

use crate::error::{Error, Result};

/// One selectable mood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoodVariant {
    pub value: MoodValue,
    pub label: &'static str,
    pub color: &'static str,
    pub glyph: &'static str,
}

/// A mood value known to be present in [`CATALOG`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct MoodValue(u8);

impl MoodValue {
    /// Validate a raw wire value against the catalog.
    pub fn new(value: u8) -> Result<Self> {
        if usize::from(value) < CATALOG.len() {
            Ok(Self(value))
        } else {
            Err(Error::UnknownMood(value))
        }
    }

    /// Raw wire value.
    #[inline]
    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Catalog entry for this value.
    pub fn variant(&self) -> &'static MoodVariant {
        // MoodValue is only constructed for in-range values
        &CATALOG[usize::from(self.0)]
    }
}

impl TryFrom<u8> for MoodValue {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<MoodValue> for u8 {
    fn from(mood: MoodValue) -> Self {
        mood.0
    }
}

impl std::fmt::Display for MoodValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.variant().label, self.0)
    }
}

/// All selectable moods, indexed by value.
#[rustfmt::skip]
pub const CATALOG: [MoodVariant; 8] = [
    MoodVariant { value: MoodValue(0), label: "Great", color: "#E8F5E9", glyph: "😊" },
    MoodVariant { value: MoodValue(1), label: "Good", color: "#FFF9C4", glyph: "🙂" },
    MoodVariant { value: MoodValue(2), label: "Okay", color: "#FFE0B2", glyph: "😐" },
    MoodVariant { value: MoodValue(3), label: "Neutral", color: "#E1BEE7", glyph: "😶" },
    MoodVariant { value: MoodValue(4), label: "Low", color: "#BBDEFB", glyph: "😔" },
    MoodVariant { value: MoodValue(5), label: "Bad", color: "#CFD8DC", glyph: "😞" },
    MoodVariant { value: MoodValue(6), label: "Stress", color: "#FFCDD2", glyph: "😰" },
    MoodVariant { value: MoodValue(7), label: "Very Bad", color: "#F8BBD0", glyph: "😢" },
];

/// Neutral fill for cells whose value cannot be resolved.
pub const PLACEHOLDER_COLOR: &str = "#ECEFF1";

/// Look up a mood by its wire value.
pub fn lookup(value: u8) -> Result<&'static MoodVariant> {
    MoodValue::new(value).map(|v| v.variant())
}

/// Display color for a raw value, falling back to [`PLACEHOLDER_COLOR`].
///
/// Cosmetic only. Never use the result to build or repair grid state.
pub fn placeholder_color(value: u8) -> &'static str {
    lookup(value).map_or(PLACEHOLDER_COLOR, |v| v.color)
}
