//! Error types for baselog-core.

use thiserror::Error;

/// Result type for baselog-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building slots, moods and projections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The mood value is not part of the catalog.
    #[error("unknown mood value {0}")]
    UnknownMood(u8),

    /// The slot lies outside the annual cycle.
    #[error("slot {slot} out of range (cycle length {cycle})")]
    SlotOutOfRange { slot: u64, cycle: u16 },

    /// An authoritative payload listed the same slot twice with different moods.
    #[error("conflicting entries for slot {0}")]
    ConflictingSlot(u16),
}
