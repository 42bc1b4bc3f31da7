//! BaseLog Core
//!
//! Pure building blocks of the mood year-grid:
//!
//! - **Day indexing**: a point in time maps to one of 365 slots
//! - **Mood catalog**: eight fixed variants with their wire values
//! - **Grid projections**: one entry per slot plus a provenance tag
//! - **Optimistic projection**: fill one cell locally, synchronously
//!
//! Nothing here performs I/O or suspends.
//!
//! # Example
//!
//! ```
//! use baselog_core::{project, MoodValue, Slot};
//! use chrono::Utc;
//!
//! let slot = Slot::new(10).unwrap();
//! let okay = MoodValue::new(2).unwrap();
//! let grid = project(okay, slot, None, Utc::now());
//! assert_eq!(grid.get(slot), Some(okay));
//! assert!(grid.is_optimistic());
//! ```

pub mod day;
pub mod error;
pub mod grid;
pub mod mood;
mod project;

pub use day::{Slot, CYCLE_LEN};
pub use error::{Error, Result};
pub use grid::{DaySlotEntry, GridProjection, Provenance, Source};
pub use mood::{lookup, placeholder_color, MoodValue, MoodVariant, CATALOG, PLACEHOLDER_COLOR};
pub use project::project;
