//! Plain-text and JSON views of the grid.

use baselog_core::{GridProjection, Slot};
use baselog_sync::WriteAttempt;
use serde::Serialize;

/// Cells per printed row.
pub const ROW: usize = 7;

const EMPTY: &str = "·";

/// Render the grid as rows of mood glyphs. `today` is bracketed.
pub fn grid(projection: &GridProjection, today: Slot) -> String {
    let mut out = String::new();
    for row in projection.entries().chunks(ROW) {
        let Some(first) = row.first() else { continue };
        out.push_str(&format!("{:>3} ", first.slot.index()));
        for entry in row {
            let glyph = entry.mood.map_or(EMPTY, |m| m.variant().glyph);
            if entry.slot == today {
                out.push_str(&format!("[{glyph}]"));
            } else {
                out.push_str(&format!(" {glyph} "));
            }
        }
        out.push('\n');
    }
    out
}

/// One-line description of what is shown.
pub fn summary(projection: &GridProjection) -> String {
    match projection.source() {
        Some(source) => format!("{} days logged ({source})", projection.filled_count()),
        None => "no data yet".to_string(),
    }
}

/// Machine-readable outcome of a run.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub attempt: Option<u64>,
    pub handle: Option<String>,
    pub state: Option<String>,
    pub failure: Option<String>,
    pub reconcile: Option<String>,
    pub projection: &'a GridProjection,
}

impl<'a> Report<'a> {
    pub fn new(attempt: Option<&WriteAttempt>, projection: &'a GridProjection) -> Self {
        Self {
            attempt: attempt.map(|a| a.id.value()),
            handle: attempt.and_then(|a| a.handle.as_ref()).map(ToString::to_string),
            state: attempt.map(|a| a.state.to_string()),
            failure: attempt.and_then(|a| a.failure.as_ref()).map(ToString::to_string),
            reconcile: attempt.map(|a| format!("{:?}", a.reconcile)),
            projection,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
