use serde::{Deserialize, Serialize};

use crate::{Vec, bytecode::SourcePos};

/// One row of the line table: the source location of the code starting at
/// `position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEntry {
    pub position: u32,
    pub line: u32,
    pub column: u32,
}

/// Code position to source location table, ordered by position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTable {
    entries: Vec<LineEntry>,
}

impl LineTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records `pos` for the code at `position`.
    ///
    /// A record at the same position as the last one replaces it, so the
    /// later marker wins when two markers end up with nothing between them.
    pub fn record(&mut self, position: u32, pos: SourcePos) {
        let entry = LineEntry {
            position,
            line: pos.line,
            column: pos.column,
        };
        match self.entries.last_mut() {
            Some(last) if last.position == position => *last = entry,
            _ => {
                debug_assert!(
                    self.entries.last().is_none_or(|last| last.position < position),
                    "line table positions must not decrease"
                );
                self.entries.push(entry);
            }
        }
    }

    /// Source location of the code at `position`: the last entry at or before it.
    pub fn lookup(&self, position: u32) -> Option<SourcePos> {
        let after = self
            .entries
            .partition_point(|entry| entry.position <= position);
        let entry = self.entries.get(after.checked_sub(1)?)?;
        Some(SourcePos::new(entry.line, entry.column))
    }

    pub fn entries(&self) -> &[LineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
