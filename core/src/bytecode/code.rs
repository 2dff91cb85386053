use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    Vec,
    bytecode::LineTable,
    finalize::Diagnostic,
};

/// Output of the finalization pipeline for one function.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedCode {
    /// Encoded instruction stream.
    pub code: Vec<u32>,
    /// Frame size the VM must reserve for the operand stack, in code units.
    pub max_stack_depth: u32,
    pub line_table: LineTable,
    /// Code positions of the `JitEntry` re-entry points.
    pub jit_entries: Vec<u32>,
    /// Advisory findings. Not part of the serialized artifact.
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,
}

impl FinalizedCode {
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

impl fmt::Debug for FinalizedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FinalizedCode {{")?;
        writeln!(f, "  max_stack_depth: {}", self.max_stack_depth)?;
        writeln!(f, "  jit_entries: {:?}", self.jit_entries)?;

        if self.line_table.is_empty() {
            writeln!(f, "  line_table: []")?;
        } else {
            writeln!(f, "  line_table: [")?;
            for entry in self.line_table.entries() {
                writeln!(
                    f,
                    "    {:4} => {}:{}",
                    entry.position, entry.line, entry.column
                )?;
            }
            writeln!(f, "  ]")?;
        }

        writeln!(f, "  code:")?;
        for (position, unit) in self.code.iter().enumerate() {
            let marker = if self.jit_entries.contains(&(position as u32)) {
                "*"
            } else {
                " "
            };
            writeln!(f, "    {:4}{} {:08x}", position, marker, unit)?;
        }

        write!(f, "}}")
    }
}
