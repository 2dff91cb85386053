//! Finalization pipeline: turns the generator's raw instruction list into
//! the encoded stream the VM runs.
//!
//! ## Design
//!
//! - Stages run in a fixed order on one mutable list:
//!   analyze, optimize, resolve labels, extract lines, encode
//! - Every stage returns `Result` and stops at the first fatal defect
//! - Only the encoder produces output; earlier failures leave nothing behind
//! - Stages are public on their own for tooling and tests

mod analyzer;
mod encoder;
mod error;
mod labels;
mod lines;
mod liveness;
mod options;
mod peephole;

#[cfg(test)]
mod analyzer_test;
#[cfg(test)]
mod labels_test;

pub use analyzer::{Analysis, analyze};
pub use encoder::{Encoded, encode};
pub use error::{Diagnostic, FinalizeError, Severity};
pub use labels::resolve_labels;
pub use lines::extract_lines;
pub use liveness::{is_temp_reg_used, is_temp_var_read};
pub use options::FinalizeOptions;
pub use peephole::optimize;

use crate::bytecode::{FinalizedCode, Instruction, InstructionList};

/// Runs the whole pipeline over one function body.
///
/// On success the list is left in its encoded form (resolved jumps, no line
/// markers) and the returned artifact holds everything the VM needs.
pub fn finalize(
    list: &mut InstructionList,
    options: &FinalizeOptions,
) -> Result<FinalizedCode, FinalizeError> {
    apply_line_cues(list, options.line_cues);

    let analysis = analyze(list)?;
    if options.optimize {
        optimize(list, options)?;
    }
    if !options.include_jit_entries {
        strip_jit_entries(list);
    }
    resolve_labels(list)?;
    extract_lines(list);
    let encoded = encode(list)?;

    Ok(FinalizedCode {
        code: encoded.code,
        max_stack_depth: analysis.max_stack_depth,
        line_table: list.line_table().clone(),
        jit_entries: encoded.jit_entries,
        diagnostics: analysis.diagnostics,
    })
}

/// Sets whether line markers turn into checkpoints. Their size depends on it,
/// so this has to happen before anything measures code positions.
fn apply_line_cues(list: &mut InstructionList, line_cues: bool) {
    let mut cursor = list.head();
    while let Some(at) = cursor {
        let instruction = list[at];
        if let Instruction::Line { pos, cue } = instruction {
            if cue != line_cues {
                list.replace(at, Instruction::Line { pos, cue: line_cues });
            }
        }
        cursor = list.next(at);
    }
}

fn strip_jit_entries(list: &mut InstructionList) {
    let mut cursor = list.head();
    while let Some(at) = cursor {
        let next = list.next(at);
        if matches!(list[at], Instruction::JitEntry(_)) {
            list.remove(at);
        }
        cursor = next;
    }
}
