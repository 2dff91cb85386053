//! Label resolution: symbolic jump targets become relative code-unit distances.

use hashbrown::HashMap;

use crate::{
    Vec,
    bytecode::{InstrRef, Instruction, InstructionList, JumpTarget, LabelId},
    finalize::FinalizeError,
};

/// Maps every label id to its marker, rejecting ids defined twice.
pub(crate) fn label_index(
    list: &InstructionList,
) -> Result<HashMap<LabelId, InstrRef>, FinalizeError> {
    let mut labels = HashMap::new();
    for (at, instruction) in list.iter() {
        if let Instruction::Label(label) = *instruction {
            if labels.insert(label, at).is_some() {
                return Err(FinalizeError::DuplicateLabel(label));
            }
        }
    }
    Ok(labels)
}

/// Code position of every instruction, in list order.
pub(crate) fn positions(list: &InstructionList) -> HashMap<InstrRef, u32> {
    let mut positions = HashMap::with_capacity(list.len());
    let mut position = 0u32;
    for (at, instruction) in list.iter() {
        positions.insert(at, position);
        position += instruction.size();
    }
    positions
}

/// Rewrites every jump still aimed at a label into a relative jump.
///
/// The stored distance is measured from the end of the jump to the marker.
/// Markers are zero-size, so the marker's position is that of the first
/// real instruction after it. Returns the number of jumps resolved.
pub fn resolve_labels(list: &mut InstructionList) -> Result<usize, FinalizeError> {
    let labels = label_index(list)?;
    let positions = positions(list);

    let mut resolved: Vec<(InstrRef, Instruction)> = Vec::new();
    for (at, jump) in list.iter() {
        let Some(label) = jump.label_target() else {
            continue;
        };
        let marker = labels
            .get(&label)
            .ok_or(FinalizeError::DanglingLabel(label))?;
        let after_jump = positions[&at] + jump.size();
        let delta = positions[marker] as i64 - after_jump as i64;
        if let Some(jump) = jump.with_target(JumpTarget::Offset(delta as i32)) {
            resolved.push((at, jump));
        }
    }

    // Nothing is rewritten unless every label resolved.
    for &(at, jump) in &resolved {
        list.replace(at, jump);
    }

    tracing::debug!(resolved = resolved.len(), "resolved jump labels");
    Ok(resolved.len())
}
