use crate::bytecode::{Instruction, InstructionList};

/// Moves line markers into the list's line table.
///
/// Markers with `cue` set become `Suspend` checkpoints; the rest are deleted.
/// Returns the number of markers consumed.
pub fn extract_lines(list: &mut InstructionList) -> usize {
    list.line_table_mut().clear();

    let mut position = 0u32;
    let mut markers = 0usize;
    let mut cursor = list.head();
    while let Some(at) = cursor {
        let next = list.next(at);
        let instruction = list[at];
        match instruction {
            Instruction::Line { pos, cue } => {
                markers += 1;
                list.line_table_mut().record(position, pos);
                if cue {
                    list.replace(at, Instruction::Suspend);
                    position += Instruction::Suspend.size();
                } else {
                    list.remove(at);
                }
            }
            _ => position += instruction.size(),
        }
        cursor = next;
    }

    tracing::debug!(
        markers,
        entries = list.line_table().len(),
        "extracted line table"
    );
    markers
}
