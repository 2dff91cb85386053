use crate::{
    ToString, Vec,
    bytecode::{Instruction, InstructionList, OperandShape, RawOperands},
    finalize::FinalizeError,
};

/// Flat code-unit stream produced by [`encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub code: Vec<u32>,
    /// Positions of the `JitEntry` instructions.
    pub jit_entries: Vec<u32>,
}

/// Serializes a fully resolved list.
///
/// Operand layout is chosen from the operand shape alone. Fails on jumps
/// that still name a label and on line markers, which must have been
/// extracted first.
pub fn encode(list: &InstructionList) -> Result<Encoded, FinalizeError> {
    let declared = list.code_size();
    let mut code = Vec::with_capacity(declared as usize);
    let mut jit_entries = Vec::new();

    for (_, instruction) in list.iter() {
        if let Some(label) = instruction.label_target() {
            return Err(FinalizeError::UnresolvedJump(label));
        }
        if let Instruction::JitEntry(_) = instruction {
            jit_entries.push(code.len() as u32);
        }
        encode_instruction(instruction, &mut code)?;
    }

    if code.len() != declared as usize {
        return Err(FinalizeError::SizeMismatch {
            encoded: code.len(),
            declared,
        });
    }

    tracing::debug!(units = code.len(), "encoded instruction stream");
    Ok(Encoded { code, jit_entries })
}

fn encode_instruction(instruction: &Instruction, out: &mut Vec<u32>) -> Result<(), FinalizeError> {
    if let Instruction::Line { .. } = instruction {
        return Err(FinalizeError::UnexpectedMarker(instruction.to_string()));
    }
    let Some(opcode) = instruction.opcode() else {
        // Labels: zero-size, nothing to write.
        return Ok(());
    };

    let RawOperands { words, wide } = instruction.raw_operands();
    let first = opcode as u32 | (words[0] as u32) << 16;
    let low = wide as u32;
    let high = (wide >> 32) as u32;
    let pair = words[1] as u32 | (words[2] as u32) << 16;

    match instruction.shape() {
        OperandShape::Marker => {}
        OperandShape::NoArg
        | OperandShape::Word
        | OperandShape::WriteVar
        | OperandShape::ReadVar => out.push(first),
        OperandShape::Dword
        | OperandShape::ReadVarDword
        | OperandShape::WriteVarDword
        | OperandShape::WordDword => out.extend([first, low]),
        OperandShape::Qword | OperandShape::DwordDword | OperandShape::WriteVarQword => {
            out.extend([first, low, high])
        }
        OperandShape::WriteReadRead
        | OperandShape::WriteRead
        | OperandShape::ReadRead
        | OperandShape::WordReadVar
        | OperandShape::WriteVarWord => out.extend([first, pair]),
        OperandShape::WriteReadDword => out.extend([first, pair, low]),
    }
    Ok(())
}
