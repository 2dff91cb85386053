//! Emission helpers for the code generator feeding the pipeline.
//!
//! These mirror the shapes the generator produces most often, and add the
//! companion instructions the pipeline expects (a `JitEntry` after every call
//! and every line marker).

use crate::bytecode::{
    CallKind, Condition, InstrRef, Instruction, InstructionList, JumpTarget, LabelId, SourcePos,
    Var,
};

impl InstructionList {
    pub fn emit(&mut self, instruction: Instruction) -> InstrRef {
        self.push_back(instruction)
    }

    pub fn label(&mut self, label: LabelId) -> InstrRef {
        self.push_back(Instruction::Label(label))
    }

    pub fn jump(&mut self, label: LabelId) -> InstrRef {
        self.push_back(Instruction::Jump(JumpTarget::Label(label)))
    }

    pub fn branch(&mut self, cond: Condition, label: LabelId) -> InstrRef {
        self.push_back(Instruction::Branch {
            cond,
            target: JumpTarget::Label(label),
        })
    }

    /// Emits a computed jump. The `fan_out` instructions emitted next form
    /// its jump table.
    pub fn jump_ptr(&mut self, var: Var, fan_out: u32) -> InstrRef {
        self.push_back(Instruction::JumpPtr { var, fan_out })
    }

    /// Emits a call followed by its re-entry point.
    pub fn call(&mut self, kind: CallKind, func: u32, pop: u16) -> InstrRef {
        let call = self.push_back(Instruction::Call { kind, func, pop });
        self.push_back(Instruction::JitEntry(0));
        call
    }

    /// Emits a line marker followed by its re-entry point.
    ///
    /// Whether the marker becomes a runtime checkpoint is decided by the
    /// finalize options, not here.
    pub fn line(&mut self, line: u32, column: u32) -> InstrRef {
        let marker = self.push_back(Instruction::Line {
            pos: SourcePos::new(line, column),
            cue: true,
        });
        self.push_back(Instruction::JitEntry(0));
        marker
    }

    pub fn ret(&mut self, pop: u16) -> InstrRef {
        self.push_back(Instruction::Ret(pop))
    }

    /// Reserves `units` on the stack.
    pub fn push(&mut self, units: u16) -> InstrRef {
        self.push_back(Instruction::Push(units))
    }

    pub fn pop(&mut self, units: u16) -> InstrRef {
        self.push_back(Instruction::Pop(units))
    }
}
