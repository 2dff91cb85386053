//! Instruction model consumed and produced by the finalization pipeline.
//!
//! ## Design
//!
//! - Instructions are a closed enum; size and stack effect are derived
//! - The list is an arena with index links and generation-checked handles
//! - Rewrites replace an instruction as a whole, never field by field
//! - The finalized artifact is plain data and serializes with postcard

mod code;
mod emit;
mod instruction;
mod line_table;
mod list;


pub use code::FinalizedCode;
pub use instruction::{
    ArithOp, CallKind, CmpKind, Condition, GlobalId, ImmCmpKind, ImmOp, Instruction, JumpTarget,
    LabelId, Opcode, OperandShape, PTR_SIZE, RawOperands, SourcePos, UnaryOp, Var, VarAccess,
};
pub use line_table::{LineEntry, LineTable};
pub use list::{InstrRef, InstructionList, Iter, Listing};
