//! Corvid - bytecode finalization for an embedded scripting VM
//!
//! # Overview
//!
//! The code generator of a Corvid compiler emits one [`InstructionList`] per
//! function: raw instructions, symbolic labels and line markers. Before the VM
//! can run it, the list goes through the finalization pipeline:
//!
//! 1. **Analysis**: reachability and stack depth on every path, removal of
//!    dead code
//! 2. **Optimization**: peephole rewriting (optional)
//! 3. **Label resolution**: symbolic jump targets become relative distances
//! 4. **Line extraction**: line markers move into a line table
//! 5. **Encoding**: the list is flattened into 32-bit code units
//!
//! # Quick Start
//!
//! ```
//! use corvid::{FinalizeOptions, InstructionList, finalize};
//! use corvid::bytecode::{Instruction, LabelId};
//!
//! let mut list = InstructionList::new();
//! list.define_temporary(1);
//! list.emit(Instruction::SetVar4 { dst: 1, value: 5 });
//! list.emit(Instruction::CopyVar4 { dst: 2, src: 1 });
//! list.jump(LabelId(0));
//! list.label(LabelId(0));
//! list.ret(0);
//!
//! let code = finalize(&mut list, &FinalizeOptions::default()).unwrap();
//! assert_eq!(code.code.len(), 3); // SetV4 v2, 5; RET 0
//! assert_eq!(code.max_stack_depth, 0);
//! ```

pub use corvid_core::{
    FinalizeError, FinalizeOptions, FinalizedCode, Instruction, InstructionList, bytecode,
    finalize, finalize::Diagnostic,
};
