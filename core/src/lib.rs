#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

//! Bytecode finalization for the Corvid VM.
//!
//! The code generator emits an [`bytecode::InstructionList`] per function;
//! [`finalize::finalize`] verifies, optimizes, resolves and encodes it.

extern crate alloc;

// Re-export for convenience so other modules don't need alloc:: prefix
#[allow(unused_imports)]
pub(crate) use alloc::{boxed::Box, format, string::String, string::ToString, vec, vec::Vec};

pub mod bytecode;
pub mod finalize;

pub use bytecode::{FinalizedCode, Instruction, InstructionList};
pub use finalize::{FinalizeError, FinalizeOptions, finalize};
