//! Finalization errors and diagnostics.

use core::fmt;

use crate::{String, ToString, bytecode::LabelId};

/// Fatal defects in an instruction stream handed to the pipeline.
///
/// Every variant means the code generator produced an invalid program. The
/// pipeline stops at the stage that detects it and produces no output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FinalizeError {
    #[error(
        "stack depth mismatch at `{instruction}`: recorded {recorded}, incoming {incoming}"
    )]
    StackDepthMismatch {
        instruction: String,
        recorded: i32,
        incoming: i32,
    },

    #[error("stack underflow after `{instruction}` (depth {depth})")]
    StackUnderflow { instruction: String, depth: i32 },

    #[error("jump to label {0}, which is not in the instruction list")]
    DanglingLabel(LabelId),

    #[error("relative jump by {offset} does not land on an instruction")]
    JumpOutOfRange { offset: i32 },

    #[error("label {0} is defined more than once")]
    DuplicateLabel(LabelId),

    #[error("computed jump declares {declared} targets but only {available} instructions follow")]
    FanOutExceeded { declared: u32, available: u32 },

    #[error("jump to label {0} reached the encoder unresolved")]
    UnresolvedJump(LabelId),

    #[error("marker `{0}` reached the encoder")]
    UnexpectedMarker(String),

    #[error("encoded {encoded} code units, instructions declare {declared}")]
    SizeMismatch { encoded: usize, declared: u32 },

    #[error("stack slot sp{offset:+} at depth {depth} is outside the frame")]
    FrameSlotOutOfRange { offset: i16, depth: i32 },
}

impl FinalizeError {
    /// Short stable code for documentation lookup.
    pub const fn code(&self) -> &'static str {
        match self {
            FinalizeError::StackDepthMismatch { .. } => "F001",
            FinalizeError::StackUnderflow { .. } => "F002",
            FinalizeError::DanglingLabel(_) => "F003",
            FinalizeError::JumpOutOfRange { .. } => "F004",
            FinalizeError::DuplicateLabel(_) => "F005",
            FinalizeError::FanOutExceeded { .. } => "F006",
            FinalizeError::UnresolvedJump(_) => "F007",
            FinalizeError::UnexpectedMarker(_) => "F008",
            FinalizeError::SizeMismatch { .. } => "F009",
            FinalizeError::FrameSlotOutOfRange { .. } => "F010",
        }
    }

    /// Convert to a Diagnostic for reporting alongside advisory findings.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            message: self.to_string(),
            code: Some(self.code()),
        }
    }
}

/// A finding reported by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Optional code (e.g., "F001") for documentation lookup.
    pub code: Option<&'static str>,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            code: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{}[{}]: {}", self.severity, code, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}
