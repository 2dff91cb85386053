//! Configuration options for the finalization pipeline.

/// Build-wide switches controlling the finalization pipeline.
///
/// # Example
///
/// ```
/// use corvid_core::finalize::FinalizeOptions;
///
/// let options = FinalizeOptions::default().with_optimize(false);
/// assert!(options.line_cues);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeOptions {
    /// Run the peephole rewriter.
    ///
    /// Default: true
    pub optimize: bool,

    /// Turn line markers into runtime checkpoints (`Suspend`) instead of
    /// dropping them. Needed for debuggers and line callbacks.
    ///
    /// Default: true
    pub line_cues: bool,

    /// Keep `JitEntry` re-entry points in the encoded stream.
    ///
    /// Default: false
    pub include_jit_entries: bool,
}

impl Default for FinalizeOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            line_cues: true,
            include_jit_entries: false,
        }
    }
}

impl FinalizeOptions {
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_line_cues(mut self, line_cues: bool) -> Self {
        self.line_cues = line_cues;
        self
    }

    pub fn with_jit_entries(mut self, include: bool) -> Self {
        self.include_jit_entries = include;
        self
    }
}
