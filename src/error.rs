//! Error types shared by every pass in the pipeline.
//!
//! Every pass returns a [`CodegenResult`]; the driver (`crate::driver`) is
//! the only place that catches a [`CodegenError`] instead of propagating it,
//! so that one handler's failure does not abort compilation of the rest of
//! the unit (spec §7).

use crate::app::CompiledHandler;
use crate::ir::HandlerTag;
use thiserror::Error;

/// A fatal error raised by a single compiler pass.
///
/// All variants here are the "fatal" failure modes of spec §4.11 / §7:
/// they abort the *current function's* compilation. Warnings (disabled
/// optimization flag, unsupported coprocessor op, long-branch fallback,
/// page-protection failure) are logged, not returned as errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    /// The front end produced a function whose entry block has non-empty
    /// live-in: some local is read before any definition reaches it.
    #[error("undefined local variables: {0:?}")]
    UndefinedLocals(Vec<String>),

    /// Instruction selection found no rule in the BURG table that reduces
    /// a MIR node to the required non-terminal.
    #[error("rule not found for opcode {opcode} at nonterminal {nonterm}")]
    RuleNotFound {
        /// Debug name of the offending opcode.
        opcode: String,
        /// Non-terminal the matcher was trying to reduce to.
        nonterm: String,
    },

    /// The labelling pass has no computed state for the requested
    /// non-terminal at the tree root.
    #[error("nterm not found: {0}")]
    NtermNotFound(String),

    /// A rule's `kids` function returned the wrong number of children.
    #[error("arity mismatch: rule {rule} expected {expected} kids, got {actual}")]
    Arity {
        /// Name of the rule whose kids arity did not match.
        rule: String,
        /// Expected kid count.
        expected: usize,
        /// Actual kid count produced.
        actual: usize,
    },

    /// The graph-coloring allocator could not find a coloring even after
    /// exhausting the spill heuristic (e.g. more register-pressure than
    /// spill slots can relieve within one pass).
    #[error("register allocation is infeasible for this function")]
    RegallocInfeasible,

    /// Allocating the page(s) backing the executable buffer failed.
    #[error("failed to allocate executable code buffer: {0}")]
    BufferAlloc(String),

    /// The input bytecode's section table or entry offsets are
    /// self-inconsistent.
    #[error("corrupted input bytecode: {0}")]
    CorruptedBytecode(String),

    /// An internal invariant was violated; this indicates a compiler bug
    /// rather than bad input, but unlike a Rust panic it is recoverable at
    /// the per-function boundary.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

/// Result type returned by every pass.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// One handler's compile failure, with enough context for the driver to
/// report it without aborting the rest of the unit (spec §7).
#[derive(Debug, Clone)]
pub struct FunctionError {
    /// Name of the handler (PE name + handler kind) that failed.
    pub function_name: String,
    /// Handler tag, if the failing pass could still associate one.
    pub handler: Option<HandlerTag>,
    /// The underlying error.
    pub error: CodegenError,
    /// Bytecode source line, if the line map had an entry for the
    /// offending instruction.
    pub source_line: Option<u32>,
}

impl std::fmt::Display for FunctionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.function_name, self.error)?;
        if let Some(line) = self.source_line {
            write!(f, " (bytecode line {})", line)?;
        }
        Ok(())
    }
}

/// Aggregated result of compiling a whole unit: per-function errors never
/// affect other functions (spec §7). Empty `failures` means every handler
/// in the unit was installed.
#[derive(Default)]
pub struct CompileReport {
    /// Handlers that compiled and were installed into the runtime's
    /// connection table.
    pub installed: Vec<String>,
    /// Handlers that failed, with full context.
    pub failures: Vec<FunctionError>,
    /// The merged function's compiled result when the unit was compiled
    /// in inline mode (spec §4.10); `None` in per-PE mode, where each
    /// handler's result is instead stored on its own `Handler::compiled`.
    pub inline: Option<CompiledHandler>,
}

impl CompileReport {
    /// True if every handler in the unit compiled successfully.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}
