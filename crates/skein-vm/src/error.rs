use skein_core::InvalidOpcode;
use thiserror::Error;

/// Runtime error during dialogue execution.
///
/// Every variant is fatal: the machine aborts the current run, ends in the
/// stopped phase, and does not deliver `dialogue_complete`.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RuntimeError {
    /// Pop or peek on an empty stack.
    #[error("stack underflow")]
    StackUnderflow,

    /// Exceeded the configured maximum stack depth.
    #[error("stack overflow")]
    StackOverflow,

    /// An operand or stack value did not have the type an opcode requires.
    #[error("{context}: expected {expected}, got {got}")]
    TypeMismatch {
        context: &'static str,
        expected: &'static str,
        got: String,
    },

    #[error("unknown label {0:?}")]
    UnknownLabel(String),

    #[error("unknown node {0:?}")]
    UnknownNode(String),

    #[error("no string in string table for id {0:?}")]
    UnknownString(String),

    #[error("no variable named {0:?}")]
    UnknownVariable(String),

    #[error("unknown function {0:?}")]
    UnknownFunction(String),

    /// A loader-provided raw opcode named no operation.
    #[error(transparent)]
    InvalidOpcode(#[from] InvalidOpcode),

    /// The machine was driven into a state the program cannot express
    /// (pc outside the node, `ShowOptions` with nothing to show).
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Stepped or resumed while not waiting on an option selection.
    #[error("not waiting for an option selection")]
    NotReady,

    /// Option selection index outside the pending option list.
    #[error("selected option {index} out of range [0, {len})")]
    OutOfRange { index: usize, len: usize },

    /// A handler callback reported failure.
    #[error("handler: {0}")]
    Handler(String),

    /// A host function reported failure.
    #[error("library: {0}")]
    Library(String),
}
