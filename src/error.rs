//! Error types for the UDF compiler and its runtime helpers.
//!
//! Compile-time failures are ordinary `Result` values built with thiserror.
//! Runtime helpers called from generated code signal failure by raising a
//! [`RuntimeError`] payload, which unwinds across the `extern "C-unwind"`
//! boundary back to the host's `catch_unwind`.

use thiserror::Error;

use crate::types::DType;

/// Main error type for UDF compilation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("no function named {name} is registered or compiled")]
    UnknownFunction { name: String },

    #[error("func {function} cast arg {index} from {from} to {to} failed")]
    CastNotFeasible {
        function: String,
        index: usize,
        from: DType,
        to: DType,
    },

    #[error("func {name} expects {expected} args, while {given} given")]
    ArityMismatch {
        name: String,
        expected: usize,
        given: usize,
    },

    #[error("function {name} does not match the expected signature")]
    SignatureMismatch { name: String },

    #[error("function not found: {name}")]
    FunctionNotFound { name: String },

    #[error("verify failed for function {name}")]
    Verify { name: String },

    #[error("{message}")]
    Type { message: String },

    #[error("ir build failed: {0}")]
    Builder(#[from] inkwell::builder::BuilderError),

    #[error("llvm error: {message}")]
    Llvm { message: String },

    #[error("null compiled session")]
    NoSession,
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors produced while registering native functions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate func name: {name}")]
    DuplicateName { name: String },

    #[error("func {name} has more than ONE context ptr arg, the first is at {first}, duplicate at {second}")]
    DuplicateContextArg {
        name: String,
        first: usize,
        second: usize,
    },
}

/// Failure payload raised by runtime helpers invoked from generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A helper was asked to mutate a readonly vector.
    Readonly(String),
    /// Parallel buffers passed to a key-value op differ in length.
    SizeMismatch { current: usize, expected: usize },
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::Readonly(msg) => write!(f, "readonly vector: {}", msg),
            RuntimeError::SizeMismatch { current, expected } => {
                write!(f, "vector size mismatch: {} given, {} expected", current, expected)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Raise a runtime failure out of an extern helper.
///
/// The panic payload is the [`RuntimeError`] itself so the host can
/// downcast it after `catch_unwind`.
pub(crate) fn raise(err: RuntimeError) -> ! {
    std::panic::panic_any(err)
}
