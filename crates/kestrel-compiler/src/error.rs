//! Compilation errors

use crate::driver::{ConfigError, JointCompileError};
use kestrel_bytecode::VerifyError;
use std::path::PathBuf;
use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    /// Emitter invariant violated; a defect, never a user error
    #[error("Internal compiler error: {message}")]
    Internal { message: String },

    #[error("Bytecode verification failed: {0}")]
    Verification(#[from] VerifyError),

    #[error("Too many local variables (max 65535)")]
    TooManyLocals,

    #[error("Operand stack too deep (max 65535)")]
    StackTooDeep,

    #[error("Too many arguments at call site (max 65535)")]
    TooManyArguments,

    #[error("Jump offset too large")]
    JumpTooLarge,

    #[error("Break statement outside of a loop")]
    InvalidBreak,

    #[error("Continue statement outside of a loop")]
    InvalidContinue,

    #[error(transparent)]
    Joint(#[from] JointCompileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal {
            message: message.into(),
        }
    }

    /// Whether the error points at a compiler defect rather than bad input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CompileError::Internal { .. } | CompileError::Verification(_)
        )
    }
}
