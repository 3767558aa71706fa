//! Code generation
//!
//! The target-language-independent lowering pipeline and its pluggable
//! backends. The driver walks the resolved IR in a fixed order and issues
//! structured write operations against a [`backend::Backend`]; the emission
//! substrate in [`writer`] buffers everything until the whole program is
//! lowered, then flushes atomically.

pub mod backend;
pub mod backends;
pub mod driver;
pub mod ghost;
pub mod numeric;
pub mod writer;

use std::fmt;

use thiserror::Error;

use crate::options::TargetTag;
use crate::rir::Tok;

/// Errors raised while lowering.
///
/// `Unsupported` is non-fatal per declaration: the driver records it and
/// continues with the next declaration. The other kinds abort the
/// compilation immediately.
#[derive(Error, Debug)]
pub enum LowerError {
    #[error("the {target} target does not support {construct} (at {tok})")]
    Unsupported {
        construct: String,
        tok: Tok,
        target: TargetTag,
    },
    #[error("internal error in {stage}: {detail}")]
    Internal { stage: &'static str, detail: String },
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{tool} exited with status {status}:\n{stderr}")]
    Tool {
        tool: String,
        status: i32,
        stderr: String,
    },
}

impl LowerError {
    pub fn unsupported(construct: impl Into<String>, tok: Tok, target: TargetTag) -> Self {
        LowerError::Unsupported {
            construct: construct.into(),
            tok,
            target,
        }
    }

    pub fn internal(stage: &'static str, detail: impl Into<String>) -> Self {
        LowerError::Internal {
            stage,
            detail: detail.into(),
        }
    }

    /// Fatal errors break out of the driver immediately.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LowerError::Unsupported { .. })
    }
}

/// Accumulates non-fatal errors so one run reports as many problems as
/// possible.
#[derive(Debug, Default)]
pub struct ErrorSink {
    errors: Vec<LowerError>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: LowerError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn into_errors(self) -> Vec<LowerError> {
        self.errors
    }
}

/// The terminal failure of a compilation: every accumulated error.
#[derive(Debug)]
pub struct CompileFailure {
    pub errors: Vec<LowerError>,
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileFailure {}

impl From<LowerError> for CompileFailure {
    fn from(err: LowerError) -> Self {
        CompileFailure { errors: vec![err] }
    }
}
