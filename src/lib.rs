//! Slate - a specification-oriented language with multi-target code generation
//!
//! This crate is the compilation core: it consumes a resolved, type-annotated
//! intermediate representation (produced by the external resolver) and lowers
//! it to source code in one of six target languages.

pub mod codegen;
pub mod diagnostics;
pub mod options;
pub mod rir;
pub mod runtime;
pub mod test_support;

pub use codegen::driver::{compile_program, Artifacts};
pub use codegen::{CompileFailure, LowerError};
pub use options::{CompileLevel, Options, TargetTag};
pub use rir::Program;
