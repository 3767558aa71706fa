//! Concrete backends
//!
//! One module per target language. All six share the single driver; the
//! differences live entirely behind the [`Backend`](super::backend::Backend)
//! trait.

pub mod cpp;
pub mod csharp;
pub mod go;
pub mod java;
pub mod js;
pub mod python;

use super::backend::Backend;
use crate::options::TargetTag;

pub use cpp::CppBackend;
pub use csharp::CSharpBackend;
pub use go::GoBackend;
pub use java::JavaBackend;
pub use js::JsBackend;
pub use python::PythonBackend;

/// Instantiate the backend for a target tag.
pub fn backend_for(tag: TargetTag) -> Box<dyn Backend> {
    match tag {
        TargetTag::Java => Box::new(JavaBackend::new()),
        TargetTag::CSharp => Box::new(CSharpBackend::new()),
        TargetTag::Go => Box::new(GoBackend::new()),
        TargetTag::JavaScript => Box::new(JsBackend::new()),
        TargetTag::Python => Box::new(PythonBackend::new()),
        TargetTag::Cpp => Box::new(CppBackend::new()),
    }
}
