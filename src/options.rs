//! Compilation options
//!
//! An immutable record of everything the CLI layer decides. The driver and
//! backends receive this by reference; nothing in the core reads options from
//! process-wide state.

use std::fmt;
use std::path::PathBuf;

/// The supported target languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetTag {
    Java,
    CSharp,
    Go,
    JavaScript,
    Python,
    Cpp,
}

impl TargetTag {
    /// All targets, in the order they are listed to users.
    pub const ALL: [TargetTag; 6] = [
        TargetTag::Java,
        TargetTag::CSharp,
        TargetTag::Go,
        TargetTag::JavaScript,
        TargetTag::Python,
        TargetTag::Cpp,
    ];

    /// The tag string used on the command line and in runtime manifests.
    pub fn name(self) -> &'static str {
        match self {
            TargetTag::Java => "java",
            TargetTag::CSharp => "cs",
            TargetTag::Go => "go",
            TargetTag::JavaScript => "js",
            TargetTag::Python => "py",
            TargetTag::Cpp => "cpp",
        }
    }

    /// Parse a command-line tag.
    pub fn parse(s: &str) -> Option<TargetTag> {
        match s {
            "java" => Some(TargetTag::Java),
            "cs" | "csharp" => Some(TargetTag::CSharp),
            "go" => Some(TargetTag::Go),
            "js" | "javascript" => Some(TargetTag::JavaScript),
            "py" | "python" => Some(TargetTag::Python),
            "cpp" | "cxx" => Some(TargetTag::Cpp),
            _ => None,
        }
    }
}

impl fmt::Display for TargetTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How far past source emission a compilation goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CompileLevel {
    /// Verify only; emit nothing.
    None,
    /// Emit target source files.
    Source,
    /// Emit source and invoke the target's native compiler.
    Compile,
    /// Compile and run the resulting program.
    Run,
}

/// Immutable compilation options, fixed for the lifetime of one compilation.
#[derive(Debug, Clone)]
pub struct Options {
    pub target: TargetTag,
    pub level: CompileLevel,
    /// Whether verification ran; the core only records it for diagnostics.
    pub verified: bool,
    /// Entry-point override by fully qualified name (`Module.Class.Method`).
    pub main_override: Option<String>,
    /// Directory the artifact set is written into.
    pub out_dir: PathBuf,
    /// ANSI color in diagnostics.
    pub use_color: bool,
}

impl Options {
    pub fn new(target: TargetTag, out_dir: impl Into<PathBuf>) -> Self {
        Options {
            target,
            level: CompileLevel::Source,
            verified: false,
            main_override: None,
            out_dir: out_dir.into(),
            use_color: false,
        }
    }

    pub fn with_level(mut self, level: CompileLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_main(mut self, fq_name: impl Into<String>) -> Self {
        self.main_override = Some(fq_name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse_roundtrip() {
        for tag in TargetTag::ALL {
            assert_eq!(TargetTag::parse(tag.name()), Some(tag));
        }
    }

    #[test]
    fn test_target_parse_aliases() {
        assert_eq!(TargetTag::parse("csharp"), Some(TargetTag::CSharp));
        assert_eq!(TargetTag::parse("python"), Some(TargetTag::Python));
        assert_eq!(TargetTag::parse("fortran"), None);
    }

    #[test]
    fn test_compile_levels_ordered() {
        assert!(CompileLevel::None < CompileLevel::Source);
        assert!(CompileLevel::Source < CompileLevel::Compile);
        assert!(CompileLevel::Compile < CompileLevel::Run);
    }
}
