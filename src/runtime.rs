//! Embedded target runtimes
//!
//! Each backend ships a fixed runtime source blob keyed by target tag. The
//! driver copies the blob verbatim into the output directory next to the
//! generated files; nothing in the compiler reads or rewrites its contents.

use crate::options::TargetTag;

/// The runtime source for a target, embedded at build time.
pub fn runtime_source(tag: TargetTag) -> &'static str {
    match tag {
        TargetTag::Java => include_str!("../runtime/Slate.java"),
        TargetTag::CSharp => include_str!("../runtime/Slate.cs"),
        TargetTag::Go => include_str!("../runtime/slate_runtime.go"),
        TargetTag::JavaScript => include_str!("../runtime/slate_runtime.js"),
        TargetTag::Python => include_str!("../runtime/slate_runtime.py"),
        TargetTag::Cpp => include_str!("../runtime/slate_runtime.h"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_target_has_a_runtime() {
        for tag in TargetTag::ALL {
            assert!(
                !runtime_source(tag).is_empty(),
                "missing runtime for {}",
                tag
            );
        }
    }

    #[test]
    fn test_runtime_blobs_are_distinct() {
        let blobs: Vec<&str> = TargetTag::ALL.iter().map(|&t| runtime_source(t)).collect();
        for (i, a) in blobs.iter().enumerate() {
            for b in &blobs[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
