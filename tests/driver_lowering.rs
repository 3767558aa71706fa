//! Driver lowering tests
//!
//! Lower the canonical programs against every backend and check the emitted
//! text for the structural guarantees the driver makes: datatype surface
//! (create_/is_/dtor_), entry points, tail-call loops, and deterministic
//! output.

use slate::test_support::{
    bitvector_rotation_program, co_stream_program, compile_to_files, compile_to_text,
    list_sum_program, subset_witness_program, tail_recursive_program,
};
use slate::TargetTag;

#[test]
fn test_list_sum_lowers_on_every_target() {
    let program = list_sum_program();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag)
            .unwrap_or_else(|e| panic!("{} failed: {}", tag, e));
        assert!(text.contains("Sum"), "{}: missing Sum", tag);
        assert!(text.contains("create_Cons"), "{}: missing create_Cons", tag);
        assert!(text.contains("create_Nil"), "{}: missing create_Nil", tag);
        assert!(text.contains("is_Cons"), "{}: missing is_Cons", tag);
    }
}

#[test]
fn test_datatype_destructors_dispatch_by_name() {
    let program = list_sum_program();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        let dtor = match tag {
            TargetTag::Go => "Dtor_head",
            _ => "dtor_head",
        };
        assert!(text.contains(dtor), "{}: missing destructor {}", tag, dtor);
    }
}

#[test]
fn test_entry_point_artifact_per_target() {
    let program = list_sum_program();
    let expected = [
        (TargetTag::Java, "Main.java"),
        (TargetTag::CSharp, "Program.cs"),
        (TargetTag::Go, "main.go"),
        (TargetTag::JavaScript, "program.js"),
        (TargetTag::Python, "program.py"),
        (TargetTag::Cpp, "program.cpp"),
    ];
    for (tag, file) in expected {
        let files = compile_to_files(&program, tag).unwrap();
        assert!(
            files.iter().any(|f| f.path.ends_with(file)),
            "{}: missing entry file {}",
            tag,
            file
        );
    }
}

#[test]
fn test_no_main_program_still_emits() {
    use slate::test_support::ProgramBuilder;
    let program = ProgramBuilder::new().finish();
    for tag in TargetTag::ALL {
        let files = compile_to_files(&program, tag).unwrap();
        // The module file plus the runtime blob, and no entry artifact.
        assert!(files.len() >= 2, "{}: expected module + runtime", tag);
        assert!(
            !files.iter().any(|f| {
                let name = f.path.to_string_lossy();
                name.contains("Main.") || name.contains("program.")
            }),
            "{}: unexpected entry artifact",
            tag
        );
    }
}

#[test]
fn test_empty_module_emits_valid_empty_file() {
    use slate::rir::{ClassDecl, DeclKind};
    use slate::test_support::ProgramBuilder;
    let mut b = ProgramBuilder::new();
    let m = b.add_module("Empty", Vec::new());
    // A module whose only declaration is an empty default class.
    b.add_decl(
        m,
        "_default",
        DeclKind::Class(ClassDecl {
            members: Vec::new(),
            traits: Vec::new(),
            is_default_class: true,
            ghost: false,
        }),
    );
    let program = b.finish();
    for tag in TargetTag::ALL {
        let files = compile_to_files(&program, tag).unwrap();
        assert!(
            files.iter().any(|f| f.path.to_string_lossy().contains("Empty")),
            "{}: empty module produced no file",
            tag
        );
    }
}

#[test]
fn test_tail_recursion_becomes_a_loop() {
    let program = tail_recursive_program();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        let jump = match tag {
            TargetTag::Java => "continue TAIL_CALL_START;",
            TargetTag::CSharp => "goto TAIL_CALL_START;",
            TargetTag::Go => "continue TAIL_CALL_START",
            TargetTag::JavaScript => "continue TAIL_CALL_START;",
            // No labels: the sentinel loop jumps with a bare continue.
            TargetTag::Python => "continue",
            TargetTag::Cpp => "goto TAIL_CALL_START;",
        };
        assert!(text.contains(jump), "{}: missing tail jump {}", tag, jump);
        // Arguments are staged through temporaries before the jump.
        assert!(text.contains("_tc0"), "{}: missing staging temp", tag);
    }
}

#[test]
fn test_co_datatype_thunks_constructor_arguments() {
    let program = co_stream_program();
    let lazy_marker = [
        (TargetTag::Java, "Slate.lazy(() ->"),
        (TargetTag::CSharp, "new Slate.Lazy(() =>"),
        (TargetTag::Go, "SlateLazyOf(func() any"),
        (TargetTag::JavaScript, "_slate.lazy(() =>"),
        (TargetTag::Python, "_slate.Lazy(lambda:"),
        (TargetTag::Cpp, "slate::Lazy("),
    ];
    for (tag, marker) in lazy_marker {
        let text = compile_to_text(&program, tag).unwrap();
        assert!(text.contains(marker), "{}: missing thunk {}", tag, marker);
    }
}

#[test]
fn test_subset_type_witness_becomes_default() {
    let program = subset_witness_program();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        assert!(text.contains("Even"), "{}: missing subset alias", tag);
    }
}

#[test]
fn test_bitvector_rotation_masks_each_shift() {
    let program = bitvector_rotation_program();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        assert!(
            text.contains("ff") || text.contains("0xff"),
            "{}: rotation lost its 0xff mask",
            tag
        );
        assert!(text.contains("<<"), "{}: rotation lost its shifts", tag);
        assert!(text.contains(">>"), "{}: rotation lost its shifts", tag);
    }
}

#[test]
fn test_output_is_idempotent() {
    let program = list_sum_program();
    for tag in TargetTag::ALL {
        let first = compile_to_files(&program, tag).unwrap();
        let second = compile_to_files(&program, tag).unwrap();
        assert_eq!(first, second, "{}: repeated lowering differs", tag);
    }
}

#[test]
fn test_runtime_blob_ships_with_every_artifact_set() {
    let program = list_sum_program();
    let runtime_files = [
        (TargetTag::Java, "Slate.java"),
        (TargetTag::CSharp, "Slate.cs"),
        (TargetTag::Go, "slate_runtime.go"),
        (TargetTag::JavaScript, "slate_runtime.js"),
        (TargetTag::Python, "slate_runtime.py"),
        (TargetTag::Cpp, "slate_runtime.h"),
    ];
    for (tag, file) in runtime_files {
        let files = compile_to_files(&program, tag).unwrap();
        assert!(
            files.iter().any(|f| f.path.ends_with(file)),
            "{}: runtime {} not copied",
            tag,
            file
        );
    }
}
