//! Resolved-IR interchange tests
//!
//! The resolver hands the RIR across a process boundary as JSON; a
//! serialize/deserialize round trip must not change what the core emits.

use slate::test_support::{compile_to_files, list_sum_program, reserved_names_program};
use slate::{Program, TargetTag};

#[test]
fn test_json_roundtrip_preserves_output() {
    for program in [list_sum_program(), reserved_names_program()] {
        let json = serde_json::to_string(&program).unwrap();
        let reloaded: Program = serde_json::from_str(&json).unwrap();
        for tag in TargetTag::ALL {
            let before = compile_to_files(&program, tag).unwrap();
            let after = compile_to_files(&reloaded, tag).unwrap();
            assert_eq!(before, after, "{}: roundtrip changed output", tag);
        }
    }
}

#[test]
fn test_module_order_survives_roundtrip() {
    let program = list_sum_program();
    let json = serde_json::to_string(&program).unwrap();
    let reloaded: Program = serde_json::from_str(&json).unwrap();
    assert_eq!(
        program.module_order().unwrap(),
        reloaded.module_order().unwrap()
    );
}
