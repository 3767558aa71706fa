//! Ghost erasure tests
//!
//! Nothing declared ghost in the resolved IR may appear as an emitted
//! symbol, on any target: no storage, no parameters, no calls.

use slate::rir::{
    CallRhs, ConstDecl, DeclId, Formal, Member, MemberKind, MethodDecl, Stmt, StmtKind, Type,
};
use slate::test_support::{
    compile_to_text, ghost_record_program, print_stmt, static_method, ProgramBuilder,
};
use slate::rir::Expr;
use slate::TargetTag;

#[test]
fn test_ghost_datatype_field_has_no_storage() {
    let program = ghost_record_program();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        assert!(
            !text.contains("spirit"),
            "{}: ghost field leaked into output",
            tag
        );
        assert!(text.contains("dtor_x") || text.contains("Dtor_x"));
    }
}

#[test]
fn test_ghost_member_is_dropped() {
    let mut b = ProgramBuilder::new();
    let mut lemma_like = static_method(
        "OnlyForProofs",
        Vec::new(),
        Vec::new(),
        vec![print_stmt(vec![Expr::int(1)])],
    );
    lemma_like.ghost = true;
    b.add_member(b.default_class(), lemma_like);
    b.add_member(
        b.default_class(),
        static_method("Main", Vec::new(), Vec::new(), Vec::new()),
    );
    let program = b.finish();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        assert!(
            !text.contains("OnlyForProofs"),
            "{}: ghost member leaked",
            tag
        );
    }
}

#[test]
fn test_lemma_is_dropped_and_invocation_is_a_noop() {
    let mut b = ProgramBuilder::new();
    let lemma = Member {
        name: "SumsAgree".to_string(),
        tok: Default::default(),
        ghost: false,
        is_static: true,
        type_params: Vec::new(),
        kind: MemberKind::Lemma(MethodDecl {
            ins: Vec::new(),
            outs: Vec::new(),
            body: Some(Vec::new()),
            is_tail_recursive: false,
        }),
    };
    b.add_member(b.default_class(), lemma);
    b.add_member(
        b.default_class(),
        static_method(
            "Main",
            Vec::new(),
            Vec::new(),
            vec![Stmt::new(StmtKind::Call(CallRhs {
                decl: DeclId(0),
                member: "SumsAgree".to_string(),
                receiver: None,
                type_args: Vec::new(),
                args: Vec::new(),
            }))],
        ),
    );
    let program = b.finish();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        assert!(!text.contains("SumsAgree"), "{}: lemma leaked", tag);
    }
}

#[test]
fn test_ghost_formal_erased_from_method_signature() {
    let mut b = ProgramBuilder::new();
    b.add_member(
        b.default_class(),
        static_method(
            "WithGhost",
            vec![
                Formal::new("visible", Type::Int),
                Formal::ghost("phantom", Type::Int),
            ],
            Vec::new(),
            vec![print_stmt(vec![Expr::var("visible", Type::Int)])],
        ),
    );
    let program = b.finish();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        assert!(!text.contains("phantom"), "{}: ghost formal leaked", tag);
        assert!(text.contains("visible"), "{}: real formal missing", tag);
    }
}

#[test]
fn test_method_with_only_ghost_outs_is_elided() {
    let mut b = ProgramBuilder::new();
    b.add_member(
        b.default_class(),
        static_method(
            "ProofOnly",
            Vec::new(),
            vec![Formal::ghost("witness", Type::Int)],
            Vec::new(),
        ),
    );
    let program = b.finish();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        assert!(!text.contains("ProofOnly"), "{}: elided method leaked", tag);
    }
}

#[test]
fn test_assertions_compile_to_nothing() {
    let mut b = ProgramBuilder::new();
    b.add_member(
        b.default_class(),
        static_method(
            "Main",
            Vec::new(),
            Vec::new(),
            vec![
                Stmt::new(StmtKind::Assert {
                    expr: Expr::var("no_such_symbol_anywhere", Type::Bool),
                }),
                print_stmt(vec![Expr::int(7)]),
            ],
        ),
    );
    let program = b.finish();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        assert!(
            !text.contains("no_such_symbol_anywhere"),
            "{}: assertion survived",
            tag
        );
    }
}

#[test]
fn test_ghost_const_rhs_erased_to_default() {
    let mut b = ProgramBuilder::new();
    let ghost_const = Member {
        name: "Budget".to_string(),
        tok: Default::default(),
        ghost: false,
        is_static: true,
        type_params: Vec::new(),
        kind: MemberKind::Const(ConstDecl {
            ty: Type::Int,
            rhs: Some(Expr::var("ghost_state_reference", Type::Int)),
            rhs_is_ghost: true,
        }),
    };
    b.add_member(b.default_class(), ghost_const);
    let program = b.finish();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        assert!(
            !text.contains("ghost_state_reference"),
            "{}: ghost RHS leaked",
            tag
        );
        assert!(text.contains("Budget"), "{}: constant itself missing", tag);
    }
}

#[test]
fn test_ghost_match_scrutinee_collapses_to_taken_arm() {
    use slate::rir::{ExprKind, MatchArm};
    let mut b = ProgramBuilder::new();
    let list = {
        use slate::rir::{Ctor, DatatypeDecl, DeclKind, Tok};
        b.add_decl(
            b.default_module(),
            "Opt",
            DeclKind::Datatype(DatatypeDecl {
                ctors: vec![
                    Ctor {
                        name: "None_".to_string(),
                        tok: Tok::default(),
                        formals: Vec::new(),
                    },
                    Ctor {
                        name: "Some_".to_string(),
                        tok: Tok::default(),
                        formals: vec![Formal::new("value", Type::Int)],
                    },
                ],
                co: false,
                default_ctor: 0,
                members: Vec::new(),
            }),
        )
    };
    let matched = Expr::new(
        ExprKind::Match {
            scrutinee: Box::new(Expr::var("ghostly", Type::user(list))),
            arms: vec![
                MatchArm {
                    ctor: 0,
                    binders: Vec::new(),
                    body: Box::new(Expr::int(1)),
                },
                MatchArm {
                    ctor: 1,
                    binders: Vec::new(),
                    body: Box::new(Expr::int(2)),
                },
            ],
            taken_arm: Some(0),
        },
        Type::Int,
    );
    b.add_member(
        b.default_class(),
        static_method("Main", Vec::new(), Vec::new(), vec![print_stmt(vec![matched])]),
    );
    let program = b.finish();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        assert!(
            !text.contains("ghostly"),
            "{}: ghost scrutinee survived",
            tag
        );
    }
}

#[test]
fn test_ghost_function_parameter_filled_with_default_at_call_site() {
    use slate::rir::FunctionDecl;
    use slate::test_support::fn_call;
    let mut b = ProgramBuilder::new();
    let func = Member {
        name: "Measure".to_string(),
        tok: Default::default(),
        ghost: false,
        is_static: true,
        type_params: Vec::new(),
        kind: MemberKind::Function(FunctionDecl {
            formals: vec![
                Formal::new("x", Type::Int),
                Formal::ghost("fuel", Type::Int),
            ],
            result: Type::Int,
            body: Some(Expr::var("x", Type::Int)),
            is_tail_recursive: false,
        }),
    };
    b.add_member(b.default_class(), func);
    b.add_member(
        b.default_class(),
        static_method(
            "Main",
            Vec::new(),
            Vec::new(),
            vec![print_stmt(vec![fn_call(
                DeclId(0),
                "Measure",
                vec![
                    Expr::int(5),
                    Expr::var("ghost_fuel_expression", Type::Int),
                ],
                Type::Int,
            )])],
        ),
    );
    let program = b.finish();
    for tag in TargetTag::ALL {
        let text = compile_to_text(&program, tag).unwrap();
        // The ghost argument expression is replaced by the type's default.
        assert!(
            !text.contains("ghost_fuel_expression"),
            "{}: ghost argument evaluated",
            tag
        );
        assert!(text.contains("Measure"), "{}: function call missing", tag);
    }
}
