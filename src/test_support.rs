//! Test support: resolved-IR program builders
//!
//! The resolver is external, so tests build RIR trees directly. This module
//! provides a small builder plus the handful of canonical programs the
//! integration suites lower against every backend: list summation, lazy
//! streams, reserved-name collisions, ghost destructors, bitvector
//! rotation, and subset-type witnesses.

use num_bigint::BigUint;

use crate::codegen::backends::backend_for;
use crate::codegen::driver::compile_program;
use crate::codegen::writer::FileOut;
use crate::codegen::CompileFailure;
use crate::options::{CompileLevel, Options, TargetTag};
use crate::rir::{
    BinOp, Block, ClassDecl, Ctor, DatatypeDecl, DeclId, DeclKind, Expr, ExprKind, Formal,
    FunctionDecl, Lit, Member, MemberKind, MethodDecl, Module, ModuleId, Program, Stmt,
    StmtKind, Tok, TopLevelDecl, Type,
};

// ============================================================================
// Builder
// ============================================================================

/// Incrementally assembles a resolved program.
pub struct ProgramBuilder {
    modules: Vec<Module>,
    decls: Vec<TopLevelDecl>,
}

impl ProgramBuilder {
    /// Start with a default module holding a default class.
    pub fn new() -> Self {
        let mut b = ProgramBuilder {
            modules: vec![Module {
                id: ModuleId(0),
                name: String::new(),
                is_default: true,
                imports: Vec::new(),
                decls: Vec::new(),
            }],
            decls: Vec::new(),
        };
        b.add_decl(
            ModuleId(0),
            "_default",
            DeclKind::Class(ClassDecl {
                members: Vec::new(),
                traits: Vec::new(),
                is_default_class: true,
                ghost: false,
            }),
        );
        b
    }

    pub fn default_module(&self) -> ModuleId {
        ModuleId(0)
    }

    pub fn default_class(&self) -> DeclId {
        DeclId(0)
    }

    pub fn add_module(&mut self, name: &str, imports: Vec<ModuleId>) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(Module {
            id,
            name: name.to_string(),
            is_default: false,
            imports,
            decls: Vec::new(),
        });
        id
    }

    pub fn add_decl(&mut self, module: ModuleId, name: &str, kind: DeclKind) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(TopLevelDecl {
            name: name.to_string(),
            module,
            tok: Tok::default(),
            type_params: Vec::new(),
            kind,
        });
        self.modules[module.0 as usize].decls.push(id);
        id
    }

    pub fn add_member(&mut self, decl: DeclId, member: Member) {
        match &mut self.decls[decl.0 as usize].kind {
            DeclKind::Class(c) | DeclKind::Trait(c) => c.members.push(member),
            DeclKind::Datatype(d) => d.members.push(member),
            DeclKind::Iterator(i) => i.members.push(member),
            _ => panic!("declaration kind has no members"),
        }
    }

    pub fn finish(self) -> Program {
        Program {
            modules: self.modules,
            decls: self.decls,
        }
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Small constructors
// ============================================================================

pub fn static_method(name: &str, ins: Vec<Formal>, outs: Vec<Formal>, body: Block) -> Member {
    Member {
        name: name.to_string(),
        tok: Tok::default(),
        ghost: false,
        is_static: true,
        type_params: Vec::new(),
        kind: MemberKind::Method(MethodDecl {
            ins,
            outs,
            body: Some(body),
            is_tail_recursive: false,
        }),
    }
}

pub fn static_function(name: &str, formals: Vec<Formal>, result: Type, body: Expr) -> Member {
    Member {
        name: name.to_string(),
        tok: Tok::default(),
        ghost: false,
        is_static: true,
        type_params: Vec::new(),
        kind: MemberKind::Function(FunctionDecl {
            formals,
            result,
            body: Some(body),
            is_tail_recursive: false,
        }),
    }
}

pub fn print_stmt(args: Vec<Expr>) -> Stmt {
    Stmt::new(StmtKind::Print { args })
}

pub fn str_lit(s: &str) -> Expr {
    Expr::lit(Lit::Str(s.to_string()), Type::seq(Type::Char))
}

pub fn fn_call(decl: DeclId, member: &str, args: Vec<Expr>, ty: Type) -> Expr {
    Expr::new(
        ExprKind::FnCall {
            decl,
            member: member.to_string(),
            receiver: None,
            type_args: Vec::new(),
            args,
        },
        ty,
    )
}

pub fn binop(op: BinOp, lhs: Expr, rhs: Expr, ty: Type) -> Expr {
    Expr::new(
        ExprKind::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
    )
}

pub fn dt_value(decl: DeclId, ctor: usize, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::DatatypeValue { decl, ctor, args }, Type::user(decl))
}

// ============================================================================
// Compilation helpers
// ============================================================================

/// Lower a program for one target and return the rendered files without
/// touching the filesystem.
pub fn compile_to_files(p: &Program, tag: TargetTag) -> Result<Vec<FileOut>, CompileFailure> {
    let options = Options::new(tag, "unused-out").with_level(CompileLevel::None);
    let backend = backend_for(tag);
    compile_program(p, &options, backend.as_ref()).map(|a| a.files)
}

/// All generated source joined together, for containment assertions.
pub fn compile_to_text(p: &Program, tag: TargetTag) -> Result<String, CompileFailure> {
    let files = compile_to_files(p, tag)?;
    Ok(files
        .into_iter()
        .map(|f| format!("// ==== {} ====\n{}", f.path.display(), f.contents))
        .collect::<Vec<_>>()
        .join("\n"))
}

// ============================================================================
// Canonical programs
// ============================================================================

/// `List = Nil | Cons(head: int, tail: List)` plus a recursive `Sum`
/// function and a `Main` that sums and prints.
pub fn list_sum_program() -> Program {
    let mut b = ProgramBuilder::new();
    let list = b.add_decl(
        b.default_module(),
        "List",
        DeclKind::Datatype(DatatypeDecl {
            ctors: vec![
                Ctor {
                    name: "Nil".to_string(),
                    tok: Tok::default(),
                    formals: Vec::new(),
                },
                Ctor {
                    name: "Cons".to_string(),
                    tok: Tok::default(),
                    formals: vec![
                        Formal::new("head", Type::Int),
                        Formal::new("tail", Type::user(DeclId(1))),
                    ],
                },
            ],
            co: false,
            default_ctor: 0,
            members: Vec::new(),
        }),
    );

    // Sum(l) = match l { Nil => 0, Cons(head, tail) => head + Sum(tail) }
    let scrutinee = Expr::var("l", Type::user(list));
    let sum_body = Expr::new(
        ExprKind::Match {
            scrutinee: Box::new(scrutinee),
            arms: vec![
                crate::rir::MatchArm {
                    ctor: 0,
                    binders: Vec::new(),
                    body: Box::new(Expr::int(0)),
                },
                crate::rir::MatchArm {
                    ctor: 1,
                    binders: vec![
                        Formal::new("head", Type::Int),
                        Formal::new("tail", Type::user(list)),
                    ],
                    body: Box::new(binop(
                        BinOp::Add,
                        Expr::var("head", Type::Int),
                        fn_call(
                            DeclId(0),
                            "Sum",
                            vec![Expr::var("tail", Type::user(list))],
                            Type::Int,
                        ),
                        Type::Int,
                    )),
                },
            ],
            taken_arm: None,
        },
        Type::Int,
    );
    b.add_member(
        b.default_class(),
        static_function(
            "Sum",
            vec![Formal::new("l", Type::user(list))],
            Type::Int,
            sum_body,
        ),
    );

    // Main: var xs := Cons(1, Cons(2, Nil)); print Sum(xs);
    let xs = dt_value(
        list,
        1,
        vec![
            Expr::int(1),
            dt_value(list, 1, vec![Expr::int(2), dt_value(list, 0, vec![])]),
        ],
    );
    let main_body = vec![
        Stmt::new(StmtKind::VarDecl {
            locals: vec![Formal::new("xs", Type::user(list))],
            rhs: Some(xs),
        }),
        print_stmt(vec![fn_call(
            DeclId(0),
            "Sum",
            vec![Expr::var("xs", Type::user(list))],
            Type::Int,
        )]),
        print_stmt(vec![str_lit("\n")]),
    ];
    b.add_member(
        b.default_class(),
        static_method("Main", Vec::new(), Vec::new(), main_body),
    );
    b.finish()
}

/// Co-inductive stream with a single constructor; building one must not
/// diverge, so every field is thunked.
pub fn co_stream_program() -> Program {
    let mut b = ProgramBuilder::new();
    let stream = b.add_decl(
        b.default_module(),
        "Stream",
        DeclKind::Datatype(DatatypeDecl {
            ctors: vec![Ctor {
                name: "SCons".to_string(),
                tok: Tok::default(),
                formals: vec![
                    Formal::new("head", Type::Int),
                    Formal::new("tail", Type::user(DeclId(1))),
                ],
            }],
            co: true,
            default_ctor: 0,
            members: Vec::new(),
        }),
    );

    // Up(n): Stream = SCons(n, Up(n + 1))
    let up_body = dt_value(
        stream,
        0,
        vec![
            Expr::var("n", Type::Int),
            fn_call(
                DeclId(0),
                "Up",
                vec![binop(
                    BinOp::Add,
                    Expr::var("n", Type::Int),
                    Expr::int(1),
                    Type::Int,
                )],
                Type::user(stream),
            ),
        ],
    );
    b.add_member(
        b.default_class(),
        static_function("Up", vec![Formal::new("n", Type::Int)], Type::user(stream), up_body),
    );

    // Main: var s := Up(0); print s.head;
    let main_body = vec![
        Stmt::new(StmtKind::VarDecl {
            locals: vec![Formal::new("s", Type::user(stream))],
            rhs: Some(fn_call(DeclId(0), "Up", vec![Expr::int(0)], Type::user(stream))),
        }),
        print_stmt(vec![Expr::new(
            ExprKind::FieldSelect {
                obj: Box::new(Expr::var("s", Type::user(stream))),
                decl: stream,
                field: "head".to_string(),
            },
            Type::Int,
        )]),
    ];
    b.add_member(
        b.default_class(),
        static_method("Main", Vec::new(), Vec::new(), main_body),
    );
    b.finish()
}

/// Constructor whose formals collide with common reserved words.
pub fn reserved_names_program() -> Program {
    let mut b = ProgramBuilder::new();
    let dt = b.add_decl(
        b.default_module(),
        "ConflictingNames",
        DeclKind::Datatype(DatatypeDecl {
            ctors: vec![Ctor {
                name: "ConflictingNames1".to_string(),
                tok: Tok::default(),
                formals: vec![
                    Formal::new("len", Type::Int),
                    Formal::new("public", Type::Char),
                    Formal::new("goto", Type::seq(Type::Char)),
                ],
            }],
            co: false,
            default_ctor: 0,
            members: Vec::new(),
        }),
    );

    let value = dt_value(
        dt,
        0,
        vec![
            Expr::int(42),
            Expr::lit(Lit::Char('q'), Type::Char),
            str_lit("hello"),
        ],
    );
    let main_body = vec![
        Stmt::new(StmtKind::VarDecl {
            locals: vec![Formal::new("c", Type::user(dt))],
            rhs: Some(value),
        }),
        print_stmt(vec![Expr::new(
            ExprKind::FieldSelect {
                obj: Box::new(Expr::var("c", Type::user(dt))),
                decl: dt,
                field: "len".to_string(),
            },
            Type::Int,
        )]),
        print_stmt(vec![str_lit(" ")]),
        print_stmt(vec![Expr::new(
            ExprKind::FieldSelect {
                obj: Box::new(Expr::var("c", Type::user(dt))),
                decl: dt,
                field: "public".to_string(),
            },
            Type::Char,
        )]),
        print_stmt(vec![str_lit(" ")]),
        print_stmt(vec![Expr::new(
            ExprKind::FieldSelect {
                obj: Box::new(Expr::var("c", Type::user(dt))),
                decl: dt,
                field: "goto".to_string(),
            },
            Type::seq(Type::Char),
        )]),
    ];
    b.add_member(
        b.default_class(),
        static_method("Main", Vec::new(), Vec::new(), main_body),
    );
    b.finish()
}

/// Record datatype with one ghost field; the compiled artifact must carry
/// no storage for it.
pub fn ghost_record_program() -> Program {
    let mut b = ProgramBuilder::new();
    let rec = b.add_decl(
        b.default_module(),
        "R",
        DeclKind::Datatype(DatatypeDecl {
            ctors: vec![Ctor {
                name: "R".to_string(),
                tok: Tok::default(),
                formals: vec![
                    Formal::new("x", Type::Int),
                    Formal::ghost("spirit", Type::Int),
                ],
            }],
            co: false,
            default_ctor: 0,
            members: Vec::new(),
        }),
    );

    let value = dt_value(rec, 0, vec![Expr::int(10), Expr::int(20)]);
    let main_body = vec![
        Stmt::new(StmtKind::VarDecl {
            locals: vec![Formal::new("r", Type::user(rec))],
            rhs: Some(value),
        }),
        Stmt::new(StmtKind::Assert {
            expr: Expr::lit(Lit::Bool(true), Type::Bool),
        }),
        print_stmt(vec![Expr::new(
            ExprKind::FieldSelect {
                obj: Box::new(Expr::var("r", Type::user(rec))),
                decl: rec,
                field: "x".to_string(),
            },
            Type::Int,
        )]),
    ];
    b.add_member(
        b.default_class(),
        static_method("Main", Vec::new(), Vec::new(), main_body),
    );
    b.finish()
}

/// 8-bit rotation: `0b10110001` rotated left by 3 is `0b10001101`.
pub fn bitvector_rotation_program() -> Program {
    let mut b = ProgramBuilder::new();
    let bv8 = Type::bitvector(8);
    let rotated = binop(
        BinOp::RotateLeft,
        Expr::lit(
            Lit::Bitvector {
                value: BigUint::from(0b1011_0001u32),
                width: 8,
            },
            bv8.clone(),
        ),
        Expr::int(3),
        bv8.clone(),
    );
    let main_body = vec![
        Stmt::new(StmtKind::VarDecl {
            locals: vec![Formal::new("r", bv8)],
            rhs: Some(rotated),
        }),
        print_stmt(vec![Expr::var("r", Type::bitvector(8))]),
    ];
    b.add_member(
        b.default_class(),
        static_method("Main", Vec::new(), Vec::new(), main_body),
    );
    b.finish()
}

/// `type Even = x: int | x % 2 == 0` with an inferred witness of 0.
pub fn subset_witness_program() -> Program {
    let mut b = ProgramBuilder::new();
    let even = b.add_decl(
        b.default_module(),
        "Even",
        DeclKind::SubsetType(crate::rir::SubsetTypeDecl {
            base: Type::Int,
            witness: Some(Expr::int(0)),
            synthesized_witness: false,
        }),
    );
    let main_body = vec![
        Stmt::new(StmtKind::VarDecl {
            locals: vec![Formal::new("e", Type::user(even))],
            rhs: None,
        }),
        print_stmt(vec![Expr::var("e", Type::user(even))]),
    ];
    b.add_member(
        b.default_class(),
        static_method("Main", Vec::new(), Vec::new(), main_body),
    );
    b.finish()
}

/// A tail-recursive countdown method, for the tail-call rewrite.
pub fn tail_recursive_program() -> Program {
    let mut b = ProgramBuilder::new();
    let count_body = vec![Stmt::new(StmtKind::If {
        cond: binop(
            BinOp::Gt,
            Expr::var("n", Type::Int),
            Expr::int(0),
            Type::Bool,
        ),
        then: vec![Stmt::new(StmtKind::Call(crate::rir::CallRhs {
            decl: DeclId(0),
            member: "Count".to_string(),
            receiver: None,
            type_args: Vec::new(),
            args: vec![binop(
                BinOp::Sub,
                Expr::var("n", Type::Int),
                Expr::int(1),
                Type::Int,
            )],
        }))],
        els: None,
    })];
    let mut count = static_method(
        "Count",
        vec![Formal::new("n", Type::Int)],
        Vec::new(),
        count_body,
    );
    if let MemberKind::Method(m) = &mut count.kind {
        m.is_tail_recursive = true;
    }
    b.add_member(b.default_class(), count);
    b.add_member(
        b.default_class(),
        static_method(
            "Main",
            Vec::new(),
            Vec::new(),
            vec![Stmt::new(StmtKind::Call(crate::rir::CallRhs {
                decl: DeclId(0),
                member: "Count".to_string(),
                receiver: None,
                type_args: Vec::new(),
                args: vec![Expr::int(1000000)],
            }))],
        ),
    );
    b.finish()
}
