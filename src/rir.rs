//! Resolved Intermediate Representation (RIR)
//!
//! The RIR is produced by the external resolver. Every expression carries its
//! resolved type, every identifier is bound, and every member has a ghost
//! flag. The codegen core consumes the tree by immutable reference; nothing
//! here is mutated during lowering.
//!
//! Back-references (a member's enclosing declaration, a user-defined type's
//! declaration) are stable arena indices rather than pointers, which keeps
//! the tree cycle-free and serializable. Recursive programs (a class whose
//! method returns the class) are handled by id, never by structural
//! traversal.

use std::collections::HashMap;
use std::fmt;

use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Unique identifier for top-level declarations (arena index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclId(pub u32);

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// A source token position, carried for error reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tok {
    pub line: u32,
    pub col: u32,
}

impl Tok {
    pub fn new(line: u32, col: u32) -> Self {
        Tok { line, col }
    }
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

// ============================================================================
// Program and modules
// ============================================================================

/// A whole resolved program: the module tree plus a flat declaration arena.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub modules: Vec<Module>,
    /// Arena of all top-level declarations, addressed by `DeclId`.
    pub decls: Vec<TopLevelDecl>,
}

/// A module: a named scope of top-level declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    /// Module name; empty for the default module.
    pub name: String,
    /// The default module holds declarations outside any explicit module.
    pub is_default: bool,
    /// Modules this module imports (must be emitted first).
    pub imports: Vec<ModuleId>,
    /// Declarations owned by this module, in source order.
    pub decls: Vec<DeclId>,
}

/// Error raised by structural queries over the program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RirError {
    #[error("module dependency cycle involving `{0}`")]
    ModuleCycle(String),
    #[error("dangling declaration id {0}")]
    DanglingDecl(DeclId),
}

impl Program {
    pub fn decl(&self, id: DeclId) -> &TopLevelDecl {
        &self.decls[id.0 as usize]
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    /// Fully qualified name of a declaration (`Module.Decl`, or just `Decl`
    /// inside the default module).
    pub fn qualified_name(&self, id: DeclId) -> String {
        let decl = self.decl(id);
        let module = self.module(decl.module);
        if module.is_default {
            decl.name.clone()
        } else {
            format!("{}.{}", module.name, decl.name)
        }
    }

    /// Look up a member of a class-like or datatype declaration by name.
    pub fn find_member<'a>(&'a self, id: DeclId, name: &str) -> Option<&'a Member> {
        self.decl(id).members().iter().find(|m| m.name == name)
    }

    /// Enumerate modules in dependency order: a module precedes every module
    /// that imports it. The order is deterministic for a given program.
    ///
    /// The resolver rejects import cycles, so a cycle here is an internal
    /// invariant violation surfaced to the driver.
    pub fn module_order(&self) -> Result<Vec<ModuleId>, RirError> {
        let mut order = Vec::with_capacity(self.modules.len());
        let mut state: HashMap<ModuleId, VisitState> = HashMap::new();

        for module in &self.modules {
            self.visit_module(module.id, &mut state, &mut order)?;
        }
        Ok(order)
    }

    fn visit_module(
        &self,
        id: ModuleId,
        state: &mut HashMap<ModuleId, VisitState>,
        order: &mut Vec<ModuleId>,
    ) -> Result<(), RirError> {
        match state.get(&id) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::InProgress) => {
                return Err(RirError::ModuleCycle(self.module(id).name.clone()));
            }
            None => {}
        }
        state.insert(id, VisitState::InProgress);
        for &import in &self.module(id).imports {
            self.visit_module(import, state, order)?;
        }
        state.insert(id, VisitState::Done);
        order.push(id);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}

// ============================================================================
// Top-level declarations
// ============================================================================

/// A top-level declaration inside a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopLevelDecl {
    pub name: String,
    pub module: ModuleId,
    pub tok: Tok,
    pub type_params: Vec<String>,
    pub kind: DeclKind,
}

/// The declaration kinds the core lowers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeclKind {
    Class(ClassDecl),
    Trait(ClassDecl),
    Datatype(DatatypeDecl),
    Newtype(NewtypeDecl),
    SubsetType(SubsetTypeDecl),
    Iterator(IteratorDecl),
}

impl TopLevelDecl {
    /// Members of class-like declarations; empty slice for the rest.
    pub fn members(&self) -> &[Member] {
        match &self.kind {
            DeclKind::Class(c) | DeclKind::Trait(c) => &c.members,
            DeclKind::Datatype(d) => &d.members,
            DeclKind::Iterator(i) => &i.members,
            _ => &[],
        }
    }

    /// A declaration is ghost when it exists only for verification.
    pub fn is_ghost(&self) -> bool {
        match &self.kind {
            DeclKind::Class(c) | DeclKind::Trait(c) => c.ghost,
            DeclKind::SubsetType(s) => s.witness.is_none() && !s.synthesized_witness,
            _ => false,
        }
    }
}

/// A class or trait body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDecl {
    pub members: Vec<Member>,
    /// Traits this class implements, by declaration id.
    pub traits: Vec<DeclId>,
    /// The default class holds module-level members; at most one per module.
    pub is_default_class: bool,
    pub ghost: bool,
}

/// An inductive or co-inductive datatype.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatatypeDecl {
    pub ctors: Vec<Ctor>,
    /// Greatest-fixed-point datatype; constructor arguments are thunked.
    pub co: bool,
    /// Index of the designated default constructor (inductive only).
    pub default_ctor: usize,
    /// Member functions/constants declared on the datatype.
    pub members: Vec<Member>,
}

impl DatatypeDecl {
    /// Record datatypes (exactly one constructor, inductive) collapse to a
    /// product type. Co-inductive datatypes keep the variant shape so their
    /// constructor arguments stay thunked.
    pub fn is_record(&self) -> bool {
        !self.co && self.ctors.len() == 1
    }
}

/// One datatype constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ctor {
    pub name: String,
    pub tok: Tok,
    pub formals: Vec<Formal>,
}

/// A newtype over a base type, optionally backed by a native integer width.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewtypeDecl {
    pub base: Type,
    /// Declared native backing width in bits, when the resolver proved the
    /// value range fits.
    pub native_width: Option<u32>,
}

/// A subset type (`type n = x: int | constraint`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsetTypeDecl {
    pub base: Type,
    /// The inferred witness expression; its value is the type's default.
    pub witness: Option<Expr>,
    /// True when the resolver proved a default exists without naming one.
    pub synthesized_witness: bool,
}

/// An iterator declaration: lowers to a class with a `MoveNext` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IteratorDecl {
    pub ins: Vec<Formal>,
    /// Yielded values, exposed as fields on the iterator object.
    pub yields: Vec<Formal>,
    pub body: Option<Block>,
    pub members: Vec<Member>,
}

// ============================================================================
// Members
// ============================================================================

/// A member of a class, trait, datatype, or iterator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub tok: Tok,
    pub ghost: bool,
    pub is_static: bool,
    pub type_params: Vec<String>,
    pub kind: MemberKind,
}

/// Member kind payloads. Shared fields live on [`Member`]; per-kind fields
/// live here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MemberKind {
    Field(FieldDecl),
    Const(ConstDecl),
    Method(MethodDecl),
    Function(FunctionDecl),
    Constructor(MethodDecl),
    Lemma(MethodDecl),
    Predicate(FunctionDecl),
}

impl Member {
    /// Whether this member can serve as the program entry point: a non-ghost
    /// method named `Main` with no non-ghost in- or out-parameters, either
    /// static or on a type instantiable without state (the default class).
    pub fn is_entry_candidate(&self, enclosing_is_default_class: bool) -> bool {
        if self.ghost || self.name != "Main" {
            return false;
        }
        let method = match &self.kind {
            MemberKind::Method(m) => m,
            _ => return false,
        };
        if !self.is_static && !enclosing_is_default_class {
            return false;
        }
        method.ins.iter().all(|f| f.ghost) && method.outs.iter().all(|f| f.ghost)
    }
}

/// A mutable or const field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub ty: Type,
    pub init: Option<Expr>,
}

/// A constant with an optional right-hand side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstDecl {
    pub ty: Type,
    pub rhs: Option<Expr>,
    /// Set when the RHS mentions ghost state; the emitted RHS is then the
    /// type's default value.
    pub rhs_is_ghost: bool,
}

/// A method: in-parameters, out-parameters, and a statement body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDecl {
    pub ins: Vec<Formal>,
    pub outs: Vec<Formal>,
    pub body: Option<Block>,
    /// Flagged by the resolver when every self-call is in tail position.
    pub is_tail_recursive: bool,
}

/// A function: expression-bodied, with a single result type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub formals: Vec<Formal>,
    pub result: Type,
    pub body: Option<Expr>,
    pub is_tail_recursive: bool,
}

/// A formal parameter (of a method, function, constructor, or binder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formal {
    pub name: String,
    pub ty: Type,
    pub ghost: bool,
    /// Default-value expression, used by the driver to fill erased ghost
    /// arguments at call sites.
    pub default_value: Option<Box<Expr>>,
}

impl Formal {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Formal {
            name: name.into(),
            ty,
            ghost: false,
            default_value: None,
        }
    }

    pub fn ghost(name: impl Into<String>, ty: Type) -> Self {
        Formal {
            name: name.into(),
            ty,
            ghost: true,
            default_value: None,
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// A resolved type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Char,
    /// Arbitrary-precision integer.
    Int,
    /// Arbitrary-precision decimal real.
    Real,
    /// Bitvector of the given width, optionally backed by a native integer
    /// type of `native` bits on targets that have one.
    Bitvector { width: u32, native: Option<u32> },
    Set(Box<Type>),
    Seq(Box<Type>),
    Multiset(Box<Type>),
    Map(Box<Type>, Box<Type>),
    /// Multi-dimensional array.
    Array { rank: u32, elem: Box<Type> },
    /// Reference to a user-defined declaration with type arguments.
    UserDefined { decl: DeclId, type_args: Vec<Type> },
    Arrow { ins: Vec<Type>, out: Box<Type> },
    TypeParam(String),
    /// An unresolved proxy. Reaching lowering with one of these is a
    /// resolver bug and must be reported as an internal error.
    Proxy,
}

impl Type {
    pub fn seq(elem: Type) -> Type {
        Type::Seq(Box::new(elem))
    }

    pub fn set(elem: Type) -> Type {
        Type::Set(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn user(decl: DeclId) -> Type {
        Type::UserDefined {
            decl,
            type_args: Vec::new(),
        }
    }

    pub fn bitvector(width: u32) -> Type {
        let native = [8u32, 16, 32, 64].iter().copied().find(|&k| width <= k);
        Type::Bitvector { width, native }
    }

    /// Whether the type is a collection whose elements must not be bare
    /// trait parameters on targets lacking that capability.
    pub fn collection_elem(&self) -> Option<&Type> {
        match self {
            Type::Set(e) | Type::Seq(e) | Type::Multiset(e) => Some(e),
            Type::Map(_, v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Int => write!(f, "int"),
            Type::Real => write!(f, "real"),
            Type::Bitvector { width, .. } => write!(f, "bv{}", width),
            Type::Set(e) => write!(f, "set<{}>", e),
            Type::Seq(e) => write!(f, "seq<{}>", e),
            Type::Multiset(e) => write!(f, "multiset<{}>", e),
            Type::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            Type::Array { rank, elem } => {
                if *rank == 1 {
                    write!(f, "array<{}>", elem)
                } else {
                    write!(f, "array{}<{}>", rank, elem)
                }
            }
            Type::UserDefined { decl, type_args } => {
                write!(f, "{}", decl)?;
                if !type_args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in type_args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Arrow { ins, out } => {
                write!(f, "(")?;
                for (i, t) in ins.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ") -> {}", out)
            }
            Type::TypeParam(name) => write!(f, "{}", name),
            Type::Proxy => write!(f, "?"),
        }
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// A resolved expression. Every compiled expression has a non-null type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub ty: Type,
    pub tok: Tok,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Expr {
            ty,
            tok: Tok::default(),
            kind,
        }
    }

    pub fn lit(lit: Lit, ty: Type) -> Self {
        Expr::new(ExprKind::Lit(lit), ty)
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Self {
        Expr::new(ExprKind::Var(name.into()), ty)
    }

    pub fn int(n: i64) -> Self {
        Expr::lit(Lit::Int(BigInt::from(n)), Type::Int)
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lit {
    Bool(bool),
    Char(char),
    Int(BigInt),
    /// Decimal real: `mantissa * 10^exponent`, exact.
    Real { mantissa: BigInt, exponent: i32 },
    Bitvector { value: BigUint, width: u32 },
    Str(String),
    /// The null reference of a class type.
    Null,
}

/// Expression kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Lit(Lit),
    Var(String),
    This,

    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    UnaryOp {
        op: UnOp,
        operand: Box<Expr>,
    },
    /// Type conversion; the expression's `ty` is the conversion target.
    Convert {
        operand: Box<Expr>,
    },

    SeqDisplay(Vec<Expr>),
    SetDisplay(Vec<Expr>),
    MultisetDisplay(Vec<Expr>),
    MapDisplay(Vec<(Expr, Expr)>),

    /// Single-dimension select on a seq, map, or one-dimensional array.
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    /// Functional single-element update on a seq or map.
    IndexUpdate {
        base: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    /// Sequence slice `base[lo..hi]`; either bound may be absent.
    Slice {
        base: Box<Expr>,
        lo: Option<Box<Expr>>,
        hi: Option<Box<Expr>>,
    },
    /// Multi-dimensional array select.
    ArraySelect {
        base: Box<Expr>,
        indices: Vec<Expr>,
    },

    /// Bounded quantifier over a finite collection.
    Quantifier {
        forall: bool,
        var: Formal,
        collection: Box<Expr>,
        body: Box<Expr>,
    },
    /// Set comprehension over a finite collection.
    SetComprehension {
        var: Formal,
        collection: Box<Expr>,
        filter: Option<Box<Expr>>,
        term: Box<Expr>,
    },
    /// Map comprehension over a finite collection.
    MapComprehension {
        var: Formal,
        collection: Box<Expr>,
        filter: Option<Box<Expr>>,
        key: Box<Expr>,
        value: Box<Expr>,
    },

    Lambda {
        formals: Vec<Formal>,
        body: Box<Expr>,
    },
    Let {
        var: Formal,
        rhs: Box<Expr>,
        body: Box<Expr>,
    },
    Ite {
        cond: Box<Expr>,
        thn: Box<Expr>,
        els: Box<Expr>,
    },
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
        /// Arm index marked by the resolver when the scrutinee is ghost.
        taken_arm: Option<usize>,
    },

    /// Application of an arrow-typed value.
    Apply {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Call of a named function member.
    FnCall {
        decl: DeclId,
        member: String,
        /// `None` for static/companion calls.
        receiver: Option<Box<Expr>>,
        /// Instantiation of the callee's type parameters; the driver turns
        /// these into runtime descriptors on reified-generics targets.
        type_args: Vec<Type>,
        args: Vec<Expr>,
    },
    /// Datatype constructor application (includes ghost arguments; the
    /// driver erases them).
    DatatypeValue {
        decl: DeclId,
        ctor: usize,
        args: Vec<Expr>,
    },
    /// Per-constructor test (`x.Cons?`).
    TestVariant {
        operand: Box<Expr>,
        decl: DeclId,
        ctor: usize,
    },
    /// Instance field or named destructor access.
    FieldSelect {
        obj: Box<Expr>,
        decl: DeclId,
        field: String,
    },
    /// Static or companion member access.
    StaticSelect {
        decl: DeclId,
        member: String,
    },
    /// Special field with a symbolic id (cardinality, array length, map
    /// domain, ...).
    Special {
        obj: Box<Expr>,
        id: SpecialField,
    },
}

/// Match arm of a datatype match expression or statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchArm {
    pub ctor: usize,
    pub binders: Vec<Formal>,
    pub body: Box<Expr>,
}

/// Special fields addressed by symbolic id rather than name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialField {
    /// `|s|` of a seq, set, multiset, or map.
    Cardinality,
    /// `a.Length(dim)` of an array.
    ArrayLength(u32),
    /// Domain set of a map.
    MapKeys,
    /// Value set of a map.
    MapValues,
}

/// Binary operators on resolved operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Euclidean division.
    Div,
    /// Euclidean modulus.
    Mod,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    RotateLeft,
    RotateRight,
    /// Sequence concatenation.
    Concat,
    /// Collection membership.
    In,
    NotIn,
    Union,
    Intersection,
    Difference,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Not,
    Neg,
    BitNot,
}

// ============================================================================
// Statements
// ============================================================================

/// A statement block.
pub type Block = Vec<Stmt>;

/// A resolved statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub tok: Tok,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt {
            tok: Tok::default(),
            kind,
        }
    }
}

/// Assignment targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Lhs {
    Var(String),
    Field {
        obj: Expr,
        decl: DeclId,
        field: String,
    },
    Index {
        base: Expr,
        indices: Vec<Expr>,
    },
}

/// A method call consumed as a statement RHS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRhs {
    pub decl: DeclId,
    pub member: String,
    pub receiver: Option<Expr>,
    pub type_args: Vec<Type>,
    pub args: Vec<Expr>,
}

/// Statement kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    /// Local variable declarations with an optional initializing RHS.
    VarDecl {
        locals: Vec<Formal>,
        rhs: Option<Expr>,
    },
    Assign {
        lhs: Lhs,
        rhs: Expr,
    },
    /// Multi-assignment from a method with multiple out-parameters.
    MultiAssign {
        lhss: Vec<Lhs>,
        call: CallRhs,
    },
    /// Method call whose out-parameters are discarded.
    Call(CallRhs),
    /// Class constructor call: `lhs := new C(args)`.
    New {
        lhs: Lhs,
        decl: DeclId,
        args: Vec<Expr>,
    },
    If {
        cond: Expr,
        then: Block,
        /// `Some(Block)` for else, possibly containing a single `If` for
        /// else-if chains.
        els: Option<Block>,
    },
    While {
        label: Option<String>,
        cond: Expr,
        body: Block,
    },
    /// `for var := lo to/downto hi`.
    ForRange {
        var: Formal,
        lo: Expr,
        hi: Expr,
        up: bool,
        body: Block,
    },
    ForEach {
        var: Formal,
        collection: Expr,
        body: Block,
    },
    /// Infinite loop with a break label.
    Loop {
        label: Option<String>,
        body: Block,
    },
    Break {
        label: Option<String>,
    },
    Return {
        values: Vec<Expr>,
    },
    /// Iterator yield.
    Yield,
    Print {
        args: Vec<Expr>,
    },
    Match {
        scrutinee: Expr,
        arms: Vec<StmtMatchArm>,
        taken_arm: Option<usize>,
    },
    /// Ghost assertion; compiles to nothing.
    Assert {
        expr: Expr,
    },
    Block(Block),
    /// Statically unreachable code.
    Absurd,
}

/// Match arm of a statement-level match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StmtMatchArm {
    pub ctor: usize,
    pub binders: Vec<Formal>,
    pub body: Block,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: u32, name: &str, imports: Vec<ModuleId>) -> Module {
        Module {
            id: ModuleId(id),
            name: name.to_string(),
            is_default: false,
            imports,
            decls: Vec::new(),
        }
    }

    #[test]
    fn test_module_order_linear() {
        let p = Program {
            modules: vec![
                module(0, "A", vec![ModuleId(1)]),
                module(1, "B", vec![ModuleId(2)]),
                module(2, "C", vec![]),
            ],
            decls: Vec::new(),
        };
        let order = p.module_order().unwrap();
        assert_eq!(order, vec![ModuleId(2), ModuleId(1), ModuleId(0)]);
    }

    #[test]
    fn test_module_order_diamond_is_deterministic() {
        let p = Program {
            modules: vec![
                module(0, "Top", vec![ModuleId(1), ModuleId(2)]),
                module(1, "Left", vec![ModuleId(3)]),
                module(2, "Right", vec![ModuleId(3)]),
                module(3, "Base", vec![]),
            ],
            decls: Vec::new(),
        };
        let a = p.module_order().unwrap();
        let b = p.module_order().unwrap();
        assert_eq!(a, b);
        let pos =
            |id: ModuleId| a.iter().position(|&m| m == id).unwrap();
        assert!(pos(ModuleId(3)) < pos(ModuleId(1)));
        assert!(pos(ModuleId(3)) < pos(ModuleId(2)));
        assert!(pos(ModuleId(1)) < pos(ModuleId(0)));
    }

    #[test]
    fn test_module_order_cycle_is_error() {
        let p = Program {
            modules: vec![
                module(0, "A", vec![ModuleId(1)]),
                module(1, "B", vec![ModuleId(0)]),
            ],
            decls: Vec::new(),
        };
        assert!(matches!(p.module_order(), Err(RirError::ModuleCycle(_))));
    }

    #[test]
    fn test_bitvector_native_backing() {
        assert_eq!(
            Type::bitvector(8),
            Type::Bitvector {
                width: 8,
                native: Some(8)
            }
        );
        assert_eq!(
            Type::bitvector(13),
            Type::Bitvector {
                width: 13,
                native: Some(16)
            }
        );
        assert_eq!(
            Type::bitvector(71),
            Type::Bitvector {
                width: 71,
                native: None
            }
        );
    }

    #[test]
    fn test_type_display() {
        assert_eq!(Type::seq(Type::Int).to_string(), "seq<int>");
        assert_eq!(
            Type::map(Type::Char, Type::Bool).to_string(),
            "map<char, bool>"
        );
        assert_eq!(Type::bitvector(8).to_string(), "bv8");
    }

    #[test]
    fn test_entry_candidate() {
        let main = Member {
            name: "Main".to_string(),
            tok: Tok::default(),
            ghost: false,
            is_static: true,
            type_params: Vec::new(),
            kind: MemberKind::Method(MethodDecl {
                ins: Vec::new(),
                outs: Vec::new(),
                body: Some(Vec::new()),
                is_tail_recursive: false,
            }),
        };
        assert!(main.is_entry_candidate(false));

        let mut with_arg = main.clone();
        if let MemberKind::Method(m) = &mut with_arg.kind {
            m.ins.push(Formal::new("x", Type::Int));
        }
        assert!(!with_arg.is_entry_candidate(false));

        let mut ghost_arg = main.clone();
        if let MemberKind::Method(m) = &mut ghost_arg.kind {
            m.ins.push(Formal::ghost("g", Type::Int));
        }
        assert!(ghost_arg.is_entry_candidate(false));
    }
}
