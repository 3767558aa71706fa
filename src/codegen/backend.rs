//! Backend capability interface
//!
//! A backend is one implementation of this trait per target language. The
//! driver never knows which target it is driving: it issues structured write
//! operations (open a scope, declare a field, spell a literal) and lets the
//! backend translate them into target syntax against the emission substrate.
//!
//! Default implementations cover the C-family spellings shared by several
//! targets; backends override exactly the operations their language spells
//! differently. Operations a target genuinely cannot express return an
//! `Unsupported` error built from the backend's capability bits; there is no
//! unwinding and no not-implemented panic.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::writer::{BraceStyle, Emitter, Wr};
use super::LowerError;
use crate::options::TargetTag;
use crate::rir::{BinOp, DeclId, Lit, Program, Tok, Type, UnOp};

/// Static description of what a backend can represent. The driver consults
/// these bits before lowering and reports unsupported constructs instead of
/// emitting broken code.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Generic type parameters are erased; no descriptors are consumed.
    pub erased_generics: bool,
    /// Native integer widths available for bitvector backing.
    pub native_int_widths: &'static [u32],
    /// Collection elements may be bare trait types.
    pub trait_collection_elements: bool,
    /// Co-inductive datatypes need no thunk wrapper.
    pub native_codata: bool,
    /// Loops can carry labels and `break`/`continue` can target them.
    pub labeled_loops: bool,
    /// Largest tuple arity expressible, when limited.
    pub max_tuple_arity: Option<usize>,
    /// Strings are sequences of code units rather than opaque objects.
    pub strings_are_code_units: bool,
}

/// The pieces of one output file a backend hands back to the driver: a fork
/// for backfilled imports and the writer for the file body.
#[derive(Debug, Clone, Copy)]
pub struct FilePieces {
    pub imports: Wr,
    pub body: Wr,
}

/// A ghost-erased, sanitized formal parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// A class-like scope to open.
#[derive(Debug, Clone)]
pub struct ClassSig {
    /// Sanitized, module-qualified per the backend's naming scheme.
    pub name: String,
    pub type_params: Vec<String>,
    /// Emitted names of implemented traits.
    pub traits: Vec<String>,
    pub is_default_class: bool,
    pub module: String,
}

/// A callable member scope to open.
#[derive(Debug, Clone)]
pub struct MethodSig {
    pub name: String,
    pub is_static: bool,
    pub is_constructor: bool,
    pub type_params: Vec<String>,
    pub ins: Vec<Param>,
    /// Out-parameters; the backend chooses the return representation.
    pub outs: Vec<Param>,
    /// Pre-rendered default values for the out-parameters, in order.
    pub out_defaults: Vec<String>,
    /// Enclosing emitted type name.
    pub enclosing: String,
    /// Expression-bodied function result, when this is a function.
    pub result: Option<Type>,
}

/// A field or constant declaration.
#[derive(Debug, Clone)]
pub struct FieldSig {
    pub name: String,
    pub ty: Type,
    pub is_static: bool,
    pub is_const: bool,
    /// Pre-rendered initializer.
    pub init: Option<String>,
}

/// A datatype to lower.
#[derive(Debug, Clone)]
pub struct DatatypeSig {
    pub name: String,
    pub module: String,
    pub type_params: Vec<String>,
    pub co: bool,
    pub is_record: bool,
    pub ctors: Vec<CtorSig>,
    pub default_ctor: usize,
    /// Pre-rendered arguments for the default constructor instance.
    pub default_args: Vec<String>,
}

/// One constructor variant.
#[derive(Debug, Clone)]
pub struct CtorSig {
    pub name: String,
    /// Sanitized emitted name of the `is_` test predicate.
    pub test_name: String,
    pub formals: Vec<Param>,
    /// Formals are thunked (co-inductive parent).
    pub lazy: bool,
}

/// A named destructor dispatching over the variants that carry the field.
#[derive(Debug, Clone)]
pub struct DtorSig {
    pub name: String,
    pub ty: Type,
    /// Constructors carrying this formal.
    pub ctors: Vec<String>,
}

/// Collection operations spelled by the backend's runtime library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollOp {
    Concat,
    Union,
    Intersection,
    Difference,
    Contains,
    SeqIndex,
    MapIndex,
    SeqUpdate,
    MapUpdate,
    Take,
    Drop,
    Subsequence,
    Cardinality,
    MapKeys,
    MapValues,
}

/// Captured result of a compile-and-run invocation.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    pub status: i32,
}

/// The backend contract. One implementation per target language.
pub trait Backend {
    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn tag(&self) -> TargetTag;

    fn caps(&self) -> Capabilities;

    /// The target's reserved words, for identifier protection.
    fn reserved_words(&self) -> &'static [&'static str];

    /// Whether an identifier collides with a reserved word.
    fn is_reserved(&self, ident: &str) -> bool {
        self.reserved_words().contains(&ident)
    }

    /// Append the disambiguating suffix when a name is reserved.
    fn sanitize(&self, ident: &str) -> String {
        if self.is_reserved(ident) {
            format!("{}_", ident)
        } else {
            ident.to_string()
        }
    }

    /// Output file for a module's generated source.
    fn module_file(&self, module_name: &str) -> PathBuf;

    /// Target spelling of an RIR type.
    fn type_name(&self, p: &Program, ty: &Type, tok: Tok) -> Result<String, LowerError>;

    /// Whether arithmetic on this native type needs an explicit cast back.
    fn needs_cast_after_arith(&self, _ty: &Type) -> bool {
        false
    }

    /// How a declaration is named from other emitted code.
    fn decl_ref(&self, p: &Program, decl: DeclId) -> Result<String, LowerError>;

    /// How a declaration is named at its own declaration site.
    fn decl_local_name(&self, p: &Program, decl: DeclId) -> String {
        self.sanitize(&p.decl(decl).name)
    }

    /// Static or companion member reference.
    fn static_ref(&self, decl_ref: &str, member: &str) -> String {
        format!("{}.{}", decl_ref, member)
    }

    /// Runtime type descriptor expression for reified-generics targets.
    fn type_descriptor(&self, p: &Program, ty: &Type, tok: Tok) -> Result<String, LowerError>;

    // ------------------------------------------------------------------
    // File and scoping
    // ------------------------------------------------------------------

    /// Emit the file preamble and return the import fork and body writer.
    /// `deps` are the emitted names of modules this module imports.
    fn begin_file(&self, em: &mut Emitter, w: Wr, module_name: &str, deps: &[String])
        -> FilePieces;

    /// Open a class scope; returns the member body writer.
    fn open_class(&self, em: &mut Emitter, w: Wr, sig: &ClassSig) -> Result<Wr, LowerError>;

    /// Open a method or function scope; returns the body writer.
    fn open_method(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &MethodSig,
    ) -> Result<Wr, LowerError>;

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn declare_field(&self, em: &mut Emitter, w: Wr, p: &Program, sig: &FieldSig)
        -> Result<(), LowerError>;

    /// Declare a local; C-style default.
    fn declare_local(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        name: &str,
        ty: &Type,
        init: Option<&str>,
    ) -> Result<(), LowerError> {
        let ty_name = self.type_name(p, ty, Tok::default())?;
        match init {
            Some(rhs) => em.writeln(w, &format!("{} {} = {};", ty_name, name, rhs)),
            None => em.writeln(w, &format!("{} {};", ty_name, name)),
        }
        Ok(())
    }

    /// Declare the sealed datatype base; returns the writer for test
    /// predicates and destructors.
    fn datatype_base(&self, em: &mut Emitter, w: Wr, p: &Program, sig: &DatatypeSig)
        -> Result<Wr, LowerError>;

    /// Declare one constructor variant. Backends that require per-class
    /// files create them here.
    fn datatype_ctor(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &DatatypeSig,
        ctor: &CtorSig,
    ) -> Result<(), LowerError>;

    /// Declare a named destructor on the base, dispatching by variant.
    fn datatype_dtor(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &DatatypeSig,
        dtor: &DtorSig,
    ) -> Result<(), LowerError>;

    /// Declare a newtype alias.
    fn declare_newtype(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        name: &str,
        base: &Type,
        default: &str,
    ) -> Result<(), LowerError>;

    /// Declare a subset-type alias whose default is the witness value.
    fn declare_subset_type(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        name: &str,
        base: &Type,
        witness: &str,
    ) -> Result<(), LowerError>;

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn assign_stmt(&self, em: &mut Emitter, w: Wr, lhs: &str, rhs: &str) {
        em.writeln(w, &format!("{} = {};", lhs, rhs));
    }

    /// Assign a multi-out call to several left-hand sides. `out_tys` are the
    /// rendered out-parameter types, for targets that need casts when
    /// unpacking.
    fn multi_assign_stmt(
        &self,
        em: &mut Emitter,
        w: Wr,
        lhss: &[String],
        out_tys: &[String],
        call: &str,
    ) -> Result<(), LowerError>;

    fn if_block(&self, em: &mut Emitter, w: Wr, cond: &str) -> Wr {
        em.new_block(w, &format!("if ({})", cond), "{", "}", BraceStyle::SameLine)
    }

    fn else_block(&self, em: &mut Emitter, w: Wr) -> Wr {
        em.new_block(w, "else", "{", "}", BraceStyle::SameLine)
    }

    fn while_block(&self, em: &mut Emitter, w: Wr, label: Option<&str>, cond: &str) -> Wr {
        let header = match label {
            Some(l) => format!("{}: while ({})", l, cond),
            None => format!("while ({})", cond),
        };
        em.new_block(w, &header, "{", "}", BraceStyle::SameLine)
    }

    fn loop_block(&self, em: &mut Emitter, w: Wr, label: Option<&str>) -> Wr {
        self.while_block(em, w, label, "true")
    }

    fn for_range_block(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        var: &Param,
        lo: &str,
        hi: &str,
        up: bool,
    ) -> Result<Wr, LowerError>;

    fn foreach_block(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        var: &Param,
        collection: &str,
    ) -> Result<Wr, LowerError>;

    fn break_stmt(&self, em: &mut Emitter, w: Wr, label: Option<&str>) {
        match label {
            Some(l) => em.writeln(w, &format!("break {};", l)),
            None => em.writeln(w, "break;"),
        }
    }

    /// Jump back to a labeled loop head (tail-call rewrite).
    fn continue_stmt(&self, em: &mut Emitter, w: Wr, label: Option<&str>) {
        match label {
            Some(l) => em.writeln(w, &format!("continue {};", l)),
            None => em.writeln(w, "continue;"),
        }
    }

    fn return_stmt(&self, em: &mut Emitter, w: Wr, values: &[String]);

    fn print_stmt(&self, em: &mut Emitter, w: Wr, expr: &str);

    fn expr_stmt(&self, em: &mut Emitter, w: Wr, expr: &str) {
        em.writeln(w, &format!("{};", expr));
    }

    /// Statically unreachable code.
    fn absurd_stmt(&self, em: &mut Emitter, w: Wr, message: &str);

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn literal(&self, p: &Program, lit: &Lit, ty: &Type, tok: Tok) -> Result<String, LowerError>;

    fn unary(&self, op: UnOp, operand: &str, ty: &Type) -> String {
        match op {
            UnOp::Not => format!("(!{})", operand),
            UnOp::Neg => format!("(-{})", operand),
            UnOp::BitNot => format!("(~{})", operand),
        }
    }

    /// Native arithmetic/bitwise spelling with no numeric policy applied.
    fn arith_raw(&self, op: BinOp, a: &str, b: &str, ty: &Type) -> String;

    /// Comparison with the target's value-equality discipline.
    fn compare(&self, op: BinOp, a: &str, b: &str, ty: &Type) -> String;

    /// Euclidean division via the runtime library.
    fn euclid_div(&self, a: &str, b: &str, ty: &Type) -> String;

    /// Euclidean modulus via the runtime library.
    fn euclid_mod(&self, a: &str, b: &str, ty: &Type) -> String;

    /// Apply a `2^W - 1` mask, casting back when the target requires it.
    fn mask(&self, expr: &str, mask_hex: &str, ty: &Type) -> String;

    fn convert(
        &self,
        p: &Program,
        from: &Type,
        to: &Type,
        operand: &str,
        tok: Tok,
    ) -> Result<String, LowerError>;

    /// Sequence, set, or multiset display.
    fn collection_literal(
        &self,
        p: &Program,
        ty: &Type,
        elems: &[String],
        tok: Tok,
    ) -> Result<String, LowerError>;

    /// Map display.
    fn map_literal(
        &self,
        p: &Program,
        ty: &Type,
        pairs: &[(String, String)],
        tok: Tok,
    ) -> Result<String, LowerError>;

    /// One collection operation as a runtime-library call.
    fn collection_call(&self, op: CollOp, args: &[&str]) -> String;

    /// Class instance allocation.
    fn new_object(&self, decl_ref: &str, args: &[String]) -> String {
        format!("new {}({})", decl_ref, args.join(", "))
    }

    /// Array length along one dimension.
    fn array_length(&self, base: &str, dim: u32) -> String;

    fn array_select(&self, base: &str, indices: &[String]) -> String {
        let mut out = String::from(base);
        for idx in indices {
            out.push('[');
            out.push_str(idx);
            out.push(']');
        }
        out
    }

    /// Lambda expression; `body_ty` is the body's result type, for targets
    /// that need it spelled out.
    fn lambda(
        &self,
        p: &Program,
        params: &[Param],
        body_ty: &Type,
        body: &str,
    ) -> Result<String, LowerError>;

    /// Conditional in expression position; `ty` is the result type, for
    /// targets that spell this as a typed closure.
    fn ite(
        &self,
        _p: &Program,
        _ty: &Type,
        cond: &str,
        thn: &str,
        els: &str,
    ) -> Result<String, LowerError> {
        Ok(format!("(({}) ? ({}) : ({}))", cond, thn, els))
    }

    /// Let-binding in expression position; `ty` is the body's type.
    fn let_expr(
        &self,
        p: &Program,
        ty: &Type,
        var: &Param,
        rhs: &str,
        body: &str,
    ) -> Result<String, LowerError>;

    /// Application of an arrow-typed value; `ty` is the result type.
    fn apply(
        &self,
        _p: &Program,
        _ty: &Type,
        func: &str,
        args: &[String],
    ) -> Result<String, LowerError> {
        Ok(format!("({})({})", func, args.join(", ")))
    }

    fn call(&self, target: &str, args: &[String]) -> String {
        format!("{}({})", target, args.join(", "))
    }

    fn field_access(&self, obj: &str, field: &str) -> String {
        format!("{}.{}", obj, field)
    }

    /// Datatype value construction through the generated `create_` API.
    fn datatype_value(&self, decl_ref: &str, ctor: &CtorSig, args: &[String]) -> String;

    /// The generated default-instance companion of a datatype. Defaults of
    /// recursive datatypes go through this call rather than being inlined,
    /// which is what keeps default computation finite.
    fn default_companion(&self, decl_ref: &str) -> String {
        format!("{}.Default()", decl_ref)
    }

    /// Per-constructor test through the generated `is_` API.
    fn ctor_test(&self, operand: &str, ctor: &CtorSig) -> String;

    /// Named destructor read.
    fn destructor_get(&self, operand: &str, dtor_name: &str) -> String;

    fn this_expr(&self) -> &'static str {
        "this"
    }

    fn null_expr(&self, p: &Program, ty: &Type) -> Result<String, LowerError>;

    /// Bounded quantifier over a finite collection, via the runtime.
    fn quantifier(&self, forall: bool, collection: &str, pred_lambda: &str) -> String;

    /// Set comprehension via the runtime.
    fn set_comprehension(&self, collection: &str, filter_lambda: &str, term_lambda: &str)
        -> String;

    /// Map comprehension via the runtime.
    fn map_comprehension(
        &self,
        collection: &str,
        filter_lambda: &str,
        key_lambda: &str,
        value_lambda: &str,
    ) -> String;

    /// String re-escaped per the target's lexical rules.
    fn string_quote(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('"');
        for ch in s.chars() {
            escape_char_into(ch, &mut out);
        }
        out.push('"');
        out
    }

    // ------------------------------------------------------------------
    // Entry point and post-emit tooling
    // ------------------------------------------------------------------

    /// Emit the program entry point that invokes `main_ref`.
    fn emit_entry_point(&self, em: &mut Emitter, main_ref: &str) -> Result<(), LowerError>;

    /// Name and contents of the embedded runtime blob.
    fn runtime_blob(&self) -> (&'static str, &'static str);

    /// Invoke the target's native compiler over the emitted files.
    fn native_compile(&self, out_dir: &Path, files: &[PathBuf]) -> Result<(), LowerError>;

    /// Run the compiled program and capture its output.
    fn run(&self, out_dir: &Path) -> Result<RunOutput, LowerError>;
}

/// The shared non-raw escape table (§ string rules): every backend uses
/// these forms; none emits raw strings.
pub fn escape_char_into(ch: char, out: &mut String) {
    match ch {
        '\\' => out.push_str("\\\\"),
        '"' => out.push_str("\\\""),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\0' => out.push_str("\\0"),
        c if (c as u32) < 0x20 => {
            out.push_str(&format!("\\u{:04x}", c as u32));
        }
        c => out.push(c),
    }
}

/// Spawn a native tool with an explicit working directory, closed stdin, and
/// captured output. Non-zero exit becomes a `Tool` error carrying stderr;
/// the child is always waited on before its outputs are consumed.
pub fn run_tool(tool: &str, args: &[&str], cwd: &Path) -> Result<std::process::Output, LowerError> {
    let output = Command::new(tool)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(LowerError::Io)?;
    if !output.status.success() {
        return Err(LowerError::Tool {
            tool: tool.to_string(),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(output)
}

/// Run the compiled program itself. Unlike [`run_tool`], a non-zero exit is
/// a program outcome, not a tool failure; it is captured and surfaced with
/// the output.
pub fn run_program(tool: &str, args: &[&str], cwd: &Path) -> Result<RunOutput, LowerError> {
    let output = Command::new(tool)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(LowerError::Io)?;
    Ok(RunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        status: output.status.code().unwrap_or(-1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_table_is_non_raw() {
        let mut out = String::new();
        for ch in "a\"\\\n\t\u{1}".chars() {
            escape_char_into(ch, &mut out);
        }
        assert_eq!(out, "a\\\"\\\\\\n\\t\\u0001");
    }
}
