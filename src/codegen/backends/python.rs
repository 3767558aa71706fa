//! Python backend
//!
//! Emits one module file per source module. Python's own integers are
//! arbitrary-precision, so `int` and all bitvectors ride on native ints with
//! explicit masking; reals use the runtime's exact `Fraction`-backed type.
//! Generics are erased. Python has no labeled loops, so the tail-call
//! rewrite relies on the sentinel loop and labeled `break` is reported as
//! unsupported.
//!
//! Every emitted block starts with `pass` so empty bodies stay valid.

use std::path::{Path, PathBuf};

use super::super::backend::{
    run_program, Backend, Capabilities, ClassSig, CollOp, CtorSig, DatatypeSig, DtorSig,
    FieldSig, FilePieces, MethodSig, Param, RunOutput,
};
use super::super::numeric;
use super::super::writer::{BraceStyle, Emitter, Wr};
use super::super::LowerError;
use crate::options::TargetTag;
use crate::rir::{BinOp, DeclId, DeclKind, Lit, Program, Tok, Type};
use crate::runtime;

const RESERVED: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield", "match", "case", "self",
];

const CAPS: Capabilities = Capabilities {
    erased_generics: true,
    native_int_widths: &[],
    trait_collection_elements: true,
    native_codata: false,
    labeled_loops: false,
    max_tuple_arity: None,
    strings_are_code_units: true,
};

pub struct PythonBackend;

impl PythonBackend {
    pub fn new() -> Self {
        PythonBackend
    }

    fn block(&self, em: &mut Emitter, w: Wr, header: &str) -> Wr {
        let b = em.new_block(w, header, "", "", BraceStyle::SameLine);
        em.writeln(b, "pass");
        b
    }

    fn qualified(&self, p: &Program, decl: DeclId) -> String {
        let d = p.decl(decl);
        let module = p.module(d.module);
        let module_name = if module.is_default {
            "_module".to_string()
        } else {
            module.name.clone()
        };
        format!("{}.{}", module_name, self.sanitize(&d.name))
    }

    fn variant_body(&self, em: &mut Emitter, class_w: Wr, name: &str, ctor: &CtorSig) {
        let params: Vec<&str> = ctor.formals.iter().map(|f| f.name.as_str()).collect();
        let init = self.block(
            em,
            class_w,
            &format!("def __init__(self, {}):", params.join(", ")),
        );
        for f in &ctor.formals {
            em.writeln(init, &format!("self.{} = {}", f.name, f.name));
        }
        em.seal(init);

        let eq = self.block(em, class_w, "def __eq__(self, other):");
        if ctor.formals.is_empty() {
            em.writeln(eq, &format!("return isinstance(other, {})", name));
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| {
                    if ctor.lazy {
                        format!("self.{}.get() == other.{}.get()", f.name, f.name)
                    } else {
                        format!("self.{} == other.{}", f.name, f.name)
                    }
                })
                .collect();
            em.writeln(
                eq,
                &format!(
                    "return isinstance(other, {}) and {}",
                    name,
                    fields.join(" and ")
                ),
            );
        }
        em.seal(eq);

        let hash = self.block(em, class_w, "def __hash__(self):");
        if ctor.formals.is_empty() {
            em.writeln(hash, &format!("return hash(\"{}\")", ctor.name));
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| {
                    if ctor.lazy {
                        format!("self.{}.get()", f.name)
                    } else {
                        format!("self.{}", f.name)
                    }
                })
                .collect();
            em.writeln(hash, &format!("return hash(({},))", fields.join(", ")));
        }
        em.seal(hash);

        let repr = self.block(em, class_w, "def __repr__(self):");
        if ctor.formals.is_empty() {
            em.writeln(repr, &format!("return \"{}\"", ctor.name));
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| {
                    if ctor.lazy {
                        format!("_slate.str_(self.{}.get())", f.name)
                    } else {
                        format!("_slate.str_(self.{})", f.name)
                    }
                })
                .collect();
            em.writeln(
                repr,
                &format!(
                    "return \"{}(\" + \", \".join([{}]) + \")\"",
                    ctor.name,
                    fields.join(", ")
                ),
            );
        }
        em.seal(repr);
    }
}

impl Default for PythonBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for PythonBackend {
    fn tag(&self) -> TargetTag {
        TargetTag::Python
    }

    fn caps(&self) -> Capabilities {
        CAPS
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED
    }

    fn module_file(&self, module_name: &str) -> PathBuf {
        PathBuf::from(format!("{}.py", module_name))
    }

    fn type_name(&self, p: &Program, ty: &Type, tok: Tok) -> Result<String, LowerError> {
        // Python is untyped at this level; names only appear in comments and
        // diagnostics, except the proxy check which stays load-bearing.
        match ty {
            Type::Proxy => Err(LowerError::internal(
                "type naming",
                format!("unresolved type proxy at {}", tok),
            )),
            Type::UserDefined { decl, .. } => Ok(self.qualified(p, *decl)),
            other => Ok(other.to_string()),
        }
    }

    fn decl_ref(&self, p: &Program, decl: DeclId) -> Result<String, LowerError> {
        Ok(self.qualified(p, decl))
    }

    fn type_descriptor(&self, _p: &Program, _ty: &Type, _tok: Tok) -> Result<String, LowerError> {
        // Erased generics: descriptors are never consumed.
        Ok("None".to_string())
    }

    fn begin_file(
        &self,
        em: &mut Emitter,
        w: Wr,
        module_name: &str,
        deps: &[String],
    ) -> FilePieces {
        em.writeln(w, "# Generated by the Slate compiler. DO NOT EDIT.");
        em.writeln(w, "import slate_runtime as _slate");
        // Self-import keeps every declaration reference module-qualified.
        em.writeln(w, &format!("import {}", module_name));
        let imports = em.fork(w);
        for dep in deps {
            em.writeln(imports, &format!("import {}", dep));
        }
        em.blank(w);
        let body = em.fork(w);
        FilePieces { imports, body }
    }

    fn open_class(&self, em: &mut Emitter, w: Wr, sig: &ClassSig) -> Result<Wr, LowerError> {
        let bases = if sig.traits.is_empty() {
            String::new()
        } else {
            format!("({})", sig.traits.join(", "))
        };
        Ok(self.block(em, w, &format!("class {}{}:", sig.name, bases)))
    }

    fn open_method(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        sig: &MethodSig,
    ) -> Result<Wr, LowerError> {
        let mut params: Vec<String> = Vec::new();
        if !sig.is_static {
            params.push("self".to_string());
        }
        for param in &sig.ins {
            params.push(param.name.clone());
        }
        if sig.is_static {
            em.writeln(w, "@staticmethod");
        }
        let name = if sig.is_constructor {
            "__init__"
        } else {
            sig.name.as_str()
        };
        let body = self.block(em, w, &format!("def {}({}):", name, params.join(", ")));
        for (out, default) in sig.outs.iter().zip(&sig.out_defaults) {
            em.writeln(body, &format!("{} = {}", out.name, default));
        }
        Ok(body)
    }

    fn declare_field(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        sig: &FieldSig,
    ) -> Result<(), LowerError> {
        // Class attribute; instance fields are created on first assignment.
        match &sig.init {
            Some(init) => em.writeln(w, &format!("{} = {}", sig.name, init)),
            None => em.writeln(w, &format!("{} = None", sig.name)),
        }
        Ok(())
    }

    fn declare_local(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        name: &str,
        _ty: &Type,
        init: Option<&str>,
    ) -> Result<(), LowerError> {
        em.writeln(w, &format!("{} = {}", name, init.unwrap_or("None")));
        Ok(())
    }

    fn datatype_base(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &DatatypeSig,
    ) -> Result<Wr, LowerError> {
        let class_w = self.block(em, w, &format!("class {}:", sig.name));
        if sig.is_record {
            let ctor = &sig.ctors[0];
            self.variant_body(em, class_w, &sig.name, ctor);
            let params: Vec<&str> = ctor.formals.iter().map(|f| f.name.as_str()).collect();
            em.writeln(class_w, "@staticmethod");
            let create = self.block(
                em,
                class_w,
                &format!("def create_{}({}):", ctor.name, params.join(", ")),
            );
            em.writeln(
                create,
                &format!("return {}({})", sig.name, params.join(", ")),
            );
            em.seal(create);
            let test = self.block(em, class_w, &format!("def {}(self):", ctor.test_name));
            em.writeln(test, "return True");
            em.seal(test);
            for f in &ctor.formals {
                let dtor = self.block(em, class_w, &format!("def dtor_{}(self):", f.name));
                em.writeln(dtor, &format!("return self.{}", f.name));
                em.seal(dtor);
            }
        } else {
            for ctor in &sig.ctors {
                let params: Vec<&str> = ctor.formals.iter().map(|f| f.name.as_str()).collect();
                em.writeln(class_w, "@staticmethod");
                let create = self.block(
                    em,
                    class_w,
                    &format!("def create_{}({}):", ctor.name, params.join(", ")),
                );
                em.writeln(
                    create,
                    &format!("return {}_{}({})", sig.name, ctor.name, params.join(", ")),
                );
                em.seal(create);
                let test = self.block(em, class_w, &format!("def {}(self):", ctor.test_name));
                em.writeln(
                    test,
                    &format!("return isinstance(self, {}_{})", sig.name, ctor.name),
                );
                em.seal(test);
            }
        }
        let default_ctor = &sig.ctors[sig.default_ctor];
        let args: Vec<String> = if default_ctor.lazy {
            sig.default_args
                .iter()
                .map(|a| format!("_slate.Lazy(lambda: {})", a))
                .collect()
        } else {
            sig.default_args.clone()
        };
        em.writeln(class_w, "@staticmethod");
        let default = self.block(em, class_w, "def Default():");
        em.writeln(
            default,
            &format!(
                "return {}.create_{}({})",
                sig.name,
                default_ctor.name,
                args.join(", ")
            ),
        );
        em.seal(default);
        let _ = p;
        Ok(class_w)
    }

    fn datatype_ctor(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        sig: &DatatypeSig,
        ctor: &CtorSig,
    ) -> Result<(), LowerError> {
        let name = format!("{}_{}", sig.name, ctor.name);
        let class_w = self.block(em, w, &format!("class {}({}):", name, sig.name));
        self.variant_body(em, class_w, &name, ctor);
        em.seal(class_w);
        Ok(())
    }

    fn datatype_dtor(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        sig: &DatatypeSig,
        dtor: &DtorSig,
    ) -> Result<(), LowerError> {
        let lazy = sig.ctors.iter().any(|c| c.lazy);
        let body = self.block(em, w, &format!("def dtor_{}(self):", dtor.name));
        if lazy {
            em.writeln(body, &format!("return self.{}.get()", dtor.name));
        } else {
            em.writeln(body, &format!("return self.{}", dtor.name));
        }
        em.seal(body);
        Ok(())
    }

    fn declare_newtype(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        name: &str,
        _base: &Type,
        default: &str,
    ) -> Result<(), LowerError> {
        // Aliases erase; the default survives as a module-level function.
        let body = self.block(em, w, &format!("def {}_default():", name));
        em.writeln(body, &format!("return {}", default));
        em.seal(body);
        Ok(())
    }

    fn declare_subset_type(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        name: &str,
        base: &Type,
        witness: &str,
    ) -> Result<(), LowerError> {
        self.declare_newtype(em, w, p, name, base, witness)
    }

    fn assign_stmt(&self, em: &mut Emitter, w: Wr, lhs: &str, rhs: &str) {
        em.writeln(w, &format!("{} = {}", lhs, rhs));
    }

    fn multi_assign_stmt(
        &self,
        em: &mut Emitter,
        w: Wr,
        lhss: &[String],
        _out_tys: &[String],
        call: &str,
    ) -> Result<(), LowerError> {
        em.writeln(w, &format!("{} = {}", lhss.join(", "), call));
        Ok(())
    }

    fn if_block(&self, em: &mut Emitter, w: Wr, cond: &str) -> Wr {
        self.block(em, w, &format!("if {}:", cond))
    }

    fn else_block(&self, em: &mut Emitter, w: Wr) -> Wr {
        self.block(em, w, "else:")
    }

    fn while_block(&self, em: &mut Emitter, w: Wr, _label: Option<&str>, cond: &str) -> Wr {
        self.block(em, w, &format!("while {}:", cond))
    }

    fn loop_block(&self, em: &mut Emitter, w: Wr, _label: Option<&str>) -> Wr {
        self.block(em, w, "while True:")
    }

    fn for_range_block(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        var: &Param,
        lo: &str,
        hi: &str,
        up: bool,
    ) -> Result<Wr, LowerError> {
        let header = if up {
            format!("for {} in range({}, {}):", var.name, lo, hi)
        } else {
            format!("for {} in range(({}) - 1, ({}) - 1, -1):", var.name, lo, hi)
        };
        Ok(self.block(em, w, &header))
    }

    fn foreach_block(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        var: &Param,
        collection: &str,
    ) -> Result<Wr, LowerError> {
        Ok(self.block(
            em,
            w,
            &format!("for {} in ({}).elements():", var.name, collection),
        ))
    }

    fn break_stmt(&self, em: &mut Emitter, w: Wr, _label: Option<&str>) {
        em.writeln(w, "break");
    }

    fn continue_stmt(&self, em: &mut Emitter, w: Wr, _label: Option<&str>) {
        em.writeln(w, "continue");
    }

    fn return_stmt(&self, em: &mut Emitter, w: Wr, values: &[String]) {
        match values.len() {
            0 => em.writeln(w, "return"),
            1 => em.writeln(w, &format!("return {}", values[0])),
            _ => em.writeln(w, &format!("return ({})", values.join(", "))),
        }
    }

    fn print_stmt(&self, em: &mut Emitter, w: Wr, expr: &str) {
        em.writeln(w, &format!("_slate.print_({})", expr));
    }

    fn expr_stmt(&self, em: &mut Emitter, w: Wr, expr: &str) {
        em.writeln(w, expr);
    }

    fn absurd_stmt(&self, em: &mut Emitter, w: Wr, message: &str) {
        em.writeln(w, &format!("raise Exception({})", self.string_quote(message)));
    }

    fn literal(&self, _p: &Program, lit: &Lit, _ty: &Type, _tok: Tok) -> Result<String, LowerError> {
        Ok(match lit {
            Lit::Bool(true) => "True".to_string(),
            Lit::Bool(false) => "False".to_string(),
            Lit::Char(c) => match c {
                '"' => "\"\\\"\"".to_string(),
                '\\' => "\"\\\\\"".to_string(),
                '\n' => "\"\\n\"".to_string(),
                c => format!("\"{}\"", c),
            },
            Lit::Int(n) => n.to_string(),
            Lit::Real { mantissa, exponent } => format!(
                "_slate.real_of(\"{}\")",
                numeric::real_decimal_string(mantissa, *exponent)
            ),
            Lit::Bitvector { value, .. } => value.to_string(),
            Lit::Str(s) => format!("_slate.string_of({})", self.string_quote(s)),
            Lit::Null => "None".to_string(),
        })
    }

    fn unary(&self, op: crate::rir::UnOp, operand: &str, _ty: &Type) -> String {
        match op {
            crate::rir::UnOp::Not => format!("(not {})", operand),
            crate::rir::UnOp::Neg => format!("(-{})", operand),
            crate::rir::UnOp::BitNot => format!("(~{})", operand),
        }
    }

    fn arith_raw(&self, op: BinOp, a: &str, b: &str, _ty: &Type) -> String {
        match op {
            BinOp::Add => format!("({} + {})", a, b),
            BinOp::Sub => format!("({} - {})", a, b),
            BinOp::Mul => format!("({} * {})", a, b),
            BinOp::Div => format!("({} / {})", a, b),
            BinOp::Mod => format!("({} % {})", a, b),
            BinOp::And => format!("({} and {})", a, b),
            BinOp::Or => format!("({} or {})", a, b),
            BinOp::BitAnd => format!("({} & {})", a, b),
            BinOp::BitOr => format!("({} | {})", a, b),
            BinOp::BitXor => format!("({} ^ {})", a, b),
            BinOp::Shl => format!("({} << {})", a, b),
            BinOp::Shr => format!("({} >> {})", a, b),
            _ => format!("({} /* unexpected op */ {})", a, b),
        }
    }

    fn compare(&self, op: BinOp, a: &str, b: &str, _ty: &Type) -> String {
        let rel = match op {
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            _ => "==",
        };
        format!("({} {} {})", a, rel, b)
    }

    fn euclid_div(&self, a: &str, b: &str, _ty: &Type) -> String {
        format!("_slate.euclid_div({}, {})", a, b)
    }

    fn euclid_mod(&self, a: &str, b: &str, _ty: &Type) -> String {
        format!("_slate.euclid_mod({}, {})", a, b)
    }

    fn mask(&self, expr: &str, mask_hex: &str, _ty: &Type) -> String {
        format!("(({}) & 0x{})", expr, mask_hex)
    }

    fn convert(
        &self,
        p: &Program,
        from: &Type,
        to: &Type,
        operand: &str,
        tok: Tok,
    ) -> Result<String, LowerError> {
        match (from, to) {
            (Type::Int, Type::Real) => Ok(format!("_slate.real_of_int({})", operand)),
            (Type::Real, Type::Int) => Ok(format!("_slate.real_to_int({})", operand)),
            (Type::Int, Type::Bitvector { .. }) | (Type::Bitvector { .. }, Type::Int) => {
                Ok(operand.to_string())
            }
            (Type::Char, Type::Int) => Ok(format!("ord({})", operand)),
            (Type::Int, Type::Char) => Ok(format!("chr({})", operand)),
            (Type::UserDefined { decl, .. }, _) => {
                let d = p.decl(*decl);
                match &d.kind {
                    DeclKind::Newtype(nt) => self.convert(p, &nt.base, to, operand, tok),
                    DeclKind::SubsetType(st) => self.convert(p, &st.base, to, operand, tok),
                    _ => Ok(operand.to_string()),
                }
            }
            (_, Type::UserDefined { decl, .. }) => {
                let d = p.decl(*decl);
                match &d.kind {
                    DeclKind::Newtype(nt) => self.convert(p, from, &nt.base, operand, tok),
                    DeclKind::SubsetType(st) => self.convert(p, from, &st.base, operand, tok),
                    _ => Ok(operand.to_string()),
                }
            }
            _ => Ok(operand.to_string()),
        }
    }

    fn collection_literal(
        &self,
        _p: &Program,
        ty: &Type,
        elems: &[String],
        tok: Tok,
    ) -> Result<String, LowerError> {
        let ctor = match ty {
            Type::Seq(_) => "_slate.Seq.of",
            Type::Set(_) => "_slate.Set.of",
            Type::Multiset(_) => "_slate.Multiset.of",
            other => {
                return Err(LowerError::internal(
                    "collection display",
                    format!("display of non-collection type {} at {}", other, tok),
                ));
            }
        };
        Ok(format!("{}({})", ctor, elems.join(", ")))
    }

    fn map_literal(
        &self,
        _p: &Program,
        _ty: &Type,
        pairs: &[(String, String)],
        _tok: Tok,
    ) -> Result<String, LowerError> {
        let items: Vec<String> = pairs
            .iter()
            .map(|(k, v)| format!("({}, {})", k, v))
            .collect();
        Ok(format!("_slate.Map.of({})", items.join(", ")))
    }

    fn collection_call(&self, op: CollOp, args: &[&str]) -> String {
        match op {
            CollOp::Concat => format!("({}).concat({})", args[0], args[1]),
            CollOp::Union => format!("({}).union({})", args[0], args[1]),
            CollOp::Intersection => format!("({}).intersection({})", args[0], args[1]),
            CollOp::Difference => format!("({}).difference({})", args[0], args[1]),
            CollOp::Contains => format!("({}).contains({})", args[1], args[0]),
            CollOp::SeqIndex => format!("({}).select({})", args[0], args[1]),
            CollOp::MapIndex => format!("({}).get({})", args[0], args[1]),
            CollOp::SeqUpdate => format!("({}).update({}, {})", args[0], args[1], args[2]),
            CollOp::MapUpdate => format!("({}).put({}, {})", args[0], args[1], args[2]),
            CollOp::Take => format!("({}).take({})", args[0], args[1]),
            CollOp::Drop => format!("({}).drop({})", args[0], args[1]),
            CollOp::Subsequence => {
                format!("({}).subsequence({}, {})", args[0], args[1], args[2])
            }
            CollOp::Cardinality => format!("({}).cardinality()", args[0]),
            CollOp::MapKeys => format!("({}).key_set()", args[0]),
            CollOp::MapValues => format!("({}).value_set()", args[0]),
        }
    }

    fn array_select(&self, base: &str, indices: &[String]) -> String {
        let mut out = String::from(base);
        for idx in indices {
            out.push_str(&format!("[{}]", idx));
        }
        out
    }

    fn array_length(&self, base: &str, dim: u32) -> String {
        let mut path = String::from(base);
        for _ in 0..dim {
            path.push_str("[0]");
        }
        format!("len({})", path)
    }

    fn lambda(
        &self,
        _p: &Program,
        params: &[Param],
        _body_ty: &Type,
        body: &str,
    ) -> Result<String, LowerError> {
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        Ok(format!("(lambda {}: ({}))", names.join(", "), body))
    }

    fn ite(
        &self,
        _p: &Program,
        _ty: &Type,
        cond: &str,
        thn: &str,
        els: &str,
    ) -> Result<String, LowerError> {
        Ok(format!("(({}) if ({}) else ({}))", thn, cond, els))
    }

    fn let_expr(
        &self,
        _p: &Program,
        _ty: &Type,
        var: &Param,
        rhs: &str,
        body: &str,
    ) -> Result<String, LowerError> {
        Ok(format!("(lambda {}: ({}))({})", var.name, body, rhs))
    }

    fn new_object(&self, decl_ref: &str, args: &[String]) -> String {
        format!("{}({})", decl_ref, args.join(", "))
    }

    fn datatype_value(&self, decl_ref: &str, ctor: &CtorSig, args: &[String]) -> String {
        let wrapped: Vec<String> = if ctor.lazy {
            args.iter()
                .map(|a| format!("_slate.Lazy(lambda: {})", a))
                .collect()
        } else {
            args.to_vec()
        };
        format!("{}.create_{}({})", decl_ref, ctor.name, wrapped.join(", "))
    }

    fn ctor_test(&self, operand: &str, ctor: &CtorSig) -> String {
        format!("({}).{}()", operand, ctor.test_name)
    }

    fn destructor_get(&self, operand: &str, dtor_name: &str) -> String {
        format!("({}).dtor_{}()", operand, dtor_name)
    }

    fn this_expr(&self) -> &'static str {
        "self"
    }

    fn null_expr(&self, _p: &Program, _ty: &Type) -> Result<String, LowerError> {
        Ok("None".to_string())
    }

    fn quantifier(&self, forall: bool, collection: &str, pred_lambda: &str) -> String {
        let kind = if forall { "True" } else { "False" };
        format!("_slate.quantifier({}, {}, {})", collection, kind, pred_lambda)
    }

    fn set_comprehension(&self, collection: &str, filter_lambda: &str, term_lambda: &str) -> String {
        format!(
            "_slate.set_comprehension({}, {}, {})",
            collection, filter_lambda, term_lambda
        )
    }

    fn map_comprehension(
        &self,
        collection: &str,
        filter_lambda: &str,
        key_lambda: &str,
        value_lambda: &str,
    ) -> String {
        format!(
            "_slate.map_comprehension({}, {}, {}, {})",
            collection, filter_lambda, key_lambda, value_lambda
        )
    }

    fn emit_entry_point(&self, em: &mut Emitter, main_ref: &str) -> Result<(), LowerError> {
        let file = em.new_file("program.py");
        em.writeln(file, "# Generated by the Slate compiler. DO NOT EDIT.");
        let module = main_ref.split('.').next().unwrap_or("_module");
        em.writeln(file, &format!("import {}", module));
        em.blank(file);
        let guard = self.block(em, file, "if __name__ == \"__main__\":");
        em.writeln(guard, &format!("{}()", main_ref));
        em.seal(guard);
        Ok(())
    }

    fn runtime_blob(&self) -> (&'static str, &'static str) {
        ("slate_runtime.py", runtime::runtime_source(TargetTag::Python))
    }

    fn native_compile(&self, _out_dir: &Path, _files: &[PathBuf]) -> Result<(), LowerError> {
        // Interpreted target; nothing to invoke.
        Ok(())
    }

    fn run(&self, out_dir: &Path) -> Result<RunOutput, LowerError> {
        run_program("python3", &["program.py"], out_dir)
    }
}
