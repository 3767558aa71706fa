//! JavaScript backend
//!
//! Emits CommonJS modules for Node: each source module becomes one file
//! whose declarations hang off a module object (`const Mod = module.exports`),
//! so references are uniformly `Mod.Decl` inside and outside the file.
//! Labeled loops are native. All integers and bitvectors are `BigInt`, so
//! every bitvector is big-integer backed and masked; reals use the runtime's
//! exact rational type. Generics are erased.

use std::path::{Path, PathBuf};

use super::super::backend::{
    run_program, Backend, Capabilities, ClassSig, CollOp, CtorSig, DatatypeSig, DtorSig,
    FieldSig, FilePieces, MethodSig, Param, RunOutput,
};
use super::super::numeric;
use super::super::writer::{BraceStyle, Emitter, Wr};
use super::super::LowerError;
use crate::options::TargetTag;
use crate::rir::{BinOp, DeclId, Lit, Program, Tok, Type, UnOp};
use crate::runtime;

const RESERVED: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield", "arguments",
    "eval",
];

const CAPS: Capabilities = Capabilities {
    erased_generics: true,
    native_int_widths: &[],
    trait_collection_elements: true,
    native_codata: false,
    labeled_loops: true,
    max_tuple_arity: None,
    strings_are_code_units: true,
};

pub struct JsBackend;

impl JsBackend {
    pub fn new() -> Self {
        JsBackend
    }

    fn module_of(&self, p: &Program, decl: DeclId) -> String {
        let module = p.module(p.decl(decl).module);
        if module.is_default {
            "_module".to_string()
        } else {
            module.name.clone()
        }
    }

    fn variant_body(&self, em: &mut Emitter, class_w: Wr, ctor: &CtorSig) {
        let params: Vec<&str> = ctor.formals.iter().map(|f| f.name.as_str()).collect();
        let init = em.new_block(
            class_w,
            &format!("constructor({})", params.join(", ")),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        for f in &ctor.formals {
            em.writeln(init, &format!("this.{} = {};", f.name, f.name));
        }
        em.seal(init);

        let force = |field: &str| {
            if ctor.lazy {
                format!("this.{}.get()", field)
            } else {
                format!("this.{}", field)
            }
        };

        let eq = em.new_block(
            class_w,
            "_equals(other)",
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(eq, "if (other === null || other.constructor !== this.constructor) return false;");
        if ctor.formals.is_empty() {
            em.writeln(eq, "return true;");
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| {
                    if ctor.lazy {
                        format!(
                            "_slate.equals(this.{}.get(), other.{}.get())",
                            f.name, f.name
                        )
                    } else {
                        format!("_slate.equals(this.{}, other.{})", f.name, f.name)
                    }
                })
                .collect();
            em.writeln(eq, &format!("return {};", fields.join(" && ")));
        }
        em.seal(eq);

        let repr = em.new_block(class_w, "toString()", "{", "}", BraceStyle::SameLine);
        if ctor.formals.is_empty() {
            em.writeln(repr, &format!("return \"{}\";", ctor.name));
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| format!("_slate.str({})", force(&f.name)))
                .collect();
            em.writeln(
                repr,
                &format!(
                    "return \"{}(\" + [{}].join(\", \") + \")\";",
                    ctor.name,
                    fields.join(", ")
                ),
            );
        }
        em.seal(repr);
    }
}

impl Default for JsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for JsBackend {
    fn tag(&self) -> TargetTag {
        TargetTag::JavaScript
    }

    fn caps(&self) -> Capabilities {
        CAPS
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED
    }

    fn module_file(&self, module_name: &str) -> PathBuf {
        PathBuf::from(format!("{}.js", module_name))
    }

    fn type_name(&self, p: &Program, ty: &Type, tok: Tok) -> Result<String, LowerError> {
        match ty {
            Type::Proxy => Err(LowerError::internal(
                "type naming",
                format!("unresolved type proxy at {}", tok),
            )),
            Type::UserDefined { decl, .. } => {
                Ok(format!("{}.{}", self.module_of(p, *decl), self.sanitize(&p.decl(*decl).name)))
            }
            other => Ok(other.to_string()),
        }
    }

    fn decl_ref(&self, p: &Program, decl: DeclId) -> Result<String, LowerError> {
        Ok(format!(
            "{}.{}",
            self.module_of(p, decl),
            self.sanitize(&p.decl(decl).name)
        ))
    }

    fn type_descriptor(&self, _p: &Program, _ty: &Type, _tok: Tok) -> Result<String, LowerError> {
        Ok("null".to_string())
    }

    fn begin_file(
        &self,
        em: &mut Emitter,
        w: Wr,
        module_name: &str,
        deps: &[String],
    ) -> FilePieces {
        em.writeln(w, "// Generated by the Slate compiler. DO NOT EDIT.");
        em.writeln(w, "\"use strict\";");
        em.writeln(w, "const _slate = require(\"./slate_runtime.js\");");
        let imports = em.fork(w);
        for dep in deps {
            em.writeln(imports, &format!("const {} = require(\"./{}.js\");", dep, dep));
        }
        em.writeln(w, &format!("const {} = module.exports;", module_name));
        em.blank(w);
        let body = em.fork(w);
        FilePieces { imports, body }
    }

    fn open_class(&self, em: &mut Emitter, w: Wr, sig: &ClassSig) -> Result<Wr, LowerError> {
        // Traits are structural at runtime; no extends clause is emitted.
        Ok(em.new_block(
            w,
            &format!("{}.{} = class", sig.module, sig.name),
            "{",
            "};",
            BraceStyle::SameLine,
        ))
    }

    fn open_method(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        sig: &MethodSig,
    ) -> Result<Wr, LowerError> {
        let params: Vec<&str> = sig.ins.iter().map(|p| p.name.as_str()).collect();
        let header = if sig.is_constructor {
            format!("constructor({})", params.join(", "))
        } else if sig.is_static {
            format!("static {}({})", sig.name, params.join(", "))
        } else {
            format!("{}({})", sig.name, params.join(", "))
        };
        let body = em.new_block(w, &header, "{", "}", BraceStyle::SameLine);
        for (out, default) in sig.outs.iter().zip(&sig.out_defaults) {
            em.writeln(body, &format!("let {} = {};", out.name, default));
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
        let prefix = if sig.is_static { "static " } else { "" };
        match &sig.init {
            Some(init) => em.writeln(w, &format!("{}{} = {};", prefix, sig.name, init)),
            None => em.writeln(w, &format!("{}{} = null;", prefix, sig.name)),
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
        em.writeln(w, &format!("let {} = {};", name, init.unwrap_or("null")));
        Ok(())
    }

    fn datatype_base(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        sig: &DatatypeSig,
    ) -> Result<Wr, LowerError> {
        let class_w = em.new_block(
            w,
            &format!("{}.{} = class", sig.module, sig.name),
            "{",
            "};",
            BraceStyle::SameLine,
        );
        if sig.is_record {
            let ctor = &sig.ctors[0];
            self.variant_body(em, class_w, ctor);
            let params: Vec<&str> = ctor.formals.iter().map(|f| f.name.as_str()).collect();
            let create = em.new_block(
                class_w,
                &format!("static create_{}({})", ctor.name, params.join(", ")),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            em.writeln(
                create,
                &format!("return new {}.{}({});", sig.module, sig.name, params.join(", ")),
            );
            em.seal(create);
            let test = em.new_block(
                class_w,
                &format!("{}()", ctor.test_name),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            em.writeln(test, "return true;");
            em.seal(test);
            for f in &ctor.formals {
                let dtor = em.new_block(
                    class_w,
                    &format!("dtor_{}()", f.name),
                    "{",
                    "}",
                    BraceStyle::SameLine,
                );
                em.writeln(dtor, &format!("return this.{};", f.name));
                em.seal(dtor);
            }
        } else {
            for ctor in &sig.ctors {
                let params: Vec<&str> = ctor.formals.iter().map(|f| f.name.as_str()).collect();
                let create = em.new_block(
                    class_w,
                    &format!("static create_{}({})", ctor.name, params.join(", ")),
                    "{",
                    "}",
                    BraceStyle::SameLine,
                );
                em.writeln(
                    create,
                    &format!(
                        "return new {}.{}_{}({});",
                        sig.module,
                        sig.name,
                        ctor.name,
                        params.join(", ")
                    ),
                );
                em.seal(create);
                let test = em.new_block(
                    class_w,
                    &format!("{}()", ctor.test_name),
                    "{",
                    "}",
                    BraceStyle::SameLine,
                );
                em.writeln(
                    test,
                    &format!(
                        "return this instanceof {}.{}_{};",
                        sig.module, sig.name, ctor.name
                    ),
                );
                em.seal(test);
            }
        }
        let default_ctor = &sig.ctors[sig.default_ctor];
        let args: Vec<String> = if default_ctor.lazy {
            sig.default_args
                .iter()
                .map(|a| format!("_slate.lazy(() => {})", a))
                .collect()
        } else {
            sig.default_args.clone()
        };
        let default = em.new_block(class_w, "static Default()", "{", "}", BraceStyle::SameLine);
        em.writeln(
            default,
            &format!(
                "return {}.{}.create_{}({});",
                sig.module,
                sig.name,
                default_ctor.name,
                args.join(", ")
            ),
        );
        em.seal(default);
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
        let class_w = em.new_block(
            w,
            &format!(
                "{}.{}_{} = class extends {}.{}",
                sig.module, sig.name, ctor.name, sig.module, sig.name
            ),
            "{",
            "};",
            BraceStyle::SameLine,
        );
        self.variant_body(em, class_w, ctor);
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
        let body = em.new_block(
            w,
            &format!("dtor_{}()", dtor.name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        if lazy {
            em.writeln(body, &format!("return this.{}.get();", dtor.name));
        } else {
            em.writeln(body, &format!("return this.{};", dtor.name));
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
        em.writeln(w, &format!("// newtype {}", name));
        em.writeln(w, &format!("// default: {}", default));
        Ok(())
    }

    fn declare_subset_type(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        name: &str,
        _base: &Type,
        witness: &str,
    ) -> Result<(), LowerError> {
        em.writeln(w, &format!("// subset type {}", name));
        em.writeln(w, &format!("// witness: {}", witness));
        Ok(())
    }

    fn multi_assign_stmt(
        &self,
        em: &mut Emitter,
        w: Wr,
        lhss: &[String],
        _out_tys: &[String],
        call: &str,
    ) -> Result<(), LowerError> {
        em.writeln(w, &format!("[{}] = {};", lhss.join(", "), call));
        Ok(())
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
            format!(
                "for (let {} = {}; {} < {}; {}++)",
                var.name, lo, var.name, hi, var.name
            )
        } else {
            format!(
                "for (let {} = ({}) - 1n; {} >= {}; {}--)",
                var.name, lo, var.name, hi, var.name
            )
        };
        Ok(em.new_block(w, &header, "{", "}", BraceStyle::SameLine))
    }

    fn foreach_block(
        &self,
        em: &mut Emitter,
        w: Wr,
        _p: &Program,
        var: &Param,
        collection: &str,
    ) -> Result<Wr, LowerError> {
        Ok(em.new_block(
            w,
            &format!("for (const {} of ({}).elements())", var.name, collection),
            "{",
            "}",
            BraceStyle::SameLine,
        ))
    }

    fn return_stmt(&self, em: &mut Emitter, w: Wr, values: &[String]) {
        match values.len() {
            0 => em.writeln(w, "return;"),
            1 => em.writeln(w, &format!("return {};", values[0])),
            _ => em.writeln(w, &format!("return [{}];", values.join(", "))),
        }
    }

    fn print_stmt(&self, em: &mut Emitter, w: Wr, expr: &str) {
        em.writeln(w, &format!("_slate.print({});", expr));
    }

    fn absurd_stmt(&self, em: &mut Emitter, w: Wr, message: &str) {
        em.writeln(w, &format!("throw new Error({});", self.string_quote(message)));
    }

    fn literal(&self, _p: &Program, lit: &Lit, _ty: &Type, _tok: Tok) -> Result<String, LowerError> {
        Ok(match lit {
            Lit::Bool(b) => b.to_string(),
            Lit::Char(c) => match c {
                '"' => "\"\\\"\"".to_string(),
                '\\' => "\"\\\\\"".to_string(),
                '\n' => "\"\\n\"".to_string(),
                c => format!("\"{}\"", c),
            },
            Lit::Int(n) => format!("{}n", n),
            Lit::Real { mantissa, exponent } => format!(
                "_slate.realOf(\"{}\")",
                numeric::real_decimal_string(mantissa, *exponent)
            ),
            Lit::Bitvector { value, .. } => format!("{}n", value),
            Lit::Str(s) => format!("_slate.stringOf({})", self.string_quote(s)),
            Lit::Null => "null".to_string(),
        })
    }

    fn unary(&self, op: UnOp, operand: &str, _ty: &Type) -> String {
        match op {
            UnOp::Not => format!("(!{})", operand),
            UnOp::Neg => format!("(-{})", operand),
            UnOp::BitNot => format!("(~{})", operand),
        }
    }

    fn arith_raw(&self, op: BinOp, a: &str, b: &str, _ty: &Type) -> String {
        match op {
            BinOp::Add => format!("({} + {})", a, b),
            BinOp::Sub => format!("({} - {})", a, b),
            BinOp::Mul => format!("({} * {})", a, b),
            BinOp::Div => format!("({} / {})", a, b),
            BinOp::Mod => format!("({} % {})", a, b),
            BinOp::And => format!("({} && {})", a, b),
            BinOp::Or => format!("({} || {})", a, b),
            BinOp::BitAnd => format!("({} & {})", a, b),
            BinOp::BitOr => format!("({} | {})", a, b),
            BinOp::BitXor => format!("({} ^ {})", a, b),
            BinOp::Shl => format!("({} << {})", a, b),
            BinOp::Shr => format!("({} >> {})", a, b),
            _ => format!("({} /* unexpected op */ {})", a, b),
        }
    }

    fn compare(&self, op: BinOp, a: &str, b: &str, ty: &Type) -> String {
        let structural = matches!(
            ty,
            Type::UserDefined { .. }
                | Type::Seq(_)
                | Type::Set(_)
                | Type::Multiset(_)
                | Type::Map(_, _)
        );
        match op {
            BinOp::Eq if structural => format!("_slate.equals({}, {})", a, b),
            BinOp::Neq if structural => format!("(!_slate.equals({}, {}))", a, b),
            BinOp::Eq => format!("({} === {})", a, b),
            BinOp::Neq => format!("({} !== {})", a, b),
            BinOp::Lt => format!("({} < {})", a, b),
            BinOp::Le => format!("({} <= {})", a, b),
            BinOp::Gt => format!("({} > {})", a, b),
            BinOp::Ge => format!("({} >= {})", a, b),
            _ => format!("({} === {})", a, b),
        }
    }

    fn euclid_div(&self, a: &str, b: &str, _ty: &Type) -> String {
        format!("_slate.euclidDiv({}, {})", a, b)
    }

    fn euclid_mod(&self, a: &str, b: &str, _ty: &Type) -> String {
        format!("_slate.euclidMod({}, {})", a, b)
    }

    fn mask(&self, expr: &str, mask_hex: &str, _ty: &Type) -> String {
        format!("(({}) & 0x{}n)", expr, mask_hex)
    }

    fn convert(
        &self,
        p: &Program,
        from: &Type,
        to: &Type,
        operand: &str,
        _tok: Tok,
    ) -> Result<String, LowerError> {
        let _ = p;
        match (from, to) {
            (Type::Int, Type::Real) => Ok(format!("_slate.realOfInt({})", operand)),
            (Type::Real, Type::Int) => Ok(format!("({}).toInt()", operand)),
            (Type::Char, Type::Int) => Ok(format!("BigInt(({}).codePointAt(0))", operand)),
            (Type::Int, Type::Char) => {
                Ok(format!("String.fromCodePoint(Number({}))", operand))
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
            .map(|(k, v)| format!("[{}, {}]", k, v))
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
            CollOp::MapKeys => format!("({}).keySet()", args[0]),
            CollOp::MapValues => format!("({}).valueSet()", args[0]),
        }
    }

    fn array_select(&self, base: &str, indices: &[String]) -> String {
        let mut out = String::from(base);
        for idx in indices {
            out.push_str(&format!("[Number({})]", idx));
        }
        out
    }

    fn array_length(&self, base: &str, dim: u32) -> String {
        let mut path = String::from(base);
        for _ in 0..dim {
            path.push_str("[0]");
        }
        format!("BigInt({}.length)", path)
    }

    fn lambda(
        &self,
        _p: &Program,
        params: &[Param],
        _body_ty: &Type,
        body: &str,
    ) -> Result<String, LowerError> {
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        Ok(format!("(({}) => ({}))", names.join(", "), body))
    }

    fn let_expr(
        &self,
        _p: &Program,
        _ty: &Type,
        var: &Param,
        rhs: &str,
        body: &str,
    ) -> Result<String, LowerError> {
        Ok(format!("((({}) => ({}))({}))", var.name, body, rhs))
    }

    fn datatype_value(&self, decl_ref: &str, ctor: &CtorSig, args: &[String]) -> String {
        let wrapped: Vec<String> = if ctor.lazy {
            args.iter()
                .map(|a| format!("_slate.lazy(() => {})", a))
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

    fn null_expr(&self, _p: &Program, _ty: &Type) -> Result<String, LowerError> {
        Ok("null".to_string())
    }

    fn quantifier(&self, forall: bool, collection: &str, pred_lambda: &str) -> String {
        format!("_slate.quantifier({}, {}, {})", collection, forall, pred_lambda)
    }

    fn set_comprehension(&self, collection: &str, filter_lambda: &str, term_lambda: &str) -> String {
        format!(
            "_slate.setComprehension({}, {}, {})",
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
            "_slate.mapComprehension({}, {}, {}, {})",
            collection, filter_lambda, key_lambda, value_lambda
        )
    }

    fn emit_entry_point(&self, em: &mut Emitter, main_ref: &str) -> Result<(), LowerError> {
        let file = em.new_file("program.js");
        em.writeln(file, "// Generated by the Slate compiler. DO NOT EDIT.");
        em.writeln(file, "\"use strict\";");
        let module = main_ref.split('.').next().unwrap_or("_module");
        em.writeln(file, &format!("const {} = require(\"./{}.js\");", module, module));
        em.writeln(file, &format!("{}();", main_ref));
        Ok(())
    }

    fn runtime_blob(&self) -> (&'static str, &'static str) {
        (
            "slate_runtime.js",
            runtime::runtime_source(TargetTag::JavaScript),
        )
    }

    fn native_compile(&self, _out_dir: &Path, _files: &[PathBuf]) -> Result<(), LowerError> {
        Ok(())
    }

    fn run(&self, out_dir: &Path) -> Result<RunOutput, LowerError> {
        run_program("node", &["program.js"], out_dir)
    }
}
