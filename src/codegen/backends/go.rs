//! Go backend
//!
//! Emits a single `package main` across all module files with flattened
//! names (`Mod_Decl`), so the artifact set builds with one `go build`.
//! Classes become structs with a `New_` allocator and an `init_` method;
//! datatypes become an interface plus one struct per variant, each variant
//! implementing every test and destructor (destructors of foreign variants
//! panic, which is the absurd case). Static members are free functions.
//!
//! `int` rides on the runtime's immutable big-integer value; bitvectors up
//! to 64 bits use the unsigned native types with masking. Generics erase to
//! `any`, and expression-position conditionals and lets become typed
//! immediately-invoked closures because Go has no expression forms for
//! them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::super::backend::{
    run_program, run_tool, Backend, Capabilities, ClassSig, CollOp, CtorSig, DatatypeSig,
    DtorSig, FieldSig, FilePieces, MethodSig, Param, RunOutput,
};
use super::super::numeric;
use super::super::writer::{BraceStyle, Emitter, Wr};
use super::super::LowerError;
use crate::options::TargetTag;
use crate::rir::{BinOp, DeclId, DeclKind, Lit, Program, Tok, Type, UnOp};
use crate::runtime;

const RESERVED: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range",
    "return", "select", "struct", "switch", "type", "var", "any", "true", "false", "nil", "len",
    "cap", "new", "make", "append", "panic", "print", "println", "string", "int", "rune", "byte",
    "bool", "error", "main",
];

const CAPS: Capabilities = Capabilities {
    erased_generics: true,
    native_int_widths: &[8, 16, 32, 64],
    trait_collection_elements: true,
    native_codata: false,
    labeled_loops: true,
    max_tuple_arity: None,
    strings_are_code_units: true,
};

struct GoClass {
    name: String,
    fields: Wr,
    /// Instance-field initializers deferred into the constructor.
    pending_inits: Vec<(String, String)>,
}

pub struct GoBackend {
    classes: RefCell<HashMap<Wr, GoClass>>,
    /// Last `if` condition per parent writer; Go cannot attach an `else` to
    /// an already-closed block, so the else branch re-tests the negation.
    /// Conditions are pure expressions, so the re-test is sound.
    last_cond: RefCell<HashMap<Wr, String>>,
}

impl GoBackend {
    pub fn new() -> Self {
        GoBackend {
            classes: RefCell::new(HashMap::new()),
            last_cond: RefCell::new(HashMap::new()),
        }
    }

    fn flat_name(&self, p: &Program, decl: DeclId) -> String {
        let d = p.decl(decl);
        let module = p.module(d.module);
        let name = self.sanitize(&d.name);
        if module.is_default {
            name
        } else {
            format!("{}_{}", module.name, name)
        }
    }

    fn native_ty(&self, width: u32) -> Option<&'static str> {
        match numeric::native_width_for(width, &CAPS) {
            Some(8) => Some("uint8"),
            Some(16) => Some("uint16"),
            Some(32) => Some("uint32"),
            Some(64) => Some("uint64"),
            _ => None,
        }
    }

    fn dtor_list(&self, sig: &DatatypeSig) -> Vec<(String, Type, Vec<String>)> {
        let mut order: Vec<String> = Vec::new();
        let mut map: HashMap<String, (Type, Vec<String>)> = HashMap::new();
        for ctor in &sig.ctors {
            for f in &ctor.formals {
                map.entry(f.name.clone())
                    .or_insert_with(|| {
                        order.push(f.name.clone());
                        (f.ty.clone(), Vec::new())
                    })
                    .1
                    .push(ctor.name.clone());
            }
        }
        order
            .into_iter()
            .map(|n| {
                let (ty, ctors) = map.remove(&n).expect("dtor recorded");
                (n, ty, ctors)
            })
            .collect()
    }
}

impl Default for GoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for GoBackend {
    fn tag(&self) -> TargetTag {
        TargetTag::Go
    }

    fn caps(&self) -> Capabilities {
        CAPS
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED
    }

    fn module_file(&self, module_name: &str) -> PathBuf {
        PathBuf::from(format!("{}.go", module_name))
    }

    fn type_name(&self, p: &Program, ty: &Type, tok: Tok) -> Result<String, LowerError> {
        match ty {
            Type::Bool => Ok("bool".to_string()),
            Type::Char => Ok("rune".to_string()),
            Type::Int => Ok("SlateInt".to_string()),
            Type::Real => Ok("SlateReal".to_string()),
            Type::Bitvector { width, .. } => Ok(self
                .native_ty(*width)
                .map(|t| t.to_string())
                .unwrap_or_else(|| "SlateInt".to_string())),
            Type::Seq(_) => Ok("SlateSeq".to_string()),
            Type::Set(_) => Ok("SlateSet".to_string()),
            Type::Multiset(_) => Ok("SlateMultiset".to_string()),
            Type::Map(_, _) => Ok("SlateMap".to_string()),
            Type::Array { rank, elem } => {
                let elem_name = self.type_name(p, elem, tok)?;
                Ok(format!("{}{}", "[]".repeat(*rank as usize), elem_name))
            }
            Type::UserDefined { decl, .. } => {
                let d = p.decl(*decl);
                match &d.kind {
                    DeclKind::Newtype(nt) => self.type_name(p, &nt.base, tok),
                    DeclKind::SubsetType(st) => self.type_name(p, &st.base, tok),
                    DeclKind::Class(_) | DeclKind::Trait(_) | DeclKind::Iterator(_) => {
                        Ok(format!("*{}", self.flat_name(p, *decl)))
                    }
                    DeclKind::Datatype(_) => Ok(self.flat_name(p, *decl)),
                }
            }
            Type::Arrow { ins, out } => {
                let mut args: Vec<String> = Vec::new();
                for t in ins {
                    args.push(self.type_name(p, t, tok)?);
                }
                Ok(format!(
                    "func({}) {}",
                    args.join(", "),
                    self.type_name(p, out, tok)?
                ))
            }
            Type::TypeParam(_) => Ok("any".to_string()),
            Type::Proxy => Err(LowerError::internal(
                "type naming",
                format!("unresolved type proxy at {}", tok),
            )),
        }
    }

    fn decl_ref(&self, p: &Program, decl: DeclId) -> Result<String, LowerError> {
        Ok(self.flat_name(p, decl))
    }

    fn decl_local_name(&self, p: &Program, decl: DeclId) -> String {
        self.flat_name(p, decl)
    }

    fn static_ref(&self, decl_ref: &str, member: &str) -> String {
        format!("{}_{}", decl_ref, member)
    }

    fn type_descriptor(&self, _p: &Program, _ty: &Type, _tok: Tok) -> Result<String, LowerError> {
        Ok("nil".to_string())
    }

    fn begin_file(
        &self,
        em: &mut Emitter,
        w: Wr,
        module_name: &str,
        _deps: &[String],
    ) -> FilePieces {
        em.writeln(w, "// Generated by the Slate compiler. DO NOT EDIT.");
        em.writeln(w, &format!("// Module: {}", module_name));
        em.writeln(w, "package main");
        em.blank(w);
        // Same package throughout; nothing to import.
        let imports = em.fork(w);
        let body = em.fork(w);
        FilePieces { imports, body }
    }

    fn open_class(&self, em: &mut Emitter, w: Wr, sig: &ClassSig) -> Result<Wr, LowerError> {
        let struct_block = em.new_block(
            w,
            &format!("type {} struct", sig.name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.blank(w);
        let methods = em.fork(w);
        self.classes.borrow_mut().insert(
            methods,
            GoClass {
                name: sig.name.clone(),
                fields: struct_block,
                pending_inits: Vec::new(),
            },
        );
        Ok(methods)
    }

    fn open_method(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &MethodSig,
    ) -> Result<Wr, LowerError> {
        let mut params: Vec<String> = Vec::new();
        for param in &sig.ins {
            params.push(format!(
                "{} {}",
                param.name,
                self.type_name(p, &param.ty, Tok::default())?
            ));
        }
        let mut outs: Vec<String> = Vec::new();
        if let Some(result) = &sig.result {
            outs.push(self.type_name(p, result, Tok::default())?);
        } else {
            for out in &sig.outs {
                outs.push(format!(
                    "{} {}",
                    out.name,
                    self.type_name(p, &out.ty, Tok::default())?
                ));
            }
        }
        let ret = match outs.len() {
            0 => String::new(),
            1 if sig.result.is_some() => format!(" {}", outs[0]),
            _ => format!(" ({})", outs.join(", ")),
        };

        if sig.is_constructor {
            // Allocator wrapper plus an init method the driver fills.
            let arg_names: Vec<&str> = sig.ins.iter().map(|p| p.name.as_str()).collect();
            let wrapper = em.new_block(
                w,
                &format!("func New_{}({}) *{}", sig.enclosing, params.join(", "), sig.enclosing),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            em.writeln(wrapper, &format!("_this := &{}{{}}", sig.enclosing));
            em.writeln(wrapper, &format!("_this.init_({})", arg_names.join(", ")));
            em.writeln(wrapper, "return _this");
            em.seal(wrapper);
            em.blank(w);
            let body = em.new_block(
                w,
                &format!("func (_this *{}) init_({})", sig.enclosing, params.join(", ")),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            if let Some(class) = self.classes.borrow().get(&w) {
                for (field, init) in &class.pending_inits {
                    em.writeln(body, &format!("_this.{} = {}", field, init));
                }
            }
            return Ok(body);
        }

        let header = if sig.is_static {
            format!(
                "func {}_{}({}){}",
                sig.enclosing,
                sig.name,
                params.join(", "),
                ret
            )
        } else {
            format!(
                "func (_this *{}) {}({}){}",
                sig.enclosing,
                sig.name,
                params.join(", "),
                ret
            )
        };
        let body = em.new_block(w, &header, "{", "}", BraceStyle::SameLine);
        for (out, default) in sig.outs.iter().zip(&sig.out_defaults) {
            em.writeln(body, &format!("{} = {}", out.name, default));
        }
        Ok(body)
    }

    fn declare_field(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &FieldSig,
    ) -> Result<(), LowerError> {
        let ty = self.type_name(p, &sig.ty, Tok::default())?;
        let mut classes = self.classes.borrow_mut();
        let class = classes.get_mut(&w).ok_or_else(|| {
            LowerError::internal("field declaration", "field outside a class scope")
        })?;
        if sig.is_static {
            match &sig.init {
                Some(init) => em.writeln(
                    w,
                    &format!("var {}_{} {} = {}", class.name, sig.name, ty, init),
                ),
                None => em.writeln(w, &format!("var {}_{} {}", class.name, sig.name, ty)),
            }
        } else {
            em.writeln(class.fields, &format!("{} {}", sig.name, ty));
            if let Some(init) = &sig.init {
                class.pending_inits.push((sig.name.clone(), init.clone()));
            }
        }
        Ok(())
    }

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
            Some(rhs) => {
                em.writeln(w, &format!("var {} {} = {}", name, ty_name, rhs));
            }
            None => em.writeln(w, &format!("var {} {}", name, ty_name)),
        }
        em.writeln(w, &format!("_ = {}", name));
        Ok(())
    }

    fn datatype_base(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &DatatypeSig,
    ) -> Result<Wr, LowerError> {
        let iface = em.new_block(
            w,
            &format!("type {} interface", sig.name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        for ctor in &sig.ctors {
            em.writeln(iface, &format!("{}() bool", ctor.test_name));
        }
        for (name, ty, _) in self.dtor_list(sig) {
            em.writeln(
                iface,
                &format!("Dtor_{}() {}", name, self.type_name(p, &ty, Tok::default())?),
            );
        }
        em.writeln(iface, "String() string");
        em.seal(iface);
        em.blank(w);

        for ctor in &sig.ctors {
            let mut params: Vec<String> = Vec::new();
            for f in &ctor.formals {
                let ty = if ctor.lazy {
                    "SlateLazy".to_string()
                } else {
                    self.type_name(p, &f.ty, Tok::default())?
                };
                params.push(format!("{} {}", f.name, ty));
            }
            let names: Vec<&str> = ctor.formals.iter().map(|f| f.name.as_str()).collect();
            let create = em.new_block(
                w,
                &format!(
                    "func {}_create_{}({}) {}",
                    sig.name,
                    ctor.name,
                    params.join(", "),
                    sig.name
                ),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            em.writeln(
                create,
                &format!("return {}_{}{{{}}}", sig.name, ctor.name, names.join(", ")),
            );
            em.seal(create);
        }

        let default_ctor = &sig.ctors[sig.default_ctor];
        let args: Vec<String> = if default_ctor.lazy {
            sig.default_args
                .iter()
                .map(|a| format!("SlateLazyOf(func() any {{ return {} }})", a))
                .collect()
        } else {
            sig.default_args.clone()
        };
        let default = em.new_block(
            w,
            &format!("func {}_Default() {}", sig.name, sig.name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(
            default,
            &format!(
                "return {}_create_{}({})",
                sig.name,
                default_ctor.name,
                args.join(", ")
            ),
        );
        em.seal(default);
        em.blank(w);

        // Members and the driver's destructor pass append after this point.
        Ok(em.fork(w))
    }

    fn datatype_ctor(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &DatatypeSig,
        ctor: &CtorSig,
    ) -> Result<(), LowerError> {
        let name = format!("{}_{}", sig.name, ctor.name);
        let struct_block = em.new_block(
            w,
            &format!("type {} struct", name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        for f in &ctor.formals {
            let ty = if ctor.lazy {
                "SlateLazy".to_string()
            } else {
                self.type_name(p, &f.ty, Tok::default())?
            };
            em.writeln(struct_block, &format!("{} {}", f.name, ty));
        }
        em.seal(struct_block);

        for other in &sig.ctors {
            let test = em.new_block(
                w,
                &format!("func (_this {}) {}() bool", name, other.test_name),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            em.writeln(test, &format!("return {}", other.name == ctor.name));
            em.seal(test);
        }

        // Every variant implements the full destructor surface; foreign
        // fields are the absurd case.
        for (dtor_name, ty, ctors) in self.dtor_list(sig) {
            let ty_name = self.type_name(p, &ty, Tok::default())?;
            let body = em.new_block(
                w,
                &format!("func (_this {}) Dtor_{}() {}", name, dtor_name, ty_name),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            if ctors.contains(&ctor.name) {
                if ctor.lazy {
                    if ty_name == "any" {
                        em.writeln(body, &format!("return _this.{}.Get()", dtor_name));
                    } else {
                        em.writeln(
                            body,
                            &format!("return _this.{}.Get().({})", dtor_name, ty_name),
                        );
                    }
                } else {
                    em.writeln(body, &format!("return _this.{}", dtor_name));
                }
            } else {
                em.writeln(
                    body,
                    &format!(
                        "panic(\"{}.Dtor_{} on wrong variant\")",
                        sig.name, dtor_name
                    ),
                );
            }
            em.seal(body);
        }

        let repr = em.new_block(
            w,
            &format!("func (_this {}) String() string", name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        if ctor.formals.is_empty() {
            em.writeln(repr, &format!("return \"{}\"", ctor.name));
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| {
                    if ctor.lazy {
                        format!("SlateStr(_this.{}.Get())", f.name)
                    } else {
                        format!("SlateStr(_this.{})", f.name)
                    }
                })
                .collect();
            em.writeln(
                repr,
                &format!(
                    "return \"{}(\" + {} + \")\"",
                    ctor.name,
                    fields.join(" + \", \" + ")
                ),
            );
        }
        em.seal(repr);
        em.blank(w);
        Ok(())
    }

    fn datatype_dtor(
        &self,
        _em: &mut Emitter,
        _w: Wr,
        _p: &Program,
        _sig: &DatatypeSig,
        _dtor: &DtorSig,
    ) -> Result<(), LowerError> {
        // Dispatch lives on the interface; every variant already carries
        // the full destructor surface.
        Ok(())
    }

    fn declare_newtype(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        name: &str,
        base: &Type,
        default: &str,
    ) -> Result<(), LowerError> {
        let ty = self.type_name(p, base, Tok::default())?;
        em.writeln(w, &format!("type {} = {}", name, ty));
        let body = em.new_block(
            w,
            &format!("func {}_Default() {}", name, ty),
            "{",
            "}",
            BraceStyle::SameLine,
        );
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
        self.last_cond.borrow_mut().insert(w, cond.to_string());
        em.new_block(w, &format!("if {}", cond), "{", "}", BraceStyle::SameLine)
    }

    fn else_block(&self, em: &mut Emitter, w: Wr) -> Wr {
        let cond = self
            .last_cond
            .borrow()
            .get(&w)
            .cloned()
            .unwrap_or_else(|| "false".to_string());
        em.new_block(
            w,
            &format!("if !({})", cond),
            "{",
            "}",
            BraceStyle::SameLine,
        )
    }

    fn while_block(&self, em: &mut Emitter, w: Wr, label: Option<&str>, cond: &str) -> Wr {
        if let Some(l) = label {
            em.writeln(w, &format!("{}:", l));
        }
        em.new_block(w, &format!("for {}", cond), "{", "}", BraceStyle::SameLine)
    }

    fn loop_block(&self, em: &mut Emitter, w: Wr, label: Option<&str>) -> Wr {
        if let Some(l) = label {
            em.writeln(w, &format!("{}:", l));
        }
        em.new_block(w, "for", "{", "}", BraceStyle::SameLine)
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
    ) -> Result<Wr, LowerError> {
        let _ = p;
        let header = if up {
            format!(
                "for {} := {}; ({}).Cmp({}) < 0; {} = ({}).Add(SlateIntOf(1))",
                var.name, lo, var.name, hi, var.name, var.name
            )
        } else {
            format!(
                "for {} := ({}).Sub(SlateIntOf(1)); ({}).Cmp({}) >= 0; {} = ({}).Sub(SlateIntOf(1))",
                var.name, lo, var.name, hi, var.name, var.name
            )
        };
        Ok(em.new_block(w, &header, "{", "}", BraceStyle::SameLine))
    }

    fn foreach_block(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        var: &Param,
        collection: &str,
    ) -> Result<Wr, LowerError> {
        let ty = self.type_name(p, &var.ty, Tok::default())?;
        let body = em.new_block(
            w,
            &format!("for _, _elem := range ({}).Elements()", collection),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        if ty == "any" {
            em.writeln(body, &format!("{} := _elem", var.name));
        } else {
            em.writeln(body, &format!("{} := _elem.({})", var.name, ty));
        }
        em.writeln(body, &format!("_ = {}", var.name));
        Ok(body)
    }

    fn break_stmt(&self, em: &mut Emitter, w: Wr, label: Option<&str>) {
        match label {
            Some(l) => em.writeln(w, &format!("break {}", l)),
            None => em.writeln(w, "break"),
        }
    }

    fn continue_stmt(&self, em: &mut Emitter, w: Wr, label: Option<&str>) {
        match label {
            Some(l) => em.writeln(w, &format!("continue {}", l)),
            None => em.writeln(w, "continue"),
        }
    }

    fn return_stmt(&self, em: &mut Emitter, w: Wr, values: &[String]) {
        if values.is_empty() {
            em.writeln(w, "return");
        } else {
            em.writeln(w, &format!("return {}", values.join(", ")));
        }
    }

    fn print_stmt(&self, em: &mut Emitter, w: Wr, expr: &str) {
        em.writeln(w, &format!("SlatePrint({})", expr));
    }

    fn expr_stmt(&self, em: &mut Emitter, w: Wr, expr: &str) {
        em.writeln(w, expr);
    }

    fn absurd_stmt(&self, em: &mut Emitter, w: Wr, message: &str) {
        em.writeln(w, &format!("panic({})", self.string_quote(message)));
    }

    fn literal(&self, _p: &Program, lit: &Lit, _ty: &Type, _tok: Tok) -> Result<String, LowerError> {
        Ok(match lit {
            Lit::Bool(b) => b.to_string(),
            Lit::Char(c) => match c {
                '\'' => "'\\''".to_string(),
                '\\' => "'\\\\'".to_string(),
                '\n' => "'\\n'".to_string(),
                c => format!("'{}'", c),
            },
            Lit::Int(n) => {
                if let Ok(small) = i64::try_from(n.clone()) {
                    format!("SlateIntOf({})", small)
                } else {
                    format!("SlateIntOfString(\"{}\")", n)
                }
            }
            Lit::Real { mantissa, exponent } => format!(
                "SlateRealOf(\"{}\")",
                numeric::real_decimal_string(mantissa, *exponent)
            ),
            Lit::Bitvector { value, width } => {
                if self.native_ty(*width).is_some() {
                    value.to_string()
                } else {
                    format!("SlateIntOfString(\"{}\")", value)
                }
            }
            Lit::Str(s) => format!("SlateStringOf({})", self.string_quote(s)),
            Lit::Null => "nil".to_string(),
        })
    }

    fn unary(&self, op: UnOp, operand: &str, ty: &Type) -> String {
        match (op, ty) {
            (UnOp::Neg, Type::Int) => format!("({}).Neg()", operand),
            (UnOp::Neg, Type::Real) => format!("({}).Neg()", operand),
            (UnOp::Not, _) => format!("(!{})", operand),
            (UnOp::Neg, _) => format!("(-{})", operand),
            (UnOp::BitNot, _) => format!("(^{})", operand),
        }
    }

    fn arith_raw(&self, op: BinOp, a: &str, b: &str, ty: &Type) -> String {
        let big = match ty {
            Type::Int | Type::Real => true,
            Type::Bitvector { width, .. } => self.native_ty(*width).is_none(),
            _ => false,
        };
        if big {
            return match op {
                BinOp::Add => format!("({}).Add({})", a, b),
                BinOp::Sub => format!("({}).Sub({})", a, b),
                BinOp::Mul => format!("({}).Mul({})", a, b),
                BinOp::Div => format!("({}).Div({})", a, b),
                BinOp::Mod => format!("({}).Mod({})", a, b),
                BinOp::BitAnd => format!("({}).And({})", a, b),
                BinOp::BitOr => format!("({}).Or({})", a, b),
                BinOp::BitXor => format!("({}).Xor({})", a, b),
                BinOp::Shl => format!("({}).Shl({})", a, b),
                BinOp::Shr => format!("({}).Shr({})", a, b),
                _ => format!("({} /* unexpected big op */ {})", a, b),
            };
        }
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
        let big = matches!(ty, Type::Int | Type::Real)
            || matches!(ty, Type::Bitvector { width, .. } if self.native_ty(*width).is_none());
        let structural = matches!(
            ty,
            Type::UserDefined { .. }
                | Type::Seq(_)
                | Type::Set(_)
                | Type::Multiset(_)
                | Type::Map(_, _)
        );
        match op {
            BinOp::Eq if big => format!("(({}).Cmp({}) == 0)", a, b),
            BinOp::Neq if big => format!("(({}).Cmp({}) != 0)", a, b),
            BinOp::Eq if structural => format!("SlateEquals({}, {})", a, b),
            BinOp::Neq if structural => format!("(!SlateEquals({}, {}))", a, b),
            BinOp::Eq => format!("({} == {})", a, b),
            BinOp::Neq => format!("({} != {})", a, b),
            BinOp::Lt if big => format!("(({}).Cmp({}) < 0)", a, b),
            BinOp::Le if big => format!("(({}).Cmp({}) <= 0)", a, b),
            BinOp::Gt if big => format!("(({}).Cmp({}) > 0)", a, b),
            BinOp::Ge if big => format!("(({}).Cmp({}) >= 0)", a, b),
            BinOp::Lt => format!("({} < {})", a, b),
            BinOp::Le => format!("({} <= {})", a, b),
            BinOp::Gt => format!("({} > {})", a, b),
            BinOp::Ge => format!("({} >= {})", a, b),
            _ => format!("({} == {})", a, b),
        }
    }

    fn euclid_div(&self, a: &str, b: &str, _ty: &Type) -> String {
        format!("SlateEuclidDiv({}, {})", a, b)
    }

    fn euclid_mod(&self, a: &str, b: &str, _ty: &Type) -> String {
        format!("SlateEuclidMod({}, {})", a, b)
    }

    fn mask(&self, expr: &str, mask_hex: &str, ty: &Type) -> String {
        match ty {
            Type::Bitvector { width, .. } if self.native_ty(*width).is_some() => {
                format!("(({}) & 0x{})", expr, mask_hex)
            }
            _ => format!("({}).And(SlateIntOfHex(\"{}\"))", expr, mask_hex),
        }
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
            (Type::Int, Type::Real) => Ok(format!("SlateRealOfInt({})", operand)),
            (Type::Real, Type::Int) => Ok(format!("({}).ToInt()", operand)),
            (Type::Int, Type::Bitvector { width, .. }) => Ok(match self.native_ty(*width) {
                Some(t) => format!("{}(({}).Int64())", t, operand),
                None => operand.to_string(),
            }),
            (Type::Bitvector { width, .. }, Type::Int) => Ok(match self.native_ty(*width) {
                Some(_) => format!("SlateIntOf(int64({}))", operand),
                None => operand.to_string(),
            }),
            (Type::Char, Type::Int) => Ok(format!("SlateIntOf(int64({}))", operand)),
            (Type::Int, Type::Char) => Ok(format!("rune(({}).Int64())", operand)),
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
            Type::Seq(_) => "SlateSeqOf",
            Type::Set(_) => "SlateSetOf",
            Type::Multiset(_) => "SlateMultisetOf",
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
        let flat: Vec<String> = pairs
            .iter()
            .flat_map(|(k, v)| [k.clone(), v.clone()])
            .collect();
        Ok(format!("SlateMapOf({})", flat.join(", ")))
    }

    fn collection_call(&self, op: CollOp, args: &[&str]) -> String {
        match op {
            CollOp::Concat => format!("({}).Concat({})", args[0], args[1]),
            CollOp::Union => format!("({}).Union({})", args[0], args[1]),
            CollOp::Intersection => format!("({}).Intersection({})", args[0], args[1]),
            CollOp::Difference => format!("({}).Difference({})", args[0], args[1]),
            CollOp::Contains => format!("({}).Contains({})", args[1], args[0]),
            CollOp::SeqIndex => format!("({}).Select({})", args[0], args[1]),
            CollOp::MapIndex => format!("({}).Get({})", args[0], args[1]),
            CollOp::SeqUpdate => format!("({}).Update({}, {})", args[0], args[1], args[2]),
            CollOp::MapUpdate => format!("({}).Put({}, {})", args[0], args[1], args[2]),
            CollOp::Take => format!("({}).Take({})", args[0], args[1]),
            CollOp::Drop => format!("({}).Drop({})", args[0], args[1]),
            CollOp::Subsequence => {
                format!("({}).Subsequence({}, {})", args[0], args[1], args[2])
            }
            CollOp::Cardinality => format!("({}).Cardinality()", args[0]),
            CollOp::MapKeys => format!("({}).Keys()", args[0]),
            CollOp::MapValues => format!("({}).Values()", args[0]),
        }
    }

    fn array_select(&self, base: &str, indices: &[String]) -> String {
        let mut out = String::from(base);
        for idx in indices {
            out.push_str(&format!("[({}).Int64()]", idx));
        }
        out
    }

    fn array_length(&self, base: &str, dim: u32) -> String {
        let mut path = String::from(base);
        for _ in 0..dim {
            path.push_str("[0]");
        }
        format!("SlateIntOf(int64(len({})))", path)
    }

    fn lambda(
        &self,
        p: &Program,
        params: &[Param],
        body_ty: &Type,
        body: &str,
    ) -> Result<String, LowerError> {
        let mut typed: Vec<String> = Vec::new();
        for param in params {
            typed.push(format!(
                "{} {}",
                param.name,
                self.type_name(p, &param.ty, Tok::default())?
            ));
        }
        let ret = self.type_name(p, body_ty, Tok::default())?;
        Ok(format!(
            "func({}) {} {{ return ({}) }}",
            typed.join(", "),
            ret,
            body
        ))
    }

    fn ite(
        &self,
        p: &Program,
        ty: &Type,
        cond: &str,
        thn: &str,
        els: &str,
    ) -> Result<String, LowerError> {
        let ret = self.type_name(p, ty, Tok::default())?;
        Ok(format!(
            "(func() {} {{ if {} {{ return ({}) }}; return ({}) }})()",
            ret, cond, thn, els
        ))
    }

    fn let_expr(
        &self,
        p: &Program,
        ty: &Type,
        var: &Param,
        rhs: &str,
        body: &str,
    ) -> Result<String, LowerError> {
        let var_ty = self.type_name(p, &var.ty, Tok::default())?;
        let ret = self.type_name(p, ty, Tok::default())?;
        Ok(format!(
            "(func({} {}) {} {{ return ({}) }})({})",
            var.name, var_ty, ret, body, rhs
        ))
    }

    fn new_object(&self, decl_ref: &str, args: &[String]) -> String {
        format!("New_{}({})", decl_ref, args.join(", "))
    }

    fn datatype_value(&self, decl_ref: &str, ctor: &CtorSig, args: &[String]) -> String {
        let wrapped: Vec<String> = if ctor.lazy {
            args.iter()
                .map(|a| format!("SlateLazyOf(func() any {{ return {} }})", a))
                .collect()
        } else {
            args.to_vec()
        };
        format!("{}_create_{}({})", decl_ref, ctor.name, wrapped.join(", "))
    }

    fn default_companion(&self, decl_ref: &str) -> String {
        format!("{}_Default()", decl_ref)
    }

    fn ctor_test(&self, operand: &str, ctor: &CtorSig) -> String {
        format!("({}).{}()", operand, ctor.test_name)
    }

    fn destructor_get(&self, operand: &str, dtor_name: &str) -> String {
        format!("({}).Dtor_{}()", operand, dtor_name)
    }

    fn this_expr(&self) -> &'static str {
        "_this"
    }

    fn null_expr(&self, _p: &Program, ty: &Type) -> Result<String, LowerError> {
        Ok(match ty {
            Type::TypeParam(_) => "nil".to_string(),
            _ => "nil".to_string(),
        })
    }

    fn quantifier(&self, forall: bool, collection: &str, pred_lambda: &str) -> String {
        format!("SlateQuantifier({}, {}, {})", collection, forall, pred_lambda)
    }

    fn set_comprehension(&self, collection: &str, filter_lambda: &str, term_lambda: &str) -> String {
        format!(
            "SlateSetComprehension({}, {}, {})",
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
            "SlateMapComprehension({}, {}, {}, {})",
            collection, filter_lambda, key_lambda, value_lambda
        )
    }

    fn emit_entry_point(&self, em: &mut Emitter, main_ref: &str) -> Result<(), LowerError> {
        let file = em.new_file("main.go");
        em.writeln(file, "// Generated by the Slate compiler. DO NOT EDIT.");
        em.writeln(file, "package main");
        em.blank(file);
        let main_w = em.new_block(file, "func main()", "{", "}", BraceStyle::SameLine);
        em.writeln(main_w, &format!("{}()", main_ref));
        em.seal(main_w);
        Ok(())
    }

    fn runtime_blob(&self) -> (&'static str, &'static str) {
        ("slate_runtime.go", runtime::runtime_source(TargetTag::Go))
    }

    fn native_compile(&self, out_dir: &Path, _files: &[PathBuf]) -> Result<(), LowerError> {
        if !out_dir.join("go.mod").exists() {
            run_tool("go", &["mod", "init", "slate_out"], out_dir)?;
        }
        run_tool("go", &["build", "-o", "program", "."], out_dir)?;
        Ok(())
    }

    fn run(&self, out_dir: &Path) -> Result<RunOutput, LowerError> {
        run_program("./program", &[], out_dir)
    }
}
