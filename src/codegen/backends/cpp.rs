//! C++ backend
//!
//! Emits one header per module (header-only, C++17), a namespace per
//! module, and a `program.cpp` entry file. Datatypes are a base struct with
//! virtual tests and destructors; variants override their own fields and
//! the base's default destructor bodies throw, which is the wrong-variant
//! case. Values of class and datatype types travel as `std::shared_ptr`.
//!
//! `int` and `real` use the runtime's operator-overloaded exact types, so
//! raw arithmetic is spelled with plain operators everywhere; bitvectors
//! ride `uint32_t`/`uint64_t` with masking below the backing width.
//! Labeled loops are emulated with `goto` pairs. Collections with
//! trait-typed elements are not representable here; the capability bit
//! rejects them.

use std::path::{Path, PathBuf};

use super::super::backend::{
    run_program, run_tool, Backend, Capabilities, ClassSig, CollOp, CtorSig, DatatypeSig,
    DtorSig, FieldSig, FilePieces, MethodSig, Param, RunOutput,
};
use super::super::numeric;
use super::super::writer::{BraceStyle, Emitter, Wr};
use super::super::LowerError;
use crate::options::TargetTag;
use crate::rir::{BinOp, DeclId, DeclKind, Lit, Program, Tok, Type};
use crate::runtime;

const RESERVED: &[&str] = &[
    "alignas", "alignof", "and", "asm", "auto", "bitand", "bitor", "bool", "break", "case",
    "catch", "char", "class", "compl", "const", "constexpr", "continue", "decltype", "default",
    "delete", "do", "double", "else", "enum", "explicit", "export", "extern", "false", "float",
    "for", "friend", "goto", "if", "inline", "int", "long", "mutable", "namespace", "new",
    "noexcept", "not", "nullptr", "operator", "or", "private", "protected", "public", "register",
    "return", "short", "signed", "sizeof", "static", "struct", "switch", "template", "this",
    "throw", "true", "try", "typedef", "typeid", "typename", "union", "unsigned", "using",
    "virtual", "void", "volatile", "while", "xor", "main",
];

const CAPS: Capabilities = Capabilities {
    erased_generics: true,
    // uint8_t/uint16_t arithmetic promotes to int and would not wrap;
    // only the natively modular widths are offered.
    native_int_widths: &[32, 64],
    trait_collection_elements: false,
    native_codata: false,
    labeled_loops: true,
    max_tuple_arity: None,
    strings_are_code_units: true,
};

pub struct CppBackend;

impl CppBackend {
    pub fn new() -> Self {
        CppBackend
    }

    fn namespace_of(&self, p: &Program, decl: DeclId) -> String {
        let module = p.module(p.decl(decl).module);
        if module.is_default {
            "_module".to_string()
        } else {
            module.name.clone()
        }
    }

    fn native_ty(&self, width: u32) -> Option<&'static str> {
        match numeric::native_width_for(width, &CAPS) {
            Some(32) => Some("uint32_t"),
            Some(64) => Some("uint64_t"),
            _ => None,
        }
    }

    fn dtor_list(&self, sig: &DatatypeSig) -> Vec<(String, Type, Vec<String>)> {
        let mut order: Vec<String> = Vec::new();
        let mut map: std::collections::HashMap<String, (Type, Vec<String>)> =
            std::collections::HashMap::new();
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

    fn field_ty(&self, p: &Program, ctor: &CtorSig, f: &Param) -> Result<String, LowerError> {
        if ctor.lazy {
            Ok("slate::Lazy".to_string())
        } else {
            self.type_name(p, &f.ty, Tok::default())
        }
    }
}

impl Default for CppBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CppBackend {
    fn tag(&self) -> TargetTag {
        TargetTag::Cpp
    }

    fn caps(&self) -> Capabilities {
        CAPS
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED
    }

    fn module_file(&self, module_name: &str) -> PathBuf {
        PathBuf::from(format!("{}.h", module_name))
    }

    fn type_name(&self, p: &Program, ty: &Type, tok: Tok) -> Result<String, LowerError> {
        match ty {
            Type::Bool => Ok("bool".to_string()),
            Type::Char => Ok("char".to_string()),
            Type::Int => Ok("slate::Int".to_string()),
            Type::Real => Ok("slate::Real".to_string()),
            Type::Bitvector { width, .. } => Ok(self
                .native_ty(*width)
                .map(|t| t.to_string())
                .unwrap_or_else(|| "slate::Int".to_string())),
            Type::Seq(e) => Ok(format!("slate::Seq<{}>", self.type_name(p, e, tok)?)),
            Type::Set(e) => Ok(format!("slate::Set<{}>", self.type_name(p, e, tok)?)),
            Type::Multiset(e) => Ok(format!("slate::Multiset<{}>", self.type_name(p, e, tok)?)),
            Type::Map(k, v) => Ok(format!(
                "slate::Map<{}, {}>",
                self.type_name(p, k, tok)?,
                self.type_name(p, v, tok)?
            )),
            Type::Array { rank, elem } => {
                let mut name = self.type_name(p, elem, tok)?;
                for _ in 0..*rank {
                    name = format!("std::vector<{}>", name);
                }
                Ok(name)
            }
            Type::UserDefined { decl, .. } => {
                let d = p.decl(*decl);
                match &d.kind {
                    DeclKind::Newtype(nt) => self.type_name(p, &nt.base, tok),
                    DeclKind::SubsetType(st) => self.type_name(p, &st.base, tok),
                    _ => Ok(format!(
                        "std::shared_ptr<{}::{}>",
                        self.namespace_of(p, *decl),
                        self.sanitize(&d.name)
                    )),
                }
            }
            Type::Arrow { ins, out } => {
                let mut args: Vec<String> = Vec::new();
                for t in ins {
                    args.push(self.type_name(p, t, tok)?);
                }
                Ok(format!(
                    "std::function<{}({})>",
                    self.type_name(p, out, tok)?,
                    args.join(", ")
                ))
            }
            Type::TypeParam(name) => Ok(name.clone()),
            Type::Proxy => Err(LowerError::internal(
                "type naming",
                format!("unresolved type proxy at {}", tok),
            )),
        }
    }

    fn decl_ref(&self, p: &Program, decl: DeclId) -> Result<String, LowerError> {
        Ok(format!(
            "{}::{}",
            self.namespace_of(p, decl),
            self.sanitize(&p.decl(decl).name)
        ))
    }

    fn static_ref(&self, decl_ref: &str, member: &str) -> String {
        format!("{}::{}", decl_ref, member)
    }

    fn type_descriptor(&self, _p: &Program, _ty: &Type, _tok: Tok) -> Result<String, LowerError> {
        Ok("nullptr".to_string())
    }

    fn begin_file(
        &self,
        em: &mut Emitter,
        w: Wr,
        module_name: &str,
        deps: &[String],
    ) -> FilePieces {
        em.writeln(w, "// Generated by the Slate compiler. DO NOT EDIT.");
        let guard = format!("SLATE_{}_H", module_name.to_uppercase());
        em.writeln(w, &format!("#ifndef {}", guard));
        em.writeln(w, &format!("#define {}", guard));
        em.blank(w);
        em.writeln(w, "#include \"slate_runtime.h\"");
        let imports = em.fork(w);
        for dep in deps {
            em.writeln(imports, &format!("#include \"{}.h\"", dep));
        }
        em.blank(w);
        let ns = em.new_block(
            w,
            &format!("namespace {}", module_name),
            "{",
            "}",
            BraceStyle::NextLine,
        );
        em.blank(w);
        em.writeln(w, &format!("#endif // {}", guard));
        FilePieces { imports, body: ns }
    }

    fn open_class(&self, em: &mut Emitter, w: Wr, sig: &ClassSig) -> Result<Wr, LowerError> {
        if !sig.type_params.is_empty() {
            em.writeln(
                w,
                &format!("template <typename {}>", sig.type_params.join(", typename ")),
            );
        }
        let bases = if sig.traits.is_empty() {
            String::new()
        } else {
            let list: Vec<String> = sig
                .traits
                .iter()
                .map(|t| format!("public {}", t))
                .collect();
            format!(" : {}", list.join(", "))
        };
        Ok(em.new_block(
            w,
            &format!("struct {}{}", sig.name, bases),
            "{",
            "};",
            BraceStyle::SameLine,
        ))
    }

    fn open_method(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &MethodSig,
    ) -> Result<Wr, LowerError> {
        if !sig.type_params.is_empty() {
            em.writeln(
                w,
                &format!("template <typename {}>", sig.type_params.join(", typename ")),
            );
        }
        let mut params: Vec<String> = Vec::new();
        for param in &sig.ins {
            params.push(format!(
                "{} {}",
                self.type_name(p, &param.ty, Tok::default())?,
                param.name
            ));
        }
        let header = if sig.is_constructor {
            format!("{}({})", sig.enclosing, params.join(", "))
        } else {
            let ret = if let Some(result) = &sig.result {
                self.type_name(p, result, Tok::default())?
            } else {
                match sig.outs.len() {
                    0 => "void".to_string(),
                    1 => self.type_name(p, &sig.outs[0].ty, Tok::default())?,
                    _ => {
                        let mut tys = Vec::new();
                        for out in &sig.outs {
                            tys.push(self.type_name(p, &out.ty, Tok::default())?);
                        }
                        format!("std::tuple<{}>", tys.join(", "))
                    }
                }
            };
            let prefix = if sig.is_static { "static " } else { "" };
            format!("{}{} {}({})", prefix, ret, sig.name, params.join(", "))
        };
        let body = em.new_block(w, &header, "{", "}", BraceStyle::SameLine);
        for (out, default) in sig.outs.iter().zip(&sig.out_defaults) {
            em.writeln(
                body,
                &format!(
                    "{} {} = {};",
                    self.type_name(p, &out.ty, Tok::default())?,
                    out.name,
                    default
                ),
            );
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
        let mut line = String::new();
        if sig.is_static {
            line.push_str("inline static ");
        }
        if sig.is_const {
            line.push_str("const ");
        }
        line.push_str(&format!("{} {}", ty, sig.name));
        if let Some(init) = &sig.init {
            line.push_str(&format!(" = {}", init));
        }
        line.push(';');
        em.writeln(w, &line);
        Ok(())
    }

    fn datatype_base(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &DatatypeSig,
    ) -> Result<Wr, LowerError> {
        if sig.is_record {
            let ctor = &sig.ctors[0];
            let class_w = em.new_block(
                w,
                &format!("struct {}", sig.name),
                "{",
                "};",
                BraceStyle::SameLine,
            );
            for f in &ctor.formals {
                em.writeln(
                    class_w,
                    &format!("{} {};", self.field_ty(p, ctor, f)?, f.name),
                );
            }
            let mut params: Vec<String> = Vec::new();
            for f in &ctor.formals {
                params.push(format!("{} {}_arg", self.field_ty(p, ctor, f)?, f.name));
            }
            let inits: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| format!("{0}({0}_arg)", f.name))
                .collect();
            if ctor.formals.is_empty() {
                em.writeln(class_w, &format!("{}() {{}}", sig.name));
            } else {
                em.writeln(
                    class_w,
                    &format!(
                        "{}({}) : {} {{}}",
                        sig.name,
                        params.join(", "),
                        inits.join(", ")
                    ),
                );
            }
            let test = em.new_block(
                class_w,
                &format!("bool {}() const", ctor.test_name),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            em.writeln(test, "return true;");
            em.seal(test);
            for f in &ctor.formals {
                let ty = self.type_name(p, &f.ty, Tok::default())?;
                let dtor = em.new_block(
                    class_w,
                    &format!("{} dtor_{}() const", ty, f.name),
                    "{",
                    "}",
                    BraceStyle::SameLine,
                );
                em.writeln(dtor, &format!("return this->{};", f.name));
                em.seal(dtor);
            }
            self.emit_str_and_equals(em, class_w, &sig.name, ctor);
            self.emit_factories(em, w, p, sig, ctor)?;
            return Ok(class_w);
        }

        let class_w = em.new_block(
            w,
            &format!("struct {}", sig.name),
            "{",
            "};",
            BraceStyle::SameLine,
        );
        em.writeln(class_w, &format!("virtual ~{}() = default;", sig.name));
        for ctor in &sig.ctors {
            let test = em.new_block(
                class_w,
                &format!("virtual bool {}() const", ctor.test_name),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            em.writeln(test, "return false;");
            em.seal(test);
        }
        for (name, ty, _) in self.dtor_list(sig) {
            let ty_name = self.type_name(p, &ty, Tok::default())?;
            let dtor = em.new_block(
                class_w,
                &format!("virtual {} dtor_{}() const", ty_name, name),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            em.writeln(
                dtor,
                &format!(
                    "throw std::runtime_error(\"{}.dtor_{} on wrong variant\");",
                    sig.name, name
                ),
            );
            em.seal(dtor);
        }
        let str_m = em.new_block(
            class_w,
            "virtual std::string str() const",
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(str_m, &format!("return \"{}\";", sig.name));
        em.seal(str_m);
        let eq_m = em.new_block(
            class_w,
            &format!("virtual bool equals(const {}& other) const", sig.name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(eq_m, "(void) other;");
        em.writeln(eq_m, "return false;");
        em.seal(eq_m);
        Ok(class_w)
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
        let class_w = em.new_block(
            w,
            &format!("struct {} : public {}", name, sig.name),
            "{",
            "};",
            BraceStyle::SameLine,
        );
        for f in &ctor.formals {
            em.writeln(
                class_w,
                &format!("{} {};", self.field_ty(p, ctor, f)?, f.name),
            );
        }
        let mut params: Vec<String> = Vec::new();
        for f in &ctor.formals {
            params.push(format!("{} {}_arg", self.field_ty(p, ctor, f)?, f.name));
        }
        let inits: Vec<String> = ctor
            .formals
            .iter()
            .map(|f| format!("{0}({0}_arg)", f.name))
            .collect();
        if ctor.formals.is_empty() {
            em.writeln(class_w, &format!("{}() {{}}", name));
        } else {
            em.writeln(
                class_w,
                &format!("{}({}) : {} {{}}", name, params.join(", "), inits.join(", ")),
            );
        }
        let test = em.new_block(
            class_w,
            &format!("bool {}() const override", ctor.test_name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(test, "return true;");
        em.seal(test);
        for f in &ctor.formals {
            let ty = self.type_name(p, &f.ty, Tok::default())?;
            let dtor = em.new_block(
                class_w,
                &format!("{} dtor_{}() const override", ty, f.name),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            if ctor.lazy {
                em.writeln(
                    dtor,
                    &format!("return std::any_cast<{}>(this->{}.get());", ty, f.name),
                );
            } else {
                em.writeln(dtor, &format!("return this->{};", f.name));
            }
            em.seal(dtor);
        }
        self.emit_str_and_equals_override(em, class_w, &sig.name, &name, ctor);
        em.seal(class_w);
        self.emit_factories(em, w, p, sig, ctor)?;
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
        // Dispatch is virtual; the base's throwing defaults plus variant
        // overrides already cover every destructor.
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
        em.writeln(w, &format!("using {} = {};", name, ty));
        let body = em.new_block(
            w,
            &format!("inline {} {}_default()", ty, name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(body, &format!("return {};", default));
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

    fn multi_assign_stmt(
        &self,
        em: &mut Emitter,
        w: Wr,
        lhss: &[String],
        _out_tys: &[String],
        call: &str,
    ) -> Result<(), LowerError> {
        em.writeln(w, &format!("std::tie({}) = {};", lhss.join(", "), call));
        Ok(())
    }

    fn while_block(&self, em: &mut Emitter, w: Wr, label: Option<&str>, cond: &str) -> Wr {
        if let Some(l) = label {
            em.writeln(w, &format!("{}: ;", l));
        }
        let body = em.new_block(w, &format!("while ({})", cond), "{", "}", BraceStyle::SameLine);
        if let Some(l) = label {
            em.writeln(w, &format!("after_{}: ;", l));
        }
        body
    }

    fn loop_block(&self, em: &mut Emitter, w: Wr, label: Option<&str>) -> Wr {
        self.while_block(em, w, label, "true")
    }

    fn break_stmt(&self, em: &mut Emitter, w: Wr, label: Option<&str>) {
        match label {
            Some(l) => em.writeln(w, &format!("goto after_{};", l)),
            None => em.writeln(w, "break;"),
        }
    }

    fn continue_stmt(&self, em: &mut Emitter, w: Wr, label: Option<&str>) {
        match label {
            Some(l) => em.writeln(w, &format!("goto {};", l)),
            None => em.writeln(w, "continue;"),
        }
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
        let ty = self.type_name(p, &var.ty, Tok::default())?;
        let header = if up {
            format!(
                "for ({} {} = {}; {} < {}; {} = {} + slate::Int(1))",
                ty, var.name, lo, var.name, hi, var.name, var.name
            )
        } else {
            format!(
                "for ({} {} = ({}) - slate::Int(1); {} >= {}; {} = {} - slate::Int(1))",
                ty, var.name, lo, var.name, hi, var.name, var.name
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
        Ok(em.new_block(
            w,
            &format!(
                "for (const {}& {} : ({}).elements())",
                ty, var.name, collection
            ),
            "{",
            "}",
            BraceStyle::SameLine,
        ))
    }

    fn return_stmt(&self, em: &mut Emitter, w: Wr, values: &[String]) {
        match values.len() {
            0 => em.writeln(w, "return;"),
            1 => em.writeln(w, &format!("return {};", values[0])),
            _ => em.writeln(
                w,
                &format!("return std::make_tuple({});", values.join(", ")),
            ),
        }
    }

    fn print_stmt(&self, em: &mut Emitter, w: Wr, expr: &str) {
        em.writeln(w, &format!("slate::print({});", expr));
    }

    fn absurd_stmt(&self, em: &mut Emitter, w: Wr, message: &str) {
        em.writeln(
            w,
            &format!("throw std::runtime_error({});", self.string_quote(message)),
        );
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
                    format!("slate::Int({}LL)", small)
                } else {
                    format!("slate::Int(std::string(\"{}\"))", n)
                }
            }
            Lit::Real { mantissa, exponent } => format!(
                "slate::Real::parse(\"{}\")",
                numeric::real_decimal_string(mantissa, *exponent)
            ),
            Lit::Bitvector { value, width } => {
                if self.native_ty(*width).is_some() {
                    format!("{}U", value)
                } else {
                    format!("slate::Int(std::string(\"{}\"))", value)
                }
            }
            Lit::Str(s) => format!("slate::string_of({})", self.string_quote(s)),
            Lit::Null => "nullptr".to_string(),
        })
    }

    fn arith_raw(&self, op: BinOp, a: &str, b: &str, _ty: &Type) -> String {
        // slate::Int and slate::Real overload the operators.
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
        let dt_ptr = matches!(ty, Type::UserDefined { .. });
        match op {
            BinOp::Eq if dt_ptr => format!("slate::dt_equals({}, {})", a, b),
            BinOp::Neq if dt_ptr => format!("(!slate::dt_equals({}, {}))", a, b),
            BinOp::Eq => format!("({} == {})", a, b),
            BinOp::Neq => format!("({} != {})", a, b),
            BinOp::Lt => format!("({} < {})", a, b),
            BinOp::Le => format!("({} <= {})", a, b),
            BinOp::Gt => format!("({} > {})", a, b),
            BinOp::Ge => format!("({} >= {})", a, b),
            _ => format!("({} == {})", a, b),
        }
    }

    fn euclid_div(&self, a: &str, b: &str, _ty: &Type) -> String {
        format!("slate::euclid_div({}, {})", a, b)
    }

    fn euclid_mod(&self, a: &str, b: &str, _ty: &Type) -> String {
        format!("slate::euclid_mod({}, {})", a, b)
    }

    fn mask(&self, expr: &str, mask_hex: &str, ty: &Type) -> String {
        match ty {
            Type::Bitvector { width, .. } => match self.native_ty(*width) {
                Some(_) => format!("(({}) & 0x{}ULL)", expr, mask_hex),
                None => format!("(({}) & slate::Int::from_hex(\"{}\"))", expr, mask_hex),
            },
            _ => format!("(({}) & 0x{})", expr, mask_hex),
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
            (Type::Int, Type::Real) => Ok(format!("slate::Real::of_int({})", operand)),
            (Type::Real, Type::Int) => Ok(format!("({}).to_int()", operand)),
            (Type::Int, Type::Bitvector { width, .. }) => Ok(match self.native_ty(*width) {
                Some(native) => format!("({})(({}).to_int64())", native, operand),
                None => operand.to_string(),
            }),
            (Type::Bitvector { width, .. }, Type::Int) => Ok(match self.native_ty(*width) {
                Some(_) => format!("slate::Int((long long)({}))", operand),
                None => operand.to_string(),
            }),
            (Type::Char, Type::Int) => Ok(format!("slate::Int((long long)({}))", operand)),
            (Type::Int, Type::Char) => Ok(format!("(char)(({}).to_int64())", operand)),
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
        p: &Program,
        ty: &Type,
        elems: &[String],
        tok: Tok,
    ) -> Result<String, LowerError> {
        let (ctor, elem_ty) = match ty {
            Type::Seq(e) => ("slate::Seq", e),
            Type::Set(e) => ("slate::Set", e),
            Type::Multiset(e) => ("slate::Multiset", e),
            other => {
                return Err(LowerError::internal(
                    "collection display",
                    format!("display of non-collection type {} at {}", other, tok),
                ));
            }
        };
        let elem_name = self.type_name(p, elem_ty, tok)?;
        Ok(format!("{}<{}>::of({{{}}})", ctor, elem_name, elems.join(", ")))
    }

    fn map_literal(
        &self,
        p: &Program,
        ty: &Type,
        pairs: &[(String, String)],
        tok: Tok,
    ) -> Result<String, LowerError> {
        let (k, v) = match ty {
            Type::Map(k, v) => (self.type_name(p, k, tok)?, self.type_name(p, v, tok)?),
            other => {
                return Err(LowerError::internal(
                    "map display",
                    format!("map display of type {} at {}", other, tok),
                ));
            }
        };
        let items: Vec<String> = pairs
            .iter()
            .map(|(key, value)| format!("{{{}, {}}}", key, value))
            .collect();
        Ok(format!("slate::Map<{}, {}>::of({{{}}})", k, v, items.join(", ")))
    }

    fn collection_call(&self, op: CollOp, args: &[&str]) -> String {
        match op {
            CollOp::Concat => format!("({}).concat({})", args[0], args[1]),
            CollOp::Union => format!("({}).set_union({})", args[0], args[1]),
            CollOp::Intersection => format!("({}).set_intersection({})", args[0], args[1]),
            CollOp::Difference => format!("({}).set_difference({})", args[0], args[1]),
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
            CollOp::MapKeys => format!("({}).keys()", args[0]),
            CollOp::MapValues => format!("({}).values()", args[0]),
        }
    }

    fn array_select(&self, base: &str, indices: &[String]) -> String {
        let mut out = String::from(base);
        for idx in indices {
            out.push_str(&format!("[({}).to_int64()]", idx));
        }
        out
    }

    fn array_length(&self, base: &str, dim: u32) -> String {
        let mut path = String::from(base);
        for _ in 0..dim {
            path.push_str("[0]");
        }
        format!("slate::Int((long long){}.size())", path)
    }

    fn lambda(
        &self,
        p: &Program,
        params: &[Param],
        _body_ty: &Type,
        body: &str,
    ) -> Result<String, LowerError> {
        let mut typed: Vec<String> = Vec::new();
        for param in params {
            typed.push(format!(
                "{} {}",
                self.type_name(p, &param.ty, Tok::default())?,
                param.name
            ));
        }
        Ok(format!(
            "([=]({}) {{ return ({}); }})",
            typed.join(", "),
            body
        ))
    }

    fn let_expr(
        &self,
        p: &Program,
        _ty: &Type,
        var: &Param,
        rhs: &str,
        body: &str,
    ) -> Result<String, LowerError> {
        let var_ty = self.type_name(p, &var.ty, Tok::default())?;
        Ok(format!(
            "([&]({} {}) {{ return ({}); }})({})",
            var_ty, var.name, body, rhs
        ))
    }

    fn field_access(&self, obj: &str, field: &str) -> String {
        if obj == "this" {
            format!("this->{}", field)
        } else {
            format!("({})->{}", obj, field)
        }
    }

    fn new_object(&self, decl_ref: &str, args: &[String]) -> String {
        format!("std::make_shared<{}>({})", decl_ref, args.join(", "))
    }

    fn datatype_value(&self, decl_ref: &str, ctor: &CtorSig, args: &[String]) -> String {
        let wrapped: Vec<String> = if ctor.lazy {
            args.iter()
                .map(|a| format!("slate::Lazy([=]() {{ return std::any({}); }})", a))
                .collect()
        } else {
            args.to_vec()
        };
        // Factories are free functions in the datatype's namespace.
        format!("{}_create_{}({})", decl_ref, ctor.name, wrapped.join(", "))
    }

    fn default_companion(&self, decl_ref: &str) -> String {
        format!("{}_Default()", decl_ref)
    }

    fn ctor_test(&self, operand: &str, ctor: &CtorSig) -> String {
        format!("({})->{}()", operand, ctor.test_name)
    }

    fn destructor_get(&self, operand: &str, dtor_name: &str) -> String {
        format!("({})->dtor_{}()", operand, dtor_name)
    }

    fn null_expr(&self, _p: &Program, ty: &Type) -> Result<String, LowerError> {
        Ok(match ty {
            Type::TypeParam(name) => format!("{}{{}}", name),
            _ => "nullptr".to_string(),
        })
    }

    fn quantifier(&self, forall: bool, collection: &str, pred_lambda: &str) -> String {
        format!(
            "slate::quantifier({}, {}, {})",
            collection, forall, pred_lambda
        )
    }

    fn set_comprehension(&self, collection: &str, filter_lambda: &str, term_lambda: &str) -> String {
        format!(
            "slate::set_comprehension({}, {}, {})",
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
            "slate::map_comprehension({}, {}, {}, {})",
            collection, filter_lambda, key_lambda, value_lambda
        )
    }

    fn emit_entry_point(&self, em: &mut Emitter, main_ref: &str) -> Result<(), LowerError> {
        let file = em.new_file("program.cpp");
        em.writeln(file, "// Generated by the Slate compiler. DO NOT EDIT.");
        let module = main_ref.split("::").next().unwrap_or("_module");
        em.writeln(file, &format!("#include \"{}.h\"", module));
        em.blank(file);
        let main_w = em.new_block(file, "int main()", "{", "}", BraceStyle::NextLine);
        em.writeln(main_w, &format!("{}();", main_ref));
        em.writeln(main_w, "return 0;");
        em.seal(main_w);
        Ok(())
    }

    fn runtime_blob(&self) -> (&'static str, &'static str) {
        ("slate_runtime.h", runtime::runtime_source(TargetTag::Cpp))
    }

    fn native_compile(&self, out_dir: &Path, files: &[PathBuf]) -> Result<(), LowerError> {
        let has_main = files
            .iter()
            .any(|f| f.file_name().map(|n| n == "program.cpp").unwrap_or(false));
        if !has_main {
            // Header-only artifact set; nothing to build without an entry.
            return Ok(());
        }
        run_tool(
            "g++",
            &["-std=c++17", "-o", "program", "program.cpp"],
            out_dir,
        )?;
        Ok(())
    }

    fn run(&self, out_dir: &Path) -> Result<RunOutput, LowerError> {
        run_program("./program", &[], out_dir)
    }
}

impl CppBackend {
    fn emit_str_and_equals(&self, em: &mut Emitter, class_w: Wr, name: &str, ctor: &CtorSig) {
        let str_m = em.new_block(
            class_w,
            "std::string str() const",
            "{",
            "}",
            BraceStyle::SameLine,
        );
        if ctor.formals.is_empty() {
            em.writeln(str_m, &format!("return \"{}\";", ctor.name));
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| format!("slate::str(this->dtor_{}())", f.name))
                .collect();
            em.writeln(
                str_m,
                &format!(
                    "return \"{}(\" + {} + \")\";",
                    ctor.name,
                    fields.join(" + \", \" + ")
                ),
            );
        }
        em.seal(str_m);

        let eq_m = em.new_block(
            class_w,
            &format!("bool equals(const {}& other) const", name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        if ctor.formals.is_empty() {
            em.writeln(eq_m, "(void) other;");
            em.writeln(eq_m, "return true;");
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| {
                    format!(
                        "slate::eq(this->dtor_{}(), other.dtor_{}())",
                        f.name, f.name
                    )
                })
                .collect();
            em.writeln(eq_m, &format!("return {};", fields.join(" && ")));
        }
        em.seal(eq_m);
    }

    fn emit_str_and_equals_override(
        &self,
        em: &mut Emitter,
        class_w: Wr,
        base: &str,
        name: &str,
        ctor: &CtorSig,
    ) {
        let str_m = em.new_block(
            class_w,
            "std::string str() const override",
            "{",
            "}",
            BraceStyle::SameLine,
        );
        if ctor.formals.is_empty() {
            em.writeln(str_m, &format!("return \"{}\";", ctor.name));
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| format!("slate::str(this->dtor_{}())", f.name))
                .collect();
            em.writeln(
                str_m,
                &format!(
                    "return std::string(\"{}(\") + {} + \")\";",
                    ctor.name,
                    fields.join(" + \", \" + ")
                ),
            );
        }
        em.seal(str_m);

        let eq_m = em.new_block(
            class_w,
            &format!("bool equals(const {}& other) const override", base),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(
            eq_m,
            &format!("auto o = dynamic_cast<const {}*>(&other);", name),
        );
        if ctor.formals.is_empty() {
            em.writeln(eq_m, "return o != nullptr;");
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| {
                    format!(
                        "slate::eq(this->dtor_{}(), o->dtor_{}())",
                        f.name, f.name
                    )
                })
                .collect();
            em.writeln(
                eq_m,
                &format!("return o != nullptr && {};", fields.join(" && ")),
            );
        }
        em.seal(eq_m);
    }

    fn emit_factories(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &DatatypeSig,
        ctor: &CtorSig,
    ) -> Result<(), LowerError> {
        let variant = if sig.is_record {
            sig.name.clone()
        } else {
            format!("{}_{}", sig.name, ctor.name)
        };
        let mut params: Vec<String> = Vec::new();
        let mut args: Vec<String> = Vec::new();
        for f in &ctor.formals {
            params.push(format!("{} {}", self.field_ty(p, ctor, f)?, f.name));
            args.push(f.name.clone());
        }
        let create = em.new_block(
            w,
            &format!(
                "inline std::shared_ptr<{}> {}_create_{}({})",
                sig.name,
                sig.name,
                ctor.name,
                params.join(", ")
            ),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(
            create,
            &format!(
                "return std::make_shared<{}>({});",
                variant,
                args.join(", ")
            ),
        );
        em.seal(create);

        if sig.ctors[sig.default_ctor].name == ctor.name {
            let wrapped: Vec<String> = if ctor.lazy {
                sig.default_args
                    .iter()
                    .map(|a| format!("slate::Lazy([=]() {{ return std::any({}); }})", a))
                    .collect()
            } else {
                sig.default_args.clone()
            };
            let default = em.new_block(
                w,
                &format!(
                    "inline std::shared_ptr<{}> {}_Default()",
                    sig.name, sig.name
                ),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            em.writeln(
                default,
                &format!(
                    "return {}_create_{}({});",
                    sig.name,
                    ctor.name,
                    wrapped.join(", ")
                ),
            );
            em.seal(default);
        }
        Ok(())
    }
}
