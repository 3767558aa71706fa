//! C# backend
//!
//! Emits one file per module wrapped in a namespace, so declaration
//! references are fully qualified (`Mod.Cls`). Generics are reified with
//! `Slate.TypeDescriptor` arguments, like the JVM target. C# has no labeled
//! loops; loop labels are emulated with `goto` pairs (`L:` before the loop,
//! `after_L:` behind it), so the capability bit still advertises labels.
//! Methods with multiple out-parameters return value tuples, which caps the
//! arity at seven.
//!
//! `int` is `System.Numerics.BigInteger`; bitvectors ride `uint`/`ulong`
//! (the widths whose arithmetic is natively modular) with masking below
//! the backing width.

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
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true",
    "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual",
    "void", "volatile", "while",
];

const CAPS: Capabilities = Capabilities {
    erased_generics: false,
    // byte/ushort arithmetic promotes to int and would not wrap; only the
    // widths whose native arithmetic is already modular are offered.
    native_int_widths: &[32, 64],
    trait_collection_elements: true,
    native_codata: false,
    labeled_loops: true,
    max_tuple_arity: Some(7),
    strings_are_code_units: true,
};

pub struct CSharpBackend;

impl CSharpBackend {
    pub fn new() -> Self {
        CSharpBackend
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
            Some(32) => Some("uint"),
            Some(64) => Some("ulong"),
            _ => None,
        }
    }

    fn variant_body(
        &self,
        em: &mut Emitter,
        class_w: Wr,
        p: &Program,
        name: &str,
        ctor: &CtorSig,
    ) -> Result<(), LowerError> {
        for f in &ctor.formals {
            let ty = if ctor.lazy {
                "Slate.Lazy".to_string()
            } else {
                self.type_name(p, &f.ty, Tok::default())?
            };
            em.writeln(class_w, &format!("public readonly {} {};", ty, f.name));
        }
        let mut params: Vec<String> = Vec::new();
        for f in &ctor.formals {
            let ty = if ctor.lazy {
                "Slate.Lazy".to_string()
            } else {
                self.type_name(p, &f.ty, Tok::default())?
            };
            params.push(format!("{} {}", ty, f.name));
        }
        let ctor_block = em.new_block(
            class_w,
            &format!("public {}({})", name, params.join(", ")),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        for f in &ctor.formals {
            em.writeln(ctor_block, &format!("this.{} = {};", f.name, f.name));
        }
        em.seal(ctor_block);

        let force = |field: &str| {
            if ctor.lazy {
                format!("this.{}.Get()", field)
            } else {
                format!("this.{}", field)
            }
        };

        let eq = em.new_block(
            class_w,
            "public override bool Equals(object other)",
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(eq, &format!("var o = other as {};", name));
        if ctor.formals.is_empty() {
            em.writeln(eq, "return o != null;");
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| {
                    if ctor.lazy {
                        format!(
                            "object.Equals(this.{}.Get(), o.{}.Get())",
                            f.name, f.name
                        )
                    } else {
                        format!("object.Equals(this.{}, o.{})", f.name, f.name)
                    }
                })
                .collect();
            em.writeln(eq, &format!("return o != null && {};", fields.join(" && ")));
        }
        em.seal(eq);

        let hash = em.new_block(
            class_w,
            "public override int GetHashCode()",
            "{",
            "}",
            BraceStyle::SameLine,
        );
        if ctor.formals.is_empty() {
            em.writeln(hash, &format!("return \"{}\".GetHashCode();", ctor.name));
        } else {
            em.writeln(hash, "int h = 17;");
            for f in &ctor.formals {
                em.writeln(
                    hash,
                    &format!("h = h * 31 + {}.GetHashCode();", force(&f.name)),
                );
            }
            em.writeln(hash, "return h;");
        }
        em.seal(hash);

        let repr = em.new_block(
            class_w,
            "public override string ToString()",
            "{",
            "}",
            BraceStyle::SameLine,
        );
        if ctor.formals.is_empty() {
            em.writeln(repr, &format!("return \"{}\";", ctor.name));
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| format!("Slate.Rt.Str({})", force(&f.name)))
                .collect();
            em.writeln(
                repr,
                &format!(
                    "return \"{}(\" + {} + \")\";",
                    ctor.name,
                    fields.join(" + \", \" + ")
                ),
            );
        }
        em.seal(repr);
        Ok(())
    }
}

impl Default for CSharpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CSharpBackend {
    fn tag(&self) -> TargetTag {
        TargetTag::CSharp
    }

    fn caps(&self) -> Capabilities {
        CAPS
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED
    }

    fn module_file(&self, module_name: &str) -> PathBuf {
        PathBuf::from(format!("{}.cs", module_name))
    }

    fn type_name(&self, p: &Program, ty: &Type, tok: Tok) -> Result<String, LowerError> {
        match ty {
            Type::Bool => Ok("bool".to_string()),
            Type::Char => Ok("char".to_string()),
            Type::Int => Ok("System.Numerics.BigInteger".to_string()),
            Type::Real => Ok("Slate.Real".to_string()),
            Type::Bitvector { width, .. } => Ok(self
                .native_ty(*width)
                .map(|t| t.to_string())
                .unwrap_or_else(|| "System.Numerics.BigInteger".to_string())),
            Type::Seq(e) => Ok(format!("Slate.Seq<{}>", self.type_name(p, e, tok)?)),
            Type::Set(e) => Ok(format!("Slate.Set<{}>", self.type_name(p, e, tok)?)),
            Type::Multiset(e) => Ok(format!("Slate.Multiset<{}>", self.type_name(p, e, tok)?)),
            Type::Map(k, v) => Ok(format!(
                "Slate.Map<{}, {}>",
                self.type_name(p, k, tok)?,
                self.type_name(p, v, tok)?
            )),
            Type::Array { rank, elem } => {
                let elem_name = self.type_name(p, elem, tok)?;
                Ok(format!("{}{}", elem_name, "[]".repeat(*rank as usize)))
            }
            Type::UserDefined { decl, type_args } => {
                let d = p.decl(*decl);
                match &d.kind {
                    DeclKind::Newtype(nt) => self.type_name(p, &nt.base, tok),
                    DeclKind::SubsetType(st) => self.type_name(p, &st.base, tok),
                    _ => {
                        let base = format!(
                            "{}.{}",
                            self.namespace_of(p, *decl),
                            self.sanitize(&d.name)
                        );
                        if type_args.is_empty() {
                            Ok(base)
                        } else {
                            let args: Result<Vec<String>, LowerError> = type_args
                                .iter()
                                .map(|a| self.type_name(p, a, tok))
                                .collect();
                            Ok(format!("{}<{}>", base, args?.join(", ")))
                        }
                    }
                }
            }
            Type::Arrow { ins, out } => {
                let mut args: Vec<String> = Vec::new();
                for t in ins {
                    args.push(self.type_name(p, t, tok)?);
                }
                args.push(self.type_name(p, out, tok)?);
                Ok(format!("System.Func<{}>", args.join(", ")))
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
            "{}.{}",
            self.namespace_of(p, decl),
            self.sanitize(&p.decl(decl).name)
        ))
    }

    fn type_descriptor(&self, p: &Program, ty: &Type, _tok: Tok) -> Result<String, LowerError> {
        Ok(match ty {
            Type::TypeParam(name) => format!("_td_{}", name),
            Type::UserDefined { decl, .. }
                if matches!(p.decl(*decl).kind, DeclKind::Datatype(_)) =>
            {
                format!("{}._TYPE", self.decl_ref(p, *decl)?)
            }
            _ => "Slate.Rt.NullType".to_string(),
        })
    }

    fn begin_file(
        &self,
        em: &mut Emitter,
        w: Wr,
        module_name: &str,
        _deps: &[String],
    ) -> FilePieces {
        em.writeln(w, "// Generated by the Slate compiler. DO NOT EDIT.");
        let imports = em.fork(w);
        em.blank(w);
        let ns = em.new_block(
            w,
            &format!("namespace {}", module_name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        FilePieces { imports, body: ns }
    }

    fn open_class(&self, em: &mut Emitter, w: Wr, sig: &ClassSig) -> Result<Wr, LowerError> {
        let generics = if sig.type_params.is_empty() {
            String::new()
        } else {
            format!("<{}>", sig.type_params.join(", "))
        };
        let implements = if sig.traits.is_empty() {
            String::new()
        } else {
            format!(" : {}", sig.traits.join(", "))
        };
        let kind = "public class";
        Ok(em.new_block(
            w,
            &format!("{} {}{}{}", kind, sig.name, generics, implements),
            "{",
            "}",
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
        if let Some(max) = CAPS.max_tuple_arity {
            if sig.outs.len() > max {
                return Err(LowerError::unsupported(
                    format!("a method with {} out-parameters", sig.outs.len()),
                    Tok::default(),
                    self.tag(),
                ));
            }
        }
        let mut header = String::from("public ");
        if sig.is_static {
            header.push_str("static ");
        }
        let mut params: Vec<String> = Vec::new();
        for tp in &sig.type_params {
            params.push(format!("Slate.TypeDescriptor _td_{}", tp));
        }
        for param in &sig.ins {
            params.push(format!(
                "{} {}",
                self.type_name(p, &param.ty, Tok::default())?,
                param.name
            ));
        }
        let generics = if sig.type_params.is_empty() {
            String::new()
        } else {
            format!("<{}>", sig.type_params.join(", "))
        };
        if sig.is_constructor {
            header.push_str(&format!("{}({})", sig.enclosing, params.join(", ")));
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
                        format!("({})", tys.join(", "))
                    }
                }
            };
            header.push_str(&format!(
                "{} {}{}({})",
                ret,
                sig.name,
                generics,
                params.join(", ")
            ));
        }
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
        let mut line = String::from("public ");
        if sig.is_static {
            line.push_str("static ");
        }
        if sig.is_const {
            line.push_str("readonly ");
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
                &format!("public class {}", sig.name),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            self.variant_body(em, class_w, p, &sig.name, ctor)?;
            let mut params: Vec<String> = Vec::new();
            for f in &ctor.formals {
                params.push(format!(
                    "{} {}",
                    self.type_name(p, &f.ty, Tok::default())?,
                    f.name
                ));
            }
            let names: Vec<&str> = ctor.formals.iter().map(|f| f.name.as_str()).collect();
            let create = em.new_block(
                class_w,
                &format!(
                    "public static {} create_{}({})",
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
                &format!("return new {}({});", sig.name, names.join(", ")),
            );
            em.seal(create);
            let test = em.new_block(
                class_w,
                &format!("public bool {}()", ctor.test_name),
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
                    &format!("public {} dtor_{}()", ty, f.name),
                    "{",
                    "}",
                    BraceStyle::SameLine,
                );
                em.writeln(dtor, &format!("return this.{};", f.name));
                em.seal(dtor);
            }
            self.emit_default_members(em, class_w, sig);
            return Ok(class_w);
        }

        let class_w = em.new_block(
            w,
            &format!("public abstract class {}", sig.name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        for ctor in &sig.ctors {
            let mut params: Vec<String> = Vec::new();
            for f in &ctor.formals {
                let ty = if ctor.lazy {
                    "Slate.Lazy".to_string()
                } else {
                    self.type_name(p, &f.ty, Tok::default())?
                };
                params.push(format!("{} {}", ty, f.name));
            }
            let names: Vec<&str> = ctor.formals.iter().map(|f| f.name.as_str()).collect();
            let create = em.new_block(
                class_w,
                &format!(
                    "public static {} create_{}({})",
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
                &format!("return new {}_{}({});", sig.name, ctor.name, names.join(", ")),
            );
            em.seal(create);
            let test = em.new_block(
                class_w,
                &format!("public bool {}()", ctor.test_name),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            em.writeln(test, &format!("return this is {}_{};", sig.name, ctor.name));
            em.seal(test);
        }
        self.emit_default_members(em, class_w, sig);
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
            &format!("public class {} : {}", name, sig.name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        self.variant_body(em, class_w, p, &name, ctor)?;
        em.seal(class_w);
        Ok(())
    }

    fn datatype_dtor(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &DatatypeSig,
        dtor: &DtorSig,
    ) -> Result<(), LowerError> {
        let ty = self.type_name(p, &dtor.ty, Tok::default())?;
        let lazy = sig.ctors.iter().any(|c| c.lazy);
        let body = em.new_block(
            w,
            &format!("public {} dtor_{}()", ty, dtor.name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        for (i, ctor_name) in dtor.ctors.iter().enumerate() {
            let variant = format!("{}_{}", sig.name, ctor_name);
            let read = if lazy {
                format!("((({}) this).{}.Get())", variant, dtor.name)
            } else {
                format!("(({}) this).{}", variant, dtor.name)
            };
            let read = if lazy {
                format!("({}){}", ty, read)
            } else {
                read
            };
            if i + 1 == dtor.ctors.len() {
                em.writeln(body, &format!("return {};", read));
            } else {
                em.writeln(
                    body,
                    &format!("if (this is {}) return {};", variant, read),
                );
            }
        }
        em.seal(body);
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
        em.writeln(
            w,
            &format!("// newtype {} = {}; default {}", name, ty, default),
        );
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
        let ty = self.type_name(p, base, Tok::default())?;
        em.writeln(
            w,
            &format!("// subset type {} = {}; witness {}", name, ty, witness),
        );
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
        em.writeln(w, &format!("({}) = {};", lhss.join(", "), call));
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
                "for ({} {} = {}; {} < {}; {} += 1)",
                ty, var.name, lo, var.name, hi, var.name
            )
        } else {
            format!(
                "for ({} {} = ({}) - 1; {} >= {}; {} -= 1)",
                ty, var.name, lo, var.name, hi, var.name
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
            &format!("foreach ({} {} in ({}).Elements())", ty, var.name, collection),
            "{",
            "}",
            BraceStyle::SameLine,
        ))
    }

    fn return_stmt(&self, em: &mut Emitter, w: Wr, values: &[String]) {
        match values.len() {
            0 => em.writeln(w, "return;"),
            1 => em.writeln(w, &format!("return {};", values[0])),
            _ => em.writeln(w, &format!("return ({});", values.join(", "))),
        }
    }

    fn print_stmt(&self, em: &mut Emitter, w: Wr, expr: &str) {
        em.writeln(w, &format!("Slate.Rt.Print({});", expr));
    }

    fn absurd_stmt(&self, em: &mut Emitter, w: Wr, message: &str) {
        em.writeln(
            w,
            &format!(
                "throw new System.InvalidOperationException({});",
                self.string_quote(message)
            ),
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
                    format!("new System.Numerics.BigInteger({}L)", small)
                } else {
                    format!("System.Numerics.BigInteger.Parse(\"{}\")", n)
                }
            }
            Lit::Real { mantissa, exponent } => format!(
                "Slate.Rt.RealOf(\"{}\")",
                numeric::real_decimal_string(mantissa, *exponent)
            ),
            Lit::Bitvector { value, width } => {
                if self.native_ty(*width).is_some() {
                    value.to_string()
                } else {
                    format!("System.Numerics.BigInteger.Parse(\"{}\")", value)
                }
            }
            Lit::Str(s) => format!("Slate.Rt.StringOf({})", self.string_quote(s)),
            Lit::Null => "null".to_string(),
        })
    }

    fn arith_raw(&self, op: BinOp, a: &str, b: &str, _ty: &Type) -> String {
        // BigInteger, Real, and the native widths all carry operators.
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
            BinOp::Shl => format!("({} << (int)({}))", a, b),
            BinOp::Shr => format!("({} >> (int)({}))", a, b),
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
            BinOp::Eq if structural => format!("object.Equals({}, {})", a, b),
            BinOp::Neq if structural => format!("(!object.Equals({}, {}))", a, b),
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
        format!("Slate.Rt.EuclidDiv({}, {})", a, b)
    }

    fn euclid_mod(&self, a: &str, b: &str, _ty: &Type) -> String {
        format!("Slate.Rt.EuclidMod({}, {})", a, b)
    }

    fn mask(&self, expr: &str, mask_hex: &str, ty: &Type) -> String {
        match ty {
            Type::Bitvector { width, .. } => match self.native_ty(*width) {
                Some(_) => format!("(({}) & 0x{}U)", expr, mask_hex),
                None => format!(
                    "(({}) & System.Numerics.BigInteger.Parse(\"0{}\", System.Globalization.NumberStyles.HexNumber))",
                    expr, mask_hex
                ),
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
            (Type::Int, Type::Real) => Ok(format!("Slate.Rt.RealOfInt({})", operand)),
            (Type::Real, Type::Int) => Ok(format!("({}).ToInt()", operand)),
            (Type::Int, Type::Bitvector { width, .. }) => Ok(match self.native_ty(*width) {
                Some(native) => format!("({})({})", native, operand),
                None => operand.to_string(),
            }),
            (Type::Bitvector { width, .. }, Type::Int) => Ok(match self.native_ty(*width) {
                Some(_) => format!("new System.Numerics.BigInteger({})", operand),
                None => operand.to_string(),
            }),
            (Type::Char, Type::Int) => {
                Ok(format!("new System.Numerics.BigInteger((int)({}))", operand))
            }
            (Type::Int, Type::Char) => Ok(format!("(char)(int)({})", operand)),
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
            Type::Seq(e) => ("Slate.Seq", e),
            Type::Set(e) => ("Slate.Set", e),
            Type::Multiset(e) => ("Slate.Multiset", e),
            other => {
                return Err(LowerError::internal(
                    "collection display",
                    format!("display of non-collection type {} at {}", other, tok),
                ));
            }
        };
        let elem_name = self.type_name(p, elem_ty, tok)?;
        Ok(format!("{}<{}>.Of({})", ctor, elem_name, elems.join(", ")))
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
            .map(|(key, value)| format!("({}, {})", key, value))
            .collect();
        Ok(format!("Slate.Map<{}, {}>.Of({})", k, v, items.join(", ")))
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
            out.push_str(&format!("[(int)({})]", idx));
        }
        out
    }

    fn array_length(&self, base: &str, dim: u32) -> String {
        let mut path = String::from(base);
        for _ in 0..dim {
            path.push_str("[0]");
        }
        format!("new System.Numerics.BigInteger({}.Length)", path)
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
        Ok(format!("Slate.Rt.Let({}, {} => ({}))", rhs, var.name, body))
    }

    fn datatype_value(&self, decl_ref: &str, ctor: &CtorSig, args: &[String]) -> String {
        let wrapped: Vec<String> = if ctor.lazy {
            args.iter()
                .map(|a| format!("new Slate.Lazy(() => {})", a))
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
        format!(
            "Slate.Rt.Quantifier({}, {}, {})",
            collection, forall, pred_lambda
        )
    }

    fn set_comprehension(&self, collection: &str, filter_lambda: &str, term_lambda: &str) -> String {
        format!(
            "Slate.Rt.SetComprehension({}, {}, {})",
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
            "Slate.Rt.MapComprehension({}, {}, {}, {})",
            collection, filter_lambda, key_lambda, value_lambda
        )
    }

    fn emit_entry_point(&self, em: &mut Emitter, main_ref: &str) -> Result<(), LowerError> {
        let file = em.new_file("Program.cs");
        em.writeln(file, "// Generated by the Slate compiler. DO NOT EDIT.");
        let class_w = em.new_block(file, "public class Program", "{", "}", BraceStyle::SameLine);
        let main_w = em.new_block(
            class_w,
            "public static void Main(string[] args)",
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(main_w, &format!("{}();", main_ref));
        em.seal(main_w);
        em.seal(class_w);
        Ok(())
    }

    fn runtime_blob(&self) -> (&'static str, &'static str) {
        ("Slate.cs", runtime::runtime_source(TargetTag::CSharp))
    }

    fn native_compile(&self, out_dir: &Path, files: &[PathBuf]) -> Result<(), LowerError> {
        let names: Vec<String> = files
            .iter()
            .filter(|f| f.extension().map(|e| e == "cs").unwrap_or(false))
            .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        let mut args: Vec<&str> = vec!["/nologo", "/out:program.exe"];
        args.extend(names.iter().map(|s| s.as_str()));
        run_tool("csc", &args, out_dir)?;
        Ok(())
    }

    fn run(&self, out_dir: &Path) -> Result<RunOutput, LowerError> {
        run_program("mono", &["program.exe"], out_dir)
    }
}

impl CSharpBackend {
    fn emit_default_members(&self, em: &mut Emitter, class_w: Wr, sig: &DatatypeSig) {
        let default_ctor = &sig.ctors[sig.default_ctor];
        let args: Vec<String> = if default_ctor.lazy {
            sig.default_args
                .iter()
                .map(|a| format!("new Slate.Lazy(() => {})", a))
                .collect()
        } else {
            sig.default_args.clone()
        };
        let default = em.new_block(
            class_w,
            &format!("public static {} Default()", sig.name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(
            default,
            &format!("return create_{}({});", default_ctor.name, args.join(", ")),
        );
        em.seal(default);
        em.writeln(
            class_w,
            "public static readonly Slate.TypeDescriptor _TYPE = Slate.Rt.Td(() => Default());",
        );
    }
}
