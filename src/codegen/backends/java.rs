//! Java backend
//!
//! Emits plain-package Java with one file per top-level class, which is what
//! the JVM toolchain wants. Non-default modules prefix their declarations
//! (`Mod_Class`), so the whole artifact set compiles with a single `javac`
//! invocation. Generics are reified: generic methods take
//! `Slate.TypeDescriptor` arguments, and datatypes publish a `_TYPE`
//! descriptor.
//!
//! Numeric model: `int` is `java.math.BigInteger`, `real` is `Slate.Real`
//! (exact rationals from the runtime), bitvectors up to 64 bits ride in a
//! `long` with unsigned division/comparison helpers and a mask after every
//! operation, wider ones fall back to `BigInteger`. Everything is boxed so
//! collection element types are always valid generic arguments.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use super::super::backend::{
    run_program, run_tool, Backend, Capabilities, ClassSig, CollOp, CtorSig, DatatypeSig,
    DtorSig, FieldSig, FilePieces, MethodSig, Param, RunOutput,
};
use super::super::writer::{BraceStyle, Emitter, Wr};
use super::super::LowerError;
use crate::options::TargetTag;
use crate::rir::{BinOp, DeclId, DeclKind, Lit, Program, Tok, Type};
use crate::runtime;

const RESERVED: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "package", "private", "protected", "public", "record", "return", "sealed",
    "short", "static", "strictfp", "super", "switch", "synchronized", "this", "throw", "throws",
    "transient", "try", "var", "void", "volatile", "while", "yield", "true", "false", "null",
];

const CAPS: Capabilities = Capabilities {
    erased_generics: false,
    // Bitvectors ride in a long; arithmetic wraps only at 64 bits, so
    // that is the one backing width that needs no mask.
    native_int_widths: &[64],
    trait_collection_elements: true,
    native_codata: false,
    labeled_loops: true,
    max_tuple_arity: None,
    strings_are_code_units: true,
};

pub struct JavaBackend {
    /// Counter for unpacking temporaries in multi-assignments.
    out_tmp: Cell<u32>,
}

impl JavaBackend {
    pub fn new() -> Self {
        JavaBackend {
            out_tmp: Cell::new(0),
        }
    }

    fn banner(&self, em: &mut Emitter, w: Wr) {
        em.writeln(w, "// Generated by the Slate compiler. DO NOT EDIT.");
        em.blank(w);
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

    fn bv_is_native(&self, width: u32) -> bool {
        width <= 64
    }

    fn return_ty(&self, p: &Program, sig: &MethodSig) -> Result<String, LowerError> {
        if sig.is_constructor {
            return Ok(String::new());
        }
        if let Some(result) = &sig.result {
            return self.type_name(p, result, Tok::default());
        }
        match sig.outs.len() {
            0 => Ok("void".to_string()),
            1 => self.type_name(p, &sig.outs[0].ty, Tok::default()),
            _ => Ok("Object[]".to_string()),
        }
    }

    fn variant_tostring(&self, em: &mut Emitter, class_w: Wr, ctor: &CtorSig) {
        let body = em.new_block(
            class_w,
            "@Override public String toString()",
            "{",
            "}",
            BraceStyle::SameLine,
        );
        if ctor.formals.is_empty() {
            em.writeln(body, &format!("return \"{}\";", ctor.name));
        } else {
            let mut parts = format!("return \"{}(\"", ctor.name);
            for (i, f) in ctor.formals.iter().enumerate() {
                if i > 0 {
                    parts.push_str(" + \", \"");
                }
                if ctor.lazy {
                    parts.push_str(&format!(" + Slate.str(this.{}.get())", f.name));
                } else {
                    parts.push_str(&format!(" + Slate.str(this.{})", f.name));
                }
            }
            parts.push_str(" + \")\";");
            em.writeln(body, &parts);
        }
        em.seal(body);
    }

    fn variant_equality(&self, em: &mut Emitter, class_w: Wr, name: &str, ctor: &CtorSig) {
        let eq = em.new_block(
            class_w,
            "@Override public boolean equals(Object other)",
            "{",
            "}",
            BraceStyle::SameLine,
        );
        em.writeln(eq, &format!("if (!(other instanceof {})) return false;", name));
        if ctor.formals.is_empty() {
            em.writeln(eq, "return true;");
        } else {
            em.writeln(eq, &format!("{} o = ({}) other;", name, name));
            let mut cond = String::new();
            for (i, f) in ctor.formals.iter().enumerate() {
                if i > 0 {
                    cond.push_str(" && ");
                }
                if ctor.lazy {
                    cond.push_str(&format!(
                        "java.util.Objects.equals(this.{}.get(), o.{}.get())",
                        f.name, f.name
                    ));
                } else {
                    cond.push_str(&format!(
                        "java.util.Objects.equals(this.{}, o.{})",
                        f.name, f.name
                    ));
                }
            }
            em.writeln(eq, &format!("return {};", cond));
        }
        em.seal(eq);

        let hash = em.new_block(
            class_w,
            "@Override public int hashCode()",
            "{",
            "}",
            BraceStyle::SameLine,
        );
        if ctor.formals.is_empty() {
            em.writeln(hash, &format!("return \"{}\".hashCode();", ctor.name));
        } else {
            let fields: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| {
                    if ctor.lazy {
                        format!("this.{}.get()", f.name)
                    } else {
                        format!("this.{}", f.name)
                    }
                })
                .collect();
            em.writeln(
                hash,
                &format!("return java.util.Objects.hash({});", fields.join(", ")),
            );
        }
        em.seal(hash);
    }

    fn emit_default_members(&self, em: &mut Emitter, class_w: Wr, sig: &DatatypeSig) {
        let default_ctor = &sig.ctors[sig.default_ctor];
        let args: Vec<String> = if default_ctor.lazy {
            sig.default_args
                .iter()
                .map(|a| format!("Slate.lazy(() -> {})", a))
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
            "public static final Slate.TypeDescriptor _TYPE = Slate.td(() -> Default());",
        );
    }

    /// Fields, constructor, equality, and printing for one variant body.
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
            em.writeln(class_w, &format!("public final {} {};", ty, f.name));
        }
        let params: Vec<String> = ctor
            .formals
            .iter()
            .map(|f| {
                let ty = if ctor.lazy {
                    "Slate.Lazy".to_string()
                } else {
                    self.type_name(p, &f.ty, Tok::default()).unwrap_or_default()
                };
                format!("{} {}", ty, f.name)
            })
            .collect();
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
        self.variant_equality(em, class_w, name, ctor);
        self.variant_tostring(em, class_w, ctor);
        Ok(())
    }
}

impl Default for JavaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for JavaBackend {
    fn tag(&self) -> TargetTag {
        TargetTag::Java
    }

    fn caps(&self) -> Capabilities {
        CAPS
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED
    }

    fn module_file(&self, module_name: &str) -> PathBuf {
        PathBuf::from(format!("{}.java", module_name))
    }

    fn type_name(&self, p: &Program, ty: &Type, tok: Tok) -> Result<String, LowerError> {
        match ty {
            Type::Bool => Ok("Boolean".to_string()),
            Type::Char => Ok("Character".to_string()),
            Type::Int => Ok("java.math.BigInteger".to_string()),
            Type::Real => Ok("Slate.Real".to_string()),
            Type::Bitvector { width, .. } => Ok(if self.bv_is_native(*width) {
                "Long".to_string()
            } else {
                "java.math.BigInteger".to_string()
            }),
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
                    // Newtypes and subset types are aliases of their base.
                    DeclKind::Newtype(nt) => self.type_name(p, &nt.base, tok),
                    DeclKind::SubsetType(st) => self.type_name(p, &st.base, tok),
                    _ => {
                        let base = self.flat_name(p, *decl);
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
                if ins.len() > 3 {
                    return Err(LowerError::unsupported(
                        format!("a function type of arity {}", ins.len()),
                        tok,
                        self.tag(),
                    ));
                }
                let mut args: Vec<String> = Vec::new();
                for t in ins {
                    args.push(self.type_name(p, t, tok)?);
                }
                args.push(self.type_name(p, out, tok)?);
                Ok(format!("Slate.Fn{}<{}>", ins.len(), args.join(", ")))
            }
            Type::TypeParam(name) => Ok(name.clone()),
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

    fn type_descriptor(&self, p: &Program, ty: &Type, tok: Tok) -> Result<String, LowerError> {
        Ok(match ty {
            Type::Bool => "Slate.BOOL".to_string(),
            Type::Char => "Slate.CHAR".to_string(),
            Type::Int => "Slate.INT".to_string(),
            Type::Real => "Slate.REAL".to_string(),
            Type::Bitvector { width, .. } => {
                if self.bv_is_native(*width) {
                    "Slate.LONG".to_string()
                } else {
                    "Slate.INT".to_string()
                }
            }
            Type::TypeParam(name) => format!("_td_{}", name),
            Type::UserDefined { decl, .. } => {
                if matches!(p.decl(*decl).kind, DeclKind::Datatype(_)) {
                    format!("{}._TYPE", self.flat_name(p, *decl))
                } else {
                    "Slate.NULL_TYPE".to_string()
                }
            }
            _ => {
                let _ = tok;
                "Slate.NULL_TYPE".to_string()
            }
        })
    }

    fn begin_file(
        &self,
        em: &mut Emitter,
        w: Wr,
        module_name: &str,
        _deps: &[String],
    ) -> FilePieces {
        self.banner(em, w);
        em.writeln(w, &format!("// Module: {}", module_name));
        let imports = em.fork(w);
        let body = em.fork(w);
        FilePieces { imports, body }
    }

    fn open_class(&self, em: &mut Emitter, _w: Wr, sig: &ClassSig) -> Result<Wr, LowerError> {
        // One file per class; the module file only carries the banner.
        let file = em.new_file(format!("{}.java", sig.name));
        self.banner(em, file);
        let generics = if sig.type_params.is_empty() {
            String::new()
        } else {
            format!("<{}>", sig.type_params.join(", "))
        };
        let implements = if sig.traits.is_empty() {
            String::new()
        } else {
            format!(" implements {}", sig.traits.join(", "))
        };
        let header = format!("public class {}{}{}", sig.name, generics, implements);
        Ok(em.new_block(file, &header, "{", "}", BraceStyle::SameLine))
    }

    fn open_method(
        &self,
        em: &mut Emitter,
        w: Wr,
        p: &Program,
        sig: &MethodSig,
    ) -> Result<Wr, LowerError> {
        let mut header = String::from("public ");
        if sig.is_static {
            header.push_str("static ");
        }
        if !sig.type_params.is_empty() {
            header.push_str(&format!("<{}> ", sig.type_params.join(", ")));
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
        if sig.is_constructor {
            header.push_str(&format!("{}({})", sig.enclosing, params.join(", ")));
        } else {
            let ret = self.return_ty(p, sig)?;
            header.push_str(&format!("{} {}({})", ret, sig.name, params.join(", ")));
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
            line.push_str("final ");
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
        _w: Wr,
        p: &Program,
        sig: &DatatypeSig,
    ) -> Result<Wr, LowerError> {
        let file = em.new_file(format!("{}.java", sig.name));
        self.banner(em, file);
        if sig.is_record {
            let ctor = &sig.ctors[0];
            let class_w = em.new_block(
                file,
                &format!("public class {}", sig.name),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            self.variant_body(em, class_w, p, &sig.name, ctor)?;
            // Record datatypes collapse to a single product type; the
            // create_/is_/dtor_ surface stays uniform.
            let params: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| {
                    Ok(format!(
                        "{} {}",
                        self.type_name(p, &f.ty, Tok::default())?,
                        f.name
                    ))
                })
                .collect::<Result<_, LowerError>>()?;
            let args: Vec<String> = ctor.formals.iter().map(|f| f.name.clone()).collect();
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
            em.writeln(create, &format!("return new {}({});", sig.name, args.join(", ")));
            em.seal(create);
            let test = em.new_block(
                class_w,
                &format!("public boolean {}()", ctor.test_name),
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
            file,
            &format!("public abstract class {}", sig.name),
            "{",
            "}",
            BraceStyle::SameLine,
        );
        for ctor in &sig.ctors {
            let params: Vec<String> = ctor
                .formals
                .iter()
                .map(|f| {
                    let ty = if ctor.lazy {
                        "Slate.Lazy".to_string()
                    } else {
                        self.type_name(p, &f.ty, Tok::default()).unwrap_or_default()
                    };
                    format!("{} {}", ty, f.name)
                })
                .collect();
            let args: Vec<String> = ctor.formals.iter().map(|f| f.name.clone()).collect();
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
                &format!("return new {}_{}({});", sig.name, ctor.name, args.join(", ")),
            );
            em.seal(create);
            let test = em.new_block(
                class_w,
                &format!("public boolean {}()", ctor.test_name),
                "{",
                "}",
                BraceStyle::SameLine,
            );
            em.writeln(
                test,
                &format!("return this instanceof {}_{};", sig.name, ctor.name),
            );
            em.seal(test);
        }
        self.emit_default_members(em, class_w, sig);
        Ok(class_w)
    }

    fn datatype_ctor(
        &self,
        em: &mut Emitter,
        _w: Wr,
        p: &Program,
        sig: &DatatypeSig,
        ctor: &CtorSig,
    ) -> Result<(), LowerError> {
        let name = format!("{}_{}", sig.name, ctor.name);
        let file = em.new_file(format!("{}.java", name));
        self.banner(em, file);
        let class_w = em.new_block(
            file,
            &format!("public class {} extends {}", name, sig.name),
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
        let read = |variant: &str| {
            if lazy {
                format!("(({}) this).{}.get()", variant, dtor.name)
            } else {
                format!("(({}) this).{}", variant, dtor.name)
            }
        };
        let lazy_cast = if lazy {
            format!("({})", ty)
        } else {
            String::new()
        };
        for (i, ctor_name) in dtor.ctors.iter().enumerate() {
            let variant = format!("{}_{}", sig.name, ctor_name);
            if i + 1 == dtor.ctors.len() {
                em.writeln(body, &format!("return {}{};", lazy_cast, read(&variant)));
            } else {
                em.writeln(
                    body,
                    &format!(
                        "if (this instanceof {}) return {}{};",
                        variant,
                        lazy_cast,
                        read(&variant)
                    ),
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
        // Java has no type aliases; newtypes erase to their base, and only
        // the default-value companion survives.
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
        out_tys: &[String],
        call: &str,
    ) -> Result<(), LowerError> {
        let n = self.out_tmp.get();
        self.out_tmp.set(n + 1);
        let tmp = format!("_outs{}", n);
        em.writeln(w, &format!("Object[] {} = {};", tmp, call));
        for (i, (lhs, ty)) in lhss.iter().zip(out_tys).enumerate() {
            em.writeln(w, &format!("{} = ({}) {}[{}];", lhs, ty, tmp, i));
        }
        Ok(())
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
                "for ({} {} = {}; ({}).compareTo({}) < 0; {} = ({}).add(java.math.BigInteger.ONE))",
                ty, var.name, lo, var.name, hi, var.name, var.name
            )
        } else {
            format!(
                "for ({} {} = ({}).subtract(java.math.BigInteger.ONE); ({}).compareTo({}) >= 0; {} = ({}).subtract(java.math.BigInteger.ONE))",
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
            &format!("for ({} {} : ({}).elements())", ty, var.name, collection),
            "{",
            "}",
            BraceStyle::SameLine,
        ))
    }

    fn return_stmt(&self, em: &mut Emitter, w: Wr, values: &[String]) {
        match values.len() {
            0 => em.writeln(w, "return;"),
            1 => em.writeln(w, &format!("return {};", values[0])),
            _ => em.writeln(w, &format!("return new Object[] {{{}}};", values.join(", "))),
        }
    }

    fn print_stmt(&self, em: &mut Emitter, w: Wr, expr: &str) {
        em.writeln(w, &format!("Slate.print({});", expr));
    }

    fn absurd_stmt(&self, em: &mut Emitter, w: Wr, message: &str) {
        em.writeln(
            w,
            &format!("throw new IllegalStateException({});", self.string_quote(message)),
        );
    }

    fn literal(&self, _p: &Program, lit: &Lit, ty: &Type, _tok: Tok) -> Result<String, LowerError> {
        Ok(match lit {
            Lit::Bool(b) => b.to_string(),
            Lit::Char(c) => match c {
                '\'' => "'\\''".to_string(),
                '\\' => "'\\\\'".to_string(),
                '\n' => "'\\n'".to_string(),
                '\t' => "'\\t'".to_string(),
                c => format!("'{}'", c),
            },
            Lit::Int(n) => {
                if let Ok(small) = i64::try_from(n.clone()) {
                    format!("java.math.BigInteger.valueOf({}L)", small)
                } else {
                    format!("new java.math.BigInteger(\"{}\")", n)
                }
            }
            Lit::Real { mantissa, exponent } => format!(
                "Slate.realOf(\"{}\")",
                super::super::numeric::real_decimal_string(mantissa, *exponent)
            ),
            Lit::Bitvector { value, width } => {
                if self.bv_is_native(*width) {
                    // Hex keeps 64-bit values inside the literal grammar.
                    format!("0x{:x}L", value)
                } else {
                    format!("new java.math.BigInteger(\"{}\")", value)
                }
            }
            Lit::Str(s) => format!("Slate.seqOfString({})", self.string_quote(s)),
            Lit::Null => {
                let _ = ty;
                "null".to_string()
            }
        })
    }

    fn arith_raw(&self, op: BinOp, a: &str, b: &str, ty: &Type) -> String {
        let big = match ty {
            Type::Int => true,
            Type::Bitvector { width, .. } => !self.bv_is_native(*width),
            _ => false,
        };
        if big {
            return match op {
                BinOp::Add => format!("({}).add({})", a, b),
                BinOp::Sub => format!("({}).subtract({})", a, b),
                BinOp::Mul => format!("({}).multiply({})", a, b),
                BinOp::Div => format!("({}).divide({})", a, b),
                BinOp::Mod => format!("({}).mod({})", a, b),
                BinOp::BitAnd => format!("({}).and({})", a, b),
                BinOp::BitOr => format!("({}).or({})", a, b),
                BinOp::BitXor => format!("({}).xor({})", a, b),
                BinOp::Shl => format!("({}).shiftLeft(({}).intValue())", a, b),
                BinOp::Shr => format!("({}).shiftRight(({}).intValue())", a, b),
                _ => format!("({} /* unexpected big op {:?} */ {})", a, op, b),
            };
        }
        match (op, ty) {
            (BinOp::Add, Type::Real) => format!("({}).add({})", a, b),
            (BinOp::Sub, Type::Real) => format!("({}).subtract({})", a, b),
            (BinOp::Mul, Type::Real) => format!("({}).multiply({})", a, b),
            (BinOp::Div, Type::Real) => format!("({}).divide({})", a, b),
            (BinOp::And, _) => format!("({} && {})", a, b),
            (BinOp::Or, _) => format!("({} || {})", a, b),
            (BinOp::Add, _) => format!("({} + {})", a, b),
            (BinOp::Sub, _) => format!("({} - {})", a, b),
            (BinOp::Mul, _) => format!("({} * {})", a, b),
            // Bitvectors are unsigned; long division must not see the sign.
            (BinOp::Div, _) => format!("Long.divideUnsigned({}, {})", a, b),
            (BinOp::Mod, _) => format!("Long.remainderUnsigned({}, {})", a, b),
            (BinOp::BitAnd, _) => format!("({} & {})", a, b),
            (BinOp::BitOr, _) => format!("({} | {})", a, b),
            (BinOp::BitXor, _) => format!("({} ^ {})", a, b),
            (BinOp::Shl, _) => format!("({} << {})", a, b),
            (BinOp::Shr, _) => format!("({} >>> {})", a, b),
            _ => format!("({} /* unexpected op {:?} */ {})", a, op, b),
        }
    }

    fn compare(&self, op: BinOp, a: &str, b: &str, ty: &Type) -> String {
        let rel = match op {
            // Objects.equals autoboxes, so primitive-typed literal operands
            // compare correctly too.
            BinOp::Eq => return format!("java.util.Objects.equals({}, {})", a, b),
            BinOp::Neq => return format!("(!java.util.Objects.equals({}, {}))", a, b),
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            _ => return format!("({} /* unexpected comparison {:?} */ {})", a, op, b),
        };
        match ty {
            Type::Int | Type::Real => format!("(({}).compareTo({}) {} 0)", a, b, rel),
            Type::Bitvector { width, .. } if !self.bv_is_native(*width) => {
                format!("(({}).compareTo({}) {} 0)", a, b, rel)
            }
            Type::Bitvector { .. } => {
                format!("(Long.compareUnsigned({}, {}) {} 0)", a, b, rel)
            }
            _ => format!("({} {} {})", a, rel, b),
        }
    }

    fn euclid_div(&self, a: &str, b: &str, _ty: &Type) -> String {
        format!("Slate.euclidDiv({}, {})", a, b)
    }

    fn euclid_mod(&self, a: &str, b: &str, _ty: &Type) -> String {
        format!("Slate.euclidMod({}, {})", a, b)
    }

    fn mask(&self, expr: &str, mask_hex: &str, ty: &Type) -> String {
        match ty {
            Type::Bitvector { width, .. } if self.bv_is_native(*width) => {
                format!("(({}) & 0x{}L)", expr, mask_hex)
            }
            _ => format!(
                "({}).and(new java.math.BigInteger(\"{}\", 16))",
                expr, mask_hex
            ),
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
            (Type::Int, Type::Real) => Ok(format!("Slate.realOfInt({})", operand)),
            (Type::Real, Type::Int) => Ok(format!("({}).toInt()", operand)),
            (Type::Int, Type::Bitvector { width, .. }) => Ok(if self.bv_is_native(*width) {
                format!("({}).longValue()", operand)
            } else {
                operand.to_string()
            }),
            (Type::Bitvector { width, .. }, Type::Int) => Ok(if self.bv_is_native(*width) {
                format!("java.math.BigInteger.valueOf({})", operand)
            } else {
                operand.to_string()
            }),
            (Type::Char, Type::Int) => {
                Ok(format!("java.math.BigInteger.valueOf((long)(char)({}))", operand))
            }
            (Type::Int, Type::Char) => Ok(format!("(char)({}).intValue()", operand)),
            (Type::UserDefined { decl, .. }, _) => {
                // Newtype and subset conversions erase to the base type.
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
            _ if from == to => Ok(operand.to_string()),
            _ => Err(LowerError::unsupported(
                format!("a conversion from {} to {}", from, to),
                tok,
                self.tag(),
            )),
        }
    }

    fn collection_literal(
        &self,
        p: &Program,
        ty: &Type,
        elems: &[String],
        tok: Tok,
    ) -> Result<String, LowerError> {
        let ctor = match ty {
            Type::Seq(_) => "Slate.Seq.of",
            Type::Set(_) => "Slate.Set.of",
            Type::Multiset(_) => "Slate.Multiset.of",
            other => {
                let _ = p;
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
        Ok(format!("Slate.Map.of({})", flat.join(", ")))
    }

    fn collection_call(&self, op: CollOp, args: &[&str]) -> String {
        match op {
            CollOp::Concat => format!("({}).concat({})", args[0], args[1]),
            CollOp::Union => format!("({}).union({})", args[0], args[1]),
            CollOp::Intersection => format!("({}).intersection({})", args[0], args[1]),
            CollOp::Difference => format!("({}).difference({})", args[0], args[1]),
            // Membership arrives as (element, collection).
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
            out.push_str(&format!("[({}).intValue()]", idx));
        }
        out
    }

    fn array_length(&self, base: &str, dim: u32) -> String {
        let mut path = String::from(base);
        for _ in 0..dim {
            path.push_str("[0]");
        }
        format!("java.math.BigInteger.valueOf({}.length)", path)
    }

    fn lambda(
        &self,
        _p: &Program,
        params: &[Param],
        _body_ty: &Type,
        body: &str,
    ) -> Result<String, LowerError> {
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        Ok(format!("(({}) -> ({}))", names.join(", "), body))
    }

    fn let_expr(
        &self,
        _p: &Program,
        _ty: &Type,
        var: &Param,
        rhs: &str,
        body: &str,
    ) -> Result<String, LowerError> {
        Ok(format!("Slate.let_({}, ({}) -> ({}))", rhs, var.name, body))
    }

    fn apply(
        &self,
        _p: &Program,
        _ty: &Type,
        func: &str,
        args: &[String],
    ) -> Result<String, LowerError> {
        Ok(format!("({}).apply({})", func, args.join(", ")))
    }

    fn datatype_value(&self, decl_ref: &str, ctor: &CtorSig, args: &[String]) -> String {
        let wrapped: Vec<String> = if ctor.lazy {
            args.iter()
                .map(|a| format!("Slate.lazy(() -> {})", a))
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
        format!("Slate.quantifier({}, {}, {})", collection, forall, pred_lambda)
    }

    fn set_comprehension(&self, collection: &str, filter_lambda: &str, term_lambda: &str) -> String {
        format!(
            "Slate.setComprehension({}, {}, {})",
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
            "Slate.mapComprehension({}, {}, {}, {})",
            collection, filter_lambda, key_lambda, value_lambda
        )
    }

    fn emit_entry_point(&self, em: &mut Emitter, main_ref: &str) -> Result<(), LowerError> {
        let file = em.new_file("Main.java");
        self.banner(em, file);
        let class_w = em.new_block(file, "public class Main", "{", "}", BraceStyle::SameLine);
        let main_w = em.new_block(
            class_w,
            "public static void main(String[] args)",
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
        ("Slate.java", runtime::runtime_source(TargetTag::Java))
    }

    fn native_compile(&self, out_dir: &Path, files: &[PathBuf]) -> Result<(), LowerError> {
        let names: Vec<String> = files
            .iter()
            .filter(|f| f.extension().map(|e| e == "java").unwrap_or(false))
            .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        let args: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        run_tool("javac", &args, out_dir)?;
        Ok(())
    }

    fn run(&self, out_dir: &Path) -> Result<RunOutput, LowerError> {
        run_program("java", &["Main"], out_dir)
    }
}

