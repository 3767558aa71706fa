//! Lowering driver
//!
//! Walks the resolved IR in a fixed order and issues structured write
//! operations against the active backend:
//!
//! 1. Modules in dependency order (a module before any module importing it).
//! 2. Within a module: file preamble, then module-level fields and
//!    constants, then type declarations, then members grouped by enclosing
//!    type with static members before instance members.
//! 3. Within a member: signature, then the body as a tree of statements.
//!
//! The traversal is stable under repeated compilation of the same IR, which
//! is what makes output byte-identical across runs. Per-declaration errors
//! are accumulated and lowering continues with the next declaration;
//! internal invariant violations break out immediately.

use std::collections::HashMap;
use std::path::PathBuf;

use super::backend::{
    Backend, ClassSig, CollOp, CtorSig, DatatypeSig, DtorSig, FieldSig, MethodSig, Param,
    RunOutput,
};
use super::ghost::{self, Fate};
use super::numeric;
use super::writer::{self, Emitter, FileOut, Wr};
use super::{CompileFailure, ErrorSink, LowerError};
use crate::options::{CompileLevel, Options};
use crate::rir::{
    BinOp, Block, CallRhs, Ctor, DatatypeDecl, DeclId, DeclKind, Expr, ExprKind, Formal,
    FunctionDecl, IteratorDecl, Lhs, Lit, Member, MemberKind, MethodDecl, Module, Program,
    SpecialField, Stmt, StmtKind, Tok, Type,
};

/// Everything a finished compilation produced.
#[derive(Debug)]
pub struct Artifacts {
    /// Rendered output files (generated sources plus the runtime blob).
    pub files: Vec<FileOut>,
    /// Paths written to disk, when the compile level called for it.
    pub written: Vec<PathBuf>,
    /// Fully qualified name of the discovered entry point, if any.
    pub main: Option<String>,
    /// Captured output of compile-and-run.
    pub run: Option<RunOutput>,
}

/// Lower a whole program against one backend.
pub fn compile_program(
    p: &Program,
    opts: &Options,
    backend: &dyn Backend,
) -> Result<Artifacts, CompileFailure> {
    let mut driver = Driver {
        p,
        opts,
        backend,
        em: Emitter::new(),
        sink: ErrorSink::new(),
        tmp: 0,
        tail: None,
        self_decl: None,
        self_member: None,
        current_outs: Vec::new(),
    };

    let main = driver.run_lowering().map_err(CompileFailure::from)?;

    let em = std::mem::take(&mut driver.em);
    let mut files = em.flush().map_err(CompileFailure::from)?;
    let (runtime_name, runtime_src) = backend.runtime_blob();
    files.push(FileOut {
        path: PathBuf::from(runtime_name),
        contents: runtime_src.to_string(),
    });

    if !driver.sink.is_empty() {
        return Err(CompileFailure {
            errors: std::mem::take(&mut driver.sink).into_errors(),
        });
    }

    let mut written = Vec::new();
    let mut run = None;
    if opts.level >= CompileLevel::Source {
        written = writer::write_all(&files, &opts.out_dir).map_err(CompileFailure::from)?;
    }
    if opts.level >= CompileLevel::Compile {
        backend
            .native_compile(&opts.out_dir, &written)
            .map_err(CompileFailure::from)?;
    }
    if opts.level >= CompileLevel::Run && main.is_some() {
        run = Some(backend.run(&opts.out_dir).map_err(CompileFailure::from)?);
    }

    Ok(Artifacts {
        files,
        written,
        main,
        run,
    })
}

/// Name a module is emitted under.
pub fn module_emit_name(module: &Module) -> String {
    if module.is_default {
        "_module".to_string()
    } else {
        module.name.clone()
    }
}

struct TailCtx {
    /// Loop label, absent on targets without labeled loops (the sentinel
    /// loop is the innermost there).
    label: Option<String>,
    /// Sanitized parameter names, in order, for the self-call rewrite.
    params: Vec<String>,
}

struct Driver<'a> {
    p: &'a Program,
    opts: &'a Options,
    backend: &'a dyn Backend,
    em: Emitter,
    sink: ErrorSink,
    /// Per-member counter for compiler-introduced locals.
    tmp: u32,
    tail: Option<TailCtx>,
    self_decl: Option<DeclId>,
    self_member: Option<String>,
    /// Sanitized out-parameter names of the member being lowered.
    current_outs: Vec<String>,
}

impl<'a> Driver<'a> {
    // ------------------------------------------------------------------
    // Program traversal
    // ------------------------------------------------------------------

    fn run_lowering(&mut self) -> Result<Option<String>, LowerError> {
        let order = self
            .p
            .module_order()
            .map_err(|e| LowerError::internal("module ordering", e.to_string()))?;

        let entry = self.find_entry_point()?;

        for module_id in order {
            let module = self.p.module(module_id);
            self.lower_module(module)?;
        }

        let main = match &entry {
            Some((decl, member)) => {
                let decl_ref = self.backend.decl_ref(self.p, *decl)?;
                let main_ref = self.backend.static_ref(&decl_ref, member);
                self.backend.emit_entry_point(&mut self.em, &main_ref)?;
                Some(format!("{}.{}", self.p.qualified_name(*decl), member))
            }
            None => None,
        };
        Ok(main)
    }

    /// Exactly one entry point is expected across the whole program. Zero
    /// matches produce a no-main artifact; more than one is an error.
    fn find_entry_point(&mut self) -> Result<Option<(DeclId, String)>, LowerError> {
        if let Some(fq) = &self.opts.main_override {
            for (idx, decl) in self.p.decls.iter().enumerate() {
                let id = DeclId(idx as u32);
                for member in decl.members() {
                    let name = format!("{}.{}", self.p.qualified_name(id), member.name);
                    if &name == fq {
                        return Ok(Some((id, member.name.clone())));
                    }
                }
            }
            self.sink.push(LowerError::unsupported(
                format!("an entry-point override naming `{}`, which does not exist", fq),
                Tok::default(),
                self.opts.target,
            ));
            return Ok(None);
        }

        let mut found: Option<(DeclId, String)> = None;
        for (idx, decl) in self.p.decls.iter().enumerate() {
            let id = DeclId(idx as u32);
            let is_default_class = matches!(&decl.kind, DeclKind::Class(c) if c.is_default_class);
            for member in decl.members() {
                if member.is_entry_candidate(is_default_class) {
                    if found.is_some() {
                        self.sink.push(LowerError::unsupported(
                            "more than one entry-point candidate".to_string(),
                            member.tok,
                            self.opts.target,
                        ));
                        return Ok(None);
                    }
                    found = Some((id, member.name.clone()));
                }
            }
        }
        Ok(found)
    }

    fn lower_module(&mut self, module: &Module) -> Result<(), LowerError> {
        let emit_name = module_emit_name(module);
        let file = self.em.new_file(self.backend.module_file(&emit_name));
        let deps: Vec<String> = module
            .imports
            .iter()
            .map(|&id| module_emit_name(self.p.module(id)))
            .collect();
        let pieces = self
            .backend
            .begin_file(&mut self.em, file, &emit_name, &deps);

        // The default class opens first so module-level fields and constants
        // precede type declarations; its methods are written back into the
        // still-open scope after the types have gone out.
        let default_class = module.decls.iter().copied().find(|&id| {
            matches!(&self.p.decl(id).kind, DeclKind::Class(c) if c.is_default_class)
        });

        let mut default_scope: Option<(DeclId, Wr)> = None;
        if let Some(id) = default_class {
            match self.open_class_scope(pieces.body, id) {
                Ok(w) => {
                    if let DeclKind::Class(c) = &self.p.decl(id).kind {
                        self.lower_data_members(w, id, &c.members)?;
                    }
                    default_scope = Some((id, w));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => self.sink.push(e),
            }
        }

        for &decl_id in &module.decls {
            if Some(decl_id) == default_class {
                continue;
            }
            match self.lower_decl(pieces.body, decl_id) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => self.sink.push(e),
            }
        }

        if let Some((id, w)) = default_scope {
            if let DeclKind::Class(c) = &self.p.decl(id).kind {
                self.lower_callable_members(w, id, &c.members)?;
            }
            self.em.seal(w);
        }
        self.em.seal(pieces.body);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn lower_decl(&mut self, w: Wr, id: DeclId) -> Result<(), LowerError> {
        let decl = self.p.decl(id);
        match ghost::decl_fate(decl, &self.backend.caps()) {
            Fate::Drop => return Ok(()),
            Fate::Reject(construct) => {
                return Err(LowerError::unsupported(
                    construct,
                    decl.tok,
                    self.opts.target,
                ));
            }
            Fate::Lower => {}
        }

        match &decl.kind {
            DeclKind::Class(c) | DeclKind::Trait(c) => {
                let class_w = self.open_class_scope(w, id)?;
                self.lower_data_members(class_w, id, &c.members)?;
                self.lower_callable_members(class_w, id, &c.members)?;
                self.em.seal(class_w);
                Ok(())
            }
            DeclKind::Datatype(dt) => self.lower_datatype(w, id, dt),
            DeclKind::Newtype(nt) => {
                let name = self.backend.decl_local_name(self.p, id);
                let default = self.default_value(&nt.base, decl.tok)?;
                self.backend
                    .declare_newtype(&mut self.em, w, self.p, &name, &nt.base, &default)
            }
            DeclKind::SubsetType(st) => {
                let name = self.backend.decl_local_name(self.p, id);
                let witness = match &st.witness {
                    Some(expr) => self.lower_expr(expr)?,
                    None => self.default_value(&st.base, decl.tok)?,
                };
                self.backend
                    .declare_subset_type(&mut self.em, w, self.p, &name, &st.base, &witness)
            }
            DeclKind::Iterator(it) => self.lower_iterator(w, id, it),
        }
    }

    fn open_class_scope(&mut self, w: Wr, id: DeclId) -> Result<Wr, LowerError> {
        let decl = self.p.decl(id);
        let (traits, is_default_class) = match &decl.kind {
            DeclKind::Class(c) | DeclKind::Trait(c) => (&c.traits[..], c.is_default_class),
            _ => (&[][..], false),
        };
        let mut trait_names = Vec::with_capacity(traits.len());
        for &t in traits {
            trait_names.push(self.backend.decl_ref(self.p, t)?);
        }
        let sig = ClassSig {
            name: self.backend.decl_local_name(self.p, id),
            type_params: decl.type_params.clone(),
            traits: trait_names,
            is_default_class,
            module: module_emit_name(self.p.module(decl.module)),
        };
        self.backend.open_class(&mut self.em, w, &sig)
    }

    /// Fields and constants, static before instance.
    fn lower_data_members(
        &mut self,
        w: Wr,
        id: DeclId,
        members: &[Member],
    ) -> Result<(), LowerError> {
        for pass_static in [true, false] {
            for member in members {
                if member.is_static != pass_static {
                    continue;
                }
                if !matches!(member.kind, MemberKind::Field(_) | MemberKind::Const(_)) {
                    continue;
                }
                match self.lower_member(w, id, member) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => self.sink.push(e),
                }
            }
        }
        Ok(())
    }

    /// Methods, functions, and constructors, static before instance.
    fn lower_callable_members(
        &mut self,
        w: Wr,
        id: DeclId,
        members: &[Member],
    ) -> Result<(), LowerError> {
        for pass_static in [true, false] {
            for member in members {
                if member.is_static != pass_static {
                    continue;
                }
                if matches!(member.kind, MemberKind::Field(_) | MemberKind::Const(_)) {
                    continue;
                }
                match self.lower_member(w, id, member) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => self.sink.push(e),
                }
            }
        }
        Ok(())
    }

    fn lower_member(&mut self, w: Wr, id: DeclId, member: &Member) -> Result<(), LowerError> {
        match ghost::member_fate(member, self.p, &self.backend.caps()) {
            Fate::Drop => return Ok(()),
            Fate::Reject(construct) => {
                return Err(LowerError::unsupported(
                    construct,
                    member.tok,
                    self.opts.target,
                ));
            }
            Fate::Lower => {}
        }

        self.tmp = 0;
        match &member.kind {
            MemberKind::Field(f) => {
                let init = match &f.init {
                    Some(expr) => Some(self.lower_expr(expr)?),
                    None => None,
                };
                let sig = FieldSig {
                    name: self.backend.sanitize(&member.name),
                    ty: f.ty.clone(),
                    is_static: member.is_static,
                    is_const: false,
                    init,
                };
                self.backend.declare_field(&mut self.em, w, self.p, &sig)
            }
            MemberKind::Const(c) => {
                // A constant whose RHS mentions ghost state is emitted with
                // the RHS erased to the type's default value.
                let init = match (&c.rhs, ghost::const_rhs_erased(c)) {
                    (Some(rhs), false) => self.lower_expr(rhs)?,
                    _ => self.default_value(&c.ty, member.tok)?,
                };
                let sig = FieldSig {
                    name: self.backend.sanitize(&member.name),
                    ty: c.ty.clone(),
                    is_static: member.is_static,
                    is_const: true,
                    init: Some(init),
                };
                self.backend.declare_field(&mut self.em, w, self.p, &sig)
            }
            MemberKind::Method(m) => self.lower_method(w, id, member, m, false),
            MemberKind::Constructor(m) => self.lower_method(w, id, member, m, true),
            MemberKind::Function(f) | MemberKind::Predicate(f) => {
                self.lower_function(w, id, member, f)
            }
            MemberKind::Lemma(_) => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Methods and functions
    // ------------------------------------------------------------------

    fn method_sig(
        &mut self,
        id: DeclId,
        member: &Member,
        m: &MethodDecl,
        is_constructor: bool,
    ) -> Result<MethodSig, LowerError> {
        let ins = ghost::compiled_formals(&m.ins)
            .into_iter()
            .map(|f| Param {
                name: self.backend.sanitize(&f.name),
                ty: f.ty.clone(),
            })
            .collect();
        let outs: Vec<Param> = ghost::compiled_formals(&m.outs)
            .into_iter()
            .map(|f| Param {
                name: self.backend.sanitize(&f.name),
                ty: f.ty.clone(),
            })
            .collect();
        let mut out_defaults = Vec::with_capacity(outs.len());
        for out in &outs {
            out_defaults.push(self.default_value(&out.ty, member.tok)?);
        }
        Ok(MethodSig {
            name: self.backend.sanitize(&member.name),
            is_static: member.is_static,
            is_constructor,
            type_params: member.type_params.clone(),
            ins,
            outs,
            out_defaults,
            enclosing: self.backend.decl_local_name(self.p, id),
            result: None,
        })
    }

    fn lower_method(
        &mut self,
        w: Wr,
        id: DeclId,
        member: &Member,
        m: &MethodDecl,
        is_constructor: bool,
    ) -> Result<(), LowerError> {
        let body = match &m.body {
            Some(body) => body,
            None => return Ok(()),
        };
        let sig = self.method_sig(id, member, m, is_constructor)?;
        let body_w = self.backend.open_method(&mut self.em, w, self.p, &sig)?;

        self.self_decl = Some(id);
        self.self_member = Some(member.name.clone());
        self.current_outs = sig.outs.iter().map(|o| o.name.clone()).collect();

        let stmt_w = if m.is_tail_recursive {
            // Wrap the body in a labeled loop; self-calls become parameter
            // assignments plus a jump back to the label. Targets without
            // labels use the loop itself as the sentinel.
            let label = self
                .backend
                .caps()
                .labeled_loops
                .then(|| "TAIL_CALL_START".to_string());
            self.tail = Some(TailCtx {
                label: label.clone(),
                params: sig.ins.iter().map(|p| p.name.clone()).collect(),
            });
            self.backend
                .loop_block(&mut self.em, body_w, label.as_deref())
        } else {
            body_w
        };

        self.lower_block(stmt_w, body)?;
        if m.is_tail_recursive {
            // The loop's fall-through iteration must exit.
            let outs = self.current_outs.clone();
            self.backend.return_stmt(&mut self.em, stmt_w, &outs);
            self.em.seal(stmt_w);
        }
        self.em.seal(body_w);

        self.tail = None;
        self.self_decl = None;
        self.self_member = None;
        self.current_outs = Vec::new();
        Ok(())
    }

    fn lower_function(
        &mut self,
        w: Wr,
        id: DeclId,
        member: &Member,
        f: &FunctionDecl,
    ) -> Result<(), LowerError> {
        let body = match &f.body {
            Some(body) => body,
            None => return Ok(()),
        };
        // Ghost formals of a function stay in its signature; call sites
        // substitute default values for them.
        let ins = f
            .formals
            .iter()
            .map(|x| Param {
                name: self.backend.sanitize(&x.name),
                ty: x.ty.clone(),
            })
            .collect();
        let sig = MethodSig {
            name: self.backend.sanitize(&member.name),
            is_static: member.is_static,
            is_constructor: false,
            type_params: member.type_params.clone(),
            ins,
            outs: Vec::new(),
            out_defaults: Vec::new(),
            enclosing: self.backend.decl_local_name(self.p, id),
            result: Some(f.result.clone()),
        };
        let body_w = self.backend.open_method(&mut self.em, w, self.p, &sig)?;

        self.self_decl = Some(id);
        self.self_member = Some(member.name.clone());

        if f.is_tail_recursive {
            let label = self
                .backend
                .caps()
                .labeled_loops
                .then(|| "TAIL_CALL_START".to_string());
            self.tail = Some(TailCtx {
                label: label.clone(),
                params: sig.ins.iter().map(|p| p.name.clone()).collect(),
            });
            let loop_w = self
                .backend
                .loop_block(&mut self.em, body_w, label.as_deref());
            self.lower_tail_function_expr(loop_w, body)?;
            self.em.seal(loop_w);
        } else {
            let rendered = self.lower_expr(body)?;
            self.backend
                .return_stmt(&mut self.em, body_w, &[rendered]);
        }
        self.em.seal(body_w);

        self.tail = None;
        self.self_decl = None;
        self.self_member = None;
        Ok(())
    }

    /// Statement-form lowering of a tail-recursive function body: branches
    /// recurse, self-calls in tail position become jumps, every other leaf
    /// returns.
    fn lower_tail_function_expr(&mut self, w: Wr, expr: &Expr) -> Result<(), LowerError> {
        match &expr.kind {
            ExprKind::Ite { cond, thn, els } => {
                let cond_s = self.lower_expr(cond)?;
                let then_w = self.backend.if_block(&mut self.em, w, &cond_s);
                self.lower_tail_function_expr(then_w, thn)?;
                self.em.seal(then_w);
                let else_w = self.backend.else_block(&mut self.em, w);
                self.lower_tail_function_expr(else_w, els)?;
                self.em.seal(else_w);
                Ok(())
            }
            ExprKind::Let { var, rhs, body } => {
                let rhs_s = self.lower_expr(rhs)?;
                let name = self.backend.sanitize(&var.name);
                self.backend
                    .declare_local(&mut self.em, w, self.p, &name, &var.ty, Some(&rhs_s))?;
                self.lower_tail_function_expr(w, body)
            }
            ExprKind::Match {
                scrutinee,
                arms,
                taken_arm,
            } => {
                if let Some(idx) = taken_arm {
                    return self.lower_tail_function_expr(w, &arms[*idx].body);
                }
                let scrut = self.lower_expr(scrutinee)?;
                let scrut_var = self.fresh("_source");
                self.backend.declare_local(
                    &mut self.em,
                    w,
                    self.p,
                    &scrut_var,
                    &scrutinee.ty,
                    Some(&scrut),
                )?;
                let sig = self.datatype_sig_for(&scrutinee.ty, expr.tok)?;
                for (i, arm) in arms.iter().enumerate() {
                    let arm_w = if i + 1 == arms.len() {
                        // Last arm needs no test; the match is exhaustive.
                        w
                    } else {
                        let test = self
                            .backend
                            .ctor_test(&scrut_var, &sig.ctors[arm.ctor]);
                        self.backend.if_block(&mut self.em, w, &test)
                    };
                    for binder in ghost::compiled_formals(&arm.binders) {
                        let value = self
                            .backend
                            .destructor_get(&scrut_var, &self.backend.sanitize(&binder.name));
                        let name = self.backend.sanitize(&binder.name);
                        self.backend.declare_local(
                            &mut self.em,
                            arm_w,
                            self.p,
                            &name,
                            &binder.ty,
                            Some(&value),
                        )?;
                    }
                    self.lower_tail_function_expr(arm_w, &arm.body)?;
                    if arm_w != w {
                        self.em.seal(arm_w);
                    }
                }
                Ok(())
            }
            ExprKind::FnCall {
                decl,
                member,
                receiver,
                args,
                ..
            } if self.is_self_call(*decl, member, receiver.is_none()) => {
                let mut rendered = Vec::with_capacity(args.len());
                for arg in args {
                    rendered.push((self.lower_expr(arg)?, arg.ty.clone()));
                }
                self.emit_tail_jump(w, &rendered)
            }
            _ => {
                let rendered = self.lower_expr(expr)?;
                self.backend.return_stmt(&mut self.em, w, &[rendered]);
                Ok(())
            }
        }
    }

    fn is_self_call(&self, decl: DeclId, member: &str, static_call: bool) -> bool {
        let _ = static_call;
        self.tail.is_some()
            && self.self_decl == Some(decl)
            && self.self_member.as_deref() == Some(member)
    }

    /// Assignments to the bound parameters, then a jump to the loop label.
    fn emit_tail_jump(&mut self, w: Wr, args: &[(String, Type)]) -> Result<(), LowerError> {
        let tail = match &self.tail {
            Some(t) => t,
            None => {
                return Err(LowerError::internal(
                    "tail-call rewrite",
                    "self-call rewrite outside a tail context",
                ));
            }
        };
        let params = tail.params.clone();
        let label = tail.label.clone();
        // Arguments go through temporaries so earlier parameter updates
        // cannot clobber later argument reads.
        let mut temps = Vec::with_capacity(args.len());
        for (arg, ty) in args {
            let t = self.fresh("_tc");
            self.backend
                .declare_local(&mut self.em, w, self.p, &t, ty, Some(arg))?;
            temps.push(t);
        }
        for (param, temp) in params.iter().zip(&temps) {
            self.backend.assign_stmt(&mut self.em, w, param, temp);
        }
        self.backend
            .continue_stmt(&mut self.em, w, label.as_deref());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Datatypes
    // ------------------------------------------------------------------

    fn datatype_sig(&mut self, id: DeclId, dt: &DatatypeDecl) -> Result<DatatypeSig, LowerError> {
        let decl = self.p.decl(id);
        if dt.ctors.is_empty() {
            return Err(LowerError::internal(
                "datatype lowering",
                format!("datatype {} has zero constructors", decl.name),
            ));
        }
        let lazy = dt.co && !self.backend.caps().native_codata;
        let ctors: Vec<CtorSig> = dt
            .ctors
            .iter()
            .map(|c| self.ctor_sig(c, lazy))
            .collect();
        let default = &dt.ctors[dt.default_ctor];
        let mut default_args = Vec::new();
        for formal in ghost::compiled_formals(&default.formals) {
            default_args.push(self.default_value(&formal.ty, decl.tok)?);
        }
        Ok(DatatypeSig {
            name: self.backend.decl_local_name(self.p, id),
            module: module_emit_name(self.p.module(decl.module)),
            type_params: decl.type_params.clone(),
            co: dt.co,
            is_record: dt.is_record(),
            ctors,
            default_ctor: dt.default_ctor,
            default_args,
        })
    }

    fn ctor_sig(&self, ctor: &Ctor, lazy: bool) -> CtorSig {
        CtorSig {
            name: ctor.name.clone(),
            test_name: format!("is_{}", ctor.name),
            formals: ghost::compiled_formals(&ctor.formals)
                .into_iter()
                .map(|f| Param {
                    name: self.backend.sanitize(&f.name),
                    ty: f.ty.clone(),
                })
                .collect(),
            lazy,
        }
    }

    fn lower_datatype(&mut self, w: Wr, id: DeclId, dt: &DatatypeDecl) -> Result<(), LowerError> {
        let sig = self.datatype_sig(id, dt)?;
        let base_w = self.backend.datatype_base(&mut self.em, w, self.p, &sig)?;

        if !sig.is_record {
            for ctor in &sig.ctors {
                self.backend
                    .datatype_ctor(&mut self.em, w, self.p, &sig, ctor)?;
            }
            for dtor in self.collect_dtors(dt) {
                self.backend
                    .datatype_dtor(&mut self.em, base_w, self.p, &sig, &dtor)?;
            }
        }

        self.lower_callable_members(base_w, id, &dt.members)?;
        self.em.seal(base_w);
        Ok(())
    }

    /// Named destructors dispatch by variant tag: one per distinct non-ghost
    /// formal name, listing the constructors that carry it.
    fn collect_dtors(&self, dt: &DatatypeDecl) -> Vec<DtorSig> {
        let mut order: Vec<String> = Vec::new();
        let mut by_name: HashMap<String, DtorSig> = HashMap::new();
        for ctor in &dt.ctors {
            for formal in ghost::compiled_formals(&ctor.formals) {
                let name = self.backend.sanitize(&formal.name);
                let entry = by_name.entry(name.clone()).or_insert_with(|| {
                    order.push(name.clone());
                    DtorSig {
                        name,
                        ty: formal.ty.clone(),
                        ctors: Vec::new(),
                    }
                });
                entry.ctors.push(ctor.name.clone());
            }
        }
        order.into_iter().filter_map(|n| by_name.remove(&n)).collect()
    }

    fn datatype_sig_for(&mut self, ty: &Type, tok: Tok) -> Result<DatatypeSig, LowerError> {
        match ty {
            Type::UserDefined { decl, .. } => match &self.p.decl(*decl).kind {
                DeclKind::Datatype(dt) => {
                    let dt = dt.clone();
                    self.datatype_sig(*decl, &dt)
                }
                _ => Err(LowerError::internal(
                    "match lowering",
                    format!("match scrutinee of non-datatype type at {}", tok),
                )),
            },
            _ => Err(LowerError::internal(
                "match lowering",
                format!("match scrutinee of type {} at {}", ty, tok),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Iterators
    // ------------------------------------------------------------------

    /// An iterator lowers to a class: captured in-parameters, yielded-value
    /// fields, per-yield queues filled by running the body at construction,
    /// and a `MoveNext` cursor over the queues.
    fn lower_iterator(&mut self, w: Wr, id: DeclId, it: &IteratorDecl) -> Result<(), LowerError> {
        let decl = self.p.decl(id);
        let sig = ClassSig {
            name: self.backend.decl_local_name(self.p, id),
            type_params: decl.type_params.clone(),
            traits: Vec::new(),
            is_default_class: false,
            module: module_emit_name(self.p.module(decl.module)),
        };
        let class_w = self.backend.open_class(&mut self.em, w, &sig)?;

        let ins = ghost::compiled_formals(&it.ins);
        let yields = ghost::compiled_formals(&it.yields);

        for f in ins.iter().chain(&yields) {
            let field = FieldSig {
                name: self.backend.sanitize(&f.name),
                ty: f.ty.clone(),
                is_static: false,
                is_const: false,
                init: None,
            };
            self.backend
                .declare_field(&mut self.em, class_w, self.p, &field)?;
        }
        for f in &yields {
            let field = FieldSig {
                name: format!("_q_{}", f.name),
                ty: Type::seq(f.ty.clone()),
                is_static: false,
                is_const: false,
                init: Some(self.backend.collection_literal(
                    self.p,
                    &Type::seq(f.ty.clone()),
                    &[],
                    decl.tok,
                )?),
            };
            self.backend
                .declare_field(&mut self.em, class_w, self.p, &field)?;
        }
        let cursor = FieldSig {
            name: "_cursor".to_string(),
            ty: Type::Int,
            is_static: false,
            is_const: false,
            init: Some(self.backend.literal(
                self.p,
                &Lit::Int(0.into()),
                &Type::Int,
                decl.tok,
            )?),
        };
        self.backend
            .declare_field(&mut self.em, class_w, self.p, &cursor)?;

        // Constructor: capture the ins and run the body, enqueueing yields.
        let ctor_decl = MethodDecl {
            ins: it.ins.clone(),
            outs: Vec::new(),
            body: None,
            is_tail_recursive: false,
        };
        let ctor_member = Member {
            name: sig.name.clone(),
            tok: decl.tok,
            ghost: false,
            is_static: false,
            type_params: Vec::new(),
            kind: MemberKind::Constructor(ctor_decl.clone()),
        };
        let ctor_sig = self.method_sig(id, &ctor_member, &ctor_decl, true)?;
        let ctor_w = self.backend.open_method(&mut self.em, class_w, self.p, &ctor_sig)?;
        let this = self.backend.this_expr();
        for f in &ins {
            let name = self.backend.sanitize(&f.name);
            let lhs = self.backend.field_access(this, &name);
            self.backend.assign_stmt(&mut self.em, ctor_w, &lhs, &name);
        }
        for f in &yields {
            let name = self.backend.sanitize(&f.name);
            let default = self.default_value(&f.ty, decl.tok)?;
            self.backend
                .declare_local(&mut self.em, ctor_w, self.p, &name, &f.ty, Some(&default))?;
        }
        if let Some(body) = &it.body {
            self.self_decl = Some(id);
            self.lower_block(ctor_w, body)?;
            self.self_decl = None;
        }
        self.em.seal(ctor_w);

        // MoveNext: step the cursor, refresh the yield fields.
        self.emit_move_next(class_w, id, decl.tok, &yields)?;
        self.lower_callable_members(class_w, id, &it.members)?;
        self.em.seal(class_w);
        Ok(())
    }

    fn emit_move_next(
        &mut self,
        class_w: Wr,
        id: DeclId,
        tok: Tok,
        yields: &[&Formal],
    ) -> Result<(), LowerError> {
        let more = Param {
            name: "more".to_string(),
            ty: Type::Bool,
        };
        let sig = MethodSig {
            name: "MoveNext".to_string(),
            is_static: false,
            is_constructor: false,
            type_params: Vec::new(),
            ins: Vec::new(),
            outs: vec![more],
            out_defaults: vec![self.backend.literal(self.p, &Lit::Bool(false), &Type::Bool, tok)?],
            enclosing: self.backend.decl_local_name(self.p, id),
            result: None,
        };
        let w = self.backend.open_method(&mut self.em, class_w, self.p, &sig)?;
        self.current_outs = vec!["more".to_string()];

        let this = self.backend.this_expr();
        let cursor = self.backend.field_access(this, "_cursor");
        let first_queue = match yields.first() {
            Some(f) => self
                .backend
                .field_access(this, &format!("_q_{}", f.name)),
            None => {
                // A yield-less iterator terminates immediately.
                let false_lit = self.backend.literal(self.p, &Lit::Bool(false), &Type::Bool, tok)?;
                self.backend.assign_stmt(&mut self.em, w, "more", &false_lit);
                let outs = self.current_outs.clone();
                self.backend.return_stmt(&mut self.em, w, &outs);
                self.current_outs = Vec::new();
                self.em.seal(w);
                return Ok(());
            }
        };
        let len = self.backend.collection_call(CollOp::Cardinality, &[&first_queue]);
        let cond = self.backend.compare(BinOp::Lt, &cursor, &len, &Type::Int);

        let then_w = self.backend.if_block(&mut self.em, w, &cond);
        for f in yields {
            let name = self.backend.sanitize(&f.name);
            let queue = self.backend.field_access(this, &format!("_q_{}", f.name));
            let value = self
                .backend
                .collection_call(CollOp::SeqIndex, &[&queue, &cursor]);
            let lhs = self.backend.field_access(this, &name);
            self.backend.assign_stmt(&mut self.em, then_w, &lhs, &value);
        }
        let one = self.backend.literal(self.p, &Lit::Int(1.into()), &Type::Int, tok)?;
        let bumped = self.backend.arith_raw(BinOp::Add, &cursor, &one, &Type::Int);
        self.backend.assign_stmt(&mut self.em, then_w, &cursor, &bumped);
        let true_lit = self.backend.literal(self.p, &Lit::Bool(true), &Type::Bool, tok)?;
        self.backend.assign_stmt(&mut self.em, then_w, "more", &true_lit);
        let outs = self.current_outs.clone();
        self.backend.return_stmt(&mut self.em, then_w, &outs);
        self.em.seal(then_w);

        let else_w = self.backend.else_block(&mut self.em, w);
        let false_lit = self.backend.literal(self.p, &Lit::Bool(false), &Type::Bool, tok)?;
        self.backend.assign_stmt(&mut self.em, else_w, "more", &false_lit);
        let outs = self.current_outs.clone();
        self.backend.return_stmt(&mut self.em, else_w, &outs);
        self.em.seal(else_w);

        self.current_outs = Vec::new();
        self.em.seal(w);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn lower_block(&mut self, w: Wr, block: &Block) -> Result<(), LowerError> {
        for stmt in block {
            self.lower_stmt(w, stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, w: Wr, stmt: &Stmt) -> Result<(), LowerError> {
        match &stmt.kind {
            StmtKind::VarDecl { locals, rhs } => {
                let compiled = ghost::compiled_formals(locals);
                let rendered = match rhs {
                    Some(expr) => Some(self.lower_expr(expr)?),
                    None => None,
                };
                for (i, local) in compiled.iter().enumerate() {
                    let name = self.backend.sanitize(&local.name);
                    let init = if i == 0 {
                        match &rendered {
                            Some(r) => r.clone(),
                            None => self.default_value(&local.ty, stmt.tok)?,
                        }
                    } else {
                        self.default_value(&local.ty, stmt.tok)?
                    };
                    self.backend
                        .declare_local(&mut self.em, w, self.p, &name, &local.ty, Some(&init))?;
                }
                Ok(())
            }
            StmtKind::Assign { lhs, rhs } => {
                let lhs_s = self.lower_lhs(lhs)?;
                let rhs_s = self.lower_expr(rhs)?;
                self.backend.assign_stmt(&mut self.em, w, &lhs_s, &rhs_s);
                Ok(())
            }
            StmtKind::MultiAssign { lhss, call } => {
                if self.callee_is_ghost(call) {
                    return Ok(());
                }
                if self.try_tail_jump(w, call)? {
                    return Ok(());
                }
                let call_s = self.render_method_call(call)?;
                let mut lhs_strs = Vec::with_capacity(lhss.len());
                for lhs in lhss {
                    lhs_strs.push(self.lower_lhs(lhs)?);
                }
                if lhs_strs.len() <= 1 {
                    match lhs_strs.first() {
                        Some(lhs) => self.backend.assign_stmt(&mut self.em, w, lhs, &call_s),
                        None => self.backend.expr_stmt(&mut self.em, w, &call_s),
                    }
                    return Ok(());
                }
                let out_tys = self.callee_out_types(call)?;
                self.backend
                    .multi_assign_stmt(&mut self.em, w, &lhs_strs, &out_tys, &call_s)
            }
            StmtKind::Call(call) => {
                // Lemma invocations and ghost-method calls become no-ops.
                if self.callee_is_ghost(call) {
                    return Ok(());
                }
                if self.try_tail_jump(w, call)? {
                    return Ok(());
                }
                let call_s = self.render_method_call(call)?;
                self.backend.expr_stmt(&mut self.em, w, &call_s);
                Ok(())
            }
            StmtKind::New { lhs, decl, args } => {
                let lhs_s = self.lower_lhs(lhs)?;
                let rendered = self.lower_ctor_args(*decl, args)?;
                let decl_ref = self.backend.decl_ref(self.p, *decl)?;
                let rhs = self.backend.new_object(&decl_ref, &rendered);
                self.backend.assign_stmt(&mut self.em, w, &lhs_s, &rhs);
                Ok(())
            }
            StmtKind::If { cond, then, els } => {
                let cond_s = self.lower_expr(cond)?;
                let then_w = self.backend.if_block(&mut self.em, w, &cond_s);
                self.lower_block(then_w, then)?;
                self.em.seal(then_w);
                if let Some(els) = els {
                    let else_w = self.backend.else_block(&mut self.em, w);
                    self.lower_block(else_w, els)?;
                    self.em.seal(else_w);
                }
                Ok(())
            }
            StmtKind::While { label, cond, body } => {
                self.check_label(label.as_deref(), stmt.tok)?;
                let cond_s = self.lower_expr(cond)?;
                let body_w =
                    self.backend
                        .while_block(&mut self.em, w, label.as_deref(), &cond_s);
                self.lower_block(body_w, body)?;
                self.em.seal(body_w);
                Ok(())
            }
            StmtKind::ForRange {
                var,
                lo,
                hi,
                up,
                body,
            } => {
                let lo_s = self.lower_expr(lo)?;
                let hi_s = self.lower_expr(hi)?;
                let param = Param {
                    name: self.backend.sanitize(&var.name),
                    ty: var.ty.clone(),
                };
                let body_w = self.backend.for_range_block(
                    &mut self.em,
                    w,
                    self.p,
                    &param,
                    &lo_s,
                    &hi_s,
                    *up,
                )?;
                self.lower_block(body_w, body)?;
                self.em.seal(body_w);
                Ok(())
            }
            StmtKind::ForEach {
                var,
                collection,
                body,
            } => {
                let coll_s = self.lower_expr(collection)?;
                let param = Param {
                    name: self.backend.sanitize(&var.name),
                    ty: var.ty.clone(),
                };
                let body_w =
                    self.backend
                        .foreach_block(&mut self.em, w, self.p, &param, &coll_s)?;
                self.lower_block(body_w, body)?;
                self.em.seal(body_w);
                Ok(())
            }
            StmtKind::Loop { label, body } => {
                self.check_label(label.as_deref(), stmt.tok)?;
                let body_w = self.backend.loop_block(&mut self.em, w, label.as_deref());
                self.lower_block(body_w, body)?;
                self.em.seal(body_w);
                Ok(())
            }
            StmtKind::Break { label } => {
                self.check_label(label.as_deref(), stmt.tok)?;
                self.backend.break_stmt(&mut self.em, w, label.as_deref());
                Ok(())
            }
            StmtKind::Return { values } => {
                if values.is_empty() {
                    let outs = self.current_outs.clone();
                    self.backend.return_stmt(&mut self.em, w, &outs);
                } else {
                    // `return E, ...` assigns the outs, then returns them.
                    let rendered: Result<Vec<String>, LowerError> =
                        values.iter().map(|v| self.lower_expr(v)).collect();
                    let rendered = rendered?;
                    let outs = self.current_outs.clone();
                    for (out, value) in outs.iter().zip(&rendered) {
                        self.backend.assign_stmt(&mut self.em, w, out, value);
                    }
                    self.backend.return_stmt(&mut self.em, w, &outs);
                }
                Ok(())
            }
            StmtKind::Yield => {
                // Enqueue the current yield values; see `lower_iterator`.
                let decl = match self.self_decl {
                    Some(d) => d,
                    None => {
                        return Err(LowerError::internal(
                            "yield lowering",
                            "yield outside an iterator body",
                        ));
                    }
                };
                let it = match &self.p.decl(decl).kind {
                    DeclKind::Iterator(it) => it,
                    _ => {
                        return Err(LowerError::internal(
                            "yield lowering",
                            "yield in a non-iterator declaration",
                        ));
                    }
                };
                let this = self.backend.this_expr();
                for f in ghost::compiled_formals(&it.yields) {
                    let name = self.backend.sanitize(&f.name);
                    let queue = self.backend.field_access(this, &format!("_q_{}", f.name));
                    let singleton = self.backend.collection_literal(
                        self.p,
                        &Type::seq(f.ty.clone()),
                        &[name.clone()],
                        stmt.tok,
                    )?;
                    let appended = self
                        .backend
                        .collection_call(CollOp::Concat, &[&queue, &singleton]);
                    self.backend.assign_stmt(&mut self.em, w, &queue, &appended);
                }
                Ok(())
            }
            StmtKind::Print { args } => {
                for arg in args {
                    let rendered = self.lower_expr(arg)?;
                    self.backend.print_stmt(&mut self.em, w, &rendered);
                }
                Ok(())
            }
            StmtKind::Match {
                scrutinee,
                arms,
                taken_arm,
            } => {
                // A match over a ghost scrutinee collapses to its taken arm.
                if let Some(idx) = taken_arm {
                    return self.lower_block(w, &arms[*idx].body);
                }
                let scrut = self.lower_expr(scrutinee)?;
                let scrut_var = self.fresh("_source");
                self.backend.declare_local(
                    &mut self.em,
                    w,
                    self.p,
                    &scrut_var,
                    &scrutinee.ty,
                    Some(&scrut),
                )?;
                let sig = self.datatype_sig_for(&scrutinee.ty, stmt.tok)?;
                for (i, arm) in arms.iter().enumerate() {
                    let arm_w = if i + 1 == arms.len() {
                        w
                    } else {
                        let test = self.backend.ctor_test(&scrut_var, &sig.ctors[arm.ctor]);
                        self.backend.if_block(&mut self.em, w, &test)
                    };
                    for binder in ghost::compiled_formals(&arm.binders) {
                        let value = self
                            .backend
                            .destructor_get(&scrut_var, &self.backend.sanitize(&binder.name));
                        let name = self.backend.sanitize(&binder.name);
                        self.backend.declare_local(
                            &mut self.em,
                            arm_w,
                            self.p,
                            &name,
                            &binder.ty,
                            Some(&value),
                        )?;
                    }
                    self.lower_block(arm_w, &arm.body)?;
                    if arm_w != w {
                        self.em.seal(arm_w);
                    }
                }
                Ok(())
            }
            StmtKind::Assert { .. } => Ok(()),
            StmtKind::Block(block) => self.lower_block(w, block),
            StmtKind::Absurd => {
                self.backend
                    .absurd_stmt(&mut self.em, w, "unreachable code reached");
                Ok(())
            }
        }
    }

    fn check_label(&self, label: Option<&str>, tok: Tok) -> Result<(), LowerError> {
        if label.is_some() && !self.backend.caps().labeled_loops {
            return Err(LowerError::unsupported(
                "a labeled loop".to_string(),
                tok,
                self.opts.target,
            ));
        }
        Ok(())
    }

    fn lower_lhs(&mut self, lhs: &Lhs) -> Result<String, LowerError> {
        match lhs {
            Lhs::Var(name) => Ok(self.backend.sanitize(name)),
            Lhs::Field { obj, field, .. } => {
                let obj_s = self.lower_expr(obj)?;
                Ok(self
                    .backend
                    .field_access(&obj_s, &self.backend.sanitize(field)))
            }
            Lhs::Index { base, indices } => {
                let base_s = self.lower_expr(base)?;
                let idx: Result<Vec<String>, LowerError> =
                    indices.iter().map(|i| self.lower_expr(i)).collect();
                Ok(self.backend.array_select(&base_s, &idx?))
            }
        }
    }

    fn callee_member(&self, call: &CallRhs) -> Result<&'a Member, LowerError> {
        self.p.find_member(call.decl, &call.member).ok_or_else(|| {
            LowerError::internal(
                "call lowering",
                format!(
                    "unresolved member {}.{}",
                    self.p.qualified_name(call.decl),
                    call.member
                ),
            )
        })
    }

    fn callee_is_ghost(&self, call: &CallRhs) -> bool {
        match self.p.find_member(call.decl, &call.member) {
            Some(member) => {
                matches!(
                    ghost::member_fate(member, self.p, &self.backend.caps()),
                    Fate::Drop
                )
            }
            None => false,
        }
    }

    fn try_tail_jump(&mut self, w: Wr, call: &CallRhs) -> Result<bool, LowerError> {
        if !self.is_self_call(call.decl, &call.member, call.receiver.is_none()) {
            return Ok(false);
        }
        let member = self.callee_member(call)?;
        let ins = match &member.kind {
            MemberKind::Method(m) => &m.ins,
            _ => return Ok(false),
        };
        let mut rendered = Vec::new();
        for (formal, arg) in ins.iter().zip(&call.args) {
            if formal.ghost {
                continue;
            }
            rendered.push((self.lower_expr(arg)?, formal.ty.clone()));
        }
        self.emit_tail_jump(w, &rendered)?;
        Ok(true)
    }

    /// Render a method call, dropping ghost arguments to match the erased
    /// signature and threading type descriptors on reified targets.
    fn render_method_call(&mut self, call: &CallRhs) -> Result<String, LowerError> {
        let member = self.callee_member(call)?;
        let ins = match &member.kind {
            MemberKind::Method(m) | MemberKind::Constructor(m) => &m.ins,
            _ => {
                return Err(LowerError::internal(
                    "call lowering",
                    format!("statement call of non-method {}", call.member),
                ));
            }
        };
        let mut args = self.descriptor_args(&member.type_params, &call.type_args, member.tok)?;
        for (formal, arg) in ins.iter().zip(&call.args) {
            if formal.ghost {
                continue;
            }
            args.push(self.lower_expr(arg)?);
        }
        let target = match &call.receiver {
            Some(recv) => {
                let recv_s = self.lower_expr(recv)?;
                self.backend
                    .field_access(&recv_s, &self.backend.sanitize(&call.member))
            }
            None => {
                let decl_ref = self.backend.decl_ref(self.p, call.decl)?;
                self.backend
                    .static_ref(&decl_ref, &self.backend.sanitize(&call.member))
            }
        };
        Ok(self.backend.call(&target, &args))
    }

    fn callee_out_types(&mut self, call: &CallRhs) -> Result<Vec<String>, LowerError> {
        let member = self.callee_member(call)?;
        let outs = match &member.kind {
            MemberKind::Method(m) => ghost::compiled_formals(&m.outs),
            _ => Vec::new(),
        };
        let mut tys = Vec::with_capacity(outs.len());
        for out in outs {
            tys.push(self.backend.type_name(self.p, &out.ty, member.tok)?);
        }
        Ok(tys)
    }

    /// Class constructor arguments, ghost-erased.
    fn lower_ctor_args(&mut self, decl: DeclId, args: &[Expr]) -> Result<Vec<String>, LowerError> {
        let ctor = self
            .p
            .decl(decl)
            .members()
            .iter()
            .find(|m| matches!(m.kind, MemberKind::Constructor(_)));
        let mut rendered = Vec::new();
        match ctor {
            Some(member) => {
                if let MemberKind::Constructor(m) = &member.kind {
                    for (formal, arg) in m.ins.iter().zip(args) {
                        if formal.ghost {
                            continue;
                        }
                        rendered.push(self.lower_expr(arg)?);
                    }
                }
            }
            None => {
                for arg in args {
                    rendered.push(self.lower_expr(arg)?);
                }
            }
        }
        Ok(rendered)
    }

    /// The driver always supplies descriptors on reified-generics targets;
    /// erased targets get none.
    fn descriptor_args(
        &mut self,
        type_params: &[String],
        type_args: &[Type],
        tok: Tok,
    ) -> Result<Vec<String>, LowerError> {
        if self.backend.caps().erased_generics || type_params.is_empty() {
            return Ok(Vec::new());
        }
        let mut descriptors = Vec::with_capacity(type_args.len());
        for ty in type_args {
            descriptors.push(self.backend.type_descriptor(self.p, ty, tok)?);
        }
        Ok(descriptors)
    }

    fn fresh(&mut self, prefix: &str) -> String {
        let n = self.tmp;
        self.tmp += 1;
        format!("{}{}", prefix, n)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn lower_expr(&mut self, expr: &Expr) -> Result<String, LowerError> {
        if expr.ty == Type::Proxy {
            return Err(LowerError::internal(
                "expression lowering",
                format!("unresolved type proxy reached the backend at {}", expr.tok),
            ));
        }
        match &expr.kind {
            ExprKind::Lit(lit) => self.backend.literal(self.p, lit, &expr.ty, expr.tok),
            ExprKind::Var(name) => Ok(self.backend.sanitize(name)),
            ExprKind::This => Ok(self.backend.this_expr().to_string()),

            ExprKind::BinOp { op, lhs, rhs } => {
                let a = self.lower_expr(lhs)?;
                let b = self.lower_expr(rhs)?;
                numeric::lower_binop(self.backend, *op, &lhs.ty, &expr.ty, &a, &b, expr.tok)
            }
            ExprKind::UnaryOp { op, operand } => {
                let rendered = self.lower_expr(operand)?;
                Ok(self.backend.unary(*op, &rendered, &operand.ty))
            }
            ExprKind::Convert { operand } => {
                let rendered = self.lower_expr(operand)?;
                self.backend
                    .convert(self.p, &operand.ty, &expr.ty, &rendered, expr.tok)
            }

            ExprKind::SeqDisplay(elems)
            | ExprKind::SetDisplay(elems)
            | ExprKind::MultisetDisplay(elems) => {
                let rendered: Result<Vec<String>, LowerError> =
                    elems.iter().map(|e| self.lower_expr(e)).collect();
                self.backend
                    .collection_literal(self.p, &expr.ty, &rendered?, expr.tok)
            }
            ExprKind::MapDisplay(pairs) => {
                let mut rendered = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    rendered.push((self.lower_expr(k)?, self.lower_expr(v)?));
                }
                self.backend
                    .map_literal(self.p, &expr.ty, &rendered, expr.tok)
            }

            ExprKind::Index { base, index } => {
                let base_s = self.lower_expr(base)?;
                let index_s = self.lower_expr(index)?;
                match &base.ty {
                    Type::Seq(_) => Ok(self
                        .backend
                        .collection_call(CollOp::SeqIndex, &[&base_s, &index_s])),
                    Type::Map(_, _) => Ok(self
                        .backend
                        .collection_call(CollOp::MapIndex, &[&base_s, &index_s])),
                    Type::Array { .. } => {
                        Ok(self.backend.array_select(&base_s, &[index_s]))
                    }
                    other => Err(LowerError::internal(
                        "index lowering",
                        format!("index select on {} at {}", other, expr.tok),
                    )),
                }
            }
            ExprKind::IndexUpdate { base, index, value } => {
                let base_s = self.lower_expr(base)?;
                let index_s = self.lower_expr(index)?;
                let value_s = self.lower_expr(value)?;
                let op = match &base.ty {
                    Type::Map(_, _) => CollOp::MapUpdate,
                    _ => CollOp::SeqUpdate,
                };
                Ok(self
                    .backend
                    .collection_call(op, &[&base_s, &index_s, &value_s]))
            }
            ExprKind::Slice { base, lo, hi } => {
                let base_s = self.lower_expr(base)?;
                match (lo, hi) {
                    (Some(lo), Some(hi)) => {
                        let lo_s = self.lower_expr(lo)?;
                        let hi_s = self.lower_expr(hi)?;
                        Ok(self
                            .backend
                            .collection_call(CollOp::Subsequence, &[&base_s, &lo_s, &hi_s]))
                    }
                    (Some(lo), None) => {
                        let lo_s = self.lower_expr(lo)?;
                        Ok(self.backend.collection_call(CollOp::Drop, &[&base_s, &lo_s]))
                    }
                    (None, Some(hi)) => {
                        let hi_s = self.lower_expr(hi)?;
                        Ok(self.backend.collection_call(CollOp::Take, &[&base_s, &hi_s]))
                    }
                    (None, None) => Ok(base_s),
                }
            }
            ExprKind::ArraySelect { base, indices } => {
                let base_s = self.lower_expr(base)?;
                let idx: Result<Vec<String>, LowerError> =
                    indices.iter().map(|i| self.lower_expr(i)).collect();
                Ok(self.backend.array_select(&base_s, &idx?))
            }

            ExprKind::Quantifier {
                forall,
                var,
                collection,
                body,
            } => {
                let coll_s = self.lower_expr(collection)?;
                let body_s = self.lower_expr(body)?;
                let param = Param {
                    name: self.backend.sanitize(&var.name),
                    ty: var.ty.clone(),
                };
                let pred = self.backend.lambda(self.p, &[param], &Type::Bool, &body_s)?;
                Ok(self.backend.quantifier(*forall, &coll_s, &pred))
            }
            ExprKind::SetComprehension {
                var,
                collection,
                filter,
                term,
            } => {
                let coll_s = self.lower_expr(collection)?;
                let param = Param {
                    name: self.backend.sanitize(&var.name),
                    ty: var.ty.clone(),
                };
                let filter_s = match filter {
                    Some(f) => self.lower_expr(f)?,
                    None => self
                        .backend
                        .literal(self.p, &Lit::Bool(true), &Type::Bool, expr.tok)?,
                };
                let filter_l =
                    self.backend
                        .lambda(self.p, &[param.clone()], &Type::Bool, &filter_s)?;
                let term_s = self.lower_expr(term)?;
                let term_l = self.backend.lambda(self.p, &[param], &term.ty, &term_s)?;
                Ok(self.backend.set_comprehension(&coll_s, &filter_l, &term_l))
            }
            ExprKind::MapComprehension {
                var,
                collection,
                filter,
                key,
                value,
            } => {
                let coll_s = self.lower_expr(collection)?;
                let param = Param {
                    name: self.backend.sanitize(&var.name),
                    ty: var.ty.clone(),
                };
                let filter_s = match filter {
                    Some(f) => self.lower_expr(f)?,
                    None => self
                        .backend
                        .literal(self.p, &Lit::Bool(true), &Type::Bool, expr.tok)?,
                };
                let filter_l =
                    self.backend
                        .lambda(self.p, &[param.clone()], &Type::Bool, &filter_s)?;
                let key_s = self.lower_expr(key)?;
                let key_l = self.backend.lambda(self.p, &[param.clone()], &key.ty, &key_s)?;
                let value_s = self.lower_expr(value)?;
                let value_l = self.backend.lambda(self.p, &[param], &value.ty, &value_s)?;
                Ok(self
                    .backend
                    .map_comprehension(&coll_s, &filter_l, &key_l, &value_l))
            }

            ExprKind::Lambda { formals, body } => {
                let params: Vec<Param> = ghost::compiled_formals(formals)
                    .into_iter()
                    .map(|f| Param {
                        name: self.backend.sanitize(&f.name),
                        ty: f.ty.clone(),
                    })
                    .collect();
                let body_s = self.lower_expr(body)?;
                self.backend.lambda(self.p, &params, &body.ty, &body_s)
            }
            ExprKind::Let { var, rhs, body } => {
                let param = Param {
                    name: self.backend.sanitize(&var.name),
                    ty: var.ty.clone(),
                };
                let rhs_s = self.lower_expr(rhs)?;
                let body_s = self.lower_expr(body)?;
                self.backend
                    .let_expr(self.p, &expr.ty, &param, &rhs_s, &body_s)
            }
            ExprKind::Ite { cond, thn, els } => {
                let cond_s = self.lower_expr(cond)?;
                let thn_s = self.lower_expr(thn)?;
                let els_s = self.lower_expr(els)?;
                self.backend.ite(self.p, &expr.ty, &cond_s, &thn_s, &els_s)
            }
            ExprKind::Match {
                scrutinee,
                arms,
                taken_arm,
            } => {
                if let Some(idx) = taken_arm {
                    return self.lower_expr(&arms[*idx].body);
                }
                let sig = self.datatype_sig_for(&scrutinee.ty, expr.tok)?;
                let scrut_s = self.lower_expr(scrutinee)?;
                let scrut_var = self.fresh("_source");

                // Build the arm bodies innermost-first: each non-final arm
                // becomes a conditional on its variant test, binding the
                // arm's destructors with let expressions.
                let mut acc: Option<String> = None;
                for arm in arms.iter().rev() {
                    let mut body_s = self.lower_expr(&arm.body)?;
                    for binder in ghost::compiled_formals(&arm.binders).into_iter().rev() {
                        let value = self
                            .backend
                            .destructor_get(&scrut_var, &self.backend.sanitize(&binder.name));
                        let param = Param {
                            name: self.backend.sanitize(&binder.name),
                            ty: binder.ty.clone(),
                        };
                        body_s =
                            self.backend
                                .let_expr(self.p, &expr.ty, &param, &value, &body_s)?;
                    }
                    acc = Some(match acc {
                        None => body_s,
                        Some(rest) => {
                            let test = self.backend.ctor_test(&scrut_var, &sig.ctors[arm.ctor]);
                            self.backend.ite(self.p, &expr.ty, &test, &body_s, &rest)?
                        }
                    });
                }
                let inner = acc.ok_or_else(|| {
                    LowerError::internal(
                        "match lowering",
                        format!("match with zero arms at {}", expr.tok),
                    )
                })?;
                let scrut_param = Param {
                    name: scrut_var,
                    ty: scrutinee.ty.clone(),
                };
                self.backend
                    .let_expr(self.p, &expr.ty, &scrut_param, &scrut_s, &inner)
            }

            ExprKind::Apply { func, args } => {
                let func_s = self.lower_expr(func)?;
                let rendered: Result<Vec<String>, LowerError> =
                    args.iter().map(|a| self.lower_expr(a)).collect();
                self.backend.apply(self.p, &expr.ty, &func_s, &rendered?)
            }
            ExprKind::FnCall {
                decl,
                member,
                receiver,
                type_args,
                args,
            } => self.lower_fn_call(*decl, member, receiver, type_args, args),
            ExprKind::DatatypeValue { decl, ctor, args } => {
                let dt = match &self.p.decl(*decl).kind {
                    DeclKind::Datatype(dt) => dt.clone(),
                    _ => {
                        return Err(LowerError::internal(
                            "datatype value lowering",
                            format!("constructor application on non-datatype at {}", expr.tok),
                        ));
                    }
                };
                let lazy = dt.co && !self.backend.caps().native_codata;
                let ctor_decl = &dt.ctors[*ctor];
                let mut rendered = Vec::new();
                for (formal, arg) in ctor_decl.formals.iter().zip(args) {
                    if formal.ghost {
                        continue;
                    }
                    rendered.push(self.lower_expr(arg)?);
                }
                let sig = self.ctor_sig(ctor_decl, lazy);
                let decl_ref = self.backend.decl_ref(self.p, *decl)?;
                Ok(self.backend.datatype_value(&decl_ref, &sig, &rendered))
            }
            ExprKind::TestVariant {
                operand,
                decl,
                ctor,
            } => {
                let operand_s = self.lower_expr(operand)?;
                let dt = match &self.p.decl(*decl).kind {
                    DeclKind::Datatype(dt) => dt,
                    _ => {
                        return Err(LowerError::internal(
                            "variant test lowering",
                            format!("variant test on non-datatype at {}", expr.tok),
                        ));
                    }
                };
                let sig = self.ctor_sig(&dt.ctors[*ctor], false);
                Ok(self.backend.ctor_test(&operand_s, &sig))
            }
            ExprKind::FieldSelect { obj, decl, field } => {
                let obj_s = self.lower_expr(obj)?;
                let name = self.backend.sanitize(field);
                if matches!(self.p.decl(*decl).kind, DeclKind::Datatype(_)) {
                    Ok(self.backend.destructor_get(&obj_s, &name))
                } else {
                    Ok(self.backend.field_access(&obj_s, &name))
                }
            }
            ExprKind::StaticSelect { decl, member } => {
                let decl_ref = self.backend.decl_ref(self.p, *decl)?;
                Ok(self
                    .backend
                    .static_ref(&decl_ref, &self.backend.sanitize(member)))
            }
            ExprKind::Special { obj, id } => {
                let obj_s = self.lower_expr(obj)?;
                Ok(match id {
                    SpecialField::Cardinality => self
                        .backend
                        .collection_call(CollOp::Cardinality, &[&obj_s]),
                    SpecialField::ArrayLength(dim) => self.backend.array_length(&obj_s, *dim),
                    SpecialField::MapKeys => {
                        self.backend.collection_call(CollOp::MapKeys, &[&obj_s])
                    }
                    SpecialField::MapValues => {
                        self.backend.collection_call(CollOp::MapValues, &[&obj_s])
                    }
                })
            }
        }
    }

    fn lower_fn_call(
        &mut self,
        decl: DeclId,
        member: &str,
        receiver: &Option<Box<Expr>>,
        type_args: &[Type],
        args: &[Expr],
    ) -> Result<String, LowerError> {
        let callee = self.p.find_member(decl, member).ok_or_else(|| {
            LowerError::internal(
                "call lowering",
                format!(
                    "unresolved function {}.{}",
                    self.p.qualified_name(decl),
                    member
                ),
            )
        })?;
        let formals = match &callee.kind {
            MemberKind::Function(f) | MemberKind::Predicate(f) => &f.formals,
            _ => {
                return Err(LowerError::internal(
                    "call lowering",
                    format!("expression call of non-function {}", member),
                ));
            }
        };
        let type_params = callee.type_params.clone();
        let callee_tok = callee.tok;

        let mut rendered = self.descriptor_args(&type_params, type_args, callee_tok)?;
        // Functions keep ghost formals in their signature; the driver
        // substitutes default values at the call site.
        for (formal, arg) in formals.iter().zip(args) {
            if formal.ghost {
                let filler = match &formal.default_value {
                    Some(expr) => self.lower_expr(expr)?,
                    None => self.default_value(&formal.ty, callee_tok)?,
                };
                rendered.push(filler);
            } else {
                rendered.push(self.lower_expr(arg)?);
            }
        }
        let target = match receiver {
            Some(recv) => {
                let recv_s = self.lower_expr(recv)?;
                self.backend
                    .field_access(&recv_s, &self.backend.sanitize(member))
            }
            None => {
                let decl_ref = self.backend.decl_ref(self.p, decl)?;
                self.backend
                    .static_ref(&decl_ref, &self.backend.sanitize(member))
            }
        };
        Ok(self.backend.call(&target, &rendered))
    }

    // ------------------------------------------------------------------
    // Default values
    // ------------------------------------------------------------------

    /// The canonical default for every compiled type. Recursion terminates
    /// because the resolver forbids non-founded default chains.
    fn default_value(&mut self, ty: &Type, tok: Tok) -> Result<String, LowerError> {
        match ty {
            Type::Bool => self.backend.literal(self.p, &Lit::Bool(false), ty, tok),
            Type::Char => self.backend.literal(self.p, &Lit::Char('D'), ty, tok),
            Type::Int => self.backend.literal(self.p, &Lit::Int(0.into()), ty, tok),
            Type::Real => self.backend.literal(
                self.p,
                &Lit::Real {
                    mantissa: 0.into(),
                    exponent: 0,
                },
                ty,
                tok,
            ),
            Type::Bitvector { width, .. } => self.backend.literal(
                self.p,
                &Lit::Bitvector {
                    value: 0u32.into(),
                    width: *width,
                },
                ty,
                tok,
            ),
            Type::Set(_) | Type::Seq(_) | Type::Multiset(_) => {
                self.backend.collection_literal(self.p, ty, &[], tok)
            }
            Type::Map(_, _) => self.backend.map_literal(self.p, ty, &[], tok),
            Type::Array { .. } | Type::Arrow { .. } => self.backend.null_expr(self.p, ty),
            Type::UserDefined { decl, .. } => {
                let kind = self.p.decl(*decl).kind.clone();
                match kind {
                    DeclKind::Datatype(_) => {
                        // Through the generated Default() companion; inlining
                        // the constructor would not terminate for recursive
                        // datatypes.
                        let decl_ref = self.backend.decl_ref(self.p, *decl)?;
                        Ok(self.backend.default_companion(&decl_ref))
                    }
                    DeclKind::Newtype(nt) => self.default_value(&nt.base, tok),
                    DeclKind::SubsetType(st) => match &st.witness {
                        Some(expr) => self.lower_expr(expr),
                        None => self.default_value(&st.base, tok),
                    },
                    DeclKind::Class(_) | DeclKind::Trait(_) | DeclKind::Iterator(_) => {
                        self.backend.null_expr(self.p, ty)
                    }
                }
            }
            Type::TypeParam(_) => {
                if self.backend.caps().erased_generics {
                    self.backend.null_expr(self.p, ty)
                } else {
                    let td = self.backend.type_descriptor(self.p, ty, tok)?;
                    Ok(self.backend.call(
                        &self.backend.static_ref(&td, "defaultValue"),
                        &[],
                    ))
                }
            }
            Type::Proxy => Err(LowerError::internal(
                "default value computation",
                format!("unresolved type proxy at {}", tok),
            )),
        }
    }
}
