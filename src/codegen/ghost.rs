//! Ghost erasure and compilability
//!
//! Decides which declarations reach the backend at all. Ghost declarations
//! exist only for verification and must leave no trace in emitted code: no
//! storage, no parameters, no symbols. The filter also drops or rejects
//! declarations the active backend cannot represent, based on its
//! capability bits.

use super::backend::Capabilities;
use crate::rir::{
    ConstDecl, DeclKind, Formal, Member, MemberKind, Program, TopLevelDecl, Type,
};

/// What the driver should do with a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fate {
    Lower,
    /// Silently dropped; verification-only.
    Drop,
    /// Surfaced as an unsupported-construct error, then skipped.
    Reject(String),
}

/// Filter verdict for a top-level declaration.
pub fn decl_fate(decl: &TopLevelDecl, _caps: &Capabilities) -> Fate {
    if decl.is_ghost() {
        return Fate::Drop;
    }
    if let DeclKind::Datatype(dt) = &decl.kind {
        if dt.ctors.is_empty() {
            // The resolver guarantees at least one constructor; this is
            // checked again in the driver as an internal error.
            return Fate::Lower;
        }
    }
    Fate::Lower
}

/// Filter verdict for a member.
pub fn member_fate(member: &Member, p: &Program, caps: &Capabilities) -> Fate {
    if member.ghost {
        return Fate::Drop;
    }
    match &member.kind {
        // Lemmas are verification-only even when not marked ghost.
        MemberKind::Lemma(_) => Fate::Drop,
        MemberKind::Method(m) => {
            // A method with only ghost out-parameters is elided entirely.
            if !m.outs.is_empty() && m.outs.iter().all(|f| f.ghost) {
                return Fate::Drop;
            }
            if !caps.erased_generics && signature_mentions_witnessless(p, member) {
                return Fate::Drop;
            }
            signature_collection_check(p, member, caps)
        }
        // A function with only ghost parameters but a non-ghost result
        // keeps its signature; the driver fills defaults at call sites.
        MemberKind::Function(_) | MemberKind::Predicate(_) => {
            if !caps.erased_generics && signature_mentions_witnessless(p, member) {
                return Fate::Drop;
            }
            signature_collection_check(p, member, caps)
        }
        _ => signature_collection_check(p, member, caps),
    }
}

/// Drop ghost formals from a signature or constructor.
pub fn compiled_formals(formals: &[Formal]) -> Vec<&Formal> {
    formals.iter().filter(|f| !f.ghost).collect()
}

/// Whether a constant's RHS must be erased to the type's default value.
pub fn const_rhs_erased(c: &ConstDecl) -> bool {
    c.rhs_is_ghost || c.rhs.is_none()
}

fn signature_types<'a>(member: &'a Member) -> Vec<&'a Type> {
    let mut tys = Vec::new();
    match &member.kind {
        MemberKind::Field(f) => tys.push(&f.ty),
        MemberKind::Const(c) => tys.push(&c.ty),
        MemberKind::Method(m) | MemberKind::Constructor(m) | MemberKind::Lemma(m) => {
            tys.extend(m.ins.iter().filter(|f| !f.ghost).map(|f| &f.ty));
            tys.extend(m.outs.iter().filter(|f| !f.ghost).map(|f| &f.ty));
        }
        MemberKind::Function(f) | MemberKind::Predicate(f) => {
            tys.extend(f.formals.iter().filter(|x| !x.ghost).map(|x| &x.ty));
            tys.push(&f.result);
        }
    }
    tys
}

fn for_each_type<'a>(ty: &'a Type, f: &mut impl FnMut(&'a Type)) {
    f(ty);
    match ty {
        Type::Set(e) | Type::Seq(e) | Type::Multiset(e) => for_each_type(e, f),
        Type::Map(k, v) => {
            for_each_type(k, f);
            for_each_type(v, f);
        }
        Type::Array { elem, .. } => for_each_type(elem, f),
        Type::UserDefined { type_args, .. } => {
            for arg in type_args {
                for_each_type(arg, f);
            }
        }
        Type::Arrow { ins, out } => {
            for t in ins {
                for_each_type(t, f);
            }
            for_each_type(out, f);
        }
        _ => {}
    }
}

/// A signature mentioning a subset type with no witness cannot be defaulted
/// on targets without erased generics.
fn signature_mentions_witnessless(p: &Program, member: &Member) -> bool {
    let mut found = false;
    for ty in signature_types(member) {
        for_each_type(ty, &mut |t| {
            if let Type::UserDefined { decl, .. } = t {
                if let DeclKind::SubsetType(st) = &p.decl(*decl).kind {
                    if st.witness.is_none() && !st.synthesized_witness {
                        found = true;
                    }
                }
            }
        });
    }
    found
}

/// Collection element types must not be bare trait parameters unless the
/// backend allows it.
fn signature_collection_check(p: &Program, member: &Member, caps: &Capabilities) -> Fate {
    if caps.trait_collection_elements {
        return Fate::Lower;
    }
    let mut offending: Option<String> = None;
    for ty in signature_types(member) {
        for_each_type(ty, &mut |t| {
            if let Some(elem) = t.collection_elem() {
                if let Type::UserDefined { decl, .. } = elem {
                    if matches!(p.decl(*decl).kind, DeclKind::Trait(_)) && offending.is_none() {
                        offending = Some(format!(
                            "a collection with trait-typed elements ({})",
                            p.qualified_name(*decl)
                        ));
                    }
                }
            }
        });
    }
    match offending {
        Some(construct) => Fate::Reject(construct),
        None => Fate::Lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rir::{
        ClassDecl, DeclId, FieldDecl, MethodDecl, Module, ModuleId, SubsetTypeDecl, Tok,
    };

    fn caps(trait_elems: bool, erased: bool) -> Capabilities {
        Capabilities {
            erased_generics: erased,
            native_int_widths: &[8, 16, 32, 64],
            trait_collection_elements: trait_elems,
            native_codata: false,
            labeled_loops: true,
            max_tuple_arity: None,
            strings_are_code_units: true,
        }
    }

    fn program_with(kind: DeclKind) -> Program {
        Program {
            modules: vec![Module {
                id: ModuleId(0),
                name: String::new(),
                is_default: true,
                imports: vec![],
                decls: vec![DeclId(0)],
            }],
            decls: vec![TopLevelDecl {
                name: "T".to_string(),
                module: ModuleId(0),
                tok: Tok::default(),
                type_params: vec![],
                kind,
            }],
        }
    }

    fn method_member(name: &str, ghost: bool, outs: Vec<Formal>) -> Member {
        Member {
            name: name.to_string(),
            tok: Tok::default(),
            ghost,
            is_static: true,
            type_params: vec![],
            kind: MemberKind::Method(MethodDecl {
                ins: vec![],
                outs,
                body: Some(vec![]),
                is_tail_recursive: false,
            }),
        }
    }

    #[test]
    fn test_ghost_member_dropped() {
        let p = program_with(DeclKind::Class(ClassDecl {
            members: vec![],
            traits: vec![],
            is_default_class: false,
            ghost: false,
        }));
        let m = method_member("Lemma-ish", true, vec![]);
        assert_eq!(member_fate(&m, &p, &caps(true, true)), Fate::Drop);
    }

    #[test]
    fn test_ghost_out_only_method_elided() {
        let p = program_with(DeclKind::Class(ClassDecl {
            members: vec![],
            traits: vec![],
            is_default_class: false,
            ghost: false,
        }));
        let m = method_member("M", false, vec![Formal::ghost("g", Type::Int)]);
        assert_eq!(member_fate(&m, &p, &caps(true, true)), Fate::Drop);
        // A method with no outs at all is kept.
        let m2 = method_member("N", false, vec![]);
        assert_eq!(member_fate(&m2, &p, &caps(true, true)), Fate::Lower);
    }

    #[test]
    fn test_trait_collection_elements_rejected() {
        let p = program_with(DeclKind::Trait(ClassDecl {
            members: vec![],
            traits: vec![],
            is_default_class: false,
            ghost: false,
        }));
        let m = Member {
            name: "F".to_string(),
            tok: Tok::default(),
            ghost: false,
            is_static: false,
            type_params: vec![],
            kind: MemberKind::Field(FieldDecl {
                ty: Type::seq(Type::user(DeclId(0))),
                init: None,
            }),
        };
        assert!(matches!(
            member_fate(&m, &p, &caps(false, true)),
            Fate::Reject(_)
        ));
        assert_eq!(member_fate(&m, &p, &caps(true, true)), Fate::Lower);
    }

    #[test]
    fn test_witnessless_subset_dropped_on_reified_targets() {
        let p = program_with(DeclKind::SubsetType(SubsetTypeDecl {
            base: Type::Int,
            witness: None,
            synthesized_witness: false,
        }));
        let m = Member {
            name: "F".to_string(),
            tok: Tok::default(),
            ghost: false,
            is_static: true,
            type_params: vec![],
            kind: MemberKind::Function(crate::rir::FunctionDecl {
                formals: vec![Formal::new("x", Type::user(DeclId(0)))],
                result: Type::Bool,
                body: None,
                is_tail_recursive: false,
            }),
        };
        assert_eq!(member_fate(&m, &p, &caps(true, false)), Fate::Drop);
        assert_eq!(member_fate(&m, &p, &caps(true, true)), Fate::Lower);
    }

    #[test]
    fn test_compiled_formals_erase_ghosts() {
        let formals = vec![
            Formal::new("x", Type::Int),
            Formal::ghost("g", Type::Int),
            Formal::new("y", Type::Bool),
        ];
        let kept: Vec<_> = compiled_formals(&formals)
            .into_iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(kept, vec!["x", "y"]);
    }
}
