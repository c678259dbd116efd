//! Name lookup and type resolution
//!
//! Lookups answer one of three ways: found, not ready (the name belongs to a
//! declaration that has not registered itself yet, so the caller retries on
//! a later sweep) or [`Error::Unresolved`].

use crate::error::{Error, Result};
use crate::generic::{host_of, ConcreteKind, ConcreteType, GenericEngine};
use crate::program::{ClassId, ClassKind, Program, ResolvedType, Scope};
use crate::span::Span;
use crate::stage::CompilingStage;
use crate::types::{TypeRef, PRIMITIVES, VOID};

/// Built-in primitives that take type arguments
pub const PARAMETERIZED_PRIMITIVES: &[&str] = &["func", "tuple"];

/// Find a class by name as seen from `scope`.
///
/// Search order: the enclosing classes (their own names and inner-class
/// tables, innermost first), the scope's package, then the name as a full
/// dotted name.
pub fn lookup_class(program: &Program, scope: Scope, name: &str, span: Span) -> Result<Option<ClassId>> {
    let mut class = match scope {
        Scope::Class(c) => Some(c),
        Scope::Function(f) => program.function(f).owner,
    };
    while let Some(c) = class {
        let def = program.class(c);
        if def.generic_source.is_none() && def.name() == name {
            return Ok(Some(c));
        }
        if let Some(id) = program.class_inner(c).get(name).and_then(|s| s.as_class()) {
            return Ok(Some(id));
        }
        class = def.owner;
    }

    let package = &program.unit(program.scope_unit(scope)).package_name;
    if !package.is_empty() {
        let qualified = format!("{}.{}", package, name);
        if let Some(id) = program.packages.get(&qualified).and_then(|s| s.as_class()) {
            return Ok(Some(id));
        }
    }
    if let Some(id) = program.packages.get(name).and_then(|s| s.as_class()) {
        return Ok(Some(id));
    }

    let pending = program.classes.iter().enumerate().any(|(i, c)| {
        !c.header.failed
            && !matches!(c.kind, ClassKind::TraitInScope { .. })
            && c.stage() == CompilingStage::ParseClassName
            && (c.name() == name || program.class_full_name(ClassId::new(i as u32)) == name)
    });
    if pending {
        log::trace!("class '{}' not registered yet", name);
        return Ok(None);
    }
    Err(Error::unresolved(name, span))
}

/// Resolve a syntactic type from `scope`.
///
/// Class references with concrete arguments are instantiated through the
/// engine. Every concrete array, parameterized primitive or instantiated
/// class is registered against the scope's host. `Ok(None)` means a named
/// class is not registered yet.
pub fn resolve_type(
    program: &mut Program,
    engine: &mut GenericEngine,
    scope: Scope,
    ty: &TypeRef,
    span: Span,
) -> Result<Option<ResolvedType>> {
    let Some(resolved) = resolve_inner(program, engine, scope, ty, span)? else {
        return Ok(None);
    };
    if let Some(concrete) = concrete_type_of(program, &resolved) {
        concrete.register_to(program, host_of(program, scope));
    }
    Ok(Some(resolved))
}

fn resolve_inner(
    program: &mut Program,
    engine: &mut GenericEngine,
    scope: Scope,
    ty: &TypeRef,
    span: Span,
) -> Result<Option<ResolvedType>> {
    let (name, args) = match ty {
        TypeRef::Array(element) => {
            return Ok(resolve_inner(program, engine, scope, element, span)?.map(|e| ResolvedType::Array(Box::new(e))));
        }
        TypeRef::Named { name, args } => (name, args),
    };

    if args.is_empty() {
        if name == VOID {
            return Ok(Some(ResolvedType::Void));
        }
        if PRIMITIVES.contains(&name.as_str()) {
            return Ok(Some(ResolvedType::Primitive(name.clone())));
        }
        if program.type_params_in_scope(scope).iter().any(|p| p == name) {
            return Ok(Some(ResolvedType::Param(name.clone())));
        }
        return Ok(lookup_class(program, scope, name, span)?.map(ResolvedType::Class));
    }

    let mut resolved_args = Vec::with_capacity(args.len());
    for arg in args {
        match resolve_inner(program, engine, scope, arg, span)? {
            Some(resolved) => resolved_args.push(resolved),
            None => return Ok(None),
        }
    }

    if PARAMETERIZED_PRIMITIVES.contains(&name.as_str()) {
        return Ok(Some(ResolvedType::Parameterized {
            name: name.clone(),
            args: resolved_args,
        }));
    }

    let Some(template) = lookup_class(program, scope, name, span)? else {
        return Ok(None);
    };
    if !resolved_args.iter().all(is_concrete) {
        return Ok(Some(ResolvedType::Generic {
            template,
            args: resolved_args,
        }));
    }
    let canonical: Vec<TypeRef> = resolved_args.iter().map(|a| canonical_ref(program, a)).collect();
    let instance = engine.instantiate_class(program, template, &canonical, span)?;
    if !instance.existing {
        log::debug!("{} requested from {:?}", program.class_full_name(instance.id), scope);
    }
    Ok(Some(ResolvedType::Class(instance.id)))
}

/// Whether a resolved type mentions no type parameter
pub fn is_concrete(ty: &ResolvedType) -> bool {
    match ty {
        ResolvedType::Param(_) | ResolvedType::Generic { .. } => false,
        ResolvedType::Array(element) => is_concrete(element),
        ResolvedType::Parameterized { args, .. } => args.iter().all(is_concrete),
        _ => true,
    }
}

/// Scope-independent spelling of a concrete type: classes by full name,
/// instantiations as their template's full name with canonical arguments
pub fn canonical_ref(program: &Program, ty: &ResolvedType) -> TypeRef {
    match ty {
        ResolvedType::Void => TypeRef::void(),
        ResolvedType::Primitive(name) | ResolvedType::Param(name) => TypeRef::named(name.clone()),
        ResolvedType::Array(element) => TypeRef::array_of(canonical_ref(program, element)),
        ResolvedType::Parameterized { name, args } => {
            TypeRef::generic(name.clone(), args.iter().map(|a| canonical_ref(program, a)).collect())
        }
        ResolvedType::Class(id) => {
            let id = program.delegate(*id);
            match &program.class(id).kind {
                ClassKind::Instantiated { template, args } => {
                    TypeRef::generic(program.class_full_name(*template), args.clone())
                }
                _ => TypeRef::named(program.class_full_name(id)),
            }
        }
        ResolvedType::Generic { template, args } => TypeRef::generic(
            program.class_full_name(*template),
            args.iter().map(|a| canonical_ref(program, a)).collect(),
        ),
    }
}

/// The concrete type a resolved type denotes, if it is one that needs a
/// definition of its own
pub fn concrete_type_of(program: &Program, ty: &ResolvedType) -> Option<ConcreteType> {
    if !is_concrete(ty) {
        return None;
    }
    let kind = match ty {
        ResolvedType::Array(_) => ConcreteKind::Array,
        ResolvedType::Parameterized { .. } => ConcreteKind::Parameterized,
        ResolvedType::Class(id) if program.class(program.delegate(*id)).generic_source.is_some() => {
            ConcreteKind::Instantiated
        }
        _ => return None,
    };
    let mut depends_on = Vec::new();
    collect_classes(program, ty, &mut depends_on);
    Some(ConcreteType {
        full_name: program.describe_type(ty),
        kind,
        depends_on,
    })
}

fn collect_classes(program: &Program, ty: &ResolvedType, out: &mut Vec<ClassId>) {
    match ty {
        ResolvedType::Class(id) => {
            let id = program.delegate(*id);
            if !out.contains(&id) {
                out.push(id);
            }
        }
        ResolvedType::Array(element) => collect_classes(program, element, out),
        ResolvedType::Parameterized { args, .. } | ResolvedType::Generic { args, .. } => {
            for arg in args {
                collect_classes(program, arg, out);
            }
        }
        _ => {}
    }
}
