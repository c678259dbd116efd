//! Class hierarchy resolution, validation and inheritance
//!
//! Each function here performs one class-level stage step and returns
//! `Ok(false)` when a parent has not reached the stage the step depends on.
//! The caller owns the stage transition.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::generic::GenericEngine;
use crate::modifiers::{flags, Visibility};
use crate::namespace::Symbol;
use crate::program::{ClassId, ClassKind, FunctionId, FunctionOrigin, Program, ResolvedType, Scope};
use crate::resolve::resolve_type;
use crate::span::Span;
use crate::stage::CompilingStage;
use crate::syntax::ClassFlavor;
use crate::types::{TypeBinding, TypeRef};

fn resolve_parent(
    program: &mut Program,
    engine: &mut GenericEngine,
    scope: Scope,
    ty: &TypeRef,
    span: Span,
) -> Result<Option<ClassId>> {
    match resolve_type(program, engine, scope, ty, span)? {
        None => Ok(None),
        Some(ResolvedType::Class(id)) => Ok(Some(id)),
        // Parent mentioning the class's own type parameters: the template
        // links to the raw parent, each clone to its instantiation
        Some(ResolvedType::Generic { template, .. }) => Ok(Some(template)),
        Some(other) => Err(Error::hierarchy(
            format!("'{}' is not a class", program.describe_type(&other)),
            span,
        )),
    }
}

fn binding_of(program: &Program, class: ClassId) -> Result<TypeBinding> {
    let def = program.class(class);
    match &def.kind {
        ClassKind::Instantiated { template, args } => {
            TypeBinding::bind(&program.class(*template).type_params, args, def.header.span)
        }
        _ => Ok(TypeBinding::new()),
    }
}

/// `ParseParents`: look up superclass, interfaces, traits and permitted
/// subclasses. Parents of a clone are the template's, substituted.
pub fn parse_parents(program: &mut Program, engine: &mut GenericEngine, class: ClassId) -> Result<bool> {
    let syntax = program.class(class).syntax.clone();
    let span = program.class(class).header.span;
    let binding = binding_of(program, class)?;
    let scope = Scope::Class(class);

    let mut superclass = None;
    if let Some(parent) = &syntax.extends {
        match resolve_parent(program, engine, scope, &parent.substitute(&binding), span)? {
            Some(id) => superclass = Some(id),
            None => return Ok(false),
        }
    }

    let mut resolve_all = |program: &mut Program, refs: &[TypeRef]| -> Result<Option<Vec<ClassId>>> {
        let mut ids = Vec::with_capacity(refs.len());
        for r in refs {
            match resolve_parent(program, engine, scope, &r.substitute(&binding), span)? {
                Some(id) => ids.push(id),
                None => return Ok(None),
            }
        }
        Ok(Some(ids))
    };
    let Some(interfaces) = resolve_all(program, &syntax.implements)? else {
        return Ok(false);
    };
    let Some(traits) = resolve_all(program, &syntax.uses)? else {
        return Ok(false);
    };
    let Some(permits) = resolve_all(program, &syntax.permits)? else {
        return Ok(false);
    };

    let wrappers: Vec<ClassId> = traits
        .into_iter()
        .map(|base| engine.trait_in_scope(program, base, class).id)
        .collect();

    let def = program.class_mut(class);
    def.superclass = superclass;
    def.interfaces = interfaces;
    def.traits = wrappers;
    def.permits = permits;
    Ok(true)
}

/// Every class reachable through superclass, interface and trait links,
/// nearest first, without `class` itself
pub fn ancestors(program: &Program, class: ClassId) -> Vec<ClassId> {
    let mut seen = vec![program.delegate(class)];
    let mut queue = VecDeque::from([class]);
    let mut result = Vec::new();
    while let Some(current) = queue.pop_front() {
        let def = program.class(program.delegate(current));
        for parent in def.superclass.iter().chain(&def.interfaces).chain(&def.traits) {
            let target = program.delegate(*parent);
            if seen.contains(&target) {
                continue;
            }
            seen.push(target);
            result.push(*parent);
            queue.push_back(*parent);
        }
    }
    result
}

fn direct_parents(program: &Program, class: ClassId) -> Vec<ClassId> {
    let def = program.class(class);
    def.superclass
        .iter()
        .chain(&def.interfaces)
        .chain(&def.traits)
        .copied()
        .collect()
}

fn parents_past(program: &Program, class: ClassId, stage: CompilingStage) -> bool {
    direct_parents(program, class)
        .into_iter()
        .all(|p| program.class_stage(p) > stage)
}

fn flavor_name(flavor: ClassFlavor) -> &'static str {
    match flavor {
        ClassFlavor::Class => "class",
        ClassFlavor::Interface => "interface",
        ClassFlavor::Trait => "trait",
    }
}

fn same_declaration(program: &Program, a: ClassId, b: ClassId) -> bool {
    let origin = |id: ClassId| {
        let id = program.delegate(id);
        program.class(id).generic_source.unwrap_or(id)
    };
    program.same_class(a, b) || origin(a) == origin(b)
}

/// `ValidateHierarchy`: reject cycles, final or wrong-kind parents and
/// permit-list violations
pub fn validate_hierarchy(program: &Program, class: ClassId) -> Result<bool> {
    let def = program.class(class);
    let span = def.header.span;
    let name = program.class_full_name(class);
    let parents = direct_parents(program, class);
    if parents
        .iter()
        .chain(&def.permits)
        .any(|p| program.class_stage(*p) <= CompilingStage::ParseParents)
    {
        return Ok(false);
    }

    let mut seen = vec![class];
    let mut current = def.superclass;
    while let Some(parent) = current {
        let parent = program.delegate(parent);
        if seen.contains(&parent) {
            return Err(Error::hierarchy(format!("cyclic inheritance involving {}", name), span));
        }
        if program.class_stage(parent) <= CompilingStage::ParseParents {
            return Ok(false);
        }
        seen.push(parent);
        current = program.class(parent).superclass;
    }

    if let Some(parent) = def.superclass {
        let parent_def = program.class(program.delegate(parent));
        let parent_name = program.class_full_name(parent);
        let expected = match def.flavor {
            ClassFlavor::Class => ClassFlavor::Class,
            ClassFlavor::Interface => ClassFlavor::Interface,
            ClassFlavor::Trait => {
                return Err(Error::hierarchy(format!("trait {} cannot extend {}", name, parent_name), span));
            }
        };
        if parent_def.flavor != expected {
            return Err(Error::hierarchy(
                format!(
                    "{} {} cannot extend {} {}",
                    flavor_name(def.flavor),
                    name,
                    flavor_name(parent_def.flavor),
                    parent_name
                ),
                span,
            ));
        }
        if parent_def.header.modifiers.is_final() {
            return Err(Error::hierarchy(format!("{} cannot extend final class {}", name, parent_name), span));
        }
        let permitted = program.permits_of(parent);
        if !permitted.is_empty() && !permitted.iter().any(|p| same_declaration(program, *p, class)) {
            return Err(Error::hierarchy(format!("{} is not permitted to extend {}", name, parent_name), span));
        }
    }

    for interface in &def.interfaces {
        if program.class(program.delegate(*interface)).flavor != ClassFlavor::Interface {
            return Err(Error::hierarchy(
                format!("{} implements {}, which is not an interface", name, program.class_full_name(*interface)),
                span,
            ));
        }
    }
    for used in &def.traits {
        if program.class(program.delegate(*used)).flavor != ClassFlavor::Trait {
            return Err(Error::hierarchy(
                format!("{} uses {}, which is not a trait", name, program.class_full_name(*used)),
                span,
            ));
        }
    }
    Ok(true)
}

fn describe_field_type(program: &Program, field: crate::program::FieldId) -> String {
    let def = program.field(field);
    match &def.resolved {
        Some(ty) => program.describe_type(ty),
        None => def.ty.to_string(),
    }
}

fn same_field_type(program: &Program, a: crate::program::FieldId, b: crate::program::FieldId) -> bool {
    match (&program.field(a).resolved, &program.field(b).resolved) {
        (Some(x), Some(y)) => program.same_type(x, y),
        _ => program.field(a).ty == program.field(b).ty,
    }
}

/// `InheritsFields`: merge the superclass's and used traits' fields into
/// the class's field table. Redeclaring an inherited field with another type
/// is a mismatch; with the same type the own field shadows it.
pub fn inherit_fields(program: &mut Program, class: ClassId) -> Result<bool> {
    let def = program.class(class);
    if def
        .own_fields
        .iter()
        .any(|f| program.field(*f).stage() <= CompilingStage::ParseFields)
    {
        return Ok(false);
    }
    let sources: Vec<ClassId> = def.superclass.iter().chain(&def.traits).copied().collect();
    if sources
        .iter()
        .any(|p| program.class_stage(*p) <= CompilingStage::InheritsFields)
    {
        return Ok(false);
    }

    let inherited: Vec<Symbol> = sources
        .iter()
        .flat_map(|p| program.class_fields(*p).entries().to_vec())
        .collect();
    for symbol in inherited {
        let Some(field) = symbol.as_field() else {
            continue;
        };
        let own = program.class(class).fields.get(&symbol.name).and_then(|s| s.as_field());
        match own {
            Some(own) if own == field => {}
            Some(own) => {
                if !same_field_type(program, own, field) {
                    return Err(Error::type_mismatch(
                        describe_field_type(program, field),
                        describe_field_type(program, own),
                        program.field(own).header.span,
                    ));
                }
                log::trace!("{} shadows inherited field '{}'", program.class_full_name(class), symbol.name);
            }
            None => program.class_mut(class).fields.add(symbol)?,
        }
    }
    Ok(true)
}

/// Find a function by unique name among the ancestors of `class`. The flag
/// tells whether it was found along the superclass chain.
pub fn find_inherited_function(program: &Program, class: ClassId, name: &str) -> Option<(FunctionId, bool)> {
    let mut current = program.class(class).superclass;
    while let Some(parent) = current {
        if let Some(id) = program.class_functions(parent).get(name).and_then(|s| s.as_function()) {
            return Some((id, true));
        }
        current = program.class(program.delegate(parent)).superclass;
    }
    ancestors(program, class)
        .into_iter()
        .find_map(|a| program.class_functions(a).get(name).and_then(|s| s.as_function()))
        .map(|id| (id, false))
}

fn same_result(program: &Program, a: FunctionId, b: FunctionId) -> bool {
    match (&program.function(a).resolved_result, &program.function(b).resolved_result) {
        (Some(x), Some(y)) => program.same_type(x, y),
        _ => program.function(a).result == program.function(b).result,
    }
}

/// `ValidateNewFunctions`: `override` must match an inherited function by
/// unique name and result type; silently hiding a superclass function is
/// rejected.
pub fn validate_new_functions(program: &Program, class: ClassId) -> Result<bool> {
    let def = program.class(class);
    if def.superclass.is_some_and(|s| program.class_stage(s) <= CompilingStage::ValidateNewFunctions)
        || !parents_past(program, class, CompilingStage::ParseFields)
    {
        return Ok(false);
    }

    for function in &def.own_functions {
        let f = program.function(*function);
        if f.origin != FunctionOrigin::User || f.is_static() || def.constructor == Some(*function) {
            continue;
        }
        let overrides = f.header.modifiers.has(flags::OVERRIDE);
        match find_inherited_function(program, class, f.name()) {
            None if overrides => {
                return Err(Error::syntax(
                    format!("{}.{} overrides nothing", program.class_full_name(class), f.common_name),
                    f.header.span,
                ));
            }
            Some((inherited, _)) if overrides => {
                if program.function(inherited).stage() <= CompilingStage::ParseFields {
                    return Ok(false);
                }
                if !same_result(program, *function, inherited) {
                    let describe = |id: FunctionId| match &program.function(id).resolved_result {
                        Some(ty) => program.describe_type(ty),
                        None => program.function(id).result.to_string(),
                    };
                    return Err(Error::type_mismatch(describe(inherited), describe(*function), f.header.span));
                }
            }
            Some((inherited, true))
                if program.function(inherited).visibility != Visibility::Private
                    && !is_abstract_function(program, inherited) =>
            {
                return Err(Error::syntax(
                    format!(
                        "{}.{} hides an inherited function; declare it override",
                        program.class_full_name(class),
                        f.common_name
                    ),
                    f.header.span,
                ));
            }
            _ => {}
        }
    }
    Ok(true)
}

/// `InheritsInnerClasses`: the superclass's inner classes become visible in
/// the subclass unless it declares one of the same name
pub fn inherit_inner_classes(program: &mut Program, class: ClassId) -> Result<bool> {
    let Some(parent) = program.class(class).superclass else {
        return Ok(true);
    };
    if program.class_stage(parent) <= CompilingStage::InheritsInnerClasses {
        return Ok(false);
    }
    let inherited = program.class_inner(parent).entries().to_vec();
    for symbol in inherited {
        if !program.class(class).inner_classes.contains(&symbol.name) {
            program.class_mut(class).inner_classes.add(symbol)?;
        }
    }
    Ok(true)
}

/// Abstract by modifier, or a bodiless user function of an interface or trait
pub fn is_abstract_function(program: &Program, function: FunctionId) -> bool {
    let f = program.function(function);
    if f.is_abstract() {
        return true;
    }
    let in_interface = f
        .owner
        .is_some_and(|o| program.class(program.delegate(o)).flavor != ClassFlavor::Class);
    in_interface && f.origin == FunctionOrigin::User && f.syntax.as_ref().is_some_and(|s| s.body.is_none())
}

/// `ValidateMembers`: abstract functions only where allowed, bodies where
/// required, and every inherited abstract function implemented by concrete
/// classes
pub fn validate_members(program: &Program, class: ClassId) -> Result<bool> {
    if !parents_past(program, class, CompilingStage::ParseFields) {
        return Ok(false);
    }
    let def = program.class(class);
    let name = program.class_full_name(class);
    let may_be_abstract = def.flavor != ClassFlavor::Class || def.header.modifiers.is_abstract();

    for function in &def.own_functions {
        let f = program.function(*function);
        if f.origin != FunctionOrigin::User {
            continue;
        }
        let has_body = f.syntax.as_ref().is_some_and(|s| s.body.is_some());
        if f.is_abstract() && !may_be_abstract {
            return Err(Error::syntax(
                format!("abstract function {} in non-abstract class {}", f.common_name, name),
                f.header.span,
            ));
        }
        if f.is_abstract() && has_body {
            return Err(Error::syntax(format!("abstract function {} has a body", f.common_name), f.header.span));
        }
        let native = f.header.modifiers.has(flags::NATIVE);
        if !is_abstract_function(program, *function) && !has_body && !native {
            return Err(Error::syntax(format!("function {} needs a body", f.common_name), f.header.span));
        }
    }

    if may_be_abstract {
        return Ok(true);
    }
    for ancestor in ancestors(program, class) {
        for symbol in program.class_functions(ancestor).entries() {
            let Some(required) = symbol.as_function() else {
                continue;
            };
            if !is_abstract_function(program, required) {
                continue;
            }
            let unique = program.function(required).name().to_string();
            let implemented = std::iter::once(class)
                .chain(ancestors(program, class))
                .filter_map(|c| program.class_functions(c).get(&unique).and_then(|s| s.as_function()))
                .any(|f| !is_abstract_function(program, f));
            if !implemented {
                return Err(Error::hierarchy(
                    format!(
                        "{} must implement {}.{}",
                        name,
                        program.class_full_name(ancestor),
                        program.function(required).common_name
                    ),
                    def.header.span,
                ));
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::SymbolTarget;
    use crate::syntax::{ClassSyntax, FunctionSyntax, UnitSyntax};

    /// Register every class and move it to ParseParents
    fn registered(unit: UnitSyntax) -> Program {
        let mut program = Program::new();
        program.add_unit(unit).unwrap();
        for i in 0..program.classes.len() {
            let id = ClassId::new(i as u32);
            let full = program.class_full_name(id);
            let name = program.class(id).name().to_string();
            program.packages.add(Symbol::new(name, full, SymbolTarget::Class(id))).unwrap();
            program.class_mut(id).header.stage.jump_to(CompilingStage::ParseParents);
        }
        program
    }

    fn parse_all(program: &mut Program) {
        let mut engine = GenericEngine::new();
        for i in 0..program.classes.len() {
            let id = ClassId::new(i as u32);
            if matches!(program.class(id).kind, ClassKind::TraitInScope { .. }) {
                continue;
            }
            assert!(parse_parents(program, &mut engine, id).unwrap());
            program.class_mut(id).header.stage.jump_to(CompilingStage::ValidateHierarchy);
        }
    }

    #[test]
    fn test_cycle_detected() {
        let mut program = registered(
            UnitSyntax::new("app")
                .class(ClassSyntax::new("A", ClassFlavor::Class).extends(TypeRef::named("B")))
                .class(ClassSyntax::new("B", ClassFlavor::Class).extends(TypeRef::named("A"))),
        );
        parse_all(&mut program);
        assert!(matches!(
            validate_hierarchy(&program, ClassId::new(0)),
            Err(Error::Hierarchy { .. })
        ));
    }

    #[test]
    fn test_final_and_permit_rules() {
        let mut program = registered(
            UnitSyntax::new("app")
                .class(ClassSyntax::new("Sealed", ClassFlavor::Class).permits(TypeRef::named("Ok")))
                .class(ClassSyntax::new("Ok", ClassFlavor::Class).extends(TypeRef::named("Sealed")))
                .class(ClassSyntax::new("Rogue", ClassFlavor::Class).extends(TypeRef::named("Sealed")))
                .class(ClassSyntax::new("Leaf", ClassFlavor::Class).modifiers(flags::FINAL))
                .class(ClassSyntax::new("Branch", ClassFlavor::Class).extends(TypeRef::named("Leaf"))),
        );
        parse_all(&mut program);
        assert!(validate_hierarchy(&program, ClassId::new(1)).unwrap());
        assert!(validate_hierarchy(&program, ClassId::new(2)).is_err());
        assert!(validate_hierarchy(&program, ClassId::new(4)).is_err());
    }

    #[test]
    fn test_implements_requires_interface() {
        let mut program = registered(
            UnitSyntax::new("app")
                .class(ClassSyntax::new("Base", ClassFlavor::Class))
                .class(ClassSyntax::new("Impl", ClassFlavor::Class).implements(TypeRef::named("Base"))),
        );
        parse_all(&mut program);
        assert!(matches!(
            validate_hierarchy(&program, ClassId::new(1)),
            Err(Error::Hierarchy { .. })
        ));
    }

    #[test]
    fn test_parent_not_parsed_is_not_ready() {
        let mut program = registered(
            UnitSyntax::new("app")
                .class(ClassSyntax::new("Base", ClassFlavor::Class))
                .class(ClassSyntax::new("Sub", ClassFlavor::Class).extends(TypeRef::named("Base"))),
        );
        let mut engine = GenericEngine::new();
        assert!(parse_parents(&mut program, &mut engine, ClassId::new(1)).unwrap());
        assert!(!validate_hierarchy(&program, ClassId::new(1)).unwrap());
    }

    #[test]
    fn test_unknown_parent_is_unresolved() {
        let mut program = registered(
            UnitSyntax::new("app").class(ClassSyntax::new("Sub", ClassFlavor::Class).extends(TypeRef::named("Nowhere"))),
        );
        let mut engine = GenericEngine::new();
        assert!(matches!(
            parse_parents(&mut program, &mut engine, ClassId::new(0)),
            Err(Error::Unresolved { .. })
        ));
    }

    #[test]
    fn test_traits_are_wrapped_per_scope() {
        let mut program = registered(
            UnitSyntax::new("app")
                .class(ClassSyntax::new("Named", ClassFlavor::Trait))
                .class(ClassSyntax::new("User", ClassFlavor::Class).uses(TypeRef::named("Named")))
                .class(ClassSyntax::new("Group", ClassFlavor::Class).uses(TypeRef::named("Named"))),
        );
        parse_all(&mut program);
        let (named, user, group) = (ClassId::new(0), ClassId::new(1), ClassId::new(2));
        let user_trait = program.class(user).traits[0];
        let group_trait = program.class(group).traits[0];
        assert_ne!(user_trait, group_trait);
        assert!(program.same_class(user_trait, named));
        assert_eq!(ancestors(&program, user), vec![user_trait]);
        assert!(validate_hierarchy(&program, user).unwrap());
    }

    #[test]
    fn test_function_lookup_through_superclass() {
        let mut program = registered(
            UnitSyntax::new("app")
                .class(ClassSyntax::new("Base", ClassFlavor::Class).function(FunctionSyntax::new("run", TypeRef::void())))
                .class(ClassSyntax::new("Sub", ClassFlavor::Class).extends(TypeRef::named("Base"))),
        );
        parse_all(&mut program);
        let base = ClassId::new(0);
        let run = program.class(base).own_functions[0];
        program
            .class_mut(base)
            .functions
            .add(Symbol::function("run#", "app.Base.run#", "run", run))
            .unwrap();
        assert_eq!(find_inherited_function(&program, ClassId::new(1), "run#"), Some((run, true)));
        assert_eq!(find_inherited_function(&program, ClassId::new(1), "walk#"), None);
    }
}
