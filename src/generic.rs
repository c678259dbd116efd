//! Generic instantiation engine
//!
//! Templates are cloned under a [`TypeBinding`]: every member keeps its
//! declared shape, every mention of a bound type parameter is replaced by the
//! argument, and the clone is re-parented to its new owner. Clones remember
//! their template through `generic_source` so later stages can skip work the
//! template already did.
//!
//! Requests are deduplicated on `(template, owner, binding)`; a repeated
//! request returns the earlier clone with [`Instantiation::existing`] set.
//! Traits used by a class are not cloned per use site: a trait-in-scope
//! wrapper records the lexical scope and forwards every structural query to
//! the instantiated base.
//!
//! Concrete types (arrays, parameterized primitives, instantiated classes)
//! are recorded against a host: the top-level class enclosing the scope that
//! used them, or the top-level function itself.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{Error, Result};
use crate::namespace::NamespaceTable;
use crate::program::{
    mangle_function_name, ClassDef, ClassId, ClassKind, DeclHeader, DeclRef, FieldDef, FieldId, FunctionDef,
    FunctionId, FunctionOrigin, ParamDef, ParamId, Program, Scope,
};
use crate::slots::SlotAllocator;
use crate::span::Span;
use crate::stage::CompilingStage;
use crate::types::{TypeBinding, TypeRef};

/// Deepest argument nesting an instantiation may have
pub const MAX_INSTANTIATION_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcreteKind {
    Array,
    Parameterized,
    Instantiated,
}

/// A fully resolved type eligible for deduplicated emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteType {
    pub full_name: String,
    pub kind: ConcreteKind,
    /// Concrete classes the type refers to
    pub depends_on: Vec<ClassId>,
}

/// Owner of concrete-type registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Host {
    Class(ClassId),
    Function(FunctionId),
}

impl ConcreteType {
    /// Record this type against `host`. Returns false when the host already
    /// holds a type of the same full name.
    pub fn register_to(self, program: &mut Program, host: Host) -> bool {
        let registry = match host {
            Host::Class(id) => &mut program.class_mut(id).concrete_types,
            Host::Function(id) => &mut program.function_mut(id).concrete_types,
        };
        let name = self.full_name.clone();
        let added = registry.register(self);
        if added {
            log::debug!("concrete type '{}' registered to {:?}", name, host);
        }
        added
    }
}

/// Per-host ordered set of concrete types
#[derive(Debug, Clone, Default)]
pub struct ConcreteTypeRegistry {
    by_name: HashMap<String, usize>,
    types: Vec<ConcreteType>,
}

impl ConcreteTypeRegistry {
    pub fn register(&mut self, ty: ConcreteType) -> bool {
        if self.by_name.contains_key(&ty.full_name) {
            return false;
        }
        self.by_name.insert(ty.full_name.clone(), self.types.len());
        self.types.push(ty);
        true
    }

    pub fn get(&self, full_name: &str) -> Option<&ConcreteType> {
        self.by_name.get(full_name).map(|i| &self.types[*i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConcreteType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Nearest enclosing top-level class (or top-level function) of a scope
pub fn host_of(program: &Program, scope: Scope) -> Host {
    match scope {
        Scope::Class(class) => Host::Class(program.top_level_class(class)),
        Scope::Function(function) => match program.function(function).owner {
            Some(owner) => Host::Class(program.top_level_class(owner)),
            None => Host::Function(function),
        },
    }
}

/// Result of an instantiation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instantiation<T> {
    pub id: T,
    /// The request matched an earlier clone
    pub existing: bool,
}

impl<T> Instantiation<T> {
    fn fresh(id: T) -> Self {
        Self { id, existing: false }
    }

    fn reused(id: T) -> Self {
        Self { id, existing: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstanceKey {
    template: DeclRef,
    owner: Option<DeclRef>,
    binding: TypeBinding,
}

#[derive(Debug)]
struct InstanceCache<K, V> {
    instances: HashMap<K, V>,
    hits: u32,
    misses: u32,
}

impl<K: Hash + Eq, V: Copy> InstanceCache<K, V> {
    fn new() -> Self {
        Self {
            instances: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: &K) -> Option<V> {
        let found = self.instances.get(key).copied();
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    fn insert(&mut self, key: K, value: V) {
        self.instances.insert(key, value);
    }

    fn len(&self) -> usize {
        self.instances.len()
    }
}

#[derive(Debug)]
pub struct GenericEngine {
    instances: InstanceCache<InstanceKey, DeclRef>,
    trait_wrappers: InstanceCache<(ClassId, ClassId), ClassId>,
}

impl Default for GenericEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GenericEngine {
    pub fn new() -> Self {
        Self {
            instances: InstanceCache::new(),
            trait_wrappers: InstanceCache::new(),
        }
    }

    /// Number of distinct clones created so far
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// (hits, misses) of the instantiation cache
    pub fn cache_stats(&self) -> (u32, u32) {
        (self.instances.hits, self.instances.misses)
    }

    /// Instantiate a class template with concrete arguments.
    ///
    /// Arguments must be canonical (fully qualified, no type parameters) so
    /// equal types requested from different scopes share one clone.
    pub fn instantiate_class(
        &mut self,
        program: &mut Program,
        template: ClassId,
        args: &[TypeRef],
        span: Span,
    ) -> Result<Instantiation<ClassId>> {
        let template = program.delegate(template);
        let binding = TypeBinding::bind(&program.class(template).type_params, args, span)?;
        let key = InstanceKey {
            template: DeclRef::Class(template),
            owner: None,
            binding,
        };
        if let Some(DeclRef::Class(id)) = self.instances.get(&key) {
            return Ok(Instantiation::reused(id));
        }

        let source = program.class(template);
        let printed: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let name = format!("{}<{}>", source.name(), printed.join(", "));
        let depth = 1 + args.iter().map(TypeRef::nesting_depth).max().unwrap_or(0);
        if depth > MAX_INSTANTIATION_DEPTH {
            return Err(Error::type_mismatch(
                format!("at most {} nested type arguments", MAX_INSTANTIATION_DEPTH),
                name,
                span,
            ));
        }
        let clone = ClassDef {
            header: DeclHeader::new(
                name,
                source.header.span,
                source.header.modifiers,
                CompilingStage::ParseClassName,
            ),
            unit: source.unit,
            owner: source.owner,
            flavor: source.flavor,
            kind: ClassKind::Instantiated {
                template,
                args: args.to_vec(),
            },
            generic_source: Some(template),
            syntax: source.syntax.clone(),
            type_params: Vec::new(),
            superclass: None,
            interfaces: Vec::new(),
            traits: Vec::new(),
            permits: Vec::new(),
            own_fields: Vec::new(),
            own_functions: Vec::new(),
            own_inner: Vec::new(),
            fields: NamespaceTable::new(),
            functions: NamespaceTable::new(),
            inner_classes: NamespaceTable::new(),
            constructor: None,
            slots: SlotAllocator::new(),
            concrete_types: ConcreteTypeRegistry::default(),
            definition: None,
        };
        let template_fields = source.own_fields.clone();
        let template_functions = source.own_functions.clone();
        let template_constructor = source.constructor;

        let id = program.push_class(clone);
        // Registered before the members so self-referencing members hit the cache
        self.instances.insert(key.clone(), DeclRef::Class(id));

        for field in template_fields {
            let cloned = self.clone_field(program, field, &key.binding, id)?.id;
            program.class_mut(id).own_fields.push(cloned);
        }
        for function in template_functions {
            if program.function(function).origin != FunctionOrigin::User {
                continue;
            }
            let cloned = self.clone_function(program, function, &key.binding, Some(id))?.id;
            if template_constructor == Some(function) {
                program.class_mut(id).constructor = Some(cloned);
            }
            program.class_mut(id).own_functions.push(cloned);
        }

        log::debug!(
            "instantiated {} from template {}",
            program.class_full_name(id),
            program.class_full_name(template)
        );
        Ok(Instantiation::fresh(id))
    }

    /// Clone a field into `owner`, substituting its type. Accessor
    /// suppression flags carry over.
    pub fn clone_field(
        &mut self,
        program: &mut Program,
        template: FieldId,
        binding: &TypeBinding,
        owner: ClassId,
    ) -> Result<Instantiation<FieldId>> {
        let key = InstanceKey {
            template: DeclRef::Field(template),
            owner: Some(DeclRef::Class(owner)),
            binding: binding.clone(),
        };
        if let Some(found) = self.instances.get(&key) {
            return match found {
                DeclRef::Field(id) => Ok(Instantiation::reused(id)),
                other => Err(Error::internal(format!("field clone cache holds {}", other))),
            };
        }

        let source = program.field(template);
        let clone = FieldDef {
            header: DeclHeader::new(
                source.name(),
                source.header.span,
                source.header.modifiers,
                CompilingStage::ParseClassName,
            ),
            owner,
            generic_source: Some(template),
            syntax: source.syntax.clone(),
            ty: source.ty.substitute(binding),
            resolved: None,
            suppress_getter: source.suppress_getter,
            suppress_setter: source.suppress_setter,
            getter: None,
            setter: None,
            slot: None,
        };
        let id = program.push_field(clone);
        self.instances.insert(key, DeclRef::Field(id));
        Ok(Instantiation::fresh(id))
    }

    /// Clone a function and its parameters into `owner`. The unique name is
    /// recomputed from the substituted parameter types.
    pub fn clone_function(
        &mut self,
        program: &mut Program,
        template: FunctionId,
        binding: &TypeBinding,
        owner: Option<ClassId>,
    ) -> Result<Instantiation<FunctionId>> {
        let key = InstanceKey {
            template: DeclRef::Function(template),
            owner: owner.map(DeclRef::Class),
            binding: binding.clone(),
        };
        if let Some(found) = self.instances.get(&key) {
            return match found {
                DeclRef::Function(id) => Ok(Instantiation::reused(id)),
                other => Err(Error::internal(format!("function clone cache holds {}", other))),
            };
        }

        let source = program.function(template);
        let template_params = source.params.clone();
        let param_types: Vec<TypeRef> = template_params
            .iter()
            .map(|p| program.param(*p).ty.substitute(binding))
            .collect();
        let name = match source.origin {
            FunctionOrigin::User => mangle_function_name(&source.common_name, &param_types),
            _ => source.name().to_string(),
        };
        let clone = FunctionDef {
            header: DeclHeader::new(
                name,
                source.header.span,
                source.header.modifiers,
                CompilingStage::ParseClassName,
            ),
            common_name: source.common_name.clone(),
            unit: source.unit,
            owner,
            origin: source.origin,
            generic_source: Some(template),
            syntax: source.syntax.clone(),
            type_params: source.type_params.clone(),
            params: Vec::new(),
            param_table: NamespaceTable::new(),
            result: source.result.substitute(binding),
            resolved_result: None,
            visibility: source.visibility,
            slots: SlotAllocator::new(),
            concrete_types: ConcreteTypeRegistry::default(),
            builder: None,
            compiled: None,
        };
        let id = program.push_function(clone);
        self.instances.insert(key, DeclRef::Function(id));

        for param in template_params {
            let cloned = self.clone_param(program, param, binding, id)?.id;
            program.function_mut(id).params.push(cloned);
        }
        Ok(Instantiation::fresh(id))
    }

    pub fn clone_param(
        &mut self,
        program: &mut Program,
        template: ParamId,
        binding: &TypeBinding,
        owner: FunctionId,
    ) -> Result<Instantiation<ParamId>> {
        let key = InstanceKey {
            template: DeclRef::Param(template),
            owner: Some(DeclRef::Function(owner)),
            binding: binding.clone(),
        };
        if let Some(found) = self.instances.get(&key) {
            return match found {
                DeclRef::Param(id) => Ok(Instantiation::reused(id)),
                other => Err(Error::internal(format!("parameter clone cache holds {}", other))),
            };
        }

        let source = program.param(template);
        let clone = ParamDef {
            header: DeclHeader::new(
                source.header.name.clone(),
                source.header.span,
                source.header.modifiers,
                CompilingStage::ParseClassName,
            ),
            owner,
            generic_source: Some(template),
            ty: source.ty.substitute(binding),
            resolved: None,
            slot: None,
        };
        let id = program.push_param(clone);
        self.instances.insert(key, DeclRef::Param(id));
        Ok(Instantiation::fresh(id))
    }

    /// Wrapper presenting an (instantiated) trait inside the lexical scope of
    /// the class using it
    pub fn trait_in_scope(&mut self, program: &mut Program, base: ClassId, scope: ClassId) -> Instantiation<ClassId> {
        let base = program.delegate(base);
        if let Some(id) = self.trait_wrappers.get(&(base, scope)) {
            return Instantiation::reused(id);
        }

        let source = program.class(base);
        let wrapper = ClassDef {
            header: DeclHeader::new(
                source.name(),
                source.header.span,
                source.header.modifiers,
                CompilingStage::ParseClassName,
            ),
            unit: source.unit,
            owner: source.owner,
            flavor: source.flavor,
            kind: ClassKind::TraitInScope { base, scope },
            generic_source: source.generic_source,
            syntax: source.syntax.clone(),
            type_params: Vec::new(),
            superclass: None,
            interfaces: Vec::new(),
            traits: Vec::new(),
            permits: Vec::new(),
            own_fields: Vec::new(),
            own_functions: Vec::new(),
            own_inner: Vec::new(),
            fields: NamespaceTable::new(),
            functions: NamespaceTable::new(),
            inner_classes: NamespaceTable::new(),
            constructor: None,
            slots: SlotAllocator::new(),
            concrete_types: ConcreteTypeRegistry::default(),
            definition: None,
        };
        let id = program.push_class(wrapper);
        self.trait_wrappers.insert((base, scope), id);
        log::debug!(
            "trait {} wrapped for scope {}",
            program.class_full_name(base),
            program.class_full_name(scope)
        );
        Instantiation::fresh(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{ClassFlavor, ClassSyntax, FieldSyntax, FunctionSyntax, UnitSyntax};

    fn program_with_list() -> (Program, ClassId) {
        let mut program = Program::new();
        program
            .add_unit(
                UnitSyntax::new("app").class(
                    ClassSyntax::new("List", ClassFlavor::Class)
                        .type_params(&["T"])
                        .field(FieldSyntax::new("items", TypeRef::parse("T[]").unwrap()))
                        .function(FunctionSyntax::new("get", TypeRef::named("T")).param("index", TypeRef::named("int")))
                        .function(FunctionSyntax::new("add", TypeRef::void()).param("item", TypeRef::named("T"))),
                ),
            )
            .unwrap();
        (program, ClassId::new(0))
    }

    #[test]
    fn test_instantiation_is_deduplicated() {
        let (mut program, list) = program_with_list();
        let mut engine = GenericEngine::new();

        let first = engine
            .instantiate_class(&mut program, list, &[TypeRef::named("int")], Span::default())
            .unwrap();
        let second = engine
            .instantiate_class(&mut program, list, &[TypeRef::named("int")], Span::default())
            .unwrap();
        assert!(!first.existing);
        assert!(second.existing);
        assert_eq!(first.id, second.id);

        let other = engine
            .instantiate_class(&mut program, list, &[TypeRef::named("string")], Span::default())
            .unwrap();
        assert!(!other.existing);
        assert_ne!(other.id, first.id);
        assert_eq!(engine.cache_stats().0, 1);
    }

    #[test]
    fn test_clone_substitutes_members() {
        let (mut program, list) = program_with_list();
        let mut engine = GenericEngine::new();
        let clone = engine
            .instantiate_class(&mut program, list, &[TypeRef::named("string")], Span::default())
            .unwrap()
            .id;

        let class = program.class(clone);
        assert_eq!(class.name(), "List<string>");
        assert_eq!(class.generic_source, Some(list));
        assert_eq!(program.class_full_name(clone), "app.List<string>");

        let field = program.field(class.own_fields[0]);
        assert_eq!(field.ty.to_string(), "string[]");
        assert_eq!(field.owner, clone);

        let add = program.function(class.own_functions[1]);
        assert_eq!(add.name(), "add#string");
        assert_eq!(program.param(add.params[0]).ty, TypeRef::named("string"));
        assert_eq!(program.function(class.own_functions[0]).result, TypeRef::named("string"));
    }

    #[test]
    fn test_arity_mismatch_is_type_mismatch() {
        let (mut program, list) = program_with_list();
        let mut engine = GenericEngine::new();
        let result = engine.instantiate_class(
            &mut program,
            list,
            &[TypeRef::named("int"), TypeRef::named("int")],
            Span::default(),
        );
        assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn test_field_clone_keeps_suppression() {
        let mut program = Program::new();
        program
            .add_unit(
                UnitSyntax::new("app").class(
                    ClassSyntax::new("Box", ClassFlavor::Class)
                        .type_params(&["T"])
                        .field(FieldSyntax::new("value", TypeRef::named("T")).modifiers(crate::modifiers::flags::NO_SETTER)),
                ),
            )
            .unwrap();
        let mut engine = GenericEngine::new();
        let clone = engine
            .instantiate_class(&mut program, ClassId::new(0), &[TypeRef::named("int")], Span::default())
            .unwrap()
            .id;
        let field = program.field(program.class(clone).own_fields[0]);
        assert!(field.suppress_setter);
        assert!(!field.suppress_getter);
    }

    #[test]
    fn test_trait_wrapper_forwards_to_base() {
        let mut program = Program::new();
        program
            .add_unit(
                UnitSyntax::new("app")
                    .class(ClassSyntax::new("Named", ClassFlavor::Trait).field(FieldSyntax::new("name", TypeRef::named("string"))))
                    .class(ClassSyntax::new("User", ClassFlavor::Class)),
            )
            .unwrap();
        let (named, user) = (ClassId::new(0), ClassId::new(1));
        let mut engine = GenericEngine::new();

        let wrapper = engine.trait_in_scope(&mut program, named, user);
        assert!(!wrapper.existing);
        assert!(engine.trait_in_scope(&mut program, named, user).existing);
        assert!(program.same_class(wrapper.id, named));
        assert_eq!(program.delegate(wrapper.id), named);
        assert_eq!(program.class_stage(wrapper.id), program.class(named).stage());
    }

    #[test]
    fn test_registry_dedups_by_full_name() {
        let (mut program, list) = program_with_list();
        let int_array = || ConcreteType {
            full_name: "int[]".to_string(),
            kind: ConcreteKind::Array,
            depends_on: Vec::new(),
        };
        assert!(int_array().register_to(&mut program, Host::Class(list)));
        assert!(!int_array().register_to(&mut program, Host::Class(list)));
        assert_eq!(program.class(list).concrete_types.len(), 1);
    }

    #[test]
    fn test_host_is_top_level() {
        let mut program = Program::new();
        program
            .add_unit(
                UnitSyntax::new("app")
                    .class(
                        ClassSyntax::new("Outer", ClassFlavor::Class).inner(
                            ClassSyntax::new("Inner", ClassFlavor::Class)
                                .function(FunctionSyntax::new("f", TypeRef::void())),
                        ),
                    )
                    .function(FunctionSyntax::new("main", TypeRef::void())),
            )
            .unwrap();
        let outer = ClassId::new(0);
        let inner = program.class(outer).own_inner[0];
        let method = program.class(inner).own_functions[0];
        let main = program.units[0].functions[0];

        assert_eq!(host_of(&program, Scope::Class(inner)), Host::Class(outer));
        assert_eq!(host_of(&program, Scope::Function(method)), Host::Class(outer));
        assert_eq!(host_of(&program, Scope::Function(main)), Host::Function(main));
    }
}
