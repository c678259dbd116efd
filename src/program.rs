//! Declaration arena
//!
//! All declarations live in flat vectors owned by [`Program`] and refer to
//! each other by typed ids. Ownership is tree shaped (unit → class →
//! field/function → parameter); the `owner` ids are non-owning back
//! references used for lookup only.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::codegen::body::{BodyBuilder, CompiledBody};
use crate::error::Result;
use crate::generic::ConcreteTypeRegistry;
use crate::modifiers::{Modifiers, Visibility};
use crate::namespace::{NamespaceTable, Symbol, SymbolTarget, DISAMBIGUATION_MARKER};
use crate::slots::SlotAllocator;
use crate::span::Span;
use crate::stage::{CompilingStage, StageCell};
use crate::syntax::{ClassFlavor, ClassSyntax, FieldSyntax, FunctionSyntax, UnitSyntax};
use crate::types::TypeRef;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_id!(
    /// Identity of a compilation unit
    UnitId
);
define_id!(
    /// Identity of an interned package name
    PackageId
);
define_id!(
    /// Identity of a class, interface, trait, instantiation or trait wrapper
    ClassId
);
define_id!(
    /// Identity of a function (user written or synthesized)
    FunctionId
);
define_id!(FieldId);
define_id!(ParamId);

/// Closed set of declaration kinds the driver sweeps over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclRef {
    Class(ClassId),
    Function(FunctionId),
    Field(FieldId),
    Param(ParamId),
}

/// Scope a type is used from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Class(ClassId),
    Function(FunctionId),
}

/// A type after name resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedType {
    Void,
    Primitive(String),
    Class(ClassId),
    Array(Box<ResolvedType>),
    /// Built-in primitive taking type arguments, e.g. `func<int, string>`
    Parameterized { name: String, args: Vec<ResolvedType> },
    /// Uninstantiated type parameter inside a template
    Param(String),
    /// Generic reference that still mentions type parameters
    Generic { template: ClassId, args: Vec<ResolvedType> },
}

#[derive(Debug, Clone)]
pub struct DeclHeader {
    pub name: String,
    pub stage: StageCell,
    pub span: Span,
    pub modifiers: Modifiers,
    /// Set when a stage handler failed; the driver skips failed declarations
    pub failed: bool,
}

impl DeclHeader {
    pub fn new(name: impl Into<String>, span: Span, modifiers: Modifiers, stage: CompilingStage) -> Self {
        Self {
            name: name.into(),
            stage: StageCell::new(stage),
            span,
            modifiers,
            failed: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnitDef {
    pub package: PackageId,
    pub package_name: String,
    pub classes: Vec<ClassId>,
    pub functions: Vec<FunctionId>,
    /// Top-level functions of the unit, keyed by simple name
    pub function_table: NamespaceTable<Symbol>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassKind {
    Declared,
    Instantiated { template: ClassId, args: Vec<TypeRef> },
    /// Lexical-scope view of an instantiated trait; forwards to `base`
    TraitInScope { base: ClassId, scope: ClassId },
}

#[derive(Debug)]
pub struct ClassDef {
    pub header: DeclHeader,
    pub unit: UnitId,
    pub owner: Option<ClassId>,
    pub flavor: ClassFlavor,
    pub kind: ClassKind,
    pub generic_source: Option<ClassId>,
    pub syntax: Rc<ClassSyntax>,
    pub type_params: Vec<String>,
    pub superclass: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub traits: Vec<ClassId>,
    pub permits: Vec<ClassId>,
    pub own_fields: Vec<FieldId>,
    pub own_functions: Vec<FunctionId>,
    pub own_inner: Vec<ClassId>,
    pub fields: NamespaceTable<Symbol>,
    pub functions: NamespaceTable<Symbol>,
    pub inner_classes: NamespaceTable<Symbol>,
    pub constructor: Option<FunctionId>,
    pub slots: SlotAllocator,
    pub concrete_types: ConcreteTypeRegistry,
    /// Encoded class definition stream, present once compiled
    pub definition: Option<Vec<u8>>,
}

impl ClassDef {
    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn stage(&self) -> CompilingStage {
        self.header.stage.get()
    }

    pub fn is_template(&self) -> bool {
        !self.type_params.is_empty()
    }
}

/// Where a function's body comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionOrigin {
    User,
    Getter { field: FieldId },
    Setter { field: FieldId },
}

#[derive(Debug)]
pub struct FunctionDef {
    /// `header.name` is the unique (disambiguated) name
    pub header: DeclHeader,
    pub common_name: String,
    pub unit: UnitId,
    pub owner: Option<ClassId>,
    pub origin: FunctionOrigin,
    pub generic_source: Option<FunctionId>,
    pub syntax: Option<Rc<FunctionSyntax>>,
    pub type_params: Vec<String>,
    pub params: Vec<ParamId>,
    pub param_table: NamespaceTable<Symbol>,
    pub result: TypeRef,
    pub resolved_result: Option<ResolvedType>,
    pub visibility: Visibility,
    pub slots: SlotAllocator,
    pub concrete_types: ConcreteTypeRegistry,
    pub builder: Option<BodyBuilder>,
    pub compiled: Option<Rc<CompiledBody>>,
}

impl FunctionDef {
    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn stage(&self) -> CompilingStage {
        self.header.stage.get()
    }

    pub fn is_abstract(&self) -> bool {
        self.header.modifiers.is_abstract()
    }

    pub fn is_static(&self) -> bool {
        self.header.modifiers.is_static()
    }
}

#[derive(Debug)]
pub struct FieldDef {
    pub header: DeclHeader,
    pub owner: ClassId,
    pub generic_source: Option<FieldId>,
    pub syntax: Rc<FieldSyntax>,
    pub ty: TypeRef,
    pub resolved: Option<ResolvedType>,
    pub suppress_getter: bool,
    pub suppress_setter: bool,
    pub getter: Option<FunctionId>,
    pub setter: Option<FunctionId>,
    pub slot: Option<u32>,
}

impl FieldDef {
    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn stage(&self) -> CompilingStage {
        self.header.stage.get()
    }
}

#[derive(Debug)]
pub struct ParamDef {
    pub header: DeclHeader,
    pub owner: FunctionId,
    pub generic_source: Option<ParamId>,
    pub ty: TypeRef,
    pub resolved: Option<ResolvedType>,
    pub slot: Option<u32>,
}

/// Unique name of a function: common name, marker, parameter types
pub fn mangle_function_name(common: &str, params: &[TypeRef]) -> String {
    let sig: Vec<String> = params.iter().map(|p| p.to_string()).collect();
    format!("{}{}{}", common, DISAMBIGUATION_MARKER, sig.join(","))
}

/// Whole-program declaration store
#[derive(Debug, Default)]
pub struct Program {
    pub units: Vec<UnitDef>,
    pub classes: Vec<ClassDef>,
    pub functions: Vec<FunctionDef>,
    pub fields: Vec<FieldDef>,
    pub params: Vec<ParamDef>,
    /// Packages, classes and top-level functions keyed by full name
    pub packages: NamespaceTable<Symbol>,
    package_ids: HashMap<String, PackageId>,
}

impl Program {
    pub fn new() -> Self {
        Self {
            packages: NamespaceTable::by_full_name(),
            ..Default::default()
        }
    }

    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.index()]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassDef {
        &mut self.classes[id.index()]
    }

    pub fn function(&self, id: FunctionId) -> &FunctionDef {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut FunctionDef {
        &mut self.functions[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &FieldDef {
        &self.fields[id.index()]
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut FieldDef {
        &mut self.fields[id.index()]
    }

    pub fn param(&self, id: ParamId) -> &ParamDef {
        &self.params[id.index()]
    }

    pub fn param_mut(&mut self, id: ParamId) -> &mut ParamDef {
        &mut self.params[id.index()]
    }

    pub fn unit(&self, id: UnitId) -> &UnitDef {
        &self.units[id.index()]
    }

    /// Intern a package name; the same name always yields the same id
    pub fn intern_package(&mut self, name: &str) -> PackageId {
        if let Some(id) = self.package_ids.get(name) {
            return *id;
        }
        let id = PackageId::new(self.package_ids.len() as u32);
        self.package_ids.insert(name.to_string(), id);
        id
    }

    /// Register a unit's declarations. Nothing is resolved yet: every
    /// declaration starts at `ParseClassName`.
    pub fn add_unit(&mut self, syntax: UnitSyntax) -> Result<UnitId> {
        let unit = UnitId::new(self.units.len() as u32);
        let package = self.intern_package(&syntax.package);
        self.packages
            .add(Symbol::new(syntax.package.clone(), syntax.package.clone(), SymbolTarget::Package(package)))?;
        self.units.push(UnitDef {
            package,
            package_name: syntax.package.clone(),
            classes: Vec::new(),
            functions: Vec::new(),
            function_table: NamespaceTable::new(),
            span: syntax.span,
        });

        for class in &syntax.classes {
            let id = self.declare_class(unit, None, class.clone());
            self.units[unit.index()].classes.push(id);
        }
        for function in &syntax.functions {
            let id = self.declare_function(unit, None, function.clone(), CompilingStage::ParseClassName);
            self.units[unit.index()].functions.push(id);
        }
        log::debug!(
            "unit '{}' declared: {} classes, {} functions",
            syntax.package,
            syntax.classes.len(),
            syntax.functions.len()
        );
        Ok(unit)
    }

    fn declare_class(&mut self, unit: UnitId, owner: Option<ClassId>, syntax: Rc<ClassSyntax>) -> ClassId {
        let id = self.push_class(ClassDef {
            header: DeclHeader::new(syntax.name.clone(), syntax.span, syntax.modifiers, CompilingStage::ParseClassName),
            unit,
            owner,
            flavor: syntax.flavor,
            kind: ClassKind::Declared,
            generic_source: None,
            syntax: syntax.clone(),
            type_params: syntax.type_params.clone(),
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
        });

        for field in &syntax.fields {
            let fid = self.declare_field(id, field.clone());
            self.class_mut(id).own_fields.push(fid);
        }
        for function in &syntax.functions {
            let fid = self.declare_function(unit, Some(id), function.clone(), CompilingStage::ParseClassName);
            if function.name == "new" {
                self.class_mut(id).constructor = Some(fid);
            }
            self.class_mut(id).own_functions.push(fid);
        }
        for inner in &syntax.inner {
            let cid = self.declare_class(unit, Some(id), inner.clone());
            self.class_mut(id).own_inner.push(cid);
        }
        id
    }

    pub(crate) fn push_class(&mut self, class: ClassDef) -> ClassId {
        let id = ClassId::new(self.classes.len() as u32);
        self.classes.push(class);
        id
    }

    pub(crate) fn declare_field(&mut self, owner: ClassId, syntax: Rc<FieldSyntax>) -> FieldId {
        let id = FieldId::new(self.fields.len() as u32);
        let suppress_getter = syntax.modifiers.has(crate::modifiers::flags::NO_GETTER);
        let suppress_setter = syntax.modifiers.has(crate::modifiers::flags::NO_SETTER);
        self.fields.push(FieldDef {
            header: DeclHeader::new(syntax.name.clone(), syntax.span, syntax.modifiers, CompilingStage::ParseClassName),
            owner,
            generic_source: None,
            ty: syntax.ty.clone(),
            syntax,
            resolved: None,
            suppress_getter,
            suppress_setter,
            getter: None,
            setter: None,
            slot: None,
        });
        id
    }

    pub(crate) fn declare_function(
        &mut self,
        unit: UnitId,
        owner: Option<ClassId>,
        syntax: Rc<FunctionSyntax>,
        stage: CompilingStage,
    ) -> FunctionId {
        let id = FunctionId::new(self.functions.len() as u32);
        let param_types: Vec<TypeRef> = syntax.params.iter().map(|p| p.ty.clone()).collect();
        let unique = mangle_function_name(&syntax.name, &param_types);
        let owner_is_interface = owner.map(|c| self.class(c).flavor != ClassFlavor::Class).unwrap_or(false);
        self.functions.push(FunctionDef {
            header: DeclHeader::new(unique, syntax.span, syntax.modifiers, stage),
            common_name: syntax.name.clone(),
            unit,
            owner,
            origin: FunctionOrigin::User,
            generic_source: None,
            syntax: Some(syntax.clone()),
            type_params: syntax.type_params.clone(),
            params: Vec::new(),
            param_table: NamespaceTable::new(),
            result: syntax.result.clone(),
            resolved_result: None,
            visibility: Visibility::resolve(syntax.modifiers.visibility(), None, owner_is_interface),
            slots: SlotAllocator::new(),
            concrete_types: ConcreteTypeRegistry::default(),
            builder: None,
            compiled: None,
        });
        for param in &syntax.params {
            let pid = self.push_param(ParamDef {
                header: DeclHeader::new(param.name.clone(), param.span, param.modifiers, stage),
                owner: id,
                generic_source: None,
                ty: param.ty.clone(),
                resolved: None,
                slot: None,
            });
            self.function_mut(id).params.push(pid);
        }
        id
    }

    pub(crate) fn push_function(&mut self, function: FunctionDef) -> FunctionId {
        let id = FunctionId::new(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub(crate) fn push_field(&mut self, field: FieldDef) -> FieldId {
        let id = FieldId::new(self.fields.len() as u32);
        self.fields.push(field);
        id
    }

    pub(crate) fn push_param(&mut self, param: ParamDef) -> ParamId {
        let id = ParamId::new(self.params.len() as u32);
        self.params.push(param);
        id
    }

    /// Follow trait-in-scope wrappers to the class that holds the structure
    pub fn delegate(&self, id: ClassId) -> ClassId {
        let mut current = id;
        while let ClassKind::TraitInScope { base, .. } = self.class(current).kind {
            current = base;
        }
        current
    }

    /// Identity comparison that sees through trait-in-scope wrappers
    pub fn same_class(&self, a: ClassId, b: ClassId) -> bool {
        a == b || self.delegate(a) == self.delegate(b)
    }

    /// Compiling stage of a class, forwarded through wrappers
    pub fn class_stage(&self, id: ClassId) -> CompilingStage {
        self.class(self.delegate(id)).stage()
    }

    pub fn class_fields(&self, id: ClassId) -> &NamespaceTable<Symbol> {
        &self.class(self.delegate(id)).fields
    }

    pub fn class_functions(&self, id: ClassId) -> &NamespaceTable<Symbol> {
        &self.class(self.delegate(id)).functions
    }

    pub fn class_inner(&self, id: ClassId) -> &NamespaceTable<Symbol> {
        &self.class(self.delegate(id)).inner_classes
    }

    pub fn constructor_of(&self, id: ClassId) -> Option<FunctionId> {
        self.class(self.delegate(id)).constructor
    }

    pub fn permits_of(&self, id: ClassId) -> &[ClassId] {
        &self.class(self.delegate(id)).permits
    }

    /// Full dotted name: package, enclosing classes, own name
    pub fn class_full_name(&self, id: ClassId) -> String {
        let class = self.class(id);
        match class.owner {
            Some(owner) => format!("{}.{}", self.class_full_name(owner), class.name()),
            None => {
                let package = &self.unit(class.unit).package_name;
                if package.is_empty() {
                    class.name().to_string()
                } else {
                    format!("{}.{}", package, class.name())
                }
            }
        }
    }

    pub fn function_full_name(&self, id: FunctionId) -> String {
        let function = self.function(id);
        match function.owner {
            Some(owner) => format!("{}.{}", self.class_full_name(owner), function.name()),
            None => {
                let package = &self.unit(function.unit).package_name;
                if package.is_empty() {
                    function.name().to_string()
                } else {
                    format!("{}.{}", package, function.name())
                }
            }
        }
    }

    /// Outermost class of a class's enclosing chain
    pub fn top_level_class(&self, id: ClassId) -> ClassId {
        let mut current = id;
        while let Some(owner) = self.class(current).owner {
            current = owner;
        }
        current
    }

    /// Type parameters visible from a scope: the function's own, then every
    /// enclosing class's
    pub fn type_params_in_scope(&self, scope: Scope) -> Vec<String> {
        let mut params = Vec::new();
        let mut class = match scope {
            Scope::Function(f) => {
                params.extend(self.function(f).type_params.iter().cloned());
                self.function(f).owner
            }
            Scope::Class(c) => Some(c),
        };
        while let Some(c) = class {
            params.extend(self.class(c).type_params.iter().cloned());
            class = self.class(c).owner;
        }
        params
    }

    pub fn scope_unit(&self, scope: Scope) -> UnitId {
        match scope {
            Scope::Class(c) => self.class(c).unit,
            Scope::Function(f) => self.function(f).unit,
        }
    }

    pub fn decl_stage(&self, decl: DeclRef) -> CompilingStage {
        match decl {
            DeclRef::Class(id) => self.class_stage(id),
            DeclRef::Function(id) => self.function(id).stage(),
            DeclRef::Field(id) => self.field(id).stage(),
            DeclRef::Param(id) => self.param(id).header.stage.get(),
        }
    }

    pub fn decl_header_mut(&mut self, decl: DeclRef) -> &mut DeclHeader {
        match decl {
            DeclRef::Class(id) => &mut self.class_mut(id).header,
            DeclRef::Function(id) => &mut self.function_mut(id).header,
            DeclRef::Field(id) => &mut self.field_mut(id).header,
            DeclRef::Param(id) => &mut self.param_mut(id).header,
        }
    }

    pub fn decl_failed(&self, decl: DeclRef) -> bool {
        match decl {
            DeclRef::Class(id) => self.class(id).header.failed,
            DeclRef::Function(id) => self.function(id).header.failed,
            DeclRef::Field(id) => self.field(id).header.failed,
            DeclRef::Param(id) => self.param(id).header.failed,
        }
    }

    /// Every declaration the driver sweeps; trait wrappers carry no stage of
    /// their own and are left out
    pub fn all_decls(&self) -> Vec<DeclRef> {
        let mut decls = Vec::with_capacity(self.classes.len() + self.functions.len() + self.fields.len() + self.params.len());
        decls.extend(
            self.classes
                .iter()
                .enumerate()
                .filter(|(_, c)| !matches!(c.kind, ClassKind::TraitInScope { .. }))
                .map(|(i, _)| DeclRef::Class(ClassId::new(i as u32))),
        );
        decls.extend((0..self.fields.len()).map(|i| DeclRef::Field(FieldId::new(i as u32))));
        decls.extend((0..self.functions.len()).map(|i| DeclRef::Function(FunctionId::new(i as u32))));
        decls.extend((0..self.params.len()).map(|i| DeclRef::Param(ParamId::new(i as u32))));
        decls
    }

    pub fn describe(&self, decl: DeclRef) -> String {
        match decl {
            DeclRef::Class(id) => format!("class {}", self.class_full_name(id)),
            DeclRef::Function(id) => format!("fn {}", self.function_full_name(id)),
            DeclRef::Field(id) => {
                let field = self.field(id);
                format!("field {}.{}", self.class_full_name(field.owner), field.name())
            }
            DeclRef::Param(id) => {
                let param = self.param(id);
                format!("param {} of {}", param.header.name, self.function_full_name(param.owner))
            }
        }
    }

    /// Two resolved types denote the same type
    pub fn same_type(&self, a: &ResolvedType, b: &ResolvedType) -> bool {
        match (a, b) {
            (ResolvedType::Class(x), ResolvedType::Class(y)) => self.same_class(*x, *y),
            (ResolvedType::Array(x), ResolvedType::Array(y)) => self.same_type(x, y),
            (
                ResolvedType::Parameterized { name: n1, args: a1 },
                ResolvedType::Parameterized { name: n2, args: a2 },
            ) => n1 == n2 && a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| self.same_type(x, y)),
            (
                ResolvedType::Generic { template: t1, args: a1 },
                ResolvedType::Generic { template: t2, args: a2 },
            ) => {
                self.same_class(*t1, *t2) && a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| self.same_type(x, y))
            }
            _ => a == b,
        }
    }

    pub fn describe_type(&self, ty: &ResolvedType) -> String {
        match ty {
            ResolvedType::Void => "void".to_string(),
            ResolvedType::Primitive(name) | ResolvedType::Param(name) => name.clone(),
            ResolvedType::Class(id) => self.class_full_name(self.delegate(*id)),
            ResolvedType::Array(element) => format!("{}[]", self.describe_type(element)),
            ResolvedType::Parameterized { name, args } => {
                let args: Vec<String> = args.iter().map(|a| self.describe_type(a)).collect();
                format!("{}<{}>", name, args.join(", "))
            }
            ResolvedType::Generic { template, args } => {
                let args: Vec<String> = args.iter().map(|a| self.describe_type(a)).collect();
                format!("{}<{}>", self.class_full_name(*template), args.join(", "))
            }
        }
    }
}

impl fmt::Display for DeclRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclRef::Class(id) => write!(f, "class#{}", id.index()),
            DeclRef::Function(id) => write!(f, "fn#{}", id.index()),
            DeclRef::Field(id) => write!(f, "field#{}", id.index()),
            DeclRef::Param(id) => write!(f, "param#{}", id.index()),
        }
    }
}
