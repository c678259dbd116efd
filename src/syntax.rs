//! Front-end syntax nodes consumed by the core
//!
//! The grammar front-end is an external collaborator. It hands the core one
//! [`UnitSyntax`] per source file; every node is reference counted so that
//! declarations (and their generic clones) can share the node as a stable
//! identity anchor for their declaration site.

use std::rc::Rc;

use crate::modifiers::{Modifiers, Visibility};
use crate::span::Span;
use crate::types::TypeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassFlavor {
    Class,
    Interface,
    Trait,
}

#[derive(Debug, Clone)]
pub struct UnitSyntax {
    pub package: String,
    pub classes: Vec<Rc<ClassSyntax>>,
    pub functions: Vec<Rc<FunctionSyntax>>,
    pub span: Span,
}

impl UnitSyntax {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            classes: Vec::new(),
            functions: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn class(mut self, class: ClassSyntax) -> Self {
        self.classes.push(Rc::new(class));
        self
    }

    pub fn function(mut self, function: FunctionSyntax) -> Self {
        self.functions.push(Rc::new(function));
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClassSyntax {
    pub name: String,
    pub flavor: ClassFlavor,
    pub modifiers: Modifiers,
    pub type_params: Vec<String>,
    pub extends: Option<TypeRef>,
    pub implements: Vec<TypeRef>,
    pub uses: Vec<TypeRef>,
    pub permits: Vec<TypeRef>,
    pub fields: Vec<Rc<FieldSyntax>>,
    pub functions: Vec<Rc<FunctionSyntax>>,
    pub inner: Vec<Rc<ClassSyntax>>,
    pub span: Span,
}

impl ClassSyntax {
    pub fn new(name: impl Into<String>, flavor: ClassFlavor) -> Self {
        Self {
            name: name.into(),
            flavor,
            modifiers: Modifiers::NONE,
            type_params: Vec::new(),
            extends: None,
            implements: Vec::new(),
            uses: Vec::new(),
            permits: Vec::new(),
            fields: Vec::new(),
            functions: Vec::new(),
            inner: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn modifiers(mut self, modifiers: u16) -> Self {
        self.modifiers = Modifiers::from_bits(modifiers);
        self
    }

    pub fn type_params(mut self, params: &[&str]) -> Self {
        self.type_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn extends(mut self, parent: TypeRef) -> Self {
        self.extends = Some(parent);
        self
    }

    pub fn implements(mut self, interface: TypeRef) -> Self {
        self.implements.push(interface);
        self
    }

    pub fn uses(mut self, trait_ref: TypeRef) -> Self {
        self.uses.push(trait_ref);
        self
    }

    pub fn permits(mut self, class: TypeRef) -> Self {
        self.permits.push(class);
        self
    }

    pub fn field(mut self, field: FieldSyntax) -> Self {
        self.fields.push(Rc::new(field));
        self
    }

    pub fn function(mut self, function: FunctionSyntax) -> Self {
        self.functions.push(Rc::new(function));
        self
    }

    pub fn inner(mut self, class: ClassSyntax) -> Self {
        self.inner.push(Rc::new(class));
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

/// Declared getter or setter on a field
#[derive(Debug, Clone, Default)]
pub struct AccessorSyntax {
    pub visibility: Option<Visibility>,
    pub modifiers: Modifiers,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FieldSyntax {
    pub name: String,
    pub ty: TypeRef,
    pub modifiers: Modifiers,
    pub getter: Option<AccessorSyntax>,
    pub setter: Option<AccessorSyntax>,
    pub span: Span,
}

impl FieldSyntax {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            modifiers: Modifiers::NONE,
            getter: None,
            setter: None,
            span: Span::default(),
        }
    }

    pub fn modifiers(mut self, modifiers: u16) -> Self {
        self.modifiers = Modifiers::from_bits(modifiers);
        self
    }

    pub fn getter(mut self, accessor: AccessorSyntax) -> Self {
        self.getter = Some(accessor);
        self
    }

    pub fn setter(mut self, accessor: AccessorSyntax) -> Self {
        self.setter = Some(accessor);
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ParamSyntax {
    pub name: String,
    pub ty: TypeRef,
    pub modifiers: Modifiers,
    pub span: Span,
}

impl ParamSyntax {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            modifiers: Modifiers::NONE,
            span: Span::default(),
        }
    }
}

/// Opaque handle to a function body in the front-end's tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodySyntax {
    pub id: u32,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FunctionSyntax {
    pub name: String,
    pub params: Vec<ParamSyntax>,
    pub result: TypeRef,
    pub modifiers: Modifiers,
    pub type_params: Vec<String>,
    pub body: Option<BodySyntax>,
    pub span: Span,
}

impl FunctionSyntax {
    pub fn new(name: impl Into<String>, result: TypeRef) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            result,
            modifiers: Modifiers::NONE,
            type_params: Vec::new(),
            body: None,
            span: Span::default(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.params.push(ParamSyntax::new(name, ty));
        self
    }

    pub fn modifiers(mut self, modifiers: u16) -> Self {
        self.modifiers = Modifiers::from_bits(modifiers);
        self
    }

    pub fn type_params(mut self, params: &[&str]) -> Self {
        self.type_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn body(mut self, id: u32) -> Self {
        self.body = Some(BodySyntax { id, span: self.span });
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}
