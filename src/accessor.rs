//! Getter and setter synthesis
//!
//! Every field gets a `<name>#get` function and, unless it is final, a
//! `<name>#set` function taking one parameter named `value`. Either can be
//! suppressed with the `NO_GETTER`/`NO_SETTER` modifiers. Synthesized
//! functions enter the stage machine at `ParseFields`; accessors of a field
//! cloned from a template point at the template's accessor and reuse its
//! compiled body.

use crate::codegen::body::BodyBuilder;
use crate::codegen::opcode::Opcode;
use crate::error::{Error, Result};
use crate::modifiers::{flags, Modifiers, Visibility};
use crate::namespace::{NamespaceTable, DISAMBIGUATION_MARKER};
use crate::generic::ConcreteTypeRegistry;
use crate::program::{DeclHeader, FieldId, FunctionDef, FunctionId, FunctionOrigin, ParamDef, Program};
use crate::slots::{SlotAllocator, Variable};
use crate::stage::CompilingStage;
use crate::syntax::{AccessorSyntax, ClassFlavor};
use crate::types::TypeRef;

pub const SETTER_PARAM: &str = "value";

pub fn getter_name(field: &str) -> String {
    format!("{}{}get", field, DISAMBIGUATION_MARKER)
}

pub fn setter_name(field: &str) -> String {
    format!("{}{}set", field, DISAMBIGUATION_MARKER)
}

fn check_accessor_shape(field: &str, accessor: Option<&AccessorSyntax>, suppressed: bool, what: &str) -> Result<()> {
    let Some(accessor) = accessor else {
        return Ok(());
    };
    if accessor.modifiers.is_abstract() {
        return Err(Error::syntax(
            format!("{} of field '{}' cannot be abstract", what, field),
            accessor.span,
        ));
    }
    if suppressed {
        return Err(Error::syntax(
            format!("field '{}' suppresses its {} but declares one", field, what),
            accessor.span,
        ));
    }
    Ok(())
}

/// Create the accessor functions of one field and attach them to the field
/// and its owner. Returns the new function ids.
pub fn synthesize(program: &mut Program, field_id: FieldId) -> Result<Vec<FunctionId>> {
    let field = program.field(field_id);
    let syntax = field.syntax.clone();
    let name = field.name().to_string();
    let owner = field.owner;
    let ty = field.ty.clone();
    let span = field.header.span;
    let field_modifiers = field.header.modifiers;
    let (suppress_getter, suppress_setter) = (field.suppress_getter, field.suppress_setter);
    let template = field.generic_source.map(|source| program.field(source));
    let (template_getter, template_setter) = template.map(|t| (t.getter, t.setter)).unwrap_or((None, None));

    check_accessor_shape(&name, syntax.getter.as_ref(), suppress_getter, "getter")?;
    check_accessor_shape(&name, syntax.setter.as_ref(), suppress_setter, "setter")?;
    if field_modifiers.is_final() {
        if let Some(setter) = &syntax.setter {
            return Err(Error::syntax(format!("final field '{}' cannot declare a setter", name), setter.span));
        }
    }

    let owner_def = program.class(owner);
    let owner_is_interface = owner_def.flavor != ClassFlavor::Class;
    let unit = owner_def.unit;
    let inherited = field_modifiers.visibility();
    let base_modifiers = Modifiers::NONE
        .with(flags::SYNTHETIC)
        .with(if field_modifiers.is_static() { flags::STATIC } else { 0 });

    let accessor = |accessor: Option<&AccessorSyntax>| {
        let declared = accessor.and_then(|a| a.visibility.or_else(|| a.modifiers.visibility()));
        let visibility = Visibility::resolve(declared, inherited, owner_is_interface);
        let extra = accessor.map(|a| a.modifiers.bits() & !flags::VISIBILITY_MASK).unwrap_or(0);
        let modifiers = Modifiers::from_bits(base_modifiers.bits() | extra).with_visibility(visibility);
        (visibility, modifiers)
    };

    let mut created = Vec::new();
    if !suppress_getter {
        let (visibility, modifiers) = accessor(syntax.getter.as_ref());
        let getter = program.push_function(accessor_def(
            getter_name(&name),
            unit,
            owner,
            FunctionOrigin::Getter { field: field_id },
            template_getter,
            ty.clone(),
            visibility,
            modifiers,
            syntax.getter.as_ref().map(|g| g.span).unwrap_or(span),
        ));
        program.field_mut(field_id).getter = Some(getter);
        created.push(getter);
    }
    if !suppress_setter && !field_modifiers.is_final() {
        let (visibility, modifiers) = accessor(syntax.setter.as_ref());
        let setter_span = syntax.setter.as_ref().map(|s| s.span).unwrap_or(span);
        let setter = program.push_function(accessor_def(
            setter_name(&name),
            unit,
            owner,
            FunctionOrigin::Setter { field: field_id },
            template_setter,
            TypeRef::void(),
            visibility,
            modifiers,
            setter_span,
        ));
        let value = program.push_param(ParamDef {
            header: DeclHeader::new(SETTER_PARAM, setter_span, Modifiers::NONE, CompilingStage::ParseFields),
            owner: setter,
            generic_source: None,
            ty: ty.clone(),
            resolved: None,
            slot: None,
        });
        program.function_mut(setter).params.push(value);
        program.field_mut(field_id).setter = Some(setter);
        created.push(setter);
    }

    program.class_mut(owner).own_functions.extend(created.iter().copied());
    log::debug!(
        "synthesized {} accessor(s) for {}.{}",
        created.len(),
        program.class_full_name(owner),
        name
    );
    Ok(created)
}

#[allow(clippy::too_many_arguments)]
fn accessor_def(
    name: String,
    unit: crate::program::UnitId,
    owner: crate::program::ClassId,
    origin: FunctionOrigin,
    generic_source: Option<FunctionId>,
    result: TypeRef,
    visibility: Visibility,
    modifiers: Modifiers,
    span: crate::span::Span,
) -> FunctionDef {
    FunctionDef {
        header: DeclHeader::new(name.clone(), span, modifiers, CompilingStage::ParseFields),
        common_name: name,
        unit,
        owner: Some(owner),
        origin,
        generic_source,
        syntax: None,
        type_params: Vec::new(),
        params: Vec::new(),
        param_table: NamespaceTable::new(),
        result,
        resolved_result: None,
        visibility,
        slots: SlotAllocator::new(),
        concrete_types: ConcreteTypeRegistry::default(),
        builder: None,
        compiled: None,
    }
}

/// Emit the body of a synthesized accessor: load or store the field slot
pub fn emit_body(program: &Program, function: FunctionId, builder: &mut BodyBuilder) -> Result<()> {
    let def = program.function(function);
    let field_id = match def.origin {
        FunctionOrigin::Getter { field } | FunctionOrigin::Setter { field } => field,
        FunctionOrigin::User => {
            return Err(Error::internal(format!("{} is not an accessor", def.name())));
        }
    };
    let field = program.field(field_id);
    let slot = field
        .slot
        .ok_or_else(|| Error::internal(format!("field '{}' has no slot", field.name())))? as i32;
    let is_static = def.is_static();

    if !is_static {
        builder.emit_imm(Opcode::LoadThis, &[])?;
    }
    match def.origin {
        FunctionOrigin::Getter { .. } => {
            builder.emit_imm(Opcode::GetField, &[slot])?;
            builder.emit_imm(Opcode::ReturnValue, &[])?;
        }
        _ => {
            let value = def
                .params
                .first()
                .and_then(|p| def.slots.slot_of(Variable::Param(*p)))
                .ok_or_else(|| Error::internal(format!("setter {} has no value register", def.name())))?;
            builder.emit_imm(Opcode::LoadSlot, &[value.index as i32])?;
            builder.emit_imm(Opcode::SetField, &[slot])?;
            builder.emit_imm(Opcode::Return, &[])?;
        }
    }
    Ok(())
}
