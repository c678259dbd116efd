//! Stage handlers and the fixed-point driver
//!
//! [`Compiler::advance_to`] is the single entry point for every
//! (declaration, step) pair. It starts with the stage guard: a step already
//! done is a successful no-op, a step whose precondition stage has not been
//! reached is "not ready". Only a declaration sitting exactly at the step
//! runs the handler, which either moves it to the successor stage or jumps
//! it forward.
//!
//! [`Compiler::run`] sweeps the declarations at the lowest pending stage,
//! falls back to a sweep over everything pending when that makes no
//! progress, and stops when every declaration is compiled or failed, or when
//! a full sweep changes nothing.

use std::fmt;
use std::rc::Rc;

use crate::accessor;
use crate::codegen::body::BodyBuilder;
use crate::codegen::definition;
use crate::codegen::dispatch::DispatchKind;
use crate::codegen::label::Label;
use crate::codegen::opcode::Opcode;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::generic::GenericEngine;
use crate::hierarchy;
use crate::namespace::{Symbol, SymbolTarget};
use crate::program::{
    ClassId, ClassKind, DeclRef, FieldId, FunctionId, FunctionOrigin, ParamId, Program, ResolvedType, Scope, UnitId,
};
use crate::resolve::resolve_type;
use crate::slots::{SlotAllocator, SlotDef, SlotId, TypeCode, Variable};
use crate::stage::{CompilingStage, StageGuard};
use crate::syntax::{BodySyntax, UnitSyntax};

/// Emits the instructions of a user-written function body.
///
/// The front end owns statement and expression trees; the compiler hands
/// the collaborator an opaque [`BodySyntax`] handle together with the
/// builder and the function's registers.
pub trait BodyCodegen {
    fn compile_body(&mut self, cx: &mut BodyContext<'_>) -> Result<()>;
}

/// Codegen used when none is supplied: every body returns immediately,
/// with a zero value when the function has a result
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyBodyCodegen;

impl BodyCodegen for EmptyBodyCodegen {
    fn compile_body(&mut self, cx: &mut BodyContext<'_>) -> Result<()> {
        let returns_value = cx
            .program()
            .function(cx.function())
            .resolved_result
            .as_ref()
            .is_some_and(|r| *r != ResolvedType::Void);
        if returns_value {
            cx.builder().emit_imm(Opcode::Push, &[0])?;
            cx.builder().emit_imm(Opcode::ReturnValue, &[])?;
        } else {
            cx.builder().emit_imm(Opcode::Return, &[])?;
        }
        Ok(())
    }
}

/// Everything a [`BodyCodegen`] may touch while emitting one body
pub struct BodyContext<'a> {
    program: &'a Program,
    function: FunctionId,
    body: BodySyntax,
    builder: &'a mut BodyBuilder,
    slots: &'a mut SlotAllocator,
    density_bias: i64,
}

impl<'a> BodyContext<'a> {
    pub fn program(&self) -> &Program {
        self.program
    }

    pub fn function(&self) -> FunctionId {
        self.function
    }

    pub fn body(&self) -> BodySyntax {
        self.body
    }

    pub fn builder(&mut self) -> &mut BodyBuilder {
        self.builder
    }

    /// Register index of a parameter, by name
    pub fn param_slot(&self, name: &str) -> Option<u32> {
        let param = self.program.function(self.function).param_table.get(name)?;
        match param.target {
            SymbolTarget::Param(id) => self.slots.slot_of(Variable::Param(id)).map(|s| s.index),
            _ => None,
        }
    }

    /// Register index of `this`; `None` in static and top-level functions
    pub fn this_slot(&self) -> Option<u32> {
        self.slots.slot_of(Variable::This).map(|s| s.index)
    }

    /// Borrow a scratch register; hand it back with [`BodyContext::release`]
    pub fn scratch(&mut self, type_code: TypeCode) -> SlotId {
        self.slots.scratch(type_code)
    }

    pub fn release(&mut self, slot: SlotId) {
        self.slots.release(slot);
    }

    pub fn slot(&self, slot: SlotId) -> &SlotDef {
        self.slots.get(slot)
    }

    /// Bind a named local to a fresh register
    pub fn local(&mut self, local: u32, type_code: TypeCode, name: &str) -> SlotId {
        self.slots.allocate_for(Variable::Local(local), type_code, Some(name), None)
    }

    /// Index of a class in this body's known-class table
    pub fn known_class(&mut self, class: ClassId) -> u32 {
        self.builder.known_class_index(class)
    }

    /// Open a dispatch table for `keys`, dense or sparse by the cost rule.
    /// Dense tables start at the smallest key; `default` only lands in
    /// sparse tables, dense ones leave range checks to the emitted code.
    pub fn open_switch(&mut self, keys: &[i32], default: Label) -> u32 {
        let kind = match keys.iter().min() {
            Some(first_key) if DispatchKind::prefer_dense(keys, self.density_bias) => DispatchKind::Dense {
                first_key: *first_key,
            },
            _ => DispatchKind::Sparse { default },
        };
        self.builder.open_dispatch(kind)
    }
}

/// A compilation error pinned to the declaration whose handler raised it
#[derive(Debug)]
pub struct Diagnostic {
    pub decl: DeclRef,
    pub description: String,
    pub error: Error,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.description, self.error)
    }
}

/// Outcome of one handler: `None` when not ready, else the stage to move to
type Step = Option<CompilingStage>;

fn next_if(done: bool, step: CompilingStage) -> Step {
    done.then(|| step.next())
}

pub struct Compiler {
    program: Program,
    engine: GenericEngine,
    config: Config,
    codegen: Box<dyn BodyCodegen>,
    diagnostics: Vec<Diagnostic>,
    sweeps: usize,
}

impl Compiler {
    pub fn new(config: Config) -> Self {
        Self {
            program: Program::new(),
            engine: GenericEngine::new(),
            config,
            codegen: Box::new(EmptyBodyCodegen),
            diagnostics: Vec::new(),
            sweeps: 0,
        }
    }

    pub fn with_codegen(mut self, codegen: Box<dyn BodyCodegen>) -> Self {
        self.codegen = codegen;
        self
    }

    pub fn add_unit(&mut self, unit: UnitSyntax) -> Result<UnitId> {
        self.program.add_unit(unit)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn into_program(self) -> Program {
        self.program
    }

    pub fn engine(&self) -> &GenericEngine {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Sweeps performed by the last [`Compiler::run`]
    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    /// Class registered under a full name, e.g. `app.List<int>`
    pub fn find_class(&self, full_name: &str) -> Option<ClassId> {
        self.program.packages.get(full_name).and_then(|s| s.as_class())
    }

    /// Perform `step` on `decl` if it is due.
    ///
    /// `Ok(true)` when the step is done (now or earlier), `Ok(false)` when
    /// the declaration is not ready for it yet.
    pub fn advance_to(&mut self, decl: DeclRef, step: CompilingStage) -> Result<bool> {
        if self.program.decl_failed(decl) {
            return Ok(false);
        }
        let current = self.program.decl_stage(decl);
        match StageGuard::check(current, step) {
            StageGuard::Done => return Ok(true),
            StageGuard::NotReady => return Ok(false),
            StageGuard::Proceed => {}
        }
        if step.is_compiled() {
            return Ok(true);
        }

        let outcome = match decl {
            DeclRef::Class(id) => self.class_step(id, step)?,
            DeclRef::Function(id) => self.function_step(id, step)?,
            DeclRef::Field(id) => self.field_step(id, step)?,
            DeclRef::Param(id) => self.param_step(id, step)?,
        };
        let Some(target) = outcome else {
            return Ok(false);
        };
        self.program.decl_header_mut(decl).stage.jump_to(target);
        if self.config.debug {
            log::debug!("{}: {} -> {}", self.program.describe(decl), step, target);
        } else {
            log::trace!("{}: {} -> {}", self.program.describe(decl), step, target);
        }
        Ok(true)
    }

    /// Drive every declaration to `Compiled`.
    ///
    /// Per-declaration compilation errors are collected into
    /// [`Compiler::diagnostics`]; when they leave dependents unable to
    /// advance, those dependents are marked failed too and the run still
    /// returns `Ok`. A stall with no diagnostic to explain it is
    /// [`Error::Stalled`].
    pub fn run(&mut self) -> Result<()> {
        self.sweeps = 0;
        loop {
            let pending = self.pending();
            if pending.is_empty() {
                log::debug!(
                    "compiled {} declaration(s) in {} sweep(s)",
                    self.program.all_decls().len(),
                    self.sweeps
                );
                return Ok(());
            }
            if self.sweeps >= self.config.max_sweeps {
                log::warn!("gave up after {} sweeps", self.sweeps);
                return self.stalled(pending);
            }
            self.sweeps += 1;

            let lowest = pending
                .iter()
                .map(|d| self.program.decl_stage(*d))
                .min()
                .unwrap_or(CompilingStage::Compiled);
            let focused: Vec<DeclRef> = pending
                .iter()
                .copied()
                .filter(|d| self.program.decl_stage(*d) == lowest)
                .collect();
            if self.sweep(&focused) {
                continue;
            }
            if !self.sweep(&pending) {
                return self.stalled(pending);
            }
        }
    }

    fn pending(&self) -> Vec<DeclRef> {
        self.program
            .all_decls()
            .into_iter()
            .filter(|d| !self.program.decl_failed(*d) && !self.program.decl_stage(*d).is_compiled())
            .collect()
    }

    fn decl_count(&self) -> usize {
        let p = &self.program;
        p.classes.len() + p.functions.len() + p.fields.len() + p.params.len()
    }

    fn sweep(&mut self, decls: &[DeclRef]) -> bool {
        let created_before = self.decl_count();
        let mut progressed = false;
        for decl in decls {
            let before = self.program.decl_stage(*decl);
            match self.advance_to(*decl, before) {
                Ok(_) => progressed |= self.program.decl_stage(*decl) != before,
                Err(error) => {
                    self.fail(*decl, error);
                    progressed = true;
                }
            }
        }
        progressed || self.decl_count() != created_before
    }

    fn fail(&mut self, decl: DeclRef, error: Error) {
        let description = self.program.describe(decl);
        log::debug!("{} failed: {}", description, error);
        self.program.decl_header_mut(decl).failed = true;
        self.diagnostics.push(Diagnostic {
            decl,
            description,
            error,
        });
    }

    fn stalled(&mut self, pending: Vec<DeclRef>) -> Result<()> {
        let described: Vec<String> = pending
            .iter()
            .map(|d| format!("{} at {}", self.program.describe(*d), self.program.decl_stage(*d)))
            .collect();
        if self.diagnostics.is_empty() {
            return Err(Error::Stalled { pending: described });
        }
        log::warn!(
            "{} declaration(s) cannot advance after {} error(s): {}",
            described.len(),
            self.diagnostics.len(),
            described.join(", ")
        );
        for decl in pending {
            self.program.decl_header_mut(decl).failed = true;
        }
        Ok(())
    }

    // ---- classes ----

    fn class_step(&mut self, id: ClassId, step: CompilingStage) -> Result<Step> {
        let instantiated = matches!(self.program.class(id).kind, ClassKind::Instantiated { .. });
        Ok(match step {
            CompilingStage::ParseClassName => {
                self.register_class(id)?;
                Some(step.next())
            }
            CompilingStage::ParseParents => {
                next_if(hierarchy::parse_parents(&mut self.program, &mut self.engine, id)?, step)
            }
            CompilingStage::ParseFields => self.declare_members(id)?,
            CompilingStage::ValidateHierarchy => next_if(hierarchy::validate_hierarchy(&self.program, id)?, step),
            CompilingStage::InheritsFields => next_if(hierarchy::inherit_fields(&mut self.program, id)?, step),
            CompilingStage::ValidateNewFunctions => {
                if instantiated {
                    Some(step.next())
                } else if self.members_past(id, CompilingStage::ParseFields) {
                    next_if(hierarchy::validate_new_functions(&self.program, id)?, step)
                } else {
                    None
                }
            }
            CompilingStage::InheritsInnerClasses => {
                next_if(hierarchy::inherit_inner_classes(&mut self.program, id)?, step)
            }
            CompilingStage::ValidateMembers => {
                if instantiated {
                    Some(step.next())
                } else {
                    next_if(hierarchy::validate_members(&self.program, id)?, step)
                }
            }
            CompilingStage::AllocateSlots => self.allocate_class_slots(id)?,
            CompilingStage::CompileBody => {
                if !self.members_past(id, CompilingStage::CompileBody) {
                    None
                } else {
                    let stream = definition::write_class(&self.program, id)?;
                    self.program.class_mut(id).definition = Some(stream);
                    Some(step.next())
                }
            }
            CompilingStage::ClearResources | CompilingStage::Compiled => Some(CompilingStage::Compiled),
        })
    }

    fn members_past(&self, id: ClassId, stage: CompilingStage) -> bool {
        self.program
            .class(id)
            .own_functions
            .iter()
            .all(|f| self.program.function(*f).stage() > stage)
    }

    fn register_class(&mut self, id: ClassId) -> Result<()> {
        let full_name = self.program.class_full_name(id);
        let name = self.program.class(id).name().to_string();
        let symbol = Symbol::new(name, full_name, SymbolTarget::Class(id));
        if let Some(owner) = self.program.class(id).owner {
            self.program.class_mut(owner).inner_classes.add(symbol.clone())?;
        }
        self.program.packages.add(symbol)
    }

    /// `ParseFields` for a class: enter own fields, synthesize their
    /// accessors and enter every own function
    fn declare_members(&mut self, id: ClassId) -> Result<Step> {
        let template = match self.program.class(id).kind {
            ClassKind::Instantiated { template, .. } => Some(template),
            _ => None,
        };
        // cloned accessors point at the template's, which must exist first
        if template.is_some_and(|t| self.program.class_stage(t) <= CompilingStage::ParseFields) {
            return Ok(None);
        }

        let full_name = self.program.class_full_name(id);
        let fields = self.program.class(id).own_fields.clone();
        for field in fields {
            let name = self.program.field(field).name().to_string();
            let symbol = Symbol::new(name.clone(), format!("{}.{}", full_name, name), SymbolTarget::Field(field));
            self.program.class_mut(id).fields.add(symbol)?;
            for accessor in accessor::synthesize(&mut self.program, field)? {
                self.fill_param_table(accessor)?;
            }
        }

        let functions = self.program.class(id).own_functions.clone();
        for function in functions {
            let def = self.program.function(function);
            let symbol = Symbol::function(
                def.name(),
                format!("{}.{}", full_name, def.name()),
                def.common_name.clone(),
                function,
            );
            self.program.class_mut(id).functions.add(symbol)?;
        }

        Ok(Some(match template {
            Some(_) => CompilingStage::InheritsFields,
            None => CompilingStage::ParseFields.next(),
        }))
    }

    fn allocate_class_slots(&mut self, id: ClassId) -> Result<Step> {
        let superclass = self.program.class(id).superclass;
        if superclass.is_some_and(|s| self.program.class_stage(s) <= CompilingStage::AllocateSlots) {
            return Ok(None);
        }
        let inherited: Vec<SlotDef> = match superclass {
            Some(parent) => self
                .program
                .class(self.program.delegate(parent))
                .slots
                .slots()
                .iter()
                .filter(|s| matches!(s.variable, Some(Variable::Field(_))))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let mut slots = std::mem::take(&mut self.program.class_mut(id).slots);
        for parent_slot in &inherited {
            let slot = slots.reserve_locked(
                parent_slot.index,
                parent_slot.type_code,
                parent_slot.name.as_deref(),
                parent_slot.owner,
            );
            if let Some(variable) = parent_slot.variable {
                slots.bind(slot, variable);
            }
        }
        let own_fields = self.program.class(id).own_fields.clone();
        for field in own_fields {
            let def = self.program.field(field);
            let type_code = def.resolved.as_ref().map(TypeCode::of).unwrap_or(TypeCode::Object);
            let slot = slots.allocate_for(Variable::Field(field), type_code, Some(def.name()), Some(id));
            slots.lock(slot);
            let index = slots.get(slot).index;
            self.program.field_mut(field).slot = Some(index);
        }
        log::debug!(
            "{}: {} field slot(s), {} inherited",
            self.program.class_full_name(id),
            slots.size(),
            inherited.len()
        );
        self.program.class_mut(id).slots = slots;
        Ok(Some(CompilingStage::AllocateSlots.next()))
    }

    // ---- functions ----

    /// Members may take a step once their owner has reached it
    fn owner_reached(&self, decl: DeclRef, step: CompilingStage) -> bool {
        match decl {
            DeclRef::Class(_) => true,
            DeclRef::Function(id) => self
                .program
                .function(id)
                .owner
                .map_or(true, |o| self.program.class_stage(o) >= step),
            DeclRef::Field(id) => self.program.class_stage(self.program.field(id).owner) >= step,
            DeclRef::Param(id) => self.program.function(self.program.param(id).owner).stage() >= step,
        }
    }

    fn function_step(&mut self, id: FunctionId, step: CompilingStage) -> Result<Step> {
        if !self.owner_reached(DeclRef::Function(id), step) {
            return Ok(None);
        }
        match step {
            CompilingStage::ParseClassName => {
                self.fill_param_table(id)?;
                if self.program.function(id).owner.is_none() {
                    self.register_top_level_function(id)?;
                }
                Ok(Some(step.next()))
            }
            CompilingStage::ParseFields => {
                let result = self.program.function(id).result.clone();
                let span = self.program.function(id).header.span;
                let Some(resolved) =
                    resolve_type(&mut self.program, &mut self.engine, Scope::Function(id), &result, span)?
                else {
                    return Ok(None);
                };
                let def = self.program.function_mut(id);
                def.resolved_result = Some(resolved);
                Ok(Some(if def.generic_source.is_some() {
                    CompilingStage::InheritsFields
                } else {
                    step.next()
                }))
            }
            CompilingStage::AllocateSlots => self.allocate_function_slots(id),
            CompilingStage::CompileBody => self.compile_function_body(id),
            CompilingStage::ClearResources => {
                if let Some(builder) = self.program.function_mut(id).builder.take() {
                    let compiled = builder.freeze()?;
                    self.program.function_mut(id).compiled = Some(Rc::new(compiled));
                }
                Ok(Some(CompilingStage::Compiled))
            }
            _ => Ok(Some(step.next())),
        }
    }

    fn fill_param_table(&mut self, id: FunctionId) -> Result<()> {
        let full_name = self.program.function_full_name(id);
        let params = self.program.function(id).params.clone();
        for param in params {
            let name = self.program.param(param).header.name.clone();
            if self.program.function(id).param_table.contains(&name) {
                let existing = self.program.function(id).param_table.get(&name).map(|s| s.target);
                if existing == Some(SymbolTarget::Param(param)) {
                    continue;
                }
            }
            let symbol = Symbol::new(name.clone(), format!("{}.{}", full_name, name), SymbolTarget::Param(param));
            self.program.function_mut(id).param_table.add(symbol)?;
        }
        Ok(())
    }

    fn register_top_level_function(&mut self, id: FunctionId) -> Result<()> {
        let def = self.program.function(id);
        let symbol = Symbol::function(
            def.name(),
            self.program.function_full_name(id),
            def.common_name.clone(),
            id,
        );
        let unit = def.unit;
        self.program.units[unit.index()].function_table.add(symbol.clone())?;
        self.program.packages.add(symbol)
    }

    fn allocate_function_slots(&mut self, id: FunctionId) -> Result<Step> {
        let def = self.program.function(id);
        if def
            .params
            .iter()
            .any(|p| self.program.param(*p).header.stage.get() <= CompilingStage::ParseFields)
        {
            return Ok(None);
        }
        let params: Vec<(ParamId, TypeCode, String)> = def
            .params
            .iter()
            .map(|p| {
                let param = self.program.param(*p);
                let type_code = param.resolved.as_ref().map(TypeCode::of).unwrap_or(TypeCode::Object);
                (*p, type_code, param.header.name.clone())
            })
            .collect();
        let receiver = def.owner.filter(|_| !def.is_static());

        let mut slots = std::mem::take(&mut self.program.function_mut(id).slots);
        if let Some(owner) = receiver {
            let this = slots.allocate_for(Variable::This, TypeCode::Object, Some("this"), Some(owner));
            slots.lock(this);
        }
        for (param, type_code, name) in params {
            let slot = slots.allocate_for(Variable::Param(param), type_code, Some(&name), None);
            slots.lock(slot);
            let index = slots.get(slot).index;
            self.program.param_mut(param).slot = Some(index);
        }
        self.program.function_mut(id).slots = slots;
        Ok(Some(CompilingStage::AllocateSlots.next()))
    }

    fn compile_function_body(&mut self, id: FunctionId) -> Result<Step> {
        let def = self.program.function(id);
        // clones, accessors included, share the template's frozen body
        if let Some(template) = def.generic_source {
            let template_def = self.program.function(template);
            if !template_def.stage().is_compiled() {
                return Ok(None);
            }
            let shared = template_def.compiled.clone();
            self.program.function_mut(id).compiled = shared;
            return Ok(Some(CompilingStage::Compiled));
        }

        match def.origin {
            FunctionOrigin::Getter { .. } | FunctionOrigin::Setter { .. } => {
                let mut builder = BodyBuilder::new(id);
                accessor::emit_body(&self.program, id, &mut builder)?;
                self.program.function_mut(id).builder = Some(builder);
                return Ok(Some(CompilingStage::CompileBody.next()));
            }
            FunctionOrigin::User => {}
        }

        let Some(body) = def.syntax.as_ref().and_then(|s| s.body) else {
            return Ok(Some(CompilingStage::CompileBody.next()));
        };
        let mut builder = BodyBuilder::new(id);
        let mut slots = std::mem::take(&mut self.program.function_mut(id).slots);
        let result = {
            let mut cx = BodyContext {
                program: &self.program,
                function: id,
                body,
                builder: &mut builder,
                slots: &mut slots,
                density_bias: self.config.dispatch_density_bias,
            };
            self.codegen.compile_body(&mut cx)
        };
        self.program.function_mut(id).slots = slots;
        result?;
        self.program.function_mut(id).builder = Some(builder);
        Ok(Some(CompilingStage::CompileBody.next()))
    }

    // ---- fields and parameters ----

    fn field_step(&mut self, id: FieldId, step: CompilingStage) -> Result<Step> {
        if !self.owner_reached(DeclRef::Field(id), step) {
            return Ok(None);
        }
        if step != CompilingStage::ParseFields {
            return Ok(Some(step.next()));
        }
        let def = self.program.field(id);
        let (ty, span, owner) = (def.ty.clone(), def.header.span, def.owner);
        let Some(resolved) = resolve_type(&mut self.program, &mut self.engine, Scope::Class(owner), &ty, span)? else {
            return Ok(None);
        };
        let def = self.program.field_mut(id);
        def.resolved = Some(resolved);
        Ok(Some(if def.generic_source.is_some() {
            CompilingStage::InheritsFields
        } else {
            step.next()
        }))
    }

    fn param_step(&mut self, id: ParamId, step: CompilingStage) -> Result<Step> {
        if !self.owner_reached(DeclRef::Param(id), step) {
            return Ok(None);
        }
        if step != CompilingStage::ParseFields {
            return Ok(Some(step.next()));
        }
        let def = self.program.param(id);
        let (ty, span, owner) = (def.ty.clone(), def.header.span, def.owner);
        let Some(resolved) = resolve_type(&mut self.program, &mut self.engine, Scope::Function(owner), &ty, span)?
        else {
            return Ok(None);
        };
        let def = self.program.param_mut(id);
        def.resolved = Some(resolved);
        Ok(Some(if def.generic_source.is_some() {
            CompilingStage::InheritsFields
        } else {
            step.next()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::decode::{decode_definition, decode_dispatch, DispatchTableView};
    use crate::modifiers::flags;
    use crate::syntax::{ClassFlavor, ClassSyntax, FieldSyntax, FunctionSyntax};
    use crate::types::TypeRef;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn int() -> TypeRef {
        TypeRef::named("int")
    }

    fn compile(unit: UnitSyntax) -> Compiler {
        init_logger();
        let mut compiler = Compiler::new(Config::default());
        compiler.add_unit(unit).unwrap();
        compiler.run().unwrap();
        compiler
    }

    #[test]
    fn test_guard_semantics() {
        let mut compiler = Compiler::new(Config::default());
        compiler
            .add_unit(UnitSyntax::new("app").class(ClassSyntax::new("A", ClassFlavor::Class)))
            .unwrap();
        let a = DeclRef::Class(ClassId::new(0));

        assert!(!compiler.advance_to(a, CompilingStage::ParseParents).unwrap());
        assert!(compiler.advance_to(a, CompilingStage::ParseClassName).unwrap());
        assert_eq!(compiler.program().decl_stage(a), CompilingStage::ParseParents);
        // repeating a finished step is a no-op
        assert!(compiler.advance_to(a, CompilingStage::ParseClassName).unwrap());
        assert_eq!(compiler.program().decl_stage(a), CompilingStage::ParseParents);
    }

    #[test]
    fn test_everything_reaches_compiled() {
        let compiler = compile(
            UnitSyntax::new("app")
                .class(
                    ClassSyntax::new("Point", ClassFlavor::Class)
                        .field(FieldSyntax::new("x", int()))
                        .field(FieldSyntax::new("y", int()))
                        .function(FunctionSyntax::new("len", int()).body(0)),
                )
                .function(FunctionSyntax::new("main", TypeRef::void()).body(1)),
        );
        assert!(compiler.diagnostics().is_empty());
        let program = compiler.program();
        assert!(program.all_decls().iter().all(|d| program.decl_stage(*d).is_compiled()));

        let point = compiler.find_class("app.Point").unwrap();
        let stream = decode_definition(program.class(point).definition.as_ref().unwrap()).unwrap();
        // x#get, x#set, y#get, y#set, len
        assert_eq!(stream.instructions[1].1[6], 5);
        assert!(program.packages.get("app.main#").is_some());
    }

    #[test]
    fn test_field_slots_follow_superclass() {
        let compiler = compile(
            UnitSyntax::new("app")
                .class(
                    ClassSyntax::new("Derived", ClassFlavor::Class)
                        .extends(TypeRef::named("Base"))
                        .field(FieldSyntax::new("c", int())),
                )
                .class(
                    ClassSyntax::new("Base", ClassFlavor::Class)
                        .field(FieldSyntax::new("a", TypeRef::named("long")))
                        .field(FieldSyntax::new("b", int())),
                ),
        );
        let program = compiler.program();
        let slot_of = |name: &str| program.fields.iter().find(|f| f.name() == name).and_then(|f| f.slot);
        assert_eq!(slot_of("a"), Some(0));
        assert_eq!(slot_of("b"), Some(2));
        assert_eq!(slot_of("c"), Some(3));
    }

    #[test]
    fn test_errors_are_collected_per_declaration() {
        let compiler = compile(
            UnitSyntax::new("app")
                .class(ClassSyntax::new("Broken", ClassFlavor::Class).extends(TypeRef::named("Missing")))
                .class(ClassSyntax::new("Fine", ClassFlavor::Class).field(FieldSyntax::new("n", int()))),
        );
        assert_eq!(compiler.diagnostics().len(), 1);
        assert!(matches!(compiler.diagnostics()[0].error, Error::Unresolved { .. }));

        let program = compiler.program();
        let fine = compiler.find_class("app.Fine").unwrap();
        assert!(program.class(fine).stage().is_compiled());
        assert!(program.class(ClassId::new(0)).header.failed);
    }

    #[test]
    fn test_duplicate_parameter_names() {
        let compiler = compile(UnitSyntax::new("app").function(
            FunctionSyntax::new("f", TypeRef::void())
                .param("a", int())
                .param("a", TypeRef::named("long"))
                .body(0),
        ));
        assert!(matches!(compiler.diagnostics()[0].error, Error::DuplicateKey { .. }));
    }

    #[test]
    fn test_abstract_function_gets_no_body() {
        let compiler = compile(
            UnitSyntax::new("app").class(
                ClassSyntax::new("Shape", ClassFlavor::Class)
                    .modifiers(flags::ABSTRACT)
                    .function(FunctionSyntax::new("area", TypeRef::named("double")).modifiers(flags::ABSTRACT)),
            ),
        );
        assert!(compiler.diagnostics().is_empty());
        let program = compiler.program();
        let area = program.functions.iter().find(|f| f.common_name == "area").unwrap();
        assert!(area.stage().is_compiled());
        assert!(area.compiled.is_none());
    }

    struct SwitchCodegen;

    impl BodyCodegen for SwitchCodegen {
        fn compile_body(&mut self, cx: &mut BodyContext<'_>) -> Result<()> {
            let keys = [1, 2, 3];
            let default = cx.builder().new_label();
            let arms: Vec<Label> = keys.iter().map(|_| cx.builder().new_label()).collect();
            let table = cx.open_switch(&keys, default);
            for (key, arm) in keys.iter().zip(&arms) {
                cx.builder().add_case(table, *key, *arm)?;
            }
            let value = cx.param_slot("n").unwrap_or(0) as i32;
            cx.builder().emit_imm(Opcode::LoadSlot, &[value])?;
            cx.builder().emit_imm(Opcode::Switch, &[table as i32])?;
            for arm in arms {
                cx.builder().place_label(arm)?;
                cx.builder().emit_imm(Opcode::Return, &[])?;
            }
            cx.builder().place_label(default)?;
            cx.builder().emit_imm(Opcode::Return, &[])?;
            Ok(())
        }
    }

    #[test]
    fn test_pluggable_codegen_and_freeze() {
        init_logger();
        let mut compiler = Compiler::new(Config::default()).with_codegen(Box::new(SwitchCodegen));
        compiler
            .add_unit(UnitSyntax::new("app").function(FunctionSyntax::new("pick", TypeRef::void()).param("n", int()).body(0)))
            .unwrap();
        compiler.run().unwrap();

        let pick = compiler.program().function(FunctionId::new(0));
        let compiled = pick.compiled.as_ref().unwrap();
        assert!(pick.builder.is_none());
        assert_eq!(compiled.dispatch_tables.len(), 1);
        match decode_dispatch(&compiled.dispatch_tables[0].bytes).unwrap() {
            DispatchTableView::Dense(dense) => {
                assert_eq!(dense.first_key, 1);
                // load_slot 5 bytes, switch 5 bytes, then one return per arm
                assert_eq!(dense.addresses, vec![10, 11, 12]);
            }
            other => panic!("expected a dense table, got {:?}", other),
        }
    }

    #[test]
    fn test_sweep_cap_reports_stall() {
        init_logger();
        let mut compiler = Compiler::new(Config::default().with_max_sweeps(1));
        compiler
            .add_unit(UnitSyntax::new("app").class(ClassSyntax::new("A", ClassFlavor::Class)))
            .unwrap();
        match compiler.run() {
            Err(Error::Stalled { pending }) => assert_eq!(pending, vec!["class app.A at ParseParents"]),
            other => panic!("expected a stall, got {:?}", other),
        }
    }
}
