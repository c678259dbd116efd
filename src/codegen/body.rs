//! Function body builder
//!
//! Pass 1 (body compilation) appends instructions, creates and places
//! labels, fills dispatch tables and registers protected ranges; nothing in
//! it knows a byte address. Pass 2 ([`BodyBuilder::freeze`]) lays the
//! instruction stream out, resolves every label, and only then produces the
//! encoded code and table blobs. The builder is consumed, so a partially
//! resolved table never escapes.

use std::collections::HashMap;

use crate::codegen::dispatch::{DispatchBlob, DispatchKind, DispatchTable};
use crate::codegen::exception::TryCatchTable;
use crate::codegen::label::{Label, LabelTable};
use crate::codegen::opcode::{Instruction, Opcode, Operand};
use crate::error::{Error, Result};
use crate::program::{ClassId, FunctionId};

/// Ordered table of classes a function body refers to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownClasses {
    classes: Vec<ClassId>,
    index: HashMap<ClassId, u32>,
}

impl KnownClasses {
    /// Index of a class, adding it on first use
    pub fn index_of(&mut self, class: ClassId) -> u32 {
        if let Some(i) = self.index.get(&class) {
            return *i;
        }
        let i = self.classes.len() as u32;
        self.classes.push(class);
        self.index.insert(class, i);
        i
    }

    pub fn classes(&self) -> &[ClassId] {
        &self.classes
    }
}

/// Frozen output of a function body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledBody {
    pub code: Vec<u8>,
    pub dispatch_tables: Vec<DispatchBlob>,
    pub exception_table: Vec<u8>,
    pub known_classes: Vec<ClassId>,
}

#[derive(Debug, Clone)]
pub struct BodyBuilder {
    function: FunctionId,
    instructions: Vec<Instruction>,
    labels: LabelTable,
    dispatch: Vec<DispatchTable>,
    handlers: TryCatchTable,
    known_classes: KnownClasses,
}

impl BodyBuilder {
    pub fn new(function: FunctionId) -> Self {
        Self {
            function,
            instructions: Vec::new(),
            labels: LabelTable::new(),
            dispatch: Vec::new(),
            handlers: TryCatchTable::new(function, 0),
            known_classes: KnownClasses::default(),
        }
    }

    pub fn function(&self) -> FunctionId {
        self.function
    }

    pub fn emit(&mut self, opcode: Opcode, operands: Vec<Operand>) -> Result<usize> {
        self.instructions.push(Instruction::new(opcode, operands)?);
        Ok(self.instructions.len() - 1)
    }

    pub fn emit_imm(&mut self, opcode: Opcode, operands: &[i32]) -> Result<usize> {
        self.emit(opcode, operands.iter().map(|v| Operand::Imm(*v)).collect())
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.new_label()
    }

    /// Place a label before the next emitted instruction
    pub fn place_label(&mut self, label: Label) -> Result<()> {
        self.labels.place(label, self.instructions.len())
    }

    /// Open a dispatch table; returns its id for `add_case` and the `switch`
    /// instruction operand
    pub fn open_dispatch(&mut self, kind: DispatchKind) -> u32 {
        let id = self.dispatch.len() as u32;
        let table = match kind {
            DispatchKind::Dense { first_key } => DispatchTable::dense(self.function, id, first_key),
            DispatchKind::Sparse { default } => DispatchTable::sparse(self.function, id, default),
        };
        self.dispatch.push(table);
        id
    }

    pub fn add_case(&mut self, table: u32, key: i32, label: Label) -> Result<()> {
        self.dispatch
            .get_mut(table as usize)
            .ok_or_else(|| Error::internal(format!("no dispatch table {}", table)))?
            .add_label(key, label)
    }

    /// Register a protected range catching `types`
    pub fn register_handler(&mut self, begin: Label, end: Label, handler: Label, types: &[ClassId]) {
        let indices = types.iter().map(|c| self.known_classes.index_of(*c)).collect();
        self.handlers.register(begin, end, handler, indices);
    }

    pub fn known_class_index(&mut self, class: ClassId) -> u32 {
        self.known_classes.index_of(class)
    }

    /// Pass 2: lay out, resolve labels, encode and compose every table
    pub fn freeze(self) -> Result<CompiledBody> {
        let mut offsets = Vec::with_capacity(self.instructions.len() + 1);
        let mut offset = 0usize;
        for instruction in &self.instructions {
            offsets.push(offset);
            offset += instruction.size();
        }
        offsets.push(offset);

        let resolved = self.labels.resolve(&offsets)?;

        let mut code = Vec::with_capacity(offset);
        for instruction in &self.instructions {
            instruction.encode(&resolved, &mut code)?;
        }

        let dispatch_tables = self
            .dispatch
            .into_iter()
            .map(|table| table.compose_blob(&resolved))
            .collect::<Result<Vec<_>>>()?;
        let exception_table = self.handlers.compose_blob(&resolved)?;

        log::debug!(
            "froze body of fn#{}: {} bytes, {} dispatch table(s)",
            self.function.index(),
            code.len(),
            dispatch_tables.len()
        );
        Ok(CompiledBody {
            code,
            dispatch_tables,
            exception_table,
            known_classes: self.known_classes.classes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::decode::{decode_dense, decode_handlers};

    #[test]
    fn test_switch_body_two_pass() {
        let mut body = BodyBuilder::new(FunctionId::new(0));
        let arm_a = body.new_label();
        let arm_b = body.new_label();
        let exit = body.new_label();

        let table = body.open_dispatch(DispatchKind::Dense { first_key: 0 });
        body.add_case(table, 0, arm_a).unwrap();
        body.add_case(table, 2, arm_b).unwrap();

        body.emit_imm(Opcode::Switch, &[table as i32]).unwrap(); // 0..5
        body.place_label(arm_a).unwrap();
        body.emit_imm(Opcode::Push, &[1]).unwrap(); // 5..10
        body.emit(Opcode::Jump, vec![exit.into()]).unwrap(); // 10..15
        body.place_label(arm_b).unwrap();
        body.emit_imm(Opcode::Push, &[2]).unwrap(); // 15..20
        body.place_label(exit).unwrap();
        body.emit_imm(Opcode::ReturnValue, &[]).unwrap(); // 20..21

        let compiled = body.freeze().unwrap();
        assert_eq!(compiled.code.len(), 21);
        // jump operand resolved to the exit address
        assert_eq!(&compiled.code[11..15], &20i32.to_be_bytes());

        let dense = decode_dense(&compiled.dispatch_tables[0].bytes).unwrap();
        assert_eq!(dense.addresses, vec![5, -1, 15]);
    }

    #[test]
    fn test_handler_types_use_known_class_indices() {
        let mut body = BodyBuilder::new(FunctionId::new(0));
        let (begin, end, handler) = (body.new_label(), body.new_label(), body.new_label());
        assert_eq!(body.known_class_index(ClassId::new(7)), 0);

        body.place_label(begin).unwrap();
        body.emit_imm(Opcode::Nop, &[]).unwrap();
        body.place_label(end).unwrap();
        body.emit_imm(Opcode::Return, &[]).unwrap();
        body.place_label(handler).unwrap();
        body.emit_imm(Opcode::Throw, &[]).unwrap();
        body.register_handler(begin, end, handler, &[ClassId::new(3), ClassId::new(7)]);

        let compiled = body.freeze().unwrap();
        let entries = decode_handlers(&compiled.exception_table).unwrap();
        assert_eq!(entries[0].type_indices, vec![1, 0]);
        assert_eq!(compiled.known_classes, vec![ClassId::new(7), ClassId::new(3)]);
    }

    #[test]
    fn test_unplaced_jump_target_fails_freeze() {
        let mut body = BodyBuilder::new(FunctionId::new(0));
        let nowhere = body.new_label();
        body.emit(Opcode::Jump, vec![nowhere.into()]).unwrap();
        assert!(matches!(body.freeze(), Err(Error::Internal { .. })));
    }
}
