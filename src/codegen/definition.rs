//! Class definition stream
//!
//! A compiled class is described by a short instruction stream: a string
//! pool (`literal_string index length` followed by the UTF-8 bytes), then
//! `def_package`, `def_class`, one `implement_interface` per interface, one
//! `def_field` per own field and one `def_type` per concrete type the class
//! hosts.

use std::collections::HashMap;

use crate::codegen::label::Label;
use crate::codegen::opcode::{Instruction, Opcode};
use crate::error::{Error, Result};
use crate::generic::ConcreteKind;
use crate::program::{ClassId, Program};
use crate::syntax::ClassFlavor;

pub fn flavor_code(flavor: ClassFlavor) -> i32 {
    match flavor {
        ClassFlavor::Class => 0,
        ClassFlavor::Interface => 1,
        ClassFlavor::Trait => 2,
    }
}

pub fn concrete_kind_code(kind: ConcreteKind) -> i32 {
    match kind {
        ConcreteKind::Array => 0,
        ConcreteKind::Parameterized => 1,
        ConcreteKind::Instantiated => 2,
    }
}

#[derive(Debug, Default)]
struct DefinitionWriter {
    strings: Vec<String>,
    index: HashMap<String, i32>,
    instructions: Vec<Instruction>,
}

impl DefinitionWriter {
    fn string(&mut self, value: &str) -> i32 {
        if let Some(i) = self.index.get(value) {
            return *i;
        }
        let i = self.strings.len() as i32;
        self.strings.push(value.to_string());
        self.index.insert(value.to_string(), i);
        i
    }

    fn emit(&mut self, opcode: Opcode, operands: &[i32]) -> Result<()> {
        self.instructions.push(Instruction::imm(opcode, operands)?);
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>> {
        let no_labels: HashMap<Label, i32> = HashMap::new();
        let mut out = Vec::new();
        for (i, s) in self.strings.iter().enumerate() {
            let len = i32::try_from(s.len()).map_err(|_| Error::encoding("string literal too long"))?;
            Instruction::imm(Opcode::LiteralString, &[i as i32, len])?.encode(&no_labels, &mut out)?;
            out.extend_from_slice(s.as_bytes());
        }
        for instruction in &self.instructions {
            instruction.encode(&no_labels, &mut out)?;
        }
        Ok(out)
    }
}

fn count(n: usize) -> Result<i32> {
    i32::try_from(n).map_err(|_| Error::encoding(format!("count {} exceeds i32", n)))
}

/// Encode the definition stream of a class whose members are resolved and
/// whose slots are allocated
pub fn write_class(program: &Program, class: ClassId) -> Result<Vec<u8>> {
    let def = program.class(class);
    let mut w = DefinitionWriter::default();
    let full = w.string(&program.class_full_name(class));
    let package = w.string(&program.unit(def.unit).package_name);

    w.emit(Opcode::DefPackage, &[package, 1])?;
    let superclass = match def.superclass {
        Some(parent) => w.string(&program.class_full_name(program.delegate(parent))),
        None => -1,
    };
    w.emit(
        Opcode::DefClass,
        &[
            full,
            package,
            superclass,
            flavor_code(def.flavor),
            def.header.modifiers.bits() as i32,
            count(def.own_fields.len())?,
            count(def.own_functions.len())?,
        ],
    )?;
    for interface in &def.interfaces {
        let name = w.string(&program.class_full_name(program.delegate(*interface)));
        w.emit(Opcode::ImplementInterface, &[full, name])?;
    }
    for field in &def.own_fields {
        let field = program.field(*field);
        let name = w.string(field.name());
        let ty = match &field.resolved {
            Some(ty) => program.describe_type(ty),
            None => field.ty.to_string(),
        };
        let ty = w.string(&ty);
        let slot = field.slot.map(|s| s as i32).unwrap_or(-1);
        w.emit(
            Opcode::DefField,
            &[full, name, ty, field.header.modifiers.bits() as i32, slot],
        )?;
    }
    for concrete in def.concrete_types.iter() {
        let name = w.string(&concrete.full_name);
        w.emit(
            Opcode::DefType,
            &[name, concrete_kind_code(concrete.kind), count(concrete.depends_on.len())?],
        )?;
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::decode::decode_definition;
    use crate::syntax::{ClassSyntax, FieldSyntax, UnitSyntax};
    use crate::types::TypeRef;

    #[test]
    fn test_stream_layout() {
        let mut program = Program::new();
        program
            .add_unit(
                UnitSyntax::new("geo").class(
                    ClassSyntax::new("Point", ClassFlavor::Class)
                        .field(FieldSyntax::new("x", TypeRef::named("int")))
                        .field(FieldSyntax::new("y", TypeRef::named("int"))),
                ),
            )
            .unwrap();
        let bytes = write_class(&program, ClassId::new(0)).unwrap();
        let stream = decode_definition(&bytes).unwrap();

        assert_eq!(stream.strings, vec!["geo.Point", "geo", "x", "int", "y"]);
        let opcodes: Vec<Opcode> = stream.instructions.iter().map(|(op, _)| *op).collect();
        assert_eq!(
            opcodes,
            vec![Opcode::DefPackage, Opcode::DefClass, Opcode::DefField, Opcode::DefField]
        );
        assert_eq!(stream.instructions[1].1, vec![0, 1, -1, 0, 0, 2, 0]);
        assert_eq!(stream.instructions[3].1, vec![0, 4, 3, 0, -1]);
    }
}
