//! Instruction opcodes
//!
//! Every opcode is one byte followed by a fixed number of big-endian `i32`
//! operands. The operand count is part of the contract between encoder and
//! decoder.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::codegen::label::{Label, LabelResolver};
use crate::error::{Error, Result};

macro_rules! opcodes {
    ($($variant:ident = $byte:literal, $mnemonic:literal, $operands:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($variant = $byte,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            /// Number of `i32` operands following the opcode byte
            pub fn operand_count(self) -> usize {
                match self {
                    $(Opcode::$variant => $operands,)*
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $($byte => Some(Opcode::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", 0;
    LiteralString = 0x01, "literal_string", 2;
    DefPackage = 0x02, "def_package", 2;
    DefClass = 0x03, "def_class", 7;
    ImplementInterface = 0x04, "implement_interface", 2;
    DefField = 0x05, "def_field", 5;
    DefType = 0x06, "def_type", 3;
    New = 0x10, "new", 1;
    Push = 0x11, "push", 1;
    Pop = 0x12, "pop", 0;
    LoadThis = 0x13, "load_this", 0;
    LoadSlot = 0x14, "load_slot", 1;
    StoreSlot = 0x15, "store_slot", 1;
    GetField = 0x16, "get_field", 1;
    SetField = 0x17, "set_field", 1;
    Invoke = 0x18, "invoke", 2;
    Jump = 0x20, "jump", 1;
    JumpIfFalse = 0x21, "jump_if_false", 1;
    Switch = 0x22, "switch", 1;
    Throw = 0x23, "throw", 0;
    Return = 0x24, "return", 0;
    ReturnValue = 0x25, "return_value", 0;
}

static BY_MNEMONIC: Lazy<HashMap<&'static str, Opcode>> =
    Lazy::new(|| Opcode::ALL.iter().map(|op| (op.mnemonic(), *op)).collect());

impl Opcode {
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        BY_MNEMONIC.get(mnemonic).copied()
    }

    /// Encoded size in bytes
    pub fn size(self) -> usize {
        1 + 4 * self.operand_count()
    }
}

/// An operand is either known now or a label resolved after layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Imm(i32),
    Label(Label),
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Imm(value)
    }
}

impl From<Label> for Operand {
    fn from(label: Label) -> Self {
        Operand::Label(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
}

impl Instruction {
    /// Build an instruction, rejecting a wrong operand count
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Result<Self> {
        if operands.len() != opcode.operand_count() {
            return Err(Error::encoding(format!(
                "{} takes {} operand(s), got {}",
                opcode.mnemonic(),
                opcode.operand_count(),
                operands.len()
            )));
        }
        Ok(Self { opcode, operands })
    }

    /// Shorthand for instructions whose operands are all immediates
    pub fn imm(opcode: Opcode, operands: &[i32]) -> Result<Self> {
        Self::new(opcode, operands.iter().map(|v| Operand::Imm(*v)).collect())
    }

    pub fn size(&self) -> usize {
        self.opcode.size()
    }

    pub fn encode(&self, labels: &dyn LabelResolver, out: &mut Vec<u8>) -> Result<()> {
        out.push(self.opcode as u8);
        for operand in &self.operands {
            let value = match operand {
                Operand::Imm(v) => *v,
                Operand::Label(label) => labels
                    .address(*label)
                    .ok_or_else(|| Error::internal(format!("{:?} used by {} was never placed", label, self.opcode.mnemonic())))?,
            };
            out.extend_from_slice(&value.to_be_bytes());
        }
        Ok(())
    }
}
