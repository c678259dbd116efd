//! Code generation support
//!
//! The instruction set, label handles, the body builder with its two-pass
//! freeze, and the composers for the binary dispatch and exception-handler
//! tables that body compilation embeds next to each function's code.

pub mod body;
pub mod decode;
pub mod definition;
pub mod dispatch;
pub mod exception;
pub mod label;
pub mod opcode;

pub use body::{BodyBuilder, CompiledBody, KnownClasses};
pub use dispatch::{DispatchBlob, DispatchKind, DispatchTable};
pub use exception::TryCatchTable;
pub use label::{Label, LabelResolver};
pub use opcode::{Instruction, Opcode, Operand};
