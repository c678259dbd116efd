//! classc: staged semantic resolution and table emission for a class-based
//! bytecode compiler
//!
//! The front end hands over syntax nodes ([`syntax`]); this crate resolves
//! them into a whole-program declaration arena ([`program`]) and drives every
//! declaration through twelve ordered stages ([`stage`]) until a fixed point.
//!
//! ## Architecture
//!
//! - **namespace**: per-scope symbol tables with overload grouping
//! - **hierarchy**: parents, permits, hierarchy checks and inheritance
//! - **generic**: template instantiation, trait wrappers, concrete-type hosts
//! - **accessor**: getter/setter synthesis for fields
//! - **slots**: field and register allocation
//! - **codegen**: instruction stream, two-pass labels, dispatch and exception
//!   tables, class definition streams
//! - **compiler**: stage handlers and the fixed-point driver
//!
//! ## Compilation Flow
//!
//! ```text
//! UnitSyntax → Program::add_unit → Compiler::run
//!                                     ↓ sweep until fixed point
//!   ParseClassName → ParseParents → ParseFields → ... → ClearResources → Compiled
//! ```

pub mod accessor;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod error;
pub mod generic;
pub mod hierarchy;
pub mod modifiers;
pub mod namespace;
pub mod program;
pub mod resolve;
pub mod slots;
pub mod span;
pub mod stage;
pub mod syntax;
pub mod types;

pub use compiler::{BodyCodegen, BodyContext, Compiler, Diagnostic};
pub use config::Config;
pub use error::{Error, Result};

/// Compile a set of units with the default body codegen.
///
/// Returns the compiler so callers can inspect the program and the
/// collected diagnostics.
pub fn compile_units(units: Vec<syntax::UnitSyntax>, config: Config) -> Result<Compiler> {
    let mut compiler = Compiler::new(config);
    for unit in units {
        compiler.add_unit(unit)?;
    }
    compiler.run()?;
    Ok(compiler)
}
