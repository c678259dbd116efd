// Common test utilities
#![allow(dead_code)]

use classc::syntax::UnitSyntax;
use classc::types::TypeRef;
use classc::{Compiler, Config};

/// Route library logs through the test harness
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn ty(source: &str) -> TypeRef {
    TypeRef::parse(source).unwrap()
}

/// Compile units with the default codegen and a generous sweep cap
pub fn compile(units: Vec<UnitSyntax>) -> Compiler {
    init_logger();
    let mut compiler = Compiler::new(Config::default());
    for unit in units {
        compiler.add_unit(unit).unwrap();
    }
    compiler.run().unwrap();
    compiler
}

/// Compile and require that no declaration reported an error
pub fn compile_clean(units: Vec<UnitSyntax>) -> Compiler {
    let compiler = compile(units);
    let messages: Vec<String> = compiler.diagnostics().iter().map(|d| d.to_string()).collect();
    assert!(messages.is_empty(), "unexpected diagnostics: {:?}", messages);
    compiler
}

pub fn function_named<'a>(compiler: &'a Compiler, owner: &str, name: &str) -> &'a classc::program::FunctionDef {
    let program = compiler.program();
    let class = compiler.find_class(owner).unwrap();
    let id = program
        .class_functions(class)
        .get(name)
        .and_then(|s| s.as_function())
        .unwrap_or_else(|| panic!("{} has no function {}", owner, name));
    program.function(id)
}
