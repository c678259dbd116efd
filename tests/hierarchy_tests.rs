use classc::modifiers::flags;
use classc::syntax::{ClassFlavor, ClassSyntax, FieldSyntax, FunctionSyntax, UnitSyntax};
use classc::types::TypeRef;
use classc::{Compiler, Config, Error};

mod common;
use common::{compile, compile_clean, ty};

fn errors(compiler: &Compiler) -> Vec<&Error> {
    compiler.diagnostics().iter().map(|d| &d.error).collect()
}

fn base_with_f(result: &str) -> ClassSyntax {
    ClassSyntax::new("Base", ClassFlavor::Class).function(FunctionSyntax::new("f", ty(result)).body(0))
}

#[test]
fn test_override_must_match_result_type() {
    let compiler = compile(vec![UnitSyntax::new("app").class(base_with_f("int")).class(
        ClassSyntax::new("Derived", ClassFlavor::Class)
            .extends(ty("Base"))
            .function(FunctionSyntax::new("f", ty("long")).modifiers(flags::OVERRIDE).body(1)),
    )]);
    let errors = errors(&compiler);
    assert_eq!(errors.len(), 1);
    match errors[0] {
        Error::TypeMismatch { expected, found, .. } => {
            assert_eq!(expected, "int");
            assert_eq!(found, "long");
        }
        other => panic!("expected a type mismatch, got {:?}", other),
    }
}

#[test]
fn test_matching_override_is_accepted() {
    compile_clean(vec![UnitSyntax::new("app").class(base_with_f("int")).class(
        ClassSyntax::new("Derived", ClassFlavor::Class)
            .extends(ty("Base"))
            .function(FunctionSyntax::new("f", ty("int")).modifiers(flags::OVERRIDE).body(1)),
    )]);
}

#[test]
fn test_hiding_without_override_is_rejected() {
    let compiler = compile(vec![UnitSyntax::new("app").class(base_with_f("int")).class(
        ClassSyntax::new("Derived", ClassFlavor::Class)
            .extends(ty("Base"))
            .function(FunctionSyntax::new("f", ty("int")).body(1)),
    )]);
    assert!(matches!(errors(&compiler)[..], [Error::Syntax { .. }]));
}

#[test]
fn test_override_of_nothing_is_rejected() {
    let compiler = compile(vec![UnitSyntax::new("app").class(
        ClassSyntax::new("Lonely", ClassFlavor::Class)
            .function(FunctionSyntax::new("g", TypeRef::void()).modifiers(flags::OVERRIDE).body(0)),
    )]);
    assert!(matches!(errors(&compiler)[..], [Error::Syntax { .. }]));
}

#[test]
fn test_redeclared_field_type_must_match() {
    let compiler = compile(vec![UnitSyntax::new("app")
        .class(ClassSyntax::new("Base", ClassFlavor::Class).field(FieldSyntax::new("size", ty("int"))))
        .class(
            ClassSyntax::new("Wrong", ClassFlavor::Class)
                .extends(ty("Base"))
                .field(FieldSyntax::new("size", ty("string"))),
        )
        .class(
            ClassSyntax::new("Shadow", ClassFlavor::Class)
                .extends(ty("Base"))
                .field(FieldSyntax::new("size", ty("int"))),
        )]);
    let diagnostics = compiler.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].description, "class app.Wrong");
    assert!(matches!(diagnostics[0].error, Error::TypeMismatch { .. }));

    let program = compiler.program();
    let shadow = compiler.find_class("app.Shadow").unwrap();
    assert!(program.class(shadow).stage().is_compiled());
}

#[test]
fn test_cycle_reported_for_each_member() {
    let compiler = compile(vec![UnitSyntax::new("app")
        .class(ClassSyntax::new("A", ClassFlavor::Class).extends(ty("B")))
        .class(ClassSyntax::new("B", ClassFlavor::Class).extends(ty("A")))]);
    let errors = errors(&compiler);
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| matches!(e, Error::Hierarchy { .. })));
}

#[test]
fn test_final_and_sealed_parents() {
    let compiler = compile(vec![UnitSyntax::new("app")
        .class(ClassSyntax::new("Leaf", ClassFlavor::Class).modifiers(flags::FINAL))
        .class(ClassSyntax::new("Twig", ClassFlavor::Class).extends(ty("Leaf")))
        .class(ClassSyntax::new("Sealed", ClassFlavor::Class).permits(ty("Allowed")))
        .class(ClassSyntax::new("Allowed", ClassFlavor::Class).extends(ty("Sealed")))
        .class(ClassSyntax::new("Intruder", ClassFlavor::Class).extends(ty("Sealed")))]);
    let failed: Vec<&str> = compiler.diagnostics().iter().map(|d| d.description.as_str()).collect();
    assert_eq!(failed, vec!["class app.Twig", "class app.Intruder"]);
}

#[test]
fn test_concrete_class_must_implement_interface() {
    let unit = UnitSyntax::new("app")
        .class(ClassSyntax::new("Runner", ClassFlavor::Interface).function(FunctionSyntax::new("run", TypeRef::void())))
        .class(ClassSyntax::new("Lazy", ClassFlavor::Class).implements(ty("Runner")))
        .class(
            ClassSyntax::new("Busy", ClassFlavor::Class)
                .implements(ty("Runner"))
                .function(FunctionSyntax::new("run", TypeRef::void()).body(0)),
        )
        .class(ClassSyntax::new("Later", ClassFlavor::Class).modifiers(flags::ABSTRACT).implements(ty("Runner")));
    let compiler = compile(vec![unit]);
    let diagnostics = compiler.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].description, "class app.Lazy");
    assert!(matches!(diagnostics[0].error, Error::Hierarchy { .. }));
}

#[test]
fn test_abstract_function_placement() {
    let compiler = compile(vec![UnitSyntax::new("app").class(
        ClassSyntax::new("Plain", ClassFlavor::Class)
            .function(FunctionSyntax::new("todo", TypeRef::void()).modifiers(flags::ABSTRACT)),
    )]);
    assert!(matches!(errors(&compiler)[..], [Error::Syntax { .. }]));

    let compiler = compile(vec![UnitSyntax::new("app")
        .class(ClassSyntax::new("Plain", ClassFlavor::Class).function(FunctionSyntax::new("todo", TypeRef::void())))]);
    assert!(matches!(errors(&compiler)[..], [Error::Syntax { .. }]));

    compile_clean(vec![UnitSyntax::new("app").class(
        ClassSyntax::new("Plain", ClassFlavor::Class)
            .function(FunctionSyntax::new("ffi", TypeRef::void()).modifiers(flags::NATIVE)),
    )]);
}

#[test]
fn test_interface_cannot_be_extended_by_class() {
    let compiler = compile(vec![UnitSyntax::new("app")
        .class(ClassSyntax::new("Api", ClassFlavor::Interface))
        .class(ClassSyntax::new("Impl", ClassFlavor::Class).extends(ty("Api")))]);
    assert!(matches!(errors(&compiler)[..], [Error::Hierarchy { .. }]));
}

#[test]
fn test_duplicate_class_names() {
    let compiler = compile(vec![
        UnitSyntax::new("app").class(ClassSyntax::new("Twice", ClassFlavor::Class)),
        UnitSyntax::new("app").class(ClassSyntax::new("Twice", ClassFlavor::Class)),
    ]);
    assert!(matches!(errors(&compiler)[..], [Error::DuplicateKey { .. }]));
}

#[test]
fn test_unknown_type_is_unresolved() {
    let compiler = compile(vec![UnitSyntax::new("app")
        .class(ClassSyntax::new("Holder", ClassFlavor::Class).field(FieldSyntax::new("x", ty("Nowhere"))))]);
    // the field and both of its accessors mention the missing type
    let errors = errors(&compiler);
    assert!(!errors.is_empty());
    for error in errors {
        match error {
            Error::Unresolved { name, .. } => assert_eq!(name, "Nowhere"),
            other => panic!("expected an unresolved name, got {:?}", other),
        }
    }
    let holder = compiler.program().classes.iter().find(|c| c.name() == "Holder").unwrap();
    assert!(holder.header.failed);
}

#[test]
fn test_malformed_accessor_is_a_syntax_error() {
    let compiler = compile(vec![UnitSyntax::new("app").class(
        ClassSyntax::new("Holder", ClassFlavor::Class).field(
            FieldSyntax::new("id", ty("long"))
                .modifiers(flags::FINAL)
                .setter(Default::default()),
        ),
    )]);
    assert!(matches!(errors(&compiler)[..], [Error::Syntax { .. }]));
}

#[test]
fn test_stall_without_errors_is_reported() {
    common::init_logger();
    let mut compiler = Compiler::new(Config::default().with_max_sweeps(2));
    compiler
        .add_unit(UnitSyntax::new("app").class(ClassSyntax::new("Slow", ClassFlavor::Class)))
        .unwrap();
    assert!(matches!(compiler.run(), Err(Error::Stalled { .. })));
}
