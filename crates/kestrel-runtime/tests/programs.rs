//! End-to-end runs: compile units in memory, load them, run `main`

use kestrel_ast::{
    AstBuilder, BinaryOp, Block, ClassDecl, CompileMode, MethodDecl, Param, SourceUnit, Span, Statement, TypeRef,
};
use kestrel_compiler::{CompileUnit, CompilerConfig, Driver};
use kestrel_runtime::numeric::{self, ArithOp};
use kestrel_runtime::{
    activate, CapturedOutput, Interpreter, MethodTarget, Overlay, OverlayKind, RuntimeError, RuntimeResult, Value,
};

fn main_method(statements: Vec<Statement>) -> MethodDecl {
    MethodDecl {
        name: "main".into(),
        params: vec![],
        return_type: TypeRef::named("void"),
        is_static: true,
        body: Block::new(statements),
        span: Span::default(),
    }
}

fn class(name: &str, mode: CompileMode, methods: Vec<MethodDecl>) -> ClassDecl {
    ClassDecl {
        name: name.into(),
        superclass: None,
        interfaces: vec![],
        mode,
        fields: vec![],
        methods,
        span: Span::default(),
    }
}

fn program(mode: CompileMode, statements: Vec<Statement>) -> SourceUnit {
    SourceUnit {
        name: "Main".into(),
        path: None,
        source: None,
        classes: vec![class("Main", mode, vec![main_method(statements)])],
    }
}

fn println(b: &mut AstBuilder, value: kestrel_ast::Expression) -> Statement {
    Statement::Expression(b.static_call("Console", "println", vec![value]))
}

/// Compile `unit` and load it into a fresh interpreter writing to a buffer
fn load(unit: SourceUnit) -> (Interpreter, CapturedOutput) {
    let report = Driver::new(CompilerConfig::default())
        .in_memory()
        .compile_all(vec![CompileUnit::new(unit)]);
    assert!(report.is_success(), "compilation failed with {} errors", report.error_count());
    let output = CapturedOutput::new();
    let mut interp = Interpreter::new().with_output(output.clone());
    interp
        .load_all(report.classes().map(|emitted| emitted.class.clone()))
        .unwrap();
    (interp, output)
}

fn run(unit: SourceUnit) -> RuntimeResult<String> {
    let (mut interp, output) = load(unit);
    interp.run_main("Main")?;
    Ok(output.contents())
}

#[test]
fn test_static_loop_over_range() {
    // int s = 0; for (int i in 1..4) s = s + i; println(s)
    let mut b = AstBuilder::new();
    let zero = b.int(0);
    let decl = b.var_decl("s", TypeRef::named("int"), Some(zero));
    let s = b.var("s");
    let s_again = b.var("s");
    let i = b.var("i");
    let sum = b.binary(BinaryOp::Add, s_again, i);
    let update = b.assign(s, sum);
    let from = b.int(1);
    let to = b.int(4);
    let range = b.range(from, to, false);
    let loop_stmt = b.for_in("i", TypeRef::named("int"), range, vec![Statement::Expression(update)]);
    let total = b.var("s");
    let print = println(&mut b, total);

    let output = run(program(CompileMode::Static, vec![decl, loop_stmt, print])).unwrap();
    assert_eq!(output, "10\n");
}

#[test]
fn test_closure_updates_captured_local() {
    // def counter = 0; def inc = { n -> counter = counter + n }; inc(2); inc(3); println(counter)
    let mut b = AstBuilder::new();
    let zero = b.int(0);
    let counter_decl = b.var_decl("counter", TypeRef::Dynamic, Some(zero));
    let counter = b.var("counter");
    let counter_again = b.var("counter");
    let n = b.var("n");
    let sum = b.binary(BinaryOp::Add, counter_again, n);
    let update = b.assign(counter, sum);
    let closure = b.closure(vec![Param::new("n", TypeRef::Dynamic)], vec![Statement::Expression(update)]);
    let inc_decl = b.var_decl("inc", TypeRef::Dynamic, Some(closure));
    let mut calls = Vec::new();
    for step in [2, 3] {
        let inc = b.var("inc");
        let arg = b.int(step);
        calls.push(Statement::Expression(b.invoke(inc, vec![arg])));
    }
    let total = b.var("counter");
    let print = println(&mut b, total);

    let mut statements = vec![counter_decl, inc_decl];
    statements.extend(calls);
    statements.push(print);
    let output = run(program(CompileMode::Static, statements)).unwrap();
    assert_eq!(output, "5\n");
}

#[test]
fn test_user_class_construction_and_call() {
    // class Greeter { String greet(String name) { return "hi " + name } }
    let mut b = AstBuilder::new();
    let greeting = b.string("hi ");
    let name = b.var("name");
    let joined = b.binary(BinaryOp::Add, greeting, name);
    let greet = MethodDecl {
        name: "greet".into(),
        params: vec![Param::new("name", TypeRef::named("String"))],
        return_type: TypeRef::named("String"),
        is_static: false,
        body: Block::new(vec![Statement::Return {
            value: Some(joined),
            span: Span::default(),
        }]),
        span: Span::default(),
    };

    // Greeter g = new Greeter(); println(g.greet("kestrel"))
    let created = b.new_object("Greeter", vec![]);
    let decl = b.var_decl("g", TypeRef::named("Greeter"), Some(created));
    let g = b.var("g");
    let arg = b.string("kestrel");
    let call = b.call(g, "greet", vec![arg]);
    let print = println(&mut b, call);

    let unit = SourceUnit {
        name: "Main".into(),
        path: None,
        source: None,
        classes: vec![
            class("Greeter", CompileMode::Static, vec![greet]),
            class("Main", CompileMode::Static, vec![main_method(vec![decl, print])]),
        ],
    };
    assert_eq!(run(unit).unwrap(), "hi kestrel\n");
}

#[test]
fn test_method_added_at_runtime_is_dispatched() {
    // def x = "ab"; println(x.shout())
    let mut b = AstBuilder::new();
    let ab = b.string("ab");
    let decl = b.var_decl("x", TypeRef::Dynamic, Some(ab));
    let x = b.var("x");
    let shout = b.call(x, "shout", vec![]);
    let print = println(&mut b, shout);

    let (mut interp, output) = load(program(CompileMode::Dynamic, vec![decl, print]));
    interp
        .metaclasses()
        .require("String")
        .unwrap()
        .add_method(MethodTarget::native("String", "shout", &[], "String", |_, receiver, _| {
            Ok(Value::string(&receiver.to_string().to_uppercase()))
        }));
    interp.run_main("Main").unwrap();
    assert_eq!(output.contents(), "AB\n");
}

#[test]
fn test_overlay_active_during_run() {
    // def n = 21; println(n.twice())
    let mut b = AstBuilder::new();
    let value = b.int(21);
    let decl = b.var_decl("n", TypeRef::Dynamic, Some(value));
    let n = b.var("n");
    let twice = b.call(n, "twice", vec![]);
    let print = println(&mut b, twice);
    let (mut interp, output) = load(program(CompileMode::Dynamic, vec![decl, print]));

    let overlay = Overlay::new(OverlayKind::Category, "Doubling").with_method(
        "Integer",
        MethodTarget::native("Integer", "twice", &[], "Object", |_, receiver, _| {
            numeric::arithmetic(ArithOp::Mul, receiver, &Value::Int(2))
        }),
    );
    {
        let _guard = activate(overlay);
        interp.run_main("Main").unwrap();
    }
    assert_eq!(output.contents(), "42\n");

    let err = interp.run_main("Main").unwrap_err();
    assert!(matches!(err, RuntimeError::NoSuchMethod { .. }));
}

#[test]
fn test_missing_method_surfaces_as_error() {
    // def d = 1; d.frobnicate()
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let decl = b.var_decl("d", TypeRef::Dynamic, Some(one));
    let d = b.var("d");
    let call = Statement::Expression(b.call(d, "frobnicate", vec![]));

    let err = run(program(CompileMode::Dynamic, vec![decl, call])).unwrap_err();
    assert_eq!(
        err.to_string(),
        "No signature of method: Integer.frobnicate() is applicable for argument types: ()"
    );
}

#[test]
fn test_main_is_required() {
    let (mut interp, _) = load(SourceUnit {
        name: "Main".into(),
        path: None,
        source: None,
        classes: vec![class("Main", CompileMode::Static, vec![])],
    });
    assert!(matches!(interp.run_main("Main"), Err(RuntimeError::NoSuchMethod { .. })));
    assert!(matches!(interp.run_main("Absent"), Err(RuntimeError::ClassNotFound(_))));
}
