//! End-to-end tests for the annotation pass

use kestrel_ast::{
    AstBuilder, BinaryOp, Block, ClassDecl, CompileMode, ExprKind, Literal, MethodDecl, Param,
    SourceUnit, Span, Statement, TypeRef,
};
use kestrel_checker::{
    annotate, CheckError, CheckResult, CheckWarning, ClassTable, LoopForm, NodeState,
};
use kestrel_types::TypeContext;

fn unit_with(mode: CompileMode, is_static: bool, statements: Vec<Statement>) -> SourceUnit {
    SourceUnit {
        name: "Script".into(),
        path: None,
        source: None,
        classes: vec![ClassDecl {
            name: "Script".into(),
            superclass: None,
            interfaces: vec![],
            mode,
            fields: vec![],
            methods: vec![MethodDecl {
                name: "run".into(),
                params: vec![],
                return_type: TypeRef::named("void"),
                is_static,
                body: Block::new(statements),
                span: Span::default(),
            }],
            span: Span::default(),
        }],
    }
}

fn check(ctx: &mut TypeContext, unit: &mut SourceUnit) -> CheckResult {
    let mut classes = ClassTable::with_builtins(ctx);
    let declare_errors = classes.declare_unit(ctx, unit);
    assert!(declare_errors.is_empty(), "{declare_errors:?}");
    annotate(ctx, &classes, unit)
}

#[test]
fn test_folding_is_idempotent() {
    let mut b = AstBuilder::new();
    let hello = b.string("hello, ");
    let world = b.string("world!");
    let concat = b.binary(BinaryOp::Add, hello, world);
    let concat_id = concat.id;
    let left = b.long(11111111);
    let right = b.long(11111111);
    let sum = b.binary(BinaryOp::Add, left, right);
    let statements = vec![
        b.var_decl("s", TypeRef::named("String"), Some(concat)),
        b.var_decl("n", TypeRef::named("long"), Some(sum)),
    ];
    let mut unit = unit_with(CompileMode::Static, false, statements);
    let mut ctx = TypeContext::new();

    let first = check(&mut ctx, &mut unit);
    assert!(!first.has_errors(), "{:?}", first.errors);
    assert_eq!(first.annotations.folded_count(), 2);
    assert!(first.annotations.is_folded(concat_id));
    assert_eq!(first.annotations.type_of(concat_id), Some(ctx.well_known().string));

    let Statement::VarDecl { init: Some(init), .. } = &unit.classes[0].methods[0].body.statements[1]
    else {
        panic!("expected declaration");
    };
    assert_eq!(init.kind, ExprKind::Literal(Literal::Long(22222222)));

    let snapshot = unit.clone();
    let second = check(&mut ctx, &mut unit);
    assert!(!second.has_errors());
    assert_eq!(second.annotations.folded_count(), 0);
    assert_eq!(unit, snapshot);
    assert_eq!(second.annotations.type_of(concat_id), Some(ctx.well_known().string));
}

#[test]
fn test_static_mode_collects_every_error() {
    let mut b = AstBuilder::new();
    let text = b.string("a");
    let receiver = b.string("abc");
    let call = b.call(receiver, "frobnicate", vec![]);
    let statements = vec![
        b.var_decl("x", TypeRef::named("int"), Some(text)),
        Statement::Expression(call),
        Statement::Break(Span::default()),
    ];
    let mut unit = unit_with(CompileMode::Static, false, statements);
    let mut ctx = TypeContext::new();

    let result = check(&mut ctx, &mut unit);
    assert_eq!(result.errors.len(), 3, "{:?}", result.errors);
    assert!(matches!(result.errors[0], CheckError::IncompatibleAssignment { .. }));
    assert!(matches!(
        &result.errors[1],
        CheckError::MethodNotFound { method, ty, .. } if method == "frobnicate" && ty == "String"
    ));
    assert!(matches!(result.errors[2], CheckError::BreakOutsideLoop { .. }));
    assert!(result.warnings.is_empty());
}

#[test]
fn test_dynamic_mode_degrades_to_warning() {
    let mut b = AstBuilder::new();
    let receiver = b.string("abc");
    let call = b.call(receiver, "frobnicate", vec![]);
    let call_id = call.id;
    let mut unit = unit_with(CompileMode::Dynamic, false, vec![Statement::Expression(call)]);
    let mut ctx = TypeContext::new();

    let result = check(&mut ctx, &mut unit);
    assert!(!result.has_errors(), "{:?}", result.errors);
    assert!(matches!(
        &result.warnings[..],
        [CheckWarning::DynamicFallback { member, .. }] if member == "method 'frobnicate'"
    ));
    assert!(result.annotations.target(call_id).is_none());
    assert_eq!(result.annotations.state(call_id), NodeState::Dynamic);
    assert_eq!(result.annotations.type_of(call_id), Some(ctx.well_known().dynamic));
}

#[test]
fn test_dynamic_receiver_degrades_only_that_call() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let d = b.var("d");
    let dynamic_call = b.call(d, "anything", vec![]);
    let dynamic_id = dynamic_call.id;
    let receiver = b.string("abc");
    let length = b.call(receiver, "length", vec![]);
    let length_id = length.id;
    let statements = vec![
        b.var_decl("d", TypeRef::Dynamic, Some(one)),
        Statement::Expression(dynamic_call),
        Statement::Expression(length),
    ];
    let mut unit = unit_with(CompileMode::Static, false, statements);
    let mut ctx = TypeContext::new();

    let result = check(&mut ctx, &mut unit);
    assert!(!result.has_errors(), "{:?}", result.errors);
    assert!(result.warnings.is_empty());
    assert!(result.annotations.target(dynamic_id).is_none());
    assert_eq!(result.annotations.state(dynamic_id), NodeState::Dynamic);

    let target = result.annotations.target(length_id).expect("static target");
    assert_eq!(result.annotations.state(length_id), NodeState::Resolved);
    assert_eq!(target.owner_name, "String");
    assert_eq!(result.annotations.type_of(length_id), Some(ctx.well_known().int));
}

#[test]
fn test_loop_forms() {
    let mut b = AstBuilder::new();
    let x = b.string("x");
    let strings = b.array(TypeRef::named("String"), vec![x]);
    let over_strings = b.for_in("s", TypeRef::named("String"), strings, vec![]);
    let one = b.int(1);
    let ints = b.array(TypeRef::named("int"), vec![one]);
    let over_ints = b.for_in("i", TypeRef::Dynamic, ints, vec![]);
    let two = b.int(2);
    let list = b.list(vec![two]);
    let over_list = b.for_in("e", TypeRef::Dynamic, list, vec![Statement::Continue(Span::default())]);
    let ids: Vec<_> = [&over_strings, &over_ints, &over_list]
        .iter()
        .map(|s| match s {
            Statement::ForIn { id, .. } => *id,
            _ => unreachable!(),
        })
        .collect();

    let mut unit = unit_with(CompileMode::Static, false, vec![over_strings, over_ints, over_list]);
    let mut ctx = TypeContext::new();
    let result = check(&mut ctx, &mut unit);
    assert!(!result.has_errors(), "{:?}", result.errors);

    let string = ctx.well_known().string;
    assert_eq!(
        result.annotations.loop_form(ids[0]),
        Some(LoopForm::IndexedArray { component: string })
    );
    assert_eq!(
        result.annotations.loop_form(ids[1]),
        Some(LoopForm::Iterator { direct: false })
    );
    assert_eq!(
        result.annotations.loop_form(ids[2]),
        Some(LoopForm::Iterator { direct: true })
    );
}

#[test]
fn test_self_referential_closure() {
    let mut b = AstBuilder::new();
    // def fact = { n -> n <= 1 ? 1 : n * fact(n - 1) }
    let n1 = b.var("n");
    let one = b.int(1);
    let cond = b.binary(BinaryOp::Le, n1, one);
    let base = b.int(1);
    let n2 = b.var("n");
    let fact_ref = b.var("fact");
    let n3 = b.var("n");
    let one_again = b.int(1);
    let pred = b.binary(BinaryOp::Sub, n3, one_again);
    let recursive = b.invoke(fact_ref, vec![pred]);
    let recursive_id = recursive.id;
    let product = b.binary(BinaryOp::Mul, n2, recursive);
    let body = b.ternary(cond, base, product);
    let closure = b.closure(
        vec![Param::new("n", TypeRef::Dynamic)],
        vec![Statement::Expression(body)],
    );
    let closure_id = closure.id;
    let decl = b.var_decl("fact", TypeRef::Dynamic, Some(closure));

    let mut unit = unit_with(CompileMode::Static, false, vec![decl]);
    let mut ctx = TypeContext::new();
    let result = check(&mut ctx, &mut unit);
    assert!(!result.has_errors(), "{:?}", result.errors);

    let ann = &result.annotations;
    assert_eq!(ann.state(closure_id), NodeState::Resolved);
    assert_eq!(ann.type_of(recursive_id), Some(ctx.well_known().dynamic));

    let info = ann.closure(closure_id).expect("closure info");
    assert_eq!(info.params.len(), 1);
    assert_eq!(info.captures.len(), 1);
    let captured = ann.local(info.captures[0]).expect("local");
    assert_eq!(captured.name, "fact");
    assert!(captured.captured);
}

#[test]
fn test_closure_return_type_flows_to_call() {
    let mut b = AstBuilder::new();
    // def twice = { int v -> v * 2 }; int r = twice(3)
    let v = b.var("v");
    let two = b.int(2);
    let doubled = b.binary(BinaryOp::Mul, v, two);
    let closure = b.closure(
        vec![Param::new("v", TypeRef::named("int"))],
        vec![Statement::Expression(doubled)],
    );
    let closure_id = closure.id;
    let twice = b.var("twice");
    let three = b.int(3);
    let call = b.invoke(twice, vec![three]);
    let call_id = call.id;
    let statements = vec![
        b.var_decl("twice", TypeRef::Dynamic, Some(closure)),
        b.var_decl("r", TypeRef::named("int"), Some(call)),
    ];

    let mut unit = unit_with(CompileMode::Static, false, statements);
    let mut ctx = TypeContext::new();
    let result = check(&mut ctx, &mut unit);
    assert!(!result.has_errors(), "{:?}", result.errors);

    let wk = ctx.well_known();
    let info = result.annotations.closure(closure_id).expect("closure info");
    assert_eq!(info.return_type, wk.int);
    assert!(info.captures.is_empty());
    assert_eq!(result.annotations.type_of(call_id), ctx.boxed(kestrel_types::PrimitiveKind::Int));
}

#[test]
fn test_this_in_static_method() {
    let mut b = AstBuilder::new();
    let this = b.this();
    let mut unit = unit_with(CompileMode::Dynamic, true, vec![Statement::Expression(this)]);
    let mut ctx = TypeContext::new();
    let result = check(&mut ctx, &mut unit);
    assert!(matches!(result.errors[..], [CheckError::ThisInStaticContext { .. }]));
}

#[test]
fn test_invalid_string_range() {
    let mut b = AstBuilder::new();
    let from = b.string("abc");
    let to = b.string("b");
    let range = b.range(from, to, false);
    let mut unit = unit_with(CompileMode::Static, false, vec![Statement::Expression(range)]);
    let mut ctx = TypeContext::new();
    let result = check(&mut ctx, &mut unit);
    assert!(matches!(
        &result.errors[..],
        [CheckError::InvalidRange { reason, .. }] if reason.contains("longer")
    ));
}

#[test]
fn test_byte_constant_narrowing() {
    let mut b = AstBuilder::new();
    let small = b.int(10);
    let large = b.int(1000);
    let statements = vec![
        b.var_decl("ok", TypeRef::named("byte"), Some(small)),
        b.var_decl("bad", TypeRef::named("byte"), Some(large)),
    ];
    let mut unit = unit_with(CompileMode::Static, false, statements);
    let mut ctx = TypeContext::new();
    let result = check(&mut ctx, &mut unit);
    assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
    assert!(matches!(
        &result.errors[0],
        CheckError::IncompatibleAssignment { expected, actual, .. } if expected == "byte" && actual == "int"
    ));
}

#[test]
fn test_duplicate_local() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let two = b.int(2);
    let statements = vec![
        b.var_decl("x", TypeRef::named("int"), Some(one)),
        b.var_decl("x", TypeRef::named("int"), Some(two)),
    ];
    let mut unit = unit_with(CompileMode::Dynamic, false, statements);
    let mut ctx = TypeContext::new();
    let result = check(&mut ctx, &mut unit);
    assert!(matches!(
        &result.errors[..],
        [CheckError::DuplicateVariable { name, .. }] if name == "x"
    ));
}
