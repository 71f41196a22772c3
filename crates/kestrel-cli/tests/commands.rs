//! Commands driven end to end over units written to a temporary directory

use kestrel_ast::{AstBuilder, Block, ClassDecl, CompileMode, MethodDecl, SourceUnit, Span, Statement, TypeRef};
use kestrel_cli::commands::{check, compile, run};
use kestrel_cli::{CompileOptions, OutputFormat, Reporter};
use kestrel_runtime::CapturedOutput;
use std::path::{Path, PathBuf};
use termcolor::Buffer;

fn reporter() -> Reporter {
    Reporter::with_writers(
        OutputFormat::Pretty,
        Box::new(Buffer::no_color()),
        Box::new(Buffer::no_color()),
    )
}

/// `class Main { static void main() { <statements> } }`
fn unit(mode: CompileMode, statements: Vec<Statement>) -> SourceUnit {
    SourceUnit {
        name: "Main".into(),
        path: None,
        source: None,
        classes: vec![ClassDecl {
            name: "Main".into(),
            superclass: None,
            interfaces: vec![],
            mode,
            fields: vec![],
            methods: vec![MethodDecl {
                name: "main".into(),
                params: vec![],
                return_type: TypeRef::named("void"),
                is_static: true,
                body: Block::new(statements),
                span: Span::default(),
            }],
            span: Span::default(),
        }],
    }
}

fn hello() -> SourceUnit {
    let mut b = AstBuilder::new();
    let text = b.string("hello");
    let print = b.static_call("Console", "println", vec![text]);
    unit(CompileMode::Static, vec![Statement::Expression(print)])
}

/// A static-mode call to a method `int` does not have
fn broken() -> SourceUnit {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let call = b.call(one, "frobnicate", vec![]);
    unit(CompileMode::Static, vec![Statement::Expression(call)])
}

fn write_unit(dir: &Path, file: &str, unit: &SourceUnit) -> PathBuf {
    let path = dir.join(file);
    std::fs::write(&path, serde_json::to_string(unit).unwrap()).unwrap();
    path
}

#[test]
fn test_check_clean_unit() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_unit(dir.path(), "main.json", &hello());
    let summary = check::execute(&[path], &CompileOptions::default(), &mut reporter()).unwrap();
    assert_eq!(summary.errors, 0);
}

#[test]
fn test_check_reports_static_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_unit(dir.path(), "main.json", &broken());
    let summary = check::execute(&[path], &CompileOptions::default(), &mut reporter()).unwrap();
    assert!(summary.errors > 0);
}

#[test]
fn test_compile_writes_class_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_unit(dir.path(), "main.json", &hello());
    let target = dir.path().join("classes");
    let options = CompileOptions {
        target_dir: Some(target.clone()),
        ..Default::default()
    };
    let report = compile::execute(&[path], &options, &mut reporter()).unwrap();
    assert!(report.is_success());
    let written = &report.unit("Main").unwrap().written;
    assert!(!written.is_empty());
    assert!(written.iter().all(|file| file.starts_with(&target) && file.exists()));
}

#[test]
fn test_compile_failure_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_unit(dir.path(), "main.json", &broken());
    let options = CompileOptions {
        target_dir: Some(dir.path().join("classes")),
        ..Default::default()
    };
    let report = compile::execute(&[path], &options, &mut reporter()).unwrap();
    assert!(!report.is_success());
    assert!(report.error_count() > 0);
}

#[test]
fn test_run_prints_program_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_unit(dir.path(), "main.json", &hello());
    let output = CapturedOutput::new();
    let ran = run::execute(&[path], "Main", &CompileOptions::default(), &mut reporter(), output.clone()).unwrap();
    assert!(ran);
    assert_eq!(output.contents(), "hello\n");
}

#[test]
fn test_run_unknown_main_class() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_unit(dir.path(), "main.json", &hello());
    let err = run::execute(
        &[path],
        "Elsewhere",
        &CompileOptions::default(),
        &mut reporter(),
        CapturedOutput::new(),
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("Elsewhere"));
}

#[test]
fn test_run_stops_on_compile_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_unit(dir.path(), "main.json", &broken());
    let output = CapturedOutput::new();
    let ran = run::execute(&[path], "Main", &CompileOptions::default(), &mut reporter(), output.clone()).unwrap();
    assert!(!ran);
    assert!(output.contents().is_empty());
}
