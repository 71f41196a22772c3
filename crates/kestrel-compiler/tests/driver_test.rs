//! Driver tests: phase ordering, error collection, output and joint compilation

use kestrel_ast::{AstBuilder, Block, ClassDecl, CompileMode, MethodDecl, SourceUnit, Span, Statement, TypeRef};
use kestrel_bytecode::ClassFile;
use kestrel_compiler::{
    CompileError, CompileUnit, CompilerConfig, Driver, ExitCategory, ForeignCompiler,
    JointCompileError, JointConfig, JointRequest, Phase, ProcessCompiler,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn unit(name: &str, mode: CompileMode, statements: Vec<Statement>) -> SourceUnit {
    SourceUnit {
        name: name.into(),
        path: None,
        source: None,
        classes: vec![ClassDecl {
            name: name.into(),
            superclass: None,
            interfaces: vec![],
            mode,
            fields: vec![],
            methods: vec![MethodDecl {
                name: "run".into(),
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

fn clean_unit(name: &str) -> SourceUnit {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let decl = b.var_decl("x", TypeRef::named("int"), Some(one));
    unit(name, CompileMode::Static, vec![decl])
}

/// Two calls of a missing method on a known receiver
fn broken_unit(name: &str, mode: CompileMode) -> SourceUnit {
    let mut b = AstBuilder::new();
    let first_receiver = b.string("a");
    let first = b.call(first_receiver, "frobnicate", vec![]);
    let second_receiver = b.string("b");
    let second = b.call(second_receiver, "defenestrate", vec![]);
    unit(
        name,
        mode,
        vec![Statement::Expression(first), Statement::Expression(second)],
    )
}

fn config_in(dir: &TempDir) -> CompilerConfig {
    CompilerConfig {
        target_dir: dir.path().join("classes"),
        ..CompilerConfig::default()
    }
}

#[test]
fn test_writes_verified_class_files() {
    let dir = TempDir::new().unwrap();
    let driver = Driver::new(config_in(&dir));
    let report = driver.compile_all(vec![CompileUnit::new(clean_unit("Hello"))]);

    assert!(report.is_success());
    let outcome = report.unit("Hello").unwrap();
    assert_eq!(outcome.phase, Phase::Emitted);
    assert_eq!(outcome.written, vec![dir.path().join("classes").join("Hello.kcls")]);

    let bytes = std::fs::read(&outcome.written[0]).unwrap();
    let class = ClassFile::decode(&bytes).unwrap();
    assert_eq!(class.name, "Hello");
    assert!(class.find_method("run", "()void").is_some());
    assert!(class.find_method("<init>", "()void").is_some());
}

#[test]
fn test_in_memory_driver_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let driver = Driver::new(config_in(&dir)).in_memory();
    let report = driver.compile_all(vec![CompileUnit::new(clean_unit("Hello"))]);

    assert!(report.is_success());
    assert_eq!(report.classes().count(), 1);
    assert!(report.unit("Hello").unwrap().written.is_empty());
    assert!(!dir.path().join("classes").exists());
}

#[test]
fn test_errors_are_collected_per_unit() {
    let dir = TempDir::new().unwrap();
    let driver = Driver::new(config_in(&dir));
    let report = driver.compile_all(vec![
        CompileUnit::new(broken_unit("Broken", CompileMode::Static)),
        CompileUnit::new(clean_unit("Fine")),
    ]);

    assert!(!report.is_success());
    assert_eq!(report.units[0].name, "Broken");
    assert_eq!(report.units[1].name, "Fine");

    let broken = &report.units[0];
    assert_eq!(broken.phase, Phase::Failed);
    assert_eq!(broken.error_count(), 2);
    assert!(broken.diagnostics[0].message().contains("frobnicate"));
    assert!(broken.diagnostics[1].message().contains("defenestrate"));
    assert!(broken.classes.is_empty());
    assert!(broken.fatal.is_none());

    assert_eq!(report.units[1].phase, Phase::Emitted);
    assert!(dir.path().join("classes").join("Fine.kcls").exists());
    assert!(!dir.path().join("classes").join("Broken.kcls").exists());
}

#[test]
fn test_static_default_mode_turns_warnings_into_errors() {
    let dir = TempDir::new().unwrap();

    let lenient = Driver::new(config_in(&dir)).in_memory();
    let report = lenient.compile_all(vec![CompileUnit::new(broken_unit("Loose", CompileMode::Dynamic))]);
    let outcome = report.unit("Loose").unwrap();
    assert_eq!(outcome.phase, Phase::Emitted);
    assert_eq!(outcome.error_count(), 0);
    assert_eq!(outcome.warning_count(), 2);

    let strict = Driver::new(CompilerConfig {
        default_mode: CompileMode::Static,
        ..config_in(&dir)
    })
    .in_memory();
    let report = strict.compile_all(vec![CompileUnit::new(broken_unit("Loose", CompileMode::Dynamic))]);
    let outcome = report.unit("Loose").unwrap();
    assert_eq!(outcome.phase, Phase::Failed);
    assert_eq!(outcome.error_count(), 2);
}

#[test]
fn test_config_file_loading() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kestrel.toml");
    std::fs::write(
        &path,
        "target_dir = \"out\"\nverify = false\n\n[joint]\nenabled = true\nflags = [\"g\"]\n",
    )
    .unwrap();

    let config = CompilerConfig::load(&path).unwrap();
    assert_eq!(config.target_dir, PathBuf::from("out"));
    assert!(!config.verify);
    assert!(config.joint.enabled);
    assert_eq!(config.joint.compiler, "javac");

    let missing = CompilerConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    let missing: CompileError = missing.into();
    assert!(!missing.is_internal());
}

/// Records requests and fails for the configured unit's sources
struct FakeCompiler {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    fail_on: PathBuf,
}

impl ForeignCompiler for FakeCompiler {
    fn name(&self) -> &str {
        "fake"
    }

    fn compile(&self, request: &JointRequest<'_>) -> Result<(), JointCompileError> {
        self.calls.lock().unwrap().push(request.arguments());
        if request.files.contains(&self.fail_on) {
            return Err(JointCompileError::Failed {
                compiler: "fake".into(),
                category: ExitCategory::CompileError,
                diagnostics: "Foo.java:3: error: cannot find symbol".into(),
            });
        }
        Ok(())
    }
}

#[test]
fn test_joint_failure_is_fatal_to_its_unit_only() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let config = CompilerConfig {
        joint: JointConfig {
            enabled: true,
            ..JointConfig::default()
        },
        ..config_in(&dir)
    };
    let driver = Driver::new(config).with_foreign_compiler(Box::new(FakeCompiler {
        calls: Arc::clone(&calls),
        fail_on: PathBuf::from("Foo.java"),
    }));

    let report = driver.compile_all(vec![
        CompileUnit::new(clean_unit("Mixed")).with_foreign_sources(vec![PathBuf::from("Foo.java")]),
        CompileUnit::new(clean_unit("Other")).with_foreign_sources(vec![PathBuf::from("Bar.java")]),
        CompileUnit::new(clean_unit("Plain")),
    ]);

    let mixed = report.unit("Mixed").unwrap();
    assert_eq!(mixed.phase, Phase::Failed);
    assert!(matches!(
        mixed.fatal,
        Some(CompileError::Joint(JointCompileError::Failed {
            category: ExitCategory::CompileError,
            ..
        }))
    ));
    assert_eq!(mixed.error_count(), 1);
    let rendered = format!("{:?}", mixed.diagnostics[0].inner().notes);
    assert!(rendered.contains("cannot find symbol"));
    assert!(mixed.written.is_empty());

    assert_eq!(report.unit("Other").unwrap().phase, Phase::Emitted);
    assert_eq!(report.unit("Plain").unwrap().phase, Phase::Emitted);
    // Units without foreign sources skip the foreign compiler
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[cfg(unix)]
mod process {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn run(compiler: String, capture_output: bool) -> Result<(), JointCompileError> {
        let config = JointConfig {
            enabled: true,
            compiler,
            capture_output,
            ..JointConfig::default()
        };
        let files = vec![PathBuf::from("A.java")];
        let request = JointRequest {
            target_dir: std::path::Path::new("out"),
            classpath: &[],
            config: &config,
            files: &files,
        };
        ProcessCompiler.compile(&request)
    }

    #[test]
    fn test_exit_status_mapping() {
        let dir = TempDir::new().unwrap();
        assert!(run(script(&dir, "ok.sh", "echo note: fine"), true).is_ok());

        let expected = [
            (1, ExitCategory::CompileError),
            (2, ExitCategory::InvalidUsage),
            (3, ExitCategory::SystemError),
            (4, ExitCategory::Abnormal),
            (42, ExitCategory::Unexpected(Some(42))),
        ];
        for (code, category) in expected {
            let compiler = script(&dir, &format!("exit{}.sh", code), &format!("echo boom >&2\nexit {}", code));
            match run(compiler, true) {
                Err(JointCompileError::Failed {
                    category: got,
                    diagnostics,
                    ..
                }) => {
                    assert_eq!(got, category);
                    assert!(diagnostics.contains("boom"));
                }
                other => panic!("unexpected result {other:?}"),
            }
        }
    }

    #[test]
    fn test_uncaptured_output_is_noted() {
        let dir = TempDir::new().unwrap();
        let compiler = script(&dir, "fail.sh", "exit 1");
        let err = run(compiler, false).unwrap_err();
        assert!(err
            .diagnostics()
            .unwrap()
            .contains("standard error stream"));
    }

    #[test]
    fn test_arguments_reach_the_process() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("args.txt");
        let compiler = script(&dir, "echo.sh", &format!("echo \"$@\" > {}", log.display()));
        run(compiler, true).unwrap();
        let args = std::fs::read_to_string(log).unwrap();
        assert_eq!(args.trim(), "-d out -sourcepath stubs A.java");
    }

    #[test]
    fn test_missing_compiler_fails_to_launch() {
        let err = run("/nonexistent/kestrel-javac".into(), true).unwrap_err();
        assert!(matches!(err, JointCompileError::Launch { .. }));
    }
}
