//! Compilation driver
//!
//! Runs units through analysis, optional joint compilation and emission.
//! Units are independent: diagnostics are collected per unit in submission
//! order, and a fatal error stops only the unit that raised it.

mod config;
mod joint;

pub use config::{CompilerConfig, ConfigError, JointConfig};
pub use joint::{ExitCategory, ForeignCompiler, JointCompileError, JointRequest, ProcessCompiler};

use crate::emit::{emit_unit, EmittedClass};
use crate::error::{CompileError, CompileResult};
use codespan_reporting::diagnostic::Severity;
use codespan_reporting::files::SimpleFiles;
use kestrel_ast::SourceUnit;
use kestrel_bytecode::verify_class;
use kestrel_checker::{annotate, create_files, ClassTable, Diagnostic};
use kestrel_types::TypeContext;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use termcolor::WriteColor;
use tracing::{debug, warn};

/// Progress marker of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepted, nothing run yet
    Initialized,
    /// Annotated without errors
    Analyzed,
    /// Foreign sources compiled
    JointCompiled,
    /// Classes emitted, verified and written
    Emitted,
    /// Stopped by errors or a fatal fault
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initialized => "initialized",
            Phase::Analyzed => "analyzed",
            Phase::JointCompiled => "joint-compiled",
            Phase::Emitted => "emitted",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A parsed source unit plus the foreign sources compiled with it
#[derive(Debug, Clone)]
pub struct CompileUnit {
    /// Annotated and emitted by this compiler
    pub unit: SourceUnit,
    /// Handed to the foreign compiler when joint compilation is enabled
    pub foreign_sources: Vec<PathBuf>,
}

impl CompileUnit {
    /// Unit with no foreign sources
    pub fn new(unit: SourceUnit) -> Self {
        Self {
            unit,
            foreign_sources: Vec::new(),
        }
    }

    /// Attach foreign sources for joint compilation
    pub fn with_foreign_sources(mut self, sources: Vec<PathBuf>) -> Self {
        self.foreign_sources = sources;
        self
    }
}

/// What happened to one unit
#[derive(Debug)]
pub struct UnitOutcome {
    /// Unit name
    pub name: String,
    /// Last phase reached; `Failed` if a fatal error stopped it
    pub phase: Phase,
    /// Errors and warnings in the order they were found
    pub diagnostics: Vec<Diagnostic>,
    /// Classes emitted for the unit, kept in memory
    pub classes: Vec<EmittedClass>,
    /// Class files written to the target directory
    pub written: Vec<PathBuf>,
    /// The error that stopped the unit, if any
    pub fatal: Option<CompileError>,
    files: SimpleFiles<String, String>,
}

impl UnitOutcome {
    fn new(unit: &SourceUnit) -> Self {
        let path = unit.path.clone().unwrap_or_else(|| unit.name.clone());
        Self {
            name: unit.name.clone(),
            phase: Phase::Initialized,
            diagnostics: Vec::new(),
            classes: Vec::new(),
            written: Vec::new(),
            fatal: None,
            files: create_files(path, unit.source.clone().unwrap_or_default()),
        }
    }

    /// Whether the unit reached `Emitted`
    pub fn is_success(&self) -> bool {
        self.phase == Phase::Emitted
    }

    /// Errors and internal faults among the diagnostics
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d.severity(), Severity::Error | Severity::Bug))
            .count()
    }

    /// Warnings among the diagnostics
    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity() == Severity::Warning)
            .count()
    }

    /// Source files the diagnostics refer to
    pub fn files(&self) -> &SimpleFiles<String, String> {
        &self.files
    }

    /// Render every diagnostic; labels that fall outside the available
    /// source degrade to the bare message
    pub fn emit_diagnostics(&self, writer: &mut dyn WriteColor) -> std::io::Result<()> {
        for diagnostic in &self.diagnostics {
            if diagnostic.emit_to(writer, &self.files).is_err() {
                writeln!(writer, "{}: {}", self.name, diagnostic.message())?;
            }
        }
        Ok(())
    }

    fn fail(&mut self, error: CompileError) {
        let diagnostic = match &error {
            CompileError::Joint(joint) => {
                let diagnostic = Diagnostic::error(joint.to_string());
                match joint.diagnostics().filter(|text| !text.trim().is_empty()) {
                    Some(text) => diagnostic.with_note(text.trim_end().to_string()),
                    None => diagnostic,
                }
            }
            error if error.is_internal() => Diagnostic::bug(error.to_string()),
            error => Diagnostic::error(error.to_string()),
        };
        debug!(unit = %self.name, from = %self.phase, %error, "unit failed");
        self.diagnostics.push(diagnostic);
        self.phase = Phase::Failed;
        self.fatal = Some(error);
    }

    fn advance(&mut self, phase: Phase) {
        debug!(unit = %self.name, from = %self.phase, to = %phase, "phase transition");
        self.phase = phase;
    }
}

/// Outcome of a whole compilation
#[derive(Debug, Default)]
pub struct CompilationReport {
    /// One entry per unit, in submission order
    pub units: Vec<UnitOutcome>,
}

impl CompilationReport {
    /// Whether every unit was emitted
    pub fn is_success(&self) -> bool {
        self.units.iter().all(UnitOutcome::is_success)
    }

    /// Errors summed over every unit
    pub fn error_count(&self) -> usize {
        self.units.iter().map(UnitOutcome::error_count).sum()
    }

    /// Outcome of the unit named `name`
    pub fn unit(&self, name: &str) -> Option<&UnitOutcome> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Every emitted class across all units
    pub fn classes(&self) -> impl Iterator<Item = &EmittedClass> {
        self.units.iter().flat_map(|u| u.classes.iter())
    }
}

/// Compilation driver
pub struct Driver {
    config: CompilerConfig,
    foreign: Box<dyn ForeignCompiler>,
    write_output: bool,
}

impl Driver {
    /// Driver that writes class files and runs the foreign compiler as a subprocess
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            foreign: Box::new(ProcessCompiler),
            write_output: true,
        }
    }

    /// Replace the subprocess-backed foreign compiler
    pub fn with_foreign_compiler(mut self, compiler: Box<dyn ForeignCompiler>) -> Self {
        self.foreign = compiler;
        self
    }

    /// Keep emitted classes in memory only
    pub fn in_memory(mut self) -> Self {
        self.write_output = false;
        self
    }

    /// Settings in effect
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile every unit against one shared class table
    pub fn compile_all(&self, units: Vec<CompileUnit>) -> CompilationReport {
        let mut ctx = TypeContext::new();
        let mut classes = ClassTable::with_builtins(&mut ctx);

        let mut units = units;
        for compile_unit in &mut units {
            for class in &mut compile_unit.unit.classes {
                class.mode = self.config.effective_mode(class.mode);
            }
        }

        // Class names first so units may refer to each other in any order
        for compile_unit in &units {
            classes.declare_classes(&mut ctx, &compile_unit.unit);
        }
        let mut outcomes: Vec<UnitOutcome> = units.iter().map(|u| UnitOutcome::new(&u.unit)).collect();
        let mut member_errors = Vec::with_capacity(units.len());
        for compile_unit in &units {
            member_errors.push(classes.declare_members(&mut ctx, &compile_unit.unit));
        }

        for ((compile_unit, outcome), errors) in units.iter_mut().zip(&mut outcomes).zip(member_errors) {
            for error in &errors {
                outcome.diagnostics.push(Diagnostic::from_check_error(error, 0));
            }
            self.compile_unit(&mut ctx, &classes, compile_unit, outcome, !errors.is_empty());
        }

        let report = CompilationReport { units: outcomes };
        debug!(
            units = report.units.len(),
            errors = report.error_count(),
            success = report.is_success(),
            "compilation finished"
        );
        report
    }

    fn compile_unit(
        &self,
        ctx: &mut TypeContext,
        classes: &ClassTable,
        compile_unit: &mut CompileUnit,
        outcome: &mut UnitOutcome,
        declaration_failed: bool,
    ) {
        let result = annotate(ctx, classes, &mut compile_unit.unit);
        for error in &result.errors {
            outcome.diagnostics.push(Diagnostic::from_check_error(error, 0));
        }
        for warning in &result.warnings {
            outcome.diagnostics.push(Diagnostic::from_check_warning(warning, 0));
        }
        if declaration_failed || result.has_errors() {
            debug!(unit = %outcome.name, errors = outcome.error_count(), "analysis failed");
            outcome.phase = Phase::Failed;
            return;
        }
        outcome.advance(Phase::Analyzed);

        if let Err(error) = self.joint_compile(compile_unit) {
            outcome.fail(error);
            return;
        }
        outcome.advance(Phase::JointCompiled);

        let emitted = match emit_unit(ctx, classes, &result.annotations, &compile_unit.unit) {
            Ok(emitted) => emitted,
            Err(error) => {
                outcome.fail(error);
                return;
            }
        };
        if let Err(error) = self.finish_classes(&emitted, outcome) {
            outcome.fail(error);
            return;
        }
        outcome.classes = emitted;
        outcome.advance(Phase::Emitted);
    }

    fn joint_compile(&self, compile_unit: &CompileUnit) -> CompileResult<()> {
        let joint = &self.config.joint;
        if !joint.enabled || compile_unit.foreign_sources.is_empty() {
            return Ok(());
        }
        let request = JointRequest {
            target_dir: &self.config.target_dir,
            classpath: &self.config.classpath,
            config: joint,
            files: &compile_unit.foreign_sources,
        };
        debug!(
            unit = %compile_unit.unit.name,
            compiler = self.foreign.name(),
            files = compile_unit.foreign_sources.len(),
            "joint compilation"
        );
        self.foreign.compile(&request)?;
        Ok(())
    }

    /// Verify and write emitted classes
    fn finish_classes(&self, emitted: &[EmittedClass], outcome: &mut UnitOutcome) -> CompileResult<()> {
        if self.config.verify {
            for class in emitted {
                verify_class(&class.class)?;
            }
        }
        if !self.write_output {
            return Ok(());
        }
        let target = &self.config.target_dir;
        std::fs::create_dir_all(target).map_err(|source| CompileError::Io {
            path: target.clone(),
            source,
        })?;
        for class in emitted {
            let path = target.join(format!("{}.kcls", class.class.name));
            std::fs::write(&path, class.class.encode()).map_err(|source| CompileError::Io {
                path: path.clone(),
                source,
            })?;
            outcome.written.push(path);
        }
        if outcome.written.is_empty() {
            warn!(unit = %outcome.name, "unit declared no classes");
        }
        Ok(())
    }
}
