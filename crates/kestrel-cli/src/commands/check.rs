//! `kestrel check`: analyze units without emitting code

use crate::options::CompileOptions;
use crate::output::Reporter;
use crate::units::load_units;
use kestrel_checker::{annotate, create_files, ClassTable, Diagnostic};
use kestrel_types::TypeContext;
use std::path::PathBuf;
use tracing::debug;

/// Error and warning totals of a check run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub errors: usize,
    pub warnings: usize,
}

pub fn execute(files: &[PathBuf], options: &CompileOptions, reporter: &mut Reporter) -> anyhow::Result<CheckSummary> {
    let config = options.resolve()?;
    let mut units = load_units(files)?;
    for unit in &mut units {
        for class in &mut unit.classes {
            class.mode = config.effective_mode(class.mode);
        }
    }

    let mut ctx = TypeContext::new();
    let mut classes = ClassTable::with_builtins(&mut ctx);
    for unit in &units {
        classes.declare_classes(&mut ctx, unit);
    }
    let declaration_errors: Vec<_> = units
        .iter()
        .map(|unit| classes.declare_members(&mut ctx, unit))
        .collect();

    let mut summary = CheckSummary::default();
    for (unit, declared) in units.iter_mut().zip(declaration_errors) {
        let result = annotate(&mut ctx, &classes, unit);
        let diagnostics: Vec<Diagnostic> = declared
            .iter()
            .chain(&result.errors)
            .map(|error| Diagnostic::from_check_error(error, 0))
            .chain(result.warnings.iter().map(|warning| Diagnostic::from_check_warning(warning, 0)))
            .collect();
        summary.errors += declared.len() + result.errors.len();
        summary.warnings += result.warnings.len();
        debug!(unit = %unit.name, errors = summary.errors, "checked");

        let files = create_files(
            unit.path.clone().unwrap_or_else(|| unit.name.clone()),
            unit.source.clone().unwrap_or_default(),
        );
        reporter.diagnostics(&unit.name, &diagnostics, &files)?;
    }
    reporter.finish(summary.errors)?;
    Ok(summary)
}
