//! `kestrel compile`: full driver run writing class files

use crate::options::CompileOptions;
use crate::output::Reporter;
use crate::units::load_units;
use kestrel_compiler::{CompilationReport, CompileUnit, Driver};
use std::path::PathBuf;

pub fn execute(files: &[PathBuf], options: &CompileOptions, reporter: &mut Reporter) -> anyhow::Result<CompilationReport> {
    let config = options.resolve()?;
    let units = load_units(files)?;
    let report = Driver::new(config)
        .compile_all(units.into_iter().map(CompileUnit::new).collect());
    print_report(&report, reporter)?;
    Ok(report)
}

/// Diagnostics then a summary line for every unit
pub(crate) fn print_report(report: &CompilationReport, reporter: &mut Reporter) -> std::io::Result<()> {
    for outcome in &report.units {
        reporter.diagnostics(&outcome.name, &outcome.diagnostics, outcome.files())?;
        reporter.unit_summary(outcome)?;
    }
    reporter.finish(report.error_count())
}
