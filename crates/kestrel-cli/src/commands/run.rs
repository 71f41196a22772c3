//! `kestrel run`: compile in memory and execute a `main` method

use crate::commands::compile::print_report;
use crate::options::CompileOptions;
use crate::output::Reporter;
use crate::units::load_units;
use anyhow::Context;
use kestrel_compiler::{CompileUnit, Driver};
use kestrel_runtime::Interpreter;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// Run `main` of `main_class`, writing program output to `output`.
/// Returns false when compilation failed.
pub fn execute(
    files: &[PathBuf],
    main_class: &str,
    options: &CompileOptions,
    reporter: &mut Reporter,
    output: impl Write + Send + 'static,
) -> anyhow::Result<bool> {
    let config = options.resolve()?;
    let verify = config.verify;
    let units = load_units(files)?;
    let report = Driver::new(config)
        .in_memory()
        .compile_all(units.into_iter().map(CompileUnit::new).collect());
    if !report.is_success() {
        print_report(&report, reporter)?;
        return Ok(false);
    }
    for outcome in &report.units {
        reporter.diagnostics(&outcome.name, &outcome.diagnostics, outcome.files())?;
    }

    let mut interp = Interpreter::new().with_output(output);
    if !verify {
        interp = interp.without_verification();
    }
    interp
        .load_all(report.classes().map(|emitted| emitted.class.clone()))
        .context("failed to load compiled classes")?;
    debug!(class = main_class, "running main");
    interp
        .run_main(main_class)
        .with_context(|| format!("{}.main failed", main_class))?;
    Ok(true)
}
