//! Colored terminal output and machine-readable reports.
//!
//! Uses `termcolor` for terminal output. Respects the `NO_COLOR`
//! environment variable and the `--color` flag.

use clap::ValueEnum;
use codespan_reporting::files::SimpleFiles;
use kestrel_checker::Diagnostic;
use kestrel_compiler::UnitOutcome;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from CLI flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// How diagnostics and summaries are printed
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Rendered source snippets on stderr
    #[default]
    Pretty,
    /// One JSON document per diagnostic and per unit on stdout
    Json,
}

/// Writes diagnostics and unit summaries in the selected format
pub struct Reporter {
    format: OutputFormat,
    out: Box<dyn WriteColor>,
    err: Box<dyn WriteColor>,
}

impl Reporter {
    pub fn new(format: OutputFormat, choice: ColorChoice) -> Self {
        Self {
            format,
            out: Box::new(StandardStream::stdout(choice)),
            err: Box::new(StandardStream::stderr(choice)),
        }
    }

    /// Report into arbitrary writers
    pub fn with_writers(format: OutputFormat, out: Box<dyn WriteColor>, err: Box<dyn WriteColor>) -> Self {
        Self { format, out, err }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Print diagnostics of one unit
    pub fn diagnostics(
        &mut self,
        unit: &str,
        diagnostics: &[Diagnostic],
        files: &SimpleFiles<String, String>,
    ) -> io::Result<()> {
        for diagnostic in diagnostics {
            match self.format {
                OutputFormat::Pretty => {
                    if diagnostic.emit_to(self.err.as_mut(), files).is_err() {
                        writeln!(self.err, "{}: {}", unit, diagnostic.message())?;
                    }
                }
                OutputFormat::Json => {
                    let json = diagnostic.to_json(files).map_err(io::Error::other)?;
                    writeln!(self.out, "{}", json)?;
                }
            }
        }
        Ok(())
    }

    /// One line per compiled unit
    pub fn unit_summary(&mut self, outcome: &UnitOutcome) -> io::Result<()> {
        match self.format {
            OutputFormat::Pretty => {
                let (label, color) = if outcome.is_success() {
                    ("compiled", Color::Green)
                } else {
                    ("failed", Color::Red)
                };
                self.styled(&format!("{:>10}", label), color)?;
                write!(self.out, " {}", outcome.name)?;
                let classes = outcome.classes.len();
                write!(self.out, " ({} class{}", classes, plural(classes, "es"))?;
                if outcome.error_count() > 0 {
                    write!(self.out, ", {} error{}", outcome.error_count(), plural(outcome.error_count(), "s"))?;
                }
                if outcome.warning_count() > 0 {
                    write!(
                        self.out,
                        ", {} warning{}",
                        outcome.warning_count(),
                        plural(outcome.warning_count(), "s")
                    )?;
                }
                writeln!(self.out, ")")
            }
            OutputFormat::Json => {
                let summary = serde_json::json!({
                    "unit": outcome.name,
                    "phase": outcome.phase.to_string(),
                    "errors": outcome.error_count(),
                    "warnings": outcome.warning_count(),
                    "classes": outcome.classes.iter().map(|c| c.class.name.clone()).collect::<Vec<_>>(),
                    "written": outcome.written.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                });
                writeln!(self.out, "{}", summary)
            }
        }
    }

    /// Closing line with the error total; silent in JSON mode
    pub fn finish(&mut self, errors: usize) -> io::Result<()> {
        if self.format == OutputFormat::Json {
            return Ok(());
        }
        if errors == 0 {
            return Ok(());
        }
        self.styled_err("error", Color::Red)?;
        writeln!(self.err, ": aborting due to {} error{}", errors, plural(errors, "s"))
    }

    /// Report a failure that ended the command
    pub fn fatal(&mut self, message: &str) -> io::Result<()> {
        self.styled_err("error", Color::Red)?;
        writeln!(self.err, ": {}", message)
    }

    fn styled(&mut self, text: &str, color: Color) -> io::Result<()> {
        self.out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        write!(self.out, "{}", text)?;
        self.out.reset()
    }

    fn styled_err(&mut self, text: &str, color: Color) -> io::Result<()> {
        self.err.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        write!(self.err, "{}", text)?;
        self.err.reset()
    }
}

fn plural(count: usize, suffix: &'static str) -> &'static str {
    if count == 1 {
        ""
    } else {
        suffix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_checker::create_files;
    use termcolor::Buffer;

    #[test]
    fn test_color_flag() {
        if std::env::var_os("NO_COLOR").is_some() {
            return;
        }
        assert_eq!(resolve_color_choice(Some("always")), ColorChoice::Always);
        assert_eq!(resolve_color_choice(Some("never")), ColorChoice::Never);
        assert_eq!(resolve_color_choice(None), ColorChoice::Auto);
        assert_eq!(resolve_color_choice(Some("sometimes")), ColorChoice::Auto);
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1, "es"), "");
        assert_eq!(plural(0, "es"), "es");
        assert_eq!(plural(2, "s"), "s");
    }

    #[test]
    fn test_pretty_diagnostic_without_source_falls_back() {
        let files = create_files("Main", "");
        let diagnostic = Diagnostic::error("bad thing");
        let mut reporter = Reporter::with_writers(
            OutputFormat::Pretty,
            Box::new(Buffer::no_color()),
            Box::new(Buffer::no_color()),
        );
        reporter.diagnostics("Main", &[diagnostic], &files).unwrap();
    }
}
