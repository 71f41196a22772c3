//! Source-located reports of checker findings
//!
//! [`CheckError`]s and [`CheckWarning`]s become codespan diagnostics carrying
//! a stable code. They render to a terminal or to one JSON document each.

use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label, LabelStyle, Severity};
use codespan_reporting::files::{Files, SimpleFiles};
use codespan_reporting::term;
use kestrel_ast::Span;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use termcolor::{ColorChoice, StandardStream, WriteColor};

use crate::error::{CheckError, CheckWarning};

/// Stable identifier of a finding, `E2xxx` for errors and `W1xxx` for warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    /// Code text
    pub fn as_str(&self) -> &str {
        self.0
    }
}

/// A finding plus the source ranges it points at
#[derive(Debug, Clone)]
pub struct Diagnostic {
    inner: CsDiagnostic<usize>,
    code: Option<ErrorCode>,
}

impl Diagnostic {
    /// Uncoded, unlabelled diagnostic
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            inner: CsDiagnostic::new(severity).with_message(message),
            code: None,
        }
    }

    /// Error severity
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Warning severity
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// A fault inside the compiler rather than in the program
    pub fn bug(message: impl Into<String>) -> Self {
        Self::new(Severity::Bug, message)
    }

    /// Attach a stable code
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.inner = self.inner.with_code(code.0);
        self.code = Some(code);
        self
    }

    /// Point at the offending range
    pub fn with_primary_label(self, file_id: usize, span: Span, message: impl Into<String>) -> Self {
        self.labelled(LabelStyle::Primary, file_id, span, message.into())
    }

    /// Point at a range that explains the primary one
    pub fn with_secondary_label(self, file_id: usize, span: Span, message: impl Into<String>) -> Self {
        self.labelled(LabelStyle::Secondary, file_id, span, message.into())
    }

    /// Append a free-form note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.inner.notes.push(note.into());
        self
    }

    /// A note phrased as a suggested fix
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.inner.notes.push(format!("help: {}", help.into()));
        self
    }

    fn labelled(mut self, style: LabelStyle, file_id: usize, span: Span, message: String) -> Self {
        let range = span.start as usize..span.end as usize;
        self.inner
            .labels
            .push(Label::new(style, file_id, range).with_message(message));
        self
    }

    /// Severity level
    pub fn severity(&self) -> Severity {
        self.inner.severity
    }

    /// Headline message
    pub fn message(&self) -> &str {
        &self.inner.message
    }

    /// Stable code, if one was attached
    pub fn code(&self) -> Option<&ErrorCode> {
        self.code.as_ref()
    }

    /// Notes and help lines, in the order they were added
    pub fn notes(&self) -> &[String] {
        &self.inner.notes
    }

    /// Coded diagnostic labelled at the error's span
    pub fn from_check_error(error: &CheckError, file_id: usize) -> Self {
        use CheckError::*;

        let base = Diagnostic::error(error.to_string()).with_code(error_code(error));
        let (span, label) = match error {
            UndefinedVariable { span, .. } => (span, "not found in this scope".to_string()),
            UndefinedType { span, .. } => (span, "unknown type".to_string()),
            DuplicateVariable { span, .. } => (span, "already declared in this scope".to_string()),
            MethodNotFound { span, .. } => {
                return base
                    .with_primary_label(file_id, *span, "no applicable method")
                    .with_help("declare the receiver as 'def' to dispatch at runtime");
            }
            AmbiguousMethod { candidates, span, .. } => {
                return base
                    .with_primary_label(file_id, *span, "more than one overload applies")
                    .with_note(format!("candidates: {}", candidates.join(", ")))
                    .with_help("cast an argument to select an overload");
            }
            PropertyNotFound { span, .. } => (span, "no such property".to_string()),
            NotCallable { span, .. } => (span, "this value cannot be invoked".to_string()),
            IncompatibleAssignment { expected, actual, span }
            | ReturnTypeMismatch { expected, actual, span } => {
                (span, format!("expected '{}', found '{}'", expected, actual))
            }
            InvalidCast { span, .. } => (span, "cast can never succeed".to_string()),
            InvalidBinaryOp { span, .. } | InvalidUnaryOp { span, .. } => {
                (span, "operator not defined for these operands".to_string())
            }
            NotIndexable { span, .. } => (span, "cannot be indexed".to_string()),
            InvalidRange { span, .. } => {
                return base
                    .with_primary_label(file_id, *span, "range bounds rejected")
                    .with_note("string ranges step by incrementing the last character");
            }
            ThisInStaticContext { span } => (span, "static methods have no receiver".to_string()),
            InvalidHierarchy { span, .. } => (span, "declared here".to_string()),
            InvalidAssignmentTarget { span } => (span, "not a variable, property or element".to_string()),
            BreakOutsideLoop { span } | ContinueOutsideLoop { span } => (span, "no enclosing loop".to_string()),
        };
        base.with_primary_label(file_id, *span, label)
    }

    /// Warning diagnostic labelled at the warning's span
    pub fn from_check_warning(warning: &CheckWarning, file_id: usize) -> Self {
        Diagnostic::warning(warning.message())
            .with_code(ErrorCode(warning.code().as_str()))
            .with_primary_label(file_id, warning.span(), "resolved at runtime")
    }

    /// Render with source snippets
    pub fn emit_to(
        &self,
        writer: &mut dyn WriteColor,
        files: &SimpleFiles<String, String>,
    ) -> Result<(), codespan_reporting::files::Error> {
        term::emit(writer, &term::Config::default(), files, &self.inner)
    }

    /// Render to stderr
    pub fn emit(
        &self,
        files: &SimpleFiles<String, String>,
        color: ColorChoice,
    ) -> Result<(), codespan_reporting::files::Error> {
        self.emit_to(&mut StandardStream::stderr(color), files)
    }

    /// The codespan diagnostic being wrapped
    pub fn inner(&self) -> &CsDiagnostic<usize> {
        &self.inner
    }

    /// Single-line JSON document; labels outside the known files are dropped
    pub fn to_json(&self, files: &SimpleFiles<String, String>) -> Result<String, serde_json::Error> {
        serde_json::to_string(&DiagnosticRecord::new(self, files))
    }
}

/// Serialized form of a [`Diagnostic`]
#[derive(Debug, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// Stable code, `E2xxx` or `W1xxx`
    pub code: Option<String>,
    /// `bug`, `error`, `warning`, `note` or `help`
    pub severity: String,
    /// Headline message
    pub message: String,
    /// Labels that could be located in the source
    pub labels: Vec<LabelRecord>,
    /// Notes and help lines
    pub notes: Vec<String>,
}

/// Serialized label; lines and columns count from 1
#[derive(Debug, Serialize, Deserialize)]
pub struct LabelRecord {
    /// File name as registered with the file database
    pub file: String,
    /// Line of the first byte
    pub start_line: usize,
    /// Column of the first byte
    pub start_column: usize,
    /// Line just past the range
    pub end_line: usize,
    /// Column just past the range
    pub end_column: usize,
    /// Label text
    pub message: String,
    /// `primary` or `secondary`
    pub style: String,
}

impl DiagnosticRecord {
    /// Locate every label of `diag` in `files`
    pub fn new(diag: &Diagnostic, files: &SimpleFiles<String, String>) -> Self {
        let labels = diag
            .inner
            .labels
            .iter()
            .filter_map(|label| locate(label, files))
            .collect();
        DiagnosticRecord {
            code: diag.code.map(|code| code.0.to_string()),
            severity: severity_name(diag.inner.severity).to_string(),
            message: diag.inner.message.clone(),
            labels,
            notes: diag.inner.notes.clone(),
        }
    }
}

fn locate(label: &Label<usize>, files: &SimpleFiles<String, String>) -> Option<LabelRecord> {
    let file = files.get(label.file_id).ok()?;
    let start = file.location((), label.range.start).ok()?;
    let end = file.location((), label.range.end).ok()?;
    let style = match label.style {
        LabelStyle::Primary => "primary",
        LabelStyle::Secondary => "secondary",
    };
    Some(LabelRecord {
        file: file.name().to_string(),
        start_line: start.line_number,
        start_column: start.column_number,
        end_line: end.line_number,
        end_column: end.column_number,
        message: label.message.clone(),
        style: style.to_string(),
    })
}

fn severity_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Bug => "bug",
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Note => "note",
        Severity::Help => "help",
    }
}

/// Code reported for each kind of checker error. Codes are never reused.
pub fn error_code(error: &CheckError) -> ErrorCode {
    use CheckError::*;

    ErrorCode(match error {
        UndefinedVariable { .. } => "E2001",
        UndefinedType { .. } => "E2002",
        DuplicateVariable { .. } => "E2003",
        IncompatibleAssignment { .. } => "E2004",
        ReturnTypeMismatch { .. } => "E2005",
        InvalidCast { .. } => "E2006",
        MethodNotFound { .. } => "E2007",
        AmbiguousMethod { .. } => "E2008",
        PropertyNotFound { .. } => "E2009",
        NotCallable { .. } => "E2010",
        NotIndexable { .. } => "E2011",
        InvalidBinaryOp { .. } => "E2012",
        InvalidUnaryOp { .. } => "E2013",
        InvalidRange { .. } => "E2014",
        ThisInStaticContext { .. } => "E2015",
        InvalidAssignmentTarget { .. } => "E2016",
        BreakOutsideLoop { .. } => "E2017",
        ContinueOutsideLoop { .. } => "E2018",
        InvalidHierarchy { .. } => "E2019",
    })
}

/// A one-file database for rendering diagnostics of a single unit
pub fn create_files(path: impl Into<PathBuf>, source: impl Into<String>) -> SimpleFiles<String, String> {
    let mut files = SimpleFiles::new();
    files.add(path.into().display().to_string(), source.into());
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::Buffer;

    fn mismatch() -> CheckError {
        CheckError::IncompatibleAssignment {
            expected: "int".to_string(),
            actual: "String".to_string(),
            span: Span::new(8, 13, 1, 9),
        }
    }

    #[test]
    fn test_error_carries_code_and_label() {
        let diag = Diagnostic::from_check_error(&mismatch(), 0);
        assert_eq!(diag.severity(), Severity::Error);
        assert_eq!(diag.code(), Some(&ErrorCode("E2004")));
        assert!(diag.message().contains("String"));
        assert_eq!(diag.inner().labels[0].message, "expected 'int', found 'String'");
    }

    #[test]
    fn test_ambiguous_lists_candidates() {
        let error = CheckError::AmbiguousMethod {
            method: "pick".into(),
            ty: "Chooser".into(),
            candidates: vec!["pick(Integer, int)".into(), "pick(int, Integer)".into()],
            span: Span::new(0, 4, 1, 1),
        };
        let diag = Diagnostic::from_check_error(&error, 0);
        assert!(diag.notes()[0].contains("pick(Integer, int)"));
        assert!(diag.notes()[1].starts_with("help: "));
    }

    #[test]
    fn test_json_record_locates_label() {
        let error = CheckError::UndefinedVariable {
            name: "foo".to_string(),
            span: Span::new(8, 11, 1, 9),
        };
        let files = create_files("Test.kst", "int x = foo");
        let json = Diagnostic::from_check_error(&error, 0).to_json(&files).unwrap();
        assert!(!json.contains('\n'));

        let record: DiagnosticRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record.code.as_deref(), Some("E2001"));
        assert_eq!(record.severity, "error");
        assert_eq!(record.labels[0].file, "Test.kst");
        assert_eq!((record.labels[0].start_column, record.labels[0].end_column), (9, 12));
        assert_eq!(record.labels[0].style, "primary");
    }

    #[test]
    fn test_render_includes_snippet() {
        let files = create_files("Test.kst", "int x = \"hello\"");
        let mut buffer = Buffer::no_color();
        Diagnostic::from_check_error(&mismatch(), 0)
            .emit_to(&mut buffer, &files)
            .unwrap();
        let text = String::from_utf8(buffer.into_inner()).unwrap();
        assert!(text.contains("E2004"));
        assert!(text.contains("Test.kst:1:9"));
    }

    #[test]
    fn test_warning_diagnostic() {
        let warning = CheckWarning::DynamicFallback {
            member: "method 'shout'".into(),
            ty: "String".into(),
            span: Span::new(0, 5, 1, 1),
        };
        let diag = Diagnostic::from_check_warning(&warning, 0);
        assert_eq!(diag.severity(), Severity::Warning);
        assert_eq!(diag.code(), Some(&ErrorCode("W1001")));
    }
}
