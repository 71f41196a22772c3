//! Joint compilation with a foreign compiler
//!
//! Foreign sources referenced by a unit are handed to an external compiler
//! after analysis and before emission. Any failure is fatal to the unit.

use super::config::JointConfig;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

/// Mapped exit status of a foreign compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCategory {
    /// Exit code 0
    Ok,
    /// Exit code 1: errors in the foreign sources
    CompileError,
    /// Exit code 2: bad command line
    InvalidUsage,
    /// Exit code 3
    SystemError,
    /// Exit code 4: the compiler itself crashed
    Abnormal,
    /// Any other status, including death by signal
    Unexpected(Option<i32>),
}

impl ExitCategory {
    /// Category of a process exit code; `None` means killed by a signal
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitCategory::Ok,
            Some(1) => ExitCategory::CompileError,
            Some(2) => ExitCategory::InvalidUsage,
            Some(3) => ExitCategory::SystemError,
            Some(4) => ExitCategory::Abnormal,
            other => ExitCategory::Unexpected(other),
        }
    }

    /// Whether the compiler succeeded
    pub fn is_ok(self) -> bool {
        self == ExitCategory::Ok
    }
}

impl fmt::Display for ExitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCategory::Ok => write!(f, "success"),
            ExitCategory::CompileError => write!(f, "compile error"),
            ExitCategory::InvalidUsage => write!(f, "invalid usage"),
            ExitCategory::SystemError => write!(f, "system error"),
            ExitCategory::Abnormal => write!(f, "abnormal termination"),
            ExitCategory::Unexpected(Some(code)) => write!(f, "unexpected exit status {}", code),
            ExitCategory::Unexpected(None) => write!(f, "terminated by signal"),
        }
    }
}

/// Why joint compilation stopped a unit
#[derive(Debug, Error)]
pub enum JointCompileError {
    #[error("Joint compilation with {compiler} failed: {category}")]
    Failed {
        compiler: String,
        category: ExitCategory,
        /// Captured output, or a note saying where it went
        diagnostics: String,
    },

    #[error("Failed to launch {compiler}: {source}")]
    Launch {
        compiler: String,
        #[source]
        source: std::io::Error,
    },
}

impl JointCompileError {
    /// Diagnostic text attached to the failure
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            JointCompileError::Failed { diagnostics, .. } => Some(diagnostics),
            JointCompileError::Launch { .. } => None,
        }
    }
}

/// One foreign-compiler invocation
#[derive(Debug, Clone)]
pub struct JointRequest<'a> {
    /// Where foreign class files go
    pub target_dir: &'a Path,
    /// Joined with the platform separator unless a named `classpath` overrides it
    pub classpath: &'a [PathBuf],
    /// Flags and named values
    pub config: &'a JointConfig,
    /// Foreign sources, passed last
    pub files: &'a [PathBuf],
}

impl JointRequest<'_> {
    /// `-d <target> -sourcepath <stubs> -<flag>... -<name> <value>...
    /// [-classpath <cp>] <files...>`
    pub fn arguments(&self) -> Vec<String> {
        let mut args = vec![
            "-d".to_string(),
            self.target_dir.display().to_string(),
            "-sourcepath".to_string(),
            self.config.stub_dir.display().to_string(),
        ];
        args.extend(self.config.flags.iter().map(|flag| format!("-{}", flag)));
        let mut explicit_classpath = false;
        for (name, value) in &self.config.named_values {
            explicit_classpath |= name == "classpath";
            args.push(format!("-{}", name));
            args.push(value.clone());
        }
        if !explicit_classpath && !self.classpath.is_empty() {
            args.push("-classpath".to_string());
            args.push(join_classpath(self.classpath));
        }
        args.extend(self.files.iter().map(|file| file.display().to_string()));
        args
    }
}

fn join_classpath(entries: &[PathBuf]) -> String {
    let separator = if cfg!(windows) { ";" } else { ":" };
    entries
        .iter()
        .map(|entry| entry.display().to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

/// A compiler for foreign sources
pub trait ForeignCompiler: Send + Sync {
    /// Name shown in diagnostics
    fn name(&self) -> &str;

    /// Compile `request.files`; any failure is fatal to the unit
    fn compile(&self, request: &JointRequest<'_>) -> Result<(), JointCompileError>;
}

/// Runs the configured compiler as a blocking subprocess
#[derive(Debug, Clone, Default)]
pub struct ProcessCompiler;

impl ForeignCompiler for ProcessCompiler {
    fn name(&self) -> &str {
        "process"
    }

    fn compile(&self, request: &JointRequest<'_>) -> Result<(), JointCompileError> {
        let program = &request.config.compiler;
        let args = request.arguments();
        debug!(compiler = %program, ?args, "launching foreign compiler");

        let mut command = Command::new(program);
        command.args(&args).stdin(Stdio::null());
        let launch = |source: std::io::Error| JointCompileError::Launch {
            compiler: program.clone(),
            source,
        };

        let (category, diagnostics) = if request.config.capture_output {
            let output = command.output().map_err(launch)?;
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            (ExitCategory::from_code(output.status.code()), text)
        } else {
            let status = command.status().map_err(launch)?;
            (
                ExitCategory::from_code(status.code()),
                "diagnostics were written to the standard error stream".to_string(),
            )
        };

        if category.is_ok() {
            if request.config.capture_output {
                for line in diagnostics.lines().filter(|l| !l.trim().is_empty()) {
                    warn!(compiler = %program, "{}", line);
                }
            }
            return Ok(());
        }
        Err(JointCompileError::Failed {
            compiler: program.clone(),
            category,
            diagnostics,
        })
    }
}
