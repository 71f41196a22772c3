//! Compiler configuration (kestrel.toml)

use kestrel_ast::CompileMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Compiler configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Directory receiving `.kcls` files
    pub target_dir: PathBuf,

    /// Classpath entries, forwarded to the foreign compiler
    pub classpath: Vec<PathBuf>,

    /// Verify emitted classes before writing them
    pub verify: bool,

    /// `static` forces every class into static mode; `dynamic` keeps the
    /// mode each class declares
    pub default_mode: CompileMode,

    /// Joint compilation settings
    pub joint: JointConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("."),
            classpath: Vec::new(),
            verify: true,
            default_mode: CompileMode::Dynamic,
            joint: JointConfig::default(),
        }
    }
}

/// Foreign-compiler settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct JointConfig {
    /// Run the foreign compiler for units that carry foreign sources
    pub enabled: bool,

    /// Executable to launch
    pub compiler: String,

    /// Passed as `-sourcepath`
    pub stub_dir: PathBuf,

    /// Extra flags, passed as `-<flag>`
    pub flags: Vec<String>,

    /// Named options, passed as `-<name> <value>`
    pub named_values: Vec<(String, String)>,

    /// Capture the compiler's stdout/stderr and attach it to errors
    pub capture_output: bool,
}

impl Default for JointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            compiler: "javac".to_string(),
            stub_dir: PathBuf::from("stubs"),
            flags: Vec::new(),
            named_values: Vec::new(),
            capture_output: true,
        }
    }
}

impl CompilerConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse configuration text; `origin` names it in errors
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Mode a class is compiled in under this configuration
    pub fn effective_mode(&self, declared: CompileMode) -> CompileMode {
        match self.default_mode {
            CompileMode::Static => CompileMode::Static,
            CompileMode::Dynamic => declared,
        }
    }
}
