//! Compiler settings from a config file and command-line flags

use anyhow::Context;
use clap::Args;
use kestrel_ast::CompileMode;
use kestrel_compiler::CompilerConfig;
use std::path::PathBuf;

/// Flags shared by every command that compiles
#[derive(Args, Debug, Clone, Default)]
pub struct CompileOptions {
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory receiving class files
    #[arg(long)]
    pub target_dir: Option<PathBuf>,

    /// Classpath entry for the foreign compiler (repeatable)
    #[arg(long)]
    pub classpath: Vec<PathBuf>,

    /// Compile every class in static mode
    #[arg(long = "static")]
    pub force_static: bool,

    /// Skip verification of emitted classes
    #[arg(long)]
    pub no_verify: bool,
}

impl CompileOptions {
    /// Configuration file (or defaults) with the flags applied on top
    pub fn resolve(&self) -> anyhow::Result<CompilerConfig> {
        let mut config = match &self.config {
            Some(path) => CompilerConfig::load(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => CompilerConfig::default(),
        };
        if let Some(target_dir) = &self.target_dir {
            config.target_dir = target_dir.clone();
        }
        if !self.classpath.is_empty() {
            config.classpath = self.classpath.clone();
        }
        if self.force_static {
            config.default_mode = CompileMode::Static;
        }
        if self.no_verify {
            config.verify = false;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = CompileOptions::default().resolve().unwrap();
        assert_eq!(config, CompilerConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kestrel.toml");
        std::fs::write(&path, "target_dir = \"out\"\nverify = true\nclasspath = [\"lib\"]\n").unwrap();

        let options = CompileOptions {
            config: Some(path.clone()),
            target_dir: Some(PathBuf::from("build")),
            force_static: true,
            no_verify: true,
            ..Default::default()
        };
        let config = options.resolve().unwrap();
        assert_eq!(config.target_dir, PathBuf::from("build"));
        assert_eq!(config.classpath, vec![PathBuf::from("lib")]);
        assert_eq!(config.default_mode, CompileMode::Static);
        assert!(!config.verify);

        let file_only = CompileOptions {
            config: Some(path),
            ..Default::default()
        };
        assert_eq!(file_only.resolve().unwrap().target_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_missing_config_is_reported() {
        let options = CompileOptions {
            config: Some(PathBuf::from("/nonexistent/kestrel.toml")),
            ..Default::default()
        };
        let err = options.resolve().unwrap_err();
        assert!(err.to_string().contains("kestrel.toml"));
    }
}
