//! Kestrel command-line front end
//!
//! `kestrel check` analyzes units, `kestrel compile` writes class files and
//! `kestrel run` compiles in memory and executes a `main` method. Source
//! units are read as JSON documents produced by an external parser.

pub mod commands;
pub mod options;
pub mod output;
pub mod units;

pub use options::CompileOptions;
pub use output::{resolve_color_choice, OutputFormat, Reporter};
pub use units::load_units;
