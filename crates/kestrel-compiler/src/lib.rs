//! Kestrel Compiler - annotated AST to class files
//!
//! This crate implements the bytecode emitter, which picks a static or a
//! dynamic emission path per node, and the driver that runs units through
//! analysis, joint compilation and emission.

pub mod driver;
pub mod emit;
pub mod error;

pub use driver::{
    CompilationReport, CompileUnit, CompilerConfig, ConfigError, Driver, ExitCategory,
    ForeignCompiler, JointCompileError, JointConfig, JointRequest, Phase, ProcessCompiler,
    UnitOutcome,
};
pub use emit::{emit_class, emit_unit, EmissionPath, EmissionReport, EmittedClass};
pub use error::{CompileError, CompileResult};

// Re-export the class-file types callers inspect
pub use kestrel_bytecode::{verify_class, ClassFile, MethodInfo};
