//! Kestrel Bytecode
//!
//! Instruction set, class-file format, constant pool and stack verifier for
//! code emitted by the Kestrel compiler and run by the Kestrel interpreter.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod class_file;
pub mod constants;
pub mod encoder;
pub mod instruction;
pub mod opcode;
pub mod verify;

pub use class_file::{
    flags, CallSiteDescriptor, CallSiteKind, ClassFile, ClassFileError, ClassMode, FieldInfo,
    MethodInfo, MAGIC, VERSION,
};
pub use constants::{Constant, ConstantPool, MemberRef, MethodDescriptor};
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use instruction::{decode_instruction, decode_instructions, disassemble, Instruction, Operand};
pub use opcode::{OperandKind, Opcode};
pub use verify::{stack_effect, verify_class, verify_method, VerifyError};
