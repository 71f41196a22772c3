//! Class-file verification
//!
//! Stack depths are computed with a worklist over the control-flow graph, so
//! every merge point must be reached with the same depth.

use crate::class_file::{ClassFile, MethodInfo};
use crate::constants::{Constant, MethodDescriptor};
use crate::instruction::{decode_instructions, Instruction, Operand};
use crate::opcode::Opcode;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Class-file verification errors
#[derive(Debug, Error, PartialEq)]
pub enum VerifyError {
    /// Code could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Stack underflow
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(usize),

    /// Depth exceeds the recorded `max_stack`
    #[error("Stack overflow at offset {offset} (depth {depth}, max {max})")]
    StackOverflow {
        /// Instruction offset
        offset: usize,
        /// Depth after the instruction
        depth: usize,
        /// Recorded maximum
        max: usize,
    },

    /// Two paths reach an instruction with different depths
    #[error("Stack depth mismatch at offset {offset}: {expected} vs {actual}")]
    StackMismatch {
        /// Merge-point offset
        offset: usize,
        /// Depth recorded first
        expected: usize,
        /// Conflicting depth
        actual: usize,
    },

    /// Branch target is not an instruction boundary
    #[error("Invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget {
        /// Target offset
        target: usize,
        /// Branch offset
        offset: usize,
    },

    /// Missing constant or wrong constant kind
    #[error("Invalid constant pool reference: index {index} at offset {offset} (expected {expected})")]
    InvalidConstantRef {
        /// Pool index
        index: u32,
        /// Instruction offset
        offset: usize,
        /// Expected entry kind
        expected: &'static str,
    },

    /// Call-site index out of range
    #[error("Invalid call site {index} at offset {offset}")]
    InvalidCallSite {
        /// Site index
        index: u32,
        /// Instruction offset
        offset: usize,
    },

    /// Local slot out of range
    #[error("Invalid local variable reference: index {index} (max {max}) at offset {offset}")]
    InvalidLocalRef {
        /// Slot
        index: usize,
        /// `max_locals`
        max: usize,
        /// Instruction offset
        offset: usize,
    },

    /// Unknown primitive or range tag
    #[error("Invalid tag {tag} at offset {offset}")]
    InvalidTag {
        /// Tag byte
        tag: u8,
        /// Instruction offset
        offset: usize,
    },

    /// Return opcode disagrees with the method descriptor
    #[error("Invalid return at offset {0}")]
    InvalidReturn(usize),

    /// Execution falls off the end of the code
    #[error("Execution falls off end of method at offset {0}")]
    FallOffEnd(usize),

    /// Malformed method descriptor
    #[error("Invalid method descriptor: {0}")]
    InvalidDescriptor(String),

    /// Error inside a named method
    #[error("{method}: {error}")]
    InMethod {
        /// Method name and descriptor
        method: String,
        /// Underlying error
        error: Box<VerifyError>,
    },
}

/// Verify every method of a class file
pub fn verify_class(class: &ClassFile) -> Result<(), VerifyError> {
    for method in &class.methods {
        verify_method(class, method).map_err(|error| VerifyError::InMethod {
            method: format!("{}.{}{}", class.name, method.name, method.descriptor),
            error: Box::new(error),
        })?;
    }
    Ok(())
}

/// Verify a single method
pub fn verify_method(class: &ClassFile, method: &MethodInfo) -> Result<(), VerifyError> {
    let descriptor = MethodDescriptor::parse(&method.descriptor)
        .ok_or_else(|| VerifyError::InvalidDescriptor(method.descriptor.clone()))?;

    // Bodiless methods are allowed
    if method.code.is_empty() {
        return Ok(());
    }

    let instructions =
        decode_instructions(&method.code).map_err(|e| VerifyError::Decode(e.to_string()))?;
    let boundaries: FxHashMap<usize, usize> = instructions
        .iter()
        .enumerate()
        .map(|(index, instr)| (instr.offset, index))
        .collect();

    for instr in &instructions {
        if let Some(target) = instr.branch_target() {
            if !boundaries.contains_key(&target) {
                return Err(VerifyError::InvalidJumpTarget {
                    target,
                    offset: instr.offset,
                });
            }
        }
        verify_operands(class, method, instr)?;
        verify_return(&descriptor, instr)?;
    }

    verify_stack_depth(class, method, &instructions, &boundaries)
}

fn verify_operands(
    class: &ClassFile,
    method: &MethodInfo,
    instr: &Instruction,
) -> Result<(), VerifyError> {
    let offset = instr.offset;

    if let Some(slot) = instr.local_slot() {
        if slot >= method.max_locals {
            return Err(VerifyError::InvalidLocalRef {
                index: slot as usize,
                max: method.max_locals as usize,
                offset,
            });
        }
    }

    match (instr.opcode, instr.operand) {
        (Opcode::Box | Opcode::Unbox, Operand::Tag(tag)) if tag > 7 => {
            return Err(VerifyError::InvalidTag { tag, offset })
        }
        (Opcode::ToNumeric, Operand::Tag(tag)) if tag > 8 => {
            return Err(VerifyError::InvalidTag { tag, offset })
        }
        (Opcode::NewRange, Operand::Tag(tag)) if tag > 1 => {
            return Err(VerifyError::InvalidTag { tag, offset })
        }
        (Opcode::InvokeDynamic, Operand::Site(index)) => {
            if index as usize >= class.call_sites.len() {
                return Err(VerifyError::InvalidCallSite { index, offset });
            }
        }
        _ => {}
    }

    let Some(index) = instr.pool_index() else {
        return Ok(());
    };
    let constant = class.constants.get(index);
    let (ok, expected) = match instr.opcode {
        Opcode::Ldc => (constant.map_or(false, Constant::is_loadable), "loadable constant"),
        Opcode::New | Opcode::CheckCast | Opcode::NewArray => {
            (matches!(constant, Some(Constant::Class(_))), "class")
        }
        Opcode::GetField | Opcode::PutField | Opcode::GetStatic | Opcode::PutStatic => {
            (matches!(constant, Some(Constant::Field(_))), "field")
        }
        _ => (
            matches!(constant, Some(Constant::Method(m)) if MethodDescriptor::parse(&m.descriptor).is_some()),
            "method",
        ),
    };
    if ok {
        Ok(())
    } else {
        Err(VerifyError::InvalidConstantRef {
            index,
            offset,
            expected,
        })
    }
}

fn verify_return(descriptor: &MethodDescriptor, instr: &Instruction) -> Result<(), VerifyError> {
    let bad = match instr.opcode {
        Opcode::Return => !descriptor.is_void(),
        Opcode::Ireturn | Opcode::Lreturn | Opcode::Freturn | Opcode::Dreturn | Opcode::Areturn => {
            descriptor.is_void()
        }
        _ => false,
    };
    if bad {
        Err(VerifyError::InvalidReturn(instr.offset))
    } else {
        Ok(())
    }
}

fn verify_stack_depth(
    class: &ClassFile,
    method: &MethodInfo,
    instructions: &[Instruction],
    boundaries: &FxHashMap<usize, usize>,
) -> Result<(), VerifyError> {
    let max = method.max_stack as usize;
    let mut depths: Vec<Option<usize>> = vec![None; instructions.len()];
    let mut worklist = vec![(0usize, 0usize)];

    while let Some((index, depth)) = worklist.pop() {
        let instr = &instructions[index];
        match depths[index] {
            Some(seen) if seen == depth => continue,
            Some(seen) => {
                return Err(VerifyError::StackMismatch {
                    offset: instr.offset,
                    expected: seen,
                    actual: depth,
                })
            }
            None => depths[index] = Some(depth),
        }

        let (pops, pushes) = stack_effect(class, instr);
        if pops > depth {
            return Err(VerifyError::StackUnderflow(instr.offset));
        }
        let after = depth - pops + pushes;
        if after > max {
            return Err(VerifyError::StackOverflow {
                offset: instr.offset,
                depth: after,
                max,
            });
        }

        if let Some(target) = instr.branch_target() {
            if let Some(&target_index) = boundaries.get(&target) {
                worklist.push((target_index, after));
            }
        }
        if instr.opcode.is_terminator() {
            continue;
        }
        let next = index + 1;
        if next >= instructions.len() {
            return Err(VerifyError::FallOffEnd(instr.offset));
        }
        worklist.push((next, after));
    }

    Ok(())
}

/// Operand-stack effect of an instruction as (pops, pushes)
///
/// Invokes read their arity from the referenced method descriptor and
/// `INVOKEDYNAMIC` from the call-site table; unresolvable references count
/// as no effect since operand checks reject them first.
pub fn stack_effect(class: &ClassFile, instr: &Instruction) -> (usize, usize) {
    use Opcode::*;
    match instr.opcode {
        Nop | Iinc | Goto | Return => (0, 0),
        AconstNull | Iconst | Lconst | Fconst | Dconst | Ldc => (0, 1),
        Iload | Lload | Fload | Dload | Aload => (0, 1),
        Istore | Lstore | Fstore | Dstore | Astore => (1, 0),
        Iaload | Laload | Faload | Daload | Baload | Zaload | Caload | Saload | Aaload => (2, 1),
        Iastore | Lastore | Fastore | Dastore | Bastore | Zastore | Castore | Sastore
        | Aastore => (3, 0),
        ArrayLength | NewArray => (1, 1),
        Iadd | Isub | Imul | Idiv | Irem | Ladd | Lsub | Lmul | Ldiv | Lrem | Fadd | Fsub
        | Fmul | Fdiv | Frem | Dadd | Dsub | Dmul | Ddiv | Drem => (2, 1),
        Ineg | Lneg | Fneg | Dneg => (1, 1),
        I2l | I2f | I2d | L2i | L2f | L2d | F2i | F2l | F2d | D2i | D2l | D2f | I2b | I2c
        | I2s | ToNumeric => (1, 1),
        Lcmp | Fcmpl | Dcmpl => (2, 1),
        IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfNull | IfNonNull => (1, 0),
        IfIcmpEq | IfIcmpNe | IfIcmpLt | IfIcmpGe | IfIcmpGt | IfIcmpLe => (2, 0),
        Dup => (1, 2),
        Pop => (1, 0),
        Swap => (2, 2),
        New | GetStatic => (0, 1),
        GetField | CheckCast => (1, 1),
        PutField => (2, 0),
        PutStatic => (1, 0),
        InvokeVirtual | InvokeInterface | InvokeSpecial | InvokeStatic => {
            let descriptor = instr
                .pool_index()
                .and_then(|index| class.constants.method(index))
                .and_then(|m| MethodDescriptor::parse(&m.descriptor));
            match descriptor {
                Some(d) => {
                    let receiver = usize::from(instr.opcode != InvokeStatic);
                    (receiver + d.arity(), usize::from(!d.is_void()))
                }
                None => (0, 0),
            }
        }
        InvokeDynamic => match instr.operand {
            Operand::Site(index) => class
                .call_sites
                .get(index as usize)
                .map(|site| site.kind.stack_effect(site.arg_count))
                .unwrap_or((0, 0)),
            _ => (0, 0),
        },
        Box | Unbox | Truthy | NewRef | RefGet => (1, 1),
        NewList => match instr.operand {
            Operand::Count(n) => (n as usize, 1),
            _ => (0, 1),
        },
        NewRange => (2, 1),
        MakeClosure => match instr.operand {
            Operand::Closure { captures, .. } => (1 + captures as usize, 1),
            _ => (1, 1),
        },
        RefSet => (2, 0),
        Ireturn | Lreturn | Freturn | Dreturn | Areturn => (1, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_file::{flags, CallSiteDescriptor, CallSiteKind};
    use crate::encoder::BytecodeWriter;

    fn method(descriptor: &str, max_locals: u16, max_stack: u16, code: Vec<u8>) -> MethodInfo {
        MethodInfo {
            name: "m".to_string(),
            descriptor: descriptor.to_string(),
            flags: flags::STATIC,
            max_locals,
            max_stack,
            code,
        }
    }

    fn class_with(method: MethodInfo) -> ClassFile {
        let mut class = ClassFile::new("T");
        class.methods.push(method);
        class
    }

    #[test]
    fn test_verify_simple_method() {
        let mut w = BytecodeWriter::new();
        w.emit_local(Opcode::Iload, 0);
        w.emit_iconst(1);
        w.emit_opcode(Opcode::Iadd);
        w.emit_opcode(Opcode::Ireturn);
        let class = class_with(method("(int)int", 1, 2, w.into_bytes()));
        assert_eq!(verify_class(&class), Ok(()));
    }

    #[test]
    fn test_verify_stack_underflow() {
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::Iadd);
        w.emit_opcode(Opcode::Ireturn);
        let class = class_with(method("()int", 0, 2, w.into_bytes()));
        let err = verify_method(&class, &class.methods[0]).unwrap_err();
        assert_eq!(err, VerifyError::StackUnderflow(0));
    }

    #[test]
    fn test_verify_max_stack_exceeded() {
        let mut w = BytecodeWriter::new();
        w.emit_iconst(1);
        w.emit_iconst(2);
        w.emit_opcode(Opcode::Iadd);
        w.emit_opcode(Opcode::Ireturn);
        let class = class_with(method("()int", 0, 1, w.into_bytes()));
        let err = verify_method(&class, &class.methods[0]).unwrap_err();
        assert!(matches!(err, VerifyError::StackOverflow { depth: 2, max: 1, .. }));
    }

    #[test]
    fn test_verify_invalid_local() {
        let mut w = BytecodeWriter::new();
        w.emit_local(Opcode::Iload, 3);
        w.emit_opcode(Opcode::Ireturn);
        let class = class_with(method("()int", 1, 1, w.into_bytes()));
        let err = verify_method(&class, &class.methods[0]).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidLocalRef { index: 3, max: 1, .. }));
    }

    #[test]
    fn test_verify_fall_off_end() {
        let mut w = BytecodeWriter::new();
        w.emit_iconst(1);
        w.emit_opcode(Opcode::Pop);
        let class = class_with(method("()void", 0, 1, w.into_bytes()));
        let err = verify_method(&class, &class.methods[0]).unwrap_err();
        assert_eq!(err, VerifyError::FallOffEnd(5));
    }

    #[test]
    fn test_verify_merge_mismatch() {
        // if (x) push 1; then join with nothing pushed on the other path
        let mut w = BytecodeWriter::new();
        w.emit_local(Opcode::Iload, 0);
        let skip = w.emit_branch(Opcode::IfEq);
        w.emit_iconst(1);
        let join = w.offset();
        w.patch_branch(skip, join);
        w.emit_opcode(Opcode::Return);
        let class = class_with(method("(int)void", 1, 2, w.into_bytes()));
        let err = verify_method(&class, &class.methods[0]).unwrap_err();
        assert!(matches!(err, VerifyError::StackMismatch { .. }));
    }

    #[test]
    fn test_verify_jump_into_operand() {
        let mut w = BytecodeWriter::new();
        let operand = w.emit_branch(Opcode::Goto);
        w.emit_iconst(0);
        w.emit_opcode(Opcode::Return);
        w.patch_branch(operand, 6);
        let class = class_with(method("()void", 0, 1, w.into_bytes()));
        let err = verify_method(&class, &class.methods[0]).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidJumpTarget { target: 6, .. }));
    }

    #[test]
    fn test_verify_pool_kind() {
        let mut class = ClassFile::new("T");
        let text = class.constants.add_string("x");
        let mut w = BytecodeWriter::new();
        w.emit_pool(Opcode::New, text);
        w.emit_opcode(Opcode::Areturn);
        class.methods.push(method("()Object", 0, 1, w.into_bytes()));
        let err = verify_method(&class, &class.methods[0]).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidConstantRef { expected: "class", .. }));
    }

    #[test]
    fn test_verify_invoke_arity() {
        let mut class = ClassFile::new("T");
        let target = class.constants.add_method("T", "add", "(int,int)int");
        let site = class.add_call_site(CallSiteDescriptor::new("size", 0, CallSiteKind::Method));

        let mut w = BytecodeWriter::new();
        w.emit_iconst(1);
        w.emit_iconst(2);
        w.emit_pool(Opcode::InvokeStatic, target);
        w.emit_tag(Opcode::Box, 4);
        w.emit_invoke_dynamic(site);
        w.emit_opcode(Opcode::Areturn);
        let code = w.into_bytes();

        class.methods.push(method("()Object", 0, 2, code));
        assert_eq!(verify_class(&class), Ok(()));
    }

    #[test]
    fn test_verify_return_kind() {
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::Return);
        let class = class_with(method("()int", 0, 0, w.into_bytes()));
        let err = verify_class(&class).unwrap_err();
        match err {
            VerifyError::InMethod { method, error } => {
                assert_eq!(method, "T.m()int");
                assert_eq!(*error, VerifyError::InvalidReturn(0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
