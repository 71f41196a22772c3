//! Decoded instructions
//!
//! The verifier, the interpreter and the disassembler all work on this form
//! rather than re-reading raw bytes.

use crate::encoder::{BytecodeReader, DecodeError};
use crate::opcode::{OperandKind, Opcode};
use std::fmt;

/// Operand of a decoded instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// `i32` immediate
    I32(i32),
    /// `i64` immediate
    I64(i64),
    /// `f32` immediate
    F32(f32),
    /// `f64` immediate
    F64(f64),
    /// Local slot
    Local(u16),
    /// Local slot and increment
    Iinc {
        /// Slot
        slot: u16,
        /// Increment
        delta: i16,
    },
    /// Constant-pool index
    Pool(u32),
    /// Absolute branch target
    Branch(usize),
    /// One-byte tag
    Tag(u8),
    /// Element count
    Count(u16),
    /// Closure method and capture count
    Closure {
        /// Method reference
        method: u32,
        /// Number of captured cells
        captures: u16,
    },
    /// Call-site index
    Site(u32),
}

/// A decoded instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    /// Byte offset of the opcode
    pub offset: usize,
    /// Opcode
    pub opcode: Opcode,
    /// Operand
    pub operand: Operand,
}

impl Instruction {
    /// Offset of the following instruction
    pub fn next_offset(&self) -> usize {
        self.offset + self.opcode.encoded_size()
    }

    /// Absolute target of a branch
    pub fn branch_target(&self) -> Option<usize> {
        match self.operand {
            Operand::Branch(target) => Some(target),
            _ => None,
        }
    }

    /// Constant-pool index operand, if any
    pub fn pool_index(&self) -> Option<u32> {
        match self.operand {
            Operand::Pool(index) => Some(index),
            Operand::Closure { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Local slot operand, if any
    pub fn local_slot(&self) -> Option<u16> {
        match self.operand {
            Operand::Local(slot) | Operand::Iinc { slot, .. } => Some(slot),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5}: {}", self.offset, self.opcode)?;
        match self.operand {
            Operand::None => Ok(()),
            Operand::I32(v) => write!(f, " {}", v),
            Operand::I64(v) => write!(f, " {}L", v),
            Operand::F32(v) => write!(f, " {}f", v),
            Operand::F64(v) => write!(f, " {}d", v),
            Operand::Local(slot) => write!(f, " {}", slot),
            Operand::Iinc { slot, delta } => write!(f, " {} {}", slot, delta),
            Operand::Pool(index) => write!(f, " #{}", index),
            Operand::Branch(target) => write!(f, " -> {}", target),
            Operand::Tag(tag) => write!(f, " {}", tag),
            Operand::Count(count) => write!(f, " {}", count),
            Operand::Closure { method, captures } => write!(f, " #{} {}", method, captures),
            Operand::Site(site) => write!(f, " @{}", site),
        }
    }
}

/// Decode the instruction at the reader's position
pub fn decode_instruction(reader: &mut BytecodeReader<'_>) -> Result<Instruction, DecodeError> {
    let offset = reader.position();
    let opcode = reader.read_opcode()?;
    let operand = match opcode.operand_kind() {
        OperandKind::None => Operand::None,
        OperandKind::I32 => Operand::I32(reader.read_i32()?),
        OperandKind::I64 => Operand::I64(reader.read_i64()?),
        OperandKind::F32 => Operand::F32(reader.read_f32()?),
        OperandKind::F64 => Operand::F64(reader.read_f64()?),
        OperandKind::Local => Operand::Local(reader.read_u16()?),
        OperandKind::Iinc => Operand::Iinc {
            slot: reader.read_u16()?,
            delta: reader.read_i16()?,
        },
        OperandKind::Pool => Operand::Pool(reader.read_u32()?),
        OperandKind::Branch => {
            let relative = reader.read_i32()? as i64;
            let target = reader.position() as i64 + relative;
            // Out-of-range targets become usize::MAX and fail verification
            Operand::Branch(usize::try_from(target).unwrap_or(usize::MAX))
        }
        OperandKind::Tag => Operand::Tag(reader.read_u8()?),
        OperandKind::Count => Operand::Count(reader.read_u16()?),
        OperandKind::Closure => Operand::Closure {
            method: reader.read_u32()?,
            captures: reader.read_u16()?,
        },
        OperandKind::Site => Operand::Site(reader.read_u32()?),
    };
    Ok(Instruction {
        offset,
        opcode,
        operand,
    })
}

/// Decode a whole code array
pub fn decode_instructions(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut reader = BytecodeReader::new(code);
    let mut instructions = Vec::new();
    while reader.has_more() {
        instructions.push(decode_instruction(&mut reader)?);
    }
    Ok(instructions)
}

/// One instruction per line
pub fn disassemble(code: &[u8]) -> Result<String, DecodeError> {
    let mut out = String::new();
    for instruction in decode_instructions(code)? {
        out.push_str(&instruction.to_string());
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::BytecodeWriter;

    #[test]
    fn test_decode_branch_targets_are_absolute() {
        let mut writer = BytecodeWriter::new();
        writer.emit_local(Opcode::Iload, 0);
        let operand = writer.emit_branch(Opcode::IfEq);
        writer.emit_iinc(0, -1);
        let exit = writer.offset();
        writer.patch_branch(operand, exit);
        writer.emit_opcode(Opcode::Return);

        let code = writer.into_bytes();
        let instructions = decode_instructions(&code).unwrap();
        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[1].branch_target(), Some(exit));
        assert_eq!(instructions[2].operand, Operand::Iinc { slot: 0, delta: -1 });
        assert_eq!(instructions[3].offset, exit);
    }

    #[test]
    fn test_truncated_operand() {
        let code = [Opcode::Iconst.to_u8(), 1, 0];
        assert_eq!(decode_instructions(&code), Err(DecodeError::UnexpectedEnd(1)));
    }

    #[test]
    fn test_disassemble() {
        let mut writer = BytecodeWriter::new();
        writer.emit_iconst(7);
        writer.emit_opcode(Opcode::Ireturn);
        let text = disassemble(writer.buffer()).unwrap();
        assert_eq!(text, "    0: ICONST 7\n    5: IRETURN\n");
    }
}
