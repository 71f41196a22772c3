//! Byte-level writer and reader shared by code and class-file sections
//!
//! All multi-byte values are little-endian. Strings are a `u32` byte length
//! followed by UTF-8 bytes.

use crate::opcode::{OperandKind, Opcode};
use thiserror::Error;

macro_rules! le_writers {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Append a little-endian `", stringify!($ty), "`")]
            pub fn $name(&mut self, value: $ty) {
                self.buffer.extend_from_slice(&value.to_le_bytes());
            }
        )*
    };
}

macro_rules! le_readers {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Read a little-endian `", stringify!($ty), "`")]
            pub fn $name(&mut self) -> Result<$ty, DecodeError> {
                self.take().map(<$ty>::from_le_bytes)
            }
        )*
    };
}

/// Failure to decode code or a class-file section
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended inside a value
    #[error("Truncated input at offset {0}")]
    UnexpectedEnd(usize),

    /// String bytes are not UTF-8
    #[error("Malformed UTF-8 in string at offset {0}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#04x} at offset {1}")]
    InvalidOpcode(u8, usize),

    /// Unknown tag byte for an enumerated field
    #[error("Invalid {what} tag {tag} at offset {offset}")]
    InvalidTag {
        /// What was being decoded
        what: &'static str,
        /// Tag value
        tag: u8,
        /// Offset of the tag
        offset: usize,
    },
}

/// Append-only byte sink with instruction helpers and in-place patching
#[derive(Default, Debug, Clone)]
pub struct BytecodeWriter {
    buffer: Vec<u8>,
}

impl BytecodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer whose buffer starts with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        let buffer = Vec::with_capacity(capacity);
        Self { buffer }
    }

    /// Bytes written so far
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Current offset (length of the output)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Raw values =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    le_writers! {
        emit_u16: u16,
        emit_i16: i16,
        emit_u32: u32,
        emit_i32: i32,
        emit_i64: i64,
        emit_f32: f32,
        emit_f64: f64,
    }

    /// Emit a length-prefixed UTF-8 string
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Emit a length-prefixed byte blob
    pub fn emit_blob(&mut self, bytes: &[u8]) {
        self.emit_u32(bytes.len() as u32);
        self.buffer.extend_from_slice(bytes);
    }

    // ===== Instructions =====

    /// Emit an operand-less instruction
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        debug_assert_eq!(opcode.operand_kind(), OperandKind::None, "{}", opcode);
        self.emit_u8(opcode.to_u8());
    }

    /// Emit `ICONST value`
    pub fn emit_iconst(&mut self, value: i32) {
        self.emit_u8(Opcode::Iconst.to_u8());
        self.emit_i32(value);
    }

    /// Emit `LCONST value`
    pub fn emit_lconst(&mut self, value: i64) {
        self.emit_u8(Opcode::Lconst.to_u8());
        self.emit_i64(value);
    }

    /// Emit `FCONST value`
    pub fn emit_fconst(&mut self, value: f32) {
        self.emit_u8(Opcode::Fconst.to_u8());
        self.emit_f32(value);
    }

    /// Emit `DCONST value`
    pub fn emit_dconst(&mut self, value: f64) {
        self.emit_u8(Opcode::Dconst.to_u8());
        self.emit_f64(value);
    }

    /// Emit a load or store of a local slot
    pub fn emit_local(&mut self, opcode: Opcode, slot: u16) {
        debug_assert_eq!(opcode.operand_kind(), OperandKind::Local, "{}", opcode);
        self.emit_u8(opcode.to_u8());
        self.emit_u16(slot);
    }

    /// Emit `IINC slot delta`
    pub fn emit_iinc(&mut self, slot: u16, delta: i16) {
        self.emit_u8(Opcode::Iinc.to_u8());
        self.emit_u16(slot);
        self.emit_i16(delta);
    }

    /// Emit an instruction whose operand is a constant-pool index
    pub fn emit_pool(&mut self, opcode: Opcode, index: u32) {
        debug_assert_eq!(opcode.operand_kind(), OperandKind::Pool, "{}", opcode);
        self.emit_u8(opcode.to_u8());
        self.emit_u32(index);
    }

    /// Emit an instruction with a one-byte tag
    pub fn emit_tag(&mut self, opcode: Opcode, tag: u8) {
        debug_assert_eq!(opcode.operand_kind(), OperandKind::Tag, "{}", opcode);
        self.emit_u8(opcode.to_u8());
        self.emit_u8(tag);
    }

    /// Emit an instruction with a `u16` element count
    pub fn emit_count(&mut self, opcode: Opcode, count: u16) {
        debug_assert_eq!(opcode.operand_kind(), OperandKind::Count, "{}", opcode);
        self.emit_u8(opcode.to_u8());
        self.emit_u16(count);
    }

    /// Emit `INVOKEDYNAMIC site`
    pub fn emit_invoke_dynamic(&mut self, site: u32) {
        self.emit_u8(Opcode::InvokeDynamic.to_u8());
        self.emit_u32(site);
    }

    /// Emit `MAKECLOSURE method captures`
    pub fn emit_make_closure(&mut self, method: u32, captures: u16) {
        self.emit_u8(Opcode::MakeClosure.to_u8());
        self.emit_u32(method);
        self.emit_u16(captures);
    }

    /// Emit a branch with a placeholder offset; returns the operand position
    /// for [`patch_branch`](Self::patch_branch)
    pub fn emit_branch(&mut self, opcode: Opcode) -> usize {
        debug_assert!(opcode.is_jump(), "{}", opcode);
        self.emit_u8(opcode.to_u8());
        self.reserve_i32()
    }

    /// Point the branch whose operand sits at `operand` to `target`
    pub fn patch_branch(&mut self, operand: usize, target: usize) {
        let relative = target as i64 - (operand as i64 + 4);
        self.patch_i32(operand, relative as i32);
    }

    // ===== Patching =====

    /// Reserve space for an `i32` and return its offset
    pub fn reserve_i32(&mut self) -> usize {
        let offset = self.offset();
        self.emit_i32(0);
        offset
    }

    /// Overwrite an `i32` at `offset`
    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Overwrite a `u32` at `offset`
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Cursor over encoded bytes
#[derive(Debug, Clone)]
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Read from the start of `buffer`
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Current read offset
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Whether any bytes are left
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Move the read offset
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.buffer.len());
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.position + N;
        let bytes: [u8; N] = self
            .buffer
            .get(self.position..end)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        self.position = end;
        Ok(bytes)
    }

    /// Read a byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    le_readers! {
        read_u16: u16,
        read_i16: i16,
        read_u32: u32,
        read_i32: i32,
        read_i64: i64,
        read_f32: f32,
        read_f64: f64,
    }

    /// Read exactly `count` bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, DecodeError> {
        let end = self.position + count;
        let bytes = self
            .buffer
            .get(self.position..end)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?
            .to_vec();
        self.position = end;
        Ok(bytes)
    }

    /// Read a length-prefixed byte blob
    pub fn read_blob(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// Read a length-prefixed string
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let start = self.position;
        let bytes = self.read_blob()?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    /// Read an opcode byte
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let offset = self.position;
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))
    }
}
