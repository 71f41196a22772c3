//! Constant pool
//!
//! Entries are interned: adding an equal constant twice returns the first
//! index.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Class, method or field reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MemberRef {
    /// Owning class name
    pub class: String,
    /// Member name
    pub name: String,
    /// Method descriptor `(int,String)boolean` or field type name
    pub descriptor: String,
}

impl MemberRef {
    /// Build a reference
    pub fn new(class: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        MemberRef {
            class: class.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// A constant-pool entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum Constant {
    /// String literal
    Utf8(String),
    /// Arbitrary-precision integer, decimal digits
    BigInteger(String),
    /// Arbitrary-precision decimal, plain notation
    BigDecimal(String),
    /// Class name
    Class(String),
    /// Method reference
    Method(MemberRef),
    /// Field reference
    Field(MemberRef),
}

impl Constant {
    fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => 1,
            Constant::BigInteger(_) => 2,
            Constant::BigDecimal(_) => 3,
            Constant::Class(_) => 4,
            Constant::Method(_) => 5,
            Constant::Field(_) => 6,
        }
    }

    /// Whether `LDC` may push this entry
    pub fn is_loadable(&self) -> bool {
        matches!(
            self,
            Constant::Utf8(_) | Constant::BigInteger(_) | Constant::BigDecimal(_) | Constant::Class(_)
        )
    }
}

/// Interned constants of one class file
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    #[serde(skip)]
    index: FxHashMap<Constant, u32>,
}

impl ConstantPool {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Intern a constant
    pub fn add(&mut self, constant: Constant) -> u32 {
        if let Some(&index) = self.index.get(&constant) {
            return index;
        }
        let index = self.entries.len() as u32;
        self.index.insert(constant.clone(), index);
        self.entries.push(constant);
        index
    }

    /// Intern a string literal
    pub fn add_string(&mut self, value: &str) -> u32 {
        self.add(Constant::Utf8(value.to_string()))
    }

    /// Intern a class reference
    pub fn add_class(&mut self, name: &str) -> u32 {
        self.add(Constant::Class(name.to_string()))
    }

    /// Intern a method reference
    pub fn add_method(&mut self, class: &str, name: &str, descriptor: &str) -> u32 {
        self.add(Constant::Method(MemberRef::new(class, name, descriptor)))
    }

    /// Intern a field reference
    pub fn add_field(&mut self, class: &str, name: &str, descriptor: &str) -> u32 {
        self.add(Constant::Field(MemberRef::new(class, name, descriptor)))
    }

    /// Entry at `index`
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.entries.get(index as usize)
    }

    /// Class name at `index`
    pub fn class_name(&self, index: u32) -> Option<&str> {
        match self.get(index)? {
            Constant::Class(name) => Some(name),
            _ => None,
        }
    }

    /// Method reference at `index`
    pub fn method(&self, index: u32) -> Option<&MemberRef> {
        match self.get(index)? {
            Constant::Method(member) => Some(member),
            _ => None,
        }
    }

    /// Field reference at `index`
    pub fn field(&self, index: u32) -> Option<&MemberRef> {
        match self.get(index)? {
            Constant::Field(member) => Some(member),
            _ => None,
        }
    }

    /// All entries in index order
    pub fn entries(&self) -> &[Constant] {
        &self.entries
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.entries.len() as u32);
        for constant in &self.entries {
            writer.emit_u8(constant.tag());
            match constant {
                Constant::Utf8(s)
                | Constant::BigInteger(s)
                | Constant::BigDecimal(s)
                | Constant::Class(s) => writer.emit_string(s),
                Constant::Method(member) | Constant::Field(member) => {
                    writer.emit_string(&member.class);
                    writer.emit_string(&member.name);
                    writer.emit_string(&member.descriptor);
                }
            }
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32()? as usize;
        let mut pool = ConstantPool::new();
        for _ in 0..count {
            let offset = reader.position();
            let tag = reader.read_u8()?;
            let constant = match tag {
                1 => Constant::Utf8(reader.read_string()?),
                2 => Constant::BigInteger(reader.read_string()?),
                3 => Constant::BigDecimal(reader.read_string()?),
                4 => Constant::Class(reader.read_string()?),
                5 | 6 => {
                    let member = MemberRef {
                        class: reader.read_string()?,
                        name: reader.read_string()?,
                        descriptor: reader.read_string()?,
                    };
                    if tag == 5 {
                        Constant::Method(member)
                    } else {
                        Constant::Field(member)
                    }
                }
                _ => {
                    return Err(DecodeError::InvalidTag {
                        what: "constant",
                        tag,
                        offset,
                    })
                }
            };
            // Push directly so duplicate entries keep their positions
            pool.index.entry(constant.clone()).or_insert(pool.entries.len() as u32);
            pool.entries.push(constant);
        }
        Ok(pool)
    }
}

/// Parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Parameter type names
    pub params: Vec<String>,
    /// Return type name
    pub return_type: String,
}

impl MethodDescriptor {
    /// Parse `(int,String)boolean`
    pub fn parse(descriptor: &str) -> Option<Self> {
        let rest = descriptor.strip_prefix('(')?;
        let close = rest.find(')')?;
        let (params, ret) = (&rest[..close], &rest[close + 1..]);
        if ret.is_empty() {
            return None;
        }
        let params = if params.is_empty() {
            Vec::new()
        } else {
            params.split(',').map(str::to_string).collect()
        };
        Some(MethodDescriptor {
            params,
            return_type: ret.to_string(),
        })
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether the method returns nothing
    pub fn is_void(&self) -> bool {
        self.return_type == "void"
    }
}

impl std::fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}){}", self.params.join(","), self.return_type)
    }
}
