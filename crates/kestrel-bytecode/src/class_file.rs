//! Class-file container

use crate::constants::{ConstantPool, MethodDescriptor};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use serde::Serialize;
use thiserror::Error;

/// Magic number of Kestrel class files: "KCLS"
pub const MAGIC: [u8; 4] = *b"KCLS";

/// Current class-file version
pub const VERSION: u32 = 1;

/// Size of the fixed header: magic, version, flags, checksum
pub const HEADER_SIZE: usize = 16;

/// Class-file encoding/decoding errors
#[derive(Debug, Error)]
pub enum ClassFileError {
    /// Decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected KCLS, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Checksum of the payload as read
        actual: u32,
    },
}

/// Class and member flags
pub mod flags {
    /// Class is an interface
    pub const INTERFACE: u32 = 1 << 0;
    /// Member is static
    pub const STATIC: u32 = 1 << 0;
    /// Member was generated by the compiler
    pub const SYNTHETIC: u32 = 1 << 1;
}

/// Compile mode the class was emitted under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ClassMode {
    /// Unresolvable members were errors
    Static,
    /// Unresolvable members went through call sites
    #[default]
    Dynamic,
}

impl ClassMode {
    fn to_u8(self) -> u8 {
        match self {
            ClassMode::Static => 0,
            ClassMode::Dynamic => 1,
        }
    }
}

/// What an `INVOKEDYNAMIC` site does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CallSiteKind {
    /// Method call on a receiver: pops receiver and arguments, pushes result
    Method,
    /// Property read: pops receiver, pushes value
    GetProperty,
    /// Property write: pops receiver and value
    SetProperty,
    /// Constructor call on the class named by the site: pops arguments
    Constructor,
    /// Invocation of a callee value: pops callee and arguments
    Call,
}

impl CallSiteKind {
    fn to_u8(self) -> u8 {
        match self {
            CallSiteKind::Method => 0,
            CallSiteKind::GetProperty => 1,
            CallSiteKind::SetProperty => 2,
            CallSiteKind::Constructor => 3,
            CallSiteKind::Call => 4,
        }
    }

    fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => CallSiteKind::Method,
            1 => CallSiteKind::GetProperty,
            2 => CallSiteKind::SetProperty,
            3 => CallSiteKind::Constructor,
            4 => CallSiteKind::Call,
            _ => return None,
        })
    }

    /// Operand-stack effect as (pops, pushes) for a site with `args` arguments
    pub fn stack_effect(self, args: u16) -> (usize, usize) {
        let args = args as usize;
        match self {
            CallSiteKind::Method | CallSiteKind::Call => (1 + args, 1),
            CallSiteKind::GetProperty => (1, 1),
            CallSiteKind::SetProperty => (2, 0),
            CallSiteKind::Constructor => (args, 1),
        }
    }
}

/// A dynamic call-site descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallSiteDescriptor {
    /// Method, property or class name
    pub name: String,
    /// Number of arguments, excluding the receiver
    pub arg_count: u16,
    /// Site kind
    pub kind: CallSiteKind,
}

impl CallSiteDescriptor {
    /// Build a descriptor
    pub fn new(name: impl Into<String>, arg_count: u16, kind: CallSiteKind) -> Self {
        CallSiteDescriptor {
            name: name.into(),
            arg_count,
            kind,
        }
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Type name
    pub descriptor: String,
    /// Member flags
    pub flags: u32,
}

impl FieldInfo {
    /// Whether the field is static
    pub fn is_static(&self) -> bool {
        self.flags & flags::STATIC != 0
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_string(&self.descriptor);
        writer.emit_u32(self.flags);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(FieldInfo {
            name: reader.read_string()?,
            descriptor: reader.read_string()?,
            flags: reader.read_u32()?,
        })
    }
}

/// Method definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInfo {
    /// Method name
    pub name: String,
    /// Descriptor such as `(int,String)boolean`
    pub descriptor: String,
    /// Member flags
    pub flags: u32,
    /// Local slots, including `this` and parameters
    pub max_locals: u16,
    /// Maximum operand-stack depth
    pub max_stack: u16,
    /// Bytecode
    #[serde(skip)]
    pub code: Vec<u8>,
}

impl MethodInfo {
    /// Whether the method is static
    pub fn is_static(&self) -> bool {
        self.flags & flags::STATIC != 0
    }

    /// Whether the method was generated by the compiler
    pub fn is_synthetic(&self) -> bool {
        self.flags & flags::SYNTHETIC != 0
    }

    /// Parsed descriptor
    pub fn signature(&self) -> Option<MethodDescriptor> {
        MethodDescriptor::parse(&self.descriptor)
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.signature().map(|d| d.arity()).unwrap_or(0)
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_string(&self.descriptor);
        writer.emit_u32(self.flags);
        writer.emit_u16(self.max_locals);
        writer.emit_u16(self.max_stack);
        writer.emit_blob(&self.code);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(MethodInfo {
            name: reader.read_string()?,
            descriptor: reader.read_string()?,
            flags: reader.read_u32()?,
            max_locals: reader.read_u16()?,
            max_stack: reader.read_u16()?,
            code: reader.read_blob()?,
        })
    }
}

/// A compiled Kestrel class
#[derive(Debug, Clone, Serialize)]
pub struct ClassFile {
    /// Class-file version
    pub version: u32,
    /// Class flags
    pub flags: u32,
    /// Class name
    pub name: String,
    /// Superclass name
    pub superclass: String,
    /// Implemented interface names
    pub interfaces: Vec<String>,
    /// Compile mode
    pub mode: ClassMode,
    /// Constant pool
    pub constants: ConstantPool,
    /// Dynamic call-site descriptors, indexed by `INVOKEDYNAMIC`
    pub call_sites: Vec<CallSiteDescriptor>,
    /// Field definitions
    pub fields: Vec<FieldInfo>,
    /// Method definitions
    pub methods: Vec<MethodInfo>,
}

impl ClassFile {
    /// Create an empty class extending `Object`
    pub fn new(name: impl Into<String>) -> Self {
        ClassFile {
            version: VERSION,
            flags: 0,
            name: name.into(),
            superclass: "Object".to_string(),
            interfaces: Vec::new(),
            mode: ClassMode::default(),
            constants: ConstantPool::new(),
            call_sites: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Add a call-site descriptor, reusing an identical one
    pub fn add_call_site(&mut self, descriptor: CallSiteDescriptor) -> u32 {
        if let Some(index) = self.call_sites.iter().position(|d| *d == descriptor) {
            return index as u32;
        }
        self.call_sites.push(descriptor);
        (self.call_sites.len() - 1) as u32
    }

    /// Index of the method with the given name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Methods with the given name
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = (usize, &'a MethodInfo)> + 'a {
        self.methods
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.name == name)
    }

    /// Field with the given name
    pub fn find_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Encode to the binary `.kcls` format
    ///
    /// Layout:
    /// - Header: magic, version, flags, CRC32 of everything after the header
    /// - Name, superclass, interfaces, mode
    /// - Constant pool
    /// - Call-site table
    /// - Fields
    /// - Methods
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        for byte in MAGIC {
            writer.emit_u8(byte);
        }
        writer.emit_u32(self.version);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.offset();
        writer.emit_u32(0);

        writer.emit_string(&self.name);
        writer.emit_string(&self.superclass);
        writer.emit_u32(self.interfaces.len() as u32);
        for interface in &self.interfaces {
            writer.emit_string(interface);
        }
        writer.emit_u8(self.mode.to_u8());

        self.constants.encode(&mut writer);

        writer.emit_u32(self.call_sites.len() as u32);
        for site in &self.call_sites {
            writer.emit_string(&site.name);
            writer.emit_u16(site.arg_count);
            writer.emit_u8(site.kind.to_u8());
        }

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            field.encode(&mut writer);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(&mut writer);
        }

        let checksum = crc32fast::hash(&writer.buffer()[HEADER_SIZE..]);
        writer.patch_u32(checksum_offset, checksum);
        writer.into_bytes()
    }

    /// Decode from the binary format
    pub fn decode(data: &[u8]) -> Result<Self, ClassFileError> {
        let mut reader = BytecodeReader::new(data);

        let mut magic = [0u8; 4];
        for byte in magic.iter_mut() {
            *byte = reader.read_u8()?;
        }
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ClassFileError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored = reader.read_u32()?;
        let actual = crc32fast::hash(&data[HEADER_SIZE..]);
        if stored != actual {
            return Err(ClassFileError::ChecksumMismatch {
                expected: stored,
                actual,
            });
        }

        let name = reader.read_string()?;
        let superclass = reader.read_string()?;
        let interface_count = reader.read_u32()? as usize;
        let mut interfaces = Vec::with_capacity(interface_count.min(64));
        for _ in 0..interface_count {
            interfaces.push(reader.read_string()?);
        }
        let mode_offset = reader.position();
        let mode = match reader.read_u8()? {
            0 => ClassMode::Static,
            1 => ClassMode::Dynamic,
            tag => {
                return Err(DecodeError::InvalidTag {
                    what: "class mode",
                    tag,
                    offset: mode_offset,
                }
                .into())
            }
        };

        let constants = ConstantPool::decode(&mut reader)?;

        let site_count = reader.read_u32()? as usize;
        let mut call_sites = Vec::with_capacity(site_count.min(1024));
        for _ in 0..site_count {
            let name = reader.read_string()?;
            let arg_count = reader.read_u16()?;
            let offset = reader.position();
            let tag = reader.read_u8()?;
            let kind = CallSiteKind::from_u8(tag).ok_or(DecodeError::InvalidTag {
                what: "call site kind",
                tag,
                offset,
            })?;
            call_sites.push(CallSiteDescriptor {
                name,
                arg_count,
                kind,
            });
        }

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(1024));
        for _ in 0..field_count {
            fields.push(FieldInfo::decode(&mut reader)?);
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(1024));
        for _ in 0..method_count {
            methods.push(MethodInfo::decode(&mut reader)?);
        }

        Ok(ClassFile {
            version,
            flags,
            name,
            superclass,
            interfaces,
            mode,
            constants,
            call_sites,
            fields,
            methods,
        })
    }

    /// JSON summary for tooling; method code is omitted
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
