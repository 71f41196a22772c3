//! Core type definitions for the Kestrel type system

use std::fmt;

/// Unique identifier for a type in the type context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// Raw index of this type inside its context
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Machine-level primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// `boolean`
    Boolean,
    /// `byte` (8-bit signed)
    Byte,
    /// `short` (16-bit signed)
    Short,
    /// `char` (Unicode scalar)
    Char,
    /// `int` (32-bit signed)
    Int,
    /// `long` (64-bit signed)
    Long,
    /// `float` (IEEE 754 single)
    Float,
    /// `double` (IEEE 754 double)
    Double,
    /// `void` (method return only)
    Void,
}

impl PrimitiveKind {
    /// All value-carrying primitives (everything except `void`)
    pub const VALUES: [PrimitiveKind; 8] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::Char,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
    ];

    /// Source-level keyword for this primitive
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Void => "void",
        }
    }

    /// Parse a primitive keyword
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => PrimitiveKind::Boolean,
            "byte" => PrimitiveKind::Byte,
            "short" => PrimitiveKind::Short,
            "char" => PrimitiveKind::Char,
            "int" => PrimitiveKind::Int,
            "long" => PrimitiveKind::Long,
            "float" => PrimitiveKind::Float,
            "double" => PrimitiveKind::Double,
            "void" => PrimitiveKind::Void,
            _ => return None,
        })
    }

    /// Name of the wrapper class this primitive boxes to
    pub fn wrapper_name(self) -> Option<&'static str> {
        match self {
            PrimitiveKind::Boolean => Some("Boolean"),
            PrimitiveKind::Byte => Some("Byte"),
            PrimitiveKind::Short => Some("Short"),
            PrimitiveKind::Char => Some("Character"),
            PrimitiveKind::Int => Some("Integer"),
            PrimitiveKind::Long => Some("Long"),
            PrimitiveKind::Float => Some("Float"),
            PrimitiveKind::Double => Some("Double"),
            PrimitiveKind::Void => None,
        }
    }

    /// Stable one-byte tag used in bytecode operands
    pub fn tag(self) -> u8 {
        match self {
            PrimitiveKind::Boolean => 0,
            PrimitiveKind::Byte => 1,
            PrimitiveKind::Short => 2,
            PrimitiveKind::Char => 3,
            PrimitiveKind::Int => 4,
            PrimitiveKind::Long => 5,
            PrimitiveKind::Float => 6,
            PrimitiveKind::Double => 7,
            PrimitiveKind::Void => 8,
        }
    }

    /// Inverse of [`PrimitiveKind::tag`]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => PrimitiveKind::Boolean,
            1 => PrimitiveKind::Byte,
            2 => PrimitiveKind::Short,
            3 => PrimitiveKind::Char,
            4 => PrimitiveKind::Int,
            5 => PrimitiveKind::Long,
            6 => PrimitiveKind::Float,
            7 => PrimitiveKind::Double,
            8 => PrimitiveKind::Void,
            _ => return None,
        })
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Nominal class or interface type
///
/// Only the name participates in identity; the supertype chain lives in the
/// [`TypeContext`](crate::TypeContext) hierarchy table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassType {
    /// Fully qualified class name
    pub name: String,
}

/// Supertype information for a declared class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassHierarchy {
    /// Direct superclass (`None` only for `Object` and interfaces)
    pub superclass: Option<TypeId>,
    /// Directly implemented (or extended, for interfaces) interfaces
    pub interfaces: Vec<TypeId>,
    /// Whether this is an interface
    pub is_interface: bool,
}

/// Parameterized type: `Base<A1, ..., An>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericType {
    /// The generic class
    pub base: TypeId,
    /// Bound type arguments
    pub args: Vec<TypeId>,
}

/// Lazily bound generic placeholder
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeVar {
    /// Unique placeholder number within the context
    pub id: u32,
    /// Declared name (e.g. `T`)
    pub name: String,
}

/// A type in the Kestrel type system
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Primitive machine type
    Primitive(PrimitiveKind),
    /// Class or interface
    Class(ClassType),
    /// Array with a component type
    Array(TypeId),
    /// Parameterized class
    Generic(GenericType),
    /// Generic placeholder, bound at most once
    TypeVar(TypeVar),
    /// Statically unknown; dispatch happens at runtime
    Dynamic,
    /// Type of the `null` literal
    Null,
}

impl Type {
    /// Check if this is a primitive type
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    /// Check if this is the dynamic type
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Dynamic)
    }

    /// Check if values of this type are references (may be null)
    pub fn is_reference(&self) -> bool {
        !matches!(self, Type::Primitive(_))
    }

    /// Get the primitive kind if this is a primitive type
    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self {
            Type::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Get the class name if this is a class type
    pub fn as_class(&self) -> Option<&str> {
        match self {
            Type::Class(class) => Some(&class.name),
            _ => None,
        }
    }

    /// Get the component type if this is an array
    pub fn as_array(&self) -> Option<TypeId> {
        match self {
            Type::Array(component) => Some(*component),
            _ => None,
        }
    }
}
