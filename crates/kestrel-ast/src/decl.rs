//! Declarations: source units, classes, fields, methods and type references

use crate::statement::Block;
use crate::{Expression, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-level type reference, resolved by the checker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    /// `def` / omitted type
    #[default]
    Dynamic,
    /// Primitive, class or parameterized class: `int`, `List<String>`
    Named {
        /// Type name
        name: String,
        /// Type arguments
        #[serde(default)]
        args: Vec<TypeRef>,
    },
    /// `T[]`
    Array(Box<TypeRef>),
}

impl TypeRef {
    /// Plain named type without arguments
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Array of this type
    pub fn array(self) -> Self {
        TypeRef::Array(Box::new(self))
    }

    /// Whether the reference is `def`
    pub fn is_dynamic(&self) -> bool {
        matches!(self, TypeRef::Dynamic)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Dynamic => write!(f, "def"),
            TypeRef::Named { name, args } if args.is_empty() => write!(f, "{}", name),
            TypeRef::Named { name, args } => {
                write!(f, "{}<", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ">")
            }
            TypeRef::Array(component) => write!(f, "{}[]", component),
        }
    }
}

/// How a class is compiled
///
/// Static classes turn unresolvable members into errors; dynamic classes
/// report them as warnings and fall back to runtime dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileMode {
    /// Runtime dispatch allowed everywhere
    #[default]
    Dynamic,
    /// Type-checked; unresolved members are errors
    Static,
}

/// One parsed source file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Unit name (usually the file stem)
    pub name: String,
    /// Path the unit was parsed from
    #[serde(default)]
    pub path: Option<String>,
    /// Original source text, for diagnostics
    #[serde(default)]
    pub source: Option<String>,
    /// Class declarations
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
}

/// Class declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    /// Class name
    pub name: String,
    /// Superclass name (`Object` when omitted)
    #[serde(default)]
    pub superclass: Option<String>,
    /// Implemented interfaces
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Compilation mode
    #[serde(default)]
    pub mode: CompileMode,
    /// Fields
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    /// Methods and constructors (named `<init>`)
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// Field declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Declared type
    #[serde(default)]
    pub ty: TypeRef,
    /// Whether the field belongs to the class
    #[serde(default)]
    pub is_static: bool,
    /// Initializer, run by constructors
    #[serde(default)]
    pub init: Option<Expression>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// Method declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Parameters
    #[serde(default)]
    pub params: Vec<Param>,
    /// Declared return type (`void` when omitted)
    #[serde(default = "void_type")]
    pub return_type: TypeRef,
    /// Static method
    #[serde(default)]
    pub is_static: bool,
    /// Body
    pub body: Block,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

fn void_type() -> TypeRef {
    TypeRef::named("void")
}

impl MethodDecl {
    /// Constructor name
    pub const CONSTRUCTOR: &'static str = "<init>";

    /// Whether this is a constructor
    pub fn is_constructor(&self) -> bool {
        self.name == Self::CONSTRUCTOR
    }
}

/// Method or closure parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Declared type
    #[serde(default)]
    pub ty: TypeRef,
}

impl Param {
    /// Parameter with a declared type
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}
