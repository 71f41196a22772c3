//! Bytecode opcodes for the Kestrel stack machine
//!
//! Every opcode is a single byte followed by a fixed-size operand (see
//! [`OperandKind`]). Values occupy one operand-stack slot regardless of
//! their width.
//!
//! Opcodes are organized into ranges:
//! - 0x00-0x0F: Constants
//! - 0x10-0x1F: Local variables
//! - 0x20-0x3F: Arrays
//! - 0x40-0x5F: Typed arithmetic
//! - 0x60-0x6F: Primitive conversions
//! - 0x70-0x8F: Comparisons and branches
//! - 0x90-0x9F: Stack manipulation
//! - 0xA0-0xAF: Objects and fields
//! - 0xB0-0xBF: Invocation
//! - 0xC0-0xCF: Boxing, collections and closures
//! - 0xD0-0xDF: Returns

/// Shape of the operand that follows an opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// No operand
    None,
    /// `i32` immediate
    I32,
    /// `i64` immediate
    I64,
    /// `f32` immediate
    F32,
    /// `f64` immediate
    F64,
    /// `u16` local slot
    Local,
    /// `u16` local slot followed by an `i16` delta
    Iinc,
    /// `u32` constant-pool index
    Pool,
    /// `i32` branch offset, relative to the end of the operand
    Branch,
    /// `u8` tag (primitive or numeric kind, range flag)
    Tag,
    /// `u16` element count
    Count,
    /// `u32` method reference followed by a `u16` capture count
    Closure,
    /// `u32` call-site index
    Site,
}

impl OperandKind {
    /// Encoded size in bytes
    pub fn size(self) -> usize {
        match self {
            OperandKind::None => 0,
            OperandKind::Tag => 1,
            OperandKind::Local | OperandKind::Count => 2,
            OperandKind::I32
            | OperandKind::F32
            | OperandKind::Iinc
            | OperandKind::Pool
            | OperandKind::Branch
            | OperandKind::Site => 4,
            OperandKind::Closure => 6,
            OperandKind::I64 | OperandKind::F64 => 8,
        }
    }
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $value:literal => ($text:literal, $operand:ident), )*) => {
        /// Bytecode opcode enumeration
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $value, )*
        }

        impl Opcode {
            /// Every defined opcode, in encoding order
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Decode an opcode byte
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $( $value => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Mnemonic, e.g. `IADD`
            pub fn name(self) -> &'static str {
                match self {
                    $( Opcode::$name => $text, )*
                }
            }

            /// Operand that follows the opcode byte
            pub fn operand_kind(self) -> OperandKind {
                match self {
                    $( Opcode::$name => OperandKind::$operand, )*
                }
            }
        }
    };
}

opcodes! {
    // ===== Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00 => ("NOP", None),
    /// Push null
    AconstNull = 0x01 => ("ACONST_NULL", None),
    /// Push an int (booleans are 0/1 ints)
    Iconst = 0x02 => ("ICONST", I32),
    /// Push a long
    Lconst = 0x03 => ("LCONST", I64),
    /// Push a float
    Fconst = 0x04 => ("FCONST", F32),
    /// Push a double
    Dconst = 0x05 => ("DCONST", F64),
    /// Push a string, BigInteger, BigDecimal or class reference from the pool
    Ldc = 0x06 => ("LDC", Pool),

    // ===== Local Variables (0x10-0x1F) =====
    /// Load an int-like local
    Iload = 0x10 => ("ILOAD", Local),
    /// Load a long local
    Lload = 0x11 => ("LLOAD", Local),
    /// Load a float local
    Fload = 0x12 => ("FLOAD", Local),
    /// Load a double local
    Dload = 0x13 => ("DLOAD", Local),
    /// Load a reference local
    Aload = 0x14 => ("ALOAD", Local),
    /// Store an int-like local
    Istore = 0x15 => ("ISTORE", Local),
    /// Store a long local
    Lstore = 0x16 => ("LSTORE", Local),
    /// Store a float local
    Fstore = 0x17 => ("FSTORE", Local),
    /// Store a double local
    Dstore = 0x18 => ("DSTORE", Local),
    /// Store a reference local
    Astore = 0x19 => ("ASTORE", Local),
    /// Add a constant to an int local in place
    Iinc = 0x1A => ("IINC", Iinc),

    // ===== Arrays (0x20-0x3F) =====
    /// Load an int element: pop index, pop array, push element
    Iaload = 0x20 => ("IALOAD", None),
    /// Load a long element
    Laload = 0x21 => ("LALOAD", None),
    /// Load a float element
    Faload = 0x22 => ("FALOAD", None),
    /// Load a double element
    Daload = 0x23 => ("DALOAD", None),
    /// Load a byte element
    Baload = 0x24 => ("BALOAD", None),
    /// Load a boolean element
    Zaload = 0x25 => ("ZALOAD", None),
    /// Load a char element
    Caload = 0x26 => ("CALOAD", None),
    /// Load a short element
    Saload = 0x27 => ("SALOAD", None),
    /// Load a reference element
    Aaload = 0x28 => ("AALOAD", None),
    /// Store an int element: pop value, pop index, pop array
    Iastore = 0x29 => ("IASTORE", None),
    /// Store a long element
    Lastore = 0x2A => ("LASTORE", None),
    /// Store a float element
    Fastore = 0x2B => ("FASTORE", None),
    /// Store a double element
    Dastore = 0x2C => ("DASTORE", None),
    /// Store a byte element
    Bastore = 0x2D => ("BASTORE", None),
    /// Store a boolean element
    Zastore = 0x2E => ("ZASTORE", None),
    /// Store a char element
    Castore = 0x2F => ("CASTORE", None),
    /// Store a short element
    Sastore = 0x30 => ("SASTORE", None),
    /// Store a reference element
    Aastore = 0x31 => ("AASTORE", None),
    /// Pop array, push its length
    ArrayLength = 0x32 => ("ARRAYLENGTH", None),
    /// Pop length, push a new array of the pooled component class
    NewArray = 0x33 => ("NEWARRAY", Pool),

    // ===== Typed Arithmetic (0x40-0x5F) =====
    /// int addition
    Iadd = 0x40 => ("IADD", None),
    /// int subtraction
    Isub = 0x41 => ("ISUB", None),
    /// int multiplication
    Imul = 0x42 => ("IMUL", None),
    /// int division
    Idiv = 0x43 => ("IDIV", None),
    /// int remainder
    Irem = 0x44 => ("IREM", None),
    /// int negation
    Ineg = 0x45 => ("INEG", None),
    /// long addition
    Ladd = 0x46 => ("LADD", None),
    /// long subtraction
    Lsub = 0x47 => ("LSUB", None),
    /// long multiplication
    Lmul = 0x48 => ("LMUL", None),
    /// long division
    Ldiv = 0x49 => ("LDIV", None),
    /// long remainder
    Lrem = 0x4A => ("LREM", None),
    /// long negation
    Lneg = 0x4B => ("LNEG", None),
    /// float addition
    Fadd = 0x4C => ("FADD", None),
    /// float subtraction
    Fsub = 0x4D => ("FSUB", None),
    /// float multiplication
    Fmul = 0x4E => ("FMUL", None),
    /// float division
    Fdiv = 0x4F => ("FDIV", None),
    /// float remainder
    Frem = 0x50 => ("FREM", None),
    /// float negation
    Fneg = 0x51 => ("FNEG", None),
    /// double addition
    Dadd = 0x52 => ("DADD", None),
    /// double subtraction
    Dsub = 0x53 => ("DSUB", None),
    /// double multiplication
    Dmul = 0x54 => ("DMUL", None),
    /// double division
    Ddiv = 0x55 => ("DDIV", None),
    /// double remainder
    Drem = 0x56 => ("DREM", None),
    /// double negation
    Dneg = 0x57 => ("DNEG", None),

    // ===== Primitive Conversions (0x60-0x6F) =====
    /// int to long
    I2l = 0x60 => ("I2L", None),
    /// int to float
    I2f = 0x61 => ("I2F", None),
    /// int to double
    I2d = 0x62 => ("I2D", None),
    /// long to int
    L2i = 0x63 => ("L2I", None),
    /// long to float
    L2f = 0x64 => ("L2F", None),
    /// long to double
    L2d = 0x65 => ("L2D", None),
    /// float to int
    F2i = 0x66 => ("F2I", None),
    /// float to long
    F2l = 0x67 => ("F2L", None),
    /// float to double
    F2d = 0x68 => ("F2D", None),
    /// double to int
    D2i = 0x69 => ("D2I", None),
    /// double to long
    D2l = 0x6A => ("D2L", None),
    /// double to float
    D2f = 0x6B => ("D2F", None),
    /// int to byte
    I2b = 0x6C => ("I2B", None),
    /// int to char
    I2c = 0x6D => ("I2C", None),
    /// int to short
    I2s = 0x6E => ("I2S", None),
    /// Any numeric value to the numeric kind tagged 0-8 (byte .. BigDecimal)
    ToNumeric = 0x6F => ("TONUMERIC", Tag),

    // ===== Comparisons and Branches (0x70-0x8F) =====
    /// Compare longs, push -1, 0 or 1
    Lcmp = 0x70 => ("LCMP", None),
    /// Compare floats (NaN gives -1)
    Fcmpl = 0x71 => ("FCMPL", None),
    /// Compare doubles (NaN gives -1)
    Dcmpl = 0x72 => ("DCMPL", None),
    /// Branch if int == 0
    IfEq = 0x73 => ("IFEQ", Branch),
    /// Branch if int != 0
    IfNe = 0x74 => ("IFNE", Branch),
    /// Branch if int < 0
    IfLt = 0x75 => ("IFLT", Branch),
    /// Branch if int >= 0
    IfGe = 0x76 => ("IFGE", Branch),
    /// Branch if int > 0
    IfGt = 0x77 => ("IFGT", Branch),
    /// Branch if int <= 0
    IfLe = 0x78 => ("IFLE", Branch),
    /// Branch if two ints are equal
    IfIcmpEq = 0x79 => ("IF_ICMPEQ", Branch),
    /// Branch if two ints differ
    IfIcmpNe = 0x7A => ("IF_ICMPNE", Branch),
    /// Branch if a < b
    IfIcmpLt = 0x7B => ("IF_ICMPLT", Branch),
    /// Branch if a >= b
    IfIcmpGe = 0x7C => ("IF_ICMPGE", Branch),
    /// Branch if a > b
    IfIcmpGt = 0x7D => ("IF_ICMPGT", Branch),
    /// Branch if a <= b
    IfIcmpLe = 0x7E => ("IF_ICMPLE", Branch),
    /// Branch if the reference is null
    IfNull = 0x7F => ("IFNULL", Branch),
    /// Branch if the reference is not null
    IfNonNull = 0x80 => ("IFNONNULL", Branch),
    /// Unconditional branch
    Goto = 0x81 => ("GOTO", Branch),

    // ===== Stack Manipulation (0x90-0x9F) =====
    /// Duplicate the top value
    Dup = 0x90 => ("DUP", None),
    /// Discard the top value
    Pop = 0x91 => ("POP", None),
    /// Swap the two top values
    Swap = 0x92 => ("SWAP", None),

    // ===== Objects and Fields (0xA0-0xAF) =====
    /// Push an uninitialized instance of the pooled class
    New = 0xA0 => ("NEW", Pool),
    /// Pop object, push field value
    GetField = 0xA1 => ("GETFIELD", Pool),
    /// Pop value, pop object, store field
    PutField = 0xA2 => ("PUTFIELD", Pool),
    /// Push class field value
    GetStatic = 0xA3 => ("GETSTATIC", Pool),
    /// Pop value into a class field
    PutStatic = 0xA4 => ("PUTSTATIC", Pool),
    /// Check that the top value is null or an instance of the pooled class
    CheckCast = 0xA5 => ("CHECKCAST", Pool),

    // ===== Invocation (0xB0-0xBF) =====
    /// Invoke an instance method, dispatching on the receiver's class
    InvokeVirtual = 0xB0 => ("INVOKEVIRTUAL", Pool),
    /// Invoke an interface method
    InvokeInterface = 0xB1 => ("INVOKEINTERFACE", Pool),
    /// Invoke a class method
    InvokeStatic = 0xB2 => ("INVOKESTATIC", Pool),
    /// Invoke a constructor or private method without dispatch
    InvokeSpecial = 0xB3 => ("INVOKESPECIAL", Pool),
    /// Invoke through the call site at the given index
    InvokeDynamic = 0xB4 => ("INVOKEDYNAMIC", Site),

    // ===== Boxing, Collections and Closures (0xC0-0xCF) =====
    /// Wrap a primitive of the tagged kind
    Box = 0xC0 => ("BOX", Tag),
    /// Unwrap into a primitive of the tagged kind
    Unbox = 0xC1 => ("UNBOX", Tag),
    /// Pop any value, push its truth as an int
    Truthy = 0xC2 => ("TRUTHY", None),
    /// Pop `count` values, push a list of them
    NewList = 0xC3 => ("NEWLIST", Count),
    /// Pop `to`, pop `from`, push a range (tag 1 = exclusive)
    NewRange = 0xC4 => ("NEWRANGE", Tag),
    /// Pop owner and captured cells, push a closure over the referenced method
    MakeClosure = 0xC5 => ("MAKECLOSURE", Closure),
    /// Pop value, push a reference cell holding it
    NewRef = 0xC6 => ("NEWREF", None),
    /// Pop cell, push its value
    RefGet = 0xC7 => ("REFGET", None),
    /// Pop value, pop cell, store value in cell
    RefSet = 0xC8 => ("REFSET", None),

    // ===== Returns (0xD0-0xDF) =====
    /// Return an int-like value
    Ireturn = 0xD0 => ("IRETURN", None),
    /// Return a long
    Lreturn = 0xD1 => ("LRETURN", None),
    /// Return a float
    Freturn = 0xD2 => ("FRETURN", None),
    /// Return a double
    Dreturn = 0xD3 => ("DRETURN", None),
    /// Return a reference
    Areturn = 0xD4 => ("ARETURN", None),
    /// Return from a void method
    Return = 0xD5 => ("RETURN", None),
}

impl Opcode {
    /// Encode as a byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Total encoded size, opcode byte included
    pub fn encoded_size(self) -> usize {
        1 + self.operand_kind().size()
    }

    /// Check if this opcode is a branch
    pub fn is_jump(self) -> bool {
        self.operand_kind() == OperandKind::Branch
    }

    /// Check if this opcode branches conditionally
    pub fn is_conditional(self) -> bool {
        self.is_jump() && self != Opcode::Goto
    }

    /// Check if this opcode is an invocation
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::InvokeVirtual
                | Opcode::InvokeInterface
                | Opcode::InvokeStatic
                | Opcode::InvokeSpecial
                | Opcode::InvokeDynamic
        )
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn
                | Opcode::Return
        )
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        self.is_return() || self == Opcode::Goto
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::from_u8(op.to_u8()), Some(op), "{}", op);
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0xFF), None);
        assert_eq!(Opcode::from_u8(0x0F), None);
    }

    #[test]
    fn test_opcode_names_unique() {
        let mut names: Vec<&str> = Opcode::ALL.iter().map(|op| op.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Opcode::ALL.len());
        assert_eq!(Opcode::IfIcmpGe.name(), "IF_ICMPGE");
    }

    #[test]
    fn test_jump_detection() {
        assert!(Opcode::Goto.is_jump());
        assert!(Opcode::IfNull.is_conditional());
        assert!(!Opcode::Goto.is_conditional());
        assert!(!Opcode::Iadd.is_jump());
    }

    #[test]
    fn test_terminator_detection() {
        assert!(Opcode::Areturn.is_terminator());
        assert!(Opcode::Goto.is_terminator());
        assert!(!Opcode::IfEq.is_terminator());
        assert!(!Opcode::InvokeDynamic.is_terminator());
    }

    #[test]
    fn test_encoded_sizes() {
        assert_eq!(Opcode::Iadd.encoded_size(), 1);
        assert_eq!(Opcode::Iload.encoded_size(), 3);
        assert_eq!(Opcode::Iinc.encoded_size(), 5);
        assert_eq!(Opcode::Lconst.encoded_size(), 9);
        assert_eq!(Opcode::MakeClosure.encoded_size(), 7);
        assert_eq!(Opcode::Box.encoded_size(), 2);
    }
}
