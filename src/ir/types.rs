// src/ir/types.rs
use std::fmt;

/// Types that an IR [`Value`](super::Value) can carry.
///
/// Only the primitives the obfuscation passes actually reason about are
/// represented: integer widths (for arithmetic and comparison mutation),
/// floats (for the trivial `fcmp_true` opaque predicate), booleans (branch
/// conditions), and pointers (the `switchVar`/junk alloca cells).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum IrType {
    I8,
    I16,
    #[default]
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Void,
    Pointer(Box<IrType>),
    Array(Box<IrType>, usize),
}

impl IrType {
    pub fn is_signed_integer(&self) -> bool {
        matches!(self, IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64)
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(self, IrType::U8 | IrType::U16 | IrType::U32 | IrType::U64)
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Pointer(_))
    }

    /// Returns the bit-width associated with this IR type.
    ///
    /// For integer and floating-point types this is exact; other types
    /// (pointers, arrays, void) fall back to a 32-bit heuristic width since
    /// the obfuscation passes never inspect it for those.
    pub fn get_bit_width(&self) -> u32 {
        match self {
            IrType::I8 | IrType::U8 => 8,
            IrType::I16 | IrType::U16 => 16,
            IrType::I32 | IrType::U32 => 32,
            IrType::I64 | IrType::U64 => 64,
            IrType::F32 => 32,
            IrType::F64 => 64,
            IrType::Bool => 1,
            _ => 32,
        }
    }

    pub fn pointer_to(self) -> IrType {
        IrType::Pointer(Box::new(self))
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::U8 => write!(f, "u8"),
            IrType::U16 => write!(f, "u16"),
            IrType::U32 => write!(f, "u32"),
            IrType::U64 => write!(f, "u64"),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::Bool => write!(f, "bool"),
            IrType::Void => write!(f, "void"),
            IrType::Pointer(inner) => write!(f, "*{inner}"),
            IrType::Array(element_type, size) => write!(f, "[{element_type}; {size}]"),
        }
    }
}
