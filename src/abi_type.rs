//! Solidity ABI type descriptors.
//!
//! `AbiType` is a closed tagged union over the types a contract function can
//! take or return. Composite types (`Tuple`, `Struct`, `FixedArray`) compute
//! their layout metadata once when they are built:
//!
//! - **dynamic**: whether the value is referenced from the head by an offset
//! - **head size**: how many bytes a static value occupies inline
//!
//! Neither changes afterwards, so the codec never has to walk a type tree
//! twice to decide how to lay out a value.
//!
//! ## Parsing
//!
//! Types can be written the way they appear in canonical signatures. The
//! grammar is alloy's `DynSolType` parser; the result is converted and
//! validated:
//!
//! ```
//! use alloy_call_ext::ext::AbiType;
//!
//! let ty: AbiType = "(address,uint256)[]".parse().unwrap();
//! assert!(ty.is_dynamic());
//! assert_eq!(ty.to_string(), "(address,uint256)[]");
//! ```

use std::{fmt, str::FromStr};

use alloy::dyn_abi::DynSolType;

use crate::ext::AbiError;

/// Size of one ABI word in bytes.
pub const WORD_SIZE: usize = 32;

// ============================================================================
// AbiType
// ============================================================================

/// Tagged descriptor for a single Solidity ABI type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AbiType {
    /// 20-byte account address
    Address,
    /// Boolean, encoded in the low byte of a word
    Bool,
    /// Unsigned integer of the given bit width (8..=256, multiple of 8)
    Uint(usize),
    /// Signed integer of the given bit width (8..=256, multiple of 8)
    Int(usize),
    /// `bytesN` for N in 1..=32
    FixedBytes(usize),
    /// Dynamic byte string
    Bytes,
    /// Dynamic UTF-8 string
    String,
    /// Dynamic-length array `T[]`
    Array(Box<AbiType>),
    /// Fixed-length array `T[N]`
    FixedArray(FixedArrayType),
    /// Anonymous tuple `(T1,T2,...)`
    Tuple(TupleType),
    /// Named tuple backing a `ContractStruct`
    Struct(StructType),
}

/// Ordered tuple fields with precomputed layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleType {
    fields: Vec<AbiType>,
    dynamic: bool,
    static_size: usize,
}

impl TupleType {
    pub fn new(fields: Vec<AbiType>) -> Self {
        let dynamic = fields.iter().any(AbiType::is_dynamic);
        // Saturates; `AbiType::validate` rejects layouts that overflow.
        let static_size = fields
            .iter()
            .fold(0usize, |size, field| size.saturating_add(field.head_size()));
        Self {
            fields,
            dynamic,
            static_size,
        }
    }

    pub fn fields(&self) -> &[AbiType] {
        &self.fields
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Total size of the head region when this tuple is encoded.
    pub fn head_size(&self) -> usize {
        self.static_size
    }
}

/// Element type and length of a `T[N]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixedArrayType {
    elem: Box<AbiType>,
    len: usize,
    dynamic: bool,
}

impl FixedArrayType {
    pub fn new(elem: AbiType, len: usize) -> Self {
        let dynamic = len > 0 && elem.is_dynamic();
        Self {
            elem: Box::new(elem),
            len,
            dynamic,
        }
    }

    pub fn elem(&self) -> &AbiType {
        &self.elem
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

/// A named tuple. Encodes exactly like its underlying tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    name: String,
    tuple: TupleType,
}

impl StructType {
    pub fn new(name: impl Into<String>, fields: Vec<AbiType>) -> Self {
        Self {
            name: name.into(),
            tuple: TupleType::new(fields),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[AbiType] {
        self.tuple.fields()
    }

    pub fn tuple(&self) -> &TupleType {
        &self.tuple
    }
}

impl AbiType {
    /// `uintN`
    pub fn uint(bits: usize) -> Self {
        AbiType::Uint(bits)
    }

    /// `intN`
    pub fn int(bits: usize) -> Self {
        AbiType::Int(bits)
    }

    /// `T[]`
    pub fn array(elem: AbiType) -> Self {
        AbiType::Array(Box::new(elem))
    }

    /// `T[N]`
    pub fn fixed_array(elem: AbiType, len: usize) -> Self {
        AbiType::FixedArray(FixedArrayType::new(elem, len))
    }

    /// `(T1,T2,...)`
    pub fn tuple(fields: Vec<AbiType>) -> Self {
        AbiType::Tuple(TupleType::new(fields))
    }

    /// Named struct with the given field types.
    pub fn structure(name: impl Into<String>, fields: Vec<AbiType>) -> Self {
        AbiType::Struct(StructType::new(name, fields))
    }

    /// Whether values of this type live in the tail and are referenced by offset.
    pub fn is_dynamic(&self) -> bool {
        match self {
            AbiType::Bytes | AbiType::String | AbiType::Array(_) => true,
            AbiType::FixedArray(array) => array.is_dynamic(),
            AbiType::Tuple(tuple) => tuple.is_dynamic(),
            AbiType::Struct(structure) => structure.tuple.is_dynamic(),
            AbiType::Address
            | AbiType::Bool
            | AbiType::Uint(_)
            | AbiType::Int(_)
            | AbiType::FixedBytes(_) => false,
        }
    }

    /// Bytes this type occupies in the head of its enclosing tuple.
    ///
    /// One word for dynamic types (the offset); the full inline size otherwise.
    /// Saturates at `usize::MAX` for layouts `validate` rejects.
    pub fn head_size(&self) -> usize {
        self.checked_head_size().unwrap_or(usize::MAX)
    }

    /// `head_size`, or `None` if the inline size does not fit in a `usize`.
    pub fn checked_head_size(&self) -> Option<usize> {
        if self.is_dynamic() {
            return Some(WORD_SIZE);
        }
        match self {
            AbiType::FixedArray(array) => array.len.checked_mul(array.elem.checked_head_size()?),
            AbiType::Tuple(TupleType { fields, .. })
            | AbiType::Struct(StructType {
                tuple: TupleType { fields, .. },
                ..
            }) => fields.iter().try_fold(0usize, |size, field| {
                size.checked_add(field.checked_head_size()?)
            }),
            _ => Some(WORD_SIZE),
        }
    }

    /// Validate bit widths, byte lengths and layout size recursively.
    pub fn validate(&self) -> Result<(), AbiError> {
        self.validate_fields()?;
        if self.checked_head_size().is_none() {
            return Err(AbiError::InvalidType(self.to_string()));
        }
        Ok(())
    }

    fn validate_fields(&self) -> Result<(), AbiError> {
        match self {
            AbiType::Uint(bits) | AbiType::Int(bits) => {
                if *bits == 0 || *bits > 256 || bits % 8 != 0 {
                    return Err(AbiError::InvalidType(self.to_string()));
                }
                Ok(())
            }
            AbiType::FixedBytes(len) => {
                if *len == 0 || *len > 32 {
                    return Err(AbiError::InvalidType(self.to_string()));
                }
                Ok(())
            }
            AbiType::Array(elem) => elem.validate_fields(),
            AbiType::FixedArray(array) => array.elem.validate_fields(),
            AbiType::Tuple(tuple) => tuple.fields.iter().try_for_each(AbiType::validate_fields),
            AbiType::Struct(structure) => {
                structure.fields().iter().try_for_each(AbiType::validate_fields)
            }
            AbiType::Address | AbiType::Bool | AbiType::Bytes | AbiType::String => Ok(()),
        }
    }
}

// ============================================================================
// Canonical formatting
// ============================================================================

/// Write a comma separated list of canonical type names.
pub(crate) fn write_type_list(f: &mut fmt::Formatter<'_>, types: &[AbiType]) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{ty}")?;
    }
    Ok(())
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiType::Address => f.write_str("address"),
            AbiType::Bool => f.write_str("bool"),
            AbiType::Uint(bits) => write!(f, "uint{bits}"),
            AbiType::Int(bits) => write!(f, "int{bits}"),
            AbiType::FixedBytes(len) => write!(f, "bytes{len}"),
            AbiType::Bytes => f.write_str("bytes"),
            AbiType::String => f.write_str("string"),
            AbiType::Array(elem) => write!(f, "{elem}[]"),
            AbiType::FixedArray(array) => write!(f, "{}[{}]", array.elem, array.len),
            // Structs use their tuple form in canonical signatures.
            AbiType::Tuple(TupleType { fields, .. })
            | AbiType::Struct(StructType {
                tuple: TupleType { fields, .. },
                ..
            }) => {
                f.write_str("(")?;
                write_type_list(f, fields)?;
                f.write_str(")")
            }
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

impl TryFrom<&DynSolType> for AbiType {
    type Error = AbiError;

    fn try_from(ty: &DynSolType) -> Result<Self, Self::Error> {
        let converted = match ty {
            DynSolType::Address => AbiType::Address,
            DynSolType::Bool => AbiType::Bool,
            DynSolType::Uint(bits) => AbiType::Uint(*bits),
            DynSolType::Int(bits) => AbiType::Int(*bits),
            DynSolType::FixedBytes(len) => AbiType::FixedBytes(*len),
            DynSolType::Bytes => AbiType::Bytes,
            DynSolType::String => AbiType::String,
            DynSolType::Array(elem) => AbiType::array(elem.as_ref().try_into()?),
            DynSolType::FixedArray(elem, len) => {
                AbiType::fixed_array(elem.as_ref().try_into()?, *len)
            }
            DynSolType::Tuple(fields) => AbiType::tuple(
                fields
                    .iter()
                    .map(AbiType::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            // Function pointers and EIP-712 structs have no counterpart.
            other => return Err(AbiError::InvalidType(other.sol_type_name().into_owned())),
        };
        Ok(converted)
    }
}

impl FromStr for AbiType {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = DynSolType::parse(s.trim())
            .map_err(|err| AbiError::InvalidType(format!("{s}: {err}")))?;
        let ty = AbiType::try_from(&parsed)?;
        ty.validate()?;
        Ok(ty)
    }
}
