//! Tagged ABI values.
//!
//! Decoded values are returned as `AbiValue`, one variant per `AbiType`
//! family, so result decoders pattern-match instead of downcasting.

use alloy::primitives::{ruint::UintTryFrom, Address, Bytes, B256, I256, U256};

use crate::ext::{AbiError, AbiType};

/// A single decoded (or to-be-encoded) ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Address(Address),
    Bool(bool),
    /// Unsigned integer and its declared bit width
    Uint(U256, usize),
    /// Signed integer and its declared bit width
    Int(I256, usize),
    /// Left-aligned word and the declared byte length
    FixedBytes(B256, usize),
    Bytes(Bytes),
    String(String),
    Array(Vec<AbiValue>),
    FixedArray(Vec<AbiValue>),
    Tuple(Vec<AbiValue>),
    Struct(ContractStruct),
}

/// A named tuple value matching an `AbiType::Struct`.
///
/// Built either by user code or by decoding; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractStruct {
    name: String,
    fields: Vec<AbiValue>,
}

impl ContractStruct {
    pub fn new(name: impl Into<String>, fields: Vec<AbiValue>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[AbiValue] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<AbiValue> {
        self.fields
    }
}

impl AbiValue {
    /// `uint256` value
    pub fn uint256<V>(value: V) -> Self
    where
        U256: UintTryFrom<V>,
    {
        AbiValue::Uint(U256::from(value), 256)
    }

    /// `bytesN` value from a slice of at most 32 bytes.
    pub fn fixed_bytes(bytes: &[u8]) -> Self {
        let mut word = B256::ZERO;
        let len = bytes.len().min(32);
        word[..len].copy_from_slice(&bytes[..len]);
        AbiValue::FixedBytes(word, len)
    }

    /// Short human-readable name of the variant, used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            AbiValue::Address(_) => "address",
            AbiValue::Bool(_) => "bool",
            AbiValue::Uint(..) => "uint",
            AbiValue::Int(..) => "int",
            AbiValue::FixedBytes(..) => "fixed bytes",
            AbiValue::Bytes(_) => "bytes",
            AbiValue::String(_) => "string",
            AbiValue::Array(_) => "array",
            AbiValue::FixedArray(_) => "fixed array",
            AbiValue::Tuple(_) => "tuple",
            AbiValue::Struct(_) => "struct",
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            AbiValue::Address(address) => Some(*address),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AbiValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            AbiValue::Uint(value, _) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<I256> {
        match self {
            AbiValue::Int(value, _) => Some(*value),
            _ => None,
        }
    }

    /// Bytes of a `bytes` or `bytesN` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AbiValue::Bytes(bytes) => Some(bytes),
            AbiValue::FixedBytes(word, len) => Some(&word[..*len]),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AbiValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Elements of an array, fixed array, tuple or struct.
    pub fn as_slice(&self) -> Option<&[AbiValue]> {
        match self {
            AbiValue::Array(values) | AbiValue::FixedArray(values) | AbiValue::Tuple(values) => {
                Some(values)
            }
            AbiValue::Struct(value) => Some(value.fields()),
            _ => None,
        }
    }

    /// Consume a composite value into its elements.
    pub fn into_values(self) -> Option<Vec<AbiValue>> {
        match self {
            AbiValue::Array(values) | AbiValue::FixedArray(values) | AbiValue::Tuple(values) => {
                Some(values)
            }
            AbiValue::Struct(value) => Some(value.into_fields()),
            _ => None,
        }
    }

    /// Check that this value can be encoded as `ty`.
    pub fn type_check(&self, ty: &AbiType) -> Result<(), AbiError> {
        let mismatch = || AbiError::TypeMismatch {
            expected: ty.to_string(),
            found: self.kind(),
        };
        match (self, ty) {
            (AbiValue::Address(_), AbiType::Address)
            | (AbiValue::Bool(_), AbiType::Bool)
            | (AbiValue::Bytes(_), AbiType::Bytes)
            | (AbiValue::String(_), AbiType::String) => Ok(()),
            (AbiValue::Uint(value, _), AbiType::Uint(bits)) => {
                if *bits < 256 && value.bit_len() > *bits {
                    return Err(AbiError::ValueOutOfRange(ty.to_string()));
                }
                Ok(())
            }
            (AbiValue::Int(value, _), AbiType::Int(bits)) => {
                if *bits < 256 {
                    let high = value.asr(*bits - 1);
                    if high != I256::ZERO && high != I256::MINUS_ONE {
                        return Err(AbiError::ValueOutOfRange(ty.to_string()));
                    }
                }
                Ok(())
            }
            (AbiValue::FixedBytes(_, len), AbiType::FixedBytes(expected)) => {
                if len > expected {
                    return Err(mismatch());
                }
                Ok(())
            }
            (AbiValue::Array(values), AbiType::Array(elem)) => {
                values.iter().try_for_each(|value| value.type_check(elem))
            }
            (AbiValue::FixedArray(values), AbiType::FixedArray(array)) => {
                if values.len() != array.len() {
                    return Err(AbiError::LengthMismatch {
                        expected: array.len(),
                        found: values.len(),
                    });
                }
                values.iter().try_for_each(|value| value.type_check(array.elem()))
            }
            (AbiValue::Tuple(values), AbiType::Tuple(tuple)) => {
                type_check_all(values, tuple.fields())
            }
            (AbiValue::Struct(value), AbiType::Struct(structure)) => {
                type_check_all(value.fields(), structure.fields())
            }
            // A plain tuple is accepted where a struct of the same shape is expected.
            (AbiValue::Tuple(values), AbiType::Struct(structure)) => {
                type_check_all(values, structure.fields())
            }
            _ => Err(mismatch()),
        }
    }
}

/// Type-check a value list against a type list of the same length.
pub fn type_check_all(values: &[AbiValue], types: &[AbiType]) -> Result<(), AbiError> {
    if values.len() != types.len() {
        return Err(AbiError::LengthMismatch {
            expected: types.len(),
            found: values.len(),
        });
    }
    values
        .iter()
        .zip(types)
        .try_for_each(|(value, ty)| value.type_check(ty))
}

impl From<Address> for AbiValue {
    fn from(value: Address) -> Self {
        AbiValue::Address(value)
    }
}

impl From<bool> for AbiValue {
    fn from(value: bool) -> Self {
        AbiValue::Bool(value)
    }
}

impl From<U256> for AbiValue {
    fn from(value: U256) -> Self {
        AbiValue::Uint(value, 256)
    }
}

impl From<I256> for AbiValue {
    fn from(value: I256) -> Self {
        AbiValue::Int(value, 256)
    }
}

impl From<B256> for AbiValue {
    fn from(value: B256) -> Self {
        AbiValue::FixedBytes(value, 32)
    }
}

impl From<Bytes> for AbiValue {
    fn from(value: Bytes) -> Self {
        AbiValue::Bytes(value)
    }
}

impl From<String> for AbiValue {
    fn from(value: String) -> Self {
        AbiValue::String(value)
    }
}

impl From<&str> for AbiValue {
    fn from(value: &str) -> Self {
        AbiValue::String(value.to_string())
    }
}

impl From<ContractStruct> for AbiValue {
    fn from(value: ContractStruct) -> Self {
        AbiValue::Struct(value)
    }
}
