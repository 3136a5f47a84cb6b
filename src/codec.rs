//! Solidity ABI head/tail codec.
//!
//! Every argument or return list is laid out as an implicit tuple:
//!
//! ```text
//! ┌──────────── head ─────────────┬──────── tail ────────┐
//! │ static value │ offset │ ...   │ dynamic value │ ...  │
//! └──────────────┴───┬────┴───────┴───────▲───────┴──────┘
//!                    └────────────────────┘
//!         offset is relative to the start of this tuple
//! ```
//!
//! Static values sit inline in the head. Dynamic values (`bytes`, `string`,
//! `T[]`, and composites containing them) store a word offset in the head and
//! are appended to the tail in field order. The same rule applies
//! recursively inside nested tuples and arrays, with offsets always relative
//! to the start of the tuple currently being encoded or decoded.

use alloy::primitives::{Address, Bytes, B256, I256, U256};

use crate::ext::{type_check_all, AbiType, AbiValue, ContractStruct, WORD_SIZE};

/// Errors produced while encoding or decoding ABI data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    /// A read would run past the end of the buffer
    #[error("buffer overrun: need {needed} bytes at offset {offset}, have {available}")]
    BufferOverrun {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// An offset or length word does not fit the buffer
    #[error("invalid offset or length word {0:#x}")]
    InvalidLength(U256),
    /// A bool word other than 0 or 1
    #[error("invalid bool encoding {0}")]
    InvalidBool(B256),
    /// A `string` tail that is not valid UTF-8
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    /// A value does not match its declared type
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: String,
        found: &'static str,
    },
    /// Wrong number of values for a type list or fixed array
    #[error("length mismatch: expected {expected} values, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    /// An integer does not fit the declared bit width
    #[error("value out of range for {0}")]
    ValueOutOfRange(String),
    /// An unparseable or out-of-range type descriptor
    #[error("invalid type `{0}`")]
    InvalidType(String),
    /// Calldata selector does not match the function
    #[error("selector mismatch: expected {expected}, found {found}")]
    SelectorMismatch { expected: String, found: String },
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode `values` as the tuple described by `types`.
///
/// Values are type-checked first, so a mismatch never produces a partial
/// encoding.
pub fn encode(values: &[AbiValue], types: &[AbiType]) -> Result<Vec<u8>, AbiError> {
    type_check_all(values, types)?;
    let mut out = Vec::new();
    encode_sequence(values.iter().zip(types), &mut out);
    Ok(out)
}

/// Encode a single value as a one-element tuple.
pub fn encode_single(value: &AbiValue, ty: &AbiType) -> Result<Vec<u8>, AbiError> {
    encode(std::slice::from_ref(value), std::slice::from_ref(ty))
}

fn push_word(out: &mut Vec<u8>, word: [u8; 32]) {
    out.extend_from_slice(&word);
}

fn push_usize(out: &mut Vec<u8>, value: usize) {
    push_word(out, U256::from(value).to_be_bytes::<32>());
}

fn push_padded(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
    let rem = data.len() % WORD_SIZE;
    if rem != 0 {
        out.resize(out.len() + WORD_SIZE - rem, 0);
    }
}

/// Head/tail encode an ordered list of already type-checked values.
fn encode_sequence<'a, I>(items: I, out: &mut Vec<u8>)
where
    I: IntoIterator<Item = (&'a AbiValue, &'a AbiType)>,
{
    let items: Vec<_> = items.into_iter().collect();
    let head_size: usize = items.iter().map(|(_, ty)| ty.head_size()).sum();

    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();
    for (value, ty) in items {
        if ty.is_dynamic() {
            push_usize(&mut head, head_size + tail.len());
            encode_value(value, ty, &mut tail);
        } else {
            encode_value(value, ty, &mut head);
        }
    }
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
}

fn encode_value(value: &AbiValue, ty: &AbiType, out: &mut Vec<u8>) {
    match (value, ty) {
        (AbiValue::Address(address), _) => {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(address.as_slice());
            push_word(out, word);
        }
        (AbiValue::Bool(flag), _) => {
            let mut word = [0u8; 32];
            word[31] = u8::from(*flag);
            push_word(out, word);
        }
        (AbiValue::Uint(number, _), _) => push_word(out, number.to_be_bytes::<32>()),
        // Two's complement over the full word sign-extends narrower ints.
        (AbiValue::Int(number, _), _) => push_word(out, number.into_raw().to_be_bytes::<32>()),
        (AbiValue::FixedBytes(word, _), _) => push_word(out, word.0),
        (AbiValue::Bytes(bytes), _) => {
            push_usize(out, bytes.len());
            push_padded(out, bytes);
        }
        (AbiValue::String(text), _) => {
            push_usize(out, text.len());
            push_padded(out, text.as_bytes());
        }
        (AbiValue::Array(values), AbiType::Array(elem)) => {
            push_usize(out, values.len());
            encode_sequence(values.iter().map(|value| (value, elem.as_ref())), out);
        }
        (AbiValue::FixedArray(values), AbiType::FixedArray(array)) => {
            encode_sequence(values.iter().map(|value| (value, array.elem())), out);
        }
        (AbiValue::Tuple(values), AbiType::Tuple(tuple)) => {
            encode_sequence(values.iter().zip(tuple.fields()), out);
        }
        (AbiValue::Struct(value), AbiType::Struct(structure)) => {
            encode_sequence(value.fields().iter().zip(structure.fields()), out);
        }
        (AbiValue::Tuple(values), AbiType::Struct(structure)) => {
            encode_sequence(values.iter().zip(structure.fields()), out);
        }
        // Unreachable after type_check_all.
        _ => {}
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode `data` as the tuple described by `types`.
///
/// An empty type list decodes to an empty list regardless of `data`.
pub fn decode(data: &[u8], types: &[AbiType]) -> Result<Vec<AbiValue>, AbiError> {
    decode_sequence(data, types.iter())
}

/// Decode a single value encoded as a one-element tuple.
pub fn decode_single(data: &[u8], ty: &AbiType) -> Result<AbiValue, AbiError> {
    let mut values = decode(data, std::slice::from_ref(ty))?;
    values.pop().ok_or(AbiError::LengthMismatch {
        expected: 1,
        found: 0,
    })
}

fn read_word(data: &[u8], offset: usize) -> Result<[u8; 32], AbiError> {
    let end = offset.checked_add(WORD_SIZE).ok_or(AbiError::BufferOverrun {
        offset,
        needed: WORD_SIZE,
        available: data.len(),
    })?;
    let slice = data.get(offset..end).ok_or(AbiError::BufferOverrun {
        offset,
        needed: WORD_SIZE,
        available: data.len(),
    })?;
    let mut word = [0u8; 32];
    word.copy_from_slice(slice);
    Ok(word)
}

/// Read an offset or length word, rejecting values that cannot index `data`.
fn read_usize(data: &[u8], offset: usize) -> Result<usize, AbiError> {
    let word = read_word(data, offset)?;
    let invalid = || AbiError::InvalidLength(U256::from_be_bytes(word));
    if word[..24].iter().any(|b| *b != 0) {
        return Err(invalid());
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[24..]);
    let value = usize::try_from(u64::from_be_bytes(low)).map_err(|_| invalid())?;
    if value > data.len() {
        return Err(invalid());
    }
    Ok(value)
}

fn read_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], AbiError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(AbiError::BufferOverrun {
            offset,
            needed: len,
            available: data.len(),
        })
}

/// Decode a tuple region; `data` starts at the tuple's own first byte.
fn decode_sequence<'a, I>(data: &[u8], types: I) -> Result<Vec<AbiValue>, AbiError>
where
    I: IntoIterator<Item = &'a AbiType>,
{
    let types = types.into_iter();
    // A type list cannot be trusted to size the allocation; the buffer can.
    let mut values = Vec::with_capacity(types.size_hint().0.min(data.len() / WORD_SIZE));
    let mut head = 0usize;
    for ty in types {
        if ty.is_dynamic() {
            let offset = read_usize(data, head)?;
            values.push(decode_value(&data[offset..], ty)?);
        } else {
            let region = data.get(head..).ok_or(AbiError::BufferOverrun {
                offset: head,
                needed: ty.head_size(),
                available: data.len(),
            })?;
            values.push(decode_value(region, ty)?);
        }
        head = head.saturating_add(ty.head_size());
    }
    Ok(values)
}

/// Decode one value whose encoding starts at `data[0]`.
fn decode_value(data: &[u8], ty: &AbiType) -> Result<AbiValue, AbiError> {
    let value = match ty {
        AbiType::Address => {
            let word = read_word(data, 0)?;
            if word[..12].iter().any(|b| *b != 0) {
                return Err(AbiError::ValueOutOfRange(ty.to_string()));
            }
            AbiValue::Address(Address::from_slice(&word[12..]))
        }
        AbiType::Bool => {
            let word = read_word(data, 0)?;
            if word[..31].iter().any(|b| *b != 0) || word[31] > 1 {
                return Err(AbiError::InvalidBool(B256::from(word)));
            }
            AbiValue::Bool(word[31] == 1)
        }
        // Narrow integers must be zero- or sign-extended to the full word.
        AbiType::Uint(bits) => {
            let value = AbiValue::Uint(U256::from_be_bytes(read_word(data, 0)?), *bits);
            value.type_check(ty)?;
            value
        }
        AbiType::Int(bits) => {
            let raw = U256::from_be_bytes(read_word(data, 0)?);
            let value = AbiValue::Int(I256::from_raw(raw), *bits);
            value.type_check(ty)?;
            value
        }
        AbiType::FixedBytes(len) => {
            let word = read_word(data, 0)?;
            if word.get(*len..).is_some_and(|padding| padding.iter().any(|b| *b != 0)) {
                return Err(AbiError::ValueOutOfRange(ty.to_string()));
            }
            AbiValue::FixedBytes(B256::from(word), *len)
        }
        AbiType::Bytes => {
            let len = read_usize(data, 0)?;
            AbiValue::Bytes(Bytes::copy_from_slice(read_slice(data, WORD_SIZE, len)?))
        }
        AbiType::String => {
            let len = read_usize(data, 0)?;
            let raw = read_slice(data, WORD_SIZE, len)?;
            AbiValue::String(
                std::str::from_utf8(raw)
                    .map_err(|_| AbiError::InvalidUtf8)?
                    .to_string(),
            )
        }
        AbiType::Array(elem) => {
            let count = read_usize(data, 0)?;
            let body = &data[WORD_SIZE..];
            // Every element needs at least its head, so a count larger than
            // the remaining buffer allows is malformed.
            let needed = count.checked_mul(elem.head_size()).unwrap_or(usize::MAX);
            if needed > body.len() {
                return Err(AbiError::BufferOverrun {
                    offset: WORD_SIZE,
                    needed,
                    available: body.len(),
                });
            }
            AbiValue::Array(decode_sequence(body, std::iter::repeat(elem.as_ref()).take(count))?)
        }
        AbiType::FixedArray(array) => {
            // Zero-sized elements still count as one byte so the length stays
            // bounded by the buffer.
            let needed = array
                .len()
                .checked_mul(array.elem().head_size().max(1))
                .unwrap_or(usize::MAX);
            if needed > data.len() {
                return Err(AbiError::BufferOverrun {
                    offset: 0,
                    needed,
                    available: data.len(),
                });
            }
            AbiValue::FixedArray(decode_sequence(
                data,
                std::iter::repeat(array.elem()).take(array.len()),
            )?)
        }
        AbiType::Tuple(tuple) => AbiValue::Tuple(decode_sequence(data, tuple.fields())?),
        AbiType::Struct(structure) => AbiValue::Struct(ContractStruct::new(
            structure.name(),
            decode_sequence(data, structure.fields())?,
        )),
    };
    Ok(value)
}
