//! Contract error taxonomy and custom-error registry.
//!
//! Every failure that comes back from a contract call is recovered into a
//! `ContractError` value instead of being thrown across the call boundary:
//!
//! - **Revert**: `Error(string)` reason, or an undecodable payload as hex
//! - **Panic**: Solidity `Panic(uint256)` with its code
//! - **Custom**: a payload whose selector matches a registered custom error
//! - **Decoding**: return data that does not match the expected output types
//! - **Provider**: transport failures, passed through untouched
//!
//! ## Registry
//!
//! ```text
//! register_custom_errors!("Unauthorized(address)")
//!     │
//!     ▼ (link time, inventory)
//! ErrorSignature { signature }
//!     │
//!     ▼ ErrorRegistry::with_linked_errors()
//! selector → CustomErrorFactory
//!     │
//!     ▼ (runtime)
//! try_decoding_revert(&data) → ContractError::Custom(..)
//! ```
//!
//! The registry is an explicit object owned by the `ContractClient`, so the
//! set of known errors is fixed by construction order rather than by
//! whichever module happened to touch a global first.

use std::{fmt, sync::Arc};

use alloy::{
    primitives::{hex, Bytes, Selector, U256},
    sol_types::PanicKind,
    transports::{RpcError, TransportError},
};
use dashmap::DashMap;

use crate::ext::{
    classify_message, decode, parse_signature, selector, AbiError, AbiType, AbiValue,
};

/// Selector of the built-in `Error(string)` revert.
pub const ERROR_STRING_SELECTOR: Selector = Selector::new([0x08, 0xc3, 0x79, 0xa0]);

/// Selector of the built-in `Panic(uint256)` revert.
pub const PANIC_SELECTOR: Selector = Selector::new([0x4e, 0x48, 0x7b, 0x71]);

// ============================================================================
// ContractError
// ============================================================================

/// Failure of a single contract call, delivered through the same channel as
/// its success value.
///
/// Cheap to clone so the same error can be handed to every pending sub-call
/// of a multicall.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContractError {
    /// Execution reverted with a reason string (or the raw payload as hex)
    #[error("execution reverted: {reason}")]
    Revert { reason: String },

    /// Execution hit a Solidity panic
    #[error("execution panicked: {} ({code:#x})", panic_reason(*.code))]
    Panic { code: U256 },

    /// Revert payload matched a registered custom error
    #[error("{0}")]
    Custom(CustomError),

    /// Return data could not be decoded
    #[error("failed to decode {data}: {message}")]
    Decoding {
        data: Bytes,
        message: String,
        cause: Option<AbiError>,
    },

    /// Transport or node failure, passed through unchanged
    #[error(transparent)]
    Provider(Arc<TransportError>),

    /// The aggregate owning this call was dropped, or its transaction was never submitted
    #[error("call was never executed: owning aggregate was not sent")]
    NotExecuted,
}

impl ContractError {
    /// Decoding failure for `data` caused by `err`.
    pub fn decoding(data: &[u8], err: AbiError) -> Self {
        ContractError::Decoding {
            data: Bytes::copy_from_slice(data),
            message: err.to_string(),
            cause: Some(err),
        }
    }

    /// Decoding failure without an underlying codec error.
    pub fn decoding_message(data: &[u8], message: impl Into<String>) -> Self {
        ContractError::Decoding {
            data: Bytes::copy_from_slice(data),
            message: message.into(),
            cause: None,
        }
    }

    /// The custom error, if this is one.
    pub fn as_custom(&self) -> Option<&CustomError> {
        match self {
            ContractError::Custom(err) => Some(err),
            _ => None,
        }
    }

    /// The revert reason, if this is a plain revert.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            ContractError::Revert { reason } => Some(reason),
            _ => None,
        }
    }
}

impl From<TransportError> for ContractError {
    fn from(err: TransportError) -> Self {
        ContractError::Provider(Arc::new(err))
    }
}

/// Description of a Solidity panic code.
pub fn panic_reason(code: U256) -> &'static str {
    u32::try_from(code).ok().and_then(PanicKind::from_number).map_or("unknown panic code", PanicKind::as_str)
}

// ============================================================================
// Custom errors
// ============================================================================

/// A decoded custom error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomError {
    pub name: String,
    pub selector: Selector,
    pub fields: Vec<AbiValue>,
}

impl fmt::Display for CustomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field:?}")?;
        }
        f.write_str(")")
    }
}

/// Builds a `CustomError` from decoded fields.
pub type CustomErrorDecode = Arc<dyn Fn(&str, Selector, Vec<AbiValue>) -> CustomError + Send + Sync>;

/// Registry entry for one custom error.
#[derive(Clone)]
pub struct CustomErrorFactory {
    pub name: String,
    pub selector: Selector,
    pub inputs: Vec<AbiType>,
    pub decode: CustomErrorDecode,
}

impl fmt::Debug for CustomErrorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomErrorFactory")
            .field("name", &self.name)
            .field("selector", &self.selector)
            .field("inputs", &self.inputs)
            .finish()
    }
}

impl CustomErrorFactory {
    pub fn new(name: impl Into<String>, inputs: Vec<AbiType>) -> Self {
        let name = name.into();
        let params: Vec<String> = inputs.iter().map(ToString::to_string).collect();
        let selector = selector(&format!("{name}({})", params.join(",")));
        Self {
            name,
            selector,
            inputs,
            decode: Arc::new(|name, selector, fields| CustomError {
                name: name.to_string(),
                selector,
                fields,
            }),
        }
    }

    /// Factory for a signature such as `InsufficientBalance(uint256,uint256)`.
    pub fn from_signature(signature: &str) -> Result<Self, AbiError> {
        let (name, inputs) = parse_signature(signature)?;
        Ok(Self::new(name, inputs))
    }

    /// Replace the function turning decoded fields into a `CustomError`.
    pub fn with_decode<F>(mut self, decode: F) -> Self
    where
        F: Fn(&str, Selector, Vec<AbiValue>) -> CustomError + Send + Sync + 'static,
    {
        self.decode = Arc::new(decode);
        self
    }

    /// Decode the bytes following the selector.
    pub fn decode(&self, data: &[u8]) -> Result<CustomError, AbiError> {
        let fields = decode(data, &self.inputs)?;
        Ok((self.decode)(&self.name, self.selector, fields))
    }
}

/// A custom-error signature submitted at link time.
pub struct ErrorSignature {
    /// Contract the error belongs to (diagnostics only)
    pub contract: &'static str,
    /// Canonical or human-readable error signature
    pub signature: &'static str,
}

// Collected at link time; read by ErrorRegistry::with_linked_errors.
inventory::collect!(ErrorSignature);

// ============================================================================
// ErrorRegistry
// ============================================================================

/// Selector-keyed registry of custom errors.
///
/// Registration is additive and idempotent: registering a selector that is
/// already known keeps the first entry.
#[derive(Debug, Default)]
pub struct ErrorRegistry {
    factories: DashMap<Selector, CustomErrorFactory>,
}

impl ErrorRegistry {
    /// Empty registry. `Error(string)` and `Panic(uint256)` are always handled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with every signature submitted via `register_custom_errors!`.
    pub fn with_linked_errors() -> Self {
        let registry = Self::new();
        for entry in inventory::iter::<ErrorSignature> {
            if let Err(err) = registry.register_signature(entry.signature) {
                tracing::warn!(
                    contract = entry.contract,
                    signature = entry.signature,
                    error = %err,
                    "skipping unparseable custom error signature"
                );
            }
        }
        registry
    }

    /// Register a factory. Returns `false` if the selector was already known.
    pub fn register(&self, factory: CustomErrorFactory) -> bool {
        match self.factories.entry(factory.selector) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                tracing::trace!(name = %factory.name, selector = %factory.selector, "registered custom error");
                slot.insert(factory);
                true
            }
        }
    }

    /// Parse and register an error signature.
    pub fn register_signature(&self, signature: &str) -> Result<Selector, AbiError> {
        let factory = CustomErrorFactory::from_signature(signature)?;
        let selector = factory.selector;
        self.register(factory);
        Ok(selector)
    }

    pub fn lookup(&self, selector: Selector) -> Option<CustomErrorFactory> {
        self.factories.get(&selector).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Turn a revert payload into a `ContractError`. Never fails.
    ///
    /// Resolution order: registered custom error, `Error(string)`,
    /// `Panic(uint256)`, then a `Revert` carrying the payload as hex.
    pub fn try_decoding_revert(&self, data: &[u8]) -> ContractError {
        let Some((head, body)) = data.split_at_checked(4) else {
            return hex_revert(data);
        };
        let selector = Selector::from_slice(head);

        if let Some(factory) = self.lookup(selector) {
            return match factory.decode(body) {
                Ok(custom) => ContractError::Custom(custom),
                Err(err) => ContractError::decoding(data, err),
            };
        }

        if selector == ERROR_STRING_SELECTOR {
            if let Ok(reason) = decode(body, &[AbiType::String]) {
                if let Some(AbiValue::String(reason)) = reason.into_iter().next() {
                    return ContractError::Revert { reason };
                }
            }
        } else if selector == PANIC_SELECTOR {
            if let Ok(code) = decode(body, &[AbiType::Uint(256)]) {
                if let Some(AbiValue::Uint(code, _)) = code.into_iter().next() {
                    return ContractError::Panic { code };
                }
            }
        }

        hex_revert(data)
    }

    /// Translate a transport error from `eth_call`/`eth_estimateGas`.
    ///
    /// JSON-RPC error responses carrying revert data are decoded with
    /// `try_decoding_revert`; a revert without data keeps the node's message.
    /// Everything else passes through as `ContractError::Provider`.
    pub fn translate_transport_error(&self, err: TransportError) -> ContractError {
        if let RpcError::ErrorResp(payload) = &err {
            if let Some(data) = &payload.data {
                if let Ok(data) = serde_json::from_str::<Bytes>(data.get()) {
                    return self.try_decoding_revert(&data);
                }
            }
            if classify_message(&payload.message).is_revert() {
                return ContractError::Revert {
                    reason: payload.message.to_string(),
                };
            }
        }
        ContractError::from(err)
    }
}

fn hex_revert(data: &[u8]) -> ContractError {
    ContractError::Revert {
        reason: hex::encode_prefixed(data),
    }
}

/// Register custom-error signatures with every `ErrorRegistry` built by
/// `ErrorRegistry::with_linked_errors()`.
///
/// # Example
///
/// ```ignore
/// register_custom_errors!(Vault => [
///     "InsufficientBalance(uint256 available, uint256 required)",
///     "Unauthorized(address)",
/// ]);
/// ```
#[macro_export]
macro_rules! register_custom_errors {
    ($contract:ident => [$($signature:literal),* $(,)?]) => {
        $(
            $crate::__private::inventory::submit! {
                $crate::ext::ErrorSignature {
                    contract: stringify!($contract),
                    signature: $signature,
                }
            }
        )*
    };
}
