//! # alloy-call-ext
//!
//! Typed contract calls and multicall aggregation on top of Alloy.
//!
//! ## Core Features
//!
//! - **ABI Codec**: Tagged `AbiType`/`AbiValue` with head/tail encoding and bounds-checked decoding
//! - **Call Builders**: `ReadCall` / `ReadWriteCall` with fluent configuration, `call`, `sign`, `send`
//! - **Multicall Aggregation**: Batch heterogeneous calls into one Multicall3 request with per-call handles
//! - **Contract Error Decoding**: Revert reasons, panics and registered custom errors
//! - **Inclusion Polling**: Wait for a sent transaction to be mined and confirmed
//!
//! ## Usage
//!
//! ```ignore
//! use alloy_call_ext::ext::*;
//!
//! let transport = AlloyTransport::connect_http(rpc_url).await?;
//! let client = ContractClient::new(transport, ClientConfig::default()).await?;
//!
//! let balance_of = AbiFunction::parse("balanceOf(address)(uint256)")?;
//! let mut aggregate = client.aggregate();
//! let a = aggregate.add_call(client.read_call(token_a, &balance_of, &[owner.into()])?, true);
//! let b = aggregate.add_call(client.read_call(token_b, &balance_of, &[owner.into()])?, true);
//! aggregate.call().await?;
//! let (a, b) = (a.await?, b.await?);
//! ```

// ============================================================================
// Internal Module Declarations
// ============================================================================

/// ABI type descriptors and signature parsing
mod abi_type;

/// Tagged ABI values
mod abi_value;

/// Head/tail ABI encoder and decoder
mod codec;

/// Function descriptors and selectors
mod function;

/// Contract error taxonomy and custom-error registry
mod contract_error;

/// RPC error classification
mod error;

/// Transaction fields of one invocation
mod call_request;

/// Fee pricing for outgoing transactions
mod fees;

/// Signing boundary
mod signer;

/// Chain access boundary and the alloy-backed transport
mod transport;

/// Client configuration
mod config;

/// Shared client handle
mod client;

/// ReadCall / ReadWriteCall builders
mod call_builder;

/// Multicall aggregation engine
mod multicall;

/// Multicall3 addresses and bundled bytecode
mod deployment;

/// Inclusion polling for sent transactions
mod pending_tx;

/// Test harness module (compiled only in test mode)
#[cfg(test)]
pub mod test_harness;

// ============================================================================
// Public Exports
// ============================================================================

/// Re-export all public APIs from the alloy crate.
pub use alloy::*;

/// Internal module for macro usage.
pub mod __private {
    /// inventory crate - link-time registration of custom error signatures
    pub use inventory;
}

/// Extension module containing all features:
///
/// - `AbiType` / `AbiValue` / `AbiFunction` - ABI codec
/// - `ContractClient` - Entry point owning transport, error registry and config
/// - `ReadCall` / `ReadWriteCall` - Call builders
/// - `AggregateCall` / `CallHandle` - Multicall aggregation
/// - `PendingInclusion` - Receipt polling
/// - `ErrorRegistry` - Custom error registry
pub mod ext {
    pub use super::abi_type::*;
    pub use super::abi_value::*;
    pub use super::call_builder::*;
    pub use super::call_request::*;
    pub use super::client::*;
    pub use super::codec::*;
    pub use super::config::*;
    pub use super::contract_error::*;
    pub use super::deployment::*;
    pub use super::error::*;
    pub use super::fees::*;
    pub use super::function::*;
    pub use super::multicall::*;
    pub use super::pending_tx::*;
    pub use super::signer::*;
    pub use super::transport::*;
}
