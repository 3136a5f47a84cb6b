//! In-memory chain for exercising call builders, aggregation and inclusion
//! polling without a node.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.respond(TOKEN, |_| Ok(U256::from(1).to_be_bytes::<32>().to_vec().into()));
//! let client = mock_client(transport.clone()).await;
//!
//! let mut aggregate = client.aggregate();
//! let supply = aggregate.add_call(client.read_call(TOKEN, &total_supply, &[])?, false);
//! aggregate.call().await?;
//! assert_eq!(supply.await?, vec![AbiValue::uint256(1u64)]);
//! ```

mod multicall;

#[cfg(test)]
mod error_scenarios;

pub use multicall::*;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use alloy::{
    eips::BlockId,
    primitives::{address, hex, keccak256, Address, Bytes, B256},
    rpc::{
        json_rpc::ErrorPayload,
        types::{state::StateOverride, BlockOverrides},
    },
    transports::{RpcError, TransportErrorKind, TransportResult},
};
use async_trait::async_trait;
use serde_json::value::RawValue;

use crate::ext::{
    encode, AbiType, AbiValue, CallRequest, ChainTransport, ClientConfig, ContractClient,
    FeePricing, InclusionReceipt, ERROR_STRING_SELECTOR, MULTICALL3_ADDRESS,
};

pub const CHAIN_ID: u64 = 1;
pub const TOKEN: Address = address!("1000000000000000000000000000000000000001");
pub const VAULT: Address = address!("1000000000000000000000000000000000000002");
pub const ORACLE: Address = address!("1000000000000000000000000000000000000003");

/// Scripted contract behavior: return data, or revert data on `Err`.
pub type Handler = Arc<dyn Fn(&CallRequest) -> Result<Bytes, Bytes> + Send + Sync>;

/// One `eth_call` seen by the transport.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: CallRequest,
    pub block: BlockId,
    pub state_overrides: Option<StateOverride>,
}

struct PendingReceipt {
    misses: usize,
    receipt: InclusionReceipt,
}

#[derive(Default)]
struct State {
    handlers: HashMap<Address, Handler>,
    calls: Vec<RecordedCall>,
    sent: Vec<Bytes>,
    send_rejection: Option<String>,
    fills: usize,
    receipts: HashMap<B256, PendingReceipt>,
    receipt_polls: usize,
    receipt_failures: Vec<String>,
    block_number: u64,
    blocks_per_poll: u64,
}

/// `ChainTransport` backed by scripted handlers.
///
/// Calls to `MULTICALL3_ADDRESS` are executed by `MockMulticall` unless a
/// handler is registered for that address.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn respond<F>(&self, target: Address, handler: F)
    where
        F: Fn(&CallRequest) -> Result<Bytes, Bytes> + Send + Sync + 'static,
    {
        self.state().handlers.insert(target, Arc::new(handler));
    }

    /// Every call to `target` reverts with `Error(reason)`.
    pub fn revert_with_reason(&self, target: Address, reason: &str) {
        let payload = error_string(reason);
        self.respond(target, move |_| Err(payload.clone()));
    }

    pub fn reject_sends_with(&self, message: &str) {
        self.state().send_rejection = Some(message.to_string());
    }

    /// Receipt for `hash` shows up after `misses` empty polls.
    pub fn mine_after(&self, hash: B256, misses: usize, block_number: u64, status: bool) {
        self.state().receipts.insert(
            hash,
            PendingReceipt {
                misses,
                receipt: InclusionReceipt {
                    transaction_hash: hash,
                    block_number,
                    status,
                    gas_used: 21_000,
                },
            },
        );
    }

    /// The next `count` receipt polls fail with `message`.
    pub fn fail_receipt_polls(&self, count: usize, message: &str) {
        let mut state = self.state();
        state
            .receipt_failures
            .extend(std::iter::repeat(message.to_string()).take(count));
    }

    pub fn set_block_number(&self, block_number: u64) {
        self.state().block_number = block_number;
    }

    /// Advance the chain head on every `get_block_number`.
    pub fn advance_blocks_per_poll(&self, blocks: u64) {
        self.state().blocks_per_poll = blocks;
    }

    pub fn block_number(&self) -> u64 {
        self.state().block_number
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.state().sent.clone()
    }

    pub fn fill_count(&self) -> usize {
        self.state().fills
    }

    pub fn receipt_polls(&self) -> usize {
        self.state().receipt_polls
    }

    /// Run one message call against the scripted contracts.
    pub fn execute(&self, request: &CallRequest) -> Result<Bytes, Bytes> {
        let handler = self.state().handlers.get(&request.to).cloned();
        match handler {
            Some(handler) => handler(request),
            None if request.to == MULTICALL3_ADDRESS => MockMulticall::new(self).execute(request),
            // Calls to accounts without code succeed with no data.
            None => Ok(Bytes::new()),
        }
    }
}

#[async_trait]
impl ChainTransport for MockTransport {
    async fn chain_id(&self) -> TransportResult<u64> {
        Ok(CHAIN_ID)
    }

    async fn call(
        &self,
        request: &CallRequest,
        block: BlockId,
        state_overrides: Option<&StateOverride>,
        _block_overrides: Option<&BlockOverrides>,
    ) -> TransportResult<Bytes> {
        self.state().calls.push(RecordedCall {
            request: request.clone(),
            block,
            state_overrides: state_overrides.cloned(),
        });
        self.execute(request).map_err(revert_error)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> TransportResult<B256> {
        let mut state = self.state();
        if let Some(message) = &state.send_rejection {
            return Err(RpcError::ErrorResp(ErrorPayload {
                code: -32000,
                message: message.clone().into(),
                data: None,
            }));
        }

        let hash = keccak256(raw);
        state.sent.push(Bytes::copy_from_slice(raw));
        let block_number = state.block_number + 1;
        state.receipts.insert(
            hash,
            PendingReceipt {
                misses: 0,
                receipt: InclusionReceipt {
                    transaction_hash: hash,
                    block_number,
                    status: true,
                    gas_used: 21_000,
                },
            },
        );
        Ok(hash)
    }

    async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> TransportResult<Option<InclusionReceipt>> {
        let mut state = self.state();
        state.receipt_polls += 1;
        if !state.receipt_failures.is_empty() {
            let message = state.receipt_failures.remove(0);
            return Err(TransportErrorKind::custom_str(&message));
        }
        Ok(state.receipts.get_mut(&hash).and_then(|pending| {
            if pending.misses > 0 {
                pending.misses -= 1;
                None
            } else {
                Some(pending.receipt)
            }
        }))
    }

    async fn get_block_number(&self) -> TransportResult<u64> {
        let mut state = self.state();
        state.block_number += state.blocks_per_poll;
        Ok(state.block_number)
    }

    async fn fill_transaction(&self, mut request: CallRequest) -> TransportResult<CallRequest> {
        self.state().fills += 1;
        request.chain_id.get_or_insert(CHAIN_ID);
        request.nonce.get_or_insert(0);
        request.gas.get_or_insert(100_000);
        if request.fees().is_none() {
            request.set_fees(FeePricing::Eip1559 {
                max_fee: 2_000_000_000,
                max_priority_fee: 1_000_000_000,
            });
        }
        Ok(request)
    }
}

/// Client over `transport` with default configuration.
pub async fn mock_client(transport: MockTransport) -> ContractClient<MockTransport> {
    ContractClient::new(transport, ClientConfig::default())
        .await
        .expect("mock transport never fails chain_id")
}

/// `Error(string)` revert payload.
pub fn error_string(reason: &str) -> Bytes {
    let mut data = ERROR_STRING_SELECTOR.to_vec();
    data.extend(encode(&[AbiValue::from(reason)], &[AbiType::String]).expect("string encodes"));
    data.into()
}

/// ABI-encoded `uint256` return data.
pub fn uint_word(value: u64) -> Bytes {
    Bytes::from(alloy::primitives::U256::from(value).to_be_bytes::<32>().to_vec())
}

/// Node response to an `eth_call` that reverted with `data`.
pub fn revert_error(data: Bytes) -> alloy::transports::TransportError {
    let data = RawValue::from_string(format!("\"{}\"", hex::encode_prefixed(&data)))
        .expect("hex string is valid json");
    RpcError::ErrorResp(ErrorPayload {
        code: 3,
        message: "execution reverted".into(),
        data: Some(data),
    })
}
