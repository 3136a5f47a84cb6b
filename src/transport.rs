//! Chain access boundary.
//!
//! ```text
//! ContractClient
//!     │
//!     ▼
//! ChainTransport (trait)
//! ├── AlloyTransport<P>: any alloy Provider<Ethereum>
//! └── MockTransport (tests)
//! ```
//!
//! JSON-RPC framing, batching and HTTP live in alloy. The trait exposes only
//! the handful of requests the call builders and the inclusion poller need.

use alloy::{
    eips::BlockId,
    network::{Ethereum, ReceiptResponse},
    primitives::{Bytes, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{state::StateOverride, BlockOverrides},
    transports::TransportResult,
};
use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::ext::{CallRequest, FeePricing};

/// Receipt fields the inclusion poller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    /// `true` if execution succeeded
    pub status: bool,
    pub gas_used: u64,
}

/// Requests issued by call builders and the inclusion poller.
#[async_trait]
pub trait ChainTransport: Send + Sync {
    async fn chain_id(&self) -> TransportResult<u64>;

    /// `eth_call` with optional state and block overrides.
    async fn call(
        &self,
        request: &CallRequest,
        block: BlockId,
        state_overrides: Option<&StateOverride>,
        block_overrides: Option<&BlockOverrides>,
    ) -> TransportResult<Bytes>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> TransportResult<B256>;

    /// `None` while the transaction is not yet mined.
    async fn get_transaction_receipt(&self, hash: B256)
        -> TransportResult<Option<InclusionReceipt>>;

    async fn get_block_number(&self) -> TransportResult<u64>;

    /// Fill nonce, gas limit, fees and chain id where missing.
    async fn fill_transaction(&self, request: CallRequest) -> TransportResult<CallRequest>;
}

/// `ChainTransport` over an alloy provider.
#[derive(Debug, Clone)]
pub struct AlloyTransport<P> {
    provider: P,
    chain_id: OnceCell<u64>,
}

impl<P: Provider<Ethereum>> AlloyTransport<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            chain_id: OnceCell::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl AlloyTransport<DynProvider> {
    /// HTTP transport for `rpc_url`; the chain id is fetched eagerly.
    pub async fn connect_http(rpc_url: &str) -> anyhow::Result<Self> {
        let provider = ProviderBuilder::new()
            .connect_http(rpc_url.parse()?)
            .erased();
        let transport = Self::new(provider);
        let chain_id = transport.chain_id().await?;
        tracing::debug!(rpc_url, chain_id, "connected http transport");
        Ok(transport)
    }
}

#[async_trait]
impl<P: Provider<Ethereum>> ChainTransport for AlloyTransport<P> {
    async fn chain_id(&self) -> TransportResult<u64> {
        self.chain_id
            .get_or_try_init(|| async { self.provider.get_chain_id().await })
            .await
            .copied()
    }

    async fn call(
        &self,
        request: &CallRequest,
        block: BlockId,
        state_overrides: Option<&StateOverride>,
        block_overrides: Option<&BlockOverrides>,
    ) -> TransportResult<Bytes> {
        let mut call = self
            .provider
            .call(request.to_transaction_request())
            .block(block);
        if let Some(state) = state_overrides {
            call = call.overrides(state.clone());
        }
        if let Some(overrides) = block_overrides {
            call = call.with_block_overrides(overrides.clone());
        }
        call.await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> TransportResult<B256> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(*pending.tx_hash())
    }

    async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> TransportResult<Option<InclusionReceipt>> {
        let receipt = self.provider.get_transaction_receipt(hash).await?;
        Ok(receipt.and_then(|receipt| {
            // Pending receipts from some nodes carry no block number yet.
            let block_number = receipt.block_number()?;
            Some(InclusionReceipt {
                transaction_hash: receipt.transaction_hash(),
                block_number,
                status: receipt.status(),
                gas_used: receipt.gas_used(),
            })
        }))
    }

    async fn get_block_number(&self) -> TransportResult<u64> {
        self.provider.get_block_number().await
    }

    async fn fill_transaction(&self, mut request: CallRequest) -> TransportResult<CallRequest> {
        if request.chain_id.is_none() {
            request.chain_id = Some(self.chain_id().await?);
        }
        if request.nonce.is_none() {
            if let Some(from) = request.from {
                request.nonce = Some(self.provider.get_transaction_count(from).pending().await?);
            }
        }
        if request.fees().is_none() {
            request.set_fees(FeePricing::estimate(&self.provider).await?);
        }
        if request.gas.is_none() {
            request.gas = Some(
                self.provider
                    .estimate_gas(request.to_transaction_request())
                    .await?,
            );
        }
        tracing::debug!(
            to = %request.to,
            nonce = ?request.nonce,
            gas = ?request.gas,
            fees = ?request.fees(),
            "filled transaction"
        );
        Ok(request)
    }
}
