//! Typed contract call builders.
//!
//! ## Lifecycle
//!
//! ```text
//! ContractClient::read_call()          ContractClient::read_write_call()
//!        │                                        │
//!        ▼                                        ▼
//!   ReadCall<T, R>                       ReadWriteCall<T, R, M>
//!   (fluent setters)                     (fluent setters)
//!        │                                        │
//!        ├── call() ──► eth_call ──► decoder ──► Result<R, ContractError>
//!        │                                        │
//!        └── AggregateCall::add_call()            ├── sign()  ──► Option<SignedTransaction>
//!                                                 └── send()  ──► PendingInclusion<T, M>
//! ```
//!
//! Read calls are reusable. `send` consumes the write call so a builder can
//! only ever be submitted once.

use std::sync::Arc;

use alloy::{
    eips::{eip2930::AccessList, BlockId},
    primitives::{Address, Bytes, U256},
    rpc::types::{state::StateOverride, BlockOverrides},
};

use crate::ext::{
    CallRequest, ChainTransport, ContractClient, ContractError, InclusionReceipt,
    PendingInclusion, SignedTransaction, SignerError, TransactionSigner,
};

/// Turns return data into a typed result.
pub type ResultDecoder<R> = Arc<dyn Fn(&[u8]) -> Result<R, ContractError> + Send + Sync>;

/// Turns an inclusion receipt into the value `PendingInclusion::wait` yields.
pub type ReceiptMapper<M> = Arc<dyn Fn(InclusionReceipt) -> M + Send + Sync>;

/// Failure of `ReadWriteCall::send`.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Fill, submission or revert error from the node
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    /// Transport returned a request still missing signing fields
    #[error("transaction incomplete after fill: {0}")]
    Incomplete(String),
}

/// Per-call `eth_call` context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    /// Falls back to `ClientConfig::default_block`
    pub block: Option<BlockId>,
    pub state_overrides: Option<StateOverride>,
    pub block_overrides: Option<BlockOverrides>,
}

impl CallOptions {
    pub fn at_block(block: BlockId) -> Self {
        Self {
            block: Some(block),
            ..Default::default()
        }
    }
}

/// Fluent configuration shared by every call builder.
pub trait CallBuilderEx: Sized {
    fn request_mut(&mut self) -> &mut CallRequest;

    fn options_mut(&mut self) -> &mut CallOptions;

    fn from(mut self, from: Address) -> Self {
        self.request_mut().from = Some(from);
        self
    }

    fn value(mut self, value: U256) -> Self {
        self.request_mut().value = value;
        self
    }

    fn gas(mut self, gas: u64) -> Self {
        self.request_mut().gas = Some(gas);
        self
    }

    fn gas_price(mut self, gas_price: u128) -> Self {
        self.request_mut().gas_price = Some(gas_price);
        self
    }

    fn max_fee_per_gas(mut self, max_fee: u128) -> Self {
        self.request_mut().max_fee_per_gas = Some(max_fee);
        self
    }

    fn max_priority_fee_per_gas(mut self, max_priority_fee: u128) -> Self {
        self.request_mut().max_priority_fee_per_gas = Some(max_priority_fee);
        self
    }

    fn nonce(mut self, nonce: u64) -> Self {
        self.request_mut().nonce = Some(nonce);
        self
    }

    fn access_list(mut self, access_list: AccessList) -> Self {
        self.request_mut().access_list = Some(access_list);
        self
    }

    fn chain_id(mut self, chain_id: u64) -> Self {
        self.request_mut().chain_id = Some(chain_id);
        self
    }

    fn block(mut self, block: BlockId) -> Self {
        self.options_mut().block = Some(block);
        self
    }

    fn state_overrides(mut self, overrides: StateOverride) -> Self {
        self.options_mut().state_overrides = Some(overrides);
        self
    }

    fn block_overrides(mut self, overrides: BlockOverrides) -> Self {
        self.options_mut().block_overrides = Some(overrides);
        self
    }
}

// ============================================================================
// ReadCall
// ============================================================================

/// A read-only contract invocation.
pub struct ReadCall<T, R> {
    pub(crate) client: ContractClient<T>,
    pub(crate) request: CallRequest,
    pub(crate) options: CallOptions,
    pub(crate) decoder: ResultDecoder<R>,
}

impl<T, R> Clone for ReadCall<T, R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            request: self.request.clone(),
            options: self.options.clone(),
            decoder: self.decoder.clone(),
        }
    }
}

impl<T, R> std::fmt::Debug for ReadCall<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadCall")
            .field("request", &self.request)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T, R> CallBuilderEx for ReadCall<T, R> {
    fn request_mut(&mut self) -> &mut CallRequest {
        &mut self.request
    }

    fn options_mut(&mut self) -> &mut CallOptions {
        &mut self.options
    }
}

impl<T: ChainTransport + 'static, R: 'static> ReadCall<T, R> {
    pub fn new(client: ContractClient<T>, request: CallRequest, decoder: ResultDecoder<R>) -> Self {
        Self {
            client,
            request,
            options: CallOptions::default(),
            decoder,
        }
    }

    pub fn request(&self) -> &CallRequest {
        &self.request
    }

    pub fn calldata(&self) -> &Bytes {
        &self.request.data
    }

    /// Execute via `eth_call` with the builder's own options.
    pub async fn call(&self) -> Result<R, ContractError> {
        self.call_with(&self.options).await
    }

    /// Execute via `eth_call` with explicit options.
    pub async fn call_with(&self, options: &CallOptions) -> Result<R, ContractError> {
        let data = self.client.eth_call(&self.request, options).await?;
        self.decode(&data)
    }

    pub fn decode(&self, data: &[u8]) -> Result<R, ContractError> {
        (self.decoder)(data)
    }

    /// Compose a typed decoder on top of the current one.
    pub fn map_output<U, F>(self, f: F) -> ReadCall<T, U>
    where
        F: Fn(R) -> Result<U, ContractError> + Send + Sync + 'static,
    {
        let decoder = self.decoder;
        ReadCall {
            client: self.client,
            request: self.request,
            options: self.options,
            decoder: Arc::new(move |data: &[u8]| decoder(data).and_then(&f)),
        }
    }

    /// Turn into a state-changing call with the same request.
    pub fn into_read_write(self) -> ReadWriteCall<T, R> {
        ReadWriteCall {
            call: self,
            receipt_mapper: Arc::new(|receipt: InclusionReceipt| receipt),
        }
    }
}

// ============================================================================
// ReadWriteCall
// ============================================================================

/// A state-changing contract invocation.
///
/// `call()` simulates it; `send()` signs and submits it exactly once.
pub struct ReadWriteCall<T, R, M = InclusionReceipt> {
    pub(crate) call: ReadCall<T, R>,
    receipt_mapper: ReceiptMapper<M>,
}

impl<T, R, M> std::fmt::Debug for ReadWriteCall<T, R, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadWriteCall")
            .field("request", &self.call.request)
            .field("options", &self.call.options)
            .finish_non_exhaustive()
    }
}

impl<T, R, M> CallBuilderEx for ReadWriteCall<T, R, M> {
    fn request_mut(&mut self) -> &mut CallRequest {
        &mut self.call.request
    }

    fn options_mut(&mut self) -> &mut CallOptions {
        &mut self.call.options
    }
}

impl<T: ChainTransport + 'static, R: 'static> ReadWriteCall<T, R> {
    pub fn new(client: ContractClient<T>, request: CallRequest, decoder: ResultDecoder<R>) -> Self {
        ReadCall::new(client, request, decoder).into_read_write()
    }
}

impl<T: ChainTransport + 'static, R: 'static, M: 'static> ReadWriteCall<T, R, M> {
    pub fn request(&self) -> &CallRequest {
        &self.call.request
    }

    /// Simulate via `eth_call`.
    pub async fn call(&self) -> Result<R, ContractError> {
        self.call.call().await
    }

    pub async fn call_with(&self, options: &CallOptions) -> Result<R, ContractError> {
        self.call.call_with(options).await
    }

    pub fn map_output<U, F>(self, f: F) -> ReadWriteCall<T, U, M>
    where
        F: Fn(R) -> Result<U, ContractError> + Send + Sync + 'static,
    {
        ReadWriteCall {
            call: self.call.map_output(f),
            receipt_mapper: self.receipt_mapper,
        }
    }

    /// Replace what `PendingInclusion::wait` yields.
    pub fn map_receipt<N, F>(self, f: F) -> ReadWriteCall<T, R, N>
    where
        F: Fn(InclusionReceipt) -> N + Send + Sync + 'static,
    {
        ReadWriteCall {
            call: self.call,
            receipt_mapper: Arc::new(f),
        }
    }

    /// Sign if nonce, gas and fees are all set.
    ///
    /// Returns `Ok(None)` without touching the signer when fields are missing.
    pub async fn sign<S>(&self, signer: &S) -> Result<Option<SignedTransaction>, SendError>
    where
        S: TransactionSigner + ?Sized,
    {
        let Some(mut unsigned) = self.call.request.unsigned() else {
            return Ok(None);
        };
        unsigned.from.get_or_insert_with(|| signer.address());
        Ok(Some(signer.sign_transaction(unsigned).await?))
    }

    /// Sign (filling missing fields through the transport first) and submit.
    pub async fn send<S>(self, signer: &S) -> Result<PendingInclusion<T, M>, SendError>
    where
        S: TransactionSigner + ?Sized,
    {
        let client = self.call.client.clone();
        let signed = match self.sign(signer).await? {
            Some(signed) => signed,
            None => {
                let mut request = self.call.request.clone();
                request.from.get_or_insert_with(|| signer.address());
                let filled = client.fill(request).await?;
                let unsigned = filled.unsigned().ok_or_else(|| {
                    SendError::Incomplete(format!(
                        "nonce={:?} gas={:?} fees={:?}",
                        filled.nonce,
                        filled.gas,
                        filled.fees()
                    ))
                })?;
                signer.sign_transaction(unsigned).await?
            }
        };

        let tx_hash = client.submit(&signed).await?;
        Ok(PendingInclusion::new(client, tx_hash, self.receipt_mapper))
    }
}
