//! Shared handle to a transport, an error registry and configuration.

use std::sync::Arc;

use alloy::{
    primitives::{Address, Bytes, B256},
    transports::TransportResult,
};

use crate::ext::{
    classify_rpc_error, AbiError, AbiFunction, AbiValue, AggregateCall, CallOptions, CallRequest,
    ChainTransport, ClientConfig, ContractError, ErrorRegistry, InclusionReceipt,
    MulticallDeployment, PendingInclusion, ReadCall, ReadWriteCall, ResultDecoder, RpcErrorKind,
    SignedTransaction,
};

/// Entry point for building calls against one chain.
///
/// Cloning is cheap; every builder holds its own clone.
pub struct ContractClient<T> {
    transport: Arc<T>,
    errors: Arc<ErrorRegistry>,
    config: Arc<ClientConfig>,
    chain_id: u64,
}

impl<T> Clone for ContractClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            errors: self.errors.clone(),
            config: self.config.clone(),
            chain_id: self.chain_id,
        }
    }
}

impl<T> std::fmt::Debug for ContractClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractClient")
            .field("chain_id", &self.chain_id)
            .field("config", &self.config)
            .field("custom_errors", &self.errors.len())
            .finish()
    }
}

impl<T: ChainTransport + 'static> ContractClient<T> {
    /// Client with an error registry seeded from `register_custom_errors!`.
    pub async fn new(transport: T, config: ClientConfig) -> TransportResult<Self> {
        Self::with_error_registry(transport, config, ErrorRegistry::with_linked_errors()).await
    }

    pub async fn with_error_registry(
        transport: T,
        config: ClientConfig,
        errors: ErrorRegistry,
    ) -> TransportResult<Self> {
        let chain_id = transport.chain_id().await?;
        tracing::debug!(chain_id, custom_errors = errors.len(), "created contract client");
        Ok(Self {
            transport: Arc::new(transport),
            errors: Arc::new(errors),
            config: Arc::new(config),
            chain_id,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn errors(&self) -> &ErrorRegistry {
        &self.errors
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Multicall deployment used by `aggregate()`.
    pub fn multicall(&self) -> MulticallDeployment {
        match self.config.multicall_address {
            Some(address) => MulticallDeployment::at(address),
            None => MulticallDeployment::for_chain(self.chain_id),
        }
    }

    /// Read-only call decoding into raw ABI values.
    pub fn read_call(
        &self,
        to: Address,
        function: &AbiFunction,
        args: &[AbiValue],
    ) -> Result<ReadCall<T, Vec<AbiValue>>, AbiError> {
        let data = function.encode_call(args)?;
        Ok(self.read_call_raw(to, data, function.decoder()))
    }

    /// Read-only call over prebuilt calldata and a custom decoder.
    pub fn read_call_raw<R: 'static>(
        &self,
        to: Address,
        data: impl Into<Bytes>,
        decoder: ResultDecoder<R>,
    ) -> ReadCall<T, R> {
        ReadCall::new(self.clone(), self.new_request(to, data), decoder)
    }

    /// State-changing call decoding into raw ABI values.
    pub fn read_write_call(
        &self,
        to: Address,
        function: &AbiFunction,
        args: &[AbiValue],
    ) -> Result<ReadWriteCall<T, Vec<AbiValue>>, AbiError> {
        let data = function.encode_call(args)?;
        Ok(self.read_write_call_raw(to, data, function.decoder()))
    }

    pub fn read_write_call_raw<R: 'static>(
        &self,
        to: Address,
        data: impl Into<Bytes>,
        decoder: ResultDecoder<R>,
    ) -> ReadWriteCall<T, R> {
        ReadWriteCall::new(self.clone(), self.new_request(to, data), decoder)
    }

    /// Empty aggregate targeting this chain's multicall deployment.
    pub fn aggregate(&self) -> AggregateCall<T> {
        AggregateCall::new(self.clone(), self.multicall())
    }

    /// Inclusion handle for a transaction submitted elsewhere.
    pub fn pending_inclusion(&self, tx_hash: B256) -> PendingInclusion<T> {
        PendingInclusion::new(self.clone(), tx_hash, Arc::new(|receipt: InclusionReceipt| receipt))
    }

    fn new_request(&self, to: Address, data: impl Into<Bytes>) -> CallRequest {
        let mut request = CallRequest::new(to, data);
        request.chain_id = Some(self.chain_id);
        request
    }

    /// `eth_call` with reverts translated into `ContractError`.
    pub(crate) async fn eth_call(
        &self,
        request: &CallRequest,
        options: &CallOptions,
    ) -> Result<Bytes, ContractError> {
        let block = options.block.unwrap_or(self.config.default_block);
        tracing::trace!(to = %request.to, ?block, "eth_call");
        self.transport
            .call(
                request,
                block,
                options.state_overrides.as_ref(),
                options.block_overrides.as_ref(),
            )
            .await
            .map_err(|err| self.errors.translate_transport_error(err))
    }

    pub(crate) async fn fill(&self, request: CallRequest) -> Result<CallRequest, ContractError> {
        self.transport
            .fill_transaction(request)
            .await
            .map_err(|err| self.errors.translate_transport_error(err))
    }

    /// Submit a signed transaction. A node that already holds it counts as success.
    pub(crate) async fn submit(&self, signed: &SignedTransaction) -> Result<B256, ContractError> {
        match self.transport.send_raw_transaction(&signed.raw).await {
            Ok(hash) => {
                tracing::debug!(tx_hash = %hash, "submitted transaction");
                Ok(hash)
            }
            Err(err) if classify_rpc_error(&err) == RpcErrorKind::AlreadyKnown => {
                tracing::info!(tx_hash = %signed.hash, "transaction already known to node");
                Ok(signed.hash)
            }
            Err(err) => Err(self.errors.translate_transport_error(err)),
        }
    }
}
