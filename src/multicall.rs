//! Multicall aggregation engine.
//!
//! ```text
//! add_call(sub, allow_failure) ──► CallHandle<Output>   (unresolved)
//!        │
//!        ▼ flags: any_payable, mixed_failure
//! strategy ─┬─ any_payable   ─► aggregate3Value((address,bool,uint256,bytes)[])
//!           ├─ mixed_failure ─► aggregate3((address,bool,bytes)[])
//!           └─ otherwise     ─► tryAggregate(bool,(address,bytes)[])
//!        │
//!        ▼ one eth_call / one transaction
//! (bool success, bytes returnData)[]
//!        │
//!        ▼ fan out in add_call order
//! CallHandle resolves: decoder(returnData) | try_decoding_revert(returnData)
//! ```
//!
//! Nested aggregates are ordinary sub-calls: their result is itself a
//! `(bool,bytes)[]` that they fan out to their own handles when the outer
//! aggregate hands them their slice of the response.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, OnceLock},
    task::{Context, Poll},
};

use alloy::{
    eips::BlockId,
    primitives::{Address, Bytes, U256},
};
use tokio::sync::oneshot;

use crate::ext::{
    decode, AbiError, AbiFunction, AbiType, AbiValue, CallBuilderEx, CallOptions, CallRequest,
    ChainTransport, ContractClient, ContractError, ErrorRegistry, MulticallDeployment,
    PendingInclusion, ReadCall, ReadWriteCall, ResultDecoder, SendError, TransactionSigner,
};

/// Per-call outcomes of an aggregate, in `add_call` order.
pub type AggregateOutput = Vec<Result<Bytes, ContractError>>;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("aggregate call has no sub-calls")]
    Empty,

    #[error("failed to encode aggregate call: {0}")]
    Encoding(#[from] AbiError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Send(#[from] SendError),

    /// A value set on the aggregate itself disagrees with its sub-calls
    #[error("aggregate value {requested} does not match the sub-call total {expected}")]
    ValueMismatch { requested: U256, expected: U256 },
}

// ============================================================================
// Sub-call capability
// ============================================================================

/// Anything that can be executed as one entry of a multicall.
pub trait Aggregatable: Send {
    type Output: Send + 'static;

    fn target(&self) -> Address;

    fn value(&self) -> U256;

    fn calldata(&mut self) -> Result<Bytes, AbiError>;

    /// Decode this entry's successful return data.
    fn decode_output(&mut self, data: &[u8]) -> Result<Self::Output, ContractError>;

    /// The entry failed; release anything waiting on it.
    fn fail(&mut self, _err: &ContractError) {}
}

impl<T: ChainTransport + 'static, R: Send + 'static> Aggregatable for ReadCall<T, R> {
    type Output = R;

    fn target(&self) -> Address {
        self.request.to
    }

    fn value(&self) -> U256 {
        self.request.value
    }

    fn calldata(&mut self) -> Result<Bytes, AbiError> {
        Ok(self.request.data.clone())
    }

    fn decode_output(&mut self, data: &[u8]) -> Result<R, ContractError> {
        self.decode(data)
    }
}

impl<T: ChainTransport + 'static, R: Send + 'static, M: Send + 'static> Aggregatable
    for ReadWriteCall<T, R, M>
{
    type Output = R;

    fn target(&self) -> Address {
        self.call.request.to
    }

    fn value(&self) -> U256 {
        self.call.request.value
    }

    fn calldata(&mut self) -> Result<Bytes, AbiError> {
        Ok(self.call.request.data.clone())
    }

    fn decode_output(&mut self, data: &[u8]) -> Result<R, ContractError> {
        self.call.decode(data)
    }
}

// ============================================================================
// CallHandle
// ============================================================================

/// Completion handle for one sub-call.
///
/// Resolves once the owning aggregate has been executed. If the aggregate is
/// dropped without being sent the handle resolves to
/// `ContractError::NotExecuted`.
#[derive(Debug)]
pub struct CallHandle<T> {
    rx: oneshot::Receiver<Result<T, ContractError>>,
}

impl<T> CallHandle<T> {
    /// Result if already available, without waiting.
    pub fn try_take(&mut self) -> Option<Result<T, ContractError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ContractError::NotExecuted)),
        }
    }
}

impl<T> Future for CallHandle<T> {
    type Output = Result<T, ContractError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(ContractError::NotExecuted)))
    }
}

// ============================================================================
// Type-erased entries
// ============================================================================

trait QueuedCall: Send {
    fn target(&self) -> Address;
    fn value(&self) -> U256;
    fn calldata(&mut self) -> Result<Bytes, AbiError>;
    /// Deliver return data; the decode error, if any, is also returned.
    fn complete(&mut self, data: &[u8]) -> Result<(), ContractError>;
    fn fail(&mut self, err: ContractError);
}

struct Slot<C: Aggregatable> {
    call: C,
    sender: Option<oneshot::Sender<Result<C::Output, ContractError>>>,
}

impl<C: Aggregatable> Slot<C> {
    fn resolve(&mut self, result: Result<C::Output, ContractError>) {
        if let Some(sender) = self.sender.take() {
            // Receiver may have been dropped; nobody is waiting then.
            let _ = sender.send(result);
        }
    }
}

impl<C: Aggregatable> QueuedCall for Slot<C> {
    fn target(&self) -> Address {
        self.call.target()
    }

    fn value(&self) -> U256 {
        self.call.value()
    }

    fn calldata(&mut self) -> Result<Bytes, AbiError> {
        self.call.calldata()
    }

    fn complete(&mut self, data: &[u8]) -> Result<(), ContractError> {
        let result = self.call.decode_output(data);
        let outcome = match &result {
            Ok(_) => Ok(()),
            Err(err) => Err(err.clone()),
        };
        self.resolve(result);
        outcome
    }

    fn fail(&mut self, err: ContractError) {
        self.call.fail(&err);
        self.resolve(Err(err));
    }
}

struct Entry {
    call: Box<dyn QueuedCall>,
    allow_failure: bool,
}

// ============================================================================
// Strategy
// ============================================================================

/// Multicall3 entry point used for an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulticallStrategy {
    /// `aggregate3Value`, needed as soon as one sub-call carries value
    Aggregate3Value,
    /// `aggregate3`, per-call failure flags
    Aggregate3,
    /// `tryAggregate`, one failure flag for every call
    TryAggregate { require_success: bool },
}

impl MulticallStrategy {
    /// Pick the entry point; earlier rules win.
    pub fn select(any_payable: bool, mixed_failure: bool, allow_failure: bool) -> Self {
        if any_payable {
            MulticallStrategy::Aggregate3Value
        } else if mixed_failure {
            MulticallStrategy::Aggregate3
        } else {
            MulticallStrategy::TryAggregate {
                require_success: !allow_failure,
            }
        }
    }

    pub fn function(&self) -> &'static AbiFunction {
        match self {
            MulticallStrategy::Aggregate3Value => aggregate3_value(),
            MulticallStrategy::Aggregate3 => aggregate3(),
            MulticallStrategy::TryAggregate { .. } => try_aggregate(),
        }
    }
}

/// `(bool success, bytes returnData)[]`
fn result_type() -> AbiType {
    AbiType::array(AbiType::tuple(vec![AbiType::Bool, AbiType::Bytes]))
}

pub fn aggregate3_value() -> &'static AbiFunction {
    static FUNCTION: OnceLock<AbiFunction> = OnceLock::new();
    FUNCTION.get_or_init(|| {
        AbiFunction::new(
            "aggregate3Value",
            vec![AbiType::array(AbiType::tuple(vec![
                AbiType::Address,
                AbiType::Bool,
                AbiType::Uint(256),
                AbiType::Bytes,
            ]))],
            vec![result_type()],
        )
    })
}

pub fn aggregate3() -> &'static AbiFunction {
    static FUNCTION: OnceLock<AbiFunction> = OnceLock::new();
    FUNCTION.get_or_init(|| {
        AbiFunction::new(
            "aggregate3",
            vec![AbiType::array(AbiType::tuple(vec![
                AbiType::Address,
                AbiType::Bool,
                AbiType::Bytes,
            ]))],
            vec![result_type()],
        )
    })
}

pub fn try_aggregate() -> &'static AbiFunction {
    static FUNCTION: OnceLock<AbiFunction> = OnceLock::new();
    FUNCTION.get_or_init(|| {
        AbiFunction::new(
            "tryAggregate",
            vec![
                AbiType::Bool,
                AbiType::array(AbiType::tuple(vec![AbiType::Address, AbiType::Bytes])),
            ],
            vec![result_type()],
        )
    })
}

/// Decode a multicall response into `(success, returnData)` pairs.
pub fn decode_results(data: &[u8]) -> Result<Vec<(bool, Bytes)>, AbiError> {
    let mut values = decode(data, &[result_type()])?;
    let results = match values.pop() {
        Some(AbiValue::Array(results)) => results,
        _ => return Err(AbiError::InvalidType(result_type().to_string())),
    };
    results
        .into_iter()
        .map(|result| match result {
            AbiValue::Tuple(mut fields) if fields.len() == 2 => {
                match (fields.remove(0), fields.remove(0)) {
                    (AbiValue::Bool(success), AbiValue::Bytes(data)) => Ok((success, data)),
                    (other, _) => Err(AbiError::TypeMismatch {
                        expected: "(bool,bytes)".to_string(),
                        found: other.kind(),
                    }),
                }
            }
            other => Err(AbiError::TypeMismatch {
                expected: "(bool,bytes)".to_string(),
                found: other.kind(),
            }),
        })
        .collect()
}

// ============================================================================
// AggregateCall
// ============================================================================

/// Encoded aggregate, valid for the sub-call count it was built from.
#[derive(Debug, Clone)]
struct EncodedAggregate {
    count: usize,
    strategy: MulticallStrategy,
    value: U256,
    calldata: Bytes,
}

/// A batch of sub-calls executed as a single multicall.
///
/// Sub-calls are appended with `add_call`; `call` or `send` consumes the
/// aggregate and resolves every handle from the one response.
pub struct AggregateCall<T> {
    client: ContractClient<T>,
    deployment: MulticallDeployment,
    calls: Vec<Entry>,
    any_payable: bool,
    mixed_failure: bool,
    encoded: Option<EncodedAggregate>,
    request: CallRequest,
    options: CallOptions,
}

impl<T> std::fmt::Debug for AggregateCall<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateCall")
            .field("deployment", &self.deployment)
            .field("calls", &self.calls.len())
            .field("any_payable", &self.any_payable)
            .field("mixed_failure", &self.mixed_failure)
            .finish_non_exhaustive()
    }
}

/// A `value` set here must equal the sub-call total; `call` and `send`
/// reject anything else with `AggregateError::ValueMismatch`.
impl<T> CallBuilderEx for AggregateCall<T> {
    fn request_mut(&mut self) -> &mut CallRequest {
        &mut self.request
    }

    fn options_mut(&mut self) -> &mut CallOptions {
        &mut self.options
    }
}

impl<T: ChainTransport + 'static> AggregateCall<T> {
    pub fn new(client: ContractClient<T>, deployment: MulticallDeployment) -> Self {
        let mut request = CallRequest::new(deployment.address, Bytes::new());
        request.chain_id = Some(client.chain_id());
        Self {
            client,
            deployment,
            calls: Vec::new(),
            any_payable: false,
            mixed_failure: false,
            encoded: None,
            request,
            options: CallOptions::default(),
        }
    }

    /// Inject the bundled Multicall3 bytecode on reads.
    pub fn with_injected_bytecode(mut self) -> Self {
        self.deployment = self.deployment.with_injected_bytecode();
        self
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Append a sub-call and get its completion handle.
    pub fn add_call<C>(&mut self, call: C, allow_failure: bool) -> CallHandle<C::Output>
    where
        C: Aggregatable + 'static,
    {
        if let Some(first) = self.calls.first() {
            self.mixed_failure |= first.allow_failure != allow_failure;
        }
        self.any_payable |= !call.value().is_zero();

        let (tx, rx) = oneshot::channel();
        self.calls.push(Entry {
            call: Box::new(Slot {
                call,
                sender: Some(tx),
            }),
            allow_failure,
        });
        CallHandle { rx }
    }

    /// Strategy for the current sub-calls.
    pub fn strategy(&self) -> MulticallStrategy {
        let allow_failure = self.calls.first().is_some_and(|entry| entry.allow_failure);
        MulticallStrategy::select(self.any_payable, self.mixed_failure, allow_failure)
    }

    /// Sum of sub-call values; sent as the aggregate's own value.
    pub fn total_value(&self) -> U256 {
        self.calls
            .iter()
            .fold(U256::ZERO, |sum, entry| sum.saturating_add(entry.call.value()))
    }

    /// Encoded calldata, rebuilt only when sub-calls were added since the last encoding.
    pub fn encoded_calldata(&mut self) -> Result<Bytes, AbiError> {
        Ok(self.encode()?.calldata)
    }

    fn encode(&mut self) -> Result<EncodedAggregate, AbiError> {
        if let Some(encoded) = &self.encoded {
            if encoded.count == self.calls.len() {
                return Ok(encoded.clone());
            }
        }
        let encoded = self.encode_fresh()?;
        tracing::trace!(calls = encoded.count, strategy = ?encoded.strategy, "encoded aggregate");
        self.encoded = Some(encoded.clone());
        Ok(encoded)
    }

    fn encode_fresh(&mut self) -> Result<EncodedAggregate, AbiError> {
        let strategy = self.strategy();
        let value = self.total_value();

        let mut items = Vec::with_capacity(self.calls.len());
        for entry in &mut self.calls {
            let target = AbiValue::Address(entry.call.target());
            let data = AbiValue::Bytes(entry.call.calldata()?);
            let allow_failure = AbiValue::Bool(entry.allow_failure);
            let item = match strategy {
                MulticallStrategy::Aggregate3Value => vec![
                    target,
                    allow_failure,
                    AbiValue::uint256(entry.call.value()),
                    data,
                ],
                MulticallStrategy::Aggregate3 => vec![target, allow_failure, data],
                MulticallStrategy::TryAggregate { .. } => vec![target, data],
            };
            items.push(AbiValue::Tuple(item));
        }

        let args = match strategy {
            MulticallStrategy::TryAggregate { require_success } => {
                vec![AbiValue::Bool(require_success), AbiValue::Array(items)]
            }
            _ => vec![AbiValue::Array(items)],
        };

        Ok(EncodedAggregate {
            count: self.calls.len(),
            strategy,
            value,
            calldata: strategy.function().encode_call(&args)?,
        })
    }

    /// Resolve every handle from a multicall response.
    fn distribute(&mut self, data: &[u8]) -> Result<AggregateOutput, ContractError> {
        let results = decode_results(data)
            .map_err(|err| ContractError::decoding(data, err))
            .and_then(|results| {
                if results.len() == self.calls.len() {
                    Ok(results)
                } else {
                    Err(ContractError::decoding_message(
                        data,
                        format!(
                            "multicall returned {} results for {} calls",
                            results.len(),
                            self.calls.len()
                        ),
                    ))
                }
            });

        let results = match results {
            Ok(results) => results,
            Err(err) => {
                self.fail_all(&err);
                return Err(err);
            }
        };

        let errors: &ErrorRegistry = self.client.errors();
        let mut output = Vec::with_capacity(results.len());
        for (entry, (success, return_data)) in self.calls.iter_mut().zip(results) {
            if success {
                output.push(entry.call.complete(&return_data).map(|()| return_data));
            } else {
                let err = errors.try_decoding_revert(&return_data);
                entry.call.fail(err.clone());
                output.push(Err(err));
            }
        }
        Ok(output)
    }

    fn fail_all(&mut self, err: &ContractError) {
        for entry in &mut self.calls {
            entry.call.fail(err.clone());
        }
    }

    fn prepare(&mut self) -> Result<CallRequest, AggregateError> {
        if self.calls.is_empty() {
            return Err(AggregateError::Empty);
        }
        let encoded = self.encode()?;
        // The aggregate's value is derived from its sub-calls.
        if !self.request.value.is_zero() && self.request.value != encoded.value {
            return Err(AggregateError::ValueMismatch {
                requested: self.request.value,
                expected: encoded.value,
            });
        }
        let mut request = self.request.clone();
        request.to = self.deployment.address;
        request.value = encoded.value;
        request.data = encoded.calldata;
        Ok(request)
    }

    /// Execute all sub-calls in one `eth_call` and resolve their handles.
    pub async fn call(mut self) -> Result<AggregateOutput, AggregateError> {
        let request = self.prepare()?;
        let options = CallOptions {
            state_overrides: self
                .deployment
                .merge_overrides(self.options.state_overrides.clone()),
            ..self.options.clone()
        };

        tracing::debug!(
            multicall = %self.deployment.address,
            calls = self.calls.len(),
            strategy = ?self.strategy(),
            value = %request.value,
            "dispatching aggregate call"
        );

        self.execute(&request, &options).await
    }

    /// Submit the aggregate as one transaction.
    ///
    /// The request is first simulated against the pending block (or the block
    /// set on the builder). A whole-aggregate revert fails every handle and
    /// nothing is submitted. Otherwise handles resolve from the simulated
    /// response once the transaction has been accepted by the node; if
    /// filling, signing or submission fails they receive that error instead.
    pub async fn send<S>(mut self, signer: &S) -> Result<PendingInclusion<T>, AggregateError>
    where
        S: TransactionSigner + ?Sized,
    {
        let mut request = self.prepare()?;
        request.from.get_or_insert_with(|| signer.address());

        if self.deployment.inject_bytecode {
            tracing::warn!(
                multicall = %self.deployment.address,
                "sending aggregate to a multicall that only exists through a state override"
            );
        }

        let options = CallOptions {
            block: Some(self.options.block.unwrap_or(BlockId::pending())),
            ..self.options.clone()
        };

        tracing::debug!(
            multicall = %self.deployment.address,
            calls = self.calls.len(),
            strategy = ?self.strategy(),
            value = %request.value,
            "sending aggregate transaction"
        );

        let simulated = self.simulate(&request, &options).await?;

        let decoder: ResultDecoder<()> = Arc::new(|_: &[u8]| Ok(()));
        let sent = ReadWriteCall::new(self.client.clone(), request, decoder)
            .send(signer)
            .await;
        let pending = match sent {
            Ok(pending) => pending,
            Err(err) => {
                tracing::debug!(error = %err, "aggregate transaction was not submitted");
                let handle_err = match &err {
                    SendError::Contract(err) => err.clone(),
                    SendError::Signer(_) | SendError::Incomplete(_) => ContractError::NotExecuted,
                };
                self.fail_all(&handle_err);
                return Err(err.into());
            }
        };

        // The transaction is out; a bad simulated response only affects the handles.
        if let Err(err) = self.distribute(&simulated) {
            tracing::warn!(tx_hash = %pending.tx_hash(), error = %err, "could not resolve aggregate handles");
        }
        Ok(pending)
    }

    async fn execute(
        &mut self,
        request: &CallRequest,
        options: &CallOptions,
    ) -> Result<AggregateOutput, AggregateError> {
        let data = self.simulate(request, options).await?;
        Ok(self.distribute(&data)?)
    }

    /// `eth_call` the aggregate; a whole-call error fails every handle.
    async fn simulate(
        &mut self,
        request: &CallRequest,
        options: &CallOptions,
    ) -> Result<Bytes, AggregateError> {
        match self.client.eth_call(request, options).await {
            Ok(data) => Ok(data),
            Err(err) => {
                tracing::debug!(error = %err, "aggregate call failed as a whole");
                self.fail_all(&err);
                Err(err.into())
            }
        }
    }
}

impl<T: ChainTransport + 'static> Aggregatable for AggregateCall<T> {
    type Output = AggregateOutput;

    fn target(&self) -> Address {
        self.deployment.address
    }

    fn value(&self) -> U256 {
        self.total_value()
    }

    fn calldata(&mut self) -> Result<Bytes, AbiError> {
        self.encoded_calldata()
    }

    fn decode_output(&mut self, data: &[u8]) -> Result<AggregateOutput, ContractError> {
        self.distribute(data)
    }

    fn fail(&mut self, err: &ContractError) {
        self.fail_all(err);
    }
}
