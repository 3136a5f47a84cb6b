//! Multicall3 semantics over scripted contracts.

use alloy::primitives::{Address, Bytes, U256};

use crate::ext::{
    aggregate3, aggregate3_value, encode, try_aggregate, AbiType, AbiValue, CallRequest,
};

use super::{error_string, MockTransport};

/// One decoded entry of an aggregate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubCall {
    pub target: Address,
    pub allow_failure: bool,
    pub value: U256,
    pub data: Bytes,
}

/// Decoded aggregate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedAggregate {
    Aggregate3Value(Vec<SubCall>),
    Aggregate3(Vec<SubCall>),
    TryAggregate {
        require_success: bool,
        calls: Vec<SubCall>,
    },
}

impl DecodedAggregate {
    /// Decode aggregate calldata; `None` for any other selector or a malformed body.
    pub fn decode(calldata: &[u8]) -> Option<Self> {
        let head = calldata.get(..4)?;
        if head == aggregate3_value().selector().as_slice() {
            let args = aggregate3_value().decode_input(calldata).ok()?;
            let calls = sub_calls(args.into_iter().next()?, |fields| {
                Some(SubCall {
                    target: fields.first()?.as_address()?,
                    allow_failure: fields.get(1)?.as_bool()?,
                    value: fields.get(2)?.as_uint()?,
                    data: Bytes::copy_from_slice(fields.get(3)?.as_bytes()?),
                })
            })?;
            Some(DecodedAggregate::Aggregate3Value(calls))
        } else if head == aggregate3().selector().as_slice() {
            let args = aggregate3().decode_input(calldata).ok()?;
            let calls = sub_calls(args.into_iter().next()?, |fields| {
                Some(SubCall {
                    target: fields.first()?.as_address()?,
                    allow_failure: fields.get(1)?.as_bool()?,
                    value: U256::ZERO,
                    data: Bytes::copy_from_slice(fields.get(2)?.as_bytes()?),
                })
            })?;
            Some(DecodedAggregate::Aggregate3(calls))
        } else if head == try_aggregate().selector().as_slice() {
            let mut args = try_aggregate().decode_input(calldata).ok()?.into_iter();
            let require_success = args.next()?.as_bool()?;
            let calls = sub_calls(args.next()?, |fields| {
                Some(SubCall {
                    target: fields.first()?.as_address()?,
                    allow_failure: !require_success,
                    value: U256::ZERO,
                    data: Bytes::copy_from_slice(fields.get(1)?.as_bytes()?),
                })
            })?;
            Some(DecodedAggregate::TryAggregate {
                require_success,
                calls,
            })
        } else {
            None
        }
    }

    pub fn calls(&self) -> &[SubCall] {
        match self {
            DecodedAggregate::Aggregate3Value(calls)
            | DecodedAggregate::Aggregate3(calls)
            | DecodedAggregate::TryAggregate { calls, .. } => calls,
        }
    }
}

fn sub_calls(
    array: AbiValue,
    parse: impl Fn(&[AbiValue]) -> Option<SubCall>,
) -> Option<Vec<SubCall>> {
    array
        .into_values()?
        .iter()
        .map(|item| parse(item.as_slice()?))
        .collect()
}

/// Executes aggregate calldata the way Multicall3 does.
pub struct MockMulticall<'a> {
    transport: &'a MockTransport,
}

impl<'a> MockMulticall<'a> {
    pub fn new(transport: &'a MockTransport) -> Self {
        Self { transport }
    }

    pub fn execute(&self, request: &CallRequest) -> Result<Bytes, Bytes> {
        let Some(decoded) = DecodedAggregate::decode(&request.data) else {
            return Err(Bytes::new());
        };

        if let DecodedAggregate::Aggregate3Value(calls) = &decoded {
            let total = calls.iter().fold(U256::ZERO, |sum, call| sum + call.value);
            if total != request.value {
                return Err(error_string("Multicall3: value mismatch"));
            }
        }

        let mut results = Vec::with_capacity(decoded.calls().len());
        for call in decoded.calls() {
            let sub_request = CallRequest {
                to: call.target,
                from: Some(request.to),
                value: call.value,
                data: call.data.clone(),
                ..Default::default()
            };
            let (success, data) = match self.transport.execute(&sub_request) {
                Ok(data) => (true, data),
                Err(data) => (false, data),
            };
            if !success && !call.allow_failure {
                return Err(error_string("Multicall3: call failed"));
            }
            results.push(AbiValue::Tuple(vec![AbiValue::Bool(success), AbiValue::Bytes(data)]));
        }

        Ok(encode_results(results))
    }
}

/// Encode `(bool,bytes)[]` return data.
pub fn encode_results(results: Vec<AbiValue>) -> Bytes {
    let ty = AbiType::array(AbiType::tuple(vec![AbiType::Bool, AbiType::Bytes]));
    encode(&[AbiValue::Array(results)], &[ty])
        .expect("results are well typed")
        .into()
}
