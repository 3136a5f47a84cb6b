//! Contract function descriptors.
//!
//! An `AbiFunction` pairs a name with its input and output types and derives
//! the 4-byte selector from the canonical signature once, at construction.
//! The selector is the function's identity for routing calls, and the same
//! machinery is reused for custom errors (which are selector-keyed too).

use std::{fmt, sync::Arc};

use alloy::{
    json_abi::{self, Param},
    primitives::{keccak256, Bytes, Selector},
};

use crate::ext::{
    decode, encode, write_type_list, AbiError, AbiType, AbiValue, ContractError, ResultDecoder,
};

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> Selector {
    Selector::from_slice(&keccak256(signature.as_bytes())[..4])
}

/// A contract function (or error) with precomputed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiFunction {
    name: String,
    selector: Selector,
    inputs: Vec<AbiType>,
    outputs: Vec<AbiType>,
}

impl AbiFunction {
    pub fn new(name: impl Into<String>, inputs: Vec<AbiType>, outputs: Vec<AbiType>) -> Self {
        let name = name.into();
        let signature = canonical_signature(&name, &inputs);
        Self {
            selector: selector(&signature),
            name,
            inputs,
            outputs,
        }
    }

    /// Parse a human-readable signature with alloy's signature grammar.
    ///
    /// Accepts `name(inputs)`, `name(inputs)(outputs)` and the Solidity form
    /// `function name(inputs) external view returns (outputs)`; parameter
    /// names are ignored.
    ///
    /// ```
    /// use alloy_call_ext::ext::AbiFunction;
    ///
    /// let f = AbiFunction::parse("balanceOf(address owner) returns (uint256)").unwrap();
    /// assert_eq!(f.signature(), "balanceOf(address)");
    /// ```
    pub fn parse(signature: &str) -> Result<Self, AbiError> {
        let function = json_abi::Function::parse(signature.trim())
            .map_err(|err| AbiError::InvalidType(format!("{signature}: {err}")))?;
        Ok(Self::new(
            function.name,
            param_types(&function.inputs)?,
            param_types(&function.outputs)?,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> Selector {
        self.selector
    }

    pub fn inputs(&self) -> &[AbiType] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[AbiType] {
        &self.outputs
    }

    /// Canonical signature, e.g. `transfer(address,uint256)`.
    pub fn signature(&self) -> String {
        canonical_signature(&self.name, &self.inputs)
    }

    /// `selector ++ encode(args, inputs)`
    pub fn encode_call(&self, args: &[AbiValue]) -> Result<Bytes, AbiError> {
        let body = encode(args, &self.inputs)?;
        let mut data = Vec::with_capacity(4 + body.len());
        data.extend_from_slice(self.selector.as_slice());
        data.extend_from_slice(&body);
        Ok(data.into())
    }

    /// Decode return data against the output types.
    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
        decode(data, &self.outputs)
    }

    /// Decode calldata (selector included) back into arguments.
    pub fn decode_input(&self, calldata: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
        let (head, body) = calldata.split_at_checked(4).ok_or(AbiError::BufferOverrun {
            offset: 0,
            needed: 4,
            available: calldata.len(),
        })?;
        if head != self.selector.as_slice() {
            return Err(AbiError::SelectorMismatch {
                expected: self.selector.to_string(),
                found: Selector::from_slice(head).to_string(),
            });
        }
        decode(body, &self.inputs)
    }

    /// Result decoder producing the raw output values, for use in call builders.
    ///
    /// Decode failures are reported as `ContractError::Decoding` carrying the
    /// raw return data.
    pub fn decoder(&self) -> ResultDecoder<Vec<AbiValue>> {
        let outputs = self.outputs.clone();
        Arc::new(move |data: &[u8]| {
            decode(data, &outputs).map_err(|err| ContractError::decoding(data, err))
        })
    }
}

impl fmt::Display for AbiFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        write_type_list(f, &self.inputs)?;
        f.write_str(")")?;
        if !self.outputs.is_empty() {
            f.write_str(" returns (")?;
            write_type_list(f, &self.outputs)?;
            f.write_str(")")?;
        }
        Ok(())
    }
}

fn canonical_signature(name: &str, inputs: &[AbiType]) -> String {
    let params: Vec<String> = inputs.iter().map(ToString::to_string).collect();
    format!("{name}({})", params.join(","))
}

/// Convert alloy parameters to types through their canonical type strings.
fn param_types(params: &[Param]) -> Result<Vec<AbiType>, AbiError> {
    params
        .iter()
        .map(|param| param.selector_type().parse())
        .collect()
}

/// Parse an error signature such as `InsufficientBalance(uint256,uint256)`
/// into `(name, inputs)`.
pub(crate) fn parse_signature(signature: &str) -> Result<(String, Vec<AbiType>), AbiError> {
    let error = json_abi::Error::parse(signature.trim())
        .map_err(|err| AbiError::InvalidType(format!("{signature}: {err}")))?;
    Ok((error.name, param_types(&error.inputs)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, hex, U256};

    #[test]
    fn test_known_selectors() {
        assert_eq!(selector("transfer(address,uint256)"), Selector::from(hex!("a9059cbb")));
        assert_eq!(selector("balanceOf(address)"), Selector::from(hex!("70a08231")));
        assert_eq!(selector("Error(string)"), Selector::from(hex!("08c379a0")));
        assert_eq!(selector("Panic(uint256)"), Selector::from(hex!("4e487b71")));
    }

    #[test]
    fn test_parse_signature_forms() {
        let f = AbiFunction::parse("transfer(address to, uint256 amount) returns (bool)").unwrap();
        assert_eq!(f.name(), "transfer");
        assert_eq!(f.signature(), "transfer(address,uint256)");
        assert_eq!(f.outputs(), &[AbiType::Bool]);

        let g = AbiFunction::parse("getReserves()(uint112,uint112,uint32)").unwrap();
        assert!(g.inputs().is_empty());
        assert_eq!(g.outputs().len(), 3);

        let h = AbiFunction::parse("function totalSupply() external view returns (uint256)").unwrap();
        assert_eq!(h.outputs(), &[AbiType::Uint(256)]);
        assert_eq!(h.to_string(), "totalSupply() returns (uint256)");

        let pause = AbiFunction::parse("function pause() external").unwrap();
        assert!(pause.outputs().is_empty());
        assert_eq!(pause.selector(), selector("pause()"));

        let nested = AbiFunction::parse("settle((address,uint256)[] legs, bytes data)").unwrap();
        assert_eq!(nested.signature(), "settle((address,uint256)[],bytes)");

        assert!(AbiFunction::parse("(uint256)").is_err());
        assert!(AbiFunction::parse("broken(uint256").is_err());
    }

    #[test]
    fn test_encode_call_and_decode_input() {
        let f = AbiFunction::parse("transfer(address,uint256)").unwrap();
        let to = address!("2222222222222222222222222222222222222222");
        let args = vec![to.into(), AbiValue::uint256(1_000u64)];
        let data = f.encode_call(&args).unwrap();

        assert_eq!(&data[..4], &hex!("a9059cbb"));
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(f.decode_input(&data).unwrap(), args);

        let other = AbiFunction::parse("approve(address,uint256)").unwrap();
        assert!(matches!(
            other.decode_input(&data),
            Err(AbiError::SelectorMismatch { .. })
        ));
        assert!(f.decode_input(&data[..3]).is_err());
    }

    #[test]
    fn test_decoder_reports_decoding_error() {
        let f = AbiFunction::parse("balanceOf(address)(uint256)").unwrap();
        let decoder = f.decoder();

        let ok = decoder(&U256::from(5).to_be_bytes::<32>()).unwrap();
        assert_eq!(ok, vec![AbiValue::uint256(5u64)]);

        let err = decoder(&[0u8; 3]).unwrap_err();
        assert!(matches!(err, ContractError::Decoding { .. }));
    }
}
