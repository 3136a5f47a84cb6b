//! Transaction fields of a single contract invocation.

use alloy::{
    eips::eip2930::AccessList,
    primitives::{Address, Bytes, TxKind, B256, U256},
    rpc::types::{TransactionInput, TransactionRequest},
};

use crate::ext::FeePricing;

/// Mutable bag of transaction fields owned by one call builder.
///
/// The builder hands out clones, never references, so the transport can
/// never observe later mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub from: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub gas: Option<u64>,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub nonce: Option<u64>,
    pub access_list: Option<AccessList>,
    pub chain_id: Option<u64>,
}

impl CallRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            ..Default::default()
        }
    }

    /// Complete fee set, if one is present.
    pub fn fees(&self) -> Option<FeePricing> {
        FeePricing::from_fields(
            self.gas_price,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
        )
    }

    pub fn set_fees(&mut self, fees: FeePricing) {
        match fees {
            FeePricing::Eip1559 {
                max_fee,
                max_priority_fee,
            } => {
                self.gas_price = None;
                self.max_fee_per_gas = Some(max_fee);
                self.max_priority_fee_per_gas = Some(max_priority_fee);
            }
            FeePricing::Legacy { gas_price } => {
                self.gas_price = Some(gas_price);
                self.max_fee_per_gas = None;
                self.max_priority_fee_per_gas = None;
            }
        }
    }

    /// Nonce, gas limit and a complete fee set are all present.
    pub fn is_ready_to_sign(&self) -> bool {
        self.unsigned().is_some()
    }

    /// The transaction to sign, or `None` if fields are still missing.
    pub fn unsigned(&self) -> Option<UnsignedTransaction> {
        Some(UnsignedTransaction {
            from: self.from,
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            gas: self.gas?,
            nonce: self.nonce?,
            fees: self.fees()?,
            access_list: self.access_list.clone(),
            chain_id: self.chain_id,
        })
    }

    /// Alloy request for `eth_call` and gas estimation.
    pub fn to_transaction_request(&self) -> TransactionRequest {
        let mut tx = TransactionRequest::default();
        tx.from = self.from;
        tx.to = Some(TxKind::Call(self.to));
        tx.value = Some(self.value);
        tx.input = TransactionInput::new(self.data.clone());
        tx.gas = self.gas;
        tx.gas_price = self.gas_price;
        tx.max_fee_per_gas = self.max_fee_per_gas;
        tx.max_priority_fee_per_gas = self.max_priority_fee_per_gas;
        tx.nonce = self.nonce;
        tx.access_list = self.access_list.clone();
        tx.chain_id = self.chain_id;
        tx
    }
}

/// A fully specified transaction, ready for a `TransactionSigner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub from: Option<Address>,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas: u64,
    pub nonce: u64,
    pub fees: FeePricing,
    pub access_list: Option<AccessList>,
    pub chain_id: Option<u64>,
}

impl UnsignedTransaction {
    pub fn into_transaction_request(self) -> TransactionRequest {
        let mut tx = TransactionRequest::default();
        tx.from = self.from;
        tx.to = Some(TxKind::Call(self.to));
        tx.value = Some(self.value);
        tx.input = TransactionInput::new(self.data);
        tx.gas = Some(self.gas);
        tx.nonce = Some(self.nonce);
        tx.access_list = self.access_list;
        tx.chain_id = self.chain_id;
        self.fees.apply_to_tx(&mut tx);
        tx
    }
}

/// EIP-2718 encoded signed transaction and its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: B256,
    pub raw: Bytes,
}
