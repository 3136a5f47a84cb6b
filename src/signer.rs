//! Signing boundary.
//!
//! Key handling and RLP/EIP-2718 serialization live in alloy; the client only
//! needs an address and a way to turn an `UnsignedTransaction` into raw bytes.

use alloy::{
    eips::eip2718::Encodable2718,
    network::{Ethereum, EthereumWallet, NetworkWallet, TransactionBuilder},
    primitives::{Address, Bytes},
};
use async_trait::async_trait;

use crate::ext::{SignedTransaction, UnsignedTransaction};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("failed to build transaction: {0}")]
    Build(String),

    #[error(transparent)]
    Signer(#[from] alloy::signers::Error),
}

/// Produces signed, serialized transactions.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Default sender address.
    fn address(&self) -> Address;

    async fn sign_transaction(
        &self,
        tx: UnsignedTransaction,
    ) -> Result<SignedTransaction, SignerError>;
}

#[async_trait]
impl TransactionSigner for EthereumWallet {
    fn address(&self) -> Address {
        NetworkWallet::<Ethereum>::default_signer_address(self)
    }

    async fn sign_transaction(
        &self,
        tx: UnsignedTransaction,
    ) -> Result<SignedTransaction, SignerError> {
        let mut request = tx.into_transaction_request();
        if request.from.is_none() {
            request.from = Some(TransactionSigner::address(self));
        }

        let envelope = request
            .build(self)
            .await
            .map_err(|err| SignerError::Build(err.to_string()))?;

        let hash = *envelope.tx_hash();
        tracing::debug!(tx_hash = %hash, "signed transaction");

        Ok(SignedTransaction {
            hash,
            raw: Bytes::from(envelope.encoded_2718()),
        })
    }
}
