//! Waiting for a submitted transaction to be mined.
//!
//! ```text
//! Submitted ──receipt──► Included ──depth reached──► Confirmed
//!     │                     │
//!     │ retries exhausted   │ status = 0
//!     ▼                     ▼
//! NotIncludedAfterRetries  TransactionReverted
//! ```
//!
//! The handle keeps no state between polls; every poll asks the node again.

use alloy::{primitives::B256, transports::TransportError};
use tokio::task::JoinHandle;

use crate::ext::{
    classify_rpc_error, ChainTransport, ContractClient, InclusionConfig, InclusionReceipt,
    ReceiptMapper,
};

#[derive(Debug, thiserror::Error)]
pub enum InclusionError {
    #[error("transaction {tx_hash} not included after {retries} receipt polls")]
    NotIncludedAfterRetries { tx_hash: B256, retries: u32 },

    #[error("transaction {tx_hash} reverted in block {block_number}")]
    TransactionReverted { tx_hash: B256, block_number: u64 },

    #[error(transparent)]
    Provider(#[from] TransportError),

    #[error("failed to start runtime for blocking wait: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Handle to a submitted transaction.
pub struct PendingInclusion<T, M = InclusionReceipt> {
    client: ContractClient<T>,
    tx_hash: B256,
    config: InclusionConfig,
    mapper: ReceiptMapper<M>,
}

impl<T, M> std::fmt::Debug for PendingInclusion<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingInclusion")
            .field("tx_hash", &self.tx_hash)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: ChainTransport + 'static, M: 'static> PendingInclusion<T, M> {
    pub(crate) fn new(client: ContractClient<T>, tx_hash: B256, mapper: ReceiptMapper<M>) -> Self {
        let config = client.config().inclusion;
        Self {
            client,
            tx_hash,
            config,
            mapper,
        }
    }

    pub fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    pub fn with_config(mut self, config: InclusionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.config.confirmations = confirmations;
        self
    }

    /// Poll until the transaction is mined and `confirmations` deep.
    pub async fn wait(&self) -> Result<M, InclusionError> {
        let receipt = self.wait_for_receipt().await?;

        if !receipt.status {
            tracing::warn!(
                tx_hash = %self.tx_hash,
                block_number = receipt.block_number,
                "transaction reverted"
            );
            return Err(InclusionError::TransactionReverted {
                tx_hash: self.tx_hash,
                block_number: receipt.block_number,
            });
        }

        if self.config.confirmations > 1 {
            self.wait_for_depth(receipt.block_number).await?;
        }

        tracing::debug!(
            tx_hash = %self.tx_hash,
            block_number = receipt.block_number,
            confirmations = self.config.confirmations,
            "transaction confirmed"
        );
        Ok((self.mapper)(receipt))
    }

    /// `wait` on a private single-threaded runtime.
    ///
    /// Must not be called from within a tokio runtime.
    pub fn wait_blocking(&self) -> Result<M, InclusionError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.wait())
    }

    /// Run `wait` on a background task.
    pub fn spawn(self) -> JoinHandle<Result<M, InclusionError>>
    where
        M: Send,
    {
        tokio::spawn(async move { self.wait().await })
    }

    async fn wait_for_receipt(&self) -> Result<InclusionReceipt, InclusionError> {
        for attempt in 0..self.config.retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.interval).await;
            }

            match self
                .client
                .transport()
                .get_transaction_receipt(self.tx_hash)
                .await
            {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {
                    tracing::trace!(tx_hash = %self.tx_hash, attempt, "receipt not available yet");
                }
                Err(e) if classify_rpc_error(&e).is_retryable() => {
                    tracing::warn!(
                        tx_hash = %self.tx_hash,
                        attempt,
                        error = %e,
                        "receipt poll failed, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(InclusionError::NotIncludedAfterRetries {
            tx_hash: self.tx_hash,
            retries: self.config.retries,
        })
    }

    async fn wait_for_depth(&self, included_in: u64) -> Result<(), InclusionError> {
        let needed = self.config.confirmations - 1;
        loop {
            match self.client.transport().get_block_number().await {
                Ok(current) if current.saturating_sub(included_in) >= needed => return Ok(()),
                Ok(current) => {
                    tracing::trace!(
                        tx_hash = %self.tx_hash,
                        current,
                        included_in,
                        needed,
                        "waiting for confirmations"
                    );
                }
                Err(e) if classify_rpc_error(&e).is_retryable() => {
                    tracing::warn!(tx_hash = %self.tx_hash, error = %e, "block number poll failed, retrying");
                }
                Err(e) => return Err(e.into()),
            }
            tokio::time::sleep(self.config.interval).await;
        }
    }
}
