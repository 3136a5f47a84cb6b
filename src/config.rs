//! Client configuration.

use std::time::Duration;

use alloy::{eips::BlockId, primitives::Address};

/// Receipt polling parameters for `PendingInclusion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusionConfig {
    /// Receipt polls before giving up (default: 3)
    pub retries: u32,
    /// Delay between polls (default: 6 seconds)
    pub interval: Duration,
    /// Required depth, counting the inclusion block as 1 (default: 1)
    pub confirmations: u64,
}

impl Default for InclusionConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            interval: Duration::from_secs(6),
            confirmations: 1,
        }
    }
}

impl InclusionConfig {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }
}

/// Configuration for `ContractClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub inclusion: InclusionConfig,
    /// Multicall contract; looked up by chain id when unset
    pub multicall_address: Option<Address>,
    /// Block used by `call()` when no block is set on the builder
    pub default_block: BlockId,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            inclusion: InclusionConfig::default(),
            multicall_address: None,
            default_block: BlockId::latest(),
        }
    }
}

impl ClientConfig {
    pub fn with_inclusion(mut self, inclusion: InclusionConfig) -> Self {
        self.inclusion = inclusion;
        self
    }

    pub fn with_multicall_address(mut self, address: Address) -> Self {
        self.multicall_address = Some(address);
        self
    }

    pub fn with_default_block(mut self, block: BlockId) -> Self {
        self.default_block = block;
        self
    }
}
