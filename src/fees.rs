//! Fee pricing for outgoing transactions.

use alloy::{network::Ethereum, providers::Provider, rpc::types::TransactionRequest, transports::TransportResult};

/// Fee fields of a transaction that is ready to sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePricing {
    /// EIP-1559 gas pricing
    Eip1559 { max_fee: u128, max_priority_fee: u128 },
    /// Legacy gas pricing
    Legacy { gas_price: u128 },
}

impl FeePricing {
    /// Complete fee set from optional request fields.
    ///
    /// A full EIP-1559 pair wins over a legacy price; a half-specified pair
    /// without a legacy price is incomplete.
    pub fn from_fields(
        gas_price: Option<u128>,
        max_fee: Option<u128>,
        max_priority_fee: Option<u128>,
    ) -> Option<Self> {
        match (max_fee, max_priority_fee, gas_price) {
            (Some(max_fee), Some(max_priority_fee), _) => Some(FeePricing::Eip1559 {
                max_fee,
                max_priority_fee,
            }),
            (_, _, Some(gas_price)) => Some(FeePricing::Legacy { gas_price }),
            _ => None,
        }
    }

    /// Ask the network for current fees: EIP-1559 first, legacy price as fallback.
    pub async fn estimate<P: Provider<Ethereum>>(provider: &P) -> TransportResult<Self> {
        match provider.estimate_eip1559_fees().await {
            Ok(fees) => {
                tracing::debug!(
                    max_fee = fees.max_fee_per_gas,
                    max_priority_fee = fees.max_priority_fee_per_gas,
                    "using EIP-1559 fees from network"
                );
                Ok(FeePricing::Eip1559 {
                    max_fee: fees.max_fee_per_gas,
                    max_priority_fee: fees.max_priority_fee_per_gas,
                })
            }
            Err(err) => {
                tracing::debug!(error = %err, "EIP-1559 fee estimation failed, using legacy gas price");
                let gas_price = provider.get_gas_price().await?;
                Ok(FeePricing::Legacy { gas_price })
            }
        }
    }

    /// Write these fees into a transaction request, clearing the other kind.
    pub fn apply_to_tx(self, tx: &mut TransactionRequest) {
        match self {
            FeePricing::Eip1559 {
                max_fee,
                max_priority_fee,
            } => {
                tx.gas_price = None;
                tx.max_fee_per_gas = Some(max_fee);
                tx.max_priority_fee_per_gas = Some(max_priority_fee);
            }
            FeePricing::Legacy { gas_price } => {
                tx.gas_price = Some(gas_price);
                tx.max_fee_per_gas = None;
                tx.max_priority_fee_per_gas = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fields() {
        assert_eq!(FeePricing::from_fields(None, None, None), None);
        assert_eq!(FeePricing::from_fields(None, Some(10), None), None);
        assert_eq!(
            FeePricing::from_fields(Some(7), Some(10), None),
            Some(FeePricing::Legacy { gas_price: 7 })
        );
        assert_eq!(
            FeePricing::from_fields(Some(7), Some(10), Some(2)),
            Some(FeePricing::Eip1559 {
                max_fee: 10,
                max_priority_fee: 2
            })
        );
    }

    #[test]
    fn test_apply_clears_other_kind() {
        let mut tx = TransactionRequest::default();
        tx.gas_price = Some(1);
        FeePricing::Eip1559 {
            max_fee: 10,
            max_priority_fee: 2,
        }
        .apply_to_tx(&mut tx);
        assert_eq!(tx.gas_price, None);
        assert_eq!(tx.max_fee_per_gas, Some(10));
    }
}
