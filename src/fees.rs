//! Cross-chain fee estimation.
//!
//! Quotes the message fee for a cross-chain purchase from the escrow
//! contract's own fee view. A failed quote degrades to the configured
//! static fallback rather than blocking the payment, since the contract
//! refunds overpaid fee value.

use crate::config::FeeConfig;
use crate::error::EscrowError;
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::sol;
use async_trait::async_trait;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEscrowFeeQuoter {
        function quoteCrossChainFee(uint64 destinationChainSelector, uint256 quantity) external view returns (uint256);
    }
}

/// Fee quote for one cross-chain purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub fee: U256,
    /// True when the quote came from the static fallback instead of the
    /// contract.
    pub estimated: bool,
}

#[async_trait]
pub trait FeeEstimator: Send + Sync {
    /// Quote the fee for sending `quantity` units to the chain identified by
    /// `destination_selector`. Never fails: degraded quotes are flagged via
    /// [`FeeQuote::estimated`].
    async fn estimate(&self, destination_selector: u64, quantity: u64) -> FeeQuote;
}

/// [`FeeEstimator`] reading the escrow contract's quote view.
pub struct EvmFeeEstimator<P> {
    provider: P,
    escrow: Address,
    fallback_fee: U256,
}

impl<P: Provider + Clone + 'static> EvmFeeEstimator<P> {
    pub fn new(provider: P, escrow: Address, config: &FeeConfig) -> Self {
        Self {
            provider,
            escrow,
            fallback_fee: U256::from(config.fallback_fee_wei),
        }
    }

    async fn quote(&self, destination_selector: u64, quantity: u64) -> Result<U256, EscrowError> {
        let quoter = IEscrowFeeQuoter::new(self.escrow, self.provider.clone());
        quoter
            .quoteCrossChainFee(destination_selector, U256::from(quantity))
            .call()
            .await
            .map_err(|e| EscrowError::CrossChainRoutingFailed(format!("{e:?}")))
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> FeeEstimator for EvmFeeEstimator<P> {
    async fn estimate(&self, destination_selector: u64, quantity: u64) -> FeeQuote {
        match self.quote(destination_selector, quantity).await {
            Ok(fee) => FeeQuote {
                fee,
                estimated: false,
            },
            Err(e) => {
                tracing::warn!(
                    destination_selector,
                    error = %e,
                    fallback_fee = %self.fallback_fee,
                    "fee quote failed, using static fallback"
                );
                FeeQuote {
                    fee: self.fallback_fee,
                    estimated: true,
                }
            }
        }
    }
}

/// Fixed-quote estimator for tests and offline tooling.
pub struct StaticFeeEstimator {
    pub fee: U256,
}

#[async_trait]
impl FeeEstimator for StaticFeeEstimator {
    async fn estimate(&self, _destination_selector: u64, _quantity: u64) -> FeeQuote {
        FeeQuote {
            fee: self.fee,
            estimated: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_estimator_returns_configured_fee() {
        let estimator = StaticFeeEstimator {
            fee: U256::from(42u64),
        };
        let quote = estimator.estimate(1, 3).await;
        assert_eq!(quote.fee, U256::from(42u64));
        assert!(quote.estimated);
    }
}
