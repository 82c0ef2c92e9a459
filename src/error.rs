//! Closed error taxonomy for the payment and escrow flows.
//!
//! Every failure crossing the escrow gateway or backend boundary is
//! normalized into [`EscrowError`] before it reaches orchestrator or UI code.
//! Raw provider errors and contract revert strings never surface uninterpreted:
//! [`EscrowError::from_revert`] classifies the known revert reasons, and
//! anything unrecognized degrades to [`EscrowError::UnknownFailure`].

use serde::Serialize;

/// Failure kinds surfaced by the payment, delivery and dispute flows.
///
/// All variants except [`EscrowError::BackendUpdateFailed`] are fatal for the
/// current attempt: the owning orchestrator transitions to its error state and
/// offers a retry. `BackendUpdateFailed` is logged and swallowed — the
/// on-chain state is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum EscrowError {
    #[error("wallet is not connected")]
    WalletNotConnected,
    /// Expected chain id vs. the wallet's current chain id.
    #[error("wrong network: expected chain {0}, wallet is on chain {1}")]
    WrongNetwork(u64, u64),
    #[error("automatic network switch to chain {0} failed")]
    NetworkSwitchFailed(u64),
    #[error("could not read current allowance: {0}")]
    AllowanceReadFailed(String),
    #[error("approval transaction was rejected")]
    ApprovalRejected,
    /// Allowance polling exhausted its attempt budget.
    #[error("approval was not confirmed after {0} attempts")]
    ApprovalTimeout(u32),
    #[error("insufficient token balance")]
    InsufficientBalance,
    #[error("insufficient gas to submit the transaction")]
    InsufficientGas,
    #[error("trade not found on-chain")]
    TradeNotFound,
    #[error("invalid quantity")]
    InvalidQuantity,
    #[error("requested quantity exceeds what the trade has left")]
    InsufficientQuantity,
    #[error("buyer and seller must be different accounts")]
    BuyerIsSeller,
    #[error("invalid logistics provider address")]
    InvalidLogisticsProvider,
    #[error("caller is not authorized for this purchase")]
    NotAuthorized,
    #[error("purchase is not in a state that allows this action")]
    InvalidPurchaseState,
    #[error("purchase not found on-chain")]
    PurchaseNotFound,
    #[error("transaction was rejected in the wallet")]
    UserRejectedTransaction,
    #[error("cross-chain routing failed: {0}")]
    CrossChainRoutingFailed(String),
    /// Off-chain status update failed. Non-fatal: logged, never blocks or
    /// reverses an on-chain success.
    #[error("backend order update failed: {0}")]
    BackendUpdateFailed(String),
    #[error("unexpected failure: {0}")]
    UnknownFailure(String),
}

impl EscrowError {
    /// Classify a contract revert reason (or provider error text) into the
    /// taxonomy. Matching is case-insensitive and substring-based; provider
    /// shapes wrap reasons in varying envelopes.
    pub fn from_revert(reason: &str) -> Self {
        let r = reason.to_ascii_lowercase();
        if r.contains("user rejected") || r.contains("user denied") || r.contains("rejected by user")
        {
            return EscrowError::UserRejectedTransaction;
        }
        if r.contains("insufficient funds for gas") || r.contains("intrinsic gas") {
            return EscrowError::InsufficientGas;
        }
        if r.contains("insufficient allowance") || r.contains("transfer amount exceeds allowance") {
            return EscrowError::ApprovalRejected;
        }
        if r.contains("insufficient balance") || r.contains("transfer amount exceeds balance") {
            return EscrowError::InsufficientBalance;
        }
        if r.contains("trade not found") || r.contains("invalid trade id") {
            return EscrowError::TradeNotFound;
        }
        if r.contains("insufficient quantity") {
            return EscrowError::InsufficientQuantity;
        }
        if r.contains("invalid quantity") || r.contains("quantity must be") {
            return EscrowError::InvalidQuantity;
        }
        if r.contains("buyer cannot be seller") || r.contains("seller cannot buy") {
            return EscrowError::BuyerIsSeller;
        }
        if r.contains("invalid logistics") {
            return EscrowError::InvalidLogisticsProvider;
        }
        if r.contains("not authorized") || r.contains("only buyer") || r.contains("unauthorized") {
            return EscrowError::NotAuthorized;
        }
        if r.contains("purchase not found") {
            return EscrowError::PurchaseNotFound;
        }
        if r.contains("invalid purchase state")
            || r.contains("already settled")
            || r.contains("already disputed")
            || r.contains("duplicate purchase")
            || r.contains("invalid purchase id")
        {
            return EscrowError::InvalidPurchaseState;
        }
        if r.contains("unsupported destination") || r.contains("destination chain") {
            return EscrowError::CrossChainRoutingFailed(reason.to_string());
        }
        EscrowError::UnknownFailure(reason.to_string())
    }

    /// Short, actionable message for display. One line per kind, no provider
    /// internals.
    pub fn user_message(&self) -> &'static str {
        match self {
            EscrowError::WalletNotConnected => "Connect your wallet to continue.",
            EscrowError::WrongNetwork(..) => "Your wallet is on the wrong network.",
            EscrowError::NetworkSwitchFailed(..) => {
                "Could not switch networks automatically. Switch in your wallet and try again."
            }
            EscrowError::AllowanceReadFailed(_) => {
                "Could not check your spending approval. Try again."
            }
            EscrowError::ApprovalRejected => "The approval was rejected. Approve USDT to continue.",
            EscrowError::ApprovalTimeout(_) => {
                "The approval is taking too long to confirm. Try again."
            }
            EscrowError::InsufficientBalance => "You do not have enough USDT for this order.",
            EscrowError::InsufficientGas => "Not enough native tokens to pay for gas.",
            EscrowError::TradeNotFound => "This listing no longer exists on-chain.",
            EscrowError::InvalidQuantity => "The quantity is not valid for this listing.",
            EscrowError::InsufficientQuantity => "Not enough stock left for that quantity.",
            EscrowError::BuyerIsSeller => "You cannot buy your own listing.",
            EscrowError::InvalidLogisticsProvider => "The logistics provider is not valid.",
            EscrowError::NotAuthorized => "Only the buyer can perform this action.",
            EscrowError::InvalidPurchaseState => {
                "This order was already settled or disputed."
            }
            EscrowError::PurchaseNotFound => "This purchase was not found on-chain.",
            EscrowError::UserRejectedTransaction => "You rejected the transaction in your wallet.",
            EscrowError::CrossChainRoutingFailed(_) => {
                "Cross-chain routing failed. Try again or pay on the local network."
            }
            EscrowError::BackendUpdateFailed(_) => {
                "Payment succeeded; order status will sync shortly."
            }
            EscrowError::UnknownFailure(_) => "Something went wrong. Try again.",
        }
    }

    /// `false` only for [`EscrowError::BackendUpdateFailed`] — the single
    /// kind that never blocks or reverses an on-chain success.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EscrowError::BackendUpdateFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_revert_reasons() {
        assert_eq!(
            EscrowError::from_revert("execution reverted: Trade not found"),
            EscrowError::TradeNotFound
        );
        assert_eq!(
            EscrowError::from_revert("execution reverted: Insufficient quantity available"),
            EscrowError::InsufficientQuantity
        );
        assert_eq!(
            EscrowError::from_revert("revert: Buyer cannot be seller"),
            EscrowError::BuyerIsSeller
        );
        assert_eq!(
            EscrowError::from_revert("execution reverted: Not authorized"),
            EscrowError::NotAuthorized
        );
        assert_eq!(
            EscrowError::from_revert("ERC20: transfer amount exceeds balance"),
            EscrowError::InsufficientBalance
        );
    }

    #[test]
    fn wallet_rejection_is_detected_across_provider_shapes() {
        for text in [
            "MetaMask Tx Signature: User denied transaction signature.",
            "user rejected the request",
            "Request rejected by user",
        ] {
            assert_eq!(
                EscrowError::from_revert(text),
                EscrowError::UserRejectedTransaction,
                "failed for: {text}"
            );
        }
    }

    #[test]
    fn unrecognized_text_degrades_to_unknown() {
        let err = EscrowError::from_revert("some reason the contract never emits");
        assert!(matches!(err, EscrowError::UnknownFailure(_)));
    }

    #[test]
    fn only_backend_update_is_non_fatal() {
        assert!(!EscrowError::BackendUpdateFailed("timeout".into()).is_fatal());
        assert!(EscrowError::TradeNotFound.is_fatal());
        assert!(EscrowError::ApprovalTimeout(20).is_fatal());
    }

    #[test]
    fn every_kind_has_a_user_message() {
        // Spot-check the kinds with payloads; display text must not leak them.
        let msg = EscrowError::AllowanceReadFailed("raw rpc garbage".into()).user_message();
        assert!(!msg.contains("garbage"));
        assert!(!EscrowError::WrongNetwork(137, 1).user_message().is_empty());
    }
}
