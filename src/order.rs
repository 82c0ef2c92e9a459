//! Order records, trade statuses and payment transactions.
//!
//! The [`Order`] is owned by the backend; this crate holds a cached copy per
//! session and requests mutations through [`crate::backend::OrderApi`]. The
//! on-chain [`EscrowPurchase`] is owned by the escrow contract and only read
//! here. A [`PaymentTransaction`] records the client-side result of a
//! purchase attempt and is never constructed before a purchase call has been
//! submitted.

use alloy::primitives::{Address, FixedBytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        UnixTimestamp(secs)
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-authoritative order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Disputed,
    Refunded,
    Processing,
}

/// UI-facing trade status, derived from [`OrderStatus`].
///
/// This is the single source of truth the presentation layer renders from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Release,
    Cancelled,
    Completed,
}

impl From<OrderStatus> for TradeStatus {
    /// Total, deterministic mapping. Every backend status has exactly one
    /// trade status; anything the compiler would let slip through defaults
    /// to `Pending`.
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Pending => TradeStatus::Pending,
            OrderStatus::Accepted => TradeStatus::Release,
            OrderStatus::Processing => TradeStatus::Release,
            OrderStatus::Rejected => TradeStatus::Cancelled,
            OrderStatus::Disputed => TradeStatus::Cancelled,
            OrderStatus::Refunded => TradeStatus::Pending,
            OrderStatus::Completed => TradeStatus::Completed,
        }
    }
}

/// An off-chain commercial order record, backend-owned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub buyer: String,
    pub seller: String,
    pub product: String,
    pub quantity: u64,
    /// Unit amount in USDT base units.
    pub unit_amount: U256,
    /// Wallet address of the logistics provider carrying the goods.
    pub logistics_provider: Address,
    pub status: OrderStatus,
    /// On-chain trade id this order purchases against.
    pub trade_id: U256,
    pub created_at: UnixTimestamp,
    pub updated_at: UnixTimestamp,
}

impl Order {
    /// Total escrow amount for this order.
    pub fn total_amount(&self) -> U256 {
        self.unit_amount * U256::from(self.quantity)
    }
}

/// On-chain purchase lifecycle, as read from the escrow contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseState {
    Created,
    Delivered,
    Disputed,
    Settled,
    Refunded,
}

impl PurchaseState {
    /// Decode the contract's state enum. Unknown discriminants map to
    /// `Created` rather than failing a read.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PurchaseState::Delivered,
            2 => PurchaseState::Disputed,
            3 => PurchaseState::Settled,
            4 => PurchaseState::Refunded,
            _ => PurchaseState::Created,
        }
    }
}

/// An on-chain escrow purchase record, contract-owned and read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowPurchase {
    pub purchase_id: FixedBytes<32>,
    pub trade_id: U256,
    pub buyer: Address,
    pub quantity: u64,
    pub logistics_provider: Address,
    /// Amount held in escrow, USDT base units.
    pub amount: U256,
    pub state: PurchaseState,
}

/// Confirmation status of a submitted payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Client-side record of one purchase attempt.
///
/// Created the moment the purchase transaction is submitted; immutable once
/// confirmed. Held in memory/session only — never persisted server-side by
/// this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub hash: TxHash,
    pub amount: U256,
    pub token_symbol: String,
    pub from: Address,
    pub to: Address,
    pub status: TxStatus,
    pub timestamp: UnixTimestamp,
    /// On-chain purchase id, absent for cross-chain sends where the
    /// purchase materializes on the destination chain.
    pub purchase_id: Option<FixedBytes<32>>,
    pub cross_chain: bool,
    /// Routing message id, present only for cross-chain purchases.
    pub message_id: Option<FixedBytes<32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_is_total() {
        use OrderStatus::*;
        let cases = [
            (Pending, TradeStatus::Pending),
            (Accepted, TradeStatus::Release),
            (Processing, TradeStatus::Release),
            (Rejected, TradeStatus::Cancelled),
            (Disputed, TradeStatus::Cancelled),
            (Refunded, TradeStatus::Pending),
            (Completed, TradeStatus::Completed),
        ];
        for (backend, expected) in cases {
            assert_eq!(TradeStatus::from(backend), expected, "for {backend:?}");
        }
    }

    #[test]
    fn test_order_status_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Processing).unwrap(),
            "\"processing\""
        );
        let parsed: OrderStatus = serde_json::from_str("\"disputed\"").unwrap();
        assert_eq!(parsed, OrderStatus::Disputed);
    }

    #[test]
    fn test_total_amount() {
        let order = Order {
            id: "ord-1".into(),
            buyer: "buyer-1".into(),
            seller: "seller-1".into(),
            product: "prod-1".into(),
            quantity: 3,
            unit_amount: U256::from(25_000_000u64), // 25 USDT
            logistics_provider: Address::ZERO,
            status: OrderStatus::Pending,
            trade_id: U256::from(7),
            created_at: UnixTimestamp(1_700_000_000),
            updated_at: UnixTimestamp(1_700_000_000),
        };
        assert_eq!(order.total_amount(), U256::from(75_000_000u64));
    }

    #[test]
    fn test_purchase_state_decoding() {
        assert_eq!(PurchaseState::from_u8(0), PurchaseState::Created);
        assert_eq!(PurchaseState::from_u8(3), PurchaseState::Settled);
        assert_eq!(PurchaseState::from_u8(99), PurchaseState::Created);
    }
}
