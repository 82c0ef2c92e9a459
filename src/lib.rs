//! Order-payment state machine and cross-chain escrow orchestration for a
//! peer-to-peer stablecoin marketplace.
//!
//! Buyers and sellers transact physical goods paid in USDT through an
//! on-chain escrow contract, optionally across EVM chains via a CCIP-style
//! routing selector. This crate is the headless core a frontend binds to:
//!
//! - [`network`] – supported chains and their routing metadata
//! - [`escrow`] – typed wrapper over the escrow contract (approve, buy,
//!   confirm delivery, dispute), revert reasons normalized into [`error::EscrowError`]
//! - [`fees`] – cross-chain message fee quotes with a static fallback
//! - [`payment`] – the review → processing → success | error payment flow
//! - [`dispute`] – confirm-delivery and raise-dispute flows
//! - [`reconciler`] – backend order status → UI trade status, with settle delays
//! - [`backend`] – REST order API client
//! - [`session`] – wallet seam and durable current-order-id storage
//! - [`retry`] – bounded, cancellation-aware polling shared by the flows
//!
//! All flows are cooperative-cancellation aware (`tokio_util`'s
//! `CancellationToken`): a superseded flow completes its I/O but discards the
//! result instead of committing state.

pub mod backend;
pub mod config;
pub mod dispute;
pub mod error;
pub mod escrow;
pub mod fees;
pub mod network;
pub mod order;
pub mod payment;
pub mod reconciler;
pub mod retry;
pub mod session;

pub use config::EscrowConfig;
pub use error::EscrowError;
pub use network::{ChainDescriptor, Network};
pub use order::{Order, OrderStatus, PaymentTransaction, TradeStatus};
