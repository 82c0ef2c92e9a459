//! Payment orchestration.
//!
//! Drives a purchase from "buyer clicked pay" to a confirmed escrow deposit:
//! wallet and network checks, allowance/approval, optional cross-chain
//! routing, purchase submission, and the post-success backend update. The
//! flow is a small state machine guarded against re-entry; the on-chain
//! transaction is the commit point, and everything after it is best-effort
//! bookkeeping that can never turn a confirmed payment into a failure.

use crate::backend::{OrderBackend, OrderDetailsUpdate};
use crate::config::EscrowConfig;
use crate::error::EscrowError;
use crate::escrow::{CrossChainRoute, EscrowGateway, PurchaseParams};
use crate::fees::FeeEstimator;
use crate::network::Network;
use crate::order::{Order, OrderStatus, PaymentTransaction, TxStatus, UnixTimestamp};
use crate::retry::{poll_until, PollOutcome};
use crate::session::{OrderStore, WalletSession};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Lifecycle of one payment attempt.
///
/// `Error` holds the failure for display; the only transition out of it is
/// [`PaymentOrchestrator::retry`] back to `Review`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentPhase {
    /// Idle; buyer reviews the order. Entry state and the retry target.
    Review,
    /// A payment attempt is in flight. Re-entry is refused.
    Processing,
    /// Escrow deposit confirmed on-chain. Terminal.
    Success,
    /// The attempt failed with a fatal error. Terminal until `retry`.
    Error(EscrowError),
}

/// What a `pay` call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Deposit confirmed; the transaction record is final.
    Completed(PaymentTransaction),
    /// Another attempt is in flight or already succeeded; nothing was done.
    AlreadyInFlight,
    /// The flow was cancelled before the commit point; state is back at
    /// `Review` and the stored order id is untouched.
    Cancelled,
}

/// One payment to run: the order plus the chain the buyer pays from.
///
/// The destination is always the chain hosting the trade; the payment is
/// cross-chain exactly when `source_network` differs from it.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order: Order,
    pub source_network: Network,
}

enum FlowStop {
    Cancelled,
    Failed(EscrowError),
}

impl From<EscrowError> for FlowStop {
    fn from(e: EscrowError) -> Self {
        FlowStop::Failed(e)
    }
}

type SuccessHook = Arc<dyn Fn(&PaymentTransaction) + Send + Sync>;

/// Orchestrates payment attempts against one escrow deployment.
pub struct PaymentOrchestrator<G, W, B, F, S> {
    gateway: G,
    wallet: W,
    backend: B,
    fees: F,
    store: S,
    config: Arc<EscrowConfig>,
    cancel: CancellationToken,
    phase: Mutex<PaymentPhase>,
    on_success: Mutex<Option<SuccessHook>>,
}

impl<G, W, B, F, S> PaymentOrchestrator<G, W, B, F, S>
where
    G: EscrowGateway,
    W: WalletSession,
    B: OrderBackend,
    F: FeeEstimator,
    S: OrderStore,
{
    pub fn new(
        gateway: G,
        wallet: W,
        backend: B,
        fees: F,
        store: S,
        config: Arc<EscrowConfig>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            wallet,
            backend,
            fees,
            store,
            config,
            cancel,
            phase: Mutex::new(PaymentPhase::Review),
            on_success: Mutex::new(None),
        }
    }

    /// Register a hook invoked once per confirmed payment, after the backend
    /// update settles and the stored order id is cleared.
    pub fn set_on_success(&self, hook: impl Fn(&PaymentTransaction) + Send + Sync + 'static) {
        *self.on_success.lock().expect("hook lock poisoned") = Some(Arc::new(hook));
    }

    pub fn phase(&self) -> PaymentPhase {
        self.phase.lock().expect("phase lock poisoned").clone()
    }

    /// Leave the error state and allow another attempt. No-op in any other
    /// phase.
    pub fn retry(&self) {
        let mut phase = self.phase.lock().expect("phase lock poisoned");
        if matches!(*phase, PaymentPhase::Error(_)) {
            *phase = PaymentPhase::Review;
        }
    }

    /// Abandon the current order: drop the persisted id and return to
    /// `Review`. Refused while an attempt is in flight.
    pub fn abandon(&self) -> bool {
        let mut phase = self.phase.lock().expect("phase lock poisoned");
        if matches!(*phase, PaymentPhase::Processing) {
            return false;
        }
        *phase = PaymentPhase::Review;
        self.store.clear();
        true
    }

    fn set_phase(&self, next: PaymentPhase) {
        *self.phase.lock().expect("phase lock poisoned") = next;
    }

    /// Atomically claim the flow. Refuses while in flight or after success.
    fn begin(&self) -> bool {
        let mut phase = self.phase.lock().expect("phase lock poisoned");
        match *phase {
            PaymentPhase::Processing | PaymentPhase::Success => false,
            PaymentPhase::Review | PaymentPhase::Error(_) => {
                *phase = PaymentPhase::Processing;
                true
            }
        }
    }

    /// Run one payment attempt end to end.
    pub async fn pay(&self, request: PaymentRequest) -> Result<PaymentOutcome, EscrowError> {
        if !self.begin() {
            tracing::debug!(order_id = %request.order.id, "payment already in flight, ignoring");
            return Ok(PaymentOutcome::AlreadyInFlight);
        }

        match self.run(&request).await {
            Ok(tx) => {
                // The order id is kept until here so an interrupted flow can
                // still be reconciled on the next load.
                self.store.clear();
                self.set_phase(PaymentPhase::Success);
                // Take the hook out of the guard first so a hook that
                // re-registers itself cannot deadlock
                let hook = self.on_success.lock().expect("hook lock poisoned").clone();
                if let Some(hook) = hook {
                    hook(&tx);
                }
                Ok(PaymentOutcome::Completed(tx))
            }
            Err(FlowStop::Cancelled) => {
                tracing::info!(order_id = %request.order.id, "payment cancelled before commit");
                self.set_phase(PaymentPhase::Review);
                Ok(PaymentOutcome::Cancelled)
            }
            Err(FlowStop::Failed(EscrowError::WalletNotConnected)) => {
                // Not an attempt failure, the buyer simply has to connect
                self.set_phase(PaymentPhase::Review);
                Err(EscrowError::WalletNotConnected)
            }
            Err(FlowStop::Failed(e)) => {
                tracing::warn!(order_id = %request.order.id, error = %e, "payment attempt failed");
                self.set_phase(PaymentPhase::Error(e.clone()));
                Err(e)
            }
        }
    }

    async fn run(&self, request: &PaymentRequest) -> Result<PaymentTransaction, FlowStop> {
        // Persist first: if the process dies mid-flow, the next load can
        // find and reconcile this order.
        self.store.store(&request.order.id);

        let buyer = self.wallet.address().ok_or(EscrowError::WalletNotConnected)?;
        self.ensure_network(request.source_network).await?;

        let total = request.order.total_amount();
        self.ensure_allowance(buyer, total).await?;

        let destination = self.gateway.deployment().network;
        let route = self.plan_route(request, destination).await?;
        let cross_chain = route.is_some();

        // Commit point: past this, cancellation is no longer honored.
        if self.cancel.is_cancelled() {
            return Err(FlowStop::Cancelled);
        }

        let receipt = self
            .gateway
            .submit_purchase(PurchaseParams {
                trade_id: request.order.trade_id,
                quantity: request.order.quantity,
                logistics_provider: request.order.logistics_provider,
                route,
            })
            .await?;

        let tx = PaymentTransaction {
            hash: receipt.tx.hash,
            amount: total,
            token_symbol: "USDT".to_string(),
            from: buyer,
            to: self.gateway.deployment().escrow,
            status: TxStatus::Confirmed,
            timestamp: UnixTimestamp::now(),
            purchase_id: receipt.purchase_id,
            cross_chain,
            message_id: receipt.message_id,
        };

        self.finalize_backend(request, &tx).await;
        Ok(tx)
    }

    /// Put the wallet on `source` if it is not already there.
    async fn ensure_network(&self, source: Network) -> Result<(), FlowStop> {
        let current = self.wallet.chain_id().await?;
        if current == source.chain_id() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(FlowStop::Cancelled);
        }

        tracing::info!(from_chain = current, to_chain = source.chain_id(), "switching wallet network");
        self.wallet.switch_network(source.chain_id()).await?;

        // Wallet providers report the new chain before their RPC actually
        // follows; give it a moment to settle, then verify.
        tokio::time::sleep(self.config.payment.network_settle_delay()).await;
        let settled = self.wallet.chain_id().await?;
        if settled != source.chain_id() {
            return Err(EscrowError::WrongNetwork(source.chain_id(), settled).into());
        }
        Ok(())
    }

    /// Make sure the escrow can pull `total` from the buyer, approving and
    /// polling for visibility when it cannot yet. The balance is checked up
    /// front either way: a generous leftover allowance must not let an
    /// unfunded purchase reach the contract.
    async fn ensure_allowance(&self, buyer: alloy::primitives::Address, total: alloy::primitives::U256) -> Result<(), FlowStop> {
        let balance = self.gateway.balance(buyer).await?;
        if balance < total {
            return Err(EscrowError::InsufficientBalance.into());
        }

        let allowance = self.gateway.allowance(buyer).await?;
        if allowance >= total {
            tracing::debug!(%allowance, %total, "existing allowance sufficient, skipping approval");
            return Ok(());
        }

        if self.cancel.is_cancelled() {
            return Err(FlowStop::Cancelled);
        }
        // A rejection here is a rejection of the approval, not the purchase
        self.gateway.approve(total).await.map_err(|e| match e {
            EscrowError::UserRejectedTransaction => EscrowError::ApprovalRejected,
            other => other,
        })?;

        let attempts = self.config.payment.approval_poll_attempts;
        let outcome = poll_until(
            attempts,
            self.config.payment.approval_poll_interval(),
            &self.cancel,
            || async move {
                match self.gateway.allowance(buyer).await {
                    Ok(a) if a >= total => Some(()),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::debug!(error = %e, "allowance read failed while polling");
                        None
                    }
                }
            },
        )
        .await;

        match outcome {
            PollOutcome::Ready(()) => Ok(()),
            PollOutcome::Exhausted => Err(EscrowError::ApprovalTimeout(attempts).into()),
            PollOutcome::Cancelled => Err(FlowStop::Cancelled),
        }
    }

    /// Decide the cross-chain leg. `None` when source and destination match.
    async fn plan_route(
        &self,
        request: &PaymentRequest,
        destination: Network,
    ) -> Result<Option<CrossChainRoute>, FlowStop> {
        if request.source_network == destination {
            return Ok(None);
        }
        let selector = destination.ccip_selector().ok_or_else(|| {
            EscrowError::CrossChainRoutingFailed(format!(
                "{destination} has no routing selector"
            ))
        })?;
        let quote = self.fees.estimate(selector, request.order.quantity).await;
        tracing::info!(
            source = %request.source_network,
            destination = %destination,
            fee = %quote.fee,
            estimated = quote.estimated,
            "cross-chain purchase planned"
        );
        Ok(Some(CrossChainRoute {
            destination_selector: selector,
            fee_value: quote.fee,
            pay_fees_in_native: true,
        }))
    }

    /// Bring the backend in line with the confirmed deposit, within the
    /// configured budget. Divergence is logged, never surfaced: the chain
    /// already holds the funds.
    async fn finalize_backend(&self, request: &PaymentRequest, tx: &PaymentTransaction) {
        let status = if tx.cross_chain {
            OrderStatus::Processing
        } else {
            OrderStatus::Accepted
        };
        let details = OrderDetailsUpdate {
            tx_hash: Some(tx.hash.to_string()),
            message_id: tx.message_id.map(|id| id.to_string()),
            purchase_id: tx.purchase_id.map(|id| id.to_string()),
            source_chain_id: Some(request.source_network.chain_id()),
        };

        let update = async {
            self.backend.update_status(&request.order.id, status).await?;
            self.backend.update_details(&request.order.id, &details).await
        };
        match tokio::time::timeout(self.config.backend.update_budget(), update).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    order_id = %request.order.id,
                    tx = %tx.hash,
                    error = %e,
                    "backend diverged after confirmed deposit"
                );
            }
            Err(_) => {
                tracing::warn!(
                    order_id = %request.order.id,
                    tx = %tx.hash,
                    budget_ms = self.config.backend.update_budget().as_millis() as u64,
                    "backend update budget exhausted after confirmed deposit"
                );
            }
        }
    }
}
