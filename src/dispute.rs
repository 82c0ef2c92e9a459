//! Delivery confirmation and dispute flows.
//!
//! Both flows share the same shape: a guarded single-shot action that
//! submits one escrow transaction, optimistically reports completion once
//! the chain confirms, then reconciles the backend within a budget and
//! schedules a redirect. A dispute additionally carries a buyer-typed
//! reason, which survives a failed attempt so the buyer never retypes it.

use crate::backend::OrderBackend;
use crate::config::EscrowConfig;
use crate::error::EscrowError;
use crate::escrow::{EscrowGateway, TxHandle};
use crate::order::OrderStatus;
use alloy::primitives::FixedBytes;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a single-shot escrow action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionPhase {
    /// Nothing submitted yet. Entry state and the retry target.
    Idle,
    /// Transaction in flight; re-entry is refused.
    Submitting,
    /// Chain confirmed the action. Terminal.
    Done,
    /// The attempt failed. Terminal until retried.
    Failed(EscrowError),
}

/// What an action call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed(TxHandle),
    /// The action is in flight or already done; nothing was submitted.
    AlreadyInFlight,
}

/// Guarded phase cell shared by both flows.
struct ActionFlow {
    phase: Mutex<ActionPhase>,
}

impl ActionFlow {
    fn new() -> Self {
        Self {
            phase: Mutex::new(ActionPhase::Idle),
        }
    }

    fn phase(&self) -> ActionPhase {
        self.phase.lock().expect("action phase lock poisoned").clone()
    }

    /// Claim the flow; refuses while submitting or after completion.
    fn begin(&self) -> bool {
        let mut phase = self.phase.lock().expect("action phase lock poisoned");
        match *phase {
            ActionPhase::Submitting | ActionPhase::Done => false,
            ActionPhase::Idle | ActionPhase::Failed(_) => {
                *phase = ActionPhase::Submitting;
                true
            }
        }
    }

    fn complete(&self) {
        *self.phase.lock().expect("action phase lock poisoned") = ActionPhase::Done;
    }

    fn fail(&self, error: EscrowError) {
        *self.phase.lock().expect("action phase lock poisoned") = ActionPhase::Failed(error);
    }

    fn reset(&self) {
        let mut phase = self.phase.lock().expect("action phase lock poisoned");
        if matches!(*phase, ActionPhase::Failed(_)) {
            *phase = ActionPhase::Idle;
        }
    }
}

type RedirectHook = Arc<dyn Fn() + Send + Sync>;

/// Drives delivery confirmation and dispute submission for one purchase.
pub struct DisputeOrchestrator<G, B> {
    gateway: G,
    backend: B,
    config: Arc<EscrowConfig>,
    cancel: CancellationToken,
    delivery: ActionFlow,
    dispute: ActionFlow,
    reason_draft: Mutex<String>,
    on_redirect: Mutex<Option<RedirectHook>>,
}

impl<G, B> DisputeOrchestrator<G, B>
where
    G: EscrowGateway,
    B: OrderBackend,
{
    pub fn new(gateway: G, backend: B, config: Arc<EscrowConfig>, cancel: CancellationToken) -> Self {
        Self {
            gateway,
            backend,
            config,
            cancel,
            delivery: ActionFlow::new(),
            dispute: ActionFlow::new(),
            reason_draft: Mutex::new(String::new()),
            on_redirect: Mutex::new(None),
        }
    }

    /// Register the redirect invoked after a completed action settles.
    pub fn set_on_redirect(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_redirect.lock().expect("redirect lock poisoned") = Some(Arc::new(hook));
    }

    pub fn delivery_phase(&self) -> ActionPhase {
        self.delivery.phase()
    }

    pub fn dispute_phase(&self) -> ActionPhase {
        self.dispute.phase()
    }

    /// Allow another delivery attempt after a failure.
    pub fn retry_delivery(&self) {
        self.delivery.reset();
    }

    /// Allow another dispute attempt after a failure. The typed reason is
    /// kept.
    pub fn retry_dispute(&self) {
        self.dispute.reset();
    }

    /// Stash the buyer-typed dispute reason.
    pub fn set_reason(&self, reason: &str) {
        *self.reason_draft.lock().expect("reason lock poisoned") = reason.to_string();
    }

    pub fn reason(&self) -> String {
        self.reason_draft.lock().expect("reason lock poisoned").clone()
    }

    /// Buyer confirms delivery; escrow releases funds to the seller.
    pub async fn confirm_delivery(
        &self,
        order_id: &str,
        purchase_id: FixedBytes<32>,
    ) -> Result<ActionOutcome, EscrowError> {
        if !self.delivery.begin() {
            tracing::debug!(order_id, "delivery confirmation already in flight, ignoring");
            return Ok(ActionOutcome::AlreadyInFlight);
        }

        let tx = match self.gateway.confirm_delivery(purchase_id).await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(order_id, error = %e, "delivery confirmation failed");
                self.delivery.fail(e.clone());
                return Err(e);
            }
        };

        // The chain released the funds; report done before the backend
        // catches up.
        self.delivery.complete();
        self.settle_backend(order_id, OrderStatus::Completed, None).await;
        self.schedule_redirect(order_id);
        Ok(ActionOutcome::Completed(tx))
    }

    /// Buyer raises a dispute; escrow freezes the purchase.
    ///
    /// The reason must be set and non-empty; validation failures leave the
    /// flow in `Idle` with the draft untouched.
    pub async fn raise_dispute(
        &self,
        order_id: &str,
        purchase_id: FixedBytes<32>,
    ) -> Result<ActionOutcome, EscrowError> {
        let reason = self.reason();
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EscrowError::UnknownFailure(
                "a dispute reason is required".to_string(),
            ));
        }

        if !self.dispute.begin() {
            tracing::debug!(order_id, "dispute already in flight, ignoring");
            return Ok(ActionOutcome::AlreadyInFlight);
        }

        let tx = match self.gateway.raise_dispute(purchase_id).await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(order_id, error = %e, "dispute submission failed");
                self.dispute.fail(e.clone());
                // Draft is kept so the buyer can retry without retyping
                return Err(e);
            }
        };

        self.dispute.complete();
        self.settle_backend(order_id, OrderStatus::Disputed, Some(reason)).await;
        *self.reason_draft.lock().expect("reason lock poisoned") = String::new();
        self.schedule_redirect(order_id);
        Ok(ActionOutcome::Completed(tx))
    }

    /// Budget-bounded backend reconciliation. Divergence is logged, never
    /// surfaced: the chain already settled the action.
    async fn settle_backend(&self, order_id: &str, status: OrderStatus, reason: Option<&str>) {
        let update = async {
            match reason {
                Some(reason) => self.backend.dispute(order_id, reason).await,
                None => self.backend.update_status(order_id, status).await,
            }
        };
        match tokio::time::timeout(self.config.backend.update_budget(), update).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::warn!(order_id, status = ?status, error = %e, "backend diverged after settled action");
            }
            Err(_) => {
                tracing::warn!(
                    order_id,
                    status = ?status,
                    budget_ms = self.config.backend.update_budget().as_millis() as u64,
                    "backend update budget exhausted after settled action"
                );
            }
        }
    }

    /// Fire the redirect hook after the configured delay, unless shutdown
    /// lands first.
    fn schedule_redirect(&self, order_id: &str) {
        let hook = match self.on_redirect.lock().expect("redirect lock poisoned").clone() {
            Some(hook) => hook,
            None => return,
        };
        let delay = self.config.reconciler.redirect_delay();
        let cancel = self.cancel.clone();
        let order_id = order_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    tracing::debug!(order_id, "redirecting after settled action");
                    hook();
                }
                _ = cancel.cancelled() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NewOrder, OrderBackend, OrderDetailsUpdate};
    use crate::escrow::{EscrowDeployment, PurchaseParams, PurchaseReceipt};
    use crate::network::Network;
    use crate::order::{Order, UnixTimestamp};
    use alloy::primitives::{Address, TxHash, U256};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::time::{advance, Duration};

    fn order() -> Order {
        Order {
            id: "ord-1".to_string(),
            buyer: Address::repeat_byte(1).to_string(),
            seller: Address::repeat_byte(2).to_string(),
            product: "widget".to_string(),
            quantity: 1,
            unit_amount: U256::from(100u64),
            logistics_provider: Address::repeat_byte(3),
            status: OrderStatus::Accepted,
            trade_id: U256::from(7u64),
            created_at: UnixTimestamp::now(),
            updated_at: UnixTimestamp::now(),
        }
    }

    struct MockGateway {
        fail_delivery: bool,
        fail_dispute: bool,
        delivery_calls: AtomicU32,
        dispute_calls: AtomicU32,
    }

    impl MockGateway {
        fn ok() -> Self {
            Self {
                fail_delivery: false,
                fail_dispute: false,
                delivery_calls: AtomicU32::new(0),
                dispute_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl EscrowGateway for MockGateway {
        fn deployment(&self) -> EscrowDeployment {
            EscrowDeployment {
                network: Network::Polygon,
                escrow: Address::repeat_byte(0xee),
                token: Address::repeat_byte(0x77),
            }
        }

        async fn allowance(&self, _owner: Address) -> Result<U256, EscrowError> {
            Ok(U256::ZERO)
        }

        async fn balance(&self, _owner: Address) -> Result<U256, EscrowError> {
            Ok(U256::ZERO)
        }

        async fn approve(&self, _amount: U256) -> Result<TxHandle, EscrowError> {
            unimplemented!("not exercised in dispute tests")
        }

        async fn submit_purchase(
            &self,
            _params: PurchaseParams,
        ) -> Result<PurchaseReceipt, EscrowError> {
            unimplemented!("not exercised in dispute tests")
        }

        async fn confirm_delivery(&self, _purchase_id: FixedBytes<32>) -> Result<TxHandle, EscrowError> {
            self.delivery_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_delivery {
                return Err(EscrowError::NotAuthorized);
            }
            Ok(TxHandle {
                hash: TxHash::repeat_byte(0xcc),
                submitted_at: UnixTimestamp::now(),
            })
        }

        async fn raise_dispute(&self, _purchase_id: FixedBytes<32>) -> Result<TxHandle, EscrowError> {
            self.dispute_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_dispute {
                return Err(EscrowError::InvalidPurchaseState);
            }
            Ok(TxHandle {
                hash: TxHash::repeat_byte(0xdd),
                submitted_at: UnixTimestamp::now(),
            })
        }

        async fn purchase(
            &self,
            _purchase_id: FixedBytes<32>,
        ) -> Result<Option<crate::order::EscrowPurchase>, EscrowError> {
            Ok(None)
        }

        async fn supported_destination_chains(&self) -> Vec<&'static crate::network::ChainDescriptor> {
            vec![]
        }
    }

    #[derive(Default)]
    struct MockBackend {
        fail_updates: bool,
        statuses: Mutex<Vec<OrderStatus>>,
        dispute_reasons: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OrderBackend for MockBackend {
        async fn create_order(&self, _order: &NewOrder) -> Result<Order, EscrowError> {
            Ok(order())
        }

        async fn order(&self, _order_id: &str) -> Result<Order, EscrowError> {
            Ok(order())
        }

        async fn update_status(
            &self,
            _order_id: &str,
            status: OrderStatus,
        ) -> Result<Order, EscrowError> {
            if self.fail_updates {
                return Err(EscrowError::BackendUpdateFailed("503".into()));
            }
            self.statuses.lock().unwrap().push(status);
            Ok(order())
        }

        async fn update_details(
            &self,
            _order_id: &str,
            _details: &OrderDetailsUpdate,
        ) -> Result<Order, EscrowError> {
            Ok(order())
        }

        async fn dispute(&self, _order_id: &str, reason: &str) -> Result<Order, EscrowError> {
            if self.fail_updates {
                return Err(EscrowError::BackendUpdateFailed("503".into()));
            }
            self.dispute_reasons.lock().unwrap().push(reason.to_string());
            Ok(order())
        }
    }

    fn orchestrator(
        gateway: MockGateway,
        backend: MockBackend,
    ) -> DisputeOrchestrator<MockGateway, MockBackend> {
        DisputeOrchestrator::new(
            gateway,
            backend,
            Arc::new(EscrowConfig::default()),
            CancellationToken::new(),
        )
    }

    fn pid() -> FixedBytes<32> {
        FixedBytes::repeat_byte(0x11)
    }

    #[tokio::test]
    async fn delivery_completes_and_marks_order_completed() {
        let orch = orchestrator(MockGateway::ok(), MockBackend::default());

        let outcome = orch.confirm_delivery("ord-1", pid()).await.unwrap();
        assert!(matches!(outcome, ActionOutcome::Completed(_)));
        assert_eq!(orch.delivery_phase(), ActionPhase::Done);
        assert_eq!(
            *orch.backend.statuses.lock().unwrap(),
            vec![OrderStatus::Completed]
        );
    }

    #[tokio::test]
    async fn delivery_is_single_shot() {
        let orch = orchestrator(MockGateway::ok(), MockBackend::default());

        orch.confirm_delivery("ord-1", pid()).await.unwrap();
        let second = orch.confirm_delivery("ord-1", pid()).await.unwrap();
        assert_eq!(second, ActionOutcome::AlreadyInFlight);
        assert_eq!(orch.gateway.delivery_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delivery_failure_is_retryable() {
        let mut gateway = MockGateway::ok();
        gateway.fail_delivery = true;
        let orch = orchestrator(gateway, MockBackend::default());

        let err = orch.confirm_delivery("ord-1", pid()).await.unwrap_err();
        assert_eq!(err, EscrowError::NotAuthorized);
        assert_eq!(orch.delivery_phase(), ActionPhase::Failed(EscrowError::NotAuthorized));

        orch.retry_delivery();
        assert_eq!(orch.delivery_phase(), ActionPhase::Idle);
    }

    #[tokio::test]
    async fn backend_failure_after_release_still_completes() {
        let backend = MockBackend {
            fail_updates: true,
            ..Default::default()
        };
        let orch = orchestrator(MockGateway::ok(), backend);

        let outcome = orch.confirm_delivery("ord-1", pid()).await.unwrap();
        assert!(matches!(outcome, ActionOutcome::Completed(_)));
        assert_eq!(orch.delivery_phase(), ActionPhase::Done);
    }

    #[tokio::test]
    async fn empty_reason_blocks_dispute_without_phase_change() {
        let orch = orchestrator(MockGateway::ok(), MockBackend::default());
        orch.set_reason("   ");

        let err = orch.raise_dispute("ord-1", pid()).await.unwrap_err();
        assert!(matches!(err, EscrowError::UnknownFailure(_)));
        assert_eq!(orch.dispute_phase(), ActionPhase::Idle);
        assert_eq!(orch.gateway.dispute_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispute_sends_reason_and_clears_draft() {
        let orch = orchestrator(MockGateway::ok(), MockBackend::default());
        orch.set_reason("item never arrived");

        let outcome = orch.raise_dispute("ord-1", pid()).await.unwrap();
        assert!(matches!(outcome, ActionOutcome::Completed(_)));
        assert_eq!(
            *orch.backend.dispute_reasons.lock().unwrap(),
            vec!["item never arrived".to_string()]
        );
        assert_eq!(orch.reason(), "");
    }

    #[tokio::test]
    async fn failed_dispute_preserves_typed_reason() {
        let mut gateway = MockGateway::ok();
        gateway.fail_dispute = true;
        let orch = orchestrator(gateway, MockBackend::default());
        orch.set_reason("wrong item delivered");

        let err = orch.raise_dispute("ord-1", pid()).await.unwrap_err();
        assert_eq!(err, EscrowError::InvalidPurchaseState);
        assert_eq!(orch.reason(), "wrong item delivered");

        orch.retry_dispute();
        assert_eq!(orch.dispute_phase(), ActionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_fires_after_delay() {
        let orch = orchestrator(MockGateway::ok(), MockBackend::default());
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        orch.set_on_redirect(move || flag.store(true, Ordering::SeqCst));

        orch.confirm_delivery("ord-1", pid()).await.unwrap();
        // Let the spawned redirect register its timer before moving the clock
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));

        advance(orch.config.reconciler.redirect_delay() + Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_suppresses_pending_redirect() {
        let cancel = CancellationToken::new();
        let orch = DisputeOrchestrator::new(
            MockGateway::ok(),
            MockBackend::default(),
            Arc::new(EscrowConfig::default()),
            cancel.clone(),
        );
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        orch.set_on_redirect(move || flag.store(true, Ordering::SeqCst));

        orch.confirm_delivery("ord-1", pid()).await.unwrap();
        tokio::task::yield_now().await;
        cancel.cancel();
        advance(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
