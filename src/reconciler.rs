//! Trade status reconciliation.
//!
//! Backend order statuses do not become visible the instant they change:
//! local settlements and cross-chain message delivery have very different
//! latency, and the presentation layer needs an "updating" affordance while
//! the transition is in flight. The reconciler owns that timing. Each order
//! id gets a watch channel publishing [`TradeView`] snapshots; observers
//! subscribe and render whatever was last published.

use crate::config::ReconcilerConfig;
use crate::order::{OrderStatus, TradeStatus, UnixTimestamp};
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// What an observer of one trade currently sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeView {
    pub status: TradeStatus,
    /// True while a status transition is settling.
    pub updating: bool,
}

/// How a status change settles, which decides the applied delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Same-chain transaction, short finality.
    Local,
    /// Cross-chain message, delivery takes materially longer.
    CrossChain,
}

/// Publishes delayed, cancellation-aware trade status transitions.
pub struct StatusReconciler {
    config: ReconcilerConfig,
    feeds: DashMap<String, watch::Sender<TradeView>>,
    cancel: CancellationToken,
}

impl StatusReconciler {
    pub fn new(config: ReconcilerConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            feeds: DashMap::new(),
            cancel,
        }
    }

    /// Subscribe to an order's trade view, seeding the feed with `initial`
    /// if this is the first subscription.
    pub fn subscribe(&self, order_id: &str, initial: TradeStatus) -> watch::Receiver<TradeView> {
        self.feeds
            .entry(order_id.to_string())
            .or_insert_with(|| {
                let (tx, _) = watch::channel(TradeView {
                    status: initial,
                    updating: false,
                });
                tx
            })
            .subscribe()
    }

    /// Current view for an order, if anything has been published.
    pub fn current(&self, order_id: &str) -> Option<TradeView> {
        self.feeds.get(order_id).map(|tx| *tx.borrow())
    }

    fn delay_for(&self, settlement: Settlement) -> Duration {
        match settlement {
            Settlement::Local => self.config.local_delay(),
            Settlement::CrossChain => self.config.cross_chain_delay(),
        }
    }

    fn publish(&self, order_id: &str, view: TradeView) {
        let tx = self
            .feeds
            .entry(order_id.to_string())
            .or_insert_with(|| watch::channel(view).0)
            .clone();
        // send_replace so publishing works with zero live receivers
        tx.send_replace(view);
    }

    /// Apply a backend status change to the trade view.
    ///
    /// The previous status stays visible with `updating` set while the
    /// settlement delay elapses, then the mapped [`TradeStatus`] lands.
    /// On shutdown the pending transition applies immediately instead of
    /// being lost.
    pub async fn observe(&self, order_id: &str, status: OrderStatus, settlement: Settlement) {
        let target = TradeStatus::from(status);
        let previous = self
            .current(order_id)
            .map(|v| v.status)
            .unwrap_or(TradeStatus::Pending);

        if previous == target {
            self.publish(
                order_id,
                TradeView {
                    status: target,
                    updating: false,
                },
            );
            return;
        }

        self.publish(
            order_id,
            TradeView {
                status: previous,
                updating: true,
            },
        );

        let delay = self.delay_for(settlement);
        tracing::debug!(
            order_id,
            from = ?previous,
            to = ?target,
            delay_ms = delay.as_millis() as u64,
            "trade status transition scheduled"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancel.cancelled() => {
                tracing::debug!(order_id, "shutdown during transition, applying immediately");
            }
        }

        self.publish(
            order_id,
            TradeView {
                status: target,
                updating: false,
            },
        );
    }

    /// Drop an order's feed once no observer needs it.
    pub fn forget(&self, order_id: &str) {
        self.feeds.remove(order_id);
    }
}

/// Time left in the payment window opened at `started_at`, or `None` once
/// expired.
pub fn payment_window_remaining(started_at: UnixTimestamp, window: Duration) -> Option<Duration> {
    let now = UnixTimestamp::now().0;
    let deadline = started_at.0.saturating_add(window.as_secs());
    if now >= deadline {
        None
    } else {
        Some(Duration::from_secs(deadline - now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, Duration};

    fn reconciler() -> StatusReconciler {
        StatusReconciler::new(ReconcilerConfig::default(), CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn local_transition_shows_updating_then_lands() {
        let rec = std::sync::Arc::new(reconciler());
        let mut view = rec.subscribe("ord-1", TradeStatus::Pending);

        let rec2 = rec.clone();
        let task = tokio::spawn(async move {
            rec2.observe("ord-1", OrderStatus::Accepted, Settlement::Local)
                .await;
        });

        view.changed().await.unwrap();
        assert_eq!(
            *view.borrow(),
            TradeView {
                status: TradeStatus::Pending,
                updating: true
            }
        );

        advance(rec.config.local_delay() + Duration::from_millis(1)).await;
        task.await.unwrap();
        assert_eq!(
            *view.borrow(),
            TradeView {
                status: TradeStatus::Release,
                updating: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cross_chain_waits_longer_than_local() {
        let rec = std::sync::Arc::new(reconciler());
        rec.subscribe("ord-2", TradeStatus::Pending);

        let rec2 = rec.clone();
        let task = tokio::spawn(async move {
            rec2.observe("ord-2", OrderStatus::Completed, Settlement::CrossChain)
                .await;
        });
        tokio::task::yield_now().await;

        // A local delay's worth of time is not enough
        advance(rec.config.local_delay()).await;
        tokio::task::yield_now().await;
        assert!(rec.current("ord-2").unwrap().updating);

        advance(rec.config.cross_chain_delay()).await;
        task.await.unwrap();
        assert_eq!(rec.current("ord-2").unwrap().status, TradeStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn same_status_applies_without_delay() {
        let rec = reconciler();
        rec.subscribe("ord-3", TradeStatus::Pending);
        rec.observe("ord-3", OrderStatus::Refunded, Settlement::Local)
            .await;
        // Refunded maps back to Pending, so no transition and no delay
        assert_eq!(
            rec.current("ord-3").unwrap(),
            TradeView {
                status: TradeStatus::Pending,
                updating: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_applies_transition_immediately() {
        let cancel = CancellationToken::new();
        let rec = std::sync::Arc::new(StatusReconciler::new(
            ReconcilerConfig::default(),
            cancel.clone(),
        ));
        rec.subscribe("ord-4", TradeStatus::Pending);

        let rec2 = rec.clone();
        let task = tokio::spawn(async move {
            rec2.observe("ord-4", OrderStatus::Accepted, Settlement::CrossChain)
                .await;
        });
        tokio::task::yield_now().await;

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(
            rec.current("ord-4").unwrap(),
            TradeView {
                status: TradeStatus::Release,
                updating: false
            }
        );
    }

    #[test]
    fn window_remaining_counts_down() {
        let now = UnixTimestamp::now();
        let remaining = payment_window_remaining(now, Duration::from_secs(600)).unwrap();
        assert!(remaining <= Duration::from_secs(600));
        assert!(remaining >= Duration::from_secs(598));

        let long_ago = UnixTimestamp(now.0.saturating_sub(700));
        assert_eq!(
            payment_window_remaining(long_ago, Duration::from_secs(600)),
            None
        );
    }
}
