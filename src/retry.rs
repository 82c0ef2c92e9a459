//! Bounded polling with a fixed interval.
//!
//! One utility shared by every "wait for an on-chain condition" loop, so the
//! attempt budget and cancellation behavior live in a single place instead of
//! ad hoc loops per call site.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of a bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The condition was met within the attempt budget.
    Ready(T),
    /// The attempt budget was exhausted.
    Exhausted,
    /// The owning flow was cancelled; no further attempts were made.
    Cancelled,
}

/// Poll `check` up to `max_attempts` times, sleeping `interval` between
/// attempts. The first attempt runs immediately. `check` returning `Some`
/// resolves the poll; the cancellation token is honored both mid-sleep and
/// between attempts.
pub async fn poll_until<T, F, Fut>(
    max_attempts: u32,
    interval: Duration,
    cancel: &CancellationToken,
    mut check: F,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }
        if let Some(value) = check().await {
            return PollOutcome::Ready(value);
        }
        tracing::debug!(attempt, max_attempts, "poll condition not met yet");

        // No sleep after the final attempt
        if attempt + 1 < max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
            }
        }
    }
    PollOutcome::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn resolves_once_condition_is_met() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let outcome = poll_until(10, Duration::from_secs(1), &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n >= 2 { Some(n) } else { None } }
        })
        .await;
        assert_eq!(outcome, PollOutcome::Ready(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_attempt_budget() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let outcome: PollOutcome<()> = poll_until(4, Duration::from_secs(1), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { None }
        })
        .await;
        assert_eq!(outcome, PollOutcome::Exhausted);
        // Exactly the budget, never more
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome: PollOutcome<()> = poll_until(10, Duration::from_secs(1), &cancel, || async {
            panic!("must not poll after cancellation")
        })
        .await;
        assert_eq!(outcome, PollOutcome::Cancelled);
    }
}
