//! Wallet seam and durable current-order-id storage.
//!
//! [`WalletSession`] abstracts the wallet-provider plumbing this crate treats
//! as an external collaborator: connection state, current chain, network
//! switching, transaction signing context.
//!
//! [`OrderStore`] keeps the single "current order id" so a payment flow
//! interrupted by a redirect or page reload can be reconciled on the next
//! load. Single-writer-per-flow: only the orchestrator that started a flow
//! writes or clears it; page-load reconciliation only reads.

use crate::error::EscrowError;
use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;

/// Wallet connection and network state, as seen by the orchestrators.
#[async_trait]
pub trait WalletSession: Send + Sync {
    /// Connected account, if any.
    fn address(&self) -> Option<Address>;

    fn is_connected(&self) -> bool {
        self.address().is_some()
    }

    /// Chain id the wallet is currently on.
    async fn chain_id(&self) -> Result<u64, EscrowError>;

    /// Ask the wallet to switch to `chain_id`. Errors map to
    /// [`EscrowError::NetworkSwitchFailed`].
    async fn switch_network(&self, chain_id: u64) -> Result<(), EscrowError>;
}

/// Durable storage for the current in-flight order id.
pub trait OrderStore: Send + Sync {
    fn store(&self, order_id: &str);
    fn get(&self) -> Option<String>;
    fn clear(&self);
}

/// In-memory store for tests and short-lived embedders.
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    current: RwLock<Option<String>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for MemoryOrderStore {
    fn store(&self, order_id: &str) {
        *self.current.write().expect("order store lock poisoned") = Some(order_id.to_string());
    }

    fn get(&self) -> Option<String> {
        self.current.read().expect("order store lock poisoned").clone()
    }

    fn clear(&self) {
        *self.current.write().expect("order store lock poisoned") = None;
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredOrder {
    order_id: String,
}

/// File-backed store surviving process restarts.
///
/// Storage is best-effort: I/O failures are logged and the flow continues —
/// losing resumability is preferable to failing a payment.
#[derive(Debug)]
pub struct FileOrderStore {
    path: PathBuf,
}

impl FileOrderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OrderStore for FileOrderStore {
    fn store(&self, order_id: &str) {
        let record = StoredOrder {
            order_id: order_id.to_string(),
        };
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&self.path, bytes) {
                    tracing::warn!(path = ?self.path, error = %e, "failed to persist current order id");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize current order id"),
        }
    }

    fn get(&self) -> Option<String> {
        let bytes = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice::<StoredOrder>(&bytes) {
            Ok(record) => Some(record.order_id),
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "stale or corrupt order-id file ignored");
                None
            }
        }
    }

    fn clear(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = ?self.path, error = %e, "failed to clear current order id");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryOrderStore::new();
        assert_eq!(store.get(), None);
        store.store("ord-42");
        assert_eq!(store.get(), Some("ord-42".to_string()));
        store.clear();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("current-order.json");

        let store = FileOrderStore::new(&path);
        store.store("ord-7");
        drop(store);

        let reopened = FileOrderStore::new(&path);
        assert_eq!(reopened.get(), Some("ord-7".to_string()));
        reopened.clear();
        assert_eq!(reopened.get(), None);
        // Clearing an already-cleared store is a no-op
        reopened.clear();
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("current-order.json");
        std::fs::write(&path, b"not json at all").unwrap();

        let store = FileOrderStore::new(&path);
        assert_eq!(store.get(), None);
    }
}
