//! Configuration for the payment and escrow flows.
//!
//! Loaded from an optional TOML file (`escrow.toml` or the path in the
//! `ESCROW_CONFIG_FILE` env var). A missing file yields defaults; a malformed
//! file is an error. Every knob has a conservative default so the crate works
//! with zero configuration against mainnet deployments.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Complete escrow-flow configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EscrowConfig {
    pub payment: PaymentConfig,
    pub backend: BackendConfig,
    pub reconciler: ReconcilerConfig,
    pub transaction: TransactionConfig,
    pub fees: FeeConfig,
}

impl EscrowConfig {
    /// Load configuration from a TOML file.
    ///
    /// If the file doesn't exist, returns the default configuration.
    /// If the file exists but is malformed, returns an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()
    }

    /// Load configuration from the `ESCROW_CONFIG_FILE` env var or default path.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("ESCROW_CONFIG_FILE").unwrap_or_else(|_| "escrow.toml".to_string());
        Self::from_file(config_path)
    }
}

/// Knobs for the payment orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Maximum allowance-poll attempts after submitting an approval.
    pub approval_poll_attempts: u32,
    /// Interval between allowance polls, in milliseconds.
    pub approval_poll_interval_ms: u64,
    /// Settle delay after an automatic network switch, in milliseconds.
    /// Wallets report the new chain before their provider routes to it.
    pub network_settle_delay_ms: u64,
    /// Payment window shown to the buyer, in seconds.
    pub payment_window_secs: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            approval_poll_attempts: 20,
            approval_poll_interval_ms: 3_000,
            network_settle_delay_ms: 1_500,
            payment_window_secs: 600, // 10 minutes
        }
    }
}

impl PaymentConfig {
    pub fn approval_poll_interval(&self) -> Duration {
        Duration::from_millis(self.approval_poll_interval_ms)
    }

    pub fn network_settle_delay(&self) -> Duration {
        Duration::from_millis(self.network_settle_delay_ms)
    }

    pub fn payment_window(&self) -> Duration {
        Duration::from_secs(self.payment_window_secs)
    }
}

/// Backend order API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the order API.
    pub base_url: String,
    /// Optional bearer token sent on every request.
    pub bearer_token: Option<String>,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// Budget for the post-success status update, in milliseconds. A slow
    /// backend must not block the user-visible success past this.
    pub update_budget_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000/api".to_string(),
            bearer_token: None,
            request_timeout_secs: 15,
            update_budget_ms: 4_000,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn update_budget(&self) -> Duration {
        Duration::from_millis(self.update_budget_ms)
    }
}

/// Status-transition delays applied by the reconciler.
///
/// Models the real settlement latency difference between local finality and
/// cross-chain message delivery, so the UI can show an "updating" affordance
/// instead of flipping instantly.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Transition delay for same-chain orders, in milliseconds.
    pub local_delay_ms: u64,
    /// Transition delay for cross-chain orders, in milliseconds.
    pub cross_chain_delay_ms: u64,
    /// Delay before redirecting away from a just-confirmed action, in
    /// milliseconds. Gives the user time to see the confirmation.
    pub redirect_delay_ms: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            local_delay_ms: 2_000,
            cross_chain_delay_ms: 8_000,
            redirect_delay_ms: 1_500,
        }
    }
}

impl ReconcilerConfig {
    pub fn local_delay(&self) -> Duration {
        Duration::from_millis(self.local_delay_ms)
    }

    pub fn cross_chain_delay(&self) -> Duration {
        Duration::from_millis(self.cross_chain_delay_ms)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

/// Chain-specific overrides for transaction handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Receipt wait timeout for this chain, in seconds.
    pub receipt_timeout_secs: u64,
    /// Block confirmations to wait for before reporting success.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
}

fn default_confirmations() -> u64 {
    1
}

impl ChainConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

/// Transaction-related configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Default receipt wait timeout in seconds, used when a chain has no
    /// override in `chains`.
    pub default_receipt_timeout_secs: u64,
    /// Per-chain overrides, keyed by network name (e.g. "polygon", "bsc").
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_receipt_timeout_secs: 120,
            chains: HashMap::new(),
        }
    }
}

impl TransactionConfig {
    /// Effective receipt timeout for a network.
    pub fn receipt_timeout_for(&self, network: &str) -> Duration {
        self.chains
            .get(network)
            .map(|c| c.receipt_timeout())
            .unwrap_or(Duration::from_secs(self.default_receipt_timeout_secs))
    }

    /// Effective confirmation count for a network.
    pub fn confirmations_for(&self, network: &str) -> u64 {
        self.chains
            .get(network)
            .map(|c| c.confirmations)
            .unwrap_or(1)
    }
}

/// Cross-chain fee estimation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Static fallback fee in native wei, used when the on-chain estimate
    /// fails. Advisory only; never gates a payment.
    pub fallback_fee_wei: u128,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            // ~0.01 native units; deliberately above typical routing fees
            fallback_fee_wei: 10_000_000_000_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EscrowConfig::default();
        assert_eq!(config.payment.approval_poll_attempts, 20);
        assert_eq!(config.payment.payment_window(), Duration::from_secs(600));
        assert_eq!(config.reconciler.local_delay_ms, 2_000);
        assert!(config.reconciler.cross_chain_delay_ms > config.reconciler.local_delay_ms);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config_str = r#"
[payment]
approval_poll_attempts = 5
"#;
        let config: EscrowConfig = toml::from_str(config_str).unwrap();
        assert_eq!(config.payment.approval_poll_attempts, 5);
        // Untouched fields fall back to defaults
        assert_eq!(config.payment.approval_poll_interval_ms, 3_000);
        assert_eq!(config.backend.update_budget_ms, 4_000);
    }

    #[test]
    fn test_per_chain_receipt_timeout() {
        let config_str = r#"
[transaction]
default_receipt_timeout_secs = 90

[transaction.chains.bsc]
receipt_timeout_secs = 45
confirmations = 3
"#;
        let config: EscrowConfig = toml::from_str(config_str).unwrap();
        assert_eq!(
            config.transaction.receipt_timeout_for("bsc"),
            Duration::from_secs(45)
        );
        assert_eq!(config.transaction.confirmations_for("bsc"), 3);
        // Unconfigured chain falls back to the default
        assert_eq!(
            config.transaction.receipt_timeout_for("polygon"),
            Duration::from_secs(90)
        );
        assert_eq!(config.transaction.confirmations_for("polygon"), 1);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = EscrowConfig::from_file("definitely/not/here.toml").unwrap();
        assert_eq!(config.backend.request_timeout_secs, 15);
    }
}
