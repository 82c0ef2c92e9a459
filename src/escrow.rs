//! On-chain escrow gateway.
//!
//! [`EscrowGateway`] is the seam between the orchestrators and the
//! marketplace escrow contract. The EVM implementation wraps an Alloy
//! provider, serializes purchases per trade id, and maps contract reverts
//! into the crate's error taxonomy.

use crate::config::EscrowConfig;
use crate::error::EscrowError;
use crate::network::{ChainDescriptor, Network};
use crate::order::{EscrowPurchase, PurchaseState, UnixTimestamp};
use alloy::primitives::{Address, FixedBytes, TxHash, U256};
use alloy::providers::Provider;
use alloy::sol;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
    }
}

sol! {
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IMarketEscrow {
        function buyTrade(uint256 tradeId, uint256 quantity, address logisticsProvider) external;
        function buyTradeCrossChain(
            uint256 tradeId,
            uint256 quantity,
            address logisticsProvider,
            uint64 destinationChainSelector,
            bool payFeesInNative
        ) external payable;
        function confirmDelivery(bytes32 purchaseId) external;
        function raiseDispute(bytes32 purchaseId) external;
        function purchases(bytes32 purchaseId) external view returns (
            uint256 tradeId,
            address buyer,
            uint256 quantity,
            address logisticsProvider,
            uint256 amount,
            uint8 state
        );
        function getSupportedDestinationChains() external view returns (uint64[] memory);

        event PurchaseCreated(bytes32 indexed purchaseId, uint256 indexed tradeId, address indexed buyer);
        event CrossChainPurchaseSent(bytes32 indexed messageId, uint64 destinationChainSelector, bytes32 purchaseId);
    }
}

/// Cross-chain leg of a purchase. Present only when the buyer pays from a
/// chain other than the one hosting the trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossChainRoute {
    /// CCIP selector of the destination (escrow-hosting) chain.
    pub destination_selector: u64,
    /// Message fee to attach as transaction value.
    pub fee_value: U256,
    /// Pay CCIP fees in native coin rather than LINK.
    pub pay_fees_in_native: bool,
}

/// Everything needed to submit a purchase against the escrow contract.
#[derive(Debug, Clone)]
pub struct PurchaseParams {
    pub trade_id: U256,
    pub quantity: u64,
    pub logistics_provider: Address,
    /// `None` for a same-chain purchase.
    pub route: Option<CrossChainRoute>,
}

/// Handle for a submitted and confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: TxHash,
    pub submitted_at: UnixTimestamp,
}

impl TxHandle {
    fn now(hash: TxHash) -> Self {
        Self {
            hash,
            submitted_at: UnixTimestamp::now(),
        }
    }
}

/// Result of a confirmed purchase submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub tx: TxHandle,
    /// Escrow purchase id, decoded from the `PurchaseCreated` event.
    /// Absent on cross-chain sends, where the purchase materializes on the
    /// destination chain.
    pub purchase_id: Option<FixedBytes<32>>,
    /// CCIP message id, decoded from `CrossChainPurchaseSent`.
    pub message_id: Option<FixedBytes<32>>,
}

/// Contract-facing operations the orchestrators depend on.
#[async_trait]
pub trait EscrowGateway: Send + Sync {
    /// Deployment this gateway targets.
    fn deployment(&self) -> EscrowDeployment;

    /// ERC-20 allowance granted by `owner` to the escrow contract.
    async fn allowance(&self, owner: Address) -> Result<U256, EscrowError>;

    /// ERC-20 balance of `owner` for the payment token.
    async fn balance(&self, owner: Address) -> Result<U256, EscrowError>;

    /// Submit an ERC-20 approval for `amount` to the escrow contract.
    /// Returns once the transaction is confirmed.
    async fn approve(&self, amount: U256) -> Result<TxHandle, EscrowError>;

    /// Submit a purchase. Serialized per trade id so concurrent buyers on
    /// this instance cannot race quantity checks.
    async fn submit_purchase(&self, params: PurchaseParams) -> Result<PurchaseReceipt, EscrowError>;

    /// Buyer confirms delivery, releasing escrowed funds to the seller.
    async fn confirm_delivery(&self, purchase_id: FixedBytes<32>) -> Result<TxHandle, EscrowError>;

    /// Buyer raises a dispute, freezing the purchase pending arbitration.
    async fn raise_dispute(&self, purchase_id: FixedBytes<32>) -> Result<TxHandle, EscrowError>;

    /// Read a purchase record. `None` when the id is unknown on-chain.
    async fn purchase(&self, purchase_id: FixedBytes<32>) -> Result<Option<EscrowPurchase>, EscrowError>;

    /// Chains the escrow accepts cross-chain purchases between. Falls back
    /// to a static list when the chain read fails; never errors.
    async fn supported_destination_chains(&self) -> Vec<&'static ChainDescriptor>;
}

/// Deployment coordinates for one escrow instance.
#[derive(Debug, Clone, Copy)]
pub struct EscrowDeployment {
    pub network: Network,
    pub escrow: Address,
    pub token: Address,
}

/// [`EscrowGateway`] backed by an Alloy EVM provider.
pub struct EvmEscrowGateway<P> {
    provider: P,
    deployment: EscrowDeployment,
    config: Arc<EscrowConfig>,
    purchase_locks: Arc<DashMap<U256, Arc<Mutex<()>>>>,
}

impl<P: Provider + Clone + 'static> EvmEscrowGateway<P> {
    pub fn new(provider: P, deployment: EscrowDeployment, config: Arc<EscrowConfig>) -> Self {
        Self {
            provider,
            deployment,
            config,
            purchase_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn network(&self) -> Network {
        self.deployment.network
    }

    /// Get or create the submission lock for a trade id.
    fn purchase_lock(&self, trade_id: U256) -> Arc<Mutex<()>> {
        self.purchase_locks
            .entry(trade_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn receipt_timeout(&self) -> Duration {
        let network = self.deployment.network.to_string();
        self.config.transaction.receipt_timeout_for(&network)
    }

    fn confirmations(&self) -> u64 {
        let network = self.deployment.network.to_string();
        self.config.transaction.confirmations_for(&network)
    }

    async fn wait_confirmed(
        &self,
        pending: alloy::providers::PendingTransactionBuilder<alloy::network::Ethereum>,
    ) -> Result<alloy::rpc::types::TransactionReceipt, EscrowError> {
        let receipt = pending
            .with_required_confirmations(self.confirmations())
            .with_timeout(Some(self.receipt_timeout()))
            .get_receipt()
            .await
            .map_err(|e| EscrowError::from_revert(&format!("{e:?}")))?;

        if !receipt.status() {
            tracing::warn!(
                tx = %receipt.transaction_hash,
                network = %self.deployment.network,
                "transaction reverted on-chain"
            );
            return Err(EscrowError::UnknownFailure(format!(
                "transaction {} reverted",
                receipt.transaction_hash
            )));
        }
        Ok(receipt)
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> EscrowGateway for EvmEscrowGateway<P> {
    fn deployment(&self) -> EscrowDeployment {
        self.deployment
    }

    async fn allowance(&self, owner: Address) -> Result<U256, EscrowError> {
        let token = IERC20::new(self.deployment.token, self.provider.clone());
        token
            .allowance(owner, self.deployment.escrow)
            .call()
            .await
            .map_err(|e| EscrowError::AllowanceReadFailed(format!("{e:?}")))
    }

    async fn balance(&self, owner: Address) -> Result<U256, EscrowError> {
        let token = IERC20::new(self.deployment.token, self.provider.clone());
        token
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| EscrowError::AllowanceReadFailed(format!("{e:?}")))
    }

    async fn approve(&self, amount: U256) -> Result<TxHandle, EscrowError> {
        let token = IERC20::new(self.deployment.token, self.provider.clone());
        let pending = token
            .approve(self.deployment.escrow, amount)
            .send()
            .await
            .map_err(|e| EscrowError::from_revert(&format!("{e:?}")))?;

        let receipt = self.wait_confirmed(pending).await?;
        tracing::info!(
            tx = %receipt.transaction_hash,
            amount = %amount,
            network = %self.deployment.network,
            "token approval confirmed"
        );
        Ok(TxHandle::now(receipt.transaction_hash))
    }

    async fn submit_purchase(&self, params: PurchaseParams) -> Result<PurchaseReceipt, EscrowError> {
        let lock = self.purchase_lock(params.trade_id);
        let _guard = lock.lock().await;
        tracing::debug!(trade_id = %params.trade_id, "purchase lock acquired");

        let escrow = IMarketEscrow::new(self.deployment.escrow, self.provider.clone());
        let quantity = U256::from(params.quantity);

        let pending = match params.route {
            None => escrow
                .buyTrade(params.trade_id, quantity, params.logistics_provider)
                .send()
                .await
                .map_err(|e| EscrowError::from_revert(&format!("{e:?}")))?,
            Some(route) => escrow
                .buyTradeCrossChain(
                    params.trade_id,
                    quantity,
                    params.logistics_provider,
                    route.destination_selector,
                    route.pay_fees_in_native,
                )
                .value(route.fee_value)
                .send()
                .await
                .map_err(|e| EscrowError::from_revert(&format!("{e:?}")))?,
        };

        let receipt = self.wait_confirmed(pending).await?;

        let mut purchase_id = None;
        let mut message_id = None;
        for log in receipt.logs() {
            if let Ok(ev) = log.log_decode::<IMarketEscrow::PurchaseCreated>() {
                purchase_id = Some(ev.inner.data.purchaseId);
            } else if let Ok(ev) = log.log_decode::<IMarketEscrow::CrossChainPurchaseSent>() {
                message_id = Some(ev.inner.data.messageId);
            }
        }

        tracing::info!(
            tx = %receipt.transaction_hash,
            trade_id = %params.trade_id,
            cross_chain = params.route.is_some(),
            network = %self.deployment.network,
            "purchase confirmed"
        );

        Ok(PurchaseReceipt {
            tx: TxHandle::now(receipt.transaction_hash),
            purchase_id,
            message_id,
        })
    }

    async fn confirm_delivery(&self, purchase_id: FixedBytes<32>) -> Result<TxHandle, EscrowError> {
        let escrow = IMarketEscrow::new(self.deployment.escrow, self.provider.clone());
        let pending = escrow
            .confirmDelivery(purchase_id)
            .send()
            .await
            .map_err(|e| EscrowError::from_revert(&format!("{e:?}")))?;

        let receipt = self.wait_confirmed(pending).await?;
        tracing::info!(
            tx = %receipt.transaction_hash,
            purchase_id = %purchase_id,
            "delivery confirmed"
        );
        Ok(TxHandle::now(receipt.transaction_hash))
    }

    async fn raise_dispute(&self, purchase_id: FixedBytes<32>) -> Result<TxHandle, EscrowError> {
        let escrow = IMarketEscrow::new(self.deployment.escrow, self.provider.clone());
        let pending = escrow
            .raiseDispute(purchase_id)
            .send()
            .await
            .map_err(|e| EscrowError::from_revert(&format!("{e:?}")))?;

        let receipt = self.wait_confirmed(pending).await?;
        tracing::info!(
            tx = %receipt.transaction_hash,
            purchase_id = %purchase_id,
            "dispute raised"
        );
        Ok(TxHandle::now(receipt.transaction_hash))
    }

    async fn purchase(&self, purchase_id: FixedBytes<32>) -> Result<Option<EscrowPurchase>, EscrowError> {
        let escrow = IMarketEscrow::new(self.deployment.escrow, self.provider.clone());
        let record = escrow
            .purchases(purchase_id)
            .call()
            .await
            .map_err(|e| EscrowError::from_revert(&format!("{e:?}")))?;

        // The contract returns a zeroed struct for unknown ids.
        if record.buyer == Address::ZERO {
            return Ok(None);
        }

        Ok(Some(EscrowPurchase {
            purchase_id,
            trade_id: record.tradeId,
            buyer: record.buyer,
            quantity: record.quantity.try_into().unwrap_or(u64::MAX),
            logistics_provider: record.logisticsProvider,
            amount: record.amount,
            state: PurchaseState::from_u8(record.state),
        }))
    }

    async fn supported_destination_chains(&self) -> Vec<&'static ChainDescriptor> {
        let escrow = IMarketEscrow::new(self.deployment.escrow, self.provider.clone());
        let selectors = match escrow.getSupportedDestinationChains().call().await {
            Ok(selectors) if !selectors.is_empty() => selectors,
            Ok(_) => {
                tracing::warn!(
                    network = %self.deployment.network,
                    "escrow reports no destination chains, using static list"
                );
                return fallback_destinations(self.deployment.network);
            }
            Err(e) => {
                tracing::warn!(
                    network = %self.deployment.network,
                    error = %e,
                    "destination chain read failed, using static list"
                );
                return fallback_destinations(self.deployment.network);
            }
        };

        selectors
            .into_iter()
            .filter_map(|sel| match Network::from_ccip_selector(sel) {
                Some(network) => Some(network.descriptor()),
                None => {
                    tracing::debug!(selector = sel, "ignoring unknown destination selector");
                    None
                }
            })
            .collect()
    }
}

/// Static destination list used when the on-chain read is unavailable:
/// every supported chain with a routing selector, matching testnet-ness,
/// excluding the escrow's own chain.
pub fn fallback_destinations(home: Network) -> Vec<&'static ChainDescriptor> {
    Network::variants()
        .iter()
        .filter(|n| **n != home && n.is_testnet() == home.is_testnet())
        .filter(|n| n.ccip_selector().is_some())
        .map(|n| n.descriptor())
        .collect()
}
