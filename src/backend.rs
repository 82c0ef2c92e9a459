//! Marketplace backend client.
//!
//! Thin REST client for the order service. Every failure maps to
//! [`EscrowError::BackendUpdateFailed`], the one non-fatal kind in the
//! taxonomy: orchestrators treat the chain as the source of truth and a
//! backend divergence as repairable, never as a payment failure.

use crate::config::BackendConfig;
use crate::error::EscrowError;
use crate::order::{Order, OrderStatus};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Order mutations the orchestrators perform against the backend.
#[async_trait]
pub trait OrderBackend: Send + Sync {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, EscrowError>;
    async fn order(&self, order_id: &str) -> Result<Order, EscrowError>;
    async fn update_status(&self, order_id: &str, status: OrderStatus)
        -> Result<Order, EscrowError>;
    async fn update_details(
        &self,
        order_id: &str,
        details: &OrderDetailsUpdate,
    ) -> Result<Order, EscrowError>;
    async fn dispute(&self, order_id: &str, reason: &str) -> Result<Order, EscrowError>;
}

/// Which side of an order a wallet address is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderRole {
    Buyer,
    Seller,
}

impl std::fmt::Display for OrderRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderRole::Buyer => write!(f, "buyer"),
            OrderRole::Seller => write!(f, "seller"),
        }
    }
}

/// Payload for creating an order before payment starts.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub buyer: Address,
    pub seller: Address,
    pub product: String,
    pub quantity: u64,
    pub unit_amount: U256,
    pub logistics_provider: Address,
    pub trade_id: U256,
}

/// Post-payment enrichment of an order record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderDetailsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_chain_id: Option<u64>,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: OrderStatus,
}

#[derive(Debug, Serialize)]
struct DisputeBody<'a> {
    reason: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderEnvelope {
    order: Order,
}

#[derive(Debug, Deserialize)]
struct OrderListEnvelope {
    orders: Vec<Order>,
}

/// REST client for the marketplace order service.
#[derive(Debug, Clone)]
pub struct OrderApi {
    client: reqwest::Client,
    base_url: Url,
    bearer_token: Option<String>,
    update_budget: Duration,
}

impl OrderApi {
    pub fn new(config: &BackendConfig) -> Result<Self, EscrowError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| EscrowError::BackendUpdateFailed(format!("invalid base url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| EscrowError::BackendUpdateFailed(format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url,
            bearer_token: config.bearer_token.clone(),
            update_budget: config.update_budget(),
        })
    }

    /// Wall-clock budget an orchestrator should spend on one backend
    /// update before declaring divergence.
    pub fn update_budget(&self) -> Duration {
        self.update_budget
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, EscrowError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EscrowError::BackendUpdateFailed("base url cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn read_order(&self, response: reqwest::Response) -> Result<Order, EscrowError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EscrowError::BackendUpdateFailed(format!(
                "backend returned {status}: {body}"
            )));
        }
        let envelope: OrderEnvelope = response
            .json()
            .await
            .map_err(|e| EscrowError::BackendUpdateFailed(format!("decode failed: {e}")))?;
        Ok(envelope.order)
    }

    pub async fn create_order(&self, order: &NewOrder) -> Result<Order, EscrowError> {
        let url = self.endpoint(&["orders"])?;
        let response = self
            .authorize(self.client.post(url).json(order))
            .send()
            .await
            .map_err(|e| EscrowError::BackendUpdateFailed(format!("create failed: {e}")))?;
        let created = self.read_order(response).await?;
        tracing::info!(order_id = %created.id, trade_id = %created.trade_id, "order created");
        Ok(created)
    }

    pub async fn order(&self, order_id: &str) -> Result<Order, EscrowError> {
        let url = self.endpoint(&["orders", order_id])?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| EscrowError::BackendUpdateFailed(format!("fetch failed: {e}")))?;
        self.read_order(response).await
    }

    pub async fn orders_by_role(
        &self,
        address: Address,
        role: OrderRole,
    ) -> Result<Vec<Order>, EscrowError> {
        let mut url = self.endpoint(&["orders"])?;
        url.query_pairs_mut()
            .append_pair(&role.to_string(), &address.to_string());
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| EscrowError::BackendUpdateFailed(format!("list failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EscrowError::BackendUpdateFailed(format!(
                "backend returned {status}"
            )));
        }
        let envelope: OrderListEnvelope = response
            .json()
            .await
            .map_err(|e| EscrowError::BackendUpdateFailed(format!("decode failed: {e}")))?;
        Ok(envelope.orders)
    }

    pub async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<Order, EscrowError> {
        let url = self.endpoint(&["orders", order_id, "status"])?;
        let response = self
            .authorize(self.client.put(url).json(&StatusBody { status }))
            .send()
            .await
            .map_err(|e| EscrowError::BackendUpdateFailed(format!("status update failed: {e}")))?;
        let updated = self.read_order(response).await?;
        tracing::info!(order_id, status = ?status, "order status updated");
        Ok(updated)
    }

    pub async fn update_details(
        &self,
        order_id: &str,
        details: &OrderDetailsUpdate,
    ) -> Result<Order, EscrowError> {
        let url = self.endpoint(&["orders", order_id, "details"])?;
        let response = self
            .authorize(self.client.put(url).json(details))
            .send()
            .await
            .map_err(|e| EscrowError::BackendUpdateFailed(format!("details update failed: {e}")))?;
        self.read_order(response).await
    }

    pub async fn dispute(&self, order_id: &str, reason: &str) -> Result<Order, EscrowError> {
        let url = self.endpoint(&["orders", order_id, "dispute"])?;
        let response = self
            .authorize(self.client.post(url).json(&DisputeBody { reason }))
            .send()
            .await
            .map_err(|e| EscrowError::BackendUpdateFailed(format!("dispute failed: {e}")))?;
        let updated = self.read_order(response).await?;
        tracing::info!(order_id, "order marked disputed");
        Ok(updated)
    }
}

#[async_trait]
impl OrderBackend for OrderApi {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, EscrowError> {
        OrderApi::create_order(self, order).await
    }

    async fn order(&self, order_id: &str) -> Result<Order, EscrowError> {
        OrderApi::order(self, order_id).await
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<Order, EscrowError> {
        OrderApi::update_status(self, order_id, status).await
    }

    async fn update_details(
        &self,
        order_id: &str,
        details: &OrderDetailsUpdate,
    ) -> Result<Order, EscrowError> {
        OrderApi::update_details(self, order_id, details).await
    }

    async fn dispute(&self, order_id: &str, reason: &str) -> Result<Order, EscrowError> {
        OrderApi::dispute(self, order_id, reason).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    fn api() -> OrderApi {
        let config = BackendConfig {
            base_url: "https://market.example/api/v1".to_string(),
            ..Default::default()
        };
        OrderApi::new(&config).unwrap()
    }

    #[test]
    fn endpoint_joins_segments() {
        let api = api();
        let url = api.endpoint(&["orders", "ord-1", "status"]).unwrap();
        assert_eq!(url.as_str(), "https://market.example/api/v1/orders/ord-1/status");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let config = BackendConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            OrderApi::new(&config),
            Err(EscrowError::BackendUpdateFailed(_))
        ));
    }

    #[test]
    fn order_envelope_decodes() {
        let json = r#"{
            "order": {
                "id": "ord-9",
                "buyer": "0x0000000000000000000000000000000000000001",
                "seller": "0x0000000000000000000000000000000000000002",
                "product": "widget",
                "quantity": 2,
                "unit_amount": "1000000",
                "logistics_provider": "0x0000000000000000000000000000000000000003",
                "status": "pending",
                "trade_id": "7",
                "created_at": 1700000000,
                "updated_at": 1700000000
            }
        }"#;
        let envelope: OrderEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.order.id, "ord-9");
        assert_eq!(envelope.order.status, OrderStatus::Pending);
    }
}
