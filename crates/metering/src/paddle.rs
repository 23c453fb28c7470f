//! Paddle billing backend adapter
//!
//! Plain JSON client over the Paddle Billing API; the SDK-less approach
//! keeps the adapter a single bounded round trip per page. The tenant
//! reference travels in the subscription's `custom_data.tenant_id`.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::backend::{BillingBackend, SubscriptionPage, SubscriptionRecord};
use crate::error::{MeteringError, MeteringResult};

const DEFAULT_BASE_URL: &str = "https://api.paddle.com";
const PAGE_SIZE: u32 = 100;

/// Paddle configuration loaded from environment
#[derive(Clone)]
pub struct PaddleConfig {
    pub api_key: String,
    pub base_url: String,
}

impl PaddleConfig {
    pub fn from_env() -> MeteringResult<Self> {
        let api_key = std::env::var("PADDLE_API_KEY")
            .map_err(|_| MeteringError::Config("PADDLE_API_KEY not set".to_string()))?;
        let base_url =
            std::env::var("PADDLE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self { api_key, base_url })
    }
}

#[derive(Debug, Deserialize)]
struct PaddleSubscription {
    id: String,
    status: String,
    #[serde(default)]
    custom_data: Option<serde_json::Value>,
    #[serde(default)]
    items: Vec<PaddleItem>,
}

#[derive(Debug, Deserialize)]
struct PaddleItem {
    price: Option<PaddlePrice>,
}

#[derive(Debug, Deserialize)]
struct PaddlePrice {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PaddleListResponse {
    data: Vec<PaddleSubscription>,
    meta: PaddleMeta,
}

#[derive(Debug, Deserialize)]
struct PaddleMeta {
    pagination: PaddlePagination,
}

#[derive(Debug, Deserialize)]
struct PaddlePagination {
    has_more: bool,
}

/// Paddle Billing API client
#[derive(Clone)]
pub struct PaddleBackend {
    http: reqwest::Client,
    config: PaddleConfig,
}

impl PaddleBackend {
    pub fn new(config: PaddleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> MeteringResult<Self> {
        Ok(Self::new(PaddleConfig::from_env()?))
    }
}

#[async_trait]
impl BillingBackend for PaddleBackend {
    fn name(&self) -> &'static str {
        "paddle"
    }

    async fn fetch_subscriptions(
        &self,
        cursor: Option<String>,
    ) -> MeteringResult<SubscriptionPage> {
        let url = format!("{}/subscriptions", self.config.base_url);
        let mut query: Vec<(&str, String)> = vec![("per_page", PAGE_SIZE.to_string())];
        if let Some(after) = cursor {
            query.push(("after", after));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .query(&query)
            .send()
            .await
            .map_err(|e| MeteringError::Backend {
                backend: "paddle".to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MeteringError::Backend {
                backend: "paddle".to_string(),
                message: format!("API error ({}): {}", status, body),
            });
        }

        let parsed: PaddleListResponse =
            response.json().await.map_err(|e| MeteringError::Backend {
                backend: "paddle".to_string(),
                message: format!("Failed to parse response: {}", e),
            })?;

        let next_cursor = if parsed.meta.pagination.has_more {
            parsed.data.last().map(|s| s.id.clone())
        } else {
            None
        };

        let records = parsed
            .data
            .into_iter()
            .map(|sub| {
                let tenant_id = sub
                    .custom_data
                    .as_ref()
                    .and_then(|d| d.get("tenant_id"))
                    .and_then(|v| v.as_str())
                    .and_then(|v| Uuid::parse_str(v).ok());
                let plan_ref = sub
                    .items
                    .first()
                    .and_then(|item| item.price.as_ref())
                    .map(|price| price.id.clone());

                SubscriptionRecord {
                    external_id: sub.id,
                    tenant_id,
                    status: sub.status,
                    plan_ref,
                }
            })
            .collect();

        Ok(SubscriptionPage {
            records,
            next_cursor,
        })
    }
}
