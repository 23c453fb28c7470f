//! Stripe billing backend adapter
//!
//! Pages through Stripe subscriptions and adapts them to
//! [`SubscriptionRecord`]s. The tenant reference is the `tenant_id`
//! metadata key stamped onto every subscription at checkout.

use async_trait::async_trait;
use stripe::{
    Client, ListSubscriptions, Subscription, SubscriptionId,
    SubscriptionStatus as StripeSubStatus,
};
use uuid::Uuid;

use crate::backend::{BillingBackend, SubscriptionPage, SubscriptionRecord};
use crate::error::{MeteringError, MeteringResult};

const PAGE_SIZE: u64 = 100;

/// Stripe configuration loaded from environment
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
}

impl StripeConfig {
    pub fn from_env() -> MeteringResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| MeteringError::Config("STRIPE_SECRET_KEY not set".to_string()))?;
        Ok(Self { secret_key })
    }
}

/// Thin wrapper around the Stripe API client
#[derive(Clone)]
pub struct StripeBackend {
    client: Client,
}

impl StripeBackend {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(config.secret_key),
        }
    }

    pub fn from_env() -> MeteringResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }
}

#[async_trait]
impl BillingBackend for StripeBackend {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn fetch_subscriptions(
        &self,
        cursor: Option<String>,
    ) -> MeteringResult<SubscriptionPage> {
        let mut params = ListSubscriptions {
            limit: Some(PAGE_SIZE),
            ..Default::default()
        };
        if let Some(cursor) = cursor {
            let id = cursor
                .parse::<SubscriptionId>()
                .map_err(|e| MeteringError::StripeApi(format!("Invalid cursor: {}", e)))?;
            params.starting_after = Some(id);
        }

        let page = Subscription::list(&self.client, &params).await?;

        let next_cursor = if page.has_more {
            page.data.last().map(|s| s.id.to_string())
        } else {
            None
        };

        let records = page
            .data
            .into_iter()
            .map(|sub| {
                let tenant_id = sub
                    .metadata
                    .get("tenant_id")
                    .and_then(|v| Uuid::parse_str(v).ok());
                let plan_ref = sub
                    .items
                    .data
                    .first()
                    .and_then(|item| item.price.as_ref())
                    .map(|price| price.id.to_string());

                let status = match sub.status {
                    StripeSubStatus::Active => "active",
                    StripeSubStatus::PastDue => "past_due",
                    StripeSubStatus::Canceled => "canceled",
                    StripeSubStatus::Unpaid => "unpaid",
                    StripeSubStatus::Trialing => "trialing",
                    StripeSubStatus::Incomplete => "incomplete",
                    StripeSubStatus::IncompleteExpired => "incomplete_expired",
                    StripeSubStatus::Paused => "paused",
                };

                SubscriptionRecord {
                    external_id: sub.id.to_string(),
                    tenant_id,
                    status: status.to_string(),
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
