//! Billing-backend seam
//!
//! The reconciler pulls subscription truth from external billing backends
//! through this trait; two adapters exist (Stripe and Paddle). Timeouts
//! and retries are the backend client's concern, each call is one bounded
//! round trip.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::MeteringResult;

/// One subscription as reported by an external backend
#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    pub external_id: String,
    /// Tenant reference embedded in the backend's metadata; None when the
    /// backend record carries no resolvable tenant id
    pub tenant_id: Option<Uuid>,
    pub status: String,
    pub plan_ref: Option<String>,
}

/// One page of subscription records
#[derive(Debug, Clone, Default)]
pub struct SubscriptionPage {
    pub records: Vec<SubscriptionRecord>,
    pub next_cursor: Option<String>,
}

/// External subscription-billing backend
#[async_trait]
pub trait BillingBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch one page of subscriptions, starting after `cursor`
    async fn fetch_subscriptions(
        &self,
        cursor: Option<String>,
    ) -> MeteringResult<SubscriptionPage>;
}
