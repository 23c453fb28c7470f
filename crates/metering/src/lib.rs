// Metering crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! StackForge Entitlement & Usage-Metering Engine
//!
//! Resolves what a tenant may request, throttles and meters AI usage
//! against per-tier budgets, evaluates generated builds after the fact,
//! and reconciles internal billing state against external subscription
//! backends.
//!
//! ## Features
//!
//! - **Entitlement Resolution**: Clamp requested features to the tier's capability matrix
//! - **Rate Limiting**: Sliding-hour request window per tenant, fail-closed
//! - **Credit Tracking**: Token-cost metering against monthly budgets, fail-open
//! - **Upgrade Evaluation**: Post-build tier recommendations from feature usage
//! - **Billing Reconciliation**: Subscription sync (Stripe + Paddle), seat overage, usage sync

pub mod backend;
pub mod credits;
pub mod error;
pub mod ledger;
pub mod paddle;
pub mod rate_limit;
pub mod reconciler;
pub mod resolver;
pub mod stripe_backend;
pub mod tenant;
pub mod upgrade;

#[cfg(test)]
mod edge_case_tests;
#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;

use sqlx::PgPool;
use tracing::warn;

use stackforge_shared::PlanCatalog;

// Backends
pub use backend::{BillingBackend, SubscriptionPage, SubscriptionRecord};
pub use paddle::{PaddleBackend, PaddleConfig};
pub use stripe_backend::{StripeBackend, StripeConfig};

// Credits
pub use credits::{CreditTracker, TokenPrices, UsageDecision};

// Errors
pub use error::{MeteringError, MeteringResult};

// Ledger
pub use ledger::{LedgerStore, NewLedgerEntry, PgLedgerStore};

// Rate limiting
pub use rate_limit::{AdmitDecision, InMemoryRequestLog, PgRequestLog, RateLimiter, RequestLog};

// Reconciliation
pub use reconciler::{BillingReconciler, ReconcileReport, TaskOutcome};

// Resolution
pub use resolver::{ClampNote, EntitlementResolver, RequestedFeatures, ResolvedEntitlement};

// Tenants
pub use tenant::{PgTenantStore, TenantStore};

// Upgrade evaluation
pub use upgrade::{BuildReport, FeatureTag, UpgradeAdvice, UpgradeEvaluator};

/// The engine's components wired to Postgres-backed stores
///
/// One instance per process; every component is cheap to call and safe
/// to share across request handlers and the scheduler.
pub struct MeteringService {
    pub resolver: EntitlementResolver,
    pub rate_limiter: RateLimiter<PgRequestLog>,
    pub credits: CreditTracker<PgLedgerStore>,
    pub evaluator: UpgradeEvaluator,
    pub reconciler: BillingReconciler,
}

impl MeteringService {
    /// Wire every component against `pool`, reading backend credentials
    /// and token prices from the environment
    ///
    /// A billing backend whose credentials are absent is left out of the
    /// reconciler with a warning rather than failing startup; the engine
    /// still meters and rate-limits without it.
    pub fn from_env(pool: PgPool) -> Self {
        let catalog = PlanCatalog::builtin();

        let mut backends: Vec<Arc<dyn BillingBackend>> = Vec::new();
        match StripeBackend::from_env() {
            Ok(backend) => backends.push(Arc::new(backend)),
            Err(e) => warn!(error = %e, "Stripe backend not configured, skipping"),
        }
        match PaddleBackend::from_env() {
            Ok(backend) => backends.push(Arc::new(backend)),
            Err(e) => warn!(error = %e, "Paddle backend not configured, skipping"),
        }

        Self::new(
            pool,
            catalog,
            backends,
            TokenPrices::from_env(),
        )
    }

    pub fn new(
        pool: PgPool,
        catalog: PlanCatalog,
        backends: Vec<Arc<dyn BillingBackend>>,
        prices: TokenPrices,
    ) -> Self {
        let ledger = PgLedgerStore::new(pool.clone());
        let tenants = PgTenantStore::new(pool.clone());

        Self {
            resolver: EntitlementResolver::new(catalog.clone()),
            rate_limiter: RateLimiter::new(catalog.clone(), PgRequestLog::new(pool)),
            credits: CreditTracker::with_prices(catalog.clone(), ledger.clone(), prices),
            evaluator: UpgradeEvaluator::new(catalog.clone()),
            reconciler: BillingReconciler::new(
                Arc::new(tenants),
                Arc::new(ledger),
                backends,
                catalog,
            ),
        }
    }
}
