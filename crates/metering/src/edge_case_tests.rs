// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Metering Engine
//!
//! Tests critical boundary conditions in:
//! - Rate limiting (window edges, exact-budget admission)
//! - Credit tracking (budget boundary, zero-token calls)
//! - Entitlement resolution (limit-exact provider lists)
//! - Upgrade evaluation (rank ties, mixed feature tags)
//! - Reconciliation (empty tenant set, zero-record backends)

#[cfg(test)]
mod rate_limit_edges {
    use crate::rate_limit::{InMemoryRequestLog, RateLimiter};
    use stackforge_shared::PlanCatalog;
    use uuid::Uuid;

    // =========================================================================
    // Budget-exact admission: the Nth request on a budget of N must be the
    // last one admitted
    // =========================================================================
    #[tokio::test]
    async fn test_exact_budget_boundary() {
        let limiter = RateLimiter::new(PlanCatalog::builtin(), InMemoryRequestLog::new());
        let tenant = Uuid::new_v4();

        // Developer budget is 10 per sliding hour
        for i in 0..10 {
            let decision = limiter.admit(tenant, "developer").await.unwrap();
            assert!(decision.allowed, "request {} should be admitted", i);
            assert_eq!(decision.remaining, 9 - i);
        }

        let decision = limiter.admit(tenant, "developer").await.unwrap();
        assert!(!decision.allowed, "11th request must be denied");
        assert_eq!(decision.remaining, 0);
        assert!(decision.reason.unwrap().contains("developer"));
    }

    // =========================================================================
    // Tenants never share a window
    // =========================================================================
    #[tokio::test]
    async fn test_windows_are_per_tenant() {
        let limiter = RateLimiter::new(PlanCatalog::builtin(), InMemoryRequestLog::new());
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        for _ in 0..10 {
            limiter.admit(first, "developer").await.unwrap();
        }
        assert!(!limiter.admit(first, "developer").await.unwrap().allowed);
        assert!(limiter.admit(second, "developer").await.unwrap().allowed);
    }
}

#[cfg(test)]
mod credit_edges {
    use crate::credits::{CreditTracker, TokenPrices};
    use crate::testutil::InMemoryLedger;
    use stackforge_shared::{LedgerEntryKind, PlanCatalog};
    use uuid::Uuid;

    // =========================================================================
    // Landing exactly on the budget is still allowed; the check is strict
    // "greater than"
    // =========================================================================
    #[tokio::test]
    async fn test_exactly_at_budget_is_allowed() {
        let ledger = InMemoryLedger::new();
        let tracker = CreditTracker::with_prices(
            PlanCatalog::builtin(),
            ledger,
            TokenPrices::default(),
        );
        let tenant = Uuid::new_v4();

        // Developer budget is exactly 100k tokens
        let decision = tracker
            .record(tenant, "developer", 60_000, 40_000)
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.monthly_tokens, 100_000);

        // One more token tips it over
        let decision = tracker.record(tenant, "developer", 1, 0).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.suggested_plan.as_deref(), Some("startup"));
    }

    // =========================================================================
    // A zero-token call still writes a ledger entry with zero cost
    // =========================================================================
    #[tokio::test]
    async fn test_zero_token_call_is_recorded() {
        let ledger = InMemoryLedger::new();
        let tracker = CreditTracker::with_prices(
            PlanCatalog::builtin(),
            ledger.clone(),
            TokenPrices::default(),
        );
        let tenant = Uuid::new_v4();

        let decision = tracker.record(tenant, "team", 0, 0).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.cost, 0.0);

        let entries = ledger.entries_of_kind(LedgerEntryKind::AiUsage);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, 0.0);
    }
}

#[cfg(test)]
mod resolver_edges {
    use crate::resolver::{EntitlementResolver, RequestedFeatures};
    use stackforge_shared::{AutomationLevel, PlanCatalog, SecurityLevel};

    // =========================================================================
    // A provider list exactly at the limit is never clamped
    // =========================================================================
    #[test]
    fn test_limit_exact_provider_list_untouched() {
        let resolver = EntitlementResolver::new(PlanCatalog::builtin());
        let requested = RequestedFeatures {
            providers: vec!["aws".into(), "gcp".into(), "azure".into()],
            automation: AutomationLevel::Basic,
            security: SecurityLevel::Basic,
        };

        let resolved = resolver.resolve("startup", &requested).unwrap();
        assert!(!resolved.was_clamped());
        assert_eq!(resolved.allowed.providers.len(), 3);
    }

    // =========================================================================
    // Every clampable field exceeded at once produces one note per field
    // =========================================================================
    #[test]
    fn test_all_fields_clamped_yields_three_notes() {
        let resolver = EntitlementResolver::new(PlanCatalog::builtin());
        let requested = RequestedFeatures {
            providers: (0..5).map(|i| format!("provider-{}", i)).collect(),
            automation: AutomationLevel::Private,
            security: SecurityLevel::Enterprise,
        };

        let resolved = resolver.resolve("developer", &requested).unwrap();
        assert_eq!(resolved.clamp_notes.len(), 3);
        assert_eq!(resolved.allowed.providers, vec!["provider-0"]);
        assert_eq!(resolved.allowed.automation, AutomationLevel::Basic);
        assert_eq!(resolved.allowed.security, SecurityLevel::None);
    }

    // =========================================================================
    // Empty request resolves cleanly on every tier
    // =========================================================================
    #[test]
    fn test_empty_request_never_clamps() {
        let resolver = EntitlementResolver::new(PlanCatalog::builtin());
        for tier in ["developer", "startup", "team", "enterprise"] {
            let resolved = resolver
                .resolve(tier, &RequestedFeatures::default())
                .unwrap();
            assert!(!resolved.was_clamped(), "tier {} clamped an empty request", tier);
        }
    }
}

#[cfg(test)]
mod upgrade_edges {
    use crate::upgrade::{BuildReport, UpgradeEvaluator};
    use stackforge_shared::PlanCatalog;

    // =========================================================================
    // An enterprise-requiring feature on an enterprise tenant is never a
    // recommendation (rank must be strictly greater)
    // =========================================================================
    #[test]
    fn test_enterprise_tenant_never_recommended_enterprise() {
        let evaluator = UpgradeEvaluator::new(PlanCatalog::builtin());
        let report = BuildReport::from_serialized(50, "multi-cloud failover backup");

        let advice = evaluator.evaluate(&report, "enterprise").unwrap();
        assert!(!advice.needs_upgrade);
        assert!(advice.recommended_plan.is_none());
    }

    // =========================================================================
    // Mixed tags: the strongest requirement wins over provider overflow
    // =========================================================================
    #[test]
    fn test_strongest_requirement_wins() {
        let evaluator = UpgradeEvaluator::new(PlanCatalog::builtin());
        // Provider overflow on developer would suggest startup, but the
        // failover tag requires enterprise
        let report = BuildReport::from_serialized(2, "scheduled failover");

        let advice = evaluator.evaluate(&report, "developer").unwrap();
        assert!(advice.needs_upgrade);
        assert_eq!(advice.recommended_plan.as_deref(), Some("enterprise"));
    }

    // =========================================================================
    // Keyword scan is case-insensitive and substring-based
    // =========================================================================
    #[test]
    fn test_keyword_scan_is_case_insensitive() {
        let evaluator = UpgradeEvaluator::new(PlanCatalog::builtin());
        let report = BuildReport::from_serialized(1, r#"{"ha": "Multi-Cloud deployment"}"#);

        let advice = evaluator.evaluate(&report, "team").unwrap();
        assert!(advice.needs_upgrade);
        assert_eq!(advice.recommended_plan.as_deref(), Some("enterprise"));
    }
}

#[cfg(test)]
mod reconciler_edges {
    use std::sync::Arc;

    use crate::backend::BillingBackend;
    use crate::reconciler::BillingReconciler;
    use crate::testutil::{InMemoryLedger, InMemoryTenantStore, StaticBackend};
    use stackforge_shared::PlanCatalog;

    // =========================================================================
    // A pass over zero tenants and zero backend records completes with no
    // failures and no writes
    // =========================================================================
    #[tokio::test]
    async fn test_empty_world_pass_is_clean() {
        let tenants = InMemoryTenantStore::new();
        let ledger = InMemoryLedger::new();
        let backend: Arc<dyn BillingBackend> = Arc::new(StaticBackend {
            name: "stripe",
            records: vec![],
        });

        let reconciler = BillingReconciler::new(
            Arc::new(tenants),
            Arc::new(ledger.clone()),
            vec![backend],
            PlanCatalog::builtin(),
        );
        let report = reconciler.run().await;

        assert_eq!(report.tasks.len(), 3);
        assert_eq!(report.failed_tasks(), 0);
        assert_eq!(report.total_changes(), 0);
        assert!(ledger.all_entries().is_empty());
    }

    // =========================================================================
    // A pass with no backends configured still runs seat and usage tasks
    // =========================================================================
    #[tokio::test]
    async fn test_no_backends_still_bills_seats() {
        let tenants = InMemoryTenantStore::new();
        let ledger = InMemoryLedger::new();
        let tenant = crate::testutil::test_tenant("team", 10);
        let tenant_id = tenant.id;
        tenants.add_tenant(tenant);
        tenants.set_seat_occupancy(tenant_id, 12);

        let reconciler = BillingReconciler::new(
            Arc::new(tenants.clone()),
            Arc::new(ledger.clone()),
            vec![],
            PlanCatalog::builtin(),
        );
        let report = reconciler.run().await;

        assert_eq!(report.tasks.len(), 2);
        // 2 extra seats at the team seat price of $15
        assert!((tenants.pending_amount(tenant_id) - 30.0).abs() < f64::EPSILON);
    }
}
