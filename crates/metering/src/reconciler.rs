//! Billing reconciliation
//!
//! A scheduled orchestrator that converges internal tenant billing state
//! with external subscription backends and books overage charges. Each
//! pass runs four independent tasks: one subscription sync per configured
//! backend, seat-overage billing, and usage-based billing sync. Tasks are
//! isolated so a failure in one never blocks the others; the next
//! scheduled pass is the retry mechanism.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{error, info, warn};

use stackforge_shared::{LedgerEntryKind, PlanCatalog, PlanTier};

use crate::backend::BillingBackend;
use crate::error::MeteringResult;
use crate::ledger::{LedgerStore, NewLedgerEntry};
use crate::tenant::TenantStore;

/// Upper bound on pages fetched from one backend per pass
const MAX_SYNC_PAGES: usize = 100;

/// Outcome of one reconciliation task
#[derive(Debug)]
pub enum TaskOutcome {
    /// Task ran to completion; `changes` counts writes it performed
    Completed { changes: usize },
    Failed { error: String },
}

/// Per-task outcomes for one reconciliation pass
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub tasks: Vec<(String, TaskOutcome)>,
}

impl ReconcileReport {
    pub fn failed_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|(_, outcome)| matches!(outcome, TaskOutcome::Failed { .. }))
            .count()
    }

    pub fn total_changes(&self) -> usize {
        self.tasks
            .iter()
            .map(|(_, outcome)| match outcome {
                TaskOutcome::Completed { changes } => *changes,
                TaskOutcome::Failed { .. } => 0,
            })
            .sum()
    }
}

/// Billing period key for deduplicating per-period charges
pub(crate) fn period_key(now: OffsetDateTime) -> String {
    format!("{:04}-{:02}", now.year(), u8::from(now.month()))
}

pub struct BillingReconciler {
    tenants: Arc<dyn TenantStore>,
    ledger: Arc<dyn LedgerStore>,
    backends: Vec<Arc<dyn BillingBackend>>,
    catalog: PlanCatalog,
}

impl BillingReconciler {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        ledger: Arc<dyn LedgerStore>,
        backends: Vec<Arc<dyn BillingBackend>>,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            tenants,
            ledger,
            backends,
            catalog,
        }
    }

    /// Run one reconciliation pass. Every task is attempted; a task
    /// failure is recorded in the report, never propagated.
    pub async fn run(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for backend in &self.backends {
            let task = format!("subscription-sync:{}", backend.name());
            let outcome = match self.sync_backend(backend.as_ref()).await {
                Ok(changes) => {
                    info!(task = %task, changes, "Reconciliation task completed");
                    TaskOutcome::Completed { changes }
                }
                Err(e) => {
                    error!(task = %task, error = %e, "Reconciliation task failed");
                    TaskOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.tasks.push((task, outcome));
        }

        let outcome = match self.bill_seat_overage().await {
            Ok(changes) => {
                info!(task = "seat-overage", changes, "Reconciliation task completed");
                TaskOutcome::Completed { changes }
            }
            Err(e) => {
                error!(task = "seat-overage", error = %e, "Reconciliation task failed");
                TaskOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        report.tasks.push(("seat-overage".to_string(), outcome));

        let outcome = match self.sync_usage_billing().await {
            Ok(changes) => {
                info!(task = "usage-sync", changes, "Reconciliation task completed");
                TaskOutcome::Completed { changes }
            }
            Err(e) => {
                error!(task = "usage-sync", error = %e, "Reconciliation task failed");
                TaskOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        report.tasks.push(("usage-sync".to_string(), outcome));

        report
    }

    /// Task A: page through one backend's subscriptions and upsert
    /// tenant billing metadata. Upserts are keyed by (tenant, backend),
    /// so replaying the same pages converges instead of duplicating.
    async fn sync_backend(&self, backend: &dyn BillingBackend) -> MeteringResult<usize> {
        let mut changes = 0;
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_SYNC_PAGES {
            let page = backend.fetch_subscriptions(cursor.clone()).await?;

            for record in &page.records {
                let Some(tenant_id) = record.tenant_id else {
                    warn!(
                        backend = backend.name(),
                        external_id = %record.external_id,
                        "Subscription carries no tenant reference, skipping"
                    );
                    continue;
                };

                let changed = self
                    .tenants
                    .upsert_billing_meta(
                        tenant_id,
                        backend.name(),
                        &record.external_id,
                        &record.status,
                        record.plan_ref.as_deref(),
                    )
                    .await?;

                if changed {
                    self.ledger
                        .append(
                            NewLedgerEntry::new(tenant_id, LedgerEntryKind::SubscriptionStatus, 0.0)
                                .details(serde_json::json!({
                                    "backend": backend.name(),
                                    "external_id": record.external_id,
                                    "status": record.status,
                                    "plan_ref": record.plan_ref,
                                })),
                        )
                        .await?;
                    changes += 1;
                }
            }

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        Ok(changes)
    }

    /// Task B: book seat overage for tenants whose occupancy exceeds the
    /// seats their plan includes. One charge per tenant per billing month,
    /// deduplicated by period key.
    async fn bill_seat_overage(&self) -> MeteringResult<usize> {
        let period = period_key(OffsetDateTime::now_utc());
        let mut changes = 0;

        for tenant in self.tenants.list_billable().await? {
            let Some(tier) = tenant.tier_parsed() else {
                warn!(tenant_id = %tenant.id, tier = %tenant.tier, "Unknown tier, skipping seat billing");
                continue;
            };
            // Enterprise seats are invoiced manually out of band
            if tier == PlanTier::Enterprise {
                continue;
            }
            let Some(plan) = self.catalog.get_tier(tier) else {
                continue;
            };

            let occupied = self.tenants.seat_occupancy(tenant.id).await?;
            let included = i64::from(plan.included_seats);
            let extra = (occupied - included).max(0);
            if extra == 0 {
                continue;
            }

            if self.ledger.has_seat_entry(tenant.id, &period).await? {
                continue;
            }

            let amount = extra as f64 * plan.seat_price;
            self.ledger
                .append(
                    NewLedgerEntry::new(tenant.id, LedgerEntryKind::ExtraSeat, amount).details(
                        serde_json::json!({
                            "occupied_seats": occupied,
                            "included_seats": included,
                            "extra_seats": extra,
                            "seat_price": plan.seat_price,
                            "period_key": period,
                        }),
                    ),
                )
                .await?;
            self.tenants.add_pending_seat_amount(tenant.id, amount).await?;

            info!(
                tenant_id = %tenant.id,
                extra_seats = extra,
                amount,
                "Booked seat overage"
            );
            changes += 1;
        }

        Ok(changes)
    }

    /// Task C: compare month-to-date request usage against the plan's
    /// included allotment and record the overage amount. An entry is only
    /// appended when the amount differs from the last one recorded for
    /// this period, so repeated passes with unchanged usage are no-ops.
    async fn sync_usage_billing(&self) -> MeteringResult<usize> {
        let period = period_key(OffsetDateTime::now_utc());
        let mut changes = 0;

        for tenant in self.tenants.list_billable().await? {
            let Some(plan) = tenant.tier_parsed().and_then(|t| self.catalog.get_tier(t)) else {
                warn!(tenant_id = %tenant.id, tier = %tenant.tier, "Unknown tier, skipping usage sync");
                continue;
            };
            let Some(allotment) = plan.monthly_request_allotment else {
                continue;
            };

            let used = self.tenants.monthly_request_usage(tenant.id).await?;
            let over = (used - allotment as i64).max(0);
            let amount = over as f64 * plan.api_call_overage_price;

            let previous = self
                .ledger
                .latest_usage_sync_amount(tenant.id, &period)
                .await?;
            let unchanged = match previous {
                Some(prev) => (prev - amount).abs() < f64::EPSILON,
                None => amount == 0.0,
            };
            if unchanged {
                continue;
            }

            self.ledger
                .append(
                    NewLedgerEntry::new(tenant.id, LedgerEntryKind::UsageSync, amount).details(
                        serde_json::json!({
                            "requests_used": used,
                            "requests_included": allotment,
                            "requests_over": over,
                            "unit_price": plan.api_call_overage_price,
                            "period_key": period,
                        }),
                    ),
                )
                .await?;

            info!(tenant_id = %tenant.id, used, over, amount, "Recorded usage sync");
            changes += 1;
        }

        Ok(changes)
    }
}
