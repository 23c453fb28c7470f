//! In-memory fakes shared by unit tests across the crate

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use stackforge_shared::{LedgerEntry, LedgerEntryKind, Tenant};

use crate::backend::{BillingBackend, SubscriptionPage, SubscriptionRecord};
use crate::error::{MeteringError, MeteringResult};
use crate::ledger::{LedgerStore, NewLedgerEntry};
use crate::tenant::TenantStore;

// =============================================================================
// Ledger fakes
// =============================================================================

/// Ledger store backed by a shared vector, cloneable so a test can keep a
/// handle to inspect entries after handing the store to a component.
#[derive(Clone, Default)]
pub(crate) struct InMemoryLedger {
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
}

impl InMemoryLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn entries_of_kind(&self, kind: LedgerEntryKind) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub(crate) fn all_entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Append an entry with an explicit creation timestamp
    pub(crate) fn append_dated(&self, entry: NewLedgerEntry, created_at: OffsetDateTime) {
        self.entries.lock().unwrap().push(LedgerEntry {
            id: Uuid::new_v4(),
            tenant_id: entry.tenant_id,
            kind: entry.kind,
            amount: entry.amount,
            details: entry.details,
            created_at,
        });
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn append(&self, entry: NewLedgerEntry) -> MeteringResult<()> {
        self.entries.lock().unwrap().push(LedgerEntry {
            id: Uuid::new_v4(),
            tenant_id: entry.tenant_id,
            kind: entry.kind,
            amount: entry.amount,
            details: entry.details,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    async fn monthly_token_total(
        &self,
        tenant_id: Uuid,
        since: OffsetDateTime,
    ) -> MeteringResult<u64> {
        let total = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.tenant_id == tenant_id
                    && e.kind == LedgerEntryKind::AiUsage
                    && e.created_at >= since
            })
            .map(|e| {
                let input = e.details.get("input_tokens").and_then(|v| v.as_u64());
                let output = e.details.get("output_tokens").and_then(|v| v.as_u64());
                input.unwrap_or(0) + output.unwrap_or(0)
            })
            .sum();
        Ok(total)
    }

    async fn has_seat_entry(&self, tenant_id: Uuid, period_key: &str) -> MeteringResult<bool> {
        let exists = self.entries.lock().unwrap().iter().any(|e| {
            e.tenant_id == tenant_id
                && e.kind == LedgerEntryKind::ExtraSeat
                && e.details.get("period_key").and_then(|v| v.as_str()) == Some(period_key)
        });
        Ok(exists)
    }

    async fn latest_usage_sync_amount(
        &self,
        tenant_id: Uuid,
        period_key: &str,
    ) -> MeteringResult<Option<f64>> {
        let amount = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| {
                e.tenant_id == tenant_id
                    && e.kind == LedgerEntryKind::UsageSync
                    && e.details.get("period_key").and_then(|v| v.as_str()) == Some(period_key)
            })
            .map(|e| e.amount);
        Ok(amount)
    }

    async fn entries_for_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
    ) -> MeteringResult<Vec<LedgerEntry>> {
        let entries = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|e| e.tenant_id == tenant_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(entries)
    }
}

/// Ledger store whose aggregation queries fail while appends succeed,
/// for exercising the fail-open path of usage metering.
#[derive(Clone, Default)]
pub(crate) struct FailingLedger {
    inner: InMemoryLedger,
}

impl FailingLedger {
    pub(crate) fn aggregation_only() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for FailingLedger {
    async fn append(&self, entry: NewLedgerEntry) -> MeteringResult<()> {
        self.inner.append(entry).await
    }

    async fn monthly_token_total(
        &self,
        _tenant_id: Uuid,
        _since: OffsetDateTime,
    ) -> MeteringResult<u64> {
        Err(MeteringError::Store("aggregation unavailable".to_string()))
    }

    async fn has_seat_entry(&self, _tenant_id: Uuid, _period_key: &str) -> MeteringResult<bool> {
        Err(MeteringError::Store("aggregation unavailable".to_string()))
    }

    async fn latest_usage_sync_amount(
        &self,
        _tenant_id: Uuid,
        _period_key: &str,
    ) -> MeteringResult<Option<f64>> {
        Err(MeteringError::Store("aggregation unavailable".to_string()))
    }

    async fn entries_for_tenant(
        &self,
        _tenant_id: Uuid,
        _limit: i64,
    ) -> MeteringResult<Vec<LedgerEntry>> {
        Err(MeteringError::Store("aggregation unavailable".to_string()))
    }
}

// =============================================================================
// Tenant fakes
// =============================================================================

pub(crate) fn test_tenant(tier: &str, seats_purchased: i32) -> Tenant {
    let now = OffsetDateTime::now_utc();
    Tenant {
        id: Uuid::new_v4(),
        name: format!("tenant-{}", tier),
        tier: tier.to_string(),
        seats_purchased,
        pending_seat_amount: 0.0,
        billing_cycle_start: now,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BillingMeta {
    pub external_id: String,
    pub status: String,
    pub plan_ref: Option<String>,
}

/// Tenant store backed by hash maps, cloneable for post-run inspection
#[derive(Clone, Default)]
pub(crate) struct InMemoryTenantStore {
    tenants: Arc<Mutex<Vec<Tenant>>>,
    occupancy: Arc<Mutex<HashMap<Uuid, i64>>>,
    request_usage: Arc<Mutex<HashMap<Uuid, i64>>>,
    pending: Arc<Mutex<HashMap<Uuid, f64>>>,
    billing_meta: Arc<Mutex<HashMap<(Uuid, String), BillingMeta>>>,
}

impl InMemoryTenantStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_tenant(&self, tenant: Tenant) {
        self.tenants.lock().unwrap().push(tenant);
    }

    pub(crate) fn set_seat_occupancy(&self, tenant_id: Uuid, occupied: i64) {
        self.occupancy.lock().unwrap().insert(tenant_id, occupied);
    }

    pub(crate) fn set_monthly_request_usage(&self, tenant_id: Uuid, requests: i64) {
        self.request_usage
            .lock()
            .unwrap()
            .insert(tenant_id, requests);
    }

    pub(crate) fn pending_amount(&self, tenant_id: Uuid) -> f64 {
        self.pending
            .lock()
            .unwrap()
            .get(&tenant_id)
            .copied()
            .unwrap_or(0.0)
    }

    pub(crate) fn billing_meta(&self, tenant_id: Uuid, backend: &str) -> Option<BillingMeta> {
        self.billing_meta
            .lock()
            .unwrap()
            .get(&(tenant_id, backend.to_string()))
            .cloned()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn list_billable(&self) -> MeteringResult<Vec<Tenant>> {
        Ok(self.tenants.lock().unwrap().clone())
    }

    async fn upsert_billing_meta(
        &self,
        tenant_id: Uuid,
        backend: &str,
        external_id: &str,
        status: &str,
        plan_ref: Option<&str>,
    ) -> MeteringResult<bool> {
        let next = BillingMeta {
            external_id: external_id.to_string(),
            status: status.to_string(),
            plan_ref: plan_ref.map(String::from),
        };
        let mut meta = self.billing_meta.lock().unwrap();
        let key = (tenant_id, backend.to_string());
        let changed = meta.get(&key) != Some(&next);
        meta.insert(key, next);
        Ok(changed)
    }

    async fn seat_occupancy(&self, tenant_id: Uuid) -> MeteringResult<i64> {
        Ok(self
            .occupancy
            .lock()
            .unwrap()
            .get(&tenant_id)
            .copied()
            .unwrap_or(0))
    }

    async fn add_pending_seat_amount(&self, tenant_id: Uuid, amount: f64) -> MeteringResult<()> {
        *self.pending.lock().unwrap().entry(tenant_id).or_insert(0.0) += amount;
        Ok(())
    }

    async fn monthly_request_usage(&self, tenant_id: Uuid) -> MeteringResult<i64> {
        Ok(self
            .request_usage
            .lock()
            .unwrap()
            .get(&tenant_id)
            .copied()
            .unwrap_or(0))
    }
}

// =============================================================================
// Backend fakes
// =============================================================================

/// Billing backend that serves a fixed list of records in a single page
pub(crate) struct StaticBackend {
    pub name: &'static str,
    pub records: Vec<SubscriptionRecord>,
}

#[async_trait]
impl BillingBackend for StaticBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_subscriptions(
        &self,
        _cursor: Option<String>,
    ) -> MeteringResult<SubscriptionPage> {
        Ok(SubscriptionPage {
            records: self.records.clone(),
            next_cursor: None,
        })
    }
}

/// Billing backend whose fetch always fails, for task-isolation tests
pub(crate) struct FailingBackend {
    pub name: &'static str,
}

#[async_trait]
impl BillingBackend for FailingBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_subscriptions(
        &self,
        _cursor: Option<String>,
    ) -> MeteringResult<SubscriptionPage> {
        Err(MeteringError::Backend {
            backend: self.name.to_string(),
            message: "connection refused".to_string(),
        })
    }
}
