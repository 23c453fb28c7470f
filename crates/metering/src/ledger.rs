//! Append-only billing ledger
//!
//! Entries are historical truth: they are written once and never mutated
//! or deleted. Month-to-date aggregates are computed by summing entries
//! within a time window at read time, never by keeping counters.

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use stackforge_shared::{LedgerEntry, LedgerEntryKind};

use crate::error::{MeteringError, MeteringResult};

/// A ledger entry about to be appended
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub tenant_id: Uuid,
    pub kind: LedgerEntryKind,
    pub amount: f64,
    pub details: serde_json::Value,
}

impl NewLedgerEntry {
    pub fn new(tenant_id: Uuid, kind: LedgerEntryKind, amount: f64) -> Self {
        Self {
            tenant_id,
            kind,
            amount,
            details: serde_json::json!({}),
        }
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Store seam for the ledger, injectable so tests can substitute fakes
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, entry: NewLedgerEntry) -> MeteringResult<()>;

    /// Sum of input+output tokens over ai-usage entries since `since`
    async fn monthly_token_total(
        &self,
        tenant_id: Uuid,
        since: OffsetDateTime,
    ) -> MeteringResult<u64>;

    /// Whether an extra-seat entry already exists for this billing period
    async fn has_seat_entry(&self, tenant_id: Uuid, period_key: &str) -> MeteringResult<bool>;

    /// Amount of the most recent usage-sync entry for this billing period
    async fn latest_usage_sync_amount(
        &self,
        tenant_id: Uuid,
        period_key: &str,
    ) -> MeteringResult<Option<f64>>;

    async fn entries_for_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
    ) -> MeteringResult<Vec<LedgerEntry>>;
}

/// Postgres-backed ledger store
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn append(&self, entry: NewLedgerEntry) -> MeteringResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (tenant_id, kind, amount, details)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.tenant_id)
        .bind(entry.kind.to_string())
        .bind(entry.amount)
        .bind(&entry.details)
        .execute(&self.pool)
        .await
        .map_err(|e| MeteringError::Store(e.to_string()))?;

        Ok(())
    }

    async fn monthly_token_total(
        &self,
        tenant_id: Uuid,
        since: OffsetDateTime,
    ) -> MeteringResult<u64> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(
                (details->>'input_tokens')::BIGINT + (details->>'output_tokens')::BIGINT
            )::BIGINT
            FROM ledger_entries
            WHERE tenant_id = $1 AND kind = 'ai-usage' AND created_at >= $2
            "#,
        )
        .bind(tenant_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MeteringError::Store(e.to_string()))?;

        Ok(total.unwrap_or(0).max(0) as u64)
    }

    async fn has_seat_entry(&self, tenant_id: Uuid, period_key: &str) -> MeteringResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM ledger_entries
                WHERE tenant_id = $1
                  AND kind = 'extra-seat'
                  AND details->>'period_key' = $2
            )
            "#,
        )
        .bind(tenant_id)
        .bind(period_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MeteringError::Store(e.to_string()))?;

        Ok(exists)
    }

    async fn latest_usage_sync_amount(
        &self,
        tenant_id: Uuid,
        period_key: &str,
    ) -> MeteringResult<Option<f64>> {
        let amount: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT amount FROM ledger_entries
            WHERE tenant_id = $1
              AND kind = 'usage-sync'
              AND details->>'period_key' = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(period_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MeteringError::Store(e.to_string()))?;

        Ok(amount)
    }

    async fn entries_for_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
    ) -> MeteringResult<Vec<LedgerEntry>> {
        let entries: Vec<LedgerEntry> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, kind, amount, details, created_at
            FROM ledger_entries
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MeteringError::Store(e.to_string()))?;

        Ok(entries)
    }
}
