//! Tenant store
//!
//! Billing metadata writes are keyed by (tenant, backend) and upserted so
//! that re-running a reconciliation pass converges instead of accumulating
//! duplicate rows. The pending-seat accumulator uses a SQL-side increment
//! so overlapping runs cannot lose an update.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use stackforge_shared::Tenant;

use crate::error::MeteringResult;

/// Store seam for tenant rows, injectable so tests can substitute fakes
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Tenants eligible for reconciliation (all non-deleted tenants)
    async fn list_billable(&self) -> MeteringResult<Vec<Tenant>>;

    /// Upsert external billing metadata for a tenant, keyed by
    /// (tenant, backend). Returns true when the stored state changed.
    async fn upsert_billing_meta(
        &self,
        tenant_id: Uuid,
        backend: &str,
        external_id: &str,
        status: &str,
        plan_ref: Option<&str>,
    ) -> MeteringResult<bool>;

    /// Current seat occupancy (active members) for a tenant
    async fn seat_occupancy(&self, tenant_id: Uuid) -> MeteringResult<i64>;

    /// Atomically add to the tenant's pending seat-overage accumulator
    async fn add_pending_seat_amount(&self, tenant_id: Uuid, amount: f64) -> MeteringResult<()>;

    /// Build requests recorded for the tenant in the current calendar month
    async fn monthly_request_usage(&self, tenant_id: Uuid) -> MeteringResult<i64>;
}

/// Postgres-backed tenant store
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn list_billable(&self) -> MeteringResult<Vec<Tenant>> {
        let tenants: Vec<Tenant> = sqlx::query_as(
            r#"
            SELECT id, name, tier, seats_purchased, pending_seat_amount,
                   billing_cycle_start, created_at, updated_at
            FROM tenants
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tenants)
    }

    async fn upsert_billing_meta(
        &self,
        tenant_id: Uuid,
        backend: &str,
        external_id: &str,
        status: &str,
        plan_ref: Option<&str>,
    ) -> MeteringResult<bool> {
        // The WHERE clause makes no-op updates affect zero rows, so
        // RETURNING only fires when state actually changed; replaying the
        // same page converges instead of duplicating.
        let changed: Option<bool> = sqlx::query_scalar(
            r#"
            INSERT INTO external_subscription_refs
                (tenant_id, backend, external_id, status, plan_ref, synced_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (tenant_id, backend) DO UPDATE SET
                external_id = EXCLUDED.external_id,
                status = EXCLUDED.status,
                plan_ref = EXCLUDED.plan_ref,
                synced_at = NOW()
            WHERE external_subscription_refs.external_id IS DISTINCT FROM EXCLUDED.external_id
               OR external_subscription_refs.status IS DISTINCT FROM EXCLUDED.status
               OR external_subscription_refs.plan_ref IS DISTINCT FROM EXCLUDED.plan_ref
            RETURNING true
            "#,
        )
        .bind(tenant_id)
        .bind(backend)
        .bind(external_id)
        .bind(status)
        .bind(plan_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(changed.unwrap_or(false))
    }

    async fn seat_occupancy(&self, tenant_id: Uuid) -> MeteringResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM members WHERE tenant_id = $1 AND status = 'active'",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn add_pending_seat_amount(&self, tenant_id: Uuid, amount: f64) -> MeteringResult<()> {
        sqlx::query(
            r#"
            UPDATE tenants
            SET pending_seat_amount = pending_seat_amount + $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn monthly_request_usage(&self, tenant_id: Uuid) -> MeteringResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM build_requests
            WHERE tenant_id = $1
              AND created_at >= date_trunc('month', NOW())
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
