//! Per-tenant hourly rate limiting
//!
//! A sliding 60-minute window over the request log, consulted before every
//! LLM completion call. Admission inserts one log row, so the window is
//! derived state: it expires as time passes, nothing is deleted inline.
//!
//! Failure policy is fail-closed: if the log cannot be read the request is
//! denied. This is deliberately the opposite of the credit tracker.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use stackforge_shared::PlanCatalog;

use crate::error::{MeteringError, MeteringResult};

/// Request-log seam, injectable so tests can substitute fakes
#[async_trait]
pub trait RequestLog: Send + Sync {
    /// Count of admitted requests for this tenant since `since`
    async fn count_since(&self, tenant_id: Uuid, since: OffsetDateTime) -> MeteringResult<i64>;

    /// Record one admitted request, timestamped now
    async fn record(&self, tenant_id: Uuid) -> MeteringResult<()>;

    /// Delete rows older than `cutoff`; returns rows removed
    async fn purge_before(&self, cutoff: OffsetDateTime) -> MeteringResult<u64>;
}

/// Admission decision returned to the build orchestrator
#[derive(Debug, Clone, serde::Serialize)]
pub struct AdmitDecision {
    pub allowed: bool,
    /// Requests left in the window after this one; i64::MAX for unbounded tiers
    pub remaining: i64,
    pub reason: Option<String>,
}

/// Sliding-window rate limiter over a request log
pub struct RateLimiter<L: RequestLog> {
    catalog: PlanCatalog,
    log: L,
}

impl<L: RequestLog> RateLimiter<L> {
    pub fn new(catalog: PlanCatalog, log: L) -> Self {
        Self { catalog, log }
    }

    /// Admit or deny one build request for `tenant_id` on `tier_id`
    ///
    /// Not strictly atomic across concurrent requests from one tenant: two
    /// requests may both observe `used = budget - 1` and both be admitted.
    /// The window is a soft bound, not a hard guarantee.
    pub async fn admit(&self, tenant_id: Uuid, tier_id: &str) -> MeteringResult<AdmitDecision> {
        let plan = self
            .catalog
            .get(tier_id)
            .ok_or_else(|| MeteringError::UnknownTier(tier_id.to_string()))?;

        let budget = match plan.hourly_request_budget {
            Some(b) => i64::from(b),
            None => {
                return Ok(AdmitDecision {
                    allowed: true,
                    remaining: i64::MAX,
                    reason: None,
                })
            }
        };

        let window_start = OffsetDateTime::now_utc() - Duration::hours(1);
        let used = match self.log.count_since(tenant_id, window_start).await {
            Ok(used) => used,
            Err(e) => {
                // Fail closed: an unreadable log denies the request.
                tracing::warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Request log unreadable, denying request"
                );
                return Ok(AdmitDecision {
                    allowed: false,
                    remaining: 0,
                    reason: Some("rate limit store unavailable".to_string()),
                });
            }
        };

        if used >= budget {
            return Ok(AdmitDecision {
                allowed: false,
                remaining: 0,
                reason: Some(format!("hourly limit reached for tier {}", plan.tier)),
            });
        }

        self.log.record(tenant_id).await?;

        Ok(AdmitDecision {
            allowed: true,
            remaining: budget - used - 1,
            reason: None,
        })
    }
}

/// Postgres-backed request log
#[derive(Clone)]
pub struct PgRequestLog {
    pool: PgPool,
}

impl PgRequestLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestLog for PgRequestLog {
    async fn count_since(&self, tenant_id: Uuid, since: OffsetDateTime) -> MeteringResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM build_requests WHERE tenant_id = $1 AND created_at >= $2",
        )
        .bind(tenant_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn record(&self, tenant_id: Uuid) -> MeteringResult<()> {
        sqlx::query("INSERT INTO build_requests (tenant_id, created_at) VALUES ($1, NOW())")
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn purge_before(&self, cutoff: OffsetDateTime) -> MeteringResult<u64> {
        let result = sqlx::query("DELETE FROM build_requests WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// In-memory request log, for single-process deployments and tests
#[derive(Default)]
pub struct InMemoryRequestLog {
    entries: Mutex<HashMap<Uuid, Vec<OffsetDateTime>>>,
}

impl InMemoryRequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request with an explicit timestamp
    #[cfg(test)]
    pub(crate) fn record_at(&self, tenant_id: Uuid, at: OffsetDateTime) {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(tenant_id).or_default().push(at);
    }
}

#[async_trait]
impl RequestLog for InMemoryRequestLog {
    async fn count_since(&self, tenant_id: Uuid, since: OffsetDateTime) -> MeteringResult<i64> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| MeteringError::Store(e.to_string()))?;
        Ok(entries
            .get(&tenant_id)
            .map(|ts| ts.iter().filter(|t| **t >= since).count() as i64)
            .unwrap_or(0))
    }

    async fn record(&self, tenant_id: Uuid) -> MeteringResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| MeteringError::Store(e.to_string()))?;
        entries
            .entry(tenant_id)
            .or_default()
            .push(OffsetDateTime::now_utc());
        Ok(())
    }

    async fn purge_before(&self, cutoff: OffsetDateTime) -> MeteringResult<u64> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| MeteringError::Store(e.to_string()))?;
        let mut removed = 0u64;
        for timestamps in entries.values_mut() {
            let before = timestamps.len();
            timestamps.retain(|t| *t >= cutoff);
            removed += (before - timestamps.len()) as u64;
        }
        Ok(removed)
    }
}
