//! AI credit tracking
//!
//! Records token cost per completion call as an append-only ledger entry,
//! then re-derives month-to-date usage from the ledger and compares it to
//! the tier's monthly budget. The entry is written before the budget check:
//! usage is historical truth, not a gate.
//!
//! Failure policy is fail-open: if the ledger cannot be read back for
//! aggregation the call is allowed with a warning. Deliberately the
//! opposite of the rate limiter.

use time::{OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

use stackforge_shared::{LedgerEntryKind, PlanCatalog};

use crate::error::{MeteringError, MeteringResult};
use crate::ledger::{LedgerStore, NewLedgerEntry};

/// Fixed per-1K-token completion prices, in dollars
#[derive(Debug, Clone, Copy)]
pub struct TokenPrices {
    pub per_k_input: f64,
    pub per_k_output: f64,
}

impl Default for TokenPrices {
    fn default() -> Self {
        Self {
            per_k_input: 0.003,
            per_k_output: 0.015,
        }
    }
}

impl TokenPrices {
    /// Load prices from environment or use defaults
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            per_k_input: std::env::var("TOKEN_PRICE_PER_K_INPUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.per_k_input),
            per_k_output: std::env::var("TOKEN_PRICE_PER_K_OUTPUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.per_k_output),
        }
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 / 1000.0 * self.per_k_input
            + output_tokens as f64 / 1000.0 * self.per_k_output
    }
}

/// Outcome of recording one completion call
#[derive(Debug, Clone, serde::Serialize)]
pub struct UsageDecision {
    pub allowed: bool,
    /// Cost of this call in dollars
    pub cost: f64,
    /// Month-to-date tokens including this call
    pub monthly_tokens: u64,
    /// Tier budget; None = unbounded
    pub monthly_budget: Option<u64>,
    pub suggested_plan: Option<String>,
    pub message: Option<String>,
}

/// Meters token usage against monthly tier budgets
pub struct CreditTracker<L: LedgerStore> {
    catalog: PlanCatalog,
    ledger: L,
    prices: TokenPrices,
}

impl<L: LedgerStore> CreditTracker<L> {
    pub fn new(catalog: PlanCatalog, ledger: L) -> Self {
        Self {
            catalog,
            ledger,
            prices: TokenPrices::from_env(),
        }
    }

    pub fn with_prices(catalog: PlanCatalog, ledger: L, prices: TokenPrices) -> Self {
        Self {
            catalog,
            ledger,
            prices,
        }
    }

    /// Record one completion call and re-check the monthly budget
    pub async fn record(
        &self,
        tenant_id: Uuid,
        tier_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> MeteringResult<UsageDecision> {
        let plan = self
            .catalog
            .get(tier_id)
            .ok_or_else(|| MeteringError::UnknownTier(tier_id.to_string()))?;

        let cost = self.prices.cost(input_tokens, output_tokens);

        // The usage record is written unconditionally, budget or not.
        self.ledger
            .append(
                NewLedgerEntry::new(tenant_id, LedgerEntryKind::AiUsage, cost).details(
                    serde_json::json!({
                        "input_tokens": input_tokens,
                        "output_tokens": output_tokens,
                        "cost": cost,
                        "tier": plan.tier.to_string(),
                    }),
                ),
            )
            .await?;

        let since = month_start(OffsetDateTime::now_utc());
        let monthly_tokens = match self.ledger.monthly_token_total(tenant_id, since).await {
            Ok(total) => total,
            Err(e) => {
                // Fail open: metering must not take the product down.
                tracing::warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Ledger aggregation failed, allowing usage without budget check"
                );
                return Ok(UsageDecision {
                    allowed: true,
                    cost,
                    monthly_tokens: input_tokens + output_tokens,
                    monthly_budget: plan.monthly_token_budget,
                    suggested_plan: None,
                    message: Some("usage recorded, budget check unavailable".to_string()),
                });
            }
        };

        if let Some(budget) = plan.monthly_token_budget {
            if monthly_tokens > budget {
                let suggested = plan.tier.next().map(|t| t.to_string());
                let message = match &suggested {
                    Some(next) => format!(
                        "Monthly token budget of {} exceeded ({} used). Upgrade to the {} plan to continue.",
                        budget, monthly_tokens, next
                    ),
                    None => format!(
                        "Monthly token budget of {} exceeded ({} used).",
                        budget, monthly_tokens
                    ),
                };

                tracing::info!(
                    tenant_id = %tenant_id,
                    tier = %plan.tier,
                    monthly_tokens = monthly_tokens,
                    budget = budget,
                    "Monthly token budget exceeded"
                );

                return Ok(UsageDecision {
                    allowed: false,
                    cost,
                    monthly_tokens,
                    monthly_budget: Some(budget),
                    suggested_plan: suggested,
                    message: Some(message),
                });
            }
        }

        Ok(UsageDecision {
            allowed: true,
            cost,
            monthly_tokens,
            monthly_budget: plan.monthly_token_budget,
            suggested_plan: None,
            message: None,
        })
    }
}

/// First instant of the calendar month containing `now`, UTC
pub(crate) fn month_start(now: OffsetDateTime) -> OffsetDateTime {
    let first = now.date().replace_day(1).unwrap_or_else(|_| now.date());
    PrimitiveDateTime::new(first, Time::MIDNIGHT).assume_utc()
}
