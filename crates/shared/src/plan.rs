//! Plan catalog
//!
//! Static table mapping each subscription tier to its capability matrix:
//! provider limit, automation/security levels, seat count, token/request
//! budgets, and per-unit overage prices. Loaded once, never mutated.

use serde::{Deserialize, Serialize};

use crate::types::{AutomationLevel, PlanTier, SecurityLevel};

/// Provider-count limit for a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderLimit {
    Limited(u32),
    Unlimited,
}

impl ProviderLimit {
    /// Finite limit, or None when unlimited
    pub fn cap(&self) -> Option<u32> {
        match self {
            Self::Limited(n) => Some(*n),
            Self::Unlimited => None,
        }
    }

    pub fn allows(&self, count: usize) -> bool {
        match self {
            Self::Limited(n) => count <= *n as usize,
            Self::Unlimited => true,
        }
    }
}

/// Immutable capability matrix for one tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDefinition {
    pub tier: PlanTier,
    pub display_name: &'static str,
    pub max_providers: ProviderLimit,
    pub max_automation: AutomationLevel,
    pub max_security: SecurityLevel,
    pub included_seats: u32,
    /// Price per extra seat per month, in dollars
    pub seat_price: f64,
    /// Monthly AI token budget; None = unbounded (top tier)
    pub monthly_token_budget: Option<u64>,
    /// Build requests admitted per sliding hour; None = unbounded
    pub hourly_request_budget: Option<u32>,
    /// Included build requests per calendar month; None = unbounded
    pub monthly_request_allotment: Option<u64>,
    /// Overage price per pipeline run, in dollars
    pub pipeline_overage_price: f64,
    /// Overage price per API call over the allotment, in dollars
    pub api_call_overage_price: f64,
    /// Overage price per build minute, in dollars
    pub build_minute_overage_price: f64,
}

/// Static tier -> capability table
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<PlanDefinition>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PlanCatalog {
    /// Built-in catalog
    ///
    /// Seat prices are configurable via `SEAT_PRICE_<TIER>` env vars,
    /// everything else is fixed at compile time.
    pub fn builtin() -> Self {
        Self {
            plans: vec![
                PlanDefinition {
                    tier: PlanTier::Developer,
                    display_name: "Developer",
                    max_providers: ProviderLimit::Limited(1),
                    max_automation: AutomationLevel::Basic,
                    max_security: SecurityLevel::None,
                    included_seats: 1,
                    seat_price: seat_price_from_env("DEVELOPER", 10.0),
                    monthly_token_budget: Some(100_000),
                    hourly_request_budget: Some(10),
                    monthly_request_allotment: Some(2_000),
                    pipeline_overage_price: 0.10,
                    api_call_overage_price: 0.002,
                    build_minute_overage_price: 0.01,
                },
                PlanDefinition {
                    tier: PlanTier::Startup,
                    display_name: "Startup",
                    max_providers: ProviderLimit::Limited(3),
                    max_automation: AutomationLevel::Advanced,
                    max_security: SecurityLevel::Basic,
                    included_seats: 5,
                    seat_price: seat_price_from_env("STARTUP", 10.0),
                    monthly_token_budget: Some(500_000),
                    hourly_request_budget: Some(30),
                    monthly_request_allotment: Some(10_000),
                    pipeline_overage_price: 0.08,
                    api_call_overage_price: 0.002,
                    build_minute_overage_price: 0.01,
                },
                PlanDefinition {
                    tier: PlanTier::Team,
                    display_name: "Team",
                    max_providers: ProviderLimit::Limited(10),
                    max_automation: AutomationLevel::Enterprise,
                    max_security: SecurityLevel::Advanced,
                    included_seats: 10,
                    seat_price: seat_price_from_env("TEAM", 15.0),
                    monthly_token_budget: Some(2_000_000),
                    hourly_request_budget: Some(100),
                    monthly_request_allotment: Some(50_000),
                    pipeline_overage_price: 0.05,
                    api_call_overage_price: 0.001,
                    build_minute_overage_price: 0.008,
                },
                PlanDefinition {
                    tier: PlanTier::Enterprise,
                    display_name: "Enterprise",
                    max_providers: ProviderLimit::Unlimited,
                    max_automation: AutomationLevel::Private,
                    max_security: SecurityLevel::Enterprise,
                    included_seats: 25,
                    seat_price: seat_price_from_env("ENTERPRISE", 20.0),
                    monthly_token_budget: None,
                    hourly_request_budget: None,
                    monthly_request_allotment: None,
                    pipeline_overage_price: 0.0,
                    api_call_overage_price: 0.0,
                    build_minute_overage_price: 0.0,
                },
            ],
        }
    }

    /// Look up a plan by string tier id; None for unknown tiers
    /// (callers surface that as a configuration error)
    pub fn get(&self, tier_id: &str) -> Option<&PlanDefinition> {
        let tier: PlanTier = tier_id.parse().ok()?;
        self.get_tier(tier)
    }

    pub fn get_tier(&self, tier: PlanTier) -> Option<&PlanDefinition> {
        self.plans.iter().find(|p| p.tier == tier)
    }

    pub fn plans(&self) -> &[PlanDefinition] {
        &self.plans
    }
}

fn seat_price_from_env(tier: &str, default: f64) -> f64 {
    std::env::var(format!("SEAT_PRICE_{}", tier))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
