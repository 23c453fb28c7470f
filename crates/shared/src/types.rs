//! Common types used across StackForge

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Subscription tier for billing
///
/// Tier ordering is total: `rank()` gives a single linear rank used for
/// every "does tier A allow what tier B requires" comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Developer,
    Startup,
    Team,
    Enterprise,
}

impl Default for PlanTier {
    fn default() -> Self {
        Self::Developer
    }
}

impl PlanTier {
    /// Linear rank: developer (0) < startup (1) < team (2) < enterprise (3)
    pub fn rank(&self) -> u8 {
        match self {
            Self::Developer => 0,
            Self::Startup => 1,
            Self::Team => 2,
            Self::Enterprise => 3,
        }
    }

    /// Next tier in the fixed upgrade ordering, None at the top
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Developer => Some(Self::Startup),
            Self::Startup => Some(Self::Team),
            Self::Team => Some(Self::Enterprise),
            Self::Enterprise => None,
        }
    }

    pub fn all() -> [Self; 4] {
        [Self::Developer, Self::Startup, Self::Team, Self::Enterprise]
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Developer => write!(f, "developer"),
            Self::Startup => write!(f, "startup"),
            Self::Team => write!(f, "team"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "developer" => Ok(Self::Developer),
            "startup" => Ok(Self::Startup),
            "team" => Ok(Self::Team),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(format!("Invalid plan tier: {}", s)),
        }
    }
}

/// Automation level a plan allows for generated infrastructure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationLevel {
    Basic,
    Advanced,
    Enterprise,
    Private,
}

impl Default for AutomationLevel {
    fn default() -> Self {
        Self::Basic
    }
}

impl AutomationLevel {
    /// Linear rank: basic (0) < advanced (1) < enterprise (2) < private (3)
    pub fn rank(&self) -> u8 {
        match self {
            Self::Basic => 0,
            Self::Advanced => 1,
            Self::Enterprise => 2,
            Self::Private => 3,
        }
    }
}

impl std::fmt::Display for AutomationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Advanced => write!(f, "advanced"),
            Self::Enterprise => write!(f, "enterprise"),
            Self::Private => write!(f, "private"),
        }
    }
}

impl std::str::FromStr for AutomationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            "enterprise" => Ok(Self::Enterprise),
            "private" => Ok(Self::Private),
            _ => Err(format!("Invalid automation level: {}", s)),
        }
    }
}

/// Security hardening level a plan allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    None,
    Basic,
    Advanced,
    Enterprise,
}

impl Default for SecurityLevel {
    fn default() -> Self {
        Self::None
    }
}

impl SecurityLevel {
    /// Linear rank: none (0) < basic (1) < advanced (2) < enterprise (3)
    pub fn rank(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Basic => 1,
            Self::Advanced => 2,
            Self::Enterprise => 3,
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Basic => write!(f, "basic"),
            Self::Advanced => write!(f, "advanced"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(format!("Invalid security level: {}", s)),
        }
    }
}

/// Kind of an append-only ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum LedgerEntryKind {
    AiUsage,
    ExtraSeat,
    UsageSync,
    SubscriptionStatus,
}

impl std::fmt::Display for LedgerEntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AiUsage => write!(f, "ai-usage"),
            Self::ExtraSeat => write!(f, "extra-seat"),
            Self::UsageSync => write!(f, "usage-sync"),
            Self::SubscriptionStatus => write!(f, "subscription-status"),
        }
    }
}

impl std::str::FromStr for LedgerEntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai-usage" => Ok(Self::AiUsage),
            "extra-seat" => Ok(Self::ExtraSeat),
            "usage-sync" => Ok(Self::UsageSync),
            "subscription-status" => Ok(Self::SubscriptionStatus),
            _ => Err(format!("Invalid ledger entry kind: {}", s)),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Tenant (organization) model
///
/// Never deleted by the metering subsystem; cancellation is a status
/// transition on the external subscription ref, not a removal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub tier: String,
    pub seats_purchased: i32,
    /// Accumulated seat-overage amount not yet invoiced (dollars)
    pub pending_seat_amount: f64,
    pub billing_cycle_start: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Tenant {
    pub fn tier_parsed(&self) -> Option<PlanTier> {
        self.tier.parse().ok()
    }
}

/// Foreign subscription identifier plus status, one row per billing backend
///
/// Created when a tenant first checks out with a backend, updated on every
/// reconciler sync pass, never removed programmatically.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExternalSubscriptionRef {
    pub tenant_id: Uuid,
    pub backend: String,
    pub external_id: String,
    pub status: String,
    pub plan_ref: Option<String>,
    pub synced_at: OffsetDateTime,
}

/// Append-only billing/usage event
///
/// Entries are never mutated or deleted; every aggregate (month-to-date
/// tokens, month-to-date overage) is a sum over a time window at read time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: LedgerEntryKind,
    /// Currency amount in dollars, or an abstract unit for zero-cost events
    pub amount: f64,
    pub details: serde_json::Value,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Tests
// =============================================================================
