// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! StackForge shared types
//!
//! Tier and capability enums, the plan catalog, and the data models
//! shared between the metering engine and the worker.

pub mod plan;
pub mod types;

pub use plan::{PlanCatalog, PlanDefinition, ProviderLimit};
pub use types::{
    AutomationLevel, ExternalSubscriptionRef, LedgerEntry, LedgerEntryKind, PlanTier,
    SecurityLevel, Tenant,
};
