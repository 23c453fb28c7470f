//! Entitlement resolution
//!
//! Given a tier and a requested feature set, returns the tier-clamped
//! subset plus a note for every clamp taken. Pure: same inputs always
//! produce the same outputs, nothing is written anywhere.

use serde::{Deserialize, Serialize};

use stackforge_shared::{AutomationLevel, PlanCatalog, SecurityLevel};

use crate::error::{MeteringError, MeteringResult};

/// Typed build request, validated once at the boundary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestedFeatures {
    /// Cloud providers the build should target, in request order
    pub providers: Vec<String>,
    pub automation: AutomationLevel,
    pub security: SecurityLevel,
}

/// One clamp/downgrade action taken during resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClampNote {
    pub field: String,
    pub requested: String,
    pub allowed: String,
    pub message: String,
}

/// Tier-clamped feature set, returned to the calling UI as structured data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEntitlement {
    pub tier: String,
    pub allowed: RequestedFeatures,
    pub clamp_notes: Vec<ClampNote>,
}

impl ResolvedEntitlement {
    pub fn was_clamped(&self) -> bool {
        !self.clamp_notes.is_empty()
    }
}

/// Resolves requested features against the plan catalog
#[derive(Clone)]
pub struct EntitlementResolver {
    catalog: PlanCatalog,
}

impl EntitlementResolver {
    pub fn new(catalog: PlanCatalog) -> Self {
        Self { catalog }
    }

    /// Clamp `requested` to what `tier_id` allows
    ///
    /// Provider lists over a finite limit are truncated to the first N
    /// entries (request order, not a priority ranking). Automation and
    /// security levels above the tier's maximum are forced down.
    pub fn resolve(
        &self,
        tier_id: &str,
        requested: &RequestedFeatures,
    ) -> MeteringResult<ResolvedEntitlement> {
        let plan = self
            .catalog
            .get(tier_id)
            .ok_or_else(|| MeteringError::UnknownTier(tier_id.to_string()))?;

        let mut allowed = requested.clone();
        let mut clamp_notes = Vec::new();

        if let Some(cap) = plan.max_providers.cap() {
            if allowed.providers.len() > cap as usize {
                let requested_count = allowed.providers.len();
                allowed.providers.truncate(cap as usize);
                clamp_notes.push(ClampNote {
                    field: "providers".to_string(),
                    requested: requested_count.to_string(),
                    allowed: cap.to_string(),
                    message: format!(
                        "The {} plan supports up to {} providers; the first {} were kept",
                        plan.display_name, cap, cap
                    ),
                });
            }
        }

        if allowed.automation.rank() > plan.max_automation.rank() {
            let was = allowed.automation;
            allowed.automation = plan.max_automation;
            clamp_notes.push(ClampNote {
                field: "automation".to_string(),
                requested: was.to_string(),
                allowed: plan.max_automation.to_string(),
                message: format!(
                    "Automation level '{}' requires a higher plan; '{}' is the maximum on {}",
                    was, plan.max_automation, plan.display_name
                ),
            });
        }

        if allowed.security.rank() > plan.max_security.rank() {
            let was = allowed.security;
            allowed.security = plan.max_security;
            clamp_notes.push(ClampNote {
                field: "security".to_string(),
                requested: was.to_string(),
                allowed: plan.max_security.to_string(),
                message: format!(
                    "Security level '{}' requires a higher plan; '{}' is the maximum on {}",
                    was, plan.max_security, plan.display_name
                ),
            });
        }

        Ok(ResolvedEntitlement {
            tier: plan.tier.to_string(),
            allowed,
            clamp_notes,
        })
    }
}
