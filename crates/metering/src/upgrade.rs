//! Post-build upgrade evaluation
//!
//! Inspects a generated build's declared feature usage and decides whether
//! it exceeds the tenant's tier, recommending the next tier up when it
//! does. Pure and deterministic.

use serde::{Deserialize, Serialize};

use stackforge_shared::{PlanCatalog, PlanTier};

use crate::error::{MeteringError, MeteringResult};

/// Feature tags that carry a minimum-tier requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureTag {
    MultiCloud,
    Failover,
    Autoscale,
    ZeroDowntime,
    Scheduled,
    Backup,
}

impl FeatureTag {
    /// Minimum tier this feature requires
    pub fn required_tier(&self) -> PlanTier {
        match self {
            Self::MultiCloud | Self::Failover => PlanTier::Enterprise,
            Self::Autoscale | Self::ZeroDowntime => PlanTier::Team,
            Self::Scheduled | Self::Backup => PlanTier::Startup,
        }
    }

    /// Extract tags from a serialized feature set by its trigger keywords
    ///
    /// Coarse substring matching by design: "multi-cloud"/"failover" imply
    /// enterprise, "autoscale"/"zero_downtime" imply team,
    /// "scheduled"/"backup" imply startup.
    pub fn scan(serialized: &str) -> Vec<Self> {
        const TRIGGERS: [(&str, FeatureTag); 6] = [
            ("multi-cloud", FeatureTag::MultiCloud),
            ("failover", FeatureTag::Failover),
            ("autoscale", FeatureTag::Autoscale),
            ("zero_downtime", FeatureTag::ZeroDowntime),
            ("scheduled", FeatureTag::Scheduled),
            ("backup", FeatureTag::Backup),
        ];

        let haystack = serialized.to_lowercase();
        TRIGGERS
            .iter()
            .filter(|(keyword, _)| haystack.contains(keyword))
            .map(|(_, tag)| *tag)
            .collect()
    }
}

/// Declared feature usage of one generated build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    pub provider_count: usize,
    pub feature_tags: Vec<FeatureTag>,
}

impl BuildReport {
    /// Build a report from a provider list and a serialized feature set
    pub fn from_serialized(provider_count: usize, features: &str) -> Self {
        Self {
            provider_count,
            feature_tags: FeatureTag::scan(features),
        }
    }
}

/// Upgrade recommendation, surfaced to the UI as structured data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeAdvice {
    pub needs_upgrade: bool,
    pub recommended_plan: Option<String>,
    pub message: Option<String>,
}

impl UpgradeAdvice {
    fn none() -> Self {
        Self {
            needs_upgrade: false,
            recommended_plan: None,
            message: None,
        }
    }
}

/// Evaluates generated builds against tier limits after the fact
#[derive(Clone)]
pub struct UpgradeEvaluator {
    catalog: PlanCatalog,
}

impl UpgradeEvaluator {
    pub fn new(catalog: PlanCatalog) -> Self {
        Self { catalog }
    }

    /// Decide whether `report` exceeds what `tier_id` allows
    ///
    /// A recommendation is only surfaced when the required tier's rank is
    /// strictly greater than the tenant's current tier rank.
    pub fn evaluate(&self, report: &BuildReport, tier_id: &str) -> MeteringResult<UpgradeAdvice> {
        let plan = self
            .catalog
            .get(tier_id)
            .ok_or_else(|| MeteringError::UnknownTier(tier_id.to_string()))?;

        let mut required: Option<(PlanTier, String)> = None;

        if !plan.max_providers.allows(report.provider_count) {
            if let Some(next) = plan.tier.next() {
                required = Some((
                    next,
                    format!(
                        "This build uses {} providers but the {} plan allows {}",
                        report.provider_count,
                        plan.display_name,
                        plan.max_providers.cap().unwrap_or(0)
                    ),
                ));
            }
        }

        for tag in &report.feature_tags {
            let tier = tag.required_tier();
            if tier.rank() > plan.tier.rank() {
                let stronger = match &required {
                    Some((current, _)) => tier.rank() > current.rank(),
                    None => true,
                };
                if stronger {
                    required = Some((
                        tier,
                        format!(
                            "Feature '{:?}' requires the {} plan or above",
                            tag, tier
                        ),
                    ));
                }
            }
        }

        match required {
            Some((tier, message)) if tier.rank() > plan.tier.rank() => Ok(UpgradeAdvice {
                needs_upgrade: true,
                recommended_plan: Some(tier.to_string()),
                message: Some(message),
            }),
            _ => Ok(UpgradeAdvice::none()),
        }
    }
}
