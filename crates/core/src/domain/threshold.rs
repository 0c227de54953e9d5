use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::{AccountPriority, AccountType, Segment, TenantId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThresholdRuleId(pub String);

/// Tuning knobs for one tenant segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Cadence floor, and the cadence used when there is no order-derived pace.
    pub dormant_days: i64,
    /// Fraction of the cadence baseline granted as grace before dormancy.
    pub grace_period_percent: Decimal,
    pub min_grace_days: i64,
    /// Fraction below established revenue that counts as a decline.
    pub revenue_decline_percent: Decimal,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            dormant_days: 45,
            grace_period_percent: Decimal::new(30, 2),
            min_grace_days: 7,
            revenue_decline_percent: Decimal::new(15, 2),
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.dormant_days <= 0 {
            return Err(DomainError::InvariantViolation(
                "dormant_days must be greater than zero".to_string(),
            ));
        }
        if self.min_grace_days < 0 {
            return Err(DomainError::InvariantViolation(
                "min_grace_days must not be negative".to_string(),
            ));
        }
        let unit = Decimal::ZERO..=Decimal::ONE;
        if !unit.contains(&self.grace_period_percent) {
            return Err(DomainError::InvariantViolation(
                "grace_period_percent must be within 0..=1".to_string(),
            ));
        }
        if !unit.contains(&self.revenue_decline_percent) {
            return Err(DomainError::InvariantViolation(
                "revenue_decline_percent must be within 0..=1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Specificity of a configured row relative to a customer segment, least
/// specific first so the derived ordering picks the winner with `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecificityTier {
    GlobalDefault,
    TenantDefault,
    PriorityOnly,
    TypeOnly,
    ExactSegment,
}

/// One configured row: a tenant, optional segment keys, and its config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub id: ThresholdRuleId,
    pub tenant_id: TenantId,
    pub account_type: Option<AccountType>,
    pub account_priority: Option<AccountPriority>,
    pub config: ThresholdConfig,
    pub updated_at: DateTime<Utc>,
}

impl ThresholdRule {
    /// The tier this row occupies for `segment`, or `None` when one of its
    /// keys names a different segment value.
    pub fn tier_for(&self, segment: &Segment) -> Option<SpecificityTier> {
        let type_matches = self.account_type.map(|value| Some(value) == segment.account_type);
        let priority_matches =
            self.account_priority.map(|value| Some(value) == segment.account_priority);

        match (type_matches, priority_matches) {
            (Some(true), Some(true)) => Some(SpecificityTier::ExactSegment),
            (Some(true), None) => Some(SpecificityTier::TypeOnly),
            (None, Some(true)) => Some(SpecificityTier::PriorityOnly),
            (None, None) => Some(SpecificityTier::TenantDefault),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedThresholds {
    pub config: ThresholdConfig,
    pub tier: SpecificityTier,
    pub rule_id: Option<ThresholdRuleId>,
}

impl ResolvedThresholds {
    pub fn global_default() -> Self {
        Self {
            config: ThresholdConfig::default(),
            tier: SpecificityTier::GlobalDefault,
            rule_id: None,
        }
    }
}

/// Picks the single most specific applicable row for `segment`, or the
/// hardcoded global default when none applies.
pub fn select_most_specific(rules: &[ThresholdRule], segment: &Segment) -> ResolvedThresholds {
    rules
        .iter()
        .filter_map(|rule| rule.tier_for(segment).map(|tier| (tier, rule)))
        .max_by_key(|(tier, _)| *tier)
        .map(|(tier, rule)| ResolvedThresholds {
            config: rule.config.clone(),
            tier,
            rule_id: Some(rule.id.clone()),
        })
        .unwrap_or_else(ResolvedThresholds::global_default)
}
