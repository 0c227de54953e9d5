use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: String,
    pub name: Option<String>,
}

impl Tenant {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.slug)
    }
}

/// How a batch invocation picks its tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantSelector {
    Id(TenantId),
    Slug(String),
}

impl std::fmt::Display for TenantSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id}"),
            Self::Slug(slug) => write!(f, "slug={slug}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskStatus {
    Healthy,
    AtRiskCadence,
    AtRiskRevenue,
    Dormant,
    Prospect,
    ProspectCold,
    Unqualified,
}

impl RiskStatus {
    pub const ALL: [RiskStatus; 7] = [
        RiskStatus::Healthy,
        RiskStatus::AtRiskCadence,
        RiskStatus::AtRiskRevenue,
        RiskStatus::Dormant,
        RiskStatus::Prospect,
        RiskStatus::ProspectCold,
        RiskStatus::Unqualified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::AtRiskCadence => "AT_RISK_CADENCE",
            Self::AtRiskRevenue => "AT_RISK_REVENUE",
            Self::Dormant => "DORMANT",
            Self::Prospect => "PROSPECT",
            Self::ProspectCold => "PROSPECT_COLD",
            Self::Unqualified => "UNQUALIFIED",
        }
    }
}

impl std::str::FromStr for RiskStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        RiskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| DomainError::UnknownRiskStatus(value.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Active,
    Target,
    Prospect,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Target => "TARGET",
            Self::Prospect => "PROSPECT",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "TARGET" => Ok(Self::Target),
            "PROSPECT" => Ok(Self::Prospect),
            other => Err(DomainError::UnknownSegmentKey(format!("account type `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountPriority {
    High,
    Medium,
    Low,
}

impl AccountPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl std::str::FromStr for AccountPriority {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            other => Err(DomainError::UnknownSegmentKey(format!("account priority `{other}`"))),
        }
    }
}

/// The (account type, account priority) pair thresholds are keyed on. Either
/// half may be unset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub account_type: Option<AccountType>,
    pub account_priority: Option<AccountPriority>,
}

impl Segment {
    pub fn new(account_type: Option<AccountType>, account_priority: Option<AccountPriority>) -> Self {
        Self { account_type, account_priority }
    }
}

/// The fields this engine owns on a customer row. Two states compare equal
/// exactly when persisting one over the other would be a no-op.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthState {
    pub risk_status: RiskStatus,
    pub last_order_date: Option<DateTime<Utc>>,
    pub next_expected_order_date: Option<DateTime<Utc>>,
    pub average_order_interval_days: Option<i64>,
    pub ordering_pace_days: Option<i64>,
    pub dormancy_since: Option<DateTime<Utc>>,
    pub reactivated_date: Option<DateTime<Utc>>,
}

impl HealthState {
    pub fn new_prospect() -> Self {
        Self {
            risk_status: RiskStatus::Prospect,
            last_order_date: None,
            next_expected_order_date: None,
            average_order_interval_days: None,
            ordering_pace_days: None,
            dormancy_since: None,
            reactivated_date: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerHealthRecord {
    pub id: CustomerId,
    pub tenant_id: TenantId,
    pub name: String,
    pub segment: Segment,
    pub established_revenue: Option<Decimal>,
    pub is_permanently_closed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write; the compare-and-swap token for concurrent writers.
    pub revision: i64,
    pub health: HealthState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveredOrder {
    pub id: String,
    pub delivered_at: DateTime<Utc>,
    pub total: Option<Decimal>,
}

/// Prospecting activity observed for a customer around `now`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementSignals {
    pub has_active_outreach_plan: bool,
    pub has_recent_activity: bool,
}

impl EngagementSignals {
    pub fn is_actively_worked(&self) -> bool {
        self.has_active_outreach_plan || self.has_recent_activity
    }
}

/// Everything the classifier reads for one customer. Orders are delivered
/// orders, newest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub record: CustomerHealthRecord,
    pub orders: Vec<DeliveredOrder>,
    pub engagement: EngagementSignals,
}
