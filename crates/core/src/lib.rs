pub mod config;
pub mod domain;
pub mod errors;
pub mod health;

pub use domain::customer::{
    AccountPriority, AccountType, CustomerHealthRecord, CustomerId, CustomerSnapshot,
    DeliveredOrder, EngagementSignals, HealthState, RiskStatus, Segment, Tenant, TenantId,
    TenantSelector,
};
pub use domain::threshold::{
    ResolvedThresholds, SpecificityTier, ThresholdConfig, ThresholdRule, ThresholdRuleId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use health::{
    AssessmentSummary, BatchRunOptions, CustomerHealthStore, HealthAssessmentJob, HealthSummary,
    OrderDeliveredEvent, RealTimeHealthUpdater, RealtimeOutcome, RevenueCalcPolicy, StopSignal,
    ThresholdCacheBus, ThresholdResolver, ThresholdStore,
};
