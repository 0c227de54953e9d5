use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use cadence_core::domain::customer::{AccountPriority, AccountType, HealthState, RiskStatus, TenantId};
use cadence_core::domain::threshold::{ThresholdConfig, ThresholdRule, ThresholdRuleId};

use crate::connection::DbPool;
use crate::repositories::{encode_timestamp, RepositoryError, SqlThresholdRepository, ThresholdRuleRepository};

pub const DEMO_TENANT_ID: &str = "tenant-default";
pub const DEMO_TENANT_SLUG: &str = "default";

/// One demo customer and the status an assessment at load time must assign it.
#[derive(Debug, Clone, Copy)]
struct SeedCustomerContract {
    customer_id: &'static str,
    name: &'static str,
    account_type: Option<AccountType>,
    account_priority: Option<AccountPriority>,
    established_revenue: Option<i64>,
    created_days_ago: i64,
    /// Delivered orders as (days ago, total).
    orders: &'static [(i64, i64)],
    recent_activity: bool,
    outreach: Option<&'static str>,
    starts_dormant: bool,
    closed: bool,
    expected_status: Option<RiskStatus>,
    description: &'static str,
}

const SEED_CUSTOMERS: &[SeedCustomerContract] = &[
    SeedCustomerContract {
        customer_id: "cust-harbor-bistro",
        name: "Harbor Bistro",
        account_type: Some(AccountType::Active),
        account_priority: Some(AccountPriority::High),
        established_revenue: Some(500),
        created_days_ago: 400,
        orders: &[(5, 520), (35, 480), (65, 510), (95, 500)],
        recent_activity: false,
        outreach: None,
        starts_dormant: false,
        closed: false,
        expected_status: Some(RiskStatus::Healthy),
        description: "Monthly orderer on pace",
    },
    SeedCustomerContract {
        customer_id: "cust-corner-deli",
        name: "Corner Deli",
        account_type: Some(AccountType::Active),
        account_priority: Some(AccountPriority::Medium),
        established_revenue: Some(300),
        created_days_ago: 300,
        orders: &[(50, 300), (80, 310), (110, 290)],
        recent_activity: false,
        outreach: None,
        starts_dormant: false,
        closed: false,
        expected_status: Some(RiskStatus::AtRiskCadence),
        description: "Past the cadence baseline, inside grace",
    },
    SeedCustomerContract {
        customer_id: "cust-fig-and-olive",
        name: "Fig & Olive",
        account_type: Some(AccountType::Active),
        account_priority: Some(AccountPriority::High),
        established_revenue: Some(1000),
        created_days_ago: 500,
        orders: &[(10, 200), (40, 210), (70, 190)],
        recent_activity: false,
        outreach: None,
        starts_dormant: false,
        closed: false,
        expected_status: Some(RiskStatus::AtRiskRevenue),
        description: "On pace but spending far below established revenue",
    },
    SeedCustomerContract {
        customer_id: "cust-lighthouse-cafe",
        name: "Lighthouse Cafe",
        account_type: Some(AccountType::Active),
        account_priority: Some(AccountPriority::Medium),
        established_revenue: None,
        created_days_ago: 600,
        orders: &[(75, 250), (105, 260), (135, 240)],
        recent_activity: false,
        outreach: None,
        starts_dormant: false,
        closed: false,
        expected_status: Some(RiskStatus::Dormant),
        description: "Beyond the dormancy threshold",
    },
    SeedCustomerContract {
        customer_id: "cust-mill-street-bakery",
        name: "Mill Street Bakery",
        account_type: Some(AccountType::Active),
        account_priority: Some(AccountPriority::High),
        established_revenue: None,
        created_days_ago: 700,
        orders: &[(3, 410), (100, 400), (130, 420)],
        recent_activity: false,
        outreach: None,
        starts_dormant: true,
        closed: false,
        expected_status: Some(RiskStatus::Healthy),
        description: "Stored as dormant, ordered again three days ago",
    },
    SeedCustomerContract {
        customer_id: "cust-north-end-grill",
        name: "North End Grill",
        account_type: Some(AccountType::Target),
        account_priority: Some(AccountPriority::Low),
        established_revenue: None,
        created_days_ago: 365,
        orders: &[(50, 150), (80, 140), (110, 160)],
        recent_activity: false,
        outreach: None,
        starts_dormant: false,
        closed: false,
        expected_status: Some(RiskStatus::Healthy),
        description: "Low priority rule widens the cadence floor to 60 days",
    },
    SeedCustomerContract {
        customer_id: "cust-pier-noodle-bar",
        name: "Pier Noodle Bar",
        account_type: Some(AccountType::Prospect),
        account_priority: None,
        established_revenue: None,
        created_days_ago: 20,
        orders: &[],
        recent_activity: true,
        outreach: None,
        starts_dormant: false,
        closed: false,
        expected_status: Some(RiskStatus::Prospect),
        description: "New prospect with recent activity",
    },
    SeedCustomerContract {
        customer_id: "cust-quarry-tavern",
        name: "Quarry Tavern",
        account_type: Some(AccountType::Prospect),
        account_priority: None,
        established_revenue: None,
        created_days_ago: 120,
        orders: &[],
        recent_activity: false,
        outreach: Some("CONTACTED"),
        starts_dormant: false,
        closed: false,
        expected_status: Some(RiskStatus::ProspectCold),
        description: "Worked through outreach but past the warm window",
    },
    SeedCustomerContract {
        customer_id: "cust-river-oyster-co",
        name: "River Oyster Co",
        account_type: Some(AccountType::Prospect),
        account_priority: None,
        established_revenue: None,
        created_days_ago: 400,
        orders: &[],
        recent_activity: false,
        outreach: Some("REJECTED"),
        starts_dormant: false,
        closed: false,
        expected_status: Some(RiskStatus::Unqualified),
        description: "Old prospect nobody is working",
    },
    SeedCustomerContract {
        customer_id: "cust-sunset-diner",
        name: "Sunset Diner",
        account_type: Some(AccountType::Active),
        account_priority: Some(AccountPriority::Medium),
        established_revenue: None,
        created_days_ago: 900,
        orders: &[(200, 330)],
        recent_activity: false,
        outreach: None,
        starts_dormant: false,
        closed: true,
        expected_status: None,
        description: "Permanently closed, never assessed",
    },
];

const DEMO_OUTREACH_PLAN_ID: &str = "plan-spring-tasting";

/// Deterministic demo tenant covering every risk status. Timestamps are laid
/// out relative to the `now` passed to [`DemoSeedDataset::load`].
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Replaces any previous copy of the demo tenant.
    pub async fn load(pool: &DbPool, now: DateTime<Utc>) -> Result<SeedResult, RepositoryError> {
        Self::clean(pool).await?;

        let writer = SeedWriter::new(pool.clone());
        writer.tenant(DEMO_TENANT_ID, DEMO_TENANT_SLUG, Some("Default Distributor"), now - Duration::days(1000)).await?;
        writer
            .outreach_plan(DEMO_OUTREACH_PLAN_ID, DEMO_TENANT_ID, "Spring tasting menu", "ACTIVE", now - Duration::days(14))
            .await?;

        for contract in SEED_CUSTOMERS {
            let created_at = now - Duration::days(contract.created_days_ago);
            let health = if contract.starts_dormant {
                HealthState {
                    risk_status: RiskStatus::Dormant,
                    dormancy_since: Some(now - Duration::days(20)),
                    ..HealthState::new_prospect()
                }
            } else {
                HealthState::new_prospect()
            };
            writer
                .customer(&CustomerSeed {
                    account_type: contract.account_type,
                    account_priority: contract.account_priority,
                    established_revenue: contract.established_revenue.map(Decimal::from),
                    is_permanently_closed: contract.closed,
                    health,
                    ..CustomerSeed::new(contract.customer_id, DEMO_TENANT_ID, contract.name, created_at)
                })
                .await?;

            for (index, (days_ago, total)) in contract.orders.iter().enumerate() {
                writer
                    .order(&OrderSeed::delivered(
                        &format!("{}-ord-{index}", contract.customer_id),
                        DEMO_TENANT_ID,
                        contract.customer_id,
                        now - Duration::days(*days_ago),
                        Some(Decimal::from(*total)),
                    ))
                    .await?;
            }

            if contract.recent_activity {
                writer
                    .activity(
                        &format!("{}-act-0", contract.customer_id),
                        DEMO_TENANT_ID,
                        contract.customer_id,
                        now - Duration::days(4),
                    )
                    .await?;
            }
            if let Some(status) = contract.outreach {
                writer.outreach_member(DEMO_OUTREACH_PLAN_ID, contract.customer_id, status).await?;
            }
        }

        let thresholds = SqlThresholdRepository::new(pool.clone());
        thresholds
            .upsert_rule(ThresholdRule {
                id: ThresholdRuleId("threshold-default-low".to_string()),
                tenant_id: TenantId(DEMO_TENANT_ID.to_string()),
                account_type: None,
                account_priority: Some(AccountPriority::Low),
                config: ThresholdConfig {
                    dormant_days: 60,
                    grace_period_percent: Decimal::new(30, 2),
                    min_grace_days: 10,
                    revenue_decline_percent: Decimal::new(20, 2),
                },
                updated_at: now,
            })
            .await?;

        Ok(SeedResult {
            tenant_id: DEMO_TENANT_ID,
            tenant_slug: DEMO_TENANT_SLUG,
            customers_seeded: SEED_CUSTOMERS
                .iter()
                .map(|contract| CustomerSeedInfo {
                    customer_id: contract.customer_id,
                    name: contract.name,
                    expected_status: contract.expected_status,
                    description: contract.description,
                })
                .collect(),
            threshold_rules: 1,
        })
    }

    /// Checks that every seeded row is present.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let tenant_exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tenant WHERE id = ?1 AND slug = ?2)")
                .bind(DEMO_TENANT_ID)
                .bind(DEMO_TENANT_SLUG)
                .fetch_one(pool)
                .await?;
        checks.push(("tenant".to_string(), tenant_exists == 1));

        for contract in SEED_CUSTOMERS {
            let customer_exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM customer WHERE id = ?1 AND tenant_id = ?2 AND is_permanently_closed = ?3)",
            )
            .bind(contract.customer_id)
            .bind(DEMO_TENANT_ID)
            .bind(contract.closed)
            .fetch_one(pool)
            .await?;
            checks.push((contract.customer_id.to_string(), customer_exists == 1));

            let order_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM customer_order WHERE customer_id = ?1")
                    .bind(contract.customer_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((
                format!("{}-orders", contract.customer_id),
                order_count == contract.orders.len() as i64,
            ));
        }

        let rule_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM health_threshold WHERE tenant_id = ?1")
                .bind(DEMO_TENANT_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("threshold-rules".to_string(), rule_count == 1));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo tenant; its rows cascade.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM tenant WHERE id = ?1").bind(DEMO_TENANT_ID).execute(pool).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub tenant_id: &'static str,
    pub tenant_slug: &'static str,
    pub customers_seeded: Vec<CustomerSeedInfo>,
    pub threshold_rules: usize,
}

#[derive(Debug, Serialize)]
pub struct CustomerSeedInfo {
    pub customer_id: &'static str,
    pub name: &'static str,
    /// `None` for customers the assessment skips.
    pub expected_status: Option<RiskStatus>,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}

#[derive(Debug, Clone)]
pub struct CustomerSeed {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub account_type: Option<AccountType>,
    pub account_priority: Option<AccountPriority>,
    pub established_revenue: Option<Decimal>,
    pub is_permanently_closed: bool,
    pub created_at: DateTime<Utc>,
    pub health: HealthState,
}

impl CustomerSeed {
    pub fn new(id: &str, tenant_id: &str, name: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            account_type: None,
            account_priority: None,
            established_revenue: None,
            is_permanently_closed: false,
            created_at,
            health: HealthState::new_prospect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderSeed {
    pub id: String,
    pub tenant_id: String,
    pub customer_id: String,
    pub status: &'static str,
    pub total: Option<Decimal>,
    pub ordered_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OrderSeed {
    pub fn delivered(
        id: &str,
        tenant_id: &str,
        customer_id: &str,
        delivered_at: DateTime<Utc>,
        total: Option<Decimal>,
    ) -> Self {
        Self {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            customer_id: customer_id.to_string(),
            status: "DELIVERED",
            total,
            ordered_at: Some(delivered_at - Duration::days(2)),
            delivered_at: Some(delivered_at),
        }
    }
}

/// Row-level inserts for fixtures and tests. Writes bypass the repositories so
/// tests can set up states the engine itself would never produce.
#[derive(Clone)]
pub struct SeedWriter {
    pool: DbPool,
}

impl SeedWriter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn tenant(
        &self,
        id: &str,
        slug: &str,
        name: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO tenant (id, slug, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(slug)
            .bind(name)
            .bind(encode_timestamp(&created_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn customer(&self, seed: &CustomerSeed) -> Result<(), RepositoryError> {
        let created_at = encode_timestamp(&seed.created_at);
        let health = &seed.health;
        sqlx::query(
            "INSERT INTO customer (
                id, tenant_id, name, account_type, account_priority, established_revenue,
                is_permanently_closed, risk_status, last_order_date, next_expected_order_date,
                average_order_interval_days, ordering_pace_days, dormancy_since, reactivated_date,
                revision, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&seed.id)
        .bind(&seed.tenant_id)
        .bind(&seed.name)
        .bind(seed.account_type.map(|value| value.as_str()))
        .bind(seed.account_priority.map(|value| value.as_str()))
        .bind(seed.established_revenue.map(|value| value.to_string()))
        .bind(seed.is_permanently_closed)
        .bind(health.risk_status.as_str())
        .bind(health.last_order_date.as_ref().map(encode_timestamp))
        .bind(health.next_expected_order_date.as_ref().map(encode_timestamp))
        .bind(health.average_order_interval_days)
        .bind(health.ordering_pace_days)
        .bind(health.dormancy_since.as_ref().map(encode_timestamp))
        .bind(health.reactivated_date.as_ref().map(encode_timestamp))
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn order(&self, seed: &OrderSeed) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customer_order (id, tenant_id, customer_id, status, total, ordered_at, delivered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&seed.id)
        .bind(&seed.tenant_id)
        .bind(&seed.customer_id)
        .bind(seed.status)
        .bind(seed.total.map(|value| value.to_string()))
        .bind(seed.ordered_at.as_ref().map(encode_timestamp))
        .bind(seed.delivered_at.as_ref().map(encode_timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrites an order total with arbitrary text.
    pub async fn raw_order_total(&self, order_id: &str, raw: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE customer_order SET total = ? WHERE id = ?")
            .bind(raw)
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn activity(
        &self,
        id: &str,
        tenant_id: &str,
        customer_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO activity (id, tenant_id, customer_id, subject, occurred_at)
             VALUES (?, ?, ?, 'Tasting visit', ?)",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(customer_id)
        .bind(encode_timestamp(&occurred_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn outreach_plan(
        &self,
        id: &str,
        tenant_id: &str,
        name: &str,
        status: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO outreach_plan (id, tenant_id, name, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(name)
        .bind(status)
        .bind(encode_timestamp(&created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn outreach_member(
        &self,
        plan_id: &str,
        customer_id: &str,
        status: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO outreach_plan_account (plan_id, customer_id, status) VALUES (?, ?, ?)")
            .bind(plan_id)
            .bind(customer_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
