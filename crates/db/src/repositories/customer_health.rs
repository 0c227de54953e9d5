use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use cadence_core::domain::customer::{
    AccountPriority, AccountType, CustomerHealthRecord, CustomerId, CustomerSnapshot,
    DeliveredOrder, EngagementSignals, HealthState, RiskStatus, Segment, Tenant, TenantId,
    TenantSelector,
};
use cadence_core::errors::ApplicationError;
use cadence_core::health::classifier::ENGAGEMENT_LOOKBACK_DAYS;
use cadence_core::health::store::{CustomerHealthStore, HealthUpdate, SaveOutcome, SnapshotError};
use cadence_core::health::ORDER_HISTORY_LIMIT;

use super::{
    decode_decimal, decode_optional_timestamp, decode_timestamp, encode_timestamp, RepositoryError,
};
use crate::DbPool;

const CUSTOMER_COLUMNS: &str = "c.id, c.tenant_id, c.name, c.account_type, c.account_priority,
    c.established_revenue, c.is_permanently_closed, c.risk_status, c.last_order_date,
    c.next_expected_order_date, c.average_order_interval_days, c.ordering_pace_days,
    c.dormancy_since, c.reactivated_date, c.revision, c.created_at, c.updated_at";

#[derive(Clone)]
pub struct SqlCustomerHealthRepository {
    pool: DbPool,
}

impl SqlCustomerHealthRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// The persisted record regardless of closure, for read-only views.
    pub async fn find_record(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerHealthRecord>, RepositoryError> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customer c WHERE c.tenant_id = ? AND c.id = ?");
        let row = sqlx::query(&sql)
            .bind(&tenant_id.0)
            .bind(&customer_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_record(row).map_err(RepositoryError::Decode)?)),
            None => Ok(None),
        }
    }

    async fn fetch_tenant(&self, selector: &TenantSelector) -> Result<Option<Tenant>, RepositoryError> {
        let row = match selector {
            TenantSelector::Id(id) => {
                sqlx::query("SELECT id, slug, name FROM tenant WHERE id = ?")
                    .bind(&id.0)
                    .fetch_optional(&self.pool)
                    .await?
            }
            TenantSelector::Slug(slug) => {
                sqlx::query("SELECT id, slug, name FROM tenant WHERE slug = ?")
                    .bind(slug)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        match row {
            Some(ref row) => Ok(Some(row_to_tenant(row)?)),
            None => Ok(None),
        }
    }

    async fn fetch_page(
        &self,
        tenant_id: &TenantId,
        after: Option<&CustomerId>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Result<CustomerSnapshot, SnapshotError>>, RepositoryError> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer c
             WHERE c.tenant_id = ? AND c.is_permanently_closed = 0 AND (? IS NULL OR c.id > ?)
             ORDER BY c.id
             LIMIT ?"
        );
        let after = after.map(|id| id.0.as_str());
        let rows = sqlx::query(&sql)
            .bind(&tenant_id.0)
            .bind(after)
            .bind(after)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        self.assemble(tenant_id, &rows, now).await
    }

    async fn fetch_one(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Option<Result<CustomerSnapshot, SnapshotError>>, RepositoryError> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer c
             WHERE c.tenant_id = ? AND c.id = ? AND c.is_permanently_closed = 0"
        );
        let rows = sqlx::query(&sql)
            .bind(&tenant_id.0)
            .bind(&customer_id.0)
            .fetch_all(&self.pool)
            .await?;

        Ok(self.assemble(tenant_id, &rows, now).await?.into_iter().next())
    }

    /// Joins customer rows with their order history and engagement. Rows are
    /// ordered by id, so the page is exactly the customers in
    /// `[first.id, last.id]` that are not closed.
    async fn assemble(
        &self,
        tenant_id: &TenantId,
        rows: &[SqliteRow],
        now: DateTime<Utc>,
    ) -> Result<Vec<Result<CustomerSnapshot, SnapshotError>>, RepositoryError> {
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            ids.push(id);
        }
        let (Some(first), Some(last)) = (ids.first(), ids.last()) else {
            return Ok(Vec::new());
        };

        let mut orders = self.fetch_orders(tenant_id, first, last, now).await?;
        let active_recently = self.fetch_recent_activity(tenant_id, first, last, now).await?;
        let in_outreach = self.fetch_outreach_members(tenant_id, first, last).await?;

        let snapshots = rows
            .iter()
            .zip(ids)
            .map(|(row, id)| -> Result<CustomerSnapshot, SnapshotError> {
                let customer_id = CustomerId(id.clone());
                let failed = |reason: String| SnapshotError { customer_id: customer_id.clone(), reason };

                let record = row_to_record(row).map_err(failed)?;
                let history = orders
                    .remove(&id)
                    .unwrap_or_default()
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(failed)?;
                let engagement = EngagementSignals {
                    has_active_outreach_plan: in_outreach.contains(&id),
                    has_recent_activity: active_recently.contains(&id),
                };
                Ok(CustomerSnapshot { record, orders: history, engagement })
            })
            .collect();

        Ok(snapshots)
    }

    async fn fetch_orders(
        &self,
        tenant_id: &TenantId,
        first: &str,
        last: &str,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<Result<DeliveredOrder, String>>>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT customer_id, id, delivered_at, total FROM (
                 SELECT o.customer_id, o.id, o.delivered_at, o.total,
                        ROW_NUMBER() OVER (
                            PARTITION BY o.customer_id
                            ORDER BY o.delivered_at DESC, o.id DESC
                        ) AS position
                 FROM customer_order o
                 JOIN customer c ON c.id = o.customer_id
                 WHERE c.tenant_id = ? AND c.is_permanently_closed = 0
                   AND c.id BETWEEN ? AND ?
                   AND o.delivered_at IS NOT NULL AND o.delivered_at <= ?
             )
             WHERE position <= ?
             ORDER BY customer_id, position",
        )
        .bind(&tenant_id.0)
        .bind(first)
        .bind(last)
        .bind(encode_timestamp(&now))
        .bind(ORDER_HISTORY_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut orders: HashMap<String, Vec<Result<DeliveredOrder, String>>> = HashMap::new();
        for row in &rows {
            let customer_id: String =
                row.try_get("customer_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            orders.entry(customer_id).or_default().push(row_to_order(row));
        }
        Ok(orders)
    }

    async fn fetch_recent_activity(
        &self,
        tenant_id: &TenantId,
        first: &str,
        last: &str,
        now: DateTime<Utc>,
    ) -> Result<HashSet<String>, RepositoryError> {
        let since = now - Duration::days(ENGAGEMENT_LOOKBACK_DAYS);
        let rows = sqlx::query(
            "SELECT DISTINCT a.customer_id
             FROM activity a
             JOIN customer c ON c.id = a.customer_id
             WHERE c.tenant_id = ? AND c.id BETWEEN ? AND ?
               AND a.occurred_at >= ? AND a.occurred_at <= ?",
        )
        .bind(&tenant_id.0)
        .bind(first)
        .bind(last)
        .bind(encode_timestamp(&since))
        .bind(encode_timestamp(&now))
        .fetch_all(&self.pool)
        .await?;

        collect_ids(&rows)
    }

    async fn fetch_outreach_members(
        &self,
        tenant_id: &TenantId,
        first: &str,
        last: &str,
    ) -> Result<HashSet<String>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT DISTINCT m.customer_id
             FROM outreach_plan_account m
             JOIN outreach_plan p ON p.id = m.plan_id
             JOIN customer c ON c.id = m.customer_id
             WHERE c.tenant_id = ? AND c.id BETWEEN ? AND ?
               AND p.status = 'ACTIVE' AND m.status <> 'REJECTED'",
        )
        .bind(&tenant_id.0)
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await?;

        collect_ids(&rows)
    }

    async fn write_updates(
        &self,
        updates: &[HealthUpdate],
        now: DateTime<Utc>,
    ) -> Result<Vec<SaveOutcome>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let updated_at = encode_timestamp(&now);
        let mut outcomes = Vec::with_capacity(updates.len());

        for update in updates {
            let state = &update.state;
            let result = sqlx::query(
                "UPDATE customer SET
                     risk_status = ?,
                     last_order_date = ?,
                     next_expected_order_date = ?,
                     average_order_interval_days = ?,
                     ordering_pace_days = ?,
                     dormancy_since = ?,
                     reactivated_date = ?,
                     revision = revision + 1,
                     updated_at = ?
                 WHERE id = ? AND tenant_id = ? AND revision = ?",
            )
            .bind(state.risk_status.as_str())
            .bind(state.last_order_date.as_ref().map(encode_timestamp))
            .bind(state.next_expected_order_date.as_ref().map(encode_timestamp))
            .bind(state.average_order_interval_days)
            .bind(state.ordering_pace_days)
            .bind(state.dormancy_since.as_ref().map(encode_timestamp))
            .bind(state.reactivated_date.as_ref().map(encode_timestamp))
            .bind(&updated_at)
            .bind(&update.customer_id.0)
            .bind(&update.tenant_id.0)
            .bind(update.expected_revision)
            .execute(&mut *tx)
            .await?;

            outcomes.push(if result.rows_affected() == 1 {
                SaveOutcome::Saved
            } else {
                SaveOutcome::Conflict
            });
        }

        tx.commit().await?;
        Ok(outcomes)
    }
}

#[async_trait]
impl CustomerHealthStore for SqlCustomerHealthRepository {
    async fn find_tenant(&self, selector: &TenantSelector) -> Result<Option<Tenant>, ApplicationError> {
        Ok(self.fetch_tenant(selector).await?)
    }

    async fn load_snapshots(
        &self,
        tenant_id: &TenantId,
        after: Option<&CustomerId>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Result<CustomerSnapshot, SnapshotError>>, ApplicationError> {
        Ok(self.fetch_page(tenant_id, after, limit, now).await?)
    }

    async fn load_snapshot(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Option<Result<CustomerSnapshot, SnapshotError>>, ApplicationError> {
        Ok(self.fetch_one(tenant_id, customer_id, now).await?)
    }

    async fn save_health(
        &self,
        updates: &[HealthUpdate],
        now: DateTime<Utc>,
    ) -> Result<Vec<SaveOutcome>, ApplicationError> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.write_updates(updates, now).await?)
    }
}

fn collect_ids(rows: &[SqliteRow]) -> Result<HashSet<String>, RepositoryError> {
    rows.iter()
        .map(|row| row.try_get::<String, _>("customer_id"))
        .collect::<Result<HashSet<_>, _>>()
        .map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_tenant(row: &SqliteRow) -> Result<Tenant, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let slug: String = row.try_get("slug").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: Option<String> =
        row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(Tenant { id: TenantId(id), slug, name })
}

fn row_to_order(row: &SqliteRow) -> Result<DeliveredOrder, String> {
    let id: String = row.try_get("id").map_err(|e| e.to_string())?;
    let delivered_at: String = row.try_get("delivered_at").map_err(|e| e.to_string())?;
    let total: Option<String> = row.try_get("total").map_err(|e| e.to_string())?;

    Ok(DeliveredOrder {
        delivered_at: decode_timestamp("customer_order.delivered_at", &delivered_at)?,
        total: total
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| decode_decimal("customer_order.total", &raw))
            .transpose()?,
        id,
    })
}

fn row_to_record(row: &SqliteRow) -> Result<CustomerHealthRecord, String> {
    let id: String = row.try_get("id").map_err(|e| e.to_string())?;
    let tenant_id: String = row.try_get("tenant_id").map_err(|e| e.to_string())?;
    let name: String = row.try_get("name").map_err(|e| e.to_string())?;
    let account_type: Option<String> = row.try_get("account_type").map_err(|e| e.to_string())?;
    let account_priority: Option<String> =
        row.try_get("account_priority").map_err(|e| e.to_string())?;
    let established_revenue: Option<String> =
        row.try_get("established_revenue").map_err(|e| e.to_string())?;
    let is_permanently_closed: bool =
        row.try_get("is_permanently_closed").map_err(|e| e.to_string())?;
    let risk_status: String = row.try_get("risk_status").map_err(|e| e.to_string())?;
    let average_order_interval_days: Option<i64> =
        row.try_get("average_order_interval_days").map_err(|e| e.to_string())?;
    let ordering_pace_days: Option<i64> =
        row.try_get("ordering_pace_days").map_err(|e| e.to_string())?;
    let revision: i64 = row.try_get("revision").map_err(|e| e.to_string())?;
    let created_at: String = row.try_get("created_at").map_err(|e| e.to_string())?;
    let updated_at: String = row.try_get("updated_at").map_err(|e| e.to_string())?;

    let timestamp = |column: &str| -> Result<Option<DateTime<Utc>>, String> {
        let raw: Option<String> = row.try_get(column).map_err(|e| e.to_string())?;
        decode_optional_timestamp(column, raw)
    };

    let account_type = account_type
        .map(|raw| raw.parse::<AccountType>())
        .transpose()
        .map_err(|e| e.to_string())?;
    let account_priority = account_priority
        .map(|raw| raw.parse::<AccountPriority>())
        .transpose()
        .map_err(|e| e.to_string())?;

    Ok(CustomerHealthRecord {
        id: CustomerId(id),
        tenant_id: TenantId(tenant_id),
        name,
        segment: Segment::new(account_type, account_priority),
        established_revenue: established_revenue
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| decode_decimal("established_revenue", &raw))
            .transpose()?,
        is_permanently_closed,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
        revision,
        health: HealthState {
            risk_status: risk_status.parse::<RiskStatus>().map_err(|e| e.to_string())?,
            last_order_date: timestamp("last_order_date")?,
            next_expected_order_date: timestamp("next_expected_order_date")?,
            average_order_interval_days,
            ordering_pace_days,
            dormancy_since: timestamp("dormancy_since")?,
            reactivated_date: timestamp("reactivated_date")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use cadence_core::domain::customer::{
        AccountPriority, AccountType, CustomerId, HealthState, RiskStatus, TenantId,
        TenantSelector,
    };
    use cadence_core::health::store::{CustomerHealthStore, HealthUpdate, SaveOutcome};

    use super::SqlCustomerHealthRepository;
    use crate::fixtures::{CustomerSeed, OrderSeed, SeedWriter};
    use crate::{connect_in_memory, migrations};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 6, 0, 0).single().expect("valid date")
    }

    async fn setup() -> (SqlCustomerHealthRepository, SeedWriter) {
        let pool = connect_in_memory().await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let writer = SeedWriter::new(pool.clone());
        writer.tenant("t1", "acme", Some("Acme Foods"), now()).await.expect("tenant");
        (SqlCustomerHealthRepository::new(pool), writer)
    }

    fn tenant() -> TenantId {
        TenantId("t1".to_string())
    }

    #[tokio::test]
    async fn finds_tenant_by_id_or_slug() {
        let (repo, _) = setup().await;
        let by_slug = repo
            .find_tenant(&TenantSelector::Slug("acme".to_string()))
            .await
            .expect("query")
            .expect("tenant exists");
        assert_eq!(by_slug.id, tenant());
        assert_eq!(by_slug.display_name(), "Acme Foods");

        let missing =
            repo.find_tenant(&TenantSelector::Id(TenantId("t9".to_string()))).await.expect("query");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn snapshot_holds_newest_ten_delivered_orders_and_engagement() {
        let (repo, writer) = setup().await;
        writer
            .customer(&CustomerSeed {
                account_type: Some(AccountType::Active),
                account_priority: Some(AccountPriority::High),
                established_revenue: Some(Decimal::new(125_050, 2)),
                ..CustomerSeed::new("c1", "t1", "Harbor Bistro", now() - Duration::days(400))
            })
            .await
            .expect("customer");
        for day in 0..12 {
            writer
                .order(&OrderSeed::delivered(
                    &format!("o{day:02}"),
                    "t1",
                    "c1",
                    now() - Duration::days(5 + day * 20),
                    Some(Decimal::from(400 + day)),
                ))
                .await
                .expect("order");
        }
        writer
            .order(&OrderSeed {
                status: "PENDING",
                delivered_at: None,
                ..OrderSeed::delivered("open", "t1", "c1", now(), None)
            })
            .await
            .expect("pending order");
        writer.activity("a1", "t1", "c1", now() - Duration::days(3)).await.expect("activity");

        let snapshot = repo
            .load_snapshot(&tenant(), &CustomerId("c1".to_string()), now())
            .await
            .expect("query")
            .expect("customer exists")
            .expect("decodes");

        assert_eq!(snapshot.orders.len(), 10);
        assert_eq!(snapshot.orders[0].id, "o00");
        assert!(snapshot.orders.windows(2).all(|pair| pair[0].delivered_at > pair[1].delivered_at));
        assert_eq!(snapshot.record.established_revenue, Some(Decimal::new(125_050, 2)));
        assert_eq!(snapshot.record.segment.account_priority, Some(AccountPriority::High));
        assert!(snapshot.engagement.has_recent_activity);
        assert!(!snapshot.engagement.has_active_outreach_plan);
    }

    #[tokio::test]
    async fn rejected_outreach_membership_is_not_engagement() {
        let (repo, writer) = setup().await;
        for id in ["c1", "c2"] {
            writer
                .customer(&CustomerSeed::new(id, "t1", id, now() - Duration::days(20)))
                .await
                .expect("customer");
        }
        writer.outreach_plan("p1", "t1", "Spring push", "ACTIVE", now()).await.expect("plan");
        writer.outreach_member("p1", "c1", "CONTACTED").await.expect("member");
        writer.outreach_member("p1", "c2", "REJECTED").await.expect("member");

        let page = repo.load_snapshots(&tenant(), None, 10, now()).await.expect("query");
        let engaged: Vec<bool> = page
            .into_iter()
            .map(|item| item.expect("decodes").engagement.has_active_outreach_plan)
            .collect();
        assert_eq!(engaged, vec![true, false]);
    }

    #[tokio::test]
    async fn pages_by_id_and_skips_closed_customers() {
        let (repo, writer) = setup().await;
        for id in ["c1", "c2", "c3", "c4"] {
            writer
                .customer(&CustomerSeed {
                    is_permanently_closed: id == "c2",
                    ..CustomerSeed::new(id, "t1", id, now() - Duration::days(20))
                })
                .await
                .expect("customer");
        }

        let first = repo.load_snapshots(&tenant(), None, 2, now()).await.expect("page 1");
        let first_ids: Vec<String> =
            first.iter().map(|item| item.as_ref().expect("decodes").record.id.0.clone()).collect();
        assert_eq!(first_ids, vec!["c1", "c3"]);

        let after = CustomerId("c3".to_string());
        let second = repo.load_snapshots(&tenant(), Some(&after), 2, now()).await.expect("page 2");
        assert_eq!(second.len(), 1);

        let closed =
            repo.load_snapshot(&tenant(), &CustomerId("c2".to_string()), now()).await.expect("query");
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn malformed_order_total_fails_only_that_customer() {
        let (repo, writer) = setup().await;
        for id in ["c1", "c2"] {
            writer
                .customer(&CustomerSeed::new(id, "t1", id, now() - Duration::days(200)))
                .await
                .expect("customer");
        }
        writer
            .order(&OrderSeed::delivered("o1", "t1", "c1", now() - Duration::days(3), None))
            .await
            .expect("order");
        writer.raw_order_total("o1", "twelve").await.expect("corrupt total");

        let page = repo.load_snapshots(&tenant(), None, 10, now()).await.expect("query");
        assert_eq!(page.len(), 2);
        let failure = page[0].as_ref().expect_err("c1 is malformed");
        assert_eq!(failure.customer_id, CustomerId("c1".to_string()));
        assert!(page[1].is_ok());

        let single = repo
            .load_snapshot(&tenant(), &CustomerId("c1".to_string()), now())
            .await
            .expect("decode failures are not store errors")
            .expect("customer exists");
        let failure = single.expect_err("c1 is malformed");
        assert!(failure.reason.contains("twelve"));
    }

    #[tokio::test]
    async fn any_order_with_a_delivery_date_counts_regardless_of_status() {
        let (repo, writer) = setup().await;
        writer
            .customer(&CustomerSeed::new("c1", "t1", "c1", now() - Duration::days(200)))
            .await
            .expect("customer");
        for (id, status, days_ago) in [("f1", "FULFILLED", 3), ("p1", "PARTIALLY_FULFILLED", 30)] {
            writer
                .order(&OrderSeed {
                    status,
                    ..OrderSeed::delivered(id, "t1", "c1", now() - Duration::days(days_ago), None)
                })
                .await
                .expect("order");
        }
        writer
            .order(&OrderSeed {
                status: "FULFILLED",
                delivered_at: None,
                ..OrderSeed::delivered("undelivered", "t1", "c1", now(), None)
            })
            .await
            .expect("order");

        let snapshot = repo
            .load_snapshot(&tenant(), &CustomerId("c1".to_string()), now())
            .await
            .expect("query")
            .expect("customer exists")
            .expect("decodes");

        let ids: Vec<&str> = snapshot.orders.iter().map(|order| order.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "p1"]);
    }

    #[tokio::test]
    async fn save_is_guarded_by_revision() {
        let (repo, writer) = setup().await;
        writer
            .customer(&CustomerSeed::new("c1", "t1", "c1", now() - Duration::days(20)))
            .await
            .expect("customer");

        let state = HealthState {
            risk_status: RiskStatus::Dormant,
            last_order_date: Some(now() - Duration::days(70)),
            dormancy_since: Some(now()),
            ..HealthState::new_prospect()
        };
        let update = HealthUpdate {
            tenant_id: tenant(),
            customer_id: CustomerId("c1".to_string()),
            expected_revision: 0,
            state: state.clone(),
        };

        let first = repo.save_health(&[update.clone()], now()).await.expect("save");
        let stale = repo.save_health(&[update], now()).await.expect("save");
        assert_eq!(first, vec![SaveOutcome::Saved]);
        assert_eq!(stale, vec![SaveOutcome::Conflict]);

        let record = repo
            .find_record(&tenant(), &CustomerId("c1".to_string()))
            .await
            .expect("query")
            .expect("exists");
        assert_eq!(record.revision, 1);
        assert_eq!(record.health, state);
        assert_eq!(record.updated_at, now());
    }
}
