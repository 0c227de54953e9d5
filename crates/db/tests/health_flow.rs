use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use cadence_core::domain::customer::{
    AccountPriority, CustomerId, HealthState, RiskStatus, TenantId, TenantSelector,
};
use cadence_core::health::{
    BatchRunOptions, HealthAssessmentJob, OrderDeliveredEvent, RealTimeHealthUpdater,
    RealtimeOutcome, RevenueCalcPolicy, StopSignal, ThresholdResolver,
};
use cadence_db::fixtures::{CustomerSeed, DemoSeedDataset, OrderSeed, SeedWriter, DEMO_TENANT_ID};
use cadence_db::{connect_in_memory, migrations, DbPool, SqlCustomerHealthRepository, SqlThresholdRepository};

type Job = HealthAssessmentJob<Arc<SqlCustomerHealthRepository>, Arc<SqlThresholdRepository>>;
type Updater = RealTimeHealthUpdater<Arc<SqlCustomerHealthRepository>, Arc<SqlThresholdRepository>>;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 6, 0, 0).single().expect("valid date")
}

struct Harness {
    pool: DbPool,
    customers: Arc<SqlCustomerHealthRepository>,
    job: Job,
    updater: Updater,
}

async fn harness() -> Harness {
    let pool = connect_in_memory().await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");

    let customers = Arc::new(SqlCustomerHealthRepository::new(pool.clone()));
    let resolver = Arc::new(ThresholdResolver::new(Arc::new(SqlThresholdRepository::new(pool.clone()))));
    let job = HealthAssessmentJob::new(customers.clone(), resolver.clone());
    let updater = RealTimeHealthUpdater::new(customers.clone(), resolver, RevenueCalcPolicy::default());

    Harness { pool, customers, job, updater }
}

async fn health_of(harness: &Harness, tenant: &str, customer: &str) -> HealthState {
    harness
        .customers
        .find_record(&TenantId(tenant.to_string()), &CustomerId(customer.to_string()))
        .await
        .expect("query")
        .expect("customer exists")
        .health
}

#[tokio::test]
async fn demo_dataset_assessment_matches_seed_contract() {
    let harness = harness().await;
    let seeded = DemoSeedDataset::load(&harness.pool, now()).await.expect("seed");

    let options = BatchRunOptions { chunk_size: 3, ..BatchRunOptions::new(TenantSelector::Slug("default".to_string())) };
    let summary = harness
        .job
        .run(&options, now(), &StopSignal::new())
        .await
        .expect("run")
        .expect("demo tenant exists");

    let assessed = seeded.customers_seeded.iter().filter(|customer| customer.expected_status.is_some()).count();
    assert_eq!(summary.analyzed, assessed);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.conflicts, 0);
    assert_eq!(summary.reactivated, 1);
    assert_eq!(summary.chunks, 3);

    for customer in &seeded.customers_seeded {
        let health = health_of(&harness, DEMO_TENANT_ID, customer.customer_id).await;
        match customer.expected_status {
            Some(expected) => assert_eq!(
                health.risk_status, expected,
                "{} ({})",
                customer.customer_id, customer.description
            ),
            None => assert_eq!(health, HealthState::new_prospect(), "closed customers stay untouched"),
        }
    }

    let rerun = harness.job.run(&options, now(), &StopSignal::new()).await.expect("rerun").expect("tenant");
    assert_eq!(rerun.updated, 0);
    assert_eq!(rerun.unchanged, assessed);
}

#[tokio::test]
async fn forty_day_orderer_seventy_days_out_goes_dormant() {
    let harness = harness().await;
    let writer = SeedWriter::new(harness.pool.clone());
    writer.tenant("t1", "acme", None, now() - Duration::days(900)).await.expect("tenant");
    writer
        .customer(&CustomerSeed::new("c1", "t1", "Wharf Kitchen", now() - Duration::days(800)))
        .await
        .expect("customer");
    for (index, days_ago) in [70, 110, 150, 190, 230].into_iter().enumerate() {
        writer
            .order(&OrderSeed::delivered(
                &format!("o{index}"),
                "t1",
                "c1",
                now() - Duration::days(days_ago),
                Some(Decimal::from(300)),
            ))
            .await
            .expect("order");
    }

    let summary = harness
        .job
        .run(&BatchRunOptions::new(TenantSelector::Id(TenantId("t1".to_string()))), now(), &StopSignal::new())
        .await
        .expect("run")
        .expect("tenant exists");
    assert_eq!(summary.newly_dormant, 1);

    let health = health_of(&harness, "t1", "c1").await;
    assert_eq!(health.risk_status, RiskStatus::Dormant);
    assert_eq!(health.average_order_interval_days, Some(40));
    assert_eq!(health.ordering_pace_days, Some(45));
    assert_eq!(health.dormancy_since, Some(now()));
    assert_eq!(health.next_expected_order_date, Some(now() - Duration::days(70) + Duration::days(45)));

    let later = now() + Duration::days(7);
    harness
        .job
        .run(&BatchRunOptions::new(TenantSelector::Id(TenantId("t1".to_string()))), later, &StopSignal::new())
        .await
        .expect("second run");
    assert_eq!(health_of(&harness, "t1", "c1").await.dormancy_since, Some(now()));
}

#[tokio::test]
async fn delivery_event_reactivates_a_dormant_customer() {
    let harness = harness().await;
    let writer = SeedWriter::new(harness.pool.clone());
    writer.tenant("t1", "acme", None, now() - Duration::days(900)).await.expect("tenant");
    writer
        .customer(&CustomerSeed {
            account_priority: Some(AccountPriority::Low),
            established_revenue: Some(Decimal::from(5000)),
            health: HealthState {
                risk_status: RiskStatus::Dormant,
                dormancy_since: Some(now() - Duration::days(30)),
                ..HealthState::new_prospect()
            },
            ..CustomerSeed::new("c1", "t1", "Wharf Kitchen", now() - Duration::days(800))
        })
        .await
        .expect("customer");
    for (index, days_ago) in [1, 40, 80].into_iter().enumerate() {
        writer
            .order(&OrderSeed::delivered(
                &format!("o{index}"),
                "t1",
                "c1",
                now() - Duration::days(days_ago),
                Some(Decimal::from(100)),
            ))
            .await
            .expect("order");
    }

    let event = OrderDeliveredEvent {
        tenant_id: TenantId("t1".to_string()),
        customer_id: CustomerId("c1".to_string()),
        order_id: "o0".to_string(),
        account_priority: Some(AccountPriority::Low),
    };
    let outcome = harness.updater.handle_order_delivered(&event, now()).await.expect("handle");

    // Low priority skips the revenue rule, so the steep decline does not count.
    assert_eq!(
        outcome,
        RealtimeOutcome::Updated {
            previous: RiskStatus::Dormant,
            risk_status: RiskStatus::Healthy,
            reactivated: true,
        }
    );
    let health = health_of(&harness, "t1", "c1").await;
    assert_eq!(health.dormancy_since, None);
    assert_eq!(health.reactivated_date, Some(now()));

    let unknown = OrderDeliveredEvent { customer_id: CustomerId("c404".to_string()), ..event };
    assert_eq!(harness.updater.handle_order_delivered(&unknown, now()).await.expect("handle"), RealtimeOutcome::NotFound);
}

#[tokio::test]
async fn malformed_order_total_is_a_classification_failure_on_both_paths() {
    let harness = harness().await;
    let writer = SeedWriter::new(harness.pool.clone());
    writer.tenant("t1", "acme", None, now() - Duration::days(900)).await.expect("tenant");
    writer
        .customer(&CustomerSeed::new("c1", "t1", "Harbor Grill", now() - Duration::days(300)))
        .await
        .expect("customer");
    writer
        .order(&OrderSeed::delivered("o1", "t1", "c1", now() - Duration::days(2), Some(Decimal::from(80))))
        .await
        .expect("order");
    writer.raw_order_total("o1", "twelve").await.expect("corrupt total");

    let event = OrderDeliveredEvent {
        tenant_id: TenantId("t1".to_string()),
        customer_id: CustomerId("c1".to_string()),
        order_id: "o1".to_string(),
        account_priority: None,
    };
    let outcome = harness.updater.handle_order_delivered(&event, now()).await.expect("not a store error");
    match outcome {
        RealtimeOutcome::ClassificationFailed { reason } => assert!(reason.contains("twelve"), "{reason}"),
        other => panic!("expected a classification failure, got {other:?}"),
    }
    assert_eq!(health_of(&harness, "t1", "c1").await, HealthState::new_prospect());

    let summary = harness
        .job
        .run(&BatchRunOptions::new(TenantSelector::Slug("acme".to_string())), now(), &StopSignal::new())
        .await
        .expect("run")
        .expect("tenant");
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.analyzed, 0);
}

#[tokio::test]
async fn batch_and_event_paths_persist_identical_state() {
    let histories: [&[i64]; 5] = [&[3, 33, 63], &[50, 80, 110], &[75, 105, 135], &[400, 800], &[]];
    let batch = harness().await;
    let realtime = harness().await;

    for target in [&batch, &realtime] {
        let writer = SeedWriter::new(target.pool.clone());
        writer.tenant("t1", "acme", None, now() - Duration::days(900)).await.expect("tenant");
        for (index, history) in histories.iter().enumerate() {
            let id = format!("c{index}");
            writer
                .customer(&CustomerSeed {
                    established_revenue: Some(Decimal::from(250)),
                    ..CustomerSeed::new(&id, "t1", &id, now() - Duration::days(60))
                })
                .await
                .expect("customer");
            for days_ago in history.iter() {
                writer
                    .order(&OrderSeed::delivered(
                        &format!("{id}-{days_ago}"),
                        "t1",
                        &id,
                        now() - Duration::days(*days_ago),
                        Some(Decimal::from(240)),
                    ))
                    .await
                    .expect("order");
            }
        }
    }

    batch
        .job
        .run(&BatchRunOptions::new(TenantSelector::Slug("acme".to_string())), now(), &StopSignal::new())
        .await
        .expect("run")
        .expect("tenant");

    for index in 0..histories.len() {
        let id = CustomerId(format!("c{index}"));
        realtime
            .updater
            .update_customer(&TenantId("t1".to_string()), &id, true, now())
            .await
            .expect("update");

        assert_eq!(
            health_of(&batch, "t1", &id.0).await,
            health_of(&realtime, "t1", &id.0).await,
            "paths diverged for {id}"
        );
    }
}
