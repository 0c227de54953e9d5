use std::env;
use std::sync::{Mutex, OnceLock};

use cadence_cli::commands::assess::AssessArgs;
use cadence_cli::commands::thresholds::{TenantArgs, ThresholdsCommand};
use cadence_cli::commands::{assess, config, migrate, seed, thresholds};
use cadence_core::config::LoadOptions;
use cadence_core::domain::customer::AccountPriority;
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_database(|_| {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn invalid_chunk_size_is_a_config_failure() {
    with_env(&[("CADENCE_ASSESSMENT_CHUNK_SIZE", "0")], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_expected_statuses_and_is_repeatable() {
    with_database(|_| {
        let first = seed::run(&LoadOptions::default());
        assert_eq!(first.exit_code, 0, "expected seed success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");

        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("  - cust-corner-deli -> AT_RISK_CADENCE"));
        assert!(message.contains("  - cust-sunset-diner -> skipped"));

        let second = seed::run(&LoadOptions::default());
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        assert_eq!(first_payload["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn assess_after_seed_reports_summary_counts() {
    with_database(|_| {
        assert_eq!(seed::run(&LoadOptions::default()).exit_code, 0);

        let args = AssessArgs { chunk_size: Some(4), ..AssessArgs::default() };
        let result = assess::run(&LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 0, "expected assessment success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "assess");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["tenant_slug"], "default");
        assert_eq!(payload["data"]["analyzed"], 9);
        assert_eq!(payload["data"]["failed"], 0);
        assert_eq!(payload["data"]["reactivated"], 1);
        assert_eq!(payload["data"]["by_status"]["dormant"], 1);
        assert_eq!(payload["data"]["chunks"], 3);

        let rerun = parse_payload(&assess::run(&LoadOptions::default(), &args).output);
        assert_eq!(rerun["data"]["updated"], 0);
    });
}

#[test]
fn assess_skips_unknown_tenant_without_failing() {
    with_database(|_| {
        let args = AssessArgs { tenant_slug: Some("nobody".to_string()), ..AssessArgs::default() };
        let result = assess::run(&LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "skipped");
        assert!(payload["message"].as_str().unwrap_or_default().contains("slug=nobody"));
    });
}

#[test]
fn default_tenant_slug_comes_from_environment() {
    with_env(&[("DEFAULT_TENANT_SLUG", "elsewhere")], || {
        let directory = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}", directory.path().join("cadence.db").display());
        env::set_var("CADENCE_DATABASE_URL", &url);

        let payload = parse_payload(&assess::run(&LoadOptions::default(), &AssessArgs::default()).output);
        assert_eq!(payload["status"], "skipped");
        assert!(payload["message"].as_str().unwrap_or_default().contains("slug=elsewhere"));
    });
}

#[test]
fn thresholds_resolve_reports_winning_tier() {
    with_database(|_| {
        assert_eq!(seed::run(&LoadOptions::default()).exit_code, 0);

        let listed = thresholds::run(&LoadOptions::default(), &ThresholdsCommand::List(TenantArgs::default()));
        let listed = parse_payload(&listed.output);
        assert_eq!(listed["command"], "thresholds.list");
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));

        let low = thresholds::run(
            &LoadOptions::default(),
            &ThresholdsCommand::Resolve {
                tenant: TenantArgs::default(),
                account_type: None,
                account_priority: Some(AccountPriority::Low),
            },
        );
        let low = parse_payload(&low.output);
        assert_eq!(low["data"]["tier"], "priority_only");
        assert_eq!(low["data"]["config"]["dormant_days"], 60);

        let high = thresholds::run(
            &LoadOptions::default(),
            &ThresholdsCommand::Resolve {
                tenant: TenantArgs::default(),
                account_type: None,
                account_priority: Some(AccountPriority::High),
            },
        );
        let high = parse_payload(&high.output);
        assert_eq!(high["data"]["tier"], "global_default");
        assert_eq!(high["data"]["config"]["dormant_days"], 45);
    });
}

#[test]
fn config_reports_env_sources() {
    with_env(&[("CADENCE_LOG_LEVEL", "debug")], || {
        let output = config::run(&LoadOptions::default());
        assert!(output.contains("- logging.level = debug (source: env (CADENCE_LOG_LEVEL))"));
        assert!(output.contains("- assessment.chunk_size = 500 (source: default)"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

/// Runs `test_fn` against a fresh file-backed database; every command opens
/// its own pool, so an in-memory database would not survive between them.
fn with_database(test_fn: impl FnOnce(&str)) {
    let directory = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", directory.path().join("cadence.db").display());
    with_env(&[("CADENCE_DATABASE_URL", &url)], || test_fn(&url));
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let keys = [
        "CADENCE_DATABASE_URL",
        "CADENCE_DATABASE_MAX_CONNECTIONS",
        "CADENCE_DATABASE_TIMEOUT_SECS",
        "CADENCE_ASSESSMENT_DEFAULT_TENANT_SLUG",
        "DEFAULT_TENANT_SLUG",
        "CADENCE_ASSESSMENT_CHUNK_SIZE",
        "CADENCE_ASSESSMENT_SCHEDULE_INTERVAL_SECS",
        "CADENCE_ASSESSMENT_SKIP_REVENUE_FOR_PRIORITIES",
        "CADENCE_SERVER_BIND_ADDRESS",
        "CADENCE_SERVER_PORT",
        "CADENCE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "CADENCE_LOGGING_LEVEL",
        "CADENCE_LOGGING_FORMAT",
        "CADENCE_LOG_LEVEL",
        "CADENCE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
