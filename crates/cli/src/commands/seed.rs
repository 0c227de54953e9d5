use cadence_core::config::LoadOptions;
use cadence_db::fixtures::CustomerSeedInfo;
use cadence_db::DemoSeedDataset;
use chrono::Utc;

use crate::commands::{open_database, prepare, CommandFailure, CommandResult};

pub fn run(options: &LoadOptions) -> CommandResult {
    let (config, runtime) = match prepare("seed", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let seed_result = DemoSeedDataset::load(&pool, Utc::now())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<Vec<CustomerSeedInfo>, CommandFailure> = if verification.all_present {
            Ok(seed_result.customers_seeded)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(customers) => {
            let lines: Vec<String> = customers
                .iter()
                .map(|customer| {
                    let expected =
                        customer.expected_status.map(|status| status.as_str()).unwrap_or("skipped");
                    format!("  - {} -> {} ({})", customer.customer_id, expected, customer.description)
                })
                .collect();
            let message = format!(
                "demo tenant loaded with {} customers:\n{}",
                customers.len(),
                lines.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
