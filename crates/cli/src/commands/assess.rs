use std::sync::Arc;

use cadence_core::config::LoadOptions;
use cadence_core::domain::customer::{TenantId, TenantSelector};
use cadence_core::health::{HealthAssessmentJob, StopSignal, ThresholdResolver};
use cadence_db::{SqlCustomerHealthRepository, SqlThresholdRepository};
use chrono::Utc;
use clap::Args;

use crate::commands::{open_database, prepare, CommandResult};

#[derive(Debug, Clone, Default, Args)]
pub struct AssessArgs {
    #[arg(long, conflicts_with = "tenant_slug", help = "Tenant id to assess")]
    pub tenant_id: Option<String>,
    #[arg(long, help = "Tenant slug to assess (defaults to assessment.default_tenant_slug)")]
    pub tenant_slug: Option<String>,
    #[arg(long, help = "Customers classified per persisted chunk")]
    pub chunk_size: Option<usize>,
    #[arg(long, help = "Leave the connection pool open after the run")]
    pub keep_connection: bool,
}

impl AssessArgs {
    fn selector(&self, default_slug: &str) -> TenantSelector {
        match (&self.tenant_id, &self.tenant_slug) {
            (Some(id), _) => TenantSelector::Id(TenantId(id.clone())),
            (None, Some(slug)) => TenantSelector::Slug(slug.clone()),
            (None, None) => TenantSelector::Slug(default_slug.to_string()),
        }
    }
}

pub fn run(options: &LoadOptions, args: &AssessArgs) -> CommandResult {
    let (config, runtime) = match prepare("assess", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let selector = args.selector(&config.assessment.default_tenant_slug);
    let mut batch_options = config.assessment.batch_options(selector.clone());
    if let Some(chunk_size) = args.chunk_size {
        batch_options.chunk_size = chunk_size.max(1);
    }

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let stop = StopSignal::new();
        let interrupt = {
            let stop = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stop.stop();
                }
            })
        };

        let resolver =
            Arc::new(ThresholdResolver::new(SqlThresholdRepository::new(pool.clone())));
        let job = HealthAssessmentJob::new(SqlCustomerHealthRepository::new(pool.clone()), resolver);
        let outcome = job
            .run(&batch_options, Utc::now(), &stop)
            .await
            .map_err(|error| ("assessment", error.to_string(), 6u8));

        interrupt.abort();
        if !args.keep_connection {
            pool.close().await;
        }
        outcome
    });

    match result {
        Ok(Some(summary)) => {
            let message = format!(
                "assessed {} customers of tenant {}: {} updated, {} unchanged, {} failed, {} conflicts in {} ms{}",
                summary.analyzed,
                summary.tenant_slug,
                summary.updated,
                summary.unchanged,
                summary.failed,
                summary.conflicts,
                summary.duration_ms,
                if summary.interrupted { " (interrupted)" } else { "" }
            );
            CommandResult::success_with_data("assess", message, &summary)
        }
        Ok(None) => CommandResult::skipped(
            "assess",
            format!("tenant not found ({selector}); assessment skipped"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("assess", error_class, message, exit_code)
        }
    }
}
