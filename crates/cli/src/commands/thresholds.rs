use cadence_core::config::LoadOptions;
use cadence_core::domain::customer::{AccountPriority, AccountType, Segment, TenantId, TenantSelector};
use cadence_core::health::{CustomerHealthStore, ThresholdResolver};
use cadence_db::{DbPool, SqlCustomerHealthRepository, SqlThresholdRepository, ThresholdRuleRepository};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use crate::commands::{open_database, prepare, CommandFailure, CommandResult};

/// Read-only threshold inspection. Edits go through the server, which
/// invalidates resolver caches.
#[derive(Debug, Clone, Subcommand)]
pub enum ThresholdsCommand {
    #[command(about = "List every configured threshold row for a tenant")]
    List(TenantArgs),
    #[command(about = "Show which threshold row applies to a segment")]
    Resolve {
        #[command(flatten)]
        tenant: TenantArgs,
        #[arg(long, help = "ACTIVE, TARGET or PROSPECT")]
        account_type: Option<AccountType>,
        #[arg(long, help = "HIGH, MEDIUM or LOW")]
        account_priority: Option<AccountPriority>,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct TenantArgs {
    #[arg(long, conflicts_with = "tenant_slug")]
    pub tenant_id: Option<String>,
    #[arg(long, help = "Defaults to assessment.default_tenant_slug")]
    pub tenant_slug: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResolvedOutput {
    tenant_id: TenantId,
    segment: Segment,
    #[serde(flatten)]
    resolved: cadence_core::ResolvedThresholds,
}

pub fn run(options: &LoadOptions, command: &ThresholdsCommand) -> CommandResult {
    let name = match command {
        ThresholdsCommand::List(_) => "thresholds.list",
        ThresholdsCommand::Resolve { .. } => "thresholds.resolve",
    };
    let (config, runtime) = match prepare(name, options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let default_slug = config.assessment.default_tenant_slug.clone();

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let outcome = execute(&pool, command, &default_slug).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok((message, data)) => CommandResult::success_with_data(name, message, data),
        Err(("tenant_missing", message, _)) => CommandResult::skipped(name, message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(name, error_class, message, exit_code)
        }
    }
}

async fn execute(
    pool: &DbPool,
    command: &ThresholdsCommand,
    default_slug: &str,
) -> Result<(String, Value), CommandFailure> {
    let tenant_args = match command {
        ThresholdsCommand::List(tenant) | ThresholdsCommand::Resolve { tenant, .. } => tenant,
    };
    let selector = match (&tenant_args.tenant_id, &tenant_args.tenant_slug) {
        (Some(id), _) => TenantSelector::Id(TenantId(id.clone())),
        (None, Some(slug)) => TenantSelector::Slug(slug.clone()),
        (None, None) => TenantSelector::Slug(default_slug.to_string()),
    };

    let tenant = SqlCustomerHealthRepository::new(pool.clone())
        .find_tenant(&selector)
        .await
        .map_err(|error| ("tenant_lookup", error.to_string(), 6u8))?
        .ok_or_else(|| ("tenant_missing", format!("tenant not found ({selector})"), 0u8))?;

    let repository = SqlThresholdRepository::new(pool.clone());

    match command {
        ThresholdsCommand::List(_) => {
            let rules = repository
                .list_rules(&tenant.id)
                .await
                .map_err(|error| ("threshold_store", error.to_string(), 6u8))?;
            let message = format!("{} threshold rows for tenant {}", rules.len(), tenant.slug);
            Ok((message, to_json(&rules)?))
        }
        ThresholdsCommand::Resolve { account_type, account_priority, .. } => {
            let segment = Segment::new(*account_type, *account_priority);
            let resolved = ThresholdResolver::new(repository)
                .resolve_detailed(&tenant.id, &segment)
                .await
                .map_err(|error| ("threshold_store", error.to_string(), 6u8))?;
            let message = format!("resolved {:?} thresholds for tenant {}", resolved.tier, tenant.slug);
            let output = ResolvedOutput { tenant_id: tenant.id, segment, resolved };
            Ok((message, to_json(&output)?))
        }
    }
}

fn to_json(value: impl Serialize) -> Result<Value, CommandFailure> {
    serde_json::to_value(value).map_err(|error| ("serialization", error.to_string(), 7u8))
}
