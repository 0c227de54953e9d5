use std::sync::Arc;

use cadence_core::config::{AppConfig, ConfigError, LoadOptions};
use cadence_core::health::{RealTimeHealthUpdater, ThresholdCacheBus, ThresholdResolver};
use cadence_db::{
    connect_with_config, migrations, DbPool, SqlCustomerHealthRepository, SqlThresholdRepository,
};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;

pub type SharedResolver = Arc<ThresholdResolver<SqlThresholdRepository>>;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub bus: ThresholdCacheBus,
    /// The one resolver every call site in this process reads through.
    pub resolver: SharedResolver,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(Application::from_pool(config, db_pool))
}

impl Application {
    /// Wires the shared resolver and invalidation bus over an already
    /// migrated pool.
    pub fn from_pool(config: AppConfig, db_pool: DbPool) -> Self {
        let bus = ThresholdCacheBus::default();
        let resolver =
            Arc::new(ThresholdResolver::with_bus(SqlThresholdRepository::new(db_pool.clone()), &bus));
        Self { config, db_pool, bus, resolver }
    }

    pub fn api_state(&self) -> ApiState {
        let customers = SqlCustomerHealthRepository::new(self.db_pool.clone());
        let updater = RealTimeHealthUpdater::new(
            customers.clone(),
            self.resolver.clone(),
            self.config.assessment.revenue_calc_policy(),
        );
        ApiState {
            customers,
            thresholds: SqlThresholdRepository::new(self.db_pool.clone()),
            resolver: self.resolver.clone(),
            updater: Arc::new(updater),
            bus: self.bus.clone(),
        }
    }
}
