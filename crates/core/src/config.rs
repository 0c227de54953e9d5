use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::customer::{AccountPriority, TenantSelector};
use crate::health::batch::{BatchRunOptions, DEFAULT_CHUNK_SIZE};
use crate::health::realtime::RevenueCalcPolicy;

const MAX_CHUNK_SIZE: usize = 10_000;
const MIN_SCHEDULE_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub assessment: AssessmentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AssessmentConfig {
    /// Tenant swept when a batch run names none.
    pub default_tenant_slug: String,
    pub chunk_size: usize,
    /// Enables the server's periodic sweep when set.
    pub schedule_interval_secs: Option<u64>,
    pub skip_revenue_for_priorities: Vec<AccountPriority>,
}

impl AssessmentConfig {
    pub fn default_selector(&self) -> TenantSelector {
        TenantSelector::Slug(self.default_tenant_slug.clone())
    }

    pub fn batch_options(&self, tenant: TenantSelector) -> BatchRunOptions {
        BatchRunOptions { tenant, chunk_size: self.chunk_size }
    }

    pub fn revenue_calc_policy(&self) -> RevenueCalcPolicy {
        RevenueCalcPolicy::new(self.skip_revenue_for_priorities.clone())
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub default_tenant_slug: Option<String>,
    pub chunk_size: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://cadence.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            assessment: AssessmentConfig {
                default_tenant_slug: "default".to_string(),
                chunk_size: DEFAULT_CHUNK_SIZE,
                schedule_interval_secs: None,
                skip_revenue_for_priorities: vec![AccountPriority::Low],
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("cadence.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(assessment) = patch.assessment {
            if let Some(slug) = assessment.default_tenant_slug {
                self.assessment.default_tenant_slug = slug;
            }
            if let Some(chunk_size) = assessment.chunk_size {
                self.assessment.chunk_size = chunk_size;
            }
            if let Some(interval) = assessment.schedule_interval_secs {
                self.assessment.schedule_interval_secs = Some(interval);
            }
            if let Some(priorities) = assessment.skip_revenue_for_priorities {
                self.assessment.skip_revenue_for_priorities = priorities;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CADENCE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CADENCE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("CADENCE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CADENCE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("CADENCE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let tenant_slug = read_env("CADENCE_ASSESSMENT_DEFAULT_TENANT_SLUG")
            .or_else(|| read_env("DEFAULT_TENANT_SLUG"));
        if let Some(value) = tenant_slug {
            self.assessment.default_tenant_slug = value;
        }
        if let Some(value) = read_env("CADENCE_ASSESSMENT_CHUNK_SIZE") {
            self.assessment.chunk_size = parse_env("CADENCE_ASSESSMENT_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = read_env("CADENCE_ASSESSMENT_SCHEDULE_INTERVAL_SECS") {
            self.assessment.schedule_interval_secs =
                Some(parse_env("CADENCE_ASSESSMENT_SCHEDULE_INTERVAL_SECS", &value)?);
        }
        if let Some(value) = read_env("CADENCE_ASSESSMENT_SKIP_REVENUE_FOR_PRIORITIES") {
            self.assessment.skip_revenue_for_priorities =
                parse_priorities("CADENCE_ASSESSMENT_SKIP_REVENUE_FOR_PRIORITIES", &value)?;
        }

        if let Some(value) = read_env("CADENCE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CADENCE_SERVER_PORT") {
            self.server.port = parse_env("CADENCE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CADENCE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("CADENCE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CADENCE_LOGGING_LEVEL").or_else(|| read_env("CADENCE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CADENCE_LOGGING_FORMAT").or_else(|| read_env("CADENCE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slug) = overrides.default_tenant_slug {
            self.assessment.default_tenant_slug = slug;
        }
        if let Some(chunk_size) = overrides.chunk_size {
            self.assessment.chunk_size = chunk_size;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_assessment(&self.assessment)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The explicit path when it exists, else the first default location present.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cadence.toml"), PathBuf::from("config/cadence.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_assessment(assessment: &AssessmentConfig) -> Result<(), ConfigError> {
    if assessment.default_tenant_slug.trim().is_empty() {
        return Err(ConfigError::Validation(
            "assessment.default_tenant_slug must not be empty. Set it in cadence.toml or via DEFAULT_TENANT_SLUG"
                .to_string(),
        ));
    }

    if assessment.chunk_size == 0 || assessment.chunk_size > MAX_CHUNK_SIZE {
        return Err(ConfigError::Validation(format!(
            "assessment.chunk_size must be in range 1..={MAX_CHUNK_SIZE}"
        )));
    }

    if let Some(interval) = assessment.schedule_interval_secs {
        if interval < MIN_SCHEDULE_INTERVAL_SECS {
            return Err(ConfigError::Validation(format!(
                "assessment.schedule_interval_secs must be at least {MIN_SCHEDULE_INTERVAL_SECS}"
            )));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_priorities(key: &str, value: &str) -> Result<Vec<AccountPriority>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_env::<AccountPriority>(key, item))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    assessment: Option<AssessmentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AssessmentPatch {
    default_tenant_slug: Option<String>,
    chunk_size: Option<usize>,
    schedule_interval_secs: Option<u64>,
    skip_revenue_for_priorities: Option<Vec<AccountPriority>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
