use std::env;
use std::fs;
use std::path::Path;

use cadence_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let sources = Sources {
        doc: config_file_path.as_deref().and_then(load_config_file_doc),
        path: config_file_path.as_deref(),
    };

    let skip_revenue = config
        .assessment
        .skip_revenue_for_priorities
        .iter()
        .map(|priority| priority.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let schedule = config
        .assessment
        .schedule_interval_secs
        .map(|secs| secs.to_string())
        .unwrap_or_else(|| "<disabled>".to_string());

    let entries: [(&str, String, &[&str]); 12] = [
        ("database.url", config.database.url.clone(), &["CADENCE_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["CADENCE_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["CADENCE_DATABASE_TIMEOUT_SECS"],
        ),
        (
            "assessment.default_tenant_slug",
            config.assessment.default_tenant_slug.clone(),
            &["CADENCE_ASSESSMENT_DEFAULT_TENANT_SLUG", "DEFAULT_TENANT_SLUG"],
        ),
        (
            "assessment.chunk_size",
            config.assessment.chunk_size.to_string(),
            &["CADENCE_ASSESSMENT_CHUNK_SIZE"],
        ),
        (
            "assessment.schedule_interval_secs",
            schedule,
            &["CADENCE_ASSESSMENT_SCHEDULE_INTERVAL_SECS"],
        ),
        (
            "assessment.skip_revenue_for_priorities",
            skip_revenue,
            &["CADENCE_ASSESSMENT_SKIP_REVENUE_FOR_PRIORITIES"],
        ),
        ("server.bind_address", config.server.bind_address.clone(), &["CADENCE_SERVER_BIND_ADDRESS"]),
        ("server.port", config.server.port.to_string(), &["CADENCE_SERVER_PORT"]),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["CADENCE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["CADENCE_LOGGING_LEVEL", "CADENCE_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["CADENCE_LOGGING_FORMAT", "CADENCE_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
        format!(
            "- config_file = {}",
            sources.path.map(|path| path.display().to_string()).unwrap_or_else(|| "<none>".to_string())
        ),
    ];
    for (key, value, env_keys) in entries {
        lines.push(render_line(key, &value, sources.field_source(key, env_keys)));
    }
    lines.join("\n")
}

struct Sources<'a> {
    doc: Option<Value>,
    path: Option<&'a Path>,
}

impl Sources<'_> {
    fn field_source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
