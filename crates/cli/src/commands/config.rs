use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use insight_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    env_key: Option<&'static str>,
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let field = |key, env_key, value: String| Field { key, env_key: Some(env_key), value };
    let schema_description = match &config.analysis.schema_description {
        Some(custom) => format!("<custom, {} chars>", custom.chars().count()),
        None => "<built-in HR schema>".to_string(),
    };

    vec![
        field("database.url", "INSIGHT_DATABASE_URL", config.database.url.clone()),
        field(
            "database.max_connections",
            "INSIGHT_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            "INSIGHT_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        field("llm.provider", "INSIGHT_LLM_PROVIDER", config.llm.provider.as_str().to_string()),
        field("llm.base_url", "INSIGHT_LLM_BASE_URL", config.llm.base_url.clone()),
        field("llm.model", "INSIGHT_LLM_MODEL", config.llm.model.clone()),
        field(
            "llm.api_key",
            "INSIGHT_LLM_API_KEY",
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
        ),
        field("llm.temperature", "INSIGHT_LLM_TEMPERATURE", config.llm.temperature.to_string()),
        field("llm.timeout_secs", "INSIGHT_LLM_TIMEOUT_SECS", config.llm.timeout_secs.to_string()),
        field("llm.max_retries", "INSIGHT_LLM_MAX_RETRIES", config.llm.max_retries.to_string()),
        field(
            "analysis.default_hypothesis_count",
            "INSIGHT_ANALYSIS_DEFAULT_HYPOTHESIS_COUNT",
            config.analysis.default_hypothesis_count.to_string(),
        ),
        field(
            "analysis.max_hypothesis_count",
            "INSIGHT_ANALYSIS_MAX_HYPOTHESIS_COUNT",
            config.analysis.max_hypothesis_count.to_string(),
        ),
        field(
            "analysis.include_visualization",
            "INSIGHT_ANALYSIS_INCLUDE_VISUALIZATION",
            config.analysis.include_visualization.to_string(),
        ),
        field(
            "analysis.chart_renderer",
            "INSIGHT_ANALYSIS_CHART_RENDERER",
            format!("{:?}", config.analysis.chart_renderer).to_ascii_lowercase(),
        ),
        field(
            "analysis.query_timeout_secs",
            "INSIGHT_ANALYSIS_QUERY_TIMEOUT_SECS",
            config.analysis.query_timeout_secs.to_string(),
        ),
        field(
            "analysis.stat_test_timeout_secs",
            "INSIGHT_ANALYSIS_STAT_TEST_TIMEOUT_SECS",
            config.analysis.stat_test_timeout_secs.to_string(),
        ),
        Field { key: "analysis.schema_description", env_key: None, value: schema_description },
        field("server.bind_address", "INSIGHT_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        field("server.port", "INSIGHT_SERVER_PORT", config.server.port.to_string()),
        field(
            "server.graceful_shutdown_secs",
            "INSIGHT_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        field(
            "server.allowed_origins",
            "INSIGHT_SERVER_ALLOWED_ORIGINS",
            config.server.allowed_origins.join(","),
        ),
        field("logging.level", "INSIGHT_LOGGING_LEVEL", config.logging.level.clone()),
        field(
            "logging.format",
            "INSIGHT_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("insight.toml"), PathBuf::from("config/insight.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
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

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, field_source};

    #[test]
    fn nested_keys_are_found_in_file_documents() {
        let doc = "[analysis]\ndefault_hypothesis_count = 4\n".parse::<Value>().expect("toml");

        assert!(contains_path(&doc, "analysis.default_hypothesis_count"));
        assert!(!contains_path(&doc, "analysis.max_hypothesis_count"));
        assert!(!contains_path(&doc, "llm.model"));
    }

    #[test]
    fn source_falls_back_to_default_without_env_or_file() {
        assert_eq!(
            field_source("llm.model", Some("INSIGHT_TEST_UNSET_SOURCE_KEY"), None, None),
            "default"
        );
    }
}
