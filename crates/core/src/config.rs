use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "insight.toml";
pub const MAX_HYPOTHESIS_COUNT_LIMIT: usize = 20;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub analysis: AnalysisConfig,
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
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub default_hypothesis_count: usize,
    pub max_hypothesis_count: usize,
    pub include_visualization: bool,
    pub chart_renderer: ChartRendererKind,
    pub query_timeout_secs: u64,
    pub stat_test_timeout_secs: u64,
    pub schema_description: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    LmStudio,
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LmStudio => "lm_studio",
            Self::OpenAi => "open_ai",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartRendererKind {
    Heuristic,
    Llm,
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
    pub llm_provider: Option<LlmProvider>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub server_port: Option<u16>,
    pub include_visualization: Option<bool>,
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
                url: "sqlite://insight.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::LmStudio,
                api_key: Some(secret_value("lm-studio".to_string())),
                base_url: "http://127.0.0.1:1234/v1".to_string(),
                model: "local-model".to_string(),
                temperature: 0.0,
                timeout_secs: 120,
                max_retries: 1,
            },
            analysis: AnalysisConfig {
                default_hypothesis_count: 3,
                max_hypothesis_count: 10,
                include_visualization: true,
                chart_renderer: ChartRendererKind::Heuristic,
                query_timeout_secs: 30,
                stat_test_timeout_secs: 10,
                schema_description: None,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
                allowed_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "lm_studio" | "lmstudio" => Ok(Self::LmStudio),
            "open_ai" | "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected lm_studio|open_ai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for ChartRendererKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "llm" => Ok(Self::Llm),
            other => Err(ConfigError::Validation(format!(
                "unsupported chart renderer `{other}` (expected heuristic|llm)"
            ))),
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Socket address string the HTTP binding listens on.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
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

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(analysis) = patch.analysis {
            if let Some(count) = analysis.default_hypothesis_count {
                self.analysis.default_hypothesis_count = count;
            }
            if let Some(count) = analysis.max_hypothesis_count {
                self.analysis.max_hypothesis_count = count;
            }
            if let Some(include_visualization) = analysis.include_visualization {
                self.analysis.include_visualization = include_visualization;
            }
            if let Some(chart_renderer) = analysis.chart_renderer {
                self.analysis.chart_renderer = chart_renderer;
            }
            if let Some(timeout_secs) = analysis.query_timeout_secs {
                self.analysis.query_timeout_secs = timeout_secs;
            }
            if let Some(timeout_secs) = analysis.stat_test_timeout_secs {
                self.analysis.stat_test_timeout_secs = timeout_secs;
            }
            if let Some(schema_description) = analysis.schema_description {
                self.analysis.schema_description = Some(schema_description);
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
            if let Some(allowed_origins) = server.allowed_origins {
                self.server.allowed_origins = allowed_origins;
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
        if let Some(value) = read_env("INSIGHT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("INSIGHT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("INSIGHT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("INSIGHT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("INSIGHT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INSIGHT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("INSIGHT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("INSIGHT_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("INSIGHT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("INSIGHT_LLM_TEMPERATURE") {
            self.llm.temperature = value.trim().parse::<f32>().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "INSIGHT_LLM_TEMPERATURE".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("INSIGHT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("INSIGHT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("INSIGHT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("INSIGHT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("INSIGHT_ANALYSIS_DEFAULT_HYPOTHESIS_COUNT") {
            self.analysis.default_hypothesis_count =
                parse_usize("INSIGHT_ANALYSIS_DEFAULT_HYPOTHESIS_COUNT", &value)?;
        }
        if let Some(value) = read_env("INSIGHT_ANALYSIS_MAX_HYPOTHESIS_COUNT") {
            self.analysis.max_hypothesis_count =
                parse_usize("INSIGHT_ANALYSIS_MAX_HYPOTHESIS_COUNT", &value)?;
        }
        if let Some(value) = read_env("INSIGHT_ANALYSIS_INCLUDE_VISUALIZATION") {
            self.analysis.include_visualization =
                parse_bool("INSIGHT_ANALYSIS_INCLUDE_VISUALIZATION", &value)?;
        }
        if let Some(value) = read_env("INSIGHT_ANALYSIS_CHART_RENDERER") {
            self.analysis.chart_renderer = value.parse()?;
        }
        if let Some(value) = read_env("INSIGHT_ANALYSIS_QUERY_TIMEOUT_SECS") {
            self.analysis.query_timeout_secs =
                parse_u64("INSIGHT_ANALYSIS_QUERY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("INSIGHT_ANALYSIS_STAT_TEST_TIMEOUT_SECS") {
            self.analysis.stat_test_timeout_secs =
                parse_u64("INSIGHT_ANALYSIS_STAT_TEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INSIGHT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("INSIGHT_SERVER_PORT") {
            self.server.port = parse_u16("INSIGHT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("INSIGHT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("INSIGHT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("INSIGHT_SERVER_ALLOWED_ORIGINS") {
            self.server.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }

        let log_level =
            read_env("INSIGHT_LOGGING_LEVEL").or_else(|| read_env("INSIGHT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INSIGHT_LOGGING_FORMAT").or_else(|| read_env("INSIGHT_LOG_FORMAT"));
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
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(include_visualization) = overrides.include_visualization {
            self.analysis.include_visualization = include_visualization;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_analysis(&self.analysis)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config/insight.toml")]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https:// (LM Studio default: http://127.0.0.1:1234/v1)"
                .to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.provider == LlmProvider::OpenAi {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.api_key is required for the open_ai provider".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_analysis(analysis: &AnalysisConfig) -> Result<(), ConfigError> {
    if analysis.max_hypothesis_count == 0
        || analysis.max_hypothesis_count > MAX_HYPOTHESIS_COUNT_LIMIT
    {
        return Err(ConfigError::Validation(format!(
            "analysis.max_hypothesis_count must be in range 1..={MAX_HYPOTHESIS_COUNT_LIMIT}"
        )));
    }

    if analysis.default_hypothesis_count == 0
        || analysis.default_hypothesis_count > analysis.max_hypothesis_count
    {
        return Err(ConfigError::Validation(
            "analysis.default_hypothesis_count must be in range 1..=analysis.max_hypothesis_count"
                .to_string(),
        ));
    }

    if analysis.query_timeout_secs == 0 || analysis.stat_test_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "analysis.query_timeout_secs and analysis.stat_test_timeout_secs must be greater than zero"
                .to_string(),
        ));
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

    if let Some(origin) = server
        .allowed_origins
        .iter()
        .find(|origin| !origin.starts_with("http://") && !origin.starts_with("https://"))
    {
        return Err(ConfigError::Validation(format!(
            "server.allowed_origins entry `{origin}` must start with http:// or https://"
        )));
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

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    analysis: Option<AnalysisPatch>,
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
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisPatch {
    default_hypothesis_count: Option<usize>,
    max_hypothesis_count: Option<usize>,
    include_visualization: Option<bool>,
    chart_renderer: Option<ChartRendererKind>,
    query_timeout_secs: Option<u64>,
    stat_test_timeout_secs: Option<u64>,
    schema_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ChartRendererKind, ConfigError, ConfigOverrides, LlmProvider, LoadOptions,
        LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn missing_path(dir: &TempDir) -> Option<std::path::PathBuf> {
        Some(dir.path().join("absent.toml"))
    }

    #[test]
    fn defaults_target_a_local_lm_studio() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;

        let config =
            AppConfig::load(LoadOptions { config_path: missing_path(&dir), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.llm.provider == LlmProvider::LmStudio, "default provider is lm_studio")?;
        ensure(
            config.llm.base_url == "http://127.0.0.1:1234/v1",
            "default base url points at LM Studio",
        )?;
        ensure(config.analysis.default_hypothesis_count == 3, "three hypotheses by default")?;
        ensure(
            config.analysis.chart_renderer == ChartRendererKind::Heuristic,
            "heuristic chart renderer by default",
        )?;
        ensure(config.listen_address() == "127.0.0.1:8000", "default listen address")?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_INSIGHT_LLM_KEY", "sk-from-env");
        env::set_var("TEST_INSIGHT_MODEL", "qwen2.5-7b-instruct");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("insight.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "open_ai"
base_url = "https://api.openai.com/v1"
api_key = "${TEST_INSIGHT_LLM_KEY}"
model = "${TEST_INSIGHT_MODEL}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            ensure(config.llm.model == "qwen2.5-7b-instruct", "model should be interpolated")?;
            Ok(())
        })();

        clear_vars(&["TEST_INSIGHT_LLM_KEY", "TEST_INSIGHT_MODEL"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        env::remove_var("TEST_INSIGHT_UNSET");

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("insight.toml");
        fs::write(&path, "[llm]\nmodel = \"${TEST_INSIGHT_UNSET}\"\n")
            .map_err(|err| err.to_string())?;

        let outcome =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(outcome, Err(ConfigError::MissingEnvInterpolation { ref var }) if var == "TEST_INSIGHT_UNSET"),
            "unset variables should fail interpolation",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INSIGHT_LOG_LEVEL", "warn");
        env::set_var("INSIGHT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let config = AppConfig::load(LoadOptions {
                config_path: missing_path(&dir),
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["INSIGHT_LOG_LEVEL", "INSIGHT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INSIGHT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("INSIGHT_ANALYSIS_DEFAULT_HYPOTHESIS_COUNT", "5");
        env::set_var("INSIGHT_SERVER_ALLOWED_ORIGINS", "http://a.test, https://b.test");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("insight.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[analysis]
default_hypothesis_count = 4
chart_renderer = "llm"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.analysis.default_hypothesis_count == 5,
                "env hypothesis count should win over file",
            )?;
            ensure(
                config.analysis.chart_renderer == ChartRendererKind::Llm,
                "file chart renderer should win over default",
            )?;
            ensure(
                config.server.allowed_origins == vec!["http://a.test", "https://b.test"],
                "origins should be split on commas",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "INSIGHT_DATABASE_URL",
            "INSIGHT_ANALYSIS_DEFAULT_HYPOTHESIS_COUNT",
            "INSIGHT_SERVER_ALLOWED_ORIGINS",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INSIGHT_ANALYSIS_MAX_HYPOTHESIS_COUNT", "50");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let error = match AppConfig::load(LoadOptions {
                config_path: missing_path(&dir),
                ..LoadOptions::default()
            }) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("analysis.max_hypothesis_count")
            );
            ensure(has_message, "validation failure should mention analysis.max_hypothesis_count")
        })();

        clear_vars(&["INSIGHT_ANALYSIS_MAX_HYPOTHESIS_COUNT"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INSIGHT_SERVER_PORT", "eighty");
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let outcome =
            AppConfig::load(LoadOptions { config_path: missing_path(&dir), ..LoadOptions::default() });
        clear_vars(&["INSIGHT_SERVER_PORT"]);

        ensure(
            matches!(outcome, Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "INSIGHT_SERVER_PORT"),
            "non-numeric port should be rejected",
        )
    }

    #[test]
    fn open_ai_provider_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::OpenAi;
        config.llm.api_key = None;

        ensure(
            matches!(config.validate(), Err(ConfigError::Validation(ref message)) if message.contains("llm.api_key")),
            "open_ai without a key must fail validation",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INSIGHT_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let config = AppConfig::load(LoadOptions {
                config_path: missing_path(&dir),
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["INSIGHT_LLM_API_KEY"]);
        result
    }
}
