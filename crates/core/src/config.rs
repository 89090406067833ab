use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_FALLBACK_IMAGE_URL: &str =
    "https://assets.hardcover.app/static/covers/placeholder-cover.png";

const CANDIDATE_FILES: [&str; 2] = ["bookworm.toml", "config/bookworm.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub catalog: CatalogConfig,
    pub conversation: ConversationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Oracle endpoint settings. `api_key` is only mandatory for OpenAI.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub api_url: String,
    pub api_token: Option<SecretString>,
    pub fallback_image_url: String,
    pub timeout_secs: u64,
}

/// Tunables for the recommendation and order agents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationConfig {
    pub min_questions: u32,
    pub readiness_memory_threshold: usize,
    pub delivery_days: u32,
    pub session_idle_ttl_secs: u64,
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
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Values passed explicitly by the caller. They beat both env and file.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub catalog_api_url: Option<String>,
    pub catalog_api_token: Option<String>,
    pub server_port: Option<u16>,
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
                url: "sqlite://bookworm.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: Some("https://api.openai.com".to_string()),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.7,
                timeout_secs: 30,
            },
            catalog: CatalogConfig {
                api_url: "https://api.hardcover.app/v1/graphql".to_string(),
                api_token: None,
                fallback_image_url: DEFAULT_FALLBACK_IMAGE_URL.to_string(),
                timeout_secs: 15,
            },
            conversation: ConversationConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            min_questions: 4,
            readiness_memory_threshold: 3,
            delivery_days: 5,
            session_idle_ttl_secs: 1800,
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(invalid(format!("unsupported llm provider `{other}` (expected openai|ollama)"))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => {
                Err(invalid(format!("unsupported log format `{other}` (expected compact|pretty|json)")))
            }
        }
    }
}

impl AppConfig {
    /// Layers defaults, the TOML file, `BOOKWORM_*` variables and explicit
    /// overrides, in that order, then validates the result.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let LoadOptions { config_path, require_file, overrides } = options;
        let mut config = Self::default();

        match locate_file(config_path.as_deref()) {
            Some(path) => read_file_layer(&path)?.merge_into(&mut config),
            None if require_file => {
                let expected = config_path.unwrap_or_else(|| PathBuf::from(CANDIDATE_FILES[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        for binding in ENV_BINDINGS {
            if let Some((key, value)) = binding.lookup() {
                (binding.apply)(&mut config, key, &value)?;
            }
        }

        overrides.merge_into(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_database()?;
        self.validate_llm()?;
        self.validate_catalog()?;
        require(self.conversation.delivery_days > 0, "conversation.delivery_days must be greater than zero")?;
        require(
            self.conversation.session_idle_ttl_secs > 0,
            "conversation.session_idle_ttl_secs must be greater than zero",
        )?;
        require(self.server.port > 0, "server.port must be greater than zero")?;
        require(
            self.server.graceful_shutdown_secs > 0,
            "server.graceful_shutdown_secs must be greater than zero",
        )?;
        require(
            matches!(
                self.logging.level.trim().to_ascii_lowercase().as_str(),
                "trace" | "debug" | "info" | "warn" | "error"
            ),
            "logging.level must be one of trace|debug|info|warn|error",
        )
    }

    fn validate_database(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        require(
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:",
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        )?;
        require(self.database.max_connections > 0, "database.max_connections must be greater than zero")?;
        require_timeout("database.timeout_secs", self.database.timeout_secs)
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;
        require_timeout("llm.timeout_secs", llm.timeout_secs)?;
        require((0.0..=2.0).contains(&llm.temperature), "llm.temperature must be in range 0.0..=2.0")?;
        require(!llm.model.trim().is_empty(), "llm.model must not be empty")?;

        match llm.provider {
            LlmProvider::OpenAi => require(
                llm.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty()),
                "llm.api_key is required for the openai provider. Set BOOKWORM_LLM_API_KEY or [llm].api_key",
            ),
            LlmProvider::Ollama => require(
                llm.base_url.as_deref().is_some_and(|url| !url.trim().is_empty()),
                "llm.base_url is required for the ollama provider",
            ),
        }
    }

    fn validate_catalog(&self) -> Result<(), ConfigError> {
        let url = self.catalog.api_url.trim();
        require(
            url.starts_with("http://") || url.starts_with("https://"),
            "catalog.api_url must start with http:// or https://",
        )?;
        require(
            !self.catalog.fallback_image_url.trim().is_empty(),
            "catalog.fallback_image_url must not be empty",
        )?;
        require_timeout("catalog.timeout_secs", self.catalog.timeout_secs)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

fn require(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(invalid(message))
    }
}

fn require_timeout(field: &str, secs: u64) -> Result<(), ConfigError> {
    require((1..=300).contains(&secs), &format!("{field} must be in range 1..=300"))
}

fn locate_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => CANDIDATE_FILES.iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

fn read_file_layer(path: &Path) -> Result<FileLayer, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let expanded = expand_env_references(&raw)?;
    toml::from_str(&expanded).map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${NAME}` in `raw` with the value of the environment
/// variable `NAME`.
fn expand_env_references(raw: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &after_open[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_string() })?;
        expanded.push_str(&value);
        rest = &after_open[end + 1..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}

/// One `BOOKWORM_*` variable family and the field it drives. The first key
/// with a non-blank value wins.
pub struct EnvBinding {
    pub field: &'static str,
    pub keys: &'static [&'static str],
    apply: fn(&mut AppConfig, &str, &str) -> Result<(), ConfigError>,
}

impl EnvBinding {
    fn lookup(&self) -> Option<(&'static str, String)> {
        self.keys.iter().find_map(|key| {
            env::var(key).ok().filter(|value| !value.trim().is_empty()).map(|value| (*key, value))
        })
    }
}

pub const ENV_BINDINGS: &[EnvBinding] = &[
    EnvBinding {
        field: "database.url",
        keys: &["BOOKWORM_DATABASE_URL"],
        apply: |c, _, v| {
            c.database.url = v.to_string();
            Ok(())
        },
    },
    EnvBinding {
        field: "database.max_connections",
        keys: &["BOOKWORM_DATABASE_MAX_CONNECTIONS"],
        apply: |c, k, v| {
            c.database.max_connections = parse_env(k, v)?;
            Ok(())
        },
    },
    EnvBinding {
        field: "database.timeout_secs",
        keys: &["BOOKWORM_DATABASE_TIMEOUT_SECS"],
        apply: |c, k, v| {
            c.database.timeout_secs = parse_env(k, v)?;
            Ok(())
        },
    },
    EnvBinding {
        field: "llm.provider",
        keys: &["BOOKWORM_LLM_PROVIDER"],
        apply: |c, _, v| {
            c.llm.provider = v.parse()?;
            Ok(())
        },
    },
    EnvBinding {
        field: "llm.api_key",
        keys: &["BOOKWORM_LLM_API_KEY"],
        apply: |c, _, v| {
            c.llm.api_key = Some(SecretString::from(v.to_string()));
            Ok(())
        },
    },
    EnvBinding {
        field: "llm.base_url",
        keys: &["BOOKWORM_LLM_BASE_URL"],
        apply: |c, _, v| {
            c.llm.base_url = Some(v.to_string());
            Ok(())
        },
    },
    EnvBinding {
        field: "llm.model",
        keys: &["BOOKWORM_LLM_MODEL"],
        apply: |c, _, v| {
            c.llm.model = v.to_string();
            Ok(())
        },
    },
    EnvBinding {
        field: "llm.temperature",
        keys: &["BOOKWORM_LLM_TEMPERATURE"],
        apply: |c, k, v| {
            c.llm.temperature = parse_env(k, v)?;
            Ok(())
        },
    },
    EnvBinding {
        field: "llm.timeout_secs",
        keys: &["BOOKWORM_LLM_TIMEOUT_SECS"],
        apply: |c, k, v| {
            c.llm.timeout_secs = parse_env(k, v)?;
            Ok(())
        },
    },
    EnvBinding {
        field: "catalog.api_url",
        keys: &["BOOKWORM_CATALOG_API_URL"],
        apply: |c, _, v| {
            c.catalog.api_url = v.to_string();
            Ok(())
        },
    },
    EnvBinding {
        field: "catalog.api_token",
        keys: &["BOOKWORM_CATALOG_API_TOKEN"],
        apply: |c, _, v| {
            c.catalog.api_token = Some(SecretString::from(v.to_string()));
            Ok(())
        },
    },
    EnvBinding {
        field: "catalog.fallback_image_url",
        keys: &["BOOKWORM_CATALOG_FALLBACK_IMAGE_URL"],
        apply: |c, _, v| {
            c.catalog.fallback_image_url = v.to_string();
            Ok(())
        },
    },
    EnvBinding {
        field: "conversation.min_questions",
        keys: &["BOOKWORM_CONVERSATION_MIN_QUESTIONS"],
        apply: |c, k, v| {
            c.conversation.min_questions = parse_env(k, v)?;
            Ok(())
        },
    },
    EnvBinding {
        field: "conversation.readiness_memory_threshold",
        keys: &["BOOKWORM_CONVERSATION_READINESS_MEMORY_THRESHOLD"],
        apply: |c, k, v| {
            c.conversation.readiness_memory_threshold = parse_env(k, v)?;
            Ok(())
        },
    },
    EnvBinding {
        field: "conversation.delivery_days",
        keys: &["BOOKWORM_CONVERSATION_DELIVERY_DAYS"],
        apply: |c, k, v| {
            c.conversation.delivery_days = parse_env(k, v)?;
            Ok(())
        },
    },
    EnvBinding {
        field: "conversation.session_idle_ttl_secs",
        keys: &["BOOKWORM_CONVERSATION_SESSION_IDLE_TTL_SECS"],
        apply: |c, k, v| {
            c.conversation.session_idle_ttl_secs = parse_env(k, v)?;
            Ok(())
        },
    },
    EnvBinding {
        field: "server.bind_address",
        keys: &["BOOKWORM_SERVER_BIND_ADDRESS"],
        apply: |c, _, v| {
            c.server.bind_address = v.to_string();
            Ok(())
        },
    },
    EnvBinding {
        field: "server.port",
        keys: &["BOOKWORM_SERVER_PORT"],
        apply: |c, k, v| {
            c.server.port = parse_env(k, v)?;
            Ok(())
        },
    },
    EnvBinding {
        field: "logging.level",
        keys: &["BOOKWORM_LOGGING_LEVEL", "BOOKWORM_LOG_LEVEL"],
        apply: |c, _, v| {
            c.logging.level = v.to_string();
            Ok(())
        },
    },
    EnvBinding {
        field: "logging.format",
        keys: &["BOOKWORM_LOGGING_FORMAT", "BOOKWORM_LOG_FORMAT"],
        apply: |c, _, v| {
            c.logging.format = v.parse()?;
            Ok(())
        },
    },
];

/// Environment variables that can set the dotted config `field`.
pub fn env_keys_for(field: &str) -> &'static [&'static str] {
    ENV_BINDINGS.iter().find(|binding| binding.field == field).map_or(&[], |binding| binding.keys)
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn assign<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn assign_secret(slot: &mut Option<SecretString>, value: Option<String>) {
    if let Some(value) = value {
        *slot = Some(SecretString::from(value));
    }
}

impl ConfigOverrides {
    fn merge_into(self, config: &mut AppConfig) {
        assign(&mut config.database.url, self.database_url);
        assign(&mut config.logging.level, self.log_level);
        assign(&mut config.llm.provider, self.llm_provider);
        assign(&mut config.llm.model, self.llm_model);
        assign_secret(&mut config.llm.api_key, self.llm_api_key);
        assign(&mut config.llm.base_url, self.llm_base_url.map(Some));
        assign(&mut config.catalog.api_url, self.catalog_api_url);
        assign_secret(&mut config.catalog.api_token, self.catalog_api_token);
        assign(&mut config.server.port, self.server_port);
    }
}

/// Shape of `bookworm.toml`. Every key is optional; absent keys keep the
/// value from the layer below.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileLayer {
    database: DatabaseSection,
    llm: LlmSection,
    catalog: CatalogSection,
    conversation: ConversationSection,
    server: ServerSection,
    logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatabaseSection {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LlmSection {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CatalogSection {
    api_url: Option<String>,
    api_token: Option<String>,
    fallback_image_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConversationSection {
    min_questions: Option<u32>,
    readiness_memory_threshold: Option<usize>,
    delivery_days: Option<u32>,
    session_idle_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerSection {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoggingSection {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl FileLayer {
    fn merge_into(self, config: &mut AppConfig) {
        let FileLayer { database, llm, catalog, conversation, server, logging } = self;

        assign(&mut config.database.url, database.url);
        assign(&mut config.database.max_connections, database.max_connections);
        assign(&mut config.database.timeout_secs, database.timeout_secs);

        assign(&mut config.llm.provider, llm.provider);
        assign_secret(&mut config.llm.api_key, llm.api_key);
        assign(&mut config.llm.base_url, llm.base_url.map(Some));
        assign(&mut config.llm.model, llm.model);
        assign(&mut config.llm.temperature, llm.temperature);
        assign(&mut config.llm.timeout_secs, llm.timeout_secs);

        assign(&mut config.catalog.api_url, catalog.api_url);
        assign_secret(&mut config.catalog.api_token, catalog.api_token);
        assign(&mut config.catalog.fallback_image_url, catalog.fallback_image_url);
        assign(&mut config.catalog.timeout_secs, catalog.timeout_secs);

        assign(&mut config.conversation.min_questions, conversation.min_questions);
        assign(
            &mut config.conversation.readiness_memory_threshold,
            conversation.readiness_memory_threshold,
        );
        assign(&mut config.conversation.delivery_days, conversation.delivery_days);
        assign(&mut config.conversation.session_idle_ttl_secs, conversation.session_idle_ttl_secs);

        assign(&mut config.server.bind_address, server.bind_address);
        assign(&mut config.server.port, server.port);
        assign(&mut config.server.graceful_shutdown_secs, server.graceful_shutdown_secs);

        assign(&mut config.logging.level, logging.level);
        assign(&mut config.logging.format, logging.format);
    }
}
