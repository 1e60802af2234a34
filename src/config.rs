//! Configuration types, built from environment variables.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::state::MESSAGE_TYPE;

/// Default system prompt for chat turns.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a research assistant for a notebook of \
uploaded documents, web pages and videos. Answer the user's question clearly and concisely \
in markdown. If you are unsure, say so instead of guessing.";

/// Record store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Namespace prepended to every key: `<prefix>:<task_id>`.
    pub key_prefix: String,
    /// Sliding lifetime applied on every write.
    pub ttl: Duration,
    /// Event type whose consecutive occurrences collapse into `current`.
    pub merge_type: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "zynapse.service".to_string(),
            ttl: Duration::from_secs(300), // 5 minutes
            merge_type: MESSAGE_TYPE.to_string(),
        }
    }
}

/// Longest record lifetime accepted from configuration (30 days).
pub const MAX_RECORD_TTL_SECS: u64 = 30 * 24 * 60 * 60;

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let ttl_secs: u64 = env_parse("ZYNAPSE_RECORD_TTL_SECS", defaults.ttl.as_secs())?;
        Ok(Self {
            key_prefix: env_or("ZYNAPSE_KEY_PREFIX", defaults.key_prefix),
            ttl: record_ttl(ttl_secs)?,
            merge_type: env_or("ZYNAPSE_MERGE_TYPE", defaults.merge_type),
        })
    }
}

fn record_ttl(secs: u64) -> Result<Duration, ConfigError> {
    if !(1..=MAX_RECORD_TTL_SECS).contains(&secs) {
        return Err(ConfigError::InvalidValue {
            key: "ZYNAPSE_RECORD_TTL_SECS".to_string(),
            message: format!("must be between 1 and {MAX_RECORD_TTL_SECS} seconds"),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Which storage backend holds the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendKind {
    Redis,
    /// Process-local; records are lost on restart. Development only.
    Memory,
}

impl FromStr for StoreBackendKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown store backend: {}", s)),
        }
    }
}

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Full connection URL; overrides host/port when set.
    pub url: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "redis".to_string(),
            port: 6379,
            url: None,
        }
    }
}

impl RedisConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: env_or("ZYNAPSE_REDIS_HOST", defaults.host),
            port: env_parse("ZYNAPSE_REDIS_PORT", defaults.port)?,
            url: std::env::var("ZYNAPSE_REDIS_URL").ok(),
        })
    }

    /// Connection URL in `redis://host:port` form.
    pub fn url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum number of tasks producing events at the same time.
    pub max_parallel_tasks: usize,
    /// Maximum number of accepted tasks waiting for a worker.
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 10,
            queue_capacity: 256,
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            max_parallel_tasks: env_parse(
                "ZYNAPSE_MAX_PARALLEL_TASKS",
                defaults.max_parallel_tasks,
            )?,
            queue_capacity: env_parse("ZYNAPSE_QUEUE_CAPACITY", defaults.queue_capacity)?,
        };
        if config.max_parallel_tasks == 0 || config.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ZYNAPSE_MAX_PARALLEL_TASKS/ZYNAPSE_QUEUE_CAPACITY".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }
}

/// Supported chat model backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    /// Streams the query back; needs no API key.
    Echo,
}

impl FromStr for LlmBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "echo" => Ok(Self::Echo),
            _ => Err(format!("Unknown LLM backend: {}", s)),
        }
    }
}

/// Configuration for creating a chat model.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub max_tokens: u32,
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let backend: LlmBackend = env_parse("ZYNAPSE_LLM_BACKEND", defaults.backend)?;
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok().map(SecretString::from);
        if backend == LlmBackend::Anthropic && api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".to_string()));
        }
        Ok(Self {
            backend,
            model: env_or("ZYNAPSE_MODEL", defaults.model),
            api_key,
            base_url: env_or("ZYNAPSE_ANTHROPIC_BASE_URL", defaults.base_url),
            max_tokens: env_parse("ZYNAPSE_MAX_TOKENS", defaults.max_tokens)?,
            system_prompt: env_or("ZYNAPSE_SYSTEM_PROMPT", defaults.system_prompt),
        })
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

/// Everything `main` needs to wire the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_backend: StoreBackendKind,
    pub store: StoreConfig,
    pub redis: RedisConfig,
    pub dispatch: DispatchConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            store_backend: env_parse("ZYNAPSE_STORE_BACKEND", StoreBackendKind::Redis)?,
            store: StoreConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            dispatch: DispatchConfig::from_env()?,
            llm: LlmConfig::from_env()?,
            server: ServerConfig {
                port: env_parse("ZYNAPSE_PORT", ServerConfig::default().port)?,
            },
        })
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.key_prefix, "zynapse.service");
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.merge_type, "message");
    }

    #[test]
    fn record_ttl_is_bounded() {
        assert_eq!(record_ttl(1).unwrap(), Duration::from_secs(1));
        assert_eq!(
            record_ttl(MAX_RECORD_TTL_SECS).unwrap(),
            Duration::from_secs(MAX_RECORD_TTL_SECS)
        );
        assert!(record_ttl(0).is_err());
        assert!(record_ttl(MAX_RECORD_TTL_SECS + 1).is_err());

        let err = record_ttl(u64::MAX).unwrap_err();
        assert!(err.to_string().contains("ZYNAPSE_RECORD_TTL_SECS"));
    }

    #[test]
    fn redis_url_from_host_and_port() {
        let config = RedisConfig {
            host: "cache.internal".to_string(),
            port: 6380,
            url: None,
        };
        assert_eq!(config.url(), "redis://cache.internal:6380");
    }

    #[test]
    fn redis_url_override_wins() {
        let config = RedisConfig {
            url: Some("redis://:secret@10.0.0.5:6379/2".to_string()),
            ..RedisConfig::default()
        };
        assert_eq!(config.url(), "redis://:secret@10.0.0.5:6379/2");
    }

    #[test]
    fn backend_kinds_parse_case_insensitively() {
        assert_eq!("Memory".parse::<StoreBackendKind>().unwrap(), StoreBackendKind::Memory);
        assert_eq!("REDIS".parse::<StoreBackendKind>().unwrap(), StoreBackendKind::Redis);
        assert!("sqlite".parse::<StoreBackendKind>().is_err());
        assert_eq!("echo".parse::<LlmBackend>().unwrap(), LlmBackend::Echo);
    }

    #[test]
    fn env_parse_reports_bad_values() {
        // Unique variable name so parallel tests cannot collide.
        let key = "ZYNAPSE_TEST_ENV_PARSE_BAD";
        unsafe { std::env::set_var(key, "not-a-number") };
        let err = env_parse::<u64>(key, 5).unwrap_err();
        unsafe { std::env::remove_var(key) };
        assert!(err.to_string().contains(key));
    }

    #[test]
    fn env_parse_falls_back_to_default() {
        assert_eq!(env_parse::<u64>("ZYNAPSE_TEST_ENV_PARSE_UNSET", 42).unwrap(), 42);
    }
}
