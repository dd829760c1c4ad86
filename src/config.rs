use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty Cache server and sync runner.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance backing the search index.
    pub qdrant_url: String,
    /// Name of the Qdrant collection holding synced documents.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Vectorizer backend used for documents and query text.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional override for the Ollama runtime URL.
    pub ollama_url: Option<String>,
    /// Directory scanned by the file-system document source.
    pub documents_root: PathBuf,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Maximum number of items processed concurrently during a sync run.
    pub sync_concurrency: usize,
    /// Cache entry lifetime in seconds; `0` disables expiry.
    pub cache_ttl_secs: u64,
    /// Maximum number of cached entries.
    pub cache_max_entries: usize,
    /// Whether vector-mode searches are served.
    pub vector_search_enabled: bool,
    /// Whether hybrid-mode searches are served.
    pub hybrid_search_enabled: bool,
    /// Result count applied when a search omits `limit`.
    pub search_default_limit: usize,
    /// Upper bound accepted for `limit`.
    pub search_max_limit: usize,
    /// Search permits granted per caller and window.
    pub rate_limit_per_window: u32,
    /// Length of the rate-limit window in seconds.
    pub rate_limit_window_secs: u64,
    /// `LOG_FILE` setting: a path to append to, `off`, or unset for daily files under `logs/`.
    pub log_file: Option<String>,
}

/// Supported vectorizer backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic in-process hashing vectorizer.
    Hashing,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: load_env("EMBEDDING_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: parse_required("EMBEDDING_DIMENSION")?,
            ollama_url: load_env_optional("OLLAMA_URL"),
            documents_root: load_env_optional("DOCUMENTS_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("documents")),
            server_port: parse_optional("SERVER_PORT")?,
            sync_concurrency: parse_optional("SYNC_CONCURRENCY")?.unwrap_or(4).max(1),
            cache_ttl_secs: parse_optional("CACHE_TTL_SECS")?.unwrap_or(3600),
            cache_max_entries: parse_optional("CACHE_MAX_ENTRIES")?.unwrap_or(10_000),
            vector_search_enabled: parse_flag("VECTOR_SEARCH_ENABLED")?.unwrap_or(true),
            hybrid_search_enabled: parse_flag("HYBRID_SEARCH_ENABLED")?.unwrap_or(true),
            search_default_limit: parse_optional("SEARCH_DEFAULT_LIMIT")?.unwrap_or(10),
            search_max_limit: parse_optional("SEARCH_MAX_LIMIT")?.unwrap_or(100),
            rate_limit_per_window: parse_optional("RATE_LIMIT_PER_WINDOW")?.unwrap_or(10),
            rate_limit_window_secs: parse_optional("RATE_LIMIT_WINDOW_SECS")?.unwrap_or(60),
            log_file: load_env_optional("LOG_FILE"),
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_required<T: std::str::FromStr>(key: &str) -> Result<T, ConfigError> {
    load_env(key)?
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_flag(key: &str) -> Result<Option<bool>, ConfigError> {
    load_env_optional(key)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        server_port = ?config.server_port,
        embedding_provider = ?config.embedding_provider,
        documents_root = %config.documents_root.display(),
        sync_concurrency = config.sync_concurrency,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_provider_parses_case_insensitively() {
        assert_eq!("Ollama".parse(), Ok(EmbeddingProvider::Ollama));
        assert_eq!(" hashing ".parse(), Ok(EmbeddingProvider::Hashing));
        assert_eq!("openai".parse::<EmbeddingProvider>(), Err(()));
    }

    #[test]
    fn missing_optional_values_fall_back_to_none() {
        let value: Option<u64> =
            parse_optional("RUSTY_CACHE_TEST_UNSET_VARIABLE").expect("parse optional");
        assert_eq!(value, None);
        assert_eq!(
            parse_flag("RUSTY_CACHE_TEST_UNSET_FLAG").expect("parse flag"),
            None
        );
    }
}
