use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub groq_api_key: Option<String>,
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub max_concurrent_tasks: usize,
    pub llm_max_retries: u32,
    pub llm_retry_backoff_ms: u64,
    pub llm_timeout_secs: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub metrics_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            database_url: None,
            host: "0.0.0.0".to_string(),
            port: 8000,
            model: "llama-3.3-70b-versatile".to_string(),
            max_concurrent_tasks: 10,
            llm_max_retries: 3,
            llm_retry_backoff_ms: 500,
            llm_timeout_secs: 300,
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            metrics_interval_secs: 60,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Config file first, then environment overrides on top.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut config = if path.as_ref().exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            if !key.is_empty() {
                self.groq_api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                self.database_url = Some(url);
            }
        }
        if let Ok(host) = std::env::var("MAESTRO_HOST") {
            self.host = host;
        }
        if let Some(port) = env_parse("MAESTRO_PORT") {
            self.port = port;
        }
        if let Ok(model) = std::env::var("MAESTRO_MODEL") {
            self.model = model;
        }
        if let Some(n) = env_parse("MAESTRO_MAX_CONCURRENT_TASKS") {
            self.max_concurrent_tasks = n;
        }
        if let Some(n) = env_parse("MAESTRO_LLM_MAX_RETRIES") {
            self.llm_max_retries = n;
        }
        if let Some(n) = env_parse("MAESTRO_LLM_RETRY_BACKOFF_MS") {
            self.llm_retry_backoff_ms = n;
        }
        if let Some(n) = env_parse("MAESTRO_CHUNK_SIZE") {
            self.chunk_size = n;
        }
        if let Some(n) = env_parse("MAESTRO_CHUNK_OVERLAP") {
            self.chunk_overlap = n;
        }
        if let Some(n) = env_parse("MAESTRO_TOP_K") {
            self.top_k = n;
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.llm_retry_backoff_ms)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_concurrent_tasks, 10);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let config = Config::load("/nonexistent/maestro.toml").unwrap();
        assert_eq!(config.top_k, 5);
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9001\nmax_concurrent_tasks = 3").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.max_concurrent_tasks, 3);
        // untouched keys keep their defaults
        assert_eq!(config.chunk_size, 1000);
    }
}
