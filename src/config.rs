use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub scorer: ScorerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:data/blockbuzz.db".to_string()),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 20),
                idle_timeout_secs: parse_env("DATABASE_IDLE_TIMEOUT_SECS", 30),
                acquire_timeout_secs: parse_env("DATABASE_ACQUIRE_TIMEOUT_SECS", 10),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env("SERVER_PORT", 3000),
            },
            embedding: EmbeddingConfig {
                url: env::var("EMBEDDING_API_URL").unwrap_or_else(|_| {
                    "https://api-inference.huggingface.co/pipeline/feature-extraction/Xenova/all-MiniLM-L6-v2"
                        .to_string()
                }),
                api_key: env::var("EMBEDDING_API_KEY").unwrap_or_default(),
                timeout_secs: parse_env("EMBEDDING_TIMEOUT_SECS", 10),
                max_retries: parse_env("EMBEDDING_MAX_RETRIES", 2),
            },
            scorer: ScorerConfig {
                url: env::var("SCORER_API_URL")
                    .unwrap_or_else(|_| "http://localhost:8000/api/recommend".to_string()),
                timeout_secs: parse_env("SCORER_TIMEOUT_SECS", 10),
                max_retries: parse_env("SCORER_MAX_RETRIES", 2),
            },
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl DatabaseConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
