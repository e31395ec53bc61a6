use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

fn var(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub token_path: PathBuf,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout = parse("SPLITEX_TIMEOUT_SECS", var("SPLITEX_TIMEOUT_SECS"), 30u64)?;
        Ok(Self {
            api_url: var("SPLITEX_API_URL")
                .unwrap_or_else(|| "http://127.0.0.1:3000/api".to_string())
                .trim_end_matches('/')
                .to_string(),
            token_path: var("SPLITEX_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".splitex_token")),
            timeout: Duration::from_secs(timeout),
        })
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub mongodb_uri: String,
    pub database: String,
    pub bind_address: String,
    pub port: u16,
    pub secret_key: Vec<u8>,
    pub token_ttl_days: i64,
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_key = match var("SECRET_KEY") {
            Some(secret) => secret.into_bytes(),
            // Tokens do not survive a restart without a configured key
            None => (0..64).map(|_| rand::random::<u8>()).collect(),
        };
        Ok(Self {
            mongodb_uri: var("MONGODB_URI").ok_or(ConfigError::Missing("MONGODB_URI"))?,
            database: var("SPLITEX_DATABASE").unwrap_or_else(|| "Splitex".to_string()),
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse("PORT", var("PORT"), 3000)?,
            secret_key,
            token_ttl_days: parse("TOKEN_TTL_DAYS", var("TOKEN_TTL_DAYS"), 14)?,
            allowed_origins: var("ALLOWED_ORIGINS")
                .map(|origins| split_origins(&origins))
                .unwrap_or_else(|| {
                    vec![
                        "http://localhost:5173".to_string(),
                        "http://127.0.0.1:5173".to_string(),
                    ]
                }),
        })
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
