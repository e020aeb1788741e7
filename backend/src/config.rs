use std::env;
use std::path::PathBuf;

use crate::engine::RevealPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub persist_path: Option<PathBuf>,
    pub reveal_policy: RevealPolicy,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            persist_path: None,
            reveal_policy: RevealPolicy::default(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let reveal_policy = match lookup("REVEAL_POLICY") {
            Some(raw) => raw.parse::<RevealPolicy>().map_err(|reason| ConfigError::Invalid {
                key: "REVEAL_POLICY",
                reason,
            })?,
            None => defaults.reveal_policy,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    reason: format!("expected `pretty` or `json`, got `{other}`"),
                })
            }
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.bind_addr),
            persist_path: lookup("PERSIST_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            reveal_policy,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
        })
    }
}
