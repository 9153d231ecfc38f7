use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use axum::http::HeaderValue;
use thiserror::Error;

use crate::rate_limit::{AttemptLimit, RateLimitAction, RateLimitPolicy};

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:8080",
    "http://localhost:8081",
    "http://localhost:8000",
    "http://127.0.0.1:8000",
    "http://127.0.0.1:8080",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: `{value}`")]
    Invalid { key: &'static str, value: String },

    #[error("failed to read breach corpus at {path}: {source}")]
    BreachCorpus {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub breach_corpus_path: Option<PathBuf>,
    pub allowed_origins: Vec<HeaderValue>,
    pub log_format: LogFormat,
    pub rate_limits: RateLimitPolicy,
    pub purge_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };

        let origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect());

        let allowed_origins = origins
            .into_iter()
            .map(|origin| {
                HeaderValue::from_str(&origin).map_err(|_| ConfigError::Invalid {
                    key: "CORS_ALLOWED_ORIGINS",
                    value: origin.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Plain,
        };

        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            port,
            database_url: non_empty("DATABASE_URL"),
            breach_corpus_path: non_empty("BREACH_CORPUS_PATH").map(PathBuf::from),
            allowed_origins,
            log_format,
            rate_limits: rate_limits_from(&lookup),
            purge_interval: Duration::from_secs(lookup_u64(
                &lookup,
                "RATE_LIMIT_PURGE_INTERVAL_SECONDS",
                60,
            )),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

/// `RATE_LIMIT_<ACTION>_MAX_ATTEMPTS` and `RATE_LIMIT_<ACTION>_WINDOW_SECONDS`
/// override the built-in limits per action.
pub fn rate_limits_from(lookup: &impl Fn(&str) -> Option<String>) -> RateLimitPolicy {
    RateLimitAction::ALL
        .iter()
        .fold(RateLimitPolicy::default(), |policy, action| {
            let default = action.default_limit();
            let name = action.env_name();
            let max_attempts = lookup_u32(
                lookup,
                &format!("RATE_LIMIT_{name}_MAX_ATTEMPTS"),
                default.max_attempts,
            );
            let window = lookup_u64(
                lookup,
                &format!("RATE_LIMIT_{name}_WINDOW_SECONDS"),
                default.window.as_secs(),
            );
            policy.with_limit(*action, AttemptLimit::new(max_attempts, Duration::from_secs(window)))
        })
}

fn lookup_u32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    match lookup(key) {
        Some(raw) => match raw.parse::<u32>() {
            Ok(value) if value > 0 => value,
            _ => {
                tracing::warn!("Invalid value for {key} (`{raw}`), using default {default}");
                default
            }
        },
        None => default,
    }
}

fn lookup_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    match lookup(key) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(value) if value > 0 => value,
            _ => {
                tracing::warn!("Invalid value for {key} (`{raw}`), using default {default}");
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_rate_limit_overrides() {
        let policy = rate_limits_from(&vars(&[
            ("RATE_LIMIT_PASSWORD_RESET_MAX_ATTEMPTS", "7"),
            ("RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS", "not-a-number"),
        ]));

        let limit = policy.limit_for(RateLimitAction::PasswordReset);
        assert_eq!(limit.max_attempts, 7);
        assert_eq!(limit.window, Duration::from_secs(3600));
        assert_eq!(
            policy.limit_for(RateLimitAction::Login),
            RateLimitAction::Login.default_limit()
        );
    }

    #[test]
    fn test_zero_is_rejected() {
        assert_eq!(lookup_u32(&vars(&[("ATTEMPTS", "0")]), "ATTEMPTS", 5), 5);
        assert_eq!(lookup_u64(&vars(&[]), "ATTEMPTS", 9), 9);
    }

    #[test]
    fn test_defaults_without_any_variables() {
        let config = AppConfig::from_lookup(vars(&[])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.allowed_origins.len(), DEFAULT_ALLOWED_ORIGINS.len());
        assert_eq!(config.log_format, LogFormat::Plain);
        assert!(config.database_url.is_none());
        assert_eq!(config.purge_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_blank_database_url_is_ignored() {
        let config = AppConfig::from_lookup(vars(&[
            ("DATABASE_URL", "   "),
            ("LOG_FORMAT", "json"),
            ("CORS_ALLOWED_ORIGINS", "https://app.example.com, "),
        ]))
        .unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.allowed_origins, vec![HeaderValue::from_static("https://app.example.com")]);
    }

    #[test]
    fn test_invalid_port_is_fatal() {
        let err = AppConfig::from_lookup(vars(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }
}
