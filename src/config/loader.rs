//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::{AuditMode, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::observability::logging::Level;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value {value:?} for {name}: {reason}")]
    Env {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override and validate the configuration.
///
/// The optional TOML file is the base layer, `env` (normally
/// `std::env::vars()`) overrides it. Empty variables count as unset.
pub fn load_config<I>(path: Option<&Path>, env: I) -> Result<ServiceConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ServiceConfig::default(),
    };

    apply_env(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply recognised environment variables on top of `config`.
pub fn apply_env<I>(config: &mut ServiceConfig, env: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (name, value) in env {
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }

        match name.as_str() {
            "PORT" => config.server.port = parse("PORT", &value)?,
            "HOST" => config.server.host = Some(value),
            "NODE_ENV" => config.environment = value,
            "FRONTEND_URL" => config.cors.frontend_url = value,
            "LOG_LEVEL" => config.logging.level = parse::<Level>("LOG_LEVEL", &value)?,
            "LOG_DIR" => config.logging.directory = PathBuf::from(value),
            "REQUEST_LOG_MODE" => {
                config.logging.request_log = parse::<AuditMode>("REQUEST_LOG_MODE", &value)?
            }
            "RENDER_EXTERNAL_HOSTNAME" => config.public_hostname = Some(value),
            "RATE_LIMIT_MAX" => {
                config.rate_limit.max_requests = Some(parse("RATE_LIMIT_MAX", &value)?)
            }
            "RATE_LIMIT_WINDOW_SECS" => {
                config.rate_limit.window_secs = parse("RATE_LIMIT_WINDOW_SECS", &value)?
            }
            "BODY_LIMIT_BYTES" => config.body.limit_bytes = parse("BODY_LIMIT_BYTES", &value)?,
            "EXPOSE_STACK_TRACES" => {
                config.errors.expose_stack_traces = Some(parse_flag("EXPOSE_STACK_TRACES", &value)?)
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Env {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            name,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

impl FromStr for AuditMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(AuditMode::All),
            "errors" | "error-only" => Ok(AuditMode::Errors),
            other => Err(format!("unknown request log mode {other:?}")),
        }
    }
}
