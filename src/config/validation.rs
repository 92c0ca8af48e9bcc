//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde and the env parser handle syntax)
//! - Validate value ranges (ports, windows, limits > 0)
//! - Check the CORS origin is a usable origin
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use url::Url;

use crate::config::schema::ServiceConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(ValidationError::new("server.port", "must be greater than zero"));
    }

    if let Some(reason) = origin_problem(&config.cors.frontend_url) {
        errors.push(ValidationError::new("cors.frontend_url", reason));
    }

    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.window_secs",
            "must be greater than zero",
        ));
    }

    if config.rate_limit.max_requests == Some(0) {
        errors.push(ValidationError::new(
            "rate_limit.max_requests",
            "must be greater than zero",
        ));
    }

    if config.body.limit_bytes == 0 {
        errors.push(ValidationError::new("body.limit_bytes", "must be greater than zero"));
    }

    if config.logging.service_name.trim().is_empty() {
        errors.push(ValidationError::new("logging.service_name", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn origin_problem(origin: &str) -> Option<String> {
    let url = match Url::parse(origin) {
        Ok(url) => url,
        Err(e) => return Some(format!("not a valid URL ({e})")),
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Some(format!("unsupported scheme {:?}", url.scheme()));
    }
    if url.host_str().is_none() {
        return Some("missing host".to_string());
    }
    if url.path() != "/" || url.query().is_some() {
        return Some("an origin must not carry a path or query".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_problem() {
        let mut config = ServiceConfig::default();
        config.server.port = 0;
        config.rate_limit.window_secs = 0;
        config.body.limit_bytes = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["server.port", "rate_limit.window_secs", "body.limit_bytes"]
        );
    }

    #[test]
    fn rejects_origins_with_paths() {
        let mut config = ServiceConfig::default();
        config.cors.frontend_url = "https://app.example.com/login".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "cors.frontend_url");
    }

    #[test]
    fn rejects_non_http_origins() {
        let mut config = ServiceConfig::default();
        config.cors.frontend_url = "ftp://files.example.com".into();
        assert!(validate_config(&config).is_err());

        config.cors.frontend_url = "not a url".into();
        assert!(validate_config(&config).is_err());
    }
}
