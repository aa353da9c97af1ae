//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use bridge_proto::sanitize_nick;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("irc.host is required")]
    MissingHost,
    #[error("irc.port must be non-zero")]
    InvalidPort,
    #[error("irc.nick has no usable characters: '{0}'")]
    InvalidNick(String),
    #[error("bridge.max_message_len must be non-zero")]
    InvalidMaxMessageLen,
    #[error("bridge.uploads_url must be an http(s) URL, got '{0}'")]
    InvalidUploadsUrl(String),
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.irc.host.trim().is_empty() {
        errors.push(ValidationError::MissingHost);
    }
    if config.irc.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if sanitize_nick(&config.irc.nick, 16).is_empty() {
        errors.push(ValidationError::InvalidNick(config.irc.nick.clone()));
    }

    if config.bridge.max_message_len == 0 {
        errors.push(ValidationError::InvalidMaxMessageLen);
    }
    if let Some(url) = config.bridge.uploads_endpoint()
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        errors.push(ValidationError::InvalidUploadsUrl(url.to_string()));
    }

    if config.database.path != ":memory:" {
        let db_path = Path::new(&config.database.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(
                config.database.path.clone(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> Config {
        Config::parse(toml).unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        assert!(validate(&config("[irc]\nhost = \"irc.example.org\"\n")).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let cfg = config(
            r#"
            [irc]
            host = ""
            port = 0
            nick = "!!!"

            [bridge]
            max_message_len = 0
            uploads_url = "ftp://files"

            [database]
            path = "/definitely/not/here/bridge.db"
            "#,
        );
        let errors = validate(&cfg).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(matches!(errors[0], ValidationError::MissingHost));
        assert!(matches!(errors[5], ValidationError::DatabasePathInvalid(_)));
    }
}
