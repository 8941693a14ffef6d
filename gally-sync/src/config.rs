use gally_core::Configuration;
use thiserror::Error;

pub const BASE_URL_ENV: &str = "GALLY_BASE_URL";
pub const USER_ENV: &str = "GALLY_USER";
pub const PASSWORD_ENV: &str = "GALLY_PASSWORD";
pub const CHECK_SSL_ENV: &str = "GALLY_CHECK_SSL";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} must be a boolean, got {value:?}")]
    InvalidBool { name: &'static str, value: String },
}

/// Reads the connection settings from the process environment.
pub fn from_env() -> Result<Configuration, ConfigError> {
    from_lookup(|name| std::env::var(name).ok())
}

pub fn from_lookup<F>(lookup: F) -> Result<Configuration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |name: &'static str| {
        lookup(name)
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing(name))
    };
    let check_ssl = match lookup(CHECK_SSL_ENV) {
        Some(value) => read_bool(CHECK_SSL_ENV, &value)?,
        None => true,
    };

    Ok(Configuration {
        base_url: required(BASE_URL_ENV)?,
        user: required(USER_ENV)?,
        password: required(PASSWORD_ENV)?,
        check_ssl,
    })
}

fn read_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}
