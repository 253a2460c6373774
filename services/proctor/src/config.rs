//! services/proctor/src/config.rs
//!
//! Defines the proctor's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

pub const MIN_CODE_LENGTH: usize = 4;
pub const MAX_CODE_LENGTH: usize = 12;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: Level,
    pub fixtures_path: PathBuf,
    pub token_ttl_seconds: u32,
    pub token_code_length: usize,
    /// Interval used when an issue command asks for rotation without naming one.
    pub default_rotation_seconds: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            fixtures_path: PathBuf::from("./fixtures/school.json"),
            token_ttl_seconds: 3600,
            token_code_length: 6,
            default_rotation_seconds: 300,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from any variable source; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_level = match lookup("RUST_LOG") {
            Some(raw) => raw.parse::<Level>().map_err(|_| {
                ConfigError::InvalidValue(
                    "RUST_LOG".to_string(),
                    format!("'{}' is not a valid log level", raw),
                )
            })?,
            None => defaults.log_level,
        };

        let fixtures_path = lookup("FIXTURES_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.fixtures_path);

        // --- Token Settings ---
        let token_ttl_seconds: u32 =
            parse_var(&lookup, "TOKEN_TTL_SECONDS", defaults.token_ttl_seconds)?;
        require_positive("TOKEN_TTL_SECONDS", token_ttl_seconds)?;

        let token_code_length: usize =
            parse_var(&lookup, "TOKEN_CODE_LENGTH", defaults.token_code_length)?;
        if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&token_code_length) {
            return Err(ConfigError::InvalidValue(
                "TOKEN_CODE_LENGTH".to_string(),
                format!(
                    "{} is outside {}..={}",
                    token_code_length, MIN_CODE_LENGTH, MAX_CODE_LENGTH
                ),
            ));
        }

        let default_rotation_seconds: u32 = parse_var(
            &lookup,
            "DEFAULT_ROTATION_SECONDS",
            defaults.default_rotation_seconds,
        )?;
        require_positive("DEFAULT_ROTATION_SECONDS", default_rotation_seconds)?;

        Ok(Self {
            log_level,
            fixtures_path,
            token_ttl_seconds,
            token_code_length,
            default_rotation_seconds,
        })
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.token_ttl_seconds))
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn require_positive(name: &str, value: u32) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than zero".to_string(),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.token_ttl_seconds, 3600);
        assert_eq!(config.token_code_length, 6);
        assert_eq!(config.default_rotation_seconds, 300);
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("RUST_LOG", "debug"),
            ("FIXTURES_PATH", "/tmp/school.json"),
            ("TOKEN_TTL_SECONDS", "900"),
            ("TOKEN_CODE_LENGTH", "8"),
        ]))
        .unwrap();
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.fixtures_path, PathBuf::from("/tmp/school.json"));
        assert_eq!(config.token_ttl(), chrono::Duration::minutes(15));
        assert_eq!(config.token_code_length, 8);
    }

    #[test]
    fn rejects_bad_values() {
        for pairs in [
            [("RUST_LOG", "loud")],
            [("TOKEN_TTL_SECONDS", "0")],
            [("TOKEN_TTL_SECONDS", "soon")],
            [("TOKEN_CODE_LENGTH", "3")],
            [("DEFAULT_ROTATION_SECONDS", "0")],
        ] {
            assert!(matches!(
                Config::from_lookup(lookup_from(&pairs)),
                Err(ConfigError::InvalidValue(..))
            ));
        }
    }
}
