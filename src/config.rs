use std::env;

use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_MIN_CREDENTIAL_LENGTH: usize = 6;

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketingConfig {
    /// PostgreSQL connection string; `None` means no database is configured.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub min_credential_length: usize,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_credential_length: DEFAULT_MIN_CREDENTIAL_LENGTH,
        }
    }
}

impl TicketingConfig {
    /// Reads `DATABASE_URL`, `TICKETING_DB_MAX_CONNECTIONS` and
    /// `TICKETING_MIN_CREDENTIAL_LENGTH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let max_connections = parse_var(&lookup, "TICKETING_DB_MAX_CONNECTIONS")?
            .unwrap_or(defaults.max_connections);
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "TICKETING_DB_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }
        let min_credential_length = parse_var(&lookup, "TICKETING_MIN_CREDENTIAL_LENGTH")?
            .unwrap_or(defaults.min_credential_length);

        Ok(Self {
            database_url,
            max_connections,
            min_credential_length,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value })
        })
        .transpose()
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = TicketingConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, TicketingConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = TicketingConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/helpdesk"),
            ("TICKETING_DB_MAX_CONNECTIONS", "12"),
            ("TICKETING_MIN_CREDENTIAL_LENGTH", " 8 "),
        ]))
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/helpdesk"));
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.min_credential_length, 8);
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = TicketingConfig::from_lookup(lookup(&[("TICKETING_DB_MAX_CONNECTIONS", "many")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "TICKETING_DB_MAX_CONNECTIONS has an invalid value: 'many'"
        );

        assert!(TicketingConfig::from_lookup(lookup(&[("TICKETING_DB_MAX_CONNECTIONS", "0")])).is_err());
    }

    #[test]
    fn blank_database_url_means_none() {
        let config = TicketingConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap();
        assert!(config.database_url.is_none());
    }
}
