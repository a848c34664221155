//! Database configuration read from the environment
//!
//! Every variable starting with the prefix (default `DATABASE_`, matched
//! case-insensitively) configures one pool option. Only `DATABASE_URL` is
//! required.

use std::time::Duration;

use sqlx::{AnyConnection, Database};

use crate::error::{Error, Result};

/// Default environment prefix.
pub const DEFAULT_PREFIX: &str = "database_";

/// Default maximum connections for the pool.
/// Kept low, the same way a single service would size it.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Database backend selected by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    /// Parse the backend from a connection URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split_once(':').map(|(s, _)| s).unwrap_or(url);
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(Error::UnsupportedBackend {
                scheme: other.to_owned(),
            }),
        }
    }

    /// The backend behind an open `Any` connection.
    pub fn from_connection(conn: &AnyConnection) -> Result<Self> {
        let name = conn.backend_name();
        if name == <sqlx::Postgres as Database>::NAME {
            Ok(Self::Postgres)
        } else if name == <sqlx::Sqlite as Database>::NAME {
            Ok(Self::Sqlite)
        } else {
            Err(Error::UnsupportedBackend {
                scheme: name.to_ascii_lowercase(),
            })
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub backend: Backend,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub test_before_acquire: bool,
    /// Tables reflected when the pool is opened.
    pub reflect: Vec<String>,
}

impl DatabaseConfig {
    /// Build a configuration for `url` with default pool options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedBackend`] when the scheme is neither
    /// Postgres nor SQLite.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let backend = Backend::from_url(&url)?;
        Ok(Self {
            url,
            backend,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 0,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            idle_timeout: None,
            max_lifetime: None,
            test_before_acquire: true,
            reflect: Vec::new(),
        })
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Read the configuration from explicit `(key, value)` pairs using the
    /// default prefix.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self::from_vars_with_prefix(DEFAULT_PREFIX, vars)
    }

    /// Read the configuration from explicit pairs, keeping only keys that
    /// start with `prefix`. Keys are lower-cased before matching.
    ///
    /// # Example
    ///
    /// ```
    /// use fastsqlx::DatabaseConfig;
    ///
    /// let config = DatabaseConfig::from_vars([
    ///     ("DATABASE_URL", "sqlite://app.db"),
    ///     ("DATABASE_MAX_CONNECTIONS", "2"),
    /// ])
    /// .unwrap();
    /// assert_eq!(config.max_connections, 2);
    /// ```
    pub fn from_vars_with_prefix<I, K, V>(prefix: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let prefix = prefix.to_ascii_lowercase();
        let options: Vec<(String, String)> = vars
            .into_iter()
            .filter_map(|(k, v)| {
                let key = k.as_ref().to_ascii_lowercase();
                key.strip_prefix(&prefix)
                    .map(|option| (option.to_owned(), v.into()))
            })
            .collect();

        // Later pairs override earlier ones.
        let url = options
            .iter()
            .rev()
            .find(|(option, _)| option == "url")
            .map(|(_, value)| value.clone())
            .ok_or_else(|| Error::MissingConfig {
                key: format!("{prefix}url"),
            })?;

        let mut config = Self::new(url)?;

        for (option, value) in options {
            let key = format!("{prefix}{option}");
            match option.as_str() {
                "url" => {}
                "max_connections" => config.max_connections = parse_number(&key, &value)?,
                "min_connections" => config.min_connections = parse_number(&key, &value)?,
                "acquire_timeout" => config.acquire_timeout = parse_seconds(&key, &value)?,
                "idle_timeout" => config.idle_timeout = Some(parse_seconds(&key, &value)?),
                "max_lifetime" => config.max_lifetime = Some(parse_seconds(&key, &value)?),
                "test_before_acquire" => config.test_before_acquire = parse_bool(&key, &value)?,
                "reflect" => {
                    config.reflect = value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_owned)
                        .collect();
                }
                _ => tracing::debug!(key = %key, "ignoring unknown database option"),
            }
        }

        if config.min_connections > config.max_connections {
            return Err(Error::InvalidConfig {
                key: format!("{prefix}min_connections"),
                reason: format!(
                    "must not exceed max_connections ({})",
                    config.max_connections
                ),
            });
        }

        Ok(config)
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    pub fn test_before_acquire(mut self, test: bool) -> Self {
        self.test_before_acquire = test;
        self
    }

    /// Add a table to reflect at startup.
    pub fn reflect(mut self, table: impl Into<String>) -> Self {
        self.reflect.push(table.into());
        self
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value.trim().parse().map_err(|e| Error::InvalidConfig {
        key: key.to_owned(),
        reason: format!("{e}"),
    })
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration> {
    let secs: f64 = value.trim().parse().map_err(|e| Error::InvalidConfig {
        key: key.to_owned(),
        reason: format!("{e}"),
    })?;
    Duration::try_from_secs_f64(secs).map_err(|e| Error::InvalidConfig {
        key: key.to_owned(),
        reason: format!("{e}"),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidConfig {
            key: key.to_owned(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}
