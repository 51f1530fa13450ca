//! # Database Configuration
//!
//! Connection parameters are read from the environment and validated as a
//! unit: every missing parameter is reported in one error, never just the
//! first. Validation is driven by [`Database`](crate::database::Database),
//! which runs it lazily on first engine access rather than at process start.

use crate::error::ConfigurationError;
use std::fmt;

pub const DB_HOST: &str = "DB_HOST";
pub const DB_PORT: &str = "DB_PORT";
pub const DB_NAME: &str = "DB_NAME";
pub const DB_USER: &str = "DB_USER";
pub const DB_PASSWORD: &str = "DB_PASSWORD";
pub const LOG_LEVEL: &str = "LOG_LEVEL";

/// Required parameters, in the order they are reported when missing.
pub const REQUIRED_PARAMETERS: [&str; 5] = [DB_HOST, DB_PORT, DB_NAME, DB_USER, DB_PASSWORD];

/// Scheme for the pooled, async request-path engine.
pub const POOLED_SCHEME: &str = "postgres";
/// Scheme for the one-shot administrative engine.
pub const ADMIN_SCHEME: &str = "postgresql";

/// Validated connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Echo every statement through the logger (`LOG_LEVEL=debug`).
    pub echo_statements: bool,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("echo_statements", &self.echo_statements)
            .finish()
    }
}

impl DbConfig {
    /// Read and validate the parameters from the process environment.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read and validate the parameters through an arbitrary lookup.
    ///
    /// Absent values and values that are empty after trimming both count as
    /// missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let values = REQUIRED_PARAMETERS.map(|name| read(name));
        let missing: Vec<&'static str> = REQUIRED_PARAMETERS
            .iter()
            .zip(values.iter())
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(ConfigurationError::Missing { missing });
        }

        let [host, port, database, user, password] = values.map(Option::unwrap_or_default);

        let port = parse_port(&port)?;
        let echo_statements = lookup(LOG_LEVEL)
            .map(|level| level.trim().eq_ignore_ascii_case("debug"))
            .unwrap_or(false);

        Ok(Self {
            host: host.trim().to_string(),
            port,
            database: database.trim().to_string(),
            user,
            password,
            echo_statements,
        })
    }

    /// Connection string for the pooled engine.
    pub fn pooled_url(&self) -> String {
        self.url_with_scheme(POOLED_SCHEME, &urlencoding::encode(&self.password))
    }

    /// Connection string for the administrative engine.
    pub fn admin_url(&self) -> String {
        self.url_with_scheme(ADMIN_SCHEME, &urlencoding::encode(&self.password))
    }

    /// Pooled connection string with the password masked, safe for logs.
    pub fn redacted_url(&self) -> String {
        self.url_with_scheme(POOLED_SCHEME, "***")
    }

    /// `database@host:port`, used as the target label in logs and errors.
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.database, self.host, self.port)
    }

    fn url_with_scheme(&self, scheme: &str, password: &str) -> String {
        format!(
            "{scheme}://{}:{password}@{}:{}/{}",
            urlencoding::encode(&self.user),
            self.host,
            self.port,
            self.database
        )
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigurationError> {
    match raw.trim().parse::<u16>() {
        Ok(0) => Err(ConfigurationError::InvalidParameter {
            name: DB_PORT,
            reason: "port must be non-zero".to_string(),
        }),
        Ok(port) => Ok(port),
        Err(e) => Err(ConfigurationError::InvalidParameter {
            name: DB_PORT,
            reason: format!("'{raw}' is not a valid port: {e}"),
        }),
    }
}
