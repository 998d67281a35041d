use std::{env, fmt, net::SocketAddr};

use super::{
    parse_flag, server_bind_address, DEFAULT_APP_NAME, DEFAULT_DATABASE_URL, DEFAULT_TRUSTED_HOSTS,
};

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" | "local" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" | "testing" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    /// Shown in document titles as `"<page> - <app_name>"`.
    pub app_name: String,
    /// Generate `https` URLs even when the proxy does not flag the request as secure.
    pub force_https: bool,
    /// Hostnames accepted from the `Host` header when building absolute URLs.
    pub trusted_hosts: Vec<String>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        if database_url.trim().is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let app_name = env::var("APP_NAME")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_APP_NAME.to_string());

        let force_https = match env::var("APP_FORCE_HTTPS") {
            Ok(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag {
                name: "APP_FORCE_HTTPS",
                value: raw,
            })?,
            Err(_) => false,
        };

        let trusted_hosts = parse_host_list(
            &env::var("APP_TRUSTED_HOSTS").unwrap_or_else(|_| DEFAULT_TRUSTED_HOSTS.to_string()),
        );

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            app_name,
            force_https,
            trusted_hosts,
        })
    }
}

fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|host| host.trim().to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .collect()
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingDatabaseUrl,
    InvalidFlag { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingDatabaseUrl => write!(f, "DATABASE_URL must not be empty"),
            Self::InvalidFlag { name, value } => {
                write!(f, "{name} must be a boolean flag (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));
