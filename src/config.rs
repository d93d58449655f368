// Application configuration
// Built once from the environment at startup and injected into the services that need it

use std::time::Duration;
use thiserror::Error;

/// Longest accepted access or refresh token lifetime
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub token: TokenConfig,
    pub password: PasswordConfig,
    pub media: MediaConfig,
    /// Upper bound on every call to the database, the hasher or the media host
    pub external_call_timeout: Duration,
}

/// HTTP listener and transport settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Whether session cookies carry the `Secure` attribute
    pub cookie_secure: bool,
    pub cors_origin: Option<String>,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub name: Option<String>,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Connection string with the optional database name appended as the path
    pub fn connection_string(&self) -> String {
        match &self.name {
            Some(name) => format!("{}/{}", self.url.trim_end_matches('/'), name),
            None => self.url.clone(),
        }
    }
}

/// Signing secrets and lifetimes for both token classes
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_ttl: Duration,
    pub refresh_secret: String,
    pub refresh_ttl: Duration,
}

// Secrets stay out of logs.
impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_secret", &"<redacted>")
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Argon2 work factor
#[derive(Debug, Clone, Copy)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Directory uploaded assets are copied into
    pub root: String,
    /// Public URL prefix the assets are served under
    pub base_url: String,
}

impl AppConfig {
    /// Read the full configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PORT", 8000u16)?;

        let access_secret = required("ACCESS_TOKEN_SECRET")?;
        let refresh_secret = required("REFRESH_TOKEN_SECRET")?;
        if access_secret == refresh_secret {
            return Err(ConfigError::Invalid {
                name: "REFRESH_TOKEN_SECRET",
                value: "<redacted>".to_string(),
                reason: "must differ from ACCESS_TOKEN_SECRET".to_string(),
            });
        }

        let access_ttl = token_ttl_or("ACCESS_TOKEN_EXPIRY", "1d")?;
        let refresh_ttl = token_ttl_or("REFRESH_TOKEN_EXPIRY", "10d")?;

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: parse_or("PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or("PASSWORD_HASH_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or("PASSWORD_HASH_PARALLELISM", defaults.parallelism)?,
        };

        let media_base_url = optional("MEDIA_BASE_URL")
            .unwrap_or_else(|| format!("http://{}:{}/media", host, port));

        Ok(Self {
            server: ServerConfig {
                host,
                port,
                cookie_secure: parse_or("COOKIE_SECURE", true)?,
                cors_origin: optional("CORS_ORIGIN"),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                name: optional("DATABASE_NAME"),
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5u32)?,
            },
            token: TokenConfig {
                access_secret,
                access_ttl,
                refresh_secret,
                refresh_ttl,
            },
            password,
            media: MediaConfig {
                root: optional("MEDIA_ROOT").unwrap_or_else(|| "./public/media".to_string()),
                base_url: media_base_url,
            },
            external_call_timeout: Duration::from_secs(parse_or("EXTERNAL_CALL_TIMEOUT_SECS", 10u64)?),
        })
    }
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            })
        }
        None => Ok(default),
    }
}

fn token_ttl_or(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let value = optional(name).unwrap_or_else(|| default.to_string());
    parse_token_ttl(&value).map_err(|reason| ConfigError::Invalid {
        name,
        value: value.clone(),
        reason,
    })
}

/// Parse a token lifetime, capped at `MAX_TOKEN_TTL`
pub fn parse_token_ttl(input: &str) -> Result<Duration, String> {
    let ttl = parse_duration(input)?;
    if ttl > MAX_TOKEN_TTL {
        return Err(format!(
            "token lifetime may not exceed {} days",
            MAX_TOKEN_TTL.as_secs() / (24 * 60 * 60)
        ));
    }
    Ok(ttl)
}

/// Parse a lifetime such as `15m`, `1d`, `3600s`, `12h` or a bare number of seconds
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let amount: u64 = digits
        .parse()
        .map_err(|_| "expected a number followed by an optional s, m, h or d unit".to_string())?;

    let multiplier = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => return Err(format!("unknown duration unit '{}'", other)),
    };

    if amount == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    amount
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| "duration is too large".to_string())
}
