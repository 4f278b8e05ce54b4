//! Server configuration from environment variables.
//!
//! `.env` is loaded by `main` before [`Config::from_env`] runs.

use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use alumni_backend::DEFAULT_EMAIL_API_URL;
use alumni_core::ServiceConfig;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
pub const DEFAULT_SERVICE_NAME: &str = "alumni-admin";
pub const DEFAULT_EMAIL_FROM: &str = "Alumni Portal <noreply@alumni.local>";

/// Email provider settings; present only when `EMAIL_API_KEY` is set.
#[derive(Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub baas_url: String,
    pub service_role_key: String,
    pub bind_addr: String,
    pub service_name: String,
    pub admin_token: Option<String>,
    pub step_timeout: Duration,
    pub claim_ttl: Duration,
    pub db_max_connections: u32,
    pub email: Option<EmailConfig>,
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("baas_url", &self.baas_url)
            .field("bind_addr", &self.bind_addr)
            .field("service_name", &self.service_name)
            .field("admin_auth", &self.admin_token.is_some())
            .field("step_timeout", &self.step_timeout)
            .field("claim_ttl", &self.claim_ttl)
            .field("db_max_connections", &self.db_max_connections)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| {
            get(key).with_context(|| format!("{} environment variable not set", key))
        };

        let email = match get("EMAIL_API_KEY") {
            Some(api_key) => Some(EmailConfig {
                api_url: get("EMAIL_API_URL").unwrap_or_else(|| DEFAULT_EMAIL_API_URL.to_string()),
                api_key,
                from: get("EMAIL_FROM").unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()),
            }),
            None => None,
        };

        let config = Self {
            database_url: required("DATABASE_URL")?,
            baas_url: required("BAAS_URL")?,
            service_role_key: required("BAAS_SERVICE_ROLE_KEY")?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            service_name: get("SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            admin_token: get("ADMIN_API_TOKEN"),
            step_timeout: Duration::from_millis(parse_or(&get, "STEP_TIMEOUT_MS", 10_000)?),
            claim_ttl: Duration::from_secs(parse_or(&get, "CLAIM_TTL_SECS", 300)?),
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 5)?,
            email,
        };
        config
            .service_config()
            .validate()
            .context("invalid STEP_TIMEOUT_MS / CLAIM_TTL_SECS")?;
        Ok(config)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            step_timeout: self.step_timeout,
            claim_ttl: self.claim_ttl,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("invalid {} '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}
