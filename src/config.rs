use std::{fmt::Display, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::Context;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://cardkeep.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Runtime settings, read from the process environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    /// Upper bound on waiting for a pooled connection.
    pub acquire_timeout: Duration,
    /// Upper bound on waiting for a SQLite lock.
    pub busy_timeout: Duration,
    pub log_filter: String,
    pub discord: Option<DiscordConfig>,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let discord = match (
            dotenv::var("DISCORD_CLIENT_ID"),
            dotenv::var("DISCORD_CLIENT_SECRET"),
        ) {
            (Ok(client_id), Ok(client_secret)) => Some(DiscordConfig {
                client_id,
                client_secret,
                redirect_url: var_or(
                    "DISCORD_REDIRECT_URL",
                    "http://localhost:8080/lockin/discord".to_owned(),
                )?,
            }),
            _ => None,
        };

        Ok(Config {
            database_url: var_or("DATABASE_URL", DEFAULT_DATABASE_URL.to_owned())?,
            bind_addr: var_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            max_connections: var_or("MAX_CONNECTIONS", 16)?,
            acquire_timeout: Duration::from_secs(var_or("ACQUIRE_TIMEOUT_SECS", 5)?),
            busy_timeout: Duration::from_secs(var_or("BUSY_TIMEOUT_SECS", 5)?),
            log_filter: var_or("RUST_LOG", "info".to_owned())?,
            discord,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: DEFAULT_DATABASE_URL.to_owned(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 16,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            log_filter: "info".to_owned(),
            discord: None,
        }
    }
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match dotenv::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value for {key}: {value:?}")),
        Err(_) => Ok(default),
    }
}
