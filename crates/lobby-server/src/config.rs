use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use lobby_gateway::GatewayConfig;

pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub admins: Vec<String>,
    pub gateway: GatewayConfig,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn admin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Read `LOBBY_*` variables. Call after `dotenvy::dotenv()`.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = GatewayConfig::default();
        Ok(Self {
            host: var_or("LOBBY_HOST", "0.0.0.0"),
            port: parsed("LOBBY_PORT", 3000)?,
            db_path: PathBuf::from(var_or("LOBBY_DB_PATH", "lobby.db")),
            jwt_secret: var_or("LOBBY_JWT_SECRET", DEV_JWT_SECRET),
            token_ttl_days: parsed("LOBBY_TOKEN_TTL_DAYS", 30)?,
            admins: admin_list(&var_or("LOBBY_ADMINS", "")),
            gateway: GatewayConfig {
                history_limit: parsed("LOBBY_HISTORY_LIMIT", defaults.history_limit)?,
                store_timeout: Duration::from_millis(parsed("LOBBY_STORE_TIMEOUT_MS", 5000)?),
                auth_timeout: Duration::from_secs(parsed("LOBBY_AUTH_TIMEOUT_SECS", 60)?),
                heartbeat_interval: Duration::from_secs(parsed("LOBBY_HEARTBEAT_SECS", 15)?),
            },
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_list_skips_blanks() {
        assert_eq!(admin_list(" alice, ,bob,"), vec!["alice", "bob"]);
        assert!(admin_list("").is_empty());
    }
}
