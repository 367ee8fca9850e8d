use std::net::SocketAddr;

use anyhow::Context;

use crate::chat::identity;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub session_idle_minutes: i64,
    /// Domain of the synthetic address built from a username.
    pub identifier_domain: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://duet.db?mode=rwc".to_owned(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 16,
            session_idle_minutes: 60,
            identifier_domain: identity::DEFAULT_DOMAIN.to_owned(),
        }
    }
}

impl Config {
    /// Reads `.env` and the process environment over the defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenv::dotenv();
        let mut config = Self::default();

        if let Ok(url) = dotenv::var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(addr) = dotenv::var("BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("BIND_ADDR {addr:?} is not a socket address"))?;
        }
        if let Ok(max) = dotenv::var("MAX_CONNECTIONS") {
            config.max_connections = max
                .parse()
                .with_context(|| format!("MAX_CONNECTIONS {max:?} is not a number"))?;
        }
        if let Ok(minutes) = dotenv::var("SESSION_IDLE_MINUTES") {
            config.session_idle_minutes = minutes
                .parse()
                .with_context(|| format!("SESSION_IDLE_MINUTES {minutes:?} is not a number"))?;
        }
        if let Ok(domain) = dotenv::var("IDENTIFIER_DOMAIN") {
            anyhow::ensure!(
                !domain.is_empty() && !domain.contains('@'),
                "IDENTIFIER_DOMAIN {domain:?} is not a domain"
            );
            config.identifier_domain = domain;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.identifier_domain, "example.com");
        assert!(config.database_url.starts_with("sqlite://"));
    }
}
