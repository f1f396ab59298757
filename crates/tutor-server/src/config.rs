use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use tutor_relay::RelaySettings;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub relay: RelaySettings,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("TUTOR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("TUTOR_JWT_SECRET is unset or still a placeholder; it must match the platform's token secret");
        }

        let host = lookup("TUTOR_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("TUTOR_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("TUTOR_PORT is not a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let db_path = lookup("TUTOR_DB_PATH").unwrap_or_else(|| "tutor.db".into()).into();

        let relay = RelaySettings::from_lookup(&lookup);

        Ok(Self {
            addr,
            db_path,
            jwt_secret,
            relay,
        })
    }
}
