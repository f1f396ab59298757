//! Publisher and channel authorizer for a hosted pub/sub relay speaking the
//! Pusher Channels HTTP API.
//!
//! Settings come from `TUTOR_RELAY_*` environment variables. Missing values
//! are not checked at startup: the first trigger or authorization that needs
//! one fails with `RelayError::NotConfigured`.

use std::sync::Mutex;
use std::time::Duration;

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, info};

use tutor_types::channel;
use tutor_types::events::RelayEvent;

use crate::error::RelayError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const AUTH_VERSION: &str = "1.0";

#[derive(Debug, Clone, Default)]
pub struct RelaySettings {
    pub app_id: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub cluster: Option<String>,
    /// Overrides the `https://api-<cluster>.pusher.com` base URL.
    pub host: Option<String>,
}

impl RelaySettings {
    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            app_id: get("TUTOR_RELAY_APP_ID"),
            key: get("TUTOR_RELAY_KEY"),
            secret: get("TUTOR_RELAY_SECRET"),
            cluster: get("TUTOR_RELAY_CLUSTER"),
            host: get("TUTOR_RELAY_HOST"),
        }
    }

    /// The hosted relay is in use as soon as any setting is present.
    pub fn is_enabled(&self) -> bool {
        self.app_id.is_some()
            || self.key.is_some()
            || self.secret.is_some()
            || self.cluster.is_some()
            || self.host.is_some()
    }

    fn app_id(&self) -> Result<&str, RelayError> {
        self.app_id.as_deref().ok_or(RelayError::NotConfigured("TUTOR_RELAY_APP_ID"))
    }

    fn key(&self) -> Result<&str, RelayError> {
        self.key.as_deref().ok_or(RelayError::NotConfigured("TUTOR_RELAY_KEY"))
    }

    fn secret(&self) -> Result<&str, RelayError> {
        self.secret.as_deref().ok_or(RelayError::NotConfigured("TUTOR_RELAY_SECRET"))
    }

    fn base_url(&self) -> Result<String, RelayError> {
        if let Some(host) = &self.host {
            return Ok(host.trim_end_matches('/').to_string());
        }
        let cluster = self
            .cluster
            .as_deref()
            .ok_or(RelayError::NotConfigured("TUTOR_RELAY_CLUSTER"))?;
        Ok(format!("https://api-{}.pusher.com", cluster))
    }
}

#[derive(Serialize)]
struct TriggerBody<'a> {
    name: &'a str,
    channels: [&'a str; 1],
    /// The relay wants the payload as a JSON-encoded string.
    data: String,
}

/// Connection to the hosted relay. The HTTP client is created on first use
/// and dropped by `close`; a later call creates a fresh one.
pub struct HostedRelay {
    settings: RelaySettings,
    client: Mutex<Option<reqwest::Client>>,
}

impl HostedRelay {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings,
            client: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    fn client(&self) -> Result<reqwest::Client, RelayError> {
        let mut slot = self.client.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        info!("Hosted relay client initialised");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Drop the HTTP client. In-flight requests finish on their own clone.
    pub fn close(&self) {
        let mut slot = self.client.lock().unwrap_or_else(|e| e.into_inner());
        if slot.take().is_some() {
            info!("Hosted relay client closed");
        }
    }

    /// Signed subscription token for a relay client socket.
    ///
    /// Only checks the shape of its inputs; the caller decides whether the
    /// requester may join the channel.
    pub fn authorize(&self, socket_id: &str, channel_name: &str) -> Result<String, RelayError> {
        if !is_valid_socket_id(socket_id) {
            return Err(RelayError::InvalidSocketId(socket_id.to_string()));
        }
        if channel::parse_channel_name(channel_name).is_none() {
            return Err(RelayError::InvalidChannel(channel_name.to_string()));
        }
        let key = self.settings.key()?;
        let secret = self.settings.secret()?;
        sign_channel(key, secret, socket_id, channel_name)
    }

    /// Publish one event on one channel.
    pub async fn trigger(&self, channel_name: &str, event: &RelayEvent) -> Result<(), RelayError> {
        let app_id = self.settings.app_id()?;
        let key = self.settings.key()?;
        let secret = self.settings.secret()?;
        let base_url = self.settings.base_url()?;

        let body = serde_json::to_string(&TriggerBody {
            name: event.name(),
            channels: [channel_name],
            data: serde_json::to_string(&event.data()?)?,
        })?;

        let path = format!("/apps/{}/events", app_id);
        let timestamp = chrono::Utc::now().timestamp();
        let query = signed_query(key, secret, "POST", &path, &body, timestamp)?;

        let response = self
            .client()?
            .post(format!("{}{}?{}", base_url, path, query))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        debug!("Hosted relay accepted {} on {}", event.name(), channel_name);
        Ok(())
    }
}

/// `<digits>.<digits>`, as handed out by the relay to each client socket.
fn is_valid_socket_id(socket_id: &str) -> bool {
    let Some((a, b)) = socket_id.split_once('.') else {
        return false;
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    digits(a) && digits(b)
}

fn hmac_hex(secret: &str, payload: &str) -> Result<String, RelayError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| RelayError::NotConfigured("TUTOR_RELAY_SECRET"))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// `<key>:<hex hmac-sha256(secret, "<socket_id>:<channel>")>`
pub fn sign_channel(
    key: &str,
    secret: &str,
    socket_id: &str,
    channel_name: &str,
) -> Result<String, RelayError> {
    let signature = hmac_hex(secret, &format!("{}:{}", socket_id, channel_name))?;
    Ok(format!("{}:{}", key, signature))
}

/// Query string for a signed REST call, `auth_signature` last.
///
/// The signed string is `METHOD\nPATH\n<params sorted by key>`.
pub fn signed_query(
    key: &str,
    secret: &str,
    method: &str,
    path: &str,
    body: &str,
    timestamp: i64,
) -> Result<String, RelayError> {
    let body_md5 = hex::encode(Md5::digest(body.as_bytes()));
    let query = format!(
        "auth_key={}&auth_timestamp={}&auth_version={}&body_md5={}",
        key, timestamp, AUTH_VERSION, body_md5
    );
    let signature = hmac_hex(secret, &format!("{}\n{}\n{}", method, path, query))?;
    Ok(format!("{}&auth_signature={}", query, signature))
}
