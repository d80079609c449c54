use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::twitch::ID_BASE;

pub const SCOPE_READ_UNBAN_REQUESTS: &str = "moderator:read:unban_requests";
pub const SCOPE_MANAGE_UNBAN_REQUESTS: &str = "moderator:manage:unban_requests";

const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

pub type AuthResult<T> = core::result::Result<T, AuthErr>;

#[derive(Debug, Error)]
pub enum AuthErr {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("failed to read .env: {0}")]
    Env(#[from] dotenvy::Error),

    #[error("error response code from token endpoint: {status}")]
    TokenEndpoint { status: u16, body: Value },

    #[error("device authorization expired after {attempts} polls")]
    DeviceFlowTimeout { attempts: u64 },
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn from_env() -> AuthResult<Self> {
        Ok(Self {
            client_id: dotenvy::var("TWITCH_CLIENT_ID")?,
            client_secret: dotenvy::var("TWITCH_CLIENT_SECRET")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppToken {
    pub access_token: String,
    pub expires_in: u64,
    pub token_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceGrant {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserToken {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub scope: Vec<String>,
}

/// OAuth client against Twitch's id service.
#[derive(Debug, Clone)]
pub struct TwitchAuth {
    client: reqwest::Client,
    base: String,
    credentials: Credentials,
}

impl TwitchAuth {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_base(ID_BASE, credentials)
    }

    /// Used by tests to point the client at a local mock.
    pub fn with_base(base: &str, credentials: Credentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.to_string(),
            credentials,
        }
    }

    #[instrument(skip(self))]
    /// App access token via the client credentials grant, for server-to-server
    /// calls such as subscription management.
    pub async fn fetch_app_token(&self) -> AuthResult<AppToken> {
        let res = self
            .client
            .post(format!("{}/oauth2/token", self.base))
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(token_error(res).await);
        }

        Ok(res.json().await?)
    }

    #[instrument(skip(self))]
    /// First half of the device code grant: ask Twitch for a user code the
    /// account holder enters in their browser.
    pub async fn start_device_flow(&self, scopes: &str) -> AuthResult<DeviceGrant> {
        let res = self
            .client
            .post(format!("{}/oauth2/device", self.base))
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("scopes", scopes),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(token_error(res).await);
        }

        Ok(res.json().await?)
    }

    #[instrument(skip(self, grant))]
    /// Second half of the device code grant. Polls at the server-provided
    /// interval and gives up once the grant's lifetime has elapsed rather
    /// than polling forever.
    pub async fn poll_device_token(
        &self,
        grant: &DeviceGrant,
        scopes: &str,
    ) -> AuthResult<UserToken> {
        let interval = grant.interval.max(1);
        let max_attempts = (grant.expires_in / interval).max(1);

        for attempt in 0..max_attempts {
            tokio::time::sleep(Duration::from_secs(interval)).await;

            let res = self
                .client
                .post(format!("{}/oauth2/token", self.base))
                .form(&[
                    ("client_id", self.credentials.client_id.as_str()),
                    ("scopes", scopes),
                    ("device_code", grant.device_code.as_str()),
                    ("grant_type", DEVICE_GRANT_TYPE),
                ])
                .send()
                .await?;

            // 400 means the user has not finished authorizing yet
            if res.status() == 400 {
                debug!(attempt, "device authorization pending");
                continue;
            }

            if !res.status().is_success() {
                return Err(token_error(res).await);
            }

            return Ok(res.json().await?);
        }

        Err(AuthErr::DeviceFlowTimeout {
            attempts: max_attempts,
        })
    }
}

async fn token_error(res: reqwest::Response) -> AuthErr {
    let status = res.status().as_u16();

    match res.json::<Value>().await {
        Ok(body) => AuthErr::TokenEndpoint { status, body },
        Err(e) => AuthErr::Reqwest(e),
    }
}
