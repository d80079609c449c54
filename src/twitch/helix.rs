use async_trait::async_trait;
use http::header::{AUTHORIZATION, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument};

use crate::twitch::{HELIX_BASE, Subscription, SubscriptionRequest};

pub type HelixResult<T> = core::result::Result<T, HelixErr>;

#[derive(Debug, Error)]
pub enum HelixErr {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("while creating a HeaderValue ({0})")]
    HeaderError(#[from] InvalidHeaderValue),

    #[error("error during deserialization: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("error during helix fetch: {0}")]
    FetchErr(String),

    #[error("error (with detail) during helix fetch: {:#?}", body)]
    FetchErrWithBody { body: Value },

    #[error("error response code from subscription creation endpoint: {0}")]
    SubscriptionCreateError(Value),

    #[error("empty data field")]
    EmptyDataField,
}

/// Authenticated helix client bound to a single bearer token.
#[derive(Debug, Clone)]
pub struct Helix {
    client: reqwest::Client,
    base: String,
    headers: HeaderMap,
}

impl Helix {
    pub fn new(client_id: &str, token: &str) -> HelixResult<Self> {
        Self::with_base(HELIX_BASE, client_id, token)
    }

    /// Used by tests to point the client at a local mock.
    pub fn with_base(base: &str, client_id: &str, token: &str) -> HelixResult<Self> {
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))?;
        let client_id = HeaderValue::from_str(client_id)?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("Client-Id", client_id);

        Ok(Self {
            client: reqwest::Client::new(),
            base: base.to_string(),
            headers,
        })
    }

    #[instrument(skip(self))]
    /// Fetch a single user's Twitch information via their login.
    pub async fn fetch_user_by_login(&self, login: &str) -> HelixResult<HelixUser> {
        let uri = format!("{}/users?login={}", self.base, login.to_lowercase());
        let res: HelixDataResponse<HelixUser> = self.fetch(uri).await?;

        res.data.into_iter().next().ok_or(HelixErr::EmptyDataField)
    }

    #[instrument(skip(self))]
    /// Fetch the user the bearer token was issued to. Requires a user token;
    /// helix rejects the parameterless form for app tokens.
    pub async fn fetch_current_user(&self) -> HelixResult<HelixUser> {
        let uri = format!("{}/users", self.base);
        let res: HelixDataResponse<HelixUser> = self.fetch(uri).await?;

        res.data.into_iter().next().ok_or(HelixErr::EmptyDataField)
    }

    #[instrument(skip(self, uri))]
    /// Performs a GET request to a given URI and parses the response according
    /// to the specified `T` output type
    async fn fetch<T>(&self, uri: String) -> HelixResult<T>
    where
        T: DeserializeOwned,
    {
        let res = self
            .client
            .get(uri)
            .headers(self.headers.clone())
            .send()
            .await?;

        parse_response(res).await
    }
}

async fn parse_response<T>(res: reqwest::Response) -> HelixResult<T>
where
    T: DeserializeOwned,
{
    // if the request was unsuccessful, check to see whether the response
    // contained extra details about the error and return the corresponding
    // detail available
    if res.status() != 200 {
        let status_code = res.status();
        tracing::error!(code = %status_code, "non-200/OK response");

        if let Ok(reason) = res.json::<Value>().await {
            tracing::error!(body = ?reason, "error message in response");
            return Err(HelixErr::FetchErrWithBody { body: reason });
        }

        return Err(HelixErr::FetchErr(status_code.to_string()));
    }

    // log rate limit
    let rl_remaining = res.headers().get("ratelimit-remaining");
    let rl_total = res.headers().get("ratelimit-limit");

    if let Some(remaining) = rl_remaining
        && let Some(total) = rl_total
    {
        tracing::info!(ratelimit_available = ?remaining, ratelimit_total = ?total, "rate-limit bucket");
    }

    Ok(res.json::<T>().await?)
}

#[async_trait]
pub trait SubscriptionManager {
    async fn create(&self, request: &SubscriptionRequest) -> HelixResult<Subscription>;
    async fn current(&self) -> HelixResult<Vec<Subscription>>;
    async fn delete(&self, subscription_id: &str) -> HelixResult<()>;
}

#[async_trait]
impl SubscriptionManager for Helix {
    #[instrument(skip(self, request))]
    async fn create(&self, request: &SubscriptionRequest) -> HelixResult<Subscription> {
        let subs_uri = format!("{}/eventsub/subscriptions", self.base);

        let res = self
            .client
            .post(subs_uri)
            .json(request)
            .headers(self.headers.clone())
            .send()
            .await?;

        if res.status() != 200 && res.status() != 202 {
            let err: Value = serde_json::from_str(&res.text().await?)?;
            return Err(HelixErr::SubscriptionCreateError(err));
        }

        let created: HelixDataResponse<Subscription> = res.json().await?;
        let subscription = created
            .data
            .into_iter()
            .next()
            .ok_or(HelixErr::EmptyDataField)?;

        info!(
            id = %subscription.id,
            status = %subscription.status,
            sub_type = %subscription.r#type,
            "created subscription"
        );

        Ok(subscription)
    }

    #[instrument(skip(self))]
    async fn current(&self) -> HelixResult<Vec<Subscription>> {
        let subs_uri = format!("{}/eventsub/subscriptions", self.base);
        let res: HelixDataResponse<Subscription> = self.fetch(subs_uri).await?;

        Ok(res.data)
    }

    #[instrument(skip(self))]
    async fn delete(&self, subscription_id: &str) -> HelixResult<()> {
        let subs_uri = format!("{}/eventsub/subscriptions?id={}", self.base, subscription_id);

        let res = self
            .client
            .delete(subs_uri)
            .headers(self.headers.clone())
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(HelixErr::FetchErr(res.status().to_string()));
        }

        info!(id = subscription_id, "subscription deletion ok");
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixDataResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub login: String,

    #[serde(rename = "display_name")]
    pub name: String,
}
