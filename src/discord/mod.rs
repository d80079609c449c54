pub mod embed;

use thiserror::Error;
use tracing::instrument;

use crate::discord::embed::WebhookPayload;

pub type RelayResult<T> = core::result::Result<T, RelayErr>;

#[derive(Debug, Error)]
pub enum RelayErr {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error("discord rejected the webhook execution: status {status}")]
    ForwardRejected { status: u16, body: String },
}

/// Client for a single Discord webhook, optionally targeting a thread.
#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    client: reqwest::Client,
    url: String,
    thread_id: Option<String>,
}

impl DiscordWebhook {
    pub fn new(url: &str, thread_id: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            thread_id: thread_id.filter(|id| !id.is_empty()),
        }
    }

    /// `?wait=true` makes Discord confirm delivery with the created message
    /// instead of replying 204 up front.
    fn webhook_url(&self) -> String {
        let mut url = format!("{}?wait=true", self.url);
        if let Some(thread_id) = &self.thread_id {
            url.push_str(&format!("&thread_id={thread_id}"));
        }

        url
    }

    #[instrument(skip(self, payload))]
    pub async fn forward(&self, payload: &WebhookPayload) -> RelayResult<String> {
        let res = self
            .client
            .post(self.webhook_url())
            .json(payload)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            tracing::error!(%status, %body, "discord rejected the forwarded embed");
            return Err(RelayErr::ForwardRejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(%body, "discord accepted the forwarded embed");
        Ok(body)
    }
}
