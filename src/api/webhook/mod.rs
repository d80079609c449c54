pub mod events;

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, StatusCode, header};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::api::middleware::verify::{TWITCH_MESSAGE_TYPE_HEADER, VerifiedBody};
use crate::api::server::AppState;
use crate::api::webhook::events::{
    UNBAN_REQUEST_CREATE, UNBAN_REQUEST_RESOLVE, UnbanCreatePayload, UnbanResolvePayload,
};
use crate::discord::embed::{Embed, WebhookPayload};

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookMessageType {
    Verify,
    Notify,
    Revoke,
    Unknown(String),
}

impl From<&str> for WebhookMessageType {
    fn from(value: &str) -> Self {
        match value {
            "webhook_callback_verification" => Self::Verify,
            "notification" => Self::Notify,
            "revocation" => Self::Revoke,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Deserialize, Debug)]
struct ChallengeRequest {
    challenge: String,
}

/// Dispatches a signature-checked EventSub message on its
/// `Twitch-Eventsub-Message-Type` header.
#[instrument(skip(state, headers, body))]
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: VerifiedBody,
) -> Result<Response, StatusCode> {
    // an absent or unreadable type header takes the unknown-type path, so a
    // sender that authenticates is always acknowledged
    let msg_type: WebhookMessageType = headers
        .get(TWITCH_MESSAGE_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("<missing>")
        .into();

    tracing::debug!(?msg_type, "dispatching incoming webhook message");

    match msg_type {
        WebhookMessageType::Verify => handle_verification(&body),
        WebhookMessageType::Notify => handle_notification(state, &body),
        WebhookMessageType::Revoke => handle_revocation(&body),
        WebhookMessageType::Unknown(value) => {
            tracing::info!(msg_type = %value, "ignoring unknown message type");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

/// Echoes the pending subscription's challenge back as plain text so Twitch
/// enables the callback.
fn handle_verification(body: &VerifiedBody) -> Result<Response, StatusCode> {
    let request: ChallengeRequest = body.as_json().map_err(|e| {
        tracing::error!(error = %e, "verification carried an unparseable payload");
        StatusCode::BAD_REQUEST
    })?;

    tracing::info!("answering webhook callback verification challenge");

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        request.challenge,
    )
        .into_response())
}

fn handle_notification(state: Arc<AppState>, body: &VerifiedBody) -> Result<Response, StatusCode> {
    let notification: Value = body.as_json().map_err(|e| {
        tracing::error!(error = %e, "notification carried an unparseable payload");
        StatusCode::BAD_REQUEST
    })?;

    let sub_type = notification["subscription"]["type"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    match sub_type.as_str() {
        UNBAN_REQUEST_CREATE => {
            let payload: UnbanCreatePayload =
                serde_json::from_value(notification).map_err(|e| {
                    tracing::error!(error = %e, "unban request creation failed to parse");
                    StatusCode::BAD_REQUEST
                })?;

            tracing::info!(
                broadcaster = %payload.event.broadcaster_user_login,
                user = %payload.event.user_login,
                "relaying unban request creation"
            );

            relay(state, payload.event.to_embed());
        }
        UNBAN_REQUEST_RESOLVE => {
            let payload: UnbanResolvePayload =
                serde_json::from_value(notification).map_err(|e| {
                    tracing::error!(error = %e, "unban request resolution failed to parse");
                    StatusCode::BAD_REQUEST
                })?;

            let Some(status) = payload.event.resolution_status() else {
                tracing::info!("unban request resolution carried no status, nothing to relay");
                return Ok(StatusCode::NO_CONTENT.into_response());
            };

            tracing::info!(
                broadcaster = %payload.event.broadcaster_user_login,
                user = %payload.event.user_login,
                status,
                "relaying unban request resolution"
            );

            relay(state, payload.event.to_embed(status));
        }
        other => {
            tracing::info!(
                sub_type = other,
                event = %notification["event"],
                "ignoring unhandled subscription type"
            );
        }
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

fn handle_revocation(body: &VerifiedBody) -> Result<Response, StatusCode> {
    match body.as_json::<Value>() {
        Ok(notification) => {
            let subscription = &notification["subscription"];
            tracing::warn!(
                sub_type = %subscription["type"],
                reason = %subscription["status"],
                condition = %subscription["condition"],
                "subscription revoked by twitch"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "revocation carried an unreadable payload");
        }
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Delivery runs on its own task so Twitch gets its 204 without waiting on
/// Discord.
fn relay(state: Arc<AppState>, embed: Embed) {
    let payload = WebhookPayload::single(embed);

    tokio::task::spawn(async move {
        if let Err(e) = state.discord.forward(&payload).await {
            tracing::error!(error = %e, "failed to forward embed to discord");
        }
    });
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::middleware::verify::{
        Signer, TWITCH_MESSAGE_ID, TWITCH_MESSAGE_SIGNATURE, TWITCH_MESSAGE_TIMESTAMP,
    };
    use crate::api::server::start_server;
    use crate::discord::DiscordWebhook;

    const TEST_SECRET: &str = "0123456789abcdef0123456789abcdef";
    const MSG_ID: &str = "befa7b53-d79d-478f-86b9-120f112b044e";
    const MSG_TS: &str = "2024-01-01T00:00:00Z";

    async fn mock_discord() -> MockServer {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        server
    }

    async fn spawn_relay(discord_url: &str) -> SocketAddr {
        let state = Arc::new(AppState::new(
            TEST_SECRET,
            DiscordWebhook::new(discord_url, None),
        ));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        start_server(0, state, tx).await;

        rx.recv().await.unwrap()
    }

    async fn post_signed(addr: SocketAddr, msg_type: &str, body: &str) -> reqwest::Response {
        let signature = Signer::new(TEST_SECRET).signature(MSG_ID, MSG_TS, body.as_bytes());

        reqwest::Client::new()
            .post(format!("http://{addr}/"))
            .header(TWITCH_MESSAGE_ID, MSG_ID)
            .header(TWITCH_MESSAGE_TIMESTAMP, MSG_TS)
            .header(TWITCH_MESSAGE_SIGNATURE, signature)
            .header(TWITCH_MESSAGE_TYPE_HEADER, msg_type)
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    /// Polls the mock for the single forwarded embed.
    async fn forwarded_embed(server: &MockServer) -> Value {
        for _ in 0..50 {
            let requests = server.received_requests().await.unwrap_or_default();
            if let Some(request) = requests.first() {
                let body: Value = serde_json::from_slice(&request.body).unwrap();
                return body["embeds"][0].clone();
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        panic!("discord mock never received a forwarded embed");
    }

    fn subscription_json(sub_type: &str) -> Value {
        json!({
            "id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
            "status": "enabled",
            "type": sub_type,
            "version": "1",
            "cost": 0,
            "condition": {
                "broadcaster_user_id": "101",
                "moderator_user_id": "303"
            },
            "created_at": "2023-12-30T20:17:30.17106713Z"
        })
    }

    fn create_notification() -> String {
        json!({
            "subscription": subscription_json(UNBAN_REQUEST_CREATE),
            "event": {
                "id": "e1",
                "broadcaster_user_id": "101",
                "broadcaster_user_login": "foo",
                "broadcaster_user_name": "Foo",
                "user_id": "202",
                "user_login": "bar",
                "user_name": "Bar",
                "text": "please let me back in",
                "created_at": "2024-01-01T00:00:00Z"
            }
        })
        .to_string()
    }

    fn resolve_notification(status: Value) -> String {
        json!({
            "subscription": subscription_json(UNBAN_REQUEST_RESOLVE),
            "event": {
                "id": "e1",
                "broadcaster_user_id": "101",
                "broadcaster_user_login": "foo",
                "broadcaster_user_name": "Foo",
                "moderator_user_id": "303",
                "moderator_user_login": "modbaz",
                "moderator_user_name": "ModBaz",
                "user_id": "202",
                "user_login": "bar",
                "user_name": "Bar",
                "resolution_text": "welcome back",
                "status": status
            }
        })
        .to_string()
    }

    #[test]
    fn test_message_type_from_header_value() {
        assert_eq!(
            WebhookMessageType::from("webhook_callback_verification"),
            WebhookMessageType::Verify
        );
        assert_eq!(
            WebhookMessageType::from("notification"),
            WebhookMessageType::Notify
        );
        assert_eq!(
            WebhookMessageType::from("revocation"),
            WebhookMessageType::Revoke
        );
        assert_eq!(
            WebhookMessageType::from("beta_feature"),
            WebhookMessageType::Unknown("beta_feature".to_string())
        );
    }

    #[tokio::test]
    async fn test_challenge_is_echoed_as_plain_text() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let res = post_signed(
            addr,
            "webhook_callback_verification",
            &json!({
                "challenge": "abc123",
                "subscription": subscription_json(UNBAN_REQUEST_CREATE)
            })
            .to_string(),
        )
        .await;

        assert_eq!(res.status(), 200);
        assert_eq!(
            res.headers()[http::header::CONTENT_TYPE]
                .to_str()
                .unwrap(),
            "text/plain"
        );
        assert_eq!(res.text().await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_create_notification_is_relayed() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let res = post_signed(addr, "notification", &create_notification()).await;
        assert_eq!(res.status(), 204);

        let embed = forwarded_embed(&discord).await;
        assert_eq!(embed["color"], 0xCC3333);
        assert_eq!(embed["title"], "Unban Request e1");
        assert_eq!(embed["description"], "```please let me back in```");
        assert_eq!(embed["fields"][0]["name"], "Broadcaster");
        assert!(
            embed["fields"][0]["value"]
                .as_str()
                .unwrap()
                .contains("foo")
        );
        assert_eq!(embed["fields"][1]["name"], "User");
        assert!(
            embed["fields"][1]["value"]
                .as_str()
                .unwrap()
                .contains("bar")
        );
        assert_eq!(embed["fields"][2]["value"], "<t:1704067200:F>");
    }

    #[tokio::test]
    async fn test_resolve_notification_is_relayed() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let res = post_signed(addr, "notification", &resolve_notification(json!("approved"))).await;
        assert_eq!(res.status(), 204);

        let embed = forwarded_embed(&discord).await;
        assert_eq!(embed["color"], 0xAAFF00);
        assert_eq!(embed["title"], "Unban Request e1 approved");
        assert_eq!(embed["fields"][0]["name"], "Broadcaster");
        assert_eq!(embed["fields"][1]["name"], "Moderator");
        assert_eq!(embed["fields"][2]["name"], "User");
        assert!(
            embed["description"]
                .as_str()
                .unwrap()
                .contains("**Status: `approved`**")
        );
    }

    #[tokio::test]
    async fn test_statusless_resolution_is_not_relayed() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let res = post_signed(addr, "notification", &resolve_notification(json!(null))).await;
        assert_eq!(res.status(), 204);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(discord.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_unhandled_subscription_type_is_not_relayed() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let body = json!({
            "subscription": subscription_json("channel.follow"),
            "event": { "broadcaster_user_id": "101" }
        })
        .to_string();

        let res = post_signed(addr, "notification", &body).await;
        assert_eq!(res.status(), 204);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(discord.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_revocation_is_acknowledged_without_relay() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let body = json!({
            "subscription": subscription_json(UNBAN_REQUEST_CREATE)
        })
        .to_string();

        let res = post_signed(addr, "revocation", &body).await;
        assert_eq!(res.status(), 204);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(discord.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_message_type_is_acknowledged() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let res = post_signed(addr, "beta_feature", &create_notification()).await;
        assert_eq!(res.status(), 204);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(discord.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected_before_parsing() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        // not json: the 403 must come from the signature check alone
        let res = reqwest::Client::new()
            .post(format!("http://{addr}/"))
            .header(TWITCH_MESSAGE_ID, MSG_ID)
            .header(TWITCH_MESSAGE_TIMESTAMP, MSG_TS)
            .header(TWITCH_MESSAGE_SIGNATURE, "sha256=deadbeef")
            .header(TWITCH_MESSAGE_TYPE_HEADER, "notification")
            .body("not json at all")
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 403);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(discord.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_missing_signature_header_is_rejected() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let res = reqwest::Client::new()
            .post(format!("http://{addr}/"))
            .header(TWITCH_MESSAGE_ID, MSG_ID)
            .header(TWITCH_MESSAGE_TIMESTAMP, MSG_TS)
            .header(TWITCH_MESSAGE_TYPE_HEADER, "notification")
            .body(create_notification())
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 403);
    }

    #[tokio::test]
    async fn test_missing_message_type_header_is_acknowledged() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let body = create_notification();
        let signature = Signer::new(TEST_SECRET).signature(MSG_ID, MSG_TS, body.as_bytes());

        let res = reqwest::Client::new()
            .post(format!("http://{addr}/"))
            .header(TWITCH_MESSAGE_ID, MSG_ID)
            .header(TWITCH_MESSAGE_TIMESTAMP, MSG_TS)
            .header(TWITCH_MESSAGE_SIGNATURE, signature)
            .body(body)
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 204);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(discord.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_challengeless_verification_is_a_bad_request() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let res = post_signed(
            addr,
            "webhook_callback_verification",
            &json!({
                "subscription": subscription_json(UNBAN_REQUEST_CREATE)
            })
            .to_string(),
        )
        .await;

        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn test_garbled_revocation_is_still_acknowledged() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let res = post_signed(addr, "revocation", "signed but not json").await;
        assert_eq!(res.status(), 204);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(discord.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_garbled_notification_is_a_bad_request() {
        let discord = mock_discord().await;
        let addr = spawn_relay(&format!("{}/hook", discord.uri())).await;

        let res = post_signed(addr, "notification", "signed but not json").await;
        assert_eq!(res.status(), 400);
    }
}
