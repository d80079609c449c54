use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::{HeaderMap, StatusCode};
use ring::hmac::{self, Key};

use crate::api::server::AppState;
use crate::util::constant_time_cmp;

/// Signs and checks EventSub messages with the shared webhook secret.
#[derive(Clone, Debug)]
pub struct Signer {
    key: Key,
}

impl Signer {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
        }
    }

    /// HMAC over `message_id ++ timestamp ++ raw_body`, rendered in Twitch's
    /// `sha256=<hex>` header form.
    pub fn signature(&self, id: &str, timestamp: &str, body: &[u8]) -> String {
        let message = rebuild_message(id, timestamp, body);
        let signed = hmac::sign(&self.key, &message);

        format!("{}{}", HMAC_PREFIX, hex::encode(signed))
    }

    pub fn verify(&self, id: &str, timestamp: &str, body: &[u8], provided: &str) -> bool {
        constant_time_cmp(provided, &self.signature(id, timestamp, body))
    }
}

#[derive(Clone)]
pub struct VerifiedBody(pub Bytes);

impl VerifiedBody {
    pub fn as_json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(&self.0)
    }
}

pub async fn verify_sender_ident(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let headers = req.headers().clone();
    let body = match extract_body(&mut req).await {
        Ok(bytes) => bytes,
        Err(_) => return Err(StatusCode::BAD_REQUEST),
    };

    if let Err(status) = verify_signature(&state.signer, &headers, &body) {
        tracing::error!(%status, "unable to verify external webhook signature");
        return Err(status);
    }

    req.extensions_mut().insert(VerifiedBody(body));
    Ok(next.run(req).await)
}

async fn extract_body(request: &mut Request) -> Result<Bytes, ()> {
    let body = std::mem::replace(request.body_mut(), Body::empty());
    axum::body::to_bytes(body, usize::MAX).await.map_err(|_| ())
}

fn verify_signature(signer: &Signer, headers: &HeaderMap, body: &Bytes) -> Result<(), StatusCode> {
    let (id, timestamp, extern_signature) = get_message_parts(headers)?;

    if signer.verify(id, timestamp, body, extern_signature) {
        return Ok(());
    }

    Err(StatusCode::FORBIDDEN)
}

fn rebuild_message(id: &str, ts: &str, body: &[u8]) -> Vec<u8> {
    let mut m = Vec::new();
    m.extend_from_slice(id.as_bytes());
    m.extend_from_slice(ts.as_bytes());
    m.extend_from_slice(body);

    m
}

// A sender that omits any of the signed headers cannot be authenticated, so
// missing parts fail the same way a bad signature does.
type MessageParts<'a> = (&'a str, &'a str, &'a str);
fn get_message_parts<'a>(headers: &'a HeaderMap) -> Result<MessageParts<'a>, StatusCode> {
    let id = headers
        .get(TWITCH_MESSAGE_ID)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::FORBIDDEN)?;

    let timestamp = headers
        .get(TWITCH_MESSAGE_TIMESTAMP)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::FORBIDDEN)?;

    let identifier = headers
        .get(TWITCH_MESSAGE_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::FORBIDDEN)?;

    Ok((id, timestamp, identifier))
}

impl<S> FromRequest<S> for VerifiedBody
where
    S: Send + Sync,
{
    type Rejection = StatusCode;
    async fn from_request(req: Request, _: &S) -> Result<Self, Self::Rejection> {
        req.extensions()
            .get::<VerifiedBody>()
            .cloned()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

pub const HMAC_PREFIX: &str = "sha256=";
pub const TWITCH_MESSAGE_ID: &str = "Twitch-Eventsub-Message-Id";
pub const TWITCH_MESSAGE_TIMESTAMP: &str = "Twitch-Eventsub-Message-Timestamp";
pub const TWITCH_MESSAGE_SIGNATURE: &str = "Twitch-Eventsub-Message-Signature";
pub const TWITCH_MESSAGE_TYPE_HEADER: &str = "Twitch-Eventsub-Message-Type";
