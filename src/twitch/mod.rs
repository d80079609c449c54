pub mod auth;
pub mod helix;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const HELIX_BASE: &str = "https://api.twitch.tv/helix";
pub const ID_BASE: &str = "https://id.twitch.tv";

#[derive(Debug, Error)]
pub enum EventTypeError {
    #[error("unknown EventType: {0}")]
    Conversion(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum EventType {
    #[serde(rename = "channel.unban_request.create")]
    UnbanRequestCreate,
    #[serde(rename = "channel.unban_request.resolve")]
    UnbanRequestResolve,
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::UnbanRequestCreate => write!(f, "channel.unban_request.create"),
            EventType::UnbanRequestResolve => write!(f, "channel.unban_request.resolve"),
        }
    }
}

impl core::str::FromStr for EventType {
    type Err = EventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" | "channel.unban_request.create" => Ok(EventType::UnbanRequestCreate),
            "resolve" | "channel.unban_request.resolve" => Ok(EventType::UnbanRequestResolve),
            _ => Err(EventTypeError::Conversion(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "lowercase")]
pub enum TransportMethod {
    Webhook,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Transport {
    pub method: TransportMethod,
    pub callback: String,

    /// Set on outgoing subscription requests; helix never echoes it back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl Transport {
    pub fn webhook(callback: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            method: TransportMethod::Webhook,
            callback: callback.into(),
            secret: Some(secret.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Condition {
    pub broadcaster_user_id: String,
    pub moderator_user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubscriptionRequest {
    pub r#type: EventType,
    #[serde(default = "version_default")]
    pub version: String,
    pub condition: Condition,
    pub transport: Transport,
}

fn version_default() -> String {
    "1".to_string()
}

impl SubscriptionRequest {
    pub fn new(
        event_type: EventType,
        broadcaster_id: impl Into<String>,
        moderator_id: impl Into<String>,
        callback: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            r#type: event_type,
            version: version_default(),
            condition: Condition {
                broadcaster_user_id: broadcaster_id.into(),
                moderator_user_id: moderator_id.into(),
            },
            transport: Transport::webhook(callback, secret),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub status: String,

    /// Kept as a plain string so listing still works when the account carries
    /// subscription types this tool does not manage.
    pub r#type: String,
    #[serde(default = "version_default")]
    pub version: String,
    #[serde(default)]
    pub cost: u32,
    pub condition: Value,
    pub created_at: String,
    pub transport: Transport,
}
