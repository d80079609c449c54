use serde::Serialize;

pub const UNBAN_CREATE_COLOR: u32 = 0xCC3333;
pub const UNBAN_RESOLVE_COLOR: u32 = 0xAAFF00;

/// Body of an `execute webhook` call. Discord takes up to ten embeds per
/// message but the relay only ever sends one.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
}

impl WebhookPayload {
    pub fn single(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    pub color: u32,
    pub title: String,
    pub fields: Vec<EmbedField>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: &str, value: String) -> Self {
        Self {
            name: name.to_string(),
            value,
            inline: false,
        }
    }
}

/// Renders an RFC 3339 instant as a Discord `<t:{epoch}:F>` token so clients
/// display it in their local timezone. Unparseable input passes through as-is.
pub fn timestamp_token(rfc3339: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(rfc3339) {
        Ok(ts) => format!("<t:{}:F>", ts.timestamp()),
        Err(_) => rfc3339.to_string(),
    }
}
