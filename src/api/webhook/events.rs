use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::discord::embed::{
    Embed, EmbedField, UNBAN_CREATE_COLOR, UNBAN_RESOLVE_COLOR, timestamp_token,
};

pub const UNBAN_REQUEST_CREATE: &str = "channel.unban_request.create";
pub const UNBAN_REQUEST_RESOLVE: &str = "channel.unban_request.resolve";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnbanCreatePayload {
    pub subscription: SubscriptionData,
    pub event: UnbanCreateEvent,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnbanResolvePayload {
    pub subscription: SubscriptionData,
    pub event: UnbanResolveEvent,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubscriptionData {
    pub id: String,
    pub status: String,
    pub r#type: String,
    pub version: String,
    #[serde(default)]
    pub cost: usize,

    /// Both unban request subscriptions condition on a broadcaster and a
    /// moderator id, but the shape is left loose so one notification with an
    /// unexpected condition cannot poison the whole dispatch.
    pub condition: Value,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnbanCreateEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnbanResolveEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,

    /// Moderator fields arrive as null when the request resolves without one,
    /// e.g. the ban simply expired.
    #[serde(default)]
    pub moderator_user_id: Option<String>,
    #[serde(default)]
    pub moderator_user_login: Option<String>,
    #[serde(default)]
    pub moderator_user_name: Option<String>,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    #[serde(default)]
    pub resolution_text: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// One Twitch account as rendered in an embed field: display name, login and
/// numeric id, linked to the account's channel page.
pub struct Identity<'a> {
    pub name: &'a str,
    pub login: &'a str,
    pub id: &'a str,
}

impl Identity<'_> {
    pub fn field_value(&self) -> String {
        format!(
            "[`{}` (`{}` - `{}`)](<https://www.twitch.tv/{}>)",
            self.name, self.login, self.id, self.login
        )
    }
}

macro_rules! identity_getters {
    (
        $struct:ty,
        $getter:ident: ($name:ident, $login:ident, $id:ident)
    ) => {
        impl $struct {
            pub fn $getter(&self) -> Identity<'_> {
                Identity {
                    name: &self.$name,
                    login: &self.$login,
                    id: &self.$id,
                }
            }
        }
    };
}

identity_getters!(
    UnbanCreateEvent,
    broadcaster: (broadcaster_user_name, broadcaster_user_login, broadcaster_user_id)
);

identity_getters!(
    UnbanCreateEvent,
    user: (user_name, user_login, user_id)
);

identity_getters!(
    UnbanResolveEvent,
    broadcaster: (broadcaster_user_name, broadcaster_user_login, broadcaster_user_id)
);

identity_getters!(
    UnbanResolveEvent,
    user: (user_name, user_login, user_id)
);

impl UnbanCreateEvent {
    pub fn to_embed(&self) -> Embed {
        let title = match self.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => format!("Unban Request {id}"),
            None => "Unban Request".to_string(),
        };

        Embed {
            color: UNBAN_CREATE_COLOR,
            title,
            fields: vec![
                EmbedField::new("Broadcaster", self.broadcaster().field_value()),
                EmbedField::new("User", self.user().field_value()),
                EmbedField::new("Created at", timestamp_token(&self.created_at)),
            ],
            description: format!("```{}```", self.text),
        }
    }
}

impl UnbanResolveEvent {
    pub fn moderator(&self) -> Identity<'_> {
        Identity {
            name: self.moderator_user_name.as_deref().unwrap_or_default(),
            login: self.moderator_user_login.as_deref().unwrap_or_default(),
            id: self.moderator_user_id.as_deref().unwrap_or_default(),
        }
    }

    /// Resolution status with absent and empty values both treated as unset.
    pub fn resolution_status(&self) -> Option<&str> {
        self.status.as_deref().filter(|s| !s.is_empty())
    }

    pub fn to_embed(&self, status: &str) -> Embed {
        let title = match self.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => format!("Unban Request {id} {status}"),
            None => format!("Unban Request {status}"),
        };

        let description = format!(
            "**Status: `{status}`**\n**Resolution Text:**\n```{}```",
            self.resolution_text.as_deref().unwrap_or_default()
        );

        Embed {
            color: UNBAN_RESOLVE_COLOR,
            title,
            fields: vec![
                EmbedField::new("Broadcaster", self.broadcaster().field_value()),
                EmbedField::new("Moderator", self.moderator().field_value()),
                EmbedField::new("User", self.user().field_value()),
            ],
            description,
        }
    }
}
