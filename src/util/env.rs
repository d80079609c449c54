//! Process configuration for the relay, snapshotted once from `.env`/the environment.
//!
//! Anything the receiver needs at runtime lives here; the `eventsub` helper binary reads
//! its own credentials at command start instead so the relay can boot without them.

use std::sync::LazyLock;

use thiserror::Error;
use tokio::sync::OnceCell;

pub const DEFAULT_PORT: &str = "3000";

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);
pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = ENV_VARS.get_or_try_init(|| async { Env::new() }).await?;
    Ok(match var {
        Var::EventsubSecret => &vars.eventsub_secret,
        Var::DiscordWebhookUrl => &vars.discord_webhook_url,
        Var::DiscordThreadId => &vars.thread_id,
        Var::ServerPort => &vars.port,
        Var::OtelExporterEndpoint => &vars.otel_exporter,
    })
}

#[derive(Debug, Clone)]
pub struct Env {
    pub eventsub_secret: String,
    pub discord_webhook_url: String,

    /// Empty when no thread id is configured.
    pub thread_id: String,
    pub port: String,

    /// Empty when no OTLP collector is configured; telemetry then stays on stdout.
    pub otel_exporter: String,
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        let eventsub_secret = dotenvy::var("EVENTSUB_SECRET")?;
        let discord_webhook_url = dotenvy::var("DISCORD_WEBHOOK_URL")?;
        let thread_id = dotenvy::var("THREAD_ID").unwrap_or_default();
        let port = dotenvy::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
        let otel_exporter = dotenvy::var("OTEL_EXPORTER").unwrap_or_default();

        Ok(Self {
            eventsub_secret,
            discord_webhook_url,
            thread_id,
            port,
            otel_exporter,
        })
    }
}

#[derive(Debug)]
pub enum Var {
    EventsubSecret,
    DiscordWebhookUrl,
    DiscordThreadId,
    ServerPort,
    OtelExporterEndpoint,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),
}
