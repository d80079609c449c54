use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;

use unban_relay::api::server::{AppState, start_server};
use unban_relay::discord::DiscordWebhook;
use unban_relay::util::env::{EnvErr, Var};
use unban_relay::util::telemetry;
use unban_relay::var;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error("PORT is not a valid port number: {0}")]
    Port(#[from] std::num::ParseIntError),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry_registry = telemetry::Telemetry::new().await?.register();

    tracing::info!("starting unban request relay");

    let port = var!(Var::ServerPort).await?.parse::<u16>()?;
    let secret = var!(Var::EventsubSecret).await?;
    let webhook_url = var!(Var::DiscordWebhookUrl).await?;
    let thread_id = var!(Var::DiscordThreadId).await?;

    let discord = DiscordWebhook::new(webhook_url, Some(thread_id.to_string()));
    let state = Arc::new(AppState::new(secret, discord));

    let (tx_server_ready, mut rx_server_ready) =
        tokio::sync::mpsc::unbounded_channel::<SocketAddr>();

    let mut handles = start_server(port, state, tx_server_ready).await;

    handles.push(tokio::task::spawn(async move {
        while !rx_server_ready.is_closed() {
            if let Some(msg) = rx_server_ready.recv().await {
                tracing::info!(
                    server_url = &format!("http://127.0.0.1:{}", msg.port()),
                    "server ready"
                );
                break;
            }
        }
    }));

    _ = join_all(handles).await;

    telemetry_registry.shutdown();
    Ok(())
}
