use std::net::SocketAddr;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::Router;
use axum::extract::MatchedPath;
use axum::middleware;
use axum::routing::{get, post};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::middleware::verify::{Signer, verify_sender_ident};
use crate::api::webhook::webhook_handler;
use crate::discord::DiscordWebhook;

pub const BANNER: &str = "Twitch Unban Requests EventSub Webhook Endpoint";

#[derive(Clone, Debug)]
pub struct AppState {
    pub signer: Signer,
    pub discord: DiscordWebhook,
}

impl AppState {
    pub fn new(secret: &str, discord: DiscordWebhook) -> Self {
        Self {
            signer: Signer::new(secret),
            discord,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    //
    // twitch hook callback
    let callback_routes = Router::new()
        .route("/", post(webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            verify_sender_ident,
        ));

    Router::new()
        .merge(callback_routes)
        //
        // plain informational routes
        .route("/", get(|| async { BANNER }))
        .route("/checkhealth", get(|| async { "SERVER_OK" }))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .with_state(state)
}

#[instrument(skip(state, tx))]
async fn serve(port: u16, state: Arc<AppState>, tx: UnboundedSender<SocketAddr>) {
    let app = build_router(state);

    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    let listener = match tokio::net::TcpListener::bind(socket_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %socket_addr, "unable to bind callback listener");
            return;
        }
    };

    // with port 0 the os assigns the port, so report the address actually bound
    _ = tx.send(listener.local_addr().unwrap_or(socket_addr));

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "callback server exited with an error");
    }
}

#[instrument(skip(state, tx))]
pub async fn start_server(
    port: u16,
    state: Arc<AppState>,
    tx: UnboundedSender<SocketAddr>,
) -> Vec<JoinHandle<()>> {
    tracing::info!("starting server");
    let server_handle = tokio::task::spawn(async move {
        serve(port, state, tx).await;
    });

    vec![server_handle]
}
