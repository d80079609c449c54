use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use unban_relay::twitch::auth::{
    AuthErr, Credentials, SCOPE_MANAGE_UNBAN_REQUESTS, SCOPE_READ_UNBAN_REQUESTS, TwitchAuth,
};
use unban_relay::twitch::helix::{Helix, HelixErr, SubscriptionManager};
use unban_relay::twitch::{EventType, SubscriptionRequest};

#[derive(Parser, Debug)]
#[command(about = "Manage the relay's unban request EventSub subscriptions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Obtain a user access token through the device code flow
    Authorize {
        /// Request moderator:manage:unban_requests instead of the read scope
        #[arg(long)]
        manage: bool,
    },

    /// Subscribe the callback to a broadcaster's unban request events
    Subscribe {
        /// Broadcaster login whose channel should be monitored
        #[arg(short, long)]
        broadcaster: String,

        /// Event types to subscribe (create, resolve)
        #[arg(
            short,
            long,
            value_delimiter = ',',
            default_values_t = vec![EventType::UnbanRequestCreate, EventType::UnbanRequestResolve]
        )]
        events: Vec<EventType>,
    },

    /// List the subscriptions registered for this client
    List,

    /// Delete one subscription by id, or all of them
    Unsubscribe {
        /// Subscription id to delete
        #[arg(short, long, conflicts_with = "all")]
        id: Option<String>,

        /// Delete every registered subscription
        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Error)]
enum CliErr {
    #[error(transparent)]
    Auth(#[from] AuthErr),

    #[error(transparent)]
    Helix(#[from] HelixErr),

    #[error("failed to read .env: {0}")]
    Env(#[from] dotenvy::Error),

    #[error("pass either --id <id> or --all")]
    MissingTarget,
}

type Result<T> = core::result::Result<T, CliErr>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Authorize { manage } => authorize(manage).await,
        Command::Subscribe {
            broadcaster,
            events,
        } => subscribe(&broadcaster, &events).await,
        Command::List => list().await,
        Command::Unsubscribe { id, all } => unsubscribe(id, all).await,
    }
}

async fn authorize(manage: bool) -> Result<()> {
    let scopes = if manage {
        SCOPE_MANAGE_UNBAN_REQUESTS
    } else {
        SCOPE_READ_UNBAN_REQUESTS
    };

    let credentials = Credentials::from_env()?;
    let auth = TwitchAuth::new(credentials.clone());

    let grant = auth.start_device_flow(scopes).await?;
    println!(
        "Open {} in a browser and enter {} there!",
        grant.verification_uri, grant.user_code
    );

    let token = auth.poll_device_token(&grant, scopes).await?;
    let helix = Helix::new(&credentials.client_id, &token.access_token)?;
    let user = helix.fetch_current_user().await?;

    println!(
        "Got Device Code Flow Tokens for User {} ({})",
        user.name, user.login
    );
    println!("ACCESS_TOKEN={}", token.access_token);
    println!("REFRESH_TOKEN={}", token.refresh_token);

    Ok(())
}

async fn subscribe(broadcaster: &str, events: &[EventType]) -> Result<()> {
    let credentials = Credentials::from_env()?;
    let callback = dotenvy::var("CALLBACK_URL")?;
    let moderator_id = dotenvy::var("MODERATOR_ID")?;
    let secret = dotenvy::var("EVENTSUB_SECRET")?;

    let helix = app_helix(&credentials).await?;
    let user = helix.fetch_user_by_login(broadcaster).await?;
    println!("Subscribing to {} ({} - {})", user.name, user.login, user.id);

    for event in events {
        let request = SubscriptionRequest::new(
            *event,
            user.id.as_str(),
            moderator_id.as_str(),
            callback.as_str(),
            secret.as_str(),
        );

        let subscription = helix.create(&request).await?;
        println!(
            "{}: {} ({})",
            subscription.r#type, subscription.id, subscription.status
        );
    }

    Ok(())
}

async fn list() -> Result<()> {
    let credentials = Credentials::from_env()?;
    let helix = app_helix(&credentials).await?;

    let subscriptions = helix.current().await?;
    if subscriptions.is_empty() {
        println!("No active subscriptions.");
        return Ok(());
    }

    for subscription in subscriptions {
        println!(
            "{}  {}  {}  {}",
            subscription.id,
            subscription.r#type,
            subscription.status,
            subscription.transport.callback
        );
    }

    Ok(())
}

async fn unsubscribe(id: Option<String>, all: bool) -> Result<()> {
    let credentials = Credentials::from_env()?;
    let helix = app_helix(&credentials).await?;

    if let Some(id) = id {
        helix.delete(&id).await?;
        println!("Deleted subscription '{id}'");
        return Ok(());
    }

    if !all {
        return Err(CliErr::MissingTarget);
    }

    let subscriptions = helix.current().await?;
    if subscriptions.is_empty() {
        println!("No active subscriptions.");
        return Ok(());
    }

    for subscription in subscriptions {
        helix.delete(&subscription.id).await?;
        println!(
            "Deleted subscription '{}' ({})",
            subscription.id, subscription.r#type
        );
    }

    Ok(())
}

/// Helix client authenticated with a fresh app access token.
async fn app_helix(credentials: &Credentials) -> Result<Helix> {
    let auth = TwitchAuth::new(credentials.clone());
    let token = auth.fetch_app_token().await?;

    Ok(Helix::new(&credentials.client_id, &token.access_token)?)
}
