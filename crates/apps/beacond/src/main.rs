//! Beacond - Gmail push-notification consumer
//!
//! Receives Pub/Sub pushes for an OAuth-connected mailbox and logs every new
//! message carrying a deliverability marker.

use anyhow::{Context, Result};
use beacon::{
    BeaconConfig, CredentialStore, Cursor, GmailClient, GmailCredentials,
    InMemoryCredentialStore, InMemoryCursorStore, MarkerExtractor, NotificationHandler,
    TokenRefresher, UreqTransport,
};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

mod error;
mod routes;

use routes::AppState;

/// The authorized user, as addressed by the Gmail API
const ME: &str = "me";

#[derive(Debug, Parser)]
#[command(name = "beacond", version, about = "Gmail push-notification consumer")]
struct Args {
    /// Path to beacon.json (defaults to the beacon config directory)
    #[arg(long, env = "BEACON_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    let mut settings = BeaconConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        settings.bind = bind;
        settings.validate()?;
    }

    let credentials = GmailCredentials::load().inspect_err(|e| {
        warn!("Gmail credentials not found: {}", e);
        if let Some(path) = GmailCredentials::default_credentials_path() {
            warn!(
                "To configure Gmail access, either:\n\
                 1. Place your Google OAuth credentials and refresh_token at: {}\n\
                 2. Or set environment variables: GMAIL_CLIENT_ID, GMAIL_CLIENT_SECRET and GMAIL_REFRESH_TOKEN",
                path.display()
            );
        }
    })?;

    let client = Arc::new(build_client(&settings, credentials));
    let handler = Arc::new(
        NotificationHandler::new(client.clone(), Arc::new(InMemoryCursorStore::new()))
            .with_extractor(MarkerExtractor::new(settings.marker_prefix.clone()))
            .with_flagged_labels(settings.flagged_labels.clone()),
    );

    if let Some(topic) = settings.pubsub_topic.clone() {
        let handler = handler.clone();
        let registered =
            tokio::task::spawn_blocking(move || register_watch(&client, &handler, &topic)).await?;
        if let Err(e) = registered {
            error!("Watch registration failed, relying on an existing watch: {:#}", e);
        }
    }

    let app = routes::router(AppState { handler }, &settings.webhook_path);

    let addr = settings.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {} (webhook {})", addr, settings.webhook_path);

    axum::serve(listener, app).await?;
    Ok(())
}

fn build_client(settings: &BeaconConfig, credentials: GmailCredentials) -> GmailClient {
    let transport = Arc::new(UreqTransport::new(settings.http_timeout()));

    let store = Arc::new(InMemoryCredentialStore::with_refresh_token(
        credentials.refresh_token,
    ));
    if let Some(access_token) = credentials.access_token {
        store.set_access_token(access_token);
    }

    let refresher = TokenRefresher::new(
        credentials.client_id,
        credentials.client_secret,
        transport.clone(),
        store,
    )
    .with_token_url(settings.token_url.clone());

    GmailClient::new(refresher, transport).with_base_url(settings.api_base_url.clone())
}

/// Register the push watch and seed the mailbox cursor from it
fn register_watch(client: &GmailClient, handler: &NotificationHandler, topic: &str) -> Result<()> {
    let watch = client
        .watch(ME, topic, &[])
        .with_context(|| format!("Failed to watch topic {}", topic))?;
    let profile = client
        .get_profile(ME)
        .context("Failed to read mailbox profile")?;

    info!(
        "Watching {} on {} from historyId {} (expires {})",
        profile.email_address,
        topic,
        watch.history_id,
        watch.expiration.as_deref().unwrap_or("unknown")
    );

    if handler.seed_cursor(&profile.email_address, Cursor::new(watch.history_id))? {
        info!("Seeded cursor for {}", profile.email_address);
    }
    Ok(())
}
