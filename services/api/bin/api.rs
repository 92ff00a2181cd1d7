//! Main Entrypoint for the Frontdesk API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the domain collaborators (Slack, SMS, knowledge base).
//! 3. Building the tool registry and dispatcher.
//! 4. Constructing the Axum router.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use frontdesk_api::{
    config::{Config, StaticSettings},
    domain::{KnowledgeBase, SlackNotifier, SmsSender, StaffNotifier, TwilioSms, Unconfigured},
    media::bridge::OpenAiSessionFactory,
    router::create_router,
    state::AppState,
    tools::{ToolDispatcher, builtin::default_registry},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Domain Collaborators ---
    let notifier: Arc<dyn StaffNotifier> = match &config.slack_webhook_url {
        Some(url) => {
            info!("Staff notifications via Slack webhook.");
            Arc::new(SlackNotifier::new(url.clone()))
        }
        None => Arc::new(Unconfigured::new("staff notifier")),
    };
    let sms: Arc<dyn SmsSender> = match &config.twilio_sms {
        Some(twilio) => {
            info!("SMS via Twilio Messages API.");
            Arc::new(TwilioSms::new(twilio.clone()))
        }
        None => Arc::new(Unconfigured::new("SMS sender")),
    };
    // The semantic-search engine ships separately; without one the assistant
    // declines knowledge-base questions instead of guessing.
    let kb: Arc<dyn KnowledgeBase> = Arc::new(Unconfigured::new("knowledge base"));

    // --- 4. Build Tool Dispatcher and Shared State ---
    let registry = default_registry(
        config.salon.clone(),
        kb,
        sms,
        notifier,
        config.kb_min_confidence,
    );
    let dispatcher = Arc::new(ToolDispatcher::new(registry));

    let config = Arc::new(config);
    let sessions = Arc::new(OpenAiSessionFactory::new(
        config.clone(),
        dispatcher.specs().to_vec(),
    ));
    let settings = Arc::new(StaticSettings::new(&config));

    let app_state = Arc::new(AppState {
        config: config.clone(),
        settings,
        sessions,
        dispatcher,
    });

    // --- 5. Create Router and Start Server ---
    let app = create_router(app_state);

    info!(
        model = %config.realtime_model,
        voice = %config.voice,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
