use anyhow::Context;
use std::sync::Arc;
use storefront_api::{
    build_router,
    config::AppConfig,
    db, events,
    services::{notifications::LogNotifier, payments::RazorpayClient},
    AppState,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config);

    let connection = db::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    if config.auto_migrate {
        db::create_schema(&connection)
            .await
            .context("failed to create schema")?;
    }
    let connection = Arc::new(connection);

    let (event_sender, event_receiver) = events::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(events::process_events(event_receiver));

    let gateway = Arc::new(RazorpayClient::new(&config.gateway));
    let notifier = Arc::new(LogNotifier);

    let bind_address = config.bind_address();
    let state = Arc::new(AppState::new(
        connection,
        config,
        event_sender,
        gateway,
        notifier,
    ));

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(address = %bind_address, "Storefront API listening");

    axum::serve(listener, app)
        .await
        .context("server terminated")?;
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
