//! Storefront sales backend

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::analytics::PageReachCounter;
use storefront::api::{router, AppState};
use storefront::config::AppConfig;
use storefront::notify::{EventPublisher, MailNotifier, NotificationWorker};
use storefront::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    let store = Arc::new(PgStore::new(db));

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "NATS unavailable; events stay in-process and mails are logged");
                None
            }
        },
        None => None,
    };

    let (events, outbox) = EventPublisher::channel();
    let notifier = Arc::new(MailNotifier::new(store.clone(), nats.clone(), config.mail_from.clone(), config.invoice_base_url.clone()));
    let worker = NotificationWorker::new(notifier, nats).spawn(outbox);

    let page_reach = Arc::new(PageReachCounter::new());
    let (stop_flusher, shutdown) = tokio::sync::watch::channel(false);
    let flusher = page_reach.clone().spawn_flusher(store.clone(), config.page_reach_flush_interval, shutdown);

    let state = AppState::new(store.clone(), events, page_reach, &config.asset_base_url, config.company.clone());
    let app = router(state).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    tracing::info!("🚀 Storefront listening on 0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    stop_flusher.send_replace(true);
    if let Err(e) = flusher.await {
        tracing::warn!(error = %e, "page reach flusher ended abnormally");
    }
    // The router owned the last event publisher, so the worker drains and stops.
    match tokio::time::timeout(Duration::from_secs(5), worker).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "notification worker ended abnormally"),
        Err(_) => tracing::warn!("notification worker still busy at shutdown"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
