//! Recall engine - Main entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recall_engine::application::services::sweeper::GenerationScheduler;
use recall_engine::infrastructure::{
    app_settings::GenerationSettings, image_local::LocalImageClient, image_remote::RemoteImageClient,
    lifecycle::AppLifecycle, memory_store::InMemoryDeckStore, ollama::OllamaClient,
};
use recall_engine::infrastructure::ports::ImageGenPort;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recall_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Recall engine");

    let settings = GenerationSettings::from_env();
    tracing::info!(
        provider = %settings.provider_preference,
        capacity = settings.worker_capacity,
        "Generation settings loaded"
    );

    // The standalone binary runs against the in-memory store; the app
    // embeds the library and bridges its own store behind the same port.
    let store = Arc::new(InMemoryDeckStore::new());
    let lifecycle = Arc::new(AppLifecycle::new());
    let text = Arc::new(OllamaClient::from_env());
    let local_images = Arc::new(LocalImageClient::from_env(lifecycle.clone()));
    let remote_images = Arc::new(RemoteImageClient::from_env(&settings.style_suffix));

    match text.check_health().await {
        Ok(true) => tracing::info!("Text provider reachable"),
        Ok(false) => tracing::warn!("Text provider responded with an error status"),
        Err(err) => {
            tracing::warn!(error = %err, "Text provider unreachable; suggestion phases will fail")
        }
    }
    if !remote_images.has_valid_credential() {
        tracing::warn!("No remote image credential; icon generation will skip");
    }
    match local_images.check_health().await {
        Ok(true) => tracing::info!("On-device image daemon reachable"),
        Ok(false) => tracing::warn!("On-device image daemon not ready"),
        Err(err) => tracing::warn!(error = %err, "On-device image health check failed"),
    }

    let scheduler = GenerationScheduler::new(store, text, local_images, remote_images, settings);

    // Resume-from-background wakes the sleeping loop
    let wake_scheduler = scheduler.clone();
    let wake_lifecycle = lifecycle.clone();
    tokio::spawn(async move {
        loop {
            wake_lifecycle.resumed().await;
            wake_scheduler.wake();
        }
    });

    let loop_handle = tokio::spawn(scheduler.clone().run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    scheduler.shutdown();
    loop_handle.await?;

    Ok(())
}
