use anyhow::Context;
use chrono::Utc;
use dotenv::dotenv;
use env_logger::Env;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use sketchroom::app::build_app;
use sketchroom::config::Config;
use sketchroom::database::{EntityStore, JsonFileStore, Persister};
use sketchroom::session::{spawn_sweeper, SessionRegistry};
use sketchroom::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env()?;

    let store: Arc<dyn EntityStore> = Arc::new(
        JsonFileStore::open(&config.data_dir)
            .with_context(|| format!("opening data dir {}", config.data_dir.display()))?,
    );
    let (persister, persist_task) = Persister::spawn(store.clone());
    let registry = Arc::new(
        SessionRegistry::restore(store, persister.clone(), config.session.clone())
            .context("restoring rooms from store")?,
    );

    let report = registry.rearm_timers(Utc::now()).await;
    log::info!(
        "Timers re-armed: {}, completed while down: {}",
        report.rearmed,
        report.completed
    );

    let cancel_token = CancellationToken::new();
    let sweeper = spawn_sweeper(registry.clone(), config.cleanup_interval, cancel_token.clone());

    let app_state = AppState {
        registry: registry.clone(),
        auth: config.auth.clone(),
    };
    let app = build_app(app_state, config.client_url.as_deref());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    log::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Shutting down, flushing pending writes");
    cancel_token.cancel();
    if let Err(e) = sweeper.await {
        log::error!("Sweeper task failed: {}", e);
    }
    persister.flush().await;
    persist_task.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
