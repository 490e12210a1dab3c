use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use coach_recruit::config::AppConfig;
use coach_recruit::telemetry;
use coach_recruit::workflows::recruiting::{
    recruiting_router, ApplicationService, MemorySettings, MemorySink, MemoryStore,
    RecruitingState, VerificationEngine,
};
use tracing::info;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("fatal: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let settings = Arc::new(MemorySettings::default());

    let state = Arc::new(RecruitingState {
        applications: ApplicationService::new(store.clone(), sink.clone(), settings.clone()),
        verification: VerificationEngine::new(store.clone(), sink.clone(), settings.clone()),
    });

    // Background sweep: freeze applications of closed windows and remind
    // coaches of approaching supplement deadlines.
    let sweeper = ApplicationService::new(store, sink, settings);
    let interval = config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now();
            if let Err(err) = sweeper.freeze_closed(now) {
                tracing::warn!(error = %err, "freeze sweep failed");
            }
            if let Err(err) = sweeper.remind_deadlines(now) {
                tracing::warn!(error = %err, "deadline reminder sweep failed");
            }
        }
    });

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .merge(recruiting_router(state));

    let addr = config.server.socket_addr()?;
    info!(%addr, env = ?config.environment, "recruiting service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
