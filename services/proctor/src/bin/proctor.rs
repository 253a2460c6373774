//! services/proctor/src/bin/proctor.rs

use proctor_lib::{
    adapters::Fixtures,
    config::Config,
    console::{run_console, AppState, TokioScheduler},
    error::ServiceError,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    // stdout carries the console protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded. Starting proctor...");

    // --- 2. Load Fixtures ---
    let fixtures = Fixtures::load(&config.fixtures_path)?;

    // --- 3. Build the Shared AppState ---
    let scheduler = Arc::new(TokioScheduler::new());
    let (app_state, events) = AppState::from_fixtures(config.clone(), scheduler.clone(), fixtures);
    let app_state = Arc::new(app_state);

    // --- 4. Run the Console ---
    run_console(
        app_state.clone(),
        events,
        tokio::io::stdin(),
        tokio::io::stdout(),
    )
    .await?;

    app_state.rotator.dispose();
    scheduler.shutdown();
    info!("Proctor stopped.");
    Ok(())
}
