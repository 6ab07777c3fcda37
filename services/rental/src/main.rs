use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rental::{build_state, config::ServiceConfig, routes};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting rental service");

    let config = ServiceConfig::load()?;
    let state = build_state(&config).await?;

    if let Some(period) = config.sweep_interval() {
        state.spawn_sweeper(period);
        info!("Sweeping expired sessions and claims every {:?}", period);
    }

    info!("Rental service initialized successfully");

    // Start the web server
    let app = routes::create_router(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("Rental service listening on {}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
