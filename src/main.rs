mod config;
mod fetch;
mod identity;
mod routes;
mod session;
mod state;
mod views;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is normal outside local development.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")))
        .with(fmt::layer())
        .init();

    let settings = config::Settings::from_env();
    let port = settings.port;
    let state = state::AppState::new(settings)?;

    // Non-fatal: pages render the configuration diagnostic instead.
    if let Some(diagnostic) = state.identity.diagnostic() {
        tracing::warn!(%diagnostic, "identity provider not configured");
    }

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "profile portal listening");
    axum::serve(listener, app).await?;
    Ok(())
}
