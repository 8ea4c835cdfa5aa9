mod bus;
mod config;
mod error;
mod events;
mod fanout;
mod identity;
mod persist;
mod presence;
mod registry;
mod router;
mod routes;
mod state;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use config::{generate_config_template, Config};
use persist::HttpPersistClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pulse_hub=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pulse_hub=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Pulse hub v{} starting", env!("CARGO_PKG_VERSION"));

    let identity_secret = identity::secret_from_config(&config.identity_secret);

    let persist = Arc::new(HttpPersistClient::new(
        &config.persistence_url,
        Duration::from_secs(config.persistence_timeout_secs),
    ));
    tracing::info!(
        persistence_url = %config.persistence_url,
        "persistence collaborator configured"
    );

    let app_state = state::build_state(&config, persist, identity_secret);

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
