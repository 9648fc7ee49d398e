use anyhow::Result;
use domain::services::{CodeStore, InMemoryCodeStore};
use persistence::repositories::RegistrationCodeRepository;
use std::sync::Arc;
use tracing::{info, warn};

use code_registry_api::{app, config, middleware};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = config::Config::load()?;

    // Initialize logging
    middleware::logging::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting Code Registry API v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn CodeStore> = if config.database.is_memory() {
        warn!("Using the in-memory code store; codes are lost on restart");
        Arc::new(InMemoryCodeStore::new())
    } else {
        // Connects and brings the schema up to date
        let pool = persistence::db::connect(&config.database.pool_config()).await?;
        Arc::new(RegistrationCodeRepository::new(pool))
    };

    if !config.security.admin_enabled() {
        warn!("security.admin_api_key_hash is not set; admin routes will answer 403");
    }

    let addr = config.socket_addr()?;
    let app = app::create_app(config, store);

    // Start server
    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
