use activity_report::api::{self, AppState};
use activity_report::config::ServerConfig;
use activity_report::store::SessionStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("activity_report=info")),
        )
        .init();

    let config = ServerConfig::load()?;
    let store = SessionStore::open(&config.database_path)?;
    let app = api::router(AppState::new(store, config.defaults.clone()));

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server running");
    axum::serve(listener, app).await?;
    Ok(())
}
