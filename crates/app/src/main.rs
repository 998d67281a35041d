mod admin;
mod problem;
mod router;
mod shell;
mod telemetry;
mod url;

use std::net::SocketAddr;

use kasir_storage::Database;
use kasir_util::{load_env_file, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", "migrations applied");

    let state = router::AppState::new(metrics, database, &config);

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        app = %config.app_name,
        force_https = config.force_https,
        "starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
