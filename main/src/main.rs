use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::{extract::FromRef, Router};
use common::{
    engine::{working_dir::WorkingDirEngineFactory, EngineFactory, EngineHandle},
    error::AppError,
    utils::config::{get_config, AppConfig},
};
use graph_manager::GraphManager;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let factory: Arc<dyn EngineFactory> = Arc::new(WorkingDirEngineFactory);
    let server = build_server(&config, factory).await?;

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, server.app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    server.manager.shutdown().await;
    if let Err(e) = server.default_instance.close().await {
        error!("Failed to close default instance: {}", e);
    }

    Ok(())
}

struct Server {
    app: Router,
    manager: Arc<GraphManager>,
    default_instance: EngineHandle,
}

async fn build_server(
    config: &AppConfig,
    factory: Arc<dyn EngineFactory>,
) -> Result<Server, AppError> {
    let manager = Arc::new(GraphManager::load(config, Arc::clone(&factory)).await?);

    // Served whenever no graph is active
    let default_dir = config.default_graph_dir();
    tokio::fs::create_dir_all(&default_dir).await?;
    let default_instance = factory.construct(&default_dir).await?;
    info!(
        working_dir = %default_dir.display(),
        active_graph = ?manager.current_graph_id().await,
        "Default instance initialized"
    );

    let api_state = ApiState::new(config, Arc::clone(&manager), Arc::clone(&default_instance));

    // Create Axum router
    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(AppState { api_state });

    Ok(Server {
        app,
        manager,
        default_instance,
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

#[derive(Clone, FromRef)]
struct AppState {
    api_state: ApiState,
}
