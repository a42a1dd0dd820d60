use std::process::ExitCode;

use log::{error, info, warn};
use tokio::net::TcpListener;

use docsum::{telemetry, DocumentService, Settings};
use docsum_server::{build_router, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = telemetry::init_logging(&settings.logging) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting docsum-server v{}", env!("CARGO_PKG_VERSION"));

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let service = DocumentService::from_settings(&settings)?;

    // degraded start: requests touching the store fail until it is reachable
    if let Err(e) = service.store().ping().await {
        warn!("Document store is unreachable: {}", e);
    }

    if settings.model.preload {
        service.warm_up().await;
    }

    let app = build_router(AppState::new(service.clone(), settings.upload.max_bytes));
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down workers");
    tokio::task::spawn_blocking(move || service.shutdown()).await?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
