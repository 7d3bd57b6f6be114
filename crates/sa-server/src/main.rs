//! STEP analyzer server entry point

use std::sync::Arc;

use sa_cad::{CadKernel, NullKernel, resolve_kernel};
use sa_server::{AppState, ServerConfig, app};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sa_server=debug,sa_core=debug,sa_cad=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting STEP analyzer");

    let config = ServerConfig::load()?;
    let kernel: Arc<dyn CadKernel> = match resolve_kernel(config.kernel_preference()?) {
        Ok(kernel) => kernel,
        Err(e) => {
            // Keep serving so /healthz can report the missing backend
            tracing::warn!("No geometry kernel available: {}", e);
            Arc::new(NullKernel)
        }
    };

    let addr = config.socket_addr()?;
    let state = AppState::new(kernel, config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
