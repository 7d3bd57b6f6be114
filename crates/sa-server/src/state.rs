//! Shared server state

use std::sync::Arc;

use sa_cad::CadKernel;
use tokio::sync::Semaphore;

use crate::config::ServerConfig;

/// State shared by all handlers
///
/// The kernel is resolved once at startup; the semaphore bounds how many
/// analyses run on the blocking pool at once.
#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<dyn CadKernel>,
    pub config: Arc<ServerConfig>,
    pub permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(kernel: Arc<dyn CadKernel>, config: ServerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            kernel,
            config: Arc::new(config),
            permits,
        }
    }
}
