use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::services::InferenceService;

/// Start the prediction API and serve until `shutdown` resolves
pub async fn start_api_server<F>(
    config: &ServerConfig,
    inference: Arc<InferenceService>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app_state = AppState::new(inference).with_max_body_bytes(config.max_body_bytes);
    let app = create_router(app_state);

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}
