//! Objcap Server Binary
//!
//! Development host for the capture bridge, backed by the simulated platform.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use objcap_core::config::CaptureConfig;
use objcap_server::socket::serve_unix_socket;
use objcap_server::{serve, AppState, ServerError};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = CaptureConfig::load_standard();
    let state = Arc::new(AppState::simulated(&config));
    let addr = std::env::var("OBJCAP_ADDR").unwrap_or_else(|_| "127.0.0.1:8787".to_string());
    let socket = std::env::var("OBJCAP_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("objcap.sock"));

    tracing::info!("Working root {:?}", config.directories.working_root);
    tokio::try_join!(serve(&addr, state.clone()), serve_unix_socket(socket, state))?;
    Ok(())
}
