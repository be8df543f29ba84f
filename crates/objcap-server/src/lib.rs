//! Objcap Server - Capture bridge host
//!
//! Exposes the capture session, reconstruction and directory listing surface
//! over HTTP and a Unix socket speaking JSON lines. Socket clients also
//! receive every bridge event; together they act as the global event emitter.

pub mod command;
pub mod events;
pub mod http;
pub mod socket;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Router,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use objcap_core::config::CaptureConfig;
use objcap_core::reconstruction::{ReconstructionEngine, ReconstructionSupervisor};
use objcap_core::session::{CapturePlatform, SessionManager};
use objcap_core::simulated::{ScriptedEngine, SimulatedPlatform};

pub use events::BroadcastSink;

/// Error type of the server entry points
pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub reconstruction: ReconstructionSupervisor,
    pub events: Arc<BroadcastSink>,
    /// Connected clients; also serializes emitter attach and detach
    clients: Mutex<usize>,
}

impl AppState {
    pub fn new(
        platform: Arc<dyn CapturePlatform>,
        engine: Arc<dyn ReconstructionEngine>,
        config: &CaptureConfig,
    ) -> Self {
        let events = Arc::new(BroadcastSink::new(config.events.buffer_capacity));
        Self {
            session: Arc::new(SessionManager::new(platform, config)),
            reconstruction: ReconstructionSupervisor::new(engine, events.clone(), config),
            events,
            clients: Mutex::new(0),
        }
    }

    /// Backed by the simulated platform and a completing scripted engine
    pub fn simulated(config: &CaptureConfig) -> Self {
        Self::new(
            Arc::new(SimulatedPlatform::new()),
            Arc::new(ScriptedEngine::completing().with_step_delay(Duration::from_millis(250))),
            config,
        )
    }

    /// Subscribe a client to bridge events.
    ///
    /// Session events buffered while no client was connected are flushed to
    /// the new subscriber.
    pub fn connect_client(&self) -> broadcast::Receiver<Value> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let receiver = self.events.subscribe();
        *clients += 1;
        self.session.set_event_emitter(self.events.clone());
        receiver
    }

    /// Drop a client's subscription; the last one to leave detaches the
    /// emitter so session events are buffered again.
    pub fn disconnect_client(&self, receiver: broadcast::Receiver<Value>) {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        drop(receiver);
        *clients = clients.saturating_sub(1);
        if *clients == 0 {
            self.session.detach_event_emitter();
        }
    }

    pub fn client_count(&self) -> usize {
        *self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Session endpoints
        .route("/session", get(http::get_session_status))
        .route("/session/setup", post(http::setup_session))
        .route("/session/cleanup", post(http::cleanup_session))
        .route("/session/directories", put(http::set_directories))
        .route("/session/commands/{command}", post(http::run_session_command))
        // Reconstruction endpoints
        .route(
            "/reconstruction",
            post(http::start_reconstruction).delete(http::cancel_reconstruction),
        )
        .route("/files", get(http::list_files))
        // System endpoints
        .route("/constants", get(http::get_constants))
        .route("/status", get(http::get_status))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<(), ServerError> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Objcap server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use objcap_core::bridge::SessionEvent;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::simulated(&CaptureConfig::default()))
    }

    #[tokio::test]
    async fn test_last_disconnect_detaches_emitter() {
        let state = state();
        let first = state.connect_client();
        let second = state.connect_client();
        assert_eq!(state.client_count(), 2);

        state.disconnect_client(first);
        assert!(state.session.has_event_emitter());

        // A client arriving between two leaving keeps the emitter attached
        let third = state.connect_client();
        state.disconnect_client(second);
        assert!(state.session.has_event_emitter());

        state.disconnect_client(third);
        assert_eq!(state.client_count(), 0);
        assert!(!state.session.has_event_emitter());

        state.session.send_event(SessionEvent::CaptureComplete { completed: true });
        let mut late = state.connect_client();
        let event = late.recv().await.unwrap();
        assert_eq!(event["event"], "onCaptureComplete");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clients_keep_emitter_consistent() {
        let state = state();
        let _anchor = state.connect_client();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let receiver = state.connect_client();
                    tokio::task::yield_now().await;
                    state.disconnect_client(receiver);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(state.client_count(), 1);
        assert!(state.session.has_event_emitter());
    }
}
