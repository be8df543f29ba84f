//! Unix domain socket host for local bridge clients
//!
//! Line-delimited JSON. Requests look like
//! `{"id": 1, "method": "session.setup", "params": {...}}` and are answered
//! with `{"id", "result"}` or `{"id", "error": {"code", "message"}}`. Bridge
//! events are interleaved as `{"event", "body"}` lines.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use objcap_core::bridge::constants;
use objcap_core::config::check_relative_path;
use objcap_core::error::PathError;

use crate::command::{SessionCommand, SessionStatus, SetupOutcome};
use crate::{AppState, ServerError};

/// Failure answering a single request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// The operation ran and failed; `kind` is the bridge error code
    #[error("{message}")]
    Failed { kind: &'static str, message: String },
}

impl RequestError {
    pub fn code(&self) -> i64 {
        match self {
            RequestError::MethodNotFound(_) => -32601,
            RequestError::InvalidParams(_) => -32602,
            RequestError::Failed { .. } => -32000,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            RequestError::Failed { kind, message } => json!({
                "code": self.code(),
                "message": message,
                "data": { "code": kind },
            }),
            _ => json!({ "code": self.code(), "message": self.to_string() }),
        }
    }
}

/// Start the Unix socket server
pub async fn serve_unix_socket(
    path: impl AsRef<Path>,
    state: Arc<AppState>,
) -> Result<(), ServerError> {
    // Remove existing socket file
    let path = path.as_ref();
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;
    tracing::info!("Unix socket listening on {:?}", path);

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_unix_connection(stream, state).await {
                        tracing::error!("Unix socket connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                tracing::error!("Unix socket accept error: {}", e);
            }
        }
    }
}

async fn write_line(
    writer: &mut (impl AsyncWriteExt + Unpin),
    value: &Value,
) -> Result<(), ServerError> {
    let line = serde_json::to_string(value)? + "\n";
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Handle a Unix socket connection
async fn handle_unix_connection(stream: UnixStream, state: Arc<AppState>) -> Result<(), ServerError> {
    let client = Uuid::new_v4();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut events = state.connect_client();
    tracing::info!("Client {} connected", client);

    let result = loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e.into()),
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<Value>(&line) {
                    Ok(request) => handle_request(&request, &state).await,
                    Err(e) => json!({
                        "id": Value::Null,
                        "error": { "code": -32700, "message": format!("Parse error: {e}") },
                    }),
                };
                if let Err(e) = write_line(&mut writer, &response).await {
                    break Err(e);
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Err(e) = write_line(&mut writer, &event).await {
                        break Err(e);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Client {} lagged, {} events dropped", client, missed);
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    state.disconnect_client(events);
    tracing::info!("Client {} disconnected", client);
    result
}

fn param<'a>(request: &'a Value, name: &str) -> Result<&'a str, RequestError> {
    request
        .get("params")
        .and_then(|p| p.get(name))
        .and_then(|v| v.as_str())
        .ok_or_else(|| RequestError::InvalidParams(format!("missing string param '{name}'")))
}

/// A string param naming a path inside the working root
fn path_param<'a>(request: &'a Value, name: &str) -> Result<&'a str, RequestError> {
    let path = param(request, name)?;
    check_relative_path(path).map_err(|e| invalid_path(name, e))?;
    Ok(path)
}

fn invalid_path(name: &str, err: PathError) -> RequestError {
    RequestError::InvalidParams(format!("'{name}': {err}"))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, RequestError> {
    serde_json::to_value(value).map_err(|e| RequestError::Failed {
        kind: "serialization",
        message: e.to_string(),
    })
}

async fn dispatch(method: &str, request: &Value, state: &AppState) -> Result<Value, RequestError> {
    let session = &state.session;

    if let Some(command) = method.strip_prefix("session.") {
        if let Ok(command) = command.parse::<SessionCommand>() {
            command.run(session).await;
            return Ok(Value::Null);
        }
    }

    match method {
        "status" => Ok(json!({
            "sessionLive": session.has_live_session().await,
            "reconstructionLive": state.reconstruction.has_live_job().await,
            "bufferedEvents": session.buffered_event_count(),
            "clients": state.client_count(),
        })),
        "constants" => to_value(constants()),

        "session.setup" => to_value(SetupOutcome::run(session).await),
        "session.cleanup" => Ok(json!(session.cleanup_session().await)),
        "session.setCheckpointDirectory" => {
            session
                .set_checkpoint_directory(param(request, "path")?)
                .map_err(|e| invalid_path("path", e))?;
            Ok(Value::Null)
        }
        "session.setImagesDirectory" => {
            session
                .set_images_directory(param(request, "path")?)
                .map_err(|e| invalid_path("path", e))?;
            Ok(Value::Null)
        }
        "session.status" => to_value(SessionStatus::collect(session).await),
        "session.getSessionState" => to_value(session.get_session_state().await),
        "session.getTrackingState" => to_value(session.get_tracking_state().await),
        "session.getFeedbackState" => to_value(session.get_feedback_state().await),
        "session.getNumberOfShotsTaken" => Ok(json!(session.get_number_of_shots_taken().await)),
        "session.getNumberOfScanPassUpdates" => {
            Ok(json!(session.get_number_of_scan_pass_updates().await))
        }
        "session.getUserCompletedScanState" => {
            Ok(json!(session.get_user_completed_scan_state().await))
        }
        "session.isDeviceSupported" => Ok(json!(session.is_device_supported().await)),

        "reconstruction.start" => {
            let input = path_param(request, "inputPath")?;
            let checkpoint = path_param(request, "checkpointPath")?;
            let output = path_param(request, "outputPath")?;
            state
                .reconstruction
                .start_reconstruction(input, checkpoint, output)
                .await
                .map(|started| json!(started))
                .map_err(|e| RequestError::Failed {
                    kind: e.code(),
                    message: e.to_string(),
                })
        }
        "reconstruction.cancel" => Ok(json!(state.reconstruction.cancel_reconstruction().await)),
        "fs.list" => {
            let listing = state
                .reconstruction
                .list_directory_contents(path_param(request, "path")?)
                .map_err(|e| RequestError::Failed {
                    kind: e.code(),
                    message: e.to_string(),
                })?;
            to_value(listing)
        }

        other => Err(RequestError::MethodNotFound(other.to_string())),
    }
}

/// Handle a request from a Unix socket client
pub(crate) async fn handle_request(request: &Value, state: &AppState) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let Some(method) = request.get("method").and_then(|m| m.as_str()) else {
        return json!({
            "id": id,
            "error": RequestError::InvalidParams("missing method".into()).to_json(),
        });
    };

    match dispatch(method, request, state).await {
        Ok(result) => json!({ "id": id, "result": result }),
        Err(e) => {
            tracing::debug!("Request {} failed: {}", method, e);
            json!({ "id": id, "error": e.to_json() })
        }
    }
}
