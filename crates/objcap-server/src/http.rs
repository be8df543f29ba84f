//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use objcap_core::bridge::{constants, BridgeConstants};
use objcap_core::config::check_relative_path;
use objcap_core::error::{PathError, ReconstructionError};
use objcap_core::reconstruction::DirectoryListing;

use crate::command::{SessionCommand, SessionStatus, SetupOutcome};
use crate::AppState;

/// Get server status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "sessionLive": state.session.has_live_session().await,
        "reconstructionLive": state.reconstruction.has_live_job().await,
        "bufferedEvents": state.session.buffered_event_count(),
        "clients": state.client_count(),
        "workingRoot": state.session.working_root().display().to_string(),
    }))
}

/// Get the exported bridge constants
pub async fn get_constants() -> Json<BridgeConstants> {
    Json(constants())
}

// ============================================================================
// Session
// ============================================================================

/// Get every session query at once
pub async fn get_session_status(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    Json(SessionStatus::collect(&state.session).await)
}

/// Tear down any live session and start a new one
pub async fn setup_session(State(state): State<Arc<AppState>>) -> Json<SetupOutcome> {
    Json(SetupOutcome::run(&state.session).await)
}

/// Cancel and drop the live session
pub async fn cleanup_session(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let success = state.session.cleanup_session().await;
    Json(serde_json::json!({ "success": success }))
}

/// Request to change the session directories
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoriesRequest {
    pub checkpoint_directory: Option<String>,
    pub images_directory: Option<String>,
}

/// Set the directories the next session uses.
///
/// Both directories are checked before either is applied.
pub async fn set_directories(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DirectoriesRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let fields = [
        ("checkpointDirectory", &request.checkpoint_directory),
        ("imagesDirectory", &request.images_directory),
    ];
    for (field, dir) in fields {
        if let Some(dir) = dir {
            check_relative_path(dir)
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("{field}: {e}")))?;
        }
    }

    let invalid = |e: PathError| (StatusCode::BAD_REQUEST, e.to_string());
    if let Some(dir) = request.checkpoint_directory {
        state.session.set_checkpoint_directory(dir).map_err(invalid)?;
    }
    if let Some(dir) = request.images_directory {
        state.session.set_images_directory(dir).map_err(invalid)?;
    }

    let layout = state.session.directory_layout();
    Ok(Json(serde_json::json!({
        "checkpointDirectory": layout.checkpoint,
        "imagesDirectory": layout.images,
    })))
}

/// Run a session command by name
pub async fn run_session_command(
    State(state): State<Arc<AppState>>,
    Path(command): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let command: SessionCommand = command
        .parse()
        .map_err(|e: String| (StatusCode::NOT_FOUND, e))?;

    command.run(&state.session).await;
    Ok(Json(serde_json::json!({
        "success": true,
        "command": command.as_str(),
    })))
}

// ============================================================================
// Reconstruction
// ============================================================================

/// Request to start a reconstruction job
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReconstructionRequest {
    pub input_path: String,
    pub checkpoint_path: String,
    pub output_path: String,
}

fn reconstruction_status(err: &ReconstructionError) -> StatusCode {
    match err {
        ReconstructionError::Input(_) => StatusCode::BAD_REQUEST,
        ReconstructionError::Engine(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ReconstructionError::Preparation { .. } | ReconstructionError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Start a reconstruction job
pub async fn start_reconstruction(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartReconstructionRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let started = state
        .reconstruction
        .start_reconstruction(
            &request.input_path,
            &request.checkpoint_path,
            &request.output_path,
        )
        .await
        .map_err(|e| (reconstruction_status(&e), format!("{}: {}", e.code(), e)))?;

    Ok(Json(serde_json::json!({ "success": started })))
}

/// Cancel the live reconstruction job
pub async fn cancel_reconstruction(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let success = state.reconstruction.cancel_reconstruction().await;
    Json(serde_json::json!({ "success": success }))
}

/// Query parameters for directory listing
#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub path: String,
}

/// List a directory relative to the working root
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<DirectoryListing>, (StatusCode, String)> {
    state
        .reconstruction
        .list_directory_contents(&query.path)
        .map(Json)
        .map_err(|e| (reconstruction_status(&e), format!("{}: {}", e.code(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use objcap_core::config::CaptureConfig;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::create_router;

    fn test_state(root: &std::path::Path) -> Arc<AppState> {
        let mut config = CaptureConfig::with_working_root(root);
        config.timing.finish_settle_delay_ms = 0;
        Arc::new(AppState::simulated(&config))
    }

    async fn call(
        state: &Arc<AppState>,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn json(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_session_status_without_session() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path());

        let (status, body) = call(&state, "GET", "/session", None).await;

        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["state"], "unknown");
        assert_eq!(body["tracking"], "unknown");
        assert_eq!(body["shotsTaken"], 0);
        assert_eq!(body["deviceSupported"], true);
    }

    #[tokio::test]
    async fn test_setup_and_command() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path());

        let (_, body) = call(&state, "POST", "/session/setup", None).await;
        assert_eq!(json(&body), serde_json::json!({"success": true}));

        let (status, _) = call(&state, "POST", "/session/commands/startDetection", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&state, "GET", "/session", None).await;
        assert_eq!(json(&body)["state"], "detecting");
    }

    #[tokio::test]
    async fn test_unknown_command_is_not_found() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path());

        let (status, _) = call(&state, "POST", "/session/commands/explode", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_set_directories() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path());

        let (_, body) = call(
            &state,
            "PUT",
            "/session/directories",
            Some(serde_json::json!({"imagesDirectory": "Run2/Images/"})),
        )
        .await;

        let body = json(&body);
        assert_eq!(body["imagesDirectory"], "Run2/Images/");
        assert_eq!(body["checkpointDirectory"], "Snapshots/");
    }

    #[tokio::test]
    async fn test_directories_outside_root_rejected() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path());

        let (status, body) = call(
            &state,
            "PUT",
            "/session/directories",
            Some(serde_json::json!({
                "checkpointDirectory": "Fresh/",
                "imagesDirectory": "../outside",
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body).unwrap().starts_with("imagesDirectory"));
        // Nothing applied when either directory is rejected
        let layout = state.session.directory_layout();
        assert_eq!(layout.checkpoint, "Snapshots/");
        assert_eq!(layout.images, "Images/");
    }

    #[tokio::test]
    async fn test_reconstruction_output_outside_root_rejected() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let victim = dir.path().join("victim.txt");
        std::fs::write(&victim, b"keep me").unwrap();
        let state = test_state(&root);

        let (status, body) = call(
            &state,
            "POST",
            "/reconstruction",
            Some(serde_json::json!({
                "inputPath": "Images/",
                "checkpointPath": "Snapshots/",
                "outputPath": "../victim.txt",
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body).unwrap().starts_with("invalidInput"));
        assert_eq!(std::fs::read(&victim).unwrap(), b"keep me");
    }

    #[tokio::test]
    async fn test_list_outside_root_rejected() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path());

        for uri in ["/files?path=..", "/files?path=%2Fetc", "/files?path="] {
            let (status, _) = call(&state, "GET", uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_reconstruction_rejects_empty_input() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("Images")).unwrap();
        let state = test_state(dir.path());

        let (status, body) = call(
            &state,
            "POST",
            "/reconstruction",
            Some(serde_json::json!({
                "inputPath": "Images/",
                "checkpointPath": "Snapshots/",
                "outputPath": "Outputs/model.usdz",
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body).unwrap().starts_with("invalidInput"));
    }

    #[tokio::test]
    async fn test_cancel_without_job() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path());

        let (_, body) = call(&state, "DELETE", "/reconstruction", None).await;
        assert_eq!(json(&body), serde_json::json!({"success": true}));
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path());

        let (status, body) = call(&state, "GET", "/files?path=Outputs/", None).await;

        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["exists"], false);
        assert_eq!(body["files"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_constants() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path());

        let (_, body) = call(&state, "GET", "/constants", None).await;

        let body = json(&body);
        assert_eq!(body["SessionState"]["ready"], "ready");
        assert!(body["CaptureEvents"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("onScanPassCompleted")));
    }
}
