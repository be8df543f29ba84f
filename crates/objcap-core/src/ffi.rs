//! FFI bindings for Swift/Kotlin via UniFFI.
//!
//! Hosts implement the `Ffi*` foreign traits over the native capture and
//! reconstruction frameworks and drive everything through [`CaptureBridge`]
//! and [`ReconstructionBridge`].

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};

use crate::bridge::{constants, BridgeEvent, EventSink};
use crate::config::CaptureConfig;
use crate::error::{EngineError, EngineErrorKind, PathError, ReconstructionError};
use crate::reconstruction::{
    DirectoryListing, JobConfiguration, JobOutput, ReconstructionEngine, ReconstructionJob,
    ReconstructionSupervisor, Request,
};
use crate::session::{
    CameraAuthorization, CaptureHandle, CapturePlatform, CaptureState, Feedback, SessionManager,
    SignalSender, TrackingState,
};

// MARK: - Errors

/// Error type exposed to foreign callers
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum FfiError {
    #[error("{message}")]
    Config { message: String },
    #[error("{message}")]
    InvalidPath { message: String },
    #[error("{message}")]
    Reconstruction { code: String, message: String },
    #[error("{message}")]
    Engine {
        kind: EngineErrorKind,
        message: String,
    },
    #[error("Foreign callback failed: {message}")]
    Callback { message: String },
}

impl From<uniffi::UnexpectedUniFFICallbackError> for FfiError {
    fn from(err: uniffi::UnexpectedUniFFICallbackError) -> Self {
        FfiError::Callback {
            message: err.reason,
        }
    }
}

impl From<PathError> for FfiError {
    fn from(err: PathError) -> Self {
        FfiError::InvalidPath {
            message: err.to_string(),
        }
    }
}

impl From<ReconstructionError> for FfiError {
    fn from(err: ReconstructionError) -> Self {
        FfiError::Reconstruction {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<FfiError> for EngineError {
    fn from(err: FfiError) -> Self {
        match err {
            FfiError::Engine { kind, message } => EngineError::new(kind, message),
            other => EngineError::new(EngineErrorKind::Other, other.to_string()),
        }
    }
}

fn load_config(config_json: Option<String>) -> Result<CaptureConfig, FfiError> {
    let config = match config_json {
        Some(json) => CaptureConfig::from_json(&json),
        None => Ok(CaptureConfig::load_standard()),
    }
    .and_then(|config| config.validate().map(|_| config))
    .map_err(|e| FfiError::Config {
        message: e.to_string(),
    })?;
    Ok(config)
}

// MARK: - Foreign traits

/// Global event emitter implemented by the host
#[uniffi::export(with_foreign)]
pub trait FfiEventSink: Send + Sync {
    fn send_event(&self, name: String, body_json: String);
}

/// Native capture device implemented by the host
#[uniffi::export(with_foreign)]
pub trait FfiCapturePlatform: Send + Sync {
    fn is_supported(&self) -> bool;
    fn graphics_device(&self) -> Option<String>;
    fn has_command_queue(&self) -> bool;
    fn supports_hardware_tier(&self, tier: String) -> bool;
    fn camera_authorization(&self) -> CameraAuthorization;
    /// Prompt for camera access and answer through `reply`
    fn request_camera_access(&self, reply: Arc<FfiPermissionReply>);
    fn create_handle(
        &self,
        signals: Arc<FfiSignalSender>,
    ) -> Result<Arc<dyn FfiCaptureHandle>, FfiError>;
}

/// Native capture session implemented by the host
#[uniffi::export(with_foreign)]
pub trait FfiCaptureHandle: Send + Sync {
    fn start(&self, images_directory: String, checkpoint_directory: String);
    fn resume(&self);
    fn pause(&self);
    fn start_detecting(&self);
    fn reset_detection(&self);
    fn start_capturing(&self);
    fn begin_new_scan_pass(&self);
    fn begin_new_scan_pass_after_flip(&self);
    fn finish(&self);
    fn cancel(&self);
    fn state(&self) -> CaptureState;
    fn tracking(&self) -> TrackingState;
    fn feedback(&self) -> Vec<Feedback>;
    fn number_of_shots_taken(&self) -> u32;
    fn user_completed_scan_pass(&self) -> bool;
}

/// Native reconstruction engine implemented by the host
#[uniffi::export(with_foreign)]
pub trait FfiReconstructionEngine: Send + Sync {
    /// Create a job that reports through `outputs`
    fn create_job(
        &self,
        input_directory: String,
        checkpoint_directory: String,
        outputs: Arc<FfiJobOutputSender>,
    ) -> Result<Arc<dyn FfiReconstructionJob>, FfiError>;
}

#[uniffi::export(with_foreign)]
pub trait FfiReconstructionJob: Send + Sync {
    fn process_model_file(&self, output_path: String) -> Result<(), FfiError>;
    fn cancel(&self);
}

// MARK: - Host-facing callback objects

/// One-shot answer to a camera permission prompt
#[derive(uniffi::Object)]
pub struct FfiPermissionReply {
    tx: Mutex<Option<oneshot::Sender<bool>>>,
}

#[uniffi::export]
impl FfiPermissionReply {
    /// Only the first answer counts
    pub fn resolve(&self, granted: bool) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(tx) = tx {
            let _ = tx.send(granted);
        }
    }
}

/// Channel the host reports native capture changes through
#[derive(uniffi::Object)]
pub struct FfiSignalSender {
    inner: SignalSender,
}

#[uniffi::export]
impl FfiSignalSender {
    pub fn state_changed(&self, state: CaptureState) {
        self.inner.state_changed(state);
    }

    pub fn tracking_changed(&self, tracking: TrackingState) {
        self.inner.tracking_changed(tracking);
    }

    pub fn feedback_changed(&self, feedback: Vec<Feedback>) {
        self.inner.feedback_changed(feedback);
    }

    pub fn scan_pass_changed(&self, completed: bool) {
        self.inner.scan_pass_changed(completed);
    }
}

/// Channel the host reports reconstruction outputs through
#[derive(uniffi::Object)]
pub struct FfiJobOutputSender {
    tx: mpsc::UnboundedSender<JobOutput>,
    request: Mutex<Option<Request>>,
}

impl FfiJobOutputSender {
    fn send(&self, output: JobOutput) {
        if self.tx.send(output).is_err() {
            tracing::debug!("Dropping job output, consumer gone");
        }
    }

    fn request(&self) -> Request {
        self.request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or(Request::ModelFile {
                path: Default::default(),
            })
    }
}

#[uniffi::export]
impl FfiJobOutputSender {
    pub fn processing_complete(&self) {
        self.send(JobOutput::ProcessingComplete);
    }

    pub fn request_error(&self, kind: EngineErrorKind, message: String) {
        self.send(JobOutput::RequestError {
            request: self.request(),
            error: EngineError::new(kind, message),
        });
    }

    pub fn request_complete(&self) {
        self.send(JobOutput::RequestComplete {
            request: self.request(),
        });
    }

    pub fn request_progress(&self, fraction: f64) {
        self.send(JobOutput::RequestProgress {
            request: self.request(),
            fraction,
        });
    }

    pub fn request_progress_info(&self) {
        self.send(JobOutput::RequestProgressInfo {
            request: self.request(),
        });
    }

    pub fn input_complete(&self) {
        self.send(JobOutput::InputComplete);
    }

    pub fn invalid_sample(&self, id: String, reason: String) {
        self.send(JobOutput::InvalidSample { id, reason });
    }

    pub fn skipped_sample(&self, id: String) {
        self.send(JobOutput::SkippedSample { id });
    }

    pub fn automatic_downsampling(&self) {
        self.send(JobOutput::AutomaticDownsampling);
    }

    pub fn processing_cancelled(&self) {
        self.send(JobOutput::ProcessingCancelled);
    }

    pub fn stitching_incomplete(&self) {
        self.send(JobOutput::StitchingIncomplete);
    }

    pub fn unrecognized(&self, tag: String) {
        self.send(JobOutput::Unrecognized(tag));
    }
}

// MARK: - Adapters from foreign traits to core traits

struct ForeignSink(Arc<dyn FfiEventSink>);

impl EventSink for ForeignSink {
    fn send_event(&self, event: &BridgeEvent) {
        self.0
            .send_event(event.name().to_string(), event.body().to_string());
    }
}

struct ForeignPlatform(Arc<dyn FfiCapturePlatform>);

impl CapturePlatform for ForeignPlatform {
    fn is_supported(&self) -> bool {
        self.0.is_supported()
    }

    fn graphics_device(&self) -> Option<String> {
        self.0.graphics_device()
    }

    fn has_command_queue(&self) -> bool {
        self.0.has_command_queue()
    }

    fn supports_hardware_tier(&self, tier: &str) -> bool {
        self.0.supports_hardware_tier(tier.to_string())
    }

    fn camera_authorization(&self) -> CameraAuthorization {
        self.0.camera_authorization()
    }

    fn request_camera_access(&self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.0.request_camera_access(Arc::new(FfiPermissionReply {
            tx: Mutex::new(Some(tx)),
        }));
        rx
    }

    fn create_handle(&self, signals: SignalSender) -> Result<Box<dyn CaptureHandle>, String> {
        let handle = self
            .0
            .create_handle(Arc::new(FfiSignalSender { inner: signals }))
            .map_err(|e| e.to_string())?;
        Ok(Box::new(ForeignHandle(handle)))
    }
}

struct ForeignHandle(Arc<dyn FfiCaptureHandle>);

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl CaptureHandle for ForeignHandle {
    fn start(&self, images_directory: &Path, checkpoint_directory: &Path) {
        self.0
            .start(path_string(images_directory), path_string(checkpoint_directory));
    }

    fn resume(&self) {
        self.0.resume();
    }

    fn pause(&self) {
        self.0.pause();
    }

    fn start_detecting(&self) {
        self.0.start_detecting();
    }

    fn reset_detection(&self) {
        self.0.reset_detection();
    }

    fn start_capturing(&self) {
        self.0.start_capturing();
    }

    fn begin_new_scan_pass(&self) {
        self.0.begin_new_scan_pass();
    }

    fn begin_new_scan_pass_after_flip(&self) {
        self.0.begin_new_scan_pass_after_flip();
    }

    fn finish(&self) {
        self.0.finish();
    }

    fn cancel(&self) {
        self.0.cancel();
    }

    fn state(&self) -> CaptureState {
        self.0.state()
    }

    fn tracking(&self) -> TrackingState {
        self.0.tracking()
    }

    fn feedback(&self) -> Vec<Feedback> {
        self.0.feedback()
    }

    fn number_of_shots_taken(&self) -> u32 {
        self.0.number_of_shots_taken()
    }

    fn user_completed_scan_pass(&self) -> bool {
        self.0.user_completed_scan_pass()
    }
}

struct ForeignEngine(Arc<dyn FfiReconstructionEngine>);

impl ReconstructionEngine for ForeignEngine {
    fn create_job(
        &self,
        configuration: &JobConfiguration,
    ) -> Result<Arc<dyn ReconstructionJob>, EngineError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let outputs = Arc::new(FfiJobOutputSender {
            tx,
            request: Mutex::new(None),
        });
        let job = self.0.create_job(
            path_string(&configuration.input_directory),
            path_string(&configuration.checkpoint_directory),
            outputs.clone(),
        )?;
        Ok(Arc::new(ForeignJob {
            job,
            outputs,
            rx: Mutex::new(Some(rx)),
        }))
    }
}

struct ForeignJob {
    job: Arc<dyn FfiReconstructionJob>,
    outputs: Arc<FfiJobOutputSender>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<JobOutput>>>,
}

impl ReconstructionJob for ForeignJob {
    fn process(
        &self,
        requests: Vec<Request>,
    ) -> Result<mpsc::UnboundedReceiver<JobOutput>, EngineError> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| EngineError::new(EngineErrorKind::Other, "Job is already processing"))?;

        let Some(request) = requests.into_iter().next() else {
            return Err(EngineError::new(
                EngineErrorKind::InvalidOutput,
                "No requests to process",
            ));
        };
        let Request::ModelFile { path } = &request;
        let output_path = path_string(path);
        *self
            .outputs
            .request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request);

        self.job.process_model_file(output_path)?;
        Ok(rx)
    }

    fn cancel(&self) {
        self.job.cancel();
    }
}

// MARK: - Capture bridge

/// Outcome of `setup_session` in the `(success, errorMessage?)` form
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct SetupOutcome {
    pub success: bool,
    pub error_message: Option<String>,
}

/// Capture session surface for foreign hosts
#[derive(uniffi::Object)]
pub struct CaptureBridge {
    manager: Arc<SessionManager>,
}

#[uniffi::export(async_runtime = "tokio")]
impl CaptureBridge {
    /// `config_json` overrides the standard configuration file
    #[uniffi::constructor]
    pub fn new(
        platform: Arc<dyn FfiCapturePlatform>,
        config_json: Option<String>,
    ) -> Result<Arc<Self>, FfiError> {
        let config = load_config(config_json)?;
        let manager = SessionManager::new(Arc::new(ForeignPlatform(platform)), &config);
        Ok(Arc::new(Self {
            manager: Arc::new(manager),
        }))
    }

    pub fn set_event_emitter(&self, sink: Arc<dyn FfiEventSink>) {
        self.manager.set_event_emitter(Arc::new(ForeignSink(sink)));
    }

    pub fn set_checkpoint_directory(&self, relative: String) -> Result<(), FfiError> {
        Ok(self.manager.set_checkpoint_directory(relative)?)
    }

    pub fn set_images_directory(&self, relative: String) -> Result<(), FfiError> {
        Ok(self.manager.set_images_directory(relative)?)
    }

    /// Constant tables as JSON
    pub fn constants_json(&self) -> String {
        serde_json::to_string(&constants()).unwrap_or_else(|_| "{}".to_string())
    }

    pub async fn setup_session(&self) -> SetupOutcome {
        match self.manager.setup_session().await {
            Ok(()) => SetupOutcome {
                success: true,
                error_message: None,
            },
            Err(e) => SetupOutcome {
                success: false,
                error_message: Some(e.to_string()),
            },
        }
    }

    pub async fn cleanup_session(&self) -> bool {
        self.manager.cleanup_session().await
    }

    pub async fn resume_session(&self) {
        self.manager.resume_session().await
    }

    pub async fn pause_session(&self) {
        self.manager.pause_session().await
    }

    pub async fn start_detection(&self) {
        self.manager.start_detection().await
    }

    pub async fn reset_detection(&self) {
        self.manager.reset_detection().await
    }

    pub async fn start_capturing(&self) {
        self.manager.start_capturing().await
    }

    pub async fn begin_new_scan(&self) {
        self.manager.begin_new_scan().await
    }

    pub async fn begin_new_scan_after_flip(&self) {
        self.manager.begin_new_scan_after_flip().await
    }

    pub async fn finish_session(&self) {
        self.manager.finish_session().await
    }

    pub async fn cancel_session(&self) {
        self.manager.cancel_session().await
    }

    pub async fn get_session_state(&self) -> CaptureState {
        self.manager.get_session_state().await
    }

    pub async fn get_tracking_state(&self) -> TrackingState {
        self.manager.get_tracking_state().await
    }

    pub async fn get_feedback_state(&self) -> Vec<Feedback> {
        self.manager.get_feedback_state().await
    }

    pub async fn get_number_of_shots_taken(&self) -> u32 {
        self.manager.get_number_of_shots_taken().await
    }

    pub async fn get_user_completed_scan_state(&self) -> bool {
        self.manager.get_user_completed_scan_state().await
    }

    pub async fn get_number_of_scan_pass_updates(&self) -> u64 {
        self.manager.get_number_of_scan_pass_updates().await
    }

    pub async fn is_device_supported(&self) -> bool {
        self.manager.is_device_supported().await
    }
}

// MARK: - Reconstruction bridge

/// Reconstruction surface for foreign hosts
#[derive(uniffi::Object)]
pub struct ReconstructionBridge {
    supervisor: ReconstructionSupervisor,
}

#[uniffi::export(async_runtime = "tokio")]
impl ReconstructionBridge {
    #[uniffi::constructor]
    pub fn new(
        engine: Arc<dyn FfiReconstructionEngine>,
        sink: Arc<dyn FfiEventSink>,
        config_json: Option<String>,
    ) -> Result<Arc<Self>, FfiError> {
        let config = load_config(config_json)?;
        let supervisor = ReconstructionSupervisor::new(
            Arc::new(ForeignEngine(engine)),
            Arc::new(ForeignSink(sink)),
            &config,
        );
        Ok(Arc::new(Self { supervisor }))
    }

    pub async fn start_reconstruction(
        &self,
        input_path: String,
        checkpoint_path: String,
        output_path: String,
    ) -> Result<bool, FfiError> {
        Ok(self
            .supervisor
            .start_reconstruction(&input_path, &checkpoint_path, &output_path)
            .await?)
    }

    pub async fn cancel_reconstruction(&self) -> bool {
        self.supervisor.cancel_reconstruction().await
    }

    pub fn list_directory_contents(&self, directory: String) -> Result<DirectoryListing, FfiError> {
        Ok(self.supervisor.list_directory_contents(&directory)?)
    }
}
