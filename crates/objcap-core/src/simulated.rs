//! Simulated capture platform and reconstruction engine
//!
//! Software stand-ins for the native frameworks. They back the development
//! server and the test suites: a [`HandleRemote`] drives a simulated handle
//! from outside, the way a user moving around the object would.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Notify};

use crate::error::{EngineError, EngineErrorKind};
use crate::reconstruction::{
    JobConfiguration, JobOutput, ReconstructionEngine, ReconstructionJob, Request,
};
use crate::session::{
    CameraAuthorization, CaptureHandle, CapturePlatform, CaptureState, Feedback, SignalSender,
    TrackingState,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Capture
// ============================================================================

/// A configurable device
pub struct SimulatedPlatform {
    supported: bool,
    graphics_device: Option<String>,
    command_queue: bool,
    missing_tiers: Vec<String>,
    authorization: Mutex<CameraAuthorization>,
    grant_on_request: bool,
    live_handles: Arc<AtomicUsize>,
    handles_created: AtomicUsize,
    last_handle: Mutex<Option<HandleRemote>>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    /// A capable device with camera access already granted
    pub fn new() -> Self {
        Self {
            supported: true,
            graphics_device: Some("Simulated GPU".to_string()),
            command_queue: true,
            missing_tiers: Vec::new(),
            authorization: Mutex::new(CameraAuthorization::Authorized),
            grant_on_request: true,
            live_handles: Arc::new(AtomicUsize::new(0)),
            handles_created: AtomicUsize::new(0),
            last_handle: Mutex::new(None),
        }
    }

    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    pub fn without_graphics_device(mut self) -> Self {
        self.graphics_device = None;
        self
    }

    pub fn without_command_queue(mut self) -> Self {
        self.command_queue = false;
        self
    }

    pub fn without_tier(mut self, tier: impl Into<String>) -> Self {
        self.missing_tiers.push(tier.into());
        self
    }

    /// Camera authorization before any prompt, and the user's answer if
    /// prompted
    pub fn with_camera(self, authorization: CameraAuthorization, grant_on_request: bool) -> Self {
        *lock(&self.authorization) = authorization;
        Self {
            grant_on_request,
            ..self
        }
    }

    /// Handles currently alive (created and not yet dropped)
    pub fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }

    pub fn handles_created(&self) -> usize {
        self.handles_created.load(Ordering::SeqCst)
    }

    /// Remote for the most recently created handle
    pub fn last_handle(&self) -> Option<HandleRemote> {
        lock(&self.last_handle).clone()
    }
}

impl CapturePlatform for SimulatedPlatform {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn graphics_device(&self) -> Option<String> {
        self.graphics_device.clone()
    }

    fn has_command_queue(&self) -> bool {
        self.command_queue
    }

    fn supports_hardware_tier(&self, tier: &str) -> bool {
        !self.missing_tiers.iter().any(|t| t == tier)
    }

    fn camera_authorization(&self) -> CameraAuthorization {
        *lock(&self.authorization)
    }

    fn request_camera_access(&self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.authorization) = if self.grant_on_request {
            CameraAuthorization::Authorized
        } else {
            CameraAuthorization::Denied
        };
        let _ = tx.send(self.grant_on_request);
        rx
    }

    fn create_handle(&self, signals: SignalSender) -> Result<Box<dyn CaptureHandle>, String> {
        let remote = HandleRemote {
            state: Arc::new(Mutex::new(HandleState::default())),
            signals,
        };
        self.live_handles.fetch_add(1, Ordering::SeqCst);
        self.handles_created.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_handle) = Some(remote.clone());

        Ok(Box::new(SimulatedHandle {
            remote,
            live_handles: self.live_handles.clone(),
        }))
    }
}

#[derive(Debug)]
struct HandleState {
    state: CaptureState,
    tracking: TrackingState,
    feedback: Vec<Feedback>,
    shots: u32,
    scan_pass_completed: bool,
    paused: bool,
    cancelled: bool,
    images_directory: Option<PathBuf>,
}

impl Default for HandleState {
    fn default() -> Self {
        Self {
            state: CaptureState::Initializing,
            tracking: TrackingState::NotAvailable,
            feedback: vec![Feedback::ObjectNotDetected],
            shots: 0,
            scan_pass_completed: false,
            paused: false,
            cancelled: false,
            images_directory: None,
        }
    }
}

/// Drives a simulated handle from the outside and inspects it
#[derive(Clone)]
pub struct HandleRemote {
    state: Arc<Mutex<HandleState>>,
    signals: SignalSender,
}

impl HandleRemote {
    fn transition(&self, target: CaptureState) -> bool {
        let mut state = lock(&self.state);
        if !state.state.can_transition_to(&target) {
            tracing::debug!("Simulated handle ignores {} -> {}", state.state, target);
            return false;
        }
        state.state = target;
        drop(state);
        self.signals.state_changed(target);
        true
    }

    pub fn state(&self) -> CaptureState {
        lock(&self.state).state
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.state).cancelled
    }

    pub fn set_tracking(&self, tracking: TrackingState) {
        lock(&self.state).tracking = tracking;
        self.signals.tracking_changed(tracking);
    }

    pub fn set_feedback(&self, feedback: Vec<Feedback>) {
        lock(&self.state).feedback = feedback.clone();
        self.signals.feedback_changed(feedback);
    }

    /// Flip the scan-pass flag; no signal if it already has this value
    pub fn set_scan_pass_completed(&self, completed: bool) {
        let mut state = lock(&self.state);
        if state.scan_pass_completed == completed {
            return;
        }
        state.scan_pass_completed = completed;
        drop(state);
        self.signals.scan_pass_changed(completed);
    }

    pub fn complete_scan_pass(&self) {
        self.set_scan_pass_completed(true);
    }

    /// Record a shot and write a non-empty image into the images directory
    pub fn take_shot(&self) -> std::io::Result<()> {
        self.write_shot(b"simulated-heic")
    }

    /// Record a shot whose image file ends up empty
    pub fn take_empty_shot(&self) -> std::io::Result<()> {
        self.write_shot(b"")
    }

    fn write_shot(&self, contents: &[u8]) -> std::io::Result<()> {
        let mut state = lock(&self.state);
        state.shots += 1;
        if let Some(dir) = &state.images_directory {
            std::fs::write(dir.join(format!("IMG_{:04}.HEIC", state.shots)), contents)?;
        }
        Ok(())
    }

    /// Fail the session as the native framework would on an internal error
    pub fn fail(&self) {
        self.transition(CaptureState::Failed);
    }

    /// Report `state` without checking the transition or updating the
    /// handle, as a misbehaving native session might
    pub fn report_state(&self, state: CaptureState) {
        self.signals.state_changed(state);
    }
}

/// A simulated live capture session
pub struct SimulatedHandle {
    remote: HandleRemote,
    live_handles: Arc<AtomicUsize>,
}

impl Drop for SimulatedHandle {
    fn drop(&mut self) {
        self.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CaptureHandle for SimulatedHandle {
    fn start(&self, images_directory: &Path, _checkpoint_directory: &Path) {
        lock(&self.remote.state).images_directory = Some(images_directory.to_path_buf());
        self.remote.signals.state_changed(CaptureState::Initializing);
        self.remote.transition(CaptureState::Ready);
        self.remote.set_tracking(TrackingState::Normal);
    }

    fn resume(&self) {
        lock(&self.remote.state).paused = false;
    }

    fn pause(&self) {
        lock(&self.remote.state).paused = true;
    }

    fn start_detecting(&self) {
        self.remote.transition(CaptureState::Detecting);
    }

    fn reset_detection(&self) {
        self.remote.transition(CaptureState::Ready);
    }

    fn start_capturing(&self) {
        if self.remote.transition(CaptureState::Capturing) {
            self.remote.set_feedback(Vec::new());
        }
    }

    fn begin_new_scan_pass(&self) {
        self.remote.set_scan_pass_completed(false);
        self.resume();
    }

    fn begin_new_scan_pass_after_flip(&self) {
        self.begin_new_scan_pass();
    }

    fn finish(&self) {
        if self.remote.transition(CaptureState::Finishing) {
            self.remote.transition(CaptureState::Completed);
        }
    }

    fn cancel(&self) {
        lock(&self.remote.state).cancelled = true;
        self.remote.transition(CaptureState::Failed);
    }

    fn state(&self) -> CaptureState {
        self.remote.state()
    }

    fn tracking(&self) -> TrackingState {
        lock(&self.remote.state).tracking
    }

    fn feedback(&self) -> Vec<Feedback> {
        lock(&self.remote.state).feedback.clone()
    }

    fn number_of_shots_taken(&self) -> u32 {
        lock(&self.remote.state).shots
    }

    fn user_completed_scan_pass(&self) -> bool {
        lock(&self.remote.state).scan_pass_completed
    }
}

// ============================================================================
// Reconstruction
// ============================================================================

/// An engine whose jobs replay a fixed script of outputs
pub struct ScriptedEngine {
    script: Vec<JobOutput>,
    step_delay: Duration,
    hold_open: bool,
    creation_error: Option<EngineError>,
    jobs_created: AtomicUsize,
    cancellations: Arc<AtomicUsize>,
    last_configuration: Mutex<Option<JobConfiguration>>,
}

/// Stand-in request; replaced by the job's real request when replayed
fn placeholder_request() -> Request {
    Request::ModelFile {
        path: PathBuf::new(),
    }
}

impl ScriptedEngine {
    pub fn new(script: Vec<JobOutput>) -> Self {
        Self {
            script,
            step_delay: Duration::ZERO,
            hold_open: false,
            creation_error: None,
            jobs_created: AtomicUsize::new(0),
            cancellations: Arc::new(AtomicUsize::new(0)),
            last_configuration: Mutex::new(None),
        }
    }

    /// Half-way progress, then completion
    pub fn completing() -> Self {
        Self::new(vec![
            JobOutput::InputComplete,
            JobOutput::RequestProgress {
                request: placeholder_request(),
                fraction: 0.5,
            },
            JobOutput::RequestComplete {
                request: placeholder_request(),
            },
            JobOutput::ProcessingComplete,
        ])
    }

    /// Jobs that report input complete, then run until cancelled
    pub fn running_until_cancelled() -> Self {
        Self {
            hold_open: true,
            ..Self::new(vec![JobOutput::InputComplete])
        }
    }

    /// Every job creation fails with `error`
    pub fn failing(error: EngineError) -> Self {
        Self {
            creation_error: Some(error),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn jobs_created(&self) -> usize {
        self.jobs_created.load(Ordering::SeqCst)
    }

    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    pub fn last_configuration(&self) -> Option<JobConfiguration> {
        lock(&self.last_configuration).clone()
    }
}

impl ReconstructionEngine for ScriptedEngine {
    fn create_job(
        &self,
        configuration: &JobConfiguration,
    ) -> Result<Arc<dyn ReconstructionJob>, EngineError> {
        if let Some(err) = &self.creation_error {
            return Err(err.clone());
        }
        self.jobs_created.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_configuration) = Some(configuration.clone());

        Ok(Arc::new(ScriptedJob {
            script: self.script.clone(),
            step_delay: self.step_delay,
            hold_open: self.hold_open,
            started: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(Notify::new()),
            cancellations: self.cancellations.clone(),
        }))
    }
}

struct ScriptedJob {
    script: Vec<JobOutput>,
    step_delay: Duration,
    hold_open: bool,
    started: AtomicBool,
    cancelled: Arc<AtomicBool>,
    cancel: Arc<Notify>,
    cancellations: Arc<AtomicUsize>,
}

fn bind_request(output: JobOutput, request: &Request) -> JobOutput {
    let request = request.clone();
    match output {
        JobOutput::RequestError { error, .. } => JobOutput::RequestError { request, error },
        JobOutput::RequestComplete { .. } => JobOutput::RequestComplete { request },
        JobOutput::RequestProgress { fraction, .. } => {
            JobOutput::RequestProgress { request, fraction }
        }
        JobOutput::RequestProgressInfo { .. } => JobOutput::RequestProgressInfo { request },
        other => other,
    }
}

impl ReconstructionJob for ScriptedJob {
    fn process(
        &self,
        requests: Vec<Request>,
    ) -> Result<mpsc::UnboundedReceiver<JobOutput>, EngineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::new(
                EngineErrorKind::Other,
                "Job is already processing",
            ));
        }
        let request = requests.first().cloned().ok_or_else(|| {
            EngineError::new(EngineErrorKind::InvalidOutput, "No requests to process")
        })?;

        let script: Vec<JobOutput> = self
            .script
            .iter()
            .cloned()
            .map(|output| bind_request(output, &request))
            .collect();
        let step_delay = self.step_delay;
        let hold_open = self.hold_open;
        let cancelled = self.cancelled.clone();
        let cancel = self.cancel.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for output in script {
                if !step_delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(step_delay) => {}
                        _ = cancel.notified() => {}
                    }
                }
                if cancelled.load(Ordering::SeqCst) {
                    let _ = tx.send(JobOutput::ProcessingCancelled);
                    return;
                }
                if tx.send(output).is_err() {
                    return;
                }
            }
            if hold_open {
                cancel.notified().await;
                let _ = tx.send(JobOutput::ProcessingCancelled);
            }
        });

        Ok(rx)
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.cancellations.fetch_add(1, Ordering::SeqCst);
            self.cancel.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_walks_happy_path() {
        let platform = SimulatedPlatform::new();
        let (signals, mut rx) = SignalSender::channel();
        let handle = platform.create_handle(signals).unwrap();
        let dir = tempfile::TempDir::new().unwrap();

        handle.start(dir.path(), dir.path());
        handle.start_detecting();
        handle.start_capturing();
        handle.finish();
        assert_eq!(handle.state(), CaptureState::Completed);

        let mut states = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            if let crate::session::NativeSignal::StateChanged(state) = signal {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            [
                CaptureState::Initializing,
                CaptureState::Ready,
                CaptureState::Detecting,
                CaptureState::Capturing,
                CaptureState::Finishing,
                CaptureState::Completed,
            ]
        );
    }

    #[test]
    fn test_live_handle_count_tracks_drops() {
        let platform = SimulatedPlatform::new();
        let (signals, _rx) = SignalSender::channel();
        let handle = platform.create_handle(signals).unwrap();
        assert_eq!(platform.live_handles(), 1);
        drop(handle);
        assert_eq!(platform.live_handles(), 0);
        assert_eq!(platform.handles_created(), 1);
    }

    #[tokio::test]
    async fn test_remote_writes_shots() {
        let platform = SimulatedPlatform::new();
        let (signals, _rx) = SignalSender::channel();
        let handle = platform.create_handle(signals).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        handle.start(dir.path(), dir.path());

        let remote = platform.last_handle().unwrap();
        remote.take_shot().unwrap();
        remote.take_empty_shot().unwrap();
        assert_eq!(handle.number_of_shots_taken(), 2);
        assert_eq!(std::fs::metadata(dir.path().join("IMG_0002.HEIC")).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_running_job_stops_on_cancel() {
        let engine = ScriptedEngine::running_until_cancelled();
        let job = engine
            .create_job(&JobConfiguration {
                input_directory: PathBuf::from("Images"),
                checkpoint_directory: PathBuf::from("Snapshots"),
            })
            .unwrap();
        let mut outputs = job
            .process(vec![Request::ModelFile {
                path: PathBuf::from("model.usdz"),
            }])
            .unwrap();

        assert_eq!(outputs.recv().await, Some(JobOutput::InputComplete));
        job.cancel();
        assert_eq!(outputs.recv().await, Some(JobOutput::ProcessingCancelled));
        assert_eq!(outputs.recv().await, None);
        assert_eq!(engine.cancellations(), 1);
    }
}
