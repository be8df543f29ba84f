//! Session manager: single owner of the live capture handle
//!
//! Every mutating operation takes the slot mutex, so setup, teardown and
//! commands never interleave. Native signals are drained by one dispatch
//! task per live handle; the task only emits events and never touches the
//! slot.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handle::{CaptureHandle, CapturePlatform, NativeSignal, SignalSender};
use super::state::{CameraAuthorization, CaptureState, Feedback, TrackingState};
use crate::bridge::{
    BridgeEvent, EventHub, EventSink, SessionEvent, SessionSubscriber, SubscriberId,
};
use crate::config::{check_relative_path, resolve_path, CaptureConfig};
use crate::error::{PathError, SetupError};

struct LiveHandle {
    handle: Box<dyn CaptureHandle>,
    dispatch: JoinHandle<()>,
    // Where this handle writes, independent of later directory changes
    images: PathBuf,
}

#[derive(Default)]
struct HandleSlot {
    live: Option<LiveHandle>,
}

/// Relative directory layout for the next session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    pub checkpoint: String,
    pub images: String,
}

/// State shared with the dispatch task
struct Shared {
    hub: EventHub,
    scan_pass_updates: AtomicU64,
}

impl Shared {
    /// `last_state` is the last state this handle reported, if any
    fn dispatch(&self, signal: NativeSignal, last_state: &mut Option<CaptureState>) {
        match signal {
            NativeSignal::StateChanged(state) => {
                if let Some(previous) = *last_state {
                    if previous.is_terminal() {
                        warn!("Ignoring {} reported after terminal state {}", state, previous);
                        return;
                    }
                    if !previous.can_transition_to(&state) {
                        warn!("Unexpected capture state change {} -> {}", previous, state);
                    }
                }
                *last_state = Some(state);
                debug!("Capture state changed to {}", state);
                self.hub
                    .emit_session(SessionEvent::SessionStateChange { state });
                match state {
                    CaptureState::Completed => {
                        info!("Capture completed");
                        self.hub
                            .emit_session(SessionEvent::CaptureComplete { completed: true });
                    }
                    CaptureState::Failed => warn!("Capture session failed"),
                    _ => {}
                }
            }
            NativeSignal::TrackingChanged(tracking) => {
                self.hub
                    .emit_session(SessionEvent::TrackingStateChange { tracking });
            }
            NativeSignal::FeedbackChanged(feedback) => {
                self.hub
                    .emit_session(SessionEvent::FeedbackStateChange { feedback });
            }
            NativeSignal::ScanPassChanged(completed) => {
                let count = self.scan_pass_updates.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("Scan pass flag now {} (update #{})", completed, count);
                self.hub
                    .emit_session(SessionEvent::ScanPassCompleted { completed });
            }
        }
    }
}

async fn dispatch_signals(mut signals: mpsc::UnboundedReceiver<NativeSignal>, shared: Arc<Shared>) {
    let mut last_state = None;
    while let Some(signal) = signals.recv().await {
        shared.dispatch(signal, &mut last_state);
    }
    debug!("Native signal channel closed");
}

/// Owns at most one live capture handle and republishes its signals.
///
/// Construct one per application and share it through `Arc` with every view
/// module and bridge host.
pub struct SessionManager {
    platform: Arc<dyn CapturePlatform>,
    shared: Arc<Shared>,
    slot: tokio::sync::Mutex<HandleSlot>,
    layout: Mutex<DirectoryLayout>,
    working_root: PathBuf,
    settle_delay: Duration,
    required_tiers: Vec<String>,
    reset_directories: bool,
}

impl SessionManager {
    pub fn new(platform: Arc<dyn CapturePlatform>, config: &CaptureConfig) -> Self {
        Self {
            platform,
            shared: Arc::new(Shared {
                hub: EventHub::from_config(&config.events),
                scan_pass_updates: AtomicU64::new(0),
            }),
            slot: tokio::sync::Mutex::new(HandleSlot::default()),
            layout: Mutex::new(DirectoryLayout {
                checkpoint: config.directories.checkpoint_directory.clone(),
                images: config.directories.images_directory.clone(),
            }),
            working_root: config.directories.working_root.clone(),
            settle_delay: Duration::from_millis(config.timing.finish_settle_delay_ms),
            required_tiers: config.device.required_hardware_tiers.clone(),
            reset_directories: config.directories.reset_directories_on_setup,
        }
    }

    pub fn working_root(&self) -> &Path {
        &self.working_root
    }

    fn layout(&self) -> MutexGuard<'_, DirectoryLayout> {
        self.layout.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn directory_layout(&self) -> DirectoryLayout {
        self.layout().clone()
    }

    /// Takes effect on the next `setup_session`.
    ///
    /// Rejected, leaving the layout unchanged, unless `relative` names a
    /// directory inside the working root.
    pub fn set_checkpoint_directory(&self, relative: impl Into<String>) -> Result<(), PathError> {
        let relative = relative.into();
        check_relative_path(&relative)?;
        self.layout().checkpoint = relative;
        Ok(())
    }

    /// Takes effect on the next `setup_session`; validated like
    /// [`SessionManager::set_checkpoint_directory`]
    pub fn set_images_directory(&self, relative: impl Into<String>) -> Result<(), PathError> {
        let relative = relative.into();
        check_relative_path(&relative)?;
        self.layout().images = relative;
        Ok(())
    }

    pub fn checkpoint_path(&self) -> Result<PathBuf, PathError> {
        resolve_path(&self.working_root, &self.layout().checkpoint)
    }

    pub fn images_path(&self) -> Result<PathBuf, PathError> {
        resolve_path(&self.working_root, &self.layout().images)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Attach the global sink, flushing events buffered while none was set
    pub fn set_event_emitter(&self, sink: Arc<dyn EventSink>) {
        let flushed = self.shared.hub.attach_sink(sink);
        debug!("Event emitter attached, {} buffered events flushed", flushed);
    }

    pub fn detach_event_emitter(&self) {
        self.shared.hub.detach_sink();
    }

    pub fn has_event_emitter(&self) -> bool {
        self.shared.hub.has_sink()
    }

    /// Deliver to the sink, or buffer until one is attached
    pub fn send_event(&self, event: impl Into<BridgeEvent>) {
        self.shared.hub.emit(event.into());
    }

    pub fn register_view(&self, view: &Arc<dyn SessionSubscriber>) -> SubscriberId {
        let id = self.shared.hub.subscribe(view);
        debug!("Registered view {}", id.as_u64());
        id
    }

    pub fn unregister_view(&self, id: SubscriberId) -> bool {
        self.shared.hub.unsubscribe(id)
    }

    pub fn registered_views(&self) -> usize {
        self.shared.hub.subscriber_count()
    }

    /// Events waiting for a sink
    pub fn buffered_event_count(&self) -> usize {
        self.shared.hub.buffered_len()
    }

    fn report(&self, err: &SetupError) {
        error!("Session setup failed: {}", err);
        self.shared.hub.emit_session(SessionEvent::Error {
            error: err.to_string(),
        });
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Tear down any live session, verify the device and start a new one.
    ///
    /// Every failure is also emitted as `onError` with the same message.
    pub async fn setup_session(&self) -> Result<(), SetupError> {
        let mut slot = self.slot.lock().await;
        Self::teardown(&mut slot, "setup");

        let result = self.start_new(&mut slot).await;
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    async fn start_new(&self, slot: &mut HandleSlot) -> Result<(), SetupError> {
        self.check_device()?;
        self.check_camera_permission().await?;

        let checkpoint = self
            .checkpoint_path()
            .map_err(|e| SetupError::InvalidDirectory("checkpoint", e))?;
        let images = self
            .images_path()
            .map_err(|e| SetupError::InvalidDirectory("images", e))?;
        self.prepare_directory(&checkpoint, "checkpoint")?;
        self.prepare_directory(&images, "images")?;

        let (signals, receiver) = SignalSender::channel();
        let handle = self
            .platform
            .create_handle(signals)
            .map_err(SetupError::HandleCreation)?;
        let dispatch = tokio::spawn(dispatch_signals(receiver, self.shared.clone()));

        handle.start(&images, &checkpoint);
        info!("Capture session started (images: {:?})", images);
        slot.live = Some(LiveHandle {
            handle,
            dispatch,
            images,
        });
        Ok(())
    }

    fn check_device(&self) -> Result<(), SetupError> {
        if !self.platform.is_supported() {
            return Err(SetupError::DeviceUnsupported);
        }

        let device = self
            .platform
            .graphics_device()
            .ok_or(SetupError::GraphicsDeviceUnavailable)?;
        debug!("Using graphics device {}", device);

        if !self.platform.has_command_queue() {
            return Err(SetupError::CommandQueueUnavailable);
        }

        for tier in &self.required_tiers {
            if !self.platform.supports_hardware_tier(tier) {
                return Err(SetupError::HardwareTierUnsupported(tier.clone()));
            }
        }

        Ok(())
    }

    async fn check_camera_permission(&self) -> Result<(), SetupError> {
        match self.platform.camera_authorization() {
            CameraAuthorization::Authorized => Ok(()),
            CameraAuthorization::NotDetermined => {
                info!("Requesting camera access");
                // A dropped prompt counts as a refusal
                let granted = self
                    .platform
                    .request_camera_access()
                    .await
                    .unwrap_or(false);
                if granted {
                    Ok(())
                } else {
                    Err(SetupError::CameraPermissionDenied)
                }
            }
            CameraAuthorization::Denied | CameraAuthorization::Restricted => {
                Err(SetupError::CameraPermissionDenied)
            }
        }
    }

    fn prepare_directory(&self, path: &Path, label: &'static str) -> Result<(), SetupError> {
        if path.exists() {
            if !self.reset_directories {
                return Ok(());
            }
            std::fs::remove_dir_all(path).map_err(|e| {
                warn!("Failed to clear {} directory {:?}: {}", label, path, e);
                SetupError::DirectoryClear(label)
            })?;
        }

        std::fs::create_dir_all(path).map_err(|e| {
            warn!("Failed to create {} directory {:?}: {}", label, path, e);
            SetupError::DirectoryCreate(label)
        })
    }

    fn teardown(slot: &mut HandleSlot, reason: &str) -> bool {
        let Some(live) = slot.live.take() else {
            return false;
        };
        // Stop dispatch first so nothing from the cancelled handle escapes
        live.dispatch.abort();
        live.handle.cancel();
        info!("Capture session torn down ({})", reason);
        true
    }

    /// Cancel and drop the live handle, if any. Always returns true.
    pub async fn cleanup_session(&self) -> bool {
        let mut slot = self.slot.lock().await;
        Self::teardown(&mut slot, "cleanup");
        true
    }

    /// Whether a capture handle is currently live
    pub async fn has_live_session(&self) -> bool {
        self.slot.lock().await.live.is_some()
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn with_handle(&self, command: &str, f: impl FnOnce(&dyn CaptureHandle)) {
        let slot = self.slot.lock().await;
        match slot.live.as_ref() {
            Some(live) => {
                debug!("{}", command);
                f(live.handle.as_ref());
            }
            None => debug!("{} ignored, no live session", command),
        }
    }

    pub async fn resume_session(&self) {
        self.with_handle("resume", |h| h.resume()).await
    }

    pub async fn pause_session(&self) {
        self.with_handle("pause", |h| h.pause()).await
    }

    pub async fn start_detection(&self) {
        self.with_handle("start detecting", |h| h.start_detecting())
            .await
    }

    pub async fn reset_detection(&self) {
        self.with_handle("reset detection", |h| h.reset_detection())
            .await
    }

    pub async fn start_capturing(&self) {
        self.with_handle("start capturing", |h| h.start_capturing())
            .await
    }

    pub async fn begin_new_scan(&self) {
        self.with_handle("begin new scan pass", |h| h.begin_new_scan_pass())
            .await
    }

    pub async fn begin_new_scan_after_flip(&self) {
        self.with_handle("begin new scan pass after flip", |h| {
            h.begin_new_scan_pass_after_flip()
        })
        .await
    }

    /// Finish capturing, then verify the captured images once the handle
    /// has had time to flush them.
    ///
    /// Empty image files are reported through `onError`; the caller never
    /// sees a failure.
    pub async fn finish_session(&self) {
        let images = {
            let slot = self.slot.lock().await;
            let Some(live) = slot.live.as_ref() else {
                debug!("finish ignored, no live session");
                return;
            };
            live.handle.finish();
            live.images.clone()
        };

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        self.verify_images(&images);
    }

    fn verify_images(&self, images: &Path) {
        let entries = match std::fs::read_dir(images) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot verify images in {:?}: {}", images, e);
                self.shared.hub.emit_session(SessionEvent::Error {
                    error: format!("Failed to read images directory: {e}"),
                });
                return;
            }
        };

        let mut empty = 0usize;
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.is_file() && metadata.len() == 0 {
                empty += 1;
                self.shared.hub.emit_session(SessionEvent::Error {
                    error: format!(
                        "Image file {} is empty",
                        entry.file_name().to_string_lossy()
                    ),
                });
            }
        }

        if empty > 0 {
            warn!("{} empty image files after finish", empty);
        } else {
            debug!("All captured images verified");
        }
    }

    /// Cancel the live handle and drop it
    pub async fn cancel_session(&self) {
        let mut slot = self.slot.lock().await;
        if !Self::teardown(&mut slot, "cancel") {
            debug!("cancel ignored, no live session");
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    async fn query<T>(&self, absent: T, f: impl FnOnce(&dyn CaptureHandle) -> T) -> T {
        let slot = self.slot.lock().await;
        match slot.live.as_ref() {
            Some(live) => f(live.handle.as_ref()),
            None => absent,
        }
    }

    pub async fn get_session_state(&self) -> CaptureState {
        self.query(CaptureState::Unknown, |h| h.state()).await
    }

    pub async fn get_tracking_state(&self) -> TrackingState {
        self.query(TrackingState::Unknown, |h| h.tracking()).await
    }

    pub async fn get_feedback_state(&self) -> Vec<Feedback> {
        self.query(vec![Feedback::Unknown], |h| h.feedback()).await
    }

    pub async fn get_number_of_shots_taken(&self) -> u32 {
        self.query(0, |h| h.number_of_shots_taken()).await
    }

    pub async fn get_user_completed_scan_state(&self) -> bool {
        self.query(false, |h| h.user_completed_scan_pass()).await
    }

    /// Scan-pass flag changes observed since this manager was created
    pub async fn get_number_of_scan_pass_updates(&self) -> u64 {
        self.shared.scan_pass_updates.load(Ordering::SeqCst)
    }

    pub async fn is_device_supported(&self) -> bool {
        self.platform.is_supported()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("working_root", &self.working_root)
            .field("layout", &*self.layout())
            .field("hub", &self.shared.hub)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedPlatform;

    fn manager(root: &Path, platform: SimulatedPlatform) -> SessionManager {
        let mut config = CaptureConfig::with_working_root(root);
        config.timing.finish_settle_delay_ms = 0;
        SessionManager::new(Arc::new(platform), &config)
    }

    #[tokio::test]
    async fn test_sentinels_without_handle() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = manager(dir.path(), SimulatedPlatform::new());
        assert_eq!(manager.get_session_state().await, CaptureState::Unknown);
        assert_eq!(manager.get_tracking_state().await, TrackingState::Unknown);
        assert_eq!(manager.get_feedback_state().await, vec![Feedback::Unknown]);
        assert_eq!(manager.get_number_of_shots_taken().await, 0);
        assert!(!manager.get_user_completed_scan_state().await);
        assert_eq!(manager.get_number_of_scan_pass_updates().await, 0);
    }

    #[tokio::test]
    async fn test_commands_without_handle_are_noops() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = manager(dir.path(), SimulatedPlatform::new());
        manager.resume_session().await;
        manager.start_capturing().await;
        manager.finish_session().await;
        manager.cancel_session().await;
        assert!(manager.cleanup_session().await);
        assert_eq!(manager.buffered_event_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_tier_reports_tier() {
        let dir = tempfile::TempDir::new().unwrap();
        let platform = SimulatedPlatform::new().without_tier("apple5");
        let manager = manager(dir.path(), platform);
        let err = manager.setup_session().await.unwrap_err();
        assert_eq!(err, SetupError::HardwareTierUnsupported("apple5".into()));
        assert!(!manager.has_live_session().await);
        assert_eq!(manager.buffered_event_count(), 1);
    }

    #[tokio::test]
    async fn test_setup_creates_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = manager(dir.path(), SimulatedPlatform::new());
        manager.set_images_directory("Shots/").unwrap();
        manager.setup_session().await.unwrap();
        assert!(dir.path().join("Snapshots").is_dir());
        assert!(dir.path().join("Shots").is_dir());
        assert!(manager.has_live_session().await);
    }

    #[test]
    fn test_directory_setters_reject_escaping_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = manager(dir.path(), SimulatedPlatform::new());

        assert_eq!(manager.set_images_directory(""), Err(PathError::Empty));
        assert!(matches!(
            manager.set_checkpoint_directory("../Outside/"),
            Err(PathError::Escapes(_))
        ));
        assert!(matches!(
            manager.set_images_directory("/tmp/elsewhere/"),
            Err(PathError::Absolute(_))
        ));
        assert_eq!(
            manager.directory_layout(),
            DirectoryLayout {
                checkpoint: "Snapshots/".into(),
                images: "Images/".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_setup_rejects_configured_escaping_directory() {
        let root = tempfile::TempDir::new().unwrap();
        let outside = root.path().join("Outside");
        std::fs::create_dir(&outside).unwrap();
        std::fs::write(outside.join("keep.txt"), b"keep").unwrap();

        let working_root = root.path().join("Working");
        let mut config = CaptureConfig::with_working_root(&working_root);
        config.directories.checkpoint_directory = "../Outside/".into();
        let manager = SessionManager::new(Arc::new(SimulatedPlatform::new()), &config);

        let err = manager.setup_session().await.unwrap_err();

        assert!(matches!(
            err,
            SetupError::InvalidDirectory("checkpoint", PathError::Escapes(_))
        ));
        assert!(outside.join("keep.txt").exists());
        assert!(!manager.has_live_session().await);
    }
}
