use std::sync::{Arc, OnceLock};

use super::{resolve_ref, NodeHandle, ViewKind, ViewModule};
use crate::bridge::{SessionEvent, SessionSubscriber};
use crate::error::BridgeError;
use crate::session::{CaptureState, Feedback, SessionManager, TrackingState};

/// Props a capture view is mounted with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureViewProps {
    /// Checkpoint directory relative to the working root
    pub checkpoint_directory: Option<String>,
    /// Images directory relative to the working root
    pub images_directory: Option<String>,
}

/// A session event addressed to one mounted capture view
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureViewEvent {
    pub target: NodeHandle,
    pub event: SessionEvent,
}

/// Application callbacks for a capture view
pub trait CaptureViewListener: Send + Sync {
    fn on_view_event(&self, event: &CaptureViewEvent);
}

struct CaptureViewNode {
    // Filled in once the module has assigned the node handle
    target: OnceLock<NodeHandle>,
    listener: Arc<dyn CaptureViewListener>,
}

impl SessionSubscriber for CaptureViewNode {
    fn on_session_event(&self, event: &SessionEvent) {
        let Some(target) = self.target.get() else {
            return;
        };
        self.listener.on_view_event(&CaptureViewEvent {
            target: *target,
            event: event.clone(),
        });
    }
}

/// Ref to a capture view.
///
/// A default ref is bound to nothing and fails every call with
/// [`BridgeError::ModuleNotFound`]. After [`CaptureView::unmount`] the ref
/// still names its old node and fails with [`BridgeError::NodeNotFound`].
#[derive(Default)]
pub struct CaptureView {
    module: Option<Arc<ViewModule>>,
    element: Option<NodeHandle>,
    // The registry only holds a weak reference
    subscriber: Option<Arc<CaptureViewNode>>,
}

impl std::fmt::Debug for CaptureView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureView")
            .field("bound", &self.module.is_some())
            .field("element", &self.element)
            .finish()
    }
}

impl CaptureView {
    /// Mount a capture view, subscribe it to session events and apply its
    /// directory props.
    ///
    /// A directory prop outside the working root is logged and ignored; the
    /// session keeps its previous directory.
    pub fn mount(
        module: &Arc<ViewModule>,
        props: CaptureViewProps,
        listener: Arc<dyn CaptureViewListener>,
    ) -> Self {
        let manager = module.manager();
        if let Some(dir) = props.checkpoint_directory {
            if let Err(e) = manager.set_checkpoint_directory(dir) {
                tracing::warn!("Ignoring checkpointDirectory prop: {}", e);
            }
        }
        if let Some(dir) = props.images_directory {
            if let Err(e) = manager.set_images_directory(dir) {
                tracing::warn!("Ignoring imagesDirectory prop: {}", e);
            }
        }

        let node = Arc::new(CaptureViewNode {
            target: OnceLock::new(),
            listener,
        });
        let subscriber: Arc<dyn SessionSubscriber> = node.clone();
        let element = module.mount(ViewKind::Capture, Some(subscriber));
        let _ = node.target.set(element);

        Self {
            module: Some(module.clone()),
            element: Some(element),
            subscriber: Some(node),
        }
    }

    pub fn node(&self) -> Option<NodeHandle> {
        self.element
    }

    /// Unmount the view; the last capture view to go tears the session down
    pub async fn unmount(&mut self) -> bool {
        let (Some(module), Some(element)) = (&self.module, self.element) else {
            return false;
        };
        let unmounted = module.unmount(element).await;
        self.subscriber = None;
        unmounted
    }

    fn manager(&self) -> Result<Arc<SessionManager>, BridgeError> {
        resolve_ref(self.module.as_ref(), self.element, ViewKind::Capture)
    }

    pub fn set_checkpoint_directory(&self, relative: impl Into<String>) -> Result<(), BridgeError> {
        self.manager()?
            .set_checkpoint_directory(relative)
            .map_err(|_| BridgeError::InvalidPath)
    }

    pub fn set_images_directory(&self, relative: impl Into<String>) -> Result<(), BridgeError> {
        self.manager()?
            .set_images_directory(relative)
            .map_err(|_| BridgeError::InvalidPath)
    }

    pub async fn resume_session(&self) -> Result<(), BridgeError> {
        self.manager()?.resume_session().await;
        Ok(())
    }

    pub async fn pause_session(&self) -> Result<(), BridgeError> {
        self.manager()?.pause_session().await;
        Ok(())
    }

    pub async fn start_detection(&self) -> Result<(), BridgeError> {
        self.manager()?.start_detection().await;
        Ok(())
    }

    pub async fn reset_detection(&self) -> Result<(), BridgeError> {
        self.manager()?.reset_detection().await;
        Ok(())
    }

    pub async fn start_capturing(&self) -> Result<(), BridgeError> {
        self.manager()?.start_capturing().await;
        Ok(())
    }

    pub async fn begin_new_scan(&self) -> Result<(), BridgeError> {
        self.manager()?.begin_new_scan().await;
        Ok(())
    }

    pub async fn begin_new_scan_after_flip(&self) -> Result<(), BridgeError> {
        self.manager()?.begin_new_scan_after_flip().await;
        Ok(())
    }

    pub async fn finish_session(&self) -> Result<(), BridgeError> {
        self.manager()?.finish_session().await;
        Ok(())
    }

    pub async fn cancel_session(&self) -> Result<(), BridgeError> {
        self.manager()?.cancel_session().await;
        Ok(())
    }

    pub async fn get_session_state(&self) -> Result<CaptureState, BridgeError> {
        Ok(self.manager()?.get_session_state().await)
    }

    pub async fn get_tracking_state(&self) -> Result<TrackingState, BridgeError> {
        Ok(self.manager()?.get_tracking_state().await)
    }

    pub async fn get_feedback_state(&self) -> Result<Vec<Feedback>, BridgeError> {
        Ok(self.manager()?.get_feedback_state().await)
    }

    pub async fn get_number_of_shots_taken(&self) -> Result<u32, BridgeError> {
        Ok(self.manager()?.get_number_of_shots_taken().await)
    }

    pub async fn get_number_of_scan_pass_updates(&self) -> Result<u64, BridgeError> {
        Ok(self.manager()?.get_number_of_scan_pass_updates().await)
    }

    pub async fn get_user_completed_scan_state(&self) -> Result<bool, BridgeError> {
        Ok(self.manager()?.get_user_completed_scan_state().await)
    }

    pub async fn is_device_supported(&self) -> Result<bool, BridgeError> {
        Ok(self.manager()?.is_device_supported().await)
    }
}

impl Drop for CaptureView {
    fn drop(&mut self) {
        if let (Some(module), Some(element)) = (&self.module, self.element) {
            module.release(element);
        }
    }
}
