use std::sync::Arc;

use serde_json::{json, Value};

use super::{resolve_ref, NodeHandle, ViewKind, ViewModule};
use crate::bridge::names;
use crate::error::BridgeError;
use crate::session::{CaptureState, SessionManager};

/// Events a point-cloud view publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointCloudEvent {
    /// The view appeared and queried the scan-pass flag
    Appear { scan_pass_completed: bool },
    /// The native point-cloud content appeared
    CloudPointViewAppear { scan_pass_completed: bool },
}

impl PointCloudEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PointCloudEvent::Appear { .. } => names::ON_APPEAR,
            PointCloudEvent::CloudPointViewAppear { .. } => names::ON_CLOUD_POINT_VIEW_APPEAR,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            PointCloudEvent::Appear {
                scan_pass_completed,
            }
            | PointCloudEvent::CloudPointViewAppear {
                scan_pass_completed,
            } => json!({ "scanPassCompleted": scan_pass_completed }),
        }
    }
}

pub trait PointCloudListener: Send + Sync {
    fn on_point_cloud_event(&self, target: NodeHandle, event: &PointCloudEvent);
}

/// Optional placeholder content shown instead of the point cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders<P> {
    pub loading: Option<P>,
    pub empty: Option<P>,
}

impl<P> Default for Placeholders<P> {
    fn default() -> Self {
        Self {
            loading: None,
            empty: None,
        }
    }
}

/// What a point-cloud view currently shows
#[derive(Debug, PartialEq, Eq)]
pub enum PointCloudContent<'a, P> {
    Loading(&'a P),
    Empty(&'a P),
    PointCloud,
}

/// Ref and local state of a point-cloud view.
///
/// Starts out loading. The first [`PointCloudView::appear`] queries the
/// scan-pass flag, clears the loading flag and publishes `onAppear`.
pub struct PointCloudView<P = ()> {
    module: Option<Arc<ViewModule>>,
    element: Option<NodeHandle>,
    listener: Option<Arc<dyn PointCloudListener>>,
    placeholders: Placeholders<P>,
    loading: bool,
    scan_pass_completed: bool,
}

impl<P> Default for PointCloudView<P> {
    fn default() -> Self {
        Self {
            module: None,
            element: None,
            listener: None,
            placeholders: Placeholders::default(),
            loading: true,
            scan_pass_completed: false,
        }
    }
}

impl<P> PointCloudView<P> {
    pub fn mount(
        module: &Arc<ViewModule>,
        placeholders: Placeholders<P>,
        listener: Option<Arc<dyn PointCloudListener>>,
    ) -> Self {
        let element = module.mount(ViewKind::PointCloud, None);
        Self {
            module: Some(module.clone()),
            element: Some(element),
            listener,
            placeholders,
            loading: true,
            scan_pass_completed: false,
        }
    }

    pub fn node(&self) -> Option<NodeHandle> {
        self.element
    }

    pub async fn unmount(&mut self) -> bool {
        let (Some(module), Some(element)) = (&self.module, self.element) else {
            return false;
        };
        module.unmount(element).await
    }

    fn manager(&self) -> Result<Arc<SessionManager>, BridgeError> {
        resolve_ref(self.module.as_ref(), self.element, ViewKind::PointCloud)
    }

    fn publish(&self, event: PointCloudEvent) {
        if let (Some(listener), Some(target)) = (&self.listener, self.element) {
            listener.on_point_cloud_event(target, &event);
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn scan_pass_completed(&self) -> bool {
        self.scan_pass_completed
    }

    /// Handle the view's appear event.
    ///
    /// On failure the view stays in its loading state.
    pub async fn appear(&mut self) -> Result<bool, BridgeError> {
        let completed = self.get_user_completed_scan_pass().await?;
        self.scan_pass_completed = completed;
        self.publish(PointCloudEvent::Appear {
            scan_pass_completed: completed,
        });
        self.loading = false;
        Ok(completed)
    }

    /// Forward the native content's appear event to the listener
    pub fn cloud_point_view_appeared(&self, scan_pass_completed: bool) {
        self.publish(PointCloudEvent::CloudPointViewAppear {
            scan_pass_completed,
        });
    }

    pub fn visible_content(&self) -> PointCloudContent<'_, P> {
        if self.loading {
            if let Some(loading) = &self.placeholders.loading {
                return PointCloudContent::Loading(loading);
            }
        }
        if !self.scan_pass_completed {
            if let Some(empty) = &self.placeholders.empty {
                return PointCloudContent::Empty(empty);
            }
        }
        PointCloudContent::PointCloud
    }

    pub async fn get_session_state(&self) -> Result<CaptureState, BridgeError> {
        Ok(self.manager()?.get_session_state().await)
    }

    pub async fn get_user_completed_scan_pass(&self) -> Result<bool, BridgeError> {
        Ok(self.manager()?.get_user_completed_scan_state().await)
    }
}

impl<P> Drop for PointCloudView<P> {
    fn drop(&mut self) {
        if let (Some(module), Some(element)) = (&self.module, self.element) {
            module.release(element);
        }
    }
}

impl<P> std::fmt::Debug for PointCloudView<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointCloudView")
            .field("element", &self.element)
            .field("loading", &self.loading)
            .field("scan_pass_completed", &self.scan_pass_completed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbound(placeholders: Placeholders<&'static str>) -> PointCloudView<&'static str> {
        let mut view = PointCloudView::default();
        view.placeholders = placeholders;
        view
    }

    #[test]
    fn test_content_selection() {
        let mut view = unbound(Placeholders {
            loading: Some("spinner"),
            empty: Some("nothing yet"),
        });
        assert_eq!(view.visible_content(), PointCloudContent::Loading(&"spinner"));

        view.loading = false;
        assert_eq!(view.visible_content(), PointCloudContent::Empty(&"nothing yet"));

        view.scan_pass_completed = true;
        assert_eq!(view.visible_content(), PointCloudContent::PointCloud);
    }

    #[test]
    fn test_missing_placeholder_falls_through() {
        let view = unbound(Placeholders {
            loading: None,
            empty: Some("empty"),
        });
        assert_eq!(view.visible_content(), PointCloudContent::Empty(&"empty"));
    }

    #[tokio::test]
    async fn test_unbound_ref_fails_with_module_error() {
        let mut view: PointCloudView = PointCloudView::default();
        assert_eq!(view.appear().await, Err(BridgeError::ModuleNotFound));
        assert!(view.is_loading());
    }

    #[test]
    fn test_event_wire_form() {
        let event = PointCloudEvent::Appear {
            scan_pass_completed: true,
        };
        assert_eq!(event.name(), "onAppear");
        assert_eq!(event.body(), json!({ "scanPassCompleted": true }));
    }
}
