//! View adapters
//!
//! A [`ViewModule`] stands in for the native view module: it tracks which
//! view nodes are mounted and routes their imperative calls to the shared
//! [`SessionManager`]. [`CaptureView`] and [`PointCloudView`] are the refs UI
//! code holds; every call resolves the ref's node first and fails with a
//! [`BridgeError`] when it cannot.

mod capture;
mod point_cloud;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bridge::{SessionSubscriber, SubscriberId};
use crate::error::BridgeError;
use crate::session::SessionManager;

pub use capture::{CaptureView, CaptureViewEvent, CaptureViewListener, CaptureViewProps};
pub use point_cloud::{
    Placeholders, PointCloudContent, PointCloudEvent, PointCloudListener, PointCloudView,
};

/// Identifies a mounted view node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(u64);

impl NodeHandle {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Capture,
    PointCloud,
}

struct MountedNode {
    kind: ViewKind,
    subscription: Option<SubscriberId>,
}

/// Registry of mounted view nodes bound to one session manager
pub struct ViewModule {
    manager: Arc<SessionManager>,
    nodes: Mutex<BTreeMap<NodeHandle, MountedNode>>,
    next_node: AtomicU64,
}

impl ViewModule {
    pub fn new(manager: Arc<SessionManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            nodes: Mutex::new(BTreeMap::new()),
            next_node: AtomicU64::new(1),
        })
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    fn nodes(&self) -> MutexGuard<'_, BTreeMap<NodeHandle, MountedNode>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mount(
        &self,
        kind: ViewKind,
        subscriber: Option<Arc<dyn SessionSubscriber>>,
    ) -> NodeHandle {
        let node = NodeHandle(self.next_node.fetch_add(1, Ordering::SeqCst));
        let subscription = subscriber.map(|s| self.manager.register_view(&s));
        self.nodes().insert(node, MountedNode { kind, subscription });
        tracing::debug!("Mounted {:?} view {}", kind, node);
        node
    }

    /// Remove a node and its subscription.
    ///
    /// Returns `None` if the node was not mounted, otherwise whether it was
    /// the last capture view.
    fn remove(&self, node: NodeHandle) -> Option<bool> {
        let (removed, capture_views_left) = {
            let mut nodes = self.nodes();
            let removed = nodes.remove(&node);
            let left = nodes.values().filter(|n| n.kind == ViewKind::Capture).count();
            (removed, left)
        };

        let removed = removed?;
        if let Some(id) = removed.subscription {
            self.manager.unregister_view(id);
        }
        tracing::debug!("Unmounted {:?} view {}", removed.kind, node);
        Some(removed.kind == ViewKind::Capture && capture_views_left == 0)
    }

    /// Unmount a node. Unmounting the last capture view tears the session
    /// down.
    ///
    /// Returns false if the node was not mounted.
    pub async fn unmount(&self, node: NodeHandle) -> bool {
        let Some(last_capture) = self.remove(node) else {
            return false;
        };
        if last_capture {
            self.manager.cleanup_session().await;
        }
        true
    }

    /// Unmount a node whose ref is going away without an explicit unmount.
    ///
    /// Session teardown for the last capture view is spawned on the current
    /// runtime.
    pub(crate) fn release(&self, node: NodeHandle) {
        if self.remove(node) != Some(true) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let manager = self.manager.clone();
                runtime.spawn(async move {
                    manager.cleanup_session().await;
                });
            }
            Err(_) => tracing::warn!(
                "Capture view {} dropped outside a runtime, session left running",
                node
            ),
        }
    }

    pub fn is_mounted(&self, node: NodeHandle) -> bool {
        self.nodes().contains_key(&node)
    }

    pub fn mounted_count(&self, kind: ViewKind) -> usize {
        self.nodes().values().filter(|n| n.kind == kind).count()
    }

    /// Look up a live node of the given kind
    pub fn resolve(&self, node: NodeHandle, kind: ViewKind) -> Result<&Arc<SessionManager>, BridgeError> {
        match self.nodes().get(&node) {
            Some(mounted) if mounted.kind == kind => Ok(&self.manager),
            _ => Err(BridgeError::NodeNotFound),
        }
    }
}

impl std::fmt::Debug for ViewModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewModule")
            .field("nodes", &self.nodes().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Two-stage lookup shared by every view ref: first the module and element
/// must exist, then the element must still name a live node.
pub(crate) fn resolve_ref(
    module: Option<&Arc<ViewModule>>,
    element: Option<NodeHandle>,
    kind: ViewKind,
) -> Result<Arc<SessionManager>, BridgeError> {
    let (Some(module), Some(node)) = (module, element) else {
        return Err(BridgeError::ModuleNotFound);
    };
    module.resolve(node, kind).cloned()
}
