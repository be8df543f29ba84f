//! View ref integration tests

mod common;

use std::sync::{Arc, Mutex};

use common::{manager_with, wait_for, RecordingSink};
use objcap_core::bridge::{names, SessionEvent};
use objcap_core::error::BridgeError;
use objcap_core::session::{CaptureState, Feedback, TrackingState};
use objcap_core::simulated::SimulatedPlatform;
use objcap_core::view::{
    CaptureView, CaptureViewEvent, CaptureViewListener, CaptureViewProps, NodeHandle,
    Placeholders, PointCloudContent, PointCloudEvent, PointCloudListener, PointCloudView,
    ViewKind, ViewModule,
};
use tempfile::TempDir;

#[derive(Default)]
struct ViewEvents {
    events: Mutex<Vec<CaptureViewEvent>>,
}

impl ViewEvents {
    fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    fn targets(&self) -> Vec<NodeHandle> {
        self.events.lock().unwrap().iter().map(|e| e.target).collect()
    }
}

impl CaptureViewListener for ViewEvents {
    fn on_view_event(&self, event: &CaptureViewEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[derive(Default)]
struct CloudEvents {
    events: Mutex<Vec<(NodeHandle, PointCloudEvent)>>,
}

impl PointCloudListener for CloudEvents {
    fn on_point_cloud_event(&self, node: NodeHandle, event: &PointCloudEvent) {
        self.events.lock().unwrap().push((node, event.clone()));
    }
}

fn module_with(platform: SimulatedPlatform, root: &std::path::Path) -> (Arc<SimulatedPlatform>, Arc<ViewModule>) {
    let (platform, manager) = manager_with(platform, root);
    (platform, ViewModule::new(manager))
}

// === Resolution failures ===

#[tokio::test]
async fn test_unbound_ref_fails_with_module_not_found() {
    let view = CaptureView::default();

    assert_eq!(view.pause_session().await, Err(BridgeError::ModuleNotFound));
    assert_eq!(
        view.get_session_state().await,
        Err(BridgeError::ModuleNotFound)
    );
    assert_eq!(
        view.set_images_directory("Images/"),
        Err(BridgeError::ModuleNotFound)
    );

    let cloud: PointCloudView = PointCloudView::default();
    assert_eq!(
        cloud.get_user_completed_scan_pass().await,
        Err(BridgeError::ModuleNotFound)
    );
}

#[tokio::test]
async fn test_unmounted_ref_fails_with_node_not_found() {
    let dir = TempDir::new().unwrap();
    let (_, module) = module_with(SimulatedPlatform::new(), dir.path());
    let mut view = CaptureView::mount(
        &module,
        CaptureViewProps::default(),
        Arc::new(ViewEvents::default()),
    );

    assert!(view.unmount().await);
    assert!(!view.unmount().await);

    assert_eq!(view.resume_session().await, Err(BridgeError::NodeNotFound));
    assert_eq!(
        view.get_feedback_state().await,
        Err(BridgeError::NodeNotFound)
    );
    assert_eq!(
        view.is_device_supported().await,
        Err(BridgeError::NodeNotFound)
    );
}

#[tokio::test]
async fn test_error_messages_reach_callers() {
    let view = CaptureView::default();
    let err = view.finish_session().await.unwrap_err();
    assert_eq!(err.to_string(), "View or native module not found");
}

// === Capture view ===

#[tokio::test]
async fn test_mount_applies_directory_props() {
    let dir = TempDir::new().unwrap();
    let (_, module) = module_with(SimulatedPlatform::new(), dir.path());
    let view = CaptureView::mount(
        &module,
        CaptureViewProps {
            checkpoint_directory: Some("Run1/Snapshots/".into()),
            images_directory: Some("Run1/Images/".into()),
        },
        Arc::new(ViewEvents::default()),
    );

    module.manager().setup_session().await.unwrap();
    assert_eq!(view.get_session_state().await, Ok(CaptureState::Ready));
    assert!(dir.path().join("Run1/Snapshots").is_dir());
    assert!(dir.path().join("Run1/Images").is_dir());
}

#[tokio::test]
async fn test_unsupported_device_visible_through_ref() {
    let dir = TempDir::new().unwrap();
    let (_, module) = module_with(SimulatedPlatform::new().unsupported(), dir.path());
    let view = CaptureView::mount(
        &module,
        CaptureViewProps::default(),
        Arc::new(ViewEvents::default()),
    );

    assert!(module.manager().setup_session().await.is_err());
    assert_eq!(view.is_device_supported().await, Ok(false));
    assert_eq!(view.get_session_state().await, Ok(CaptureState::Unknown));
}

#[tokio::test]
async fn test_events_fan_out_to_every_capture_view() {
    let dir = TempDir::new().unwrap();
    let (_, module) = module_with(SimulatedPlatform::new(), dir.path());
    let sink = RecordingSink::new();
    module.manager().set_event_emitter(sink.clone());

    let first_events = Arc::new(ViewEvents::default());
    let second_events = Arc::new(ViewEvents::default());
    let first = CaptureView::mount(&module, CaptureViewProps::default(), first_events.clone());
    let second = CaptureView::mount(&module, CaptureViewProps::default(), second_events.clone());

    module.manager().setup_session().await.unwrap();

    assert!(wait_for(|| first_events.len() == 3 && second_events.len() == 3).await);
    assert!(first_events
        .targets()
        .iter()
        .all(|t| Some(*t) == first.node()));
    assert!(second_events
        .targets()
        .iter()
        .all(|t| Some(*t) == second.node()));
    // the global sink still gets one copy of each
    assert_eq!(sink.count(names::ON_SESSION_STATE_CHANGE), 2);
}

#[tokio::test]
async fn test_unmounted_view_stops_receiving_events() {
    let dir = TempDir::new().unwrap();
    let (platform, module) = module_with(SimulatedPlatform::new(), dir.path());
    let kept_events = Arc::new(ViewEvents::default());
    let gone_events = Arc::new(ViewEvents::default());
    let kept = CaptureView::mount(&module, CaptureViewProps::default(), kept_events.clone());
    let mut gone = CaptureView::mount(&module, CaptureViewProps::default(), gone_events.clone());

    module.manager().setup_session().await.unwrap();
    assert!(wait_for(|| gone_events.len() == 3).await);
    gone.unmount().await;

    platform
        .last_handle()
        .unwrap()
        .set_tracking(TrackingState::Limited);

    assert!(wait_for(|| kept_events.len() == 4).await);
    assert_eq!(gone_events.len(), 3);
    assert_eq!(module.manager().registered_views(), 1);
    // another capture view is still mounted
    assert!(module.manager().has_live_session().await);
}

#[tokio::test]
async fn test_last_capture_view_unmount_cleans_up() {
    let dir = TempDir::new().unwrap();
    let (platform, module) = module_with(SimulatedPlatform::new(), dir.path());
    let mut view = CaptureView::mount(
        &module,
        CaptureViewProps::default(),
        Arc::new(ViewEvents::default()),
    );
    let cloud = PointCloudView::<()>::mount(&module, Placeholders::default(), None);

    module.manager().setup_session().await.unwrap();
    assert_eq!(platform.live_handles(), 1);

    view.unmount().await;

    assert_eq!(platform.live_handles(), 0);
    assert!(!module.manager().has_live_session().await);
    assert_eq!(module.mounted_count(ViewKind::Capture), 0);
    assert_eq!(module.mounted_count(ViewKind::PointCloud), 1);
    assert_eq!(cloud.get_session_state().await, Ok(CaptureState::Unknown));
}

#[tokio::test]
async fn test_dropped_capture_views_release_nodes_and_session() {
    let dir = TempDir::new().unwrap();
    let (platform, module) = module_with(SimulatedPlatform::new(), dir.path());
    let first = CaptureView::mount(
        &module,
        CaptureViewProps::default(),
        Arc::new(ViewEvents::default()),
    );
    let second = CaptureView::mount(
        &module,
        CaptureViewProps::default(),
        Arc::new(ViewEvents::default()),
    );
    let cloud = PointCloudView::<()>::mount(&module, Placeholders::default(), None);
    module.manager().setup_session().await.unwrap();

    drop(first);
    tokio::task::yield_now().await;
    assert_eq!(module.mounted_count(ViewKind::Capture), 1);
    assert!(module.manager().has_live_session().await);

    drop(second);
    drop(cloud);

    assert_eq!(module.mounted_count(ViewKind::Capture), 0);
    assert_eq!(module.mounted_count(ViewKind::PointCloud), 0);
    assert_eq!(module.manager().registered_views(), 0);
    assert!(wait_for(|| platform.live_handles() == 0).await);
    assert!(!module.manager().has_live_session().await);
}

#[tokio::test]
async fn test_directories_outside_root_rejected_through_ref() {
    let dir = TempDir::new().unwrap();
    let (_, module) = module_with(SimulatedPlatform::new(), dir.path());
    let view = CaptureView::mount(
        &module,
        CaptureViewProps {
            checkpoint_directory: Some("../Elsewhere/".into()),
            images_directory: Some(String::new()),
        },
        Arc::new(ViewEvents::default()),
    );

    assert_eq!(
        view.set_images_directory("../Images/"),
        Err(BridgeError::InvalidPath)
    );
    assert_eq!(
        view.set_checkpoint_directory("/tmp/Snapshots/"),
        Err(BridgeError::InvalidPath)
    );

    let layout = module.manager().directory_layout();
    assert_eq!(layout.images, "Images/");
    assert_eq!(layout.checkpoint, "Snapshots/");
}

#[tokio::test]
async fn test_view_queries_match_session() {
    let dir = TempDir::new().unwrap();
    let (platform, module) = module_with(SimulatedPlatform::new(), dir.path());
    let view = CaptureView::mount(
        &module,
        CaptureViewProps::default(),
        Arc::new(ViewEvents::default()),
    );

    assert_eq!(view.get_feedback_state().await, Ok(vec![Feedback::Unknown]));

    module.manager().setup_session().await.unwrap();
    view.start_detection().await.unwrap();
    view.start_capturing().await.unwrap();
    let remote = platform.last_handle().unwrap();
    remote.take_shot().unwrap();
    remote.complete_scan_pass();

    assert_eq!(view.get_session_state().await, Ok(CaptureState::Capturing));
    assert_eq!(view.get_number_of_shots_taken().await, Ok(1));
    assert_eq!(view.get_user_completed_scan_state().await, Ok(true));

    view.begin_new_scan().await.unwrap();
    assert_eq!(view.get_user_completed_scan_state().await, Ok(false));
}

#[tokio::test]
async fn test_view_listener_sees_session_errors() {
    let dir = TempDir::new().unwrap();
    let (_, module) = module_with(
        SimulatedPlatform::new().without_command_queue(),
        dir.path(),
    );
    let events = Arc::new(ViewEvents::default());
    let view = CaptureView::mount(&module, CaptureViewProps::default(), events.clone());

    let _ = module.manager().setup_session().await;
    assert!(view.node().is_some());

    let recorded = events.events.lock().unwrap().clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(
        recorded[0].event,
        SessionEvent::Error {
            error: "Failed to create graphics command queue".into()
        }
    );
}

// === Point cloud view ===

#[tokio::test]
async fn test_point_cloud_appear_without_session() {
    let dir = TempDir::new().unwrap();
    let (_, module) = module_with(SimulatedPlatform::new(), dir.path());
    let listener = Arc::new(CloudEvents::default());
    let mut cloud = PointCloudView::mount(
        &module,
        Placeholders {
            loading: Some("loading"),
            empty: Some("scan first"),
        },
        Some(listener.clone()),
    );

    assert!(matches!(
        cloud.visible_content(),
        PointCloudContent::Loading(&"loading")
    ));

    assert_eq!(cloud.appear().await, Ok(false));

    assert!(!cloud.is_loading());
    assert!(matches!(
        cloud.visible_content(),
        PointCloudContent::Empty(&"scan first")
    ));
    let events = listener.events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1.name(), "onAppear");
    assert_eq!(
        events[0].1.body(),
        serde_json::json!({"scanPassCompleted": false})
    );
}

#[tokio::test]
async fn test_point_cloud_appear_after_scan_pass() {
    let dir = TempDir::new().unwrap();
    let (platform, module) = module_with(SimulatedPlatform::new(), dir.path());
    let capture = CaptureView::mount(
        &module,
        CaptureViewProps::default(),
        Arc::new(ViewEvents::default()),
    );
    module.manager().setup_session().await.unwrap();
    platform.last_handle().unwrap().complete_scan_pass();

    let listener = Arc::new(CloudEvents::default());
    let mut cloud = PointCloudView::mount(
        &module,
        Placeholders {
            loading: Some(1),
            empty: Some(2),
        },
        Some(listener.clone()),
    );

    assert_eq!(cloud.appear().await, Ok(true));
    assert!(cloud.scan_pass_completed());
    assert!(matches!(
        cloud.visible_content(),
        PointCloudContent::PointCloud
    ));

    cloud.cloud_point_view_appeared(true);
    let events = listener.events.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].0, cloud.node().unwrap());
    assert_eq!(events[1].1.name(), "onCloudPointViewAppear");
}

#[tokio::test]
async fn test_point_cloud_appear_failure_keeps_loading() {
    let dir = TempDir::new().unwrap();
    let (_, module) = module_with(SimulatedPlatform::new(), dir.path());
    let mut cloud = PointCloudView::<()>::mount(&module, Placeholders::default(), None);
    cloud.unmount().await;

    assert_eq!(cloud.appear().await, Err(BridgeError::NodeNotFound));
    assert!(cloud.is_loading());
}

#[tokio::test]
async fn test_point_cloud_ref_rejects_capture_node_kind() {
    let dir = TempDir::new().unwrap();
    let (_, module) = module_with(SimulatedPlatform::new(), dir.path());
    let capture = CaptureView::mount(
        &module,
        CaptureViewProps::default(),
        Arc::new(ViewEvents::default()),
    );
    let node = capture.node().unwrap();

    assert!(module.resolve(node, ViewKind::Capture).is_ok());
    assert_eq!(
        module.resolve(node, ViewKind::PointCloud).err(),
        Some(BridgeError::NodeNotFound)
    );
}
