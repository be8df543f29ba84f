//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use objcap_core::bridge::{BridgeEvent, EventSink, SessionEvent};
use objcap_core::config::CaptureConfig;
use objcap_core::session::SessionManager;
use objcap_core::simulated::SimulatedPlatform;

/// Sink that records every event it is handed
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<BridgeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<BridgeEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(BridgeEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name() == name).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BridgeEvent::Session(SessionEvent::Error { error }) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventSink for RecordingSink {
    fn send_event(&self, event: &BridgeEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Config rooted at `root` with no settle delay after finish
pub fn test_config(root: &Path) -> CaptureConfig {
    let mut config = CaptureConfig::with_working_root(root);
    config.timing.finish_settle_delay_ms = 0;
    config
}

pub fn manager_with(
    platform: SimulatedPlatform,
    root: &Path,
) -> (Arc<SimulatedPlatform>, Arc<SessionManager>) {
    let platform = Arc::new(platform);
    let manager = Arc::new(SessionManager::new(platform.clone(), &test_config(root)));
    (platform, manager)
}
