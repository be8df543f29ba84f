//! Bridge surface
//!
//! Typed event contracts, the global sink seam, the bounded pre-sink buffer,
//! view subscription and the constants exported to hosts.

mod buffer;
pub mod constants;
mod event;
mod hub;
mod registry;
mod snapshot;

use serde::{Deserialize, Serialize};

pub use buffer::EventBuffer;
pub use constants::{constants, BridgeConstants};
pub use event::{names, BridgeEvent, EventSink, ReconstructionEvent, SessionEvent};
pub use hub::EventHub;
pub use registry::{SessionSubscriber, SubscriberId, SubscriberRegistry};
pub use snapshot::{SessionSnapshot, SnapshotSink};

/// Which event a full pre-sink buffer discards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Discard the oldest buffered event to make room
    #[default]
    DropOldest,
    /// Discard the incoming event
    DropNewest,
}
