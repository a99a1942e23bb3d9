// Connection-status read model.
//
// One snapshot, one writer. Sessions and the UI read it; only the
// aggregator mutates it, and every mutation replaces the whole snapshot.
// A report that cannot be applied whole is rejected and the previous
// snapshot stays in place.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::bridge::MicSource;
use crate::event_seq;
use crate::events::{CloudLink, ConnectionStatusEvent};

/// Point-in-time view of everything the UI renders about connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub cloud_link: CloudLink,
    pub device_link: bool,
    pub device_model: Option<String>,
    pub sensing_enabled: bool,
    pub mic_source: MicSource,
    pub last_updated: DateTime<Utc>,
}

impl ConnectionSnapshot {
    fn initial() -> Self {
        Self {
            cloud_link: CloudLink::Disconnected,
            device_link: false,
            device_model: None,
            sensing_enabled: true,
            mic_source: MicSource::Phone,
            last_updated: Utc::now(),
        }
    }
}

/// Snapshot change notification. `seq` orders updates for receivers that
/// re-subscribe after a gap.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub seq: u64,
    pub snapshot: ConnectionSnapshot,
}

/// A status report that cannot be applied as a whole snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("rejected partial status update: {reason}")]
pub struct RejectedUpdate {
    pub reason: &'static str,
}

const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Single writer for [`ConnectionSnapshot`].
pub struct ConnectionStatusAggregator {
    snapshot: RwLock<ConnectionSnapshot>,
    sender: broadcast::Sender<StatusEvent>,
}

impl ConnectionStatusAggregator {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            snapshot: RwLock::new(ConnectionSnapshot::initial()),
            sender,
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot.read().unwrap().clone()
    }

    /// Subscribe to snapshot changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    /// Apply a full connection report from the bridge. The snapshot is
    /// replaced atomically; a malformed report leaves it untouched.
    pub fn apply_connection(&self, event: &ConnectionStatusEvent) -> Result<(), RejectedUpdate> {
        if event.device_link
            && event
                .device_model
                .as_deref()
                .map(str::is_empty)
                .unwrap_or(true)
        {
            let rejected = RejectedUpdate {
                reason: "device link without a model name",
            };
            log::warn!("status aggregator: {}", rejected);
            return Err(rejected);
        }

        let next = {
            let mut guard = self.snapshot.write().unwrap();
            guard.cloud_link = event.cloud_link;
            guard.device_link = event.device_link;
            // A dead link carries no model.
            guard.device_model = if event.device_link {
                event.device_model.clone()
            } else {
                None
            };
            guard.last_updated = Utc::now();
            guard.clone()
        };
        self.notify(next);
        Ok(())
    }

    /// Toggle onboard sensing (cameras and sensors on the glasses).
    pub fn set_sensing_enabled(&self, enabled: bool) {
        let next = {
            let mut guard = self.snapshot.write().unwrap();
            if guard.sensing_enabled == enabled {
                return;
            }
            guard.sensing_enabled = enabled;
            guard.last_updated = Utc::now();
            guard.clone()
        };
        log::info!("status aggregator: sensing_enabled={}", enabled);
        self.notify(next);
    }

    /// Record the preferred microphone source.
    pub fn set_mic_source(&self, source: MicSource) {
        let next = {
            let mut guard = self.snapshot.write().unwrap();
            if guard.mic_source == source {
                return;
            }
            guard.mic_source = source;
            guard.last_updated = Utc::now();
            guard.clone()
        };
        self.notify(next);
    }

    fn notify(&self, snapshot: ConnectionSnapshot) {
        let _ = self.sender.send(StatusEvent {
            seq: event_seq::next_event_seq(),
            snapshot,
        });
    }
}

impl Default for ConnectionStatusAggregator {
    fn default() -> Self {
        Self::new()
    }
}
