// Typed event bus between the bridge transport and the session layer.
//
// Each inbound topic gets its own broadcast channel so subscribers only see
// the payload type they asked for. Dropping a receiver deregisters the
// subscription; there is no separate disposer handle to forget.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Cloud session link state as reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudLink {
    Connected,
    Connecting,
    Disconnected,
}

/// A single discovery hit for the model being searched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultEvent {
    pub model_name: String,
    pub device_address: String,
}

/// The bridge finished its scan pass for the named model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCompleteEvent {
    pub model_name: String,
}

/// Full connection-status report. Partial reports are invalid: a live
/// device link must always carry the model name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatusEvent {
    pub cloud_link: CloudLink,
    pub device_link: bool,
    pub device_model: Option<String>,
}

/// Networks visible to the glasses, in the order the bridge reported them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiScanResultsEvent {
    pub networks: Vec<String>,
}

/// WiFi join outcome from the glasses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiStatusEvent {
    pub connected: bool,
    pub ssid: Option<String>,
}

const CHANNEL_CAPACITY: usize = 32;

/// Fan-out hub for bridge events. The bridge transport publishes, sessions
/// and the status aggregator subscribe. Publishing with no live subscribers
/// is fine; the payload is simply dropped.
pub struct EventBus {
    search_result: broadcast::Sender<SearchResultEvent>,
    search_complete: broadcast::Sender<SearchCompleteEvent>,
    connection_status: broadcast::Sender<ConnectionStatusEvent>,
    wifi_scan_results: broadcast::Sender<WifiScanResultsEvent>,
    wifi_status: broadcast::Sender<WifiStatusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            search_result: broadcast::channel(CHANNEL_CAPACITY).0,
            search_complete: broadcast::channel(CHANNEL_CAPACITY).0,
            connection_status: broadcast::channel(CHANNEL_CAPACITY).0,
            wifi_scan_results: broadcast::channel(CHANNEL_CAPACITY).0,
            wifi_status: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn publish_search_result(&self, event: SearchResultEvent) {
        log::debug!(
            "bus: search result {} / {}",
            event.model_name,
            event.device_address
        );
        let _ = self.search_result.send(event);
    }

    pub fn publish_search_complete(&self, event: SearchCompleteEvent) {
        log::debug!("bus: search complete for {}", event.model_name);
        let _ = self.search_complete.send(event);
    }

    pub fn publish_connection_status(&self, event: ConnectionStatusEvent) {
        let _ = self.connection_status.send(event);
    }

    pub fn publish_wifi_scan_results(&self, event: WifiScanResultsEvent) {
        log::debug!("bus: wifi scan returned {} networks", event.networks.len());
        let _ = self.wifi_scan_results.send(event);
    }

    pub fn publish_wifi_status(&self, event: WifiStatusEvent) {
        let _ = self.wifi_status.send(event);
    }

    pub fn subscribe_search_result(&self) -> broadcast::Receiver<SearchResultEvent> {
        self.search_result.subscribe()
    }

    pub fn subscribe_search_complete(&self) -> broadcast::Receiver<SearchCompleteEvent> {
        self.search_complete.subscribe()
    }

    pub fn subscribe_connection_status(&self) -> broadcast::Receiver<ConnectionStatusEvent> {
        self.connection_status.subscribe()
    }

    pub fn subscribe_wifi_scan_results(&self) -> broadcast::Receiver<WifiScanResultsEvent> {
        self.wifi_scan_results.subscribe()
    }

    pub fn subscribe_wifi_status(&self) -> broadcast::Receiver<WifiStatusEvent> {
        self.wifi_status.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
