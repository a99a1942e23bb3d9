//! Connectivity manager: the single entry point for the UI layer.
//!
//! Owns the bridge handle, the permission gate, the status aggregator and
//! at most one session of each kind. Inbound bridge events arrive on the
//! [`EventBus`] and are routed here to whichever session they belong to;
//! starting a new session of a kind replaces (and tears down) the previous
//! one, so stale listeners cannot outlive their flow.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::RwLock;

use crate::bridge::{Bridge, BridgeCommand, MicSource};
use crate::config::ConnectivityConfig;
use crate::device_models;
use crate::discovery::DiscoverySession;
use crate::errors::ConnectError;
use crate::events::{ConnectionStatusEvent, EventBus};
use crate::pairing::{PairingSession, PairingState};
use crate::permissions::{PermissionGate, PermissionHost};
use crate::provisioning::ProvisioningSession;
use crate::status::ConnectionStatusAggregator;

/// How often session deadlines are checked.
const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Manager-level errors.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("A pairing attempt is already in progress")]
    PairingBusy,

    #[error("No glasses are connected")]
    NotConnected,

    #[error("'{0}' does not need WiFi provisioning")]
    ProvisioningNotRequired(String),

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// Top-level connectivity coordinator.
pub struct ConnectivityManager {
    bridge: Arc<dyn Bridge>,
    gate: Arc<PermissionGate>,
    bus: Arc<EventBus>,
    aggregator: Arc<ConnectionStatusAggregator>,
    config: RwLock<ConnectivityConfig>,
    discovery: RwLock<Option<Arc<DiscoverySession>>>,
    pairing: RwLock<Option<Arc<PairingSession>>>,
    provisioning: RwLock<Option<Arc<ProvisioningSession>>>,
}

impl ConnectivityManager {
    pub fn new(
        bridge: Arc<dyn Bridge>,
        permission_host: Arc<dyn PermissionHost>,
        config: ConnectivityConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            bridge,
            gate: Arc::new(PermissionGate::new(permission_host)),
            bus: Arc::new(EventBus::new()),
            aggregator: Arc::new(ConnectionStatusAggregator::new()),
            config: RwLock::new(config),
            discovery: RwLock::new(None),
            pairing: RwLock::new(None),
            provisioning: RwLock::new(None),
        })
    }

    /// The bus the bridge transport publishes into.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// The status read model.
    pub fn status(&self) -> Arc<ConnectionStatusAggregator> {
        self.aggregator.clone()
    }

    /// Current configuration. The host persists changes via [`crate::config`].
    pub async fn config(&self) -> ConnectivityConfig {
        self.config.read().await.clone()
    }

    /// Spawn the event pump and the deadline ticker. Tasks hold weak
    /// references and exit when the manager is dropped.
    pub fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);

        {
            let weak = weak.clone();
            let mut rx = self.bus.subscribe_search_result();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let Some(manager) = weak.upgrade() else { break };
                            manager
                                .ingest_search_result(&event.model_name, &event.device_address)
                                .await;
                        }
                        Err(e) => {
                            if !recv_failed("search_result", e) {
                                break;
                            }
                        }
                    }
                }
            });
        }

        {
            let weak = weak.clone();
            let mut rx = self.bus.subscribe_search_complete();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let Some(manager) = weak.upgrade() else { break };
                            manager.ingest_search_complete(&event.model_name).await;
                        }
                        Err(e) => {
                            if !recv_failed("search_complete", e) {
                                break;
                            }
                        }
                    }
                }
            });
        }

        {
            let weak = weak.clone();
            let mut rx = self.bus.subscribe_connection_status();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let Some(manager) = weak.upgrade() else { break };
                            manager.ingest_connection_status(&event).await;
                        }
                        Err(e) => {
                            if !recv_failed("connection_status", e) {
                                break;
                            }
                        }
                    }
                }
            });
        }

        {
            let weak = weak.clone();
            let mut rx = self.bus.subscribe_wifi_scan_results();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let Some(manager) = weak.upgrade() else { break };
                            manager.ingest_wifi_scan_results(&event.networks).await;
                        }
                        Err(e) => {
                            if !recv_failed("wifi_scan_results", e) {
                                break;
                            }
                        }
                    }
                }
            });
        }

        {
            let weak = weak.clone();
            let mut rx = self.bus.subscribe_wifi_status();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let Some(manager) = weak.upgrade() else { break };
                            manager
                                .ingest_wifi_status(event.connected, event.ssid.as_deref())
                                .await;
                        }
                        Err(e) => {
                            if !recv_failed("wifi_status", e) {
                                break;
                            }
                        }
                    }
                }
            });
        }

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(manager) => manager.tick().await,
                    None => break,
                }
            }
        });
    }

    // === Session lifecycle ===

    /// Start a scan for the given model, replacing any previous discovery
    /// session.
    pub async fn start_discovery(
        &self,
        model_name: &str,
    ) -> Result<Arc<DiscoverySession>, ManagerError> {
        if let Some(previous) = self.discovery.write().await.take() {
            previous.cancel().await;
        }

        let session = Arc::new(DiscoverySession::new(
            model_name,
            self.bridge.clone(),
            self.gate.clone(),
        ));
        session.begin().await.map_err(|e| match e {
            crate::discovery::DiscoveryError::Connect(c) => ManagerError::Connect(c),
            other => ManagerError::Connect(ConnectError::Bridge(other.to_string())),
        })?;
        *self.discovery.write().await = Some(session.clone());
        Ok(session)
    }

    /// Start a pairing attempt toward a selected device. `address` is None
    /// for models that reported selection-not-required.
    pub async fn start_pairing(
        &self,
        model_name: &str,
        address: Option<String>,
    ) -> Result<Arc<PairingSession>, ManagerError> {
        {
            let pairing = self.pairing.read().await;
            if let Some(current) = pairing.as_ref() {
                if matches!(
                    current.state().await,
                    PairingState::Connecting | PairingState::AwaitingPermissions
                ) {
                    return Err(ManagerError::PairingBusy);
                }
            }
        }
        // Device selection is done; the scan session has served its purpose.
        if let Some(discovery) = self.discovery.write().await.take() {
            discovery.cancel().await;
        }
        if let Some(previous) = self.pairing.write().await.take() {
            previous.cancel().await;
        }

        let timeout = {
            let config = self.config.read().await;
            Duration::from_secs(config.pairing.connect_timeout_secs)
        };
        let session = Arc::new(PairingSession::new(
            model_name,
            address,
            self.bridge.clone(),
            self.gate.clone(),
            timeout,
        ));
        // The host mic carries audio until the device link is up; the saved
        // preference is applied afterwards via set_preferred_microphone.
        let begun = session.begin(MicSource::Phone).await;
        // A failed session is kept so the UI can read the failure.
        *self.pairing.write().await = Some(session.clone());
        begun.map_err(|e| match e {
            crate::pairing::PairingError::Connect(c) => ManagerError::Connect(c),
            crate::pairing::PairingError::AlreadyConnecting => ManagerError::PairingBusy,
            other => ManagerError::Connect(ConnectError::Bridge(other.to_string())),
        })?;
        Ok(session)
    }

    /// Start WiFi provisioning for the connected glasses. Only available
    /// once paired, and only for models with their own WiFi radio.
    pub async fn start_provisioning(&self) -> Result<Arc<ProvisioningSession>, ManagerError> {
        let model_name = {
            let pairing = self.pairing.read().await;
            match pairing.as_ref() {
                Some(session) if session.state().await == PairingState::Connected => {
                    session.target_model().to_string()
                }
                _ => return Err(ManagerError::NotConnected),
            }
        };
        if !device_models::capabilities_for(&model_name).requires_wifi {
            return Err(ManagerError::ProvisioningNotRequired(model_name));
        }

        if let Some(previous) = self.provisioning.write().await.take() {
            previous.cancel().await;
        }
        let timeout = {
            let config = self.config.read().await;
            Duration::from_secs(config.provisioning.join_timeout_secs)
        };
        let session = Arc::new(ProvisioningSession::new(self.bridge.clone(), timeout));
        *self.provisioning.write().await = Some(session.clone());
        Ok(session)
    }

    pub async fn discovery_session(&self) -> Option<Arc<DiscoverySession>> {
        self.discovery.read().await.clone()
    }

    pub async fn pairing_session(&self) -> Option<Arc<PairingSession>> {
        self.pairing.read().await.clone()
    }

    pub async fn provisioning_session(&self) -> Option<Arc<ProvisioningSession>> {
        self.provisioning.read().await.clone()
    }

    /// Disconnect without unpairing.
    pub async fn disconnect_device(&self) -> Result<(), ManagerError> {
        self.bridge
            .send(BridgeCommand::DisconnectDevice)
            .map_err(ConnectError::from)?;
        Ok(())
    }

    /// Unpair the connected glasses.
    pub async fn forget_device(&self) -> Result<(), ManagerError> {
        let pairing = self.pairing.read().await.clone();
        match pairing {
            Some(session) => {
                session.forget().await.map_err(|e| match e {
                    crate::pairing::PairingError::Connect(c) => ManagerError::Connect(c),
                    _ => ManagerError::NotConnected,
                })?;
                Ok(())
            }
            None => Err(ManagerError::NotConnected),
        }
    }

    // === Settings ===

    /// Choose which microphone feeds the audio pipeline.
    pub async fn set_preferred_microphone(&self, source: MicSource) -> Result<(), ManagerError> {
        self.bridge
            .send(BridgeCommand::SetPreferredMicrophone { source })
            .map_err(ConnectError::from)?;
        self.aggregator.set_mic_source(source);
        self.config.write().await.device.preferred_mic = source;
        Ok(())
    }

    /// Toggle onboard sensing.
    pub async fn set_sensing_enabled(&self, enabled: bool) {
        self.aggregator.set_sensing_enabled(enabled);
        self.config.write().await.device.sensing_enabled = enabled;
    }

    // === Inbound event routing ===

    pub async fn ingest_search_result(&self, model_name: &str, device_address: &str) {
        if let Some(session) = self.discovery.read().await.clone() {
            session.on_search_result(model_name, device_address).await;
        }
    }

    pub async fn ingest_search_complete(&self, model_name: &str) {
        if let Some(session) = self.discovery.read().await.clone() {
            session.on_search_complete(model_name).await;
        }
    }

    pub async fn ingest_connection_status(&self, event: &ConnectionStatusEvent) {
        // A report the aggregator rejects is malformed; no session sees it.
        if self.aggregator.apply_connection(event).is_err() {
            return;
        }
        if event.device_link {
            if let Some(model) = event.device_model.as_deref() {
                self.config.write().await.device.last_connected_model = Some(model.to_string());
            }
        }
        if let Some(session) = self.pairing.read().await.clone() {
            session.on_status(event).await;
        }
    }

    pub async fn ingest_wifi_scan_results(&self, networks: &[String]) {
        if let Some(session) = self.provisioning.read().await.clone() {
            session.on_scan_results(networks).await;
        }
    }

    pub async fn ingest_wifi_status(&self, connected: bool, ssid: Option<&str>) {
        if let Some(session) = self.provisioning.read().await.clone() {
            session.on_wifi_status(connected, ssid).await;
        }
    }

    /// The bridge transport died. Every active flow fails and the app
    /// returns to its top-level idle screen.
    pub async fn notify_bridge_lost(&self) {
        log::warn!("bridge lost; tearing down all sessions");
        if let Some(session) = self.discovery.write().await.take() {
            session.cancel().await;
        }
        if let Some(session) = self.pairing.read().await.clone() {
            session.on_bridge_lost().await;
        }
        if let Some(session) = self.provisioning.read().await.clone() {
            session.on_bridge_lost().await;
        }
    }

    /// Check session deadlines. Bridge loss is handled eagerly in
    /// [`Self::notify_bridge_lost`], so it always precedes a timeout that
    /// lands in the same tick.
    pub async fn tick(&self) {
        let now = Instant::now();
        if let Some(session) = self.pairing.read().await.clone() {
            session.tick(now).await;
        }
        if let Some(session) = self.provisioning.read().await.clone() {
            session.tick(now).await;
        }
    }
}

fn recv_failed(topic: &str, error: tokio::sync::broadcast::error::RecvError) -> bool {
    match error {
        tokio::sync::broadcast::error::RecvError::Lagged(skipped) => {
            log::warn!("event pump lagged on {}: skipped {}", topic, skipped);
            true
        }
        tokio::sync::broadcast::error::RecvError::Closed => false,
    }
}
