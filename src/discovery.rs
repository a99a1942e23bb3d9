//! Device discovery session.
//!
//! Drives one scan pass for a target glasses model:
//! - Permission-gated start (location before proximity)
//! - First-seen deduplication of scan hits by address
//! - Selection-not-required short circuit for models that pair without a
//!   device list
//! - Empty-scan retry prompt instead of a hard failure
//!
//! # Session Management
//!
//! Each session gets a unique UUID. Scan hits arriving after the session
//! left the Scanning state are silently ignored, so events from a previous
//! scan cannot leak into a new one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::bridge::{Bridge, BridgeCommand, ADDRESS_NOT_REQUIRED};
use crate::errors::ConnectError;
use crate::permissions::{Capability, PermissionGate};

/// Session identifier (UUID v4).
pub type SessionId = String;

/// Discovery session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    /// Not scanning. Fresh sessions and finished sessions sit here.
    Idle,
    /// A scan pass is in flight.
    Scanning,
    /// The scan finished with at least one device to choose from.
    ResultsReady,
    /// The scan finished empty; the user decides whether to retry.
    EmptyRetryPrompt,
}

/// A device found during the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub model_name: String,
    pub address: String,
    pub discovered_at: DateTime<Utc>,
}

/// User decision at the empty-scan prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyScanDecision {
    /// Run another scan pass.
    Retry,
    /// Give up and return to the start screen.
    Abort,
}

/// Discovery session event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DiscoveryEvent {
    /// Scan pass started.
    Started {
        session_id: SessionId,
        model_name: String,
        timestamp: DateTime<Utc>,
    },
    /// A new device appeared in the results.
    DeviceFound {
        session_id: SessionId,
        device: DiscoveredDevice,
    },
    /// The model pairs without a device list; skip straight to connecting.
    SelectionNotRequired {
        session_id: SessionId,
        model_name: String,
        timestamp: DateTime<Utc>,
    },
    /// Scan finished with results.
    ResultsReady {
        session_id: SessionId,
        devices: Vec<DiscoveredDevice>,
        timestamp: DateTime<Utc>,
    },
    /// Scan finished empty; the retry prompt is showing.
    EmptyScan {
        session_id: SessionId,
        model_name: String,
        timestamp: DateTime<Utc>,
    },
    /// Session ended without a selection.
    Cancelled {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
}

/// Discovery session errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid state for operation: {0:?}")]
    InvalidState(DiscoveryState),

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// One scan pass for a single target model.
pub struct DiscoverySession {
    id: SessionId,
    target_model: String,
    bridge: Arc<dyn Bridge>,
    gate: Arc<PermissionGate>,
    state: RwLock<DiscoveryState>,
    results: RwLock<Vec<DiscoveredDevice>>,
    last_error: RwLock<Option<ConnectError>>,
    event_sender: broadcast::Sender<DiscoveryEvent>,
}

impl DiscoverySession {
    pub fn new(
        target_model: impl Into<String>,
        bridge: Arc<dyn Bridge>,
        gate: Arc<PermissionGate>,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(32);
        Self {
            id: Uuid::new_v4().to_string(),
            target_model: target_model.into(),
            bridge,
            gate,
            state: RwLock::new(DiscoveryState::Idle),
            results: RwLock::new(Vec::new()),
            last_error: RwLock::new(None),
            event_sender,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn target_model(&self) -> &str {
        &self.target_model
    }

    pub async fn state(&self) -> DiscoveryState {
        *self.state.read().await
    }

    /// Devices found so far, in first-seen order.
    pub async fn results(&self) -> Vec<DiscoveredDevice> {
        self.results.read().await.clone()
    }

    /// The error behind the current prompt, if any. Set when a scan pass
    /// comes back empty; cleared on retry.
    pub async fn last_error(&self) -> Option<ConnectError> {
        self.last_error.read().await.clone()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_sender.subscribe()
    }

    /// Start the scan pass. Runs the permission gate first; no hardware
    /// command leaves the session if a capability is denied.
    pub async fn begin(&self) -> Result<(), DiscoveryError> {
        {
            let state = *self.state.read().await;
            if state != DiscoveryState::Idle {
                return Err(DiscoveryError::InvalidState(state));
            }
        }

        if let Err(capability) = self
            .gate
            .ensure(&[Capability::Location, Capability::Proximity])
        {
            return Err(ConnectError::PermissionDenied(capability).into());
        }

        self.send_search().await?;
        log::info!(
            "discovery {}: scanning for {}",
            self.id,
            self.target_model
        );
        self.emit(DiscoveryEvent::Started {
            session_id: self.id.clone(),
            model_name: self.target_model.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Handle one scan hit from the bridge.
    pub async fn on_search_result(&self, model_name: &str, device_address: &str) {
        {
            let state = *self.state.read().await;
            if state != DiscoveryState::Scanning {
                log::debug!(
                    "discovery {}: ignoring scan hit in state {:?}",
                    self.id,
                    state
                );
                return;
            }
        }
        if model_name != self.target_model {
            log::debug!(
                "discovery {}: ignoring hit for other model '{}'",
                self.id,
                model_name
            );
            return;
        }

        if device_address == ADDRESS_NOT_REQUIRED {
            // Pairing can proceed without a device list. The scan outcome is
            // decided; any further hits and the completion event are stale.
            *self.state.write().await = DiscoveryState::Idle;
            self.results.write().await.clear();
            log::info!(
                "discovery {}: {} needs no device selection",
                self.id,
                self.target_model
            );
            self.emit(DiscoveryEvent::SelectionNotRequired {
                session_id: self.id.clone(),
                model_name: self.target_model.clone(),
                timestamp: Utc::now(),
            });
            return;
        }

        let device = {
            let mut results = self.results.write().await;
            if results.iter().any(|d| d.address == device_address) {
                return;
            }
            let device = DiscoveredDevice {
                model_name: model_name.to_string(),
                address: device_address.to_string(),
                discovered_at: Utc::now(),
            };
            results.push(device.clone());
            device
        };
        self.emit(DiscoveryEvent::DeviceFound {
            session_id: self.id.clone(),
            device,
        });
    }

    /// Handle the end-of-scan marker from the bridge.
    pub async fn on_search_complete(&self, model_name: &str) {
        if model_name != self.target_model {
            return;
        }
        let mut state = self.state.write().await;
        if *state != DiscoveryState::Scanning {
            log::debug!(
                "discovery {}: ignoring scan completion in state {:?}",
                self.id,
                *state
            );
            return;
        }

        let devices = self.results.read().await.clone();
        if devices.is_empty() {
            *state = DiscoveryState::EmptyRetryPrompt;
            drop(state);
            *self.last_error.write().await = Some(ConnectError::DiscoveryEmpty);
            log::info!("discovery {}: scan came back empty", self.id);
            self.emit(DiscoveryEvent::EmptyScan {
                session_id: self.id.clone(),
                model_name: self.target_model.clone(),
                timestamp: Utc::now(),
            });
        } else {
            *state = DiscoveryState::ResultsReady;
            drop(state);
            self.emit(DiscoveryEvent::ResultsReady {
                session_id: self.id.clone(),
                devices,
                timestamp: Utc::now(),
            });
        }
    }

    /// Resolve the empty-scan prompt.
    pub async fn resolve_empty_scan(
        &self,
        decision: EmptyScanDecision,
    ) -> Result<(), DiscoveryError> {
        {
            let state = *self.state.read().await;
            if state != DiscoveryState::EmptyRetryPrompt {
                return Err(DiscoveryError::InvalidState(state));
            }
        }
        match decision {
            EmptyScanDecision::Retry => {
                log::info!("discovery {}: retrying scan", self.id);
                self.send_search().await?;
            }
            EmptyScanDecision::Abort => {
                *self.state.write().await = DiscoveryState::Idle;
                self.emit(DiscoveryEvent::Cancelled {
                    session_id: self.id.clone(),
                    timestamp: Utc::now(),
                });
            }
        }
        Ok(())
    }

    /// Tear the session down. Idempotent.
    pub async fn cancel(&self) {
        let mut state = self.state.write().await;
        if *state == DiscoveryState::Idle {
            return;
        }
        *state = DiscoveryState::Idle;
        drop(state);
        self.results.write().await.clear();
        *self.last_error.write().await = None;
        self.emit(DiscoveryEvent::Cancelled {
            session_id: self.id.clone(),
            timestamp: Utc::now(),
        });
    }

    async fn send_search(&self) -> Result<(), DiscoveryError> {
        self.bridge
            .send(BridgeCommand::SearchForCompatibleDevices {
                model_name: self.target_model.clone(),
            })
            .map_err(ConnectError::from)?;
        *self.last_error.write().await = None;
        *self.state.write().await = DiscoveryState::Scanning;
        Ok(())
    }

    fn emit(&self, event: DiscoveryEvent) {
        let _ = self.event_sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeError;
    use crate::permissions::PermissionHost;
    use std::sync::Mutex;

    /// Bridge fake that records every command it is handed.
    struct SpyBridge {
        sent: Mutex<Vec<BridgeCommand>>,
    }

    impl SpyBridge {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<BridgeCommand> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Bridge for SpyBridge {
        fn send(&self, command: BridgeCommand) -> Result<(), BridgeError> {
            self.sent.lock().unwrap().push(command);
            Ok(())
        }
    }

    struct GrantAll;

    impl PermissionHost for GrantAll {
        fn check_capability(&self, _capability: Capability) -> bool {
            true
        }
        fn request_capability(&self, _capability: Capability) -> bool {
            true
        }
    }

    struct DenyProximity;

    impl PermissionHost for DenyProximity {
        fn check_capability(&self, capability: Capability) -> bool {
            capability != Capability::Proximity
        }
        fn request_capability(&self, _capability: Capability) -> bool {
            false
        }
    }

    fn session_with(
        host: Arc<dyn PermissionHost>,
    ) -> (DiscoverySession, Arc<SpyBridge>) {
        let bridge = SpyBridge::new();
        let gate = Arc::new(PermissionGate::new(host));
        let session = DiscoverySession::new("Puck One", bridge.clone(), gate);
        (session, bridge)
    }

    #[tokio::test]
    async fn begin_sends_search_and_enters_scanning() {
        let (session, bridge) = session_with(Arc::new(GrantAll));
        session.begin().await.unwrap();

        assert_eq!(session.state().await, DiscoveryState::Scanning);
        assert_eq!(
            bridge.commands(),
            vec![BridgeCommand::SearchForCompatibleDevices {
                model_name: "Puck One".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn denied_permission_blocks_search_command() {
        let (session, bridge) = session_with(Arc::new(DenyProximity));
        let err = session.begin().await.unwrap_err();

        assert!(matches!(
            err,
            DiscoveryError::Connect(ConnectError::PermissionDenied(Capability::Proximity))
        ));
        assert_eq!(session.state().await, DiscoveryState::Idle);
        assert!(bridge.commands().is_empty());
    }

    #[tokio::test]
    async fn duplicate_addresses_are_collapsed_in_first_seen_order() {
        let (session, _bridge) = session_with(Arc::new(GrantAll));
        session.begin().await.unwrap();

        session.on_search_result("Puck One", "AA").await;
        session.on_search_result("Puck One", "BB").await;
        session.on_search_result("Puck One", "AA").await;
        session.on_search_result("Puck One", "CC").await;

        let addresses: Vec<String> = session
            .results()
            .await
            .into_iter()
            .map(|d| d.address)
            .collect();
        assert_eq!(addresses, vec!["AA", "BB", "CC"]);
    }

    #[tokio::test]
    async fn hits_for_other_models_are_ignored() {
        let (session, _bridge) = session_with(Arc::new(GrantAll));
        session.begin().await.unwrap();

        session.on_search_result("Puck Live", "AA").await;
        assert!(session.results().await.is_empty());
    }

    #[tokio::test]
    async fn selection_not_required_bypasses_results() {
        let (session, _bridge) = session_with(Arc::new(GrantAll));
        session.begin().await.unwrap();
        let mut events = session.subscribe();

        session
            .on_search_result("Puck One", ADDRESS_NOT_REQUIRED)
            .await;

        assert_eq!(session.state().await, DiscoveryState::Idle);
        assert!(matches!(
            events.recv().await.unwrap(),
            DiscoveryEvent::SelectionNotRequired { .. }
        ));

        // The late completion marker changes nothing.
        session.on_search_complete("Puck One").await;
        assert_eq!(session.state().await, DiscoveryState::Idle);
    }

    #[tokio::test]
    async fn empty_scan_raises_retry_prompt() {
        let (session, _bridge) = session_with(Arc::new(GrantAll));
        session.begin().await.unwrap();
        let mut events = session.subscribe();

        session.on_search_complete("Puck One").await;

        assert_eq!(session.state().await, DiscoveryState::EmptyRetryPrompt);
        assert!(matches!(
            events.recv().await.unwrap(),
            DiscoveryEvent::EmptyScan { .. }
        ));
    }

    #[tokio::test]
    async fn empty_scan_records_the_error_until_retry() {
        let (session, _bridge) = session_with(Arc::new(GrantAll));
        session.begin().await.unwrap();
        session.on_search_complete("Puck One").await;

        assert_eq!(
            session.last_error().await,
            Some(ConnectError::DiscoveryEmpty)
        );

        session
            .resolve_empty_scan(EmptyScanDecision::Retry)
            .await
            .unwrap();
        assert_eq!(session.last_error().await, None);
    }

    #[tokio::test]
    async fn retry_from_empty_prompt_scans_again() {
        let (session, bridge) = session_with(Arc::new(GrantAll));
        session.begin().await.unwrap();
        session.on_search_complete("Puck One").await;

        session
            .resolve_empty_scan(EmptyScanDecision::Retry)
            .await
            .unwrap();

        assert_eq!(session.state().await, DiscoveryState::Scanning);
        assert_eq!(bridge.commands().len(), 2);
    }

    #[tokio::test]
    async fn abort_from_empty_prompt_returns_to_idle() {
        let (session, _bridge) = session_with(Arc::new(GrantAll));
        session.begin().await.unwrap();
        session.on_search_complete("Puck One").await;

        session
            .resolve_empty_scan(EmptyScanDecision::Abort)
            .await
            .unwrap();
        assert_eq!(session.state().await, DiscoveryState::Idle);
    }

    #[tokio::test]
    async fn results_complete_enters_results_ready() {
        let (session, _bridge) = session_with(Arc::new(GrantAll));
        session.begin().await.unwrap();
        session.on_search_result("Puck One", "AA").await;
        session.on_search_complete("Puck One").await;

        assert_eq!(session.state().await, DiscoveryState::ResultsReady);

        // Hits after completion are stale.
        session.on_search_result("Puck One", "BB").await;
        assert_eq!(session.results().await.len(), 1);
    }

    #[tokio::test]
    async fn cancel_clears_results() {
        let (session, _bridge) = session_with(Arc::new(GrantAll));
        session.begin().await.unwrap();
        session.on_search_result("Puck One", "AA").await;

        session.cancel().await;
        assert_eq!(session.state().await, DiscoveryState::Idle);
        assert!(session.results().await.is_empty());
    }

    #[tokio::test]
    async fn begin_twice_is_rejected() {
        let (session, _bridge) = session_with(Arc::new(GrantAll));
        session.begin().await.unwrap();
        assert!(matches!(
            session.begin().await,
            Err(DiscoveryError::InvalidState(DiscoveryState::Scanning))
        ));
    }
}
