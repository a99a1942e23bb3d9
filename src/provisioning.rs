//! WiFi provisioning session for connected glasses.
//!
//! Walks the user through getting the glasses onto a network:
//! - Scan-assisted path: request a scan, pick an SSID, type the password
//! - Manual path: type both SSID and password
//! - Credentials are forwarded to the glasses once and never persisted
//! - A rejected password returns to credential entry with the SSID intact
//!
//! Only models whose capability table says `requires_wifi` ever get one of
//! these sessions; the manager enforces that.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::bridge::{Bridge, BridgeCommand};
use crate::errors::ConnectError;

/// Session identifier (UUID v4).
pub type SessionId = String;

/// Default configuration values.
pub mod defaults {
    use std::time::Duration;

    /// How long to wait for the glasses to confirm joining a network.
    pub const JOIN_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Provisioning session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    /// Choosing between scan-assisted and manual entry.
    SelectMethod,
    /// Waiting for scan results from the glasses.
    Scanning,
    /// Showing the visible networks (possibly none).
    NetworkList,
    /// Collecting the password (and the SSID on the manual path).
    EnterCredentials,
    /// Credentials sent, waiting for the join confirmation.
    Connecting,
    /// The glasses joined the network.
    Connected,
    /// The session died with the bridge; nothing can continue.
    Failed,
}

/// WiFi credentials on their way to the glasses. Never serialized and
/// never stored beyond the send.
#[derive(Debug, Clone)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

/// Provisioning session event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ProvisioningEvent {
    /// Scan requested from the glasses.
    ScanStarted {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
    /// Scan finished; `networks` may be empty.
    NetworkList {
        session_id: SessionId,
        networks: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    /// Credential entry is showing. `error` carries the reason when the
    /// session bounced back here after a failed join.
    CredentialsRequired {
        session_id: SessionId,
        ssid: Option<String>,
        ssid_editable: bool,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Credentials sent to the glasses.
    ConnectStarted {
        session_id: SessionId,
        ssid: String,
        timestamp: DateTime<Utc>,
    },
    /// The glasses confirmed joining.
    Connected {
        session_id: SessionId,
        ssid: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// The session is dead.
    Failed {
        session_id: SessionId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// Provisioning session errors.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Invalid state for operation: {0:?}")]
    InvalidState(ProvisioningState),

    #[error("SSID must not be empty")]
    EmptySsid,

    #[error("SSID is fixed to the selected network")]
    SsidLocked,

    #[error("'{0}' is not in the scanned network list")]
    UnknownNetwork(String),

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// One provisioning flow for the connected glasses.
pub struct ProvisioningSession {
    id: SessionId,
    bridge: Arc<dyn Bridge>,
    join_timeout: Duration,
    state: RwLock<ProvisioningState>,
    /// Visible networks in bridge-reported order, deduplicated.
    networks: RwLock<Vec<String>>,
    /// SSID being provisioned. Survives a rejected password.
    ssid: RwLock<Option<String>>,
    /// Whether the user may edit the SSID (manual path only).
    ssid_editable: RwLock<bool>,
    last_error: RwLock<Option<ConnectError>>,
    deadline: RwLock<Option<Instant>>,
    event_sender: broadcast::Sender<ProvisioningEvent>,
}

impl ProvisioningSession {
    pub fn new(bridge: Arc<dyn Bridge>, join_timeout: Duration) -> Self {
        let (event_sender, _) = broadcast::channel(32);
        Self {
            id: Uuid::new_v4().to_string(),
            bridge,
            join_timeout,
            state: RwLock::new(ProvisioningState::SelectMethod),
            networks: RwLock::new(Vec::new()),
            ssid: RwLock::new(None),
            ssid_editable: RwLock::new(true),
            last_error: RwLock::new(None),
            deadline: RwLock::new(None),
            event_sender,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub async fn state(&self) -> ProvisioningState {
        *self.state.read().await
    }

    pub async fn networks(&self) -> Vec<String> {
        self.networks.read().await.clone()
    }

    pub async fn ssid(&self) -> Option<String> {
        self.ssid.read().await.clone()
    }

    pub async fn last_error(&self) -> Option<ConnectError> {
        self.last_error.read().await.clone()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProvisioningEvent> {
        self.event_sender.subscribe()
    }

    /// Take the scan-assisted path: ask the glasses for visible networks.
    pub async fn choose_scan(&self) -> Result<(), ProvisioningError> {
        {
            let state = *self.state.read().await;
            if state != ProvisioningState::SelectMethod {
                return Err(ProvisioningError::InvalidState(state));
            }
        }
        self.request_scan().await
    }

    /// Take the manual path: the user types SSID and password.
    pub async fn choose_manual(&self) -> Result<(), ProvisioningError> {
        {
            let mut state = self.state.write().await;
            if *state != ProvisioningState::SelectMethod {
                return Err(ProvisioningError::InvalidState(*state));
            }
            *state = ProvisioningState::EnterCredentials;
        }
        *self.ssid_editable.write().await = true;
        self.emit_credentials_required(None).await;
        Ok(())
    }

    /// Handle scan results from the glasses. An empty list is not an error;
    /// the user can rescan or fall back to manual entry.
    pub async fn on_scan_results(&self, reported: &[String]) {
        {
            let mut state = self.state.write().await;
            if *state != ProvisioningState::Scanning {
                log::debug!(
                    "provisioning {}: ignoring scan results in state {:?}",
                    self.id,
                    *state
                );
                return;
            }
            *state = ProvisioningState::NetworkList;
        }

        let networks = {
            let mut networks = self.networks.write().await;
            networks.clear();
            for ssid in reported {
                if !ssid.is_empty() && !networks.contains(ssid) {
                    networks.push(ssid.clone());
                }
            }
            networks.clone()
        };
        log::info!(
            "provisioning {}: {} networks visible",
            self.id,
            networks.len()
        );
        self.emit(ProvisioningEvent::NetworkList {
            session_id: self.id.clone(),
            networks,
            timestamp: Utc::now(),
        });
    }

    /// Run another scan pass from the network list.
    pub async fn rescan(&self) -> Result<(), ProvisioningError> {
        {
            let state = *self.state.read().await;
            if state != ProvisioningState::NetworkList {
                return Err(ProvisioningError::InvalidState(state));
            }
        }
        self.request_scan().await
    }

    /// Pick a network from the scan results. The SSID is pre-filled and
    /// locked; only the password is collected.
    pub async fn select_network(&self, ssid: &str) -> Result<(), ProvisioningError> {
        {
            let state = *self.state.read().await;
            if state != ProvisioningState::NetworkList {
                return Err(ProvisioningError::InvalidState(state));
            }
        }
        if !self.networks.read().await.iter().any(|n| n == ssid) {
            return Err(ProvisioningError::UnknownNetwork(ssid.to_string()));
        }
        *self.ssid.write().await = Some(ssid.to_string());
        *self.ssid_editable.write().await = false;
        *self.state.write().await = ProvisioningState::EnterCredentials;
        self.emit_credentials_required(None).await;
        Ok(())
    }

    /// Forward credentials to the glasses and wait for the join report.
    /// The password leaves this function and is not retained.
    pub async fn connect(&self, credentials: WifiCredentials) -> Result<(), ProvisioningError> {
        {
            let state = *self.state.read().await;
            if state != ProvisioningState::EnterCredentials {
                return Err(ProvisioningError::InvalidState(state));
            }
        }
        if credentials.ssid.trim().is_empty() {
            return Err(ProvisioningError::EmptySsid);
        }
        if !*self.ssid_editable.read().await {
            let selected = self.ssid.read().await.clone();
            if selected.as_deref() != Some(credentials.ssid.as_str()) {
                return Err(ProvisioningError::SsidLocked);
            }
        }

        self.bridge
            .send(BridgeCommand::SendWifiCredentials {
                ssid: credentials.ssid.clone(),
                password: credentials.password,
            })
            .map_err(ConnectError::from)?;

        *self.ssid.write().await = Some(credentials.ssid.clone());
        *self.last_error.write().await = None;
        *self.state.write().await = ProvisioningState::Connecting;
        *self.deadline.write().await = Some(Instant::now() + self.join_timeout);
        log::info!("provisioning {}: joining '{}'", self.id, credentials.ssid);
        self.emit(ProvisioningEvent::ConnectStarted {
            session_id: self.id.clone(),
            ssid: credentials.ssid,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Handle a WiFi status report from the glasses.
    pub async fn on_wifi_status(&self, connected: bool, ssid: Option<&str>) {
        {
            let state = *self.state.read().await;
            if state != ProvisioningState::Connecting {
                log::debug!(
                    "provisioning {}: ignoring wifi status in state {:?}",
                    self.id,
                    state
                );
                return;
            }
        }
        *self.deadline.write().await = None;
        if connected {
            *self.state.write().await = ProvisioningState::Connected;
            let ssid = match ssid {
                Some(s) => Some(s.to_string()),
                None => self.ssid.read().await.clone(),
            };
            log::info!("provisioning {}: joined {:?}", self.id, ssid);
            self.emit(ProvisioningEvent::Connected {
                session_id: self.id.clone(),
                ssid,
                timestamp: Utc::now(),
            });
        } else {
            // Back to credential entry with the SSID intact so the user only
            // retypes the password.
            *self.last_error.write().await = Some(ConnectError::CredentialRejected);
            *self.state.write().await = ProvisioningState::EnterCredentials;
            log::warn!("provisioning {}: credentials rejected", self.id);
            self.emit_credentials_required(Some(ConnectError::CredentialRejected))
                .await;
        }
    }

    /// Periodic deadline check. A silent join becomes a timeout back at
    /// credential entry; the deadline is consumed so it fires once.
    pub async fn tick(&self, now: Instant) {
        if *self.state.read().await != ProvisioningState::Connecting {
            return;
        }
        let expired = {
            let mut deadline = self.deadline.write().await;
            match *deadline {
                Some(d) if now >= d => {
                    *deadline = None;
                    true
                }
                _ => false,
            }
        };
        if !expired {
            return;
        }
        *self.last_error.write().await = Some(ConnectError::ProvisioningTimeout);
        *self.state.write().await = ProvisioningState::EnterCredentials;
        log::warn!("provisioning {}: join timed out", self.id);
        self.emit_credentials_required(Some(ConnectError::ProvisioningTimeout))
            .await;
    }

    /// The host lost its link to the bridge. The session cannot continue.
    pub async fn on_bridge_lost(&self) {
        {
            let mut state = self.state.write().await;
            if matches!(
                *state,
                ProvisioningState::Connected | ProvisioningState::Failed
            ) {
                return;
            }
            *state = ProvisioningState::Failed;
        }
        *self.deadline.write().await = None;
        *self.ssid.write().await = None;
        *self.last_error.write().await = Some(ConnectError::BridgeLost);
        self.emit(ProvisioningEvent::Failed {
            session_id: self.id.clone(),
            reason: ConnectError::BridgeLost.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Tear the session down, dropping any entered SSID.
    pub async fn cancel(&self) {
        *self.deadline.write().await = None;
        *self.ssid.write().await = None;
        self.networks.write().await.clear();
        *self.state.write().await = ProvisioningState::Failed;
        log::info!("provisioning {}: cancelled", self.id);
    }

    async fn request_scan(&self) -> Result<(), ProvisioningError> {
        self.bridge
            .send(BridgeCommand::RequestWifiScan)
            .map_err(ConnectError::from)?;
        *self.state.write().await = ProvisioningState::Scanning;
        self.emit(ProvisioningEvent::ScanStarted {
            session_id: self.id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn emit_credentials_required(&self, error: Option<ConnectError>) {
        self.emit(ProvisioningEvent::CredentialsRequired {
            session_id: self.id.clone(),
            ssid: self.ssid.read().await.clone(),
            ssid_editable: *self.ssid_editable.read().await,
            error: error.map(|e| e.to_string()),
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: ProvisioningEvent) {
        let _ = self.event_sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeError;
    use std::sync::Mutex;

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

    fn session() -> (ProvisioningSession, Arc<SpyBridge>) {
        let bridge = SpyBridge::new();
        let session = ProvisioningSession::new(bridge.clone(), defaults::JOIN_TIMEOUT);
        (session, bridge)
    }

    fn creds(ssid: &str, password: &str) -> WifiCredentials {
        WifiCredentials {
            ssid: ssid.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn scan_path_requests_a_scan() {
        let (session, bridge) = session();
        session.choose_scan().await.unwrap();

        assert_eq!(session.state().await, ProvisioningState::Scanning);
        assert_eq!(bridge.commands(), vec![BridgeCommand::RequestWifiScan]);
    }

    #[tokio::test]
    async fn scan_results_are_deduplicated_in_order() {
        let (session, _bridge) = session();
        session.choose_scan().await.unwrap();

        session
            .on_scan_results(&[
                "home".to_string(),
                "office".to_string(),
                "home".to_string(),
                String::new(),
                "cafe".to_string(),
            ])
            .await;

        assert_eq!(session.state().await, ProvisioningState::NetworkList);
        assert_eq!(session.networks().await, vec!["home", "office", "cafe"]);
    }

    #[tokio::test]
    async fn empty_scan_is_not_fatal_and_allows_rescan() {
        let (session, bridge) = session();
        session.choose_scan().await.unwrap();
        session.on_scan_results(&[]).await;

        assert_eq!(session.state().await, ProvisioningState::NetworkList);
        assert!(session.networks().await.is_empty());

        session.rescan().await.unwrap();
        assert_eq!(session.state().await, ProvisioningState::Scanning);
        assert_eq!(bridge.commands().len(), 2);
    }

    #[tokio::test]
    async fn selected_network_locks_the_ssid() {
        let (session, _bridge) = session();
        session.choose_scan().await.unwrap();
        session.on_scan_results(&["home".to_string()]).await;
        session.select_network("home").await.unwrap();

        assert_eq!(session.state().await, ProvisioningState::EnterCredentials);
        assert_eq!(session.ssid().await.as_deref(), Some("home"));

        // Connecting with a different SSID is rejected.
        assert!(matches!(
            session.connect(creds("other", "pw")).await,
            Err(ProvisioningError::SsidLocked)
        ));
    }

    #[tokio::test]
    async fn selecting_an_unknown_network_is_rejected() {
        let (session, _bridge) = session();
        session.choose_scan().await.unwrap();
        session.on_scan_results(&["home".to_string()]).await;

        assert!(matches!(
            session.select_network("ghost").await,
            Err(ProvisioningError::UnknownNetwork(_))
        ));
    }

    #[tokio::test]
    async fn manual_path_accepts_any_ssid() {
        let (session, bridge) = session();
        session.choose_manual().await.unwrap();
        session.connect(creds("hidden-net", "pw")).await.unwrap();

        assert_eq!(session.state().await, ProvisioningState::Connecting);
        assert_eq!(
            bridge.commands(),
            vec![BridgeCommand::SendWifiCredentials {
                ssid: "hidden-net".to_string(),
                password: "pw".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn empty_ssid_is_rejected() {
        let (session, _bridge) = session();
        session.choose_manual().await.unwrap();

        assert!(matches!(
            session.connect(creds("   ", "pw")).await,
            Err(ProvisioningError::EmptySsid)
        ));
        assert_eq!(session.state().await, ProvisioningState::EnterCredentials);
    }

    #[tokio::test]
    async fn successful_join_completes_the_session() {
        let (session, _bridge) = session();
        session.choose_manual().await.unwrap();
        session.connect(creds("home", "pw")).await.unwrap();

        session.on_wifi_status(true, Some("home")).await;
        assert_eq!(session.state().await, ProvisioningState::Connected);
    }

    #[tokio::test]
    async fn rejected_password_returns_to_entry_with_ssid_kept() {
        let (session, _bridge) = session();
        session.choose_scan().await.unwrap();
        session.on_scan_results(&["home".to_string()]).await;
        session.select_network("home").await.unwrap();
        session.connect(creds("home", "wrong")).await.unwrap();
        let mut events = session.subscribe();

        session.on_wifi_status(false, None).await;

        assert_eq!(session.state().await, ProvisioningState::EnterCredentials);
        assert_eq!(session.ssid().await.as_deref(), Some("home"));
        assert_eq!(
            session.last_error().await,
            Some(ConnectError::CredentialRejected)
        );
        match events.recv().await.unwrap() {
            ProvisioningEvent::CredentialsRequired { ssid, error, .. } => {
                assert_eq!(ssid.as_deref(), Some("home"));
                assert!(error.is_some());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn join_timeout_fires_once_and_returns_to_entry() {
        let (session, _bridge) = session();
        session.choose_manual().await.unwrap();
        session.connect(creds("home", "pw")).await.unwrap();
        let mut events = session.subscribe();

        let late = Instant::now() + Duration::from_secs(120);
        session.tick(late).await;
        session.tick(late).await;

        assert_eq!(session.state().await, ProvisioningState::EnterCredentials);
        assert_eq!(
            session.last_error().await,
            Some(ConnectError::ProvisioningTimeout)
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            ProvisioningEvent::CredentialsRequired { .. }
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_wifi_status_after_timeout_is_ignored() {
        let (session, _bridge) = session();
        session.choose_manual().await.unwrap();
        session.connect(creds("home", "pw")).await.unwrap();
        session.tick(Instant::now() + Duration::from_secs(120)).await;

        session.on_wifi_status(true, Some("home")).await;
        assert_eq!(session.state().await, ProvisioningState::EnterCredentials);
    }

    #[tokio::test]
    async fn bridge_loss_kills_the_session() {
        let (session, _bridge) = session();
        session.choose_manual().await.unwrap();
        session.connect(creds("home", "pw")).await.unwrap();

        session.on_bridge_lost().await;
        assert_eq!(session.state().await, ProvisioningState::Failed);
        assert_eq!(session.last_error().await, Some(ConnectError::BridgeLost));
        assert_eq!(session.ssid().await, None);
    }

    #[tokio::test]
    async fn connect_from_wrong_state_is_rejected() {
        let (session, _bridge) = session();
        assert!(matches!(
            session.connect(creds("home", "pw")).await,
            Err(ProvisioningError::InvalidState(
                ProvisioningState::SelectMethod
            ))
        ));
    }
}
