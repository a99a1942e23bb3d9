//! Pairing session for a selected glasses device.
//!
//! Owns the connect attempt from permission gating to a confirmed device
//! link:
//! - Permission gate over proximity, location, and microphone
//! - Fire-and-forget connect command with a stored deadline
//! - Deadline escalation to a keep-waiting/retry prompt, never an auto-fail
//! - Bridge loss always wins over a pending timeout
//! - Forget flow that unpairs and waits for the link-down report

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::bridge::{Bridge, BridgeCommand, MicSource};
use crate::errors::ConnectError;
use crate::events::ConnectionStatusEvent;
use crate::permissions::{Capability, PermissionGate};

/// Session identifier (UUID v4).
pub type SessionId = String;

/// Default configuration values.
pub mod defaults {
    use std::time::Duration;

    /// How long a connect attempt may run before the escalation prompt.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Pairing session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingState {
    /// No attempt in flight.
    Idle,
    /// Waiting for the permission gate.
    AwaitingPermissions,
    /// Connect command sent, waiting for a device link.
    Connecting,
    /// Device link confirmed.
    Connected,
    /// Attempt ended in failure; see [`PairingSession::failure`].
    Failed,
    /// Forget requested, waiting for the link-down report.
    Forgetting,
}

/// User decision at the connect-timeout prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectPromptDecision {
    /// Send the connect command again with a fresh deadline.
    Retry,
    /// Keep waiting; the UI shows troubleshooting help meanwhile.
    OpenHelp,
    /// Give up and record a timeout failure.
    Abort,
}

/// Pairing session event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PairingEvent {
    /// Connect command sent.
    Started {
        session_id: SessionId,
        model_name: String,
        timestamp: DateTime<Utc>,
    },
    /// Device link confirmed.
    Connected {
        session_id: SessionId,
        model_name: String,
        timestamp: DateTime<Utc>,
    },
    /// Attempt failed.
    Failed {
        session_id: SessionId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// Deadline passed; the keep-waiting prompt is showing.
    ConnectPrompt {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
    /// Forget command sent; waiting for link down.
    ForgetRequested {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
    /// Forget completed; session is clean.
    Reset {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
}

/// Pairing session errors.
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("Another pairing attempt is in progress")]
    AlreadyConnecting,

    #[error("Invalid state for operation: {0:?}")]
    InvalidState(PairingState),

    #[error("No timeout prompt is pending")]
    NoPromptPending,

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// One connect attempt toward a specific device.
pub struct PairingSession {
    id: SessionId,
    target_model: String,
    target_address: Option<String>,
    bridge: Arc<dyn Bridge>,
    gate: Arc<PermissionGate>,
    connect_timeout: Duration,
    state: RwLock<PairingState>,
    failure: RwLock<Option<ConnectError>>,
    /// Deadline for the current connect attempt. Cleared on resolution.
    deadline: RwLock<Option<Instant>>,
    /// Whether the escalation prompt already fired for this deadline.
    prompt_fired: RwLock<bool>,
    event_sender: broadcast::Sender<PairingEvent>,
}

impl PairingSession {
    pub fn new(
        target_model: impl Into<String>,
        target_address: Option<String>,
        bridge: Arc<dyn Bridge>,
        gate: Arc<PermissionGate>,
        connect_timeout: Duration,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(32);
        Self {
            id: Uuid::new_v4().to_string(),
            target_model: target_model.into(),
            target_address,
            bridge,
            gate,
            connect_timeout,
            state: RwLock::new(PairingState::Idle),
            failure: RwLock::new(None),
            deadline: RwLock::new(None),
            prompt_fired: RwLock::new(false),
            event_sender,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn target_model(&self) -> &str {
        &self.target_model
    }

    pub async fn state(&self) -> PairingState {
        *self.state.read().await
    }

    /// Why the session failed, if it did.
    pub async fn failure(&self) -> Option<ConnectError> {
        self.failure.read().await.clone()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<PairingEvent> {
        self.event_sender.subscribe()
    }

    /// Run the permission gate and send the connect command. The host mic is
    /// selected for the attempt so audio keeps flowing while the device link
    /// comes up.
    pub async fn begin(&self, mic_source: MicSource) -> Result<(), PairingError> {
        {
            let mut state = self.state.write().await;
            match *state {
                PairingState::Idle => *state = PairingState::AwaitingPermissions,
                PairingState::Connecting | PairingState::AwaitingPermissions => {
                    return Err(PairingError::AlreadyConnecting)
                }
                other => return Err(PairingError::InvalidState(other)),
            }
        }
        // A cancelled attempt may leave a recorded failure behind.
        *self.failure.write().await = None;

        if let Err(capability) = self.gate.ensure(&[
            Capability::Location,
            Capability::Proximity,
            Capability::Microphone,
        ]) {
            let error = ConnectError::PermissionDenied(capability);
            self.fail(error.clone()).await;
            return Err(error.into());
        }

        if let Err(e) = self
            .bridge
            .send(BridgeCommand::SetPreferredMicrophone { source: mic_source })
            .and_then(|_| {
                self.bridge.send(BridgeCommand::ConnectDevice {
                    model_name: self.target_model.clone(),
                    device_address: self.target_address.clone(),
                })
            })
        {
            let error = ConnectError::from(e);
            self.fail(error.clone()).await;
            return Err(error.into());
        }

        *self.state.write().await = PairingState::Connecting;
        *self.deadline.write().await = Some(Instant::now() + self.connect_timeout);
        *self.prompt_fired.write().await = false;
        log::info!(
            "pairing {}: connecting to {} ({:?})",
            self.id,
            self.target_model,
            self.target_address
        );
        self.emit(PairingEvent::Started {
            session_id: self.id.clone(),
            model_name: self.target_model.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Handle a connection-status report routed from the aggregator.
    pub async fn on_status(&self, event: &ConnectionStatusEvent) {
        let state = *self.state.read().await;
        match state {
            PairingState::Connecting => {
                let matches_target = event.device_link
                    && event.device_model.as_deref() == Some(self.target_model.as_str());
                if matches_target {
                    *self.state.write().await = PairingState::Connected;
                    *self.deadline.write().await = None;
                    log::info!("pairing {}: {} connected", self.id, self.target_model);
                    self.emit(PairingEvent::Connected {
                        session_id: self.id.clone(),
                        model_name: self.target_model.clone(),
                        timestamp: Utc::now(),
                    });
                }
            }
            PairingState::Connected => {
                if !event.device_link {
                    // Link dropped outside a forget flow. The attempt is over;
                    // the caller decides whether to start a new one.
                    log::warn!("pairing {}: device link lost", self.id);
                    self.fail(ConnectError::BridgeLost).await;
                }
            }
            PairingState::Forgetting => {
                if !event.device_link {
                    *self.state.write().await = PairingState::Idle;
                    log::info!("pairing {}: forget completed", self.id);
                    self.emit(PairingEvent::Reset {
                        session_id: self.id.clone(),
                        timestamp: Utc::now(),
                    });
                }
            }
            _ => {}
        }
    }

    /// The host lost its link to the bridge. Fatal for the attempt no matter
    /// what else is pending; a deadline in the same tick loses.
    pub async fn on_bridge_lost(&self) {
        let state = *self.state.read().await;
        if matches!(state, PairingState::Idle | PairingState::Failed) {
            return;
        }
        self.fail(ConnectError::BridgeLost).await;
    }

    /// Periodic deadline check. Fires the escalation prompt exactly once per
    /// deadline; the attempt itself keeps running.
    pub async fn tick(&self, now: Instant) {
        if *self.state.read().await != PairingState::Connecting {
            return;
        }
        let expired = self
            .deadline
            .read()
            .await
            .map(|deadline| now >= deadline)
            .unwrap_or(false);
        if !expired {
            return;
        }
        {
            let mut fired = self.prompt_fired.write().await;
            if *fired {
                return;
            }
            *fired = true;
        }
        log::info!("pairing {}: connect deadline passed", self.id);
        self.emit(PairingEvent::ConnectPrompt {
            session_id: self.id.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Resolve the connect-timeout prompt.
    pub async fn resolve_connect_prompt(
        &self,
        decision: ConnectPromptDecision,
    ) -> Result<(), PairingError> {
        {
            let state = *self.state.read().await;
            if state != PairingState::Connecting {
                return Err(PairingError::InvalidState(state));
            }
            if !*self.prompt_fired.read().await {
                return Err(PairingError::NoPromptPending);
            }
        }
        match decision {
            ConnectPromptDecision::Retry => {
                self.bridge
                    .send(BridgeCommand::ConnectDevice {
                        model_name: self.target_model.clone(),
                        device_address: self.target_address.clone(),
                    })
                    .map_err(ConnectError::from)?;
                *self.deadline.write().await = Some(Instant::now() + self.connect_timeout);
                *self.prompt_fired.write().await = false;
                log::info!("pairing {}: retrying connect", self.id);
            }
            ConnectPromptDecision::OpenHelp => {
                // The attempt keeps running; the UI opens troubleshooting.
            }
            ConnectPromptDecision::Abort => {
                self.fail(ConnectError::ConnectTimeout).await;
            }
        }
        Ok(())
    }

    /// Unpair the connected device. The session stays in Forgetting until
    /// the aggregator reports the link down.
    pub async fn forget(&self) -> Result<(), PairingError> {
        {
            let state = *self.state.read().await;
            if state != PairingState::Connected {
                return Err(PairingError::InvalidState(state));
            }
        }
        self.bridge
            .send(BridgeCommand::ForgetDevice)
            .and_then(|_| self.bridge.send(BridgeCommand::DisconnectDevice))
            .map_err(ConnectError::from)?;
        *self.state.write().await = PairingState::Forgetting;
        log::info!("pairing {}: forgetting {}", self.id, self.target_model);
        self.emit(PairingEvent::ForgetRequested {
            session_id: self.id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Tear the session down without recording a failure. Idempotent.
    pub async fn cancel(&self) {
        let mut state = self.state.write().await;
        if *state == PairingState::Idle {
            return;
        }
        *state = PairingState::Idle;
        drop(state);
        *self.deadline.write().await = None;
    }

    async fn fail(&self, error: ConnectError) {
        *self.state.write().await = PairingState::Failed;
        *self.deadline.write().await = None;
        *self.failure.write().await = Some(error.clone());
        log::warn!("pairing {}: failed: {}", self.id, error);
        self.emit(PairingEvent::Failed {
            session_id: self.id.clone(),
            reason: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: PairingEvent) {
        let _ = self.event_sender.send(event);
    }
}
