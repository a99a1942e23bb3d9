//! Error kind definitions shared with the bridge protocol.
//!
//! These error kinds correspond to the `E_*` codes carried on failure
//! events from the connectivity bridge.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kinds that can occur during connectivity flows.
///
/// These are stable identifiers that can be used for:
/// - Logging and diagnostics
/// - Error tracking/analytics
/// - Matching errors to remediation text
///
/// The string representation matches the bridge's `E_*` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // === Permission Errors ===
    /// Bluetooth/proximity permission denied by OS.
    ProximityPermission,
    /// Location permission denied by OS.
    LocationPermission,
    /// Microphone permission denied by OS.
    MicPermission,

    // === Discovery Errors ===
    /// A scan pass finished without finding any compatible device.
    DiscoveryEmpty,

    // === Pairing Errors ===
    /// The connect attempt passed its deadline without a device link.
    ConnectTimeout,
    /// The host lost its link to the connectivity bridge.
    BridgeLost,
    /// A pairing attempt is already in progress.
    AlreadyConnecting,

    // === Provisioning Errors ===
    /// The glasses rejected the supplied WiFi credentials.
    CredentialRejected,
    /// The glasses never confirmed joining the network in time.
    ProvisioningTimeout,

    // === Transport Errors ===
    /// The bridge transport refused the command.
    BridgeUnavailable,

    // === Internal Errors ===
    /// Internal error.
    Internal,
}

impl ErrorKind {
    /// Convert a bridge error kind string to an ErrorKind.
    ///
    /// Returns `None` if the string is not a recognized error kind.
    pub fn from_bridge(kind: &str) -> Option<Self> {
        match kind {
            "E_PROXIMITY_PERMISSION" => Some(Self::ProximityPermission),
            "E_LOCATION_PERMISSION" => Some(Self::LocationPermission),
            "E_MIC_PERMISSION" => Some(Self::MicPermission),
            "E_DISCOVERY_EMPTY" => Some(Self::DiscoveryEmpty),
            "E_CONNECT_TIMEOUT" => Some(Self::ConnectTimeout),
            "E_BRIDGE_LOST" => Some(Self::BridgeLost),
            "E_ALREADY_CONNECTING" => Some(Self::AlreadyConnecting),
            "E_CREDENTIAL_REJECTED" => Some(Self::CredentialRejected),
            "E_PROVISIONING_TIMEOUT" => Some(Self::ProvisioningTimeout),
            "E_BRIDGE_UNAVAILABLE" => Some(Self::BridgeUnavailable),
            "E_INTERNAL" => Some(Self::Internal),
            _ => None,
        }
    }

    /// Convert to the bridge error kind string (E_* format).
    pub fn to_bridge(&self) -> &'static str {
        match self {
            Self::ProximityPermission => "E_PROXIMITY_PERMISSION",
            Self::LocationPermission => "E_LOCATION_PERMISSION",
            Self::MicPermission => "E_MIC_PERMISSION",
            Self::DiscoveryEmpty => "E_DISCOVERY_EMPTY",
            Self::ConnectTimeout => "E_CONNECT_TIMEOUT",
            Self::BridgeLost => "E_BRIDGE_LOST",
            Self::AlreadyConnecting => "E_ALREADY_CONNECTING",
            Self::CredentialRejected => "E_CREDENTIAL_REJECTED",
            Self::ProvisioningTimeout => "E_PROVISIONING_TIMEOUT",
            Self::BridgeUnavailable => "E_BRIDGE_UNAVAILABLE",
            Self::Internal => "E_INTERNAL",
        }
    }

    /// Check if this error kind is recoverable (user can retry in place).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryEmpty
                | Self::ConnectTimeout
                | Self::CredentialRejected
                | Self::ProvisioningTimeout
        )
    }

    /// Check if this error kind requires user action (permissions, settings).
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Self::ProximityPermission | Self::LocationPermission | Self::MicPermission
        )
    }

    /// Check if this error kind tears down every active session.
    pub fn is_fatal_to_sessions(&self) -> bool {
        matches!(self, Self::BridgeLost)
    }

    /// Check if this error kind is internal (should be logged, not shown to user).
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bridge())
    }
}
