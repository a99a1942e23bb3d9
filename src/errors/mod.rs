//! Comprehensive error handling for the connectivity core.
//!
//! This module provides:
//! - Strongly-typed error kinds matching the bridge protocol
//! - User-facing error messages with actionable remediation
//! - Mapping from internal errors to user-friendly messages
//!
//! # Error Categories
//!
//! | Category     | Error Kinds                                | Typical Remediation  |
//! |--------------|--------------------------------------------|----------------------|
//! | Permissions  | E_PROXIMITY/LOCATION/MIC_PERMISSION        | Open system settings |
//! | Discovery    | E_DISCOVERY_EMPTY                          | Retry scan           |
//! | Pairing      | E_CONNECT_TIMEOUT, E_BRIDGE_LOST           | Retry, reconnect     |
//! | Provisioning | E_CREDENTIAL_REJECTED, E_PROVISIONING_TIMEOUT | Re-enter password |

mod kinds;
mod remediation;

pub use kinds::ErrorKind;
pub use remediation::{Remediation, SettingsPage};

use serde::Serialize;
use thiserror::Error;

use crate::permissions::Capability;

/// User-facing error with actionable information.
///
/// This struct is designed to be directly useful to the UI layer:
/// - `title` and `message` are human-readable
/// - `error_kind` links to the technical error for logging
/// - `remediation` tells the UI what action button to show
/// - `details` contains technical info for diagnostics (not shown to user)
#[derive(Debug, Clone, Serialize)]
pub struct UserError {
    /// Short error title (for notification headers, dialogs).
    pub title: String,
    /// User-friendly message explaining what happened.
    pub message: String,
    /// Technical error kind (for logging/diagnostics).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Suggested remediation action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<Remediation>,
    /// Technical details (not shown to user, for diagnostics).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl UserError {
    /// Create a new user error with all fields.
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        error_kind: Option<ErrorKind>,
        remediation: Option<Remediation>,
        details: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            error_kind,
            remediation,
            details,
        }
    }

    /// Create a simple user error with just title and message.
    pub fn simple(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            error_kind: None,
            remediation: None,
            details: None,
        }
    }

    /// Add remediation to an existing error.
    pub fn with_remediation(mut self, remediation: Remediation) -> Self {
        self.remediation = Some(remediation);
        self
    }

    /// Add technical details to an existing error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Add error kind to an existing error.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.error_kind = Some(kind);
        self
    }
}

/// Failure modes of the connectivity flows. Sessions record and return
/// these; the UI renders them through [`ConnectError::to_user_error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The user declined a required host capability.
    #[error("{0} permission denied")]
    PermissionDenied(Capability),
    /// A scan pass finished without finding any compatible device.
    #[error("no compatible devices found")]
    DiscoveryEmpty,
    /// The connect attempt passed its deadline without a device link.
    #[error("connect attempt timed out")]
    ConnectTimeout,
    /// The host lost its link to the connectivity bridge.
    #[error("bridge connection lost")]
    BridgeLost,
    /// The glasses rejected the supplied WiFi credentials.
    #[error("wifi credentials rejected")]
    CredentialRejected,
    /// The glasses never confirmed joining the network in time.
    #[error("wifi provisioning timed out")]
    ProvisioningTimeout,
    /// The bridge transport refused an outbound command.
    #[error("bridge unavailable: {0}")]
    Bridge(String),
}

impl ConnectError {
    /// The stable error kind for logging and analytics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectError::PermissionDenied(Capability::Proximity) => ErrorKind::ProximityPermission,
            ConnectError::PermissionDenied(Capability::Location) => ErrorKind::LocationPermission,
            ConnectError::PermissionDenied(Capability::Microphone) => ErrorKind::MicPermission,
            ConnectError::DiscoveryEmpty => ErrorKind::DiscoveryEmpty,
            ConnectError::ConnectTimeout => ErrorKind::ConnectTimeout,
            ConnectError::BridgeLost => ErrorKind::BridgeLost,
            ConnectError::CredentialRejected => ErrorKind::CredentialRejected,
            ConnectError::ProvisioningTimeout => ErrorKind::ProvisioningTimeout,
            ConnectError::Bridge(_) => ErrorKind::BridgeUnavailable,
        }
    }

    /// Convert to a user-facing error.
    pub fn to_user_error(&self) -> UserError {
        map_error_to_user_message(self)
    }
}

impl From<crate::bridge::BridgeError> for ConnectError {
    fn from(err: crate::bridge::BridgeError) -> Self {
        match err {
            crate::bridge::BridgeError::Unavailable(msg) => ConnectError::Bridge(msg),
        }
    }
}

fn permission_settings_page(capability: Capability) -> SettingsPage {
    match capability {
        Capability::Proximity => SettingsPage::BluetoothPermission,
        Capability::Location => SettingsPage::LocationPermission,
        Capability::Microphone => SettingsPage::MicrophonePermission,
    }
}

/// Map a connectivity error to a user-friendly message.
///
/// This is the central mapping function that converts internal errors
/// to user-facing messages. All remediation text is defined here for
/// easy maintenance and testing.
fn map_error_to_user_message(error: &ConnectError) -> UserError {
    match error {
        ConnectError::PermissionDenied(capability) => UserError::new(
            format!("{} Permission Required", capability.label()),
            format!(
                "{} access is required to connect your glasses. Click to open settings.",
                capability.label()
            ),
            Some(error.kind()),
            Some(Remediation::OpenSettings(permission_settings_page(
                *capability,
            ))),
            None,
        ),

        ConnectError::DiscoveryEmpty => UserError::new(
            "No Glasses Found",
            "No compatible glasses were found nearby. Make sure they are powered on and in range, then scan again.",
            Some(ErrorKind::DiscoveryEmpty),
            Some(Remediation::Retry),
            None,
        ),

        ConnectError::ConnectTimeout => UserError::new(
            "Glasses Not Connecting",
            "Your glasses are taking longer than expected to connect. You can keep waiting, try again, or get help.",
            Some(ErrorKind::ConnectTimeout),
            Some(Remediation::OpenUrl(
                "https://docs.puck.example/troubleshooting/pairing".to_string(),
            )),
            None,
        ),

        ConnectError::BridgeLost => UserError::new(
            "Connection Service Lost",
            "The connection to the glasses service was lost. Returning to the start screen.",
            Some(ErrorKind::BridgeLost),
            Some(Remediation::Reconnect),
            None,
        ),

        ConnectError::CredentialRejected => UserError::new(
            "WiFi Password Rejected",
            "The glasses could not join the network with that password. Check it and try again.",
            Some(ErrorKind::CredentialRejected),
            Some(Remediation::Retry),
            None,
        ),

        ConnectError::ProvisioningTimeout => UserError::new(
            "Network Join Timed Out",
            "The glasses never confirmed joining the network. Check the password and network, then try again.",
            Some(ErrorKind::ProvisioningTimeout),
            Some(Remediation::Retry),
            None,
        ),

        ConnectError::Bridge(message) => UserError::new(
            "Glasses Service Unavailable",
            "Could not reach the glasses service. Restart the application if this keeps happening.",
            Some(ErrorKind::BridgeUnavailable),
            Some(Remediation::RestartApp),
            Some(message.clone()),
        ),
    }
}

/// Map a bridge error kind string to a ConnectError.
///
/// This function is used when the bridge reports a failure event with an
/// `E_*` code instead of a structured payload.
pub fn from_bridge_error(kind: &str, message: &str) -> ConnectError {
    match ErrorKind::from_bridge(kind) {
        Some(ErrorKind::ProximityPermission) => {
            ConnectError::PermissionDenied(Capability::Proximity)
        }
        Some(ErrorKind::LocationPermission) => ConnectError::PermissionDenied(Capability::Location),
        Some(ErrorKind::MicPermission) => ConnectError::PermissionDenied(Capability::Microphone),
        Some(ErrorKind::DiscoveryEmpty) => ConnectError::DiscoveryEmpty,
        Some(ErrorKind::ConnectTimeout) => ConnectError::ConnectTimeout,
        Some(ErrorKind::BridgeLost) => ConnectError::BridgeLost,
        Some(ErrorKind::CredentialRejected) => ConnectError::CredentialRejected,
        Some(ErrorKind::ProvisioningTimeout) => ConnectError::ProvisioningTimeout,
        _ => ConnectError::Bridge(format!("{}: {}", kind, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_connect_errors_map_to_user_errors() {
        // Exhaustive test: every ConnectError variant must produce a valid UserError
        let errors = vec![
            ConnectError::PermissionDenied(Capability::Proximity),
            ConnectError::PermissionDenied(Capability::Location),
            ConnectError::PermissionDenied(Capability::Microphone),
            ConnectError::DiscoveryEmpty,
            ConnectError::ConnectTimeout,
            ConnectError::BridgeLost,
            ConnectError::CredentialRejected,
            ConnectError::ProvisioningTimeout,
            ConnectError::Bridge("transport closed".to_string()),
        ];

        for error in errors {
            let user_error = error.to_user_error();
            // Every error must have a non-empty title and message
            assert!(!user_error.title.is_empty(), "Missing title for {:?}", error);
            assert!(
                !user_error.message.is_empty(),
                "Missing message for {:?}",
                error
            );
            // Messages should not leak technical identifiers
            assert!(
                !user_error.message.contains("E_"),
                "Raw error code in message for {:?}",
                error
            );
        }
    }

    #[test]
    fn test_permission_errors_open_the_right_settings_page() {
        let cases = [
            (Capability::Proximity, SettingsPage::BluetoothPermission),
            (Capability::Location, SettingsPage::LocationPermission),
            (Capability::Microphone, SettingsPage::MicrophonePermission),
        ];
        for (capability, page) in cases {
            let user_error = ConnectError::PermissionDenied(capability).to_user_error();
            assert_eq!(
                user_error.remediation,
                Some(Remediation::OpenSettings(page))
            );
        }
    }

    #[test]
    fn test_user_error_serialization() {
        let error = UserError::new(
            "Test Error",
            "This is a test",
            Some(ErrorKind::Internal),
            Some(Remediation::Retry),
            Some("details".to_string()),
        );

        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("Test Error"));
        assert!(json.contains("This is a test"));
        assert!(json.contains("internal"));
        assert!(json.contains("retry"));
    }

    #[test]
    fn test_from_bridge_error() {
        let error = from_bridge_error("E_MIC_PERMISSION", "Permission denied");
        assert_eq!(
            error,
            ConnectError::PermissionDenied(Capability::Microphone)
        );

        let error = from_bridge_error("E_CREDENTIAL_REJECTED", "bad password");
        assert_eq!(error, ConnectError::CredentialRejected);

        let error = from_bridge_error("E_UNKNOWN", "Something went wrong");
        assert!(matches!(error, ConnectError::Bridge(_)));
    }

    #[test]
    fn test_kind_mapping_is_stable() {
        assert_eq!(
            ConnectError::PermissionDenied(Capability::Location).kind(),
            ErrorKind::LocationPermission
        );
        assert_eq!(ConnectError::BridgeLost.kind(), ErrorKind::BridgeLost);
        assert_eq!(
            ConnectError::Bridge("x".to_string()).kind(),
            ErrorKind::BridgeUnavailable
        );
    }
}
