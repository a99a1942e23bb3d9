//! Remediation types and actions for error recovery.
//!
//! This module defines the possible actions a user can take to recover
//! from an error. The UI layer uses these to render appropriate buttons
//! and handle user interactions.

use serde::{Deserialize, Serialize};

/// Settings pages that can be opened for remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsPage {
    /// General application settings.
    General,
    /// Bluetooth/proximity permission (OS settings).
    BluetoothPermission,
    /// Location permission (OS settings).
    LocationPermission,
    /// Microphone permission (OS settings).
    MicrophonePermission,
    /// WiFi settings of the host device.
    WifiSettings,
}

impl SettingsPage {
    /// Get the OS-specific deep link URL for this settings page.
    ///
    /// Returns `None` if no deep link is available for the current platform.
    pub fn deep_link(&self) -> Option<&'static str> {
        match self {
            // macOS deep links
            #[cfg(target_os = "macos")]
            Self::BluetoothPermission => {
                Some("x-apple.systempreferences:com.apple.preference.security?Privacy_Bluetooth")
            }
            #[cfg(target_os = "macos")]
            Self::LocationPermission => Some(
                "x-apple.systempreferences:com.apple.preference.security?Privacy_LocationServices",
            ),
            #[cfg(target_os = "macos")]
            Self::MicrophonePermission => {
                Some("x-apple.systempreferences:com.apple.preference.security?Privacy_Microphone")
            }
            #[cfg(target_os = "macos")]
            Self::WifiSettings => Some("x-apple.systempreferences:com.apple.preference.network"),

            // Windows deep links
            #[cfg(target_os = "windows")]
            Self::BluetoothPermission => Some("ms-settings:privacy-radios"),
            #[cfg(target_os = "windows")]
            Self::LocationPermission => Some("ms-settings:privacy-location"),
            #[cfg(target_os = "windows")]
            Self::MicrophonePermission => Some("ms-settings:privacy-microphone"),
            #[cfg(target_os = "windows")]
            Self::WifiSettings => Some("ms-settings:network-wifi"),

            // In-app settings (no deep link needed)
            Self::General => None,

            // Platform-specific settings on other platforms
            #[cfg(not(any(target_os = "macos", target_os = "windows")))]
            _ => None,
        }
    }

    /// Get a human-readable description of how to access this setting.
    pub fn instructions(&self) -> &'static str {
        match self {
            Self::General => "Open Puck Companion Settings",
            #[cfg(target_os = "macos")]
            Self::BluetoothPermission => {
                "Open System Preferences → Security & Privacy → Privacy → Bluetooth"
            }
            #[cfg(target_os = "macos")]
            Self::LocationPermission => {
                "Open System Preferences → Security & Privacy → Privacy → Location Services"
            }
            #[cfg(target_os = "macos")]
            Self::MicrophonePermission => {
                "Open System Preferences → Security & Privacy → Privacy → Microphone"
            }
            #[cfg(target_os = "macos")]
            Self::WifiSettings => "Open System Preferences → Network",
            #[cfg(target_os = "windows")]
            Self::BluetoothPermission => "Open Settings → Privacy → Other devices",
            #[cfg(target_os = "windows")]
            Self::LocationPermission => "Open Settings → Privacy → Location",
            #[cfg(target_os = "windows")]
            Self::MicrophonePermission => "Open Settings → Privacy → Microphone",
            #[cfg(target_os = "windows")]
            Self::WifiSettings => "Open Settings → Network & Internet → Wi-Fi",
            #[cfg(not(any(target_os = "macos", target_os = "windows")))]
            Self::BluetoothPermission
            | Self::LocationPermission
            | Self::MicrophonePermission
            | Self::WifiSettings => "Check your system's privacy settings",
        }
    }
}

/// Suggested remediation action for an error.
///
/// The UI layer should render appropriate controls based on this enum:
/// - `OpenSettings`: Open a settings panel (in-app or system)
/// - `OpenUrl`: Open a URL in the browser
/// - `Retry`: Show a "Try Again" button
/// - `Reconnect`: Re-establish the bridge link and start over
/// - `RestartApp`: Restart the entire application
/// - `None`: No specific action available
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Remediation {
    /// Open a settings page (in-app or system).
    OpenSettings(SettingsPage),
    /// Open a URL in the default browser.
    OpenUrl(String),
    /// Retry the failed operation.
    Retry,
    /// Re-establish the bridge link and return to the start screen.
    Reconnect,
    /// Restart the entire application.
    RestartApp,
}

impl Remediation {
    /// Get a human-readable label for the action button.
    pub fn button_label(&self) -> &str {
        match self {
            Self::OpenSettings(_) => "Open Settings",
            Self::OpenUrl(_) => "Learn More",
            Self::Retry => "Try Again",
            Self::Reconnect => "Reconnect",
            Self::RestartApp => "Restart App",
        }
    }

    /// Check if this remediation requires user interaction.
    ///
    /// `Retry` and `Reconnect` can be automated in some cases.
    pub fn requires_user_interaction(&self) -> bool {
        matches!(
            self,
            Self::OpenSettings(_) | Self::OpenUrl(_) | Self::RestartApp
        )
    }

    /// Check if this remediation can be automatically attempted.
    pub fn can_auto_retry(&self) -> bool {
        matches!(self, Self::Retry | Self::Reconnect)
    }
}
