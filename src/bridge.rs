// Outbound command surface toward the connectivity bridge.
//
// The bridge is the host-side transport that talks to the glasses hardware
// and the cloud session. Every command is fire-and-forget: outcomes surface
// as events on the bus, never as return values here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel device address reported during discovery when the target model
/// needs no device-selection step before pairing.
pub const ADDRESS_NOT_REQUIRED: &str = "selection_not_required";

/// Which microphone feeds the audio pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicSource {
    /// The host phone's own microphone.
    Phone,
    /// The onboard microphone of the glasses.
    Device,
}

/// Commands accepted by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "command", content = "params")]
pub enum BridgeCommand {
    SearchForCompatibleDevices {
        model_name: String,
    },
    ConnectDevice {
        model_name: String,
        /// None when the model reported `ADDRESS_NOT_REQUIRED` during discovery.
        device_address: Option<String>,
    },
    DisconnectDevice,
    ForgetDevice,
    SetPreferredMicrophone {
        source: MicSource,
    },
    RequestWifiScan,
    SendWifiCredentials {
        ssid: String,
        password: String,
    },
}

impl BridgeCommand {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            BridgeCommand::SearchForCompatibleDevices { .. } => "search_for_compatible_devices",
            BridgeCommand::ConnectDevice { .. } => "connect_device",
            BridgeCommand::DisconnectDevice => "disconnect_device",
            BridgeCommand::ForgetDevice => "forget_device",
            BridgeCommand::SetPreferredMicrophone { .. } => "set_preferred_microphone",
            BridgeCommand::RequestWifiScan => "request_wifi_scan",
            BridgeCommand::SendWifiCredentials { .. } => "send_wifi_credentials",
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge transport unavailable: {0}")]
    Unavailable(String),
}

/// Command sink toward the bridge. Implementations must not block; queuing
/// or dropping on a dead transport is the implementation's call, but a dead
/// transport should return `BridgeError::Unavailable` so sessions can fail
/// fast instead of waiting out their deadlines.
pub trait Bridge: Send + Sync {
    fn send(&self, command: BridgeCommand) -> Result<(), BridgeError>;
}
