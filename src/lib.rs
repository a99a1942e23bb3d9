//! Puck Companion - device connectivity core
//!
//! This library drives pairing, WiFi provisioning and connection-status
//! aggregation for Puck smart glasses. The host application supplies a
//! [`bridge::Bridge`] implementation (the transport toward the glasses
//! service) and a [`permissions::PermissionHost`] (the OS permission
//! surface); everything else lives here:
//!
//! - [`discovery`]: one scan pass per target model, with deduplicated
//!   results and an empty-scan retry prompt
//! - [`pairing`]: the connect attempt, deadline escalation and forget flow
//! - [`provisioning`]: getting WiFi-capable glasses onto a network
//! - [`status`]: the single connection snapshot the UI renders
//! - [`manager`]: the facade wiring sessions to the event bus

pub mod bridge;
pub mod config;
pub mod device_models;
pub mod discovery;
pub mod errors;
pub mod event_seq;
pub mod events;
pub mod manager;
pub mod pairing;
pub mod permissions;
pub mod provisioning;
pub mod status;

pub use bridge::{Bridge, BridgeCommand, BridgeError, MicSource};
pub use errors::{ConnectError, ErrorKind, Remediation, UserError};
pub use events::EventBus;
pub use manager::{ConnectivityManager, ManagerError};
pub use permissions::{Capability, PermissionGate, PermissionHost};
pub use status::{ConnectionSnapshot, ConnectionStatusAggregator};

/// Initialize logging for the host process. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
