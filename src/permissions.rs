// Permission gating for hardware access.
//
// Sessions never talk to the OS permission APIs directly. They hand the gate
// the set of capabilities they need and either proceed or surface the first
// denial. The gate owns the check/request ordering so callers cannot get it
// wrong: location is evaluated before proximity because proximity scans are
// refused by the OS until location is granted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

/// A host capability that gates hardware access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Nearby-device radio scanning (Bluetooth).
    Proximity,
    /// Coarse location, a precondition for proximity scans on most hosts.
    Location,
    /// Microphone capture for the voice pipeline.
    Microphone,
}

impl Capability {
    pub fn label(&self) -> &'static str {
        match self {
            Capability::Proximity => "Bluetooth",
            Capability::Location => "Location",
            Capability::Microphone => "Microphone",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Evaluation order for capability checks. Location must precede proximity;
/// everything else keeps this fixed order for predictable prompting.
const CHECK_ORDER: [Capability; 3] = [
    Capability::Location,
    Capability::Proximity,
    Capability::Microphone,
];

/// Host-OS permission surface. `check` is a passive status read; `request`
/// may show a system prompt and returns the outcome.
pub trait PermissionHost: Send + Sync {
    fn check_capability(&self, capability: Capability) -> bool;
    fn request_capability(&self, capability: Capability) -> bool;
}

/// Gate in front of the host permission APIs. Remembers the last observed
/// grant per capability so the UI can render state without re-prompting.
pub struct PermissionGate {
    host: Arc<dyn PermissionHost>,
    last_known: RwLock<HashMap<Capability, bool>>,
}

impl PermissionGate {
    pub fn new(host: Arc<dyn PermissionHost>) -> Self {
        Self {
            host,
            last_known: RwLock::new(HashMap::new()),
        }
    }

    /// Ensures every listed capability is granted, checking in the fixed
    /// order regardless of how the caller listed them. Stops at the first
    /// denial and returns the offending capability; later capabilities are
    /// not prompted for.
    pub fn ensure(&self, capabilities: &[Capability]) -> Result<(), Capability> {
        for capability in CHECK_ORDER {
            if !capabilities.contains(&capability) {
                continue;
            }
            let granted = if self.host.check_capability(capability) {
                true
            } else {
                log::info!("permission gate: requesting {}", capability);
                self.host.request_capability(capability)
            };
            self.last_known
                .write()
                .unwrap()
                .insert(capability, granted);
            if !granted {
                log::warn!("permission gate: {} denied", capability);
                return Err(capability);
            }
        }
        Ok(())
    }

    /// Last observed grant for a capability, if it has ever been evaluated.
    pub fn last_known(&self, capability: Capability) -> Option<bool> {
        self.last_known.read().unwrap().get(&capability).copied()
    }
}
