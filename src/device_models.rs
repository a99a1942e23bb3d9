//! Per-model capability table for supported glasses.

use once_cell::sync::Lazy;
use serde::Deserialize;

/// Canonical manifest shared with the bridge and docs.
const DEVICE_MODELS_JSON: &str = include_str!("../shared/device_models.json");

/// What the pairing and provisioning flows need to know about a model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelCapabilities {
    pub model_name: String,
    /// Whether discovery must present a device list before pairing. Models
    /// with `false` report the selection-not-required sentinel instead.
    pub requires_device_selection: bool,
    /// Whether the model has its own WiFi radio that needs provisioning.
    pub requires_wifi: bool,
}

#[derive(Debug, Deserialize)]
struct DeviceModelManifest {
    models: Vec<ModelCapabilities>,
}

static MODEL_TABLE: Lazy<Vec<ModelCapabilities>> = Lazy::new(|| {
    match serde_json::from_str::<DeviceModelManifest>(DEVICE_MODELS_JSON) {
        Ok(manifest) => manifest.models,
        Err(error) => {
            log::warn!(
                "Failed to parse device_models.json: {}; capability table is empty",
                error
            );
            Vec::new()
        }
    }
});

/// Look up the capabilities of a model by name. Unknown models get the
/// conservative defaults: a selection step is required and no WiFi radio
/// is assumed.
pub fn capabilities_for(model_name: &str) -> ModelCapabilities {
    MODEL_TABLE
        .iter()
        .find(|m| m.model_name == model_name)
        .cloned()
        .unwrap_or_else(|| {
            log::debug!("unknown device model '{}'; using defaults", model_name);
            ModelCapabilities {
                model_name: model_name.to_string(),
                requires_device_selection: true,
                requires_wifi: false,
            }
        })
}

/// All models the manifest knows about.
pub fn known_models() -> &'static [ModelCapabilities] {
    &MODEL_TABLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parses_and_is_nonempty() {
        assert!(!known_models().is_empty());
    }

    #[test]
    fn test_wifi_model_from_manifest() {
        let caps = capabilities_for("Puck Live");
        assert!(caps.requires_device_selection);
        assert!(caps.requires_wifi);
    }

    #[test]
    fn test_selection_free_model_from_manifest() {
        let caps = capabilities_for("Puck Ultra");
        assert!(!caps.requires_device_selection);
    }

    #[test]
    fn test_unknown_model_gets_conservative_defaults() {
        let caps = capabilities_for("Someone Else's Glasses");
        assert!(caps.requires_device_selection);
        assert!(!caps.requires_wifi);
    }
}
