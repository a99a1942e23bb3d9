//! Configuration persistence with atomic writes and migrations.
//!
//! Stores companion-app configuration in a JSON file with:
//! - Atomic writes (write temp, rename)
//! - Corruption fallback (regenerate defaults if parse fails)
//! - Schema versioning with migration support
//! - Platform-specific config paths
//!
//! WiFi credentials are deliberately absent from this file. Passwords are
//! forwarded to the glasses once and never written to disk.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::bridge::MicSource;

/// Current schema version.
const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Default config directory name.
const CONFIG_DIR_NAME: &str = "PuckCompanion";

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.json";

/// Root connectivity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Schema version for migrations.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Pairing flow settings.
    #[serde(default)]
    pub pairing: PairingConfig,

    /// WiFi provisioning settings.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    /// Remembered device settings.
    #[serde(default)]
    pub device: DeviceConfig,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            pairing: PairingConfig::default(),
            provisioning: ProvisioningConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl ConnectivityConfig {
    /// Validate and clamp config values to valid ranges.
    pub fn validate_and_clamp(&mut self) {
        self.pairing.connect_timeout_secs = self.pairing.connect_timeout_secs.clamp(5, 120);
        self.provisioning.join_timeout_secs = self.provisioning.join_timeout_secs.clamp(5, 120);

        // A remembered model name must be non-empty to be useful.
        if let Some(model) = self.device.last_connected_model.as_deref() {
            if model.trim().is_empty() {
                log::info!("Empty last_connected_model in config, clearing");
                self.device.last_connected_model = None;
            }
        }
    }
}

/// Pairing flow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Seconds to wait for a device link before offering the retry prompt.
    /// Clamped to 5-120.
    pub connect_timeout_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
        }
    }
}

/// WiFi provisioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Seconds to wait for the glasses to confirm joining a network.
    /// Clamped to 5-120.
    pub join_timeout_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            join_timeout_secs: 30,
        }
    }
}

/// Remembered device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Model name of the last successfully paired glasses.
    pub last_connected_model: Option<String>,
    /// Preferred microphone source.
    pub preferred_mic: MicSource,
    /// Whether onboard sensing is enabled.
    pub sensing_enabled: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            last_connected_model: None,
            preferred_mic: MicSource::Phone,
            sensing_enabled: true,
        }
    }
}

fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

/// Get the platform-specific config directory path.
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(CONFIG_DIR_NAME)
    }

    #[cfg(target_os = "windows")]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
    }

    #[cfg(target_os = "linux")]
    {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".config")
            })
            .join(CONFIG_DIR_NAME)
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        PathBuf::from(".").join(CONFIG_DIR_NAME)
    }
}

/// Get the full config file path.
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Load configuration from disk.
///
/// If the config file doesn't exist or is corrupted, returns defaults.
/// Corrupted files are backed up for debugging.
pub fn load_config() -> ConnectivityConfig {
    load_config_from_path(&config_path())
}

/// Load configuration from a specific path (for testing).
pub fn load_config_from_path(path: &PathBuf) -> ConnectivityConfig {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Value>(&content) {
            Ok(value) => {
                let mut config = migrate_config(value);
                config.validate_and_clamp();
                config
            }
            Err(e) => {
                log::error!("Config parse error, using defaults: {}", e);
                // Backup corrupt file for debugging
                let backup = path.with_extension("json.corrupt");
                if let Err(backup_err) = fs::rename(path, &backup) {
                    log::warn!("Failed to backup corrupt config: {}", backup_err);
                }
                ConnectivityConfig::default()
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("No config file found, using defaults");
            ConnectivityConfig::default()
        }
        Err(e) => {
            log::error!("Config read error, using defaults: {}", e);
            ConnectivityConfig::default()
        }
    }
}

/// Save configuration to disk atomically.
///
/// Writes to a temp file first, then renames to the final path.
pub fn save_config(config: &ConnectivityConfig) -> Result<(), ConfigError> {
    save_config_to_path(config, &config_path())
}

/// Save configuration to a specific path (for testing).
pub fn save_config_to_path(
    config: &ConnectivityConfig,
    path: &PathBuf,
) -> Result<(), ConfigError> {
    let temp = path.with_extension("json.tmp");

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Write to temp file
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&temp, &json)?;

    // Atomic rename
    fs::rename(&temp, path)?;

    Ok(())
}

/// Migrate configuration from older schema versions.
fn migrate_config(mut config: Value) -> ConnectivityConfig {
    if !config.is_object() {
        log::error!("Config root is not an object, using defaults");
        return ConnectivityConfig::default();
    }

    let version = config["schema_version"].as_u64().unwrap_or(0) as u32;

    // Migration v0 → v1: add sensing_enabled
    if version < 1 {
        if let Some(device) = config.get_mut("device") {
            if device.get("sensing_enabled").is_none() {
                device["sensing_enabled"] = serde_json::json!(true);
            }
        }
        config["schema_version"] = serde_json::json!(1);
        log::info!("Migrated config v0 → v1: added sensing_enabled");
    }

    // Future migrations go here:
    // if version < 2 { ... }

    serde_json::from_value(config).unwrap_or_else(|e| {
        log::error!("Config migration failed, using defaults: {}", e);
        ConnectivityConfig::default()
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ConnectivityConfig::default();
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.pairing.connect_timeout_secs, 30);
        assert_eq!(config.provisioning.join_timeout_secs, 30);
        assert!(config.device.last_connected_model.is_none());
        assert_eq!(config.device.preferred_mic, MicSource::Phone);
        assert!(config.device.sensing_enabled);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let mut config = ConnectivityConfig::default();
        config.pairing.connect_timeout_secs = 45;
        config.device.last_connected_model = Some("Puck Live".to_string());
        config.device.preferred_mic = MicSource::Device;
        config.device.sensing_enabled = false;

        // Save
        save_config_to_path(&config, &config_path).unwrap();

        // Verify file exists
        assert!(config_path.exists());

        // Load
        let loaded = load_config_from_path(&config_path);
        assert_eq!(loaded.pairing.connect_timeout_secs, 45);
        assert_eq!(
            loaded.device.last_connected_model,
            Some("Puck Live".to_string())
        );
        assert_eq!(loaded.device.preferred_mic, MicSource::Device);
        assert!(!loaded.device.sensing_enabled);
    }

    #[test]
    fn test_atomic_write_creates_temp() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let config = ConnectivityConfig::default();
        save_config_to_path(&config, &config_path).unwrap();

        // Temp file should not exist after successful save
        let temp_path = config_path.with_extension("json.tmp");
        assert!(!temp_path.exists());

        // Final file should exist
        assert!(config_path.exists());
    }

    #[test]
    fn test_corrupt_json_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        // Write invalid JSON
        fs::write(&config_path, "{ invalid json }").unwrap();

        // Load should return defaults
        let config = load_config_from_path(&config_path);
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);

        // Corrupt file should be backed up
        let backup_path = config_path.with_extension("json.corrupt");
        assert!(backup_path.exists());
        assert!(!config_path.exists());
    }

    #[test]
    fn test_non_object_root_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        // Valid JSON, but not an object.
        fs::write(&config_path, "[1, 2, 3]").unwrap();

        let config = load_config_from_path(&config_path);
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.pairing.connect_timeout_secs, 30);
    }

    #[test]
    fn test_valid_json_wrong_schema_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        // Write valid JSON with wrong types
        fs::write(
            &config_path,
            r#"{"schema_version": "not_a_number", "pairing": "wrong"}"#,
        )
        .unwrap();

        // Load should return defaults after migration fails
        let config = load_config_from_path(&config_path);
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_missing_file_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.json");

        let config = load_config_from_path(&config_path);
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert!(config.device.last_connected_model.is_none());
    }

    #[test]
    fn test_migration_v0_to_v1() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        // Write v0 config (no schema_version, no sensing_enabled)
        fs::write(
            &config_path,
            r#"{
                "pairing": {"connect_timeout_secs": 60},
                "device": {"last_connected_model": "Puck One"}
            }"#,
        )
        .unwrap();

        let config = load_config_from_path(&config_path);
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.pairing.connect_timeout_secs, 60);
        assert_eq!(
            config.device.last_connected_model,
            Some("Puck One".to_string())
        );
        assert!(config.device.sensing_enabled); // Should be added by migration
    }

    #[test]
    fn test_missing_optional_fields_get_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        // Write minimal valid config
        fs::write(&config_path, r#"{"schema_version": 1}"#).unwrap();

        let config = load_config_from_path(&config_path);
        assert_eq!(config.schema_version, 1);
        // All optional fields should have defaults
        assert_eq!(config.pairing.connect_timeout_secs, 30);
        assert_eq!(config.provisioning.join_timeout_secs, 30);
        assert_eq!(config.device.preferred_mic, MicSource::Phone);
    }

    #[test]
    fn test_timeout_clamping() {
        let mut config = ConnectivityConfig::default();

        // Test below minimum
        config.pairing.connect_timeout_secs = 1;
        config.validate_and_clamp();
        assert_eq!(config.pairing.connect_timeout_secs, 5);

        // Test above maximum
        config.provisioning.join_timeout_secs = 600;
        config.validate_and_clamp();
        assert_eq!(config.provisioning.join_timeout_secs, 120);

        // Test within range
        config.pairing.connect_timeout_secs = 40;
        config.validate_and_clamp();
        assert_eq!(config.pairing.connect_timeout_secs, 40);
    }

    #[test]
    fn test_empty_model_name_is_cleared() {
        let mut config = ConnectivityConfig::default();
        config.device.last_connected_model = Some("   ".to_string());

        config.validate_and_clamp();

        assert!(config.device.last_connected_model.is_none());
    }

    #[test]
    fn test_no_password_fields_in_serialized_config() {
        let config = ConnectivityConfig::default();
        let json = serde_json::to_string(&config).unwrap();

        assert!(json.contains("schema_version"));
        assert!(json.contains("pairing"));
        assert!(json.contains("provisioning"));
        assert!(!json.contains("password"));
        assert!(!json.contains("ssid"));
    }

    #[test]
    fn test_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir
            .path()
            .join("nested")
            .join("dirs")
            .join("config.json");

        let config = ConnectivityConfig::default();
        save_config_to_path(&config, &config_path).unwrap();

        assert!(config_path.exists());
    }

    #[test]
    fn test_mic_source_serialization() {
        assert_eq!(
            serde_json::to_string(&MicSource::Phone).unwrap(),
            "\"phone\""
        );
        let parsed: MicSource = serde_json::from_str("\"device\"").unwrap();
        assert_eq!(parsed, MicSource::Device);
    }
}
