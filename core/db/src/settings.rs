//! Encrypted database settings.
//!
//! Settings live in one encrypted blob (`settings.json`) next to the
//! collection files. Loading them doubles as the unlock password check:
//! CBC decryption under a wrong key does not reliably fail on its own, so
//! the decrypted text must additionally parse as a JSON object before it is
//! accepted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::debug;

use curio_common::{Error, Result};
use curio_crypto::CryptoEngine;

/// Settings file name within a database directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// What clicking an item link does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickAction {
    Open,
    Copy,
}

/// Whether a link column is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkVisibility {
    Show,
    Hide,
}

/// Per-database configuration, stored encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSettings {
    #[serde(default = "default_image_quality")]
    pub image_quality: u8,
    #[serde(default = "default_click_action")]
    pub link_click_action: ClickAction,
    #[serde(default = "default_click_action")]
    pub patreon_click_action: ClickAction,
    #[serde(default = "default_visibility")]
    pub patreon_link_visibility: LinkVisibility,
    #[serde(default = "default_visibility")]
    pub www_link_visibility: LinkVisibility,
    #[serde(default = "default_visibility")]
    pub f95_link_visibility: LinkVisibility,
    #[serde(default = "default_visibility")]
    pub itch_link_visibility: LinkVisibility,
}

fn default_image_quality() -> u8 {
    70
}

fn default_click_action() -> ClickAction {
    ClickAction::Open
}

fn default_visibility() -> LinkVisibility {
    LinkVisibility::Show
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            image_quality: default_image_quality(),
            link_click_action: default_click_action(),
            patreon_click_action: default_click_action(),
            patreon_link_visibility: default_visibility(),
            www_link_visibility: default_visibility(),
            f95_link_visibility: default_visibility(),
            itch_link_visibility: default_visibility(),
        }
    }
}

/// Reads and writes the encrypted settings blob of one database.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store for the settings file under a database root.
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(SETTINGS_FILE),
        }
    }

    /// Settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encrypt and write the settings blob.
    pub async fn save(&self, engine: &CryptoEngine, settings: &DatabaseSettings) -> Result<()> {
        let plaintext =
            serde_json::to_string(settings).map_err(|e| Error::Serialization(e.to_string()))?;
        let encrypted = engine.encrypt_text(&plaintext)?;
        fs::write(&self.path, encrypted).await?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    /// Read and decrypt the settings blob.
    ///
    /// # Errors
    /// - `Io` if the file is missing
    /// - `Decrypt` if decryption fails or the plaintext is not a JSON object
    ///   (the structural check that rejects a wrong password)
    pub async fn load(&self, engine: &CryptoEngine) -> Result<DatabaseSettings> {
        let encrypted = fs::read_to_string(&self.path).await?;
        let plaintext = engine.decrypt_text(&encrypted)?;

        let value: Value = serde_json::from_str(&plaintext)
            .map_err(|_| Error::Decrypt("settings are not valid JSON".to_string()))?;
        if !value.is_object() {
            return Err(Error::Decrypt(
                "settings did not decrypt to a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CryptoEngine::from_password("pw");
        let store = SettingsStore::new(dir.path());

        let mut settings = DatabaseSettings::default();
        settings.image_quality = 85;
        settings.f95_link_visibility = LinkVisibility::Hide;
        store.save(&engine, &settings).await.unwrap();

        let loaded = store.load(&engine).await.unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_file_is_encrypted_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CryptoEngine::from_password("pw");
        let store = SettingsStore::new(dir.path());
        store
            .save(&engine, &DatabaseSettings::default())
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("imageQuality"));
        assert!(curio_crypto::TextEnvelope::is_envelope(&raw));
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        store
            .save(
                &CryptoEngine::from_password("right"),
                &DatabaseSettings::default(),
            )
            .await
            .unwrap();

        let result = store.load(&CryptoEngine::from_password("wrong")).await;
        assert!(matches!(result, Err(Error::Decrypt(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        let result = store.load(&CryptoEngine::from_password("pw")).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: DatabaseSettings =
            serde_json::from_str(r#"{"imageQuality": 50}"#).unwrap();
        assert_eq!(settings.image_quality, 50);
        assert_eq!(settings.link_click_action, ClickAction::Open);
        assert_eq!(settings.itch_link_visibility, LinkVisibility::Show);
    }
}
