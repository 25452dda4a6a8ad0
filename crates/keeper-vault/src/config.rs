//! Vault configuration.
//!
//! Settings live in the `[vault]` table of a TOML file. Every key is
//! optional; a missing file or table yields [`VaultConfig::default`].
//!
//! ```toml
//! [vault]
//! key_prefix = "credential-"
//! sentinel_tag = "-v4l1d"
//! max_pin_attempts = 3
//! storage_path = "data/credentials.json"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Runtime settings for a [`crate::CredentialKeeper`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Prefix of every storage key owned by the vault. `reset` deletes every
    /// key carrying it.
    pub key_prefix: String,
    /// Marker that a correctly decrypted PIN sentinel must contain.
    pub sentinel_tag: String,
    /// Failed PIN attempts allowed before the vault wipes itself.
    pub max_pin_attempts: u32,
    /// Location of the file-backed store.
    pub storage_path: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            key_prefix: "credential-".into(),
            sentinel_tag: "-v4l1d".into(),
            max_pin_attempts: 3,
            storage_path: PathBuf::from("data/credentials.json"),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    vault: VaultConfig,
}

impl VaultConfig {
    /// Parse the `[vault]` table out of TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        file.vault.validate()?;
        Ok(file.vault)
    }

    /// Load from `path`, falling back to defaults if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                tracing::debug!(path = %path.display(), "loading vault config");
                Self::from_toml(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reject settings that would make the vault unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_pin_attempts == 0 {
            return Err(VaultError::InvalidConfig {
                reason: "max_pin_attempts must be at least 1".into(),
            });
        }
        if self.key_prefix.is_empty() {
            return Err(VaultError::InvalidConfig {
                reason: "key_prefix must not be empty".into(),
            });
        }
        if self.sentinel_tag.is_empty() {
            return Err(VaultError::InvalidConfig {
                reason: "sentinel_tag must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_storage_format() {
        let config = VaultConfig::default();
        assert_eq!(config.key_prefix, "credential-");
        assert_eq!(config.sentinel_tag, "-v4l1d");
        assert_eq!(config.max_pin_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_table_keeps_other_defaults() {
        let config = VaultConfig::from_toml("[vault]\nmax_pin_attempts = 5\n").unwrap();
        assert_eq!(config.max_pin_attempts, 5);
        assert_eq!(config.key_prefix, "credential-");
    }

    #[test]
    fn missing_table_is_default() {
        let config = VaultConfig::from_toml("[other]\nx = 1\n").unwrap();
        assert_eq!(config, VaultConfig::default());
    }

    #[test]
    fn zero_attempts_rejected() {
        let result = VaultConfig::from_toml("[vault]\nmax_pin_attempts = 0\n");
        assert!(matches!(result, Err(VaultError::InvalidConfig { .. })));
    }

    #[test]
    fn malformed_toml_rejected() {
        let result = VaultConfig::from_toml("[vault\n");
        assert!(matches!(result, Err(VaultError::ConfigParse(_))));
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = VaultConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, VaultConfig::default());
    }
}
