//! Wallet configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! allow_weak_storage = false
//!
//! [argon2]
//! m_cost = 65536
//! t_cost = 3
//! p_cost = 1
//!
//! [slots]
//! payload = "wallet.encryptedMnemonic"
//! ```
//!
//! Only the cost of *new* v2 payloads is configurable. The v1 scheme is
//! fixed, and every v2 payload records the Argon2 cost it was sealed with.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::kdf::Argon2Params;

/// Names of the storage slots the wallet persists into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotNames {
    /// The encrypted payload record.
    pub payload: String,
    /// Deprecated plaintext phrase (weak mode).
    pub legacy_mnemonic: String,
    /// Address and security level.
    pub identity: String,
    pub needs_backup: String,
    pub has_backed_up: String,
}

impl Default for SlotNames {
    fn default() -> Self {
        Self {
            payload: "wallet.encryptedMnemonic".into(),
            legacy_mnemonic: "wallet.legacyMnemonic".into(),
            identity: "wallet.identity".into(),
            needs_backup: "wallet.needsBackup".into(),
            has_backed_up: "wallet.hasBackedUp".into(),
        }
    }
}

impl SlotNames {
    fn all(&self) -> [&str; 5] {
        [
            &self.payload,
            &self.legacy_mnemonic,
            &self.identity,
            &self.needs_backup,
            &self.has_backed_up,
        ]
    }
}

/// Top-level wallet configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Permit creating or importing a wallet without a password, storing the
    /// phrase in the plaintext slot as `SecurityLevel::Weak`.
    pub allow_weak_storage: bool,
    /// Argon2id cost for new payloads.
    pub argon2: Argon2Params,
    pub slots: SlotNames,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            allow_weak_storage: true,
            argon2: Argon2Params::default(),
            slots: SlotNames::default(),
        }
    }
}

impl WalletConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, VaultError> {
        let config: Self = toml::from_str(source).map_err(|e| VaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VaultError> {
        let source = std::fs::read_to_string(path.as_ref())
            .map_err(|e| VaultError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&source)
    }

    /// Check Argon2 costs and slot names.
    pub fn validate(&self) -> Result<(), VaultError> {
        self.argon2.validate()?;

        let names = self.slots.all();
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                return Err(VaultError::Config(format!("invalid slot name: {name:?}")));
            }
            if names[..i].contains(name) {
                return Err(VaultError::Config(format!("duplicate slot name: {name:?}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(WalletConfig::from_toml_str("").unwrap(), WalletConfig::default());
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let config = WalletConfig::from_toml_str(
            r#"
            allow_weak_storage = false

            [argon2]
            m_cost = 1024
            t_cost = 2
            p_cost = 1

            [slots]
            payload = "custom.payload"
            "#,
        )
        .unwrap();
        assert!(!config.allow_weak_storage);
        assert_eq!(config.argon2.m_cost, 1024);
        assert_eq!(config.slots.payload, "custom.payload");
        assert_eq!(config.slots.identity, "wallet.identity");
    }

    #[test]
    fn invalid_argon2_cost_is_rejected() {
        let err = WalletConfig::from_toml_str("[argon2]\nm_cost = 1024\nt_cost = 0\np_cost = 1\n");
        assert!(matches!(err, Err(VaultError::Config(_))));
    }

    #[test]
    fn path_like_or_duplicate_slot_names_are_rejected() {
        assert!(WalletConfig::from_toml_str("[slots]\npayload = \"../escape\"\n").is_err());
        assert!(WalletConfig::from_toml_str("[slots]\nidentity = \"wallet.encryptedMnemonic\"\n").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.toml");
        std::fs::write(&path, "allow_weak_storage = false\n").unwrap();
        assert!(!WalletConfig::load(&path).unwrap().allow_weak_storage);
        assert!(WalletConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
