//! Service configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! database_path = "/var/lib/ezlock/ezlock.db"
//! card_name_template = "{name}'s card {n}"
//!
//! [opcodes]
//! open = "open"
//! get_log = "getlog"
//! add_card = "addcard"
//! del_card_prefix = "delcard:"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EzlockError, Result};

/// Configuration for the EZLock service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EzlockConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Opcodes understood by the lock firmware.
    pub opcodes: OpcodeConfig,
    /// Name given to enrolled cards. `{name}` is the enrolling principal's
    /// display name, `{n}` the number of cards already on the lock.
    pub card_name_template: String,
}

impl Default for EzlockConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("ezlock.db"),
            opcodes: OpcodeConfig::default(),
            card_name_template: "{name}'s card {n}".to_string(),
        }
    }
}

/// Command opcodes, as the lock firmware spells them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpcodeConfig {
    pub open: String,
    pub get_log: String,
    pub add_card: String,
    /// Followed directly by the card number.
    pub del_card_prefix: String,
}

impl Default for OpcodeConfig {
    fn default() -> Self {
        Self {
            open: "open".to_string(),
            get_log: "getlog".to_string(),
            add_card: "addcard".to_string(),
            del_card_prefix: "delcard:".to_string(),
        }
    }
}

impl EzlockConfig {
    /// Parse from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| EzlockError::Config(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EzlockError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Render the name of a newly enrolled card.
    pub fn card_name(&self, display_name: &str, existing_cards: u64) -> String {
        self.card_name_template
            .replace("{name}", display_name)
            .replace("{n}", &existing_cards.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EzlockConfig::from_toml_str("").unwrap(), EzlockConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = EzlockConfig::from_toml_str(
            r#"
            database_path = "/tmp/locks.db"

            [opcodes]
            open = "unlock"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/locks.db"));
        assert_eq!(config.opcodes.open, "unlock");
        assert_eq!(config.opcodes.get_log, "getlog");
        assert_eq!(config.opcodes.del_card_prefix, "delcard:");
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            EzlockConfig::from_toml_str("database_path = ["),
            Err(EzlockError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ezlock.toml");
        std::fs::write(&path, "card_name_template = \"card {n} of {name}\"\n").unwrap();

        let config = EzlockConfig::load(&path).unwrap();
        assert_eq!(config.card_name("Ann", 2), "card 2 of Ann");
        assert!(EzlockConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_default_card_name() {
        assert_eq!(EzlockConfig::default().card_name("Ann", 0), "Ann's card 0");
    }
}
