//! Store configuration loaded from `<root>/thesis.toml`.
//!
//! Every key is optional; a missing file means defaults. A file that exists
//! but does not parse is an error rather than a silent fallback.

use crate::core::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "thesis.toml";

pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 150_000;
pub const DEFAULT_ADVISEE_CAPACITY: u32 = 5;
pub const DEFAULT_JURY_CAPACITY: u32 = 10;
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 20_000;
/// The only artifact types a file record may carry. `allowed_extensions` can
/// narrow this list, never widen it.
pub const FILE_TYPES: [&str; 3] = ["pdf", "jpg", "jpeg"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Document file name, relative to the store root.
    pub document: String,
    /// Managed artifact directory, relative to the store root.
    pub uploads_dir: String,
    /// Broker audit trail (JSONL), relative to the store root.
    pub audit_log: String,
    pub password_iterations: u32,
    pub default_advisee_capacity: u32,
    pub default_jury_capacity: u32,
    pub max_message_chars: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            document: "db.json".to_string(),
            uploads_dir: "uploads".to_string(),
            audit_log: "audit.events.jsonl".to_string(),
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
            default_advisee_capacity: DEFAULT_ADVISEE_CAPACITY,
            default_jury_capacity: DEFAULT_JURY_CAPACITY,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            allowed_extensions: FILE_TYPES.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn parse(content: &str) -> Result<Self, LedgerError> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| LedgerError::ConfigError(e.to_string()))?;
        config.allowed_extensions = config
            .allowed_extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if self.password_iterations == 0 {
            return Err(LedgerError::ConfigError(
                "password_iterations must be > 0".to_string(),
            ));
        }
        if self.max_message_chars == 0 {
            return Err(LedgerError::ConfigError(
                "max_message_chars must be > 0".to_string(),
            ));
        }
        if self.allowed_extensions.is_empty() {
            return Err(LedgerError::ConfigError(
                "allowed_extensions must not be empty".to_string(),
            ));
        }
        if let Some(ext) = self
            .allowed_extensions
            .iter()
            .find(|e| !FILE_TYPES.contains(&e.as_str()))
        {
            return Err(LedgerError::ConfigError(format!(
                "allowed_extensions: '{}' is not one of {}",
                ext,
                FILE_TYPES.join(", ")
            )));
        }
        for (key, value) in [
            ("document", &self.document),
            ("uploads_dir", &self.uploads_dir),
            ("audit_log", &self.audit_log),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::ConfigError(format!("{} must not be empty", key)));
            }
        }
        Ok(())
    }

    pub fn allows_extension(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.allowed_extensions.iter().any(|e| *e == ext)
    }
}

/// Load `<root>/thesis.toml`; no file means no overrides.
pub fn load_config(root: &Path) -> Result<Config, LedgerError> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(&config_path).map_err(LedgerError::IoError)?;
    let config = Config::parse(&content)?;
    tracing::debug!(path = %config_path.display(), "loaded store config");
    Ok(config)
}
