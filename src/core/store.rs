//! The document store: sole owner of the persisted document.
//!
//! Everything the system knows lives in one JSON document with four
//! top-level collections (`users`, `files`, `messages`, `defenses`). This
//! module defines that shape, loads it (an absent file is the canonical empty
//! document), and writes it back atomically. It does not lock: callers go
//! through [`crate::core::broker::DocBroker`], which serializes each
//! load→mutate→save unit.

use crate::core::broker::DocBroker;
use crate::core::config::{self, Config};
use crate::core::error::LedgerError;
use crate::core::ids::{self, Collection, Sequences};
use crate::core::output;
use crate::core::password::{PasswordHasher, Pbkdf2Hasher};
use crate::plugins::defenses::Defense;
use crate::plugins::files::FileRecord;
use crate::plugins::messages::Message;
use crate::plugins::users::User;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The whole persisted state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub defenses: Vec<Defense>,
    /// High-water marks; absent in documents written before ids were tracked.
    #[serde(default)]
    pub sequences: Sequences,
}

impl Document {
    pub fn next_id(&self, collection: Collection) -> u64 {
        let high_water = self.sequences.get(collection);
        match collection {
            Collection::Users => ids::next_id(&self.users, high_water),
            Collection::Files => ids::next_id(&self.files, high_water),
            Collection::Messages => ids::next_id(&self.messages, high_water),
            Collection::Defenses => ids::next_id(&self.defenses, high_water),
        }
    }

    /// Hand out the next id and record it as used.
    pub fn allocate_id(&mut self, collection: Collection) -> u64 {
        let id = self.next_id(collection);
        self.sequences.advance(collection, id);
        id
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        output::to_indented_json(self)
    }
}

/// Store handle: a root directory plus its configuration and password primitive.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute or caller-relative path to the store root directory
    pub root: PathBuf,
    pub config: Config,
    hasher: Arc<dyn PasswordHasher>,
}

impl Store {
    /// Open a store rooted at `root`, reading `thesis.toml` if present.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let root = root.into();
        let config = config::load_config(&root)?;
        Self::with_config(root, config)
    }

    pub fn with_config(root: impl Into<PathBuf>, config: Config) -> Result<Self, LedgerError> {
        let hasher = Pbkdf2Hasher::new(config.password_iterations)?;
        Ok(Self {
            root: root.into(),
            config,
            hasher: Arc::new(hasher),
        })
    }

    /// Swap the password primitive.
    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn hasher(&self) -> &dyn PasswordHasher {
        self.hasher.as_ref()
    }

    pub fn broker(&self) -> DocBroker<'_> {
        DocBroker::new(self)
    }

    pub fn document_path(&self) -> PathBuf {
        self.root.join(&self.config.document)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(&self.config.uploads_dir)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.root.join(&self.config.audit_log)
    }

    /// Read the persisted document, or the empty document if none exists yet.
    pub fn load(&self) -> Result<Document, LedgerError> {
        let path = self.document_path();
        if !path.exists() {
            return Ok(Document::default());
        }
        let bytes = fs::read(&path).map_err(LedgerError::IoError)?;
        let doc = serde_json::from_slice(&bytes)?;
        Ok(doc)
    }

    /// Write the full document, replacing the old one atomically.
    pub fn save(&self, doc: &Document) -> Result<(), LedgerError> {
        let bytes = doc.to_bytes()?;
        write_atomic(&self.document_path(), &bytes)
    }

    /// Overwrite the persisted state with the canonical empty document.
    pub fn reset(&self) -> Result<(), LedgerError> {
        self.broker()
            .replace("thesis", "store.reset", &Document::default())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(LedgerError::IoError)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| LedgerError::ConfigError(format!("invalid document path {}", path.display())))?;
    let tmp_path = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

    let written = (|| -> std::io::Result<()> {
        let mut f = File::create(&tmp_path)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        Ok(())
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(LedgerError::IoError(e));
    }
    fs::rename(&tmp_path, path).map_err(LedgerError::IoError)?;
    Ok(())
}
