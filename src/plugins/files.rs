//! Artifact registry: thesis PDFs and scanned images copied under `uploads/`.

use crate::core::error::LedgerError;
use crate::core::ids::{Collection, Identified};
use crate::core::output;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::users::UserDirectory;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: u64,
    pub original_name: String,
    /// Relative to the store root.
    pub stored_path: String,
    pub file_type: String,
    pub description: String,
    pub uploader_id: Option<u64>,
    pub size_bytes: u64,
    pub registered_at: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Identified for FileRecord {
    fn id(&self) -> u64 {
        self.id
    }
}

impl FileRecord {
    pub fn sha256(&self) -> Option<&str> {
        self.metadata.get("sha256").and_then(|v| v.as_str())
    }
}

/// ANDed filters for [`find`]; `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct FileQuery {
    pub file_type: Option<String>,
    pub uploader_id: Option<u64>,
    pub name_contains: Option<String>,
}

impl FileQuery {
    pub fn matches(&self, f: &FileRecord) -> bool {
        if let Some(ft) = &self.file_type {
            if !f.file_type.eq_ignore_ascii_case(ft.trim_start_matches('.')) {
                return false;
            }
        }
        if let Some(uid) = self.uploader_id {
            if f.uploader_id != Some(uid) {
                return false;
            }
        }
        if let Some(needle) = &self.name_contains {
            if !f.original_name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn artifact_path(store: &Store, record: &FileRecord) -> PathBuf {
    store.root.join(&record.stored_path)
}

pub fn register(
    store: &Store,
    source: &Path,
    description: &str,
    uploader_id: Option<u64>,
) -> Result<u64, LedgerError> {
    if !source.is_file() {
        return Err(LedgerError::NotFound(format!(
            "file not found: {}",
            source.display()
        )));
    }
    let ext = source
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !store.config.allows_extension(&ext) {
        return Err(LedgerError::ValidationError(format!(
            "invalid file type '.{}'; allowed: {}",
            ext,
            store.config.allowed_extensions.join(", ")
        )));
    }
    let original_name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut copied: Option<PathBuf> = None;
    let actor = uploader_id.map_or_else(|| "thesis".to_string(), |id| format!("user:{}", id));
    let result = store.broker().transact(&actor, "files.register", |doc| {
        if let Some(uid) = uploader_id {
            match doc.users.get_by_id(uid) {
                None => {
                    return Err(LedgerError::ValidationError(format!(
                        "uploader {} not found",
                        uid
                    )));
                }
                Some(u) if !u.is_active => {
                    return Err(LedgerError::ValidationError(format!(
                        "uploader {} is not active",
                        uid
                    )));
                }
                Some(_) => {}
            }
        }

        let id = doc.allocate_id(Collection::Files);
        let now = time::now();
        let stored_rel = Path::new(&store.config.uploads_dir).join(format!(
            "file_{}_{}.{}",
            id,
            time::compact_stamp(now),
            ext
        ));
        let dest = store.root.join(&stored_rel);

        let bytes = fs::read(source).map_err(LedgerError::IoError)?;
        fs::create_dir_all(store.uploads_dir()).map_err(LedgerError::IoError)?;
        copied = Some(dest.clone());
        fs::write(&dest, &bytes).map_err(LedgerError::IoError)?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("sha256".to_string(), serde_json::json!(hash_bytes(&bytes)));
        doc.files.push(FileRecord {
            id,
            original_name: original_name.clone(),
            stored_path: stored_rel.to_string_lossy().to_string(),
            file_type: ext.clone(),
            description: description.to_string(),
            uploader_id,
            size_bytes: bytes.len() as u64,
            registered_at: time::format_timestamp(now),
            metadata,
        });
        Ok(id)
    });

    if result.is_err() {
        if let Some(dest) = copied {
            discard_artifact(&dest);
        }
    }
    result
}

/// Best-effort removal of a copy that never got a committed record. The copy
/// may be partial or may never have been created.
fn discard_artifact(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove orphaned artifact")
        }
    }
}

pub fn list_files(store: &Store) -> Result<Vec<FileRecord>, LedgerError> {
    store
        .broker()
        .read("files.list", |doc| Ok(doc.files.clone()))
}

pub fn get_file(store: &Store, file_id: u64) -> Result<Option<FileRecord>, LedgerError> {
    store.broker().read("files.get", |doc| {
        Ok(doc.files.iter().find(|f| f.id == file_id).cloned())
    })
}

pub fn find(store: &Store, query: &FileQuery) -> Result<Vec<FileRecord>, LedgerError> {
    store.broker().read("files.find", |doc| {
        Ok(doc
            .files
            .iter()
            .filter(|f| query.matches(f))
            .cloned()
            .collect())
    })
}

/// Remove a record. With `remove_from_disk`, the artifact is unlinked only
/// after the removal is persisted, and unlink failures are not returned.
pub fn delete(store: &Store, file_id: u64, remove_from_disk: bool) -> Result<bool, LedgerError> {
    let removed = store.broker().transact_optional("thesis", "files.delete", |doc| {
        Ok(doc
            .files
            .iter()
            .position(|f| f.id == file_id)
            .map(|idx| doc.files.remove(idx)))
    })?;

    let Some(record) = removed else {
        return Ok(false);
    };
    if remove_from_disk {
        let path = artifact_path(store, &record);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(file_id, path = %path.display(), error = %e, "failed to unlink artifact")
            }
        }
    }
    Ok(true)
}

/// Integrity scan over every record; returns one line per failure.
pub fn verify_files(store: &Store) -> Result<Vec<String>, LedgerError> {
    let files = list_files(store)?;
    let mut failures = Vec::new();

    for f in files {
        let path = artifact_path(store, &f);
        if !path.exists() {
            failures.push(format!("file {}: artifact missing at {}", f.id, f.stored_path));
            continue;
        }
        let bytes = fs::read(&path).map_err(LedgerError::IoError)?;
        if bytes.len() as u64 != f.size_bytes {
            failures.push(format!(
                "file {}: size mismatch (recorded {}, found {})",
                f.id,
                f.size_bytes,
                bytes.len()
            ));
        }
        match f.sha256() {
            Some(expected) if expected != hash_bytes(&bytes) => {
                failures.push(format!("file {}: content hash mismatch", f.id));
            }
            Some(_) => {}
            None => failures.push(format!("file {}: no content hash recorded", f.id)),
        }
    }

    Ok(failures)
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "file",
        "version": "0.1.0",
        "description": "Artifact registry with integrity verification",
        "commands": [
            { "name": "register", "parameters": ["path", "description", "uploader"] },
            { "name": "list" },
            { "name": "get", "parameters": ["id"] },
            { "name": "find", "parameters": ["type", "uploader", "name"] },
            { "name": "delete", "parameters": ["id", "remove_from_disk"] },
            { "name": "verify", "description": "Check every artifact against its recorded size and sha256" }
        ],
        "storage": ["db.json#files", "uploads/"]
    })
}

// ---- CLI ----

#[derive(Parser, Debug)]
#[clap(name = "file", about = "Register and look up thesis artifacts.")]
pub struct FileCli {
    #[clap(subcommand)]
    pub command: FileCommand,
}

#[derive(Subcommand, Debug)]
pub enum FileCommand {
    /// Copy a file into the store and record it.
    Register {
        path: PathBuf,
        #[clap(long, default_value = "")]
        description: String,
        #[clap(long)]
        uploader: Option<u64>,
    },
    List,
    Get {
        #[clap(long)]
        id: u64,
    },
    Find {
        #[clap(long = "type")]
        file_type: Option<String>,
        #[clap(long)]
        uploader: Option<u64>,
        #[clap(long)]
        name: Option<String>,
    },
    Delete {
        #[clap(long)]
        id: u64,
        /// Also unlink the stored artifact.
        #[clap(long)]
        remove_from_disk: bool,
    },
    /// Integrity scan.
    Verify,
}

pub fn run_file_cli(store: &Store, cli: FileCli) -> Result<(), LedgerError> {
    let out = match cli.command {
        FileCommand::Register {
            path,
            description,
            uploader,
        } => {
            let id = register(store, &path, &description, uploader)?;
            time::command_envelope("file.register", "ok", serde_json::json!({ "id": id }))
        }
        FileCommand::List => {
            let items = list_files(store)?;
            time::command_envelope("file.list", "ok", serde_json::json!({ "items": items }))
        }
        FileCommand::Get { id } => {
            let item = get_file(store, id)?;
            time::command_envelope(
                "file.get",
                if item.is_some() { "ok" } else { "not_found" },
                serde_json::json!({ "item": item }),
            )
        }
        FileCommand::Find {
            file_type,
            uploader,
            name,
        } => {
            let query = FileQuery {
                file_type,
                uploader_id: uploader,
                name_contains: name,
            };
            let items = find(store, &query)?;
            time::command_envelope("file.find", "ok", serde_json::json!({ "items": items }))
        }
        FileCommand::Delete {
            id,
            remove_from_disk,
        } => {
            let deleted = delete(store, id, remove_from_disk)?;
            time::command_envelope(
                "file.delete",
                if deleted { "ok" } else { "not_found" },
                serde_json::json!({ "id": id, "deleted": deleted }),
            )
        }
        FileCommand::Verify => {
            let failures = verify_files(store)?;
            for f in &failures {
                tracing::warn!("{}", output::compact_line(f, 200));
            }
            time::command_envelope(
                "file.verify",
                if failures.is_empty() { "ok" } else { "failed" },
                serde_json::json!({ "failures": failures }),
            )
        }
    };
    output::print_json(&out)
}
