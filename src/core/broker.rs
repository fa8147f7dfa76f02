use crate::core::error::LedgerError;
use crate::core::store::{Document, Store};
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One lock for the whole process: every load→mutate→save unit holds it.
static DOC_LOCK: Mutex<()> = Mutex::new(());

fn acquire() -> MutexGuard<'static, ()> {
    // A panic inside a previous unit never reached `save`, so the document is intact.
    DOC_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The Document Broker is the "Thin Waist" for state access.
///
/// Ledgers never call `Store::load`/`Store::save` themselves; they hand the
/// broker a closure. The closure sees a freshly loaded document and the lock
/// is held until the result is persisted (or discarded on error).
pub struct DocBroker<'a> {
    store: &'a Store,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub status: String,
    pub error_class: Option<String>,
}

impl<'a> DocBroker<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Run a read-only query against a consistent snapshot.
    pub fn read<F, R>(&self, op: &str, f: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&Document) -> Result<R, LedgerError>,
    {
        let _lock = acquire();
        let doc = self.store.load()?;
        tracing::debug!(op, "document read");
        f(&doc)
    }

    /// Load, apply `f`, and persist once if `f` succeeds.
    ///
    /// On `Err` the mutated copy is dropped: nothing is written and the
    /// persisted document is exactly what it was before the call.
    pub fn transact<F, R>(&self, actor: &str, op: &str, f: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&mut Document) -> Result<R, LedgerError>,
    {
        let _lock = acquire();
        let mut doc = self.store.load()?;

        let result = match f(&mut doc) {
            Ok(value) => self.store.save(&doc).map(|_| value),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => tracing::info!(actor, op, "mutation committed"),
            Err(e) => tracing::debug!(actor, op, error = %e, "mutation rejected"),
        }
        self.log_event(actor, op, result.as_ref().err());

        result
    }

    /// Like [`transact`](Self::transact), but `Ok(None)` from `f` means the
    /// target did not exist: nothing is saved and the audit event is `noop`.
    pub fn transact_optional<F, R>(
        &self,
        actor: &str,
        op: &str,
        f: F,
    ) -> Result<Option<R>, LedgerError>
    where
        F: FnOnce(&mut Document) -> Result<Option<R>, LedgerError>,
    {
        let _lock = acquire();
        let mut doc = self.store.load()?;

        let result = match f(&mut doc) {
            Ok(Some(value)) => self.store.save(&doc).map(|_| Some(value)),
            other => other,
        };

        let status = match &result {
            Ok(Some(_)) => {
                tracing::info!(actor, op, "mutation committed");
                "success"
            }
            Ok(None) => {
                tracing::debug!(actor, op, "nothing to change");
                "noop"
            }
            Err(e) => {
                tracing::debug!(actor, op, error = %e, "mutation rejected");
                "error"
            }
        };
        self.append_event(actor, op, status, result.as_ref().err());

        result
    }

    /// Persist `doc` wholesale without loading the current state first.
    pub fn replace(&self, actor: &str, op: &str, doc: &Document) -> Result<(), LedgerError> {
        let _lock = acquire();
        let result = self.store.save(doc);
        self.log_event(actor, op, result.as_ref().err());
        result
    }

    /// Append to the audit trail. The mutation has already been decided by now,
    /// so a failing append is reported through tracing only.
    fn log_event(&self, actor: &str, op: &str, error: Option<&LedgerError>) {
        let status = if error.is_none() { "success" } else { "error" };
        self.append_event(actor, op, status, error);
    }

    fn append_event(&self, actor: &str, op: &str, status: &str, error: Option<&LedgerError>) {
        let ev = BrokerEvent {
            ts: time::now_iso(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            op: op.to_string(),
            status: status.to_string(),
            error_class: error.map(|e| e.class().to_string()),
        };

        let path = self.store.audit_log_path();
        let appended = serde_json::to_string(&ev)
            .map_err(std::io::Error::other)
            .and_then(|line| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
                writeln!(f, "{}", line)
            });
        if let Err(e) = appended {
            tracing::warn!(path = %path.display(), error = %e, "failed to append audit event");
        }
    }
}

/// Read the audit trail back, skipping lines that do not parse.
pub fn read_audit_log(store: &Store) -> Result<Vec<BrokerEvent>, LedgerError> {
    let path = store.audit_log_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path).map_err(LedgerError::IoError)?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "broker",
        "version": "0.1.0",
        "description": "Serialized document access (The Thin Waist)",
        "commands": [
            { "name": "audit", "description": "Show the mutation audit log" }
        ],
        "audit_statuses": ["success", "error", "noop"],
        "storage": ["audit.events.jsonl"]
    })
}
