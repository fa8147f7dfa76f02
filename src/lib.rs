//! thesis-ledger: an integrity-constrained record store for a thesis office.
//!
//! Students, teachers, thesis artifacts, correspondence, and defense records
//! live in one JSON document under a store root. Every change is a single
//! load-validate-mutate-save unit that either commits whole or leaves the
//! document untouched.
//!
//! # Invariants
//!
//! - A student's advisor is an existing teacher with a free advisee slot
//! - Advisors cannot change on or after the student's defense date
//! - One defense per student; its committee seats at least one teacher
//! - No teacher sits on more committees than their jury capacity allows
//! - Messages are never deleted; ids are never reused
//!
//! ## The Thin Waist
//!
//! All document access routes through [`core::broker::DocBroker`] for:
//! - Serialization (one process-wide lock)
//! - Audit logging (`audit.events.jsonl`)
//!
//! ## Ledgers (Plugins)
//!
//! - `users`: accounts, credentials, advisor assignment, capacities
//! - `files`: artifact registry with sha256 integrity scan
//! - `messages`: append-only correspondence log
//! - `defenses`: defense records and committee normalization
//! - `reports`: read-only teacher, student, and overall reports
//!
//! # Examples
//!
//! ```bash
//! thesis --root ./office init
//! thesis --root ./office user add --name "Dr. Rasooli" --role teacher --password s3cret
//! thesis --root ./office user add --name Amir --role student --password pw --advisor 1 --defense-date 2026-06-01
//! thesis --root ./office defense record --student 2 --date 2026-06-01 --member 1 --member "Dr. External" --score 18.5
//! thesis --root ./office report teacher --id 1 --format text
//! ```

pub mod core;
pub mod plugins;

use crate::core::broker;
use crate::core::error::LedgerError;
use crate::core::output;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::defenses::{self, DefenseCli};
use crate::plugins::files::{self, FileCli};
use crate::plugins::messages::{self, MessageCli};
use crate::plugins::reports::{self, ReportCli};
use crate::plugins::users::{self, UserCli};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "thesis",
    version = env!("CARGO_PKG_VERSION"),
    about = "Integrity-constrained records for students, teachers, and thesis defenses"
)]
pub struct Cli {
    /// Store root directory (defaults to the current directory).
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug)]
pub struct InitCli {
    /// Replace an existing document with the empty one.
    #[clap(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct AuditCli {
    /// Only the most recent N events.
    #[clap(long)]
    pub limit: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct SchemaCli {
    /// A single subsystem (user, file, msg, defense, report, broker).
    #[clap(long)]
    pub subsystem: Option<String>,
    /// Omit the generation timestamp.
    #[clap(long)]
    pub deterministic: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the store document (or reset it with --force).
    Init(InitCli),
    /// Accounts, credentials, advisors, capacities.
    #[clap(name = "user")]
    User(UserCli),
    /// Thesis artifacts.
    #[clap(name = "file")]
    File(FileCli),
    /// Correspondence.
    #[clap(name = "msg")]
    Msg(MessageCli),
    /// Defense records.
    #[clap(name = "defense")]
    Defense(DefenseCli),
    /// Reports.
    #[clap(name = "report")]
    Report(ReportCli),
    /// Show the mutation audit trail.
    Audit(AuditCli),
    /// Machine-readable command schemas.
    Schema(SchemaCli),
}

pub fn run() -> Result<(), LedgerError> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let store = Store::open(&root)?;
    tracing::debug!(root = %store.root.display(), "store opened");
    dispatch(&store, cli.command)
}

pub fn dispatch(store: &Store, command: Command) -> Result<(), LedgerError> {
    match command {
        Command::Init(init) => run_init(store, init),
        Command::User(cli) => users::run_user_cli(store, cli),
        Command::File(cli) => files::run_file_cli(store, cli),
        Command::Msg(cli) => messages::run_message_cli(store, cli),
        Command::Defense(cli) => defenses::run_defense_cli(store, cli),
        Command::Report(cli) => reports::run_report_cli(store, cli),
        Command::Audit(audit) => {
            let mut events = broker::read_audit_log(store)?;
            if let Some(limit) = audit.limit {
                let skip = events.len().saturating_sub(limit);
                events.drain(..skip);
            }
            output::print_json(&time::command_envelope(
                "audit",
                "ok",
                serde_json::json!({ "events": events }),
            ))
        }
        Command::Schema(schema_cli) => output::print_json(&schema_output(schema_cli)),
    }
}

fn run_init(store: &Store, init: InitCli) -> Result<(), LedgerError> {
    let path = store.document_path();
    let existed = path.exists();
    if existed && !init.force {
        return Err(LedgerError::Conflict(format!(
            "{} already exists (use --force to reset it)",
            path.display()
        )));
    }
    store.reset()?;
    std::fs::create_dir_all(store.uploads_dir())?;
    output::print_json(&time::command_envelope(
        "init",
        "ok",
        serde_json::json!({
            "document": path.display().to_string(),
            "reset": existed,
        }),
    ))
}

pub fn schemas() -> BTreeMap<&'static str, serde_json::Value> {
    let mut schemas = BTreeMap::new();
    schemas.insert("broker", broker::schema());
    schemas.insert("user", users::schema());
    schemas.insert("file", files::schema());
    schemas.insert("msg", messages::schema());
    schemas.insert("defense", defenses::schema());
    schemas.insert("report", reports::schema());
    schemas
}

fn schema_output(schema_cli: SchemaCli) -> serde_json::Value {
    let schemas = schemas();
    if let Some(sub) = schema_cli.subsystem {
        return schemas
            .get(sub.as_str())
            .cloned()
            .unwrap_or(serde_json::json!({ "error": "subsystem not found" }));
    }
    let mut envelope = serde_json::json!({
        "schema_version": "1.0.0",
        "subsystems": schemas,
    });
    if !schema_cli.deterministic {
        if let Some(obj) = envelope.as_object_mut() {
            obj.insert("generated_at".to_string(), serde_json::json!(time::now_iso()));
        }
    }
    envelope
}
