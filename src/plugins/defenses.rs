//! Defense ledger: one final thesis-defense record per student.
//!
//! Lifecycle per student is `none -> recorded -> amended*`; there is no
//! delete. Committee composition is normalized from loosely-typed input and
//! every teacher seat counts against that teacher's jury capacity across all
//! defenses.

use crate::core::error::{CapacityKind, LedgerError};
use crate::core::ids::{Collection, Identified};
use crate::core::output;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::users::{self, UserDirectory};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitteeRole {
    Teacher,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeMember {
    pub id: Option<u64>,
    pub name: String,
    pub role: CommitteeRole,
}

/// One committee entry as supplied by a caller, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitteeInput {
    /// A teacher's user id.
    ById(u64),
    /// An external member's display name. Blank names are skipped.
    ExternalName(String),
    /// An explicit entry; `id` wins over `name` when both are present.
    Structured {
        id: Option<u64>,
        name: Option<String>,
        role: Option<CommitteeRole>,
    },
}

impl CommitteeInput {
    /// Command-line form: digits are a teacher id, anything else an external name.
    pub fn parse_token(raw: &str) -> Self {
        match raw.trim().parse::<u64>() {
            Ok(id) => CommitteeInput::ById(id),
            Err(_) => CommitteeInput::ExternalName(raw.to_string()),
        }
    }
}

impl From<u64> for CommitteeInput {
    fn from(id: u64) -> Self {
        CommitteeInput::ById(id)
    }
}

impl From<&str> for CommitteeInput {
    fn from(name: &str) -> Self {
        CommitteeInput::ExternalName(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defense {
    pub id: u64,
    pub student_id: u64,
    pub date: String,
    pub committee_members: Vec<CommitteeMember>,
    pub final_score: Option<f64>,
    pub notes: Option<String>,
    pub recorded_by: Option<u64>,
    pub recorded_at: String,
}

impl Identified for Defense {
    fn id(&self) -> u64 {
        self.id
    }
}

impl Defense {
    /// Parsed date; unparsable values order as the minimum date.
    pub fn sort_date(&self) -> NaiveDate {
        time::parse_date(&self.date).unwrap_or(NaiveDate::MIN)
    }

    pub fn seats_teacher(&self, teacher_id: u64) -> bool {
        self.committee_members
            .iter()
            .any(|m| m.role == CommitteeRole::Teacher && m.id == Some(teacher_id))
    }
}

pub struct NewDefense<'a> {
    pub student_id: u64,
    pub date: &'a str,
    pub committee_members: Vec<CommitteeInput>,
    pub final_score: Option<f64>,
    pub notes: Option<String>,
    pub recorded_by: Option<u64>,
}

/// Fields an amendment may touch; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct DefenseUpdate {
    pub final_score: Option<f64>,
    pub notes: Option<String>,
    pub committee_members: Option<Vec<CommitteeInput>>,
}

// ---- pure helpers over a loaded snapshot ----

fn resolve_teacher_member(
    directory: &dyn UserDirectory,
    id: u64,
) -> Result<CommitteeMember, String> {
    match directory.get_by_id(id) {
        None => Err(format!("committee member with id {} not found", id)),
        Some(u) if !u.is_teacher() => Err(format!("committee member id {} is not a teacher", id)),
        Some(u) => Ok(CommitteeMember {
            id: Some(u.id),
            name: u.name.clone(),
            role: CommitteeRole::Teacher,
        }),
    }
}

/// Normalize every entry, collecting all problems, then require a teacher.
pub fn normalize_committee(
    directory: &dyn UserDirectory,
    members: &[CommitteeInput],
) -> Result<Vec<CommitteeMember>, LedgerError> {
    let mut normalized = Vec::with_capacity(members.len());
    let mut problems = Vec::new();

    for (idx, item) in members.iter().enumerate() {
        match item {
            CommitteeInput::ById(id) | CommitteeInput::Structured { id: Some(id), .. } => {
                match resolve_teacher_member(directory, *id) {
                    Ok(m) => normalized.push(m),
                    Err(p) => problems.push(format!("entry {}: {}", idx + 1, p)),
                }
            }
            CommitteeInput::ExternalName(name) => {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                normalized.push(CommitteeMember {
                    id: None,
                    name: name.to_string(),
                    role: CommitteeRole::External,
                });
            }
            CommitteeInput::Structured {
                id: None,
                name: Some(name),
                role,
            } if !name.trim().is_empty() => {
                normalized.push(CommitteeMember {
                    id: None,
                    name: name.trim().to_string(),
                    role: role.unwrap_or(CommitteeRole::External),
                });
            }
            CommitteeInput::Structured { .. } => problems.push(format!(
                "entry {}: structured member must contain an id or a non-blank name",
                idx + 1
            )),
        }
    }

    if !normalized.iter().any(|m| m.role == CommitteeRole::Teacher) {
        problems.push("committee must include at least one member with role 'teacher'".to_string());
    }
    if !problems.is_empty() {
        return Err(LedgerError::ValidationError(problems.join("; ")));
    }
    Ok(normalized)
}

/// Committee entries across all defenses where `teacher_id` sits as a teacher.
pub fn jury_assignments_in(defenses: &[Defense], teacher_id: u64) -> u64 {
    defenses
        .iter()
        .flat_map(|d| d.committee_members.iter())
        .filter(|m| m.role == CommitteeRole::Teacher && m.id == Some(teacher_id))
        .count() as u64
}

/// Per-teacher seat counts in `committee`, in order of first appearance.
fn teacher_seats(committee: &[CommitteeMember]) -> Vec<(u64, u64)> {
    let mut counts: FxHashMap<u64, u64> = FxHashMap::default();
    let mut order = Vec::new();
    for m in committee {
        if let (CommitteeRole::Teacher, Some(id)) = (m.role, m.id) {
            let count = counts.entry(id).or_insert(0);
            if *count == 0 {
                order.push(id);
            }
            *count += 1;
        }
    }
    order.into_iter().map(|id| (id, counts[&id])).collect()
}

/// Adding `committee` on top of `existing` must keep every teacher within capacity.
pub fn check_jury_capacity(
    directory: &dyn UserDirectory,
    existing: &[Defense],
    committee: &[CommitteeMember],
    default_capacity: u32,
) -> Result<(), LedgerError> {
    for (teacher_id, requested) in teacher_seats(committee) {
        let teacher = directory
            .get_by_id(teacher_id)
            .ok_or_else(|| LedgerError::NotFound(format!("teacher {} not found", teacher_id)))?;
        let capacity = teacher.jury_capacity.unwrap_or(default_capacity) as u64;
        let used = jury_assignments_in(existing, teacher_id);
        if used + requested > capacity {
            return Err(LedgerError::CapacityExceeded {
                kind: CapacityKind::Jury,
                teacher_id,
                used,
                requested,
                capacity,
            });
        }
    }
    Ok(())
}

pub fn validate_score(score: Option<f64>) -> Result<Option<f64>, LedgerError> {
    match score {
        None => Ok(None),
        Some(s) if !s.is_finite() => Err(LedgerError::ValidationError(
            "final score must be a number".to_string(),
        )),
        Some(s) if !(MIN_SCORE..=MAX_SCORE).contains(&s) => Err(LedgerError::ValidationError(
            format!("final score must be between {} and {} (got {})", MIN_SCORE, MAX_SCORE, s),
        )),
        Some(s) => Ok(Some(s)),
    }
}

// ---- ledger operations ----

pub fn record(store: &Store, new: NewDefense<'_>) -> Result<Defense, LedgerError> {
    let default_capacity = store.config.default_jury_capacity;
    let actor = new
        .recorded_by
        .map_or_else(|| "thesis".to_string(), |id| format!("user:{}", id));

    store.broker().transact(&actor, "defenses.record", |doc| {
        match users::find_by_id(&doc.users, new.student_id) {
            None => {
                return Err(LedgerError::NotFound(format!(
                    "student {} not found",
                    new.student_id
                )));
            }
            Some(u) if !u.is_student() => {
                return Err(LedgerError::ValidationError(format!(
                    "user {} is not a student",
                    new.student_id
                )));
            }
            Some(_) => {}
        }
        if let Some(existing) = doc.defenses.iter().find(|d| d.student_id == new.student_id) {
            return Err(LedgerError::Conflict(format!(
                "a defense record already exists for student {} (id={})",
                new.student_id, existing.id
            )));
        }

        let date = time::parse_date(new.date)?;
        let committee = normalize_committee(&doc.users, &new.committee_members)?;
        check_jury_capacity(&doc.users, &doc.defenses, &committee, default_capacity)?;
        let final_score = validate_score(new.final_score)?;
        if let Some(rb) = new.recorded_by {
            if doc.users.get_by_id(rb).is_none() {
                return Err(LedgerError::NotFound(format!(
                    "recorded_by user {} not found",
                    rb
                )));
            }
        }

        let record = Defense {
            id: doc.allocate_id(Collection::Defenses),
            student_id: new.student_id,
            date: time::format_date(date),
            committee_members: committee,
            final_score,
            notes: new.notes.clone(),
            recorded_by: new.recorded_by,
            recorded_at: time::now_iso(),
        };
        doc.defenses.push(record.clone());
        Ok(record)
    })
}

/// Amend a recorded defense. All supplied fields are validated before any is applied.
pub fn update(
    store: &Store,
    defense_id: u64,
    changes: DefenseUpdate,
) -> Result<Defense, LedgerError> {
    let default_capacity = store.config.default_jury_capacity;

    store.broker().transact("thesis", "defenses.update", |doc| {
        let idx = doc
            .defenses
            .iter()
            .position(|d| d.id == defense_id)
            .ok_or_else(|| LedgerError::NotFound(format!("defense {} not found", defense_id)))?;

        let committee = match &changes.committee_members {
            Some(members) => {
                let committee = normalize_committee(&doc.users, members)?;
                // The defense's current seats stay in the baseline.
                check_jury_capacity(&doc.users, &doc.defenses, &committee, default_capacity)?;
                Some(committee)
            }
            None => None,
        };
        let final_score = validate_score(changes.final_score)?;

        let found = &mut doc.defenses[idx];
        if let Some(committee) = committee {
            found.committee_members = committee;
        }
        if final_score.is_some() {
            found.final_score = final_score;
        }
        if let Some(notes) = &changes.notes {
            found.notes = Some(notes.clone());
        }
        Ok(found.clone())
    })
}

/// All defenses, most recent date first.
pub fn list(store: &Store) -> Result<Vec<Defense>, LedgerError> {
    store.broker().read("defenses.list", |doc| {
        let mut defs = doc.defenses.clone();
        defs.sort_by_key(|d| std::cmp::Reverse(d.sort_date()));
        Ok(defs)
    })
}

pub fn list_by_student(store: &Store, student_id: u64) -> Result<Vec<Defense>, LedgerError> {
    store.broker().read("defenses.by_student", |doc| {
        Ok(doc
            .defenses
            .iter()
            .filter(|d| d.student_id == student_id)
            .cloned()
            .collect())
    })
}

pub fn get_defense(store: &Store, defense_id: u64) -> Result<Option<Defense>, LedgerError> {
    store.broker().read("defenses.get", |doc| {
        Ok(doc.defenses.iter().find(|d| d.id == defense_id).cloned())
    })
}

pub fn count_jury_assignments(store: &Store, teacher_id: u64) -> Result<u64, LedgerError> {
    store.broker().read("defenses.jury_count", |doc| {
        Ok(jury_assignments_in(&doc.defenses, teacher_id))
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "defense",
        "version": "0.1.0",
        "description": "One defense record per student with committee and jury capacity checks",
        "commands": [
            { "name": "record", "parameters": ["student", "date", "member...", "score", "notes", "recorded_by"] },
            { "name": "update", "parameters": ["id", "score", "notes", "member..."] },
            { "name": "get", "parameters": ["id"] },
            { "name": "list" },
            { "name": "student", "parameters": ["id"] },
            { "name": "jury", "parameters": ["teacher"] }
        ],
        "score_range": [MIN_SCORE, MAX_SCORE],
        "storage": ["db.json#defenses"]
    })
}

// ---- CLI ----

#[derive(Parser, Debug)]
#[clap(name = "defense", about = "Record and amend thesis defenses.")]
pub struct DefenseCli {
    #[clap(subcommand)]
    pub command: DefenseCommand,
}

#[derive(Subcommand, Debug)]
pub enum DefenseCommand {
    /// Record a student's defense.
    Record {
        #[clap(long)]
        student: u64,
        /// YYYY-MM-DD
        #[clap(long)]
        date: String,
        /// Committee member: a teacher id or an external member's name (repeatable).
        #[clap(long = "member", required = true)]
        members: Vec<String>,
        #[clap(long, allow_hyphen_values = true)]
        score: Option<f64>,
        #[clap(long)]
        notes: Option<String>,
        #[clap(long)]
        recorded_by: Option<u64>,
    },
    /// Amend score, notes, or committee of a recorded defense.
    Update {
        #[clap(long)]
        id: u64,
        #[clap(long, allow_hyphen_values = true)]
        score: Option<f64>,
        #[clap(long)]
        notes: Option<String>,
        /// Replacement committee (repeatable); omit to keep the current one.
        #[clap(long = "member")]
        members: Vec<String>,
    },
    /// Show one defense.
    Get {
        #[clap(long)]
        id: u64,
    },
    /// List all defenses, newest date first.
    List,
    /// Defenses of one student.
    Student {
        #[clap(long)]
        id: u64,
    },
    /// Jury assignment count for a teacher.
    Jury {
        #[clap(long)]
        teacher: u64,
    },
}

fn parse_members(raw: &[String]) -> Vec<CommitteeInput> {
    raw.iter().map(|m| CommitteeInput::parse_token(m)).collect()
}

pub fn run_defense_cli(store: &Store, cli: DefenseCli) -> Result<(), LedgerError> {
    let out = match cli.command {
        DefenseCommand::Record {
            student,
            date,
            members,
            score,
            notes,
            recorded_by,
        } => {
            let rec = record(
                store,
                NewDefense {
                    student_id: student,
                    date: &date,
                    committee_members: parse_members(&members),
                    final_score: score,
                    notes,
                    recorded_by,
                },
            )?;
            time::command_envelope("defense.record", "ok", serde_json::json!({ "item": rec }))
        }
        DefenseCommand::Update {
            id,
            score,
            notes,
            members,
        } => {
            let changes = DefenseUpdate {
                final_score: score,
                notes,
                committee_members: (!members.is_empty()).then(|| parse_members(&members)),
            };
            let rec = update(store, id, changes)?;
            time::command_envelope("defense.update", "ok", serde_json::json!({ "item": rec }))
        }
        DefenseCommand::Get { id } => {
            let rec = get_defense(store, id)?;
            time::command_envelope(
                "defense.get",
                if rec.is_some() { "ok" } else { "not_found" },
                serde_json::json!({ "item": rec }),
            )
        }
        DefenseCommand::List => {
            let items = list(store)?;
            time::command_envelope("defense.list", "ok", serde_json::json!({ "items": items }))
        }
        DefenseCommand::Student { id } => {
            let items = list_by_student(store, id)?;
            time::command_envelope("defense.student", "ok", serde_json::json!({ "items": items }))
        }
        DefenseCommand::Jury { teacher } => {
            let count = count_jury_assignments(store, teacher)?;
            time::command_envelope(
                "defense.jury",
                "ok",
                serde_json::json!({ "teacher_id": teacher, "assignments": count }),
            )
        }
    };
    output::print_json(&out)
}
