//! Account ledger: students and teachers.
//!
//! Owns the `users` collection. Enforces advisor referential integrity, the
//! per-teacher advisee capacity, the defense-date cutoff on advisor changes,
//! and credential handling through the store's injected [`PasswordHasher`].
//!
//! [`PasswordHasher`]: crate::core::password::PasswordHasher

use crate::core::error::{CapacityKind, LedgerError};
use crate::core::ids::{Collection, Identified};
use crate::core::output;
use crate::core::password::PasswordDigest;
use crate::core::store::{Document, Store};
use crate::core::time;
use crate::plugins::defenses;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Teacher => write!(f, "teacher"),
        }
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            other => Err(LedgerError::ValidationError(format!(
                "role must be 'student' or 'teacher' (got '{}')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorChange {
    pub old_advisor: Option<u64>,
    pub new_advisor: u64,
    pub changed_by: Option<u64>,
    pub changed_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub role: Role,
    pub password_salt: String,
    pub password_hash: String,
    #[serde(default = "default_iterations")]
    pub password_iterations: u32,
    pub created_at: String,
    #[serde(default)]
    pub last_login: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub advisor_id: Option<u64>,
    #[serde(default)]
    pub defense_date: Option<String>,
    #[serde(default)]
    pub advisor_history: Vec<AdvisorChange>,
    #[serde(default)]
    pub advisee_capacity: Option<u32>,
    #[serde(default)]
    pub jury_capacity: Option<u32>,
}

fn default_iterations() -> u32 {
    crate::core::config::DEFAULT_PASSWORD_ITERATIONS
}

fn default_active() -> bool {
    true
}

impl Identified for User {
    fn id(&self) -> u64 {
        self.id
    }
}

impl User {
    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }

    pub fn digest(&self) -> PasswordDigest {
        PasswordDigest {
            salt: self.password_salt.clone(),
            hash: self.password_hash.clone(),
            iterations: self.password_iterations,
        }
    }

    fn set_digest(&mut self, digest: PasswordDigest) {
        self.password_salt = digest.salt;
        self.password_hash = digest.hash;
        self.password_iterations = digest.iterations;
    }

    /// The record without credential material, for display.
    pub fn redacted(&self) -> JsonValue {
        let mut value = serde_json::to_value(self).unwrap_or(JsonValue::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("password_salt");
            obj.remove("password_hash");
            obj.remove("password_iterations");
        }
        value
    }
}

/// Query capability the other ledgers use to resolve participants.
pub trait UserDirectory {
    fn get_by_id(&self, id: u64) -> Option<&User>;

    fn is_active(&self, id: u64) -> bool {
        self.get_by_id(id).is_some_and(|u| u.is_active)
    }
}

impl UserDirectory for Vec<User> {
    fn get_by_id(&self, id: u64) -> Option<&User> {
        self.iter().find(|u| u.id == id)
    }
}

/// How a caller names an account when logging in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Id(u64),
    Name(String),
}

impl Identifier {
    /// Digits are an id; anything else is a name.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<u64>() {
            Ok(id) => Identifier::Id(id),
            Err(_) => Identifier::Name(raw.to_string()),
        }
    }
}

impl From<u64> for Identifier {
    fn from(id: u64) -> Self {
        Identifier::Id(id)
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier::Name(name.to_string())
    }
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub role: &'a str,
    pub password: &'a str,
    pub advisor_id: Option<u64>,
    pub defense_date: Option<&'a str>,
    pub advisee_capacity: Option<i64>,
    pub jury_capacity: Option<i64>,
}

impl<'a> NewUser<'a> {
    pub fn teacher(name: &'a str, password: &'a str) -> Self {
        Self {
            name,
            role: "teacher",
            password,
            advisor_id: None,
            defense_date: None,
            advisee_capacity: None,
            jury_capacity: None,
        }
    }

    pub fn student(name: &'a str, password: &'a str) -> Self {
        Self {
            role: "student",
            ..Self::teacher(name, password)
        }
    }
}

// ---- pure queries over a loaded users collection ----

pub fn find_by_id(users: &[User], id: u64) -> Option<&User> {
    users.iter().find(|u| u.id == id)
}

/// Case-insensitive match on the trimmed name.
pub fn find_by_name<'u>(users: &'u [User], name: &str) -> Option<&'u User> {
    let wanted = name.trim().to_lowercase();
    users
        .iter()
        .find(|u| u.name.trim().to_lowercase() == wanted)
}

pub fn advisees_of(users: &[User], teacher_id: u64) -> impl Iterator<Item = &User> {
    users
        .iter()
        .filter(move |u| u.is_student() && u.advisor_id == Some(teacher_id))
}

pub fn count_advisees_in(users: &[User], teacher_id: u64) -> u64 {
    advisees_of(users, teacher_id).count() as u64
}

pub fn require_role(user: &User, role: Role) -> Result<(), LedgerError> {
    if user.role != role {
        return Err(LedgerError::PermissionDenied(format!(
            "user {} must have role '{}' (has '{}')",
            user.id, role, user.role
        )));
    }
    Ok(())
}

fn resolve_teacher(users: &[User], teacher_id: u64) -> Result<&User, LedgerError> {
    match find_by_id(users, teacher_id) {
        Some(u) if u.is_teacher() => Ok(u),
        _ => Err(LedgerError::NotFound(format!("teacher {} not found", teacher_id))),
    }
}

fn check_capacity(value: Option<i64>, field: &str) -> Result<Option<u32>, LedgerError> {
    match value {
        None => Ok(None),
        Some(v) if v < 0 => Err(LedgerError::ValidationError(format!("{} must be >= 0", field))),
        Some(v) => u32::try_from(v)
            .map(Some)
            .map_err(|_| LedgerError::ValidationError(format!("{} is too large", field))),
    }
}

// ---- ledger operations ----

pub fn create_user(store: &Store, new: NewUser<'_>) -> Result<u64, LedgerError> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(LedgerError::ValidationError(
            "name must be a non-empty string".to_string(),
        ));
    }
    let role: Role = new.role.parse()?;
    if new.password.is_empty() {
        return Err(LedgerError::ValidationError(
            "password must be a non-empty string".to_string(),
        ));
    }
    let defense_date = match new.defense_date {
        Some(raw) => Some(
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map(time::format_date)
                .map_err(|_| {
                    LedgerError::ValidationError("defense_date must be in YYYY-MM-DD format".to_string())
                })?,
        ),
        None => None,
    };
    let advisee_capacity = check_capacity(new.advisee_capacity, "advisee_capacity")?;
    let jury_capacity = check_capacity(new.jury_capacity, "jury_capacity")?;

    match role {
        Role::Teacher => {
            if new.advisor_id.is_some() || defense_date.is_some() {
                return Err(LedgerError::ValidationError(
                    "advisor_id and defense_date apply to students only".to_string(),
                ));
            }
        }
        Role::Student => {
            if advisee_capacity.is_some() || jury_capacity.is_some() {
                return Err(LedgerError::ValidationError(
                    "advisee_capacity and jury_capacity apply to teachers only".to_string(),
                ));
            }
        }
    }

    // Key derivation is deliberately slow; keep it outside the document lock.
    let digest = store.hasher().hash(new.password)?;
    let config = &store.config;

    store.broker().transact("thesis", "users.create", |doc| {
        if let Some(advisor_id) = new.advisor_id {
            let advisor = find_by_id(&doc.users, advisor_id).ok_or_else(|| {
                LedgerError::NotFound(format!("advisor {} not found", advisor_id))
            })?;
            if !advisor.is_teacher() {
                return Err(LedgerError::ValidationError(format!(
                    "advisor {} is not a teacher",
                    advisor_id
                )));
            }
            let capacity = advisor
                .advisee_capacity
                .unwrap_or(config.default_advisee_capacity) as u64;
            let used = count_advisees_in(&doc.users, advisor_id);
            if used >= capacity {
                return Err(LedgerError::CapacityExceeded {
                    kind: CapacityKind::Advisee,
                    teacher_id: advisor_id,
                    used,
                    requested: 1,
                    capacity,
                });
            }
        }

        let id = doc.allocate_id(Collection::Users);
        let (advisee_capacity, jury_capacity) = match role {
            Role::Teacher => (
                Some(advisee_capacity.unwrap_or(config.default_advisee_capacity)),
                Some(jury_capacity.unwrap_or(config.default_jury_capacity)),
            ),
            Role::Student => (None, None),
        };
        doc.users.push(User {
            id,
            name: name.to_string(),
            role,
            password_salt: digest.salt,
            password_hash: digest.hash,
            password_iterations: digest.iterations,
            created_at: time::now_iso(),
            last_login: None,
            is_active: true,
            advisor_id: new.advisor_id,
            defense_date,
            advisor_history: Vec::new(),
            advisee_capacity,
            jury_capacity,
        });
        Ok(id)
    })
}

/// Returns `None` for an unknown account, an inactive account, or a wrong
/// password alike.
pub fn authenticate(
    store: &Store,
    identifier: &Identifier,
    password: &str,
) -> Result<Option<User>, LedgerError> {
    let candidate = store.broker().read("users.authenticate", |doc| {
        let user = match identifier {
            Identifier::Id(id) => find_by_id(&doc.users, *id),
            Identifier::Name(name) => find_by_name(&doc.users, name),
        };
        Ok(user.filter(|u| u.is_active).cloned())
    })?;

    let Some(user) = candidate else {
        return Ok(None);
    };
    if user.password_salt.is_empty() || user.password_hash.is_empty() {
        return Ok(None);
    }
    if !store.hasher().verify(password, &user.digest()) {
        return Ok(None);
    }

    store.broker().transact_optional("thesis", "users.login", |doc| {
        let Some(u) = doc.users.iter_mut().find(|u| u.id == user.id) else {
            return Ok(None);
        };
        // Deactivated or re-keyed between verification and commit.
        if !u.is_active || u.password_salt != user.password_salt {
            return Ok(None);
        }
        u.last_login = Some(time::now_iso());
        Ok(Some(u.clone()))
    })
}

pub fn change_password(
    store: &Store,
    user_id: u64,
    old_password: &str,
    new_password: &str,
) -> Result<(), LedgerError> {
    if new_password.is_empty() {
        return Err(LedgerError::ValidationError(
            "new password must be a non-empty string".to_string(),
        ));
    }
    let current = get_by_id(store, user_id)?
        .ok_or_else(|| LedgerError::NotFound(format!("user {} not found", user_id)))?;
    if !store.hasher().verify(old_password, &current.digest()) {
        return Err(LedgerError::AuthError("old password does not match".to_string()));
    }
    let digest = store.hasher().hash(new_password)?;

    store.broker().transact("thesis", "users.change_password", |doc| {
        let u = doc
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| LedgerError::NotFound(format!("user {} not found", user_id)))?;
        if u.password_salt != current.password_salt {
            return Err(LedgerError::AuthError(
                "password was changed concurrently".to_string(),
            ));
        }
        u.set_digest(digest);
        Ok(())
    })
}

pub fn change_advisor(
    store: &Store,
    student_id: u64,
    new_teacher_id: u64,
    changed_by: Option<u64>,
) -> Result<(), LedgerError> {
    let today = time::today();
    let default_capacity = store.config.default_advisee_capacity;
    let actor = changed_by.map_or_else(|| "thesis".to_string(), |id| format!("user:{}", id));
    store
        .broker()
        .transact_optional(&actor, "users.change_advisor", |doc| {
            apply_advisor_change(doc, student_id, new_teacher_id, changed_by, today, default_capacity)
        })?;
    Ok(())
}

/// `Ok(None)` when the student already has this advisor.

fn apply_advisor_change(
    doc: &mut Document,
    student_id: u64,
    new_teacher_id: u64,
    changed_by: Option<u64>,
    today: NaiveDate,
    default_capacity: u32,
) -> Result<Option<()>, LedgerError> {
    let student = match find_by_id(&doc.users, student_id) {
        Some(u) if u.is_student() => u,
        _ => return Err(LedgerError::NotFound(format!("student {} not found", student_id))),
    };
    let teacher = resolve_teacher(&doc.users, new_teacher_id)?;

    let current_advisor = student.advisor_id;
    if current_advisor == Some(new_teacher_id) {
        return Ok(None);
    }

    if let Some(raw) = &student.defense_date {
        let defense_date = time::parse_date(raw)?;
        if today >= defense_date {
            return Err(LedgerError::TemporalError(format!(
                "advisor of student {} cannot change on or after the defense date {}",
                student_id, raw
            )));
        }
    }

    let capacity = teacher.advisee_capacity.unwrap_or(default_capacity) as u64;
    let used = advisees_of(&doc.users, new_teacher_id)
        .filter(|u| u.id != student_id)
        .count() as u64;
    if used >= capacity {
        return Err(LedgerError::CapacityExceeded {
            kind: CapacityKind::Advisee,
            teacher_id: new_teacher_id,
            used,
            requested: 1,
            capacity,
        });
    }

    let entry = AdvisorChange {
        old_advisor: current_advisor,
        new_advisor: new_teacher_id,
        changed_by,
        changed_at: time::now_iso(),
    };
    if let Some(u) = doc.users.iter_mut().find(|u| u.id == student_id) {
        u.advisor_id = Some(new_teacher_id);
        u.advisor_history.push(entry);
    }
    Ok(Some(()))
}

/// Update only the supplied capacities. `Ok(false)`, with nothing written,
/// when no such teacher exists.
pub fn set_teacher_capacity(
    store: &Store,
    teacher_id: u64,
    advisee_capacity: Option<i64>,
    jury_capacity: Option<i64>,
) -> Result<bool, LedgerError> {
    let advisee_capacity = check_capacity(advisee_capacity, "advisee_capacity")?;
    let jury_capacity = check_capacity(jury_capacity, "jury_capacity")?;

    let changed = store.broker().transact_optional("thesis", "users.set_capacity", |doc| {
        if !find_by_id(&doc.users, teacher_id).is_some_and(User::is_teacher) {
            return Ok(None);
        }
        if let Some(cap) = advisee_capacity {
            let used = count_advisees_in(&doc.users, teacher_id);
            if used > cap as u64 {
                return Err(LedgerError::CapacityExceeded {
                    kind: CapacityKind::Advisee,
                    teacher_id,
                    used,
                    requested: 0,
                    capacity: cap as u64,
                });
            }
        }
        if let Some(cap) = jury_capacity {
            let used = defenses::jury_assignments_in(&doc.defenses, teacher_id);
            if used > cap as u64 {
                return Err(LedgerError::CapacityExceeded {
                    kind: CapacityKind::Jury,
                    teacher_id,
                    used,
                    requested: 0,
                    capacity: cap as u64,
                });
            }
        }
        if let Some(u) = doc.users.iter_mut().find(|u| u.id == teacher_id) {
            if advisee_capacity.is_some() {
                u.advisee_capacity = advisee_capacity;
            }
            if jury_capacity.is_some() {
                u.jury_capacity = jury_capacity;
            }
        }
        Ok(Some(()))
    })?;
    Ok(changed.is_some())
}

/// Toggle `is_active`. `Ok(false)`, with nothing written, when no such user exists.
pub fn set_active(store: &Store, user_id: u64, active: bool) -> Result<bool, LedgerError> {
    let op = if active { "users.activate" } else { "users.deactivate" };
    let changed = store.broker().transact_optional("thesis", op, |doc| {
        Ok(doc
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .map(|u| u.is_active = active))
    })?;
    Ok(changed.is_some())
}

pub fn get_by_id(store: &Store, user_id: u64) -> Result<Option<User>, LedgerError> {
    store
        .broker()
        .read("users.get", |doc| Ok(find_by_id(&doc.users, user_id).cloned()))
}

pub fn get_by_name(store: &Store, name: &str) -> Result<Option<User>, LedgerError> {
    store
        .broker()
        .read("users.get_by_name", |doc| Ok(find_by_name(&doc.users, name).cloned()))
}

pub fn list_users(store: &Store) -> Result<Vec<User>, LedgerError> {
    store.broker().read("users.list", |doc| Ok(doc.users.clone()))
}

pub fn list_students_of(store: &Store, teacher_id: u64) -> Result<Vec<User>, LedgerError> {
    store.broker().read("users.students_of", |doc| {
        Ok(advisees_of(&doc.users, teacher_id).cloned().collect())
    })
}

pub fn count_advisees(store: &Store, teacher_id: u64) -> Result<u64, LedgerError> {
    store
        .broker()
        .read("users.count_advisees", |doc| Ok(count_advisees_in(&doc.users, teacher_id)))
}

/// Capacity minus current advisees. Negative only for legacy over-assigned data.
pub fn remaining_advisee_slots(store: &Store, teacher_id: u64) -> Result<i64, LedgerError> {
    let default_capacity = store.config.default_advisee_capacity;
    store.broker().read("users.remaining_slots", |doc| {
        let teacher = resolve_teacher(&doc.users, teacher_id)?;
        let capacity = teacher.advisee_capacity.unwrap_or(default_capacity) as i64;
        Ok(capacity - count_advisees_in(&doc.users, teacher_id) as i64)
    })
}

pub fn schema() -> JsonValue {
    serde_json::json!({
        "name": "user",
        "version": "0.1.0",
        "description": "Student and teacher accounts with advisor and capacity constraints",
        "commands": [
            { "name": "add", "parameters": ["name", "role", "password", "advisor", "defense_date", "advisee_capacity", "jury_capacity"] },
            { "name": "get", "parameters": ["id|name"] },
            { "name": "list" },
            { "name": "auth", "parameters": ["id|name", "password"] },
            { "name": "passwd", "parameters": ["id", "old", "new"] },
            { "name": "advisor", "parameters": ["student", "teacher", "changed_by"] },
            { "name": "capacity", "parameters": ["teacher", "advisee", "jury"] },
            { "name": "activate", "parameters": ["id"] },
            { "name": "deactivate", "parameters": ["id"] },
            { "name": "students", "parameters": ["teacher"] },
            { "name": "slots", "parameters": ["teacher"] }
        ],
        "storage": ["db.json#users"]
    })
}

// ---- CLI ----

#[derive(Parser, Debug)]
#[clap(name = "user", about = "Manage student and teacher accounts.")]
pub struct UserCli {
    #[clap(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create an account.
    Add {
        #[clap(long)]
        name: String,
        /// 'student' or 'teacher'
        #[clap(long)]
        role: String,
        #[clap(long)]
        password: String,
        /// Advisor (teacher) id, students only.
        #[clap(long)]
        advisor: Option<u64>,
        /// YYYY-MM-DD, students only.
        #[clap(long)]
        defense_date: Option<String>,
        #[clap(long, allow_hyphen_values = true)]
        advisee_capacity: Option<i64>,
        #[clap(long, allow_hyphen_values = true)]
        jury_capacity: Option<i64>,
    },
    /// Show one account by id or name.
    Get {
        #[clap(long)]
        id: Option<u64>,
        #[clap(long)]
        name: Option<String>,
    },
    /// List accounts.
    List {
        #[clap(long, value_enum)]
        role: Option<Role>,
    },
    /// Check credentials (id or name).
    Auth {
        #[clap(long)]
        user: String,
        #[clap(long)]
        password: String,
    },
    /// Change a password.
    Passwd {
        #[clap(long)]
        id: u64,
        #[clap(long)]
        old: String,
        #[clap(long)]
        new: String,
    },
    /// Move a student to another advisor.
    Advisor {
        #[clap(long)]
        student: u64,
        #[clap(long)]
        teacher: u64,
        #[clap(long)]
        changed_by: Option<u64>,
    },
    /// Set a teacher's advisee and/or jury capacity.
    Capacity {
        #[clap(long)]
        teacher: u64,
        #[clap(long, allow_hyphen_values = true)]
        advisee: Option<i64>,
        #[clap(long, allow_hyphen_values = true)]
        jury: Option<i64>,
    },
    /// Re-enable an account.
    Activate {
        #[clap(long)]
        id: u64,
    },
    /// Disable an account (it can no longer log in, send, receive, or upload).
    Deactivate {
        #[clap(long)]
        id: u64,
    },
    /// List a teacher's advisees.
    Students {
        #[clap(long)]
        teacher: u64,
    },
    /// Remaining advisee slots for a teacher.
    Slots {
        #[clap(long)]
        teacher: u64,
    },
}

pub fn run_user_cli(store: &Store, cli: UserCli) -> Result<(), LedgerError> {
    let out = match cli.command {
        UserCommand::Add {
            name,
            role,
            password,
            advisor,
            defense_date,
            advisee_capacity,
            jury_capacity,
        } => {
            let id = create_user(
                store,
                NewUser {
                    name: &name,
                    role: &role,
                    password: &password,
                    advisor_id: advisor,
                    defense_date: defense_date.as_deref(),
                    advisee_capacity,
                    jury_capacity,
                },
            )?;
            time::command_envelope("user.add", "ok", serde_json::json!({ "id": id }))
        }
        UserCommand::Get { id, name } => {
            let user = match (id, name) {
                (Some(id), _) => get_by_id(store, id)?,
                (None, Some(name)) => get_by_name(store, &name)?,
                (None, None) => {
                    return Err(LedgerError::ValidationError(
                        "pass --id or --name".to_string(),
                    ));
                }
            };
            time::command_envelope(
                "user.get",
                if user.is_some() { "ok" } else { "not_found" },
                serde_json::json!({ "item": user.as_ref().map(User::redacted) }),
            )
        }
        UserCommand::List { role } => {
            let items: Vec<JsonValue> = list_users(store)?
                .iter()
                .filter(|u| role.is_none_or(|r| u.role == r))
                .map(User::redacted)
                .collect();
            time::command_envelope("user.list", "ok", serde_json::json!({ "items": items }))
        }
        UserCommand::Auth { user, password } => {
            let found = authenticate(store, &Identifier::parse(&user), &password)?;
            time::command_envelope(
                "user.auth",
                if found.is_some() { "ok" } else { "denied" },
                serde_json::json!({ "item": found.as_ref().map(User::redacted) }),
            )
        }
        UserCommand::Passwd { id, old, new } => {
            change_password(store, id, &old, &new)?;
            time::command_envelope("user.passwd", "ok", serde_json::json!({ "id": id }))
        }
        UserCommand::Advisor {
            student,
            teacher,
            changed_by,
        } => {
            change_advisor(store, student, teacher, changed_by)?;
            time::command_envelope(
                "user.advisor",
                "ok",
                serde_json::json!({ "student_id": student, "advisor_id": teacher }),
            )
        }
        UserCommand::Capacity {
            teacher,
            advisee,
            jury,
        } => {
            let updated = set_teacher_capacity(store, teacher, advisee, jury)?;
            time::command_envelope(
                "user.capacity",
                if updated { "ok" } else { "not_found" },
                serde_json::json!({ "teacher_id": teacher }),
            )
        }
        UserCommand::Activate { id } => activation_envelope(id, set_active(store, id, true)?, true),
        UserCommand::Deactivate { id } => {
            activation_envelope(id, set_active(store, id, false)?, false)
        }
        UserCommand::Students { teacher } => {
            let items: Vec<JsonValue> = list_students_of(store, teacher)?
                .iter()
                .map(User::redacted)
                .collect();
            time::command_envelope("user.students", "ok", serde_json::json!({ "items": items }))
        }
        UserCommand::Slots { teacher } => {
            let remaining = remaining_advisee_slots(store, teacher)?;
            time::command_envelope(
                "user.slots",
                "ok",
                serde_json::json!({ "teacher_id": teacher, "remaining": remaining }),
            )
        }
    };
    output::print_json(&out)
}

fn activation_envelope(id: u64, updated: bool, active: bool) -> JsonValue {
    time::command_envelope(
        "user.activation",
        if updated { "ok" } else { "not_found" },
        serde_json::json!({ "id": id, "is_active": active }),
    )
}
