//! Read-only reports built from one consistent snapshot.

use crate::core::error::LedgerError;
use crate::core::output;
use crate::core::store::{Document, Store};
use crate::core::time;
use crate::plugins::defenses::{CommitteeRole, Defense};
use crate::plugins::users::{self, Role};
use clap::{Parser, Subcommand, ValueEnum};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const TOP_TEACHERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviseeSummary {
    pub id: u64,
    pub name: String,
    pub defense_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JuryAssignment {
    pub defense_id: u64,
    pub student_id: u64,
    pub date: String,
    pub final_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherReport {
    pub generated_at: String,
    pub teacher: PersonRef,
    pub advisee_capacity: u64,
    pub advisees_count: u64,
    pub advisees_remaining: i64,
    pub advisees: Vec<AdviseeSummary>,
    pub jury_capacity: u64,
    pub jury_assignments_count: u64,
    pub jury_assignments: Vec<JuryAssignment>,
    pub supervised_defenses_count: u64,
    pub supervised_avg_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: u64,
    pub original_name: String,
    pub file_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentReport {
    pub generated_at: String,
    pub student: PersonRef,
    pub advisor: Option<PersonRef>,
    pub defense: Option<Defense>,
    pub files: Vec<FileSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherTally {
    pub teacher_id: u64,
    pub name: Option<String>,
    pub assignments: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallReport {
    pub generated_at: String,
    pub total_users: u64,
    pub total_teachers: u64,
    pub total_students: u64,
    pub total_defenses: u64,
    pub total_files: u64,
    pub total_messages: u64,
    pub average_defense_score: Option<f64>,
    pub top_teachers_by_jury_assignments: Vec<TeacherTally>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Report {
    TeacherReport(TeacherReport),
    StudentReport(StudentReport),
    OverallReport(OverallReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Text,
}

impl FromStr for ExportFormat {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "text" => Ok(ExportFormat::Text),
            other => Err(LedgerError::ValidationError(format!(
                "unsupported format '{}', use 'json' or 'text'",
                other
            ))),
        }
    }
}

fn average(scores: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = scores.fold((0.0, 0u64), |(s, n), x| (s + x, n + 1));
    (n > 0).then(|| sum / n as f64)
}

// ---- builders over a snapshot ----

pub fn build_teacher_report(
    doc: &Document,
    teacher_id: u64,
    default_advisee: u32,
    default_jury: u32,
) -> Result<TeacherReport, LedgerError> {
    let teacher = users::find_by_id(&doc.users, teacher_id)
        .filter(|u| u.is_teacher())
        .ok_or_else(|| LedgerError::NotFound(format!("teacher {} not found", teacher_id)))?;

    let advisees: Vec<AdviseeSummary> = users::advisees_of(&doc.users, teacher_id)
        .map(|s| AdviseeSummary {
            id: s.id,
            name: s.name.clone(),
            defense_date: s.defense_date.clone(),
        })
        .collect();
    let capacity = teacher.advisee_capacity.unwrap_or(default_advisee) as u64;
    let used = advisees.len() as u64;

    let jury_assignments: Vec<JuryAssignment> = doc
        .defenses
        .iter()
        .flat_map(|d| {
            d.committee_members
                .iter()
                .filter(move |m| m.role == CommitteeRole::Teacher && m.id == Some(teacher_id))
                .map(move |_| JuryAssignment {
                    defense_id: d.id,
                    student_id: d.student_id,
                    date: d.date.clone(),
                    final_score: d.final_score,
                })
        })
        .collect();

    let supervised: Vec<&Defense> = doc
        .defenses
        .iter()
        .filter(|d| advisees.iter().any(|s| s.id == d.student_id))
        .collect();

    Ok(TeacherReport {
        generated_at: time::now_iso(),
        teacher: PersonRef {
            id: teacher.id,
            name: teacher.name.clone(),
        },
        advisee_capacity: capacity,
        advisees_count: used,
        advisees_remaining: capacity as i64 - used as i64,
        advisees,
        jury_capacity: teacher.jury_capacity.unwrap_or(default_jury) as u64,
        jury_assignments_count: jury_assignments.len() as u64,
        jury_assignments,
        supervised_defenses_count: supervised.len() as u64,
        supervised_avg_score: average(supervised.iter().filter_map(|d| d.final_score)),
    })
}

pub fn build_student_report(doc: &Document, student_id: u64) -> Result<StudentReport, LedgerError> {
    let student = users::find_by_id(&doc.users, student_id)
        .filter(|u| u.role == Role::Student)
        .ok_or_else(|| LedgerError::NotFound(format!("student {} not found", student_id)))?;

    let advisor = student
        .advisor_id
        .and_then(|id| users::find_by_id(&doc.users, id))
        .map(|a| PersonRef {
            id: a.id,
            name: a.name.clone(),
        });

    Ok(StudentReport {
        generated_at: time::now_iso(),
        student: PersonRef {
            id: student.id,
            name: student.name.clone(),
        },
        advisor,
        defense: doc
            .defenses
            .iter()
            .find(|d| d.student_id == student_id)
            .cloned(),
        files: doc
            .files
            .iter()
            .filter(|f| f.uploader_id == Some(student_id))
            .map(|f| FileSummary {
                id: f.id,
                original_name: f.original_name.clone(),
                file_type: f.file_type.clone(),
            })
            .collect(),
    })
}

pub fn build_overall_report(doc: &Document) -> OverallReport {
    let mut counts: FxHashMap<u64, u64> = FxHashMap::default();
    for m in doc.defenses.iter().flat_map(|d| d.committee_members.iter()) {
        if let (CommitteeRole::Teacher, Some(id)) = (m.role, m.id) {
            *counts.entry(id).or_insert(0) += 1;
        }
    }
    let mut tallies: Vec<TeacherTally> = counts
        .into_iter()
        .map(|(teacher_id, assignments)| TeacherTally {
            teacher_id,
            name: users::find_by_id(&doc.users, teacher_id).map(|u| u.name.clone()),
            assignments,
        })
        .collect();
    tallies.sort_by(|a, b| {
        b.assignments
            .cmp(&a.assignments)
            .then(a.teacher_id.cmp(&b.teacher_id))
    });
    tallies.truncate(TOP_TEACHERS);

    OverallReport {
        generated_at: time::now_iso(),
        total_users: doc.users.len() as u64,
        total_teachers: doc.users.iter().filter(|u| u.is_teacher()).count() as u64,
        total_students: doc.users.iter().filter(|u| u.is_student()).count() as u64,
        total_defenses: doc.defenses.len() as u64,
        total_files: doc.files.len() as u64,
        total_messages: doc.messages.len() as u64,
        average_defense_score: average(doc.defenses.iter().filter_map(|d| d.final_score)),
        top_teachers_by_jury_assignments: tallies,
    }
}

// ---- store entry points ----

pub fn teacher_report(store: &Store, teacher_id: u64) -> Result<Report, LedgerError> {
    let (adv, jury) = (
        store.config.default_advisee_capacity,
        store.config.default_jury_capacity,
    );
    store.broker().read("reports.teacher", |doc| {
        build_teacher_report(doc, teacher_id, adv, jury).map(Report::TeacherReport)
    })
}

pub fn student_report(store: &Store, student_id: u64) -> Result<Report, LedgerError> {
    store.broker().read("reports.student", |doc| {
        build_student_report(doc, student_id).map(Report::StudentReport)
    })
}

pub fn overall_report(store: &Store) -> Result<Report, LedgerError> {
    store
        .broker()
        .read("reports.overall", |doc| Ok(Report::OverallReport(build_overall_report(doc))))
}

// ---- rendering ----

pub fn render_text(report: &Report) -> String {
    let mut t = String::new();
    match report {
        Report::TeacherReport(r) => {
            let _ = writeln!(t, "Report type: teacher_report");
            let _ = writeln!(t, "Generated at: {}", r.generated_at);
            let _ = writeln!(t, "Teacher: {} (id: {})", r.teacher.name, r.teacher.id);
            let _ = writeln!(
                t,
                "Advisees: {}/{} (remaining: {})",
                r.advisees_count, r.advisee_capacity, r.advisees_remaining
            );
            for s in &r.advisees {
                let _ = writeln!(
                    t,
                    " - {}: {} (defense_date: {})",
                    s.id,
                    output::compact_line(&s.name, 60),
                    output::or_none(s.defense_date.as_deref())
                );
            }
            let _ = writeln!(
                t,
                "Jury assignments: {}/{}",
                r.jury_assignments_count, r.jury_capacity
            );
            for j in &r.jury_assignments {
                let _ = writeln!(
                    t,
                    " - defense {} student {} date {} score {}",
                    j.defense_id,
                    j.student_id,
                    j.date,
                    output::or_none(j.final_score)
                );
            }
            let _ = writeln!(t, "Supervised defenses: {}", r.supervised_defenses_count);
            let _ = write!(
                t,
                "Supervised average score: {}",
                output::or_none(r.supervised_avg_score)
            );
        }
        Report::StudentReport(r) => {
            let _ = writeln!(t, "Report type: student_report");
            let _ = writeln!(t, "Generated at: {}", r.generated_at);
            let _ = writeln!(t, "Student: {} (id: {})", r.student.name, r.student.id);
            match &r.advisor {
                Some(a) => {
                    let _ = writeln!(t, "Advisor: {} (id: {})", a.name, a.id);
                }
                None => {
                    let _ = writeln!(t, "Advisor: None");
                }
            }
            match &r.defense {
                Some(d) => {
                    let _ = writeln!(
                        t,
                        "Defense id: {} date: {} final_score: {}",
                        d.id,
                        d.date,
                        output::or_none(d.final_score)
                    );
                }
                None => {
                    let _ = writeln!(t, "No defense recorded.");
                }
            }
            let _ = write!(t, "Files:");
            for f in &r.files {
                let _ = write!(
                    t,
                    "\n - {} {} ({})",
                    f.id,
                    output::compact_line(&f.original_name, 80),
                    f.file_type
                );
            }
        }
        Report::OverallReport(r) => {
            let _ = writeln!(t, "Report type: overall_report");
            let _ = writeln!(t, "Generated at: {}", r.generated_at);
            let _ = writeln!(
                t,
                "Users: {} (teachers: {}, students: {})",
                r.total_users, r.total_teachers, r.total_students
            );
            let _ = writeln!(t, "Defenses: {}", r.total_defenses);
            let _ = writeln!(t, "Files: {}", r.total_files);
            let _ = writeln!(t, "Messages: {}", r.total_messages);
            let _ = writeln!(
                t,
                "Average defense score: {}",
                output::or_none(r.average_defense_score)
            );
            let _ = write!(t, "Top teachers by jury assignments:");
            for tally in &r.top_teachers_by_jury_assignments {
                let _ = write!(
                    t,
                    "\n - {} {}: {}",
                    tally.teacher_id,
                    output::or_none(tally.name.as_deref()),
                    tally.assignments
                );
            }
        }
    }
    t
}

/// Render `report`; when `out_path` is given the rendering is also written there.
pub fn export(
    report: &Report,
    format: ExportFormat,
    out_path: Option<&Path>,
) -> Result<String, LedgerError> {
    let rendered = match format {
        ExportFormat::Json => {
            let bytes = output::to_indented_json(report)?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        ExportFormat::Text => render_text(report),
    };
    if let Some(path) = out_path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(LedgerError::IoError)?;
        }
        fs::write(path, &rendered).map_err(LedgerError::IoError)?;
        tracing::info!(path = %path.display(), "report exported");
    }
    Ok(rendered)
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "report",
        "version": "0.1.0",
        "description": "Read-only teacher, student, and overall reports",
        "commands": [
            { "name": "teacher", "parameters": ["id", "format", "out"] },
            { "name": "student", "parameters": ["id", "format", "out"] },
            { "name": "overall", "parameters": ["format", "out"] }
        ],
        "formats": ["json", "text"],
        "top_teachers": TOP_TEACHERS
    })
}

// ---- CLI ----

#[derive(Parser, Debug)]
#[clap(name = "report", about = "Generate read-only reports.")]
pub struct ReportCli {
    #[clap(subcommand)]
    pub command: ReportCommand,
    #[clap(long, value_enum, default_value = "json", global = true)]
    pub format: ExportFormat,
    /// Write the report to this file instead of stdout.
    #[clap(long, global = true)]
    pub out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    Teacher {
        #[clap(long)]
        id: u64,
    },
    Student {
        #[clap(long)]
        id: u64,
    },
    Overall,
}

pub fn run_report_cli(store: &Store, cli: ReportCli) -> Result<(), LedgerError> {
    let report = match cli.command {
        ReportCommand::Teacher { id } => teacher_report(store, id)?,
        ReportCommand::Student { id } => student_report(store, id)?,
        ReportCommand::Overall => overall_report(store)?,
    };
    let rendered = export(&report, cli.format, cli.out.as_deref())?;
    match cli.out {
        Some(path) => output::print_json(&time::command_envelope(
            "report.export",
            "ok",
            serde_json::json!({ "path": path.display().to_string() }),
        )),
        None => {
            println!("{}", rendered);
            Ok(())
        }
    }
}
