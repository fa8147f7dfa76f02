//! Ledgers over the shared document, one per collection, plus reports.

pub mod defenses;
pub mod files;
pub mod messages;
pub mod reports;
pub mod users;
