//! Core modules: the document store, its broker, and shared primitives.
//!
//! Ledgers in [`crate::plugins`] build on these; nothing here knows about
//! advisor rules or committees.

pub mod broker;
pub mod config;
pub mod error;
pub mod ids;
pub mod logging;
pub mod output;
pub mod password;
pub mod store;
pub mod time;
