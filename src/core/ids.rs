//! Identity allocation for the document's collections.
//!
//! Ids are `max(existing) + 1`, floored by a persisted high-water mark so a
//! deleted maximum-id record never has its id handed out again.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Files,
    Messages,
    Defenses,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collection::Users => "users",
            Collection::Files => "files",
            Collection::Messages => "messages",
            Collection::Defenses => "defenses",
        };
        write!(f, "{}", name)
    }
}

/// Records addressable by an integer id within their collection.
pub trait Identified {
    fn id(&self) -> u64;
}

/// Last id handed out per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sequences {
    pub users: u64,
    pub files: u64,
    pub messages: u64,
    pub defenses: u64,
}

impl Sequences {
    pub fn get(&self, collection: Collection) -> u64 {
        match collection {
            Collection::Users => self.users,
            Collection::Files => self.files,
            Collection::Messages => self.messages,
            Collection::Defenses => self.defenses,
        }
    }

    pub fn advance(&mut self, collection: Collection, id: u64) {
        let slot = match collection {
            Collection::Users => &mut self.users,
            Collection::Files => &mut self.files,
            Collection::Messages => &mut self.messages,
            Collection::Defenses => &mut self.defenses,
        };
        *slot = (*slot).max(id);
    }
}

pub fn next_id<T: Identified>(items: &[T], high_water: u64) -> u64 {
    items
        .iter()
        .map(Identified::id)
        .max()
        .unwrap_or(0)
        .max(high_water)
        + 1
}
