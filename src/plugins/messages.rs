//! Correspondence log: append-only messages between accounts.
//!
//! Messages can be marked read but never edited or removed.

use crate::core::error::LedgerError;
use crate::core::ids::{Collection, Identified};
use crate::core::output;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::users::UserDirectory;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender_id: u64,
    pub receiver_id: u64,
    pub text: String,
    pub created_at: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_at: Option<String>,
}

impl Identified for Message {
    fn id(&self) -> u64 {
        self.id
    }
}

impl Message {
    fn sent_at(&self) -> DateTime<Utc> {
        time::parse_timestamp(&self.created_at).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn involves(&self, user_id: u64) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }
}

/// Filters for [`search`]. The time window is half-open:
/// `since <= created_at < until`.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub sender_id: Option<u64>,
    pub receiver_id: Option<u64>,
    pub since: Option<String>,
    pub until: Option<String>,
}

fn parse_bound(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, LedgerError> {
    raw.map(time::parse_timestamp).transpose()
}

/// Newest first; equal timestamps put the higher id first.
fn newest_first(items: &mut [(DateTime<Utc>, Message)]) {
    items.sort_by(|(ta, a), (tb, b)| tb.cmp(ta).then(b.id.cmp(&a.id)));
}

fn validate_text(text: &str, max_chars: usize) -> Result<(), LedgerError> {
    if text.trim().is_empty() {
        return Err(LedgerError::ValidationError(
            "message text must be a non-empty string".to_string(),
        ));
    }
    let len = text.chars().count();
    if len > max_chars {
        return Err(LedgerError::ValidationError(format!(
            "message is too long ({} characters, max {})",
            len, max_chars
        )));
    }
    Ok(())
}

fn check_participant(
    directory: &dyn UserDirectory,
    id: u64,
    label: &str,
) -> Result<(), LedgerError> {
    match directory.get_by_id(id) {
        None => Err(LedgerError::NotFound(format!("{} {} not found", label, id))),
        Some(u) if !u.is_active => Err(LedgerError::ValidationError(format!(
            "{} {} is not active",
            label, id
        ))),
        Some(_) => Ok(()),
    }
}

pub fn send(
    store: &Store,
    sender_id: u64,
    receiver_id: u64,
    text: &str,
) -> Result<Message, LedgerError> {
    validate_text(text, store.config.max_message_chars)?;

    let actor = format!("user:{}", sender_id);
    store.broker().transact(&actor, "messages.send", |doc| {
        check_participant(&doc.users, sender_id, "sender")?;
        check_participant(&doc.users, receiver_id, "receiver")?;

        let record = Message {
            id: doc.allocate_id(Collection::Messages),
            sender_id,
            receiver_id,
            text: text.to_string(),
            created_at: time::now_iso(),
            is_read: false,
            read_at: None,
        };
        doc.messages.push(record.clone());
        Ok(record)
    })
}

/// Messages a user sent or received (all messages when `user_id` is `None`),
/// strictly after `since`, newest first, truncated to `limit`.
pub fn list(
    store: &Store,
    user_id: Option<u64>,
    limit: Option<usize>,
    since: Option<&str>,
) -> Result<Vec<Message>, LedgerError> {
    let since = parse_bound(since)?;
    store.broker().read("messages.list", |doc| {
        let mut hits: Vec<(DateTime<Utc>, Message)> = doc
            .messages
            .iter()
            .filter(|m| user_id.is_none_or(|uid| m.involves(uid)))
            .map(|m| (m.sent_at(), m))
            .filter(|(ts, _)| since.is_none_or(|s| *ts > s))
            .map(|(ts, m)| (ts, m.clone()))
            .collect();
        newest_first(&mut hits);
        let mut out: Vec<Message> = hits.into_iter().map(|(_, m)| m).collect();
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    })
}

pub fn search(
    store: &Store,
    query: &str,
    filter: &MessageFilter,
) -> Result<Vec<Message>, LedgerError> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Err(LedgerError::ValidationError(
            "search query must be a non-empty string".to_string(),
        ));
    }
    let since = parse_bound(filter.since.as_deref())?;
    let until = parse_bound(filter.until.as_deref())?;

    store.broker().read("messages.search", |doc| {
        let mut hits: Vec<(DateTime<Utc>, Message)> = doc
            .messages
            .iter()
            .filter(|m| filter.sender_id.is_none_or(|id| m.sender_id == id))
            .filter(|m| filter.receiver_id.is_none_or(|id| m.receiver_id == id))
            .map(|m| (m.sent_at(), m))
            .filter(|(ts, _)| since.is_none_or(|s| *ts >= s))
            .filter(|(ts, _)| until.is_none_or(|u| *ts < u))
            .filter(|(_, m)| m.text.to_lowercase().contains(&needle))
            .map(|(ts, m)| (ts, m.clone()))
            .collect();
        newest_first(&mut hits);
        Ok(hits.into_iter().map(|(_, m)| m).collect())
    })
}

/// Returns whether the message exists. Only the first call sets `read_at`;
/// later calls and unknown ids write nothing.
pub fn mark_read(store: &Store, message_id: u64) -> Result<bool, LedgerError> {
    let mut found = false;
    store
        .broker()
        .transact_optional("thesis", "messages.mark_read", |doc| {
            let Some(m) = doc.messages.iter_mut().find(|m| m.id == message_id) else {
                return Ok(None);
            };
            found = true;
            if m.is_read {
                return Ok(None);
            }
            m.is_read = true;
            m.read_at = Some(time::now_iso());
            Ok(Some(()))
        })?;
    Ok(found)
}

/// Messages are permanent; this refuses for every id, existing or not.
pub fn delete(_store: &Store, message_id: u64) -> Result<(), LedgerError> {
    Err(LedgerError::PermissionDenied(format!(
        "messages are non-deletable (message {})",
        message_id
    )))
}

pub fn get_message(store: &Store, message_id: u64) -> Result<Option<Message>, LedgerError> {
    store.broker().read("messages.get", |doc| {
        Ok(doc.messages.iter().find(|m| m.id == message_id).cloned())
    })
}

pub fn unread_count(store: &Store, user_id: u64) -> Result<u64, LedgerError> {
    store.broker().read("messages.unread", |doc| {
        Ok(doc
            .messages
            .iter()
            .filter(|m| m.receiver_id == user_id && !m.is_read)
            .count() as u64)
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "msg",
        "version": "0.1.0",
        "description": "Append-only correspondence log",
        "commands": [
            { "name": "send", "parameters": ["from", "to", "text"] },
            { "name": "list", "parameters": ["user", "limit", "since"] },
            { "name": "search", "parameters": ["query", "from", "to", "since", "until"] },
            { "name": "read", "parameters": ["id"] },
            { "name": "delete", "description": "Always refused" },
            { "name": "unread", "parameters": ["user"] }
        ],
        "storage": ["db.json#messages"]
    })
}

// ---- CLI ----

#[derive(Parser, Debug)]
#[clap(name = "msg", about = "Send, list, and search messages.")]
pub struct MessageCli {
    #[clap(subcommand)]
    pub command: MessageCommand,
}

#[derive(Subcommand, Debug)]
pub enum MessageCommand {
    Send {
        #[clap(long)]
        from: u64,
        #[clap(long)]
        to: u64,
        #[clap(long)]
        text: String,
    },
    List {
        #[clap(long)]
        user: Option<u64>,
        #[clap(long)]
        limit: Option<usize>,
        /// ISO-8601 timestamp; only messages strictly after it.
        #[clap(long)]
        since: Option<String>,
    },
    Search {
        query: String,
        #[clap(long)]
        from: Option<u64>,
        #[clap(long)]
        to: Option<u64>,
        /// ISO-8601 timestamp, inclusive.
        #[clap(long)]
        since: Option<String>,
        /// ISO-8601 timestamp, exclusive.
        #[clap(long)]
        until: Option<String>,
    },
    /// Mark a message as read.
    Read {
        #[clap(long)]
        id: u64,
    },
    Get {
        #[clap(long)]
        id: u64,
    },
    Unread {
        #[clap(long)]
        user: u64,
    },
    Delete {
        #[clap(long)]
        id: u64,
    },
}

pub fn run_message_cli(store: &Store, cli: MessageCli) -> Result<(), LedgerError> {
    let out = match cli.command {
        MessageCommand::Send { from, to, text } => {
            let msg = send(store, from, to, &text)?;
            time::command_envelope("msg.send", "ok", serde_json::json!({ "item": msg }))
        }
        MessageCommand::List { user, limit, since } => {
            let items = list(store, user, limit, since.as_deref())?;
            time::command_envelope("msg.list", "ok", serde_json::json!({ "items": items }))
        }
        MessageCommand::Search {
            query,
            from,
            to,
            since,
            until,
        } => {
            let filter = MessageFilter {
                sender_id: from,
                receiver_id: to,
                since,
                until,
            };
            let items = search(store, &query, &filter)?;
            time::command_envelope("msg.search", "ok", serde_json::json!({ "items": items }))
        }
        MessageCommand::Read { id } => {
            let found = mark_read(store, id)?;
            time::command_envelope(
                "msg.read",
                if found { "ok" } else { "not_found" },
                serde_json::json!({ "id": id }),
            )
        }
        MessageCommand::Get { id } => {
            let item = get_message(store, id)?;
            time::command_envelope(
                "msg.get",
                if item.is_some() { "ok" } else { "not_found" },
                serde_json::json!({ "item": item }),
            )
        }
        MessageCommand::Unread { user } => {
            let count = unread_count(store, user)?;
            time::command_envelope(
                "msg.unread",
                "ok",
                serde_json::json!({ "user_id": user, "unread": count }),
            )
        }
        MessageCommand::Delete { id } => {
            delete(store, id)?;
            time::command_envelope("msg.delete", "ok", serde_json::json!({ "id": id }))
        }
    };
    output::print_json(&out)
}
