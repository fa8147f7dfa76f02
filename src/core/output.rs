//! Compact output rendering helpers for CLI surfaces.

use crate::core::error::LedgerError;
use serde::Serialize;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Render an optional value the way the text reports show absent fields.
pub fn or_none<T: std::fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "None".to_string(),
    }
}

/// Pretty JSON with a four-space indent, the layout of every file the store writes.
pub fn to_indented_json<T: Serialize>(value: &T) -> Result<Vec<u8>, LedgerError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), LedgerError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
