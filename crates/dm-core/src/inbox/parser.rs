//! Org-mode-style inbox file grammar: parsing and formatting records.
//!
//! A record is the longest run of lines starting from a `* MESSAGE` header
//! that does not cross into the next `* MESSAGE` header. The grammar is
//! intentionally forgiving of a partially-written trailing record, since the
//! file may be read while another process is mid-append.

use crate::message::{Message, Priority, StatusTag, TaskStatus, KNOWN_PROPERTY_KEYS};
use std::collections::BTreeMap;

const HEADER_PREFIX: &str = "* MESSAGE ";
const PROPERTIES_MARKER: &str = ":PROPERTIES:";
const END_MARKER: &str = ":END:";

/// Find the byte offset of every `HEADER_PREFIX` occurrence that starts a
/// line (either at the very start of the file, or immediately after a
/// `\n`). A header prefix appearing mid-line — e.g. a message body quoting
/// `"* MESSAGE "` — is not a record boundary and must not split the file.
fn header_positions(content: &str) -> Vec<usize> {
    let bytes = content.as_bytes();
    let mut positions = Vec::new();
    let mut idx = 0;
    while let Some(found) = content[idx..].find(HEADER_PREFIX) {
        let pos = idx + found;
        if pos == 0 || bytes[pos - 1] == b'\n' {
            positions.push(pos);
        }
        idx = pos + HEADER_PREFIX.len();
    }
    positions
}

/// Parse every complete record out of an inbox file's contents.
///
/// A trailing record missing its `:END:` (or missing properties block
/// entirely) is silently dropped rather than erroring: it represents a
/// concurrent writer that hasn't finished its append yet.
pub fn parse_records(content: &str) -> Vec<Message> {
    let mut records = Vec::new();
    let positions = header_positions(content);

    for (i, &start) in positions.iter().enumerate() {
        let chunk_start = start + HEADER_PREFIX.len();
        let chunk_end = positions.get(i + 1).copied().unwrap_or(content.len());
        if let Some(message) = parse_one(&content[chunk_start..chunk_end]) {
            records.push(message);
        }
    }

    records
}

/// Parse a single record body (everything after `* MESSAGE ` up to, but not
/// including, the next header). Returns `None` if the record is incomplete.
fn parse_one(chunk: &str) -> Option<Message> {
    let mut lines = chunk.lines();
    let header_rest = lines.next()?;

    let status = parse_status_tag(header_rest);
    let timestamp = parse_timestamp(header_rest).unwrap_or_default();

    let mut in_props = false;
    let mut saw_properties_marker = false;
    let mut saw_end_marker = false;
    let mut props: BTreeMap<String, String> = BTreeMap::new();
    let mut body_lines: Vec<&str> = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        if !in_props && !saw_end_marker && trimmed == PROPERTIES_MARKER {
            in_props = true;
            saw_properties_marker = true;
            continue;
        }
        if in_props && trimmed == END_MARKER {
            in_props = false;
            saw_end_marker = true;
            continue;
        }
        if in_props {
            if let Some((key, value)) = parse_property_line(trimmed) {
                props.insert(key.to_ascii_lowercase(), value.to_string());
            }
            continue;
        }
        if saw_end_marker {
            body_lines.push(line);
        }
    }

    if !saw_properties_marker || !saw_end_marker {
        // Partial trailing record: tolerate by treating it as absent.
        return None;
    }

    let id = props.remove("id")?;
    let from = props.remove("from").unwrap_or_default();
    let to = props.remove("to").unwrap_or_default();
    let priority = props
        .remove("priority")
        .and_then(|p| Priority::parse(&p))
        .unwrap_or_default();
    let thread = props.remove("thread");
    let reply_to = props.remove("reply_to");
    let task_status = props.remove("task_status").and_then(|s| TaskStatus::parse(&s));
    let started_at = props.remove("started_at");
    let completed_at = props.remove("completed_at");

    // Whatever is left in `props` is genuinely unknown to this crate;
    // preserve it verbatim on rewrite.
    let extra = props;

    let text = trim_body(&body_lines);

    Some(Message {
        id,
        from,
        to,
        timestamp,
        text,
        priority,
        status,
        thread,
        reply_to,
        task_status,
        started_at,
        completed_at,
        extra,
    })
}

fn parse_status_tag(header_rest: &str) -> Option<StatusTag> {
    for tag in [StatusTag::Unread, StatusTag::Todo, StatusTag::Done] {
        let marker = format!(":{}:", tag.as_str());
        if header_rest.contains(&marker) {
            return Some(tag);
        }
    }
    None
}

fn parse_timestamp(header_rest: &str) -> Option<String> {
    let start = header_rest.find('[')?;
    let end = header_rest[start..].find(']')? + start;
    Some(header_rest[start + 1..end].to_string())
}

/// Parse a `:KEY: VALUE` property line. Tolerant of the key containing no
/// other colons; the value is everything after the first `": "` following
/// the closing colon of the key.
fn parse_property_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix(':')?;
    let colon = rest.find(':')?;
    let key = &rest[..colon];
    if key.is_empty() {
        return None;
    }
    let value = rest[colon + 1..].trim_start();
    Some((key, value))
}

/// Drop leading/trailing blank lines from a body while preserving interior
/// whitespace exactly.
fn trim_body(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let Some(start) = start else {
        return String::new();
    };
    let end = lines.iter().rposition(|l| !l.trim().is_empty()).unwrap();
    lines[start..=end].join("\n")
}

/// Render a single record in the inbox file's on-disk format.
pub fn format_record(message: &Message) -> String {
    let tag = message
        .status
        .map(|t| format!(" :{}:", t.as_str()))
        .unwrap_or_default();

    let mut out = format!(
        "\n{HEADER_PREFIX}[{}]{tag}\n{PROPERTIES_MARKER}\n",
        message.timestamp
    );

    out.push_str(&format!(":ID: {}\n", message.id));
    out.push_str(&format!(":FROM: {}\n", message.from));
    out.push_str(&format!(":TO: {}\n", message.to));
    out.push_str(&format!(":PRIORITY: {}\n", message.priority.as_str()));
    if let Some(ref thread) = message.thread {
        out.push_str(&format!(":THREAD: {thread}\n"));
    }
    if let Some(ref reply_to) = message.reply_to {
        out.push_str(&format!(":REPLY_TO: {reply_to}\n"));
    }
    if let Some(task_status) = message.task_status {
        out.push_str(&format!(":TASK_STATUS: {}\n", task_status.as_str()));
    }
    if let Some(ref started_at) = message.started_at {
        out.push_str(&format!(":STARTED_AT: {started_at}\n"));
    }
    if let Some(ref completed_at) = message.completed_at {
        out.push_str(&format!(":COMPLETED_AT: {completed_at}\n"));
    }
    for (key, value) in &message.extra {
        if KNOWN_PROPERTY_KEYS.contains(&key.as_str()) {
            continue;
        }
        out.push_str(&format!(":{}: {value}\n", key.to_ascii_uppercase()));
    }
    out.push_str(END_MARKER);
    out.push('\n');
    out.push_str(&message.text);
    out.push('\n');
    out
}
