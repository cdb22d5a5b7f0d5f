//! The Inbox Store: append, scan, mark, and delete operations over a
//! per-recipient inbox file.

use super::parser::{format_record, parse_records};
use crate::io::{acquire_lock, append as append_file, rewrite_file, InboxError};
use crate::message::{Message, StatusTag};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const LOCK_RETRIES: u32 = 5;

/// Resolve the inbox file path for a handle under a workspace root.
pub fn inbox_path(inboxes_dir: &Path, handle: &str) -> PathBuf {
    inboxes_dir.join(format!("{handle}.org"))
}

/// Result of a `mark` or `delete` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The record was found and updated (or was already removed).
    Applied,
    /// No record with the given id exists in the file.
    NotFound,
}

/// Append `message` to `recipient`'s inbox file, creating parent
/// directories and the file itself as needed. Returns the id that was
/// written (callers generate the id beforehand via [`crate::id::generate_id`]
/// so it can be threaded through a reply chain before the write happens).
pub fn append(inboxes_dir: &Path, recipient: &str, message: &Message) -> Result<String, InboxError> {
    std::fs::create_dir_all(inboxes_dir).map_err(|e| InboxError::Io {
        path: inboxes_dir.to_path_buf(),
        source: e,
    })?;
    let path = inbox_path(inboxes_dir, recipient);
    let record = format_record(message);
    append_file(&path, &record)?;
    Ok(message.id.clone())
}

/// Every id currently present in `recipient`'s inbox file, for id collision
/// checks at message-authoring time. Missing file means no ids yet.
pub fn existing_ids(inboxes_dir: &Path, recipient: &str) -> Result<HashSet<String>, InboxError> {
    let path = inbox_path(inboxes_dir, recipient);
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let content = std::fs::read_to_string(&path).map_err(|e| InboxError::Io {
        path: path.clone(),
        source: e,
    })?;
    Ok(parse_records(&content).into_iter().map(|m| m.id).collect())
}

/// Find the `thread` of a message with the given id, if it can be located
/// anywhere under `inboxes_dir` (a reply's parent may live in a different
/// recipient's inbox than the one being appended to).
pub fn find_thread(inboxes_dir: &Path, id: &str) -> Option<String> {
    let entries = std::fs::read_dir(inboxes_dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("org") {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        if !content.contains(id) {
            continue;
        }
        for message in parse_records(&content) {
            if message.id == id {
                return message.thread;
            }
        }
    }
    None
}

/// Scan all records for `handle`, optionally filtered to a single status
/// tag. Records are returned in on-disk (authoring) order.
pub fn scan(
    inboxes_dir: &Path,
    handle: &str,
    filter: Option<StatusTag>,
) -> Result<Vec<Message>, InboxError> {
    let path = inbox_path(inboxes_dir, handle);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path).map_err(|e| InboxError::Io {
        path: path.clone(),
        source: e,
    })?;
    let records = parse_records(&content);
    Ok(match filter {
        Some(tag) => records.into_iter().filter(|m| m.status == Some(tag)).collect(),
        None => records,
    })
}

/// Rewrite the header of the record(s) matching `id`: strip any existing
/// status tag, then apply `new_status` (unless it's `None`, meaning
/// "clear"). Idempotent: calling this twice with the same arguments leaves
/// the file unchanged the second time. If two records pathologically share
/// the same id, both are updated, matching the spec's tolerance of operator
/// error over silent corruption.
pub fn mark(
    inboxes_dir: &Path,
    recipient: &str,
    id: &str,
    new_status: Option<StatusTag>,
) -> Result<MutationOutcome, InboxError> {
    let path = inbox_path(inboxes_dir, recipient);
    if !path.exists() {
        return Ok(MutationOutcome::NotFound);
    }

    let _lock = acquire_lock(&lock_path(&path), LOCK_RETRIES)?;

    let content = std::fs::read_to_string(&path).map_err(|e| InboxError::Io {
        path: path.clone(),
        source: e,
    })?;
    let mut records = parse_records(&content);

    let mut found = false;
    for record in records.iter_mut().filter(|r| r.id == id) {
        found = true;
        record.clear_status();
        record.status = new_status;
    }

    if !found {
        return Ok(MutationOutcome::NotFound);
    }

    rewrite_file(&path, &render_all(&records))?;
    Ok(MutationOutcome::Applied)
}

/// Begin working a task: clear `:unread:`, set `task_status = working` and
/// `started_at = now`.
pub fn dispatch_task(
    inboxes_dir: &Path,
    agent_handle: &str,
    id: &str,
    now: DateTime<Utc>,
) -> Result<MutationOutcome, InboxError> {
    let path = inbox_path(inboxes_dir, agent_handle);
    if !path.exists() {
        return Ok(MutationOutcome::NotFound);
    }
    let _lock = acquire_lock(&lock_path(&path), LOCK_RETRIES)?;

    let content = std::fs::read_to_string(&path).map_err(|e| InboxError::Io {
        path: path.clone(),
        source: e,
    })?;
    let mut records = parse_records(&content);

    let mut found = false;
    for record in records.iter_mut().filter(|r| r.id == id) {
        found = true;
        record.status = None;
        record.task_status = Some(crate::message::TaskStatus::Working);
        record.started_at = Some(format_timestamp(now));
    }
    if !found {
        return Ok(MutationOutcome::NotFound);
    }
    rewrite_file(&path, &render_all(&records))?;
    Ok(MutationOutcome::Applied)
}

/// Complete a task: set `:done:` header tag, `task_status = done`,
/// `completed_at = now`.
pub fn complete_task(
    inboxes_dir: &Path,
    agent_handle: &str,
    id: &str,
    now: DateTime<Utc>,
) -> Result<MutationOutcome, InboxError> {
    let path = inbox_path(inboxes_dir, agent_handle);
    if !path.exists() {
        return Ok(MutationOutcome::NotFound);
    }
    let _lock = acquire_lock(&lock_path(&path), LOCK_RETRIES)?;

    let content = std::fs::read_to_string(&path).map_err(|e| InboxError::Io {
        path: path.clone(),
        source: e,
    })?;
    let mut records = parse_records(&content);

    let mut found = false;
    for record in records.iter_mut().filter(|r| r.id == id) {
        found = true;
        record.status = Some(StatusTag::Done);
        record.task_status = Some(crate::message::TaskStatus::Done);
        record.completed_at = Some(format_timestamp(now));
    }
    if !found {
        return Ok(MutationOutcome::NotFound);
    }
    rewrite_file(&path, &render_all(&records))?;
    Ok(MutationOutcome::Applied)
}

/// Remove the record whose properties contain `id`. If `id` appears only in
/// body text of a different record, that record is left untouched.
/// Idempotent: deleting an already-absent id returns `NotFound`.
pub fn delete(inboxes_dir: &Path, recipient: &str, id: &str) -> Result<MutationOutcome, InboxError> {
    let path = inbox_path(inboxes_dir, recipient);
    if !path.exists() {
        return Ok(MutationOutcome::NotFound);
    }
    let _lock = acquire_lock(&lock_path(&path), LOCK_RETRIES)?;

    let content = std::fs::read_to_string(&path).map_err(|e| InboxError::Io {
        path: path.clone(),
        source: e,
    })?;
    let records = parse_records(&content);

    let before = records.len();
    let remaining: Vec<Message> = records.into_iter().filter(|r| r.id != id).collect();
    if remaining.len() == before {
        return Ok(MutationOutcome::NotFound);
    }

    rewrite_file(&path, &render_all(&remaining))?;
    Ok(MutationOutcome::Applied)
}

fn render_all(records: &[Message]) -> String {
    records.iter().map(format_record).collect()
}

fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format("[%Y-%m-%d %a %H:%M]").to_string()
}

fn lock_path(inbox_path: &Path) -> PathBuf {
    inbox_path.with_extension("org.lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::generate_id;
    use crate::message::Priority;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 28, 14, 0, 0).unwrap()
    }

    fn new_message(id: &str, from: &str, to: &str, text: &str) -> Message {
        Message {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            timestamp: "2026-07-28 Tue 14:00".to_string(),
            text: text.to_string(),
            priority: Priority::Normal,
            status: Some(StatusTag::Unread),
            thread: None,
            reply_to: None,
            task_status: None,
            started_at: None,
            completed_at: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn append_then_scan_round_trips() {
        let dir = TempDir::new().unwrap();
        let msg = new_message("msg-20260728-140000-alice", "alice", "bob", "hi bob");
        append(dir.path(), "bob", &msg).unwrap();

        let scanned = scan(dir.path(), "bob", None).unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].text, "hi bob");
    }

    #[test]
    fn scan_filters_by_status() {
        let dir = TempDir::new().unwrap();
        let mut unread = new_message("msg-1-alice", "alice", "bob", "one");
        unread.status = Some(StatusTag::Unread);
        let mut done = new_message("msg-2-alice", "alice", "bob", "two");
        done.status = Some(StatusTag::Done);
        append(dir.path(), "bob", &unread).unwrap();
        append(dir.path(), "bob", &done).unwrap();

        let unread_only = scan(dir.path(), "bob", Some(StatusTag::Unread)).unwrap();
        assert_eq!(unread_only.len(), 1);
        assert_eq!(unread_only[0].id, "msg-1-alice");
    }

    #[test]
    fn mark_clears_and_sets_new_tag() {
        let dir = TempDir::new().unwrap();
        let msg = new_message("msg-1-alice", "alice", "bob", "one");
        append(dir.path(), "bob", &msg).unwrap();

        let outcome = mark(dir.path(), "bob", "msg-1-alice", Some(StatusTag::Done)).unwrap();
        assert_eq!(outcome, MutationOutcome::Applied);

        let scanned = scan(dir.path(), "bob", None).unwrap();
        assert_eq!(scanned[0].status, Some(StatusTag::Done));
    }

    #[test]
    fn mark_clear_removes_tag_entirely() {
        let dir = TempDir::new().unwrap();
        let msg = new_message("msg-1-alice", "alice", "bob", "one");
        append(dir.path(), "bob", &msg).unwrap();

        mark(dir.path(), "bob", "msg-1-alice", None).unwrap();
        let scanned = scan(dir.path(), "bob", None).unwrap();
        assert_eq!(scanned[0].status, None);
    }

    #[test]
    fn mark_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let msg = new_message("msg-1-alice", "alice", "bob", "one");
        append(dir.path(), "bob", &msg).unwrap();

        mark(dir.path(), "bob", "msg-1-alice", Some(StatusTag::Done)).unwrap();
        let first_pass = std::fs::read_to_string(inbox_path(dir.path(), "bob")).unwrap();
        mark(dir.path(), "bob", "msg-1-alice", Some(StatusTag::Done)).unwrap();
        let second_pass = std::fs::read_to_string(inbox_path(dir.path(), "bob")).unwrap();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn mark_not_found_returns_not_found() {
        let dir = TempDir::new().unwrap();
        let msg = new_message("msg-1-alice", "alice", "bob", "one");
        append(dir.path(), "bob", &msg).unwrap();

        let outcome = mark(dir.path(), "bob", "msg-missing", Some(StatusTag::Done)).unwrap();
        assert_eq!(outcome, MutationOutcome::NotFound);
    }

    #[test]
    fn mark_updates_both_records_sharing_a_duplicate_id() {
        let dir = TempDir::new().unwrap();
        let msg1 = new_message("msg-dup", "alice", "bob", "one");
        let msg2 = new_message("msg-dup", "carol", "bob", "two");
        append(dir.path(), "bob", &msg1).unwrap();
        append(dir.path(), "bob", &msg2).unwrap();

        mark(dir.path(), "bob", "msg-dup", Some(StatusTag::Done)).unwrap();
        let scanned = scan(dir.path(), "bob", None).unwrap();
        assert_eq!(scanned.len(), 2);
        assert!(scanned.iter().all(|m| m.status == Some(StatusTag::Done)));
    }

    #[test]
    fn delete_removes_record_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let msg = new_message("msg-1-alice", "alice", "bob", "one");
        append(dir.path(), "bob", &msg).unwrap();

        let outcome = delete(dir.path(), "bob", "msg-1-alice").unwrap();
        assert_eq!(outcome, MutationOutcome::Applied);
        assert!(scan(dir.path(), "bob", None).unwrap().is_empty());

        let second = delete(dir.path(), "bob", "msg-1-alice").unwrap();
        assert_eq!(second, MutationOutcome::NotFound);
    }

    #[test]
    fn delete_only_removes_record_whose_properties_hold_the_id() {
        let dir = TempDir::new().unwrap();
        let mut mentions_id_in_body = new_message("msg-2-alice", "alice", "bob", "see msg-1-alice for context");
        mentions_id_in_body.status = Some(StatusTag::Unread);
        let target = new_message("msg-1-alice", "alice", "bob", "original");
        append(dir.path(), "bob", &target).unwrap();
        append(dir.path(), "bob", &mentions_id_in_body).unwrap();

        delete(dir.path(), "bob", "msg-1-alice").unwrap();
        let remaining = scan(dir.path(), "bob", None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "msg-2-alice");
    }

    #[test]
    fn dispatch_then_complete_transitions_task_status() {
        let dir = TempDir::new().unwrap();
        let msg = new_message("msg-1-alice", "alice", "bob-claude", "do the thing");
        append(dir.path(), "bob-claude", &msg).unwrap();

        dispatch_task(dir.path(), "bob-claude", "msg-1-alice", now()).unwrap();
        let working = scan(dir.path(), "bob-claude", None).unwrap();
        assert_eq!(working[0].status, None);
        assert_eq!(working[0].task_status, Some(crate::message::TaskStatus::Working));
        assert!(working[0].started_at.is_some());

        complete_task(dir.path(), "bob-claude", "msg-1-alice", now()).unwrap();
        let done = scan(dir.path(), "bob-claude", None).unwrap();
        assert_eq!(done[0].status, Some(StatusTag::Done));
        assert_eq!(done[0].task_status, Some(crate::message::TaskStatus::Done));
        assert!(done[0].completed_at.is_some());
    }

    #[test]
    fn generate_id_avoids_collision_with_existing_inbox_contents() {
        let dir = TempDir::new().unwrap();
        let msg = new_message("msg-20260728-140000-alice", "alice", "bob", "one");
        append(dir.path(), "bob", &msg).unwrap();

        let existing = existing_ids(dir.path(), "bob").unwrap();
        let id = generate_id(now(), "alice", &existing);
        assert_eq!(id, "msg-20260728-140000-alice-2");
    }

    #[test]
    fn find_thread_locates_parent_in_any_inbox_under_dir() {
        let dir = TempDir::new().unwrap();
        let mut parent = new_message("msg-1-alice", "alice", "bob", "parent");
        parent.thread = Some("thread-msg-0-root".to_string());
        append(dir.path(), "bob", &parent).unwrap();

        let thread = find_thread(dir.path(), "msg-1-alice");
        assert_eq!(thread, Some("thread-msg-0-root".to_string()));
    }

    #[test]
    fn find_thread_returns_none_for_unknown_id() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_thread(dir.path(), "msg-ghost"), None);
    }
}
