//! Agent Task Queue: single-in-flight task discipline over an agent's inbox.
//!
//! The agent's inbox is the user-handle `<user>-claude`. Unlike the user
//! facing status tag, `task_status` is agent-only and mediates a strict
//! `unread -> working -> done` transition under the agent's own control.

use crate::inbox::store;
use crate::io::InboxError;
use crate::message::{Message, Priority, StatusTag, TaskStatus};
use chrono::{DateTime, Utc};
use std::path::Path;

/// How many pending tasks `status()` surfaces.
const STATUS_PREVIEW_COUNT: usize = 5;

/// Outcome of a dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A task was selected and marked `working`.
    Dispatched(Message),
    /// A task is already `working`; no new task was dispatched.
    Busy { working: Message },
    /// No working task and no pending task.
    Empty,
}

/// Read-only snapshot of the queue's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub working: Option<Message>,
    /// Up to [`STATUS_PREVIEW_COUNT`] pending tasks, priority-sorted.
    pub pending_preview: Vec<Message>,
    pub pending_count: usize,
    pub completed_count: usize,
}

/// Sort key: high priority first, then chronological (ascending id, since
/// ids are timestamp-prefixed).
fn sort_pending(mut pending: Vec<Message>) -> Vec<Message> {
    pending.sort_by(|a, b| {
        let priority_rank = |p: Priority| if p == Priority::High { 0 } else { 1 };
        priority_rank(a.priority)
            .cmp(&priority_rank(b.priority))
            .then_with(|| a.id.cmp(&b.id))
    });
    pending
}

fn working_tasks(inboxes_dir: &Path, agent_handle: &str) -> Result<Vec<Message>, InboxError> {
    let all = store::scan(inboxes_dir, agent_handle, None)?;
    Ok(all
        .into_iter()
        .filter(|m| m.task_status == Some(TaskStatus::Working))
        .collect())
}

fn pending_tasks(inboxes_dir: &Path, agent_handle: &str) -> Result<Vec<Message>, InboxError> {
    let unread = store::scan(inboxes_dir, agent_handle, Some(StatusTag::Unread))?;
    Ok(sort_pending(unread))
}

/// Before presenting any new task, check for an in-flight one. If none,
/// select the next pending task by priority then chronological order and
/// mark it `working`.
pub fn dispatch(
    inboxes_dir: &Path,
    agent_handle: &str,
    now: DateTime<Utc>,
) -> Result<DispatchOutcome, InboxError> {
    let working = working_tasks(inboxes_dir, agent_handle)?;
    if let Some(task) = working.into_iter().next() {
        return Ok(DispatchOutcome::Busy { working: task });
    }

    let pending = pending_tasks(inboxes_dir, agent_handle)?;
    let Some(next) = pending.into_iter().next() else {
        return Ok(DispatchOutcome::Empty);
    };

    store::dispatch_task(inboxes_dir, agent_handle, &next.id, now)?;
    let dispatched = store::scan(inboxes_dir, agent_handle, None)?
        .into_iter()
        .find(|m| m.id == next.id)
        .expect("just-dispatched record must still be present");
    Ok(DispatchOutcome::Dispatched(dispatched))
}

/// Mark the working task referenced by `id` as complete.
pub fn complete(
    inboxes_dir: &Path,
    agent_handle: &str,
    id: &str,
    now: DateTime<Utc>,
) -> Result<store::MutationOutcome, InboxError> {
    store::complete_task(inboxes_dir, agent_handle, id, now)
}

/// A read-only snapshot: the working task (if any), a preview of the next
/// pending tasks, and a completed count.
pub fn status(inboxes_dir: &Path, agent_handle: &str) -> Result<QueueStatus, InboxError> {
    let working = working_tasks(inboxes_dir, agent_handle)?.into_iter().next();
    let pending = pending_tasks(inboxes_dir, agent_handle)?;
    let completed_count = store::scan(inboxes_dir, agent_handle, Some(StatusTag::Done))?.len();

    Ok(QueueStatus {
        working,
        pending_count: pending.len(),
        pending_preview: pending.into_iter().take(STATUS_PREVIEW_COUNT).collect(),
        completed_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::append;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 28, 14, 0, 0).unwrap()
    }

    fn unread(id: &str, from: &str, priority: Priority, text: &str) -> Message {
        Message {
            id: id.to_string(),
            from: from.to_string(),
            to: "alice-claude".to_string(),
            timestamp: "2026-07-28 Tue 14:00".to_string(),
            text: text.to_string(),
            priority,
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
    fn dispatch_selects_earlier_of_two_unread() {
        let dir = TempDir::new().unwrap();
        let first = unread("msg-20260728-140000-bob", "bob", Priority::Normal, "first");
        let second = unread("msg-20260728-140100-bob", "bob", Priority::Normal, "second");
        append(dir.path(), "alice-claude", &first).unwrap();
        append(dir.path(), "alice-claude", &second).unwrap();

        let outcome = dispatch(dir.path(), "alice-claude", now()).unwrap();
        match outcome {
            DispatchOutcome::Dispatched(task) => {
                assert_eq!(task.id, "msg-20260728-140000-bob");
                assert_eq!(task.status, None);
                assert_eq!(task.task_status, Some(TaskStatus::Working));
            }
            other => panic!("expected Dispatched, got {other:?}"),
        }
    }

    #[test]
    fn dispatch_prefers_high_priority_over_earlier_normal() {
        let dir = TempDir::new().unwrap();
        let early_normal = unread("msg-20260728-140000-bob", "bob", Priority::Normal, "early");
        let later_high = unread("msg-20260728-140100-bob", "bob", Priority::High, "urgent");
        append(dir.path(), "alice-claude", &early_normal).unwrap();
        append(dir.path(), "alice-claude", &later_high).unwrap();

        let outcome = dispatch(dir.path(), "alice-claude", now()).unwrap();
        match outcome {
            DispatchOutcome::Dispatched(task) => assert_eq!(task.id, "msg-20260728-140100-bob"),
            other => panic!("expected Dispatched, got {other:?}"),
        }
    }

    #[test]
    fn second_dispatch_while_working_returns_busy() {
        let dir = TempDir::new().unwrap();
        let first = unread("msg-20260728-140000-bob", "bob", Priority::Normal, "first");
        let second = unread("msg-20260728-140100-bob", "bob", Priority::Normal, "second");
        append(dir.path(), "alice-claude", &first).unwrap();
        append(dir.path(), "alice-claude", &second).unwrap();

        dispatch(dir.path(), "alice-claude", now()).unwrap();
        let outcome = dispatch(dir.path(), "alice-claude", now()).unwrap();
        match outcome {
            DispatchOutcome::Busy { working } => assert_eq!(working.id, "msg-20260728-140000-bob"),
            other => panic!("expected Busy, got {other:?}"),
        }
    }

    #[test]
    fn complete_then_dispatch_selects_next_pending() {
        let dir = TempDir::new().unwrap();
        let first = unread("msg-20260728-140000-bob", "bob", Priority::Normal, "first");
        let second = unread("msg-20260728-140100-bob", "bob", Priority::Normal, "second");
        append(dir.path(), "alice-claude", &first).unwrap();
        append(dir.path(), "alice-claude", &second).unwrap();

        dispatch(dir.path(), "alice-claude", now()).unwrap();
        complete(dir.path(), "alice-claude", "msg-20260728-140000-bob", now()).unwrap();

        let outcome = dispatch(dir.path(), "alice-claude", now()).unwrap();
        match outcome {
            DispatchOutcome::Dispatched(task) => assert_eq!(task.id, "msg-20260728-140100-bob"),
            other => panic!("expected Dispatched, got {other:?}"),
        }
    }

    #[test]
    fn dispatch_on_empty_inbox_is_empty() {
        let dir = TempDir::new().unwrap();
        let outcome = dispatch(dir.path(), "alice-claude", now()).unwrap();
        assert_eq!(outcome, DispatchOutcome::Empty);
    }

    #[test]
    fn status_reports_working_pending_and_completed_counts() {
        let dir = TempDir::new().unwrap();
        for i in 0..7 {
            let msg = unread(
                &format!("msg-20260728-1400{i:02}-bob"),
                "bob",
                Priority::Normal,
                "task",
            );
            append(dir.path(), "alice-claude", &msg).unwrap();
        }
        dispatch(dir.path(), "alice-claude", now()).unwrap();

        let snapshot = status(dir.path(), "alice-claude").unwrap();
        assert!(snapshot.working.is_some());
        assert_eq!(snapshot.pending_count, 6);
        assert_eq!(snapshot.pending_preview.len(), STATUS_PREVIEW_COUNT);
        assert_eq!(snapshot.completed_count, 0);
    }
}
