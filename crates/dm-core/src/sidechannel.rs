//! Side-channel Router: routes a completion message to additional
//! destinations beyond the primary reply.
//!
//! Each destination is evaluated independently — one failing does not
//! prevent the others, or the primary inbox delivery, from succeeding.

use crate::inbox;
use crate::io::InboxError;
use crate::message::Message;
use chrono::Utc;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// A parsed routing destination, as named in a `--route` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// `issue:<number>` — post as a comment via the `gh` CLI.
    Issue(u64),
    /// `file:<path>` — append a formatted block to a file.
    File(String),
    /// `@user` — CC another user's inbox.
    User(String),
}

impl Destination {
    /// Parse a single destination token.
    pub fn parse(token: &str) -> Option<Destination> {
        if let Some(rest) = token.strip_prefix("issue:") {
            return rest.parse().ok().map(Destination::Issue);
        }
        if let Some(rest) = token.strip_prefix("file:") {
            return Some(Destination::File(rest.to_string()));
        }
        if let Some(rest) = token.strip_prefix('@') {
            return Some(Destination::User(rest.to_string()));
        }
        None
    }
}

/// Error routing to a single destination. Each one is contained to its own
/// destination and never aborts the others.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("gh CLI not found; install from https://cli.github.com/")]
    GhNotFound,
    #[error("gh issue comment failed: {0}")]
    GhFailed(String),
    #[error("failed to run gh: {0}")]
    GhSpawn(String),
    #[error("file append failed: {0}")]
    File(#[from] std::io::Error),
    #[error("inbox write failed: {0}")]
    Inbox(#[from] InboxError),
}

/// One-line status summary of a single destination's routing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResult {
    pub destination: Destination,
    pub outcome: Result<String, String>,
}

/// Route `message`'s completion text to every destination, independently.
/// None of them affect whether the primary delivery (already performed by
/// the caller) succeeded.
pub async fn route_all(
    inboxes_dir: &Path,
    author: &str,
    text: &str,
    destinations: &[Destination],
) -> Vec<RouteResult> {
    let mut results = Vec::with_capacity(destinations.len());
    for destination in destinations {
        let outcome = match destination {
            Destination::Issue(number) => post_to_issue(*number, text)
                .await
                .map(|()| format!("posted to issue #{number}"))
                .map_err(|e| e.to_string()),
            Destination::File(path) => append_to_file(path, author, text)
                .map(|()| format!("appended to {path}"))
                .map_err(|e| e.to_string()),
            Destination::User(user) => cc_to_user(inboxes_dir, author, user, text)
                .map(|id| format!("cc'd to @{user} (id: {id})"))
                .map_err(|e| e.to_string()),
        };
        results.push(RouteResult {
            destination: destination.clone(),
            outcome,
        });
    }
    results
}

/// Post `text` as a comment to an external issue tracker via the `gh` CLI.
/// The contract with the collaborator is "post comment to issue N, return
/// success/failure" — we don't model its API beyond that.
async fn post_to_issue(number: u64, text: &str) -> Result<(), RouteError> {
    let number_arg = number.to_string();
    let text_owned = text.to_string();
    tokio::task::spawn_blocking(move || {
        let output = Command::new("gh")
            .args(["issue", "comment", &number_arg, "--body", &text_owned])
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RouteError::GhNotFound
                } else {
                    RouteError::GhSpawn(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RouteError::GhFailed(stderr.to_string()));
        }
        Ok(())
    })
    .await
    .map_err(|e| RouteError::GhSpawn(e.to_string()))?
}

/// Append a formatted block to a plain file, creating parent directories.
fn append_to_file(path: &str, author: &str, text: &str) -> Result<(), RouteError> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M");
    let block = format!("## {author} ({timestamp})\n\n{text}\n");
    crate::io::append(path, &block).map_err(|e| match e {
        InboxError::Io { source, .. } => RouteError::File(source),
        other => RouteError::Inbox(other),
    })
}

/// Write a CC entry to another user's inbox, preserving `thread` and
/// `reply_to` from the originating message.
fn cc_to_user(
    inboxes_dir: &Path,
    author: &str,
    user: &str,
    text: &str,
) -> Result<String, RouteError> {
    let now = Utc::now();
    let existing = inbox::existing_ids(inboxes_dir, user)?;
    let id = crate::id::generate_id(now, author, &existing);

    let message = Message {
        id: id.clone(),
        from: author.to_string(),
        to: user.to_string(),
        timestamp: now.format("%Y-%m-%d %a %H:%M").to_string(),
        text: text.to_string(),
        priority: crate::message::Priority::Normal,
        status: Some(crate::message::StatusTag::Unread),
        thread: None,
        reply_to: None,
        task_status: None,
        started_at: None,
        completed_at: None,
        extra: Default::default(),
    };

    inbox::append(inboxes_dir, user, &message)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_issue_destination() {
        assert_eq!(Destination::parse("issue:42"), Some(Destination::Issue(42)));
    }

    #[test]
    fn parse_file_destination() {
        assert_eq!(
            Destination::parse("file:research/notes.md"),
            Some(Destination::File("research/notes.md".to_string()))
        );
    }

    #[test]
    fn parse_user_destination() {
        assert_eq!(
            Destination::parse("@bob"),
            Some(Destination::User("bob".to_string()))
        );
    }

    #[test]
    fn parse_rejects_unknown_scheme() {
        assert_eq!(Destination::parse("ftp:foo"), None);
    }

    #[test]
    fn parse_rejects_non_numeric_issue() {
        assert_eq!(Destination::parse("issue:abc"), None);
    }

    #[tokio::test]
    async fn route_all_cc_to_user_writes_inbox_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let results = route_all(
            dir.path(),
            "alice-claude",
            "done!",
            &[Destination::User("bob".to_string())],
        )
        .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].outcome.is_ok());
        let scanned = inbox::scan(dir.path(), "bob", None).unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].text, "done!");
    }

    #[tokio::test]
    async fn route_all_file_destination_appends_formatted_block() {
        let dir = tempfile::TempDir::new().unwrap();
        let file_path = dir.path().join("notes.md");
        let results = route_all(
            dir.path(),
            "alice-claude",
            "finished research",
            &[Destination::File(file_path.to_str().unwrap().to_string())],
        )
        .await;

        assert!(results[0].outcome.is_ok());
        let contents = std::fs::read_to_string(&file_path).unwrap();
        assert!(contents.contains("## alice-claude"));
        assert!(contents.contains("finished research"));
    }

    #[tokio::test]
    async fn route_all_continues_past_a_failing_destination() {
        let dir = tempfile::TempDir::new().unwrap();
        let destinations = vec![
            Destination::Issue(1), // will fail: gh almost certainly absent in test env
            Destination::User("bob".to_string()),
        ];
        let results = route_all(dir.path(), "alice-claude", "text", &destinations).await;
        assert_eq!(results.len(), 2);
        assert!(results[1].outcome.is_ok());
    }
}
