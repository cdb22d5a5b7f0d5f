//! Router & Presence Bus: turns an authenticated `send` frame into a durable
//! inbox append plus an at-most-one live delivery, and turns join/leave/
//! status-change events into presence broadcasts.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use dmrelay_core::resolver::{resolve, Resolution};
use dmrelay_core::{inbox, Message, Priority, StatusTag};
use tracing::{info, warn};

use crate::protocol::{PresenceStatus, ServerFrame};
use crate::registry::SharedSessionRegistry;

/// Outcome of routing a single `send` frame, returned to the sender as a
/// `send_ack`.
pub struct SendOutcome {
    pub to: String,
    pub delivered: bool,
    pub auto_replied: bool,
}

/// Route `text` from `from` to `to`, appending a durable copy to the
/// recipient's inbox and pushing a live `message` frame if the recipient has
/// an open session. Handles `@claude` rewriting and whitelist refusal via
/// [`dmrelay_core::resolver::resolve`].
#[allow(clippy::too_many_arguments)]
pub fn route_send(
    inboxes_dir: &Path,
    registry: &SharedSessionRegistry,
    from: &str,
    to: &str,
    text: &str,
    priority: Priority,
    thread: Option<&str>,
    reply_to: Option<&str>,
    now: DateTime<Utc>,
) -> SendOutcome {
    let registry_guard = registry.lock().unwrap();
    let resolution = resolve(from, to, &*registry_guard);
    drop(registry_guard);

    match resolution {
        Resolution::Allowed { target } => {
            let delivered = deliver(inboxes_dir, registry, from, &target, text, priority, thread, reply_to, now);
            SendOutcome {
                to: target,
                delivered,
                auto_replied: false,
            }
        }
        Resolution::Refused {
            target,
            auto_reply_text,
        } => {
            // The refusal itself is delivered back to the sender, "from" the
            // refused target, so it reads as a normal inbox message.
            deliver(inboxes_dir, registry, &target, from, &auto_reply_text, Priority::Normal, None, None, now);
            SendOutcome {
                to: target,
                delivered: false,
                auto_replied: true,
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn deliver(
    inboxes_dir: &Path,
    registry: &SharedSessionRegistry,
    from: &str,
    to: &str,
    text: &str,
    priority: Priority,
    thread_hint: Option<&str>,
    reply_to: Option<&str>,
    now: DateTime<Utc>,
) -> bool {
    let existing = inbox::existing_ids(inboxes_dir, to).unwrap_or_default();
    let id = dmrelay_core::id::generate_id(now, from, &existing);

    let parent_thread = reply_to.and_then(|r| inbox::find_thread(inboxes_dir, r));
    let thread = thread_hint
        .map(|t| t.to_string())
        .or_else(|| dmrelay_core::id::resolve_thread(reply_to, parent_thread.as_deref()));

    let message = Message {
        id: id.clone(),
        from: from.to_string(),
        to: to.to_string(),
        timestamp: now.format("[%Y-%m-%d %a %H:%M]").to_string(),
        text: text.to_string(),
        priority,
        status: Some(StatusTag::Unread),
        thread,
        reply_to: reply_to.map(|r| r.to_string()),
        task_status: None,
        started_at: None,
        completed_at: None,
        extra: Default::default(),
    };

    if let Err(err) = inbox::append(inboxes_dir, to, &message) {
        warn!(recipient = to, error = %err, "failed to append message to inbox");
        return false;
    }

    let registry_guard = registry.lock().unwrap();
    if let Some(session) = registry_guard.get(to) {
        session.send(ServerFrame::Message {
            from: message.from.clone(),
            text: message.text.clone(),
            priority: message.priority,
            msg_id: message.id.clone(),
            timestamp: message.timestamp.clone(),
            thread: message.thread.clone(),
            reply_to: message.reply_to.clone(),
            auto_reply: None,
        });
        info!(from, to, msg_id = %message.id, "delivered live");
        true
    } else {
        info!(from, to, msg_id = %message.id, "queued for offline recipient");
        false
    }
}

/// Broadcasts a presence snapshot to every online session.
pub fn broadcast_presence(registry: &SharedSessionRegistry) {
    let guard = registry.lock().unwrap();
    let online = guard.online_handles();
    let statuses = guard.statuses();
    guard.broadcast_except(None, || ServerFrame::Presence {
        online: online.clone(),
        statuses: statuses.clone(),
    });
}

/// Broadcasts that `user` changed presence, to everyone else currently
/// online.
pub fn broadcast_presence_change(registry: &SharedSessionRegistry, user: &str, status: PresenceStatus) {
    let guard = registry.lock().unwrap();
    let online = guard.online_handles();
    let statuses = guard.statuses();
    guard.broadcast_except(Some(user), || ServerFrame::PresenceChange {
        user: user.to_string(),
        status,
        online: online.clone(),
        statuses: statuses.clone(),
    });
}

pub fn snapshot(registry: &SharedSessionRegistry) -> (Vec<String>, BTreeMap<String, PresenceStatus>) {
    let guard = registry.lock().unwrap();
    (guard.online_handles(), guard.statuses())
}

/// Exposed for the status endpoint: a flat set of online handles.
pub fn online_set(registry: &SharedSessionRegistry) -> HashSet<String> {
    registry.lock().unwrap().online_handles().into_iter().collect()
}
