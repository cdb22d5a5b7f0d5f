//! Message identifier generation and thread resolution.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Format a message id as `msg-<UTCdate>-<UTCtime>-<author>`.
///
/// Collisions within the same second from the same author are disambiguated
/// with a monotonic `-2`, `-3`, ... suffix rather than rejected, so a burst
/// of same-second appends from one author never fails outright.
pub fn generate_id(now: DateTime<Utc>, author: &str, existing: &HashSet<String>) -> String {
    let base = format!("msg-{}-{author}", now.format("%Y%m%d-%H%M%S"));
    if !existing.contains(&base) {
        return base;
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !existing.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Resolve the `thread` for a new message given its `reply_to` target and
/// (if the target could be located) the target's own `thread`.
///
/// - No `reply_to`: no thread.
/// - `reply_to` present and the parent has a thread: adopt it.
/// - `reply_to` present but the parent is unknown or threadless: synthesize
///   `thread-<reply_to>` so future replies converge on the same id even if
///   the parent was never locally visible.
pub fn resolve_thread(reply_to: Option<&str>, parent_thread: Option<&str>) -> Option<String> {
    let reply_to = reply_to?;
    match parent_thread {
        Some(thread) => Some(thread.to_string()),
        None => Some(format!("thread-{reply_to}")),
    }
}
