//! A single authenticated relay connection.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::protocol::{PresenceStatus, ServerFrame};

/// Outbound half of a session: frames queued here are serialized by the
/// connection's writer task, keeping all writes to the socket on one task
/// even though `route` and heartbeat checks run from elsewhere.
pub type Outbox = mpsc::UnboundedSender<ServerFrame>;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Everything the registry needs to know about one online user.
pub struct Session {
    /// Identifies this particular connection, distinct from any other
    /// session that has held (or will hold) the same `handle`. Lets a
    /// displaced connection's own background tasks recognize that they no
    /// longer own the handle instead of acting on whatever connection
    /// currently does.
    pub id: u64,
    pub handle: String,
    pub outbox: Outbox,
    pub status: PresenceStatus,
    pub joined_at: Instant,
    pub claude_whitelist: Option<Vec<String>>,
    /// Updated whenever any frame arrives from this client. The heartbeat
    /// loop closes the session once this goes stale, since the wire
    /// protocol has the client drive `ping`, not the relay.
    pub last_activity: Instant,
    /// Cancelled when this session is displaced by a reconnect under the
    /// same handle, so the stale connection's read loop, writer task, and
    /// heartbeat task all wind down instead of lingering.
    pub cancel: CancellationToken,
}

impl Session {
    pub fn new(handle: String, outbox: Outbox, claude_whitelist: Option<Vec<String>>) -> Self {
        let now = Instant::now();
        Session {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            handle,
            outbox,
            status: PresenceStatus::Online,
            joined_at: now,
            claude_whitelist,
            last_activity: now,
            cancel: CancellationToken::new(),
        }
    }

    /// Sends a frame to this session, dropping it silently if the socket's
    /// writer task has already gone away (the session is about to be reaped).
    pub fn send(&self, frame: ServerFrame) {
        let _ = self.outbox.send(frame);
    }

    pub fn touch_activity(&mut self) {
        self.last_activity = Instant::now();
    }
}
