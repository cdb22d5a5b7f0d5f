//! Keepalive: every session is pinged on an interval, and dropped if it
//! misses two consecutive pongs.

use std::time::Duration;

use tracing::info;

use crate::registry::SharedSessionRegistry;
use crate::router;

pub const INTERVAL: Duration = Duration::from_secs(30);
const MISSED_INTERVALS_BEFORE_CLOSE: u32 = 2;

/// Runs until the session named `handle` is gone from `registry`, either
/// because the connection closed on its own or because this loop evicted it
/// for going stale. Intended to be spawned once per connection; `session_id`
/// identifies that connection so a reconnect under the same handle doesn't
/// cause this (now-stale) loop to evict or otherwise act on its replacement.
pub async fn run(registry: SharedSessionRegistry, handle: String, session_id: u64) {
    let mut ticker = tokio::time::interval(INTERVAL);
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        ticker.tick().await;

        let stale = {
            let guard = registry.lock().unwrap();
            let Some(session) = guard.get(&handle) else {
                return; // connection already torn down elsewhere
            };
            if session.id != session_id {
                return; // handle was reassigned to a newer connection
            }
            session.last_activity.elapsed() >= INTERVAL * MISSED_INTERVALS_BEFORE_CLOSE
        };

        if stale {
            info!(handle = %handle, "closing session after missed heartbeats");
            if registry.lock().unwrap().remove_if_current(&handle, session_id).is_some() {
                router::broadcast_presence(&registry);
            }
            return;
        }
    }
}
