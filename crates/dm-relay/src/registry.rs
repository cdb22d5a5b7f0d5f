//! Online-user registry: one entry per authenticated session, keyed by
//! handle. Adapted from the daemon's session registry, but tracking a live
//! WebSocket connection instead of a PID-backed local process.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dmrelay_core::resolver::WhitelistLookup;

use crate::protocol::PresenceStatus;
use crate::session::Session;

/// Registry of currently-online sessions, keyed by authenticated handle.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

pub type SharedSessionRegistry = Arc<Mutex<SessionRegistry>>;

pub fn new_session_registry() -> SharedSessionRegistry {
    Arc::new(Mutex::new(SessionRegistry::new()))
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            sessions: HashMap::new(),
        }
    }

    /// Registers a session, replacing any prior session under the same
    /// handle. The displaced session's cancellation token is fired so its
    /// connection's read loop, writer task, and heartbeat task wind down
    /// rather than lingering alongside the new one.
    pub fn insert(&mut self, session: Session) -> Option<Session> {
        let previous = self.sessions.insert(session.handle.clone(), session);
        if let Some(ref previous) = previous {
            previous.cancel.cancel();
        }
        previous
    }

    pub fn remove(&mut self, handle: &str) -> Option<Session> {
        self.sessions.remove(handle)
    }

    /// Removes the session under `handle` only if it is still the one
    /// identified by `id`. A connection whose handle has already been
    /// displaced by a reconnect must not remove (or otherwise touch) the
    /// session that replaced it.
    pub fn remove_if_current(&mut self, handle: &str, id: u64) -> Option<Session> {
        if self.sessions.get(handle).map(|s| s.id) == Some(id) {
            self.sessions.remove(handle)
        } else {
            None
        }
    }

    pub fn get(&self, handle: &str) -> Option<&Session> {
        self.sessions.get(handle)
    }

    pub fn get_mut(&mut self, handle: &str) -> Option<&mut Session> {
        self.sessions.get_mut(handle)
    }

    pub fn is_online(&self, handle: &str) -> bool {
        self.sessions.contains_key(handle)
    }

    pub fn online_handles(&self) -> Vec<String> {
        let mut handles: Vec<String> = self.sessions.keys().cloned().collect();
        handles.sort();
        handles
    }

    pub fn statuses(&self) -> BTreeMap<String, PresenceStatus> {
        self.sessions
            .iter()
            .map(|(handle, session)| (handle.clone(), session.status))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Session)> {
        self.sessions.iter()
    }

    /// Broadcasts a frame to every session except `exclude`, if given.
    pub fn broadcast_except(&self, exclude: Option<&str>, frame: impl Fn() -> crate::protocol::ServerFrame) {
        for (handle, session) in &self.sessions {
            if Some(handle.as_str()) == exclude {
                continue;
            }
            session.send(frame());
        }
    }
}

impl WhitelistLookup for SessionRegistry {
    fn whitelist_for(&self, owner: &str) -> Option<&[String]> {
        self.sessions
            .get(owner)
            .and_then(|s| s.claude_whitelist.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn dummy_session(handle: &str) -> Session {
        let (tx, _rx) = mpsc::unbounded_channel();
        Session::new(handle.to_string(), tx, None)
    }

    #[test]
    fn insert_and_get_round_trip() {
        let mut registry = SessionRegistry::new();
        registry.insert(dummy_session("alice"));
        assert!(registry.get("alice").is_some());
        assert!(registry.is_online("alice"));
    }

    #[test]
    fn reconnect_displaces_prior_session() {
        let mut registry = SessionRegistry::new();
        registry.insert(dummy_session("alice"));
        let prior = registry.insert(dummy_session("alice"));
        assert!(prior.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reconnect_cancels_displaced_session() {
        let mut registry = SessionRegistry::new();
        registry.insert(dummy_session("alice"));
        let prior = registry.insert(dummy_session("alice")).unwrap();
        assert!(prior.cancel.is_cancelled());
        assert!(!registry.get("alice").unwrap().cancel.is_cancelled());
    }

    #[test]
    fn remove_if_current_drops_matching_session() {
        let mut registry = SessionRegistry::new();
        let session = dummy_session("alice");
        let id = session.id;
        registry.insert(session);
        let removed = registry.remove_if_current("alice", id);
        assert!(removed.is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_if_current_ignores_stale_id() {
        let mut registry = SessionRegistry::new();
        let stale = dummy_session("alice");
        let stale_id = stale.id;
        registry.insert(stale);
        registry.insert(dummy_session("alice")); // displaces, registers a new id

        let removed = registry.remove_if_current("alice", stale_id);
        assert!(removed.is_none());
        assert!(registry.is_online("alice"));
    }

    #[test]
    fn remove_drops_session() {
        let mut registry = SessionRegistry::new();
        registry.insert(dummy_session("alice"));
        registry.remove("alice");
        assert!(!registry.is_online("alice"));
        assert!(registry.is_empty());
    }

    #[test]
    fn online_handles_are_sorted() {
        let mut registry = SessionRegistry::new();
        registry.insert(dummy_session("bob"));
        registry.insert(dummy_session("alice"));
        assert_eq!(registry.online_handles(), vec!["alice", "bob"]);
    }

    #[test]
    fn whitelist_for_absent_owner_is_none() {
        let registry = SessionRegistry::new();
        assert!(registry.whitelist_for("bob").is_none());
    }

    #[test]
    fn whitelist_for_present_owner_returns_slice() {
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Session::new("bob".to_string(), tx, Some(vec!["alice".to_string()]));
        registry.insert(session);
        assert_eq!(registry.whitelist_for("bob"), Some(&["alice".to_string()][..]));
    }
}
