//! Idempotent delivery for `send` frames.
//!
//! A client that reconnects mid-retry may resend the same `msg_id`. The
//! router consults this store before delivering so a retried send is
//! acknowledged without being delivered twice. Bounded by both a TTL and a
//! capacity so a misbehaving client cannot grow this unbounded.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const DEFAULT_TTL: Duration = Duration::from_secs(300);
const DEFAULT_CAPACITY: usize = 4096;

pub struct DedupeStore {
    ttl: Duration,
    capacity: usize,
    seen: HashMap<String, Instant>,
    order: VecDeque<String>,
}

impl Default for DedupeStore {
    fn default() -> Self {
        DedupeStore::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl DedupeStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        DedupeStore {
            ttl,
            capacity,
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Records `msg_id` as seen `now`, returning `true` if it had already
    /// been seen within the TTL (a duplicate), `false` for a fresh id.
    pub fn check_and_insert(&mut self, msg_id: &str, now: Instant) -> bool {
        self.evict_expired(now);

        if let Some(seen_at) = self.seen.get(msg_id) {
            if now.duration_since(*seen_at) < self.ttl {
                return true;
            }
        }

        if !self.seen.contains_key(msg_id) {
            self.order.push_back(msg_id.to_string());
        }
        self.seen.insert(msg_id.to_string(), now);
        self.evict_over_capacity();
        false
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(front) = self.order.front() {
            match self.seen.get(front) {
                Some(seen_at) if now.duration_since(*seen_at) >= self.ttl => {
                    let id = self.order.pop_front().unwrap();
                    self.seen.remove(&id);
                }
                _ => break,
            }
        }
    }

    fn evict_over_capacity(&mut self) {
        while self.order.len() > self.capacity {
            if let Some(id) = self.order.pop_front() {
                self.seen.remove(&id);
            }
        }
    }
}
