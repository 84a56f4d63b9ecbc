use crate::db::{self, Db};
use crate::events::ChatEvent;
use crate::models::TypingEvent;
use crate::rooms::RoomRouter;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Interval between idle-typist sweeps.
const REAPER_INTERVAL_MS: u64 = 500;

struct TypingEntry {
    username: String,
    last_heartbeat: Instant,
}

#[derive(Default)]
struct Inner {
    /// (conversation_id, user_id) -> last heartbeat, for everyone currently "typing"
    active: HashMap<(String, String), TypingEntry>,
}

/// Tracks who is actively typing in which conversation and auto-expires stale entries
/// (SPEC_FULL §4.4). A heartbeat arriving after expiry is indistinguishable from a fresh
/// start — the client is expected to re-send `is_typing: true` on every keystroke burst.
pub struct TypingTracker {
    inner: Mutex<Inner>,
    idle_timeout: Duration,
}

impl TypingTracker {
    pub fn new(idle_timeout_ms: u64) -> Self {
        TypingTracker {
            inner: Mutex::new(Inner::default()),
            idle_timeout: Duration::from_millis(idle_timeout_ms),
        }
    }

    /// Records a heartbeat. Returns `true` if this is a state change worth broadcasting
    /// (went from not-typing to typing, or an explicit stop), so the caller only publishes
    /// an event on an actual transition rather than every keystroke.
    pub fn heartbeat(&self, conversation_id: &str, user_id: &str, username: &str, is_typing: bool) -> bool {
        let key = (conversation_id.to_string(), user_id.to_string());
        let mut guard = self.inner.lock().expect("typing tracker poisoned");

        if is_typing {
            let changed = !guard.active.contains_key(&key);
            guard.active.insert(
                key,
                TypingEntry {
                    username: username.to_string(),
                    last_heartbeat: Instant::now(),
                },
            );
            changed
        } else {
            guard.active.remove(&key).is_some()
        }
    }

    /// Sweeps every entry older than the idle timeout, returning the ones that expired
    /// so the caller can publish `typing{is_typing: false}` for each.
    fn sweep_expired(&self) -> Vec<(String, String, String)> {
        let mut guard = self.inner.lock().expect("typing tracker poisoned");
        let now = Instant::now();
        let timeout = self.idle_timeout;
        let expired: Vec<(String, String)> = guard
            .active
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_heartbeat) >= timeout)
            .map(|(key, _)| key.clone())
            .collect();

        let mut out = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(entry) = guard.active.remove(&key) {
                out.push((key.0, key.1, entry.username));
            }
        }
        out
    }
}

/// Spawns the background reaper loop that expires idle typists and publishes the
/// corresponding `typing{is_typing: false}` events — the same periodic-sweep idiom used
/// elsewhere for interval-driven background maintenance, adapted from a pruning sweep to
/// an expiry sweep.
pub fn spawn_typing_reaper(
    tracker: std::sync::Arc<TypingTracker>,
    rooms: std::sync::Arc<RoomRouter>,
    db: std::sync::Arc<Db>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(REAPER_INTERVAL_MS));
        loop {
            interval.tick().await;
            for (conversation_id, user_id, username) in tracker.sweep_expired() {
                let event = ChatEvent::Typing(TypingEvent {
                    user_id: user_id.clone(),
                    username,
                    is_typing: false,
                    conversation_id: conversation_id.clone(),
                });

                let other = {
                    let conn = db.conn();
                    db::find_conversation_by_id(&conn, &conversation_id)
                        .ok()
                        .flatten()
                        .and_then(|c| c.other_participant(&user_id).map(str::to_string))
                };
                if let Some(other) = other {
                    rooms.emit_to_conversation(&user_id, &other, event, Some(&user_id));
                }
            }
        }
    });
}

