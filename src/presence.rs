use crate::db::Db;
use crate::events::{ChatEvent, EventBus};
use crate::models::UserStatusEvent;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Opaque handle identifying one connected SSE stream. A user may hold several at once
/// (multiple tabs/devices) — presence is edge-triggered on the 0↔1 transition of the set,
/// not on the handle count itself.
pub type SessionHandle = Uuid;

#[derive(Default)]
struct Registry {
    sessions_by_user: HashMap<String, Vec<SessionHandle>>,
}

/// Process-wide presence index (SPEC_FULL §4.2). Mirrors `is_online` into the store and
/// publishes `user:status` only when a user transitions fully online or fully offline —
/// never on every connect/disconnect of a redundant session.
pub struct PresenceRegistry {
    inner: Mutex<Registry>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        PresenceRegistry {
            inner: Mutex::new(Registry::default()),
        }
    }

    /// Registers a new session for `user_id`. Returns the handle to pass to `detach`.
    /// Publishes `user:status{is_online: true}` iff this is the user's first session.
    pub fn attach(&self, db: &Db, events: &EventBus, user_id: &str) -> SessionHandle {
        let handle = Uuid::new_v4();
        let went_online = {
            let mut guard = self.inner.lock().expect("presence registry poisoned");
            let sessions = guard.sessions_by_user.entry(user_id.to_string()).or_default();
            let was_empty = sessions.is_empty();
            sessions.push(handle);
            was_empty
        };

        if went_online {
            if let Err(e) = crate::db::set_user_online(&db.conn(), user_id, true) {
                eprintln!("⚠️  failed to persist online status for {user_id}: {e}");
            }
            println!("🔌 {user_id} connected");
            events.publish(ChatEvent::UserStatus(UserStatusEvent {
                user_id: user_id.to_string(),
                is_online: true,
            }));
        }

        handle
    }

    /// Removes a session. Publishes `user:status{is_online: false}` iff this was the
    /// user's last remaining session.
    pub fn detach(&self, db: &Db, events: &EventBus, user_id: &str, handle: SessionHandle) {
        let went_offline = {
            let mut guard = self.inner.lock().expect("presence registry poisoned");
            if let Some(sessions) = guard.sessions_by_user.get_mut(user_id) {
                sessions.retain(|h| *h != handle);
                let now_empty = sessions.is_empty();
                if now_empty {
                    guard.sessions_by_user.remove(user_id);
                }
                now_empty
            } else {
                false
            }
        };

        if went_offline {
            if let Err(e) = crate::db::set_user_online(&db.conn(), user_id, false) {
                eprintln!("⚠️  failed to persist offline status for {user_id}: {e}");
            }
            println!("🔌 {user_id} disconnected");
            events.publish(ChatEvent::UserStatus(UserStatusEvent {
                user_id: user_id.to_string(),
                is_online: false,
            }));
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        let guard = self.inner.lock().expect("presence registry poisoned");
        guard
            .sessions_by_user
            .get(user_id)
            .is_some_and(|sessions| !sessions.is_empty())
    }
}
