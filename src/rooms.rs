use crate::events::ChatEvent;
use crate::presence::SessionHandle;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A per-session outbound queue. The SSE endpoint owns the receiving half and forwards
/// everything it gets to the client as an `Event`.
pub type SessionSender = mpsc::UnboundedSender<ChatEvent>;

#[derive(Default)]
struct Inner {
    /// user_id -> every session belonging to them (multiple tabs/devices)
    by_user: HashMap<String, Vec<(SessionHandle, SessionSender)>>,
}

/// Routes events to connected sessions by user (SPEC_FULL §4.3). A conversation here is
/// always exactly its two participants, so "room" fan-out reduces to delivering to each
/// participant's sessions directly rather than maintaining a separate membership index.
pub struct RoomRouter {
    inner: Mutex<Inner>,
}

impl Default for RoomRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRouter {
    pub fn new() -> Self {
        RoomRouter {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Registers a session under `user_id`, available for `emit_to_user` immediately.
    pub fn register_session(&self, handle: SessionHandle, user_id: &str, sender: SessionSender) {
        let mut guard = self.inner.lock().expect("room router poisoned");
        guard
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .push((handle, sender));
    }

    /// Removes a session from the by-user index. Called on SSE stream disconnect,
    /// mirroring the presence guard's drop-time cleanup.
    pub fn unregister_session(&self, handle: SessionHandle, user_id: &str) {
        let mut guard = self.inner.lock().expect("room router poisoned");
        if let Some(sessions) = guard.by_user.get_mut(user_id) {
            sessions.retain(|(h, _)| *h != handle);
            if sessions.is_empty() {
                guard.by_user.remove(user_id);
            }
        }
    }

    /// Delivers `event` to every session belonging to `user_id`.
    pub fn emit_to_user(&self, user_id: &str, event: ChatEvent) {
        let guard = self.inner.lock().expect("room router poisoned");
        if let Some(sessions) = guard.by_user.get(user_id) {
            for (_, sender) in sessions {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Delivers `event` to both participants of a conversation in one call, optionally
    /// skipping one (e.g. the author of a `typing` heartbeat never gets their own echo).
    pub fn emit_to_conversation(&self, participant_a: &str, participant_b: &str, event: ChatEvent, skip_user: Option<&str>) {
        if skip_user != Some(participant_a) {
            self.emit_to_user(participant_a, event.clone());
        }
        if skip_user != Some(participant_b) {
            self.emit_to_user(participant_b, event);
        }
    }
}
