use crate::db::Db;
use crate::events::{ChatEvent, EventBus};
use crate::lifecycle::LifecycleEngine;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRouter;
use rocket::response::stream::{Event, EventStream};
use rocket::{get, State};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

use super::AuthUser;

/// The caller's single real-time channel: a long-lived SSE connection standing in for
/// the bidirectional stream a websocket-style handshake would otherwise upgrade to
/// (SPEC_FULL §6.1). Delivers every
/// event addressed to this user — across all of their conversations — over one
/// long-lived SSE connection, and marks any still-`sent` inbound messages as
/// `delivered` the moment the connection opens.
#[get("/api/v1/stream")]
pub fn message_stream(
    db: &State<Arc<Db>>,
    events: &State<Arc<EventBus>>,
    rooms: &State<Arc<RoomRouter>>,
    presence: &State<Arc<PresenceRegistry>>,
    lifecycle: &State<Arc<LifecycleEngine>>,
    auth: AuthUser,
) -> EventStream![] {
    let user_id = auth.0.user_id.clone();
    let mut broadcast_rx = events.sender.subscribe();
    let (session_tx, mut session_rx) = mpsc::unbounded_channel::<ChatEvent>();

    let handle = presence.attach(db, events, &user_id);
    rooms.register_session(handle, &user_id, session_tx);
    let _ = lifecycle.deliver_backlog(&user_id);

    let db = Arc::clone(db.inner());
    let presence = Arc::clone(presence.inner());
    let rooms_cleanup = Arc::clone(rooms.inner());
    let events_cleanup = Arc::clone(events.inner());

    EventStream! {
        // Disconnect cleanup runs when this guard drops, covering every exit path
        // (client disconnect, server shutdown) the same way a connection guard would.
        struct Cleanup {
            db: Arc<Db>,
            events: Arc<EventBus>,
            presence: Arc<PresenceRegistry>,
            rooms: Arc<RoomRouter>,
            user_id: String,
            handle: crate::presence::SessionHandle,
        }
        impl Drop for Cleanup {
            fn drop(&mut self) {
                self.rooms.unregister_session(self.handle, &self.user_id);
                self.presence.detach(&self.db, &self.events, &self.user_id, self.handle);
            }
        }
        let _cleanup = Cleanup {
            db,
            events: events_cleanup,
            presence,
            rooms: rooms_cleanup,
            user_id: user_id.clone(),
            handle,
        };

        let mut heartbeat = interval(Duration::from_secs(15));

        loop {
            tokio::select! {
                msg = session_rx.recv() => {
                    match msg {
                        Some(event) => { if let Some(e) = render(event, &user_id) { yield e; } }
                        None => break,
                    }
                }
                msg = broadcast_rx.recv() => {
                    match msg {
                        Ok(event) => { if let Some(e) = render(event, &user_id) { yield e; } }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    }
                }
                _ = heartbeat.tick() => {
                    let now = chrono::Utc::now().to_rfc3339();
                    yield Event::json(&serde_json::json!({"time": now})).event("heartbeat");
                }
            }
        }
    }
}

/// Renders a `ChatEvent` to wire format, filtering broadcast-bus events (`user:status`)
/// down to ones this session actually cares about — everyone hears presence changes, but
/// per-user events only reach their target.
fn render(event: ChatEvent, user_id: &str) -> Option<Event> {
    match event {
        ChatEvent::UserStatus(payload) => Some(Event::json(&payload).event("user:status")),
        ChatEvent::Typing(payload) => Some(Event::json(&payload).event("user:typing")),
        ChatEvent::MessageNew { payload, .. } => Some(Event::json(&payload).event("message:new")),
        ChatEvent::MessageSent { target_user_id, payload } if target_user_id == user_id => {
            Some(Event::json(&payload).event("message:sent"))
        }
        ChatEvent::MessageSent { .. } => None,
        ChatEvent::MessageStatus { payload, .. } => Some(Event::json(&payload).event("message:status")),
        ChatEvent::MessageError { target_user_id, payload } if target_user_id == user_id => {
            Some(Event::json(&payload).event("message:error"))
        }
        ChatEvent::MessageError { .. } => None,
        ChatEvent::UnreadUpdate { target_user_id, payload } if target_user_id == user_id => {
            Some(Event::json(&payload).event("conversation:unreadUpdate"))
        }
        ChatEvent::UnreadUpdate { .. } => None,
    }
}
