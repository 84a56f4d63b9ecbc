//! Exercises the Message Lifecycle Engine's invariants (SPEC_FULL §8/§9) directly,
//! without going through Rocket — the state machine's correctness doesn't depend on
//! the transport, and this lets the deferred-delivered-vs-read race be driven precisely.

use duoline::config::Config;
use duoline::db::{self, Db};
use duoline::events::EventBus;
use duoline::lifecycle::LifecycleEngine;
use duoline::models::{Conversation, MessageStatus, MessageType, UserRef};
use duoline::presence::PresenceRegistry;
use duoline::rooms::RoomRouter;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    db_path: String,
    engine: Arc<LifecycleEngine>,
    presence: Arc<PresenceRegistry>,
    alice: UserRef,
    bob: UserRef,
    conversation: Conversation,
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

/// Builds a fresh db + `LifecycleEngine` with an alice/bob conversation already
/// bootstrapped. `bob_online` controls whether the recipient has an attached session,
/// which governs whether `send` schedules the deferred delivered transition at all.
fn harness(tag: &str, delivered_defer_ms: u64, bob_online: bool) -> Harness {
    let db_path = format!(
        "/tmp/duoline_lifecycle_{tag}_{}.db",
        uuid::Uuid::new_v4().to_string().split('-').next().unwrap()
    );
    let db = Arc::new(Db::new(&db_path));
    let (alice, bob, conversation) = {
        let conn = db.conn();
        db::upsert_user(&conn, "alice-id", "alice", "").unwrap();
        db::upsert_user(&conn, "bob-id", "bob", "").unwrap();
        let alice = db::find_user_by_id(&conn, "alice-id").unwrap().unwrap();
        let bob = db::find_user_by_id(&conn, "bob-id").unwrap().unwrap();
        let (conversation, _) = db::get_or_create_conversation(&conn, &alice.id, &bob.id).unwrap();
        (alice, bob, conversation)
    };

    let rooms = Arc::new(RoomRouter::new());
    let presence = Arc::new(PresenceRegistry::new());
    if bob_online {
        presence.attach(&db, &EventBus::new(), &bob.id);
    }

    let config = Arc::new(Config {
        database_path: db_path.clone(),
        delivered_defer_ms,
        ..Config::default()
    });
    let engine = Arc::new(LifecycleEngine::new(
        Arc::clone(&db),
        Arc::clone(&rooms),
        Arc::clone(&presence),
        config,
    ));

    Harness {
        db_path,
        engine,
        presence,
        alice,
        bob,
        conversation,
    }
}

fn reload_status(db_path: &str, message_id: &str) -> MessageStatus {
    let conn = Db::new(db_path);
    db::find_message_by_id(&conn.conn(), message_id)
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn read_cancels_pending_delivered_transition() {
    let h = harness("read-cancels", 60_000, true);

    let message = h
        .engine
        .send(&h.alice, &h.conversation.id, "hi bob", MessageType::Text, None)
        .unwrap();
    assert_eq!(message.status, MessageStatus::Sent);
    assert!(h.presence.is_online(&h.bob.id));

    // Bob reads it well before the ~60s defer would have fired.
    let read = h.engine.read(&h.bob.id, &h.conversation.id, &message.id).unwrap();
    assert_eq!(read.status, MessageStatus::Read);

    // Give any still-scheduled timer a moment to (wrongly) fire, then confirm the
    // message wasn't clobbered back to "delivered".
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(reload_status(&h.db_path, &message.id), MessageStatus::Read);
}

#[tokio::test]
async fn deferred_delivered_fires_when_not_read_first() {
    let h = harness("deferred-fires", 30, true);

    let message = h
        .engine
        .send(&h.alice, &h.conversation.id, "hi bob", MessageType::Text, None)
        .unwrap();
    assert_eq!(message.status, MessageStatus::Sent);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        reload_status(&h.db_path, &message.id),
        MessageStatus::Delivered
    );
}

#[tokio::test]
async fn offline_recipient_gets_no_delivered_transition() {
    let h = harness("offline-no-transition", 30, false);

    let message = h
        .engine
        .send(&h.alice, &h.conversation.id, "hi bob", MessageType::Text, None)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    // No session was ever attached for bob, so `send` never scheduled a transition.
    assert_eq!(reload_status(&h.db_path, &message.id), MessageStatus::Sent);
}

#[tokio::test]
async fn direct_sent_to_read_is_permitted() {
    let h = harness("direct-read", 60_000, false);

    let message = h
        .engine
        .send(&h.alice, &h.conversation.id, "hi bob", MessageType::Text, None)
        .unwrap();
    assert_eq!(message.status, MessageStatus::Sent);

    let read = h.engine.read(&h.bob.id, &h.conversation.id, &message.id).unwrap();
    assert_eq!(read.status, MessageStatus::Read);
    assert!(read.read_by.contains(&h.bob.id));
}

#[tokio::test]
async fn mark_all_read_is_idempotent() {
    let h = harness("mark-all-idempotent", 60_000, false);

    for content in ["one", "two", "three"] {
        h.engine
            .send(&h.alice, &h.conversation.id, content, MessageType::Text, None)
            .unwrap();
    }

    let first = h.engine.mark_all_read(&h.bob.id, &h.conversation.id).unwrap();
    assert_eq!(first.len(), 3);
    assert!(first.iter().all(|m| m.status == MessageStatus::Read));

    let second = h.engine.mark_all_read(&h.bob.id, &h.conversation.id).unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn unread_counter_tracks_sends_and_reads() {
    let h = harness("unread-counter", 60_000, false);

    let m1 = h
        .engine
        .send(&h.alice, &h.conversation.id, "one", MessageType::Text, None)
        .unwrap();
    h.engine
        .send(&h.alice, &h.conversation.id, "two", MessageType::Text, None)
        .unwrap();

    let conn = Db::new(&h.db_path);
    assert_eq!(
        db::unread_count_for(&conn.conn(), &h.conversation.id, &h.bob.id).unwrap(),
        2
    );

    h.engine.read(&h.bob.id, &h.conversation.id, &m1.id).unwrap();
    assert_eq!(
        db::unread_count_for(&conn.conn(), &h.conversation.id, &h.bob.id).unwrap(),
        1
    );
}

#[tokio::test]
async fn sender_cannot_send_into_a_conversation_they_are_not_part_of() {
    let h = harness("not-participant", 60_000, false);
    let mallory = UserRef {
        id: "mallory-id".to_string(),
        username: "mallory".to_string(),
    };
    {
        let conn = Db::new(&h.db_path);
        db::upsert_user(&conn.conn(), &mallory.id, &mallory.username, "").unwrap();
    }

    let result = h
        .engine
        .send(&mallory, &h.conversation.id, "sneaky", MessageType::Text, None);
    assert!(result.is_err());
}

#[tokio::test]
async fn sender_cannot_mark_their_own_message_read() {
    let h = harness("sender-reads-own", 60_000, false);

    let message = h
        .engine
        .send(&h.alice, &h.conversation.id, "hi bob", MessageType::Text, None)
        .unwrap();

    let result = h.engine.read(&h.alice.id, &h.conversation.id, &message.id);
    assert!(result.is_err());
    assert_eq!(
        reload_status(&h.db_path, &message.id),
        MessageStatus::Sent
    );
}

#[tokio::test]
async fn non_participant_cannot_mark_a_message_read() {
    let h = harness("non-participant-reads", 60_000, false);
    let mallory = UserRef {
        id: "mallory-id".to_string(),
        username: "mallory".to_string(),
    };
    {
        let conn = Db::new(&h.db_path);
        db::upsert_user(&conn.conn(), &mallory.id, &mallory.username, "").unwrap();
    }

    let message = h
        .engine
        .send(&h.alice, &h.conversation.id, "hi bob", MessageType::Text, None)
        .unwrap();

    let result = h.engine.read(&mallory.id, &h.conversation.id, &message.id);
    assert!(result.is_err());
    assert_eq!(
        reload_status(&h.db_path, &message.id),
        MessageStatus::Sent
    );
}
