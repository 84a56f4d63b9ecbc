use crate::config::Config;
use crate::db::{self, Db};
use crate::events::ChatEvent;
use crate::models::{
    Message, MessageErrorEvent, MessageNewEvent, MessageSentEvent, MessageStatus,
    MessageStatusEvent, MessageType, UnreadUpdateEvent, UserRef,
};
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRouter;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::errors::AppError;

/// Orchestrates the send/deliver/read state machine (SPEC_FULL §4.5), wiring the store,
/// the event bus, presence, and room routing together. Handlers call into here rather
/// than touching `db`/`rooms`/`presence` directly, so the lifecycle invariants (C1-C3,
/// M1-M3) only need to be proven correct in one place.
pub struct LifecycleEngine {
    db: Arc<Db>,
    rooms: Arc<RoomRouter>,
    presence: Arc<PresenceRegistry>,
    config: Arc<Config>,
    /// Guards against a deferred delivered-transition firing after the message was
    /// already read — set to `false` the instant a read happens first (§5, §8).
    pending_delivers: Mutex<std::collections::HashSet<String>>,
}

impl LifecycleEngine {
    pub fn new(db: Arc<Db>, rooms: Arc<RoomRouter>, presence: Arc<PresenceRegistry>, config: Arc<Config>) -> Self {
        LifecycleEngine {
            db,
            rooms,
            presence,
            config,
            pending_delivers: Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Validates and persists a new message, then drives the immediate fan-out:
    /// `message:sent` to the sender, `message:new` to the recipient's room, and (if the
    /// recipient is online) schedules the deferred `sent -> delivered` transition.
    pub fn send(
        self: &Arc<Self>,
        sender: &UserRef,
        conversation_id: &str,
        content: &str,
        message_type: MessageType,
        client_temp_id: Option<String>,
    ) -> Result<Message, AppError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("message content must not be empty".into()));
        }
        if trimmed.chars().count() > self.config.max_content_length {
            return Err(AppError::Validation(format!(
                "message content exceeds {} characters",
                self.config.max_content_length
            )));
        }

        let conversation = {
            let conn = self.db.conn();
            db::find_conversation_by_id(&conn, conversation_id)?
                .ok_or_else(|| AppError::Validation("conversation does not exist".into()))?
        };
        if !conversation.has_participant(&sender.id) {
            return Err(AppError::NotParticipant(sender.id.clone()));
        }
        let recipient_id = conversation
            .other_participant(&sender.id)
            .expect("sender is a participant")
            .to_string();

        let message = {
            let mut conn = self.db.conn();
            db::create_message(&mut conn, &conversation, sender, trimmed, message_type)?
        };

        self.rooms.emit_to_user(
            &sender.id,
            ChatEvent::MessageSent {
                target_user_id: sender.id.clone(),
                payload: MessageSentEvent {
                    message_id: message.id.clone(),
                    status: message.status.clone(),
                    conversation_id: conversation_id.to_string(),
                    client_temp_id: client_temp_id.clone(),
                },
            },
        );

        self.rooms.emit_to_user(
            &recipient_id,
            ChatEvent::MessageNew {
                conversation_id: conversation_id.to_string(),
                payload: MessageNewEvent {
                    message: message.clone(),
                    client_temp_id,
                },
            },
        );

        let unread_count = {
            let conn = self.db.conn();
            db::unread_count_for(&conn, conversation_id, &recipient_id)?
        };
        self.rooms.emit_to_user(
            &recipient_id,
            ChatEvent::UnreadUpdate {
                target_user_id: recipient_id.clone(),
                payload: UnreadUpdateEvent {
                    conversation_id: conversation_id.to_string(),
                    unread_count,
                    sender_id: Some(sender.id.clone()),
                    sender_username: Some(sender.username.clone()),
                    updated_by: None,
                    action: None,
                },
            },
        );

        if self.presence.is_online(&recipient_id) {
            self.schedule_delivered(message.id.clone(), conversation_id.to_string(), sender.id.clone(), recipient_id.clone());
        }

        Ok(message)
    }

    /// Schedules the `sent -> delivered` transition after `delivered_defer_ms`, unless the
    /// message is read first (tracked via `pending_delivers`, cancellation-safe per §5/§9).
    fn schedule_delivered(self: &Arc<Self>, message_id: String, conversation_id: String, sender_id: String, recipient_id: String) {
        self.pending_delivers.lock().expect("lifecycle poisoned").insert(message_id.clone());

        let engine = Arc::clone(self);
        let defer = Duration::from_millis(self.config.delivered_defer_ms);
        tokio::spawn(async move {
            tokio::time::sleep(defer).await;

            let still_pending = {
                let mut guard = engine.pending_delivers.lock().expect("lifecycle poisoned");
                guard.remove(&message_id)
            };
            if !still_pending {
                return;
            }

            let transitioned = {
                let conn = engine.db.conn();
                db::mark_delivered_if_sent(&conn, &message_id)
            };
            let message = match transitioned {
                Ok(Some(message)) => message,
                Ok(None) => return,
                Err(e) => {
                    eprintln!("✉️  deferred delivered transition for {message_id} failed: {e}");
                    return;
                }
            };

            let event = ChatEvent::MessageStatus {
                conversation_id: conversation_id.clone(),
                payload: MessageStatusEvent {
                    message_id: message.id.clone(),
                    status: message.status.clone(),
                    conversation_id: conversation_id.clone(),
                    read_by: None,
                    read_at: None,
                },
            };
            engine.rooms.emit_to_conversation(&sender_id, &recipient_id, event, None);
        });
    }

    /// Marks a single message read by `reader_id`. Cancels any pending deferred-delivered
    /// transition for it (a direct `sent -> read` must never be clobbered back to
    /// `delivered` by a late-firing timer, §8 scenario 2).
    ///
    /// Rejects before mutating anything if the caller isn't a participant of
    /// `conversation_id`, if `message_id` doesn't belong to it, or if the caller is the
    /// message's own sender (§4.5 Read step 1, M2: `sender ∉ read_by`).
    pub fn read(&self, reader_id: &str, conversation_id: &str, message_id: &str) -> Result<Message, AppError> {
        let message = {
            let conn = self.db.conn();
            db::find_message_by_id(&conn, message_id)?
                .ok_or_else(|| AppError::Validation("message does not exist".into()))?
        };
        if message.conversation_id != conversation_id {
            return Err(AppError::Validation("message does not belong to this conversation".into()));
        }

        let conversation = {
            let conn = self.db.conn();
            db::find_conversation_by_id(&conn, conversation_id)?
                .ok_or_else(|| AppError::Validation("conversation does not exist".into()))?
        };
        if !conversation.has_participant(reader_id) {
            return Err(AppError::NotParticipant(reader_id.to_string()));
        }
        if reader_id == message.sender.id {
            return Err(AppError::Validation("sender cannot mark their own message as read".into()));
        }

        self.pending_delivers.lock().expect("lifecycle poisoned").remove(message_id);

        let (message, moved) = {
            let mut conn = self.db.conn();
            db::mark_message_read(&mut conn, message_id, reader_id)?
        };

        if !moved {
            return Ok(message);
        }

        let event = ChatEvent::MessageStatus {
            conversation_id: message.conversation_id.clone(),
            payload: MessageStatusEvent {
                message_id: message.id.clone(),
                status: MessageStatus::Read,
                conversation_id: message.conversation_id.clone(),
                read_by: Some(message.read_by.clone()),
                read_at: message.read_at.clone(),
            },
        };
        self.rooms.emit_to_conversation(&message.sender.id, reader_id, event, None);

        let unread_count = {
            let conn = self.db.conn();
            db::unread_count_for(&conn, &message.conversation_id, reader_id)?
        };
        self.rooms.emit_to_user(
            reader_id,
            ChatEvent::UnreadUpdate {
                target_user_id: reader_id.to_string(),
                payload: UnreadUpdateEvent {
                    conversation_id: message.conversation_id.clone(),
                    unread_count,
                    sender_id: None,
                    sender_username: None,
                    updated_by: Some(reader_id.to_string()),
                    action: Some("read".to_string()),
                },
            },
        );

        Ok(message)
    }

    /// Marks every unread inbound message in a conversation as read by `reader_id`
    /// (idempotent: a second call with nothing left unread is a harmless no-op, §8
    /// scenario 5).
    pub fn mark_all_read(&self, reader_id: &str, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        let conversation = {
            let conn = self.db.conn();
            db::find_conversation_by_id(&conn, conversation_id)?
                .ok_or_else(|| AppError::Validation("conversation does not exist".into()))?
        };
        if !conversation.has_participant(reader_id) {
            return Err(AppError::NotParticipant(reader_id.to_string()));
        }

        let messages = {
            let mut conn = self.db.conn();
            db::mark_all_read(&mut conn, conversation_id, reader_id)?
        };

        {
            let mut guard = self.pending_delivers.lock().expect("lifecycle poisoned");
            for message in &messages {
                guard.remove(&message.id);
            }
        }

        for message in &messages {
            let event = ChatEvent::MessageStatus {
                conversation_id: conversation_id.to_string(),
                payload: MessageStatusEvent {
                    message_id: message.id.clone(),
                    status: MessageStatus::Read,
                    conversation_id: conversation_id.to_string(),
                    read_by: Some(message.read_by.clone()),
                    read_at: message.read_at.clone(),
                },
            };
            self.rooms.emit_to_conversation(&message.sender.id, reader_id, event, None);
        }

        self.rooms.emit_to_user(
            reader_id,
            ChatEvent::UnreadUpdate {
                target_user_id: reader_id.to_string(),
                payload: UnreadUpdateEvent {
                    conversation_id: conversation_id.to_string(),
                    unread_count: 0,
                    sender_id: None,
                    sender_username: None,
                    updated_by: Some(reader_id.to_string()),
                    action: Some("read_all".to_string()),
                },
            },
        );

        Ok(messages)
    }

    /// Bulk-transitions a reconnecting user's still-`sent` inbound messages to
    /// `delivered` and publishes one `message:status` per transitioned message.
    pub fn deliver_backlog(&self, user_id: &str) -> Result<(), AppError> {
        let messages = {
            let conn = self.db.conn();
            db::bulk_mark_delivered_for_recipient(&conn, user_id)?
        };
        for message in messages {
            {
                let mut guard = self.pending_delivers.lock().expect("lifecycle poisoned");
                guard.remove(&message.id);
            }
            let event = ChatEvent::MessageStatus {
                conversation_id: message.conversation_id.clone(),
                payload: MessageStatusEvent {
                    message_id: message.id.clone(),
                    status: MessageStatus::Delivered,
                    conversation_id: message.conversation_id.clone(),
                    read_by: None,
                    read_at: None,
                },
            };
            self.rooms.emit_to_conversation(&message.sender.id, user_id, event, None);
        }
        Ok(())
    }

    /// Publishes a `message:error` to the sender only — used when a handler-level
    /// failure happens after partial work (e.g. rate limit rejection before persistence).
    pub fn emit_error(&self, user_id: &str, error: &AppError) {
        self.rooms.emit_to_user(
            user_id,
            ChatEvent::MessageError {
                target_user_id: user_id.to_string(),
                payload: MessageErrorEvent {
                    error: error.client_message(),
                },
            },
        );
    }
}
