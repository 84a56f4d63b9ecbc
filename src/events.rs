use crate::models::{
    MessageErrorEvent, MessageNewEvent, MessageSentEvent, MessageStatusEvent, TypingEvent,
    UnreadUpdateEvent, UserStatusEvent,
};
use tokio::sync::broadcast;

/// The server->client event surface (SPEC_FULL §6), tagged with the conversation or user
/// it targets so the Room Router can filter without re-deriving that from the payload.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    UserStatus(UserStatusEvent),
    Typing(TypingEvent),
    MessageNew {
        conversation_id: String,
        payload: MessageNewEvent,
    },
    MessageSent {
        target_user_id: String,
        payload: MessageSentEvent,
    },
    MessageStatus {
        conversation_id: String,
        payload: MessageStatusEvent,
    },
    MessageError {
        target_user_id: String,
        payload: MessageErrorEvent,
    },
    UnreadUpdate {
        target_user_id: String,
        payload: UnreadUpdateEvent,
    },
}

pub struct EventBus {
    pub sender: broadcast::Sender<ChatEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        EventBus { sender }
    }

    pub fn publish(&self, event: ChatEvent) {
        let _ = self.sender.send(event);
    }
}
