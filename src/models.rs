use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_hash: Option<String>,
    pub is_online: bool,
}

/// Sender expanded to {id, username} inside message payloads, per SPEC_FULL §6.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserRef {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<String>,
    pub unread_count: std::collections::HashMap<String, i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        if self.participant_a == user_id {
            Some(&self.participant_b)
        } else if self.participant_b == user_id {
            Some(&self.participant_a)
        } else {
            None
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender: UserRef,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub is_read: bool,
    pub read_by: HashSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<String>,
    pub created_at: String,
}

// --- Client -> server request bodies ---

#[derive(Debug, Deserialize)]
pub struct SendMessage {
    pub content: String,
    #[serde(default)]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub client_temp_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReadMessage {
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TypingHeartbeat {
    pub is_typing: bool,
}

#[derive(Debug, Deserialize)]
pub struct BootstrapConversation {
    pub participant_id: String,
}

// --- Server -> client event payloads (SPEC_FULL §6) ---

#[derive(Debug, Serialize, Clone)]
pub struct UserStatusEvent {
    pub user_id: String,
    pub is_online: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct TypingEvent {
    pub user_id: String,
    pub username: String,
    pub is_typing: bool,
    pub conversation_id: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct MessageNewEvent {
    #[serde(flatten)]
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_temp_id: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct MessageSentEvent {
    pub message_id: String,
    pub status: MessageStatus,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_temp_id: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct MessageStatusEvent {
    pub message_id: String,
    pub status: MessageStatus,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_by: Option<HashSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct UnreadUpdateEvent {
    pub conversation_id: String,
    pub unread_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct MessageErrorEvent {
    pub error: String,
}
