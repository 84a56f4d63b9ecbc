use crate::errors::AppError;
use crate::models::{Conversation, Message, MessageStatus, MessageType, UserRef};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub struct Db {
    pub conn: Mutex<Connection>,
}

impl Db {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("Failed to set pragmas");
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate();
        db
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email_hash TEXT,
                password_hash TEXT NOT NULL DEFAULT '',
                is_online INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                participant_a TEXT NOT NULL REFERENCES users(id),
                participant_b TEXT NOT NULL REFERENCES users(id),
                last_message_id TEXT,
                last_message_content TEXT,
                last_message_time TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(participant_a, participant_b)
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_a ON conversations(participant_a);
            CREATE INDEX IF NOT EXISTS idx_conversations_b ON conversations(participant_b);

            CREATE TABLE IF NOT EXISTS conversation_unread (
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id),
                unread_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id TEXT NOT NULL REFERENCES users(id),
                content TEXT NOT NULL,
                message_type TEXT NOT NULL DEFAULT 'text',
                status TEXT NOT NULL DEFAULT 'sent',
                read_by TEXT NOT NULL DEFAULT '[]',
                delivered_at TEXT,
                read_at TEXT,
                created_at TEXT NOT NULL,
                seq INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conv_seq ON messages(conversation_id, seq);
            CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id);
            CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(status);
            ",
        )
        .expect("Failed to run migrations");
    }

    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn row_to_conversation(row: &rusqlite::Row, unread: HashMap<String, i64>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        last_message_id: row.get(3)?,
        last_message_content: row.get(4)?,
        last_message_time: row.get(5)?,
        unread_count: unread,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn load_unread(conn: &Connection, conversation_id: &str) -> HashMap<String, i64> {
    let mut stmt = match conn.prepare(
        "SELECT user_id, unread_count FROM conversation_unread WHERE conversation_id = ?1",
    ) {
        Ok(s) => s,
        Err(_) => return HashMap::new(),
    };
    stmt.query_map(params![conversation_id], |r| Ok((r.get(0)?, r.get(1)?)))
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
}

pub fn find_conversation_by_id(conn: &Connection, id: &str) -> Result<Option<Conversation>, AppError> {
    let row = conn
        .query_row(
            "SELECT id, participant_a, participant_b, last_message_id, last_message_content, last_message_time, created_at, updated_at
             FROM conversations WHERE id = ?1",
            params![id],
            |row| row_to_conversation(row, HashMap::new()),
        )
        .optional()?;
    Ok(row.map(|mut c| {
        c.unread_count = load_unread(conn, id);
        c
    }))
}

pub fn find_conversation_by_pair(
    conn: &Connection,
    a: &str,
    b: &str,
) -> Result<Option<Conversation>, AppError> {
    let (first, second) = sorted_pair(a, b);
    let row = conn
        .query_row(
            "SELECT id, participant_a, participant_b, last_message_id, last_message_content, last_message_time, created_at, updated_at
             FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
            params![first, second],
            |row| row_to_conversation(row, HashMap::new()),
        )
        .optional()?;
    Ok(row.map(|mut c| {
        c.unread_count = load_unread(conn, &c.id);
        c
    }))
}

/// Deterministic pairwise ordering so the same two participants always resolve to the
/// same conversation regardless of who initiates.
pub fn sorted_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Lazily creates the conversation between `a` and `b` if it doesn't already exist.
/// Returns (conversation, created).
pub fn get_or_create_conversation(
    conn: &Connection,
    a: &str,
    b: &str,
) -> Result<(Conversation, bool), AppError> {
    if let Some(existing) = find_conversation_by_pair(conn, a, b)? {
        return Ok((existing, false));
    }

    let (first, second) = sorted_pair(a, b);
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO conversations (id, participant_a, participant_b, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        params![&id, first, second, &now],
    )?;
    conn.execute(
        "INSERT INTO conversation_unread (conversation_id, user_id, unread_count) VALUES (?1, ?2, 0), (?1, ?3, 0)",
        params![&id, first, second],
    )?;

    let conv = find_conversation_by_id(conn, &id)?
        .expect("just-inserted conversation must be readable");
    Ok((conv, true))
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let sender_id: String = row.get(1)?;
    let content: String = row.get(2)?;
    let message_type_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let read_by_str: String = row.get(5)?;
    let sender_username: String = row.get(8)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(9)?,
        sender: UserRef {
            id: sender_id,
            username: sender_username,
        },
        content,
        message_type: parse_message_type(&message_type_str),
        status: parse_status(&status_str),
        is_read: status_str == "read",
        read_by: serde_json::from_str::<HashSet<String>>(&read_by_str).unwrap_or_default(),
        delivered_at: row.get(6)?,
        read_at: row.get(7)?,
        created_at: row.get(10)?,
    })
}

fn parse_status(s: &str) -> MessageStatus {
    match s {
        "delivered" => MessageStatus::Delivered,
        "read" => MessageStatus::Read,
        _ => MessageStatus::Sent,
    }
}

fn parse_message_type(s: &str) -> MessageType {
    match s {
        "image" => MessageType::Image,
        "file" => MessageType::File,
        _ => MessageType::Text,
    }
}

fn message_type_str(t: &MessageType) -> &'static str {
    match t {
        MessageType::Text => "text",
        MessageType::Image => "image",
        MessageType::File => "file",
    }
}

const MESSAGE_SELECT: &str = "SELECT m.id, m.sender_id, m.content, m.message_type, m.status, m.read_by, m.delivered_at, m.read_at, u.username, m.conversation_id, m.created_at
     FROM messages m JOIN users u ON u.id = m.sender_id";

pub fn find_message_by_id(conn: &Connection, id: &str) -> Result<Option<Message>, AppError> {
    Ok(conn
        .query_row(
            &format!("{MESSAGE_SELECT} WHERE m.id = ?1"),
            params![id],
            row_to_message,
        )
        .optional()?)
}

pub fn find_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRef>, AppError> {
    Ok(conn
        .query_row(
            "SELECT id, username FROM users WHERE id = ?1",
            params![id],
            |r| Ok(UserRef { id: r.get(0)?, username: r.get(1)? }),
        )
        .optional()?)
}

pub fn set_user_online(conn: &Connection, user_id: &str, online: bool) -> Result<(), AppError> {
    conn.execute(
        "UPDATE users SET is_online = ?1 WHERE id = ?2",
        params![online as i64, user_id],
    )?;
    Ok(())
}

/// Inserts a new message with status=sent, bumps the conversation preview, and increments
/// the recipient's unread counter — all inside one transaction (C2/C3, §4.5 step 2).
pub fn create_message(
    conn: &mut Connection,
    conversation: &Conversation,
    sender: &UserRef,
    content: &str,
    message_type: MessageType,
) -> Result<Message, AppError> {
    let recipient = conversation
        .other_participant(&sender.id)
        .expect("sender must be a participant")
        .to_string();

    let tx = conn.transaction()?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let seq: i64 = tx.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM messages", [], |r| r.get(0))?;

    tx.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, content, message_type, status, read_by, created_at, seq)
         VALUES (?1, ?2, ?3, ?4, ?5, 'sent', '[]', ?6, ?7)",
        params![&id, &conversation.id, &sender.id, content, message_type_str(&message_type), &now, seq],
    )?;

    tx.execute(
        "UPDATE conversations SET last_message_id = ?1, last_message_content = ?2, last_message_time = ?3, updated_at = ?3 WHERE id = ?4",
        params![&id, content, &now, &conversation.id],
    )?;

    tx.execute(
        "UPDATE conversation_unread SET unread_count = unread_count + 1 WHERE conversation_id = ?1 AND user_id = ?2",
        params![&conversation.id, &recipient],
    )?;

    tx.commit()?;

    Ok(Message {
        id,
        conversation_id: conversation.id.clone(),
        sender: sender.clone(),
        content: content.to_string(),
        message_type,
        status: MessageStatus::Sent,
        is_read: false,
        read_by: HashSet::new(),
        delivered_at: None,
        read_at: None,
        created_at: now,
    })
}

/// Transitions a message to `delivered` only if it is still `sent` (M1). No-op otherwise.
/// Returns the message if a transition actually happened.
pub fn mark_delivered_if_sent(conn: &Connection, message_id: &str) -> Result<Option<Message>, AppError> {
    let now = chrono::Utc::now().to_rfc3339();
    let updated = conn.execute(
        "UPDATE messages SET status = 'delivered', delivered_at = ?1 WHERE id = ?2 AND status = 'sent'",
        params![&now, message_id],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    find_message_by_id(conn, message_id)
}

/// Marks every still-`sent` inbound message for `user_id` across all their conversations
/// as `delivered` (bulk transition on reconnect, §4.5). Returns the transitioned messages.
pub fn bulk_mark_delivered_for_recipient(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<Message>, AppError> {
    let now = chrono::Utc::now().to_rfc3339();
    let ids: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT m.id FROM messages m
             JOIN conversations c ON c.id = m.conversation_id
             WHERE m.status = 'sent' AND m.sender_id != ?1
               AND (c.participant_a = ?1 OR c.participant_b = ?1)",
        )?;
        stmt.query_map(params![user_id], |r| r.get(0))?
            .filter_map(|r| r.ok())
            .collect()
    };

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        conn.execute(
            "UPDATE messages SET status = 'delivered', delivered_at = ?1 WHERE id = ?2",
            params![&now, &id],
        )?;
        if let Some(m) = find_message_by_id(conn, &id)? {
            out.push(m);
        }
    }
    Ok(out)
}

/// Marks a single message as read by `reader_id` (idempotent: re-reading is a no-op, §4.5/§8).
/// Returns the message plus whether the unread counter actually moved.
pub fn mark_message_read(
    conn: &mut Connection,
    message_id: &str,
    reader_id: &str,
) -> Result<(Message, bool), AppError> {
    let tx = conn.transaction()?;

    let (conversation_id, sender_id, status, read_by_json): (String, String, String, String) = tx.query_row(
        "SELECT conversation_id, sender_id, status, read_by FROM messages WHERE id = ?1",
        params![message_id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
    )?;

    if reader_id == sender_id {
        tx.commit()?;
        return Err(AppError::Validation("sender cannot mark their own message as read".into()));
    }

    if status == "read" {
        tx.commit()?;
        let msg = find_message_by_id(conn, message_id)?.expect("message must exist");
        return Ok((msg, false));
    }

    let mut read_by: HashSet<String> = serde_json::from_str(&read_by_json).unwrap_or_default();
    read_by.insert(reader_id.to_string());
    let now = chrono::Utc::now().to_rfc3339();

    tx.execute(
        "UPDATE messages SET status = 'read', read_by = ?1, read_at = ?2 WHERE id = ?3",
        params![serde_json::to_string(&read_by).unwrap(), &now, message_id],
    )?;

    tx.execute(
        "UPDATE conversation_unread SET unread_count = MAX(unread_count - 1, 0) WHERE conversation_id = ?1 AND user_id = ?2",
        params![&conversation_id, reader_id],
    )?;

    tx.commit()?;
    let msg = find_message_by_id(conn, message_id)?.expect("message must exist");
    Ok((msg, true))
}

/// Marks every unread inbound message in `conversation_id` as read by `reader_id` in one
/// transaction, zeroing the reader's unread counter (§4.5 bulk read).
pub fn mark_all_read(
    conn: &mut Connection,
    conversation_id: &str,
    reader_id: &str,
) -> Result<Vec<Message>, AppError> {
    let tx = conn.transaction()?;
    let now = chrono::Utc::now().to_rfc3339();

    let ids: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT id FROM messages WHERE conversation_id = ?1 AND sender_id != ?2 AND status != 'read'",
        )?;
        stmt.query_map(params![conversation_id, reader_id], |r| r.get(0))?
            .filter_map(|r| r.ok())
            .collect()
    };

    for id in &ids {
        let read_by_json: String = tx.query_row(
            "SELECT read_by FROM messages WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        let mut read_by: HashSet<String> = serde_json::from_str(&read_by_json).unwrap_or_default();
        read_by.insert(reader_id.to_string());
        tx.execute(
            "UPDATE messages SET status = 'read', read_by = ?1, read_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&read_by).unwrap(), &now, id],
        )?;
    }

    tx.execute(
        "UPDATE conversation_unread SET unread_count = 0 WHERE conversation_id = ?1 AND user_id = ?2",
        params![conversation_id, reader_id],
    )?;

    tx.commit()?;

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(m) = find_message_by_id(conn, &id)? {
            out.push(m);
        }
    }
    Ok(out)
}

pub fn unread_count_for(conn: &Connection, conversation_id: &str, user_id: &str) -> Result<i64, AppError> {
    Ok(conn
        .query_row(
            "SELECT unread_count FROM conversation_unread WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id, user_id],
            |r| r.get(0),
        )
        .optional()?
        .unwrap_or(0))
}

/// Messages in a conversation, newest-first, for the REST companion endpoint (§6).
pub fn list_messages(
    conn: &Connection,
    conversation_id: &str,
    limit: i64,
) -> Result<Vec<Message>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "{MESSAGE_SELECT} WHERE m.conversation_id = ?1 ORDER BY m.seq DESC LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(params![conversation_id, limit], row_to_message)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Ensures a user row exists; used by the dev-only registration helper (tests, bootstrap).
pub fn upsert_user(conn: &Connection, id: &str, username: &str, password_hash: &str) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET username = excluded.username",
        params![id, username, password_hash, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
