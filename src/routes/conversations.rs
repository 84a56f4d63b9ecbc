use crate::db::{self, Db};
use crate::errors::AppError;
use crate::lifecycle::LifecycleEngine;
use crate::models::{BootstrapConversation, Conversation, Message};
use rocket::serde::json::Json;
use rocket::{get, post, State};
use std::sync::Arc;

use super::AuthUser;

/// Resolves (lazily creating if needed) the 1-to-1 conversation between the caller and
/// `participant_id` (§4.5 step 1 / SPEC_FULL §6).
#[post("/api/v1/conversations/bootstrap", format = "json", data = "<body>")]
pub fn bootstrap_conversation(
    db: &State<Arc<Db>>,
    auth: AuthUser,
    body: Json<BootstrapConversation>,
) -> Result<Json<Conversation>, AppError> {
    let participant_id = body.participant_id.trim();
    if participant_id.is_empty() {
        return Err(AppError::Validation("participant_id must not be empty".into()));
    }
    if participant_id == auth.0.user_id {
        return Err(AppError::Validation("cannot start a conversation with yourself".into()));
    }

    let conn = db.conn();
    db::find_user_by_id(&conn, participant_id)?
        .ok_or_else(|| AppError::Validation("participant does not exist".into()))?;

    let (conversation, _created) = db::get_or_create_conversation(&conn, &auth.0.user_id, participant_id)?;
    Ok(Json(conversation))
}

/// Fetches a page of messages for a conversation, newest-first, for clients that want a
/// REST snapshot instead of (or in addition to) replaying the SSE stream (§6).
#[get("/api/v1/conversations/<conversation_id>/messages?<limit>")]
pub fn get_messages(
    db: &State<Arc<Db>>,
    lifecycle: &State<Arc<LifecycleEngine>>,
    auth: AuthUser,
    conversation_id: &str,
    limit: Option<i64>,
) -> Result<Json<Vec<Message>>, AppError> {
    let conn = db.conn();
    let conversation = db::find_conversation_by_id(&conn, conversation_id)?
        .ok_or_else(|| AppError::Validation("conversation does not exist".into()))?;
    if !conversation.has_participant(&auth.0.user_id) {
        return Err(AppError::NotParticipant(auth.0.user_id.clone()));
    }

    let limit = limit.unwrap_or(50).clamp(1, 200);
    let messages = db::list_messages(&conn, conversation_id, limit)?;
    drop(conn);

    // Reconnecting and fetching history implies the caller is present; flip any
    // still-`sent` inbound messages to `delivered` the same way the SSE connect does.
    let _ = lifecycle.deliver_backlog(&auth.0.user_id);

    Ok(Json(messages))
}
