use crate::db::{self, Db};
use crate::errors::AppError;
use crate::events::ChatEvent;
use crate::models::TypingEvent;
use crate::rooms::RoomRouter;
use crate::typing::TypingTracker;
use rocket::serde::json::Json;
use rocket::{post, State};
use std::sync::Arc;

use super::AuthUser;

#[post(
    "/api/v1/conversations/<conversation_id>/typing",
    format = "json",
    data = "<body>"
)]
pub fn notify_typing(
    db: &State<Arc<Db>>,
    rooms: &State<Arc<RoomRouter>>,
    tracker: &State<Arc<TypingTracker>>,
    auth: AuthUser,
    conversation_id: &str,
    body: Json<crate::models::TypingHeartbeat>,
) -> Result<Json<serde_json::Value>, AppError> {
    let conn = db.conn();
    let conversation = db::find_conversation_by_id(&conn, conversation_id)?
        .ok_or_else(|| AppError::Validation("conversation does not exist".into()))?;
    if !conversation.has_participant(&auth.0.user_id) {
        return Err(AppError::NotParticipant(auth.0.user_id.clone()));
    }
    let username = db::find_user_by_id(&conn, &auth.0.user_id)?
        .ok_or_else(|| AppError::Auth("unknown user".into()))?
        .username;
    drop(conn);

    let changed = tracker.heartbeat(conversation_id, &auth.0.user_id, &username, body.is_typing);
    if changed {
        let event = ChatEvent::Typing(TypingEvent {
            user_id: auth.0.user_id.clone(),
            username,
            is_typing: body.is_typing,
            conversation_id: conversation_id.to_string(),
        });
        let other = conversation
            .other_participant(&auth.0.user_id)
            .expect("auth user is a participant")
            .to_string();
        rooms.emit_to_conversation(&auth.0.user_id, &other, event, Some(&auth.0.user_id));
    }

    Ok(Json(serde_json::json!({"ok": true})))
}
