use crate::db::Db;
use crate::errors::AppError;
use crate::lifecycle::LifecycleEngine;
use crate::models::{Message, ReadMessage, SendMessage};
use crate::rate_limit::{RateLimitConfig, RateLimited, RateLimiter};
use rocket::serde::json::Json;
use rocket::{post, State};
use std::sync::Arc;

use super::{AuthUser, ClientIp};

#[post(
    "/api/v1/conversations/<conversation_id>/messages",
    format = "json",
    data = "<body>"
)]
pub fn send_message(
    db: &State<Arc<Db>>,
    lifecycle: &State<Arc<LifecycleEngine>>,
    rate_limiter: &State<Arc<RateLimiter>>,
    rate_limit_config: &State<RateLimitConfig>,
    ip: ClientIp,
    auth: AuthUser,
    conversation_id: &str,
    body: Json<SendMessage>,
) -> Result<RateLimited<Message>, AppError> {
    let rl = rate_limiter.check_with_info(
        &format!("message_send:{}", ip.0),
        rate_limit_config.messages_max,
        rate_limit_config.messages_window_secs,
    );
    if !rl.allowed {
        let error = AppError::RateLimited(rl);
        lifecycle.emit_error(&auth.0.user_id, &error);
        return Err(error);
    }

    let conn = db.conn();
    let sender = crate::db::find_user_by_id(&conn, &auth.0.user_id)?
        .ok_or_else(|| AppError::Auth("unknown user".into()))?;
    drop(conn);

    let message_type = body.message_type.clone().unwrap_or_default();
    let message = lifecycle.send(
        &sender,
        conversation_id,
        &body.content,
        message_type,
        body.client_temp_id.clone(),
    )?;

    Ok(RateLimited::new(Json(message), rl))
}

#[post(
    "/api/v1/conversations/<conversation_id>/read",
    format = "json",
    data = "<body>"
)]
pub fn read_message(
    lifecycle: &State<Arc<LifecycleEngine>>,
    auth: AuthUser,
    conversation_id: &str,
    body: Json<ReadMessage>,
) -> Result<Json<Message>, AppError> {
    let message = lifecycle.read(&auth.0.user_id, conversation_id, &body.message_id)?;
    Ok(Json(message))
}

#[post("/api/v1/conversations/<conversation_id>/read-all")]
pub fn mark_all_read(
    lifecycle: &State<Arc<LifecycleEngine>>,
    auth: AuthUser,
    conversation_id: &str,
) -> Result<Json<Vec<Message>>, AppError> {
    let messages = lifecycle.mark_all_read(&auth.0.user_id, conversation_id)?;
    Ok(Json(messages))
}
