// Route module decomposition — each domain area in its own file.
// Shared types (request guards) live here; route functions in submodules.

mod conversations;
mod messages;
mod stream;
mod system;
mod typing;

pub use conversations::{bootstrap_conversation, get_messages};
pub use messages::{mark_all_read, read_message, send_message};
pub use stream::message_stream;
pub use system::{health, not_found, stats, too_many_requests};
pub use typing::notify_typing;

// --- Shared request guards ---

use crate::auth::{self, Principal};
use crate::config::Config;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;
use std::sync::Arc;

pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| req.remote().map(|r| r.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

/// The Identity Gate's request guard: resolves a verified bearer token into a
/// `Principal` for every protected route. Accepts the token via the `Authorization:
/// Bearer <token>` header, or a `?token=` query parameter (needed for `EventSource`,
/// which cannot set headers) — both are tried in that order.
pub struct AuthUser(pub Principal);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.guard::<&State<Arc<Config>>>().await {
            Outcome::Success(c) => c,
            _ => return Outcome::Forward(Status::InternalServerError),
        };

        let token = req
            .headers()
            .get_one("Authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|s| s.to_string())
            .or_else(|| req.query_value::<String>("token").and_then(|r| r.ok()));

        let Some(token) = token else {
            return Outcome::Forward(Status::Unauthorized);
        };

        match auth::verify_token(config, &token) {
            Ok(principal) => Outcome::Success(AuthUser(principal)),
            Err(_) => Outcome::Forward(Status::Unauthorized),
        }
    }
}
