use crate::rate_limit::RateLimitInfo;
use rocket::http::{Header, Status};
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;
use thiserror::Error;

/// The error taxonomy every handler and the lifecycle engine match on.
///
/// `AuthError` collapses to a single opaque message client-side so a rejected handshake
/// never tells the caller *why* (missing vs expired vs unknown user).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{0} is not a participant of this conversation")]
    NotParticipant(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store temporarily unavailable: {0}")]
    StoreTransient(String),

    #[error("store error: {0}")]
    StoreFatal(String),

    #[error("rate limited")]
    RateLimited(RateLimitInfo),
}

impl AppError {
    /// Whether a caller may usefully retry this operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StoreTransient(_) | AppError::RateLimited(_))
    }

    /// The string carried in a `message:error` SSE payload. Auth failures are never
    /// detailed here — only "authentication error" — to avoid enumerating failure modes.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Auth(_) => "authentication error".to_string(),
            AppError::NotParticipant(_) => "not a participant of this conversation".to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::StoreTransient(_) | AppError::StoreFatal(_) => {
                "message could not be processed".to_string()
            }
            AppError::RateLimited(info) => {
                format!("rate limited: max {} messages per window, retry in {}s", info.limit, info.retry_after_secs)
            }
        }
    }

    fn status(&self) -> Status {
        match self {
            AppError::Auth(_) => Status::Unauthorized,
            AppError::NotParticipant(_) => Status::Forbidden,
            AppError::Validation(_) => Status::BadRequest,
            AppError::StoreTransient(_) => Status::ServiceUnavailable,
            AppError::StoreFatal(_) => Status::InternalServerError,
            AppError::RateLimited(_) => Status::TooManyRequests,
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi::ErrorCode;
        if let rusqlite::Error::SqliteFailure(sqlite_err, _) = &err
            && matches!(sqlite_err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        {
            return AppError::StoreTransient(err.to_string());
        }
        AppError::StoreFatal(err.to_string())
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let rate_limit_info = if let AppError::RateLimited(info) = &self {
            Some(info.clone())
        } else {
            None
        };
        let body = Json(serde_json::json!({ "error": self.client_message() }));
        let mut response = Response::build_from(body.respond_to(req)?)
            .status(status)
            .finalize();

        if let Some(info) = rate_limit_info {
            response.set_header(Header::new("X-RateLimit-Limit", info.limit.to_string()));
            response.set_header(Header::new("X-RateLimit-Remaining", "0".to_string()));
            response.set_header(Header::new("X-RateLimit-Reset", info.retry_after_secs.to_string()));
            response.set_header(Header::new("Retry-After", info.retry_after_secs.to_string()));
        }

        Ok(response)
    }
}
