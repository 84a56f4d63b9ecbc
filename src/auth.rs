use crate::config::Config;
use crate::errors::AppError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The principal resolved from a verified bearer token (SPEC_FULL §4.1).
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
}

/// Mints a bearer token of the form `<user_id>.<expiry>.<hex hmac>`, signed with the
/// server's configured secret. The HMAC covers `user_id:expiry`, reusing the same
/// `HmacSha256::new_from_slice` + `mac.update` + `hex::encode` shape the webhook
/// dispatcher used for payload signatures.
pub fn issue_token(config: &Config, user_id: &str) -> String {
    let expiry = chrono::Utc::now().timestamp() + config.auth_token_ttl_secs;
    let signature = sign(config, user_id, expiry);
    format!("{user_id}.{expiry}.{signature}")
}

/// Verifies a bearer token's signature and expiry, returning the resolved principal.
/// Every failure mode collapses to `AppError::Auth` — the handshake rejection must not
/// let a caller distinguish "expired" from "forged" from "malformed" (§4.1, §7).
pub fn verify_token(config: &Config, token: &str) -> Result<Principal, AppError> {
    let mut parts = token.splitn(3, '.');
    let user_id = parts.next().ok_or_else(|| AppError::Auth("malformed token".into()))?;
    let expiry_str = parts.next().ok_or_else(|| AppError::Auth("malformed token".into()))?;
    let signature = parts.next().ok_or_else(|| AppError::Auth("malformed token".into()))?;

    let expiry: i64 = expiry_str
        .parse()
        .map_err(|_| AppError::Auth("malformed token".into()))?;

    let expected = sign(config, user_id, expiry);
    if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        return Err(AppError::Auth("bad signature".into()));
    }

    if chrono::Utc::now().timestamp() > expiry {
        return Err(AppError::Auth("token expired".into()));
    }

    Ok(Principal {
        user_id: user_id.to_string(),
    })
}

fn sign(config: &Config, user_id: &str, expiry: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(config.auth_token_secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{user_id}:{expiry}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
