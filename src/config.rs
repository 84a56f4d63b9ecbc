use std::env;

/// Server tunables, read once at boot and attached as managed Rocket state.
///
/// Environment variables:
/// - `DATABASE_PATH` — SQLite file location (default: `data/chat.db`)
/// - `AUTH_TOKEN_SECRET` — HMAC-SHA256 key for bearer tokens (default: dev fallback, logged as a warning)
/// - `AUTH_TOKEN_TTL_SECS` — bearer token validity window (default: 86400)
/// - `MAX_CONTENT_LENGTH` — max trimmed message content length (default: 4000)
/// - `TYPING_IDLE_MS` — typing idle timeout before auto-expiry (default: 3000)
/// - `DELIVERED_DEFER_MS` — delay before a reachable recipient's message flips to delivered (default: 1000)
/// - `RATE_LIMIT_MESSAGES` — max message:send per window per IP (default: 60)
/// - `RATE_LIMIT_WINDOW_SECS` — window for the above (default: 60)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub auth_token_secret: String,
    pub auth_token_ttl_secs: i64,
    pub max_content_length: usize,
    pub typing_idle_ms: u64,
    pub delivered_defer_ms: u64,
    pub rate_limit_messages: usize,
    pub rate_limit_window_secs: u64,
}

const DEV_SECRET_FALLBACK: &str = "dev-insecure-secret-do-not-use-in-production";

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "data/chat.db".to_string(),
            auth_token_secret: DEV_SECRET_FALLBACK.to_string(),
            auth_token_ttl_secs: 86_400,
            max_content_length: 4_000,
            typing_idle_ms: 3_000,
            delivered_defer_ms: 1_000,
            rate_limit_messages: 60,
            rate_limit_window_secs: 60,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("DATABASE_PATH") {
            config.database_path = val;
        }
        match env::var("AUTH_TOKEN_SECRET") {
            Ok(val) if !val.is_empty() => config.auth_token_secret = val,
            _ => {
                eprintln!(
                    "⚠️  AUTH_TOKEN_SECRET not set — using an insecure development fallback. Set it before deploying."
                );
            }
        }
        if let Ok(val) = env::var("AUTH_TOKEN_TTL_SECS")
            && let Ok(n) = val.parse::<i64>()
        {
            config.auth_token_ttl_secs = n;
        }
        if let Ok(val) = env::var("MAX_CONTENT_LENGTH")
            && let Ok(n) = val.parse::<usize>()
        {
            config.max_content_length = n;
        }
        if let Ok(val) = env::var("TYPING_IDLE_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.typing_idle_ms = n;
        }
        if let Ok(val) = env::var("DELIVERED_DEFER_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.delivered_defer_ms = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_MESSAGES")
            && let Ok(n) = val.parse::<usize>()
        {
            config.rate_limit_messages = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_WINDOW_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.rate_limit_window_secs = n;
        }

        config
    }
}
