use duoline::config::Config;
use duoline::{auth, db};
use rusqlite::Connection;
use uuid::Uuid;

/// A seeded user plus the bearer token a real client would present on every request.
/// Seeding goes straight through `db::upsert_user` against the test db file — there is
/// no registration endpoint in this API (SPEC_FULL §4.1: tokens authenticate, they don't
/// mint accounts), so tests stand in for whatever onboarding flow issues the token.
pub struct TestUser {
    pub id: String,
    pub username: String,
    pub token: String,
}

/// Requires the rocket instance for `config` to have already been built at least once
/// (migrations must have run) before calling this.
pub fn register_user(config: &Config, username: &str) -> TestUser {
    let id = Uuid::new_v4().to_string();
    let conn = Connection::open(&config.database_path).expect("open test db for seeding");
    db::upsert_user(&conn, &id, username, "").expect("seed test user");
    let token = auth::issue_token(config, &id);
    TestUser {
        id,
        username: username.to_string(),
        token,
    }
}

pub fn auth_header(token: &str) -> rocket::http::Header<'static> {
    rocket::http::Header::new("Authorization", format!("Bearer {token}"))
}
