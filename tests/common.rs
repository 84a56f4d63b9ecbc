use duoline::config::Config;
use rocket::local::blocking::Client;

fn temp_db_path() -> String {
    format!(
        "/tmp/duoline_test_{}.db",
        uuid::Uuid::new_v4().to_string().split('-').next().unwrap()
    )
}

pub fn test_config() -> Config {
    Config {
        database_path: temp_db_path(),
        ..Config::default()
    }
}

fn cleanup_db_files(db_path: &str) {
    let _ = std::fs::remove_file(db_path);
    let _ = std::fs::remove_file(format!("{db_path}-wal"));
    let _ = std::fs::remove_file(format!("{db_path}-shm"));
}

/// Wrapper around a blocking `Client` that auto-deletes its temp SQLite file on drop,
/// to avoid `/tmp` accumulation across test runs.
pub struct TestClient {
    client: Option<Client>,
    pub config: Config,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        cleanup_db_files(&self.config.database_path);
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

pub fn test_client() -> TestClient {
    test_client_with(test_config())
}

pub fn test_client_with(config: Config) -> TestClient {
    let rocket = duoline::rocket_with_config(config.clone());
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient {
        client: Some(client),
        config,
    }
}

/// Async counterpart, needed for scenarios that must observe an open SSE stream
/// concurrently with other requests (delivered-defer, typing expiry, live fan-out).
pub struct AsyncTestClient {
    client: Option<rocket::local::asynchronous::Client>,
    pub config: Config,
}

impl Drop for AsyncTestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        cleanup_db_files(&self.config.database_path);
    }
}

impl std::ops::Deref for AsyncTestClient {
    type Target = rocket::local::asynchronous::Client;
    fn deref(&self) -> &rocket::local::asynchronous::Client {
        self.client.as_ref().unwrap()
    }
}

pub async fn async_test_client_with(config: Config) -> AsyncTestClient {
    let rocket = duoline::rocket_with_config(config.clone());
    let client = rocket::local::asynchronous::Client::tracked(rocket)
        .await
        .expect("valid rocket instance");
    AsyncTestClient {
        client: Some(client),
        config,
    }
}

pub async fn async_test_client() -> AsyncTestClient {
    async_test_client_with(test_config()).await
}
