use rocket::http::{ContentType, Status};
use std::time::Duration;

use super::common::{test_client_with, test_config};
use super::support::{auth_header, register_user};

fn stats(client: &super::common::TestClient) -> serde_json::Value {
    client
        .get("/api/v1/stats")
        .dispatch()
        .into_json()
        .unwrap()
}

fn bootstrap(client: &super::common::TestClient, a_token: &str, b_id: &str) -> String {
    let res = client
        .post("/api/v1/conversations/bootstrap")
        .header(ContentType::JSON)
        .header(auth_header(a_token))
        .body(format!(r#"{{"participant_id":"{b_id}"}}"#))
        .dispatch();
    let conv: serde_json::Value = res.into_json().unwrap();
    conv["id"].as_str().unwrap().to_string()
}

/// Connecting and dropping the SSE stream is the whole presence lifecycle (SPEC_FULL
/// §4.1/§4.2): the Identity Gate lets it through, the Presence Registry flips the user
/// online on attach and back offline when the connection guard drops.
#[test]
fn connecting_and_disconnecting_toggles_presence() {
    let client = test_client_with(test_config());
    let alice = register_user(&client.config, "alice");

    assert_eq!(stats(&client)["users_online"], 0);

    let response = client
        .get(format!("/api/v1/stream?token={}", alice.token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(stats(&client)["users_online"], 1);

    drop(response);
    assert_eq!(stats(&client)["users_online"], 0);
}

/// A second session for the same user must not double-count — presence is edge
/// triggered on the 0↔1 transition of the user's session set, not per-connection.
#[test]
fn second_session_same_user_does_not_double_count() {
    let client = test_client_with(test_config());
    let alice = register_user(&client.config, "alice");

    let s1 = client
        .get(format!("/api/v1/stream?token={}", alice.token))
        .dispatch();
    let s2 = client
        .get(format!("/api/v1/stream?token={}", alice.token))
        .dispatch();
    assert_eq!(stats(&client)["users_online"], 1);

    drop(s1);
    // One session remains — alice must still show online.
    assert_eq!(stats(&client)["users_online"], 1);

    drop(s2);
    assert_eq!(stats(&client)["users_online"], 0);
}

/// Scenario: sending a message to a recipient whose stream is open schedules the
/// deferred `sent -> delivered` transition; an offline recipient's message stays `sent`.
#[test]
fn online_recipient_gets_deferred_delivered_transition() {
    let mut config = test_config();
    config.delivered_defer_ms = 20;
    let client = test_client_with(config);
    let alice = register_user(&client.config, "alice");
    let bob = register_user(&client.config, "bob");
    let conv_id = bootstrap(&client, &alice.token, &bob.id);

    let _bob_stream = client
        .get(format!("/api/v1/stream?token={}", bob.token))
        .dispatch();

    let res = client
        .post(format!("/api/v1/conversations/{conv_id}/messages"))
        .header(ContentType::JSON)
        .header(auth_header(&alice.token))
        .body(r#"{"content":"hi bob"}"#)
        .dispatch();
    let message: serde_json::Value = res.into_json().unwrap();
    assert_eq!(message["status"], "sent");

    std::thread::sleep(Duration::from_millis(200));

    let res = client
        .get(format!("/api/v1/conversations/{conv_id}/messages"))
        .header(auth_header(&alice.token))
        .dispatch();
    let messages: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(messages[0]["status"], "delivered");
}

#[test]
fn offline_recipient_message_stays_sent() {
    let client = test_client_with(test_config());
    let alice = register_user(&client.config, "alice");
    let bob = register_user(&client.config, "bob");
    let conv_id = bootstrap(&client, &alice.token, &bob.id);

    client
        .post(format!("/api/v1/conversations/{conv_id}/messages"))
        .header(ContentType::JSON)
        .header(auth_header(&alice.token))
        .body(r#"{"content":"are you there?"}"#)
        .dispatch();

    std::thread::sleep(Duration::from_millis(100));

    let res = client
        .get(format!("/api/v1/conversations/{conv_id}/messages"))
        .header(auth_header(&alice.token))
        .dispatch();
    let messages: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(messages[0]["status"], "sent");
}

/// A reconnecting user's backlog of still-`sent` inbound messages flips to `delivered`
/// the moment their stream opens, without waiting for the normal defer window.
#[test]
fn reconnect_delivers_backlog_immediately() {
    let mut config = test_config();
    config.delivered_defer_ms = 60_000; // long enough that only deliver_backlog could explain it
    let client = test_client_with(config);
    let alice = register_user(&client.config, "alice");
    let bob = register_user(&client.config, "bob");
    let conv_id = bootstrap(&client, &alice.token, &bob.id);

    client
        .post(format!("/api/v1/conversations/{conv_id}/messages"))
        .header(ContentType::JSON)
        .header(auth_header(&alice.token))
        .body(r#"{"content":"while you were out"}"#)
        .dispatch();

    let _bob_stream = client
        .get(format!("/api/v1/stream?token={}", bob.token))
        .dispatch();

    let res = client
        .get(format!("/api/v1/conversations/{conv_id}/messages"))
        .header(auth_header(&alice.token))
        .dispatch();
    let messages: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(messages[0]["status"], "delivered");
}
