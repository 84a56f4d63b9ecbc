use rocket::http::{ContentType, Status};

use super::common::test_client;
use super::support::{auth_header, register_user};

#[test]
fn health_reports_ok() {
    let client = test_client();
    let res = client.get("/api/v1/health").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "duoline");
}

#[test]
fn stats_reflects_activity() {
    let client = test_client();
    let alice = register_user(&client.config, "alice");
    let bob = register_user(&client.config, "bob");

    let before: serde_json::Value = client.get("/api/v1/stats").dispatch().into_json().unwrap();
    assert_eq!(before["users"], 2);
    assert_eq!(before["conversations"], 0);
    assert_eq!(before["messages"], 0);

    let res = client
        .post("/api/v1/conversations/bootstrap")
        .header(ContentType::JSON)
        .header(auth_header(&alice.token))
        .body(format!(r#"{{"participant_id":"{}"}}"#, bob.id))
        .dispatch();
    let conv: serde_json::Value = res.into_json().unwrap();
    let conv_id = conv["id"].as_str().unwrap();

    client
        .post(format!("/api/v1/conversations/{conv_id}/messages"))
        .header(ContentType::JSON)
        .header(auth_header(&alice.token))
        .body(r#"{"content":"hi"}"#)
        .dispatch();

    let after: serde_json::Value = client.get("/api/v1/stats").dispatch().into_json().unwrap();
    assert_eq!(after["conversations"], 1);
    assert_eq!(after["messages"], 1);
    assert_eq!(after["messages_unread"], 1);
}

#[test]
fn unknown_route_returns_404_catcher() {
    let client = test_client();
    let res = client.get("/api/v1/does-not-exist").dispatch();
    assert_eq!(res.status(), Status::NotFound);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"], "Not found");
}
