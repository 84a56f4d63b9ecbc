use rocket::http::{ContentType, Status};

use super::common::test_client;
use super::support::{auth_header, register_user};

#[test]
fn missing_bearer_token_is_rejected_everywhere() {
    let client = test_client();

    let res = client.get("/api/v1/stream").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);

    let res = client
        .post("/api/v1/conversations/bootstrap")
        .header(ContentType::JSON)
        .body(r#"{"participant_id":"someone"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn malformed_bearer_token_is_rejected() {
    let client = test_client();
    let res = client
        .post("/api/v1/conversations/bootstrap")
        .header(ContentType::JSON)
        .header(auth_header("not-a-real-token"))
        .body(r#"{"participant_id":"someone"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn forged_signature_is_rejected() {
    let client = test_client();
    let alice = register_user(&client.config, "alice");
    // Flip the last signature character so the HMAC no longer matches.
    let mut forged = alice.token.clone();
    let last = forged.pop().unwrap();
    forged.push(if last == '0' { '1' } else { '0' });

    let res = client
        .post("/api/v1/conversations/bootstrap")
        .header(ContentType::JSON)
        .header(auth_header(&forged))
        .body(r#"{"participant_id":"someone"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn expired_token_is_rejected() {
    let mut config = super::common::test_config();
    config.auth_token_ttl_secs = -1; // already expired the instant it's minted
    let client = super::common::test_client_with(config);
    let alice = register_user(&client.config, "alice");

    let res = client
        .post("/api/v1/conversations/bootstrap")
        .header(ContentType::JSON)
        .header(auth_header(&alice.token))
        .body(r#"{"participant_id":"someone"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn token_presented_as_query_param_also_works() {
    let client = test_client();
    let alice = register_user(&client.config, "alice");

    let res = client
        .get(format!("/api/v1/stream?token={}", alice.token))
        .dispatch();
    // EventSource can't set headers, so the stream route must accept ?token= too.
    // Can't read the (infinite) SSE body here — just confirm the handshake wasn't rejected.
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn empty_participant_id_rejected() {
    let client = test_client();
    let alice = register_user(&client.config, "alice");

    let res = client
        .post("/api/v1/conversations/bootstrap")
        .header(ContentType::JSON)
        .header(auth_header(&alice.token))
        .body(r#"{"participant_id":"  "}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}
