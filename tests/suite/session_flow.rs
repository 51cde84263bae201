//! Full turns through `HttpBackend` against a mock thread service.

use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parley_engine::{
    ErrorKind, MessageDraft, MessageId, OrphanPolicy, Role, SessionSettings, SessionState,
    ThreadId,
};

use crate::common::{
    THREAD, bodies, chat_contexts, contents, hidden, message, mount_reply, mount_reply_store,
    mount_thread, mount_user_store, open_session, session_for,
};

#[tokio::test]
async fn send_round_trip() {
    let server = MockServer::start().await;
    mount_thread(&server, vec![]).await;
    mount_user_store(&server, "m1", "hi").await;
    mount_reply(&server, "Hello wörld").await;
    mount_reply_store(&server).await;

    let mut session = open_session(&server).await;
    session.send_message(MessageDraft::new("hi")).unwrap();
    session.settle().await;

    assert!(session.error().is_none(), "{:?}", session.error());
    assert_eq!(session.state(), SessionState::Ready(None));
    assert_eq!(contents(&session), ["hi", "Hello wörld"]);

    let log = session.log().messages();
    assert_eq!(log[0].id().as_str(), "m1");
    assert_eq!(log[1].role(), Role::Assistant);
    assert_eq!(log[1].id().as_str(), "local-2");

    assert_eq!(chat_contexts(&server).await, [vec!["hi"]]);
    let stores = bodies(&server, &format!("/threads/{THREAD}/messages")).await;
    let reply_store = String::from_utf8_lossy(&stores[1]);
    assert!(reply_store.contains("local-2"));
    assert!(reply_store.contains("Hello wörld"));
}

#[tokio::test]
async fn edit_round_trip_truncates_and_regenerates() {
    let server = MockServer::start().await;
    mount_thread(
        &server,
        vec![
            message("m1", "user", "hi"),
            message("m2", "assistant", "hello"),
            message("m3", "user", "and then?"),
            message("m4", "assistant", "nothing"),
        ],
    )
    .await;
    Mock::given(method("PUT"))
        .and(path(format!("/threads/{THREAD}/messages/m1")))
        .and(body_string_contains("hey"))
        .and(body_string_contains("hide"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    mount_reply(&server, "Howdy").await;
    mount_reply_store(&server).await;

    let mut session = session_for(
        &server,
        SessionSettings {
            orphans: OrphanPolicy::Hide,
            ..SessionSettings::default()
        },
    );
    session.open(ThreadId::new(THREAD)).await.unwrap();
    session
        .edit_message(&MessageId::new("m1"), MessageDraft::new("hey"))
        .unwrap();
    session.settle().await;

    assert!(session.error().is_none(), "{:?}", session.error());
    assert_eq!(contents(&session), ["hey", "Howdy"]);
    assert_eq!(chat_contexts(&server).await, [vec!["hey"]]);
}

#[tokio::test]
async fn journey_round_trip_reveals_seed() {
    let server = MockServer::start().await;
    mount_thread(&server, vec![hidden("seed", "Begin the tour")]).await;
    Mock::given(method("PUT"))
        .and(path(format!("/threads/{THREAD}/messages/seed")))
        .and(body_json(json!({"visible": true})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    mount_reply(&server, "Welcome!").await;
    mount_reply_store(&server).await;

    let mut session = open_session(&server).await;
    assert!(contents(&session).is_empty());
    assert!(session.can_start_journey());

    session.start_journey().unwrap();
    session.settle().await;

    assert!(session.error().is_none(), "{:?}", session.error());
    assert_eq!(contents(&session), ["Begin the tour", "Welcome!"]);

    let chat = bodies(&server, "/chat").await;
    let request: serde_json::Value = serde_json::from_slice(&chat[0]).unwrap();
    assert_eq!(request["messages"][0]["visible"], json!(true));
}

#[tokio::test]
async fn reply_failure_leaves_user_message_and_error() {
    let server = MockServer::start().await;
    mount_thread(&server, vec![]).await;
    mount_user_store(&server, "m1", "hi").await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model offline"))
        .mount(&server)
        .await;

    let mut session = open_session(&server).await;
    session.send_message(MessageDraft::new("hi")).unwrap();
    session.settle().await;

    let error = session.error().unwrap();
    assert_eq!(error.kind, ErrorKind::Reply);
    assert!(error.message.contains("model offline"), "{}", error.message);
    assert_eq!(contents(&session), ["hi"]);
    assert_eq!(
        bodies(&server, &format!("/threads/{THREAD}/messages"))
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn missing_thread_fails_to_open() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let mut session = session_for(&server, SessionSettings::default());
    let err = session.open(ThreadId::new("gone")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Load);
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.error().unwrap().kind, ErrorKind::Load);
}
