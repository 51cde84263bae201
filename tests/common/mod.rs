//! Shared test utilities and fixtures
//!
//! A wiremock stand-in for the thread service plus a session wired to it.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parley_engine::{
    BackendConfig, HttpBackend, SequentialIds, Session, SessionSettings, ThreadId,
};

pub const THREAD: &str = "t1";

pub fn message(id: &str, role: &str, content: &str) -> Value {
    json!({"id": id, "role": role, "content": content, "media_files": [], "visible": true})
}

pub fn hidden(id: &str, content: &str) -> Value {
    json!({"id": id, "role": "user", "content": content, "media_files": [], "visible": false})
}

/// `GET /threads/t1` returns `messages`.
pub async fn mount_thread(server: &MockServer, messages: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/threads/{THREAD}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": THREAD,
            "name": "Test thread",
            "messages": messages
        })))
        .mount(server)
        .await;
}

/// Storing a user message echoes it back under `stored_id`.
pub async fn mount_user_store(server: &MockServer, stored_id: &str, content: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/threads/{THREAD}/messages")))
        .and(body_string_contains(content))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(message(stored_id, "user", content)),
        )
        .with_priority(5)
        .expect(1)
        .mount(server)
        .await;
}

/// Storing the assistant reply, recognised by its client-assigned `message_id` field.
pub async fn mount_reply_store(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/threads/{THREAD}/messages")))
        .and(body_string_contains("name=\"message_id\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ignored",
            "role": "assistant",
            "content": ""
        })))
        .with_priority(1)
        .expect(1)
        .mount(server)
        .await;
}

/// `POST /chat` answers with `body` as the reply stream.
pub async fn mount_reply(server: &MockServer, body: &str) {
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(server)
        .await;
}

pub fn session_for(server: &MockServer, settings: SessionSettings) -> Session<HttpBackend> {
    let backend = HttpBackend::new(&BackendConfig::new(server.uri())).expect("client builds");
    Session::with_parts(
        Arc::new(backend),
        Arc::new(SequentialIds::new("local")),
        settings,
    )
}

pub async fn open_session(server: &MockServer) -> Session<HttpBackend> {
    let mut session = session_for(server, SessionSettings::default());
    session
        .open(ThreadId::new(THREAD))
        .await
        .expect("thread opens");
    session
}

/// Raw bodies of every request the server saw on `route`.
pub async fn bodies(server: &MockServer, route: &str) -> Vec<Vec<u8>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == route)
        .map(|request| request.body)
        .collect()
}

/// Message contents of each `POST /chat` request.
pub async fn chat_contexts(server: &MockServer) -> Vec<Vec<String>> {
    bodies(server, "/chat")
        .await
        .iter()
        .filter_map(|body| serde_json::from_slice::<Value>(body).ok())
        .map(|request| {
            request["messages"]
                .as_array()
                .map(|messages| {
                    messages
                        .iter()
                        .map(|m| m["content"].as_str().unwrap_or_default().to_string())
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}

pub fn contents(session: &Session<HttpBackend>) -> Vec<String> {
    session
        .messages()
        .map(|m| m.content().to_string())
        .collect()
}
