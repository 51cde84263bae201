use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{BackendConfig, BackendError, HttpBackend, ThreadBackend, with_idle_timeout};
use parley_types::{
    Attachment, JourneyId, Message, MessageDraft, MessageId, NewMessage, OrphanPolicy, Role,
    ThreadId,
};

fn backend_for(server: &MockServer) -> HttpBackend {
    HttpBackend::new(&BackendConfig::new(server.uri())).expect("client builds")
}

async fn collect_reply(backend: &HttpBackend, messages: Vec<Message>) -> Vec<u8> {
    let mut stream = backend.request_reply(messages).await.expect("reply opens");
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.expect("chunk"));
    }
    body
}

#[test]
fn config_trims_trailing_slash() {
    let config = BackendConfig::new("http://example.test/api/");
    assert_eq!(config.base_url(), "http://example.test/api");
}

#[tokio::test]
async fn fetch_thread_parses_messages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t1",
            "name": "Intro",
            "messages": [
                {"id": "m1", "role": "user", "content": "hi", "visible": true},
                {"id": "m2", "role": "assistant", "content": "hello", "visible": true}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = backend_for(&server)
        .fetch_thread(&ThreadId::new("t1"))
        .await
        .unwrap();

    assert_eq!(snapshot.name.as_deref(), Some("Intro"));
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[1].content(), "hello");
}

#[tokio::test]
async fn ids_with_reserved_characters_stay_in_one_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads/a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": []})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/a%23b%2Fc%3Fd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": "m1", "role": "user", "content": "right thread"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/threads/a%23b%2Fc%3Fd/messages/x%2F..%2Fy"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let thread = ThreadId::new("a#b/c?d");
    let snapshot = backend.fetch_thread(&thread).await.unwrap();
    assert_eq!(snapshot.messages[0].content(), "right thread");

    backend
        .reveal_message(&thread, &MessageId::new("x/../y"))
        .await
        .unwrap();
}

#[test]
fn base_url_path_is_kept() {
    let backend = HttpBackend::new(&BackendConfig::new("http://example.test/api/")).unwrap();
    assert_eq!(
        backend.url(&["threads", "t 1"]).as_str(),
        "http://example.test/api/threads/t%201"
    );
}

#[test]
fn unusable_base_url_is_rejected() {
    for base in ["not a url", "mailto:someone@example.test"] {
        let err = HttpBackend::new(&BackendConfig::new(base)).unwrap_err();
        assert!(matches!(err, BackendError::BaseUrl { .. }), "{base}: {err:?}");
    }
}

#[tokio::test]
async fn fetch_thread_maps_error_status_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such thread"))
        .mount(&server)
        .await;

    let err = backend_for(&server)
        .fetch_thread(&ThreadId::new("missing"))
        .await
        .unwrap_err();

    match err {
        BackendError::Status {
            endpoint,
            status,
            body,
        } => {
            assert_eq!(endpoint, "GET /threads/missing");
            assert_eq!(status, 404);
            assert_eq!(body, "no such thread");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_thread_rejects_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = backend_for(&server)
        .fetch_thread(&ThreadId::new("t1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Decode { .. }), "got {err:?}");
}

#[tokio::test]
async fn create_message_posts_multipart_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads/t1/messages"))
        .and(body_string_contains("name=\"content\""))
        .and(body_string_contains("what is this?"))
        .and(body_string_contains("name=\"role\""))
        .and(body_string_contains("filename=\"cat.png\""))
        .and(body_string_contains("image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m7",
            "role": "user",
            "content": "what is this?",
            "media_files": [{"filename": "cat.png", "content_type": "image/png"}],
            "visible": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let draft = MessageDraft::new("what is this?").with_attachment(Attachment::new(
        "cat.png",
        "image/png",
        vec![0x89, b'P', b'N', b'G'],
    ));
    let stored = backend_for(&server)
        .create_message(&ThreadId::new("t1"), NewMessage::user(draft))
        .await
        .unwrap();

    assert_eq!(stored.id().as_str(), "m7");
    assert_eq!(stored.role(), Role::User);
    assert_eq!(stored.media_files()[0].filename, "cat.png");
}

#[tokio::test]
async fn assistant_reply_carries_client_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads/t1/messages"))
        .and(body_string_contains("name=\"message_id\""))
        .and(body_string_contains("reply-1"))
        .and(body_string_contains("assistant"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "reply-1",
            "role": "assistant",
            "content": "Hello world"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stored = backend_for(&server)
        .create_message(
            &ThreadId::new("t1"),
            NewMessage::assistant_reply(MessageId::new("reply-1"), "Hello world"),
        )
        .await
        .unwrap();
    assert_eq!(stored.id().as_str(), "reply-1");
}

#[tokio::test]
async fn invalid_attachment_type_is_rejected_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let draft = MessageDraft::new("x").with_attachment(Attachment::new("bad", "not a mime", b"1"));
    let err = backend_for(&server)
        .create_message(&ThreadId::new("t1"), NewMessage::user(draft))
        .await
        .unwrap_err();
    assert!(
        matches!(err, BackendError::Attachment { ref filename, .. } if filename == "bad"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn update_message_sends_content_and_orphan_policy() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/threads/t1/messages/m1"))
        .and(body_string_contains("hey"))
        .and(body_string_contains("name=\"orphans\""))
        .and(body_string_contains("hide"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    backend_for(&server)
        .update_message(
            &ThreadId::new("t1"),
            &MessageId::new("m1"),
            MessageDraft::new("hey"),
            OrphanPolicy::Hide,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn reveal_message_puts_visibility_flag() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/threads/t1/messages/seed"))
        .and(body_json(json!({"visible": true})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    backend_for(&server)
        .reveal_message(&ThreadId::new("t1"), &MessageId::new("seed"))
        .await
        .unwrap();
}

#[tokio::test]
async fn request_reply_posts_context_and_streams_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_json(json!({
            "messages": [
                {"id": "m1", "role": "user", "content": "hi", "media_files": [], "visible": true}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hello wörld"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let body = collect_reply(
        &backend,
        vec![Message::user(MessageId::new("m1"), "hi", Vec::new())],
    )
    .await;
    assert_eq!(String::from_utf8(body).unwrap(), "Hello wörld");
}

#[tokio::test]
async fn request_reply_surfaces_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let Err(err) = backend_for(&server).request_reply(Vec::new()).await else {
        panic!("expected reply request to fail");
    };
    assert_eq!(err.status(), Some(502));
    assert!(err.to_string().contains("upstream down"));
}

#[tokio::test]
async fn idle_stream_times_out() {
    let body = stream::pending::<Result<Vec<u8>, BackendError>>();
    let mut reply = with_idle_timeout(body, Duration::from_millis(20));

    let first = reply.next().await.expect("timeout item");
    assert!(matches!(first, Err(BackendError::StreamIdle { .. })));
    assert!(reply.next().await.is_none(), "stream ends after the error");
}

#[tokio::test]
async fn idle_timeout_passes_chunks_through() {
    let body = stream::iter(vec![Ok(b"Hel".to_vec()), Ok(b"lo".to_vec())]);
    let chunks: Vec<_> = with_idle_timeout(body, Duration::from_secs(5))
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;
    assert_eq!(chunks, vec![b"Hel".to_vec(), b"lo".to_vec()]);
}

mod catalog {
    use super::{JourneyId, MockServer, ResponseTemplate, ThreadId, backend_for, json};
    use wiremock::Mock;
    use wiremock::matchers::{body_json, method, path};

    #[tokio::test]
    async fn lists_threads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "t1", "name": "First"},
                {"id": "t2", "name": "Second"}
            ])))
            .mount(&server)
            .await;

        let threads = backend_for(&server).list_threads().await.unwrap();
        let names: Vec<_> = threads.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["First", "Second"]);
    }

    #[tokio::test]
    async fn creates_thread_from_journey() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .and(body_json(json!({"name": "Onboarding", "journey_id": "j1"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "t3", "name": "Onboarding"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let thread = backend_for(&server)
            .create_thread("Onboarding", Some(&JourneyId::new("j1")))
            .await
            .unwrap();
        assert_eq!(thread.id, ThreadId::new("t3"));
    }

    #[tokio::test]
    async fn renames_and_deletes_thread() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/threads/t1"))
            .and(body_json(json!({"name": "Renamed"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/threads/t1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let thread = ThreadId::new("t1");
        backend.rename_thread(&thread, "Renamed").await.unwrap();
        backend.delete_thread(&thread).await.unwrap();
    }

    #[tokio::test]
    async fn lists_journeys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/journeys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "j1", "name": "Intro", "description": "Getting started"}
            ])))
            .mount(&server)
            .await;

        let journeys = backend_for(&server).list_journeys().await.unwrap();
        assert_eq!(journeys.len(), 1);
        assert_eq!(journeys[0].description, "Getting started");
    }
}
