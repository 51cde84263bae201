//! HTTP client for the Parley thread service.
//!
//! # Architecture
//!
//! - [`ThreadBackend`] - the narrow contract the session engine drives a turn through
//! - [`HttpBackend`] - `reqwest` implementation of that contract, plus the thread and
//!   journey catalog calls (see [`catalog`])
//!
//! # Replies
//!
//! [`ThreadBackend::request_reply`] resolves once the chat endpoint accepted the request
//! and hands back the response body as a [`ReplyStream`] of raw byte chunks. There is no
//! length header and no completion marker: the stream ending is the only completion
//! signal. Chunks are not guaranteed to fall on UTF-8 boundaries; decoding is the
//! caller's job.
//!
//! # Error Handling
//!
//! Non-success statuses surface as [`BackendError::Status`] with the (capped) error body.
//! Nothing is retried here; recovery is up to the user.

pub mod catalog;
mod error;

use std::future::Future;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use serde::Serialize;

pub use error::BackendError;
pub use parley_types;
use parley_types::{
    Attachment, Message, MessageDraft, MessageId, NewMessage, OrphanPolicy, ThreadId,
    ThreadSnapshot,
};

/// Default thread service location.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;

const TCP_KEEPALIVE_SECS: u64 = 60;

const POOL_MAX_IDLE_PER_HOST: usize = 8;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Body of an assistant reply, chunk by chunk.
pub type ReplyStream = BoxStream<'static, Result<Vec<u8>, BackendError>>;

/// The thread service operations a turn depends on.
///
/// Implementations must be cheap to share: the engine holds one behind an `Arc` and
/// calls it from spawned tasks.
pub trait ThreadBackend: Send + Sync + 'static {
    /// `GET thread(id)`: the stored message list used to hydrate a log.
    fn fetch_thread(
        &self,
        thread: &ThreadId,
    ) -> impl Future<Output = Result<ThreadSnapshot, BackendError>> + Send;

    /// `POST thread(id).messages`: persist a message, returning its stored form.
    fn create_message(
        &self,
        thread: &ThreadId,
        message: NewMessage,
    ) -> impl Future<Output = Result<Message, BackendError>> + Send;

    /// `PUT thread(id).messages(id)`: persist an edit. The backend discards every later
    /// message according to `orphans`; local truncation is the caller's job.
    fn update_message(
        &self,
        thread: &ThreadId,
        message: &MessageId,
        draft: MessageDraft,
        orphans: OrphanPolicy,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// `PUT thread(id).messages(id)` with `visible: true`.
    fn reveal_message(
        &self,
        thread: &ThreadId,
        message: &MessageId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// `POST chat(messages)`: start an assistant reply for the given context.
    fn request_reply(
        &self,
        messages: Vec<Message>,
    ) -> impl Future<Output = Result<ReplyStream, BackendError>> + Send;
}

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    base_url: String,
    connect_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl BackendConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            stream_idle_timeout: Duration::from_secs(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Longest wait for the next reply chunk before the stream is declared dead.
    #[must_use]
    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn stream_idle_timeout(&self) -> Duration {
        self.stream_idle_timeout
    }
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: reqwest::Url,
    stream_idle_timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
            .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BackendError::Client)?;

        let base_url = match reqwest::Url::parse(&config.base_url) {
            Ok(url) if !url.cannot_be_a_base() => url,
            Ok(_) => {
                return Err(BackendError::BaseUrl {
                    url: config.base_url.clone(),
                    reason: "not a hierarchical URL".to_string(),
                });
            }
            Err(e) => {
                return Err(BackendError::BaseUrl {
                    url: config.base_url.clone(),
                    reason: e.to_string(),
                });
            }
        };

        Ok(Self {
            client,
            base_url,
            stream_idle_timeout: config.stream_idle_timeout,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Base URL plus `segments`, each percent-encoded as a single path segment.
    pub(crate) fn url(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request and require a 2xx status.
    pub(crate) async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        tracing::debug!(endpoint, "Sending request");
        let response = request
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        check_status(response, endpoint).await
    }

    pub(crate) async fn send_json<T>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.send(endpoint, request).await?;
        response
            .json::<T>()
            .await
            .map_err(|source| BackendError::Decode {
                endpoint: endpoint.to_string(),
                source,
            })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [Message],
}

#[derive(Serialize)]
struct VisibilityUpdate {
    visible: bool,
}

impl ThreadBackend for HttpBackend {
    async fn fetch_thread(&self, thread: &ThreadId) -> Result<ThreadSnapshot, BackendError> {
        let endpoint = format!("GET /threads/{thread}");
        let request = self.client.get(self.url(&["threads", thread.as_str()]));
        self.send_json(&endpoint, request).await
    }

    async fn create_message(
        &self,
        thread: &ThreadId,
        message: NewMessage,
    ) -> Result<Message, BackendError> {
        let endpoint = format!("POST /threads/{thread}/messages");
        let mut form = Form::new()
            .text("content", message.content)
            .text("role", message.role.as_str());
        if let Some(id) = message.message_id {
            form = form.text("message_id", id.into_inner());
        }
        let form = attach_files(form, message.attachments)?;

        let request = self
            .client
            .post(self.url(&["threads", thread.as_str(), "messages"]))
            .multipart(form);
        self.send_json(&endpoint, request).await
    }

    async fn update_message(
        &self,
        thread: &ThreadId,
        message: &MessageId,
        draft: MessageDraft,
        orphans: OrphanPolicy,
    ) -> Result<(), BackendError> {
        let endpoint = format!("PUT /threads/{thread}/messages/{message}");
        let form = Form::new()
            .text("content", draft.content)
            .text("orphans", orphans.as_str());
        let form = attach_files(form, draft.attachments)?;

        let request = self
            .client
            .put(self.url(&["threads", thread.as_str(), "messages", message.as_str()]))
            .multipart(form);
        self.send(&endpoint, request).await?;
        Ok(())
    }

    async fn reveal_message(
        &self,
        thread: &ThreadId,
        message: &MessageId,
    ) -> Result<(), BackendError> {
        let endpoint = format!("PUT /threads/{thread}/messages/{message}");
        let request = self
            .client
            .put(self.url(&["threads", thread.as_str(), "messages", message.as_str()]))
            .json(&VisibilityUpdate { visible: true });
        self.send(&endpoint, request).await?;
        Ok(())
    }

    async fn request_reply(&self, messages: Vec<Message>) -> Result<ReplyStream, BackendError> {
        let endpoint = "POST /chat";
        tracing::debug!(context_len = messages.len(), "Requesting assistant reply");
        let request = self
            .client
            .post(self.url(&["chat"]))
            .json(&ChatRequest {
                messages: &messages,
            });
        let response = self.send(endpoint, request).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(BackendError::Stream));
        Ok(with_idle_timeout(body, self.stream_idle_timeout))
    }
}

fn attach_files(mut form: Form, attachments: Vec<Attachment>) -> Result<Form, BackendError> {
    for attachment in attachments {
        let Attachment {
            filename,
            content_type,
            data,
        } = attachment;
        let part = Part::bytes(data)
            .file_name(filename.clone())
            .mime_str(&content_type)
            .map_err(|source| BackendError::Attachment { filename, source })?;
        form = form.part("files", part);
    }
    Ok(form)
}

/// Bound every chunk read by `idle_timeout`. The stream ends after the first error.
pub(crate) fn with_idle_timeout<S>(body: S, idle_timeout: Duration) -> ReplyStream
where
    S: Stream<Item = Result<Vec<u8>, BackendError>> + Send + 'static,
{
    let body = body.boxed();
    stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(idle_timeout, body.next()).await {
            Err(_) => Some((
                Err(BackendError::StreamIdle {
                    secs: idle_timeout.as_secs(),
                }),
                None,
            )),
            Ok(None) => None,
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
            Ok(Some(Err(e))) => Some((Err(e), None)),
        }
    })
    .boxed()
}

async fn check_status(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = read_capped_error_body(response).await;
    tracing::warn!(endpoint, status = status.as_u16(), "Thread service error");
    Err(BackendError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

#[cfg(test)]
mod tests;
