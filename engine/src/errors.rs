//! Turn failures and the single error slot the UI reads.

use parley_backend::BackendError;
use thiserror::Error;

/// Why a session operation failed. Each variant wraps the backend failure that caused it.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("failed to load thread: {0}")]
    Load(#[source] BackendError),
    #[error("failed to send message: {0}")]
    Send(#[source] BackendError),
    #[error("failed to edit message: {0}")]
    Edit(#[source] BackendError),
    #[error("failed to start journey: {0}")]
    Journey(#[source] BackendError),
    #[error("failed to get a reply: {0}")]
    Reply(#[source] BackendError),
    #[error("reply stream broke: {0}")]
    Stream(#[source] BackendError),
    #[error("failed to save reply: {0}")]
    PersistReply(#[source] BackendError),
    #[error("turn ended without a result")]
    Abandoned,
}

impl TurnError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Load(_) => ErrorKind::Load,
            Self::Send(_) => ErrorKind::Send,
            Self::Edit(_) => ErrorKind::Edit,
            Self::Journey(_) => ErrorKind::Journey,
            Self::Reply(_) => ErrorKind::Reply,
            Self::Stream(_) => ErrorKind::Stream,
            Self::PersistReply(_) => ErrorKind::PersistReply,
            Self::Abandoned => ErrorKind::Abandoned,
        }
    }

    #[must_use]
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            Self::Load(e)
            | Self::Send(e)
            | Self::Edit(e)
            | Self::Journey(e)
            | Self::Reply(e)
            | Self::Stream(e)
            | Self::PersistReply(e) => Some(e),
            Self::Abandoned => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Load,
    Send,
    Edit,
    Journey,
    Reply,
    Stream,
    PersistReply,
    Abandoned,
}

/// What the error slot holds: the failure's category and its rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TurnError> for ChatError {
    fn from(err: &TurnError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Holds the most recent failure. Cleared when the next operation actually starts.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    current: Option<ChatError>,
}

impl ErrorSlot {
    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn set(&mut self, err: &TurnError) {
        self.current = Some(ChatError::from(err));
    }

    #[must_use]
    pub fn current(&self) -> Option<&ChatError> {
        self.current.as_ref()
    }
}

/// An operation refused before doing anything. Nothing changed and nothing was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("another operation is in progress")]
    Busy,
    #[error("no thread is open")]
    NoThread,
    #[error("journey cannot be started in this thread")]
    JourneyUnavailable,
    #[error("only user messages can be edited")]
    NotEditable,
}
