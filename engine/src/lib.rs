//! Session engine for Parley - the client side of a conversation thread.
//!
//! This crate owns the message log and drives turns against a [`ThreadBackend`]; it has
//! no terminal or rendering dependencies.
//!
//! # Turns
//!
//! A turn is one round trip: commit something (a new user message, an edit, or a
//! journey's seed reveal), ask the chat endpoint for a reply, fold the streamed bytes into
//! a trailing assistant message, and save that message. At most one turn runs at a time;
//! [`Session`] rejects anything else with [`Rejected::Busy`] until it ends.
//!
//! The network half of a turn runs in a spawned task. The log is only touched by the
//! owner, when it calls [`Session::process_turn_events`] or [`Session::settle`].

mod config;
mod errors;
mod ids;
pub mod journey;
mod log;
mod session;
mod state;
mod streaming;
mod turn;
mod utf8;

pub use config::{ConfigError, ParleyConfig, config_path, expand_env_vars};
pub use errors::{ChatError, ErrorKind, ErrorSlot, Rejected, TurnError};
pub use ids::{IdGenerator, SequentialIds, UuidIds};
pub use log::MessageLog;
pub use session::{Dispatch, Session, SessionSettings, TURN_EVENT_CHANNEL_CAPACITY};
pub use state::{SessionState, TurnKind, TurnPhase};
pub use streaming::{CompletedReply, StreamMerger};
pub use utf8::Utf8Decoder;

pub use parley_backend::{
    self, BackendConfig, BackendError, DEFAULT_BASE_URL, HttpBackend, ReplyStream,
    ThreadBackend,
};
pub use parley_types::{
    Attachment, Journey, JourneyId, MediaFile, Message, MessageDraft, MessageId, NewMessage,
    OrphanPolicy, Role, Thread, ThreadId, ThreadSnapshot,
};
