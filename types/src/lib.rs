//! Core domain types for Parley.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Both the backend client and the session engine build on it.

mod ids;
mod message;
mod thread;

pub use ids::{JourneyId, MessageId, ThreadId};
pub use message::{Attachment, MediaFile, Message, MessageDraft, NewMessage, OrphanPolicy, Role};
pub use thread::{Journey, Thread, ThreadSnapshot};
