//! Journey gating: a thread that starts with one hidden seed message.
//!
//! A journey thread is created with exactly one invisible message, so nothing is shown
//! until the user starts it. Starting reveals the seed and asks for the first reply.
//! Sending is not gated here; the gate only decides whether a start is allowed.

use parley_types::MessageId;

use crate::log::MessageLog;

/// Exactly one entry in the log is hidden.
#[must_use]
pub fn has_hidden_seed(log: &MessageLog) -> bool {
    log.messages().iter().filter(|m| !m.is_visible()).count() == 1
}

#[must_use]
pub fn has_visible_messages(log: &MessageLog) -> bool {
    log.visible().next().is_some()
}

/// The seed to reveal, if the journey may start now.
#[must_use]
pub fn startable_seed(log: &MessageLog) -> Option<&MessageId> {
    if !has_hidden_seed(log) || has_visible_messages(log) {
        return None;
    }
    log.messages()
        .iter()
        .find(|m| !m.is_visible())
        .map(parley_types::Message::id)
}

/// Flip the seed to visible. Returns false when `seed` is not in the log.
pub fn reveal(log: &mut MessageLog, seed: &MessageId) -> bool {
    match log.entry_mut(seed) {
        Some(message) => {
            message.reveal();
            true
        }
        None => false,
    }
}
