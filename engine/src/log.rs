//! Ordered message log for one thread.

use parley_types::{Message, MessageId};

/// The messages of the open thread, in append order.
///
/// Entries are only ever removed by [`MessageLog::replace_from`] truncation; history is a
/// single linear branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole log, as on thread activation.
    pub fn load(&mut self, initial: Vec<Message>) {
        self.entries = initial;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn append(&mut self, message: Message) {
        self.entries.push(message);
    }

    /// Drop every entry at `index` and beyond, then append `message` as the new tail.
    pub fn replace_from(&mut self, index: usize, message: Message) {
        debug_assert!(index <= self.entries.len(), "replace_from past the tail");
        self.entries.truncate(index);
        self.entries.push(message);
    }

    /// Fold streamed reply text into the tail.
    ///
    /// An assistant tail is overwritten in place (and takes `id`); any other tail gets a
    /// new assistant entry appended after it. Either way the reply ends up as the last entry,
    /// directly after the message that provoked it.
    pub fn update_trailing_assistant(&mut self, id: &MessageId, content: &str) {
        match self.entries.last_mut() {
            Some(tail) if tail.is_assistant() => {
                if tail.id() == id {
                    tail.set_content(content);
                } else {
                    // Takes the reply's id so the entry matches what gets persisted.
                    *tail = Message::assistant(id.clone(), content);
                }
            }
            _ => self.entries.push(Message::assistant(id.clone(), content)),
        }
    }

    /// Swap a provisional entry for the backend's stored form, keeping its position.
    pub fn confirm(&mut self, provisional: &MessageId, stored: Message) -> bool {
        match self.entry_mut(provisional) {
            Some(entry) => {
                *entry = stored;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries.iter().position(|m| m.id() == id)
    }

    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.entries.iter().find(|m| m.id() == id)
    }

    pub(crate) fn entry_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.entries.iter_mut().find(|m| m.id() == id)
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.entries
    }

    /// The rendered subsequence: visible entries in log order.
    ///
    /// Lazy and restartable; clone the iterator or call again to walk it twice.
    pub fn visible(&self) -> impl Iterator<Item = &Message> + Clone + '_ {
        self.entries.iter().filter(|m| m.is_visible())
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
