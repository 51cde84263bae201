//! Client-side message id allocation.

use std::sync::atomic::{AtomicU64, Ordering};

use parley_types::MessageId;

/// Source of ids for provisional user entries and assistant replies.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> MessageId;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> MessageId {
        MessageId::new(uuid::Uuid::new_v4().to_string())
    }
}

/// `{prefix}-1`, `{prefix}-2`, ... Deterministic, for tests and replays.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> MessageId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        MessageId::new(format!("{}-{n}", self.prefix))
    }
}
