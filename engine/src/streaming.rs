//! Folding a streamed reply into the message log.

use parley_types::MessageId;

use crate::log::MessageLog;
use crate::utf8::Utf8Decoder;

/// Accumulates one assistant reply and mirrors it into the log's trailing entry.
///
/// The reply id is fixed at construction, so every intermediate update and the final
/// persisted message share it.
#[derive(Debug)]
pub struct StreamMerger {
    reply_id: MessageId,
    decoder: Utf8Decoder,
    response: String,
    chunks: usize,
    bytes: usize,
}

/// A reply whose stream has ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedReply {
    pub id: MessageId,
    pub content: String,
}

impl StreamMerger {
    #[must_use]
    pub fn new(reply_id: MessageId) -> Self {
        Self {
            reply_id,
            decoder: Utf8Decoder::new(),
            response: String::new(),
            chunks: 0,
            bytes: 0,
        }
    }

    #[must_use]
    pub fn reply_id(&self) -> &MessageId {
        &self.reply_id
    }

    /// Text decoded so far.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.response
    }

    /// Decode one chunk and write the accumulated text to the trailing assistant entry.
    pub fn merge_chunk(&mut self, chunk: &[u8], log: &mut MessageLog) {
        self.chunks += 1;
        self.bytes += chunk.len();

        let before = self.response.len();
        self.decoder.decode(chunk, &mut self.response);
        if self.response.len() != before {
            log.update_trailing_assistant(&self.reply_id, &self.response);
        }
    }

    /// Flush the decoder and leave the final text in the log.
    ///
    /// An empty reply still produces one (empty) trailing assistant entry.
    pub fn finish(mut self, log: &mut MessageLog) -> CompletedReply {
        self.decoder.finish(&mut self.response);
        log.update_trailing_assistant(&self.reply_id, &self.response);
        tracing::debug!(
            reply = %self.reply_id,
            chunks = self.chunks,
            bytes = self.bytes,
            chars = self.response.chars().count(),
            "Reply stream finished"
        );
        CompletedReply {
            id: self.reply_id,
            content: self.response,
        }
    }
}
