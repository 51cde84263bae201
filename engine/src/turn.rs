//! Network side of a turn.
//!
//! A turn runs in a spawned task that talks to the backend and reports progress over a
//! bounded channel. The task never touches the log; the owning [`crate::Session`] applies
//! each [`TurnEvent`] in order. Every await races the turn's cancellation token, so a
//! cancelled turn goes quiet at its next suspension point.

use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parley_backend::{ReplyStream, ThreadBackend};
use parley_types::{Message, MessageDraft, MessageId, NewMessage, OrphanPolicy, ThreadId};

use crate::errors::TurnError;
use crate::streaming::CompletedReply;

#[derive(Debug)]
pub(crate) enum TurnEvent {
    /// The user message was stored; carries its canonical form.
    UserStored(Message),
    EditStored,
    SeedRevealed,
    /// The chat endpoint accepted the request; chunks follow.
    ReplyOpened,
    Chunk(Vec<u8>),
    /// The reply body ended cleanly.
    ReplyClosed,
    ReplyStored,
    Failed(TurnError),
}

/// The persistence step that opens a turn.
#[derive(Debug)]
pub(crate) enum Commit {
    Send {
        draft: MessageDraft,
    },
    Edit {
        message: MessageId,
        draft: MessageDraft,
        orphans: OrphanPolicy,
    },
    Reveal {
        seed: MessageId,
    },
}

#[derive(Debug)]
pub(crate) struct TurnRequest {
    pub(crate) thread: ThreadId,
    pub(crate) commit: Commit,
    /// Messages sent to the chat endpoint. For a send, the stored user message is
    /// appended once the commit succeeds.
    pub(crate) context: Vec<Message>,
}

/// Commit, request a reply and forward its chunks.
pub(crate) fn spawn_turn<B: ThreadBackend>(
    backend: Arc<B>,
    request: TurnRequest,
    tx: mpsc::Sender<TurnEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        run_turn(backend.as_ref(), request, &tx, &cancel).await;
    });
}

/// Save a finished reply under its client-assigned id.
pub(crate) fn spawn_persist<B: ThreadBackend>(
    backend: Arc<B>,
    thread: ThreadId,
    reply: CompletedReply,
    tx: mpsc::Sender<TurnEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let message = NewMessage::assistant_reply(reply.id, reply.content);
        let Some(result) = cancellable(&cancel, backend.create_message(&thread, message)).await
        else {
            tracing::debug!("Reply persistence cancelled");
            return;
        };
        let event = match result {
            Ok(_) => TurnEvent::ReplyStored,
            Err(e) => TurnEvent::Failed(TurnError::PersistReply(e)),
        };
        let _ = tx.send(event).await;
    });
}

async fn run_turn<B: ThreadBackend>(
    backend: &B,
    request: TurnRequest,
    tx: &mpsc::Sender<TurnEvent>,
    cancel: &CancellationToken,
) {
    let TurnRequest {
        thread,
        commit,
        mut context,
    } = request;

    let Some(committed) = cancellable(cancel, commit_step(backend, &thread, commit)).await else {
        tracing::debug!("Turn cancelled during commit");
        return;
    };
    match committed {
        Ok(event) => {
            if let TurnEvent::UserStored(stored) = &event {
                context.push(stored.clone());
            }
            if !emit(tx, event).await {
                return;
            }
        }
        Err(e) => {
            emit(tx, TurnEvent::Failed(e)).await;
            return;
        }
    }

    let Some(opened) = cancellable(cancel, backend.request_reply(context)).await else {
        tracing::debug!("Turn cancelled before reply opened");
        return;
    };
    let reply = match opened {
        Ok(reply) => reply,
        Err(e) => {
            emit(tx, TurnEvent::Failed(TurnError::Reply(e))).await;
            return;
        }
    };
    if !emit(tx, TurnEvent::ReplyOpened).await {
        return;
    }

    forward_chunks(reply, tx, cancel).await;
}

async fn commit_step<B: ThreadBackend>(
    backend: &B,
    thread: &ThreadId,
    commit: Commit,
) -> Result<TurnEvent, TurnError> {
    match commit {
        Commit::Send { draft } => backend
            .create_message(thread, NewMessage::user(draft))
            .await
            .map(TurnEvent::UserStored)
            .map_err(TurnError::Send),
        Commit::Edit {
            message,
            draft,
            orphans,
        } => backend
            .update_message(thread, &message, draft, orphans)
            .await
            .map(|()| TurnEvent::EditStored)
            .map_err(TurnError::Edit),
        Commit::Reveal { seed } => backend
            .reveal_message(thread, &seed)
            .await
            .map(|()| TurnEvent::SeedRevealed)
            .map_err(TurnError::Journey),
    }
}

async fn forward_chunks(
    mut reply: ReplyStream,
    tx: &mpsc::Sender<TurnEvent>,
    cancel: &CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Reply stream cancelled");
                return;
            }
            next = reply.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                if !emit(tx, TurnEvent::Chunk(chunk)).await {
                    return;
                }
            }
            Some(Err(e)) => {
                emit(tx, TurnEvent::Failed(TurnError::Stream(e))).await;
                return;
            }
            None => {
                emit(tx, TurnEvent::ReplyClosed).await;
                return;
            }
        }
    }
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// False once the owner has dropped the receiver.
async fn emit(tx: &mpsc::Sender<TurnEvent>, event: TurnEvent) -> bool {
    tx.send(event).await.is_ok()
}
