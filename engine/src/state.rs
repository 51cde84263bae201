//! Session state machine types.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parley_types::{Message, MessageId};

use crate::streaming::StreamMerger;
use crate::turn::TurnEvent;

/// What the session is doing, as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No thread is open.
    Idle,
    /// A thread is being fetched.
    Loading,
    /// A thread is open. `Some` while a turn is in flight.
    Ready(Option<TurnPhase>),
}

impl SessionState {
    /// True whenever a new operation would be rejected as busy.
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Loading | Self::Ready(Some(_)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Send,
    Edit,
    JourneyStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Persisting a new user message.
    Sending,
    /// Persisting an edit.
    Editing,
    /// Revealing a journey seed.
    Ingesting,
    /// Waiting for the chat endpoint to accept the request.
    AwaitingReply,
    /// Reply bytes are arriving.
    Streaming,
    /// Saving the finished reply.
    Persisting,
}

impl TurnKind {
    pub(crate) fn commit_phase(self) -> TurnPhase {
        match self {
            Self::Send => TurnPhase::Sending,
            Self::Edit => TurnPhase::Editing,
            Self::JourneyStart => TurnPhase::Ingesting,
        }
    }
}

/// Local change waiting for the backend to acknowledge the commit.
#[derive(Debug)]
pub(crate) enum PendingCommit {
    /// The optimistic user entry is already in the log under this id.
    Send { provisional: MessageId },
    /// Applied to the log only once stored.
    Edit { edited: Message },
    Reveal { seed: MessageId },
}

#[derive(Debug)]
pub(crate) enum TurnStage {
    Committing(PendingCommit),
    AwaitingReply,
    Streaming(StreamMerger),
    Persisting { reply: MessageId },
}

/// The in-flight turn. Dropping it cancels every task working for it.
#[derive(Debug)]
pub(crate) struct ActiveTurn {
    pub(crate) kind: TurnKind,
    pub(crate) stage: TurnStage,
    pub(crate) cancel: CancellationToken,
    pub(crate) events: mpsc::Receiver<TurnEvent>,
}

impl ActiveTurn {
    pub(crate) fn phase(&self) -> TurnPhase {
        match self.stage {
            TurnStage::Committing(_) => self.kind.commit_phase(),
            TurnStage::AwaitingReply => TurnPhase::AwaitingReply,
            TurnStage::Streaming(_) => TurnPhase::Streaming,
            TurnStage::Persisting { .. } => TurnPhase::Persisting,
        }
    }
}

impl Drop for ActiveTurn {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug)]
pub(crate) enum OperationState {
    Idle,
    Loading,
    Ready,
    Turn(ActiveTurn),
}

impl OperationState {
    pub(crate) fn public(&self) -> SessionState {
        match self {
            Self::Idle => SessionState::Idle,
            Self::Loading => SessionState::Loading,
            Self::Ready => SessionState::Ready(None),
            Self::Turn(turn) => SessionState::Ready(Some(turn.phase())),
        }
    }
}
