//! The turn controller: one open thread, at most one operation in flight.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parley_backend::ThreadBackend;
use parley_types::{Message, MessageDraft, MessageId, OrphanPolicy, Role, ThreadId};

use crate::errors::{ChatError, ErrorSlot, Rejected, TurnError};
use crate::ids::{IdGenerator, UuidIds};
use crate::journey;
use crate::log::MessageLog;
use crate::state::{
    ActiveTurn, OperationState, PendingCommit, SessionState, TurnKind, TurnStage,
};
use crate::streaming::StreamMerger;
use crate::turn::{Commit, TurnEvent, TurnRequest, spawn_persist, spawn_turn};

/// Bounded so a stalled consumer applies backpressure to the reply stream.
pub const TURN_EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// What the backend does with messages after an edited one.
    pub orphans: OrphanPolicy,
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            orphans: OrphanPolicy::default(),
            event_capacity: TURN_EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Outcome of an accepted operation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A turn is now in flight.
    Started,
    /// Nothing to do (e.g. editing an id that is not in the log).
    Ignored,
}

/// Conversational session over one thread.
///
/// All log mutation happens on the owner's side: operations spawn a task and return
/// immediately, and the task's progress is applied by [`Session::process_turn_events`]
/// (non-blocking, for a render loop) or [`Session::settle`] (waits for the turn to end).
/// Operations that spawn must be called from within a Tokio runtime.
pub struct Session<B: ThreadBackend> {
    backend: Arc<B>,
    ids: Arc<dyn IdGenerator>,
    settings: SessionSettings,
    thread: Option<ThreadId>,
    log: MessageLog,
    errors: ErrorSlot,
    state: OperationState,
}

impl<B: ThreadBackend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self::with_parts(
            Arc::new(backend),
            Arc::new(UuidIds),
            SessionSettings::default(),
        )
    }

    pub fn with_parts(
        backend: Arc<B>,
        ids: Arc<dyn IdGenerator>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            backend,
            ids,
            settings,
            thread: None,
            log: MessageLog::new(),
            errors: ErrorSlot::default(),
            state: OperationState::Idle,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub fn thread(&self) -> Option<&ThreadId> {
        self.thread.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state.public()
    }

    /// True while loading a thread or while a turn is in flight.
    pub fn is_loading(&self) -> bool {
        self.state().is_busy()
    }

    /// The visible messages, in order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> + Clone + '_ {
        self.log.visible()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn error(&self) -> Option<&ChatError> {
        self.errors.current()
    }

    pub fn can_start_journey(&self) -> bool {
        matches!(self.state, OperationState::Ready) && journey::startable_seed(&self.log).is_some()
    }

    /// Load `thread` and make it the active one.
    ///
    /// Allowed from any state; an in-flight turn is cancelled first and none of its
    /// remaining effects reach the new log. On failure the session is left idle with an
    /// empty log and the error recorded. Dropping the returned future before it resolves
    /// also leaves the session idle.
    pub async fn open(&mut self, thread: ThreadId) -> Result<(), TurnError> {
        self.abandon_turn();
        self.errors.clear();
        self.log.clear();
        self.thread = None;

        tracing::info!(%thread, "Opening thread");
        let loading = LoadGuard::begin(&mut self.state);
        match self.backend.fetch_thread(&thread).await {
            Ok(snapshot) => {
                tracing::debug!(%thread, messages = snapshot.messages.len(), "Thread loaded");
                self.log.load(snapshot.messages);
                self.thread = Some(thread);
                loading.finish(OperationState::Ready);
                Ok(())
            }
            Err(e) => {
                let err = TurnError::Load(e);
                tracing::warn!(%thread, error = %err, "Thread load failed");
                self.errors.set(&err);
                loading.finish(OperationState::Idle);
                Err(err)
            }
        }
    }

    /// Drop the active thread, cancelling any turn in flight.
    pub fn close(&mut self) {
        self.abandon_turn();
        self.log.clear();
        self.errors.clear();
        self.thread = None;
        self.state = OperationState::Idle;
    }

    /// Append the draft optimistically and start a turn that stores it and asks for a
    /// reply.
    ///
    /// The optimistic entry carries a provisional id until the backend returns the stored
    /// message. If storing fails the entry stays in the log and the error is recorded.
    pub fn send_message(&mut self, draft: MessageDraft) -> Result<Dispatch, Rejected> {
        let thread = self.ready_thread()?;
        self.errors.clear();

        let provisional = Message::user(self.ids.next_id(), draft.content.clone(), draft.media_files());
        let provisional_id = provisional.id().clone();
        let context = self.log.messages().to_vec();
        self.log.append(provisional);

        tracing::info!(%thread, provisional = %provisional_id, "Sending message");
        self.begin_turn(
            TurnKind::Send,
            PendingCommit::Send {
                provisional: provisional_id,
            },
            TurnRequest {
                thread,
                commit: Commit::Send { draft },
                context,
            },
        );
        Ok(Dispatch::Started)
    }

    /// Replace the body of message `id` and regenerate everything after it.
    ///
    /// Nothing changes locally until the backend stores the edit; then the log is
    /// truncated to end at the edited message and a new reply streams in. Unknown ids are
    /// ignored; assistant messages are rejected as [`Rejected::NotEditable`].
    pub fn edit_message(
        &mut self,
        id: &MessageId,
        draft: MessageDraft,
    ) -> Result<Dispatch, Rejected> {
        let thread = self.ready_thread()?;
        let Some(index) = self.log.position(id) else {
            tracing::debug!(message = %id, "Edit target not in log");
            return Ok(Dispatch::Ignored);
        };
        if self.log.messages()[index].role() != Role::User {
            return Err(Rejected::NotEditable);
        }
        self.errors.clear();

        let edited = self.log.messages()[index].edited(draft.content.clone(), draft.media_files());
        let mut context = self.log.messages()[..index].to_vec();
        context.push(edited.clone());

        tracing::info!(%thread, message = %id, index, "Editing message");
        self.begin_turn(
            TurnKind::Edit,
            PendingCommit::Edit { edited },
            TurnRequest {
                thread,
                commit: Commit::Edit {
                    message: id.clone(),
                    draft,
                    orphans: self.settings.orphans,
                },
                context,
            },
        );
        Ok(Dispatch::Started)
    }

    /// Reveal the thread's hidden seed and ask for the opening reply.
    pub fn start_journey(&mut self) -> Result<Dispatch, Rejected> {
        let thread = self.ready_thread()?;
        let Some(seed) = journey::startable_seed(&self.log).cloned() else {
            return Err(Rejected::JourneyUnavailable);
        };
        self.errors.clear();

        let context = self
            .log
            .messages()
            .iter()
            .map(|m| {
                let mut m = m.clone();
                if m.id() == &seed {
                    m.reveal();
                }
                m
            })
            .collect();

        tracing::info!(%thread, seed = %seed, "Starting journey");
        self.begin_turn(
            TurnKind::JourneyStart,
            PendingCommit::Reveal { seed: seed.clone() },
            TurnRequest {
                thread,
                commit: Commit::Reveal { seed },
                context,
            },
        );
        Ok(Dispatch::Started)
    }

    /// Apply every turn event that is ready, without waiting. Returns how many were
    /// applied.
    pub fn process_turn_events(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let event = {
                let OperationState::Turn(turn) = &mut self.state else {
                    break;
                };
                match turn.events.try_recv() {
                    Ok(event) => event,
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        tracing::warn!("Turn channel disconnected");
                        TurnEvent::Failed(TurnError::Abandoned)
                    }
                }
            };
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait until the in-flight turn (if any) finishes, applying its events.
    pub async fn settle(&mut self) {
        loop {
            let event = {
                let OperationState::Turn(turn) = &mut self.state else {
                    return;
                };
                match turn.events.recv().await {
                    Some(event) => event,
                    None => {
                        tracing::warn!("Turn channel disconnected");
                        TurnEvent::Failed(TurnError::Abandoned)
                    }
                }
            };
            self.apply(event);
        }
    }

    fn ready_thread(&self) -> Result<ThreadId, Rejected> {
        match (&self.state, &self.thread) {
            (OperationState::Loading | OperationState::Turn(_), _) => Err(Rejected::Busy),
            (OperationState::Ready, Some(thread)) => Ok(thread.clone()),
            (OperationState::Idle | OperationState::Ready, _) => Err(Rejected::NoThread),
        }
    }

    fn begin_turn(&mut self, kind: TurnKind, pending: PendingCommit, request: TurnRequest) {
        let (tx, rx) = mpsc::channel(self.settings.event_capacity);
        let cancel = CancellationToken::new();
        spawn_turn(Arc::clone(&self.backend), request, tx, cancel.clone());
        self.state = OperationState::Turn(ActiveTurn {
            kind,
            stage: TurnStage::Committing(pending),
            cancel,
            events: rx,
        });
    }

    fn apply(&mut self, event: TurnEvent) {
        let outcome = {
            let OperationState::Turn(turn) = &mut self.state else {
                return;
            };

            match event {
                TurnEvent::UserStored(stored) => {
                    let stage = std::mem::replace(&mut turn.stage, TurnStage::AwaitingReply);
                    if let TurnStage::Committing(PendingCommit::Send { provisional }) = stage
                        && !self.log.confirm(&provisional, stored)
                    {
                        tracing::warn!(%provisional, "Provisional message vanished before confirm");
                    }
                    None
                }
                TurnEvent::EditStored => {
                    let stage = std::mem::replace(&mut turn.stage, TurnStage::AwaitingReply);
                    if let TurnStage::Committing(PendingCommit::Edit { edited }) = stage {
                        match self.log.position(edited.id()) {
                            Some(index) => self.log.replace_from(index, edited),
                            None => self.log.append(edited),
                        }
                    }
                    None
                }
                TurnEvent::SeedRevealed => {
                    let stage = std::mem::replace(&mut turn.stage, TurnStage::AwaitingReply);
                    if let TurnStage::Committing(PendingCommit::Reveal { seed }) = stage {
                        journey::reveal(&mut self.log, &seed);
                    }
                    None
                }
                TurnEvent::ReplyOpened => {
                    turn.stage = TurnStage::Streaming(StreamMerger::new(self.ids.next_id()));
                    None
                }
                TurnEvent::Chunk(chunk) => {
                    if let TurnStage::Streaming(merger) = &mut turn.stage {
                        merger.merge_chunk(&chunk, &mut self.log);
                    }
                    None
                }
                TurnEvent::ReplyClosed => {
                    let stage = std::mem::replace(&mut turn.stage, TurnStage::AwaitingReply);
                    match (stage, &self.thread) {
                        (TurnStage::Streaming(merger), Some(thread)) => {
                            let reply = merger.finish(&mut self.log);
                            turn.stage = TurnStage::Persisting {
                                reply: reply.id.clone(),
                            };
                            let (tx, rx) = mpsc::channel(self.settings.event_capacity);
                            turn.events = rx;
                            spawn_persist(
                                Arc::clone(&self.backend),
                                thread.clone(),
                                reply,
                                tx,
                                turn.cancel.clone(),
                            );
                            None
                        }
                        _ => Some(Err(TurnError::Abandoned)),
                    }
                }
                TurnEvent::ReplyStored => {
                    if let TurnStage::Persisting { reply } = &turn.stage {
                        tracing::info!(%reply, kind = ?turn.kind, "Turn complete");
                    }
                    Some(Ok(()))
                }
                TurnEvent::Failed(err) => Some(Err(err)),
            }
        };

        match outcome {
            None => {}
            Some(Ok(())) => self.state = OperationState::Ready,
            Some(Err(err)) => self.fail(&err),
        }
    }

    fn fail(&mut self, err: &TurnError) {
        tracing::warn!(error = %err, "Turn failed");
        self.errors.set(err);
        self.state = OperationState::Ready;
    }

    fn abandon_turn(&mut self) {
        if let OperationState::Turn(turn) =
            std::mem::replace(&mut self.state, OperationState::Ready)
        {
            tracing::debug!(kind = ?turn.kind, phase = ?turn.phase(), "Cancelling turn");
            turn.cancel.cancel();
        }
    }
}

/// Holds the session in `Loading` for the duration of a fetch. Falls back to `Idle` if
/// dropped before [`LoadGuard::finish`].
struct LoadGuard<'a> {
    state: &'a mut OperationState,
}

impl<'a> LoadGuard<'a> {
    fn begin(state: &'a mut OperationState) -> Self {
        *state = OperationState::Loading;
        Self { state }
    }

    fn finish(self, next: OperationState) {
        *self.state = next;
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if matches!(self.state, OperationState::Loading) {
            *self.state = OperationState::Idle;
        }
    }
}

impl<B: ThreadBackend> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("thread", &self.thread)
            .field("state", &self.state())
            .field("messages", &self.log.len())
            .field("error", &self.errors.current())
            .finish_non_exhaustive()
    }
}
