//! Contract between the session manager and an online session backend.
//!
//! Every backend operation is asynchronous. The caller hands the backend a
//! [`CompletionTicket`]; if the backend accepts the request it completes the
//! ticket exactly once at some later point, which queues a [`Completion`] on the
//! caller's channel. A request rejected up front returns `Err` and the ticket is
//! dropped unused, so no completion ever follows.

pub mod loopback;

use strum::{Display, EnumIter};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::ids::{OperationId, SessionName, UniqueNetId};
use crate::search::{SessionSearch, SessionSearchResult};
use crate::settings::SessionSettings;

/// The seven asynchronous session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum OperationKind {
    #[strum(serialize = "Create session")]
    Create,
    #[strum(serialize = "Update session")]
    Update,
    #[strum(serialize = "Start session")]
    Start,
    #[strum(serialize = "End session")]
    End,
    #[strum(serialize = "Destroy session")]
    Destroy,
    #[strum(serialize = "Find sessions")]
    Find,
    #[strum(serialize = "Join session")]
    Join,
}

/// Result codes a backend reports for a join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum JoinSessionResult {
    Success,
    SessionIsFull,
    SessionDoesNotExist,
    CouldNotRetrieveAddress,
    AlreadyInSession,
    UnknownError,
}

impl JoinSessionResult {
    /// Human readable failure reason, `None` for [`JoinSessionResult::Success`].
    pub fn failure_reason(self) -> Option<&'static str> {
        match self {
            JoinSessionResult::Success => None,
            JoinSessionResult::SessionIsFull => Some("Session is full"),
            JoinSessionResult::UnknownError => Some("Unknown error when joining session"),
            JoinSessionResult::AlreadyInSession => Some("Already in session"),
            JoinSessionResult::CouldNotRetrieveAddress => Some("Couldn't retrieve address"),
            JoinSessionResult::SessionDoesNotExist => Some("Session doesn't exist"),
        }
    }
}

/// Payload a backend reports when an operation finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Session {
        session: SessionName,
        successful: bool,
    },
    FindSessions {
        successful: bool,
        results: Vec<SessionSearchResult>,
    },
    JoinSession {
        session: SessionName,
        result: JoinSessionResult,
    },
}

/// A finished operation as seen by the owner of the completion channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub operation: OperationId,
    pub kind: OperationKind,
    pub outcome: CompletionOutcome,
}

pub type CompletionSender = UnboundedSender<Completion>;
pub type CompletionReceiver = UnboundedReceiver<Completion>;

pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    unbounded_channel()
}

/// Single-use completion sink for one accepted backend call.
///
/// All completion methods consume the ticket, so one call completes at most once.
#[derive(Debug)]
pub struct CompletionTicket {
    operation: OperationId,
    kind: OperationKind,
    sender: CompletionSender,
}

impl CompletionTicket {
    pub fn new(operation: OperationId, kind: OperationKind, sender: CompletionSender) -> Self {
        Self {
            operation,
            kind,
            sender,
        }
    }

    pub fn operation(&self) -> OperationId {
        self.operation
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Completes a create/update/start/end/destroy call.
    pub fn complete(self, session: SessionName, successful: bool) {
        self.finish(CompletionOutcome::Session {
            session,
            successful,
        });
    }

    pub fn complete_search(self, successful: bool, results: Vec<SessionSearchResult>) {
        self.finish(CompletionOutcome::FindSessions {
            successful,
            results,
        });
    }

    pub fn complete_join(self, session: SessionName, result: JoinSessionResult) {
        self.finish(CompletionOutcome::JoinSession { session, result });
    }

    /// Completes the call with the outcome it would report on failure.
    pub fn fail(self, session: SessionName) {
        match self.kind {
            OperationKind::Find => self.complete_search(false, Vec::new()),
            OperationKind::Join => self.complete_join(session, JoinSessionResult::UnknownError),
            _ => self.complete(session, false),
        }
    }

    fn finish(self, outcome: CompletionOutcome) {
        let completion = Completion {
            operation: self.operation,
            kind: self.kind,
            outcome,
        };
        if self.sender.send(completion).is_err() {
            debug!(
                "completion for {} ({}) dropped: receiver gone",
                self.operation, self.kind
            );
        }
    }
}

/// Reasons a backend refuses to start an operation.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("session interface unavailable")]
    Unavailable,
    #[error("unknown local user {0}")]
    UnknownUser(UniqueNetId),
    #[error("operation rejected: {0}")]
    Rejected(String),
}

pub type ProviderResult<T = ()> = Result<T, ProviderError>;

/// An online backend offering session management.
///
/// `Ok(())` means the request was accepted and `ticket` will be completed later.
/// `Err` means the request never started and `ticket` is dropped.
pub trait SessionProvider: Send + Sync {
    fn create_session(
        &mut self,
        host: &UniqueNetId,
        session: &SessionName,
        settings: &SessionSettings,
        ticket: CompletionTicket,
    ) -> ProviderResult;

    fn update_session(
        &mut self,
        session: &SessionName,
        settings: &SessionSettings,
        ticket: CompletionTicket,
    ) -> ProviderResult;

    fn start_session(&mut self, session: &SessionName, ticket: CompletionTicket)
        -> ProviderResult;

    fn end_session(&mut self, session: &SessionName, ticket: CompletionTicket) -> ProviderResult;

    fn destroy_session(
        &mut self,
        session: &SessionName,
        ticket: CompletionTicket,
    ) -> ProviderResult;

    fn find_sessions(
        &mut self,
        searcher: &UniqueNetId,
        search: &SessionSearch,
        ticket: CompletionTicket,
    ) -> ProviderResult;

    fn join_session(
        &mut self,
        player: &UniqueNetId,
        session: &SessionName,
        target: &SessionSearchResult,
        ticket: CompletionTicket,
    ) -> ProviderResult;
}
