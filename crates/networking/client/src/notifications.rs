//! Complete/failure notifications raised for every session operation.

use shared::{OperationKind, SessionDescriptor, SessionName};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::delegate::MulticastDelegate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotification {
    CreateSessionComplete(SessionName),
    CreateSessionFailure(String),
    UpdateSessionComplete(SessionName),
    UpdateSessionFailure(String),
    StartSessionComplete(SessionName),
    StartSessionFailure(String),
    EndSessionComplete(SessionName),
    EndSessionFailure(String),
    DestroySessionComplete(SessionName),
    DestroySessionFailure(String),
    FindSessionsComplete(Vec<SessionDescriptor>),
    FindSessionsFailure(String),
    JoinSessionComplete(SessionName),
    JoinSessionFailure(String),
}

impl SessionNotification {
    pub fn failure(kind: OperationKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match kind {
            OperationKind::Create => Self::CreateSessionFailure(reason),
            OperationKind::Update => Self::UpdateSessionFailure(reason),
            OperationKind::Start => Self::StartSessionFailure(reason),
            OperationKind::End => Self::EndSessionFailure(reason),
            OperationKind::Destroy => Self::DestroySessionFailure(reason),
            OperationKind::Find => Self::FindSessionsFailure(reason),
            OperationKind::Join => Self::JoinSessionFailure(reason),
        }
    }

    /// Success notification carrying a session name. `None` for searches.
    pub fn completed(kind: OperationKind, session: SessionName) -> Option<Self> {
        Some(match kind {
            OperationKind::Create => Self::CreateSessionComplete(session),
            OperationKind::Update => Self::UpdateSessionComplete(session),
            OperationKind::Start => Self::StartSessionComplete(session),
            OperationKind::End => Self::EndSessionComplete(session),
            OperationKind::Destroy => Self::DestroySessionComplete(session),
            OperationKind::Join => Self::JoinSessionComplete(session),
            OperationKind::Find => return None,
        })
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreateSessionComplete(_) | Self::CreateSessionFailure(_) => OperationKind::Create,
            Self::UpdateSessionComplete(_) | Self::UpdateSessionFailure(_) => OperationKind::Update,
            Self::StartSessionComplete(_) | Self::StartSessionFailure(_) => OperationKind::Start,
            Self::EndSessionComplete(_) | Self::EndSessionFailure(_) => OperationKind::End,
            Self::DestroySessionComplete(_) | Self::DestroySessionFailure(_) => {
                OperationKind::Destroy
            }
            Self::FindSessionsComplete(_) | Self::FindSessionsFailure(_) => OperationKind::Find,
            Self::JoinSessionComplete(_) | Self::JoinSessionFailure(_) => OperationKind::Join,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::CreateSessionFailure(reason)
            | Self::UpdateSessionFailure(reason)
            | Self::StartSessionFailure(reason)
            | Self::EndSessionFailure(reason)
            | Self::DestroySessionFailure(reason)
            | Self::FindSessionsFailure(reason)
            | Self::JoinSessionFailure(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure_reason().is_some()
    }
}

/// Listener registries for every notification the session manager raises.
///
/// Each operation has a complete and a failure delegate. `on_notification`
/// and the channels handed out by [`SessionDelegates::subscribe`] see every
/// notification regardless of kind.
#[derive(Debug)]
pub struct SessionDelegates {
    pub on_create_session_complete: MulticastDelegate<SessionName>,
    pub on_create_session_failure: MulticastDelegate<String>,
    pub on_update_session_complete: MulticastDelegate<SessionName>,
    pub on_update_session_failure: MulticastDelegate<String>,
    pub on_start_session_complete: MulticastDelegate<SessionName>,
    pub on_start_session_failure: MulticastDelegate<String>,
    pub on_end_session_complete: MulticastDelegate<SessionName>,
    pub on_end_session_failure: MulticastDelegate<String>,
    pub on_destroy_session_complete: MulticastDelegate<SessionName>,
    pub on_destroy_session_failure: MulticastDelegate<String>,
    pub on_find_sessions_complete: MulticastDelegate<Vec<SessionDescriptor>>,
    pub on_find_sessions_failure: MulticastDelegate<String>,
    pub on_join_session_complete: MulticastDelegate<SessionName>,
    pub on_join_session_failure: MulticastDelegate<String>,
    pub on_notification: MulticastDelegate<SessionNotification>,
    streams: Vec<UnboundedSender<SessionNotification>>,
}

impl Default for SessionDelegates {
    fn default() -> Self {
        Self {
            on_create_session_complete: MulticastDelegate::new("OnCreateSessionComplete"),
            on_create_session_failure: MulticastDelegate::new("OnCreateSessionFailure"),
            on_update_session_complete: MulticastDelegate::new("OnUpdateSessionComplete"),
            on_update_session_failure: MulticastDelegate::new("OnUpdateSessionFailure"),
            on_start_session_complete: MulticastDelegate::new("OnStartSessionComplete"),
            on_start_session_failure: MulticastDelegate::new("OnStartSessionFailure"),
            on_end_session_complete: MulticastDelegate::new("OnEndSessionComplete"),
            on_end_session_failure: MulticastDelegate::new("OnEndSessionFailure"),
            on_destroy_session_complete: MulticastDelegate::new("OnDestroySessionComplete"),
            on_destroy_session_failure: MulticastDelegate::new("OnDestroySessionFailure"),
            on_find_sessions_complete: MulticastDelegate::new("OnFindSessionsComplete"),
            on_find_sessions_failure: MulticastDelegate::new("OnFindSessionsFailure"),
            on_join_session_complete: MulticastDelegate::new("OnJoinSessionComplete"),
            on_join_session_failure: MulticastDelegate::new("OnJoinSessionFailure"),
            on_notification: MulticastDelegate::silent("OnNotification"),
            streams: Vec::new(),
        }
    }
}

impl SessionDelegates {
    /// Channel receiving a copy of every notification raised from now on.
    pub fn subscribe(&mut self) -> UnboundedReceiver<SessionNotification> {
        let (tx, rx) = unbounded_channel();
        self.streams.push(tx);
        rx
    }

    /// Closes every channel handed out by [`SessionDelegates::subscribe`].
    pub fn drop_subscriptions(&mut self) {
        self.streams.clear();
    }

    /// Removes every listener. Subscriptions stay open.
    pub fn clear(&mut self) {
        let streams = std::mem::take(&mut self.streams);
        *self = Self {
            streams,
            ..Self::default()
        };
    }

    pub fn dispatch(&mut self, notification: SessionNotification) {
        self.streams
            .retain(|stream| stream.send(notification.clone()).is_ok());
        self.on_notification.broadcast(&notification);

        match &notification {
            SessionNotification::CreateSessionComplete(name) => {
                self.on_create_session_complete.broadcast(name)
            }
            SessionNotification::CreateSessionFailure(reason) => {
                self.on_create_session_failure.broadcast(reason)
            }
            SessionNotification::UpdateSessionComplete(name) => {
                self.on_update_session_complete.broadcast(name)
            }
            SessionNotification::UpdateSessionFailure(reason) => {
                self.on_update_session_failure.broadcast(reason)
            }
            SessionNotification::StartSessionComplete(name) => {
                self.on_start_session_complete.broadcast(name)
            }
            SessionNotification::StartSessionFailure(reason) => {
                self.on_start_session_failure.broadcast(reason)
            }
            SessionNotification::EndSessionComplete(name) => {
                self.on_end_session_complete.broadcast(name)
            }
            SessionNotification::EndSessionFailure(reason) => {
                self.on_end_session_failure.broadcast(reason)
            }
            SessionNotification::DestroySessionComplete(name) => {
                self.on_destroy_session_complete.broadcast(name)
            }
            SessionNotification::DestroySessionFailure(reason) => {
                self.on_destroy_session_failure.broadcast(reason)
            }
            SessionNotification::FindSessionsComplete(sessions) => {
                self.on_find_sessions_complete.broadcast(sessions)
            }
            SessionNotification::FindSessionsFailure(reason) => {
                self.on_find_sessions_failure.broadcast(reason)
            }
            SessionNotification::JoinSessionComplete(name) => {
                self.on_join_session_complete.broadcast(name)
            }
            SessionNotification::JoinSessionFailure(reason) => {
                self.on_join_session_failure.broadcast(reason)
            }
        };
    }
}
