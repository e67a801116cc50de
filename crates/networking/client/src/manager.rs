//! Owner of the local player's session.
//!
//! The [`SessionManager`] forwards session operations to a [`SessionProvider`],
//! tracks which operations are in flight and turns every outcome into exactly
//! one complete or failure notification. Completions are queued by the provider
//! and only handled inside [`SessionManager::pump_events`], so all listeners run
//! on the thread that owns the manager.

use std::collections::HashMap;
use std::time::Instant;

use shared::{
    completion_channel,
    settings::{AdvertisementType, SETTING_MAPNAME},
    Completion, CompletionOutcome, CompletionReceiver, CompletionSender, CompletionTicket,
    IdGenerator, JoinSessionResult, OperationId, OperationKind, ProviderResult,
    SessionConfiguration, SessionDescriptor, SessionName, SessionPolicy, SessionProvider,
    SessionSearch, SessionSearchResult, SessionSettings, UniqueNetId,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::notifications::{SessionDelegates, SessionNotification};
use crate::travel::{travel_url, TravelRole, WorldTravel};

pub const SESSION_INTERFACE_INVALID: &str = "Session Interface is Invalid";
pub const NO_SESSIONS_FOUND: &str = "No Sessions Found";
pub const NO_ACTIVE_SESSION: &str = "No active session to update";

/// Reason raised when the provider refuses a call up front.
pub fn rejection_reason(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Create => "Failed to create Session",
        OperationKind::Update => "Failed to update session",
        OperationKind::Start => "Failed to start session",
        OperationKind::End => "Failed to end session",
        OperationKind::Destroy => "Failed to destroy session",
        OperationKind::Find => "Failed to find sessions",
        OperationKind::Join => "Error joining Session",
    }
}

/// Reason raised when an accepted call completes unsuccessfully.
pub fn completion_failure_reason(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Create => "Failed to create session",
        OperationKind::Update => "Failed to update session",
        OperationKind::Start => "Failed to start session",
        OperationKind::End => "Failed to end session",
        OperationKind::Destroy => "Failed to destroy session",
        OperationKind::Find => "Failed to Find Sessions",
        OperationKind::Join => "Unknown error when joining session",
    }
}

/// What the manager currently knows about its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Local name of the hosted or joined session.
    pub current_session: SessionName,
    /// Settings of the session this player hosts, once confirmed by the backend.
    pub settings: Option<SessionSettings>,
    pub search_results: Option<Vec<SessionDescriptor>>,
    pub joined: Option<SessionDescriptor>,
}

impl SessionState {
    fn new(placeholder: SessionName) -> Self {
        Self {
            current_session: placeholder,
            settings: None,
            search_results: None,
            joined: None,
        }
    }
}

/// Data held back until the backend confirms an operation.
#[derive(Debug)]
enum Staged {
    Settings(SessionSettings),
    Join(SessionDescriptor),
}

#[derive(Debug)]
struct PendingOperation {
    id: OperationId,
    deadline: Option<Instant>,
    staged: Option<Staged>,
}

#[cfg_attr(feature = "bevy", derive(bevy::prelude::Resource))]
pub struct SessionManager {
    policy: SessionPolicy,
    local_user: UniqueNetId,
    provider: Option<Box<dyn SessionProvider>>,
    travel: Box<dyn WorldTravel>,
    completions_tx: CompletionSender,
    completions_rx: CompletionReceiver,
    operation_ids: IdGenerator,
    pending: HashMap<OperationKind, PendingOperation>,
    state: SessionState,
    delegates: SessionDelegates,
}

impl SessionManager {
    /// Creates a manager without a backend. Every operation fails until
    /// [`SessionManager::attach_provider`] is called.
    pub fn new(
        policy: SessionPolicy,
        local_user: UniqueNetId,
        travel: impl WorldTravel + 'static,
    ) -> Self {
        let (completions_tx, completions_rx) = completion_channel();
        let state = SessionState::new(policy.session_name());
        Self {
            policy,
            local_user,
            provider: None,
            travel: Box::new(travel),
            completions_tx,
            completions_rx,
            operation_ids: IdGenerator::default(),
            pending: HashMap::new(),
            state,
            delegates: SessionDelegates::default(),
        }
    }

    pub fn with_provider(mut self, provider: impl SessionProvider + 'static) -> Self {
        self.attach_provider(provider);
        self
    }

    pub fn attach_provider(&mut self, provider: impl SessionProvider + 'static) {
        info!("session provider attached for {}", self.local_user);
        self.provider = Some(Box::new(provider));
    }

    /// Operations still in flight keep waiting for their completion or deadline.
    pub fn detach_provider(&mut self) -> Option<Box<dyn SessionProvider>> {
        let provider = self.provider.take();
        if provider.is_some() {
            info!("session provider detached for {}", self.local_user);
        }
        provider
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn local_user(&self) -> UniqueNetId {
        self.local_user
    }

    pub fn session_state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_session_name(&self) -> &SessionName {
        &self.state.current_session
    }

    pub fn current_settings(&self) -> Option<&SessionSettings> {
        self.state.settings.as_ref()
    }

    pub fn last_search_results(&self) -> Option<&[SessionDescriptor]> {
        self.state.search_results.as_deref()
    }

    pub fn joined_session(&self) -> Option<&SessionDescriptor> {
        self.state.joined.as_ref()
    }

    pub fn is_pending(&self, kind: OperationKind) -> bool {
        self.pending.contains_key(&kind)
    }

    pub fn delegates(&self) -> &SessionDelegates {
        &self.delegates
    }

    pub fn delegates_mut(&mut self) -> &mut SessionDelegates {
        &mut self.delegates
    }

    /// Channel receiving every notification raised from now on.
    pub fn notification_stream(&mut self) -> UnboundedReceiver<SessionNotification> {
        self.delegates.subscribe()
    }

    /// Hosts a new session for up to `player_count` players.
    ///
    /// The count is clamped to `[1, max_players]` before it reaches the backend.
    pub fn create_session(&mut self, player_count: i32, is_private: bool) {
        let request = SessionConfiguration::new(player_count, is_private);
        let capacity = request.effective_player_count(self.policy.max_players);

        let mut settings = SessionSettings::hosted(capacity, request.is_private);
        settings.set(
            SETTING_MAPNAME,
            self.policy.main_menu_map.clone(),
            AdvertisementType::ViaOnlineService,
        );

        let host = self.local_user;
        let session = self.policy.session_name();
        let staged = settings.clone();
        self.submit(
            OperationKind::Create,
            Some(Staged::Settings(staged)),
            move |provider, ticket| provider.create_session(&host, &session, &settings, ticket),
        );
    }

    /// Advertises the game map on the hosted session.
    ///
    /// The new settings only replace the current ones once the backend confirms.
    pub fn update_session(&mut self) {
        if !self.has_provider() {
            self.unavailable(OperationKind::Update);
            return;
        }
        let Some(mut settings) = self.state.settings.clone() else {
            warn!("update requested without an active session");
            self.raise(SessionNotification::failure(
                OperationKind::Update,
                NO_ACTIVE_SESSION,
            ));
            return;
        };
        settings.set(
            SETTING_MAPNAME,
            self.policy.game_map.clone(),
            AdvertisementType::ViaOnlineService,
        );

        let session = self.policy.session_name();
        let staged = settings.clone();
        self.submit(
            OperationKind::Update,
            Some(Staged::Settings(staged)),
            move |provider, ticket| provider.update_session(&session, &settings, ticket),
        );
    }

    pub fn start_session(&mut self) {
        let session = self.policy.session_name();
        self.submit(OperationKind::Start, None, move |provider, ticket| {
            provider.start_session(&session, ticket)
        });
    }

    pub fn end_session(&mut self) {
        let session = self.policy.session_name();
        self.submit(OperationKind::End, None, move |provider, ticket| {
            provider.end_session(&session, ticket)
        });
    }

    pub fn destroy_session(&mut self) {
        let session = self.policy.session_name();
        self.submit(OperationKind::Destroy, None, move |provider, ticket| {
            provider.destroy_session(&session, ticket)
        });
    }

    /// Searches for joinable sessions. An empty result is reported as a failure.
    ///
    /// Results of the previous search are dropped as soon as a new one is requested.
    pub fn find_sessions(&mut self, max_results: u32) {
        self.state.search_results = None;
        let mut search = SessionSearch::online(max_results);
        if self.policy.search_presence_only {
            search = search.presence_only();
        }

        let searcher = self.local_user;
        self.submit(OperationKind::Find, None, move |provider, ticket| {
            provider.find_sessions(&searcher, &search, ticket)
        });
    }

    pub fn join_session(&mut self, descriptor: &SessionDescriptor) {
        let player = self.local_user;
        let session = self.policy.session_name();
        let target: SessionSearchResult = descriptor.search_result().clone();
        self.submit(
            OperationKind::Join,
            Some(Staged::Join(descriptor.clone())),
            move |provider, ticket| provider.join_session(&player, &session, &target, ticket),
        );
    }

    pub fn server_travel_as_host(&mut self) -> bool {
        self.server_travel(TravelRole::Host)
    }

    pub fn server_travel_as_client(&mut self) -> bool {
        self.server_travel(TravelRole::Client)
    }

    /// Forgets a pending operation without notifying anyone.
    ///
    /// A completion arriving later for it is ignored.
    pub fn cancel_pending(&mut self, kind: OperationKind) -> bool {
        let cancelled = self.pending.remove(&kind);
        if let Some(operation) = &cancelled {
            debug!("{} {} cancelled", kind, operation.id);
        }
        cancelled.is_some()
    }

    /// Handles queued completions, then fails overdue operations.
    ///
    /// Returns the number of notifications raised.
    pub fn pump_events(&mut self) -> usize {
        self.pump_events_at(Instant::now())
    }

    /// [`SessionManager::pump_events`] with an explicit clock reading.
    pub fn pump_events_at(&mut self, now: Instant) -> usize {
        let mut raised = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            if self.handle_completion(completion) {
                raised += 1;
            }
        }

        let mut overdue: Vec<OperationKind> = self
            .pending
            .iter()
            .filter(|(_, operation)| operation.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(kind, _)| *kind)
            .collect();
        overdue.sort();

        for kind in overdue {
            if let Some(operation) = self.pending.remove(&kind) {
                warn!("{} {} timed out", kind, operation.id);
                self.raise(SessionNotification::failure(kind, format!("{kind} timed out")));
                raised += 1;
            }
        }
        raised
    }

    fn server_travel(&mut self, role: TravelRole) -> bool {
        let url = travel_url(&self.policy.game_map, role);
        info!("{} travelling to {}", role, url);
        self.travel.server_travel(&url, false)
    }

    fn submit<F>(&mut self, kind: OperationKind, staged: Option<Staged>, call: F)
    where
        F: FnOnce(&mut dyn SessionProvider, CompletionTicket) -> ProviderResult,
    {
        if !self.has_provider() {
            self.unavailable(kind);
            return;
        }
        if let Some(operation) = self.pending.get(&kind) {
            warn!("{} rejected: {} still pending", kind, operation.id);
            self.raise(SessionNotification::failure(
                kind,
                format!("{kind} already in progress"),
            ));
            return;
        }

        let operation = OperationId::new(self.operation_ids.next());
        let ticket = CompletionTicket::new(operation, kind, self.completions_tx.clone());
        let result = match self.provider.as_deref_mut() {
            Some(provider) => call(provider, ticket),
            None => return,
        };

        match result {
            Ok(()) => {
                debug!("{} {} accepted", kind, operation);
                let deadline = self
                    .policy
                    .operation_timeout()
                    .map(|timeout| Instant::now() + timeout);
                self.pending.insert(
                    kind,
                    PendingOperation {
                        id: operation,
                        deadline,
                        staged,
                    },
                );
            }
            Err(err) => {
                warn!("{} rejected by provider: {}", kind, err);
                self.raise(SessionNotification::failure(kind, rejection_reason(kind)));
            }
        }
    }

    fn unavailable(&mut self, kind: OperationKind) {
        warn!("{} requested without a session provider", kind);
        self.raise(SessionNotification::failure(kind, SESSION_INTERFACE_INVALID));
    }

    fn handle_completion(&mut self, completion: Completion) -> bool {
        let Completion {
            operation,
            kind,
            outcome,
        } = completion;

        let expected = self
            .pending
            .get(&kind)
            .is_some_and(|pending| pending.id == operation);
        if !expected {
            warn!("ignoring completion for {} {}: not pending", kind, operation);
            return false;
        }
        let staged = self.pending.remove(&kind).and_then(|pending| pending.staged);

        let notification = match (kind, outcome) {
            (OperationKind::Find, CompletionOutcome::FindSessions { successful, results }) => {
                self.finish_search(successful, results)
            }
            (OperationKind::Join, CompletionOutcome::JoinSession { session, result }) => {
                self.finish_join(session, result, staged)
            }
            (OperationKind::Find | OperationKind::Join, _) => {
                warn!("{} {} completed with a mismatched outcome", kind, operation);
                SessionNotification::failure(kind, completion_failure_reason(kind))
            }
            (kind, CompletionOutcome::Session { session, successful }) => {
                self.finish_lifecycle(kind, session, successful, staged)
            }
            (kind, _) => {
                warn!("{} {} completed with a mismatched outcome", kind, operation);
                SessionNotification::failure(kind, completion_failure_reason(kind))
            }
        };

        self.raise(notification);
        true
    }

    fn finish_lifecycle(
        &mut self,
        kind: OperationKind,
        session: SessionName,
        successful: bool,
        staged: Option<Staged>,
    ) -> SessionNotification {
        if !successful {
            return SessionNotification::failure(kind, completion_failure_reason(kind));
        }

        match kind {
            OperationKind::Create | OperationKind::Update => {
                if let Some(Staged::Settings(settings)) = staged {
                    self.state.settings = Some(settings);
                }
                if kind == OperationKind::Create {
                    self.state.current_session = session.clone();
                }
            }
            OperationKind::Destroy => {
                self.state.settings = None;
                self.state.joined = None;
                self.state.current_session = self.policy.session_name();
            }
            _ => {}
        }

        info!("{} completed for {}", kind, session);
        SessionNotification::completed(kind, session)
            .unwrap_or_else(|| SessionNotification::failure(kind, completion_failure_reason(kind)))
    }

    fn finish_search(
        &mut self,
        successful: bool,
        results: Vec<SessionSearchResult>,
    ) -> SessionNotification {
        if !successful {
            self.state.search_results = None;
            return SessionNotification::failure(
                OperationKind::Find,
                completion_failure_reason(OperationKind::Find),
            );
        }

        let sessions: Vec<SessionDescriptor> =
            results.into_iter().map(SessionDescriptor::new).collect();
        self.state.search_results = Some(sessions.clone());
        info!("search found {} sessions", sessions.len());

        if sessions.is_empty() {
            SessionNotification::failure(OperationKind::Find, NO_SESSIONS_FOUND)
        } else {
            SessionNotification::FindSessionsComplete(sessions)
        }
    }

    fn finish_join(
        &mut self,
        session: SessionName,
        result: JoinSessionResult,
        staged: Option<Staged>,
    ) -> SessionNotification {
        match result.failure_reason() {
            Some(reason) => {
                info!("joining {} failed: {}", session, result);
                SessionNotification::failure(OperationKind::Join, reason)
            }
            None => {
                if let Some(Staged::Join(descriptor)) = staged {
                    self.state.joined = Some(descriptor);
                }
                self.state.current_session = session.clone();
                info!("joined {}", session);
                SessionNotification::JoinSessionComplete(session)
            }
        }
    }

    fn raise(&mut self, notification: SessionNotification) {
        debug!("raising {:?}", notification);
        self.delegates.dispatch(notification);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shared::provider::loopback::{LoopbackBackend, LoopbackSessionProvider};

    use super::*;
    use crate::travel::RecordingTravel;

    fn manager() -> (SessionManager, LoopbackSessionProvider, UnboundedReceiver<SessionNotification>) {
        let backend = LoopbackBackend::new();
        let provider = backend.login("Ada");
        let mut manager =
            SessionManager::new(SessionPolicy::default(), provider.user_id(), RecordingTravel::new())
                .with_provider(provider.clone());
        let stream = manager.notification_stream();
        (manager, provider, stream)
    }

    fn drain(stream: &mut UnboundedReceiver<SessionNotification>) -> Vec<SessionNotification> {
        std::iter::from_fn(|| stream.try_recv().ok()).collect()
    }

    #[test]
    fn reasons_cover_every_kind() {
        assert_eq!(rejection_reason(OperationKind::Create), "Failed to create Session");
        assert_eq!(completion_failure_reason(OperationKind::Create), "Failed to create session");
        assert_eq!(rejection_reason(OperationKind::Join), "Error joining Session");
        assert_eq!(completion_failure_reason(OperationKind::Find), "Failed to Find Sessions");
    }

    #[test]
    fn placeholder_name_before_any_session() {
        let (manager, _, _) = manager();
        assert_eq!(manager.current_session_name(), "GameSession");
        assert!(manager.current_settings().is_none());
        assert!(manager.last_search_results().is_none());
        assert!(manager.joined_session().is_none());
    }

    #[test]
    fn create_waits_for_completion_before_storing_settings() {
        let (mut manager, provider, mut stream) = manager();
        manager.create_session(3, true);

        assert!(manager.is_pending(OperationKind::Create));
        assert!(manager.current_settings().is_none());
        assert_eq!(manager.pump_events(), 0);

        provider.run_callbacks();
        assert_eq!(manager.pump_events(), 1);
        assert_eq!(
            drain(&mut stream),
            vec![SessionNotification::CreateSessionComplete("GameSession".into())]
        );
        let settings = manager.current_settings().unwrap();
        assert_eq!(settings.num_private_connections, 3);
        assert_eq!(settings.num_public_connections, 0);
        assert_eq!(settings.map_name(), Some("/Game/Maps/MainMenu"));
    }

    #[test]
    fn update_swaps_settings_only_on_success() {
        let (mut manager, provider, mut stream) = manager();
        manager.create_session(4, false);
        provider.run_callbacks();
        manager.pump_events();
        drain(&mut stream);

        provider.fail_next(OperationKind::Update);
        manager.update_session();
        provider.run_callbacks();
        manager.pump_events();
        assert_eq!(
            drain(&mut stream),
            vec![SessionNotification::UpdateSessionFailure("Failed to update session".into())]
        );
        assert_eq!(
            manager.current_settings().unwrap().map_name(),
            Some("/Game/Maps/MainMenu")
        );

        manager.update_session();
        provider.run_callbacks();
        manager.pump_events();
        assert_eq!(
            drain(&mut stream),
            vec![SessionNotification::UpdateSessionComplete("GameSession".into())]
        );
        assert_eq!(
            manager.current_settings().unwrap().map_name(),
            Some("/Game/Maps/MainGame")
        );
    }

    #[test]
    fn update_without_session_fails_fast() {
        let (mut manager, provider, mut stream) = manager();
        manager.update_session();
        assert_eq!(provider.queued_callbacks(), 0);
        assert_eq!(
            drain(&mut stream),
            vec![SessionNotification::UpdateSessionFailure(NO_ACTIVE_SESSION.into())]
        );
    }

    #[test]
    fn overlapping_call_is_rejected_without_reaching_the_provider() {
        let (mut manager, provider, mut stream) = manager();
        manager.start_session();
        manager.start_session();

        assert_eq!(provider.queued_callbacks(), 1);
        assert_eq!(
            drain(&mut stream),
            vec![SessionNotification::StartSessionFailure(
                "Start session already in progress".into()
            )]
        );
    }

    #[test]
    fn overdue_operation_times_out_and_late_completion_is_ignored() {
        let (mut manager, provider, mut stream) = manager();
        provider.hold_callbacks(true);
        manager.end_session();

        let later = Instant::now() + Duration::from_secs(31);
        assert_eq!(manager.pump_events_at(later), 1);
        assert_eq!(
            drain(&mut stream),
            vec![SessionNotification::EndSessionFailure("End session timed out".into())]
        );
        assert!(!manager.is_pending(OperationKind::End));

        provider.hold_callbacks(false);
        provider.run_callbacks();
        assert_eq!(manager.pump_events(), 0);
        assert!(drain(&mut stream).is_empty());
    }

    #[test]
    fn cancelled_operation_raises_nothing() {
        let (mut manager, provider, mut stream) = manager();
        manager.destroy_session();
        assert!(manager.cancel_pending(OperationKind::Destroy));
        assert!(!manager.cancel_pending(OperationKind::Destroy));

        provider.run_callbacks();
        assert_eq!(manager.pump_events(), 0);
        assert!(drain(&mut stream).is_empty());
    }

    #[test]
    fn detached_provider_fails_every_operation_fast() {
        let (mut manager, _provider, mut stream) = manager();
        assert!(manager.detach_provider().is_some());

        manager.create_session(4, false);
        manager.find_sessions(10);
        assert_eq!(
            drain(&mut stream),
            vec![
                SessionNotification::CreateSessionFailure(SESSION_INTERFACE_INVALID.into()),
                SessionNotification::FindSessionsFailure(SESSION_INTERFACE_INVALID.into()),
            ]
        );
    }

    #[test]
    fn destroy_resets_to_placeholder() {
        let (mut manager, provider, mut stream) = manager();
        manager.create_session(2, false);
        provider.run_callbacks();
        manager.pump_events();
        manager.destroy_session();
        provider.run_callbacks();
        manager.pump_events();

        assert_eq!(
            drain(&mut stream).last(),
            Some(&SessionNotification::DestroySessionComplete("GameSession".into()))
        );
        assert!(manager.current_settings().is_none());
        assert_eq!(manager.current_session_name(), "GameSession");
    }

    #[test]
    fn travel_uses_the_game_map_without_seamless_travel() {
        let travel = RecordingTravel::new();
        let mut manager =
            SessionManager::new(SessionPolicy::default(), UniqueNetId::new_random(), travel.clone());

        assert!(manager.server_travel_as_host());
        assert!(manager.server_travel_as_client());
        let requests = travel.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests
            .iter()
            .all(|request| request.url == "/Game/Maps/MainGame" && !request.seamless));
    }
}
