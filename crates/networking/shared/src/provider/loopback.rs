//! Loopback session backend for in-process hosting and joining.
//!
//! Several [`LoopbackSessionProvider`] handles share one [`LoopbackBackend`], so a
//! host and its clients can run in the same process without an online service.
//! Completions are queued and only delivered from [`LoopbackSessionProvider::run_callbacks`],
//! the same way online SDKs deliver callbacks from a pump on the game thread.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, info, warn};

use crate::ids::{HostedSessionId, IdGenerator, SessionName, UniqueNetId};
use crate::search::{SessionSearch, SessionSearchResult};
use crate::settings::{SessionSettings, SettingValue, SEARCH_PRESENCE};

use super::{
    CompletionTicket, JoinSessionResult, OperationKind, ProviderError, ProviderResult,
    SessionProvider,
};

/// Ping reported for every loopback search result.
const LOOPBACK_PING_MS: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Pending,
    InProgress,
    Ended,
}

#[derive(Debug, Clone)]
struct HostedSession {
    id: HostedSessionId,
    owner: UniqueNetId,
    name: SessionName,
    settings: SessionSettings,
    phase: SessionPhase,
    public_members: Vec<UniqueNetId>,
    private_members: Vec<UniqueNetId>,
    reachable: bool,
}

impl HostedSession {
    fn open_public(&self) -> i32 {
        open_slots(self.settings.num_public_connections, self.public_members.len())
    }

    fn open_private(&self) -> i32 {
        open_slots(self.settings.num_private_connections, self.private_members.len())
    }

    fn is_member(&self, user: &UniqueNetId) -> bool {
        self.public_members.contains(user) || self.private_members.contains(user)
    }

    fn leave(&mut self, user: &UniqueNetId) {
        self.public_members.retain(|member| member != user);
        self.private_members.retain(|member| member != user);
    }
}

/// Free slots, saturating at the `i32` bounds used by search results.
fn open_slots(connections: u32, members: usize) -> i32 {
    let open = i64::from(connections) - i64::try_from(members).unwrap_or(i64::MAX);
    i32::try_from(open).unwrap_or(if open < 0 { i32::MIN } else { i32::MAX })
}

#[derive(Debug, Default)]
struct BackendState {
    users: HashMap<UniqueNetId, String>,
    sessions: HashMap<HostedSessionId, HostedSession>,
    /// Which hosted session a user tracks under a local session name.
    local_sessions: HashMap<(UniqueNetId, SessionName), HostedSessionId>,
}

impl BackendState {
    fn local(&self, user: &UniqueNetId, name: &SessionName) -> Option<HostedSessionId> {
        self.local_sessions.get(&(*user, name.clone())).copied()
    }

    fn hosted_mut(&mut self, user: &UniqueNetId, name: &SessionName) -> Option<&mut HostedSession> {
        let id = self.local(user, name)?;
        self.sessions
            .get_mut(&id)
            .filter(|session| session.owner == *user)
    }

    fn search_result(&self, session: &HostedSession) -> SessionSearchResult {
        SessionSearchResult {
            session_id: session.id,
            owning_user_id: session.owner,
            owning_user_name: self.users.get(&session.owner).cloned().unwrap_or_default(),
            settings: session.settings.clone(),
            num_open_public_connections: session.open_public(),
            num_open_private_connections: session.open_private(),
            ping_ms: Some(LOOPBACK_PING_MS),
        }
    }
}

/// Shared registry of users and hosted sessions.
#[derive(Debug, Clone, Default)]
pub struct LoopbackBackend {
    state: Arc<Mutex<BackendState>>,
    session_ids: IdGenerator,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user and returns the provider handle acting on their behalf.
    pub fn login(&self, display_name: impl Into<String>) -> LoopbackSessionProvider {
        let user = UniqueNetId::new_random();
        let display_name = display_name.into();
        info!("loopback user {} logged in as {}", user, display_name);
        self.lock().users.insert(user, display_name);
        LoopbackSessionProvider {
            backend: self.clone(),
            user,
            control: Arc::new(Mutex::new(ProviderControl::default())),
        }
    }

    /// Number of sessions currently hosted on this backend.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn session_phase(&self, session: HostedSessionId) -> Option<SessionPhase> {
        self.lock().sessions.get(&session).map(|hosted| hosted.phase)
    }

    pub fn session_settings(&self, session: HostedSessionId) -> Option<SessionSettings> {
        self.lock()
            .sessions
            .get(&session)
            .map(|hosted| hosted.settings.clone())
    }

    /// Players registered in a session, excluding its host.
    pub fn members(&self, session: HostedSessionId) -> Vec<UniqueNetId> {
        self.lock()
            .sessions
            .get(&session)
            .map(|hosted| {
                hosted
                    .private_members
                    .iter()
                    .chain(hosted.public_members.iter())
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Default)]
struct ProviderControl {
    queued: VecDeque<(CompletionTicket, Deferred)>,
    reject_next: HashSet<OperationKind>,
    fail_next: HashSet<OperationKind>,
    hold_callbacks: bool,
}

/// Outcome computed when a call is accepted, delivered on the next pump.
#[derive(Debug)]
enum Deferred {
    Session(SessionName, bool),
    Search(bool, Vec<SessionSearchResult>),
    Join(SessionName, JoinSessionResult),
}

/// One user's view of a [`LoopbackBackend`].
///
/// Clones share their callback queue and fault injection switches, so a test
/// can keep a clone to pump callbacks after handing the provider away.
#[derive(Debug, Clone)]
pub struct LoopbackSessionProvider {
    backend: LoopbackBackend,
    user: UniqueNetId,
    control: Arc<Mutex<ProviderControl>>,
}

impl LoopbackSessionProvider {
    pub fn user_id(&self) -> UniqueNetId {
        self.user
    }

    pub fn backend(&self) -> &LoopbackBackend {
        &self.backend
    }

    /// Delivers all queued completions. Returns how many were delivered.
    pub fn run_callbacks(&self) -> usize {
        let drained: Vec<_> = {
            let mut control = self.control();
            if control.hold_callbacks {
                return 0;
            }
            control.queued.drain(..).collect()
        };

        let delivered = drained.len();
        for (ticket, deferred) in drained {
            match deferred {
                Deferred::Session(session, successful) => ticket.complete(session, successful),
                Deferred::Search(successful, results) => {
                    ticket.complete_search(successful, results)
                }
                Deferred::Join(session, result) => ticket.complete_join(session, result),
            }
        }
        delivered
    }

    /// Completions accepted but not yet delivered.
    pub fn queued_callbacks(&self) -> usize {
        self.control().queued.len()
    }

    /// Refuses the next call of `kind` up front.
    pub fn reject_next(&self, kind: OperationKind) {
        self.control().reject_next.insert(kind);
    }

    /// Accepts the next call of `kind` but reports failure on completion.
    pub fn fail_next(&self, kind: OperationKind) {
        self.control().fail_next.insert(kind);
    }

    /// While held, accepted completions stay queued (a stalled backend).
    pub fn hold_callbacks(&self, hold: bool) {
        self.control().hold_callbacks = hold;
    }

    /// Marks this user's hosted session as (un)reachable for joining players.
    pub fn set_host_reachable(&self, session: &SessionName, reachable: bool) {
        let mut state = self.backend.lock();
        if let Some(hosted) = state.hosted_mut(&self.user, session) {
            hosted.reachable = reachable;
        }
    }

    /// Backend id of the session tracked locally under `session`.
    pub fn hosted_session_id(&self, session: &SessionName) -> Option<HostedSessionId> {
        self.backend.lock().local(&self.user, session)
    }

    fn control(&self) -> MutexGuard<'_, ProviderControl> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit(&self, kind: OperationKind, user: Option<&UniqueNetId>) -> ProviderResult {
        if let Some(user) = user {
            if *user != self.user {
                return Err(ProviderError::UnknownUser(*user));
            }
        }
        if self.control().reject_next.remove(&kind) {
            return Err(ProviderError::Rejected(format!("{kind} refused by backend")));
        }
        Ok(())
    }

    fn enqueue(&self, ticket: CompletionTicket, deferred: Deferred) {
        let deferred = if self.control().fail_next.remove(&ticket.kind()) {
            debug!("loopback forcing failure for {}", ticket.kind());
            match deferred {
                Deferred::Session(session, _) => Deferred::Session(session, false),
                Deferred::Search(..) => Deferred::Search(false, Vec::new()),
                Deferred::Join(session, _) => {
                    Deferred::Join(session, JoinSessionResult::UnknownError)
                }
            }
        } else {
            deferred
        };
        self.control().queued.push_back((ticket, deferred));
    }

    fn transition(
        &self,
        session: &SessionName,
        from: &[SessionPhase],
        to: SessionPhase,
    ) -> bool {
        let mut state = self.backend.lock();
        match state.hosted_mut(&self.user, session) {
            Some(hosted) if from.contains(&hosted.phase) => {
                debug!("loopback session {} {:?} -> {:?}", hosted.id, hosted.phase, to);
                hosted.phase = to;
                true
            }
            Some(hosted) => {
                warn!(
                    "loopback session {} cannot move from {:?} to {:?}",
                    hosted.id, hosted.phase, to
                );
                false
            }
            None => {
                warn!("loopback user {} hosts no session named {}", self.user, session);
                false
            }
        }
    }
}

impl SessionProvider for LoopbackSessionProvider {
    fn create_session(
        &mut self,
        host: &UniqueNetId,
        session: &SessionName,
        settings: &SessionSettings,
        ticket: CompletionTicket,
    ) -> ProviderResult {
        self.admit(OperationKind::Create, Some(host))?;

        let created = {
            let mut state = self.backend.lock();
            if state.local(host, session).is_some() {
                warn!("loopback user {} already tracks a session named {}", host, session);
                false
            } else {
                let id = HostedSessionId::new(self.backend.session_ids.next());
                state.sessions.insert(
                    id,
                    HostedSession {
                        id,
                        owner: *host,
                        name: session.clone(),
                        settings: settings.clone(),
                        phase: SessionPhase::Pending,
                        public_members: Vec::new(),
                        private_members: Vec::new(),
                        reachable: true,
                    },
                );
                state.local_sessions.insert((*host, session.clone()), id);
                info!("loopback session {} ({}) created by {}", id, session, host);
                true
            }
        };

        self.enqueue(ticket, Deferred::Session(session.clone(), created));
        Ok(())
    }

    fn update_session(
        &mut self,
        session: &SessionName,
        settings: &SessionSettings,
        ticket: CompletionTicket,
    ) -> ProviderResult {
        self.admit(OperationKind::Update, None)?;

        let updated = {
            let mut state = self.backend.lock();
            match state.hosted_mut(&self.user, session) {
                Some(hosted) => {
                    hosted.settings = settings.clone();
                    true
                }
                None => false,
            }
        };

        self.enqueue(ticket, Deferred::Session(session.clone(), updated));
        Ok(())
    }

    fn start_session(&mut self, session: &SessionName, ticket: CompletionTicket) -> ProviderResult {
        self.admit(OperationKind::Start, None)?;
        let started = self.transition(
            session,
            &[SessionPhase::Pending, SessionPhase::Ended],
            SessionPhase::InProgress,
        );
        self.enqueue(ticket, Deferred::Session(session.clone(), started));
        Ok(())
    }

    fn end_session(&mut self, session: &SessionName, ticket: CompletionTicket) -> ProviderResult {
        self.admit(OperationKind::End, None)?;
        let ended = self.transition(session, &[SessionPhase::InProgress], SessionPhase::Ended);
        self.enqueue(ticket, Deferred::Session(session.clone(), ended));
        Ok(())
    }

    fn destroy_session(
        &mut self,
        session: &SessionName,
        ticket: CompletionTicket,
    ) -> ProviderResult {
        self.admit(OperationKind::Destroy, None)?;

        let destroyed = {
            let mut state = self.backend.lock();
            match state.local_sessions.remove(&(self.user, session.clone())) {
                Some(id) => {
                    let owned = state
                        .sessions
                        .get(&id)
                        .map(|hosted| hosted.owner == self.user)
                        .unwrap_or(false);
                    if owned {
                        if let Some(hosted) = state.sessions.remove(&id) {
                            info!("loopback session {} ({}) destroyed", id, hosted.name);
                        }
                        state.local_sessions.retain(|_, tracked| *tracked != id);
                    } else if let Some(hosted) = state.sessions.get_mut(&id) {
                        hosted.leave(&self.user);
                        debug!("loopback user {} left session {}", self.user, id);
                    }
                    true
                }
                None => false,
            }
        };

        self.enqueue(ticket, Deferred::Session(session.clone(), destroyed));
        Ok(())
    }

    fn find_sessions(
        &mut self,
        searcher: &UniqueNetId,
        search: &SessionSearch,
        ticket: CompletionTicket,
    ) -> ProviderResult {
        self.admit(OperationKind::Find, Some(searcher))?;

        let results: Vec<_> = {
            let state = self.backend.lock();
            let mut candidates: Vec<_> = state
                .sessions
                .values()
                .filter(|hosted| hosted.owner != *searcher)
                .filter(|hosted| hosted.settings.should_advertise)
                .filter(|hosted| hosted.settings.is_lan_match == search.is_lan_query)
                .filter(|hosted| match hosted.phase {
                    SessionPhase::Pending => true,
                    SessionPhase::InProgress => hosted.settings.allow_join_in_progress,
                    SessionPhase::Ended => false,
                })
                .filter(|hosted| matches_query(&hosted.settings, search))
                .collect();
            candidates.sort_by_key(|hosted| hosted.id);
            candidates
                .into_iter()
                .take(search.max_search_results as usize)
                .map(|hosted| state.search_result(hosted))
                .collect()
        };

        debug!("loopback search by {} found {} sessions", searcher, results.len());
        self.enqueue(ticket, Deferred::Search(true, results));
        Ok(())
    }

    fn join_session(
        &mut self,
        player: &UniqueNetId,
        session: &SessionName,
        target: &SessionSearchResult,
        ticket: CompletionTicket,
    ) -> ProviderResult {
        self.admit(OperationKind::Join, Some(player))?;

        let result = {
            let mut state = self.backend.lock();
            if state.local(player, session).is_some() {
                JoinSessionResult::AlreadyInSession
            } else {
                let outcome = match state.sessions.get_mut(&target.session_id) {
                    None => JoinSessionResult::SessionDoesNotExist,
                    Some(hosted) if hosted.is_member(player) => {
                        JoinSessionResult::AlreadyInSession
                    }
                    Some(hosted) if !hosted.reachable => {
                        JoinSessionResult::CouldNotRetrieveAddress
                    }
                    Some(hosted) if hosted.open_private() > 0 => {
                        hosted.private_members.push(*player);
                        JoinSessionResult::Success
                    }
                    Some(hosted) if hosted.open_public() > 0 => {
                        hosted.public_members.push(*player);
                        JoinSessionResult::Success
                    }
                    Some(_) => JoinSessionResult::SessionIsFull,
                };
                if outcome == JoinSessionResult::Success {
                    state
                        .local_sessions
                        .insert((*player, session.clone()), target.session_id);
                    info!("loopback user {} joined session {}", player, target.session_id);
                }
                outcome
            }
        };

        self.enqueue(ticket, Deferred::Join(session.clone(), result));
        Ok(())
    }
}

fn matches_query(settings: &SessionSettings, search: &SessionSearch) -> bool {
    search.query_settings.iter().all(|(key, param)| {
        if key == SEARCH_PRESENCE {
            param.matches(&SettingValue::Bool(settings.uses_presence))
        } else {
            settings
                .get(key)
                .map(|value| param.matches(value))
                .unwrap_or(false)
        }
    })
}
