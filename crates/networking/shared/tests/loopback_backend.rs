//! Several users sharing one loopback backend in the same process.

use shared::prelude::*;
use shared::provider::loopback::SessionPhase;
use shared::provider::{completion_channel, CompletionOutcome, CompletionReceiver, CompletionTicket};
use shared::search::{ComparisonOp, SessionSearch, SessionSearchResult};
use shared::settings::{AdvertisementType, SETTING_MAPNAME};
use shared::OperationId;
use test_log::test;

struct User {
    provider: LoopbackSessionProvider,
    tx: shared::CompletionSender,
    rx: CompletionReceiver,
    next_op: u64,
}

impl User {
    fn login(backend: &LoopbackBackend, name: &str) -> Self {
        let (tx, rx) = completion_channel();
        Self {
            provider: backend.login(name),
            tx,
            rx,
            next_op: 1,
        }
    }

    fn ticket(&mut self, kind: OperationKind) -> CompletionTicket {
        let ticket = CompletionTicket::new(OperationId::new(self.next_op), kind, self.tx.clone());
        self.next_op += 1;
        ticket
    }

    fn outcome(&mut self) -> CompletionOutcome {
        self.provider.run_callbacks();
        self.rx.try_recv().expect("completion delivered").outcome
    }

    fn host(&mut self, settings: SessionSettings) -> bool {
        let user = self.provider.user_id();
        let ticket = self.ticket(OperationKind::Create);
        self.provider
            .create_session(&user, &SessionName::from("GameSession"), &settings, ticket)
            .unwrap();
        matches!(self.outcome(), CompletionOutcome::Session { successful, .. } if successful)
    }

    fn search(&mut self, search: SessionSearch) -> Vec<SessionSearchResult> {
        let user = self.provider.user_id();
        let ticket = self.ticket(OperationKind::Find);
        self.provider.find_sessions(&user, &search, ticket).unwrap();
        match self.outcome() {
            CompletionOutcome::FindSessions { results, .. } => results,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    fn join(&mut self, target: &SessionSearchResult) -> JoinSessionResult {
        let user = self.provider.user_id();
        let ticket = self.ticket(OperationKind::Join);
        self.provider
            .join_session(&user, &SessionName::from("GameSession"), target, ticket)
            .unwrap();
        match self.outcome() {
            CompletionOutcome::JoinSession { result, .. } => result,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    fn lifecycle(&mut self, kind: OperationKind) -> bool {
        let name = SessionName::from("GameSession");
        let ticket = self.ticket(kind);
        let result = match kind {
            OperationKind::Start => self.provider.start_session(&name, ticket),
            OperationKind::End => self.provider.end_session(&name, ticket),
            OperationKind::Destroy => self.provider.destroy_session(&name, ticket),
            other => panic!("not a lifecycle operation: {other}"),
        };
        result.unwrap();
        matches!(self.outcome(), CompletionOutcome::Session { successful, .. } if successful)
    }
}

#[test]
fn second_create_under_same_name_fails() {
    let backend = LoopbackBackend::new();
    let mut host = User::login(&backend, "Ada");

    assert!(host.host(SessionSettings::hosted(4, false)));
    assert!(!host.host(SessionSettings::hosted(4, false)));
    assert_eq!(backend.session_count(), 1);
}

#[test]
fn search_honours_limit_and_query_values() {
    let backend = LoopbackBackend::new();
    for (name, map) in [("Ada", "/Game/Maps/A"), ("Grace", "/Game/Maps/B"), ("Linus", "/Game/Maps/A")] {
        let mut host = User::login(&backend, name);
        let mut settings = SessionSettings::hosted(4, false);
        settings.set(SETTING_MAPNAME, map, AdvertisementType::ViaOnlineService);
        assert!(host.host(settings));
    }
    let mut seeker = User::login(&backend, "Seeker");

    assert_eq!(seeker.search(SessionSearch::online(10).presence_only()).len(), 3);
    assert_eq!(seeker.search(SessionSearch::online(2)).len(), 2);

    let mut by_map = SessionSearch::online(10);
    by_map
        .query_settings
        .set(SETTING_MAPNAME, "/Game/Maps/A", ComparisonOp::Equals);
    let found = by_map_owners(seeker.search(by_map));
    assert_eq!(found, vec!["Ada".to_owned(), "Linus".to_owned()]);

    let mut lan = SessionSearch::online(10);
    lan.is_lan_query = true;
    assert!(seeker.search(lan).is_empty());
}

fn by_map_owners(results: Vec<SessionSearchResult>) -> Vec<String> {
    let mut owners: Vec<_> = results.into_iter().map(|r| r.owning_user_name).collect();
    owners.sort();
    owners
}

#[test]
fn ended_and_hidden_sessions_are_not_listed() {
    let backend = LoopbackBackend::new();
    let mut host = User::login(&backend, "Ada");
    let mut hidden = User::login(&backend, "Grace");
    let mut seeker = User::login(&backend, "Seeker");

    let mut private_lobby = SessionSettings::hosted(2, true);
    private_lobby.should_advertise = false;
    assert!(hidden.host(private_lobby));
    assert!(host.host(SessionSettings::hosted(4, false)));

    assert!(host.lifecycle(OperationKind::Start));
    assert_eq!(seeker.search(SessionSearch::online(10)).len(), 1);

    assert!(host.lifecycle(OperationKind::End));
    assert!(seeker.search(SessionSearch::online(10)).is_empty());
}

#[test]
fn start_and_end_follow_phases() {
    let backend = LoopbackBackend::new();
    let mut host = User::login(&backend, "Ada");
    assert!(host.host(SessionSettings::hosted(4, false)));
    let id = host
        .provider
        .hosted_session_id(&SessionName::from("GameSession"))
        .unwrap();

    assert_eq!(backend.session_phase(id), Some(SessionPhase::Pending));
    assert!(host.lifecycle(OperationKind::Start));
    assert!(!host.lifecycle(OperationKind::Start));
    assert_eq!(backend.session_phase(id), Some(SessionPhase::InProgress));
    assert!(host.lifecycle(OperationKind::End));
    assert_eq!(backend.session_phase(id), Some(SessionPhase::Ended));
    assert!(host.lifecycle(OperationKind::Destroy));
    assert!(!host.lifecycle(OperationKind::Destroy));
}

#[test]
fn guest_leaving_frees_the_slot() {
    let backend = LoopbackBackend::new();
    let mut host = User::login(&backend, "Ada");
    let mut guest = User::login(&backend, "Grace");
    assert!(host.host(SessionSettings::hosted(1, false)));

    let target = guest.search(SessionSearch::online(1)).remove(0);
    assert_eq!(guest.join(&target), JoinSessionResult::Success);
    assert_eq!(
        guest.search(SessionSearch::online(1))[0].num_open_public_connections,
        0
    );

    assert!(guest.lifecycle(OperationKind::Destroy));
    assert!(backend.members(target.session_id).is_empty());
    assert_eq!(backend.session_count(), 1);
    assert_eq!(
        guest.search(SessionSearch::online(1))[0].num_open_public_connections,
        1
    );
}

#[test]
fn injected_failure_still_completes_once() {
    let backend = LoopbackBackend::new();
    let mut guest = User::login(&backend, "Grace");
    guest.provider.fail_next(OperationKind::Find);

    let user = guest.provider.user_id();
    let ticket = guest.ticket(OperationKind::Find);
    guest
        .provider
        .find_sessions(&user, &SessionSearch::online(5), ticket)
        .unwrap();
    assert_eq!(guest.provider.run_callbacks(), 1);
    assert!(matches!(
        guest.rx.try_recv().unwrap().outcome,
        CompletionOutcome::FindSessions { successful: false, .. }
    ));
    assert!(guest.rx.try_recv().is_err());
}
