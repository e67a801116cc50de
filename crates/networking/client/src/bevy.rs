use bevy::prelude::*;
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};

use crate::{SessionManager, SessionNotification};

#[derive(Event, Debug, Clone, PartialEq, Eq)]
pub struct SessionNotificationEvent(pub SessionNotification);

/// Pumps the [`SessionManager`] resource in `PreUpdate` and forwards every
/// notification as a [`SessionNotificationEvent`].
#[derive(Default)]
pub struct SessionManagerPlugin;

impl Plugin for SessionManagerPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<SessionNotificationEvent>();
        app.add_systems(
            PreUpdate,
            pump_session_manager.run_if(resource_exists::<SessionManager>),
        );
    }
}

fn pump_session_manager(
    mut manager: ResMut<SessionManager>,
    mut stream: Local<Option<UnboundedReceiver<SessionNotification>>>,
    mut writer: EventWriter<SessionNotificationEvent>,
) {
    let receiver = stream.get_or_insert_with(|| manager.notification_stream());
    manager.pump_events();
    loop {
        match receiver.try_recv() {
            Ok(notification) => {
                writer.write(SessionNotificationEvent(notification));
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                tracing::debug!("session notification stream closed, resubscribing");
                *stream = Some(manager.notification_stream());
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use shared::provider::loopback::LoopbackBackend;
    use shared::SessionPolicy;

    use super::*;
    use crate::RecordingTravel;

    #[test]
    fn completions_become_events() {
        let backend = LoopbackBackend::new();
        let provider = backend.login("Ada");
        let manager =
            SessionManager::new(SessionPolicy::default(), provider.user_id(), RecordingTravel::new())
                .with_provider(provider.clone());

        let mut app = App::new();
        app.add_plugins(SessionManagerPlugin).insert_resource(manager);
        app.update();

        app.world_mut()
            .resource_mut::<SessionManager>()
            .create_session(4, false);
        provider.run_callbacks();
        app.update();

        let events: Vec<_> = app
            .world_mut()
            .resource_mut::<Events<SessionNotificationEvent>>()
            .drain()
            .collect();
        assert_eq!(
            events,
            vec![SessionNotificationEvent(
                SessionNotification::CreateSessionComplete("GameSession".into())
            )]
        );
    }

    fn drain_events(app: &mut App) -> Vec<SessionNotificationEvent> {
        app.world_mut()
            .resource_mut::<Events<SessionNotificationEvent>>()
            .drain()
            .collect()
    }

    #[test]
    fn events_keep_flowing_after_listeners_are_cleared() {
        let backend = LoopbackBackend::new();
        let provider = backend.login("Ada");
        let manager =
            SessionManager::new(SessionPolicy::default(), provider.user_id(), RecordingTravel::new())
                .with_provider(provider.clone());

        let mut app = App::new();
        app.add_plugins(SessionManagerPlugin).insert_resource(manager);
        app.update();

        {
            let mut manager = app.world_mut().resource_mut::<SessionManager>();
            manager.delegates_mut().clear();
            manager.create_session(4, false);
        }
        provider.run_callbacks();
        app.update();

        assert_eq!(
            drain_events(&mut app),
            vec![SessionNotificationEvent(
                SessionNotification::CreateSessionComplete("GameSession".into())
            )]
        );
    }

    #[test]
    fn closed_stream_is_replaced() {
        let backend = LoopbackBackend::new();
        let provider = backend.login("Ada");
        let manager =
            SessionManager::new(SessionPolicy::default(), provider.user_id(), RecordingTravel::new())
                .with_provider(provider.clone());

        let mut app = App::new();
        app.add_plugins(SessionManagerPlugin).insert_resource(manager);
        app.update();

        // dropping the manager's senders closes the system's receiver
        app.world_mut()
            .resource_mut::<SessionManager>()
            .delegates_mut()
            .drop_subscriptions();
        app.update();

        app.world_mut()
            .resource_mut::<SessionManager>()
            .start_session();
        provider.run_callbacks();
        app.update();

        assert_eq!(
            drain_events(&mut app),
            vec![SessionNotificationEvent(SessionNotification::StartSessionFailure(
                "Failed to start session".into()
            ))]
        );
    }
}
