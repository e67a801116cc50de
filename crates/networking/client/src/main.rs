use std::path::PathBuf;

use clap::Parser;
use client::{RecordingTravel, SessionManager, SessionNotification};
use color_eyre::{eyre::eyre, Result};
use shared::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "session_dev")]
#[command(about = "Session manager - host and join a loopback session in one process")]
struct Args {
    /// Session policy file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Requested player count for the hosted session
    #[arg(short, long, default_value_t = 4, allow_negative_numbers = true)]
    players: i32,

    /// Host a private session
    #[arg(long)]
    private: bool,

    /// Maximum number of search results
    #[arg(long, default_value_t = 10)]
    max_results: u32,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .init();

    let args = Args::parse();
    let policy = match &args.config {
        Some(path) => SessionPolicy::load(path)?,
        None => SessionPolicy::default(),
    };
    info!("session policy: {:?}", policy);

    let backend = LoopbackBackend::new();
    let host_provider = backend.login("Host");
    let guest_provider = backend.login("Guest");

    let mut host = SessionManager::new(policy.clone(), host_provider.user_id(), RecordingTravel::new())
        .with_provider(host_provider.clone());
    let mut guest = SessionManager::new(policy, guest_provider.user_id(), RecordingTravel::new())
        .with_provider(guest_provider.clone());
    log_notifications(&mut host, "host");
    log_notifications(&mut guest, "guest");

    host.create_session(args.players, args.private);
    settle(&host_provider, &mut host);
    host.start_session();
    settle(&host_provider, &mut host);
    host.update_session();
    settle(&host_provider, &mut host);

    guest.find_sessions(args.max_results);
    settle(&guest_provider, &mut guest);
    let target = guest
        .last_search_results()
        .and_then(|sessions| sessions.first().cloned())
        .ok_or_else(|| eyre!("guest found no session to join"))?;
    let data = target.session_data();
    info!(
        "joining {} (private: {}, open slots: {})",
        data.session_name, data.is_private, data.open_player_slots
    );

    guest.join_session(&target);
    settle(&guest_provider, &mut guest);
    if guest.joined_session().is_none() {
        warn!("guest could not join; tearing down");
    } else if !host.server_travel_as_host() || !guest.server_travel_as_client() {
        warn!("server travel refused");
    }

    guest.destroy_session();
    settle(&guest_provider, &mut guest);
    host.end_session();
    settle(&host_provider, &mut host);
    host.destroy_session();
    settle(&host_provider, &mut host);

    info!("sessions left on backend: {}", backend.session_count());
    Ok(())
}

fn settle(provider: &LoopbackSessionProvider, manager: &mut SessionManager) {
    provider.run_callbacks();
    manager.pump_events();
}

fn log_notifications(manager: &mut SessionManager, role: &'static str) {
    manager
        .delegates_mut()
        .on_notification
        .add(move |notification: &SessionNotification| match notification.failure_reason() {
            Some(reason) => warn!("[{role}] {} failed: {reason}", notification.kind()),
            None => info!("[{role}] {:?}", notification),
        });
}
