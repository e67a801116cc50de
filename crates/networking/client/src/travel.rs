use std::sync::{Arc, Mutex};

use strum::Display;
use tracing::info;

/// Which side of a session is asking to travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TravelRole {
    Host,
    Client,
}

/// Moves the local world (and everyone connected to it) to another map.
pub trait WorldTravel: Send + Sync {
    /// Returns whether the travel request was accepted.
    fn server_travel(&mut self, url: &str, seamless: bool) -> bool;
}

/// Map path a role travels to. Both roles currently share one destination.
pub fn travel_url(game_map: &str, _role: TravelRole) -> String {
    game_map.to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelRequest {
    pub url: String,
    pub seamless: bool,
}

/// Accepts every request and remembers it.
#[derive(Debug, Clone, Default)]
pub struct RecordingTravel {
    requests: Arc<Mutex<Vec<TravelRequest>>>,
}

impl RecordingTravel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<TravelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl WorldTravel for RecordingTravel {
    fn server_travel(&mut self, url: &str, seamless: bool) -> bool {
        info!("server travel to {} (seamless: {})", url, seamless);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(TravelRequest {
                url: url.to_owned(),
                seamless,
            });
        true
    }
}
