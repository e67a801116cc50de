//! Advertised session settings and the host-side creation request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Key under which the current map is advertised.
pub const SETTING_MAPNAME: &str = "MAPNAME";

/// Search key restricting results to presence sessions.
pub const SEARCH_PRESENCE: &str = "PRESENCESEARCH";

/// Default upper bound for players in one session.
pub const DEFAULT_MAX_PLAYERS: u32 = 8;

/// A typed value stored in session settings or search queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Str(value.to_owned())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Str(value)
    }
}

/// Where a setting is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvertisementType {
    DontAdvertise,
    ViaPingOnly,
    ViaOnlineService,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSetting {
    pub value: SettingValue,
    pub advertisement: AdvertisementType,
}

/// Settings a host publishes for its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub num_public_connections: u32,
    pub num_private_connections: u32,
    pub should_advertise: bool,
    pub allow_join_in_progress: bool,
    pub is_lan_match: bool,
    pub is_dedicated: bool,
    pub allow_invites: bool,
    pub uses_presence: bool,
    pub allow_join_via_presence: bool,
    pub use_lobbies_if_available: bool,
    values: BTreeMap<String, SessionSetting>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            num_public_connections: 0,
            num_private_connections: 0,
            should_advertise: false,
            allow_join_in_progress: false,
            is_lan_match: false,
            is_dedicated: false,
            allow_invites: false,
            uses_presence: false,
            allow_join_via_presence: false,
            use_lobbies_if_available: false,
            values: BTreeMap::new(),
        }
    }
}

impl SessionSettings {
    /// Settings for a listen-server session hosted by a player.
    ///
    /// The session is advertised, joinable in progress and via presence, never LAN and
    /// never dedicated. `capacity` lands on the private or public connection count
    /// depending on `is_private`.
    pub fn hosted(capacity: u32, is_private: bool) -> Self {
        let (num_public_connections, num_private_connections) = if is_private {
            (0, capacity)
        } else {
            (capacity, 0)
        };

        Self {
            num_public_connections,
            num_private_connections,
            should_advertise: true,
            allow_join_in_progress: true,
            is_lan_match: false,
            is_dedicated: false,
            allow_invites: true,
            uses_presence: true,
            allow_join_via_presence: true,
            use_lobbies_if_available: true,
            values: BTreeMap::new(),
        }
    }

    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<SettingValue>,
        advertisement: AdvertisementType,
    ) {
        self.values.insert(
            key.into(),
            SessionSetting {
                value: value.into(),
                advertisement,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key).map(|setting| &setting.value)
    }

    /// Settings visible to other players through the online service.
    pub fn advertised(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.values
            .iter()
            .filter(|(_, setting)| setting.advertisement == AdvertisementType::ViaOnlineService)
            .map(|(key, setting)| (key.as_str(), &setting.value))
    }

    pub fn map_name(&self) -> Option<&str> {
        match self.get(SETTING_MAPNAME) {
            Some(SettingValue::Str(map)) => Some(map.as_str()),
            _ => None,
        }
    }

    pub fn is_private(&self) -> bool {
        self.num_private_connections > 0 && self.num_public_connections == 0
    }

    pub fn capacity(&self) -> u32 {
        self.num_public_connections + self.num_private_connections
    }
}

/// Host request: how many players and whether the session is private.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfiguration {
    pub player_count: i32,
    pub is_private: bool,
}

impl SessionConfiguration {
    pub const fn new(player_count: i32, is_private: bool) -> Self {
        Self {
            player_count,
            is_private,
        }
    }

    /// Player count clamped to `[1, max_players]`.
    ///
    /// Out-of-range requests are corrected, never rejected.
    pub fn effective_player_count(&self, max_players: u32) -> u32 {
        clamp_player_count(self.player_count, max_players)
    }
}

pub fn clamp_player_count(requested: i32, max_players: u32) -> u32 {
    let max_players = max_players.max(1);
    if requested < 1 {
        warn!(
            "Desired player count of {} is less than 1, setting to 1",
            requested
        );
        return 1;
    }

    let requested = requested as u32;
    if requested > max_players {
        warn!(
            "Desired player count of {} is greater than {}, setting to {}",
            requested, max_players, max_players
        );
        return max_players;
    }

    requested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_follows_bounds() {
        for n in [-5, 0] {
            assert_eq!(clamp_player_count(n, DEFAULT_MAX_PLAYERS), 1);
        }
        for n in 1..=8 {
            assert_eq!(clamp_player_count(n, DEFAULT_MAX_PLAYERS), n as u32);
        }
        for n in [9, 20, i32::MAX] {
            assert_eq!(clamp_player_count(n, DEFAULT_MAX_PLAYERS), 8);
        }
    }

    #[test]
    fn clamp_treats_zero_ceiling_as_one() {
        assert_eq!(clamp_player_count(4, 0), 1);
    }

    #[test]
    fn hosted_settings_follow_privacy() {
        let public = SessionSettings::hosted(6, false);
        assert_eq!(public.num_public_connections, 6);
        assert_eq!(public.num_private_connections, 0);
        assert!(!public.is_private());

        let private = SessionSettings::hosted(3, true);
        assert_eq!(private.num_private_connections, 3);
        assert!(private.is_private());
        assert!(private.should_advertise && private.uses_presence && !private.is_lan_match);
    }

    #[test]
    fn only_online_service_values_are_advertised() {
        let mut settings = SessionSettings::hosted(4, false);
        settings.set(SETTING_MAPNAME, "/Game/Maps/MainMenu", AdvertisementType::ViaOnlineService);
        settings.set("SECRET", 7_i64, AdvertisementType::DontAdvertise);

        let advertised: Vec<_> = settings.advertised().map(|(key, _)| key).collect();
        assert_eq!(advertised, vec![SETTING_MAPNAME]);
        assert_eq!(settings.map_name(), Some("/Game/Maps/MainMenu"));
    }
}
