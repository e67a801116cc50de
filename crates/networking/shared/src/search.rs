//! Session search queries, raw search results and their UI-facing projection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{HostedSessionId, UniqueNetId};
use crate::settings::{SessionSettings, SettingValue, SEARCH_PRESENCE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanEquals,
    LessThan,
    LessThanEquals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    pub value: SettingValue,
    pub comparison: ComparisonOp,
}

impl QueryParam {
    /// Whether `candidate` satisfies this parameter.
    ///
    /// Ordering comparisons only apply to integers; any other pairing only
    /// supports (in)equality.
    pub fn matches(&self, candidate: &SettingValue) -> bool {
        match (&self.value, candidate) {
            (SettingValue::Int(wanted), SettingValue::Int(actual)) => match self.comparison {
                ComparisonOp::Equals => actual == wanted,
                ComparisonOp::NotEquals => actual != wanted,
                ComparisonOp::GreaterThan => actual > wanted,
                ComparisonOp::GreaterThanEquals => actual >= wanted,
                ComparisonOp::LessThan => actual < wanted,
                ComparisonOp::LessThanEquals => actual <= wanted,
            },
            (wanted, actual) => match self.comparison {
                ComparisonOp::Equals => wanted == actual,
                ComparisonOp::NotEquals => wanted != actual,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySettings {
    params: BTreeMap<String, QueryParam>,
}

impl QuerySettings {
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<SettingValue>,
        comparison: ComparisonOp,
    ) {
        self.params.insert(
            key.into(),
            QueryParam {
                value: value.into(),
                comparison,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&QueryParam> {
        self.params.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryParam)> {
        self.params.iter().map(|(key, param)| (key.as_str(), param))
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Parameters for one session search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSearch {
    pub max_search_results: u32,
    pub is_lan_query: bool,
    pub query_settings: QuerySettings,
}

impl SessionSearch {
    /// Online (non-LAN) search bounded to `max_search_results` entries.
    pub fn online(max_search_results: u32) -> Self {
        Self {
            max_search_results,
            is_lan_query: false,
            query_settings: QuerySettings::default(),
        }
    }

    /// Restricts results to sessions advertised through presence.
    pub fn presence_only(mut self) -> Self {
        self.query_settings
            .set(SEARCH_PRESENCE, true, ComparisonOp::Equals);
        self
    }
}

/// One raw entry reported by the backend for a session search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSearchResult {
    pub session_id: HostedSessionId,
    pub owning_user_id: UniqueNetId,
    pub owning_user_name: String,
    pub settings: SessionSettings,
    pub num_open_public_connections: i32,
    pub num_open_private_connections: i32,
    pub ping_ms: Option<u32>,
}

/// Display data derived from a search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub session_name: String,
    pub is_private: bool,
    pub open_player_slots: i32,
    pub is_full: bool,
}

/// Read-only wrapper around one search result handed to UI code.
///
/// Every accessor recomputes its value from the wrapped result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    result: SessionSearchResult,
}

impl SessionDescriptor {
    pub fn new(result: SessionSearchResult) -> Self {
        Self { result }
    }

    pub fn search_result(&self) -> &SessionSearchResult {
        &self.result
    }

    pub fn into_search_result(self) -> SessionSearchResult {
        self.result
    }

    pub fn session_data(&self) -> SessionData {
        let private_open = self.result.num_open_private_connections;
        let public_open = self.result.num_open_public_connections;
        let is_full = private_open <= 0 && public_open <= 0;

        let (is_private, open_player_slots) = if is_full {
            (false, 0)
        } else if private_open > 0 {
            (true, private_open)
        } else {
            (false, public_open)
        };

        SessionData {
            session_name: self.display_name(),
            is_private,
            open_player_slots,
            is_full,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{}'s Session", self.result.owning_user_name)
    }

    pub fn is_full(&self) -> bool {
        self.session_data().is_full
    }

    pub fn is_private(&self) -> bool {
        self.session_data().is_private
    }

    pub fn open_player_slots(&self) -> i32 {
        self.session_data().open_player_slots
    }
}

impl From<SessionSearchResult> for SessionDescriptor {
    fn from(result: SessionSearchResult) -> Self {
        Self::new(result)
    }
}
