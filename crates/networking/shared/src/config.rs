//! Session policy configuration.
//!
//! Defaults live in the `Default` impl. A TOML file only needs to carry the
//! values that differ from them.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::SessionName;
use crate::settings::DEFAULT_MAX_PLAYERS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid session policy: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid session policy: {0}")]
    Invalid(&'static str),
}

/// Tunables for the session manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Upper bound for the requested player count.
    pub max_players: u32,
    /// Local name under which hosted and joined sessions are tracked.
    pub session_name: String,
    pub main_menu_map: String,
    /// Map advertised on update and travelled to when hosting.
    pub game_map: String,
    /// Seconds before an unanswered backend call is failed. `0` disables timeouts.
    pub operation_timeout_secs: u64,
    pub search_presence_only: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_players: DEFAULT_MAX_PLAYERS,
            session_name: "GameSession".into(),
            main_menu_map: "/Game/Maps/MainMenu".into(),
            game_map: "/Game/Maps/MainGame".into(),
            operation_timeout_secs: 30,
            search_presence_only: true,
        }
    }
}

impl SessionPolicy {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let policy: Self = toml::from_str(source)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_players == 0 {
            return Err(ConfigError::Invalid("max_players must be at least 1"));
        }
        if i32::try_from(self.max_players).is_err() {
            return Err(ConfigError::Invalid("max_players must not exceed i32::MAX"));
        }
        if self.session_name.trim().is_empty() {
            return Err(ConfigError::Invalid("session_name must not be empty"));
        }
        Ok(())
    }

    pub fn session_name(&self) -> SessionName {
        SessionName::new(self.session_name.clone())
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_secs > 0).then(|| Duration::from_secs(self.operation_timeout_secs))
    }
}
