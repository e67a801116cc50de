//! Session types shared between the session manager and its backends.

/// Session policy loaded from TOML
pub mod config;
/// Strongly typed identifiers
pub mod ids;
/// Backend contract, completion queue and the loopback backend
pub mod provider;
/// Search queries, search results and session descriptors
pub mod search;
/// Advertised session settings
pub mod settings;

pub use config::{ConfigError, SessionPolicy};
pub use ids::{
    HostedSessionId, IdGenerator, NetIdParseError, OperationId, SessionName, UniqueNetId,
};
pub use provider::{
    completion_channel, Completion, CompletionOutcome, CompletionReceiver, CompletionSender,
    CompletionTicket, JoinSessionResult, OperationKind, ProviderError, ProviderResult,
    SessionProvider,
};
pub use search::{SessionData, SessionDescriptor, SessionSearch, SessionSearchResult};
pub use settings::{SessionConfiguration, SessionSettings};

pub mod prelude {
    pub use crate::provider::loopback::{LoopbackBackend, LoopbackSessionProvider};
    pub use crate::{
        JoinSessionResult, OperationKind, SessionConfiguration, SessionDescriptor, SessionName,
        SessionPolicy, SessionProvider, SessionSettings, UniqueNetId,
    };
}
