//! Client-side session management.
//!
//! [`SessionManager`] drives create/update/start/end/destroy/find/join against a
//! [`shared::SessionProvider`] and reports each outcome through the delegates in
//! [`SessionDelegates`].

/// Bevy plugin pumping the session manager every frame
#[cfg(feature = "bevy")]
pub mod bevy;
/// Listener registries
pub mod delegate;
pub mod manager;
/// Notifications raised by the manager
pub mod notifications;
/// Map travel seam
pub mod travel;

pub use delegate::{DelegateHandle, MulticastDelegate};
pub use manager::{SessionManager, SessionState};
pub use notifications::{SessionDelegates, SessionNotification};
pub use travel::{RecordingTravel, TravelRole, WorldTravel};
