//! Session management
//!
//! One session per WebSocket connection. `state` tracks where a session is
//! in its lifecycle; `hooks` turns lifecycle events into registry updates;
//! `guard` makes sure a session's peer binding is released however it ends.

pub mod guard;
pub mod hooks;
pub mod state;

pub use guard::SessionGuard;
pub use hooks::LifecycleHooks;
pub use state::{SessionPhase, SessionState};
