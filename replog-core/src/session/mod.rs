//! Per-user workout session state machine.
//!
//! One logical session per user; transitions within a session are
//! serialized behind a mutex, sessions of different users run
//! concurrently. All replies are opaque payloads for the presentation
//! channel; no formatting happens here.

mod ingest;
mod reply;
mod session;
mod state;
mod workout;

pub use reply::Reply;
pub use session::{SessionManager, UserSession};
pub use state::{PendingSets, SessionState, StartPolicy};
