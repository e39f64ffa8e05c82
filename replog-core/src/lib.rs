pub mod analytics;
pub mod catalog;
pub mod db;
pub mod error;
pub mod parser;
pub mod resolver;
pub mod session;

pub use error::SessionError;
pub use session::{Reply, SessionManager, SessionState, StartPolicy, UserSession};
