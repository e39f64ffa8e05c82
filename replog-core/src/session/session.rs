use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::catalog::ExerciseCatalog;
use crate::db::operations::get_or_create_user;
use crate::parser::ParserInterface;
use crate::session::state::SessionState;

const DEFAULT_PARSE_TIMEOUT: Duration = Duration::from_secs(25);

/// Owns the shared resources and hands out one [`UserSession`] per user.
pub struct SessionManager {
    pool: SqlitePool,
    catalog: Arc<ExerciseCatalog>,
    parser: Arc<ParserInterface>,
    parse_timeout: Duration,
    sessions: Mutex<HashMap<i64, Arc<UserSession>>>,
}

impl SessionManager {
    pub fn new(pool: SqlitePool, parser: ParserInterface) -> Self {
        let catalog = Arc::new(ExerciseCatalog::new(pool.clone()));
        Self {
            pool,
            catalog,
            parser: Arc::new(parser),
            parse_timeout: DEFAULT_PARSE_TIMEOUT,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_parse_timeout(mut self, timeout: Duration) -> Self {
        self.parse_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &ExerciseCatalog {
        &self.catalog
    }

    /// Session for the given user, creating the user row on first
    /// contact.
    pub async fn session(&self, user_id: i64, username: Option<&str>) -> Result<Arc<UserSession>> {
        get_or_create_user(&self.pool, user_id, username).await?;
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(user_id)
            .or_insert_with(|| {
                Arc::new(UserSession {
                    user_id,
                    pool: self.pool.clone(),
                    catalog: Arc::clone(&self.catalog),
                    parser: Arc::clone(&self.parser),
                    parse_timeout: self.parse_timeout,
                    state: Mutex::new(SessionState::Idle),
                })
            })
            .clone();
        Ok(session)
    }
}

/// One user's session. The state mutex serializes that user's
/// transitions; different users' sessions are independent.
pub struct UserSession {
    pub(super) user_id: i64,
    pub(super) pool: SqlitePool,
    pub(super) catalog: Arc<ExerciseCatalog>,
    pub(super) parser: Arc<ParserInterface>,
    pub(super) parse_timeout: Duration,
    pub(super) state: Mutex<SessionState>,
}

impl UserSession {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Snapshot of the current state, for inspection only.
    pub async fn state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn workout_id(&self) -> Option<i64> {
        self.state.lock().await.workout_id()
    }
}
