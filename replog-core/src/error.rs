use thiserror::Error;

/// Failure taxonomy at the session-state-machine boundary. Everything but
/// `Store` is recoverable and leaves session state unchanged.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no active workout")]
    NoActiveWorkout,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Candidate data carried no usable reps/weight/duration signal.
    #[error("could not extract reps, weight or duration")]
    Unparseable,

    #[error("upstream call timed out")]
    UpstreamTimeout,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Unexpected store fault; aborts the single operation, last
    /// known-good state is kept.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SessionError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SessionError::Store(_))
    }
}
