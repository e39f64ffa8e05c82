use crate::db::operations::NewSetData;
use crate::resolver::Alternative;

/// Sets waiting to be attached once their exercise is settled, already
/// normalized to kilograms.
#[derive(Debug, Clone, Default)]
pub struct PendingSets {
    pub sets: Vec<NewSetData>,
    /// Duration-framed batch (cardio): no weights, a duration signal.
    pub duration_based: bool,
}

/// What to do when `start_workout` finds a session already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPolicy {
    /// Keep the current workout; starting again is a no-op.
    Continue,
    /// Point the session at a fresh workout row; the previous row stays
    /// in storage untouched.
    StartNew,
}

/// The session state as one tagged union: each variant carries exactly
/// the data its sub-dialog needs, so stale pending fields cannot exist.
#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    Active {
        workout_id: i64,
    },
    /// Resolver landed in the disambiguation band; alternatives were
    /// presented. `attempts` counts clarification rounds, capped at 2.
    AwaitingClarification {
        workout_id: i64,
        original_name: String,
        pending: PendingSets,
        alternatives: Vec<Alternative>,
        attempts: u8,
    },
    /// No confident match; the user was offered to add the name as a
    /// custom exercise.
    AwaitingNewExercise {
        workout_id: i64,
        name: String,
        pending: PendingSets,
    },
    /// Tail exercise was removed for correction; its sets are preserved
    /// and replayed under the name given next.
    AwaitingName {
        workout_id: i64,
        pending: PendingSets,
    },
    /// A comment for the given workout exercise is being collected.
    AwaitingComment {
        workout_id: i64,
        workout_exercise_id: i64,
    },
}

impl SessionState {
    /// The workout this state points at, if any.
    pub fn workout_id(&self) -> Option<i64> {
        match self {
            SessionState::Idle => None,
            SessionState::Active { workout_id }
            | SessionState::AwaitingClarification { workout_id, .. }
            | SessionState::AwaitingNewExercise { workout_id, .. }
            | SessionState::AwaitingName { workout_id, .. }
            | SessionState::AwaitingComment { workout_id, .. } => Some(*workout_id),
        }
    }

    pub fn is_plain_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }
}
