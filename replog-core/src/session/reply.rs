use serde::Serialize;

use crate::analytics::records::NewRecord;
use crate::analytics::{MotivationLevel, WorkoutSummary};
use crate::resolver::Alternative;

/// Opaque result payloads handed to the presentation channel. Rendering,
/// buttons and markup are the channel's problem.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    WorkoutStarted {
        workout_id: i64,
        resumed: bool,
    },
    /// The upstream parser asked its own question; forwarded untouched.
    ClarificationPassThrough {
        prompt: String,
    },
    SetsRecorded {
        exercise_name: String,
        set_count: usize,
        volume_kg: Option<f64>,
        duration_based: bool,
        /// The batch introduced a brand-new custom exercise.
        created_exercise: bool,
    },
    /// Disambiguation prompt with ranked candidates.
    Clarify {
        original_name: String,
        alternatives: Vec<Alternative>,
        attempt: u8,
    },
    /// One retype attempt left before the offer-new fallback.
    AskRetypeName,
    OfferNewExercise {
        name: String,
    },
    /// The offer was declined; the pending sets were dropped.
    NewExerciseDeclined,
    AskRephrase,
    LastExerciseDeleted {
        exercise_name: String,
    },
    LastSetDeleted,
    NothingToDelete,
    /// Tail exercise removed; waiting for the corrected name, sets kept.
    AwaitingCorrectedName {
        preserved_sets: usize,
    },
    CommentPrompt,
    CommentSaved,
    NothingToComment,
    /// Finishing an empty workout is a no-op, reported not raised.
    NothingRecorded,
    Finished {
        summary: WorkoutSummary,
        new_records: Vec<NewRecord>,
        motivation: MotivationLevel,
    },
    Cancelled,
}
