//! Workout lifecycle transitions: start, tail deletes, correction,
//! comments, finish, cancel.
//!
//! Each public method takes the session lock itself; the `_locked`
//! variants exist so `handle_text` can dispatch parser action hints
//! without re-entering the mutex.

use chrono::{Local, NaiveDate};
use log::{info, warn};

use crate::analytics::records::check_and_save_records;
use crate::analytics::{motivation_level, workout_summary};
use crate::db::operations::{
    NewSetData, create_workout, delete_last_workout_exercise, delete_workout_cascade,
    finish_workout, get_exercise, last_workout_exercise, remove_last_set, sets_for_exercise,
    workout_exercises,
};
use crate::error::SessionError;
use crate::session::reply::Reply;
use crate::session::session::UserSession;
use crate::session::state::{PendingSets, SessionState, StartPolicy};

impl UserSession {
    /// Guard for operations only legal in plain `Active` state.
    pub(super) fn require_plain_active(state: &SessionState) -> Result<i64, SessionError> {
        match state {
            SessionState::Idle => Err(SessionError::NoActiveWorkout),
            SessionState::Active { workout_id } => Ok(*workout_id),
            _ => Err(SessionError::Invariant(
                "a pending prompt must be answered first".to_string(),
            )),
        }
    }

    pub async fn start_workout(
        &self,
        program_id: Option<i64>,
        policy: StartPolicy,
    ) -> Result<Reply, SessionError> {
        self.start_workout_on(program_id, policy, Local::now().date_naive())
            .await
    }

    /// Starts (or resumes) a workout dated `date`. With an active session
    /// and `Continue`, nothing changes; with `StartNew` the session is
    /// pointed at a fresh workout row and the old row is left in storage.
    pub async fn start_workout_on(
        &self,
        program_id: Option<i64>,
        policy: StartPolicy,
        date: NaiveDate,
    ) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.workout_id() {
            match policy {
                StartPolicy::Continue => {
                    return Ok(Reply::WorkoutStarted {
                        workout_id: existing,
                        resumed: true,
                    });
                }
                StartPolicy::StartNew => {
                    warn!(
                        "user {} starts a new workout, orphaning workout {}",
                        self.user_id, existing
                    );
                }
            }
        }
        let workout = create_workout(&self.pool, self.user_id, date, program_id).await?;
        info!("user {} started workout {}", self.user_id, workout.id);
        *state = SessionState::Active {
            workout_id: workout.id,
        };
        Ok(Reply::WorkoutStarted {
            workout_id: workout.id,
            resumed: false,
        })
    }

    /// Removes the most recently appended exercise with its sets.
    /// Reported as a no-op when the workout is still empty.
    pub async fn delete_last_exercise(&self) -> Result<Reply, SessionError> {
        let state = self.state.lock().await;
        self.delete_last_exercise_locked(&state).await
    }

    pub(super) async fn delete_last_exercise_locked(
        &self,
        state: &SessionState,
    ) -> Result<Reply, SessionError> {
        let workout_id = Self::require_plain_active(state)?;
        let Some(last) = last_workout_exercise(&self.pool, workout_id).await? else {
            return Ok(Reply::NothingToDelete);
        };
        let exercise_name = get_exercise(&self.pool, last.exercise_id).await?.name;
        delete_last_workout_exercise(&self.pool, workout_id).await?;
        Ok(Reply::LastExerciseDeleted { exercise_name })
    }

    /// Removes the last set of the last exercise, recomputing that
    /// exercise's volume.
    pub async fn delete_last_set(&self) -> Result<Reply, SessionError> {
        let state = self.state.lock().await;
        self.delete_last_set_locked(&state).await
    }

    pub(super) async fn delete_last_set_locked(
        &self,
        state: &SessionState,
    ) -> Result<Reply, SessionError> {
        let workout_id = Self::require_plain_active(state)?;
        if remove_last_set(&self.pool, workout_id).await? {
            Ok(Reply::LastSetDeleted)
        } else {
            Ok(Reply::NothingToDelete)
        }
    }

    /// Correction flow: drop the tail exercise but keep its sets, then
    /// collect a replacement name.
    pub async fn edit_last(&self) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        self.edit_last_locked(&mut state).await
    }

    pub(super) async fn edit_last_locked(
        &self,
        state: &mut SessionState,
    ) -> Result<Reply, SessionError> {
        let workout_id = Self::require_plain_active(state)?;
        let Some(last) = last_workout_exercise(&self.pool, workout_id).await? else {
            return Ok(Reply::NothingToDelete);
        };
        let sets = sets_for_exercise(&self.pool, last.id).await?;
        let pending = PendingSets {
            duration_based: sets.iter().all(|s| s.weight_kg.is_none()),
            sets: sets
                .iter()
                .map(|s| NewSetData {
                    reps: s.reps,
                    weight_kg: s.weight_kg,
                    comment: s.comment.clone(),
                    is_warmup: s.is_warmup,
                })
                .collect(),
        };
        delete_last_workout_exercise(&self.pool, workout_id).await?;
        let preserved = pending.sets.len();
        *state = SessionState::AwaitingName {
            workout_id,
            pending,
        };
        Ok(Reply::AwaitingCorrectedName {
            preserved_sets: preserved,
        })
    }

    /// Starts collecting a comment for the most recent exercise.
    pub async fn request_comment(&self) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        self.request_comment_locked(&mut state).await
    }

    pub(super) async fn request_comment_locked(
        &self,
        state: &mut SessionState,
    ) -> Result<Reply, SessionError> {
        let workout_id = Self::require_plain_active(state)?;
        let Some(last) = last_workout_exercise(&self.pool, workout_id).await? else {
            return Ok(Reply::NothingToComment);
        };
        *state = SessionState::AwaitingComment {
            workout_id,
            workout_exercise_id: last.id,
        };
        Ok(Reply::CommentPrompt)
    }

    pub async fn finish(&self) -> Result<Reply, SessionError> {
        self.finish_on(Local::now().date_naive()).await
    }

    /// Finishes the workout: recompute total volume, detect records,
    /// build the summary, clear the session. Finishing an empty workout
    /// is a reported no-op and the session stays active.
    pub async fn finish_on(&self, today: NaiveDate) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        let workout_id = Self::require_plain_active(&state)?;

        if workout_exercises(&self.pool, workout_id).await?.is_empty() {
            return Ok(Reply::NothingRecorded);
        }

        let workout = finish_workout(&self.pool, workout_id).await?;
        let new_records = check_and_save_records(&self.pool, workout_id).await?;
        let summary = workout_summary(&self.pool, workout_id)
            .await?
            .ok_or(SessionError::NotFound("workout"))?;
        let motivation = motivation_level(
            &self.pool,
            self.user_id,
            workout.total_volume_kg.unwrap_or(0.0),
            !new_records.is_empty(),
            today,
        )
        .await?;

        info!(
            "user {} finished workout {} (volume {:.1} kg, {} new records)",
            self.user_id,
            workout_id,
            summary.total_volume_kg,
            new_records.len()
        );
        *state = SessionState::Idle;
        Ok(Reply::Finished {
            summary,
            new_records,
            motivation,
        })
    }

    /// Cancels the workout wholesale: the row and everything under it is
    /// deleted. Legal from any non-idle state.
    pub async fn cancel(&self) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        let Some(workout_id) = state.workout_id() else {
            return Err(SessionError::NoActiveWorkout);
        };
        delete_workout_cascade(&self.pool, workout_id).await?;
        info!("user {} cancelled workout {}", self.user_id, workout_id);
        *state = SessionState::Idle;
        Ok(Reply::Cancelled)
    }
}
