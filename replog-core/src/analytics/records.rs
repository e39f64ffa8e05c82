//! Personal-record detection over a finished workout.

use anyhow::Result;
use log::info;
use sqlx::SqlitePool;

use crate::analytics::one_rep_max;
use crate::db::models::RecordKind;
use crate::db::operations::{
    best_record, get_exercise, get_workout, insert_record, sets_for_exercise, workout_exercises,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    pub exercise_name: String,
    pub kind: RecordKind,
    pub value: f64,
    pub previous_value: Option<f64>,
}

/// Compares the workout's per-exercise maxima against stored bests and
/// persists strict improvements. A kind with no computable value this
/// workout is skipped, never recorded as zero. Existing records are never
/// lowered or deleted.
pub async fn check_and_save_records(pool: &SqlitePool, workout_id: i64) -> Result<Vec<NewRecord>> {
    let Some(workout) = get_workout(pool, workout_id).await? else {
        return Ok(Vec::new());
    };
    let mut new_records = Vec::new();

    for we in workout_exercises(pool, workout_id).await? {
        let exercise = get_exercise(pool, we.exercise_id).await?;
        let sets = sets_for_exercise(pool, we.id).await?;

        let max_weight = sets
            .iter()
            .filter_map(|s| s.weight_kg)
            .fold(None::<f64>, |acc, w| Some(acc.map_or(w, |a| a.max(w))));
        let volume = we.volume_kg;
        let max_1rm = sets
            .iter()
            .filter_map(|s| match (s.reps, s.weight_kg) {
                (Some(r), Some(w)) => Some(one_rep_max(r, w)),
                _ => None,
            })
            .fold(None::<f64>, |acc, e| Some(acc.map_or(e, |a| a.max(e))));

        for (kind, value) in [
            (RecordKind::MaxWeight, max_weight),
            (RecordKind::MaxVolume, volume),
            (RecordKind::Max1Rm, max_1rm),
        ] {
            let Some(value) = value else { continue };
            let previous = best_record(pool, workout.user_id, we.exercise_id, kind).await?;
            let previous_value = previous.map(|r| r.value);
            if previous_value.is_none_or(|prev| value > prev) {
                insert_record(pool, workout.user_id, we.exercise_id, kind, value, workout_id)
                    .await?;
                info!(
                    "new {} record for user {} on {}: {}",
                    kind.as_str(),
                    workout.user_id,
                    exercise.name,
                    value
                );
                new_records.push(NewRecord {
                    exercise_name: exercise.name.clone(),
                    kind,
                    value,
                    previous_value,
                });
            }
        }
    }
    Ok(new_records)
}
