//! Repository interface over the SQLite store. The structural invariants
//! (contiguous order_num/set_number, derived volumes, explicit cascades)
//! are enforced here, not by the database.

use anyhow::{Result, bail};
use chrono::NaiveDate;
use log::debug;
use sqlx::SqlitePool;

use crate::db::models::{
    ExerciseDefinition, Program, ProgramEntry, Record, RecordKind, SetRow, User, Workout,
    WorkoutExercise,
};

/// Input for one set of an exercise batch, already normalized to kilograms.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSetData {
    pub reps: Option<i64>,
    pub weight_kg: Option<f64>,
    pub comment: Option<String>,
    pub is_warmup: bool,
}

// Users

pub async fn get_or_create_user(
    pool: &SqlitePool,
    user_id: i64,
    username: Option<&str>,
) -> Result<User> {
    if let Some(user) = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
    {
        return Ok(user);
    }
    sqlx::query("INSERT INTO users (id, username) VALUES (?1, ?2)")
        .bind(user_id)
        .bind(username)
        .execute(pool)
        .await?;
    debug!("created user {}", user_id);
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
}

pub async fn update_user_settings(
    pool: &SqlitePool,
    user_id: i64,
    unit_system: Option<&str>,
    locale: Option<&str>,
) -> Result<User> {
    let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    let Some(user) = existing else {
        bail!("user {} not found", user_id);
    };
    sqlx::query("UPDATE users SET unit_system = ?1, locale = ?2 WHERE id = ?3")
        .bind(unit_system.unwrap_or(&user.unit_system))
        .bind(locale.or(user.locale.as_deref()))
        .bind(user_id)
        .execute(pool)
        .await?;
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
}

// Exercises

pub async fn get_exercise(pool: &SqlitePool, exercise_id: i64) -> Result<ExerciseDefinition> {
    sqlx::query_as::<_, ExerciseDefinition>("SELECT * FROM exercises WHERE id = ?1")
        .bind(exercise_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
}

pub async fn get_exercise_by_name(
    pool: &SqlitePool,
    name: &str,
) -> Result<Option<ExerciseDefinition>> {
    sqlx::query_as::<_, ExerciseDefinition>("SELECT * FROM exercises WHERE name = ?1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
}

/// Global catalog plus the given user's custom exercises, in id order so
/// resolver tie-breaking stays deterministic.
pub async fn visible_exercises(
    pool: &SqlitePool,
    user_id: Option<i64>,
) -> Result<Vec<ExerciseDefinition>> {
    let rows = match user_id {
        Some(uid) => {
            sqlx::query_as::<_, ExerciseDefinition>(
                "SELECT * FROM exercises WHERE is_custom = 0 OR created_by = ?1 ORDER BY id",
            )
            .bind(uid)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, ExerciseDefinition>(
                "SELECT * FROM exercises WHERE is_custom = 0 ORDER BY id",
            )
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

/// Creates a custom exercise scoped to its creator. Reuses an existing row
/// with the same canonical name instead of violating uniqueness.
pub async fn get_or_create_custom_exercise(
    pool: &SqlitePool,
    user_id: i64,
    name: &str,
    category: &str,
) -> Result<ExerciseDefinition> {
    if let Some(existing) = get_exercise_by_name(pool, name).await? {
        return Ok(existing);
    }
    let id = sqlx::query(
        "INSERT INTO exercises (name, category, is_custom, created_by) VALUES (?1, ?2, 1, ?3)",
    )
    .bind(name)
    .bind(category)
    .bind(user_id)
    .execute(pool)
    .await?
    .last_insert_rowid();
    debug!("created custom exercise {} ({})", name, id);
    get_exercise(pool, id).await
}

async fn exercise_referenced(pool: &SqlitePool, exercise_id: i64) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM workout_exercises WHERE exercise_id = ?1")
            .bind(exercise_id)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Deletion is refused while any workout references the exercise.
pub async fn delete_exercise(pool: &SqlitePool, exercise_id: i64) -> Result<()> {
    if exercise_referenced(pool, exercise_id).await? {
        bail!("exercise {} is referenced by workouts", exercise_id);
    }
    sqlx::query("DELETE FROM records WHERE exercise_id = ?1")
        .bind(exercise_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM exercises WHERE id = ?1")
        .bind(exercise_id)
        .execute(pool)
        .await?;
    Ok(())
}

// Programs

pub async fn create_program(
    pool: &SqlitePool,
    user_id: i64,
    name: &str,
    exercise_ids: &[i64],
) -> Result<Program> {
    let entries: Vec<ProgramEntry> = exercise_ids
        .iter()
        .enumerate()
        .map(|(i, &exercise_id)| ProgramEntry {
            exercise_id,
            order: i as i64 + 1,
        })
        .collect();
    let id = sqlx::query("INSERT INTO programs (user_id, name, exercises) VALUES (?1, ?2, ?3)")
        .bind(user_id)
        .bind(name)
        .bind(serde_json::to_string(&entries)?)
        .execute(pool)
        .await?
        .last_insert_rowid();
    sqlx::query_as::<_, Program>("SELECT * FROM programs WHERE id = ?1")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
}

pub async fn get_program(pool: &SqlitePool, program_id: i64) -> Result<Option<Program>> {
    sqlx::query_as::<_, Program>("SELECT * FROM programs WHERE id = ?1")
        .bind(program_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
}

pub async fn user_programs(pool: &SqlitePool, user_id: i64) -> Result<Vec<Program>> {
    sqlx::query_as::<_, Program>(
        "SELECT * FROM programs WHERE user_id = ?1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

pub async fn delete_program(pool: &SqlitePool, program_id: i64) -> Result<()> {
    sqlx::query("UPDATE workouts SET program_id = NULL WHERE program_id = ?1")
        .bind(program_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM programs WHERE id = ?1")
        .bind(program_id)
        .execute(pool)
        .await?;
    Ok(())
}

// Workouts

pub async fn create_workout(
    pool: &SqlitePool,
    user_id: i64,
    date: NaiveDate,
    program_id: Option<i64>,
) -> Result<Workout> {
    let id = sqlx::query("INSERT INTO workouts (user_id, date, program_id) VALUES (?1, ?2, ?3)")
        .bind(user_id)
        .bind(date)
        .bind(program_id)
        .execute(pool)
        .await?
        .last_insert_rowid();
    get_workout(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("workout {} vanished after insert", id))
}

pub async fn get_workout(pool: &SqlitePool, workout_id: i64) -> Result<Option<Workout>> {
    sqlx::query_as::<_, Workout>("SELECT * FROM workouts WHERE id = ?1")
        .bind(workout_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
}

pub async fn workouts_between(
    pool: &SqlitePool,
    user_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Workout>> {
    sqlx::query_as::<_, Workout>(
        "SELECT * FROM workouts WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
         ORDER BY date DESC, created_at DESC",
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

pub async fn user_workouts(pool: &SqlitePool, user_id: i64, limit: i64) -> Result<Vec<Workout>> {
    sqlx::query_as::<_, Workout>(
        "SELECT * FROM workouts WHERE user_id = ?1 ORDER BY date DESC, created_at DESC LIMIT ?2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

/// Recomputes `total_volume_kg` from the exercise volumes and touches
/// `updated_at`. Never patches the total incrementally.
pub async fn finish_workout(pool: &SqlitePool, workout_id: i64) -> Result<Workout> {
    let total: Option<f64> =
        sqlx::query_scalar("SELECT SUM(volume_kg) FROM workout_exercises WHERE workout_id = ?1")
            .bind(workout_id)
            .fetch_one(pool)
            .await?;
    sqlx::query(
        "UPDATE workouts SET total_volume_kg = ?1, updated_at = datetime('now') WHERE id = ?2",
    )
    .bind(total.unwrap_or(0.0))
    .bind(workout_id)
    .execute(pool)
    .await?;
    get_workout(pool, workout_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("workout {} not found", workout_id))
}

/// Explicit application-level cascade, one transaction: sets, then
/// workout_exercises, then record back-references, then the workout row.
pub async fn delete_workout_cascade(pool: &SqlitePool, workout_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "DELETE FROM sets WHERE workout_exercise_id IN
         (SELECT id FROM workout_exercises WHERE workout_id = ?1)",
    )
    .bind(workout_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM workout_exercises WHERE workout_id = ?1")
        .bind(workout_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE records SET workout_id = NULL WHERE workout_id = ?1")
        .bind(workout_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM workouts WHERE id = ?1")
        .bind(workout_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    debug!("deleted workout {} with cascade", workout_id);
    Ok(())
}

pub async fn add_workout_comment(pool: &SqlitePool, workout_id: i64, comment: &str) -> Result<()> {
    sqlx::query("UPDATE workouts SET comment = ?1, updated_at = datetime('now') WHERE id = ?2")
        .bind(comment)
        .bind(workout_id)
        .execute(pool)
        .await?;
    Ok(())
}

// Workout exercises & sets

fn batch_volume(sets: &[NewSetData]) -> Option<f64> {
    let volume: f64 = sets
        .iter()
        .filter_map(|s| match (s.weight_kg, s.reps) {
            (Some(w), Some(r)) => Some(w * r as f64),
            _ => None,
        })
        .sum();
    if volume > 0.0 { Some(volume) } else { None }
}

/// Appends an exercise with its sets. `order_num` (max+1 within the
/// workout) and the 1-based `set_number`s are assigned inside one
/// transaction so concurrent appends cannot race.
pub async fn add_workout_exercise(
    pool: &SqlitePool,
    workout_id: i64,
    exercise_id: i64,
    sets: &[NewSetData],
    comment: Option<&str>,
) -> Result<WorkoutExercise> {
    let mut tx = pool.begin().await?;
    let next_order: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(order_num), -1) + 1 FROM workout_exercises WHERE workout_id = ?1",
    )
    .bind(workout_id)
    .fetch_one(&mut *tx)
    .await?;

    let we_id = sqlx::query(
        "INSERT INTO workout_exercises (workout_id, exercise_id, order_num, comment, volume_kg)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(workout_id)
    .bind(exercise_id)
    .bind(next_order)
    .bind(comment)
    .bind(batch_volume(sets))
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for (i, s) in sets.iter().enumerate() {
        sqlx::query(
            "INSERT INTO sets (workout_exercise_id, set_number, reps, weight_kg, comment, is_warmup)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(we_id)
        .bind(i as i64 + 1)
        .bind(s.reps)
        .bind(s.weight_kg)
        .bind(s.comment.as_deref())
        .bind(s.is_warmup)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    sqlx::query_as::<_, WorkoutExercise>("SELECT * FROM workout_exercises WHERE id = ?1")
        .bind(we_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
}

pub async fn workout_exercises(
    pool: &SqlitePool,
    workout_id: i64,
) -> Result<Vec<WorkoutExercise>> {
    sqlx::query_as::<_, WorkoutExercise>(
        "SELECT * FROM workout_exercises WHERE workout_id = ?1 ORDER BY order_num",
    )
    .bind(workout_id)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

pub async fn sets_for_exercise(
    pool: &SqlitePool,
    workout_exercise_id: i64,
) -> Result<Vec<SetRow>> {
    sqlx::query_as::<_, SetRow>(
        "SELECT * FROM sets WHERE workout_exercise_id = ?1 ORDER BY set_number",
    )
    .bind(workout_exercise_id)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

pub async fn last_workout_exercise(
    pool: &SqlitePool,
    workout_id: i64,
) -> Result<Option<WorkoutExercise>> {
    sqlx::query_as::<_, WorkoutExercise>(
        "SELECT * FROM workout_exercises WHERE workout_id = ?1 ORDER BY order_num DESC LIMIT 1",
    )
    .bind(workout_id)
    .fetch_optional(pool)
    .await
    .map_err(Into::into)
}

/// Removes the highest-`order_num` exercise and its sets. Tail-only, which
/// keeps order_num contiguous. Returns false when the workout is empty.
pub async fn delete_last_workout_exercise(pool: &SqlitePool, workout_id: i64) -> Result<bool> {
    let Some(last) = last_workout_exercise(pool, workout_id).await? else {
        return Ok(false);
    };
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM sets WHERE workout_exercise_id = ?1")
        .bind(last.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM workout_exercises WHERE id = ?1")
        .bind(last.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(true)
}

/// Removes the last set of the last exercise and recomputes that
/// exercise's volume from the surviving sets.
pub async fn remove_last_set(pool: &SqlitePool, workout_id: i64) -> Result<bool> {
    let Some(last_we) = last_workout_exercise(pool, workout_id).await? else {
        return Ok(false);
    };
    let sets = sets_for_exercise(pool, last_we.id).await?;
    let Some(last_set) = sets.last() else {
        return Ok(false);
    };

    let remaining: f64 = sets[..sets.len() - 1].iter().map(SetRow::volume).sum();
    let new_volume = if remaining > 0.0 {
        Some(remaining)
    } else {
        None
    };

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM sets WHERE id = ?1")
        .bind(last_set.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE workout_exercises SET volume_kg = ?1 WHERE id = ?2")
        .bind(new_volume)
        .bind(last_we.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(true)
}

pub async fn add_exercise_comment(
    pool: &SqlitePool,
    workout_exercise_id: i64,
    comment: &str,
) -> Result<()> {
    sqlx::query("UPDATE workout_exercises SET comment = ?1 WHERE id = ?2")
        .bind(comment)
        .bind(workout_exercise_id)
        .execute(pool)
        .await?;
    Ok(())
}

// Records

pub async fn records_for_exercise(
    pool: &SqlitePool,
    user_id: i64,
    exercise_id: i64,
) -> Result<Vec<Record>> {
    sqlx::query_as::<_, Record>(
        "SELECT * FROM records WHERE user_id = ?1 AND exercise_id = ?2 ORDER BY achieved_at DESC",
    )
    .bind(user_id)
    .bind(exercise_id)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

pub async fn user_records(pool: &SqlitePool, user_id: i64) -> Result<Vec<Record>> {
    sqlx::query_as::<_, Record>(
        "SELECT * FROM records WHERE user_id = ?1 ORDER BY achieved_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

/// Current best for one (user, exercise, kind); only the greatest value is
/// authoritative, older rows are history.
pub async fn best_record(
    pool: &SqlitePool,
    user_id: i64,
    exercise_id: i64,
    kind: RecordKind,
) -> Result<Option<Record>> {
    sqlx::query_as::<_, Record>(
        "SELECT * FROM records WHERE user_id = ?1 AND exercise_id = ?2 AND kind = ?3
         ORDER BY value DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(exercise_id)
    .bind(kind.as_str())
    .fetch_optional(pool)
    .await
    .map_err(Into::into)
}

pub async fn insert_record(
    pool: &SqlitePool,
    user_id: i64,
    exercise_id: i64,
    kind: RecordKind,
    value: f64,
    workout_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO records (user_id, exercise_id, kind, value, workout_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(user_id)
    .bind(exercise_id)
    .bind(kind.as_str())
    .bind(value)
    .bind(workout_id)
    .execute(pool)
    .await?;
    Ok(())
}
