//! Pure numeric computation over persisted workout data: volumes, 1RM
//! estimates, weekly trends. Nothing here mutates its inputs.

pub mod records;

use std::collections::HashMap;

use anyhow::Result;
use chrono::{Datelike, Days, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::models::SetRow;
use crate::db::operations::{
    get_exercise, sets_for_exercise, user_records, user_workouts, workout_exercises,
    workouts_between,
};

/// Epley one-rep-max estimate. A single (or zero/negative) rep set is the
/// lift itself, no extrapolation.
pub fn one_rep_max(reps: i64, weight: f64) -> f64 {
    if reps <= 1 {
        weight
    } else {
        weight * (1.0 + reps as f64 / 30.0)
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseSummary {
    pub name: String,
    pub volume_kg: f64,
    pub set_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutSummary {
    pub date: NaiveDate,
    pub exercise_count: usize,
    pub set_count: usize,
    pub total_volume_kg: f64,
    pub per_exercise: Vec<ExerciseSummary>,
}

pub async fn workout_summary(
    pool: &SqlitePool,
    workout_id: i64,
) -> Result<Option<WorkoutSummary>> {
    let Some(workout) = crate::db::operations::get_workout(pool, workout_id).await? else {
        return Ok(None);
    };
    let exercises = workout_exercises(pool, workout_id).await?;
    let mut per_exercise = Vec::with_capacity(exercises.len());
    let mut total_volume = 0.0;
    let mut set_count = 0;
    for we in &exercises {
        let sets = sets_for_exercise(pool, we.id).await?;
        let volume = we.volume_kg.unwrap_or(0.0);
        total_volume += volume;
        set_count += sets.len();
        let exercise = get_exercise(pool, we.exercise_id).await?;
        per_exercise.push(ExerciseSummary {
            name: exercise.name,
            volume_kg: volume,
            set_count: sets.len(),
        });
    }
    Ok(Some(WorkoutSummary {
        date: workout.date,
        exercise_count: exercises.len(),
        set_count,
        total_volume_kg: total_volume,
        per_exercise,
    }))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeekStats {
    pub workouts_count: usize,
    pub total_volume_kg: f64,
    pub exercises_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekComparison {
    pub current_week: WeekStats,
    pub previous_week: WeekStats,
    /// Rounded to one decimal place for presentation.
    pub percent_delta: f64,
}

pub fn percent_delta(previous: f64, current: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 { 100.0 } else { 0.0 }
    } else {
        (current - previous) / previous * 100.0
    }
}

async fn week_stats(
    pool: &SqlitePool,
    user_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<WeekStats> {
    let workouts = workouts_between(pool, user_id, start, end).await?;
    let mut total_volume = 0.0;
    let mut exercises_count = 0;
    for w in &workouts {
        total_volume += w.total_volume_kg.unwrap_or(0.0);
        exercises_count += workout_exercises(pool, w.id).await?.len();
    }
    Ok(WeekStats {
        workouts_count: workouts.len(),
        total_volume_kg: total_volume,
        exercises_count,
    })
}

/// Monday-start weeks: current week is Monday..today inclusive, previous
/// week the preceding Monday..Sunday.
pub async fn week_comparison(
    pool: &SqlitePool,
    user_id: i64,
    today: NaiveDate,
) -> Result<WeekComparison> {
    let monday = today - Days::new(today.weekday().num_days_from_monday() as u64);
    let prev_monday = monday - Days::new(7);
    let prev_sunday = monday - Days::new(1);

    let current_week = week_stats(pool, user_id, monday, today).await?;
    let previous_week = week_stats(pool, user_id, prev_monday, prev_sunday).await?;
    let delta = percent_delta(previous_week.total_volume_kg, current_week.total_volume_kg);

    Ok(WeekComparison {
        current_week,
        previous_week,
        percent_delta: round1(delta),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub workout_id: i64,
    pub sets: Vec<(Option<i64>, Option<f64>)>,
    pub volume_kg: f64,
}

/// Last `limit` performances of one exercise, newest first.
pub async fn exercise_history(
    pool: &SqlitePool,
    user_id: i64,
    exercise_id: i64,
    limit: i64,
) -> Result<Vec<HistoryEntry>> {
    let rows = sqlx::query_as::<_, (i64, i64, NaiveDate, Option<f64>)>(
        "SELECT we.id, w.id, w.date, we.volume_kg
         FROM workout_exercises we
         JOIN workouts w ON w.id = we.workout_id
         WHERE w.user_id = ?1 AND we.exercise_id = ?2
         ORDER BY w.date DESC, we.order_num DESC
         LIMIT ?3",
    )
    .bind(user_id)
    .bind(exercise_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for (we_id, workout_id, date, volume) in rows {
        let sets = sets_for_exercise(pool, we_id).await?;
        out.push(HistoryEntry {
            date,
            workout_id,
            sets: sets.iter().map(|s| (s.reps, s.weight_kg)).collect(),
            volume_kg: volume.unwrap_or(0.0),
        });
    }
    Ok(out)
}

/// Volume per muscle group within one workout. An exercise tagged with
/// several groups contributes its full volume to each; untagged volume
/// lands in "other".
pub async fn muscle_group_volume(
    pool: &SqlitePool,
    workout_id: i64,
) -> Result<HashMap<String, f64>> {
    let mut result: HashMap<String, f64> = HashMap::new();
    for we in workout_exercises(pool, workout_id).await? {
        let volume = we.volume_kg.unwrap_or(0.0);
        let exercise = get_exercise(pool, we.exercise_id).await?;
        let groups = exercise.muscle_groups();
        if groups.is_empty() {
            *result.entry("other".to_string()).or_insert(0.0) += volume;
        } else {
            for g in groups {
                let key = g.trim().to_string();
                if !key.is_empty() {
                    *result.entry(key).or_insert(0.0) += volume;
                }
            }
        }
    }
    Ok(result)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayWorkout {
    pub comment: Option<String>,
    pub exercise_count: usize,
    pub set_count: usize,
    pub volume_kg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySummary {
    pub workouts: Vec<DayWorkout>,
    pub total_volume_kg: f64,
}

pub async fn today_summary(
    pool: &SqlitePool,
    user_id: i64,
    today: NaiveDate,
) -> Result<DaySummary> {
    let workouts = workouts_between(pool, user_id, today, today).await?;
    let mut out = Vec::with_capacity(workouts.len());
    let mut total = 0.0;
    for w in &workouts {
        let exercises = workout_exercises(pool, w.id).await?;
        let mut set_count = 0;
        for we in &exercises {
            set_count += sets_for_exercise(pool, we.id).await?.len();
        }
        let volume = w.total_volume_kg.unwrap_or(0.0);
        total += volume;
        out.push(DayWorkout {
            comment: w.comment.clone(),
            exercise_count: exercises.len(),
            set_count,
            volume_kg: volume,
        });
    }
    Ok(DaySummary {
        workouts: out,
        total_volume_kg: total,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthSummary {
    pub workouts_count: usize,
    pub total_volume_kg: f64,
    pub exercise_count: usize,
    pub avg_volume_per_workout: f64,
    pub records_count: usize,
    /// Top 5 exercises by volume, descending.
    pub top_exercises: Vec<(String, f64)>,
}

pub async fn month_summary(
    pool: &SqlitePool,
    user_id: i64,
    year: i32,
    month: u32,
) -> Result<MonthSummary> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| anyhow::anyhow!("invalid month {}-{}", year, month))?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(start)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(start)
    };

    let workouts = workouts_between(pool, user_id, start, end).await?;
    let mut total = 0.0;
    let mut exercise_count = 0;
    let mut by_exercise: HashMap<String, f64> = HashMap::new();
    for w in &workouts {
        total += w.total_volume_kg.unwrap_or(0.0);
        for we in workout_exercises(pool, w.id).await? {
            exercise_count += 1;
            let name = get_exercise(pool, we.exercise_id).await?.name;
            *by_exercise.entry(name).or_insert(0.0) += we.volume_kg.unwrap_or(0.0);
        }
    }

    let records_count = user_records(pool, user_id)
        .await?
        .iter()
        .filter(|r| r.achieved_at.date().year() == year && r.achieved_at.date().month() == month)
        .count();

    let mut top: Vec<(String, f64)> = by_exercise.into_iter().collect();
    top.sort_by(|a, b| b.1.total_cmp(&a.1));
    top.truncate(5);

    Ok(MonthSummary {
        workouts_count: workouts.len(),
        total_volume_kg: total,
        exercise_count,
        avg_volume_per_workout: if workouts.is_empty() {
            0.0
        } else {
            total / workouts.len() as f64
        },
        records_count,
        top_exercises: top,
    })
}

pub const MOTIVATION_PHRASES: &[&str] = &[
    "Strong work",
    "Champion stuff",
    "That is real progress",
    "Keep it rolling",
    "Machine mode",
    "Great session",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotivationLevel {
    NewRecord,
    StrongWorkout,
    WeeklyProgress,
    Steady,
}

pub fn random_phrase() -> &'static str {
    let idx = rand::rng().random_range(0..MOTIVATION_PHRASES.len());
    MOTIVATION_PHRASES[idx]
}

/// Classifies a finished workout for the motivation message: a new record
/// wins; otherwise beating 1.05x the rolling average of the last 20
/// workouts, then a week-over-week gain of at least 10%.
pub async fn motivation_level(
    pool: &SqlitePool,
    user_id: i64,
    total_volume: f64,
    had_records: bool,
    today: NaiveDate,
) -> Result<MotivationLevel> {
    if had_records {
        return Ok(MotivationLevel::NewRecord);
    }
    if total_volume > 0.0 {
        let recent = user_workouts(pool, user_id, 20).await?;
        let volumes: Vec<f64> = recent.iter().filter_map(|w| w.total_volume_kg).collect();
        if !volumes.is_empty() {
            let avg = volumes.iter().sum::<f64>() / volumes.len() as f64;
            if total_volume > avg * 1.05 {
                return Ok(MotivationLevel::StrongWorkout);
            }
        }
        let week = week_comparison(pool, user_id, today).await?;
        if week.percent_delta >= 10.0 {
            return Ok(MotivationLevel::WeeklyProgress);
        }
    }
    Ok(MotivationLevel::Steady)
}

/// Total volume of a slice of sets, warmup flag ignored.
pub fn sets_volume(sets: &[SetRow]) -> f64 {
    sets.iter().map(SetRow::volume).sum()
}
