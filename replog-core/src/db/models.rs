use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// User identity. `id` is caller-supplied and stable (not autoincrement).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub unit_system: String,
    pub locale: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Canonical catalog entry. List columns (`synonyms`, `muscle_groups`) are
/// JSON text in SQLite; use the accessors to decode.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExerciseDefinition {
    pub id: i64,
    pub name: String,
    pub name_alt: Option<String>,
    pub synonyms: String,
    pub muscle_groups: String,
    pub equipment: Option<String>,
    pub category: String,
    pub is_custom: bool,
    pub created_by: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseCategory {
    Strength,
    Cardio,
}

impl ExerciseDefinition {
    pub fn synonyms(&self) -> Vec<String> {
        serde_json::from_str(&self.synonyms).unwrap_or_default()
    }

    pub fn muscle_groups(&self) -> Vec<String> {
        serde_json::from_str(&self.muscle_groups).unwrap_or_default()
    }

    pub fn category(&self) -> ExerciseCategory {
        if self.category == "cardio" {
            ExerciseCategory::Cardio
        } else {
            ExerciseCategory::Strength
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Program {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub exercises: String,
    pub created_at: NaiveDateTime,
}

/// Entry of a program's JSON exercise list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub exercise_id: i64,
    pub order: i64,
}

impl Program {
    pub fn entries(&self) -> Vec<ProgramEntry> {
        serde_json::from_str(&self.exercises).unwrap_or_default()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Workout {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub program_id: Option<i64>,
    pub comment: Option<String>,
    pub total_volume_kg: Option<f64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkoutExercise {
    pub id: i64,
    pub workout_id: i64,
    pub exercise_id: i64,
    pub order_num: i64,
    pub comment: Option<String>,
    pub volume_kg: Option<f64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SetRow {
    pub id: i64,
    pub workout_exercise_id: i64,
    pub set_number: i64,
    pub reps: Option<i64>,
    pub weight_kg: Option<f64>,
    pub comment: Option<String>,
    pub is_warmup: bool,
    pub created_at: NaiveDateTime,
}

impl SetRow {
    /// Volume contribution in kg; 0 when reps or weight is missing.
    pub fn volume(&self) -> f64 {
        match (self.weight_kg, self.reps) {
            (Some(w), Some(r)) => w * r as f64,
            _ => 0.0,
        }
    }
}

impl fmt::Display for SetRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.weight_kg, self.reps) {
            (Some(w), Some(r)) => write!(f, "{:.1}kg x {} reps", w, r),
            (None, Some(r)) => write!(f, "{} reps", r),
            _ => write!(f, "—"),
        }
    }
}

/// Personal-record kinds tracked per (user, exercise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    MaxWeight,
    MaxVolume,
    Max1Rm,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::MaxWeight,
        RecordKind::MaxVolume,
        RecordKind::Max1Rm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::MaxWeight => "max_weight",
            RecordKind::MaxVolume => "max_volume",
            RecordKind::Max1Rm => "max_1rm",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "max_weight" => Some(RecordKind::MaxWeight),
            "max_volume" => Some(RecordKind::MaxVolume),
            "max_1rm" => Some(RecordKind::Max1Rm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Record {
    pub id: i64,
    pub user_id: i64,
    pub exercise_id: i64,
    pub kind: String,
    pub value: f64,
    pub workout_id: Option<i64>,
    pub achieved_at: NaiveDateTime,
}

impl Record {
    pub fn kind(&self) -> Option<RecordKind> {
        RecordKind::from_str(&self.kind)
    }
}
