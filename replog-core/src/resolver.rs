//! Fuzzy matching of a freeform exercise name against the catalog.
//!
//! Tiered substring scoring, not edit distance. The confidence bands that
//! drive session behavior (auto-accept / disambiguate / offer-new) belong
//! to the session layer; this module only scores.

use serde::{Deserialize, Serialize};

use crate::db::models::ExerciseDefinition;

pub const CONFIDENCE_AUTO_ACCEPT: f64 = 0.9;
pub const CONFIDENCE_DISAMBIGUATE: f64 = 0.6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alternative {
    pub exercise_id: i64,
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// Canonical name of the best match, or the query itself when nothing
    /// matched.
    pub name: String,
    pub exercise_id: Option<i64>,
    pub confidence: f64,
    /// Up to 5 further candidates, best first.
    pub alternatives: Vec<Alternative>,
}

impl Resolution {
    fn miss(query: &str) -> Self {
        Self {
            name: query.to_string(),
            exercise_id: None,
            confidence: 0.0,
            alternatives: Vec::new(),
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn contains_either(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

/// Scores one catalog entry against the normalized query. Tiers:
/// exact name/alt 1.0, substring vs name 0.9, substring vs alt name 0.85,
/// substring vs any synonym 0.8.
fn score(query: &str, exercise: &ExerciseDefinition) -> Option<f64> {
    let name = normalize(&exercise.name);
    let alt = exercise.name_alt.as_deref().map(normalize).unwrap_or_default();

    if query == name || (!alt.is_empty() && query == alt) {
        return Some(1.0);
    }
    if contains_either(query, &name) {
        return Some(0.9);
    }
    if contains_either(query, &alt) {
        return Some(0.85);
    }
    for synonym in exercise.synonyms() {
        if contains_either(query, &normalize(&synonym)) {
            return Some(0.8);
        }
    }
    None
}

/// Resolves a candidate name against the catalog slice. Ties keep catalog
/// order, so results are deterministic for a fixed catalog.
pub fn resolve(candidate_name: &str, catalog: &[ExerciseDefinition]) -> Resolution {
    let query = normalize(candidate_name);
    if query.is_empty() || catalog.is_empty() {
        return Resolution::miss(candidate_name);
    }

    let mut candidates: Vec<Alternative> = catalog
        .iter()
        .filter_map(|ex| {
            score(&query, ex).map(|confidence| Alternative {
                exercise_id: ex.id,
                name: ex.name.clone(),
                confidence,
            })
        })
        .collect();

    if candidates.is_empty() {
        return Resolution::miss(candidate_name);
    }

    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let best = candidates.remove(0);
    candidates.truncate(5);

    // An exact hit needs no disambiguation.
    let alternatives = if best.confidence >= 1.0 {
        Vec::new()
    } else {
        candidates
    };

    Resolution {
        name: best.name,
        exercise_id: Some(best.exercise_id),
        confidence: best.confidence,
        alternatives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ex(id: i64, name: &str, alt: Option<&str>, synonyms: &[&str]) -> ExerciseDefinition {
        ExerciseDefinition {
            id,
            name: name.to_string(),
            name_alt: alt.map(str::to_string),
            synonyms: serde_json::to_string(synonyms).unwrap(),
            muscle_groups: "[]".to_string(),
            equipment: None,
            category: "strength".to_string(),
            is_custom: false,
            created_by: None,
            created_at: NaiveDateTime::default(),
        }
    }

    fn catalog() -> Vec<ExerciseDefinition> {
        vec![
            ex(1, "Bench Press", Some("Barbell Bench Press"), &["bench", "flat bench"]),
            ex(2, "Incline Dumbbell Press", None, &["incline press"]),
            ex(3, "Back Squat", Some("Barbell Squat"), &["squat"]),
            ex(4, "Overhead Press", Some("Military Press"), &["ohp"]),
        ]
    }

    #[test]
    fn exact_match_is_certain_with_no_alternatives() {
        let res = resolve("Bench Press", &catalog());
        assert_eq!(res.confidence, 1.0);
        assert_eq!(res.exercise_id, Some(1));
        assert!(res.alternatives.is_empty());
    }

    #[test]
    fn exact_alt_name_match_is_certain() {
        let res = resolve("military press", &catalog());
        assert_eq!(res.confidence, 1.0);
        assert_eq!(res.name, "Overhead Press");
    }

    #[test]
    fn substring_of_name_scores_point_nine() {
        let res = resolve("bench press", &catalog());
        assert_eq!(res.confidence, 1.0);
        let res = resolve("incline dumbbell", &catalog());
        assert_eq!(res.confidence, 0.9);
        assert_eq!(res.name, "Incline Dumbbell Press");
    }

    #[test]
    fn synonym_match_scores_point_eight() {
        let res = resolve("ohp", &catalog());
        assert_eq!(res.confidence, 0.8);
        assert_eq!(res.name, "Overhead Press");
    }

    #[test]
    fn ambiguous_query_collects_ranked_alternatives() {
        // "press" is a substring of three names.
        let res = resolve("press", &catalog());
        assert_eq!(res.confidence, 0.9);
        assert!(!res.alternatives.is_empty());
        assert!(res.alternatives.len() <= 5);
        for pair in res.alternatives.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn no_match_yields_zero_confidence() {
        let res = resolve("zumba", &catalog());
        assert_eq!(res.confidence, 0.0);
        assert_eq!(res.exercise_id, None);
        assert!(res.alternatives.is_empty());

        assert_eq!(resolve("", &catalog()).confidence, 0.0);
        assert_eq!(resolve("bench", &[]).confidence, 0.0);
    }

    #[test]
    fn whitespace_and_case_are_normalized() {
        let res = resolve("  BACK   squat ", &catalog());
        assert_eq!(res.confidence, 1.0);
        assert_eq!(res.exercise_id, Some(3));
    }
}
