//! Interface to the external Language Understanding Service.
//!
//! The core never runs NLP itself: it receives already-parsed candidate
//! exercises and sets. This module holds the message types, kilogram
//! normalization, and a pluggable backend. Only the mock backend ships
//! with the crate; a real service plugs in behind the same call.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

pub const KG_PER_LB: f64 = 0.453592;

/// Words in a set comment or unit that mark a duration-based (cardio)
/// entry rather than a missing weight.
const DURATION_MARKERS: &[&str] = &["min", "minute", "minutes", "мин", "минут", "sec", "seconds"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionHint {
    #[default]
    AddSets,
    RemoveLast,
    EditLast,
    AddComment,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedSet {
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    /// Weight unit as reported ("kg", "lb"); kilograms when absent.
    pub unit: Option<String>,
    pub comment: Option<String>,
    #[serde(default)]
    pub warmup: bool,
}

impl ParsedSet {
    /// Reported weight converted to kilograms.
    pub fn weight_kg(&self) -> Option<f64> {
        self.weight.map(|w| convert_to_kg(w, self.unit.as_deref()))
    }

    pub fn has_duration_signal(&self) -> bool {
        let mentions = |text: &str| {
            let lower = text.to_lowercase();
            DURATION_MARKERS.iter().any(|m| lower.contains(m))
        };
        self.comment.as_deref().map(mentions).unwrap_or(false)
            || self.unit.as_deref().map(mentions).unwrap_or(false)
    }

    /// A set is usable when it carries reps, a weight, or a duration.
    pub fn has_signal(&self) -> bool {
        self.reps.is_some() || self.weight.is_some() || self.has_duration_signal()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedExercise {
    pub name: String,
    pub sets: Vec<ParsedSet>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// One parsed user message, as delivered by the upstream service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedMessage {
    #[serde(default)]
    pub exercises: Vec<ParsedExercise>,
    #[serde(default)]
    pub workout_comment: Option<String>,
    #[serde(default)]
    pub confidence_hint: Option<f64>,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarification_prompt: Option<String>,
    #[serde(default)]
    pub action: ActionHint,
}

/// Session context forwarded to the service with each parse call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseContext {
    pub user_id: i64,
    pub workout_id: Option<i64>,
    pub known_exercises: Vec<String>,
}

pub fn convert_to_kg(weight: f64, unit: Option<&str>) -> f64 {
    match unit.map(|u| u.trim().to_lowercase()) {
        Some(u) if matches!(u.as_str(), "lb" | "lbs" | "фунт" | "фунтов") => weight * KG_PER_LB,
        _ => weight,
    }
}

type MockFn = Arc<dyn Fn(&str, &ParseContext) -> String + Send + Sync>;

enum ParserBackend {
    Mock {
        responder: MockFn,
        delay: Option<Duration>,
    },
}

pub struct ParserInterface {
    backend: ParserBackend,
}

impl ParserInterface {
    /// Mock backend answering with a JSON-encoded [`ParsedMessage`].
    pub fn new_mock_fn(f: impl Fn(&str, &ParseContext) -> String + Send + Sync + 'static) -> Self {
        Self {
            backend: ParserBackend::Mock {
                responder: Arc::new(f),
                delay: None,
            },
        }
    }

    /// Mock backend that waits before answering, for timeout tests.
    pub fn new_mock_delayed(
        delay: Duration,
        f: impl Fn(&str, &ParseContext) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            backend: ParserBackend::Mock {
                responder: Arc::new(f),
                delay: Some(delay),
            },
        }
    }

    pub async fn parse(&self, raw_text: &str, context: &ParseContext) -> Result<ParsedMessage> {
        match &self.backend {
            ParserBackend::Mock { responder, delay } => {
                if let Some(d) = delay {
                    sleep(*d).await;
                }
                let reply = responder(raw_text, context);
                debug!("mock parser replied {} bytes", reply.len());
                serde_json::from_str(&reply)
                    .map_err(|e| anyhow!("malformed parser reply: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pounds_convert_to_kilograms() {
        assert!((convert_to_kg(100.0, Some("lb")) - 45.3592).abs() < 1e-9);
        assert_eq!(convert_to_kg(80.0, Some("kg")), 80.0);
        assert_eq!(convert_to_kg(80.0, None), 80.0);
    }

    #[test]
    fn duration_signal_detected_from_comment_or_unit() {
        let timed = ParsedSet {
            reps: Some(30),
            comment: Some("minutes".into()),
            ..Default::default()
        };
        assert!(timed.has_duration_signal());
        assert!(timed.has_signal());

        let blank = ParsedSet::default();
        assert!(!blank.has_signal());
    }

    #[tokio::test]
    async fn mock_backend_round_trips_json() {
        let parser = ParserInterface::new_mock_fn(|_text, _ctx| {
            r#"{"exercises":[{"name":"Bench Press","sets":[{"reps":10,"weight":80.0}]}],"confidence_hint":0.95}"#
                .to_string()
        });
        let msg = parser
            .parse("bench 10x80", &ParseContext::default())
            .await
            .unwrap();
        assert_eq!(msg.exercises.len(), 1);
        assert_eq!(msg.exercises[0].sets[0].reps, Some(10));
        assert_eq!(msg.action, ActionHint::AddSets);
    }

    #[tokio::test]
    async fn malformed_reply_is_an_error() {
        let parser = ParserInterface::new_mock_fn(|_, _| "not json".to_string());
        assert!(
            parser
                .parse("anything", &ParseContext::default())
                .await
                .is_err()
        );
    }
}
