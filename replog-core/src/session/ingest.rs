//! Text ingestion and the clarification, new-exercise, corrected-name
//! and comment sub-dialogs.
//!
//! The whole message is validated before anything is written, so an
//! unusable message never leaves a half-recorded batch behind.

use log::{debug, info};
use tokio::time::timeout;

use crate::db::models::{ExerciseCategory, ExerciseDefinition};
use crate::db::operations::{
    NewSetData, add_exercise_comment, add_workout_comment, add_workout_exercise,
    get_exercise, get_or_create_custom_exercise,
};
use crate::error::SessionError;
use crate::parser::{ActionHint, ParseContext, ParsedExercise, ParsedMessage};
use crate::resolver::{
    self, Alternative, CONFIDENCE_AUTO_ACCEPT, CONFIDENCE_DISAMBIGUATE, Resolution,
};
use crate::session::reply::Reply;
use crate::session::session::UserSession;
use crate::session::state::{PendingSets, SessionState};

/// Hard cap on clarification rounds for one unresolved name. After the
/// second failed round the fallback is always the new-exercise offer.
const MAX_CLARIFICATION_ATTEMPTS: u8 = 2;

fn pending_from(candidate: &ParsedExercise) -> PendingSets {
    let sets: Vec<NewSetData> = candidate
        .sets
        .iter()
        .filter(|s| s.has_signal())
        .map(|s| NewSetData {
            reps: s.reps,
            weight_kg: s.weight_kg(),
            comment: s.comment.clone(),
            is_warmup: s.warmup,
        })
        .collect();
    let duration_based = candidate.sets.iter().all(|s| s.weight.is_none())
        && candidate.sets.iter().any(|s| s.has_duration_signal());
    PendingSets {
        sets,
        duration_based,
    }
}

/// Best match and runners-up as one ranked list for a clarification
/// prompt.
fn ranked_alternatives(resolution: &Resolution) -> Vec<Alternative> {
    let mut out = Vec::with_capacity(resolution.alternatives.len() + 1);
    if let Some(id) = resolution.exercise_id {
        out.push(Alternative {
            exercise_id: id,
            name: resolution.name.clone(),
            confidence: resolution.confidence,
        });
    }
    out.extend(resolution.alternatives.iter().cloned());
    out
}

impl UserSession {
    /// Entry point for freeform user text. Dispatches on the current
    /// state: plain active text goes through the parser, text during a
    /// sub-dialog answers that sub-dialog.
    pub async fn handle_text(&self, text: &str) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        match state.clone() {
            SessionState::Idle => Err(SessionError::NoActiveWorkout),
            SessionState::Active { workout_id } => {
                self.ingest_message(&mut state, workout_id, text).await
            }
            SessionState::AwaitingClarification { .. } => {
                self.clarify_retype_locked(&mut state, text).await
            }
            // Free text while the offer stands just repeats the offer;
            // only confirm/decline resolve it.
            SessionState::AwaitingNewExercise { name, .. } => {
                Ok(Reply::OfferNewExercise { name })
            }
            SessionState::AwaitingName { .. } => self.submit_name_locked(&mut state, text).await,
            SessionState::AwaitingComment { .. } => {
                self.submit_comment_locked(&mut state, text).await
            }
        }
    }

    async fn ingest_message(
        &self,
        state: &mut SessionState,
        workout_id: i64,
        text: &str,
    ) -> Result<Reply, SessionError> {
        let catalog = self.catalog.all_visible_to(self.user_id).await?;
        let context = ParseContext {
            user_id: self.user_id,
            workout_id: Some(workout_id),
            known_exercises: catalog.iter().map(|e| e.name.clone()).collect(),
        };
        let parsed = match timeout(self.parse_timeout, self.parser.parse(text, &context)).await {
            Err(_) => return Err(SessionError::UpstreamTimeout),
            Ok(Err(e)) => return Err(SessionError::Upstream(e.to_string())),
            Ok(Ok(parsed)) => parsed,
        };

        if parsed.needs_clarification {
            return Ok(match parsed.clarification_prompt {
                Some(prompt) => Reply::ClarificationPassThrough { prompt },
                None => Reply::AskRephrase,
            });
        }

        match parsed.action {
            ActionHint::RemoveLast => self.delete_last_set_locked(state).await,
            ActionHint::EditLast => self.edit_last_locked(state).await,
            ActionHint::AddComment => match parsed.workout_comment.as_deref() {
                Some(comment) => {
                    add_workout_comment(&self.pool, workout_id, comment).await?;
                    Ok(Reply::CommentSaved)
                }
                None => self.request_comment_locked(state).await,
            },
            ActionHint::AddSets => self.ingest_sets(state, workout_id, &catalog, parsed).await,
        }
    }

    /// Records the parsed exercise batches, pausing at the first name the
    /// resolver is not confident about. Exercises after a paused one are
    /// dropped; the user re-sends them after the clarification settles.
    async fn ingest_sets(
        &self,
        state: &mut SessionState,
        workout_id: i64,
        catalog: &[ExerciseDefinition],
        parsed: ParsedMessage,
    ) -> Result<Reply, SessionError> {
        if parsed.exercises.is_empty() {
            return match parsed.workout_comment.as_deref() {
                Some(comment) => {
                    add_workout_comment(&self.pool, workout_id, comment).await?;
                    Ok(Reply::CommentSaved)
                }
                None => Err(SessionError::Unparseable),
            };
        }
        // Whole-message validation before any write.
        if parsed
            .exercises
            .iter()
            .any(|ex| !ex.sets.iter().any(|s| s.has_signal()))
        {
            return Err(SessionError::Unparseable);
        }
        if let Some(comment) = parsed.workout_comment.as_deref() {
            add_workout_comment(&self.pool, workout_id, comment).await?;
        }

        let mut last_reply = None;
        for candidate in &parsed.exercises {
            let pending = pending_from(candidate);
            let resolution = resolver::resolve(&candidate.name, catalog);
            debug!(
                "resolved '{}' to '{}' at {:.2}",
                candidate.name, resolution.name, resolution.confidence
            );

            if resolution.confidence >= CONFIDENCE_AUTO_ACCEPT {
                let exercise = catalog
                    .iter()
                    .find(|e| Some(e.id) == resolution.exercise_id)
                    .ok_or_else(|| {
                        SessionError::Invariant("resolver returned an unknown exercise".into())
                    })?;
                let reply = self
                    .persist_batch(
                        workout_id,
                        exercise,
                        &pending,
                        candidate.comment.as_deref(),
                        false,
                    )
                    .await?;
                last_reply = Some(reply);
            } else if resolution.confidence >= CONFIDENCE_DISAMBIGUATE {
                let alternatives = ranked_alternatives(&resolution);
                *state = SessionState::AwaitingClarification {
                    workout_id,
                    original_name: candidate.name.clone(),
                    pending,
                    alternatives: alternatives.clone(),
                    attempts: 1,
                };
                return Ok(Reply::Clarify {
                    original_name: candidate.name.clone(),
                    alternatives,
                    attempt: 1,
                });
            } else {
                *state = SessionState::AwaitingNewExercise {
                    workout_id,
                    name: candidate.name.clone(),
                    pending,
                };
                return Ok(Reply::OfferNewExercise {
                    name: candidate.name.clone(),
                });
            }
        }
        last_reply.ok_or(SessionError::Unparseable)
    }

    /// The user picked one of the offered alternatives.
    pub async fn pick_alternative(&self, exercise_id: i64) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        let SessionState::AwaitingClarification {
            workout_id,
            pending,
            alternatives,
            ..
        } = state.clone()
        else {
            return Err(SessionError::Invariant(
                "no clarification in progress".to_string(),
            ));
        };
        if !alternatives.iter().any(|a| a.exercise_id == exercise_id) {
            return Err(SessionError::Invariant(
                "picked exercise was not offered".to_string(),
            ));
        }
        let exercise = get_exercise(&self.pool, exercise_id).await?;
        let reply = self
            .persist_batch(workout_id, &exercise, &pending, None, false)
            .await?;
        *state = SessionState::Active { workout_id };
        Ok(reply)
    }

    /// The user rejected every offered alternative. One retype round is
    /// granted; after the cap the new-exercise offer is the only way out.
    pub async fn reject_alternatives(&self) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        let SessionState::AwaitingClarification {
            workout_id,
            original_name,
            pending,
            alternatives,
            attempts,
        } = state.clone()
        else {
            return Err(SessionError::Invariant(
                "no clarification in progress".to_string(),
            ));
        };
        if attempts < MAX_CLARIFICATION_ATTEMPTS {
            *state = SessionState::AwaitingClarification {
                workout_id,
                original_name,
                pending,
                alternatives,
                attempts: attempts + 1,
            };
            Ok(Reply::AskRetypeName)
        } else {
            *state = SessionState::AwaitingNewExercise {
                workout_id,
                name: original_name.clone(),
                pending,
            };
            Ok(Reply::OfferNewExercise {
                name: original_name,
            })
        }
    }

    /// Freeform text during clarification is treated as a retyped name.
    async fn clarify_retype_locked(
        &self,
        state: &mut SessionState,
        text: &str,
    ) -> Result<Reply, SessionError> {
        let SessionState::AwaitingClarification {
            workout_id,
            pending,
            attempts,
            ..
        } = state.clone()
        else {
            return Err(SessionError::Invariant(
                "no clarification in progress".to_string(),
            ));
        };
        let catalog = self.catalog.all_visible_to(self.user_id).await?;
        let resolution = resolver::resolve(text, &catalog);

        if resolution.confidence >= CONFIDENCE_AUTO_ACCEPT {
            let exercise = catalog
                .iter()
                .find(|e| Some(e.id) == resolution.exercise_id)
                .ok_or_else(|| {
                    SessionError::Invariant("resolver returned an unknown exercise".into())
                })?;
            let reply = self
                .persist_batch(workout_id, exercise, &pending, None, false)
                .await?;
            *state = SessionState::Active { workout_id };
            return Ok(reply);
        }
        if resolution.confidence >= CONFIDENCE_DISAMBIGUATE
            && attempts < MAX_CLARIFICATION_ATTEMPTS
        {
            let attempt = attempts + 1;
            let alternatives = ranked_alternatives(&resolution);
            *state = SessionState::AwaitingClarification {
                workout_id,
                original_name: text.to_string(),
                pending,
                alternatives: alternatives.clone(),
                attempts: attempt,
            };
            return Ok(Reply::Clarify {
                original_name: text.to_string(),
                alternatives,
                attempt,
            });
        }
        *state = SessionState::AwaitingNewExercise {
            workout_id,
            name: text.to_string(),
            pending,
        };
        Ok(Reply::OfferNewExercise {
            name: text.to_string(),
        })
    }

    /// Accepts the offer: the name becomes a custom exercise scoped to
    /// this user and the pending sets are recorded under it.
    pub async fn confirm_new_exercise(&self) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        let SessionState::AwaitingNewExercise {
            workout_id,
            name,
            pending,
        } = state.clone()
        else {
            return Err(SessionError::Invariant(
                "no new-exercise offer in progress".to_string(),
            ));
        };
        let category = if pending.duration_based {
            "cardio"
        } else {
            "strength"
        };
        let exercise =
            get_or_create_custom_exercise(&self.pool, self.user_id, name.trim(), category).await?;
        self.catalog.invalidate().await;
        info!(
            "user {} added custom exercise '{}' ({})",
            self.user_id, exercise.name, category
        );
        let reply = self
            .persist_batch(workout_id, &exercise, &pending, None, true)
            .await?;
        *state = SessionState::Active { workout_id };
        Ok(reply)
    }

    /// Declines the offer; the pending sets are dropped.
    pub async fn decline_new_exercise(&self) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        let SessionState::AwaitingNewExercise { workout_id, .. } = state.clone() else {
            return Err(SessionError::Invariant(
                "no new-exercise offer in progress".to_string(),
            ));
        };
        *state = SessionState::Active { workout_id };
        Ok(Reply::NewExerciseDeclined)
    }

    /// Corrected name after `edit_last`. A reasonable match wins; with no
    /// match at all the name becomes a custom exercise rather than
    /// looping another dialog.
    pub async fn submit_name(&self, text: &str) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        self.submit_name_locked(&mut state, text).await
    }

    async fn submit_name_locked(
        &self,
        state: &mut SessionState,
        text: &str,
    ) -> Result<Reply, SessionError> {
        let SessionState::AwaitingName {
            workout_id,
            pending,
        } = state.clone()
        else {
            return Err(SessionError::Invariant(
                "no name correction in progress".to_string(),
            ));
        };
        let catalog = self.catalog.all_visible_to(self.user_id).await?;
        let resolution = resolver::resolve(text, &catalog);

        let (exercise, created) = if resolution.confidence >= CONFIDENCE_DISAMBIGUATE {
            let exercise = catalog
                .iter()
                .find(|e| Some(e.id) == resolution.exercise_id)
                .cloned()
                .ok_or_else(|| {
                    SessionError::Invariant("resolver returned an unknown exercise".into())
                })?;
            (exercise, false)
        } else {
            let category = if pending.duration_based {
                "cardio"
            } else {
                "strength"
            };
            let exercise =
                get_or_create_custom_exercise(&self.pool, self.user_id, text.trim(), category)
                    .await?;
            self.catalog.invalidate().await;
            (exercise, true)
        };
        let reply = self
            .persist_batch(workout_id, &exercise, &pending, None, created)
            .await?;
        *state = SessionState::Active { workout_id };
        Ok(reply)
    }

    pub async fn submit_comment(&self, text: &str) -> Result<Reply, SessionError> {
        let mut state = self.state.lock().await;
        self.submit_comment_locked(&mut state, text).await
    }

    async fn submit_comment_locked(
        &self,
        state: &mut SessionState,
        text: &str,
    ) -> Result<Reply, SessionError> {
        let SessionState::AwaitingComment {
            workout_id,
            workout_exercise_id,
        } = state.clone()
        else {
            return Err(SessionError::Invariant(
                "no comment prompt in progress".to_string(),
            ));
        };
        add_exercise_comment(&self.pool, workout_exercise_id, text.trim()).await?;
        *state = SessionState::Active { workout_id };
        Ok(Reply::CommentSaved)
    }

    async fn persist_batch(
        &self,
        workout_id: i64,
        exercise: &ExerciseDefinition,
        pending: &PendingSets,
        comment: Option<&str>,
        created_exercise: bool,
    ) -> Result<Reply, SessionError> {
        let duration_based =
            exercise.category() == ExerciseCategory::Cardio || pending.duration_based;
        let we = add_workout_exercise(&self.pool, workout_id, exercise.id, &pending.sets, comment)
            .await?;
        info!(
            "user {} recorded {} sets of {} in workout {}",
            self.user_id,
            pending.sets.len(),
            exercise.name,
            workout_id
        );
        Ok(Reply::SetsRecorded {
            exercise_name: exercise.name.clone(),
            set_count: pending.sets.len(),
            volume_kg: we.volume_kg,
            duration_based,
            created_exercise,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use sqlx::SqlitePool;

    use crate::db;
    use crate::db::models::RecordKind;
    use crate::db::operations::{get_workout, workout_exercises};
    use crate::error::SessionError;
    use crate::parser::{ActionHint, ParsedExercise, ParsedMessage, ParsedSet, ParserInterface};
    use crate::session::reply::Reply;
    use crate::session::session::SessionManager;
    use crate::session::state::{SessionState, StartPolicy};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 28).unwrap()
    }

    fn set(reps: i64, weight: f64) -> ParsedSet {
        ParsedSet {
            reps: Some(reps),
            weight: Some(weight),
            ..Default::default()
        }
    }

    fn message_with(name: &str, sets: Vec<ParsedSet>) -> String {
        let msg = ParsedMessage {
            exercises: vec![ParsedExercise {
                name: name.to_string(),
                sets,
                comment: None,
            }],
            ..Default::default()
        };
        serde_json::to_string(&msg).unwrap()
    }

    async fn pool() -> SqlitePool {
        let _ = env_logger::builder().is_test(true).try_init();
        db::connect_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn bench_press_end_to_end_with_records() {
        let parser = ParserInterface::new_mock_fn(|_, _| {
            message_with("Bench Press", vec![set(10, 80.0), set(8, 85.0)])
        });
        let mgr = SessionManager::new(pool().await, parser);
        let session = mgr.session(1, Some("lifter")).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();

        let reply = session.handle_text("bench 10x80 8x85").await.unwrap();
        let Reply::SetsRecorded {
            exercise_name,
            set_count,
            volume_kg,
            duration_based,
            created_exercise,
        } = reply
        else {
            panic!("expected SetsRecorded, got {:?}", reply);
        };
        assert_eq!(exercise_name, "Bench Press");
        assert_eq!(set_count, 2);
        assert_eq!(volume_kg, Some(1480.0));
        assert!(!duration_based);
        assert!(!created_exercise);

        let reply = session.finish_on(day()).await.unwrap();
        let Reply::Finished {
            summary,
            new_records,
            ..
        } = reply
        else {
            panic!("expected Finished");
        };
        assert_eq!(summary.total_volume_kg, 1480.0);
        assert_eq!(summary.set_count, 2);
        assert_eq!(new_records.len(), 3);
        assert!(
            new_records
                .iter()
                .any(|r| r.kind == RecordKind::MaxWeight && r.value == 85.0)
        );
        assert!(
            new_records
                .iter()
                .any(|r| r.kind == RecordKind::MaxVolume && r.value == 1480.0)
        );
        assert!(matches!(session.state().await, SessionState::Idle));
    }

    #[tokio::test]
    async fn clarification_is_capped_at_two_rounds() {
        // "chest press" only hits a Bench Press synonym, which lands in
        // the disambiguation band.
        let parser =
            ParserInterface::new_mock_fn(|_, _| message_with("chest press", vec![set(5, 100.0)]));
        let mgr = SessionManager::new(pool().await, parser);
        let session = mgr.session(1, None).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();

        let reply = session.handle_text("chest press 5x100").await.unwrap();
        assert!(matches!(reply, Reply::Clarify { attempt: 1, .. }));

        let reply = session.reject_alternatives().await.unwrap();
        assert!(matches!(reply, Reply::AskRetypeName));

        // A second failed round falls through to the offer; there is
        // never a third list of alternatives.
        let reply = session.handle_text("chezt pres").await.unwrap();
        let Reply::OfferNewExercise { name } = reply else {
            panic!("expected OfferNewExercise");
        };
        assert_eq!(name, "chezt pres");

        let reply = session.confirm_new_exercise().await.unwrap();
        let Reply::SetsRecorded {
            set_count,
            created_exercise,
            ..
        } = reply
        else {
            panic!("expected SetsRecorded");
        };
        assert_eq!(set_count, 1);
        assert!(created_exercise);
        assert!(session.state().await.is_plain_active());
    }

    #[tokio::test]
    async fn picking_an_alternative_records_the_pending_sets() {
        let parser =
            ParserInterface::new_mock_fn(|_, _| message_with("chest press", vec![set(8, 60.0)]));
        let db = pool().await;
        let mgr = SessionManager::new(db.clone(), parser);
        let session = mgr.session(1, None).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();

        let Reply::Clarify { alternatives, .. } =
            session.handle_text("chest press 8x60").await.unwrap()
        else {
            panic!("expected Clarify");
        };
        assert!(!alternatives.is_empty());

        // An id that was never offered is refused and the dialog stays.
        assert!(matches!(
            session.pick_alternative(9999).await.unwrap_err(),
            SessionError::Invariant(_)
        ));

        let reply = session
            .pick_alternative(alternatives[0].exercise_id)
            .await
            .unwrap();
        let Reply::SetsRecorded {
            volume_kg,
            created_exercise,
            ..
        } = reply
        else {
            panic!("expected SetsRecorded");
        };
        assert_eq!(volume_kg, Some(480.0));
        assert!(!created_exercise);
        assert!(session.state().await.is_plain_active());
    }

    #[tokio::test]
    async fn declining_the_offer_drops_the_pending_sets() {
        let parser =
            ParserInterface::new_mock_fn(|_, _| message_with("zumba dance", vec![set(1, 0.0)]));
        let db = pool().await;
        let mgr = SessionManager::new(db.clone(), parser);
        let session = mgr.session(1, None).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();
        let workout_id = session.workout_id().await.unwrap();

        let reply = session.handle_text("zumba dance").await.unwrap();
        assert!(matches!(reply, Reply::OfferNewExercise { .. }));

        let reply = session.decline_new_exercise().await.unwrap();
        assert!(matches!(reply, Reply::NewExerciseDeclined));
        assert!(
            workout_exercises(&db, workout_id)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(session.state().await.is_plain_active());
    }

    #[tokio::test]
    async fn empty_signal_is_rejected_without_touching_the_store() {
        let parser = ParserInterface::new_mock_fn(|_, _| {
            message_with("Bench Press", vec![ParsedSet::default()])
        });
        let db = pool().await;
        let mgr = SessionManager::new(db.clone(), parser);
        let session = mgr.session(1, None).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();
        let workout_id = session.workout_id().await.unwrap();

        let err = session.handle_text("did some stuff").await.unwrap_err();
        assert!(matches!(err, SessionError::Unparseable));
        assert!(err.is_recoverable());
        assert!(
            workout_exercises(&db, workout_id)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(session.state().await.is_plain_active());
    }

    #[tokio::test]
    async fn parse_timeout_leaves_state_unchanged() {
        let parser = ParserInterface::new_mock_delayed(Duration::from_millis(200), |_, _| {
            message_with("Bench Press", vec![set(5, 60.0)])
        });
        let mgr =
            SessionManager::new(pool().await, parser).with_parse_timeout(Duration::from_millis(20));
        let session = mgr.session(1, None).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();

        let err = session.handle_text("bench 5x60").await.unwrap_err();
        assert!(matches!(err, SessionError::UpstreamTimeout));
        assert!(session.state().await.is_plain_active());
    }

    #[tokio::test]
    async fn text_without_a_workout_is_refused() {
        let parser = ParserInterface::new_mock_fn(|_, _| "{}".to_string());
        let mgr = SessionManager::new(pool().await, parser);
        let session = mgr.session(1, None).await.unwrap();
        assert!(matches!(
            session.handle_text("bench 5x60").await.unwrap_err(),
            SessionError::NoActiveWorkout
        ));
    }

    #[tokio::test]
    async fn upstream_clarification_is_passed_through() {
        let parser = ParserInterface::new_mock_fn(|_, _| {
            serde_json::to_string(&ParsedMessage {
                needs_clarification: true,
                clarification_prompt: Some("Which press did you mean?".to_string()),
                ..Default::default()
            })
            .unwrap()
        });
        let mgr = SessionManager::new(pool().await, parser);
        let session = mgr.session(1, None).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();

        let Reply::ClarificationPassThrough { prompt } =
            session.handle_text("press").await.unwrap()
        else {
            panic!("expected ClarificationPassThrough");
        };
        assert_eq!(prompt, "Which press did you mean?");
        assert!(session.state().await.is_plain_active());
    }

    #[tokio::test]
    async fn cardio_batch_is_duration_based_with_no_volume() {
        let parser = ParserInterface::new_mock_fn(|_, _| {
            message_with(
                "Treadmill Run",
                vec![ParsedSet {
                    reps: Some(30),
                    comment: Some("minutes, easy pace".to_string()),
                    ..Default::default()
                }],
            )
        });
        let mgr = SessionManager::new(pool().await, parser);
        let session = mgr.session(1, None).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();

        let Reply::SetsRecorded {
            duration_based,
            volume_kg,
            ..
        } = session.handle_text("ran 30 minutes").await.unwrap()
        else {
            panic!("expected SetsRecorded");
        };
        assert!(duration_based);
        assert_eq!(volume_kg, None);
    }

    #[tokio::test]
    async fn workout_comment_is_saved_alongside_sets() {
        let parser = ParserInterface::new_mock_fn(|_, _| {
            let msg = ParsedMessage {
                exercises: vec![ParsedExercise {
                    name: "Back Squat".to_string(),
                    sets: vec![set(5, 120.0)],
                    comment: None,
                }],
                workout_comment: Some("felt strong today".to_string()),
                ..Default::default()
            };
            serde_json::to_string(&msg).unwrap()
        });
        let db = pool().await;
        let mgr = SessionManager::new(db.clone(), parser);
        let session = mgr.session(1, None).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();
        let workout_id = session.workout_id().await.unwrap();

        let reply = session
            .handle_text("squat 5x120, felt strong today")
            .await
            .unwrap();
        assert!(matches!(reply, Reply::SetsRecorded { .. }));
        let workout = get_workout(&db, workout_id).await.unwrap().unwrap();
        assert_eq!(workout.comment.as_deref(), Some("felt strong today"));
    }

    #[tokio::test]
    async fn pounds_are_normalized_to_kilograms_at_ingest() {
        let parser = ParserInterface::new_mock_fn(|_, _| {
            message_with(
                "Bench Press",
                vec![ParsedSet {
                    reps: Some(5),
                    weight: Some(100.0),
                    unit: Some("lb".to_string()),
                    ..Default::default()
                }],
            )
        });
        let mgr = SessionManager::new(pool().await, parser);
        let session = mgr.session(1, None).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();

        let Reply::SetsRecorded { volume_kg, .. } =
            session.handle_text("bench 5x100lb").await.unwrap()
        else {
            panic!("expected SetsRecorded");
        };
        assert!((volume_kg.unwrap() - 5.0 * 45.3592).abs() < 1e-6);
    }

    #[tokio::test]
    async fn remove_last_hint_deletes_the_tail_set() {
        let parser = ParserInterface::new_mock_fn(|text, _| {
            if text.starts_with("delete") {
                serde_json::to_string(&ParsedMessage {
                    action: ActionHint::RemoveLast,
                    ..Default::default()
                })
                .unwrap()
            } else {
                message_with("Bench Press", vec![set(5, 100.0), set(5, 110.0)])
            }
        });
        let db = pool().await;
        let mgr = SessionManager::new(db.clone(), parser);
        let session = mgr.session(1, None).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();
        let workout_id = session.workout_id().await.unwrap();

        session.handle_text("bench 5x100 5x110").await.unwrap();
        let reply = session.handle_text("delete the last set").await.unwrap();
        assert!(matches!(reply, Reply::LastSetDeleted));

        let exercises = workout_exercises(&db, workout_id).await.unwrap();
        assert_eq!(exercises[0].volume_kg, Some(500.0));
    }

    #[tokio::test]
    async fn comment_hint_opens_the_comment_dialog() {
        let parser = ParserInterface::new_mock_fn(|text, _| {
            if text.starts_with("note") {
                serde_json::to_string(&ParsedMessage {
                    action: ActionHint::AddComment,
                    ..Default::default()
                })
                .unwrap()
            } else {
                message_with("Back Squat", vec![set(5, 120.0)])
            }
        });
        let db = pool().await;
        let mgr = SessionManager::new(db.clone(), parser);
        let session = mgr.session(1, None).await.unwrap();
        session
            .start_workout_on(None, StartPolicy::Continue, day())
            .await
            .unwrap();
        let workout_id = session.workout_id().await.unwrap();

        session.handle_text("squat 5x120").await.unwrap();
        let reply = session.handle_text("note").await.unwrap();
        assert!(matches!(reply, Reply::CommentPrompt));
        assert!(matches!(
            session.state().await,
            SessionState::AwaitingComment { .. }
        ));

        // The next message answers the prompt without another parse.
        let reply = session.handle_text("knees caving on the last rep").await.unwrap();
        assert!(matches!(reply, Reply::CommentSaved));
        let exercises = workout_exercises(&db, workout_id).await.unwrap();
        assert_eq!(
            exercises[0].comment.as_deref(),
            Some("knees caving on the last rep")
        );
        assert!(session.state().await.is_plain_active());
    }
}
