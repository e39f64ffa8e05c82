//! In-memory view of the exercise catalog with explicit refresh/invalidate.

use anyhow::Result;
use log::debug;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::db::models::ExerciseDefinition;
use crate::db::operations::visible_exercises;

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Read-shared cache of the full exercise table. Staleness is acceptable
/// for brief windows; a session that creates a custom exercise must call
/// `invalidate` so its own next read sees the row.
pub struct ExerciseCatalog {
    pool: SqlitePool,
    cache: RwLock<Option<Vec<ExerciseDefinition>>>,
}

impl ExerciseCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            cache: RwLock::new(None),
        }
    }

    pub async fn refresh(&self) -> Result<()> {
        let all = sqlx::query_as::<_, ExerciseDefinition>("SELECT * FROM exercises ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        debug!("catalog refreshed, {} exercises", all.len());
        *self.cache.write().await = Some(all);
        Ok(())
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn ensure_loaded(&self) -> Result<()> {
        if self.cache.read().await.is_none() {
            self.refresh().await?;
        }
        Ok(())
    }

    /// Global catalog plus the user's own custom exercises, in id order.
    pub async fn all_visible_to(&self, user_id: i64) -> Result<Vec<ExerciseDefinition>> {
        self.ensure_loaded().await?;
        let guard = self.cache.read().await;
        match guard.as_ref() {
            Some(all) => Ok(all
                .iter()
                .filter(|e| !e.is_custom || e.created_by == Some(user_id))
                .cloned()
                .collect()),
            // Raced with an invalidate; read through to the store.
            None => visible_exercises(&self.pool, Some(user_id)).await,
        }
    }

    /// Exact lookup by canonical name, alternate name, or synonym.
    /// Case-insensitive, whitespace-normalized; no fuzziness here.
    pub async fn by_synonym_or_name(&self, text: &str) -> Result<Option<ExerciseDefinition>> {
        let query = normalize(text);
        if query.is_empty() {
            return Ok(None);
        }
        self.ensure_loaded().await?;
        let guard = self.cache.read().await;
        let Some(all) = guard.as_ref() else {
            return Ok(None);
        };
        Ok(all
            .iter()
            .find(|e| {
                if normalize(&e.name) == query {
                    return true;
                }
                if let Some(alt) = &e.name_alt {
                    if normalize(alt) == query {
                        return true;
                    }
                }
                e.synonyms().iter().any(|s| normalize(s) == query)
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::operations::get_or_create_custom_exercise;

    #[tokio::test]
    async fn exact_lookup_ignores_case_and_spacing() {
        let pool = db::connect_in_memory().await.unwrap();
        let catalog = ExerciseCatalog::new(pool);
        let hit = catalog.by_synonym_or_name("  bench   PRESS ").await.unwrap();
        assert_eq!(hit.unwrap().name, "Bench Press");

        let by_syn = catalog.by_synonym_or_name("flat bench").await.unwrap();
        assert_eq!(by_syn.unwrap().name, "Bench Press");

        assert!(catalog.by_synonym_or_name("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn custom_exercises_scoped_to_creator() {
        let pool = db::connect_in_memory().await.unwrap();
        crate::db::operations::get_or_create_user(&pool, 1, None)
            .await
            .unwrap();
        crate::db::operations::get_or_create_user(&pool, 2, None)
            .await
            .unwrap();
        get_or_create_custom_exercise(&pool, 1, "Sissy Squat", "strength")
            .await
            .unwrap();

        let catalog = ExerciseCatalog::new(pool);
        let mine = catalog.all_visible_to(1).await.unwrap();
        assert!(mine.iter().any(|e| e.name == "Sissy Squat"));
        let theirs = catalog.all_visible_to(2).await.unwrap();
        assert!(!theirs.iter().any(|e| e.name == "Sissy Squat"));
    }

    #[tokio::test]
    async fn invalidate_picks_up_new_rows() {
        let pool = db::connect_in_memory().await.unwrap();
        crate::db::operations::get_or_create_user(&pool, 1, None)
            .await
            .unwrap();
        let catalog = ExerciseCatalog::new(pool.clone());
        catalog.refresh().await.unwrap();

        get_or_create_custom_exercise(&pool, 1, "Zercher Squat", "strength")
            .await
            .unwrap();
        assert!(
            catalog
                .by_synonym_or_name("Zercher Squat")
                .await
                .unwrap()
                .is_none()
        );

        catalog.invalidate().await;
        assert!(
            catalog
                .by_synonym_or_name("Zercher Squat")
                .await
                .unwrap()
                .is_some()
        );
    }
}
