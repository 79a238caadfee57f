use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;

use crate::db::models::{Exam, ExamRow, Versioned};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("exam {0} already exists")]
    AlreadyExists(String),
    #[error("exam store lock poisoned")]
    Poisoned,
}

/// Result of a compare-and-swap write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplaceOutcome {
    Written { version: i64 },
    VersionMismatch,
}

/// Versioned persistence of whole exam aggregates.
#[async_trait]
pub(crate) trait ExamStore: Send + Sync {
    async fn load(&self, exam_id: &str) -> Result<Option<Versioned<Exam>>, StoreError>;

    async fn insert(&self, exam: &Exam) -> Result<i64, StoreError>;

    /// Writes `exam` only if the stored version still equals `expected_version`.
    async fn replace(
        &self,
        exam: &Exam,
        expected_version: i64,
    ) -> Result<ReplaceOutcome, StoreError>;

    async fn health(&self) -> Result<(), StoreError>;
}

pub(crate) struct PgExamStore {
    pool: PgPool,
}

impl PgExamStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamStore for PgExamStore {
    async fn load(&self, exam_id: &str) -> Result<Option<Versioned<Exam>>, StoreError> {
        let row = sqlx::query_as::<_, ExamRow>(
            "SELECT id, version, document FROM exam_aggregates WHERE id = $1",
        )
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            tracing::trace!(exam_id = %row.id, version = row.version, "Loaded exam aggregate");
            Versioned { value: row.document.0, version: row.version }
        }))
    }

    async fn insert(&self, exam: &Exam) -> Result<i64, StoreError> {
        let now = OffsetDateTime::now_utc();
        let result = sqlx::query(
            "INSERT INTO exam_aggregates (id, version, document, created_at, updated_at) \
             VALUES ($1, 1, $2, $3, $3) ON CONFLICT (id) DO NOTHING",
        )
        .bind(&exam.id)
        .bind(Json(exam))
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(exam.id.clone()));
        }
        Ok(1)
    }

    async fn replace(
        &self,
        exam: &Exam,
        expected_version: i64,
    ) -> Result<ReplaceOutcome, StoreError> {
        let result = sqlx::query(
            "UPDATE exam_aggregates SET document = $1, version = version + 1, updated_at = $2 \
             WHERE id = $3 AND version = $4",
        )
        .bind(Json(exam))
        .bind(OffsetDateTime::now_utc())
        .bind(&exam.id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(ReplaceOutcome::VersionMismatch);
        }
        Ok(ReplaceOutcome::Written { version: expected_version + 1 })
    }

    async fn health(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Process-local store with the same compare-and-swap contract as Postgres.
#[derive(Default)]
pub(crate) struct MemoryExamStore {
    exams: RwLock<HashMap<String, Versioned<Exam>>>,
}

impl MemoryExamStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExamStore for MemoryExamStore {
    async fn load(&self, exam_id: &str) -> Result<Option<Versioned<Exam>>, StoreError> {
        let exams = self.exams.read().map_err(|_| StoreError::Poisoned)?;
        Ok(exams.get(exam_id).cloned())
    }

    async fn insert(&self, exam: &Exam) -> Result<i64, StoreError> {
        let mut exams = self.exams.write().map_err(|_| StoreError::Poisoned)?;
        if exams.contains_key(&exam.id) {
            return Err(StoreError::AlreadyExists(exam.id.clone()));
        }
        exams.insert(exam.id.clone(), Versioned { value: exam.clone(), version: 1 });
        Ok(1)
    }

    async fn replace(
        &self,
        exam: &Exam,
        expected_version: i64,
    ) -> Result<ReplaceOutcome, StoreError> {
        let mut exams = self.exams.write().map_err(|_| StoreError::Poisoned)?;
        match exams.get_mut(&exam.id) {
            Some(stored) if stored.version == expected_version => {
                stored.value = exam.clone();
                stored.version += 1;
                Ok(ReplaceOutcome::Written { version: stored.version })
            }
            _ => Ok(ReplaceOutcome::VersionMismatch),
        }
    }

    async fn health(&self) -> Result<(), StoreError> {
        self.exams.read().map(|_| ()).map_err(|_| StoreError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn memory_replace_rejects_stale_version() {
        let store = MemoryExamStore::new();
        let exam = test_support::scenario_exam("exam-1", false);
        store.insert(&exam).await.expect("insert");

        let mut first = store.load("exam-1").await.unwrap().expect("stored");
        let second = store.load("exam-1").await.unwrap().expect("stored");

        first.value.title = "Renamed".to_string();
        let outcome = store.replace(&first.value, first.version).await.unwrap();
        assert_eq!(outcome, ReplaceOutcome::Written { version: 2 });

        let stale = store.replace(&second.value, second.version).await.unwrap();
        assert_eq!(stale, ReplaceOutcome::VersionMismatch);

        let current = store.load("exam-1").await.unwrap().expect("stored");
        assert_eq!(current.version, 2);
        assert_eq!(current.value.title, "Renamed");
    }

    #[tokio::test]
    async fn memory_insert_rejects_duplicates() {
        let store = MemoryExamStore::new();
        let exam = test_support::scenario_exam("exam-1", false);
        store.insert(&exam).await.expect("insert");

        let err = store.insert(&exam).await.expect_err("duplicate");
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == "exam-1"));
    }

    #[tokio::test]
    async fn memory_replace_of_unknown_exam_is_mismatch() {
        let store = MemoryExamStore::new();
        let exam = test_support::scenario_exam("missing", false);
        let outcome = store.replace(&exam, 1).await.unwrap();
        assert_eq!(outcome, ReplaceOutcome::VersionMismatch);
    }
}
