use std::time::Duration;

use crate::db::models::{Exam, Versioned};
use crate::repositories::exams::{ExamStore, ReplaceOutcome};
use crate::services::errors::AttemptError;

const RETRY_BACKOFF_MS: u64 = 5;

pub(crate) async fn load_exam(store: &dyn ExamStore, exam_id: &str) -> Result<Exam, AttemptError> {
    store
        .load(exam_id)
        .await?
        .map(|stored| stored.value)
        .ok_or_else(|| AttemptError::not_found("Exam not found"))
}

/// Read-modify-write of one exam aggregate under optimistic concurrency.
///
/// `apply` runs against a fresh copy on every round and may run more than once.
/// Nothing is written when it returns an error. A version mismatch reloads and
/// retries up to `max_rounds` times before surfacing `Conflict`.
pub(crate) async fn mutate_exam<T, F>(
    store: &dyn ExamStore,
    exam_id: &str,
    max_rounds: u32,
    mut apply: F,
) -> Result<T, AttemptError>
where
    F: FnMut(&mut Exam) -> Result<T, AttemptError>,
{
    for round in 1..=max_rounds {
        let Some(Versioned { value: mut exam, version }) = store.load(exam_id).await? else {
            return Err(AttemptError::not_found("Exam not found"));
        };

        let output = apply(&mut exam)?;

        match store.replace(&exam, version).await? {
            ReplaceOutcome::Written { version: new_version } => {
                tracing::debug!(exam_id, version = new_version, round, "Exam aggregate written");
                return Ok(output);
            }
            ReplaceOutcome::VersionMismatch => {
                metrics::counter!("exam_store_version_conflicts_total").increment(1);
                tracing::debug!(exam_id, version, round, "Exam version conflict, retrying");
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * round as u64)).await;
            }
        }
    }

    tracing::warn!(exam_id, retries = max_rounds, "Optimistic write retries exhausted");
    Err(AttemptError::Conflict { exam_id: exam_id.to_string(), retries: max_rounds })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::repositories::exams::{MemoryExamStore, StoreError};
    use crate::test_support;

    /// Store whose writes always lose the race.
    struct AlwaysStale {
        inner: MemoryExamStore,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl ExamStore for AlwaysStale {
        async fn load(&self, exam_id: &str) -> Result<Option<Versioned<Exam>>, StoreError> {
            self.inner.load(exam_id).await
        }

        async fn insert(&self, exam: &Exam) -> Result<i64, StoreError> {
            self.inner.insert(exam).await
        }

        async fn replace(&self, _: &Exam, _: i64) -> Result<ReplaceOutcome, StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(ReplaceOutcome::VersionMismatch)
        }

        async fn health(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn exhausted_retries_surface_conflict() {
        let store = AlwaysStale { inner: MemoryExamStore::new(), writes: AtomicUsize::new(0) };
        store.insert(&test_support::scenario_exam("exam-1", false)).await.unwrap();

        let err = mutate_exam(&store, "exam-1", 3, |exam| {
            exam.title.push('!');
            Ok(())
        })
        .await
        .expect_err("conflict");

        assert!(matches!(err, AttemptError::Conflict { retries: 3, .. }));
        assert_eq!(store.writes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_closure_does_not_write() {
        let store = MemoryExamStore::new();
        store.insert(&test_support::scenario_exam("exam-1", false)).await.unwrap();

        let err = mutate_exam(&store, "exam-1", 3, |exam| -> Result<(), AttemptError> {
            exam.title = "changed".to_string();
            Err(AttemptError::validation("nope"))
        })
        .await
        .expect_err("validation");

        assert!(matches!(err, AttemptError::Validation(_)));
        let stored = store.load("exam-1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_ne!(stored.value.title, "changed");
    }

    #[tokio::test]
    async fn concurrent_writers_all_land() {
        let store = Arc::new(MemoryExamStore::new());
        store.insert(&test_support::scenario_exam("exam-1", false)).await.unwrap();

        let mut handles = Vec::new();
        for n in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                mutate_exam(store.as_ref(), "exam-1", 50, |exam| {
                    exam.join_code.push_str(&n.to_string());
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("write");
        }

        let stored = store.load("exam-1").await.unwrap().unwrap();
        assert_eq!(stored.version, 9);
    }

    #[tokio::test]
    async fn unknown_exam_is_not_found() {
        let store = MemoryExamStore::new();
        let err = mutate_exam(&store, "nope", 3, |_| Ok(())).await.expect_err("missing");
        assert!(matches!(err, AttemptError::NotFound(_)));
    }
}
