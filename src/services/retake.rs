use time::OffsetDateTime;

use crate::core::state::AppState;
use crate::db::models::{AuditEntry, Exam};
use crate::db::types::AuditAction;
use crate::services::aggregate::mutate_exam;
use crate::services::errors::{AttemptError, PriorAttempt};

/// Refuses a new attempt when retakes are off and a completed one exists.
pub(crate) fn ensure_may_start(exam: &Exam, student_id: &str) -> Result<(), AttemptError> {
    if exam.options.allow_retakes {
        return Ok(());
    }

    match exam.latest_completed_attempt(student_id) {
        Some(prior) => Err(AttemptError::StateConflict {
            message: "You have already completed this exam and retakes are not allowed"
                .to_string(),
            prior: Some(PriorAttempt {
                attempt_number: prior.attempt_number,
                existing_score: prior.score.actual().map(|score| score.score).unwrap_or(0.0),
                submitted_at: prior.submitted_at,
            }),
        }),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResetOutcome {
    pub(crate) removed: usize,
}

/// Purges every attempt of `student_id` so the retake check passes again.
pub(crate) fn reset_attempts(
    exam: &mut Exam,
    student_id: &str,
    admin_id: &str,
    reason: &str,
    now: OffsetDateTime,
) -> Result<ResetOutcome, AttemptError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AttemptError::validation("A reason is required to reset attempts"));
    }

    let before = exam.attempts.len();
    exam.attempts.retain(|attempt| attempt.student_id != student_id);
    let removed = before - exam.attempts.len();
    if removed == 0 {
        return Err(AttemptError::not_found("No attempts found for this student"));
    }

    exam.audit_log.push(AuditEntry {
        action: AuditAction::ResetAttempts,
        actor: admin_id.to_string(),
        student_id: Some(student_id.to_string()),
        detail: format!("removed {removed} attempt(s): {reason}"),
        at: now,
    });

    Ok(ResetOutcome { removed })
}

pub(crate) async fn reset(
    state: &AppState,
    exam_id: &str,
    student_id: &str,
    admin_id: &str,
    reason: &str,
    now: OffsetDateTime,
) -> Result<ResetOutcome, AttemptError> {
    let outcome = mutate_exam(state.store(), exam_id, state.write_retries(), |exam| {
        reset_attempts(exam, student_id, admin_id, reason, now)
    })
    .await?;

    tracing::warn!(
        target: "audit",
        exam_id,
        student_id,
        admin_id,
        removed = outcome.removed,
        reason = reason.trim(),
        "Student attempts reset"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Score, ScoreState};
    use crate::test_support;
    use time::macros::datetime;

    fn exam_with_completed_attempt(allow_retakes: bool) -> Exam {
        let mut exam = test_support::scenario_exam("exam-1", allow_retakes);
        let mut attempt = test_support::blank_attempt("student-1", 1, exam.start_time);
        attempt.is_completed = true;
        attempt.submitted_at = Some(exam.start_time);
        attempt.score = ScoreState::Graded { actual: Score { score: 7.0, percentage: 70.0 } };
        exam.attempts.push(attempt);
        exam
    }

    #[test]
    fn scenario_d_retake_blocked_with_prior_score() {
        let exam = exam_with_completed_attempt(false);

        let err = ensure_may_start(&exam, "student-1").expect_err("blocked");
        let AttemptError::StateConflict { prior: Some(prior), .. } = err else {
            panic!("expected state conflict with prior attempt");
        };
        assert_eq!(prior.existing_score, 7.0);
        assert_eq!(prior.attempt_number, 1);
        assert_eq!(prior.submitted_at, Some(exam.start_time));
    }

    #[test]
    fn retakes_allowed_or_other_student_pass() {
        assert!(ensure_may_start(&exam_with_completed_attempt(true), "student-1").is_ok());
        assert!(ensure_may_start(&exam_with_completed_attempt(false), "student-2").is_ok());
    }

    #[test]
    fn reset_purges_pair_and_audits() {
        let mut exam = exam_with_completed_attempt(false);
        exam.attempts.push(test_support::blank_attempt("student-2", 1, exam.start_time));
        let now = datetime!(2025-03-02 08:00 UTC);

        let outcome =
            reset_attempts(&mut exam, "student-1", "admin-1", "device failure", now).unwrap();

        assert_eq!(outcome.removed, 1);
        assert_eq!(exam.attempts.len(), 1);
        assert!(ensure_may_start(&exam, "student-1").is_ok());
        let entry = exam.audit_log.last().unwrap();
        assert_eq!(entry.action, AuditAction::ResetAttempts);
        assert_eq!(entry.actor, "admin-1");
    }

    #[test]
    fn reset_requires_reason_and_attempts() {
        let mut exam = exam_with_completed_attempt(false);
        let now = datetime!(2025-03-02 08:00 UTC);
        assert!(matches!(
            reset_attempts(&mut exam, "student-1", "admin-1", "  ", now),
            Err(AttemptError::Validation(_))
        ));
        assert!(matches!(
            reset_attempts(&mut exam, "student-9", "admin-1", "typo", now),
            Err(AttemptError::NotFound(_))
        ));
        assert_eq!(exam.attempts.len(), 1);
    }
}
