use time::OffsetDateTime;

use crate::core::state::AppState;
use crate::db::models::{AuditEntry, Exam, ScoreState};
use crate::db::types::{AuditAction, GradingStatus};
use crate::services::aggregate::mutate_exam;
use crate::services::errors::AttemptError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReleaseAction {
    Release,
    Unrelease,
}

impl ReleaseAction {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Unrelease => "unrelease",
        }
    }
}

/// Copies `actual` into `published` for every completed attempt and forces
/// the grading status to completed. Ungraded attempts are published at zero.
pub(crate) fn release_results(exam: &mut Exam, actor: &str, now: OffsetDateTime) -> usize {
    let mut affected = 0;
    for attempt in exam.attempts.iter_mut().filter(|attempt| attempt.is_completed) {
        let actual = attempt.score.actual().unwrap_or_default();
        attempt.score = ScoreState::Released { actual, published: actual, released_at: now };
        attempt.grading_status = GradingStatus::Completed;
        attempt.updated_at = now;
        affected += 1;
    }

    exam.audit_log.push(AuditEntry {
        action: AuditAction::Release,
        actor: actor.to_string(),
        student_id: None,
        detail: format!("released {affected} attempt(s)"),
        at: now,
    });
    affected
}

/// Hides published scores again. Hidden scores are untouched.
pub(crate) fn unrelease_results(exam: &mut Exam, actor: &str, now: OffsetDateTime) -> usize {
    let mut affected = 0;
    for attempt in exam.attempts.iter_mut() {
        if let ScoreState::Released { actual, .. } = attempt.score {
            attempt.score = ScoreState::Graded { actual };
            attempt.updated_at = now;
            affected += 1;
        }
    }

    exam.audit_log.push(AuditEntry {
        action: AuditAction::Unrelease,
        actor: actor.to_string(),
        student_id: None,
        detail: format!("unreleased {affected} attempt(s)"),
        at: now,
    });
    affected
}

pub(crate) async fn apply(
    state: &AppState,
    exam_id: &str,
    action: ReleaseAction,
    actor: &str,
    now: OffsetDateTime,
) -> Result<usize, AttemptError> {
    let affected = mutate_exam(state.store(), exam_id, state.write_retries(), |exam| {
        Ok(match action {
            ReleaseAction::Release => release_results(exam, actor, now),
            ReleaseAction::Unrelease => unrelease_results(exam, actor, now),
        })
    })
    .await?;

    metrics::counter!("exam_results_release_total", "action" => action.as_str()).increment(1);
    tracing::info!(exam_id, actor, action = action.as_str(), affected, "Exam results visibility changed");

    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{AnswerValue, Score};
    use crate::services::grading::{apply_manual_grade, grade_attempt, visible_score, ManualGrade};
    use crate::test_support;
    use time::macros::datetime;

    fn graded_exam() -> Exam {
        let mut exam = test_support::scenario_exam("exam-1", false);
        let mut attempt = test_support::blank_attempt("student-1", 1, exam.start_time);
        attempt.answers = vec![test_support::answer(1, AnswerValue::Choice(1))];
        attempt.is_completed = true;
        grade_attempt(&exam.questions, exam.total_marks, &mut attempt);
        exam.attempts.push(attempt);
        exam.attempts.push(test_support::blank_attempt("student-2", 1, exam.start_time));
        exam
    }

    #[test]
    fn scenario_c_release_publishes_actual_and_completes() {
        let mut exam = graded_exam();
        let now = datetime!(2025-03-02 09:00 UTC);

        assert_eq!(visible_score(&exam.attempts[0]), None);
        let affected = release_results(&mut exam, "teacher-1", now);

        assert_eq!(affected, 1);
        let attempt = &exam.attempts[0];
        assert_eq!(attempt.grading_status, GradingStatus::Completed);
        assert_eq!(attempt.score.released_at(), Some(now));
        assert_eq!(visible_score(attempt), Some(Score { score: 2.0, percentage: 20.0 }));
        assert!(!exam.attempts[1].score.is_released());
        assert_eq!(exam.audit_log.last().unwrap().action, AuditAction::Release);
    }

    #[test]
    fn release_round_trip_restores_hidden_state() {
        let mut exam = graded_exam();
        let before = exam.attempts[0].score.clone();
        let now = datetime!(2025-03-02 09:00 UTC);

        release_results(&mut exam, "teacher-1", now);
        let affected = unrelease_results(&mut exam, "teacher-1", now);

        assert_eq!(affected, 1);
        assert_eq!(exam.attempts[0].score, before);
        assert_eq!(visible_score(&exam.attempts[0]), None);
        assert_eq!(exam.audit_log.len(), 2);
    }

    #[test]
    fn regrade_after_release_keeps_published_until_next_release() {
        let mut exam = graded_exam();
        let now = datetime!(2025-03-02 09:00 UTC);
        release_results(&mut exam, "teacher-1", now);

        let grade = ManualGrade {
            student_id: "student-1",
            attempt_id: None,
            question_number: 3,
            marks_obtained: 5.0,
            feedback: None,
            grader_id: "teacher-1",
        };
        apply_manual_grade(&mut exam, &grade, now).unwrap();

        let attempt = &exam.attempts[0];
        assert_eq!(attempt.score.actual().unwrap().score, 7.0);
        assert_eq!(visible_score(attempt).unwrap().score, 2.0);

        release_results(&mut exam, "teacher-1", now);
        assert_eq!(visible_score(&exam.attempts[0]).unwrap().score, 7.0);
    }
}
