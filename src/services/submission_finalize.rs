use time::OffsetDateTime;

use crate::core::state::AppState;
use crate::db::models::Exam;
use crate::db::types::{GradingStatus, SubmitMode};
use crate::services::aggregate::mutate_exam;
use crate::services::errors::AttemptError;
use crate::services::grading::grade_attempt;
use crate::services::notifications::{self, SubmissionEvent};
use crate::services::session::seconds_remaining;

/// Late manual submits inside this window are still accepted as manual.
const SUBMIT_GRACE_PERIOD_SECONDS: i64 = 60;

/// What a committed finalisation hands back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SubmissionNotice {
    pub(crate) attempt_id: String,
    pub(crate) submitted_at: OffsetDateTime,
    pub(crate) grading_status: GradingStatus,
    pub(crate) mode: SubmitMode,
    pub(crate) event: SubmissionEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SubmitOutcome {
    Submitted(SubmissionNotice),
    Expired(SubmissionNotice),
}

/// Grades the incomplete attempt at `index` and closes it. `is_completed` only
/// ever moves from false to true here.
pub(crate) fn finalize_attempt(
    exam: &mut Exam,
    index: usize,
    mode: SubmitMode,
    now: OffsetDateTime,
) -> SubmissionNotice {
    let questions = &exam.questions;
    let attempt = &mut exam.attempts[index];

    let report = grade_attempt(questions, exam.total_marks, attempt);
    attempt.is_completed = true;
    attempt.submitted_at = Some(now);
    attempt.submit_mode = Some(mode);
    attempt.updated_at = now;

    tracing::debug!(
        attempt_id = %attempt.id,
        objective = report.objective,
        theory = report.theory,
        skipped = report.skipped,
        "Attempt graded on submit"
    );

    SubmissionNotice {
        attempt_id: attempt.id.clone(),
        submitted_at: now,
        grading_status: attempt.grading_status,
        mode,
        event: SubmissionEvent {
            teacher_id: exam.teacher_id.clone(),
            exam_id: exam.id.clone(),
            exam_title: exam.title.clone(),
            student_id: attempt.student_id.clone(),
            student_name: attempt.student_name.clone(),
            attempt_id: attempt.id.clone(),
            mode: mode.as_str(),
        },
    }
}

pub(crate) fn submit_current(
    exam: &mut Exam,
    student_id: &str,
    now: OffsetDateTime,
) -> Result<SubmitOutcome, AttemptError> {
    let Some(index) = exam.incomplete_attempt_index(student_id) else {
        return Err(match exam.latest_completed_attempt(student_id) {
            Some(_) => AttemptError::state_conflict("Attempt has already been submitted"),
            None => AttemptError::not_found("No attempt found for this exam"),
        });
    };

    if seconds_remaining(exam, &exam.attempts[index], now) < -SUBMIT_GRACE_PERIOD_SECONDS {
        return Ok(SubmitOutcome::Expired(finalize_attempt(
            exam,
            index,
            SubmitMode::AutoExpiry,
            now,
        )));
    }

    Ok(SubmitOutcome::Submitted(finalize_attempt(exam, index, SubmitMode::Manual, now)))
}

/// Records a finalisation that already committed: metrics, log, teacher notification.
pub(crate) fn announce(state: &AppState, notice: &SubmissionNotice) {
    metrics::counter!("exam_attempts_submitted_total", "mode" => notice.mode.as_str())
        .increment(1);
    if notice.mode == SubmitMode::AutoExpiry {
        metrics::counter!("exam_attempts_expired_total").increment(1);
    }

    tracing::info!(
        exam_id = %notice.event.exam_id,
        student_id = %notice.event.student_id,
        attempt_id = %notice.attempt_id,
        mode = notice.mode.as_str(),
        grading_status = ?notice.grading_status,
        "Attempt submitted"
    );

    notifications::dispatch(state.notifier(), notice.event.clone());
}

pub(crate) async fn submit(
    state: &AppState,
    exam_id: &str,
    student_id: &str,
    now: OffsetDateTime,
) -> Result<SubmissionNotice, AttemptError> {
    let outcome = mutate_exam(state.store(), exam_id, state.write_retries(), |exam| {
        submit_current(exam, student_id, now)
    })
    .await?;

    match outcome {
        SubmitOutcome::Submitted(notice) => {
            announce(state, &notice);
            Ok(notice)
        }
        SubmitOutcome::Expired(notice) => {
            announce(state, &notice);
            Err(AttemptError::Expired { auto_submitted: true })
        }
    }
}
