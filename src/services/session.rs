use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::db::models::{Attempt, Exam, Question, ScoreState};
use crate::db::types::{GradingStatus, SubmitMode};
use crate::services::aggregate::mutate_exam;
use crate::services::errors::AttemptError;
use crate::services::retake;
use crate::services::submission_finalize::{announce, finalize_attempt, SubmissionNotice};

/// Who is asking to sit the exam, as established by the identity token.
#[derive(Debug, Clone)]
pub(crate) struct Candidate<'a> {
    pub(crate) student_id: &'a str,
    pub(crate) student_name: &'a str,
    pub(crate) class_id: Option<&'a str>,
}

/// Attempt state handed back on start or resume.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SessionSnapshot {
    pub(crate) attempt: Attempt,
    pub(crate) questions: Vec<Question>,
    pub(crate) remaining_seconds: i64,
    pub(crate) resumed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StartOutcome {
    Active(SessionSnapshot),
    Expired(SubmissionNotice),
}

/// Seconds left for `attempt`: the smaller of the duration budget and the exam window.
pub(crate) fn seconds_remaining(exam: &Exam, attempt: &Attempt, now: OffsetDateTime) -> i64 {
    let budget = i64::from(exam.duration_minutes) * 60
        - i64::try_from(attempt.time_spent_seconds).unwrap_or(i64::MAX);
    let window = (exam.end_time - now).whole_seconds();
    budget.min(window)
}

pub(crate) fn ensure_enrolled(exam: &Exam, class_id: Option<&str>) -> Result<(), AttemptError> {
    if class_id != Some(exam.class_id.as_str()) {
        return Err(AttemptError::validation("You are not enrolled in the class for this exam"));
    }
    Ok(())
}

pub(crate) fn start_or_resume(
    exam: &mut Exam,
    candidate: &Candidate<'_>,
    now: OffsetDateTime,
) -> Result<StartOutcome, AttemptError> {
    ensure_enrolled(exam, candidate.class_id)?;
    if now < exam.start_time {
        return Err(AttemptError::validation("Exam has not started yet"));
    }

    if let Some(index) = exam.incomplete_attempt_index(candidate.student_id) {
        let remaining = seconds_remaining(exam, &exam.attempts[index], now);
        if remaining <= 0 {
            let notice = finalize_attempt(exam, index, SubmitMode::AutoExpiry, now);
            return Ok(StartOutcome::Expired(notice));
        }

        return Ok(StartOutcome::Active(snapshot(exam, index, remaining, true)));
    }

    if now > exam.end_time {
        return Err(AttemptError::Expired { auto_submitted: false });
    }

    retake::ensure_may_start(exam, candidate.student_id)?;

    let attempt_number = exam.attempts_for(candidate.student_id).count() as u32 + 1;
    let attempt = Attempt {
        id: Uuid::new_v4().to_string(),
        student_id: candidate.student_id.to_string(),
        student_name: candidate.student_name.to_string(),
        attempt_number,
        started_at: now,
        submitted_at: None,
        is_completed: false,
        submit_mode: None,
        answers: Vec::new(),
        time_spent_seconds: 0,
        question_order: question_order(exam, rand::random()),
        grading_status: GradingStatus::Pending,
        needs_grading: false,
        score: ScoreState::Ungraded,
        updated_at: now,
    };
    exam.attempts.push(attempt);

    let index = exam.attempts.len() - 1;
    let remaining = seconds_remaining(exam, &exam.attempts[index], now);
    Ok(StartOutcome::Active(snapshot(exam, index, remaining, false)))
}

/// Question numbers in presentation order. Shuffled per attempt when enabled.
pub(crate) fn question_order(exam: &Exam, seed: u64) -> Vec<u32> {
    let mut order: Vec<u32> = exam.questions.iter().map(|q| q.question_number).collect();
    if exam.options.shuffle {
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);
    }
    order
}

fn snapshot(exam: &Exam, index: usize, remaining_seconds: i64, resumed: bool) -> SessionSnapshot {
    let attempt = exam.attempts[index].clone();
    let mut questions: Vec<Question> = attempt
        .question_order
        .iter()
        .filter_map(|number| exam.question(*number).cloned())
        .collect();
    // Questions added to the catalog without an order entry go last.
    for question in &exam.questions {
        if !attempt.question_order.contains(&question.question_number) {
            questions.push(question.clone());
        }
    }

    SessionSnapshot { attempt, questions, remaining_seconds, resumed }
}

pub(crate) async fn start(
    state: &AppState,
    exam_id: &str,
    candidate: Candidate<'_>,
    now: OffsetDateTime,
) -> Result<SessionSnapshot, AttemptError> {
    let outcome = mutate_exam(state.store(), exam_id, state.write_retries(), |exam| {
        start_or_resume(exam, &candidate, now)
    })
    .await?;

    match outcome {
        StartOutcome::Active(snapshot) => {
            if !snapshot.resumed {
                metrics::counter!("exam_attempts_started_total").increment(1);
            }
            tracing::info!(
                exam_id,
                student_id = candidate.student_id,
                attempt_id = %snapshot.attempt.id,
                attempt_number = snapshot.attempt.attempt_number,
                resumed = snapshot.resumed,
                remaining_seconds = snapshot.remaining_seconds,
                "Attempt session opened"
            );
            Ok(snapshot)
        }
        StartOutcome::Expired(notice) => {
            announce(state, &notice);
            Err(AttemptError::Expired { auto_submitted: true })
        }
    }
}
