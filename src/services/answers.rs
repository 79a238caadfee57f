use time::OffsetDateTime;

use crate::core::state::AppState;
use crate::db::models::{Answer, AnswerValue, Exam, Question};
use crate::db::types::{QuestionType, SubmitMode};
use crate::services::aggregate::mutate_exam;
use crate::services::errors::AttemptError;
use crate::services::grading::chosen_option;
use crate::services::resolver::{resolve, MatchedBy, Resolution};
use crate::services::session::seconds_remaining;
use crate::services::submission_finalize::{announce, finalize_attempt, SubmissionNotice};

#[derive(Debug, Clone)]
pub(crate) struct AnswerInput {
    pub(crate) question_number: Option<u32>,
    pub(crate) question_ref: Option<String>,
    pub(crate) value: AnswerValue,
    pub(crate) elapsed_seconds: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SavedAnswer {
    pub(crate) attempt_id: String,
    pub(crate) question_number: u32,
    pub(crate) matched_by: MatchedBy,
    pub(crate) time_spent_seconds: u64,
    pub(crate) remaining_seconds: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SaveOutcome {
    Saved(SavedAnswer),
    Expired(SubmissionNotice),
}

/// Checks the raw value against the question type and returns it in stored form.
fn normalize_value(question: &Question, value: AnswerValue) -> Result<AnswerValue, AttemptError> {
    match (question.question_type, value) {
        (_, AnswerValue::Blank) => Ok(AnswerValue::Blank),
        (QuestionType::Objective, value) => chosen_option(&value, &question.options)
            .map(AnswerValue::Choice)
            .ok_or_else(|| {
                AttemptError::validation(format!(
                    "Answer for question {} must select one of its {} options",
                    question.question_number,
                    question.options.len()
                ))
            }),
        (QuestionType::Theory, AnswerValue::Text(text)) => Ok(AnswerValue::Text(text)),
        (QuestionType::Theory, AnswerValue::Choice(_)) => Err(AttemptError::validation(format!(
            "Answer for question {} must be text",
            question.question_number
        ))),
    }
}

/// Idempotent upsert keyed by question number. Time is the only additive field.
pub(crate) fn save_answer(
    exam: &mut Exam,
    student_id: &str,
    input: &AnswerInput,
    now: OffsetDateTime,
) -> Result<SaveOutcome, AttemptError> {
    let Some(index) = exam.incomplete_attempt_index(student_id) else {
        return Err(match exam.latest_completed_attempt(student_id) {
            Some(_) => AttemptError::state_conflict("Attempt has already been submitted"),
            None => AttemptError::not_found("No active attempt for this exam"),
        });
    };

    if seconds_remaining(exam, &exam.attempts[index], now) <= 0 {
        return Ok(SaveOutcome::Expired(finalize_attempt(
            exam,
            index,
            SubmitMode::AutoExpiry,
            now,
        )));
    }

    let (question_number, matched_by, value) =
        match resolve(&exam.questions, input.question_number, input.question_ref.as_deref()) {
            Resolution::Found { question, matched_by } => {
                (question.question_number, matched_by, normalize_value(question, input.value.clone())?)
            }
            Resolution::NotFound => {
                return Err(AttemptError::not_found("Question not found in this exam"));
            }
        };

    let remaining = seconds_remaining(exam, &exam.attempts[index], now);
    let attempt = &mut exam.attempts[index];
    match attempt.answers.iter_mut().find(|answer| answer.question_number == question_number) {
        Some(answer) => {
            answer.value = value;
            answer.question_ref = None;
            answer.time_spent_seconds += input.elapsed_seconds;
        }
        None => {
            let mut answer = Answer::unanswered(question_number);
            answer.value = value;
            answer.time_spent_seconds = input.elapsed_seconds;
            attempt.answers.push(answer);
        }
    }
    attempt.time_spent_seconds += input.elapsed_seconds;
    attempt.updated_at = now;

    Ok(SaveOutcome::Saved(SavedAnswer {
        attempt_id: attempt.id.clone(),
        question_number,
        matched_by,
        time_spent_seconds: attempt.time_spent_seconds,
        remaining_seconds: remaining - i64::try_from(input.elapsed_seconds).unwrap_or(i64::MAX),
    }))
}

pub(crate) async fn save(
    state: &AppState,
    exam_id: &str,
    student_id: &str,
    input: AnswerInput,
    now: OffsetDateTime,
) -> Result<SavedAnswer, AttemptError> {
    let outcome = mutate_exam(state.store(), exam_id, state.write_retries(), |exam| {
        save_answer(exam, student_id, &input, now)
    })
    .await?;

    match outcome {
        SaveOutcome::Saved(saved) => {
            if saved.matched_by != MatchedBy::Number {
                tracing::debug!(
                    exam_id,
                    question_number = saved.question_number,
                    matched_by = ?saved.matched_by,
                    "Answer addressed by legacy reference"
                );
            }
            tracing::debug!(
                exam_id,
                student_id,
                attempt_id = %saved.attempt_id,
                question_number = saved.question_number,
                "Answer saved"
            );
            Ok(saved)
        }
        SaveOutcome::Expired(notice) => {
            announce(state, &notice);
            Err(AttemptError::Expired { auto_submitted: true })
        }
    }
}
