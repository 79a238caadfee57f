use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::core::state::AppState;
use crate::core::time::{format_offset, now_utc};
use crate::schemas::attempt::{
    AttemptSessionResponse, PaperQuestion, SaveAnswerRequest, SaveAnswerResponse,
    SavedAnswerView, StudentResultResponse, SubmitResponse,
};
use crate::services::aggregate::load_exam;
use crate::services::answers::{self, AnswerInput};
use crate::services::session::{self, Candidate, SessionSnapshot};
use crate::services::{results, submission_finalize};

fn session_response(exam_id: String, snapshot: SessionSnapshot) -> AttemptSessionResponse {
    let SessionSnapshot { attempt, questions, remaining_seconds, resumed } = snapshot;

    AttemptSessionResponse {
        attempt_id: attempt.id,
        exam_id,
        attempt_number: attempt.attempt_number,
        started_at: format_offset(attempt.started_at),
        remaining_seconds: remaining_seconds.max(0),
        time_spent_seconds: attempt.time_spent_seconds,
        resumed,
        questions: questions
            .into_iter()
            .map(|question| PaperQuestion {
                question_number: question.question_number,
                id: question.id,
                text: question.text,
                question_type: question.question_type,
                marks: question.marks,
                options: question.options,
            })
            .collect(),
        answers: attempt
            .answers
            .into_iter()
            .map(|answer| SavedAnswerView {
                question_number: answer.question_number,
                answer: answer.value,
                time_spent_seconds: answer.time_spent_seconds,
            })
            .collect(),
    }
}

pub(super) async fn start_attempt(
    Path(exam_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<AttemptSessionResponse>, ApiError> {
    let candidate = Candidate {
        student_id: &student.id,
        student_name: &student.name,
        class_id: student.class_id.as_deref(),
    };

    let snapshot = session::start(&state, &exam_id, candidate, now_utc()).await?;

    Ok(Json(session_response(exam_id, snapshot)))
}

pub(super) async fn save_answer(
    Path(exam_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<Json<SaveAnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if payload.question_number.is_none() && payload.question_id.is_none() {
        return Err(ApiError::BadRequest(
            "question_number or question_id is required".to_string(),
        ));
    }

    let input = AnswerInput {
        question_number: payload.question_number,
        question_ref: payload.question_id,
        value: payload.answer,
        elapsed_seconds: payload.elapsed_seconds,
    };
    let saved = answers::save(&state, &exam_id, &student.id, input, now_utc()).await?;

    Ok(Json(SaveAnswerResponse {
        saved: true,
        attempt_id: saved.attempt_id,
        question_number: saved.question_number,
        time_spent_seconds: saved.time_spent_seconds,
        remaining_seconds: saved.remaining_seconds.max(0),
    }))
}

pub(super) async fn submit_attempt(
    Path(exam_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let notice = submission_finalize::submit(&state, &exam_id, &student.id, now_utc()).await?;

    Ok(Json(SubmitResponse {
        accepted: true,
        attempt_id: notice.attempt_id,
        submitted_at: format_offset(notice.submitted_at),
        grading_status: notice.grading_status,
    }))
}

pub(super) async fn my_results(
    Path(exam_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<StudentResultResponse>, ApiError> {
    let exam = load_exam(state.store(), &exam_id).await?;
    let result = results::student_result(&exam, &student.id)?;
    Ok(Json(result))
}
