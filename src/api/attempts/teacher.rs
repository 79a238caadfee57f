use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_exam_owner, CurrentAdmin, CurrentTeacher, Identity};
use crate::core::state::AppState;
use crate::core::time::now_utc;
use crate::db::models::Exam;
use crate::schemas::attempt::{
    ExamGradingResponse, ManualGradeRequest, ManualGradeResponse, ReleaseResponse,
    ResetAttemptsRequest, ResetAttemptsResponse,
};
use crate::services::aggregate::load_exam;
use crate::services::grading::{self, ManualGrade};
use crate::services::release::{self, ReleaseAction};
use crate::services::{results, retake};

async fn owned_exam(state: &AppState, exam_id: &str, teacher: &Identity) -> Result<Exam, ApiError> {
    let exam = load_exam(state.store(), exam_id).await?;
    require_exam_owner(&exam, teacher)?;
    Ok(exam)
}

pub(super) async fn exam_grading(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<ExamGradingResponse>, ApiError> {
    let exam = owned_exam(&state, &exam_id, &teacher).await?;
    Ok(Json(results::exam_grading(&exam, None)))
}

pub(super) async fn student_grading(
    Path((exam_id, student_id)): Path<(String, String)>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<ExamGradingResponse>, ApiError> {
    let exam = owned_exam(&state, &exam_id, &teacher).await?;
    let view = results::exam_grading(&exam, Some(&student_id));
    if view.attempts.is_empty() {
        return Err(ApiError::NotFound("No attempts found for this student".to_string()));
    }
    Ok(Json(view))
}

pub(super) async fn grade_question(
    Path((exam_id, student_id, question_number)): Path<(String, String, u32)>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ManualGradeRequest>,
) -> Result<Json<ManualGradeResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    owned_exam(&state, &exam_id, &teacher).await?;

    let grade = ManualGrade {
        student_id: &student_id,
        attempt_id: payload.attempt_id.as_deref(),
        question_number,
        marks_obtained: payload.marks_obtained,
        feedback: payload.feedback,
        grader_id: &teacher.id,
    };
    let outcome = grading::grade_question(&state, &exam_id, grade, now_utc()).await?;

    Ok(Json(ManualGradeResponse {
        attempt_id: outcome.attempt_id,
        question_number: outcome.question_number,
        marks_obtained: outcome.marks_obtained,
        actual_score: outcome.actual.score,
        actual_percentage: outcome.actual.percentage,
        grading_status: outcome.grading_status,
    }))
}

async fn change_visibility(
    state: &AppState,
    exam_id: String,
    teacher: &Identity,
    action: ReleaseAction,
) -> Result<Json<ReleaseResponse>, ApiError> {
    owned_exam(state, &exam_id, teacher).await?;
    let affected = release::apply(state, &exam_id, action, &teacher.id, now_utc()).await?;

    Ok(Json(ReleaseResponse { exam_id, action: action.as_str(), affected }))
}

pub(super) async fn release_results(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    change_visibility(&state, exam_id, &teacher, ReleaseAction::Release).await
}

pub(super) async fn unrelease_results(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    change_visibility(&state, exam_id, &teacher, ReleaseAction::Unrelease).await
}

pub(super) async fn reset_attempts(
    Path((exam_id, student_id)): Path<(String, String)>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<ResetAttemptsRequest>,
) -> Result<Json<ResetAttemptsResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome =
        retake::reset(&state, &exam_id, &student_id, &admin.id, &payload.reason, now_utc())
            .await?;

    Ok(Json(ResetAttemptsResponse { exam_id, student_id, removed: outcome.removed }))
}
