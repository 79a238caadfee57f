use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::put,
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_exam_owner, CurrentTeacher};
use crate::core::state::AppState;
use crate::core::time::format_offset;
use crate::schemas::exam::{ExamDefinitionRequest, ExamDefinitionResponse};
use crate::services::catalog;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/exams/:exam_id", put(upsert_exam))
}

async fn upsert_exam(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ExamDefinitionRequest>,
) -> Result<(StatusCode, Json<ExamDefinitionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let teacher_id = match payload.teacher_id.clone() {
        Some(owner) if owner != teacher.id && !teacher.is_admin() => {
            return Err(ApiError::Forbidden("Teachers can only register their own exams"));
        }
        Some(owner) => owner,
        None => teacher.id.clone(),
    };

    if let Some(existing) = state.store().load(&exam_id).await.map_err(|e| {
        ApiError::internal(e, "Failed to load exam definition")
    })? {
        require_exam_owner(&existing.value, &teacher)?;
    }

    let exam = catalog::build_exam(&exam_id, &teacher_id, payload)?;
    let response = ExamDefinitionResponse {
        id: exam.id.clone(),
        title: exam.title.clone(),
        class_id: exam.class_id.clone(),
        teacher_id: exam.teacher_id.clone(),
        start_time: format_offset(exam.start_time),
        end_time: format_offset(exam.end_time),
        duration_minutes: exam.duration_minutes,
        total_marks: exam.total_marks,
        passing_marks: exam.passing_marks,
        question_count: exam.questions.len(),
        created: false,
    };

    let created = catalog::register(&state, exam).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };

    Ok((status, Json(ExamDefinitionResponse { created, ..response })))
}
