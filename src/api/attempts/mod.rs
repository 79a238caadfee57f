mod student;
mod teacher;

use axum::{routing::delete, routing::get, routing::post, routing::put, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        // Student endpoints
        .route("/:exam_id/attempts/start", post(student::start_attempt))
        .route("/:exam_id/attempts/current/answers", put(student::save_answer))
        .route("/:exam_id/attempts/current/submit", post(student::submit_attempt))
        .route("/:exam_id/results", get(student::my_results))
        // Teacher endpoints
        .route("/:exam_id/grading", get(teacher::exam_grading))
        .route("/:exam_id/students/:student_id/grading", get(teacher::student_grading))
        .route(
            "/:exam_id/students/:student_id/questions/:question_number/grade",
            post(teacher::grade_question),
        )
        .route("/:exam_id/release", post(teacher::release_results))
        .route("/:exam_id/unrelease", post(teacher::unrelease_results))
        // Admin endpoints
        .route("/:exam_id/students/:student_id/attempts", delete(teacher::reset_attempts))
}
