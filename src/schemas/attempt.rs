use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::AnswerValue;
use crate::db::types::{GradingStatus, QuestionType, SubmitMode};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SaveAnswerRequest {
    #[serde(default)]
    #[serde(alias = "questionNumber")]
    #[validate(range(min = 1, message = "question_number must be positive"))]
    pub(crate) question_number: Option<u32>,
    /// Legacy addressing: catalog id or `q3` style reference.
    #[serde(default)]
    #[serde(alias = "questionId", alias = "question_ref")]
    pub(crate) question_id: Option<String>,
    #[serde(default)]
    #[serde(alias = "value")]
    pub(crate) answer: AnswerValue,
    #[serde(default)]
    #[serde(alias = "elapsedSeconds", alias = "timeSpent")]
    #[validate(range(max = 86400, message = "elapsed_seconds must not exceed one day"))]
    pub(crate) elapsed_seconds: u64,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ManualGradeRequest {
    #[serde(alias = "marksObtained", alias = "marks")]
    pub(crate) marks_obtained: f64,
    #[serde(default)]
    #[validate(length(max = 5000, message = "feedback is too long"))]
    pub(crate) feedback: Option<String>,
    #[serde(default)]
    #[serde(alias = "attemptId")]
    pub(crate) attempt_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ResetAttemptsRequest {
    #[validate(length(min = 1, max = 1000, message = "reason must be 1-1000 characters"))]
    pub(crate) reason: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaperQuestion {
    pub(crate) question_number: u32,
    pub(crate) id: Option<String>,
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) marks: f64,
    pub(crate) options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SavedAnswerView {
    pub(crate) question_number: u32,
    pub(crate) answer: AnswerValue,
    pub(crate) time_spent_seconds: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptSessionResponse {
    pub(crate) attempt_id: String,
    pub(crate) exam_id: String,
    pub(crate) attempt_number: u32,
    pub(crate) started_at: String,
    pub(crate) remaining_seconds: i64,
    pub(crate) time_spent_seconds: u64,
    pub(crate) resumed: bool,
    pub(crate) questions: Vec<PaperQuestion>,
    pub(crate) answers: Vec<SavedAnswerView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SaveAnswerResponse {
    pub(crate) saved: bool,
    pub(crate) attempt_id: String,
    pub(crate) question_number: u32,
    pub(crate) time_spent_seconds: u64,
    pub(crate) remaining_seconds: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    pub(crate) accepted: bool,
    pub(crate) attempt_id: String,
    pub(crate) submitted_at: String,
    pub(crate) grading_status: GradingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum ResultStatus {
    Pending,
    Released,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResult {
    pub(crate) question_number: u32,
    pub(crate) question_type: QuestionType,
    pub(crate) marks: f64,
    pub(crate) answer: AnswerValue,
    pub(crate) is_correct: Option<bool>,
    pub(crate) marks_obtained: f64,
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentResultResponse {
    pub(crate) exam_id: String,
    pub(crate) attempt_id: String,
    pub(crate) attempt_number: u32,
    pub(crate) submitted_at: Option<String>,
    pub(crate) score: f64,
    pub(crate) percentage: f64,
    pub(crate) status: ResultStatus,
    pub(crate) grading_status: GradingStatus,
    pub(crate) results_released: bool,
    pub(crate) released_at: Option<String>,
    pub(crate) passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) per_question_breakdown: Option<Vec<QuestionResult>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GradedAnswerView {
    pub(crate) question_number: u32,
    pub(crate) question_type: Option<QuestionType>,
    pub(crate) max_marks: Option<f64>,
    pub(crate) answer: AnswerValue,
    pub(crate) is_correct: Option<bool>,
    pub(crate) marks_obtained: f64,
    pub(crate) needs_grading: bool,
    pub(crate) graded_by: Option<String>,
    pub(crate) graded_at: Option<String>,
    pub(crate) feedback: Option<String>,
    pub(crate) time_spent_seconds: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct TeacherAttemptView {
    pub(crate) attempt_id: String,
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) attempt_number: u32,
    pub(crate) is_completed: bool,
    pub(crate) started_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) submit_mode: Option<SubmitMode>,
    pub(crate) actual_score: f64,
    pub(crate) actual_percentage: f64,
    pub(crate) published_score: Option<f64>,
    pub(crate) grading_status: GradingStatus,
    pub(crate) results_released: bool,
    pub(crate) released_at: Option<String>,
    pub(crate) answers: Vec<GradedAnswerView>,
    pub(crate) pending_answers: Vec<GradedAnswerView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamGradingResponse {
    pub(crate) exam_id: String,
    pub(crate) title: String,
    pub(crate) total_marks: f64,
    pub(crate) passing_marks: f64,
    pub(crate) pending_count: usize,
    pub(crate) attempts: Vec<TeacherAttemptView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ManualGradeResponse {
    pub(crate) attempt_id: String,
    pub(crate) question_number: u32,
    pub(crate) marks_obtained: f64,
    pub(crate) actual_score: f64,
    pub(crate) actual_percentage: f64,
    pub(crate) grading_status: GradingStatus,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReleaseResponse {
    pub(crate) exam_id: String,
    pub(crate) action: &'static str,
    pub(crate) affected: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResetAttemptsResponse {
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn save_request_accepts_legacy_shapes() {
        let legacy: SaveAnswerRequest =
            serde_json::from_value(json!({"questionId": "q2", "value": "Paris", "timeSpent": 12}))
                .unwrap();
        assert_eq!(legacy.question_number, None);
        assert_eq!(legacy.question_id.as_deref(), Some("q2"));
        assert_eq!(legacy.answer, AnswerValue::Text("Paris".to_string()));
        assert_eq!(legacy.elapsed_seconds, 12);

        let current: SaveAnswerRequest =
            serde_json::from_value(json!({"question_number": 1, "answer": 1})).unwrap();
        assert_eq!(current.answer, AnswerValue::Choice(1));
        assert!(current.validate().is_ok());
    }

    #[test]
    fn result_status_is_upper_case() {
        assert_eq!(serde_json::to_value(ResultStatus::Pending).unwrap(), json!("PENDING"));
        assert_eq!(serde_json::to_value(ResultStatus::Released).unwrap(), json!("RELEASED"));
    }
}
