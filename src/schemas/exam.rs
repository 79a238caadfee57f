use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::core::time::parse_flexible;
use crate::db::types::QuestionType;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub(crate) struct QuestionDefinition {
    #[serde(alias = "questionNumber")]
    #[validate(range(min = 1, message = "question_number must start at 1"))]
    pub(crate) question_number: u32,
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[validate(length(min = 1, message = "question text must not be empty"))]
    pub(crate) text: String,
    #[serde(alias = "questionType", alias = "type")]
    pub(crate) question_type: QuestionType,
    #[validate(range(exclusive_min = 0.0, message = "marks must be positive"))]
    pub(crate) marks: f64,
    #[serde(default)]
    pub(crate) options: Vec<String>,
    #[serde(default)]
    #[serde(alias = "correctOption", alias = "correctAnswer")]
    pub(crate) correct_option: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExamOptionsPayload {
    #[serde(default)]
    pub(crate) shuffle: bool,
    #[serde(default)]
    #[serde(alias = "allowRetakes")]
    pub(crate) allow_retakes: bool,
    #[serde(default)]
    #[serde(alias = "showResults")]
    pub(crate) show_results: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamDefinitionRequest {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default)]
    #[serde(alias = "joinCode")]
    pub(crate) join_code: String,
    #[serde(alias = "classId")]
    #[validate(length(min = 1, message = "class_id must not be empty"))]
    pub(crate) class_id: String,
    #[serde(default)]
    #[serde(alias = "teacherId")]
    pub(crate) teacher_id: Option<String>,
    #[serde(alias = "startTime", deserialize_with = "deserialize_datetime")]
    pub(crate) start_time: OffsetDateTime,
    #[serde(alias = "endTime", deserialize_with = "deserialize_datetime")]
    pub(crate) end_time: OffsetDateTime,
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: u32,
    #[serde(alias = "totalMarks")]
    #[validate(range(exclusive_min = 0.0, message = "total_marks must be positive"))]
    pub(crate) total_marks: f64,
    #[serde(alias = "passingMarks")]
    #[validate(range(min = 0.0, message = "passing_marks must be non-negative"))]
    pub(crate) passing_marks: f64,
    #[serde(default, alias = "settings")]
    pub(crate) options: ExamOptionsPayload,
    #[validate(length(min = 1, message = "an exam needs at least one question"), nested)]
    pub(crate) questions: Vec<QuestionDefinition>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamDefinitionResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) class_id: String,
    pub(crate) teacher_id: String,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) duration_minutes: u32,
    pub(crate) total_marks: f64,
    pub(crate) passing_marks: f64,
    pub(crate) question_count: usize,
    pub(crate) created: bool,
}

fn deserialize_datetime<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_flexible(&raw).ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}
