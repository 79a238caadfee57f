use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::db::types::{AuditAction, GradingStatus, QuestionType, SubmitMode};

/// Exam aggregate: the question set plus every attempt made against it.
/// All attempt mutations go through one versioned write of this document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) join_code: String,
    pub(crate) class_id: String,
    pub(crate) teacher_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) end_time: OffsetDateTime,
    pub(crate) duration_minutes: u32,
    pub(crate) total_marks: f64,
    pub(crate) passing_marks: f64,
    #[serde(default)]
    pub(crate) options: ExamOptions,
    pub(crate) questions: Vec<Question>,
    #[serde(default)]
    pub(crate) attempts: Vec<Attempt>,
    #[serde(default)]
    pub(crate) audit_log: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) struct ExamOptions {
    #[serde(default)]
    pub(crate) shuffle: bool,
    #[serde(default)]
    pub(crate) allow_retakes: bool,
    #[serde(default)]
    pub(crate) show_results: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Question {
    /// 1-based and stable across shuffling; the canonical answer key.
    pub(crate) question_number: u32,
    /// Catalog identifier kept for clients that still address questions by id.
    #[serde(default)]
    pub(crate) id: Option<String>,
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) marks: f64,
    #[serde(default)]
    pub(crate) options: Vec<String>,
    #[serde(default)]
    pub(crate) correct_option: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) attempt_number: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) submitted_at: Option<OffsetDateTime>,
    pub(crate) is_completed: bool,
    #[serde(default)]
    pub(crate) submit_mode: Option<SubmitMode>,
    #[serde(default)]
    pub(crate) answers: Vec<Answer>,
    #[serde(default)]
    pub(crate) time_spent_seconds: u64,
    #[serde(default)]
    pub(crate) question_order: Vec<u32>,
    pub(crate) grading_status: GradingStatus,
    #[serde(default)]
    pub(crate) needs_grading: bool,
    #[serde(default)]
    pub(crate) score: ScoreState,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Answer {
    #[serde(default)]
    pub(crate) question_number: u32,
    /// Legacy reference (`q3`, `question-3`, catalog id) when the writer did not send a number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) question_ref: Option<String>,
    #[serde(default)]
    pub(crate) value: AnswerValue,
    #[serde(default)]
    pub(crate) is_correct: Option<bool>,
    #[serde(default)]
    pub(crate) marks_obtained: f64,
    #[serde(default)]
    pub(crate) time_spent_seconds: u64,
    #[serde(default)]
    pub(crate) needs_grading: bool,
    #[serde(default)]
    pub(crate) graded_by: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) graded_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum AnswerValue {
    #[default]
    Blank,
    Choice(usize),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct Score {
    pub(crate) score: f64,
    pub(crate) percentage: f64,
}

/// Two-track scoring: `actual` is always the latest grading pass, `published`
/// is what the student may see and only changes on release.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub(crate) enum ScoreState {
    #[default]
    Ungraded,
    Graded {
        actual: Score,
    },
    Released {
        actual: Score,
        published: Score,
        #[serde(with = "time::serde::rfc3339")]
        released_at: OffsetDateTime,
    },
}

impl ScoreState {
    pub(crate) fn actual(&self) -> Option<Score> {
        match self {
            Self::Ungraded => None,
            Self::Graded { actual } | Self::Released { actual, .. } => Some(*actual),
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        matches!(self, Self::Released { .. })
    }

    pub(crate) fn released_at(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Released { released_at, .. } => Some(*released_at),
            _ => None,
        }
    }

    /// Replaces the hidden score while keeping the publication state as is.
    pub(crate) fn with_actual(self, actual: Score) -> Self {
        match self {
            Self::Ungraded | Self::Graded { .. } => Self::Graded { actual },
            Self::Released { published, released_at, .. } => {
                Self::Released { actual, published, released_at }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AuditEntry {
    pub(crate) action: AuditAction,
    pub(crate) actor: String,
    #[serde(default)]
    pub(crate) student_id: Option<String>,
    pub(crate) detail: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ExamRow {
    pub(crate) id: String,
    pub(crate) version: i64,
    pub(crate) document: Json<Exam>,
}

#[derive(Debug, Clone)]
pub(crate) struct Versioned<T> {
    pub(crate) value: T,
    pub(crate) version: i64,
}

impl Exam {
    pub(crate) fn question(&self, question_number: u32) -> Option<&Question> {
        self.questions.iter().find(|question| question.question_number == question_number)
    }

    pub(crate) fn incomplete_attempt_index(&self, student_id: &str) -> Option<usize> {
        self.attempts
            .iter()
            .position(|attempt| attempt.student_id == student_id && !attempt.is_completed)
    }

    pub(crate) fn latest_completed_attempt(&self, student_id: &str) -> Option<&Attempt> {
        self.attempts
            .iter()
            .filter(|attempt| attempt.student_id == student_id && attempt.is_completed)
            .max_by_key(|attempt| attempt.attempt_number)
    }

    pub(crate) fn attempts_for<'a>(
        &'a self,
        student_id: &'a str,
    ) -> impl Iterator<Item = &'a Attempt> + 'a {
        self.attempts.iter().filter(move |attempt| attempt.student_id == student_id)
    }
}

impl Attempt {
    pub(crate) fn answer(&self, question_number: u32) -> Option<&Answer> {
        self.answers.iter().find(|answer| answer.question_number == question_number)
    }
}

impl Answer {
    pub(crate) fn unanswered(question_number: u32) -> Self {
        Self {
            question_number,
            question_ref: None,
            value: AnswerValue::Blank,
            is_correct: None,
            marks_obtained: 0.0,
            time_spent_seconds: 0,
            needs_grading: false,
            graded_by: None,
            graded_at: None,
            feedback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn answer_value_deserializes_untagged() {
        let choice: AnswerValue = serde_json::from_str("2").unwrap();
        let text: AnswerValue = serde_json::from_str("\"photosynthesis\"").unwrap();
        let blank: AnswerValue = serde_json::from_str("null").unwrap();
        assert_eq!(choice, AnswerValue::Choice(2));
        assert_eq!(text, AnswerValue::Text("photosynthesis".to_string()));
        assert_eq!(blank, AnswerValue::Blank);
    }

    #[test]
    fn with_actual_keeps_published_score() {
        let released_at = datetime!(2025-03-01 10:00 UTC);
        let published = Score { score: 6.0, percentage: 60.0 };
        let state = ScoreState::Released { actual: published, published, released_at };

        let updated = state.with_actual(Score { score: 8.0, percentage: 80.0 });
        assert_eq!(
            updated,
            ScoreState::Released {
                actual: Score { score: 8.0, percentage: 80.0 },
                published,
                released_at
            }
        );
    }

    #[test]
    fn score_state_serializes_with_tag() {
        let state = ScoreState::Graded { actual: Score { score: 2.0, percentage: 20.0 } };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["state"], "graded");
        assert_eq!(value["actual"]["score"], 2.0);

        let back: ScoreState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }
}
