use std::collections::HashSet;

use crate::core::state::AppState;
use crate::db::models::{Exam, ExamOptions, Question};
use crate::db::types::QuestionType;
use crate::repositories::exams::StoreError;
use crate::schemas::exam::ExamDefinitionRequest;
use crate::services::aggregate::mutate_exam;
use crate::services::errors::AttemptError;

const MARKS_EPSILON: f64 = 1e-9;

/// Builds an attempt-free exam aggregate from a catalog definition, enforcing
/// the structural rules grading relies on.
pub(crate) fn build_exam(
    exam_id: &str,
    teacher_id: &str,
    request: ExamDefinitionRequest,
) -> Result<Exam, AttemptError> {
    if request.title.trim().is_empty() {
        return Err(AttemptError::validation("title must not be empty"));
    }
    if request.end_time <= request.start_time {
        return Err(AttemptError::validation("end_time must be after start_time"));
    }
    if request.duration_minutes == 0 {
        return Err(AttemptError::validation("duration_minutes must be positive"));
    }
    if !request.total_marks.is_finite() || request.total_marks <= 0.0 {
        return Err(AttemptError::validation("total_marks must be positive"));
    }
    if request.passing_marks < 0.0 || request.passing_marks > request.total_marks + MARKS_EPSILON {
        return Err(AttemptError::validation("passing_marks must be between 0 and total_marks"));
    }
    if request.questions.is_empty() {
        return Err(AttemptError::validation("an exam needs at least one question"));
    }

    let mut questions: Vec<Question> = request
        .questions
        .into_iter()
        .map(|definition| Question {
            question_number: definition.question_number,
            id: definition.id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()),
            text: definition.text,
            question_type: definition.question_type,
            marks: definition.marks,
            options: definition.options,
            correct_option: definition.correct_option,
        })
        .collect();
    questions.sort_by_key(|question| question.question_number);

    let mut catalog_ids = HashSet::new();
    for (position, question) in questions.iter().enumerate() {
        let expected = position as u32 + 1;
        if question.question_number != expected {
            return Err(AttemptError::validation(format!(
                "questions must be numbered 1..={} without gaps or duplicates (found {} at position {})",
                questions.len(),
                question.question_number,
                expected
            )));
        }
        validate_question(question)?;
        if let Some(id) = &question.id {
            if !catalog_ids.insert(id.as_str()) {
                return Err(AttemptError::validation(format!("duplicate question id {id}")));
            }
        }
    }

    let marks_sum: f64 = questions.iter().map(|question| question.marks).sum();
    if marks_sum > request.total_marks + MARKS_EPSILON {
        return Err(AttemptError::validation(format!(
            "question marks add up to {marks_sum}, above total_marks {}",
            request.total_marks
        )));
    }

    Ok(Exam {
        id: exam_id.to_string(),
        title: request.title.trim().to_string(),
        join_code: request.join_code,
        class_id: request.class_id,
        teacher_id: teacher_id.to_string(),
        start_time: request.start_time,
        end_time: request.end_time,
        duration_minutes: request.duration_minutes,
        total_marks: request.total_marks,
        passing_marks: request.passing_marks,
        options: ExamOptions {
            shuffle: request.options.shuffle,
            allow_retakes: request.options.allow_retakes,
            show_results: request.options.show_results,
        },
        questions,
        attempts: Vec::new(),
        audit_log: Vec::new(),
    })
}

fn validate_question(question: &Question) -> Result<(), AttemptError> {
    let number = question.question_number;
    if !question.marks.is_finite() || question.marks <= 0.0 {
        return Err(AttemptError::validation(format!("question {number} must carry positive marks")));
    }

    match question.question_type {
        QuestionType::Objective => {
            if question.options.len() < 2 {
                return Err(AttemptError::validation(format!(
                    "objective question {number} needs at least two options"
                )));
            }
            match question.correct_option {
                Some(index) if index < question.options.len() => Ok(()),
                _ => Err(AttemptError::validation(format!(
                    "objective question {number} needs a correct option index below {}",
                    question.options.len()
                ))),
            }
        }
        QuestionType::Theory => {
            if !question.options.is_empty() || question.correct_option.is_some() {
                return Err(AttemptError::validation(format!(
                    "theory question {number} must not define options"
                )));
            }
            Ok(())
        }
    }
}

/// Inserts a new definition or replaces one that nobody has attempted yet.
/// Returns `true` when the exam was created.
pub(crate) async fn register(state: &AppState, exam: Exam) -> Result<bool, AttemptError> {
    match state.store().insert(&exam).await {
        Ok(_) => {
            tracing::info!(exam_id = %exam.id, questions = exam.questions.len(), "Exam registered");
            return Ok(true);
        }
        Err(StoreError::AlreadyExists(_)) => {}
        Err(err) => return Err(err.into()),
    }

    mutate_exam(state.store(), &exam.id, state.write_retries(), |stored| {
        if !stored.attempts.is_empty() {
            return Err(AttemptError::state_conflict(
                "Exam already has attempts; its definition can no longer change",
            ));
        }
        let audit_log = std::mem::take(&mut stored.audit_log);
        *stored = Exam { audit_log, ..exam.clone() };
        Ok(())
    })
    .await?;

    tracing::info!(exam_id = %exam.id, questions = exam.questions.len(), "Exam definition updated");
    Ok(false)
}
