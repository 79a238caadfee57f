use std::collections::HashSet;

use time::OffsetDateTime;

use crate::core::state::AppState;
use crate::db::models::{
    Answer, AnswerValue, Attempt, AuditEntry, Exam, Question, Score, ScoreState,
};
use crate::db::types::{AuditAction, GradingStatus, QuestionType};
use crate::services::aggregate::mutate_exam;
use crate::services::errors::AttemptError;
use crate::services::resolver::{resolve, Resolution};

const MARKS_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct GradingReport {
    pub(crate) objective: usize,
    pub(crate) theory: usize,
    pub(crate) skipped: usize,
}

/// Best-effort grading pass over every answer of `attempt`.
///
/// Unresolvable answers and duplicates are zeroed and skipped. Never touches the
/// published score.
pub(crate) fn grade_attempt(
    questions: &[Question],
    total_marks: f64,
    attempt: &mut Attempt,
) -> GradingReport {
    let mut report = GradingReport::default();
    let mut seen = HashSet::new();

    for answer in attempt.answers.iter_mut() {
        let number = Some(answer.question_number);
        let question = match resolve(questions, number, answer.question_ref.as_deref()) {
            Resolution::Found { question, .. } if seen.insert(question.question_number) => {
                question
            }
            Resolution::Found { question, .. } => {
                tracing::warn!(
                    attempt_id = %attempt.id,
                    question_number = question.question_number,
                    "Skipping duplicate answer during grading"
                );
                clear_evaluation(answer);
                report.skipped += 1;
                continue;
            }
            Resolution::NotFound => {
                tracing::warn!(
                    attempt_id = %attempt.id,
                    question_number = answer.question_number,
                    question_ref = ?answer.question_ref,
                    "Skipping answer with no matching question"
                );
                clear_evaluation(answer);
                report.skipped += 1;
                continue;
            }
        };

        answer.question_number = question.question_number;
        match question.question_type {
            QuestionType::Objective => {
                let correct = chosen_option(&answer.value, &question.options)
                    .is_some_and(|chosen| Some(chosen) == question.correct_option);
                answer.is_correct = Some(correct);
                answer.marks_obtained = if correct { question.marks } else { 0.0 };
                answer.needs_grading = false;
                report.objective += 1;
            }
            QuestionType::Theory => {
                if answer.graded_by.is_none() {
                    answer.is_correct = None;
                    answer.marks_obtained = 0.0;
                    answer.needs_grading = true;
                }
                report.theory += 1;
            }
        }
    }

    for question in questions {
        if question.question_type == QuestionType::Theory && !seen.contains(&question.question_number)
        {
            let mut blank = Answer::unanswered(question.question_number);
            blank.needs_grading = true;
            attempt.answers.push(blank);
            report.theory += 1;
        }
    }

    recompute(attempt, total_marks);
    report
}

/// Rebuilds the hidden score and grading status from the full answer set.
pub(crate) fn recompute(attempt: &mut Attempt, total_marks: f64) -> Score {
    let score: f64 = attempt.answers.iter().map(|answer| answer.marks_obtained).sum();
    let percentage = percentage_of(score, total_marks);
    let actual = Score { score, percentage };

    let needs_grading = attempt.answers.iter().any(|answer| answer.needs_grading);
    let manually_graded = attempt.answers.iter().any(|answer| answer.graded_by.is_some());

    attempt.needs_grading = needs_grading;
    attempt.grading_status = match (needs_grading, manually_graded) {
        (false, _) => GradingStatus::Completed,
        (true, true) => GradingStatus::Partial,
        (true, false) => GradingStatus::Pending,
    };
    attempt.score = std::mem::take(&mut attempt.score).with_actual(actual);

    actual
}

pub(crate) fn percentage_of(score: f64, total_marks: f64) -> f64 {
    if total_marks <= 0.0 {
        return 0.0;
    }
    ((score * 100.0 / total_marks) * 100.0).round() / 100.0
}

/// Option index picked by an objective answer: a raw index, the exact option text,
/// or a numeric string. Option text wins over index parsing so numeric labels work.
pub(crate) fn chosen_option(value: &AnswerValue, options: &[String]) -> Option<usize> {
    let index = match value {
        AnswerValue::Blank => return None,
        AnswerValue::Choice(index) => *index,
        AnswerValue::Text(text) => {
            let trimmed = text.trim();
            match options.iter().position(|option| option.trim() == trimmed) {
                Some(index) => index,
                None => trimmed.parse::<usize>().ok()?,
            }
        }
    };

    (index < options.len()).then_some(index)
}

fn clear_evaluation(answer: &mut Answer) {
    answer.is_correct = None;
    answer.marks_obtained = 0.0;
    answer.needs_grading = false;
}

#[derive(Debug, Clone)]
pub(crate) struct ManualGrade<'a> {
    pub(crate) student_id: &'a str,
    pub(crate) attempt_id: Option<&'a str>,
    pub(crate) question_number: u32,
    pub(crate) marks_obtained: f64,
    pub(crate) feedback: Option<String>,
    pub(crate) grader_id: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradeOutcome {
    pub(crate) attempt_id: String,
    pub(crate) question_number: u32,
    pub(crate) marks_obtained: f64,
    pub(crate) actual: Score,
    pub(crate) grading_status: GradingStatus,
}

/// Teacher decision for one theory answer, followed by a full recompute.
pub(crate) fn apply_manual_grade(
    exam: &mut Exam,
    grade: &ManualGrade<'_>,
    now: OffsetDateTime,
) -> Result<GradeOutcome, AttemptError> {
    if !grade.marks_obtained.is_finite() || grade.marks_obtained < 0.0 {
        return Err(AttemptError::validation("marks_obtained must be a non-negative number"));
    }

    let question = exam
        .question(grade.question_number)
        .ok_or_else(|| AttemptError::not_found("Question not found"))?;
    if question.question_type == QuestionType::Objective {
        return Err(AttemptError::validation(
            "Objective questions are graded automatically and cannot be graded manually",
        ));
    }
    if grade.marks_obtained > question.marks + MARKS_EPSILON {
        return Err(AttemptError::OutOfRange {
            question_number: grade.question_number,
            requested: grade.marks_obtained,
            max: question.marks,
        });
    }

    let index = match grade.attempt_id {
        Some(attempt_id) => exam
            .attempts
            .iter()
            .position(|attempt| attempt.id == attempt_id && attempt.student_id == grade.student_id),
        None => exam
            .attempts
            .iter()
            .enumerate()
            .filter(|(_, attempt)| attempt.student_id == grade.student_id && attempt.is_completed)
            .max_by_key(|(_, attempt)| attempt.attempt_number)
            .map(|(index, _)| index),
    }
    .ok_or_else(|| AttemptError::not_found("No submitted attempt found for this student"))?;

    let total_marks = exam.total_marks;
    let attempt = &mut exam.attempts[index];
    if !attempt.is_completed {
        return Err(AttemptError::state_conflict("Attempt has not been submitted yet"));
    }

    let position = match attempt
        .answers
        .iter()
        .position(|answer| answer.question_number == grade.question_number)
    {
        Some(position) => position,
        None => {
            attempt.answers.push(Answer::unanswered(grade.question_number));
            attempt.answers.len() - 1
        }
    };

    let answer = &mut attempt.answers[position];
    answer.marks_obtained = grade.marks_obtained;
    answer.is_correct = Some(grade.marks_obtained > 0.0);
    answer.needs_grading = false;
    answer.graded_by = Some(grade.grader_id.to_string());
    answer.graded_at = Some(now);
    answer.feedback = grade.feedback.clone();

    let actual = recompute(attempt, total_marks);
    if actual.score > total_marks + MARKS_EPSILON {
        return Err(AttemptError::OutOfRange {
            question_number: grade.question_number,
            requested: grade.marks_obtained,
            max: (total_marks - (actual.score - grade.marks_obtained)).max(0.0),
        });
    }
    attempt.updated_at = now;

    let outcome = GradeOutcome {
        attempt_id: attempt.id.clone(),
        question_number: grade.question_number,
        marks_obtained: grade.marks_obtained,
        actual,
        grading_status: attempt.grading_status,
    };

    exam.audit_log.push(AuditEntry {
        action: AuditAction::ManualGrade,
        actor: grade.grader_id.to_string(),
        student_id: Some(grade.student_id.to_string()),
        detail: format!(
            "attempt {} question {} marks {}",
            outcome.attempt_id, grade.question_number, grade.marks_obtained
        ),
        at: now,
    });

    Ok(outcome)
}

pub(crate) async fn grade_question(
    state: &AppState,
    exam_id: &str,
    grade: ManualGrade<'_>,
    now: OffsetDateTime,
) -> Result<GradeOutcome, AttemptError> {
    let outcome = mutate_exam(state.store(), exam_id, state.write_retries(), |exam| {
        apply_manual_grade(exam, &grade, now)
    })
    .await?;

    tracing::info!(
        exam_id,
        student_id = grade.student_id,
        attempt_id = %outcome.attempt_id,
        question_number = outcome.question_number,
        marks = outcome.marks_obtained,
        grading_status = ?outcome.grading_status,
        "Manual grade recorded"
    );

    Ok(outcome)
}

/// Visible score for a student: published values only once released and fully graded.
pub(crate) fn visible_score(attempt: &Attempt) -> Option<Score> {
    match &attempt.score {
        ScoreState::Released { published, .. }
            if attempt.grading_status == GradingStatus::Completed =>
        {
            Some(*published)
        }
        _ => None,
    }
}
