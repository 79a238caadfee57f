use crate::core::time::{format_offset, format_optional};
use crate::db::models::{Answer, Attempt, Exam, ScoreState};
use crate::schemas::attempt::{
    ExamGradingResponse, GradedAnswerView, QuestionResult, ResultStatus, StudentResultResponse,
    TeacherAttemptView,
};
use crate::services::errors::AttemptError;
use crate::services::grading::visible_score;

/// Student-facing view of the latest completed attempt. Scores stay at zero
/// until they are released and fully graded.
pub(crate) fn student_result(
    exam: &Exam,
    student_id: &str,
) -> Result<StudentResultResponse, AttemptError> {
    let attempt = exam
        .latest_completed_attempt(student_id)
        .ok_or_else(|| AttemptError::not_found("No submitted attempt found for this exam"))?;

    let visible = visible_score(attempt);
    let breakdown = match visible {
        Some(_) if exam.options.show_results => Some(question_breakdown(exam, attempt)),
        _ => None,
    };

    Ok(StudentResultResponse {
        exam_id: exam.id.clone(),
        attempt_id: attempt.id.clone(),
        attempt_number: attempt.attempt_number,
        submitted_at: format_optional(attempt.submitted_at),
        score: visible.map(|score| score.score).unwrap_or(0.0),
        percentage: visible.map(|score| score.percentage).unwrap_or(0.0),
        status: if visible.is_some() { ResultStatus::Released } else { ResultStatus::Pending },
        grading_status: attempt.grading_status,
        results_released: attempt.score.is_released(),
        released_at: format_optional(attempt.score.released_at()),
        passed: visible.map(|score| score.score >= exam.passing_marks),
        per_question_breakdown: breakdown,
    })
}

fn question_breakdown(exam: &Exam, attempt: &Attempt) -> Vec<QuestionResult> {
    exam.questions
        .iter()
        .map(|question| {
            let answer = attempt.answer(question.question_number);
            QuestionResult {
                question_number: question.question_number,
                question_type: question.question_type,
                marks: question.marks,
                answer: answer.map(|a| a.value.clone()).unwrap_or_default(),
                is_correct: answer.and_then(|a| a.is_correct),
                marks_obtained: answer.map(|a| a.marks_obtained).unwrap_or(0.0),
                feedback: answer.and_then(|a| a.feedback.clone()),
            }
        })
        .collect()
}

fn graded_answer(exam: &Exam, answer: &Answer) -> GradedAnswerView {
    let question = exam.question(answer.question_number);
    GradedAnswerView {
        question_number: answer.question_number,
        question_type: question.map(|q| q.question_type),
        max_marks: question.map(|q| q.marks),
        answer: answer.value.clone(),
        is_correct: answer.is_correct,
        marks_obtained: answer.marks_obtained,
        needs_grading: answer.needs_grading,
        graded_by: answer.graded_by.clone(),
        graded_at: format_optional(answer.graded_at),
        feedback: answer.feedback.clone(),
        time_spent_seconds: answer.time_spent_seconds,
    }
}

/// Teacher view: hidden scores and pending work regardless of release state.
pub(crate) fn teacher_attempt_view(exam: &Exam, attempt: &Attempt) -> TeacherAttemptView {
    let actual = attempt.score.actual().unwrap_or_default();
    let published = match &attempt.score {
        ScoreState::Released { published, .. } => Some(published.score),
        _ => None,
    };

    TeacherAttemptView {
        attempt_id: attempt.id.clone(),
        student_id: attempt.student_id.clone(),
        student_name: attempt.student_name.clone(),
        attempt_number: attempt.attempt_number,
        is_completed: attempt.is_completed,
        started_at: format_offset(attempt.started_at),
        submitted_at: format_optional(attempt.submitted_at),
        submit_mode: attempt.submit_mode,
        actual_score: actual.score,
        actual_percentage: actual.percentage,
        published_score: published,
        grading_status: attempt.grading_status,
        results_released: attempt.score.is_released(),
        released_at: format_optional(attempt.score.released_at()),
        answers: attempt.answers.iter().map(|answer| graded_answer(exam, answer)).collect(),
        pending_answers: attempt
            .answers
            .iter()
            .filter(|answer| answer.needs_grading)
            .map(|answer| graded_answer(exam, answer))
            .collect(),
    }
}

pub(crate) fn exam_grading(exam: &Exam, student_id: Option<&str>) -> ExamGradingResponse {
    let attempts: Vec<TeacherAttemptView> = exam
        .attempts
        .iter()
        .filter(|attempt| student_id.map_or(true, |id| attempt.student_id == id))
        .map(|attempt| teacher_attempt_view(exam, attempt))
        .collect();

    ExamGradingResponse {
        exam_id: exam.id.clone(),
        title: exam.title.clone(),
        total_marks: exam.total_marks,
        passing_marks: exam.passing_marks,
        pending_count: attempts.iter().filter(|view| !view.pending_answers.is_empty()).count(),
        attempts,
    }
}
