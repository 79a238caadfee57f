//! Maps whatever a client sent to identify a question onto the exam's question set.
//!
//! Precedence is fixed: explicit `question_number` first, then a catalog id equal to
//! the reference, then a legacy textual pattern (`q3`, `question_3`, `Q-3`, `3`).

use crate::db::models::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchedBy {
    Number,
    CatalogId,
    LegacyPattern,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Resolution<'q> {
    Found { question: &'q Question, matched_by: MatchedBy },
    NotFound,
}

pub(crate) fn resolve<'q>(
    questions: &'q [Question],
    number: Option<u32>,
    reference: Option<&str>,
) -> Resolution<'q> {
    if let Some(number) = number.filter(|value| *value > 0) {
        if let Some(question) = by_number(questions, number) {
            return Resolution::Found { question, matched_by: MatchedBy::Number };
        }
    }

    let Some(reference) = reference.map(str::trim).filter(|value| !value.is_empty()) else {
        return Resolution::NotFound;
    };

    if let Some(question) =
        questions.iter().find(|question| question.id.as_deref() == Some(reference))
    {
        return Resolution::Found { question, matched_by: MatchedBy::CatalogId };
    }

    parse_legacy_reference(reference)
        .and_then(|number| by_number(questions, number))
        .map(|question| Resolution::Found { question, matched_by: MatchedBy::LegacyPattern })
        .unwrap_or(Resolution::NotFound)
}

fn by_number(questions: &[Question], number: u32) -> Option<&Question> {
    questions.iter().find(|question| question.question_number == number)
}

/// Accepts `3`, `q3`, `Q_3`, `question-3`, `question 3`.
pub(crate) fn parse_legacy_reference(reference: &str) -> Option<u32> {
    let lowered = reference.trim().to_ascii_lowercase();
    let rest = lowered
        .strip_prefix("question")
        .or_else(|| lowered.strip_prefix('q'))
        .unwrap_or(&lowered);
    let digits = rest.trim_start_matches(['_', '-', ' ', '#']);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    digits.parse::<u32>().ok().filter(|number| *number > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::QuestionType;

    fn question(number: u32, id: Option<&str>) -> Question {
        Question {
            question_number: number,
            id: id.map(str::to_string),
            text: format!("Question {number}"),
            question_type: QuestionType::Theory,
            marks: 1.0,
            options: Vec::new(),
            correct_option: None,
        }
    }

    #[test]
    fn number_takes_precedence_over_reference() {
        let questions = vec![question(1, Some("q2")), question(2, None)];
        let resolution = resolve(&questions, Some(2), Some("q2"));
        assert_eq!(
            resolution,
            Resolution::Found { question: &questions[1], matched_by: MatchedBy::Number }
        );
    }

    #[test]
    fn catalog_id_beats_legacy_pattern() {
        let questions = vec![question(1, Some("q2")), question(2, None)];
        let resolution = resolve(&questions, None, Some("q2"));
        assert_eq!(
            resolution,
            Resolution::Found { question: &questions[0], matched_by: MatchedBy::CatalogId }
        );
    }

    #[test]
    fn unknown_number_falls_back_to_reference() {
        let questions = vec![question(1, None), question(2, None)];
        let resolution = resolve(&questions, Some(9), Some("question_2"));
        assert_eq!(
            resolution,
            Resolution::Found { question: &questions[1], matched_by: MatchedBy::LegacyPattern }
        );
    }

    #[test]
    fn zero_number_without_reference_is_not_found() {
        let questions = vec![question(1, None)];
        assert_eq!(resolve(&questions, Some(0), None), Resolution::NotFound);
        assert_eq!(resolve(&questions, None, Some("   ")), Resolution::NotFound);
        assert_eq!(resolve(&questions, None, Some("q7")), Resolution::NotFound);
    }

    #[test]
    fn legacy_patterns() {
        assert_eq!(parse_legacy_reference("3"), Some(3));
        assert_eq!(parse_legacy_reference("q3"), Some(3));
        assert_eq!(parse_legacy_reference("Q_12"), Some(12));
        assert_eq!(parse_legacy_reference("question-4"), Some(4));
        assert_eq!(parse_legacy_reference("Question 5"), Some(5));
        assert_eq!(parse_legacy_reference("q0"), None);
        assert_eq!(parse_legacy_reference("quiz"), None);
        assert_eq!(parse_legacy_reference("q3a"), None);
    }
}
