use std::collections::HashMap;

use crate::types::{EvaluationAttemptResult, EvaluationKind, Question, SubmittedAnswer};

/// Tallies answers against the questions that were handed out.
///
/// Unanswered questions count as wrong; answers to questions outside the set
/// are ignored. A later answer to the same question replaces an earlier one.
pub fn score_attempt(
    questions: &[Question],
    answers: &[SubmittedAnswer],
    kind: EvaluationKind,
) -> EvaluationAttemptResult {
    if questions.is_empty() {
        return EvaluationAttemptResult {
            score_percent: 0.0,
            questions_answered: 0,
            kind,
        };
    }

    let selected: HashMap<&str, usize> = answers
        .iter()
        .map(|a| (a.question_id.as_str(), a.selected_option))
        .collect();

    let mut answered = 0usize;
    let mut correct = 0usize;
    for question in questions {
        if let Some(&choice) = selected.get(question.id.as_str()) {
            answered += 1;
            if choice == question.correct_option {
                correct += 1;
            }
        }
    }

    EvaluationAttemptResult {
        score_percent: correct as f64 * 100.0 / questions.len() as f64,
        questions_answered: answered,
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, correct: usize) -> Question {
        Question {
            id: id.to_string(),
            prompt: String::new(),
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_option: correct,
            difficulty: 3,
        }
    }

    fn answer(id: &str, choice: usize) -> SubmittedAnswer {
        SubmittedAnswer {
            question_id: id.to_string(),
            selected_option: choice,
        }
    }

    #[test]
    fn test_tally() {
        let questions = vec![question("q1", 0), question("q2", 1), question("q3", 2), question("q4", 0)];
        let answers = vec![answer("q1", 0), answer("q2", 1), answer("q3", 0), answer("zz", 1)];
        let result = score_attempt(&questions, &answers, EvaluationKind::Module);
        assert_eq!(result.score_percent, 50.0);
        assert_eq!(result.questions_answered, 3);
    }

    #[test]
    fn test_empty_set_scores_zero() {
        let result = score_attempt(&[], &[answer("q1", 0)], EvaluationKind::Final);
        assert_eq!(result.score_percent, 0.0);
        assert_eq!(result.kind, EvaluationKind::Final);
    }
}
