use thiserror::Error;

use crate::db::StoreError;
use crate::types::EvaluationTarget;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("score must be within 0..=100, got {0}")]
    InvalidScore(f64),
    #[error("unknown course: {0}")]
    UnknownCourse(String),
    #[error("course {course_id} has no module {module_index}")]
    UnknownModule { course_id: String, module_index: usize },
    #[error("module {module_index} of course {course_id} has no content item {content_index}")]
    UnknownContent {
        course_id: String,
        module_index: usize,
        content_index: usize,
    },
    #[error("course {course_id} has no question pool for {target:?}")]
    NoEvaluation {
        course_id: String,
        target: EvaluationTarget,
    },
    #[error("question {question_id} is not in the {target:?} pool of course {course_id}")]
    UnknownQuestion {
        course_id: String,
        target: EvaluationTarget,
        question_id: String,
    },
    #[error("submission covers {actual} question(s), expected {expected}")]
    QuestionCount { expected: usize, actual: usize },
    #[error("learner profile not found: {0}")]
    ProfileNotFound(String),
    #[error("learner profile already exists: {0}")]
    ProfileExists(String),
    #[error("survey already recorded for learner {0}")]
    SurveyAlreadyRecorded(String),
    #[error("invalid survey answer: {0}")]
    InvalidSurvey(&'static str),
    #[error("evaluation locked for another {minutes_remaining} minute(s)")]
    CooldownActive { minutes_remaining: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Caller-side input problems, as opposed to storage failures.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}
