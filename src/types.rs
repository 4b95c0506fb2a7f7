//! Shared data model for learners, courses and per-course progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_SKILL: f64 = 1.0;
pub const MAX_SKILL: f64 = 5.0;
pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseTier {
    Basic,
    Intermediate,
    Advanced,
}

impl CourseTier {
    /// Skill level a learner must stay below for positive band deltas to apply.
    pub fn skill_ceiling(&self) -> f64 {
        match self {
            Self::Basic => 3.0,
            Self::Intermediate => 4.0,
            Self::Advanced => 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationKind {
    Module,
    Final,
}

/// Which evaluation of a course an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationTarget {
    Module { module_index: usize },
    Final,
}

impl EvaluationTarget {
    pub fn kind(&self) -> EvaluationKind {
        match self {
            Self::Module { .. } => EvaluationKind::Module,
            Self::Final => EvaluationKind::Final,
        }
    }

    pub fn storage_key(&self) -> String {
        match self {
            Self::Module { module_index } => format!("module:{module_index}"),
            Self::Final => "final".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

// ============================================================================
// Learner
// ============================================================================

/// Survey answers collected once at onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SurveyBaseline {
    #[default]
    Missing,
    Recorded {
        experience_years: f64,
        baseline_recall: f64,
    },
}

impl SurveyBaseline {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProfile {
    pub learner_id: String,
    pub skill: f64,
    pub retention: Option<f64>,
    #[serde(default)]
    pub baseline: SurveyBaseline,
    pub last_completion_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl LearnerProfile {
    pub fn new(learner_id: impl Into<String>, skill: f64, at: DateTime<Utc>) -> Self {
        Self {
            learner_id: learner_id.into(),
            skill: skill.clamp(MIN_SKILL, MAX_SKILL),
            retention: None,
            baseline: SurveyBaseline::Missing,
            last_completion_at: None,
            updated_at: at,
        }
    }
}

// ============================================================================
// Course catalog
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_option: usize,
    pub difficulty: u8,
}

pub type QuestionPool = Vec<Question>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    pub title: String,
    #[serde(default)]
    pub contents: Vec<ContentItem>,
    #[serde(default)]
    pub evaluation: Option<QuestionPool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDefinition {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub tier: CourseTier,
    pub modules: Vec<CourseModule>,
    #[serde(default)]
    pub final_evaluation: Option<QuestionPool>,
}

impl CourseDefinition {
    pub fn module(&self, module_index: usize) -> Option<&CourseModule> {
        self.modules.get(module_index)
    }

    pub fn evaluation_pool(&self, target: EvaluationTarget) -> Option<&[Question]> {
        match target {
            EvaluationTarget::Module { module_index } => self
                .module(module_index)
                .and_then(|m| m.evaluation.as_deref()),
            EvaluationTarget::Final => self.final_evaluation.as_deref(),
        }
    }
}

// ============================================================================
// Progress
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressKey {
    pub learner_id: String,
    pub course_id: String,
}

impl ProgressKey {
    pub fn new(learner_id: impl Into<String>, course_id: impl Into<String>) -> Self {
        Self {
            learner_id: learner_id.into(),
            course_id: course_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedModule {
    pub module_index: usize,
    pub score: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewedContent {
    pub module_index: usize,
    pub content_index: usize,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub id: String,
    pub learner_id: String,
    pub course_id: String,
    pub current_module: usize,
    pub current_content: usize,
    /// At most one entry per module index, kept sorted by index.
    pub completed_modules: Vec<CompletedModule>,
    /// At most one entry per (module, content) pair, kept sorted.
    pub viewed_content: Vec<ViewedContent>,
    pub completion_percent: u8,
    pub final_evaluation_completed: bool,
    pub course_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub lifecycle_state: LifecycleState,
    pub last_updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(key: &ProgressKey, at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            learner_id: key.learner_id.clone(),
            course_id: key.course_id.clone(),
            current_module: 0,
            current_content: 0,
            completed_modules: Vec::new(),
            viewed_content: Vec::new(),
            completion_percent: 0,
            final_evaluation_completed: false,
            course_completed: false,
            completed_at: None,
            lifecycle_state: LifecycleState::NotStarted,
            last_updated_at: at,
        }
    }

    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(self.learner_id.clone(), self.course_id.clone())
    }

    pub fn is_module_completed(&self, module_index: usize) -> bool {
        self.completed_modules
            .iter()
            .any(|m| m.module_index == module_index)
    }

    pub fn upsert_viewed(&mut self, module_index: usize, content_index: usize, at: DateTime<Utc>) {
        match self
            .viewed_content
            .binary_search_by_key(&(module_index, content_index), |v| {
                (v.module_index, v.content_index)
            }) {
            Ok(pos) => self.viewed_content[pos].viewed_at = at,
            Err(pos) => self.viewed_content.insert(
                pos,
                ViewedContent {
                    module_index,
                    content_index,
                    viewed_at: at,
                },
            ),
        }
    }

    pub fn upsert_completed(&mut self, module_index: usize, score: f64, at: DateTime<Utc>) {
        match self
            .completed_modules
            .binary_search_by_key(&module_index, |m| m.module_index)
        {
            Ok(pos) => {
                let entry = &mut self.completed_modules[pos];
                entry.score = score;
                entry.completed_at = at;
            }
            Err(pos) => self.completed_modules.insert(
                pos,
                CompletedModule {
                    module_index,
                    score,
                    completed_at: at,
                },
            ),
        }
    }
}

/// Raw progress mutation applied atomically by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    ContentViewed {
        module_index: usize,
        content_index: usize,
        at: DateTime<Utc>,
    },
    ModuleCompleted {
        module_index: usize,
        score: f64,
        at: DateTime<Utc>,
    },
    FinalEvaluationCompleted {
        at: DateTime<Utc>,
    },
    Restart {
        at: DateTime<Utc>,
    },
}

impl ProgressEvent {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::ContentViewed { at, .. }
            | Self::ModuleCompleted { at, .. }
            | Self::FinalEvaluationCompleted { at }
            | Self::Restart { at } => *at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSnapshot {
    pub completion_percent: u8,
    pub lifecycle_state: LifecycleState,
}

// ============================================================================
// Evaluations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationAttemptResult {
    pub score_percent: f64,
    pub questions_answered: usize,
    pub kind: EvaluationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub selected_option: usize,
}

/// Last attempt at one evaluation, kept for the retake lock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptLog {
    pub target: EvaluationTarget,
    pub score_percent: f64,
    pub cooldown_minutes: u32,
    pub attempted_at: DateTime<Utc>,
}
