//! Orchestration of the learning components against a [`LearningStore`].
//!
//! The engine holds no per-learner state of its own: every call loads what it
//! needs from the store, runs the pure components in [`crate::services`], and
//! writes the result back through the store's atomic operations.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::CourseCatalog;
use crate::db::{AttemptClaim, LearningStore};
use crate::error::EngineError;
use crate::services::cooldown::{self, CooldownDecision, LockStatus};
use crate::services::retention::{self, RetentionUpdate};
use crate::services::skill::{self, SkillUpdate};
use crate::services::{question_selector, scoring};
use crate::types::{
    AttemptLog, CourseDefinition, CourseModule, CourseTier, EvaluationAttemptResult,
    EvaluationKind, EvaluationTarget, LearnerProfile, ProgressEvent, ProgressKey, ProgressRecord,
    Question, SubmittedAnswer, SurveyBaseline,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCompletion {
    pub record: ProgressRecord,
    pub new_skill: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOutcome {
    pub attempt: EvaluationAttemptResult,
    pub cooldown: CooldownDecision,
    pub new_skill: f64,
    /// Present when the attempt passed and completed its module or course.
    pub record: Option<ProgressRecord>,
}

pub struct LearningEngine<S> {
    store: S,
    catalog: CourseCatalog,
}

fn validate_score(score_percent: f64) -> Result<(), EngineError> {
    if score_percent.is_finite() && (0.0..=100.0).contains(&score_percent) {
        Ok(())
    } else {
        Err(EngineError::InvalidScore(score_percent))
    }
}

/// Resolves submitted ids against the course's own pool. Repeated ids count
/// once; the set must be as large as the one `on_evaluation_start` hands out.
fn questions_from_pool(
    course_id: &str,
    target: EvaluationTarget,
    pool: &[Question],
    question_ids: &[String],
) -> Result<Vec<Question>, EngineError> {
    let mut seen = HashSet::new();
    let mut questions = Vec::with_capacity(question_ids.len());
    for question_id in question_ids {
        if !seen.insert(question_id.as_str()) {
            continue;
        }
        let question = pool
            .iter()
            .find(|q| &q.id == question_id)
            .ok_or_else(|| EngineError::UnknownQuestion {
                course_id: course_id.to_string(),
                target,
                question_id: question_id.clone(),
            })?;
        questions.push(question.clone());
    }

    let expected = question_selector::target_count(target.kind()).min(pool.len());
    if questions.len() != expected {
        return Err(EngineError::QuestionCount {
            expected,
            actual: questions.len(),
        });
    }
    Ok(questions)
}

fn module_of(course: &CourseDefinition, module_index: usize) -> Result<&CourseModule, EngineError> {
    course.module(module_index).ok_or_else(|| EngineError::UnknownModule {
        course_id: course.id.clone(),
        module_index,
    })
}

impl<S: LearningStore> LearningEngine<S> {
    pub fn new(store: S, catalog: CourseCatalog) -> Self {
        Self { store, catalog }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &CourseCatalog {
        &self.catalog
    }

    fn course(&self, course_id: &str) -> Result<&CourseDefinition, EngineError> {
        self.catalog
            .get(course_id)
            .ok_or_else(|| EngineError::UnknownCourse(course_id.to_string()))
    }

    fn validate_target(
        &self,
        course: &CourseDefinition,
        target: EvaluationTarget,
    ) -> Result<(), EngineError> {
        if let EvaluationTarget::Module { module_index } = target {
            module_of(course, module_index)?;
        }
        Ok(())
    }

    async fn require_profile(&self, learner_id: &str) -> Result<LearnerProfile, EngineError> {
        self.store
            .load_profile(learner_id)
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(learner_id.to_string()))
    }

    // ------------------------------------------------------------------
    // Onboarding
    // ------------------------------------------------------------------

    pub async fn register_learner(
        &self,
        learner_id: &str,
        diagnostic_score: f64,
        at: DateTime<Utc>,
    ) -> Result<LearnerProfile, EngineError> {
        validate_score(diagnostic_score)?;
        let profile = LearnerProfile::new(
            learner_id,
            skill::initial_skill_from_diagnostic(diagnostic_score),
            at,
        );

        if !self.store.insert_profile(&profile).await? {
            return Err(EngineError::ProfileExists(learner_id.to_string()));
        }

        info!(learner_id = %learner_id, skill = profile.skill, "learner registered");
        Ok(profile)
    }

    pub async fn record_survey(
        &self,
        learner_id: &str,
        experience_years: f64,
        baseline_recall: f64,
        at: DateTime<Utc>,
    ) -> Result<LearnerProfile, EngineError> {
        if !experience_years.is_finite() || experience_years < 0.0 {
            return Err(EngineError::InvalidSurvey("experience years must be non-negative"));
        }
        if !(0.0..=1.0).contains(&baseline_recall) {
            return Err(EngineError::InvalidSurvey("baseline recall must be within 0..=1"));
        }

        let (profile, recorded) = self
            .store
            .update_profile(learner_id, |profile| {
                if profile.baseline.is_recorded() {
                    return false;
                }
                profile.baseline = SurveyBaseline::Recorded {
                    experience_years,
                    baseline_recall,
                };
                profile.updated_at = at;
                true
            })
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(learner_id.to_string()))?;

        if !recorded {
            return Err(EngineError::SurveyAlreadyRecorded(learner_id.to_string()));
        }

        debug!(learner_id = %learner_id, experience_years, baseline_recall, "survey recorded");
        Ok(profile)
    }

    // ------------------------------------------------------------------
    // Progress events
    // ------------------------------------------------------------------

    pub async fn on_content_viewed(
        &self,
        learner_id: &str,
        course_id: &str,
        module_index: usize,
        content_index: usize,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, EngineError> {
        let course = self.course(course_id)?;
        let module = module_of(course, module_index)?;
        if content_index >= module.contents.len() {
            return Err(EngineError::UnknownContent {
                course_id: course_id.to_string(),
                module_index,
                content_index,
            });
        }

        let key = ProgressKey::new(learner_id, course_id);
        let event = ProgressEvent::ContentViewed {
            module_index,
            content_index,
            at,
        };
        let record = self.store.apply_progress(&key, &event, course).await?;

        debug!(
            learner_id = %learner_id,
            course_id = %course_id,
            module_index,
            content_index,
            completion = record.completion_percent,
            "content viewed"
        );
        Ok(record)
    }

    pub async fn on_module_completed(
        &self,
        learner_id: &str,
        course_id: &str,
        module_index: usize,
        score_percent: f64,
        at: DateTime<Utc>,
    ) -> Result<ModuleCompletion, EngineError> {
        validate_score(score_percent)?;
        let course = self.course(course_id)?;
        module_of(course, module_index)?;
        self.require_profile(learner_id).await?;

        let key = ProgressKey::new(learner_id, course_id);
        let event = ProgressEvent::ModuleCompleted {
            module_index,
            score: score_percent,
            at,
        };
        let record = self.store.apply_progress(&key, &event, course).await?;
        let new_skill = self
            .apply_completion(learner_id, course.tier, score_percent, EvaluationKind::Module, at)
            .await?;

        info!(
            learner_id = %learner_id,
            course_id = %course_id,
            module_index,
            score = score_percent,
            new_skill,
            completion = record.completion_percent,
            "module completed"
        );
        Ok(ModuleCompletion { record, new_skill })
    }

    pub async fn on_final_evaluation_completed(
        &self,
        learner_id: &str,
        course_id: &str,
        score_percent: f64,
        at: DateTime<Utc>,
    ) -> Result<ModuleCompletion, EngineError> {
        validate_score(score_percent)?;
        let course = self.course(course_id)?;
        self.require_profile(learner_id).await?;

        let key = ProgressKey::new(learner_id, course_id);
        let record = self
            .store
            .apply_progress(&key, &ProgressEvent::FinalEvaluationCompleted { at }, course)
            .await?;
        let new_skill = self
            .apply_completion(learner_id, course.tier, score_percent, EvaluationKind::Final, at)
            .await?;

        info!(
            learner_id = %learner_id,
            course_id = %course_id,
            score = score_percent,
            new_skill,
            "course completed"
        );
        Ok(ModuleCompletion { record, new_skill })
    }

    pub async fn on_restart(
        &self,
        learner_id: &str,
        course_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, EngineError> {
        let course = self.course(course_id)?;
        let key = ProgressKey::new(learner_id, course_id);
        let record = self
            .store
            .apply_progress(&key, &ProgressEvent::Restart { at }, course)
            .await?;

        info!(learner_id = %learner_id, course_id = %course_id, "course progress restarted");
        Ok(record)
    }

    /// Skill and retention update for a completion event at `at`.
    ///
    /// Retention is evaluated at the moment of completion, so a surveyed
    /// learner gets `0.0` here; later decay comes from [`Self::refresh_retention`].
    async fn apply_completion(
        &self,
        learner_id: &str,
        tier: CourseTier,
        score_percent: f64,
        kind: EvaluationKind,
        at: DateTime<Utc>,
    ) -> Result<f64, EngineError> {
        let (profile, (skill_update, retention_update)) = self
            .store
            .update_profile(learner_id, |profile| {
                let skill_update = skill::update(profile, tier, score_percent, kind);
                if skill_update.applied {
                    profile.skill = skill_update.new_skill;
                }
                let retention_update = retention::update(profile, at, at);
                profile.retention = retention_update.resolve(profile.retention);
                profile.last_completion_at = Some(at);
                profile.updated_at = at;
                (skill_update, retention_update)
            })
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(learner_id.to_string()))?;

        log_skill_update(learner_id, &skill_update);
        if let RetentionUpdate::Skipped { reason } = retention_update {
            debug!(learner_id = %learner_id, ?reason, "retention not updated");
        }
        Ok(profile.skill)
    }

    async fn apply_skill(
        &self,
        learner_id: &str,
        tier: CourseTier,
        score_percent: f64,
        kind: EvaluationKind,
        at: DateTime<Utc>,
    ) -> Result<f64, EngineError> {
        let (profile, skill_update) = self
            .store
            .update_profile(learner_id, |profile| {
                let skill_update = skill::update(profile, tier, score_percent, kind);
                if skill_update.applied {
                    profile.skill = skill_update.new_skill;
                    profile.updated_at = at;
                }
                skill_update
            })
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(learner_id.to_string()))?;

        log_skill_update(learner_id, &skill_update);
        Ok(profile.skill)
    }

    /// Re-evaluates retention against the learner's last completion.
    pub async fn refresh_retention(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>, EngineError> {
        let (_, retention) = self
            .store
            .update_profile(learner_id, |profile| {
                if let Some(completed_at) = profile.last_completion_at {
                    let update = retention::update(profile, completed_at, now);
                    if let RetentionUpdate::Updated { .. } = update {
                        profile.retention = update.resolve(profile.retention);
                        profile.updated_at = now;
                    }
                }
                profile.retention
            })
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(learner_id.to_string()))?;

        Ok(retention)
    }

    // ------------------------------------------------------------------
    // Evaluations
    // ------------------------------------------------------------------

    pub async fn cooldown_status(
        &self,
        learner_id: &str,
        course_id: &str,
        target: EvaluationTarget,
        now: DateTime<Utc>,
    ) -> Result<LockStatus, EngineError> {
        let key = ProgressKey::new(learner_id, course_id);
        let status = match self.store.last_attempt(&key, target).await? {
            Some(attempt) => cooldown::is_locked(attempt.attempted_at, attempt.cooldown_minutes, now),
            None => LockStatus::unlocked(),
        };
        Ok(status)
    }

    async fn ensure_unlocked(
        &self,
        learner_id: &str,
        course_id: &str,
        target: EvaluationTarget,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let status = self.cooldown_status(learner_id, course_id, target, now).await?;
        if status.locked {
            return Err(cooldown_rejection(learner_id, course_id, target, status));
        }
        Ok(())
    }

    fn pool_for<'c>(
        &self,
        course: &'c CourseDefinition,
        target: EvaluationTarget,
    ) -> Result<&'c [Question], EngineError> {
        self.validate_target(course, target)?;
        course
            .evaluation_pool(target)
            .ok_or_else(|| EngineError::NoEvaluation {
                course_id: course.id.clone(),
                target,
            })
    }

    /// Hands out a skill-biased question set once the retake lock has expired.
    pub async fn on_evaluation_start(
        &self,
        learner_id: &str,
        course_id: &str,
        target: EvaluationTarget,
        now: DateTime<Utc>,
    ) -> Result<Vec<Question>, EngineError> {
        let course = self.course(course_id)?;
        let pool = self.pool_for(course, target)?;

        self.ensure_unlocked(learner_id, course_id, target, now).await?;
        let profile = self.require_profile(learner_id).await?;

        let target_count = question_selector::target_count(target.kind());
        let questions = {
            let mut rng = rand::rng();
            question_selector::select(pool, profile.skill, target_count, &mut rng)
        };

        debug!(
            learner_id = %learner_id,
            course_id = %course_id,
            target = %target.storage_key(),
            pool_size = pool.len(),
            selected = questions.len(),
            "evaluation started"
        );
        Ok(questions)
    }

    /// Scores a submission against the course's own question pool, records the
    /// retake lock and, on a pass, completes the module or course.
    ///
    /// `question_ids` is the set handed out by [`Self::on_evaluation_start`].
    /// The lock check and the attempt write are a single store call.
    pub async fn on_evaluation_submitted(
        &self,
        learner_id: &str,
        course_id: &str,
        target: EvaluationTarget,
        question_ids: &[String],
        answers: &[SubmittedAnswer],
        at: DateTime<Utc>,
    ) -> Result<EvaluationOutcome, EngineError> {
        let course = self.course(course_id)?;
        let pool = self.pool_for(course, target)?;
        let questions = questions_from_pool(course_id, target, pool, question_ids)?;
        self.require_profile(learner_id).await?;

        let attempt = scoring::score_attempt(&questions, answers, target.kind());
        let decision = cooldown::evaluate(attempt.score_percent);

        let key = ProgressKey::new(learner_id, course_id);
        let log = AttemptLog {
            target,
            score_percent: attempt.score_percent,
            cooldown_minutes: decision.cooldown_minutes,
            attempted_at: at,
        };
        if let AttemptClaim::Locked(status) = self.store.try_record_attempt(&key, &log).await? {
            return Err(cooldown_rejection(learner_id, course_id, target, status));
        }

        let (new_skill, record) = if decision.passed {
            let completion = match target {
                EvaluationTarget::Module { module_index } => {
                    self.on_module_completed(learner_id, course_id, module_index, attempt.score_percent, at)
                        .await?
                }
                EvaluationTarget::Final => {
                    self.on_final_evaluation_completed(learner_id, course_id, attempt.score_percent, at)
                        .await?
                }
            };
            (completion.new_skill, Some(completion.record))
        } else {
            let skill = self
                .apply_skill(learner_id, course.tier, attempt.score_percent, target.kind(), at)
                .await?;
            (skill, None)
        };

        info!(
            learner_id = %learner_id,
            course_id = %course_id,
            target = %target.storage_key(),
            score = attempt.score_percent,
            passed = decision.passed,
            cooldown_minutes = decision.cooldown_minutes,
            "evaluation submitted"
        );

        Ok(EvaluationOutcome {
            attempt,
            cooldown: decision,
            new_skill,
            record,
        })
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub async fn get_skill(&self, learner_id: &str) -> Result<f64, EngineError> {
        Ok(self.require_profile(learner_id).await?.skill)
    }

    pub async fn get_retention(&self, learner_id: &str) -> Result<Option<f64>, EngineError> {
        Ok(self.require_profile(learner_id).await?.retention)
    }

    pub async fn get_progress(
        &self,
        learner_id: &str,
        course_id: &str,
    ) -> Result<Option<ProgressRecord>, EngineError> {
        let key = ProgressKey::new(learner_id, course_id);
        Ok(self.store.load_progress(&key).await?)
    }
}

fn cooldown_rejection(
    learner_id: &str,
    course_id: &str,
    target: EvaluationTarget,
    status: LockStatus,
) -> EngineError {
    warn!(
        learner_id = %learner_id,
        course_id = %course_id,
        target = %target.storage_key(),
        minutes_remaining = status.minutes_remaining,
        "evaluation requested during cooldown"
    );
    EngineError::CooldownActive {
        minutes_remaining: status.minutes_remaining,
    }
}

fn log_skill_update(learner_id: &str, update: &SkillUpdate) {
    if update.applied {
        debug!(
            learner_id = %learner_id,
            previous = update.previous,
            delta = update.delta,
            new_skill = update.new_skill,
            "skill updated"
        );
    } else {
        debug!(learner_id = %learner_id, delta = update.delta, "skill delta below threshold");
    }
}
