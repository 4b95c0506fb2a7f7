use serde::{Deserialize, Serialize};

use crate::types::{CourseTier, EvaluationKind, LearnerProfile, MAX_SKILL, MIN_SKILL};

const PERSIST_THRESHOLD: f64 = 0.1;
const FINAL_FAILURE_DELTA: f64 = -0.5;
const FINAL_HONORS_BONUS: f64 = 0.2;
const ADVANCED_FAILURE_DELTA: f64 = -0.3;
const ADVANCED_FAILURE_FLOOR: f64 = 3.0;
const DIAGNOSTIC_POINTS_PER_LEVEL: f64 = 25.0;
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillUpdate {
    pub previous: f64,
    pub delta: f64,
    pub new_skill: f64,
    /// False when the delta was below the persistence threshold.
    pub applied: bool,
}

pub fn clamp_skill(skill: f64) -> f64 {
    skill.clamp(MIN_SKILL, MAX_SKILL)
}

/// Delta from the tier/score table alone.
pub fn band_delta(tier: CourseTier, skill: f64, score_percent: f64) -> f64 {
    let below_ceiling = skill < tier.skill_ceiling();

    if score_percent >= 90.0 {
        if !below_ceiling {
            return 0.0;
        }
        match tier {
            CourseTier::Advanced => 0.5,
            CourseTier::Intermediate => 0.4,
            CourseTier::Basic => 0.3,
        }
    } else if score_percent >= 80.0 {
        if !below_ceiling {
            return 0.0;
        }
        match tier {
            CourseTier::Advanced => 0.3,
            CourseTier::Intermediate => 0.2,
            CourseTier::Basic => 0.15,
        }
    } else if score_percent >= 70.0 {
        if !below_ceiling {
            return 0.0;
        }
        match tier {
            CourseTier::Advanced => 0.2,
            CourseTier::Intermediate => 0.1,
            CourseTier::Basic => 0.0,
        }
    } else if score_percent >= 60.0 {
        0.0
    } else {
        match tier {
            CourseTier::Advanced if skill > ADVANCED_FAILURE_FLOOR => ADVANCED_FAILURE_DELTA,
            _ => 0.0,
        }
    }
}

pub fn skill_delta(tier: CourseTier, skill: f64, score_percent: f64, kind: EvaluationKind) -> f64 {
    if kind == EvaluationKind::Final && score_percent < 60.0 {
        return FINAL_FAILURE_DELTA;
    }

    let mut delta = band_delta(tier, skill, score_percent);
    if kind == EvaluationKind::Final && score_percent >= 80.0 && skill < tier.skill_ceiling() {
        delta += FINAL_HONORS_BONUS;
    }
    delta
}

/// Applies one evaluation score to the learner's skill.
///
/// `score_percent` must already be validated to lie in `[0, 100]`.
pub fn update(
    profile: &LearnerProfile,
    tier: CourseTier,
    score_percent: f64,
    kind: EvaluationKind,
) -> SkillUpdate {
    let previous = profile.skill;
    let delta = skill_delta(tier, previous, score_percent, kind);

    if delta.abs() + EPSILON < PERSIST_THRESHOLD {
        return SkillUpdate {
            previous,
            delta,
            new_skill: previous,
            applied: false,
        };
    }

    SkillUpdate {
        previous,
        delta,
        new_skill: clamp_skill(previous + delta),
        applied: true,
    }
}

/// Starting skill from the one-time diagnostic test, rounded to one decimal.
pub fn initial_skill_from_diagnostic(score_percent: f64) -> f64 {
    let raw = MIN_SKILL + score_percent.clamp(0.0, 100.0) / DIAGNOSTIC_POINTS_PER_LEVEL;
    clamp_skill((raw * 10.0).round() / 10.0)
}
