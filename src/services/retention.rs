use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LearnerProfile, SurveyBaseline};

pub const MILLIS_PER_YEAR: f64 = 365.25 * 24.0 * 60.0 * 60.0 * 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingBaseline,
    NoExperience,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetentionUpdate {
    Updated { retention: f64, elapsed_years: f64 },
    Skipped { reason: SkipReason },
}

impl RetentionUpdate {
    /// Retention value after this update, given the value stored before it.
    pub fn resolve(&self, current: Option<f64>) -> Option<f64> {
        match self {
            Self::Updated { retention, .. } => Some(*retention),
            Self::Skipped { .. } => current,
        }
    }
}

pub fn elapsed_years(completed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - completed_at).num_milliseconds().max(0);
    millis as f64 / MILLIS_PER_YEAR
}

/// Evaluates `clamp(elapsed * recall / experience, 0, 1)` against the
/// completion that triggered it.
pub fn update(
    profile: &LearnerProfile,
    completed_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> RetentionUpdate {
    let (experience_years, baseline_recall) = match profile.baseline {
        SurveyBaseline::Missing => {
            return RetentionUpdate::Skipped {
                reason: SkipReason::MissingBaseline,
            }
        }
        SurveyBaseline::Recorded {
            experience_years,
            baseline_recall,
        } => (experience_years, baseline_recall),
    };

    if !experience_years.is_finite() || experience_years <= 0.0 {
        return RetentionUpdate::Skipped {
            reason: SkipReason::NoExperience,
        };
    }

    let elapsed = elapsed_years(completed_at, now);
    let retention = (elapsed * baseline_recall / experience_years).clamp(0.0, 1.0);

    RetentionUpdate::Updated {
        retention,
        elapsed_years: elapsed,
    }
}
