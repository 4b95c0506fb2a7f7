use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MILLIS_PER_MINUTE: f64 = 60_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownDecision {
    pub cooldown_minutes: u32,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub locked: bool,
    pub minutes_remaining: u32,
}

impl LockStatus {
    pub fn unlocked() -> Self {
        Self {
            locked: false,
            minutes_remaining: 0,
        }
    }
}

/// Retake wait for a score in `[0, 100]`.
pub fn evaluate(score_percent: f64) -> CooldownDecision {
    let (cooldown_minutes, passed) = if score_percent <= 10.0 {
        (60, false)
    } else if score_percent <= 30.0 {
        (45, false)
    } else if score_percent <= 60.0 {
        (30, false)
    } else if score_percent < 70.0 {
        (15, false)
    } else {
        (0, true)
    };

    CooldownDecision {
        cooldown_minutes,
        passed,
    }
}

pub fn is_locked(last_attempt_at: DateTime<Utc>, cooldown_minutes: u32, now: DateTime<Utc>) -> LockStatus {
    if cooldown_minutes == 0 {
        return LockStatus::unlocked();
    }

    let elapsed_minutes = (now - last_attempt_at).num_milliseconds().max(0) as f64 / MILLIS_PER_MINUTE;
    let cooldown = f64::from(cooldown_minutes);

    if elapsed_minutes >= cooldown {
        return LockStatus::unlocked();
    }

    LockStatus {
        locked: true,
        minutes_remaining: (cooldown - elapsed_minutes).ceil().max(0.0) as u32,
    }
}
