use std::collections::HashMap;

use parking_lot::Mutex;

use crate::db::{AttemptClaim, LearningStore, StoreError};
use crate::services::{cooldown, progress};
use crate::types::{
    AttemptLog, CourseDefinition, EvaluationTarget, LearnerProfile, ProgressEvent, ProgressKey,
    ProgressRecord,
};

#[derive(Default)]
struct MemoryState {
    profiles: HashMap<String, LearnerProfile>,
    progress: HashMap<ProgressKey, ProgressRecord>,
    attempts: HashMap<(ProgressKey, EvaluationTarget), AttemptLog>,
}

/// Process-local store; one mutex serializes every mutation.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LearningStore for MemoryStore {
    async fn insert_profile(&self, profile: &LearnerProfile) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        if state.profiles.contains_key(&profile.learner_id) {
            return Ok(false);
        }
        state
            .profiles
            .insert(profile.learner_id.clone(), profile.clone());
        Ok(true)
    }

    async fn load_profile(&self, learner_id: &str) -> Result<Option<LearnerProfile>, StoreError> {
        Ok(self.state.lock().profiles.get(learner_id).cloned())
    }

    async fn update_profile<F, T>(
        &self,
        learner_id: &str,
        update: F,
    ) -> Result<Option<(LearnerProfile, T)>, StoreError>
    where
        F: FnOnce(&mut LearnerProfile) -> T + Send,
        T: Send,
    {
        let mut state = self.state.lock();
        let Some(profile) = state.profiles.get_mut(learner_id) else {
            return Ok(None);
        };
        let output = update(profile);
        Ok(Some((profile.clone(), output)))
    }

    async fn load_progress(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, StoreError> {
        Ok(self.state.lock().progress.get(key).cloned())
    }

    async fn apply_progress(
        &self,
        key: &ProgressKey,
        event: &ProgressEvent,
        course: &CourseDefinition,
    ) -> Result<ProgressRecord, StoreError> {
        let mut state = self.state.lock();
        let record = state
            .progress
            .entry(key.clone())
            .or_insert_with(|| ProgressRecord::new(key, event.at()));
        progress::apply_event(record, event, course.modules.len());
        progress::refresh(record, course);
        Ok(record.clone())
    }

    async fn last_attempt(
        &self,
        key: &ProgressKey,
        target: EvaluationTarget,
    ) -> Result<Option<AttemptLog>, StoreError> {
        Ok(self
            .state
            .lock()
            .attempts
            .get(&(key.clone(), target))
            .copied())
    }

    async fn try_record_attempt(
        &self,
        key: &ProgressKey,
        attempt: &AttemptLog,
    ) -> Result<AttemptClaim, StoreError> {
        let mut state = self.state.lock();
        let slot = (key.clone(), attempt.target);
        if let Some(previous) = state.attempts.get(&slot) {
            let status = cooldown::is_locked(
                previous.attempted_at,
                previous.cooldown_minutes,
                attempt.attempted_at,
            );
            if status.locked {
                return Ok(AttemptClaim::Locked(status));
            }
        }
        state.attempts.insert(slot, *attempt);
        Ok(AttemptClaim::Recorded)
    }
}
