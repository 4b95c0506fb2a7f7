pub mod memory;
pub mod sqlite;

use std::future::Future;

use thiserror::Error;

use crate::services::cooldown::LockStatus;
use crate::types::{
    AttemptLog, CourseDefinition, EvaluationTarget, LearnerProfile, ProgressEvent, ProgressKey,
    ProgressRecord,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("corrupt {table} row: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptClaim {
    Recorded,
    Locked(LockStatus),
}

/// Persistence seam for profiles, progress records and attempt logs.
///
/// Every mutating method is atomic for its key: concurrent calls on the same
/// learner (or learner and course) never lose each other's writes.
pub trait LearningStore: Send + Sync {
    /// Returns `false` if the learner already has a profile.
    fn insert_profile(
        &self,
        profile: &LearnerProfile,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn load_profile(
        &self,
        learner_id: &str,
    ) -> impl Future<Output = Result<Option<LearnerProfile>, StoreError>> + Send;

    /// Read-modify-write of one profile under the store's write lock.
    /// Resolves to `None` when the learner has no profile.
    fn update_profile<F, T>(
        &self,
        learner_id: &str,
        update: F,
    ) -> impl Future<Output = Result<Option<(LearnerProfile, T)>, StoreError>> + Send
    where
        F: FnOnce(&mut LearnerProfile) -> T + Send,
        T: Send;

    fn load_progress(
        &self,
        key: &ProgressKey,
    ) -> impl Future<Output = Result<Option<ProgressRecord>, StoreError>> + Send;

    /// Creates the record if needed, applies `event`, recomputes completion
    /// against `course` and persists, all as one atomic step.
    fn apply_progress(
        &self,
        key: &ProgressKey,
        event: &ProgressEvent,
        course: &CourseDefinition,
    ) -> impl Future<Output = Result<ProgressRecord, StoreError>> + Send;

    fn last_attempt(
        &self,
        key: &ProgressKey,
        target: EvaluationTarget,
    ) -> impl Future<Output = Result<Option<AttemptLog>, StoreError>> + Send;

    /// Records `attempt` unless the previous attempt at the same target is
    /// still locked at `attempt.attempted_at`. The check and the write are one
    /// atomic step.
    fn try_record_attempt(
        &self,
        key: &ProgressKey,
        attempt: &AttemptLog,
    ) -> impl Future<Output = Result<AttemptClaim, StoreError>> + Send;
}
