use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::config::{SqliteConfig, SqliteJournalMode, SqliteSynchronous};
use crate::db::{AttemptClaim, LearningStore, StoreError};
use crate::services::{cooldown, progress};
use crate::types::{
    AttemptLog, CompletedModule, CourseDefinition, EvaluationTarget, LearnerProfile,
    LifecycleState, ProgressEvent, ProgressKey, ProgressRecord, SurveyBaseline, ViewedContent,
};

pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// SQLite-backed store. Mutations run in a transaction whose first statement
/// is a write, so the database write lock is held before anything is read.
/// Progress events go through the same pure `progress` functions as the
/// memory store; SQL only loads and saves records.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &SqliteConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let journal_mode = match config.journal_mode {
            SqliteJournalMode::Wal => sqlx::sqlite::SqliteJournalMode::Wal,
            SqliteJournalMode::Delete => sqlx::sqlite::SqliteJournalMode::Delete,
            SqliteJournalMode::Truncate => sqlx::sqlite::SqliteJournalMode::Truncate,
        };
        let synchronous = match config.synchronous {
            SqliteSynchronous::Normal => sqlx::sqlite::SqliteSynchronous::Normal,
            SqliteSynchronous::Full => sqlx::sqlite::SqliteSynchronous::Full,
        };

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(journal_mode)
            .synchronous(synchronous)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        debug!(path = %config.path.display(), "sqlite store ready");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in split_sql_statements(SCHEMA_SQL) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Splits a schema script on top-level `;`, dropping `--` comment lines.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for line in sql.lines() {
        if line.trim_start().starts_with("--") {
            continue;
        }
        for ch in line.chars() {
            match ch {
                '\'' if !in_double_quote => in_single_quote = !in_single_quote,
                '"' if !in_single_quote => in_double_quote = !in_double_quote,
                ';' if !in_single_quote && !in_double_quote => {
                    let stmt = current.trim();
                    if !stmt.is_empty() {
                        statements.push(stmt.to_string());
                    }
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        current.push('\n');
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(table: &'static str, value: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(value).ok_or_else(|| StoreError::Corrupt {
        table,
        detail: format!("timestamp out of range: {value}"),
    })
}

fn to_index(table: &'static str, value: i64) -> Result<usize, StoreError> {
    usize::try_from(value).map_err(|_| StoreError::Corrupt {
        table,
        detail: format!("negative index: {value}"),
    })
}

fn row_to_profile(row: &SqliteRow) -> Result<LearnerProfile, StoreError> {
    let experience_years: Option<f64> = row.try_get("experienceYears")?;
    let baseline_recall: Option<f64> = row.try_get("baselineRecall")?;
    let baseline = match (experience_years, baseline_recall) {
        (Some(experience_years), Some(baseline_recall)) => SurveyBaseline::Recorded {
            experience_years,
            baseline_recall,
        },
        _ => SurveyBaseline::Missing,
    };

    let last_completion_at = row
        .try_get::<Option<i64>, _>("lastCompletionAt")?
        .map(|v| from_millis("learner_profiles", v))
        .transpose()?;

    Ok(LearnerProfile {
        learner_id: row.try_get("learnerId")?,
        skill: row.try_get("skill")?,
        retention: row.try_get("retention")?,
        baseline,
        last_completion_at,
        updated_at: from_millis("learner_profiles", row.try_get("updatedAt")?)?,
    })
}

fn baseline_columns(baseline: SurveyBaseline) -> (Option<f64>, Option<f64>) {
    match baseline {
        SurveyBaseline::Missing => (None, None),
        SurveyBaseline::Recorded {
            experience_years,
            baseline_recall,
        } => (Some(experience_years), Some(baseline_recall)),
    }
}

async fn fetch_profile(
    conn: &mut SqliteConnection,
    learner_id: &str,
) -> Result<Option<LearnerProfile>, StoreError> {
    let row = sqlx::query(r#"SELECT * FROM "learner_profiles" WHERE "learnerId" = ?"#)
        .bind(learner_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_profile).transpose()
}

async fn fetch_progress(
    conn: &mut SqliteConnection,
    key: &ProgressKey,
) -> Result<Option<ProgressRecord>, StoreError> {
    let Some(row) = sqlx::query(
        r#"SELECT * FROM "progress_records" WHERE "learnerId" = ? AND "courseId" = ?"#,
    )
    .bind(&key.learner_id)
    .bind(&key.course_id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let completed_rows = sqlx::query(
        r#"SELECT "moduleIndex", "score", "completedAt" FROM "completed_modules"
           WHERE "learnerId" = ? AND "courseId" = ? ORDER BY "moduleIndex""#,
    )
    .bind(&key.learner_id)
    .bind(&key.course_id)
    .fetch_all(&mut *conn)
    .await?;

    let viewed_rows = sqlx::query(
        r#"SELECT "moduleIndex", "contentIndex", "viewedAt" FROM "viewed_content"
           WHERE "learnerId" = ? AND "courseId" = ? ORDER BY "moduleIndex", "contentIndex""#,
    )
    .bind(&key.learner_id)
    .bind(&key.course_id)
    .fetch_all(&mut *conn)
    .await?;

    let completed_modules = completed_rows
        .iter()
        .map(|r| -> Result<CompletedModule, StoreError> {
            Ok(CompletedModule {
                module_index: to_index("completed_modules", r.try_get("moduleIndex")?)?,
                score: r.try_get("score")?,
                completed_at: from_millis("completed_modules", r.try_get("completedAt")?)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let viewed_content = viewed_rows
        .iter()
        .map(|r| -> Result<ViewedContent, StoreError> {
            Ok(ViewedContent {
                module_index: to_index("viewed_content", r.try_get("moduleIndex")?)?,
                content_index: to_index("viewed_content", r.try_get("contentIndex")?)?,
                viewed_at: from_millis("viewed_content", r.try_get("viewedAt")?)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let lifecycle_raw: String = row.try_get("lifecycleState")?;
    let lifecycle_state =
        LifecycleState::parse(&lifecycle_raw).ok_or_else(|| StoreError::Corrupt {
            table: "progress_records",
            detail: format!("unknown lifecycle state: {lifecycle_raw}"),
        })?;

    let completion_raw: i64 = row.try_get("completionPercent")?;
    let completed_at = row
        .try_get::<Option<i64>, _>("completedAt")?
        .map(|v| from_millis("progress_records", v))
        .transpose()?;

    Ok(Some(ProgressRecord {
        id: row.try_get("id")?,
        learner_id: row.try_get("learnerId")?,
        course_id: row.try_get("courseId")?,
        current_module: to_index("progress_records", row.try_get("currentModule")?)?,
        current_content: to_index("progress_records", row.try_get("currentContent")?)?,
        completed_modules,
        viewed_content,
        completion_percent: completion_raw.clamp(0, 100) as u8,
        final_evaluation_completed: row.try_get("finalEvaluationCompleted")?,
        course_completed: row.try_get("courseCompleted")?,
        completed_at,
        lifecycle_state,
        last_updated_at: from_millis("progress_records", row.try_get("lastUpdatedAt")?)?,
    }))
}

/// Writes the whole record back, replacing its viewed and completed sets.
async fn save_progress(conn: &mut SqliteConnection, record: &ProgressRecord) -> Result<(), StoreError> {
    sqlx::query(
        r#"UPDATE "progress_records"
           SET "currentModule" = ?, "currentContent" = ?, "completionPercent" = ?,
               "finalEvaluationCompleted" = ?, "courseCompleted" = ?, "completedAt" = ?,
               "lifecycleState" = ?, "lastUpdatedAt" = ?
           WHERE "learnerId" = ? AND "courseId" = ?"#,
    )
    .bind(record.current_module as i64)
    .bind(record.current_content as i64)
    .bind(i64::from(record.completion_percent))
    .bind(record.final_evaluation_completed)
    .bind(record.course_completed)
    .bind(record.completed_at.map(millis))
    .bind(record.lifecycle_state.as_str())
    .bind(millis(record.last_updated_at))
    .bind(&record.learner_id)
    .bind(&record.course_id)
    .execute(&mut *conn)
    .await?;

    for table in ["viewed_content", "completed_modules"] {
        let sql = format!(r#"DELETE FROM "{table}" WHERE "learnerId" = ? AND "courseId" = ?"#);
        sqlx::query(&sql)
            .bind(&record.learner_id)
            .bind(&record.course_id)
            .execute(&mut *conn)
            .await?;
    }

    for viewed in &record.viewed_content {
        sqlx::query(
            r#"INSERT INTO "viewed_content" ("learnerId", "courseId", "moduleIndex", "contentIndex", "viewedAt")
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&record.learner_id)
        .bind(&record.course_id)
        .bind(viewed.module_index as i64)
        .bind(viewed.content_index as i64)
        .bind(millis(viewed.viewed_at))
        .execute(&mut *conn)
        .await?;
    }

    for completed in &record.completed_modules {
        sqlx::query(
            r#"INSERT INTO "completed_modules" ("learnerId", "courseId", "moduleIndex", "score", "completedAt")
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&record.learner_id)
        .bind(&record.course_id)
        .bind(completed.module_index as i64)
        .bind(completed.score)
        .bind(millis(completed.completed_at))
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn fetch_attempt(
    conn: &mut SqliteConnection,
    key: &ProgressKey,
    target: EvaluationTarget,
) -> Result<Option<AttemptLog>, StoreError> {
    let row = sqlx::query(
        r#"SELECT * FROM "evaluation_attempts" WHERE "learnerId" = ? AND "courseId" = ? AND "target" = ?"#,
    )
    .bind(&key.learner_id)
    .bind(&key.course_id)
    .bind(target.storage_key())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let cooldown_raw: i64 = row.try_get("cooldownMinutes")?;
    Ok(Some(AttemptLog {
        target,
        score_percent: row.try_get("scorePercent")?,
        cooldown_minutes: u32::try_from(cooldown_raw).map_err(|_| StoreError::Corrupt {
            table: "evaluation_attempts",
            detail: format!("cooldown out of range: {cooldown_raw}"),
        })?,
        attempted_at: from_millis("evaluation_attempts", row.try_get("attemptedAt")?)?,
    }))
}

impl LearningStore for SqliteStore {
    async fn insert_profile(&self, profile: &LearnerProfile) -> Result<bool, StoreError> {
        let (experience_years, baseline_recall) = baseline_columns(profile.baseline);
        let result = sqlx::query(
            r#"INSERT INTO "learner_profiles"
               ("learnerId", "skill", "retention", "experienceYears", "baselineRecall", "lastCompletionAt", "updatedAt")
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT ("learnerId") DO NOTHING"#,
        )
        .bind(&profile.learner_id)
        .bind(profile.skill)
        .bind(profile.retention)
        .bind(experience_years)
        .bind(baseline_recall)
        .bind(profile.last_completion_at.map(millis))
        .bind(millis(profile.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn load_profile(&self, learner_id: &str) -> Result<Option<LearnerProfile>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_profile(&mut conn, learner_id).await
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
        let mut tx = self.pool.begin().await?;

        // No-op write so the lock is taken before the read.
        sqlx::query(r#"UPDATE "learner_profiles" SET "updatedAt" = "updatedAt" WHERE "learnerId" = ?"#)
            .bind(learner_id)
            .execute(&mut *tx)
            .await?;

        let Some(mut profile) = fetch_profile(&mut tx, learner_id).await? else {
            return Ok(None);
        };
        let output = update(&mut profile);
        let (experience_years, baseline_recall) = baseline_columns(profile.baseline);

        sqlx::query(
            r#"UPDATE "learner_profiles"
               SET "skill" = ?, "retention" = ?, "experienceYears" = ?, "baselineRecall" = ?,
                   "lastCompletionAt" = ?, "updatedAt" = ?
               WHERE "learnerId" = ?"#,
        )
        .bind(profile.skill)
        .bind(profile.retention)
        .bind(experience_years)
        .bind(baseline_recall)
        .bind(profile.last_completion_at.map(millis))
        .bind(millis(profile.updated_at))
        .bind(learner_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((profile, output)))
    }

    async fn load_progress(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_progress(&mut conn, key).await
    }

    async fn apply_progress(
        &self,
        key: &ProgressKey,
        event: &ProgressEvent,
        course: &CourseDefinition,
    ) -> Result<ProgressRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Creating the row first also takes the write lock before the read.
        sqlx::query(
            r#"INSERT INTO "progress_records" ("id", "learnerId", "courseId", "lastUpdatedAt")
               VALUES (?, ?, ?, ?)
               ON CONFLICT ("learnerId", "courseId") DO NOTHING"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&key.learner_id)
        .bind(&key.course_id)
        .bind(millis(event.at()))
        .execute(&mut *tx)
        .await?;

        let mut record = fetch_progress(&mut tx, key)
            .await?
            .ok_or_else(|| StoreError::Corrupt {
                table: "progress_records",
                detail: format!("record vanished for {}/{}", key.learner_id, key.course_id),
            })?;
        progress::apply_event(&mut record, event, course.modules.len());
        progress::refresh(&mut record, course);
        save_progress(&mut tx, &record).await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn last_attempt(
        &self,
        key: &ProgressKey,
        target: EvaluationTarget,
    ) -> Result<Option<AttemptLog>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_attempt(&mut conn, key, target).await
    }

    async fn try_record_attempt(
        &self,
        key: &ProgressKey,
        attempt: &AttemptLog,
    ) -> Result<AttemptClaim, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"UPDATE "evaluation_attempts" SET "attemptedAt" = "attemptedAt"
               WHERE "learnerId" = ? AND "courseId" = ? AND "target" = ?"#,
        )
        .bind(&key.learner_id)
        .bind(&key.course_id)
        .bind(attempt.target.storage_key())
        .execute(&mut *tx)
        .await?;

        if let Some(previous) = fetch_attempt(&mut tx, key, attempt.target).await? {
            let status = cooldown::is_locked(
                previous.attempted_at,
                previous.cooldown_minutes,
                attempt.attempted_at,
            );
            if status.locked {
                tx.rollback().await?;
                return Ok(AttemptClaim::Locked(status));
            }
        }

        sqlx::query(
            r#"INSERT INTO "evaluation_attempts"
               ("learnerId", "courseId", "target", "scorePercent", "cooldownMinutes", "attemptedAt")
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT ("learnerId", "courseId", "target")
               DO UPDATE SET "scorePercent" = excluded."scorePercent",
                             "cooldownMinutes" = excluded."cooldownMinutes",
                             "attemptedAt" = excluded."attemptedAt""#,
        )
        .bind(&key.learner_id)
        .bind(&key.course_id)
        .bind(attempt.target.storage_key())
        .bind(attempt.score_percent)
        .bind(i64::from(attempt.cooldown_minutes))
        .bind(millis(attempt.attempted_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(AttemptClaim::Recorded)
    }
}
