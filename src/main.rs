use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use course_progress_engine::catalog::CourseCatalog;
use course_progress_engine::config::{Config, ConfigError};
use course_progress_engine::db::{LearningStore, MemoryStore, SqliteStore, StoreError};
use course_progress_engine::logging;
use course_progress_engine::{
    EngineError, EvaluationTarget, LearningEngine, Question, SubmittedAnswer,
};

/// One JSON line on stdin. `at` defaults to the time the line is read.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Command {
    Register {
        learner_id: String,
        diagnostic_score: f64,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    Survey {
        learner_id: String,
        experience_years: f64,
        baseline_recall: f64,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    ContentViewed {
        learner_id: String,
        course_id: String,
        module_index: usize,
        content_index: usize,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    ModuleCompleted {
        learner_id: String,
        course_id: String,
        module_index: usize,
        score: f64,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    FinalCompleted {
        learner_id: String,
        course_id: String,
        score: f64,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    StartEvaluation {
        learner_id: String,
        course_id: String,
        target: EvaluationTarget,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    SubmitEvaluation {
        learner_id: String,
        course_id: String,
        target: EvaluationTarget,
        question_ids: Vec<String>,
        answers: Vec<SubmittedAnswer>,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    Restart {
        learner_id: String,
        course_id: String,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    RefreshRetention {
        learner_id: String,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    Skill {
        learner_id: String,
    },
    Retention {
        learner_id: String,
    },
    Progress {
        learner_id: String,
        course_id: String,
    },
}

/// A question as shown to the learner, without its answer key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HandedOutQuestion<'a> {
    id: &'a str,
    prompt: &'a str,
    options: &'a [String],
    difficulty: u8,
}

impl<'a> From<&'a Question> for HandedOutQuestion<'a> {
    fn from(question: &'a Question) -> Self {
        Self {
            id: &question.id,
            prompt: &question.prompt,
            options: &question.options,
            difficulty: question.difficulty,
        }
    }
}

#[derive(Debug, Error)]
enum ReplayError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("invalid command: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let log_level = config.as_ref().map_or("info", |c| c.log_level.as_str());
    let _log_guard = logging::init_tracing(log_level);

    let result = match config {
        Ok(config) => start(config).await,
        Err(err) => Err(err.into()),
    };
    if let Err(err) = result {
        tracing::error!(error = %err, "progress engine stopped");
        std::process::exit(1);
    }
}

async fn start(config: Config) -> Result<(), StartupError> {
    let catalog = CourseCatalog::load(&config.catalog_path).await?;
    tracing::info!(
        courses = catalog.len(),
        path = %config.catalog_path.display(),
        "course catalog loaded"
    );

    match config.sqlite {
        Some(ref sqlite) => {
            let store = SqliteStore::connect(sqlite).await?;
            replay(LearningEngine::new(store, catalog)).await
        }
        None => {
            tracing::warn!("DATABASE_PATH not set, progress is kept in memory only");
            replay(LearningEngine::new(MemoryStore::new(), catalog)).await
        }
    }
}

async fn replay<S: LearningStore>(engine: LearningEngine<S>) -> Result<(), StartupError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut handled = 0usize;
    let mut failed = 0usize;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        handled += 1;

        let reply = match execute(&engine, &line).await {
            Ok(result) => json!({ "ok": true, "result": result }),
            Err(err) => {
                failed += 1;
                tracing::warn!(line = handled, error = %err, "command rejected");
                json!({ "ok": false, "error": err.to_string() })
            }
        };

        stdout.write_all(reply.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    tracing::info!(handled, failed, "replay finished");
    Ok(())
}

async fn execute<S: LearningStore>(engine: &LearningEngine<S>, line: &str) -> Result<Value, ReplayError> {
    let command: Command = serde_json::from_str(line)?;
    let now = Utc::now();

    let value = match command {
        Command::Register {
            learner_id,
            diagnostic_score,
            at,
        } => serde_json::to_value(
            engine
                .register_learner(&learner_id, diagnostic_score, at.unwrap_or(now))
                .await?,
        )?,
        Command::Survey {
            learner_id,
            experience_years,
            baseline_recall,
            at,
        } => serde_json::to_value(
            engine
                .record_survey(&learner_id, experience_years, baseline_recall, at.unwrap_or(now))
                .await?,
        )?,
        Command::ContentViewed {
            learner_id,
            course_id,
            module_index,
            content_index,
            at,
        } => serde_json::to_value(
            engine
                .on_content_viewed(&learner_id, &course_id, module_index, content_index, at.unwrap_or(now))
                .await?,
        )?,
        Command::ModuleCompleted {
            learner_id,
            course_id,
            module_index,
            score,
            at,
        } => serde_json::to_value(
            engine
                .on_module_completed(&learner_id, &course_id, module_index, score, at.unwrap_or(now))
                .await?,
        )?,
        Command::FinalCompleted {
            learner_id,
            course_id,
            score,
            at,
        } => serde_json::to_value(
            engine
                .on_final_evaluation_completed(&learner_id, &course_id, score, at.unwrap_or(now))
                .await?,
        )?,
        Command::StartEvaluation {
            learner_id,
            course_id,
            target,
            at,
        } => {
            let questions = engine
                .on_evaluation_start(&learner_id, &course_id, target, at.unwrap_or(now))
                .await?;
            let handout: Vec<HandedOutQuestion<'_>> = questions.iter().map(HandedOutQuestion::from).collect();
            serde_json::to_value(handout)?
        }
        Command::SubmitEvaluation {
            learner_id,
            course_id,
            target,
            question_ids,
            answers,
            at,
        } => serde_json::to_value(
            engine
                .on_evaluation_submitted(
                    &learner_id,
                    &course_id,
                    target,
                    &question_ids,
                    &answers,
                    at.unwrap_or(now),
                )
                .await?,
        )?,
        Command::Restart {
            learner_id,
            course_id,
            at,
        } => serde_json::to_value(
            engine
                .on_restart(&learner_id, &course_id, at.unwrap_or(now))
                .await?,
        )?,
        Command::RefreshRetention { learner_id, at } => json!({
            "retention": engine.refresh_retention(&learner_id, at.unwrap_or(now)).await?
        }),
        Command::Skill { learner_id } => json!({ "skill": engine.get_skill(&learner_id).await? }),
        Command::Retention { learner_id } => {
            json!({ "retention": engine.get_retention(&learner_id).await? })
        }
        Command::Progress {
            learner_id,
            course_id,
        } => serde_json::to_value(engine.get_progress(&learner_id, &course_id).await?)?,
    };

    Ok(value)
}
