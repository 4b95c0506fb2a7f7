//! # course-progress-engine
//!
//! Adaptive learning and progress rules for an online course platform:
//!
//! - [`services::skill`] - skill estimate from evaluation scores
//! - [`services::retention`] - recall estimate from elapsed time and survey baseline
//! - [`services::question_selector`] - skill-biased, difficulty-stratified question sets
//! - [`services::progress`] - completion percentage and lifecycle state
//! - [`services::cooldown`] - retake lock after low scores
//!
//! [`engine::LearningEngine`] wires these to a [`db::LearningStore`], which
//! applies every mutation atomically per learner and course.

pub mod catalog;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod services;
pub mod types;

pub use catalog::CourseCatalog;
pub use engine::{EvaluationOutcome, LearningEngine, ModuleCompletion};
pub use error::EngineError;
pub use types::*;
