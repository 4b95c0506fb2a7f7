#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use course_progress_engine::{
    ContentItem, CourseCatalog, CourseDefinition, CourseModule, CourseTier, Question,
    SubmittedAnswer,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn minutes_after(start: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    start + Duration::minutes(minutes)
}

pub fn question_pool(prefix: &str, count: usize) -> Vec<Question> {
    (0..count)
        .map(|i| Question {
            id: format!("{prefix}-q{i}"),
            prompt: format!("Question {i}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option: i % 4,
            difficulty: (i % 5) as u8 + 1,
        })
        .collect()
}

fn module(title: &str, contents: usize, evaluation: Option<Vec<Question>>) -> CourseModule {
    CourseModule {
        title: title.to_string(),
        contents: (0..contents)
            .map(|i| ContentItem {
                title: format!("{title} part {i}"),
                url: None,
            })
            .collect(),
        evaluation,
    }
}

/// Two-module basic course with question pools for module 0 and the final.
pub fn basic_course() -> CourseDefinition {
    CourseDefinition {
        id: "rust-basics".to_string(),
        title: "Rust basics".to_string(),
        tier: CourseTier::Basic,
        modules: vec![
            module("Ownership", 2, Some(question_pool("own", 20))),
            module("Traits", 2, None),
        ],
        final_evaluation: Some(question_pool("final", 30)),
    }
}

pub fn advanced_course() -> CourseDefinition {
    CourseDefinition {
        id: "async-deep-dive".to_string(),
        title: "Async deep dive".to_string(),
        tier: CourseTier::Advanced,
        modules: vec![module("Pinning", 3, None)],
        final_evaluation: None,
    }
}

pub fn sample_catalog() -> CourseCatalog {
    CourseCatalog::new(vec![basic_course(), advanced_course()])
}

pub fn question_ids(questions: &[Question]) -> Vec<String> {
    questions.iter().map(|q| q.id.clone()).collect()
}

pub fn correct_answers(questions: &[Question]) -> Vec<SubmittedAnswer> {
    questions
        .iter()
        .map(|q| SubmittedAnswer {
            question_id: q.id.clone(),
            selected_option: q.correct_option,
        })
        .collect()
}

pub fn wrong_answers(questions: &[Question]) -> Vec<SubmittedAnswer> {
    questions
        .iter()
        .map(|q| SubmittedAnswer {
            question_id: q.id.clone(),
            selected_option: (q.correct_option + 1) % 4,
        })
        .collect()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
