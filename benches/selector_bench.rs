//! Benchmark suite for question selection and progress aggregation
//!
//! Run with: cargo bench

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use course_progress_engine::services::{progress, question_selector};
use course_progress_engine::{
    ContentItem, CourseDefinition, CourseModule, CourseTier, ProgressEvent, ProgressKey,
    ProgressRecord, Question,
};

fn pool(size: usize) -> Vec<Question> {
    (0..size)
        .map(|i| Question {
            id: format!("q{i}"),
            prompt: String::new(),
            options: Vec::new(),
            correct_option: 0,
            difficulty: (i % 5) as u8 + 1,
        })
        .collect()
}

fn bench_select_final(c: &mut Criterion) {
    let questions = pool(200);
    let mut rng = StdRng::seed_from_u64(7);
    c.bench_function("question_selector::select/200->15", |b| {
        b.iter(|| question_selector::select(black_box(&questions), black_box(3.4), 15, &mut rng))
    });
}

fn bench_quotas(c: &mut Criterion) {
    c.bench_function("question_selector::difficulty_quotas", |b| {
        b.iter(|| question_selector::difficulty_quotas(black_box(2.7), black_box(10)))
    });
}

fn bench_recompute(c: &mut Criterion) {
    let course = CourseDefinition {
        id: "bench".to_string(),
        title: String::new(),
        tier: CourseTier::Intermediate,
        modules: (0..20)
            .map(|m| CourseModule {
                title: format!("m{m}"),
                contents: (0..12)
                    .map(|i| ContentItem {
                        title: format!("c{i}"),
                        url: None,
                    })
                    .collect(),
                evaluation: None,
            })
            .collect(),
        final_evaluation: None,
    };

    let now = Utc::now();
    let mut record = ProgressRecord::new(&ProgressKey::new("learner", "bench"), now);
    for module_index in 0..10 {
        progress::apply_event(
            &mut record,
            &ProgressEvent::ModuleCompleted {
                module_index,
                score: 85.0,
                at: now,
            },
            course.modules.len(),
        );
    }
    for content_index in 0..6 {
        progress::apply_event(
            &mut record,
            &ProgressEvent::ContentViewed {
                module_index: 10,
                content_index,
                at: now,
            },
            course.modules.len(),
        );
    }

    c.bench_function("progress::recompute", |b| {
        b.iter(|| progress::recompute(black_box(&record), black_box(&course)))
    });
}

criterion_group!(benches, bench_select_final, bench_quotas, bench_recompute);
criterion_main!(benches);
