//! Completion percentage and lifecycle state for a learner's course progress.

use crate::types::{
    CompletionSnapshot, CourseDefinition, LifecycleState, ProgressEvent, ProgressRecord,
};

const MODULE_WEIGHT: f64 = 70.0;
const CONTENT_WEIGHT: f64 = 30.0;
/// Ceiling while the final evaluation is still outstanding.
const MAX_PERCENT_WITHOUT_FINAL: u8 = 99;

pub fn module_fraction(record: &ProgressRecord, course: &CourseDefinition) -> f64 {
    let total = course.modules.len();
    if total == 0 {
        return 0.0;
    }
    let completed = record
        .completed_modules
        .iter()
        .filter(|m| m.module_index < total)
        .count();
    (completed as f64 / total as f64).min(1.0)
}

pub fn current_module_content_fraction(record: &ProgressRecord, course: &CourseDefinition) -> f64 {
    let Some(module) = course.module(record.current_module) else {
        return 0.0;
    };
    let total = module.contents.len();
    if total == 0 {
        return 0.0;
    }
    let viewed = record
        .viewed_content
        .iter()
        .filter(|v| v.module_index == record.current_module && v.content_index < total)
        .count();
    (viewed as f64 / total as f64).min(1.0)
}

/// Pure function of the record's raw sets and the course layout.
pub fn recompute(record: &ProgressRecord, course: &CourseDefinition) -> CompletionSnapshot {
    if record.final_evaluation_completed {
        return CompletionSnapshot {
            completion_percent: 100,
            lifecycle_state: LifecycleState::Completed,
        };
    }

    let module_count = course.modules.len();
    let raw = if module_count == 0 {
        0.0
    } else {
        module_fraction(record, course) * MODULE_WEIGHT
            + current_module_content_fraction(record, course) * (CONTENT_WEIGHT / module_count as f64)
    };

    let completion_percent = (raw.clamp(0.0, 100.0).round() as u8).min(MAX_PERCENT_WITHOUT_FINAL);
    let lifecycle_state = if completion_percent > 0 {
        LifecycleState::InProgress
    } else {
        LifecycleState::NotStarted
    };

    CompletionSnapshot {
        completion_percent,
        lifecycle_state,
    }
}

/// Applies the raw part of an event; derived fields are left to [`refresh`].
pub fn apply_event(record: &mut ProgressRecord, event: &ProgressEvent, module_count: usize) {
    match *event {
        ProgressEvent::ContentViewed {
            module_index,
            content_index,
            at,
        } => {
            record.upsert_viewed(module_index, content_index, at);
            record.current_module = module_index;
            record.current_content = content_index;
        }
        ProgressEvent::ModuleCompleted {
            module_index,
            score,
            at,
        } => {
            record.upsert_completed(module_index, score, at);
            let next = module_index + 1;
            if next < module_count && next > record.current_module {
                record.current_module = next;
                record.current_content = 0;
            }
        }
        ProgressEvent::FinalEvaluationCompleted { at } => {
            record.final_evaluation_completed = true;
            record.course_completed = true;
            record.completed_at = Some(at);
        }
        ProgressEvent::Restart { at } => {
            let mut fresh = ProgressRecord::new(&record.key(), at);
            fresh.id = std::mem::take(&mut record.id);
            *record = fresh;
        }
    }
    record.last_updated_at = event.at();
}

pub fn refresh(record: &mut ProgressRecord, course: &CourseDefinition) -> CompletionSnapshot {
    let snapshot = recompute(record, course);
    record.completion_percent = snapshot.completion_percent;
    record.lifecycle_state = snapshot.lifecycle_state;
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentItem, CourseModule, CourseTier, ProgressKey};
    use chrono::Utc;

    fn course(contents_per_module: &[usize]) -> CourseDefinition {
        CourseDefinition {
            id: "course-1".to_string(),
            title: "Rust".to_string(),
            tier: CourseTier::Basic,
            modules: contents_per_module
                .iter()
                .enumerate()
                .map(|(i, n)| CourseModule {
                    title: format!("module {i}"),
                    contents: (0..*n)
                        .map(|c| ContentItem {
                            title: format!("item {c}"),
                            url: None,
                        })
                        .collect(),
                    evaluation: None,
                })
                .collect(),
            final_evaluation: None,
        }
    }

    fn record() -> ProgressRecord {
        ProgressRecord::new(&ProgressKey::new("learner-1", "course-1"), Utc::now())
    }

    #[test]
    fn test_empty_record_not_started() {
        let snapshot = recompute(&record(), &course(&[3, 3]));
        assert_eq!(snapshot.completion_percent, 0);
        assert_eq!(snapshot.lifecycle_state, LifecycleState::NotStarted);
    }

    #[test]
    fn test_first_module_of_two() {
        let c = course(&[2, 4]);
        let mut r = record();
        apply_event(
            &mut r,
            &ProgressEvent::ModuleCompleted {
                module_index: 0,
                score: 92.0,
                at: Utc::now(),
            },
            c.modules.len(),
        );
        assert_eq!(r.current_module, 1);
        let snapshot = refresh(&mut r, &c);
        assert_eq!(snapshot.completion_percent, 35);
        assert_eq!(r.lifecycle_state, LifecycleState::InProgress);
    }

    #[test]
    fn test_content_share_of_current_module() {
        let c = course(&[4, 4]);
        let mut r = record();
        for content_index in 0..2 {
            apply_event(
                &mut r,
                &ProgressEvent::ContentViewed {
                    module_index: 0,
                    content_index,
                    at: Utc::now(),
                },
                c.modules.len(),
            );
        }
        // 0.5 * (30 / 2)
        assert_eq!(recompute(&r, &c).completion_percent, 8);
    }

    #[test]
    fn test_reviewing_content_is_idempotent() {
        let c = course(&[4]);
        let mut r = record();
        let event = ProgressEvent::ContentViewed {
            module_index: 0,
            content_index: 1,
            at: Utc::now(),
        };
        apply_event(&mut r, &event, 1);
        apply_event(&mut r, &event, 1);
        assert_eq!(r.viewed_content.len(), 1);
    }

    #[test]
    fn test_capped_at_99_without_final() {
        let c = course(&[2]);
        let mut r = record();
        let at = Utc::now();
        r.upsert_viewed(0, 0, at);
        r.upsert_viewed(0, 1, at);
        r.upsert_completed(0, 80.0, at);
        assert_eq!(recompute(&r, &c).completion_percent, 99);
    }

    #[test]
    fn test_final_overrides_everything() {
        let c = course(&[2, 2, 2]);
        let mut r = record();
        apply_event(
            &mut r,
            &ProgressEvent::FinalEvaluationCompleted { at: Utc::now() },
            c.modules.len(),
        );
        let snapshot = refresh(&mut r, &c);
        assert_eq!(snapshot.completion_percent, 100);
        assert_eq!(snapshot.lifecycle_state, LifecycleState::Completed);
        assert!(r.course_completed);
        assert!(r.completed_at.is_some());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let c = course(&[3, 3]);
        let mut r = record();
        r.upsert_completed(0, 75.0, Utc::now());
        r.upsert_viewed(0, 2, Utc::now());
        assert_eq!(recompute(&r, &c), recompute(&r, &c));
    }

    #[test]
    fn test_restart_keeps_identity() {
        let c = course(&[2]);
        let mut r = record();
        let id = r.id.clone();
        r.upsert_completed(0, 90.0, Utc::now());
        refresh(&mut r, &c);
        apply_event(&mut r, &ProgressEvent::Restart { at: Utc::now() }, 1);
        let snapshot = refresh(&mut r, &c);
        assert_eq!(r.id, id);
        assert!(r.completed_modules.is_empty());
        assert_eq!(snapshot.completion_percent, 0);
        assert_eq!(snapshot.lifecycle_state, LifecycleState::NotStarted);
    }
}
