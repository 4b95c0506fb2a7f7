//! Skill-biased, difficulty-stratified sampling of evaluation questions.
//!
//! Each of the five difficulty levels gets a quota from a triangular weight
//! centered on the learner's skill. Quotas that a level cannot fill move to
//! the nearest levels that still have questions left.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{EvaluationKind, Question, MAX_DIFFICULTY, MIN_DIFFICULTY};

pub const MODULE_EVALUATION_QUESTIONS: usize = 10;
pub const FINAL_EVALUATION_QUESTIONS: usize = 15;

const LEVELS: usize = (MAX_DIFFICULTY - MIN_DIFFICULTY + 1) as usize;
const TRIANGLE_HALF_WIDTH: f64 = 3.0;

pub fn target_count(kind: EvaluationKind) -> usize {
    match kind {
        EvaluationKind::Module => MODULE_EVALUATION_QUESTIONS,
        EvaluationKind::Final => FINAL_EVALUATION_QUESTIONS,
    }
}

/// Bucket index for a difficulty; out-of-range tags fall into the edge buckets.
pub fn bucket_of(difficulty: u8) -> usize {
    (difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY) - MIN_DIFFICULTY) as usize
}

fn level_difficulty(bucket: usize) -> f64 {
    f64::from(MIN_DIFFICULTY) + bucket as f64
}

pub fn difficulty_weights(skill: f64) -> [f64; LEVELS] {
    let mut weights = [0.0; LEVELS];
    for (bucket, weight) in weights.iter_mut().enumerate() {
        *weight = (TRIANGLE_HALF_WIDTH - (level_difficulty(bucket) - skill).abs()).max(0.0);
    }
    weights
}

/// Closest difficulty to `skill`, lower one on ties.
fn closest_bucket(skill: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for bucket in 0..LEVELS {
        let distance = (level_difficulty(bucket) - skill).abs();
        if distance < best_distance {
            best = bucket;
            best_distance = distance;
        }
    }
    best
}

/// Per-difficulty question counts summing to `target`.
pub fn difficulty_quotas(skill: f64, target: usize) -> [usize; LEVELS] {
    let mut quotas = [0usize; LEVELS];
    if target == 0 {
        return quotas;
    }

    let weights = difficulty_weights(skill);
    let total: f64 = weights.iter().sum();
    let center = closest_bucket(skill);

    if total <= 0.0 {
        quotas[center] = target;
        return quotas;
    }

    for (quota, weight) in quotas.iter_mut().zip(weights.iter()) {
        *quota = (target as f64 * weight / total).floor() as usize;
    }
    let assigned: usize = quotas.iter().sum();
    quotas[center] += target.saturating_sub(assigned);
    quotas
}

/// Other buckets ordered by distance from `bucket`, lower one first on ties.
fn neighbours(bucket: usize) -> impl Iterator<Item = usize> {
    (1..LEVELS).flat_map(move |step| {
        let below = bucket.checked_sub(step);
        let above = Some(bucket + step).filter(|b| *b < LEVELS);
        below.into_iter().chain(above)
    })
}

/// Draws `min(target, pool.len())` distinct questions biased toward `skill`.
pub fn select<R: Rng + ?Sized>(
    pool: &[Question],
    skill: f64,
    target: usize,
    rng: &mut R,
) -> Vec<Question> {
    if pool.len() <= target {
        return pool.to_vec();
    }

    let mut buckets: [Vec<usize>; LEVELS] = Default::default();
    for (idx, question) in pool.iter().enumerate() {
        buckets[bucket_of(question.difficulty)].push(idx);
    }
    for bucket in buckets.iter_mut() {
        bucket.shuffle(rng);
    }

    let quotas = difficulty_quotas(skill, target);
    let mut taken = [0usize; LEVELS];
    let mut shortfalls = [0usize; LEVELS];
    for bucket in 0..LEVELS {
        taken[bucket] = quotas[bucket].min(buckets[bucket].len());
        shortfalls[bucket] = quotas[bucket] - taken[bucket];
    }

    // Measured before redistribution; a bucket may end up above its own quota.
    for bucket in 0..LEVELS {
        let mut shortfall = shortfalls[bucket];
        if shortfall == 0 {
            continue;
        }
        for other in neighbours(bucket) {
            let spare = buckets[other].len() - taken[other];
            let moved = spare.min(shortfall);
            taken[other] += moved;
            shortfall -= moved;
            if shortfall == 0 {
                break;
            }
        }
    }

    let mut selected: Vec<Question> = buckets
        .iter()
        .zip(taken.iter())
        .flat_map(|(bucket, &count)| bucket[..count].iter().map(|&idx| pool[idx].clone()))
        .collect();
    selected.shuffle(rng);

    debug_assert_eq!(selected.len(), target);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn pool(per_level: &[usize; LEVELS]) -> Vec<Question> {
        let mut questions = Vec::new();
        for (bucket, count) in per_level.iter().enumerate() {
            for n in 0..*count {
                questions.push(Question {
                    id: format!("d{}-{}", bucket + 1, n),
                    prompt: String::new(),
                    options: Vec::new(),
                    correct_option: 0,
                    difficulty: (bucket + 1) as u8,
                });
            }
        }
        questions
    }

    fn count_by_level(questions: &[Question]) -> [usize; LEVELS] {
        let mut counts = [0; LEVELS];
        for q in questions {
            counts[bucket_of(q.difficulty)] += 1;
        }
        counts
    }

    #[test]
    fn test_quotas_centered_on_skill() {
        assert_eq!(difficulty_quotas(3.0, 10), [1, 2, 4, 2, 1]);
        assert_eq!(difficulty_quotas(1.0, 10), [6, 3, 1, 0, 0]);
    }

    #[test]
    fn test_quotas_sum_to_target() {
        for skill in [1.0, 1.4, 2.5, 3.0, 3.6, 4.5, 5.0] {
            for target in [0, 1, 7, 10, 15, 40] {
                assert_eq!(difficulty_quotas(skill, target).iter().sum::<usize>(), target);
            }
        }
    }

    #[test]
    fn test_low_skill_favours_easy_questions() {
        let quotas = difficulty_quotas(1.0, 10);
        assert!(quotas[0] > quotas[2]);
        assert_eq!(quotas[3], 0);
        assert_eq!(quotas[4], 0);
    }

    #[test]
    fn test_small_pool_returned_whole() {
        let questions = pool(&[1, 1, 1, 0, 0]);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(select(&questions, 3.0, 10, &mut rng), questions);
    }

    #[test]
    fn test_exact_size_without_duplicates() {
        let questions = pool(&[6, 6, 6, 6, 6]);
        let mut rng = StdRng::seed_from_u64(11);
        let selected = select(&questions, 2.2, FINAL_EVALUATION_QUESTIONS, &mut rng);
        assert_eq!(selected.len(), FINAL_EVALUATION_QUESTIONS);
        let ids: HashSet<_> = selected.iter().map(|q| q.id.clone()).collect();
        assert_eq!(ids.len(), selected.len());
    }

    #[test]
    fn test_shortfall_moves_to_nearest_level() {
        // skill 3 wants [1, 2, 4, 2, 1]; level 3 only has one question.
        let questions = pool(&[5, 5, 1, 5, 5]);
        let mut rng = StdRng::seed_from_u64(3);
        let selected = select(&questions, 3.0, MODULE_EVALUATION_QUESTIONS, &mut rng);
        assert_eq!(selected.len(), MODULE_EVALUATION_QUESTIONS);
        assert_eq!(count_by_level(&selected), [1, 5, 1, 2, 1]);
    }

    #[test]
    fn test_empty_easy_level_spills_upward() {
        // skill 1 wants [6, 3, 1, 0, 0] but there are no level-1 questions.
        let questions = pool(&[0, 5, 5, 5, 5]);
        let mut rng = StdRng::seed_from_u64(5);
        let selected = select(&questions, 1.0, MODULE_EVALUATION_QUESTIONS, &mut rng);
        assert_eq!(selected.len(), MODULE_EVALUATION_QUESTIONS);
        assert_eq!(count_by_level(&selected), [0, 5, 5, 0, 0]);
    }

    #[test]
    fn test_sparse_pools_always_fill_target() {
        let layouts = [[0, 5, 5, 5, 5], [0, 0, 3, 4, 9], [9, 4, 0, 0, 0], [1, 0, 1, 0, 30]];
        for layout in layouts {
            let questions = pool(&layout);
            for skill in [1.0, 2.5, 3.0, 4.2, 5.0] {
                let mut rng = StdRng::seed_from_u64(1);
                let selected = select(&questions, skill, MODULE_EVALUATION_QUESTIONS, &mut rng);
                assert_eq!(selected.len(), MODULE_EVALUATION_QUESTIONS.min(questions.len()));
                let ids: HashSet<_> = selected.iter().map(|q| q.id.clone()).collect();
                assert_eq!(ids.len(), selected.len());
            }
        }
    }
}
