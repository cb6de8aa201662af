//! Difficulty scaling across episodes.
//!
//! Consecutive successes raise the curriculum level, which moves the spawn
//! point further from the goal. The total success count lowers the map
//! emptiness, so random cells fill up with hazards, bonuses and enemies.

use std::{cmp::Reverse, collections::BTreeSet};

use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

use crate::{Position, outcome::Outcome};

/// How the agent's start cell is chosen at reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpawnPolicy {
    /// Closest start first, moving outward as the level rises.
    #[default]
    Curriculum,
    /// Always the start farthest from the goal.
    Farthest,
}

/// Emptiness used once more than `after_successes` episodes have succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmptinessStep {
    pub after_successes: u32,
    pub emptiness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumConfig {
    /// Consecutive successes needed to advance one level.
    pub promote_after: u32,
    /// Number of farthest start cells sampled from once the level runs out.
    pub furthest_pool: usize,
    pub emptiness_schedule: Vec<EmptinessStep>,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        CurriculumConfig {
            promote_after: 5,
            furthest_pool: 4,
            emptiness_schedule: vec![
                EmptinessStep {
                    after_successes: 500,
                    emptiness: 0.5,
                },
                EmptinessStep {
                    after_successes: 1500,
                    emptiness: 0.2,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Curriculum {
    config: CurriculumConfig,
    level: usize,
    streak: u32,
    total_successes: u32,
}

impl Curriculum {
    pub fn new(config: CurriculumConfig) -> Self {
        Curriculum {
            config,
            level: 0,
            streak: 0,
            total_successes: 0,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Current run of consecutive successes.
    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn total_successes(&self) -> u32 {
        self.total_successes
    }

    /// Feeds the outcome of a finished episode. Returns true when the level
    /// advanced.
    pub fn record_episode(&mut self, outcome: Outcome) -> bool {
        if outcome != Outcome::Success {
            self.streak = 0;
            return false;
        }

        self.total_successes += 1;
        self.streak += 1;
        if self.streak < self.config.promote_after {
            return false;
        }

        self.level += 1;
        self.streak = 0;
        tracing::info!(
            level = self.level,
            total_successes = self.total_successes,
            "Curriculum level advanced"
        );
        true
    }

    /// Emptiness for the next layout resolution. The schedule only ever
    /// lowers `base`.
    pub fn emptiness(&self, base: f64) -> f64 {
        self.config
            .emptiness_schedule
            .iter()
            .filter(|step| self.total_successes > step.after_successes)
            .max_by_key(|step| step.after_successes)
            .map_or(base, |step| step.emptiness.min(base))
    }

    /// Chooses the agent's start cell.
    ///
    /// Candidates are ordered by ascending manhattan distance to `goal`, ties
    /// in row-major order. The level indexes this order; once it reaches the
    /// last candidate, or with `force_furthest`, a start is sampled from the
    /// farthest pool instead.
    pub fn select_start<R: Rng>(
        &self,
        starts: &BTreeSet<Position>,
        goal: Position,
        policy: SpawnPolicy,
        force_furthest: bool,
        rng: &mut R,
    ) -> Option<Position> {
        if policy == SpawnPolicy::Farthest && !force_furthest {
            return starts.iter().copied().min_by_key(|p| Reverse(p.manhattan(goal)));
        }

        let mut ordered: Vec<Position> = starts.iter().copied().collect();
        ordered.sort_by_key(|p| p.manhattan(goal));
        let count = ordered.len();
        if count == 0 {
            return None;
        }

        if force_furthest || self.level >= count - 1 {
            let pool = self.config.furthest_pool.clamp(1, count);
            ordered[count - pool..].choose(rng).copied()
        } else {
            Some(ordered[self.level])
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn starts() -> BTreeSet<Position> {
        // Distances to (0, 0): 1, 2, 3, ..., 8
        (1..=8).map(|col| Position::new(0, col)).collect()
    }

    #[test]
    fn five_successes_advance_one_level() {
        let mut curriculum = Curriculum::new(CurriculumConfig::default());
        for _ in 0..4 {
            assert!(!curriculum.record_episode(Outcome::Success));
        }
        assert!(curriculum.record_episode(Outcome::Success));
        assert_eq!(curriculum.level(), 1);
        assert_eq!(curriculum.streak(), 0);
    }

    #[test]
    fn failure_breaks_the_streak() {
        let mut curriculum = Curriculum::new(CurriculumConfig::default());
        for _ in 0..4 {
            curriculum.record_episode(Outcome::Success);
        }
        curriculum.record_episode(Outcome::Timeout);
        assert_eq!(curriculum.streak(), 0);
        assert!(!curriculum.record_episode(Outcome::Success));
        assert_eq!(curriculum.level(), 0);
        assert_eq!(curriculum.total_successes(), 5);
    }

    #[test]
    fn level_indexes_starts_by_distance() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut curriculum = Curriculum::new(CurriculumConfig {
            promote_after: 1,
            ..CurriculumConfig::default()
        });
        let goal = Position::new(0, 0);

        for expected_col in 1..=6 {
            let start = curriculum.select_start(
                &starts(),
                goal,
                SpawnPolicy::Curriculum,
                false,
                &mut rng,
            );
            assert_eq!(start, Some(Position::new(0, expected_col)));
            curriculum.record_episode(Outcome::Success);
        }
    }

    #[test]
    fn exhausted_levels_sample_the_farthest_quartile() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut curriculum = Curriculum::new(CurriculumConfig {
            promote_after: 1,
            ..CurriculumConfig::default()
        });
        for _ in 0..7 {
            curriculum.record_episode(Outcome::Success);
        }
        for _ in 0..50 {
            let start = curriculum
                .select_start(
                    &starts(),
                    Position::new(0, 0),
                    SpawnPolicy::Curriculum,
                    false,
                    &mut rng,
                )
                .unwrap();
            assert!(start.col >= 5);
        }
    }

    #[test]
    fn force_furthest_ignores_the_level() {
        let mut rng = StdRng::seed_from_u64(9);
        let curriculum = Curriculum::new(CurriculumConfig::default());
        for _ in 0..50 {
            let start = curriculum
                .select_start(
                    &starts(),
                    Position::new(0, 0),
                    SpawnPolicy::Curriculum,
                    true,
                    &mut rng,
                )
                .unwrap();
            assert!(start.col >= 5);
        }
    }

    #[test]
    fn farthest_policy_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(1);
        let curriculum = Curriculum::new(CurriculumConfig::default());
        let starts: BTreeSet<Position> = [
            Position::new(0, 2),
            Position::new(2, 0),
            Position::new(1, 0),
        ]
        .into();
        let start = curriculum.select_start(
            &starts,
            Position::new(0, 0),
            SpawnPolicy::Farthest,
            false,
            &mut rng,
        );
        assert_eq!(start, Some(Position::new(0, 2)));
    }

    #[test]
    fn emptiness_drops_with_total_successes() {
        let mut curriculum = Curriculum::new(CurriculumConfig::default());
        assert_eq!(curriculum.emptiness(0.8), 0.8);
        curriculum.total_successes = 501;
        assert_eq!(curriculum.emptiness(0.8), 0.5);
        assert_eq!(curriculum.emptiness(0.3), 0.3);
        curriculum.total_successes = 1501;
        assert_eq!(curriculum.emptiness(0.8), 0.2);
    }
}
