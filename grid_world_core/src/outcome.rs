//! Score, reward and terminal-state bookkeeping for one episode.

use std::{
    collections::{HashSet, VecDeque},
    fmt,
};

use serde::{Deserialize, Serialize};

use crate::Position;

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    KilledByEnemy,
    HazardCollision,
    Stuck,
    Loop,
    Timeout,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::KilledByEnemy => "killed-by-enemy",
            Outcome::HazardCollision => "hazard-collision",
            Outcome::Stuck => "stuck",
            Outcome::Loop => "loop",
            Outcome::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reward table. Penalties are stored as positive magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Score at the start of an episode.
    pub initial_score: f64,
    /// Cost of every successful move.
    pub move_cost: f64,
    pub pickup_bonus: f64,
    pub kill_bonus: f64,
    pub enemy_collision_penalty: f64,
    pub hazard_penalty: f64,
    pub goal_reward: f64,
    /// Added to the goal reward per collected bonus tile.
    pub goal_pickup_multiplier: f64,
    /// Added to the goal reward per killed enemy.
    pub goal_kill_multiplier: f64,
    /// Subtracted from the goal reward per elapsed step.
    pub goal_step_penalty: f64,
    pub stuck_penalty: f64,
    pub loop_penalty: f64,
    pub timeout_penalty: f64,
}

impl RewardConfig {
    /// Small, normalized rewards for policy training.
    pub fn training() -> Self {
        RewardConfig {
            initial_score: 0.0,
            move_cost: 0.0,
            pickup_bonus: 0.1,
            kill_bonus: 0.1,
            enemy_collision_penalty: 1.0,
            hazard_penalty: 1.0,
            goal_reward: 1.0,
            goal_pickup_multiplier: 1.0,
            goal_kill_multiplier: 1.0,
            goal_step_penalty: 0.01,
            stuck_penalty: 1.0,
            loop_penalty: 1.0,
            timeout_penalty: 1.0,
        }
    }

    /// Arcade-style points for a human player.
    pub fn interactive() -> Self {
        RewardConfig {
            initial_score: 1000.0,
            move_cost: 100.0,
            pickup_bonus: 1100.0,
            kill_bonus: 1000.0,
            enemy_collision_penalty: 10000.0,
            hazard_penalty: 10000.0,
            goal_reward: 10000.0,
            goal_pickup_multiplier: 1.0,
            goal_kill_multiplier: 1000.0,
            goal_step_penalty: 0.0,
            stuck_penalty: 1000.0,
            loop_penalty: 1000.0,
            timeout_penalty: 1000.0,
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        RewardConfig::training()
    }
}

/// Sliding window of the agent's most recent positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionHistory {
    window: usize,
    positions: VecDeque<Position>,
}

impl PositionHistory {
    pub fn new(window: usize) -> Self {
        PositionHistory {
            window,
            positions: VecDeque::with_capacity(window),
        }
    }

    pub fn push(&mut self, position: Position) {
        if self.window == 0 {
            return;
        }
        if self.positions.len() == self.window {
            self.positions.pop_front();
        }
        self.positions.push_back(position);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// True once the window is full and covers at most `max_distinct` cells.
    pub fn is_oscillating(&self, max_distinct: usize) -> bool {
        if self.window == 0 || self.positions.len() < self.window {
            return false;
        }
        let distinct: HashSet<&Position> = self.positions.iter().collect();
        distinct.len() <= max_distinct
    }
}

/// Counters and accumulators of the running episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub steps: u32,
    pub score: f64,
    pub total_reward: f64,
    pub kills: u32,
    pub pickups: u32,
    pub hazard_hits: u32,
    pub wall_hits: u32,
    pub wall_hit_streak: u32,
    pub outcome: Option<Outcome>,
    pub terminated: bool,
    pub truncated: bool,
}

impl EpisodeStats {
    pub fn new(rewards: &RewardConfig) -> Self {
        EpisodeStats {
            score: rewards.initial_score,
            ..EpisodeStats::default()
        }
    }

    pub fn is_finished(&self) -> bool {
        self.terminated || self.truncated
    }

    /// Applies `amount` to both the running score and the episode return.
    pub fn credit(&mut self, amount: f64) {
        self.score += amount;
        self.total_reward += amount;
    }

    /// Records a rejected move and returns the new streak length.
    pub fn record_blocked(&mut self) -> u32 {
        self.wall_hits += 1;
        self.wall_hit_streak += 1;
        self.wall_hit_streak
    }

    /// Records a successful move and returns its cost as a reward.
    pub fn record_move(&mut self, rewards: &RewardConfig, omit_step_penalty: bool) -> f64 {
        self.wall_hit_streak = 0;
        if omit_step_penalty {
            0.0
        } else {
            -rewards.move_cost
        }
    }

    pub fn record_pickup(&mut self, rewards: &RewardConfig) -> f64 {
        self.pickups += 1;
        rewards.pickup_bonus
    }

    pub fn record_kill(&mut self, rewards: &RewardConfig) -> f64 {
        self.kills += 1;
        rewards.kill_bonus
    }

    /// Records a hazard hit; returns true once `tolerance` hits are reached.
    pub fn record_hazard_hit(&mut self, tolerance: u32) -> bool {
        self.hazard_hits += 1;
        self.hazard_hits >= tolerance
    }

    /// Terminal reward for reaching the goal, given the counters so far.
    pub fn goal_reward(&self, rewards: &RewardConfig, omit_step_penalty: bool) -> f64 {
        let mut reward = rewards.goal_reward
            + rewards.goal_pickup_multiplier * f64::from(self.pickups)
            + rewards.goal_kill_multiplier * f64::from(self.kills);
        if !omit_step_penalty {
            reward -= rewards.goal_step_penalty * f64::from(self.steps);
        }
        reward
    }

    pub fn terminate(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
        self.terminated = true;
    }

    pub fn truncate(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
        self.truncated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_tags_are_kebab_case() {
        assert_eq!(Outcome::KilledByEnemy.to_string(), "killed-by-enemy");
        assert_eq!(Outcome::HazardCollision.as_str(), "hazard-collision");
    }

    #[test]
    fn oscillation_needs_a_full_window() {
        let mut history = PositionHistory::new(30);
        let a = Position::new(1, 1);
        let b = Position::new(1, 2);
        for i in 0..29 {
            history.push(if i % 2 == 0 { a } else { b });
            assert!(!history.is_oscillating(4));
        }
        history.push(b);
        assert_eq!(history.len(), 30);
        assert!(history.is_oscillating(4));

        history.push(a);
        assert_eq!(history.len(), 30);
    }

    #[test]
    fn zero_window_records_nothing() {
        let mut history = PositionHistory::new(0);
        for _ in 0..10 {
            history.push(Position::new(0, 0));
        }
        assert!(history.is_empty());
        assert!(!history.is_oscillating(4));
    }

    #[test]
    fn wandering_is_not_oscillation() {
        let mut history = PositionHistory::new(30);
        for col in 0..30 {
            history.push(Position::new(0, col % 6));
        }
        assert!(!history.is_oscillating(4));
    }

    #[test]
    fn goal_reward_scales_with_counters() {
        let rewards = RewardConfig::training();
        let mut stats = EpisodeStats::new(&rewards);
        stats.steps = 10;
        stats.record_pickup(&rewards);
        stats.record_kill(&rewards);
        assert!((stats.goal_reward(&rewards, false) - 2.9).abs() < 1e-9);
        assert!((stats.goal_reward(&rewards, true) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn successful_move_resets_the_streak() {
        let rewards = RewardConfig::interactive();
        let mut stats = EpisodeStats::new(&rewards);
        assert_eq!(stats.score, 1000.0);
        stats.record_blocked();
        assert_eq!(stats.record_blocked(), 2);
        assert_eq!(stats.record_move(&rewards, false), -100.0);
        assert_eq!(stats.wall_hit_streak, 0);
        assert_eq!(stats.wall_hits, 2);
    }

    #[test]
    fn hazard_tolerance_counts_hits() {
        let mut stats = EpisodeStats::default();
        assert!(!stats.record_hazard_hit(2));
        assert!(stats.record_hazard_hit(2));
    }
}
