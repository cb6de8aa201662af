use serde::{Deserialize, Serialize};

use crate::{
    action::ActionMode,
    curriculum::{CurriculumConfig, SpawnPolicy},
    layout::RandomTileWeights,
    outcome::RewardConfig,
};

/// Represents errors in an [`EngineConfig`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Random tile weights must be finite, non-negative and not all zero: {0:?}")]
    InvalidWeights(RandomTileWeights),
    #[error("Emptiness must be within [0, 1], got {0}")]
    InvalidEmptiness(f64),
    #[error("Hazard tolerance must be at least 1")]
    ZeroHazardTolerance,
    #[error("Curriculum must require at least one success per level")]
    ZeroPromotion,
    #[error("Loop window must hold at least one position")]
    ZeroLoopWindow,
    #[error("Step cap must be at least 1, use no cap to disable it")]
    ZeroStepCap,
}

/// Everything that configures an [`crate::environment::Environment`].
///
/// Missing fields deserialize to the training preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub action_mode: ActionMode,
    /// Probability that a random cell stays empty.
    pub emptiness: f64,
    pub random_weights: RandomTileWeights,
    /// Hazard hits that end the episode.
    pub hazard_tolerance: u32,
    /// Steps after which the episode is truncated. `None` disables the cap.
    pub max_steps: Option<u32>,
    /// Disables the per-move cost and the goal step penalty.
    pub omit_step_penalty: bool,
    /// Consecutive blocked moves that truncate the episode as stuck.
    pub wall_hit_limit: u32,
    pub loop_window: usize,
    /// A full loop window covering at most this many cells is a loop.
    pub loop_max_distinct: usize,
    /// Seek-reward and seek-enemy retry seek-goal before the fallback chain.
    pub retarget_goal: bool,
    pub spawn: SpawnPolicy,
    pub rewards: RewardConfig,
    pub curriculum: CurriculumConfig,
}

impl EngineConfig {
    /// Training environment: high-level actions, sparse maps and
    /// curriculum spawning.
    pub fn training() -> Self {
        EngineConfig {
            action_mode: ActionMode::HighLevel,
            emptiness: 0.8,
            random_weights: RandomTileWeights {
                hazard: 0.3,
                bonus: 0.6,
                enemy: 0.1,
            },
            hazard_tolerance: 1,
            max_steps: Some(150),
            omit_step_penalty: false,
            wall_hit_limit: 10,
            loop_window: 30,
            loop_max_distinct: 4,
            retarget_goal: false,
            spawn: SpawnPolicy::Curriculum,
            rewards: RewardConfig::training(),
            curriculum: CurriculumConfig::default(),
        }
    }

    /// Keyboard game: low-level actions, denser maps, farthest spawn and
    /// arcade scoring.
    pub fn interactive() -> Self {
        EngineConfig {
            action_mode: ActionMode::LowLevel,
            emptiness: 0.3,
            random_weights: RandomTileWeights {
                hazard: 0.2,
                bonus: 0.6,
                enemy: 0.2,
            },
            max_steps: None,
            spawn: SpawnPolicy::Farthest,
            rewards: RewardConfig::interactive(),
            ..EngineConfig::training()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.random_weights.distribution()?;
        check_emptiness(self.emptiness)?;
        for step in &self.curriculum.emptiness_schedule {
            check_emptiness(step.emptiness)?;
        }
        if self.hazard_tolerance == 0 {
            return Err(ConfigError::ZeroHazardTolerance);
        }
        if self.curriculum.promote_after == 0 {
            return Err(ConfigError::ZeroPromotion);
        }
        if self.loop_window == 0 {
            return Err(ConfigError::ZeroLoopWindow);
        }
        if self.max_steps == Some(0) {
            return Err(ConfigError::ZeroStepCap);
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::training()
    }
}

pub(crate) fn check_emptiness(emptiness: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&emptiness) {
        Ok(())
    } else {
        Err(ConfigError::InvalidEmptiness(emptiness))
    }
}
