use rand::{SeedableRng, distr::weighted::WeightedIndex, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    Direction, Position,
    action::{Action, ActionMode, InvalidAction, LowLevelAction},
    config::{ConfigError, EngineConfig, check_emptiness},
    curriculum::Curriculum,
    enemy::EnemyScheduler,
    layout::{Layout, LayoutError, TileSets},
    outcome::{EpisodeStats, Outcome, PositionHistory},
    resolver::{Resolution, Resolver},
};

/// Represents errors returned by the environment.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    InvalidAction(#[from] InvalidAction),
    #[error("Episode has finished; reset before stepping again")]
    EpisodeFinished,
}

/// Category codes of the flattened observation grid.
///
/// The numeric values are consumed by trained policies and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObservationCode {
    Empty = 0,
    Agent = 1,
    Goal = 2,
    Hazard = 3,
    Bonus = 4,
    Wall = 5,
    Rubble = 6,
    Enemy = 7,
    Danger = 8,
}

/// Holds the state of the agent within the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentState {
    pub position: Position,
    pub facing: Direction,
    pub history: PositionHistory,
}

/// Per-reset overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResetOptions {
    /// Reseeds the environment's generator before the layout is rolled.
    pub seed: Option<u64>,
    /// Spawn in the farthest quartile regardless of curriculum level.
    pub force_furthest: bool,
    /// Replaces the curriculum emptiness for this reset.
    pub emptiness: Option<f64>,
    /// Switches the action mode from this reset on.
    pub action_mode: Option<ActionMode>,
    /// Overrides the configured step-penalty toggle for this episode.
    pub omit_step_penalty: Option<bool>,
}

/// Additional information from a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub step: u32,
    /// The move was rejected by a wall, rubble or the grid edge.
    pub blocked: bool,
    pub kills: u32,
    pub picked_up: bool,
    /// The fallback chain chose the move.
    pub fallback: bool,
    /// The low-level action actually applied, `None` when the agent was stuck.
    pub action: Option<LowLevelAction>,
}

/// Step result from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub observation: Vec<u8>,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub outcome: Option<Outcome>,
    pub info: StepInfo,
}

/// State that lives for exactly one episode.
#[derive(Debug, Clone)]
struct Episode {
    tiles: TileSets,
    agent: AgentState,
    enemies: EnemyScheduler,
    attack_highlight: Vec<Position>,
    stats: EpisodeStats,
    omit_step_penalty: bool,
}

/// Manages the simulation.
///
/// Owns the layout, its own random generator, the curriculum and the
/// current episode. Independent instances share nothing.
#[derive(Debug, Clone)]
pub struct Environment {
    layout: Layout,
    config: EngineConfig,
    weights: WeightedIndex<f64>,
    rng: StdRng,
    curriculum: Curriculum,
    action_mode: ActionMode,
    emptiness: f64,
    episode: Episode,
}

impl Environment {
    /// Creates an environment and rolls its first episode.
    ///
    /// `Environment::new(layout, config, seed)` produces the same episode as
    /// a later `reset` with the same seed.
    pub fn new(layout: Layout, config: EngineConfig, seed: u64) -> Result<Self, EnvironmentError> {
        config.validate()?;
        let weights = config.random_weights.distribution()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let curriculum = Curriculum::new(config.curriculum.clone());
        let emptiness = curriculum.emptiness(config.emptiness);
        let episode = roll_episode(
            &layout,
            &config,
            &curriculum,
            &weights,
            &mut rng,
            emptiness,
            &ResetOptions::default(),
        )?;

        Ok(Environment {
            action_mode: config.action_mode,
            layout,
            config,
            weights,
            rng,
            curriculum,
            emptiness,
            episode,
        })
    }

    /// Starts a new episode and returns its first observation.
    pub fn reset(&mut self, options: ResetOptions) -> Result<Vec<u8>, EnvironmentError> {
        // Validate before touching any state so a rejected reset changes nothing.
        let emptiness = match options.emptiness {
            Some(emptiness) => {
                check_emptiness(emptiness)?;
                emptiness
            }
            None => self.curriculum.emptiness(self.config.emptiness),
        };
        if let Some(seed) = options.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        if let Some(mode) = options.action_mode {
            self.action_mode = mode;
        }

        self.episode = roll_episode(
            &self.layout,
            &self.config,
            &self.curriculum,
            &self.weights,
            &mut self.rng,
            emptiness,
            &options,
        )?;
        self.emptiness = emptiness;
        Ok(self.observation())
    }

    /// Decodes `code` for the active action mode and advances one step.
    pub fn step(&mut self, code: usize) -> Result<StepResult, EnvironmentError> {
        if self.is_finished() {
            return Err(EnvironmentError::EpisodeFinished);
        }
        let action = Action::decode(code, self.action_mode)?;
        self.step_action(action)
    }

    /// Advances one step with an already decoded action.
    ///
    /// Actions from the other mode's set are rejected with
    /// [`InvalidAction`].
    ///
    /// Order: enemy tick, action resolution, then at most one of pickup,
    /// enemy collision, hazard collision, goal, blocked streak, loop and
    /// timeout in that priority.
    pub fn step_action(&mut self, action: Action) -> Result<StepResult, EnvironmentError> {
        if self.is_finished() {
            return Err(EnvironmentError::EpisodeFinished);
        }
        if action.mode() != self.action_mode {
            return Err(InvalidAction {
                code: action.code(),
                mode: self.action_mode,
            }
            .into());
        }

        let rows = self.layout.rows();
        let cols = self.layout.cols();
        let rewards = &self.config.rewards;
        let episode = &mut self.episode;

        episode.attack_highlight.clear();
        episode
            .enemies
            .tick(episode.stats.steps, &episode.tiles, rows, cols, &mut self.rng);
        episode.stats.steps += 1;

        let resolution = Resolver {
            tiles: &episode.tiles,
            enemies: &episode.enemies,
            agent: episode.agent.position,
            rows,
            cols,
            retarget_goal: self.config.retarget_goal,
        }
        .resolve(action, &mut self.rng);

        let mut reward = 0.0;
        let mut info = StepInfo {
            step: episode.stats.steps,
            ..StepInfo::default()
        };

        match resolution {
            Resolution::Stuck => {
                reward -= rewards.stuck_penalty;
                episode.stats.terminate(Outcome::Stuck);
            }
            Resolution::Act { action, fallback } => {
                info.action = Some(action);
                info.fallback = fallback;
                match action {
                    LowLevelAction::Attack => {
                        let facing = episode.agent.facing;
                        let mut cell = episode.agent.position;
                        for _ in 0..2 {
                            let Some(next) = cell.step(facing, rows, cols) else {
                                break;
                            };
                            cell = next;
                            episode.attack_highlight.push(cell);
                            if episode.enemies.remove_at(cell) {
                                info.kills += 1;
                                reward += episode.stats.record_kill(rewards);
                            }
                        }
                    }
                    LowLevelAction::Move(direction) => {
                        let agent = &mut episode.agent;
                        match agent
                            .position
                            .step(direction, rows, cols)
                            .filter(|target| !episode.tiles.is_obstacle(*target))
                        {
                            Some(target) => {
                                agent.position = target;
                                agent.facing = direction;
                                reward +=
                                    episode.stats.record_move(rewards, episode.omit_step_penalty);
                            }
                            None => {
                                info.blocked = true;
                                episode.stats.record_blocked();
                            }
                        }
                        agent.history.push(agent.position);
                    }
                }

                let position = episode.agent.position;
                if episode.tiles.bonuses.remove(&position) {
                    info.picked_up = true;
                    reward += episode.stats.record_pickup(rewards);
                }

                if episode.enemies.occupies(position) {
                    reward -= rewards.enemy_collision_penalty;
                    episode.stats.terminate(Outcome::KilledByEnemy);
                } else if episode.tiles.hazards.remove(&position)
                    && episode.stats.record_hazard_hit(self.config.hazard_tolerance)
                {
                    reward -= rewards.hazard_penalty;
                    episode.stats.terminate(Outcome::HazardCollision);
                } else if position == episode.tiles.goal {
                    reward += episode.stats.goal_reward(rewards, episode.omit_step_penalty);
                    episode.stats.terminate(Outcome::Success);
                } else if info.blocked
                    && self.config.wall_hit_limit > 0
                    && episode.stats.wall_hit_streak >= self.config.wall_hit_limit
                {
                    reward -= rewards.stuck_penalty;
                    episode.stats.truncate(Outcome::Stuck);
                } else if matches!(action, LowLevelAction::Move(_))
                    && episode
                        .agent
                        .history
                        .is_oscillating(self.config.loop_max_distinct)
                {
                    reward -= rewards.loop_penalty;
                    episode.stats.truncate(Outcome::Loop);
                } else if self
                    .config
                    .max_steps
                    .is_some_and(|cap| episode.stats.steps >= cap)
                {
                    reward -= rewards.timeout_penalty;
                    episode.stats.truncate(Outcome::Timeout);
                }
            }
        }

        episode.stats.credit(reward);

        if let Some(outcome) = episode.stats.outcome {
            tracing::debug!(
                %outcome,
                steps = episode.stats.steps,
                score = episode.stats.score,
                total_reward = episode.stats.total_reward,
                "Episode finished"
            );
            self.curriculum.record_episode(outcome);
        }

        Ok(StepResult {
            observation: self.observation(),
            reward,
            terminated: self.episode.stats.terminated,
            truncated: self.episode.stats.truncated,
            outcome: self.episode.stats.outcome,
            info,
        })
    }

    /// Flattened row-major grid of [`ObservationCode`] values.
    pub fn observation(&self) -> Vec<u8> {
        self.layout
            .grid()
            .enumerate()
            .map(|(position, _)| self.cell_code(position) as u8)
            .collect()
    }

    /// Category of a single cell, highest priority first: agent, goal,
    /// hazard, bonus, wall, rubble, enemy, danger.
    pub fn cell_code(&self, position: Position) -> ObservationCode {
        let episode = &self.episode;
        let tiles = &episode.tiles;
        if position == episode.agent.position {
            ObservationCode::Agent
        } else if position == tiles.goal {
            ObservationCode::Goal
        } else if tiles.hazards.contains(&position) {
            ObservationCode::Hazard
        } else if tiles.bonuses.contains(&position) {
            ObservationCode::Bonus
        } else if tiles.walls.contains(&position) {
            ObservationCode::Wall
        } else if tiles.rubble.contains(&position) {
            ObservationCode::Rubble
        } else if episode.enemies.occupies(position) {
            ObservationCode::Enemy
        } else if episode.enemies.danger().contains(&position) {
            ObservationCode::Danger
        } else {
            ObservationCode::Empty
        }
    }

    pub fn is_finished(&self) -> bool {
        self.episode.stats.is_finished()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn action_mode(&self) -> ActionMode {
        self.action_mode
    }

    /// Emptiness the current episode was rolled with.
    pub fn emptiness(&self) -> f64 {
        self.emptiness
    }

    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    pub fn tiles(&self) -> &TileSets {
        &self.episode.tiles
    }

    pub fn agent(&self) -> &AgentState {
        &self.episode.agent
    }

    pub fn enemies(&self) -> &[Position] {
        self.episode.enemies.positions()
    }

    pub fn danger(&self) -> &std::collections::BTreeSet<Position> {
        self.episode.enemies.danger()
    }

    /// Cells swept by this step's attack.
    pub fn attack_highlight(&self) -> &[Position] {
        &self.episode.attack_highlight
    }

    pub fn stats(&self) -> &EpisodeStats {
        &self.episode.stats
    }

    pub fn score(&self) -> f64 {
        self.episode.stats.score
    }
}

/// Resolves the layout, picks a spawn and places the enemies.
fn roll_episode(
    layout: &Layout,
    config: &EngineConfig,
    curriculum: &Curriculum,
    weights: &WeightedIndex<f64>,
    rng: &mut StdRng,
    emptiness: f64,
    options: &ResetOptions,
) -> Result<Episode, EnvironmentError> {
    let tiles = layout.resolve(emptiness, weights, rng);
    let start = curriculum
        .select_start(
            &tiles.starts,
            tiles.goal,
            config.spawn,
            options.force_furthest,
            rng,
        )
        .ok_or(LayoutError::MissingStart)?;
    let enemies = EnemyScheduler::new(tiles.enemy_spawns.iter().copied());

    tracing::debug!(
        ?start,
        level = curriculum.level(),
        emptiness,
        hazards = tiles.hazards.len(),
        bonuses = tiles.bonuses.len(),
        enemies = tiles.enemy_spawns.len(),
        "Episode reset"
    );

    Ok(Episode {
        agent: AgentState {
            position: start,
            facing: Direction::Down,
            history: PositionHistory::new(config.loop_window),
        },
        enemies,
        attack_highlight: Vec::new(),
        stats: EpisodeStats::new(&config.rewards),
        omit_step_penalty: options
            .omit_step_penalty
            .unwrap_or(config.omit_step_penalty),
        tiles,
    })
}
