//! Turns a decoded [`Action`] into the single low-level action the
//! environment applies this step.

use rand::Rng;

use crate::{
    Direction, Position,
    action::{Action, HighLevelAction, LowLevelAction},
    enemy::EnemyScheduler,
    layout::TileSets,
    pathfinding,
};

/// Result of resolving an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Act {
        action: LowLevelAction,
        /// True when the requested intent had no direction and the fallback
        /// chain picked the move.
        fallback: bool,
    },
    /// Every fallback failed; the episode ends.
    Stuck,
}

/// Read-only view of the world around the agent.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    pub tiles: &'a TileSets,
    pub enemies: &'a EnemyScheduler,
    pub agent: Position,
    pub rows: usize,
    pub cols: usize,
    pub retarget_goal: bool,
}

impl Resolver<'_> {
    pub fn resolve<R: Rng>(&self, action: Action, rng: &mut R) -> Resolution {
        let intent = match action {
            Action::Low(action) => {
                return Resolution::Act {
                    action,
                    fallback: false,
                };
            }
            Action::High(intent) => intent,
        };

        let direction = match intent {
            HighLevelAction::Attack => {
                return Resolution::Act {
                    action: LowLevelAction::Attack,
                    fallback: false,
                };
            }
            HighLevelAction::SeekGoal => self.seek_goal(),
            HighLevelAction::SeekReward => self
                .seek(|p| self.tiles.bonuses.contains(&p))
                .or_else(|| self.retarget()),
            HighLevelAction::SeekEnemy => self
                .seek(|p| self.enemies.occupies(p))
                .or_else(|| self.retarget()),
            HighLevelAction::SeekSafety => self.safe_direction(rng),
        };

        match direction {
            Some(direction) => Resolution::Act {
                action: LowLevelAction::Move(direction),
                fallback: false,
            },
            None => {
                tracing::trace!(?intent, agent = ?self.agent, "No direction, falling back");
                self.fallback(rng)
            }
        }
    }

    fn seek_goal(&self) -> Option<Direction> {
        let goal = self.tiles.goal;
        self.seek(|p| p == goal)
    }

    fn retarget(&self) -> Option<Direction> {
        if self.retarget_goal {
            self.seek_goal()
        } else {
            None
        }
    }

    /// Shortest-path direction that never enters walls, rubble or hazards.
    fn seek<T>(&self, is_target: T) -> Option<Direction>
    where
        T: Fn(Position) -> bool,
    {
        pathfinding::direction_to_nearest(
            self.agent,
            self.rows,
            self.cols,
            |p| !self.tiles.is_obstacle(p) && !self.tiles.hazards.contains(&p),
            is_target,
        )
    }

    fn safe_direction<R: Rng>(&self, rng: &mut R) -> Option<Direction> {
        pathfinding::random_safe_direction(
            self.agent,
            self.rows,
            self.cols,
            |p| {
                !self.tiles.is_obstacle(p)
                    && !self.tiles.hazards.contains(&p)
                    && !self.enemies.danger().contains(&p)
                    && !self.enemies.occupies(p)
            },
            rng,
        )
    }

    fn fallback<R: Rng>(&self, rng: &mut R) -> Resolution {
        let direction = self.safe_direction(rng).or_else(|| {
            pathfinding::first_open_direction(self.agent, self.rows, self.cols, |p| {
                !self.tiles.is_obstacle(p)
            })
        });

        match direction {
            Some(direction) => Resolution::Act {
                action: LowLevelAction::Move(direction),
                fallback: true,
            },
            None => Resolution::Stuck,
        }
    }
}
