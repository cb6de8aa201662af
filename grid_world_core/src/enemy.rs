//! Turn-scheduled enemy movement.
//!
//! Enemies move at half the agent's speed: on even steps every enemy plans a
//! destination, on odd steps every enemy moves to it. Destinations are
//! reserved during planning so no two enemies ever plan the same cell.

use std::collections::{BTreeSet, HashSet};

use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

use crate::{Direction, Position, layout::TileSets};

/// Which half of the movement cycle a tick ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickPhase {
    Planning,
    Execution,
}

impl TickPhase {
    pub fn for_step(step: u32) -> Self {
        if step % 2 == 0 {
            TickPhase::Planning
        } else {
            TickPhase::Execution
        }
    }
}

/// Current enemy positions plus the plan made for the next execution tick.
///
/// `planned` is a separate snapshot indexed like `positions`; execution
/// replaces `positions` with it in a single assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnemyScheduler {
    positions: Vec<Position>,
    planned: Option<Vec<Position>>,
    danger: BTreeSet<Position>,
}

impl EnemyScheduler {
    pub fn new(spawns: impl IntoIterator<Item = Position>) -> Self {
        EnemyScheduler {
            positions: spawns.into_iter().collect(),
            planned: None,
            danger: BTreeSet::new(),
        }
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Cells enemies will move into on the next execution tick.
    pub fn danger(&self) -> &BTreeSet<Position> {
        &self.danger
    }

    /// The plan of the last planning tick, if it has not been executed yet.
    pub fn planned_targets(&self) -> Option<&[Position]> {
        self.planned.as_deref()
    }

    pub fn occupies(&self, position: Position) -> bool {
        self.positions.contains(&position)
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Advances the schedule by one tick. `step` is the episode step counter
    /// before it is incremented for the current step.
    pub fn tick<R: Rng>(
        &mut self,
        step: u32,
        tiles: &TileSets,
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> TickPhase {
        let phase = TickPhase::for_step(step);
        match phase {
            TickPhase::Planning => self.plan(tiles, rows, cols, rng),
            TickPhase::Execution => self.execute(),
        }
        tracing::trace!(step, ?phase, enemies = self.positions.len(), "Enemy tick");
        phase
    }

    fn plan<R: Rng>(&mut self, tiles: &TileSets, rows: usize, cols: usize, rng: &mut R) {
        self.danger.clear();
        let mut reserved: HashSet<Position> = HashSet::new();
        let mut planned = Vec::with_capacity(self.positions.len());

        for &position in &self.positions {
            let candidates: Vec<Position> = Direction::ALL
                .into_iter()
                .filter_map(|direction| position.step(direction, rows, cols))
                .filter(|n| {
                    !tiles.is_obstacle(*n)
                        && !tiles.hazards.contains(n)
                        && !self.positions.contains(n)
                        && !reserved.contains(n)
                })
                .collect();

            match candidates.choose(rng) {
                Some(&target) => {
                    reserved.insert(target);
                    self.danger.insert(target);
                    planned.push(target);
                }
                None => planned.push(position),
            }
        }

        self.planned = Some(planned);
    }

    fn execute(&mut self) {
        if let Some(planned) = self.planned.take() {
            self.positions = planned;
        }
        self.danger.clear();
    }

    /// Removes the enemy standing on `position` together with its pending
    /// plan. Returns whether an enemy was there.
    pub fn remove_at(&mut self, position: Position) -> bool {
        let Some(index) = self.positions.iter().position(|p| *p == position) else {
            return false;
        };
        self.positions.remove(index);
        if let Some(planned) = self.planned.as_mut() {
            let target = planned.remove(index);
            if target != position {
                self.danger.remove(&target);
            }
        }
        true
    }
}
