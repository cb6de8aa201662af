//! Action codes accepted by the environment.
//!
//! Codes are plain integers so that policies can emit them directly; they are
//! decoded against the active [`ActionMode`] and rejected when out of range.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Direction;

/// Selects which action set [`crate::environment::Environment::step`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionMode {
    /// Atomic moves and attack.
    LowLevel,
    /// Goal-directed intents resolved through pathfinding.
    #[default]
    HighLevel,
}

impl fmt::Display for ActionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionMode::LowLevel => f.write_str("low-level"),
            ActionMode::HighLevel => f.write_str("high-level"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Action code {code} is not valid in {mode} mode")]
pub struct InvalidAction {
    pub code: usize,
    pub mode: ActionMode,
}

/// One atomic move or attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LowLevelAction {
    Move(Direction),
    Attack,
}

impl LowLevelAction {
    pub const COUNT: usize = 5;
}

impl TryFrom<usize> for LowLevelAction {
    type Error = InvalidAction;

    fn try_from(code: usize) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(LowLevelAction::Move(Direction::Up)),
            1 => Ok(LowLevelAction::Move(Direction::Down)),
            2 => Ok(LowLevelAction::Move(Direction::Left)),
            3 => Ok(LowLevelAction::Move(Direction::Right)),
            4 => Ok(LowLevelAction::Attack),
            code => Err(InvalidAction {
                code,
                mode: ActionMode::LowLevel,
            }),
        }
    }
}

impl From<LowLevelAction> for usize {
    fn from(action: LowLevelAction) -> Self {
        match action {
            LowLevelAction::Move(Direction::Up) => 0,
            LowLevelAction::Move(Direction::Down) => 1,
            LowLevelAction::Move(Direction::Left) => 2,
            LowLevelAction::Move(Direction::Right) => 3,
            LowLevelAction::Attack => 4,
        }
    }
}

/// A goal-directed intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HighLevelAction {
    SeekGoal,
    SeekReward,
    SeekSafety,
    Attack,
    SeekEnemy,
}

impl HighLevelAction {
    pub const COUNT: usize = 5;
}

impl TryFrom<usize> for HighLevelAction {
    type Error = InvalidAction;

    fn try_from(code: usize) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(HighLevelAction::SeekGoal),
            1 => Ok(HighLevelAction::SeekReward),
            2 => Ok(HighLevelAction::SeekSafety),
            3 => Ok(HighLevelAction::Attack),
            4 => Ok(HighLevelAction::SeekEnemy),
            code => Err(InvalidAction {
                code,
                mode: ActionMode::HighLevel,
            }),
        }
    }
}

impl From<HighLevelAction> for usize {
    fn from(action: HighLevelAction) -> Self {
        match action {
            HighLevelAction::SeekGoal => 0,
            HighLevelAction::SeekReward => 1,
            HighLevelAction::SeekSafety => 2,
            HighLevelAction::Attack => 3,
            HighLevelAction::SeekEnemy => 4,
        }
    }
}

/// An action decoded for the active mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Low(LowLevelAction),
    High(HighLevelAction),
}

impl Action {
    pub fn decode(code: usize, mode: ActionMode) -> Result<Self, InvalidAction> {
        match mode {
            ActionMode::LowLevel => LowLevelAction::try_from(code).map(Action::Low),
            ActionMode::HighLevel => HighLevelAction::try_from(code).map(Action::High),
        }
    }

    /// The mode whose action set contains this action.
    pub fn mode(self) -> ActionMode {
        match self {
            Action::Low(_) => ActionMode::LowLevel,
            Action::High(_) => ActionMode::HighLevel,
        }
    }

    /// Code of this action within its own mode.
    pub fn code(self) -> usize {
        match self {
            Action::Low(action) => action.into(),
            Action::High(action) => action.into(),
        }
    }
}
