//! Layout parsing and per-episode tile category resolution.
//!
//! A [`Layout`] is the validated symbol grid read from a level file. It is
//! immutable; every reset calls [`Layout::resolve`] to roll the random cells
//! and produce fresh [`TileSets`].

use std::{
    collections::BTreeSet,
    fmt::{self, Write},
    str::FromStr,
};

use rand::{
    Rng,
    distr::{Distribution, weighted::WeightedIndex},
};
use serde::{Deserialize, Serialize};

use crate::{Position, config::ConfigError, map::Grid};

/// Errors raised while reading a layout. These are fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("Layout is empty")]
    Empty,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    NonRectangular {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown layout symbol '{symbol}' at ({row}, {col})")]
    UnknownSymbol { symbol: char, row: usize, col: usize },
    #[error("No goal ('G') found in layout")]
    MissingGoal,
    #[error("Multiple goals ('G') found in layout: {first:?} and {second:?}")]
    MultipleGoals { first: Position, second: Position },
    #[error("No start position ('S') found in layout")]
    MissingStart,
}

/// A single character of a layout file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    Wall,
    Start,
    Goal,
    Hazard,
    Bonus,
    Rubble,
    EnemySpawn,
    /// Resolved to Empty, Hazard, Bonus or EnemySpawn on every reset.
    Random,
    Empty,
}

impl Symbol {
    /// The category of a fixed symbol, `None` for [`Symbol::Random`].
    pub fn fixed_category(self) -> Option<TileCategory> {
        match self {
            Symbol::Wall => Some(TileCategory::Wall),
            Symbol::Start => Some(TileCategory::Start),
            Symbol::Goal => Some(TileCategory::Goal),
            Symbol::Hazard => Some(TileCategory::Hazard),
            Symbol::Bonus => Some(TileCategory::Bonus),
            Symbol::Rubble => Some(TileCategory::Rubble),
            Symbol::EnemySpawn => Some(TileCategory::EnemySpawn),
            Symbol::Empty => Some(TileCategory::Empty),
            Symbol::Random => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Symbol::Wall => '#',
            Symbol::Start => 'S',
            Symbol::Goal => 'G',
            Symbol::Hazard => 'R',
            Symbol::Bonus => 'B',
            Symbol::Rubble => 'E',
            Symbol::EnemySpawn => 'M',
            Symbol::Random => 'A',
            Symbol::Empty => '.',
        }
    }
}

impl TryFrom<char> for Symbol {
    type Error = char;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            '#' => Ok(Symbol::Wall),
            'S' => Ok(Symbol::Start),
            'G' => Ok(Symbol::Goal),
            'R' => Ok(Symbol::Hazard),
            'B' => Ok(Symbol::Bonus),
            'E' => Ok(Symbol::Rubble),
            'M' => Ok(Symbol::EnemySpawn),
            'A' => Ok(Symbol::Random),
            '.' => Ok(Symbol::Empty),
            other => Err(other),
        }
    }
}

/// Mutually exclusive classification of a cell after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileCategory {
    Wall,
    Start,
    Goal,
    Hazard,
    Bonus,
    Rubble,
    EnemySpawn,
    Empty,
}

/// Relative weights used when a random cell is not left empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomTileWeights {
    pub hazard: f64,
    pub bonus: f64,
    pub enemy: f64,
}

impl RandomTileWeights {
    const TARGETS: [TileCategory; 3] = [
        TileCategory::Hazard,
        TileCategory::Bonus,
        TileCategory::EnemySpawn,
    ];

    /// Builds the sampling distribution, rejecting negative, non-finite or
    /// all-zero weights.
    pub fn distribution(&self) -> Result<WeightedIndex<f64>, ConfigError> {
        let weights = [self.hazard, self.bonus, self.enemy];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0
        {
            return Err(ConfigError::InvalidWeights(*self));
        }
        WeightedIndex::new(weights).map_err(|_| ConfigError::InvalidWeights(*self))
    }
}

/// The categorized coordinate sets of one episode.
///
/// Ordered sets keep iteration, and therefore seeded runs, deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSets {
    pub walls: BTreeSet<Position>,
    pub starts: BTreeSet<Position>,
    pub hazards: BTreeSet<Position>,
    pub bonuses: BTreeSet<Position>,
    pub rubble: BTreeSet<Position>,
    pub enemy_spawns: BTreeSet<Position>,
    pub goal: Position,
}

impl TileSets {
    /// Category of `position` as resolved for this episode.
    pub fn category(&self, position: Position) -> TileCategory {
        if position == self.goal {
            TileCategory::Goal
        } else if self.walls.contains(&position) {
            TileCategory::Wall
        } else if self.rubble.contains(&position) {
            TileCategory::Rubble
        } else if self.hazards.contains(&position) {
            TileCategory::Hazard
        } else if self.bonuses.contains(&position) {
            TileCategory::Bonus
        } else if self.enemy_spawns.contains(&position) {
            TileCategory::EnemySpawn
        } else if self.starts.contains(&position) {
            TileCategory::Start
        } else {
            TileCategory::Empty
        }
    }

    /// Walls and rubble can never be entered.
    #[inline]
    pub fn is_obstacle(&self, position: Position) -> bool {
        self.walls.contains(&position) || self.rubble.contains(&position)
    }

    fn insert(&mut self, category: TileCategory, position: Position) {
        match category {
            TileCategory::Wall => {
                self.walls.insert(position);
            }
            TileCategory::Start => {
                self.starts.insert(position);
            }
            TileCategory::Goal => self.goal = position,
            TileCategory::Hazard => {
                self.hazards.insert(position);
            }
            TileCategory::Bonus => {
                self.bonuses.insert(position);
            }
            TileCategory::Rubble => {
                self.rubble.insert(position);
            }
            TileCategory::EnemySpawn => {
                self.enemy_spawns.insert(position);
            }
            TileCategory::Empty => {}
        }
    }
}

/// A validated, rectangular symbol grid with exactly one goal and at least
/// one start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    grid: Grid<Symbol>,
    goal: Position,
}

impl Layout {
    /// Validates a symbol grid.
    pub fn from_grid(grid: Grid<Symbol>) -> Result<Self, LayoutError> {
        if grid.is_empty() {
            return Err(LayoutError::Empty);
        }

        let mut goal: Option<Position> = None;
        let mut has_start = false;
        for (position, symbol) in grid.enumerate() {
            match symbol {
                Symbol::Goal => {
                    if let Some(first) = goal {
                        return Err(LayoutError::MultipleGoals {
                            first,
                            second: position,
                        });
                    }
                    goal = Some(position);
                }
                Symbol::Start => has_start = true,
                _ => {}
            }
        }

        let goal = goal.ok_or(LayoutError::MissingGoal)?;
        if !has_start {
            return Err(LayoutError::MissingStart);
        }
        Ok(Layout { grid, goal })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.grid.rows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.grid.cols()
    }

    pub fn goal(&self) -> Position {
        self.goal
    }

    pub fn grid(&self) -> &Grid<Symbol> {
        &self.grid
    }

    /// Resolves every cell into exactly one category.
    ///
    /// Random cells stay empty with probability `emptiness`; otherwise the
    /// category is drawn from `weights` (hazard, bonus, enemy).
    pub fn resolve<R: Rng>(
        &self,
        emptiness: f64,
        weights: &WeightedIndex<f64>,
        rng: &mut R,
    ) -> TileSets {
        let mut tiles = TileSets {
            walls: BTreeSet::new(),
            starts: BTreeSet::new(),
            hazards: BTreeSet::new(),
            bonuses: BTreeSet::new(),
            rubble: BTreeSet::new(),
            enemy_spawns: BTreeSet::new(),
            goal: self.goal,
        };

        for (position, symbol) in self.grid.enumerate() {
            let category = match symbol.fixed_category() {
                Some(category) => category,
                None => {
                    if rng.random::<f64>() < emptiness {
                        TileCategory::Empty
                    } else {
                        RandomTileWeights::TARGETS[weights.sample(rng)]
                    }
                }
            };
            tiles.insert(category, position);
        }

        tiles
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows() {
            if row > 0 {
                f.write_char('\n')?;
            }
            for col in 0..self.cols() {
                f.write_char(self.grid[Position::new(row, col)].as_char())?;
            }
        }
        Ok(())
    }
}

impl FromStr for Layout {
    type Err = LayoutError;

    /// Parses one row per non-blank line, ignoring trailing whitespace.
    ///
    /// Rows in errors are source line indices, blank lines included.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rows: Vec<Vec<Symbol>> = Vec::new();

        for (row, line) in s
            .lines()
            .map(str::trim_end)
            .enumerate()
            .filter(|(_, l)| !l.is_empty())
        {
            let symbols = line
                .chars()
                .enumerate()
                .map(|(col, c)| {
                    Symbol::try_from(c)
                        .map_err(|symbol| LayoutError::UnknownSymbol { symbol, row, col })
                })
                .collect::<Result<Vec<_>, _>>()?;

            if let Some(first) = rows.first() {
                if symbols.len() != first.len() {
                    return Err(LayoutError::NonRectangular {
                        row,
                        expected: first.len(),
                        found: symbols.len(),
                    });
                }
            }
            rows.push(symbols);
        }

        let grid = Grid::from_rows(rows).ok_or(LayoutError::Empty)?;
        Layout::from_grid(grid)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    const WEIGHTS: RandomTileWeights = RandomTileWeights {
        hazard: 0.3,
        bonus: 0.6,
        enemy: 0.1,
    };

    #[test]
    fn fixed_symbols_map_to_their_category() {
        let layout: Layout = "#####\n#SRB#\n#EMG#\n#####".parse().unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let tiles = layout.resolve(0.0, &WEIGHTS.distribution().unwrap(), &mut rng);

        assert_eq!(tiles.goal, Position::new(2, 3));
        assert_eq!(tiles.walls.len(), 14);
        assert!(tiles.starts.contains(&Position::new(1, 1)));
        assert!(tiles.hazards.contains(&Position::new(1, 2)));
        assert!(tiles.bonuses.contains(&Position::new(1, 3)));
        assert!(tiles.rubble.contains(&Position::new(2, 1)));
        assert!(tiles.enemy_spawns.contains(&Position::new(2, 2)));
        assert_eq!(tiles.category(Position::new(2, 2)), TileCategory::EnemySpawn);
    }

    #[test]
    fn construction_errors_are_reported() {
        assert_eq!(
            "#S#\n#G".parse::<Layout>(),
            Err(LayoutError::NonRectangular {
                row: 1,
                expected: 3,
                found: 2
            })
        );
        assert_eq!("S..".parse::<Layout>(), Err(LayoutError::MissingGoal));
        assert_eq!("G..".parse::<Layout>(), Err(LayoutError::MissingStart));
        assert_eq!("".parse::<Layout>(), Err(LayoutError::Empty));
        assert!(matches!(
            "SGG".parse::<Layout>(),
            Err(LayoutError::MultipleGoals { .. })
        ));
        assert_eq!(
            "SGx".parse::<Layout>(),
            Err(LayoutError::UnknownSymbol {
                symbol: 'x',
                row: 0,
                col: 2
            })
        );
    }

    #[test]
    fn blank_lines_and_trailing_spaces_are_ignored() {
        let layout: Layout = "\n#S#  \n\n#G#\t\n".parse().unwrap();
        assert_eq!(layout.rows(), 2);
        assert_eq!(layout.goal(), Position::new(1, 1));
        assert_eq!(layout.to_string(), "#S#\n#G#");
    }

    #[test]
    fn error_rows_count_source_lines() {
        assert_eq!(
            "SG\n\n x".parse::<Layout>(),
            Err(LayoutError::UnknownSymbol {
                symbol: ' ',
                row: 2,
                col: 0
            })
        );
        assert_eq!(
            "SG\n\nGGG".parse::<Layout>(),
            Err(LayoutError::NonRectangular {
                row: 2,
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn display_writes_the_symbols_back() {
        let text = "#####\n#SAB#\n#E.G#\n#RM.#\n#####";
        let layout: Layout = text.parse().unwrap();
        assert_eq!(layout.to_string(), text);
    }

    #[test]
    fn random_cells_follow_configured_weights() {
        let row = "A".repeat(100);
        let mut text = format!("SG{}\n", "A".repeat(98));
        for _ in 0..99 {
            text.push_str(&row);
            text.push('\n');
        }
        let layout: Layout = text.parse().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let tiles = layout.resolve(0.0, &WEIGHTS.distribution().unwrap(), &mut rng);

        let total = (tiles.hazards.len() + tiles.bonuses.len() + tiles.enemy_spawns.len()) as f64;
        assert_eq!(total, 9998.0);
        assert!((tiles.hazards.len() as f64 / total - 0.3).abs() < 0.03);
        assert!((tiles.bonuses.len() as f64 / total - 0.6).abs() < 0.03);
        assert!((tiles.enemy_spawns.len() as f64 / total - 0.1).abs() < 0.03);
        assert!(tiles.walls.is_empty() && tiles.rubble.is_empty());
    }

    #[test]
    fn full_emptiness_leaves_random_cells_empty() {
        let layout: Layout = "SAAAG".parse().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let tiles = layout.resolve(1.0, &WEIGHTS.distribution().unwrap(), &mut rng);
        assert!(tiles.hazards.is_empty());
        assert!(tiles.bonuses.is_empty());
        assert!(tiles.enemy_spawns.is_empty());
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let zero = RandomTileWeights {
            hazard: 0.0,
            bonus: 0.0,
            enemy: 0.0,
        };
        assert!(zero.distribution().is_err());
        let negative = RandomTileWeights {
            hazard: -1.0,
            ..WEIGHTS
        };
        assert!(negative.distribution().is_err());
    }
}
