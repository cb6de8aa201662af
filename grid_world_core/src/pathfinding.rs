use std::collections::{HashMap, VecDeque};

use rand::{Rng, seq::IndexedRandom};

use crate::{Direction, Position};

/// Breadth-first search from `start` to the nearest position satisfying
/// `is_target`, returning the first direction of a shortest path.
///
/// Neighbours are expanded in [`Direction::ALL`] order, which makes ties
/// deterministic. Cells rejected by `is_passable` are never entered. `start`
/// itself is never treated as a target.
#[tracing::instrument(level = "trace", skip(is_passable, is_target), fields(row = start.row, col = start.col))]
pub fn direction_to_nearest<P, T>(
    start: Position,
    rows: usize,
    cols: usize,
    is_passable: P,
    is_target: T,
) -> Option<Direction>
where
    P: Fn(Position) -> bool,
    T: Fn(Position) -> bool,
{
    // First step taken from `start` to reach each visited cell.
    let mut first_step: HashMap<Position, Direction> = HashMap::new();
    let mut frontier = VecDeque::new();
    frontier.push_back(start);

    while let Some(current) = frontier.pop_front() {
        if current != start && is_target(current) {
            let direction = first_step.get(&current).copied();
            tracing::trace!(?current, ?direction, visited = first_step.len(), "Target found");
            return direction;
        }

        for direction in Direction::ALL {
            let Some(neighbor) = current.step(direction, rows, cols) else {
                continue;
            };
            if neighbor == start || first_step.contains_key(&neighbor) || !is_passable(neighbor) {
                continue;
            }
            let step = if current == start {
                direction
            } else {
                first_step[&current]
            };
            first_step.insert(neighbor, step);
            frontier.push_back(neighbor);
        }
    }

    tracing::trace!(visited = first_step.len(), "No path found");
    None
}

/// Picks uniformly among the immediate neighbours of `position` accepted by
/// `is_safe`.
pub fn random_safe_direction<R, S>(
    position: Position,
    rows: usize,
    cols: usize,
    is_safe: S,
    rng: &mut R,
) -> Option<Direction>
where
    R: Rng,
    S: Fn(Position) -> bool,
{
    let safe: Vec<Direction> = Direction::ALL
        .into_iter()
        .filter(|direction| {
            position
                .step(*direction, rows, cols)
                .is_some_and(|neighbor| is_safe(neighbor))
        })
        .collect();
    safe.choose(rng).copied()
}

/// First direction in [`Direction::ALL`] order whose neighbour is accepted by
/// `is_open`.
pub fn first_open_direction<O>(
    position: Position,
    rows: usize,
    cols: usize,
    is_open: O,
) -> Option<Direction>
where
    O: Fn(Position) -> bool,
{
    Direction::ALL.into_iter().find(|direction| {
        position
            .step(*direction, rows, cols)
            .is_some_and(|neighbor| is_open(neighbor))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn each_resolved_step_closes_distance_by_one() {
        let target = Position::new(6, 1);
        let mut current = Position::new(2, 5);
        let n = current.manhattan(target);

        for _ in 0..n {
            let direction = direction_to_nearest(current, 8, 8, |_| true, |p| p == target).unwrap();
            let next = current.step(direction, 8, 8).unwrap();
            assert_eq!(next.manhattan(target), current.manhattan(target) - 1);
            current = next;
        }
        assert_eq!(current, target);
    }

    #[test]
    fn ties_break_in_scan_order() {
        // Target diagonal: up and left are equally short, up is scanned first.
        let direction = direction_to_nearest(
            Position::new(2, 2),
            5,
            5,
            |_| true,
            |p| p == Position::new(1, 1),
        );
        assert_eq!(direction, Some(Direction::Up));
    }

    #[test]
    fn walls_are_routed_around() {
        // . # .
        // . # .
        // . . .
        let walls: HashSet<Position> = [Position::new(0, 1), Position::new(1, 1)].into();
        let direction = direction_to_nearest(
            Position::new(0, 0),
            3,
            3,
            |p| !walls.contains(&p),
            |p| p == Position::new(0, 2),
        );
        assert_eq!(direction, Some(Direction::Down));
    }

    #[test]
    fn unreachable_target_yields_none() {
        let direction = direction_to_nearest(
            Position::new(0, 0),
            1,
            3,
            |p| p.col != 1,
            |p| p == Position::new(0, 2),
        );
        assert_eq!(direction, None);
    }

    #[test]
    fn safe_direction_only_picks_safe_neighbours() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let direction = random_safe_direction(
                Position::new(1, 1),
                3,
                3,
                |p| p == Position::new(1, 2) || p == Position::new(2, 1),
                &mut rng,
            )
            .unwrap();
            assert!(matches!(direction, Direction::Right | Direction::Down));
        }
        assert_eq!(
            random_safe_direction(Position::new(0, 0), 1, 1, |_| true, &mut rng),
            None
        );
    }

    #[test]
    fn first_open_direction_scans_up_down_left_right() {
        let open = |p: Position| p != Position::new(0, 1);
        assert_eq!(
            first_open_direction(Position::new(1, 1), 3, 3, open),
            Some(Direction::Down)
        );
    }
}
