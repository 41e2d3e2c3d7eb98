use thiserror::Error;

use crate::grid::Grid;
use crate::types::{CellKind, Vec2};

pub const GHOST_IDS: [u8; 4] = [1, 2, 3, 4];

/// Default board. `P` marks the player spawn, digits mark ghost spawns inside
/// the home, `-` is the home door and `H` the rest of the home.
pub const CLASSIC_LAYOUT: [&str; 21] = [
    "###################",
    "#........#........#",
    "#o##.###.#.###.##o#",
    "#.................#",
    "#.##.#.#####.#.##.#",
    "#....#...#...#....#",
    "####.###.#.###.####",
    "####.#       #.####",
    "####.# ##-## #.####",
    ".....  #1H2#  .....",
    "####.# #3H4# #.####",
    "####.# ##### #.####",
    "####.#       #.####",
    "####.# ##### #.####",
    "#........#........#",
    "#o##.###.#.###.##o#",
    "#..#.....P.....#..#",
    "##.#.#.#####.#.#.##",
    "#....#...#...#....#",
    "#.................#",
    "###################",
];

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LevelError {
    #[error("board has no rows")]
    EmptyBoard,
    #[error("row {row} has width {found}, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("unknown board character {ch:?} at ({x},{y})")]
    UnknownCharacter { ch: char, x: usize, y: usize },
    #[error("board has no pellets")]
    NoPellets,
    #[error("board has no player spawn")]
    MissingPlayerSpawn,
    #[error("board has more than one player spawn")]
    DuplicatePlayerSpawn,
    #[error("board has no spawn for ghost {0}")]
    MissingGhost(u8),
    #[error("board has more than one spawn for ghost {0}")]
    DuplicateGhost(u8),
    #[error("board has no cell the player can walk on for a scatter target")]
    NoScatterTarget,
    #[error("mode schedule has no phases")]
    EmptySchedule,
    #[error("tick period must be positive")]
    ZeroTickPeriod,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GhostTemplate {
    pub id: u8,
    pub spawn: Vec2,
    pub scatter_target: Vec2,
}

/// Pristine level as authored; the engine clones its grid on every reset.
#[derive(Clone, Debug)]
pub struct Level {
    pub grid: Grid,
    pub player_spawn: Vec2,
    pub ghosts: Vec<GhostTemplate>,
    pub total_pellets: u32,
}

impl Level {
    pub fn classic() -> Result<Self, LevelError> {
        Self::parse(&CLASSIC_LAYOUT)
    }

    pub fn parse_text(text: &str) -> Result<Self, LevelError> {
        let rows: Vec<&str> = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .collect();
        Self::parse(&rows)
    }

    pub fn parse<S: AsRef<str>>(rows: &[S]) -> Result<Self, LevelError> {
        let Some(first) = rows.first() else {
            return Err(LevelError::EmptyBoard);
        };
        let width = first.as_ref().chars().count();
        if width == 0 {
            return Err(LevelError::EmptyBoard);
        }

        let mut cells = Vec::with_capacity(width * rows.len());
        let mut player_spawn = None;
        let mut spawns: [Option<Vec2>; 4] = [None; 4];

        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let found = row.chars().count();
            if found != width {
                return Err(LevelError::RaggedRow {
                    row: y,
                    expected: width,
                    found,
                });
            }
            for (x, ch) in row.chars().enumerate() {
                let pos = Vec2::new(x as i32, y as i32);
                let kind = match ch {
                    '#' => CellKind::Wall,
                    ' ' => CellKind::Path,
                    '.' => CellKind::Pellet,
                    'o' => CellKind::PowerPellet,
                    'H' => CellKind::GhostHome,
                    '-' => CellKind::GhostHomeDoor,
                    'P' => {
                        if player_spawn.replace(pos).is_some() {
                            return Err(LevelError::DuplicatePlayerSpawn);
                        }
                        CellKind::Path
                    }
                    '1'..='4' => {
                        let id = ch as u8 - b'0';
                        let slot = &mut spawns[(id - 1) as usize];
                        if slot.replace(pos).is_some() {
                            return Err(LevelError::DuplicateGhost(id));
                        }
                        CellKind::GhostHome
                    }
                    _ => return Err(LevelError::UnknownCharacter { ch, x, y }),
                };
                cells.push(kind);
            }
        }

        let grid = Grid::from_cells(width as i32, rows.len() as i32, cells);
        let player_spawn = player_spawn.ok_or(LevelError::MissingPlayerSpawn)?;
        let total_pellets = grid.count_pellets();
        if total_pellets == 0 {
            return Err(LevelError::NoPellets);
        }

        let corners = scatter_corners(&grid);
        let mut ghosts = Vec::with_capacity(GHOST_IDS.len());
        for id in GHOST_IDS {
            let idx = (id - 1) as usize;
            let spawn = spawns[idx].ok_or(LevelError::MissingGhost(id))?;
            let scatter_target =
                nearest_open_cell(&grid, corners[idx]).ok_or(LevelError::NoScatterTarget)?;
            ghosts.push(GhostTemplate {
                id,
                spawn,
                scatter_target,
            });
        }

        Ok(Self {
            grid,
            player_spawn,
            ghosts,
            total_pellets,
        })
    }
}

/// Chaser top-right, ambusher top-left, flanker bottom-right, feigner bottom-left.
fn scatter_corners(grid: &Grid) -> [Vec2; 4] {
    let right = grid.width() - 1;
    let bottom = grid.height() - 1;
    [
        Vec2::new(right, 0),
        Vec2::new(0, 0),
        Vec2::new(right, bottom),
        Vec2::new(0, bottom),
    ]
}

fn nearest_open_cell(grid: &Grid, corner: Vec2) -> Option<Vec2> {
    let mut best: Option<(i32, i32, i32, Vec2)> = None;
    for index in 0..grid.cell_count() {
        let cell = grid.position_of(index);
        if !grid.is_walkable_for_player(cell) {
            continue;
        }
        let dist = (cell.x - corner.x).abs() + (cell.y - corner.y).abs();
        let key = (dist, cell.y, cell.x, cell);
        if best
            .map(|v| (v.0, v.1, v.2) > (key.0, key.1, key.2))
            .unwrap_or(true)
        {
            best = Some(key);
        }
    }
    best.map(|(_, _, _, cell)| cell)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashSet, VecDeque};

    use super::*;
    use crate::types::Direction;

    #[test]
    fn classic_layout_loads_with_four_ghosts() {
        let level = Level::classic().expect("classic layout is valid");
        assert_eq!(level.grid.width(), 19);
        assert_eq!(level.grid.height(), 21);
        assert_eq!(level.player_spawn, Vec2::new(9, 16));
        let ids: Vec<u8> = level.ghosts.iter().map(|ghost| ghost.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(level.ghosts[0].spawn, Vec2::new(8, 9));
        assert_eq!(level.ghosts[0].scatter_target, Vec2::new(17, 1));
        assert_eq!(level.ghosts[1].scatter_target, Vec2::new(1, 1));
        assert_eq!(level.ghosts[2].scatter_target, Vec2::new(17, 19));
        assert_eq!(level.ghosts[3].scatter_target, Vec2::new(1, 19));
        assert_eq!(level.total_pellets, level.grid.count_pellets());
    }

    #[test]
    fn every_classic_pellet_is_reachable_from_player_spawn() {
        let level = Level::classic().expect("classic layout is valid");
        let grid = &level.grid;
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(level.player_spawn);
        queue.push_back(level.player_spawn);
        while let Some(pos) = queue.pop_front() {
            for dir in Direction::ALL {
                let next = grid.step(pos, dir);
                if grid.is_walkable_for_player(next) && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        for index in 0..grid.cell_count() {
            let pos = grid.position_of(index);
            if grid.classify(pos).is_pellet() {
                assert!(seen.contains(&pos), "unreachable pellet at {pos:?}");
            }
        }
    }

    #[test]
    fn rejects_empty_and_ragged_boards() {
        let empty: [&str; 0] = [];
        assert_eq!(Level::parse(&empty).unwrap_err(), LevelError::EmptyBoard);
        assert_eq!(
            Level::parse(&["#####", "#P.#"]).unwrap_err(),
            LevelError::RaggedRow {
                row: 1,
                expected: 5,
                found: 4
            }
        );
    }

    #[test]
    fn rejects_boards_without_pellets_or_spawns() {
        assert_eq!(
            Level::parse(&["#######", "#P1234#", "#######"]).unwrap_err(),
            LevelError::NoPellets
        );
        assert_eq!(
            Level::parse(&["#######", "#.1234#", "#######"]).unwrap_err(),
            LevelError::MissingPlayerSpawn
        );
        assert_eq!(
            Level::parse(&["#######", "#P.123#", "#######"]).unwrap_err(),
            LevelError::MissingGhost(4)
        );
        assert_eq!(
            Level::parse(&["########", "#PP1234#", "########"]).unwrap_err(),
            LevelError::DuplicatePlayerSpawn
        );
        assert_eq!(
            Level::parse(&["########", "#P.11234", "########"]).unwrap_err(),
            LevelError::DuplicateGhost(1)
        );
    }

    #[test]
    fn rejects_unknown_characters() {
        assert_eq!(
            Level::parse(&["#####", "#P.x#", "#####"]).unwrap_err(),
            LevelError::UnknownCharacter { ch: 'x', x: 3, y: 1 }
        );
    }

    #[test]
    fn parse_text_skips_blank_lines() {
        let text = "\n#########\r\n#P.1234.#\n#########\n\n";
        let level = Level::parse_text(text).expect("text layout parses");
        assert_eq!(level.grid.height(), 3);
        assert_eq!(level.total_pellets, 2);
    }
}
