use std::collections::VecDeque;

use crate::grid::Grid;
use crate::types::{Direction, GhostState, Vec2};

#[derive(Clone, Debug, Default)]
pub struct Pathfinder {
    visited: Vec<u32>,
    first_step: Vec<Direction>,
    queue: VecDeque<usize>,
    stamp: u32,
}

impl Pathfinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// First direction of a shortest path from `start` to `goal`, expanding
    /// neighbours Up, Down, Left, Right at every node. `None` when the goal is
    /// unreachable, off the board, or equal to `start`.
    pub fn find_first_step(
        &mut self,
        grid: &Grid,
        start: Vec2,
        goal: Vec2,
        state: GhostState,
    ) -> Option<Direction> {
        self.find_first_step_avoiding(grid, start, goal, state, Direction::None)
    }

    pub fn find_first_step_avoiding(
        &mut self,
        grid: &Grid,
        start: Vec2,
        goal: Vec2,
        state: GhostState,
        forbidden: Direction,
    ) -> Option<Direction> {
        if start == goal {
            return None;
        }
        let start_idx = grid.index_of(start)?;
        self.prepare(grid.cell_count());

        self.visited[start_idx] = self.stamp;
        self.queue.push_back(start_idx);

        while let Some(idx) = self.queue.pop_front() {
            let pos = grid.position_of(idx);
            for dir in Direction::ALL {
                if idx == start_idx && dir == forbidden {
                    continue;
                }
                let next = grid.step(pos, dir);
                if !grid.is_walkable_for_ghost(pos, next, state) {
                    continue;
                }
                let Some(next_idx) = grid.index_of(next) else {
                    continue;
                };
                if self.visited[next_idx] == self.stamp {
                    continue;
                }
                self.visited[next_idx] = self.stamp;
                let first = if idx == start_idx {
                    dir
                } else {
                    self.first_step[idx]
                };
                if next == goal {
                    self.queue.clear();
                    return Some(first);
                }
                self.first_step[next_idx] = first;
                self.queue.push_back(next_idx);
            }
        }
        None
    }

    fn prepare(&mut self, cell_count: usize) {
        if self.visited.len() < cell_count {
            self.visited.resize(cell_count, 0);
            self.first_step.resize(cell_count, Direction::None);
        }
        self.queue.clear();
        self.stamp = self.stamp.wrapping_add(1);
        if self.stamp == 0 {
            self.visited.fill(0);
            self.stamp = 1;
        }
    }
}
