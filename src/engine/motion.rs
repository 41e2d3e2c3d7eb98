use std::iter;

use super::*;
use crate::targeting::{resolve_target, TargetingView};
use crate::types::CellKind;

fn open_for_frightened(grid: &Grid, pos: Vec2, dir: Direction) -> bool {
    let cell = grid.classify(grid.step(pos, dir));
    cell != CellKind::Wall && !cell.is_home()
}

impl GameEngine {
    pub(super) fn move_player(&mut self) {
        let player = &mut self.player;
        player.mouth_open = !player.mouth_open;

        let desired = player.desired_dir;
        if desired != Direction::None
            && self
                .grid
                .is_walkable_for_player(self.grid.step(player.pos, desired))
        {
            player.dir = desired;
        }
        if player.dir == Direction::None {
            return;
        }
        let next = self.grid.step(player.pos, player.dir);
        if self.grid.is_walkable_for_player(next) {
            player.pos = next;
        }
    }

    pub(super) fn move_ghosts(&mut self, now: Instant) {
        let positions = self.ghost_positions();
        for idx in 0..self.ghosts.len() {
            let next = match self.ghosts[idx].state {
                GhostState::Eaten => self.eaten_direction(idx),
                GhostState::Frightened => self.frightened_direction(idx),
                GhostState::Normal => self.normal_direction(idx, &positions, now),
            };
            if let Some(dir) = next {
                let ghost = &mut self.ghosts[idx];
                ghost.pos = self.grid.step(ghost.pos, dir);
                ghost.dir = dir;
            }
        }
    }

    pub(super) fn ghost_positions(&self) -> Vec<(u8, Vec2)> {
        self.ghosts.iter().map(|ghost| (ghost.id, ghost.pos)).collect()
    }

    pub(super) fn ghost_target(&self, idx: usize, positions: &[(u8, Vec2)], now: Instant) -> Vec2 {
        let ghost = &self.ghosts[idx];
        let view = TargetingView {
            player: self.player.pos,
            player_dir: self.player.dir,
            ghosts: positions,
        };
        resolve_target(
            self.scheduler.mode(),
            ghost.id,
            ghost.scatter_target,
            &view,
            self.advisory.current(now),
        )
    }

    fn ghost_can_step(&self, pos: Vec2, dir: Direction, state: GhostState) -> bool {
        dir != Direction::None
            && self
                .grid
                .is_walkable_for_ghost(pos, self.grid.step(pos, dir), state)
    }

    pub(super) fn eaten_direction(&mut self, idx: usize) -> Option<Direction> {
        let ghost = &mut self.ghosts[idx];
        if ghost.pos == ghost.spawn {
            ghost.state = GhostState::Normal;
            ghost.dir = Direction::Up;
            self.events.push(RuntimeEvent::GhostRevived { ghost_id: ghost.id });
            return None;
        }
        let (pos, dir, spawn) = (ghost.pos, ghost.dir, ghost.spawn);

        if let Some(step) =
            self.pathfinder
                .find_first_step(&self.grid, pos, spawn, GhostState::Eaten)
        {
            return Some(step);
        }
        [dir.opposite(), dir]
            .into_iter()
            .chain(Direction::ALL)
            .find(|candidate| self.ghost_can_step(pos, *candidate, GhostState::Eaten))
    }

    pub(super) fn frightened_direction(&mut self, idx: usize) -> Option<Direction> {
        let (pos, reverse) = (self.ghosts[idx].pos, self.ghosts[idx].dir.opposite());

        let forward: Vec<Direction> = Direction::ALL
            .into_iter()
            .filter(|dir| *dir != reverse && open_for_frightened(&self.grid, pos, *dir))
            .collect();
        if !forward.is_empty() {
            return self.rng.choose(&forward);
        }
        if reverse != Direction::None && open_for_frightened(&self.grid, pos, reverse) {
            return Some(reverse);
        }

        // still inside the home: drift toward the door
        let inside: Vec<Direction> = Direction::ALL
            .into_iter()
            .filter(|dir| self.ghost_can_step(pos, *dir, GhostState::Frightened))
            .collect();
        self.rng.choose(&inside)
    }

    fn normal_direction(
        &mut self,
        idx: usize,
        positions: &[(u8, Vec2)],
        now: Instant,
    ) -> Option<Direction> {
        let target = self.ghost_target(idx, positions, now);
        let (pos, dir) = (self.ghosts[idx].pos, self.ghosts[idx].dir);
        let reverse = dir.opposite();

        if let Some(step) = self.pathfinder.find_first_step_avoiding(
            &self.grid,
            pos,
            target,
            GhostState::Normal,
            reverse,
        ) {
            return Some(step);
        }

        iter::once(dir)
            .chain(
                Direction::ALL
                    .into_iter()
                    .filter(|candidate| *candidate != dir && *candidate != reverse),
            )
            .chain(iter::once(reverse))
            .find(|candidate| self.ghost_can_step(pos, *candidate, GhostState::Normal))
    }
}
