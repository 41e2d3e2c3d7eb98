use super::*;
use crate::constants::{GHOST_EATEN_SCORE, PELLET_SCORE, POWER_PELLET_SCORE};
use crate::types::CellKind;

impl GameEngine {
    pub(super) fn resolve_collisions(&mut self, now: Instant) {
        let pos = self.player.pos;
        match self.grid.consume(pos) {
            Some(CellKind::Pellet) => {
                self.score += PELLET_SCORE;
                self.record_consumed(pos);
                self.events.push(RuntimeEvent::PelletEaten { x: pos.x, y: pos.y });
            }
            Some(CellKind::PowerPellet) => {
                self.score += POWER_PELLET_SCORE;
                self.record_consumed(pos);
                self.events
                    .push(RuntimeEvent::PowerPelletEaten { x: pos.x, y: pos.y });
                self.start_frightened();
            }
            _ => {}
        }

        if self.pellets_eaten >= self.level.total_pellets {
            self.state = GameState::LevelWon;
            self.events.push(RuntimeEvent::LevelWon {
                level: self.level_number,
            });
            info!(level = self.level_number, score = self.score, "level won");
            return;
        }

        for idx in 0..self.ghosts.len() {
            if self.ghosts[idx].pos != pos {
                continue;
            }
            match self.ghosts[idx].state {
                GhostState::Frightened => {
                    self.ghosts[idx].state = GhostState::Eaten;
                    self.score += GHOST_EATEN_SCORE;
                    self.events.push(RuntimeEvent::GhostEaten {
                        ghost_id: self.ghosts[idx].id,
                    });
                }
                GhostState::Normal => {
                    let ghost_id = self.ghosts[idx].id;
                    self.lose_life(ghost_id, now);
                    return;
                }
                GhostState::Eaten => {}
            }
        }
    }

    pub(super) fn start_frightened(&mut self) {
        // the scheduler step at the end of the arming tick takes one off
        self.scheduler
            .start_frightened(self.frightened_ticks.saturating_add(1));
        for ghost in &mut self.ghosts {
            if ghost.state == GhostState::Eaten {
                continue;
            }
            ghost.state = GhostState::Frightened;
            ghost.dir = ghost.dir.opposite();
        }
        self.advisory.invalidate();
    }

    fn record_consumed(&mut self, pos: Vec2) {
        self.pellets_eaten = (self.pellets_eaten + 1).min(self.level.total_pellets);
        self.cleared.push(pos);
    }

    fn lose_life(&mut self, ghost_id: u8, now: Instant) {
        self.lives = self.lives.saturating_sub(1);
        self.events.push(RuntimeEvent::LifeLost {
            ghost_id,
            lives_left: self.lives,
        });
        if self.lives == 0 {
            self.state = GameState::GameOver;
            self.resume_at = None;
            self.events.push(RuntimeEvent::GameOver { score: self.score });
            info!(score = self.score, level = self.level_number, "game over");
        } else {
            self.state = GameState::Paused;
            self.resume_at = Some(now + self.life_lost_pause);
            info!(lives = self.lives, ghost_id, "life lost");
        }
    }
}
