use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::advisory::{
    AdvisoryGhost, AdvisoryOptions, AdvisoryReply, AdvisoryRequest, AdvisorySlot,
};
use crate::constants::{
    ms_to_ticks, FRIGHTENED_DURATION_MS, LIFE_LOST_PAUSE_MS, MODE_SCHEDULE_MS, STARTING_LIVES,
    TICK_MS,
};
use crate::grid::Grid;
use crate::level::{Level, LevelError};
use crate::pathfinder::Pathfinder;
use crate::rng::Rng;
use crate::schedule::{ModePhaseMs, ModeScheduler, ScheduleEvent};
use crate::types::{
    BoardView, Direction, GameConfig, GameState, GhostMode, GhostRole, GhostState, GhostView,
    PlayerView, RuntimeEvent, Snapshot, Vec2,
};

mod collision;
mod motion;

#[derive(Clone, Debug)]
struct PlayerInternal {
    pos: Vec2,
    dir: Direction,
    desired_dir: Direction,
    mouth_open: bool,
}

#[derive(Clone, Debug)]
struct GhostInternal {
    id: u8,
    pos: Vec2,
    dir: Direction,
    state: GhostState,
    spawn: Vec2,
    scatter_target: Vec2,
}

#[derive(Clone, Debug)]
pub struct GameEngineOptions {
    pub seed: Option<u32>,
    pub tick_ms: u64,
    pub starting_lives: u32,
    pub frightened_ms: u64,
    pub life_lost_pause: Duration,
    pub schedule: Vec<ModePhaseMs>,
    pub advisory: Option<AdvisoryOptions>,
}

impl Default for GameEngineOptions {
    fn default() -> Self {
        Self {
            seed: None,
            tick_ms: TICK_MS,
            starting_lives: STARTING_LIVES,
            frightened_ms: FRIGHTENED_DURATION_MS,
            life_lost_pause: Duration::from_millis(LIFE_LOST_PAUSE_MS),
            schedule: MODE_SCHEDULE_MS.to_vec(),
            advisory: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GameEngine {
    pub config: GameConfig,

    level: Level,
    grid: Grid,
    rng: Rng,
    pathfinder: Pathfinder,
    scheduler: ModeScheduler,
    advisory: AdvisorySlot,
    player: PlayerInternal,
    ghosts: Vec<GhostInternal>,
    events: Vec<RuntimeEvent>,
    cleared: Vec<Vec2>,

    state: GameState,
    level_number: u32,
    score: u32,
    lives: u32,
    pellets_eaten: u32,
    tick_counter: u64,
    frightened_ticks: u32,
    life_lost_pause: Duration,
    resume_at: Option<Instant>,
    last_now: Instant,
}

impl GameEngine {
    pub fn new(level: Level, options: GameEngineOptions) -> Result<Self, LevelError> {
        if options.tick_ms == 0 {
            return Err(LevelError::ZeroTickPeriod);
        }
        if level.total_pellets == 0 {
            return Err(LevelError::NoPellets);
        }
        let scheduler = ModeScheduler::from_ms(&options.schedule, options.tick_ms)?;
        let rng = options.seed.map(Rng::new).unwrap_or_else(Rng::from_entropy);

        let config = GameConfig {
            tick_ms: options.tick_ms,
            starting_lives: options.starting_lives,
            frightened_ms: options.frightened_ms,
            life_lost_pause_ms: options.life_lost_pause.as_millis() as u64,
            advisory_enabled: options.advisory.is_some(),
        };

        info!(
            width = level.grid.width(),
            height = level.grid.height(),
            pellets = level.total_pellets,
            "level loaded"
        );

        let player = PlayerInternal {
            pos: level.player_spawn,
            dir: Direction::None,
            desired_dir: Direction::None,
            mouth_open: false,
        };
        let ghosts = level
            .ghosts
            .iter()
            .map(|template| GhostInternal {
                id: template.id,
                pos: template.spawn,
                dir: Direction::Up,
                state: GhostState::Normal,
                spawn: template.spawn,
                scatter_target: template.scatter_target,
            })
            .collect();

        Ok(Self {
            config,
            grid: level.grid.clone(),
            level,
            rng,
            pathfinder: Pathfinder::new(),
            scheduler,
            advisory: AdvisorySlot::new(options.advisory),
            player,
            ghosts,
            events: Vec::new(),
            cleared: Vec::new(),
            state: GameState::Ready,
            level_number: 1,
            score: 0,
            lives: options.starting_lives,
            pellets_eaten: 0,
            tick_counter: 0,
            frightened_ticks: ms_to_ticks(options.frightened_ms, options.tick_ms),
            life_lost_pause: options.life_lost_pause,
            resume_at: None,
            last_now: Instant::now(),
        })
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn lives(&self) -> u32 {
        self.lives
    }

    pub fn level_number(&self) -> u32 {
        self.level_number
    }

    pub fn pellets_eaten(&self) -> u32 {
        self.pellets_eaten
    }

    pub fn total_pellets(&self) -> u32 {
        self.level.total_pellets
    }

    pub fn mode(&self) -> GhostMode {
        self.scheduler.mode()
    }

    pub fn is_frightened(&self) -> bool {
        self.scheduler.is_frightened()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn player_position(&self) -> Vec2 {
        self.player.pos
    }

    pub fn board_view(&self) -> BoardView {
        BoardView {
            width: self.grid.width(),
            height: self.grid.height(),
            tiles: self.grid.tiles(),
            total_pellets: self.level.total_pellets,
        }
    }

    pub fn set_desired_direction(&mut self, dir: Direction) {
        self.player.desired_dir = dir;
    }

    pub fn request_start(&mut self, now: Instant) -> bool {
        self.last_now = now;
        match self.state {
            GameState::Ready => {}
            GameState::GameOver => self.start_new_game(),
            GameState::LevelWon => self.start_next_level(),
            GameState::Playing | GameState::Paused => return false,
        }
        self.state = GameState::Playing;
        info!(level = self.level_number, lives = self.lives, "game started");
        true
    }

    /// Clock entry point: finishes a life-lost pause once its deadline has
    /// passed, then runs one tick if the game is playing.
    pub fn advance(&mut self, now: Instant) {
        self.last_now = now;
        if self.state == GameState::Paused
            && self.resume_at.map(|at| now >= at).unwrap_or(true)
        {
            self.resume_after_life_lost();
        }
        if self.state == GameState::Playing {
            self.tick(now);
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if self.state != GameState::Playing {
            return;
        }
        self.last_now = now;
        self.tick_counter += 1;

        self.move_player();
        self.move_ghosts(now);
        self.resolve_collisions(now);

        if self.state == GameState::Playing {
            self.advance_scheduler();
        }
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> Snapshot {
        let snapshot = Snapshot {
            tick: self.tick_counter,
            state: self.state,
            level: self.level_number,
            mode: self.scheduler.mode(),
            frightened_remaining: self.scheduler.frightened_remaining(),
            score: self.score,
            lives: self.lives,
            pellets_eaten: self.pellets_eaten,
            total_pellets: self.level.total_pellets,
            player: PlayerView {
                x: self.player.pos.x,
                y: self.player.pos.y,
                dir: self.player.dir,
                desired_dir: self.player.desired_dir,
                mouth_open: self.player.mouth_open,
            },
            ghosts: self
                .ghosts
                .iter()
                .map(|ghost| GhostView {
                    id: ghost.id,
                    role: GhostRole::from_id(ghost.id).unwrap_or(GhostRole::Chaser),
                    x: ghost.pos.x,
                    y: ghost.pos.y,
                    dir: ghost.dir,
                    state: ghost.state,
                })
                .collect(),
            cleared: if include_events {
                self.cleared.clone()
            } else {
                Vec::new()
            },
            advisory_status: self.advisory.status(self.last_now),
            advisory_active: self.advisory.is_active(self.last_now),
            events: if include_events {
                self.events.clone()
            } else {
                Vec::new()
            },
        };
        if include_events {
            self.events.clear();
            self.cleared.clear();
        }
        snapshot
    }

    pub fn poll_advisory_request(&mut self, now: Instant) -> Option<AdvisoryRequest> {
        self.last_now = now;
        if self.state != GameState::Playing
            || self.scheduler.mode() != GhostMode::Chase
            || self.scheduler.is_frightened()
        {
            return None;
        }
        let player = self.player.pos;
        let player_dir = self.player.dir;
        let ghosts: Vec<AdvisoryGhost> = self
            .ghosts
            .iter()
            .map(|ghost| AdvisoryGhost {
                id: ghost.id,
                x: ghost.pos.x,
                y: ghost.pos.y,
            })
            .collect();
        self.advisory
            .poll_request(now, |generation| AdvisoryRequest {
                generation,
                player,
                player_dir,
                ghosts,
            })
    }

    pub fn offer_advisory(&mut self, reply: AdvisoryReply, now: Instant) -> bool {
        self.last_now = now;
        self.advisory.offer(reply, now)
    }

    fn advance_scheduler(&mut self) {
        match self.scheduler.advance() {
            Some(ScheduleEvent::ModeChanged(mode)) => {
                debug!(?mode, tick = self.tick_counter, "ghost mode changed");
                self.events.push(RuntimeEvent::ModeChanged { mode });
            }
            Some(ScheduleEvent::FrightenedEnded) => {
                for ghost in &mut self.ghosts {
                    if ghost.state == GhostState::Frightened {
                        ghost.state = GhostState::Normal;
                    }
                }
                self.advisory.invalidate();
                self.events.push(RuntimeEvent::FrightenedEnded);
            }
            None => {}
        }
    }

    fn reset_actors(&mut self) {
        self.player.pos = self.level.player_spawn;
        self.player.dir = Direction::None;
        self.player.desired_dir = Direction::None;
        for ghost in &mut self.ghosts {
            ghost.pos = ghost.spawn;
            ghost.dir = Direction::Up;
            ghost.state = GhostState::Normal;
        }
    }

    fn reset_board(&mut self) {
        self.grid = self.level.grid.clone();
        self.pellets_eaten = 0;
        self.cleared.clear();
        self.scheduler.reset();
        self.advisory.reset();
        self.resume_at = None;
        self.reset_actors();
    }

    fn start_new_game(&mut self) {
        self.score = 0;
        self.lives = self.config.starting_lives;
        self.level_number = 1;
        self.reset_board();
    }

    fn start_next_level(&mut self) {
        self.level_number += 1;
        self.reset_board();
    }

    fn resume_after_life_lost(&mut self) {
        self.reset_actors();
        self.scheduler.clear_frightened();
        self.advisory.invalidate();
        self.resume_at = None;
        self.state = GameState::Playing;
        info!(lives = self.lives, "play resumed");
    }
}
