use crate::types::GhostMode;

pub const TICK_MS: u64 = 150;
pub const MIN_TICK_MS: u64 = 30;
pub const MAX_TICK_MS: u64 = 1_000;

pub const STARTING_LIVES: u32 = 3;
pub const PELLET_SCORE: u32 = 10;
pub const POWER_PELLET_SCORE: u32 = 50;
pub const GHOST_EATEN_SCORE: u32 = 200;

pub const FRIGHTENED_DURATION_MS: u64 = 8_000;
pub const LIFE_LOST_PAUSE_MS: u64 = 2_000;

pub const AMBUSH_LOOKAHEAD: i32 = 4;
pub const FLANK_PIVOT_LOOKAHEAD: i32 = 2;
pub const FEIGN_RETREAT_DISTANCE: f32 = 8.0;

pub const ADVISORY_INTERVAL_MS: u64 = 1_000;
pub const ADVISORY_VALIDITY_MS: u64 = 5_000;
pub const ADVISORY_TIMEOUT_MS: u64 = 1_500;

/// Scatter/chase timeline; the last phase never ends.
pub const MODE_SCHEDULE_MS: [(GhostMode, Option<u64>); 8] = [
    (GhostMode::Scatter, Some(7_000)),
    (GhostMode::Chase, Some(20_000)),
    (GhostMode::Scatter, Some(7_000)),
    (GhostMode::Chase, Some(20_000)),
    (GhostMode::Scatter, Some(5_000)),
    (GhostMode::Chase, Some(20_000)),
    (GhostMode::Scatter, Some(5_000)),
    (GhostMode::Chase, None),
];

pub fn ms_to_ticks(duration_ms: u64, tick_ms: u64) -> u32 {
    if tick_ms == 0 {
        return 1;
    }
    (duration_ms / tick_ms).clamp(1, u32::MAX as u64) as u32
}

pub fn normalize_tick_ms(value: Option<i64>) -> u64 {
    value
        .map(|ms| ms.clamp(MIN_TICK_MS as i64, MAX_TICK_MS as i64) as u64)
        .unwrap_or(TICK_MS)
}
