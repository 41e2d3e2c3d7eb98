use crate::constants::ms_to_ticks;
use crate::level::LevelError;
use crate::types::GhostMode;

/// Authoring form of a phase: mode plus duration in milliseconds.
pub type ModePhaseMs = (GhostMode, Option<u64>);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModePhase {
    pub mode: GhostMode,
    /// `None` never expires.
    pub ticks: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleEvent {
    ModeChanged(GhostMode),
    FrightenedEnded,
}

/// Scatter/chase timeline with the frightened countdown layered on top.
/// While frightened is running the scatter/chase countdown is held.
#[derive(Clone, Debug)]
pub struct ModeScheduler {
    phases: Vec<ModePhase>,
    index: usize,
    remaining: Option<u32>,
    frightened_remaining: u32,
}

impl ModeScheduler {
    pub fn new(phases: Vec<ModePhase>) -> Result<Self, LevelError> {
        let Some(first) = phases.first().copied() else {
            return Err(LevelError::EmptySchedule);
        };
        Ok(Self {
            phases,
            index: 0,
            remaining: first.ticks,
            frightened_remaining: 0,
        })
    }

    pub fn from_ms(phases: &[ModePhaseMs], tick_ms: u64) -> Result<Self, LevelError> {
        if tick_ms == 0 {
            return Err(LevelError::ZeroTickPeriod);
        }
        Self::new(
            phases
                .iter()
                .map(|(mode, duration_ms)| ModePhase {
                    mode: *mode,
                    ticks: duration_ms.map(|ms| ms_to_ticks(ms, tick_ms)),
                })
                .collect(),
        )
    }

    pub fn mode(&self) -> GhostMode {
        self.phases[self.index].mode
    }

    pub fn phase_index(&self) -> usize {
        self.index
    }

    pub fn remaining_in_phase(&self) -> Option<u32> {
        self.remaining
    }

    pub fn is_frightened(&self) -> bool {
        self.frightened_remaining > 0
    }

    pub fn frightened_remaining(&self) -> u32 {
        self.frightened_remaining
    }

    /// Starts or restarts the frightened countdown.
    pub fn start_frightened(&mut self, ticks: u32) {
        self.frightened_remaining = ticks.max(1);
    }

    pub fn clear_frightened(&mut self) {
        self.frightened_remaining = 0;
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.remaining = self.phases[0].ticks;
        self.frightened_remaining = 0;
    }

    /// One tick of scheduler time.
    pub fn advance(&mut self) -> Option<ScheduleEvent> {
        if self.frightened_remaining > 0 {
            self.frightened_remaining -= 1;
            return (self.frightened_remaining == 0).then_some(ScheduleEvent::FrightenedEnded);
        }

        let remaining = self.remaining.as_mut()?;
        *remaining = remaining.saturating_sub(1);
        if *remaining > 0 {
            return None;
        }
        self.index = (self.index + 1) % self.phases.len();
        self.remaining = self.phases[self.index].ticks;
        Some(ScheduleEvent::ModeChanged(self.mode()))
    }
}
