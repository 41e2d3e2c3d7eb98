use crate::advisory::AdvisoryTargets;
use crate::constants::{AMBUSH_LOOKAHEAD, FEIGN_RETREAT_DISTANCE, FLANK_PIVOT_LOOKAHEAD};
use crate::types::{Direction, GhostMode, GhostRole, Vec2};

/// Actor positions the chase heuristics read.
#[derive(Clone, Copy, Debug)]
pub struct TargetingView<'a> {
    pub player: Vec2,
    pub player_dir: Direction,
    /// `(ghost id, position)` for every ghost on the board.
    pub ghosts: &'a [(u8, Vec2)],
}

impl TargetingView<'_> {
    fn ghost_position(&self, id: u8) -> Option<Vec2> {
        self.ghosts
            .iter()
            .find(|(ghost_id, _)| *ghost_id == id)
            .map(|(_, pos)| *pos)
    }
}

/// Chase destination for one ghost. Offsets are never clamped, so the result
/// may lie off the board or inside a wall.
pub fn target_for(ghost_id: u8, scatter_target: Vec2, view: &TargetingView<'_>) -> Vec2 {
    match GhostRole::from_id(ghost_id) {
        Some(GhostRole::Chaser) => view.player,
        Some(GhostRole::Ambusher) => view.player.ahead(view.player_dir, AMBUSH_LOOKAHEAD),
        Some(GhostRole::Flanker) => {
            let pivot = view.player.ahead(view.player_dir, FLANK_PIVOT_LOOKAHEAD);
            match view.ghost_position(1) {
                Some(chaser) => Vec2 {
                    x: pivot.x + (pivot.x - chaser.x),
                    y: pivot.y + (pivot.y - chaser.y),
                },
                None => pivot,
            }
        }
        Some(GhostRole::Feigner) => {
            let Some(own) = view.ghost_position(ghost_id) else {
                return view.player;
            };
            if own.distance(view.player) > FEIGN_RETREAT_DISTANCE {
                view.player
            } else {
                scatter_target
            }
        }
        None => view.player,
    }
}

/// Scatter bypasses the heuristics; in chase a held advisory target wins.
pub fn resolve_target(
    mode: GhostMode,
    ghost_id: u8,
    scatter_target: Vec2,
    view: &TargetingView<'_>,
    advisory: Option<&AdvisoryTargets>,
) -> Vec2 {
    match mode {
        GhostMode::Scatter => scatter_target,
        GhostMode::Chase => advisory
            .and_then(|targets| targets.get(ghost_id))
            .unwrap_or_else(|| target_for(ghost_id, scatter_target, view)),
    }
}
