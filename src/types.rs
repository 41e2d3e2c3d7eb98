use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    None,
}

impl Direction {
    /// Neighbour expansion order shared by the pathfinder and every fallback scan.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::None => Self::None,
        }
    }

    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
            Self::None => (0, 0),
        }
    }
}

/// Board coordinate. Targets computed by the chase heuristics may lie off the
/// board; positions of actors are always wrapped into range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

impl Vec2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Unwrapped offset by `tiles` cells along `dir`.
    pub fn ahead(self, dir: Direction, tiles: i32) -> Self {
        let (dx, dy) = dir.delta();
        Self {
            x: self.x + dx * tiles,
            y: self.y + dy * tiles,
        }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Wall,
    Path,
    Pellet,
    PowerPellet,
    GhostHome,
    GhostHomeDoor,
}

impl CellKind {
    pub fn is_home(self) -> bool {
        matches!(self, Self::GhostHome | Self::GhostHomeDoor)
    }

    pub fn is_pellet(self) -> bool {
        matches!(self, Self::Pellet | Self::PowerPellet)
    }

    pub fn glyph(self) -> char {
        match self {
            Self::Wall => '#',
            Self::Path => ' ',
            Self::Pellet => '.',
            Self::PowerPellet => 'o',
            Self::GhostHome => 'H',
            Self::GhostHomeDoor => '-',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostState {
    Normal,
    Frightened,
    Eaten,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostMode {
    Scatter,
    Chase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Ready,
    Playing,
    Paused,
    GameOver,
    LevelWon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryStatus {
    Offline,
    Idle,
    Thinking,
    Active,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostRole {
    Chaser,
    Ambusher,
    Flanker,
    Feigner,
}

impl GhostRole {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Chaser),
            2 => Some(Self::Ambusher),
            3 => Some(Self::Flanker),
            4 => Some(Self::Feigner),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BoardView {
    pub width: i32,
    pub height: i32,
    pub tiles: Vec<String>,
    #[serde(rename = "totalPellets")]
    pub total_pellets: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameConfig {
    #[serde(rename = "tickMs")]
    pub tick_ms: u64,
    #[serde(rename = "startingLives")]
    pub starting_lives: u32,
    #[serde(rename = "frightenedMs")]
    pub frightened_ms: u64,
    #[serde(rename = "lifeLostPauseMs")]
    pub life_lost_pause_ms: u64,
    #[serde(rename = "advisoryEnabled")]
    pub advisory_enabled: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub x: i32,
    pub y: i32,
    pub dir: Direction,
    #[serde(rename = "desiredDir")]
    pub desired_dir: Direction,
    #[serde(rename = "mouthOpen")]
    pub mouth_open: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct GhostView {
    pub id: u8,
    pub role: GhostRole,
    pub x: i32,
    pub y: i32,
    pub dir: Direction,
    pub state: GhostState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    PelletEaten {
        x: i32,
        y: i32,
    },
    PowerPelletEaten {
        x: i32,
        y: i32,
    },
    GhostEaten {
        #[serde(rename = "ghostId")]
        ghost_id: u8,
    },
    GhostRevived {
        #[serde(rename = "ghostId")]
        ghost_id: u8,
    },
    LifeLost {
        #[serde(rename = "ghostId")]
        ghost_id: u8,
        #[serde(rename = "livesLeft")]
        lives_left: u32,
    },
    ModeChanged {
        mode: GhostMode,
    },
    FrightenedEnded,
    LevelWon {
        level: u32,
    },
    GameOver {
        score: u32,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub state: GameState,
    pub level: u32,
    pub mode: GhostMode,
    #[serde(rename = "frightenedRemaining")]
    pub frightened_remaining: u32,
    pub score: u32,
    pub lives: u32,
    #[serde(rename = "pelletsEaten")]
    pub pellets_eaten: u32,
    #[serde(rename = "totalPellets")]
    pub total_pellets: u32,
    pub player: PlayerView,
    pub ghosts: Vec<GhostView>,
    /// Cells consumed since the previous drained snapshot.
    pub cleared: Vec<Vec2>,
    #[serde(rename = "advisoryStatus")]
    pub advisory_status: AdvisoryStatus,
    #[serde(rename = "advisoryActive")]
    pub advisory_active: bool,
    pub events: Vec<RuntimeEvent>,
}
