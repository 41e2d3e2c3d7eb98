use crate::types::{CellKind, Direction, GhostState, Vec2};

#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<CellKind>,
}

impl Grid {
    pub(crate) fn from_cells(width: i32, height: i32, cells: Vec<CellKind>) -> Self {
        debug_assert_eq!(cells.len(), (width.max(0) * height.max(0)) as usize);
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn wrap(&self, pos: Vec2) -> Vec2 {
        Vec2 {
            x: pos.x.rem_euclid(self.width.max(1)),
            y: pos.y.rem_euclid(self.height.max(1)),
        }
    }

    pub fn step(&self, pos: Vec2, dir: Direction) -> Vec2 {
        self.wrap(pos.ahead(dir, 1))
    }

    pub fn index_of(&self, pos: Vec2) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.width || pos.y >= self.height {
            return None;
        }
        Some((pos.y * self.width + pos.x) as usize)
    }

    pub fn position_of(&self, index: usize) -> Vec2 {
        let index = index as i32;
        Vec2 {
            x: index % self.width,
            y: index / self.width,
        }
    }

    /// Out-of-range lookups read as `Wall`.
    pub fn classify(&self, pos: Vec2) -> CellKind {
        self.index_of(pos)
            .and_then(|idx| self.cells.get(idx).copied())
            .unwrap_or(CellKind::Wall)
    }

    pub fn is_walkable_for_player(&self, pos: Vec2) -> bool {
        !matches!(
            self.classify(pos),
            CellKind::Wall | CellKind::GhostHome | CellKind::GhostHomeDoor
        )
    }

    /// Home cells may be entered from outside only by eaten ghosts returning
    /// to spawn; ghosts already in the home move freely within and out of it.
    pub fn is_walkable_for_ghost(&self, from: Vec2, to: Vec2, state: GhostState) -> bool {
        let target = self.classify(to);
        if target == CellKind::Wall {
            return false;
        }
        if target.is_home() && !self.classify(from).is_home() {
            return state == GhostState::Eaten;
        }
        true
    }

    pub fn consume(&mut self, pos: Vec2) -> Option<CellKind> {
        let idx = self.index_of(pos)?;
        let cell = self.cells.get_mut(idx)?;
        if !cell.is_pellet() {
            return None;
        }
        let eaten = *cell;
        *cell = CellKind::Path;
        Some(eaten)
    }

    pub fn count_pellets(&self) -> u32 {
        self.cells.iter().filter(|cell| cell.is_pellet()).count() as u32
    }

    pub fn tiles(&self) -> Vec<String> {
        self.cells
            .chunks(self.width.max(1) as usize)
            .map(|row| row.iter().map(|cell| cell.glyph()).collect())
            .collect()
    }
}
