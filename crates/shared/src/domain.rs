use serde::{Deserialize, Serialize};

use crate::{catalog::ModuleEntry, error::GridError};

pub const DEFAULT_GRID_WIDTH: usize = 10;
pub const DEFAULT_GRID_HEIGHT: usize = 6;

/// Row/column address of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

impl CellPos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// One grid position. `tech` and `module` are either both set or both empty;
/// an inactive cell is never supercharged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cell {
    pub active: bool,
    pub supercharged: bool,
    pub tech: Option<String>,
    pub module: Option<String>,
    pub label: String,
    pub image: Option<String>,
    pub bonus: f64,
    pub value: f64,
    #[serde(rename = "adjacency")]
    pub adjacency_kind: String,
    pub adjacency_bonus: f64,
    #[serde(rename = "sc_eligible")]
    pub supercharge_eligible: bool,
    #[serde(rename = "type")]
    pub module_type: String,
}

impl Default for Cell {
    fn default() -> Self {
        Self::empty(false, false)
    }
}

impl Cell {
    /// Empty cell with the given flags. Supercharge is dropped when inactive.
    pub fn empty(supercharged: bool, active: bool) -> Self {
        Self {
            active,
            supercharged: supercharged && active,
            tech: None,
            module: None,
            label: String::new(),
            image: None,
            bonus: 0.0,
            value: 0.0,
            adjacency_kind: String::new(),
            adjacency_bonus: 0.0,
            supercharge_eligible: false,
            module_type: String::new(),
        }
    }

    /// Builds a populated cell from a catalog entry. `active` defaults to true
    /// and `supercharged` to false unless the entry says otherwise. An entry
    /// that names only one of tech/module yields no placement at all.
    pub fn from_catalog_entry(entry: &ModuleEntry) -> Self {
        let active = entry.active.unwrap_or(true);
        let mut cell = Self::empty(entry.supercharged.unwrap_or(false), active);
        cell.merge_entry(entry);
        cell
    }

    /// Overlays every field the entry carries, keeping current values for the
    /// rest. Used by positional bulk writes.
    pub fn merge_entry(&mut self, entry: &ModuleEntry) {
        if let Some(active) = entry.active {
            self.active = active;
        }
        if let Some(supercharged) = entry.supercharged {
            self.supercharged = supercharged;
        }
        if let Some(label) = &entry.label {
            self.label = label.clone();
        }
        if entry.image.is_some() {
            self.image = entry.image.clone();
        }
        if let Some(bonus) = entry.bonus {
            self.bonus = bonus;
        }
        if let Some(value) = entry.value {
            self.value = value;
        }
        if let Some(adjacency) = &entry.adjacency {
            self.adjacency_kind = adjacency.clone();
        }
        if let Some(adjacency_bonus) = entry.adjacency_bonus {
            self.adjacency_bonus = adjacency_bonus;
        }
        if let Some(eligible) = entry.sc_eligible {
            self.supercharge_eligible = eligible;
        }
        if let Some(module_type) = &entry.module_type {
            self.module_type = module_type.clone();
        }

        let tech = entry.tech.clone().or_else(|| self.tech.clone());
        let module = entry.id.clone().or_else(|| self.module.clone());
        match (tech, module) {
            (Some(tech), Some(module)) => {
                self.tech = Some(tech);
                self.module = Some(module);
            }
            _ => self.reset_content(),
        }

        if !self.active {
            self.supercharged = false;
        }
    }

    /// Clears the placed module and everything derived from it while keeping
    /// `active` and `supercharged` as they are.
    pub fn reset_content(&mut self) {
        *self = Self::empty(self.supercharged, self.active);
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.supercharged = false;
        }
    }

    pub fn has_module(&self) -> bool {
        self.module.is_some()
    }

    pub fn is_consistent(&self) -> bool {
        (self.active || !self.supercharged) && (self.tech.is_none() == self.module.is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub cells: Vec<Vec<Cell>>,
    pub width: usize,
    pub height: usize,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_WIDTH, DEFAULT_GRID_HEIGHT)
    }
}

impl Grid {
    /// Blank grid of empty, inactive cells.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            cells: vec![vec![Cell::default(); width]; height],
            width,
            height,
        }
    }

    pub fn from_rows(cells: Vec<Vec<Cell>>) -> Self {
        let height = cells.len();
        let width = cells.first().map(Vec::len).unwrap_or(0);
        Self {
            cells,
            width,
            height,
        }
    }

    /// `cells.len() == height` and every row is `width` long.
    pub fn is_well_formed(&self) -> bool {
        self.cells.len() == self.height && self.cells.iter().all(|row| row.len() == self.width)
    }

    /// First cell (row-major) that breaks the cell invariants.
    pub fn first_inconsistent(&self) -> Option<CellPos> {
        self.cells.iter().enumerate().find_map(|(row, cells)| {
            cells
                .iter()
                .position(|cell| !cell.is_consistent())
                .map(|col| CellPos::new(row, col))
        })
    }

    pub fn cell(&self, pos: CellPos) -> Option<&Cell> {
        self.cells.get(pos.row)?.get(pos.col)
    }

    pub fn cell_mut(&mut self, pos: CellPos) -> Option<&mut Cell> {
        self.cells.get_mut(pos.row)?.get_mut(pos.col)
    }

    pub fn try_cell_mut(&mut self, pos: CellPos) -> Result<&mut Cell, GridError> {
        let (width, height) = (self.width, self.height);
        self.cell_mut(pos).ok_or(GridError::CellOutOfRange {
            row: pos.row,
            col: pos.col,
            width,
            height,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.iter_mut().flatten()
    }

    pub fn supercharged_count(&self) -> usize {
        self.iter().filter(|cell| cell.supercharged).count()
    }

    pub fn has_tech(&self, tech: &str) -> bool {
        self.iter().any(|cell| cell.tech.as_deref() == Some(tech))
    }

    /// Copy of the grid with `tech`'s placements content-reset.
    pub fn without_tech(&self, tech: &str) -> Self {
        let mut grid = self.clone();
        for cell in grid.iter_mut() {
            if cell.tech.as_deref() == Some(tech) {
                cell.reset_content();
            }
        }
        grid
    }
}
