use serde::{Deserialize, Serialize};
use shared::{Cell, CellPos, Grid, GridDefinition, ModuleEntry, OptimizeResponse};
use tracing::{debug, error, info, warn};

use crate::tech_annotations::TechAnnotationStore;

/// Portable copy of the grid-side state, used by build files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub grid: Grid,
    #[serde(default)]
    pub result: Option<OptimizeResponse>,
    #[serde(rename = "isSharedGrid", default)]
    pub is_shared_grid: bool,
    #[serde(rename = "gridFixed", default)]
    pub grid_fixed: bool,
    #[serde(rename = "superchargedFixed", default)]
    pub supercharged_fixed: bool,
    #[serde(rename = "initialGridDefinition", default)]
    pub initial_grid_definition: Option<GridDefinition>,
}

/// Single source of truth for the planner grid. Owns the per-tech
/// annotations so grid writes and annotation bookkeeping stay in step.
///
/// Every mutation keeps two cell invariants: an inactive cell is never
/// supercharged, and `tech`/`module` are set or cleared together. Indices
/// outside the grid are logged and ignored.
#[derive(Debug, Clone)]
pub struct GridStore {
    grid: Grid,
    grid_fixed: bool,
    supercharged_fixed: bool,
    is_shared_grid: bool,
    initial_grid_definition: Option<GridDefinition>,
    result: Option<OptimizeResponse>,
    pending_tap_snapshot: Option<Cell>,
    platform: String,
    annotations: TechAnnotationStore,
}

impl GridStore {
    pub fn new(platform: impl Into<String>) -> Self {
        Self::with_grid(platform, Grid::default())
    }

    pub fn with_grid(platform: impl Into<String>, grid: Grid) -> Self {
        Self {
            grid,
            grid_fixed: false,
            supercharged_fixed: false,
            is_shared_grid: false,
            initial_grid_definition: None,
            result: None,
            pending_tap_snapshot: None,
            platform: platform.into(),
            annotations: TechAnnotationStore::new(),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn cell(&self, pos: CellPos) -> Option<&Cell> {
        self.grid.cell(pos)
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn grid_fixed(&self) -> bool {
        self.grid_fixed
    }

    pub fn supercharged_fixed(&self) -> bool {
        self.supercharged_fixed
    }

    pub fn is_shared_grid(&self) -> bool {
        self.is_shared_grid
    }

    pub fn initial_grid_definition(&self) -> Option<&GridDefinition> {
        self.initial_grid_definition.as_ref()
    }

    pub fn result(&self) -> Option<&OptimizeResponse> {
        self.result.as_ref()
    }

    pub fn pending_tap_snapshot(&self) -> Option<&Cell> {
        self.pending_tap_snapshot.as_ref()
    }

    pub fn annotations(&self) -> &TechAnnotationStore {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut TechAnnotationStore {
        &mut self.annotations
    }

    pub fn set_is_shared_grid(&mut self, shared: bool) {
        self.is_shared_grid = shared;
    }

    pub fn set_grid_fixed(&mut self, fixed: bool) {
        self.grid_fixed = fixed;
    }

    pub fn set_supercharged_fixed(&mut self, fixed: bool) {
        self.supercharged_fixed = fixed;
    }

    pub(crate) fn set_platform(&mut self, platform: impl Into<String>) {
        self.platform = platform.into();
    }

    /// Replaces the grid only. Result, annotations and the shared flag are
    /// left alone; this is the build-apply and solve-write path.
    pub fn set_grid(&mut self, grid: Grid) {
        self.grid = grid;
    }

    /// Context-switch write: replaces the grid and wipes the result, the
    /// shared flag and every per-tech annotation.
    pub fn set_grid_and_reset_auxiliary_state(&mut self, grid: Grid) {
        self.grid = grid;
        self.result = None;
        self.is_shared_grid = false;
        self.pending_tap_snapshot = None;
        self.annotations.clear_all();
    }

    /// Changes the platform tag and performs a context switch onto `grid`.
    pub fn switch_platform(&mut self, platform: impl Into<String>, grid: Grid) {
        let platform = platform.into();
        info!(from = %self.platform, to = %platform, "switching platform");
        self.platform = platform;
        self.initial_grid_definition = None;
        self.grid_fixed = false;
        self.supercharged_fixed = false;
        self.set_grid_and_reset_auxiliary_state(grid);
    }

    /// Restores the definition-derived grid when a definition is known,
    /// otherwise a blank grid of the current size.
    pub fn reset_grid(&mut self) {
        match self.initial_grid_definition.clone() {
            Some(definition) => self.set_grid_from_initial_definition(&definition),
            None => self.grid = Grid::new(self.grid.width, self.grid.height),
        }
        self.result = None;
        self.is_shared_grid = false;
        self.pending_tap_snapshot = None;
        self.annotations.clear_bonuses();
    }

    pub fn set_initial_grid_definition(&mut self, definition: Option<GridDefinition>) {
        self.initial_grid_definition = definition;
    }

    /// Seeds the grid from a server definition and adopts its fixed flags.
    pub fn set_grid_from_initial_definition(&mut self, definition: &GridDefinition) {
        let rows = definition
            .grid
            .iter()
            .map(|row| {
                row.iter()
                    .map(|slot| match slot {
                        Some(entry) if !entry.is_empty() => Cell::from_catalog_entry(entry),
                        _ => Cell::default(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let grid = Grid::from_rows(rows);
        if !grid.is_well_formed() {
            warn!(
                rows = definition.grid.len(),
                "grid definition has ragged rows; keeping current grid"
            );
            return;
        }
        self.grid = grid;
        self.grid_fixed = definition.grid_fixed;
        self.supercharged_fixed = definition.supercharged_fixed;
    }

    pub fn activate_row(&mut self, row: usize) {
        self.set_row_active(row, true);
    }

    pub fn deactivate_row(&mut self, row: usize) {
        self.set_row_active(row, false);
    }

    fn set_row_active(&mut self, row: usize, active: bool) {
        let Some(cells) = self.grid.cells.get_mut(row) else {
            warn!(row, height = self.grid.height, "row index out of range");
            return;
        };
        for cell in cells {
            cell.set_active(active);
        }
    }

    pub fn toggle_cell_active(&mut self, pos: CellPos) {
        let Some(cell) = self.cell_or_log(pos) else {
            return;
        };
        if cell.supercharged {
            cell.supercharged = false;
        }
        let active = !cell.active;
        cell.set_active(active);
    }

    /// Flips supercharge. Supercharging an inactive cell activates it; the
    /// reverse path in `toggle_cell_active` has no such shortcut.
    pub fn toggle_cell_supercharged(&mut self, pos: CellPos) {
        let Some(cell) = self.cell_or_log(pos) else {
            return;
        };
        if !cell.active {
            cell.active = true;
        }
        cell.supercharged = !cell.supercharged;
    }

    pub fn set_cell_active(&mut self, pos: CellPos, active: bool) {
        if let Some(cell) = self.cell_or_log(pos) {
            cell.set_active(active);
        }
    }

    pub fn set_cell_supercharged(&mut self, pos: CellPos, supercharged: bool) {
        let Some(cell) = self.cell_or_log(pos) else {
            return;
        };
        if supercharged && !cell.active {
            warn!(row = pos.row, col = pos.col, "cannot supercharge an inactive cell");
            return;
        }
        cell.supercharged = supercharged;
    }

    /// Single-tap primitive: snapshots the cell, then flips `active`.
    pub fn handle_cell_tap(&mut self, pos: CellPos) {
        let Some(cell) = self.cell_or_log(pos) else {
            return;
        };
        let snapshot = cell.clone();
        let active = !cell.active;
        cell.set_active(active);
        self.pending_tap_snapshot = Some(snapshot);
    }

    /// Double-tap primitive: supercharge toggles relative to the snapshot
    /// taken by the preceding single tap and the cell ends active.
    pub fn handle_cell_double_tap(&mut self, pos: CellPos) {
        let Some(snapshot) = self.pending_tap_snapshot.take() else {
            debug!(row = pos.row, col = pos.col, "double tap without a pending tap");
            return;
        };
        if let Some(cell) = self.cell_or_log(pos) {
            cell.active = true;
            cell.supercharged = !snapshot.supercharged;
        }
    }

    pub fn revert_cell_tap(&mut self, pos: CellPos) {
        let Some(snapshot) = self.pending_tap_snapshot.take() else {
            return;
        };
        if let Some(cell) = self.cell_or_log(pos) {
            cell.active = snapshot.active;
            cell.supercharged = snapshot.supercharged && snapshot.active;
        }
    }

    pub fn clear_initial_cell_state_for_tap(&mut self) {
        self.pending_tap_snapshot = None;
    }

    pub fn has_tech_in_grid(&self, tech: &str) -> bool {
        self.grid.has_tech(tech)
    }

    pub fn has_modules_in_grid(&self) -> bool {
        self.grid.iter().any(Cell::has_module)
    }

    pub fn total_supercharged_cells(&self) -> usize {
        self.grid.supercharged_count()
    }

    /// True when at least one cell is active and every active cell holds a
    /// module.
    pub fn is_grid_full(&self) -> bool {
        let mut active = self.grid.iter().filter(|cell| cell.active).peekable();
        active.peek().is_some() && active.all(Cell::has_module)
    }

    pub fn reset_grid_tech(&mut self, tech: &str) {
        for cell in self.grid.iter_mut() {
            if cell.tech.as_deref() == Some(tech) {
                cell.reset_content();
            }
        }
    }

    /// Clears a tech's placements together with its bonus annotations.
    pub fn reset_tech(&mut self, tech: &str) {
        self.reset_grid_tech(tech);
        self.annotations.clear_tech_bonuses(tech);
    }

    /// Stores the last solve. A present result is also recorded against
    /// `tech` in the annotations; `None` clears only the stored result.
    pub fn set_result(&mut self, result: Option<OptimizeResponse>, tech: &str) {
        if let Some(result) = &result {
            self.annotations.set_bonuses(
                tech,
                result.max_bonus,
                result.solved_bonus,
                &result.solve_method,
            );
        }
        self.result = result;
    }

    /// Positional bulk write: entry `i` lands on `(i / width, i % width)`.
    /// `None` clears that cell's content, `Some` overlays its fields.
    pub fn apply_modules_to_grid(&mut self, entries: &[Option<ModuleEntry>]) {
        let width = self.grid.width;
        if width == 0 {
            return;
        }
        for (index, entry) in entries.iter().enumerate() {
            let pos = CellPos::new(index / width, index % width);
            let Some(cell) = self.cell_or_log(pos) else {
                break;
            };
            match entry {
                Some(entry) => cell.merge_entry(entry),
                None => cell.reset_content(),
            }
        }
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            grid: self.grid.clone(),
            result: self.result.clone(),
            is_shared_grid: self.is_shared_grid,
            grid_fixed: self.grid_fixed,
            supercharged_fixed: self.supercharged_fixed,
            initial_grid_definition: self.initial_grid_definition.clone(),
        }
    }

    /// Restores the grid-side state. The shared flag belongs to the session
    /// and is kept; `snapshot.is_shared_grid` is ignored.
    pub fn restore_snapshot(&mut self, snapshot: GridSnapshot) {
        self.grid = snapshot.grid;
        self.result = snapshot.result;
        self.grid_fixed = snapshot.grid_fixed;
        self.supercharged_fixed = snapshot.supercharged_fixed;
        self.initial_grid_definition = snapshot.initial_grid_definition;
        self.pending_tap_snapshot = None;
    }

    fn cell_or_log(&mut self, pos: CellPos) -> Option<&mut Cell> {
        match self.grid.try_cell_mut(pos) {
            Ok(cell) => Some(cell),
            Err(err) => {
                error!(row = pos.row, col = pos.col, "{err}");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/grid_store_tests.rs"]
mod tests;
