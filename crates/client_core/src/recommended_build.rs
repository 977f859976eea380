use std::collections::HashMap;

use serde_json::Value;
use shared::{
    error::BuildValidationError, BuildCell, Cell, Grid, ModuleEntry, RecommendedBuild, TechTree,
};
use tracing::{error, info, warn};

use crate::grid_store::GridStore;

/// Module lookup keyed by `(tech, module id)`.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: HashMap<String, ModuleEntry>,
}

impl ModuleCatalog {
    pub fn from_tech_tree(tree: &TechTree) -> Self {
        let mut catalog = Self::default();
        for item in tree.techs() {
            for module in &item.modules {
                if let Some(id) = &module.id {
                    let mut entry = module.clone();
                    entry.tech.get_or_insert_with(|| item.key.clone());
                    catalog.modules.insert(catalog_key(&item.key, id), entry);
                }
            }
        }
        catalog
    }

    pub fn insert(&mut self, tech: &str, entry: ModuleEntry) {
        if let Some(id) = entry.id.clone() {
            self.modules.insert(catalog_key(tech, &id), entry);
        }
    }

    pub fn get(&self, tech: &str, module: &str) -> Option<&ModuleEntry> {
        self.modules.get(&catalog_key(tech, module))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn catalog_key(tech: &str, module: &str) -> String {
    format!("{tech}/{module}")
}

/// Resolves a build layout against the catalog into a fresh default-size
/// grid. Slots the layout leaves `null` stay blank; references the catalog
/// cannot resolve become content-reset cells.
pub fn build_grid(build: &RecommendedBuild, catalog: &ModuleCatalog) -> Grid {
    let mut grid = Grid::default();
    if build.layout.len() > grid.height
        || build.layout.iter().any(|row| row.len() > grid.width)
    {
        warn!(
            title = %build.title,
            width = grid.width,
            height = grid.height,
            "recommended build layout exceeds the grid; extra cells dropped"
        );
    }

    for (row_index, row) in build.layout.iter().enumerate().take(grid.height) {
        for (col_index, slot) in row.iter().enumerate().take(grid.width) {
            grid.cells[row_index][col_index] = match slot {
                None => Cell::default(),
                Some(slot) => resolve_cell(slot, catalog),
            };
        }
    }
    grid
}

fn resolve_cell(slot: &BuildCell, catalog: &ModuleCatalog) -> Cell {
    let active = slot.active.unwrap_or(true);
    let supercharged = slot.supercharged.unwrap_or(false);

    let resolved = match (&slot.tech, &slot.module) {
        (Some(tech), Some(module)) => catalog.get(tech, module).map(|entry| (tech, module, entry)),
        _ => None,
    };
    let Some((tech, module, entry)) = resolved else {
        if slot.tech.is_some() || slot.module.is_some() {
            warn!(
                tech = ?slot.tech,
                module = ?slot.module,
                "recommended build references an unknown module; leaving cell empty"
            );
        }
        return Cell::empty(supercharged, active);
    };

    let mut cell = Cell::from_catalog_entry(&ModuleEntry {
        id: Some(module.clone()),
        tech: Some(tech.clone()),
        ..entry.clone()
    });
    cell.active = active;
    cell.supercharged = supercharged && active;
    cell.adjacency_bonus = slot.adjacency_bonus.unwrap_or(0.0);
    cell
}

/// Validates a raw build and writes it through [`GridStore::set_grid`], so
/// module selections and bonus annotations survive. Invalid builds are
/// logged and leave the store untouched.
pub fn apply_recommended_build(
    store: &mut GridStore,
    catalog: &ModuleCatalog,
    raw: &Value,
) -> Result<(), BuildValidationError> {
    let build = RecommendedBuild::from_value(raw).map_err(|err| {
        error!(diagnostic = %err, "rejecting recommended build");
        err
    })?;
    apply_validated_build(store, catalog, &build);
    Ok(())
}

pub fn apply_validated_build(store: &mut GridStore, catalog: &ModuleCatalog, build: &RecommendedBuild) {
    let grid = build_grid(build, catalog);
    store.set_grid(grid);
    info!(title = %build.title, "applied recommended build");
}

#[cfg(test)]
#[path = "tests/recommended_build_tests.rs"]
mod tests;
