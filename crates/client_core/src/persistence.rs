use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use shared::{Grid, GridDefinition};
use storage::{DebouncedWriter, KeyValueStore};
use tracing::{error, info, warn};

use crate::{
    context::{resolve_platform, LaunchContext},
    grid_store::GridStore,
    tech_annotations::TechBonus,
};

pub const GRID_STORAGE_KEY: &str = "grid-storage_v3";
pub const MODULE_SELECTION_KEY: &str = "moduleSelectionState";
pub const TECH_BONUS_KEY: &str = "techBonusState";
pub const PLATFORM_KEY: &str = "selectedPlatform";

pub const GRID_STATE_VERSION: u64 = 3;
const AUXILIARY_STATE_VERSION: u64 = 0;

/// Grid state as written under [`GRID_STORAGE_KEY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedGridState {
    pub grid: Grid,
    #[serde(rename = "isSharedGrid", default)]
    pub is_shared_grid: bool,
    /// Platform the grid was built for; `None` on records that predate
    /// tagging.
    #[serde(rename = "selectedPlatform", default)]
    pub selected_platform: Option<String>,
    #[serde(rename = "gridFixed", default)]
    pub grid_fixed: bool,
    #[serde(rename = "superchargedFixed", default)]
    pub supercharged_fixed: bool,
    #[serde(rename = "initialGridDefinition", default)]
    pub initial_grid_definition: Option<GridDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ModuleSelectionState {
    #[serde(rename = "moduleSelections", default)]
    module_selections: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TechBonusState {
    #[serde(default)]
    bonuses: BTreeMap<String, TechBonus>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Versioned<T> {
    state: T,
    version: u64,
}

pub fn encode_grid_state(store: &GridStore) -> serde_json::Result<String> {
    serde_json::to_string(&Versioned {
        state: PersistedGridState {
            grid: store.grid().clone(),
            is_shared_grid: store.is_shared_grid(),
            selected_platform: Some(store.platform().to_string()),
            grid_fixed: store.grid_fixed(),
            supercharged_fixed: store.supercharged_fixed(),
            initial_grid_definition: store.initial_grid_definition().cloned(),
        },
        version: GRID_STATE_VERSION,
    })
}

/// Decodes a stored grid record, migrating older versions. Malformed
/// records are dropped, as are records newer than this build understands and
/// grids that are ragged or hold cells breaking the cell invariants.
pub fn decode_grid_state(raw: &str) -> Option<PersistedGridState> {
    let (version, state) = split_versioned(raw, GRID_STORAGE_KEY)?;
    if version > GRID_STATE_VERSION {
        warn!(
            key = GRID_STORAGE_KEY,
            version,
            supported = GRID_STATE_VERSION,
            "discarding grid state from a newer version"
        );
        return None;
    }

    let state: PersistedGridState = match serde_json::from_value(state) {
        Ok(state) => state,
        Err(err) => {
            warn!(key = GRID_STORAGE_KEY, version, "discarding unreadable grid state: {err}");
            return None;
        }
    };
    if !state.grid.is_well_formed() {
        warn!(key = GRID_STORAGE_KEY, version, "discarding ragged stored grid");
        return None;
    }
    if let Some(pos) = state.grid.first_inconsistent() {
        warn!(
            key = GRID_STORAGE_KEY,
            version,
            row = pos.row,
            col = pos.col,
            "discarding stored grid with an inconsistent cell"
        );
        return None;
    }
    if version < GRID_STATE_VERSION {
        info!(key = GRID_STORAGE_KEY, from = version, to = GRID_STATE_VERSION, "migrated grid state");
    }
    Some(state)
}

fn split_versioned(raw: &str, key: &str) -> Option<(u64, Value)> {
    let mut record: Value = match serde_json::from_str(raw) {
        Ok(record) => record,
        Err(err) => {
            warn!(key, "discarding malformed stored state: {err}");
            return None;
        }
    };
    let version = record.get("version").and_then(Value::as_u64).unwrap_or(0);
    match record.get_mut("state").map(Value::take) {
        Some(state) if state.is_object() => Some((version, state)),
        _ => {
            warn!(key, version, "discarding stored state without a 'state' object");
            None
        }
    }
}

fn encode_auxiliary<T: Serialize>(state: T) -> serde_json::Result<String> {
    serde_json::to_string(&Versioned {
        state,
        version: AUXILIARY_STATE_VERSION,
    })
}

fn decode_auxiliary<T: DeserializeOwned>(raw: &str, key: &str) -> Option<T> {
    let (version, state) = split_versioned(raw, key)?;
    if version > AUXILIARY_STATE_VERSION {
        warn!(key, version, "discarding auxiliary state from a newer version");
        return None;
    }
    match serde_json::from_value(state) {
        Ok(state) => Some(state),
        Err(err) => {
            warn!(key, "discarding unreadable auxiliary state: {err}");
            None
        }
    }
}

/// Merges persisted grid state over `current`.
///
/// A grid stored for another platform is discarded wholesale, together with
/// its fixed flags and definition. The shared flag always comes from the
/// launch URL, never from storage.
pub fn reconcile(
    mut current: GridStore,
    persisted: Option<PersistedGridState>,
    live_platform: &str,
    shared_from_url: bool,
) -> GridStore {
    current.set_platform(live_platform);
    if let Some(persisted) = persisted {
        match persisted.selected_platform.as_deref() {
            Some(stored) if stored != live_platform => {
                warn!(
                    stored = %stored,
                    live = %live_platform,
                    "stored grid belongs to another platform; discarding it"
                );
            }
            _ => {
                current.set_grid(persisted.grid);
                current.set_grid_fixed(persisted.grid_fixed);
                current.set_supercharged_fixed(persisted.supercharged_fixed);
                current.set_initial_grid_definition(persisted.initial_grid_definition);
            }
        }
    }
    current.set_is_shared_grid(shared_from_url);
    current
}

/// Debounced persistence for one planner session: one writer per storage
/// key so each record coalesces and clears independently.
pub struct StoreSync {
    store: Arc<dyn KeyValueStore>,
    grid: DebouncedWriter,
    selections: DebouncedWriter,
    bonuses: DebouncedWriter,
}

impl StoreSync {
    pub fn new(store: Arc<dyn KeyValueStore>, delay: Duration) -> Self {
        Self {
            grid: DebouncedWriter::new(Arc::clone(&store), GRID_STORAGE_KEY, delay),
            selections: DebouncedWriter::new(Arc::clone(&store), MODULE_SELECTION_KEY, delay),
            bonuses: DebouncedWriter::new(Arc::clone(&store), TECH_BONUS_KEY, delay),
            store,
        }
    }

    /// Builds the session's store from the launch URL and whatever storage
    /// holds.
    pub async fn load(
        &self,
        launch: &LaunchContext,
        valid_platforms: &[String],
        default_platform: &str,
    ) -> Result<GridStore> {
        let stored_platform = self.store.get_item(PLATFORM_KEY).await?;
        let platform = resolve_platform(
            launch.platform.as_deref(),
            stored_platform.as_deref(),
            valid_platforms,
            default_platform,
        );

        let persisted = self
            .store
            .get_item(GRID_STORAGE_KEY)
            .await?
            .and_then(|raw| decode_grid_state(&raw));
        let mut grid_store = reconcile(
            GridStore::new(platform.clone()),
            persisted,
            &platform,
            launch.is_shared(),
        );

        if let Some(raw) = self.store.get_item(MODULE_SELECTION_KEY).await? {
            if let Some(state) = decode_auxiliary::<ModuleSelectionState>(&raw, MODULE_SELECTION_KEY) {
                grid_store
                    .annotations_mut()
                    .restore_module_selections(state.module_selections);
            }
        }
        if let Some(raw) = self.store.get_item(TECH_BONUS_KEY).await? {
            if let Some(state) = decode_auxiliary::<TechBonusState>(&raw, TECH_BONUS_KEY) {
                grid_store.annotations_mut().restore_bonuses(state.bonuses);
            }
        }

        info!(platform = %platform, shared = launch.is_shared(), "planner state loaded");
        Ok(grid_store)
    }

    pub fn persist_grid(&self, grid_store: &GridStore) {
        match encode_grid_state(grid_store) {
            Ok(raw) => self.grid.schedule(raw),
            Err(err) => error!(key = GRID_STORAGE_KEY, "failed to encode grid state: {err}"),
        }
    }

    pub fn persist_annotations(&self, grid_store: &GridStore) {
        let annotations = grid_store.annotations();
        match encode_auxiliary(ModuleSelectionState {
            module_selections: annotations.module_selections(),
        }) {
            Ok(raw) => self.selections.schedule(raw),
            Err(err) => error!(key = MODULE_SELECTION_KEY, "failed to encode selections: {err}"),
        }
        match encode_auxiliary(TechBonusState {
            bonuses: annotations.bonuses(),
        }) {
            Ok(raw) => self.bonuses.schedule(raw),
            Err(err) => error!(key = TECH_BONUS_KEY, "failed to encode bonuses: {err}"),
        }
    }

    pub fn persist_all(&self, grid_store: &GridStore) {
        self.persist_grid(grid_store);
        self.persist_annotations(grid_store);
    }

    pub async fn save_platform(&self, platform: &str) -> Result<()> {
        self.store.set_item(PLATFORM_KEY, platform).await
    }

    pub fn has_pending(&self) -> bool {
        self.grid.has_pending() || self.selections.has_pending() || self.bonuses.has_pending()
    }

    pub async fn flush(&self) -> Result<()> {
        self.grid.flush().await?;
        self.selections.flush().await?;
        self.bonuses.flush().await
    }

    /// Drops pending and stored module selections and bonus annotations.
    pub async fn clear_auxiliary(&self) -> Result<()> {
        self.selections.clear().await?;
        self.bonuses.clear().await
    }

    /// Pending writes are dropped; call [`StoreSync::flush`] first to keep
    /// them.
    pub fn cancel(&self) {
        self.grid.cancel();
        self.selections.cancel();
        self.bonuses.cancel();
    }
}

#[cfg(test)]
#[path = "tests/persistence_tests.rs"]
mod tests;
