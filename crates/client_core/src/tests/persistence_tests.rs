use serde_json::json;
use shared::{Cell, CellPos, GridDefinition, ModuleEntry};
use storage::MemoryStore;

use super::*;

const DELAY: Duration = Duration::from_millis(500);

fn valid() -> Vec<String> {
    vec!["standard".into(), "corvette".into()]
}

fn placed_grid() -> Grid {
    let mut grid = Grid::default();
    grid.cells[0][0] = Cell::from_catalog_entry(&ModuleEntry {
        id: Some("S1".into()),
        tech: Some("shield".into()),
        ..ModuleEntry::default()
    });
    grid
}

fn persisted(platform: Option<&str>) -> PersistedGridState {
    PersistedGridState {
        grid: placed_grid(),
        is_shared_grid: true,
        selected_platform: platform.map(str::to_string),
        grid_fixed: false,
        supercharged_fixed: false,
        initial_grid_definition: None,
    }
}

fn locked_definition() -> GridDefinition {
    let slot = ModuleEntry {
        id: Some("S1".into()),
        tech: Some("shield".into()),
        ..ModuleEntry::default()
    };
    GridDefinition {
        grid: vec![vec![Some(slot), None], vec![None, None]],
        grid_fixed: true,
        supercharged_fixed: true,
    }
}

#[test]
fn reconcile_adopts_grid_for_matching_platform() {
    let store = reconcile(
        GridStore::new("standard"),
        Some(persisted(Some("standard"))),
        "standard",
        false,
    );
    assert_eq!(store.grid(), &placed_grid());
    assert!(!store.is_shared_grid());
}

#[test]
fn reconcile_discards_grid_from_other_platform() {
    let store = reconcile(
        GridStore::new("corvette"),
        Some(persisted(Some("standard"))),
        "corvette",
        false,
    );
    assert_eq!(store.grid(), &Grid::default());
    assert_eq!(store.platform(), "corvette");
}

#[test]
fn reconcile_accepts_untagged_grid_and_takes_shared_flag_from_url() {
    let store = reconcile(GridStore::new("standard"), Some(persisted(None)), "standard", true);
    assert_eq!(store.grid(), &placed_grid());
    assert!(store.is_shared_grid());

    let store = reconcile(GridStore::new("standard"), None, "standard", true);
    assert!(store.is_shared_grid());
}

#[test]
fn grid_state_round_trips_through_its_encoding() {
    let mut store = GridStore::with_grid("corvette", placed_grid());
    store.set_is_shared_grid(true);
    let raw = encode_grid_state(&store).expect("encode");

    let value: Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(value["version"], 3);
    assert_eq!(value["state"]["selectedPlatform"], "corvette");

    let decoded = decode_grid_state(&raw).expect("decode");
    assert_eq!(decoded.grid, placed_grid());
    assert!(decoded.is_shared_grid);
    assert_eq!(decoded.selected_platform.as_deref(), Some("corvette"));
}

#[test]
fn older_record_is_migrated() {
    let raw = json!({
        "state": {"grid": Grid::new(2, 2), "isSharedGrid": false},
        "version": 2
    })
    .to_string();
    let decoded = decode_grid_state(&raw).expect("migrated");
    assert_eq!(decoded.grid, Grid::new(2, 2));
    assert_eq!(decoded.selected_platform, None);
}

#[test]
fn unusable_records_are_discarded() {
    let newer = json!({"state": {"grid": Grid::new(1, 1)}, "version": 4}).to_string();
    let mut ragged = serde_json::to_value(Grid::new(2, 2)).expect("grid");
    ragged["width"] = json!(5);
    let ragged = json!({"state": {"grid": ragged}, "version": 3}).to_string();
    let stateless = json!({"version": 3}).to_string();

    let mut inconsistent = Grid::new(2, 2);
    inconsistent.cells[1][1].supercharged = true;
    let inconsistent = json!({"state": {"grid": inconsistent}, "version": 3}).to_string();

    for raw in [
        "{not json",
        newer.as_str(),
        ragged.as_str(),
        stateless.as_str(),
        inconsistent.as_str(),
    ] {
        assert!(decode_grid_state(raw).is_none(), "should discard {raw}");
    }
}

#[test]
fn fixed_flags_and_definition_survive_encoding() {
    let mut store = GridStore::new("corvette");
    let definition = locked_definition();
    store.set_initial_grid_definition(Some(definition.clone()));
    store.set_grid_from_initial_definition(&definition);
    let raw = encode_grid_state(&store).expect("encode");

    let value: Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(value["state"]["gridFixed"], true);
    assert_eq!(value["state"]["superchargedFixed"], true);

    let restored = reconcile(
        GridStore::new("corvette"),
        decode_grid_state(&raw),
        "corvette",
        false,
    );
    assert!(restored.grid_fixed());
    assert!(restored.supercharged_fixed());
    assert_eq!(restored.initial_grid_definition(), Some(&definition));
    assert_eq!(restored.grid(), store.grid());
}

#[test]
fn records_without_fixed_flags_load_unlocked() {
    let raw = json!({
        "state": {"grid": Grid::new(2, 2), "isSharedGrid": false, "selectedPlatform": "standard"},
        "version": 3
    })
    .to_string();
    let decoded = decode_grid_state(&raw).expect("decode");
    assert!(!decoded.grid_fixed);
    assert!(!decoded.supercharged_fixed);
    assert_eq!(decoded.initial_grid_definition, None);
}

#[test]
fn other_platform_locks_are_not_adopted() {
    let mut stored = persisted(Some("standard"));
    stored.grid_fixed = true;
    stored.supercharged_fixed = true;
    stored.initial_grid_definition = Some(locked_definition());

    let store = reconcile(GridStore::new("corvette"), Some(stored), "corvette", false);
    assert!(!store.grid_fixed());
    assert!(!store.supercharged_fixed());
    assert!(store.initial_grid_definition().is_none());
}

#[tokio::test(start_paused = true)]
async fn debounced_writes_land_after_the_quiet_window() {
    let backing = MemoryStore::new();
    let sync = StoreSync::new(Arc::new(backing.clone()), DELAY);
    let mut store = GridStore::new("standard");

    sync.persist_all(&store);
    store.toggle_cell_supercharged(CellPos::new(0, 0));
    sync.persist_all(&store);
    assert!(sync.has_pending());

    tokio::time::sleep(Duration::from_millis(499)).await;
    assert!(backing.get_item(GRID_STORAGE_KEY).await.expect("get").is_none());

    tokio::time::sleep(Duration::from_millis(2)).await;
    let raw = backing
        .get_item(GRID_STORAGE_KEY)
        .await
        .expect("get")
        .expect("written");
    let decoded = decode_grid_state(&raw).expect("decode");
    assert!(decoded.grid.cells[0][0].supercharged);
    assert!(backing.get_item(MODULE_SELECTION_KEY).await.expect("get").is_some());
    assert!(backing.get_item(TECH_BONUS_KEY).await.expect("get").is_some());
    assert!(!sync.has_pending());
}

#[tokio::test]
async fn load_restores_grid_and_annotations() {
    let backing = Arc::new(MemoryStore::new());
    let sync = StoreSync::new(backing.clone(), DELAY);

    let mut store = GridStore::with_grid("corvette", placed_grid());
    store
        .annotations_mut()
        .set_module_selection("shield", vec!["S1".into()]);
    store
        .annotations_mut()
        .set_bonuses("shield", Some(103.0), Some(99.0), "sa");
    sync.persist_all(&store);
    sync.flush().await.expect("flush");
    sync.save_platform("corvette").await.expect("platform");

    let loaded = sync
        .load(&LaunchContext::default(), &valid(), "standard")
        .await
        .expect("load");

    assert_eq!(loaded.platform(), "corvette");
    assert_eq!(loaded.grid(), &placed_grid());
    assert_eq!(loaded.annotations(), store.annotations());
}

#[tokio::test]
async fn load_with_other_platform_in_url_discards_stored_grid() {
    let backing = Arc::new(MemoryStore::new());
    let sync = StoreSync::new(backing.clone(), DELAY);
    sync.persist_grid(&GridStore::with_grid("standard", placed_grid()));
    sync.flush().await.expect("flush");

    let launch = LaunchContext {
        platform: Some("corvette".into()),
        shared_grid: Some("10x6".into()),
    };
    let loaded = sync.load(&launch, &valid(), "standard").await.expect("load");

    assert_eq!(loaded.platform(), "corvette");
    assert_eq!(loaded.grid(), &Grid::default());
    assert!(loaded.is_shared_grid());
}

#[tokio::test]
async fn load_from_empty_storage_uses_defaults() {
    let sync = StoreSync::new(Arc::new(MemoryStore::new()), DELAY);
    let loaded = sync
        .load(&LaunchContext::default(), &valid(), "standard")
        .await
        .expect("load");
    assert_eq!(loaded.platform(), "standard");
    assert_eq!(loaded.grid(), &Grid::default());
    assert!(loaded.annotations().is_empty());
}

#[tokio::test]
async fn clear_auxiliary_removes_both_annotation_keys() {
    let backing = Arc::new(MemoryStore::new());
    let sync = StoreSync::new(backing.clone(), DELAY);
    let mut store = GridStore::new("standard");
    store
        .annotations_mut()
        .set_module_selection("shield", vec!["S1".into()]);
    sync.persist_all(&store);
    sync.flush().await.expect("flush");

    store.annotations_mut()
        .set_module_selection("hyper", vec!["H1".into()]);
    sync.persist_annotations(&store);
    sync.clear_auxiliary().await.expect("clear");
    sync.flush().await.expect("flush");

    assert!(backing.get_item(MODULE_SELECTION_KEY).await.expect("get").is_none());
    assert!(backing.get_item(TECH_BONUS_KEY).await.expect("get").is_none());
    assert!(backing.get_item(GRID_STORAGE_KEY).await.expect("get").is_some());
}

#[tokio::test]
async fn corrupt_auxiliary_records_are_ignored() {
    let backing = Arc::new(MemoryStore::new());
    backing
        .set_item(MODULE_SELECTION_KEY, "][")
        .await
        .expect("seed");
    backing
        .set_item(TECH_BONUS_KEY, &json!({"state": {"bonuses": 5}, "version": 0}).to_string())
        .await
        .expect("seed");
    let sync = StoreSync::new(backing, DELAY);

    let loaded = sync
        .load(&LaunchContext::default(), &valid(), "standard")
        .await
        .expect("load");
    assert!(loaded.annotations().is_empty());
}

#[tokio::test]
async fn locks_survive_a_restart() {
    let backing = Arc::new(MemoryStore::new());
    let sync = StoreSync::new(backing.clone(), DELAY);
    let mut store = GridStore::new("corvette");
    let definition = locked_definition();
    store.set_initial_grid_definition(Some(definition.clone()));
    store.set_grid_from_initial_definition(&definition);
    sync.persist_all(&store);
    sync.flush().await.expect("flush");
    sync.save_platform("corvette").await.expect("platform");

    let mut loaded = StoreSync::new(backing, DELAY)
        .load(&LaunchContext::default(), &valid(), "standard")
        .await
        .expect("load");
    assert!(loaded.grid_fixed());
    assert!(loaded.supercharged_fixed());

    loaded.toggle_cell_active(CellPos::new(0, 0));
    loaded.reset_grid();
    assert_eq!(loaded.grid(), store.grid());
}
