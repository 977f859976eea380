use shared::CellPos;

use super::*;
use crate::context::LaunchContext;

fn entry(tech: &str, id: &str, label: &str) -> ModuleEntry {
    ModuleEntry {
        id: Some(id.into()),
        tech: Some(tech.into()),
        label: Some(label.into()),
        bonus: Some(0.5),
        adjacency: Some("greater".into()),
        sc_eligible: Some(true),
        ..ModuleEntry::default()
    }
}

fn catalog() -> ModuleCatalog {
    let mut catalog = ModuleCatalog::default();
    catalog.insert("shield", entry("shield", "S1", "Shield Core"));
    catalog.insert("shield", entry("shield", "Xa", "Shield Upgrade"));
    catalog.insert("hyper", entry("hyper", "Xa", "Hyper Upgrade"));
    catalog
}

fn placed(tech: &str, id: &str) -> Cell {
    let catalog = catalog();
    let entry = catalog.get(tech, id).expect("catalog entry");
    Cell::from_catalog_entry(entry)
}

fn planned_grid() -> Grid {
    let mut grid = Grid::default();
    for row in 0..3 {
        for col in 0..grid.width {
            grid.cells[row][col].active = true;
        }
    }
    grid.cells[0][0] = placed("shield", "S1");
    grid.cells[0][0].supercharged = true;
    grid.cells[0][0].adjacency_bonus = 1.0;
    grid.cells[0][1] = placed("shield", "Xa");
    grid.cells[1][0] = placed("hyper", "Xa");
    grid.cells[1][0].adjacency_bonus = 1.0;
    grid.cells[2][5].supercharged = true;
    grid
}

#[test]
fn rle_matches_known_encoding() {
    assert_eq!(compress_rle("AAABBCDDDD"), "A3B2CD4");
    assert_eq!(compress_rle(""), "");
    assert_eq!(decompress_rle("A3B2CD4", 100).expect("decode"), "AAABBCDDDD");
    assert_eq!(decompress_rle("", 100).expect("decode"), "");
    assert_eq!(decompress_rle(" 12", 100).expect("decode"), " ".repeat(12));
}

#[test]
fn rle_rejects_bad_counts_and_oversized_runs() {
    assert!(decompress_rle("3A", 100).is_err());
    assert!(decompress_rle("A0", 100).is_err());
    assert!(decompress_rle("A999999999999", 100).is_err());
    assert!(decompress_rle("A61", 60).is_err());
}

#[test]
fn serialized_grid_resolves_back_through_catalog() {
    let grid = planned_grid();
    let payload = serialize_grid(&grid).expect("serialize");

    assert!(payload.starts_with("10x6|"));
    assert_eq!(payload.split('|').count(), 7);

    let decoded = deserialize_grid(&payload, &catalog()).expect("deserialize");
    assert_eq!(decoded, grid);
    assert!(decoded.first_inconsistent().is_none());
}

#[test]
fn module_ids_shared_between_techs_stay_distinct() {
    let payload = serialize_grid(&planned_grid()).expect("serialize");
    let decoded = deserialize_grid(&payload, &catalog()).expect("deserialize");

    assert_eq!(decoded.cells[0][1].label, "Shield Upgrade");
    assert_eq!(decoded.cells[1][0].label, "Hyper Upgrade");
    assert_eq!(decoded.cells[1][0].tech.as_deref(), Some("hyper"));
}

#[test]
fn unknown_module_becomes_empty_cell_with_flags() {
    let payload = serialize_grid(&planned_grid()).expect("serialize");
    let mut partial = ModuleCatalog::default();
    partial.insert("hyper", entry("hyper", "Xa", "Hyper Upgrade"));

    let decoded = deserialize_grid(&payload, &partial).expect("deserialize");
    let cell = &decoded.cells[0][0];
    assert!(cell.active);
    assert!(cell.supercharged);
    assert!(!cell.has_module());
    assert_eq!(cell.adjacency_bonus, 0.0);
    assert!(decoded.first_inconsistent().is_none());
}

#[test]
fn malformed_payloads_are_rejected() {
    let valid = serialize_grid(&planned_grid()).expect("serialize");
    let mut sections: Vec<String> = valid.split('|').map(str::to_string).collect();

    let cases = [
        "invalid-grid".to_string(),
        valid.replacen("10x6", "0x6", 1),
        valid.replacen("10x6", "100x100", 1),
        {
            let mut short = sections.clone();
            short[1] = "A".into();
            short.join("|")
        },
        {
            let mut unknown_state = sections.clone();
            unknown_state[1] = "Q60".into();
            unknown_state.join("|")
        },
        {
            let mut missing_code = sections.clone();
            missing_code[5] = String::new();
            missing_code.join("|")
        },
        {
            sections[3] = " 60".into();
            sections.join("|")
        },
    ];
    for payload in cases {
        assert!(
            matches!(
                deserialize_grid(&payload, &catalog()),
                Err(ShareError::Malformed(_))
            ),
            "should reject {payload}"
        );
    }
}

#[test]
fn names_that_break_the_format_are_refused() {
    let mut grid = Grid::new(2, 1);
    grid.cells[0][0] = Cell::from_catalog_entry(&entry("bad|tech", "S1", "x"));
    assert_eq!(
        serialize_grid(&grid),
        Err(ShareError::UnencodableName("bad|tech".into()))
    );
}

#[test]
fn applying_shared_grid_enters_shared_mode() {
    let payload = serialize_grid(&planned_grid()).expect("serialize");
    let mut store = GridStore::new("standard");
    store
        .annotations_mut()
        .set_module_selection("shield", vec!["S1".into()]);

    apply_shared_grid(&mut store, &catalog(), &payload).expect("apply");
    assert!(store.is_shared_grid());
    assert_eq!(store.grid(), &planned_grid());
    assert_eq!(
        store.annotations().module_selection("shield"),
        Some(&["S1".to_string()][..])
    );
}

#[test]
fn undecodable_shared_grid_leaves_store_alone() {
    let mut store = GridStore::new("standard");
    store.toggle_cell_active(CellPos::new(0, 0));
    let before = store.grid().clone();

    assert!(apply_shared_grid(&mut store, &catalog(), "10x6|nope").is_err());
    assert_eq!(store.grid(), &before);
    assert!(!store.is_shared_grid());
}

#[test]
fn share_url_round_trips_through_launch_context() {
    let store = GridStore::with_grid("corvette", planned_grid());
    let url = share_url("https://planner.example/?lang=en&grid=old", &store).expect("url");

    let launch = LaunchContext::from_url(&url).expect("launch");
    assert_eq!(launch.platform.as_deref(), Some("corvette"));
    assert!(url.contains("lang=en"));

    let payload = launch.shared_grid.expect("payload");
    assert_eq!(
        deserialize_grid(&payload, &catalog()).expect("deserialize"),
        planned_grid()
    );
}
