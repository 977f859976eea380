use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::{
    error::BuildFileError,
    grid_store::{GridSnapshot, GridStore},
    tech_annotations::{BonusStatus, TechBonus},
};

pub const BUILD_FILE_EXTENSION: &str = "nms";
pub const MAX_BUILD_FILE_BYTES: usize = 10 * 1024 * 1024;

const RESERVED_FILE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// A saved planner session. `checksum` is the hex SHA-256 of the four state
/// sections serialized together, in field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildFile {
    pub name: String,
    #[serde(rename = "shipType")]
    pub ship_type: String,
    pub timestamp: i64,
    pub checksum: String,
    #[serde(rename = "gridState")]
    pub grid_state: Value,
    #[serde(rename = "techState")]
    pub tech_state: Value,
    #[serde(rename = "bonusState")]
    pub bonus_state: Value,
    #[serde(rename = "moduleState")]
    pub module_state: Value,
}

#[derive(Serialize)]
struct ChecksumPayload<'a> {
    #[serde(rename = "gridState")]
    grid_state: &'a Value,
    #[serde(rename = "techState")]
    tech_state: &'a Value,
    #[serde(rename = "bonusState")]
    bonus_state: &'a Value,
    #[serde(rename = "moduleState")]
    module_state: &'a Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TechState {
    #[serde(default)]
    bonuses: BTreeMap<String, TechBonus>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BonusState {
    #[serde(rename = "bonusStatus", default)]
    bonus_status: BTreeMap<String, BonusStatus>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ModuleState {
    #[serde(rename = "moduleSelections", default)]
    module_selections: BTreeMap<String, Vec<String>>,
}

impl BuildFile {
    pub fn capture(store: &GridStore, name: &str, timestamp: i64) -> Result<Self, BuildFileError> {
        let annotations = store.annotations();
        let bonuses = annotations.bonuses();
        let bonus_status = bonuses
            .iter()
            .filter_map(|(tech, bonus)| bonus.bonus_status.map(|status| (tech.clone(), status)))
            .collect();

        let grid_state = to_section(&store.snapshot())?;
        let tech_state = to_section(&TechState { bonuses })?;
        let bonus_state = to_section(&BonusState { bonus_status })?;
        let module_state = to_section(&ModuleState {
            module_selections: annotations.module_selections(),
        })?;
        let checksum = compute_checksum(&grid_state, &tech_state, &bonus_state, &module_state)?;

        Ok(Self {
            name: name.to_string(),
            ship_type: store.platform().to_string(),
            timestamp,
            checksum,
            grid_state,
            tech_state,
            bonus_state,
            module_state,
        })
    }

    pub fn to_json(&self) -> Result<String, BuildFileError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| BuildFileError::InvalidStructure(err.to_string()))
    }

    /// Checks size, shape, integrity and platform before anything is
    /// trusted.
    pub fn parse(raw: &[u8], valid_platforms: &[String]) -> Result<Self, BuildFileError> {
        if raw.is_empty() {
            return Err(BuildFileError::Empty);
        }
        if raw.len() > MAX_BUILD_FILE_BYTES {
            return Err(BuildFileError::TooLarge {
                size: raw.len(),
                limit: MAX_BUILD_FILE_BYTES,
            });
        }

        let document: Value = serde_json::from_slice(raw)
            .map_err(|err| BuildFileError::InvalidJson(err.to_string()))?;
        let file: Self = serde_json::from_value(document)
            .map_err(|err| BuildFileError::InvalidStructure(err.to_string()))?;
        for (section, value) in [
            ("gridState", &file.grid_state),
            ("techState", &file.tech_state),
            ("bonusState", &file.bonus_state),
            ("moduleState", &file.module_state),
        ] {
            if !value.is_object() {
                return Err(BuildFileError::InvalidStructure(format!(
                    "'{section}' is not an object"
                )));
            }
        }

        let expected = compute_checksum(
            &file.grid_state,
            &file.tech_state,
            &file.bonus_state,
            &file.module_state,
        )?;
        if expected != file.checksum.to_ascii_lowercase() {
            return Err(BuildFileError::ChecksumMismatch);
        }

        if !valid_platforms.iter().any(|platform| platform == &file.ship_type) {
            return Err(BuildFileError::UnsupportedPlatform(file.ship_type));
        }
        Ok(file)
    }

    /// Restores the file into `store`, switching platform first when the
    /// file was saved for another one. Nothing changes unless every section
    /// decodes.
    pub fn apply(&self, store: &mut GridStore) -> Result<(), BuildFileError> {
        let grid: GridSnapshot = from_section("gridState", &self.grid_state)?;
        if !grid.grid.is_well_formed() {
            return Err(BuildFileError::InvalidStructure(
                "'gridState' grid rows do not match its width".into(),
            ));
        }
        if let Some(pos) = grid.grid.first_inconsistent() {
            return Err(BuildFileError::InvalidStructure(format!(
                "'gridState' cell [{}, {}] breaks the cell invariants",
                pos.row, pos.col
            )));
        }
        let tech: TechState = from_section("techState", &self.tech_state)?;
        let _: BonusState = from_section("bonusState", &self.bonus_state)?;
        let modules: ModuleState = from_section("moduleState", &self.module_state)?;

        let shared = store.is_shared_grid();
        if store.platform() != self.ship_type {
            store.switch_platform(self.ship_type.clone(), grid.grid.clone());
        }
        store.restore_snapshot(grid);
        store.set_is_shared_grid(shared);
        let annotations = store.annotations_mut();
        annotations.clear_all();
        annotations.restore_bonuses(tech.bonuses);
        annotations.restore_module_selections(modules.module_selections);

        info!(name = %self.name, platform = %self.ship_type, "loaded build file");
        Ok(())
    }
}

/// Saves the current session under `name`, stamped with the current time.
pub fn save_build(store: &GridStore, name: &str) -> Result<String, BuildFileError> {
    let file = BuildFile::capture(store, name, chrono::Utc::now().timestamp_millis())?;
    info!(name = %name, platform = %file.ship_type, "saved build file");
    file.to_json()
}

pub fn load_build(
    store: &mut GridStore,
    raw: &[u8],
    valid_platforms: &[String],
) -> Result<BuildFile, BuildFileError> {
    let file = BuildFile::parse(raw, valid_platforms)?;
    file.apply(store)?;
    Ok(file)
}

/// File name for a build: characters most file systems reject are dropped,
/// reserved device names fall back to `build`.
pub fn build_file_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .filter(|c| !c.is_control() && !"<>:\"/\\|?*`$&;(){}#!".contains(*c))
        .collect();
    let trimmed_len = sanitized.trim_end_matches(|c: char| c.is_whitespace() || c == '.').len();
    sanitized.truncate(trimmed_len);
    let sanitized: String = sanitized.chars().take(255).collect();

    let reserved = RESERVED_FILE_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(&sanitized));
    let stem = if sanitized.is_empty() || reserved {
        "build"
    } else {
        sanitized.as_str()
    };
    format!("{stem}.{BUILD_FILE_EXTENSION}")
}

fn compute_checksum(
    grid_state: &Value,
    tech_state: &Value,
    bonus_state: &Value,
    module_state: &Value,
) -> Result<String, BuildFileError> {
    let payload = serde_json::to_vec(&ChecksumPayload {
        grid_state,
        tech_state,
        bonus_state,
        module_state,
    })
    .map_err(|err| BuildFileError::InvalidStructure(err.to_string()))?;
    Ok(format!("{:x}", Sha256::digest(&payload)))
}

fn to_section<T: Serialize>(section: &T) -> Result<Value, BuildFileError> {
    serde_json::to_value(section).map_err(|err| BuildFileError::InvalidStructure(err.to_string()))
}

fn from_section<T: DeserializeOwned>(name: &str, value: &Value) -> Result<T, BuildFileError> {
    serde_json::from_value(value.clone())
        .map_err(|err| BuildFileError::InvalidStructure(format!("'{name}': {err}")))
}

#[cfg(test)]
#[path = "tests/build_file_tests.rs"]
mod tests;
