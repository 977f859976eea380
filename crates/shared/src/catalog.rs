use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BuildValidationError;

/// A module as the catalog and grid definitions describe it. Every field is
/// optional so the same shape serves full catalog entries, sparse grid
/// definition slots, and partial bulk-write overlays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleEntry {
    pub id: Option<String>,
    pub tech: Option<String>,
    pub label: Option<String>,
    pub image: Option<String>,
    pub bonus: Option<f64>,
    pub value: Option<f64>,
    pub adjacency: Option<String>,
    pub adjacency_bonus: Option<f64>,
    pub sc_eligible: Option<bool>,
    pub supercharged: Option<bool>,
    pub active: Option<bool>,
    #[serde(rename = "type")]
    pub module_type: Option<String>,
    pub checked: Option<bool>,
}

impl ModuleEntry {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechTreeItem {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub module_count: u32,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    #[serde(default, rename = "type")]
    pub tech_type: Option<String>,
}

/// Server-provided template for platforms whose layout is constrained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDefinition {
    pub grid: Vec<Vec<Option<ModuleEntry>>>,
    #[serde(rename = "gridFixed", default)]
    pub grid_fixed: bool,
    #[serde(rename = "superchargedFixed", default)]
    pub supercharged_fixed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildCell {
    pub tech: Option<String>,
    pub module: Option<String>,
    pub supercharged: Option<bool>,
    pub active: Option<bool>,
    pub adjacency_bonus: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedBuild {
    pub title: String,
    pub layout: Vec<Vec<Option<BuildCell>>>,
}

impl RecommendedBuild {
    /// Checks the raw JSON shape before trusting it, then decodes it.
    pub fn from_value(value: &Value) -> Result<Self, BuildValidationError> {
        validate_recommended_build(value)?;
        serde_json::from_value(value.clone())
            .map_err(|err| BuildValidationError::Decode(err.to_string()))
    }
}

pub fn validate_recommended_build(value: &Value) -> Result<(), BuildValidationError> {
    let build = value.as_object().ok_or(BuildValidationError::NotAnObject)?;

    if !build.get("title").is_some_and(Value::is_string) {
        return Err(BuildValidationError::MissingTitle);
    }
    let layout = build
        .get("layout")
        .and_then(Value::as_array)
        .ok_or(BuildValidationError::LayoutNotArray)?;

    for (row_index, row) in layout.iter().enumerate() {
        let row = row
            .as_array()
            .ok_or(BuildValidationError::RowNotArray { row: row_index })?;
        for (col_index, cell) in row.iter().enumerate() {
            if cell.is_null() {
                continue;
            }
            let at = |field: &'static str| BuildValidationError::InvalidField {
                row: row_index,
                col: col_index,
                field,
            };
            let cell = cell.as_object().ok_or(BuildValidationError::CellNotObject {
                row: row_index,
                col: col_index,
            })?;
            for field in ["tech", "module"] {
                if let Some(v) = cell.get(field) {
                    if !(v.is_string() || v.is_null()) {
                        return Err(at(field));
                    }
                }
            }
            for field in ["supercharged", "active"] {
                if cell.get(field).is_some_and(|v| !v.is_boolean()) {
                    return Err(at(field));
                }
            }
            if cell.get("adjacency_bonus").is_some_and(|v| !v.is_number()) {
                return Err(at("adjacency_bonus"));
            }
        }
    }

    Ok(())
}

/// A recommended build the catalog shipped but which failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedBuild {
    pub index: usize,
    pub error: BuildValidationError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TechTree {
    pub categories: BTreeMap<String, Vec<TechTreeItem>>,
    pub grid_definition: Option<GridDefinition>,
    pub recommended_builds: Vec<RecommendedBuild>,
}

impl TechTree {
    /// Decodes a tech tree document. Category keys map to arrays of tech
    /// items; `grid_definition` and `recommended_builds` are reserved keys.
    /// Recommended builds are run through the same validation the
    /// applicator uses; the ones that fail are returned alongside the tree.
    pub fn from_value(value: Value) -> Result<(Self, Vec<RejectedBuild>), serde_json::Error> {
        let Value::Object(document) = value else {
            return Err(serde::de::Error::custom("tech tree must be a JSON object"));
        };

        let mut tree = Self::default();
        let mut rejected = Vec::new();
        for (key, entry) in document {
            match key.as_str() {
                "grid_definition" => {
                    if !entry.is_null() {
                        tree.grid_definition = Some(serde_json::from_value(entry)?);
                    }
                }
                "recommended_builds" => {
                    let builds = match entry {
                        Value::Array(builds) => builds,
                        Value::Null => Vec::new(),
                        _ => {
                            return Err(serde::de::Error::custom(
                                "recommended_builds must be an array",
                            ))
                        }
                    };
                    for (index, raw) in builds.iter().enumerate() {
                        match RecommendedBuild::from_value(raw) {
                            Ok(build) => tree.recommended_builds.push(build),
                            Err(error) => rejected.push(RejectedBuild { index, error }),
                        }
                    }
                }
                _ => {
                    if entry.is_array() {
                        tree.categories.insert(key, serde_json::from_value(entry)?);
                    }
                }
            }
        }
        Ok((tree, rejected))
    }

    pub fn techs(&self) -> impl Iterator<Item = &TechTreeItem> {
        self.categories.values().flatten()
    }

    pub fn tech(&self, key: &str) -> Option<&TechTreeItem> {
        self.techs().find(|item| item.key == key)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accepts_sparse_layout_with_nulls() {
        let raw = json!({
            "title": "Starter",
            "layout": [
                [null, {"tech": "shield", "module": "S1", "supercharged": true}],
                [{"tech": null, "module": null, "active": false, "adjacency_bonus": 1}]
            ]
        });
        let build = RecommendedBuild::from_value(&raw).expect("valid build");
        assert_eq!(build.layout[0][0], None);
        assert_eq!(
            build.layout[0][1].as_ref().and_then(|c| c.supercharged),
            Some(true)
        );
        assert_eq!(build.layout[1][0].as_ref().and_then(|c| c.active), Some(false));
    }

    #[test]
    fn rejects_missing_title_and_bad_fields() {
        assert_eq!(
            validate_recommended_build(&json!({"layout": []})),
            Err(BuildValidationError::MissingTitle)
        );
        assert_eq!(
            validate_recommended_build(&json!({"title": "t", "layout": {}})),
            Err(BuildValidationError::LayoutNotArray)
        );
        assert_eq!(
            validate_recommended_build(&json!({"title": "t", "layout": [[{"active": "yes"}]]})),
            Err(BuildValidationError::InvalidField {
                row: 0,
                col: 0,
                field: "active"
            })
        );
        assert_eq!(
            validate_recommended_build(&json!({"title": "t", "layout": [[null, 7]]})),
            Err(BuildValidationError::CellNotObject { row: 0, col: 1 })
        );
        assert_eq!(
            validate_recommended_build(&json!({"title": "t", "layout": [[{"tech": 3}]]})),
            Err(BuildValidationError::InvalidField {
                row: 0,
                col: 0,
                field: "tech"
            })
        );
    }

    #[test]
    fn tech_tree_splits_categories_definition_and_builds() {
        let raw = json!({
            "Defensive Systems": [
                {"key": "shield", "label": "Shield", "color": "sky", "module_count": 1,
                 "modules": [{"id": "S1", "tech": "shield", "label": "Shield", "bonus": 0.1}]}
            ],
            "grid_definition": {
                "grid": [[{}, {"id": "S1", "tech": "shield"}]],
                "gridFixed": true,
                "superchargedFixed": false
            },
            "recommended_builds": [
                {"title": "ok", "layout": [[null]]},
                {"layout": [[null]]}
            ]
        });

        let (tree, rejected) = TechTree::from_value(raw).expect("tech tree");
        assert_eq!(tree.tech("shield").map(|t| t.modules.len()), Some(1));
        let definition = tree.grid_definition.expect("definition");
        assert!(definition.grid_fixed);
        assert!(definition.grid[0][0].as_ref().is_some_and(ModuleEntry::is_empty));
        assert_eq!(tree.recommended_builds.len(), 1);
        assert_eq!(
            rejected,
            vec![RejectedBuild {
                index: 1,
                error: BuildValidationError::MissingTitle
            }]
        );
    }
}
