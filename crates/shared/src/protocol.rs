use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{domain::Grid, error::ResponseValidationError};

/// Solve method the solver reports when the requested tech's pattern cannot
/// be placed without a forced solve.
pub const PATTERN_NO_FIT: &str = "Pattern No Fit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeRequest {
    #[serde(rename = "ship")]
    pub platform: String,
    pub tech: String,
    #[serde(rename = "available_modules")]
    pub selected_module_ids: Vec<String>,
    pub grid: Grid,
    pub forced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeResponse {
    pub solve_method: String,
    #[serde(default)]
    pub grid: Option<Grid>,
    #[serde(default)]
    pub max_bonus: Option<f64>,
    #[serde(default)]
    pub solved_bonus: Option<f64>,
}

impl OptimizeResponse {
    pub fn is_pattern_no_fit(&self) -> bool {
        self.solve_method == PATTERN_NO_FIT && self.grid.is_none()
    }

    /// Validates the untyped body before decoding so contract drift surfaces
    /// as a typed error instead of a partially filled response.
    pub fn from_value(value: Value) -> Result<Self, ResponseValidationError> {
        let body = value.as_object().ok_or(ResponseValidationError::NotAnObject)?;

        if !body.get("solve_method").is_some_and(Value::is_string) {
            return Err(ResponseValidationError::MissingSolveMethod);
        }
        for field in ["max_bonus", "solved_bonus"] {
            if body.get(field).is_some_and(|v| !v.is_number()) {
                return Err(ResponseValidationError::NonNumericField(field));
            }
        }
        if let Some(grid) = body.get("grid").filter(|grid| !grid.is_null()) {
            let grid = grid
                .as_object()
                .ok_or_else(|| ResponseValidationError::MalformedGrid("not an object".into()))?;
            if !grid.get("cells").is_some_and(Value::is_array) {
                return Err(ResponseValidationError::MalformedGrid(
                    "'cells' is not an array".into(),
                ));
            }
            if !grid.get("width").is_some_and(Value::is_u64) {
                return Err(ResponseValidationError::MalformedGrid(
                    "'width' is not a number".into(),
                ));
            }
        }

        let response: Self = serde_json::from_value(value)
            .map_err(|err| ResponseValidationError::MalformedGrid(err.to_string()))?;
        if let Some(grid) = &response.grid {
            if !grid.is_well_formed() {
                return Err(ResponseValidationError::MalformedGrid(format!(
                    "expected {} rows of {} cells",
                    grid.height, grid.width
                )));
            }
            if let Some(pos) = grid.first_inconsistent() {
                return Err(ResponseValidationError::InconsistentCell {
                    row: pos.row,
                    col: pos.col,
                });
            }
        }
        Ok(response)
    }
}

/// Body of a non-2xx solver response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
