use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("cell [{row}, {col}] is outside the {width}x{height} grid")]
    CellOutOfRange {
        row: usize,
        col: usize,
        width: usize,
        height: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildValidationError {
    #[error("recommended build is not an object")]
    NotAnObject,
    #[error("recommended build is missing a string 'title'")]
    MissingTitle,
    #[error("recommended build 'layout' is not an array")]
    LayoutNotArray,
    #[error("recommended build layout row {row} is not an array")]
    RowNotArray { row: usize },
    #[error("recommended build layout cell [{row}, {col}] is neither null nor an object")]
    CellNotObject { row: usize, col: usize },
    #[error("recommended build layout cell [{row}, {col}] has an invalid '{field}'")]
    InvalidField {
        row: usize,
        col: usize,
        field: &'static str,
    },
    #[error("recommended build could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseValidationError {
    #[error("optimization response is not an object")]
    NotAnObject,
    #[error("optimization response is missing a string 'solve_method'")]
    MissingSolveMethod,
    #[error("optimization response grid is malformed: {0}")]
    MalformedGrid(String),
    #[error("optimization response field '{0}' is not numeric")]
    NonNumericField(&'static str),
    #[error("optimization response cell [{row}, {col}] breaks the cell invariants")]
    InconsistentCell { row: usize, col: usize },
}
