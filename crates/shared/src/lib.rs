pub mod catalog;
pub mod domain;
pub mod error;
pub mod protocol;

pub use catalog::{
    BuildCell, GridDefinition, ModuleEntry, RecommendedBuild, TechTree, TechTreeItem,
};
pub use domain::{Cell, CellPos, Grid, DEFAULT_GRID_HEIGHT, DEFAULT_GRID_WIDTH};
pub use protocol::{OptimizeRequest, OptimizeResponse, PATTERN_NO_FIT};
