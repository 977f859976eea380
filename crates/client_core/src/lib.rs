pub mod build_file;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod grid_store;
pub mod interaction;
pub mod optimizer;
pub mod persistence;
pub mod recommended_build;
pub mod shake;
pub mod share;
pub mod tech_annotations;

pub use build_file::{build_file_name, load_build, save_build, BuildFile};
pub use catalog::CatalogClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_settings, prepare_database_url, Settings};
pub use context::{resolve_platform, LaunchContext};
pub use error::{BuildFileError, CatalogError, ShareError, SolverError};
pub use grid_store::{GridSnapshot, GridStore};
pub use interaction::{
    CellEvent, CellInteractionController, Disposition, EventOutcome, Gesture, InteractionConfig,
    Key, Modifiers,
};
pub use optimizer::{
    HttpSolverClient, OptimizeOutcome, Optimizer, SharedGridStore, SolverClient, Telemetry,
    TelemetryEvent, TracingTelemetry,
};
pub use persistence::StoreSync;
pub use recommended_build::{apply_recommended_build, ModuleCatalog};
pub use shake::ShakeSignal;
pub use share::{apply_shared_grid, deserialize_grid, serialize_grid, share_url};
pub use tech_annotations::{BonusStatus, TechAnnotation, TechAnnotationStore, TechBonus};
