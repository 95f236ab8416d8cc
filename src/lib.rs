pub mod climo;
pub mod config;
pub mod derive;
pub mod diagram;
pub mod error;
pub mod field;
pub mod metadata;
pub mod render;
pub mod report;
pub mod season;
pub mod stats;
pub mod store;
pub mod taylor;
pub mod vertical;
pub mod visualize;

// Re-export commonly used types for the binary and tests
pub use config::{DiagConfig, DiagnosticsHost};
pub use derive::{DerivedVariable, Resolver};
pub use error::{Result, TaylorError};
pub use field::Field;
pub use metadata::{AttributeValue, Dimension, Variable, ZarrMetadata};
pub use report::{Reporter, RunReport};
pub use season::Season;
pub use stats::{TaylorStats, Weighting, taylor_stats, taylor_stats_with_weights};
pub use store::ZarrStore;
pub use taylor::{RunOptions, SeasonResults, StatsTable, TaylorRun, VARIABLES};
