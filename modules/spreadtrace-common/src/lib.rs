pub mod config;
pub mod error;
pub mod text;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;

pub use config::{load_config, AnalysisConfig, EdgeWeighting};
pub use error::{Result, SpreadTraceError};
pub use types::*;
