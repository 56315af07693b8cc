pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::TomlConfig;

pub use adapters::{SqliteBagReader, SqliteBagWriter, WriterOptions};
pub use core::{engine::FilterEngine, pipeline::BagFilterPipeline};
pub use utils::error::{BagFilterError, Result};
