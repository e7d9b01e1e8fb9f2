pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, toml_config::TomlConfig};

pub use adapters::{FileSource, HttpSource, SourceAdapter};
pub use core::{etl::EtlEngine, pipeline::PricingPipeline};
pub use utils::error::{EtlError, Result};
