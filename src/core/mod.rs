pub mod aggregate;
pub mod assembler;
pub mod etl;
pub mod interpolation;
pub mod neighbors;
pub mod outlier;
pub mod pipeline;
pub mod table;

pub use crate::domain::model::{CollectedData, PricingDocument, RunStats, TransformResult};
pub use crate::domain::ports::{ConfigProvider, ObservationSource, Pipeline, Storage};
pub use crate::utils::error::Result;
