use crate::domain::model::{
    CollectedData, MunicipalityRecord, ObservationRecord, SourceRows, TransformResult,
};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Where raw price samples come from. Implementations only read; no retries.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn municipalities(&self) -> Result<SourceRows<MunicipalityRecord>>;
    async fn observations(&self) -> Result<SourceRows<ObservationRecord>>;
}

pub trait ConfigProvider: Send + Sync {
    fn services(&self) -> &[String];
    fn nearest_k(&self) -> usize;
    fn regional_adjustment_factor(&self) -> f64;
    /// Fixed seed for neighbor sampling; `None` draws from OS entropy.
    fn seed(&self) -> Option<u64>;
    /// Inclusive bounds a raw sample must fall in; `None` keeps every sample.
    fn plausible_range(&self) -> Option<(f64, f64)> {
        None
    }
    fn output_path(&self) -> &str;
    fn split_by_region(&self) -> bool;
    fn country_label(&self) -> Option<&str>;
    fn national_filename(&self) -> &str;
    fn regional_filename(&self) -> &str;
    /// ZIP bundle file name when compression is enabled.
    fn bundle_filename(&self) -> Option<&str>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<CollectedData>;
    async fn transform(&self, data: CollectedData) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}
