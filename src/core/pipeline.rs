use crate::core::aggregate::ObservationAggregator;
use crate::core::assembler::assemble;
use crate::core::interpolation::InterpolationEngine;
use crate::core::{
    CollectedData, ConfigProvider, ObservationSource, Pipeline, RunStats, Storage,
    TransformResult,
};
use crate::domain::services::ServiceCatalog;
use crate::utils::error::{EtlError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const MANIFEST_FILENAME: &str = "run_manifest.json";

#[derive(Debug, Serialize)]
struct RunManifest<'a> {
    generated_at: String,
    services: &'a [String],
    nearest_k: usize,
    regional_adjustment_factor: f64,
    seed: Option<u64>,
    plausible_range: Option<(f64, f64)>,
    files: &'a [String],
    stats: &'a RunStats,
}

/// 州名轉為檔名：空白與路徑分隔符換成底線，開頭的點也換掉，避免寫出輸出目錄
pub fn region_file_stem(region: &str) -> Result<String> {
    let region = region.trim();
    if region.is_empty() || region == "." || region == ".." {
        return Err(EtlError::ProcessingError {
            message: format!("Region '{}' cannot be used as a file name", region),
        });
    }

    let mapped: String = region
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect();
    let dots = mapped.len() - mapped.trim_start_matches('.').len();
    Ok(format!("{}{}", "_".repeat(dots), &mapped[dots..]))
}

pub fn regional_file_path(template: &str, region: &str) -> Result<String> {
    Ok(template.replace("{region}", &region_file_stem(region)?))
}

pub struct PricingPipeline<S: Storage, O: ObservationSource, C: ConfigProvider> {
    storage: S,
    source: O,
    config: C,
}

impl<S: Storage, O: ObservationSource, C: ConfigProvider> PricingPipeline<S, O, C> {
    pub fn new(storage: S, source: O, config: C) -> Self {
        Self {
            storage,
            source,
            config,
        }
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    fn catalog(&self) -> Result<ServiceCatalog> {
        if self.config.services().is_empty() {
            return Ok(ServiceCatalog::reference());
        }
        ServiceCatalog::new(self.config.services().iter().cloned())
    }

    fn output_location(&self, file: &str) -> String {
        format!("{}/{}", self.config.output_path().trim_end_matches('/'), file)
    }
}

#[async_trait::async_trait]
impl<S: Storage, O: ObservationSource, C: ConfigProvider> Pipeline for PricingPipeline<S, O, C> {
    async fn extract(&self) -> Result<CollectedData> {
        let municipalities = self.source.municipalities().await?;
        tracing::debug!("Loaded {} municipality reference rows", municipalities.len());

        let observations = self.source.observations().await?;
        tracing::debug!("Loaded {} raw observations", observations.len());

        Ok(CollectedData {
            rows_skipped: municipalities.skipped + observations.skipped,
            municipalities: municipalities.rows,
            observations: observations.rows,
        })
    }

    async fn transform(&self, data: CollectedData) -> Result<TransformResult> {
        let catalog = self.catalog()?;
        tracing::info!(
            "🔧 Pricing {} services (nearest_k = {}, adjustment = {})",
            catalog.len(),
            self.config.nearest_k(),
            self.config.regional_adjustment_factor()
        );

        let mut aggregator =
            ObservationAggregator::new(catalog).with_plausible_range(self.config.plausible_range());
        aggregator.add_all(&data);
        let (mut table, aggregation) = aggregator.finish()?;

        // 所有觀測值就緒後才開始插值
        let engine = InterpolationEngine::new(
            self.config.nearest_k(),
            self.config.regional_adjustment_factor(),
        );
        let interpolation = engine.interpolate_table(&mut table, self.config.seed());

        let document = assemble(&table).with_country(self.config.country_label().map(String::from));

        Ok(TransformResult {
            document,
            stats: RunStats {
                aggregation,
                interpolation,
            },
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let mut files: Vec<(String, Vec<u8>)> = Vec::new();

        if self.config.split_by_region() {
            // 不同州名可能對應到同一檔名 (例如 "New York" 與 "New_York")
            let mut owners: HashMap<String, String> = HashMap::new();
            for (region, document) in result.document.split_by_region() {
                let path = regional_file_path(self.config.regional_filename(), &region)?;
                if let Some(previous) = owners.insert(path.clone(), region.clone()) {
                    return Err(EtlError::ProcessingError {
                        message: format!(
                            "Regions '{}' and '{}' both map to output file {}",
                            previous, region, path
                        ),
                    });
                }
                files.push((path, serde_json::to_vec_pretty(&document)?));
            }
        } else {
            files.push((
                self.config.national_filename().to_string(),
                serde_json::to_vec_pretty(&result.document)?,
            ));
        }

        for (path, data) in &files {
            tracing::debug!("Writing {} ({} bytes)", path, data.len());
            self.storage.write_file(path, data).await?;
        }

        let written: Vec<String> = files.iter().map(|(path, _)| path.clone()).collect();
        let catalog = self.catalog()?;
        let manifest = RunManifest {
            generated_at: chrono::Utc::now().to_rfc3339(),
            services: catalog.names(),
            nearest_k: self.config.nearest_k(),
            regional_adjustment_factor: self.config.regional_adjustment_factor(),
            seed: self.config.seed(),
            plausible_range: self.config.plausible_range(),
            files: &written,
            stats: &result.stats,
        };
        self.storage
            .write_file(MANIFEST_FILENAME, &serde_json::to_vec_pretty(&manifest)?)
            .await?;

        if let Some(bundle) = self.config.bundle_filename() {
            let zip_data = {
                let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
                for (path, data) in &files {
                    zip.start_file::<_, ()>(path.as_str(), FileOptions::default())?;
                    zip.write_all(data)?;
                }
                let cursor = zip.finish()?;
                cursor.into_inner()
            };
            tracing::debug!("Writing ZIP bundle ({} bytes)", zip_data.len());
            self.storage.write_file(bundle, &zip_data).await?;
            tracing::info!("📦 Bundled {} documents into {}", files.len(), bundle);
        }

        tracing::info!("💾 Wrote {} pricing documents", files.len());

        if self.config.split_by_region() {
            Ok(self.config.output_path().to_string())
        } else {
            Ok(self.output_location(self.config.national_filename()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{MunicipalityRecord, ObservationRecord, RawPrice, SourceRows};
    use crate::utils::error::EtlError;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }

        async fn file_names(&self) -> Vec<String> {
            let files = self.files.lock().await;
            let mut names: Vec<String> = files.keys().cloned().collect();
            names.sort();
            names
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                EtlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    struct MockSource {
        municipalities: Vec<MunicipalityRecord>,
        observations: Vec<ObservationRecord>,
    }

    #[async_trait::async_trait]
    impl ObservationSource for MockSource {
        async fn municipalities(&self) -> Result<SourceRows<MunicipalityRecord>> {
            Ok(SourceRows::new(self.municipalities.clone(), 0))
        }

        async fn observations(&self) -> Result<SourceRows<ObservationRecord>> {
            // 模擬來源端無法解碼的一列
            Ok(SourceRows::new(self.observations.clone(), 1))
        }
    }

    struct MockConfig {
        services: Vec<String>,
        split_by_region: bool,
        bundle: Option<String>,
        country: Option<String>,
    }

    impl MockConfig {
        fn new() -> Self {
            Self {
                services: vec!["A".to_string(), "B".to_string()],
                split_by_region: false,
                bundle: None,
                country: None,
            }
        }
    }

    impl ConfigProvider for MockConfig {
        fn services(&self) -> &[String] {
            &self.services
        }

        fn nearest_k(&self) -> usize {
            1
        }

        fn regional_adjustment_factor(&self) -> f64 {
            1.1
        }

        fn seed(&self) -> Option<u64> {
            Some(7)
        }

        fn output_path(&self) -> &str {
            "test_output"
        }

        fn split_by_region(&self) -> bool {
            self.split_by_region
        }

        fn country_label(&self) -> Option<&str> {
            self.country.as_deref()
        }

        fn national_filename(&self) -> &str {
            "pricing.json"
        }

        fn regional_filename(&self) -> &str {
            "{region}/pricing_{region}.json"
        }

        fn bundle_filename(&self) -> Option<&str> {
            self.bundle.as_deref()
        }
    }

    fn obs(city: &str, state: &str, service: &str, price: f64) -> ObservationRecord {
        ObservationRecord {
            city: Some(city.to_string()),
            state: Some(state.to_string()),
            service: Some(service.to_string()),
            price: Some(RawPrice::Amount(price)),
        }
    }

    fn source() -> MockSource {
        MockSource {
            municipalities: vec![MunicipalityRecord {
                city: Some("Empty Town".to_string()),
                state: Some("New York".to_string()),
            }],
            observations: vec![
                obs("X", "R1", "A", 100.0),
                obs("Y", "R1", "A", 200.0),
                obs("Y", "R1", "B", 50.0),
            ],
        }
    }

    #[tokio::test]
    async fn test_transform_fills_gaps() {
        let pipeline = PricingPipeline::new(MockStorage::new(), source(), MockConfig::new());
        let data = pipeline.extract().await.unwrap();
        assert_eq!(data.observations.len(), 3);

        let result = pipeline.transform(data).await.unwrap();
        let x = result.document.get("R1", "X").unwrap();
        assert_eq!(x.get("A").unwrap().price, Some(100.0));
        assert!(!x.get("A").unwrap().interpolation_used);
        assert_eq!(x.get("B").unwrap().price, Some(55.0));
        assert!(x.get("B").unwrap().interpolation_used);

        assert!(result.document.get("New York", "Empty Town").is_some());
        assert_eq!(result.stats.aggregation.municipalities, 3);
        assert_eq!(result.stats.aggregation.rows_rejected, 1);
    }

    #[tokio::test]
    async fn test_load_national_document() {
        let storage = MockStorage::new();
        let mut config = MockConfig::new();
        config.country = Some("United States".to_string());
        let pipeline = PricingPipeline::new(storage.clone(), source(), config);

        let data = pipeline.extract().await.unwrap();
        let result = pipeline.transform(data).await.unwrap();
        let output = pipeline.load(result).await.unwrap();

        assert_eq!(output, "test_output/pricing.json");
        assert_eq!(
            storage.file_names().await,
            vec!["pricing.json".to_string(), MANIFEST_FILENAME.to_string()]
        );

        let bytes = storage.get_file("pricing.json").await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value["United States"]["R1"]["X"]["services"]["B"],
            serde_json::json!({"price": 55.0, "interpolation_used": true})
        );

        let manifest: serde_json::Value =
            serde_json::from_slice(&storage.get_file(MANIFEST_FILENAME).await.unwrap()).unwrap();
        assert_eq!(manifest["nearest_k"], serde_json::json!(1));
        assert_eq!(manifest["services"], serde_json::json!(["A", "B"]));
        assert_eq!(
            manifest["stats"]["aggregation"]["municipalities"],
            serde_json::json!(3)
        );
        assert_eq!(manifest["files"], serde_json::json!(["pricing.json"]));
    }

    #[tokio::test]
    async fn test_load_by_region_with_bundle() {
        let storage = MockStorage::new();
        let mut config = MockConfig::new();
        config.split_by_region = true;
        config.bundle = Some("bundle.zip".to_string());
        let pipeline = PricingPipeline::new(storage.clone(), source(), config);

        let data = pipeline.extract().await.unwrap();
        let result = pipeline.transform(data).await.unwrap();
        let output = pipeline.load(result).await.unwrap();
        assert_eq!(output, "test_output");

        let names = storage.file_names().await;
        assert!(names.contains(&"R1/pricing_R1.json".to_string()));
        assert!(names.contains(&"New_York/pricing_New_York.json".to_string()));

        let zip_bytes = storage.get_file("bundle.zip").await.unwrap();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).unwrap();
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn test_regional_file_path() {
        assert_eq!(
            regional_file_path("{region}/US_{region}_PRICING.json", "North Carolina").unwrap(),
            "North_Carolina/US_North_Carolina_PRICING.json"
        );
    }

    #[test]
    fn test_region_stem_stays_inside_output_dir() {
        assert_eq!(region_file_stem("a/b").unwrap(), "a_b");
        assert_eq!(region_file_stem("a\\b").unwrap(), "a_b");
        assert_eq!(region_file_stem("../etc").unwrap(), "___etc");
        assert_eq!(region_file_stem(".hidden").unwrap(), "_hidden");
        assert!(region_file_stem("..").is_err());
        assert!(region_file_stem(".").is_err());
        assert!(region_file_stem("  ").is_err());

        let path = regional_file_path("{region}/US_{region}.json", "../../x").unwrap();
        assert!(!path.split('/').any(|part| part == ".."));
    }

    #[tokio::test]
    async fn test_dot_region_rejected_before_writing() {
        let storage = MockStorage::new();
        let mut config = MockConfig::new();
        config.split_by_region = true;
        let source = MockSource {
            municipalities: Vec::new(),
            observations: vec![obs("C", "..", "A", 1.0)],
        };
        let pipeline = PricingPipeline::new(storage.clone(), source, config);

        let data = pipeline.extract().await.unwrap();
        let result = pipeline.transform(data).await.unwrap();
        let outcome = pipeline.load(result).await;

        assert!(matches!(outcome, Err(EtlError::ProcessingError { .. })));
        assert!(storage.file_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_colliding_region_files_rejected() {
        let storage = MockStorage::new();
        let mut config = MockConfig::new();
        config.split_by_region = true;
        config.bundle = Some("bundle.zip".to_string());
        let source = MockSource {
            municipalities: Vec::new(),
            observations: vec![
                obs("C1", "New York", "A", 100.0),
                obs("C2", "New_York", "A", 200.0),
            ],
        };
        let pipeline = PricingPipeline::new(storage.clone(), source, config);

        let data = pipeline.extract().await.unwrap();
        let result = pipeline.transform(data).await.unwrap();
        match pipeline.load(result).await {
            Err(EtlError::ProcessingError { message }) => {
                assert!(message.contains("New York"));
                assert!(message.contains("New_York"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // 衝突時不寫出任何檔案，避免覆蓋
        assert!(storage.file_names().await.is_empty());
    }
}
