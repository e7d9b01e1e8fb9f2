use crate::config::{
    DEFAULT_ADJUSTMENT_FACTOR, DEFAULT_COUNTRY_LABEL, DEFAULT_NATIONAL_FILENAME, DEFAULT_NEAREST_K,
    DEFAULT_REGIONAL_FILENAME, INPUT_EXTENSIONS,
};
use crate::core::ConfigProvider;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: String,
}

/// `type` 為 csv/json/file 時讀取本機檔案，api 時呼叫 HTTP 端點
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub r#type: String,
    pub observations: Option<String>,
    pub municipalities: Option<String>,
    pub endpoint: Option<String>,
    pub municipalities_endpoint: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    pub services: Option<Vec<String>>,
    pub nearest_k: Option<usize>,
    pub regional_adjustment_factor: Option<f64>,
    pub seed: Option<u64>,
    /// `[min, max]`; samples outside are rejected. Unset keeps every sample.
    pub plausible_range: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    pub split_by_region: Option<bool>,
    /// Empty string disables the country wrapper.
    pub country_label: Option<String>,
    pub filenames: Option<FilenameConfig>,
    pub compression: Option<CompressionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilenameConfig {
    pub national: Option<String>,
    pub regional: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
}

fn env_var_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"\$\{([^}]+)\}").unwrap())
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${API_KEY})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> String {
        env_var_pattern()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;

        match self.source.r#type.as_str() {
            "csv" | "json" | "file" => {
                let observations =
                    validation::validate_required_field("source.observations", &self.source.observations)?;
                validation::validate_path("source.observations", observations)?;
                let mut inputs = vec![observations.clone()];
                if let Some(municipalities) = &self.source.municipalities {
                    validation::validate_path("source.municipalities", municipalities)?;
                    inputs.push(municipalities.clone());
                }
                validation::validate_file_extensions("source", &inputs, &INPUT_EXTENSIONS)?;
            }
            "api" => {
                let endpoint =
                    validation::validate_required_field("source.endpoint", &self.source.endpoint)?;
                validation::validate_url("source.endpoint", endpoint)?;
                if let Some(url) = &self.source.municipalities_endpoint {
                    validation::validate_url("source.municipalities_endpoint", url)?;
                }
                if let Some(timeout) = self.source.timeout_seconds {
                    validation::validate_range("source.timeout_seconds", timeout, 1, 3600)?;
                }
            }
            other => {
                return Err(EtlError::InvalidConfigValueError {
                    field: "source.type".to_string(),
                    value: other.to_string(),
                    reason: "Supported source types: csv, json, file, api".to_string(),
                })
            }
        }

        validation::validate_path("load.output_path", &self.load.output_path)?;
        validation::validate_positive_number("pricing.nearest_k", self.nearest_k(), 1)?;
        validation::validate_adjustment_factor(
            "pricing.regional_adjustment_factor",
            self.regional_adjustment_factor(),
        )?;
        validation::validate_services("pricing.services", self.services())?;
        if let Some(range) = self.plausible_range() {
            validation::validate_price_range("pricing.plausible_range", range)?;
        }

        validation::validate_path("load.filenames.national", self.national_filename())?;
        if self.split_by_region() {
            validation::validate_region_template("load.filenames.regional", self.regional_filename())?;
        }

        if let Some(compression) = &self.load.compression {
            if compression.enabled {
                validation::validate_non_empty_string("load.compression.filename", &compression.filename)?;
            }
        }

        Ok(())
    }

    /// 取得監控設定
    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.monitoring.as_ref().and_then(|m| m.log_level.as_deref())
    }
}

impl ConfigProvider for TomlConfig {
    fn services(&self) -> &[String] {
        self.pricing.services.as_deref().unwrap_or(&[])
    }

    fn nearest_k(&self) -> usize {
        self.pricing.nearest_k.unwrap_or(DEFAULT_NEAREST_K)
    }

    fn regional_adjustment_factor(&self) -> f64 {
        self.pricing
            .regional_adjustment_factor
            .unwrap_or(DEFAULT_ADJUSTMENT_FACTOR)
    }

    fn seed(&self) -> Option<u64> {
        self.pricing.seed
    }

    fn plausible_range(&self) -> Option<(f64, f64)> {
        self.pricing.plausible_range.map(|[min, max]| (min, max))
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn split_by_region(&self) -> bool {
        self.load.split_by_region.unwrap_or(false)
    }

    fn country_label(&self) -> Option<&str> {
        match self.load.country_label.as_deref() {
            None => Some(DEFAULT_COUNTRY_LABEL),
            Some(label) if label.trim().is_empty() => None,
            Some(label) => Some(label.trim()),
        }
    }

    fn national_filename(&self) -> &str {
        self.load
            .filenames
            .as_ref()
            .and_then(|f| f.national.as_deref())
            .unwrap_or(DEFAULT_NATIONAL_FILENAME)
    }

    fn regional_filename(&self) -> &str {
        self.load
            .filenames
            .as_ref()
            .and_then(|f| f.regional.as_deref())
            .unwrap_or(DEFAULT_REGIONAL_FILENAME)
    }

    fn bundle_filename(&self) -> Option<&str> {
        self.load
            .compression
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c.filename.as_str())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
