pub mod cli;
pub mod toml_config;

pub const DEFAULT_NEAREST_K: usize = 5;
/// 預設假設鄰近地區生活成本高出 10%
pub const DEFAULT_ADJUSTMENT_FACTOR: f64 = 1.1;
pub const DEFAULT_COUNTRY_LABEL: &str = "United States";
pub const DEFAULT_NATIONAL_FILENAME: &str = "US_REAL_ESTATE_PHOTOGRAPHY_VIDEOGRAPHY_COMPLETE.json";
pub const DEFAULT_REGIONAL_FILENAME: &str =
    "{region}/US_{region}_REAL_ESTATE_PHOTOGRAPHY_VIDEOGRAPHY.json";
pub const INPUT_EXTENSIONS: [&str; 2] = ["csv", "json"];

#[cfg(feature = "cli")]
pub use cli_config::CliConfig;

#[cfg(feature = "cli")]
mod cli_config {
    use super::*;
    use crate::core::ConfigProvider;
    use crate::utils::error::{EtlError, Result};
    use crate::utils::validation::{self, Validate};
    use clap::Parser;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, Parser)]
    #[command(name = "media-pricing-etl")]
    #[command(about = "Aggregate and interpolate real-estate media service prices")]
    pub struct CliConfig {
        /// Observation file (.csv or .json) with city,state,service,price rows
        #[arg(long)]
        pub observations: String,

        /// Optional municipality list (.csv or .json) with city,state rows
        #[arg(long)]
        pub municipalities: Option<String>,

        #[arg(long, default_value = "./output")]
        pub output_path: String,

        /// Services to price, in output order (defaults to the reference ten)
        #[arg(long, value_delimiter = ',')]
        pub services: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_NEAREST_K)]
        pub nearest_k: usize,

        #[arg(long, default_value_t = DEFAULT_ADJUSTMENT_FACTOR)]
        pub adjustment_factor: f64,

        /// Seed for neighbor sampling; omit for a fresh draw every run
        #[arg(long)]
        pub seed: Option<u64>,

        /// Reject raw samples outside MIN,MAX (e.g. 50,5000)
        #[arg(long, value_delimiter = ',')]
        pub plausible_range: Option<Vec<f64>>,

        /// Write one document per region instead of a national one
        #[arg(long)]
        pub by_region: bool,

        /// Top-level key wrapping the regions; pass "" for none
        #[arg(long, default_value = DEFAULT_COUNTRY_LABEL)]
        pub country_label: String,

        /// Also bundle the written documents into this ZIP file
        #[arg(long)]
        pub bundle: Option<String>,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, help = "Log CPU and memory usage after each phase")]
        pub monitor: bool,

        #[arg(long, help = "Emit logs as JSON lines")]
        pub json_logs: bool,
    }

    impl ConfigProvider for CliConfig {
        fn services(&self) -> &[String] {
            &self.services
        }

        fn nearest_k(&self) -> usize {
            self.nearest_k
        }

        fn regional_adjustment_factor(&self) -> f64 {
            self.adjustment_factor
        }

        fn seed(&self) -> Option<u64> {
            self.seed
        }

        fn plausible_range(&self) -> Option<(f64, f64)> {
            match self.plausible_range.as_deref() {
                Some([min, max]) => Some((*min, *max)),
                _ => None,
            }
        }

        fn output_path(&self) -> &str {
            &self.output_path
        }

        fn split_by_region(&self) -> bool {
            self.by_region
        }

        fn country_label(&self) -> Option<&str> {
            let label = self.country_label.trim();
            (!label.is_empty()).then_some(label)
        }

        fn national_filename(&self) -> &str {
            DEFAULT_NATIONAL_FILENAME
        }

        fn regional_filename(&self) -> &str {
            DEFAULT_REGIONAL_FILENAME
        }

        fn bundle_filename(&self) -> Option<&str> {
            self.bundle.as_deref()
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            validation::validate_path("observations", &self.observations)?;
            let mut inputs = vec![self.observations.clone()];
            if let Some(municipalities) = &self.municipalities {
                validation::validate_path("municipalities", municipalities)?;
                inputs.push(municipalities.clone());
            }
            validation::validate_file_extensions("input files", &inputs, &INPUT_EXTENSIONS)?;
            validation::validate_path("output_path", &self.output_path)?;
            validation::validate_positive_number("nearest_k", self.nearest_k, 1)?;
            validation::validate_adjustment_factor("adjustment_factor", self.adjustment_factor)?;
            validation::validate_services("services", &self.services)?;
            if let Some(range) = &self.plausible_range {
                match range.as_slice() {
                    [min, max] => validation::validate_price_range("plausible_range", (*min, *max))?,
                    _ => {
                        return Err(EtlError::InvalidConfigValueError {
                            field: "plausible_range".to_string(),
                            value: format!("{:?}", range),
                            reason: "Expected exactly two values: MIN,MAX".to_string(),
                        })
                    }
                }
            }
            if let Some(bundle) = &self.bundle {
                validation::validate_non_empty_string("bundle", bundle)?;
            }
            Ok(())
        }
    }

}
