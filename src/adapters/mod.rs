// Adapters layer: concrete observation sources (local files, HTTP feed).
// Storage backends live under src/config next to the configuration that selects them.

pub mod file_source;
pub mod http_source;

pub use file_source::FileSource;
pub use http_source::HttpSource;

use crate::config::toml_config::SourceConfig;
use crate::domain::model::{MunicipalityRecord, ObservationRecord, SourceRows};
use crate::domain::ports::ObservationSource;
use crate::utils::error::{EtlError, Result};
use serde::de::DeserializeOwned;

/// Decodes a JSON array element by element; undecodable rows are logged and skipped.
pub(crate) fn decode_rows<T: DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<SourceRows<T>> {
    let items = match value {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(EtlError::ProcessingError {
                message: format!(
                    "Expected a JSON array of {} records, got {}",
                    what,
                    json_kind(&other)
                ),
            })
        }
    };

    let total = items.len();
    let rows: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value(item) {
            Ok(row) => Some(row),
            Err(e) => {
                tracing::warn!("⚠️ Skipping {} record #{}: {}", what, i + 1, e);
                None
            }
        })
        .collect();

    let skipped = total - rows.len();
    if skipped > 0 {
        tracing::warn!("Decoded {}/{} {} records", rows.len(), total, what);
    }
    Ok(SourceRows::new(rows, skipped))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Source picked at runtime from `[source] type`.
pub enum SourceAdapter {
    File(FileSource),
    Http(HttpSource),
}

impl SourceAdapter {
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        match config.r#type.as_str() {
            "csv" | "json" | "file" => {
                let observations = config.observations.clone().ok_or_else(|| {
                    EtlError::MissingConfigError {
                        field: "source.observations".to_string(),
                    }
                })?;
                Ok(SourceAdapter::File(FileSource::new(
                    observations,
                    config.municipalities.clone(),
                )))
            }
            "api" => {
                let endpoint =
                    config
                        .endpoint
                        .clone()
                        .ok_or_else(|| EtlError::MissingConfigError {
                            field: "source.endpoint".to_string(),
                        })?;
                let mut source = HttpSource::new(endpoint)
                    .with_headers(config.headers.clone().unwrap_or_default());
                if let Some(url) = &config.municipalities_endpoint {
                    source = source.with_municipalities_endpoint(url.clone());
                }
                if let Some(timeout) = config.timeout_seconds {
                    source = source.with_timeout(std::time::Duration::from_secs(timeout));
                }
                Ok(SourceAdapter::Http(source))
            }
            other => Err(EtlError::InvalidConfigValueError {
                field: "source.type".to_string(),
                value: other.to_string(),
                reason: "Supported source types: csv, json, file, api".to_string(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ObservationSource for SourceAdapter {
    async fn municipalities(&self) -> Result<SourceRows<MunicipalityRecord>> {
        match self {
            SourceAdapter::File(source) => source.municipalities().await,
            SourceAdapter::Http(source) => source.municipalities().await,
        }
    }

    async fn observations(&self) -> Result<SourceRows<ObservationRecord>> {
        match self {
            SourceAdapter::File(source) => source.observations().await,
            SourceAdapter::Http(source) => source.observations().await,
        }
    }
}
