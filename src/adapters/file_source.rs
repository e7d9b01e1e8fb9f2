use crate::adapters::decode_rows;
use crate::domain::model::{MunicipalityRecord, ObservationRecord, RawPrice, SourceRows};
use crate::domain::ports::ObservationSource;
use crate::utils::error::{EtlError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CSV layout of an observation row; the price stays text until aggregation.
#[derive(Debug, Deserialize)]
struct CsvObservationRow {
    city: Option<String>,
    #[serde(alias = "region")]
    state: Option<String>,
    service: Option<String>,
    price: Option<String>,
}

impl From<CsvObservationRow> for ObservationRecord {
    fn from(row: CsvObservationRow) -> Self {
        Self {
            city: row.city,
            state: row.state,
            service: row.service,
            price: row
                .price
                .filter(|p| !p.trim().is_empty())
                .map(RawPrice::Text),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CsvMunicipalityRow {
    city: Option<String>,
    #[serde(alias = "region", alias = "state_name")]
    state: Option<String>,
}

impl From<CsvMunicipalityRow> for MunicipalityRecord {
    fn from(row: CsvMunicipalityRow) -> Self {
        Self {
            city: row.city,
            state: row.state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Csv,
    Json,
}

fn file_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Ok(FileFormat::Csv),
        Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(FileFormat::Json),
        _ => Err(EtlError::InvalidConfigValueError {
            field: "source".to_string(),
            value: path.display().to_string(),
            reason: "Input files must have a .csv or .json extension".to_string(),
        }),
    }
}

/// 逐列解析 CSV，無法解析的列記錄後略過並計數
fn read_csv_rows<R, T>(bytes: &[u8], what: &str) -> Result<SourceRows<T>>
where
    R: DeserializeOwned + Into<T>,
{
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut rows = Vec::new();
    let mut skipped = 0;
    for (i, result) in reader.deserialize::<R>().enumerate() {
        match result {
            Ok(row) => rows.push(row.into()),
            Err(e) => {
                tracing::warn!("⚠️ Skipping {} CSV row #{}: {}", what, i + 1, e);
                skipped += 1;
            }
        }
    }
    Ok(SourceRows::new(rows, skipped))
}

/// Reads observations (and optionally the municipality list) from local files.
#[derive(Debug, Clone)]
pub struct FileSource {
    observations: PathBuf,
    municipalities: Option<PathBuf>,
}

impl FileSource {
    pub fn new(observations: impl Into<PathBuf>, municipalities: Option<impl Into<PathBuf>>) -> Self {
        Self {
            observations: observations.into(),
            municipalities: municipalities.map(Into::into),
        }
    }

    async fn read(path: &Path) -> Result<Vec<u8>> {
        tracing::debug!("Reading {}", path.display());
        Ok(tokio::fs::read(path).await?)
    }
}

#[async_trait::async_trait]
impl ObservationSource for FileSource {
    async fn municipalities(&self) -> Result<SourceRows<MunicipalityRecord>> {
        let Some(path) = &self.municipalities else {
            return Ok(SourceRows::default());
        };
        let format = file_format(path)?;
        let bytes = Self::read(path).await?;
        match format {
            FileFormat::Csv => read_csv_rows::<CsvMunicipalityRow, _>(&bytes, "municipality"),
            FileFormat::Json => decode_rows(serde_json::from_slice(&bytes)?, "municipality"),
        }
    }

    async fn observations(&self) -> Result<SourceRows<ObservationRecord>> {
        let format = file_format(&self.observations)?;
        let bytes = Self::read(&self.observations).await?;
        match format {
            FileFormat::Csv => read_csv_rows::<CsvObservationRow, _>(&bytes, "observation"),
            FileFormat::Json => decode_rows(serde_json::from_slice(&bytes)?, "observation"),
        }
    }
}
