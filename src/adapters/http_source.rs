use crate::adapters::decode_rows;
use crate::domain::model::{MunicipalityRecord, ObservationRecord, SourceRows};
use crate::domain::ports::ObservationSource;
use crate::utils::error::{EtlError, Result};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

/// Fetches a pre-collected observation feed with a single GET per resource.
pub struct HttpSource {
    client: Client,
    endpoint: String,
    municipalities_endpoint: Option<String>,
    headers: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl HttpSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            municipalities_endpoint: None,
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn with_municipalities_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.municipalities_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        let mut request = self.client.get(url);

        // 添加自定義標頭
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!("Making API request to: {}", url);
        let response = request.send().await?;
        tracing::debug!("API response status: {}", response.status());

        if !response.status().is_success() {
            return Err(EtlError::ProcessingError {
                message: format!("{} returned HTTP {}", url, response.status()),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl ObservationSource for HttpSource {
    async fn municipalities(&self) -> Result<SourceRows<MunicipalityRecord>> {
        match &self.municipalities_endpoint {
            Some(url) => decode_rows(self.fetch_json(url).await?, "municipality"),
            None => Ok(SourceRows::default()),
        }
    }

    async fn observations(&self) -> Result<SourceRows<ObservationRecord>> {
        decode_rows(self.fetch_json(&self.endpoint).await?, "observation")
    }
}
