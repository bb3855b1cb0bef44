use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::{CredentialSource, ServiceAccountAuth};
use super::{RemoteTable, SheetsError, UpdateAck};
use crate::shared::config::GoogleConfig;

pub const DEFAULT_API_BASE_URL: &str = "https://sheets.googleapis.com";

/// HTTP-клиент для Google Sheets API v4 (values.get / values.update)
pub struct SheetsApiClient {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<ServiceAccountAuth>,
}

impl SheetsApiClient {
    pub fn new(client: reqwest::Client, base_url: &str, auth: Arc<ServiceAccountAuth>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// Загружает ключ из источника и собирает клиент
    pub fn connect(source: &dyn CredentialSource, config: &GoogleConfig) -> anyhow::Result<Self> {
        tracing::info!("Loading Google credentials from {}", source.describe());
        let key = source
            .load()
            .with_context(|| format!("cannot load credentials from {}", source.describe()))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to create HTTP client")?;

        let auth = ServiceAccountAuth::new(&key, config.token_uri.as_deref(), client.clone())?;
        tracing::info!("Google Sheets client ready for {}", key.client_email);
        Ok(Self::new(client, &config.api_base_url, Arc::new(auth)))
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(range)
        )
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SheetsError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!("Google Sheets API request failed: {} {}", status, body);
        Err(SheetsError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

// ============================================================================
// Request/Response structures для Sheets API
// ============================================================================

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct ValueRangeBody<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Deserialize)]
struct UpdateValuesResponse {
    #[serde(rename = "updatedRange", default)]
    updated_range: String,
    #[serde(rename = "updatedCells", default)]
    updated_cells: u32,
}

fn value_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RemoteTable for SheetsApiClient {
    async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        let token = self.auth.access_token().await?;
        tracing::debug!("GET values {}", range);

        let response = self
            .client
            .get(self.values_url(spreadsheet_id, range))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = Self::check(response).await?;

        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| SheetsError::Decode(format!("values of {}: {}", range, e)))?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(value_to_string).collect())
            .collect())
    }

    async fn update_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<Option<String>>>,
    ) -> Result<UpdateAck, SheetsError> {
        let token = self.auth.access_token().await?;
        tracing::debug!("PUT values {} ({} rows)", range, values.len());

        let body = ValueRangeBody {
            range,
            major_dimension: "ROWS",
            values,
        };
        let response = self
            .client
            .put(self.values_url(spreadsheet_id, range))
            .bearer_auth(token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let ack: UpdateValuesResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::Decode(format!("update of {}: {}", range, e)))?;
        Ok(UpdateAck {
            updated_range: ack.updated_range,
            updated_cells: ack.updated_cells,
        })
    }
}
