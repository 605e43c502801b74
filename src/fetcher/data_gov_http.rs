//! HTTP page source for the data.gov.in resource API
//!
//! One GET per call, no retries. Every failure is mapped to a
//! [`FetchOutcome`] variant so the caller decides what to do with it.

use crate::fetcher::{FetchOutcome, PageRequest, PageSource};
use crate::ingest::config::{ApiKey, IngestConfig};
use crate::Record;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Longest error body excerpt kept for logs
const MAX_ERROR_BODY: usize = 200;

/// Response body of the resource endpoint. Everything but `records` is ignored.
#[derive(Debug, Deserialize)]
struct PageBody {
    records: Vec<Record>,
}

/// HTTP client for one data.gov.in resource
pub struct DataGovClient {
    client: Client,
    url: String,
    api_key: ApiKey,
}

impl DataGovClient {
    /// Create a client from the ingestion config
    pub fn new(config: &IngestConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("agmarknet-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: resource_url(&config.base_url, &config.resource_id),
            api_key: config.api_key.clone(),
        })
    }

    /// Resource endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PageSource for DataGovClient {
    async fn fetch_page(&self, request: &PageRequest) -> FetchOutcome {
        let mut params = vec![("api-key".to_string(), self.api_key.expose().to_string())];
        params.extend(request.query_params());

        debug!(
            offset = request.offset(),
            limit = request.limit(),
            filter = ?request.filter().map(|f| &f.value),
            "GET resource page"
        );

        let response = match self.client.get(&self.url).query(&params).send().await {
            Ok(response) => response,
            Err(e) => return transport_outcome(e),
        };

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return FetchOutcome::RemoteError {
                status: Some(status.as_u16()),
                message: excerpt(&body),
            };
        }

        match response.text().await {
            Ok(body) => parse_page_body(&body),
            Err(e) => transport_outcome(e),
        }
    }
}

/// Build the resource endpoint URL
pub fn resource_url(base_url: &str, resource_id: &str) -> String {
    format!("{}/resource/{}", base_url.trim_end_matches('/'), resource_id)
}

/// Decode a 200 response body into records
pub fn parse_page_body(body: &str) -> FetchOutcome {
    match serde_json::from_str::<PageBody>(body) {
        Ok(page) => FetchOutcome::Success(page.records),
        Err(e) => FetchOutcome::ParseError(e.to_string()),
    }
}

/// Map a reqwest error, stripping the URL so the key never reaches the logs
fn transport_outcome(error: reqwest::Error) -> FetchOutcome {
    if error.is_timeout() {
        return FetchOutcome::Timeout;
    }
    let status = error.status().map(|s| s.as_u16());
    FetchOutcome::RemoteError {
        status,
        message: error.without_url().to_string(),
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}
