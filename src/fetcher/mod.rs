//! Page fetching from the remote open-data source

use crate::Record;
use async_trait::async_trait;

pub mod data_gov_http;
pub mod resilient;

pub use data_gov_http::DataGovClient;
pub use resilient::ResilientFetcher;

/// Errors building a page request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Page size of zero
    #[error("page size must be positive")]
    ZeroPageSize,

    /// Request would read past the configured ceiling
    #[error("offset {offset} + limit {limit} exceeds ceiling {ceiling}")]
    BeyondCeiling {
        /// Requested offset
        offset: u64,
        /// Requested page size
        limit: u64,
        /// Hard ceiling
        ceiling: u64,
    },
}

/// Server-side field filter, sent as `filters[<field>]=<value>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFilter {
    /// Field name on the remote side (e.g. "commodity")
    pub field: String,
    /// Exact value to match
    pub value: String,
}

/// One paginated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    offset: u64,
    limit: u64,
    filter: Option<EntityFilter>,
}

impl PageRequest {
    /// Build a request, refusing one that reads past `ceiling`
    pub fn new(
        offset: u64,
        limit: u64,
        filter: Option<EntityFilter>,
        ceiling: u64,
    ) -> Result<Self, RequestError> {
        if limit == 0 {
            return Err(RequestError::ZeroPageSize);
        }
        match offset.checked_add(limit) {
            Some(end) if end <= ceiling => Ok(Self {
                offset,
                limit,
                filter,
            }),
            _ => Err(RequestError::BeyondCeiling {
                offset,
                limit,
                ceiling,
            }),
        }
    }

    /// Offset of the first record
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Page size
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Optional entity filter
    pub fn filter(&self) -> Option<&EntityFilter> {
        self.filter.as_ref()
    }

    /// Query parameters other than the credential
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("format".to_string(), "json".to_string()),
            ("limit".to_string(), self.limit.to_string()),
            ("offset".to_string(), self.offset.to_string()),
        ];
        if let Some(filter) = &self.filter {
            params.push((format!("filters[{}]", filter.field), filter.value.clone()));
        }
        params
    }
}

/// Result of a single attempt against the remote source.
///
/// Retry logic dispatches on these variants; all non-success variants are
/// treated as transient.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Page fetched, possibly empty
    Success(Vec<Record>),
    /// Non-200 status or transport failure
    RemoteError {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Error detail for logs
        message: String,
    },
    /// Body did not have the expected `records` array
    ParseError(String),
    /// Request timed out
    Timeout,
}

impl FetchOutcome {
    /// Short label for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::RemoteError { .. } => "remote_error",
            Self::ParseError(_) => "parse_error",
            Self::Timeout => "timeout",
        }
    }
}

/// A paginated source of records
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Issue one request. Must not retry; failures are reported as outcomes.
    async fn fetch_page(&self, request: &PageRequest) -> FetchOutcome;
}
