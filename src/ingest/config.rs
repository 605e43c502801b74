//! Ingestion configuration and retry constants

use crate::transform::CleaningOptions;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://api.data.gov.in";

/// "Current daily price of various commodities from various markets (Mandi)"
pub const DEFAULT_RESOURCE_ID: &str = "35985678-0d79-46b4-9ed6-6f13308a1d24";

/// Records per page. The API caps `limit` at a few thousand; 1000 keeps
/// responses small enough to survive flaky connections.
pub const DEFAULT_PAGE_SIZE: u64 = 1000;

/// Per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Attempts per retry round
pub const MAX_ATTEMPTS: u32 = 5;

/// Backoff base in seconds; the wait after failed attempt k is base^k.
pub const BACKOFF_BASE_SECS: u64 = 2;

/// Cooldown before the second retry round when long recovery is enabled
pub const FIRST_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Cooldown before giving up on an offset when long recovery is enabled
pub const FINAL_COOLDOWN: Duration = Duration::from_secs(15 * 60);

/// Delay between consecutive non-empty pages
pub const PAGE_DELAY: Duration = Duration::from_millis(300);

/// Global walk bound. The resource holds a few million rows.
pub const DEFAULT_MAX_OFFSET: u64 = 3_000_000;

/// Per-commodity walk bound
pub const DEFAULT_PER_ENTITY_MAX_OFFSET: u64 = 500_000;

/// Server-side filter field for commodity walks
pub const DEFAULT_ENTITY_FILTER_FIELD: &str = "commodity";

/// Calculate exponential backoff delay before retrying after `attempt` (1-based)
pub fn calculate_backoff(base_secs: u64, attempt: u32) -> Duration {
    Duration::from_secs(base_secs.saturating_pow(attempt))
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No API credential available
    #[error("API key missing: set DATA_GOV_API_KEY or pass --api-key")]
    MissingCredential,

    /// A setting is out of range or inconsistent with another
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// API credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a non-blank key
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::MissingCredential);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Raw key for the query string
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Extended recovery after a failed retry round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongRecovery {
    /// Sleep before the second round
    pub first_cooldown: Duration,
    /// Sleep after the second round, before giving up
    pub final_cooldown: Duration,
}

impl Default for LongRecovery {
    fn default() -> Self {
        Self {
            first_cooldown: FIRST_COOLDOWN,
            final_cooldown: FINAL_COOLDOWN,
        }
    }
}

/// Retry policy for a single page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per round
    pub max_attempts: u32,
    /// Backoff base in seconds
    pub backoff_base_secs: u64,
    /// Optional second round with cooldowns
    pub long_recovery: Option<LongRecovery>,
}

impl RetryPolicy {
    /// Wait before the retry that follows failed attempt `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(self.backoff_base_secs, attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff_base_secs: BACKOFF_BASE_SECS,
            long_recovery: None,
        }
    }
}

/// How the loop walks the remote dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStrategy {
    /// One cursor over the whole dataset, rows appended per commodity
    GlobalCursor {
        /// Last offset fetched (inclusive)
        max_offset: u64,
    },
    /// Commodities discovered up front, each walked to completion and
    /// written as one file
    PerEntity {
        /// Unfiltered pages sampled from offset 0 to discover commodities
        discovery_pages: u64,
        /// Last offset fetched per commodity (inclusive)
        per_entity_max_offset: u64,
    },
}

impl PaginationStrategy {
    /// Largest offset the strategy walks to
    pub fn max_offset(&self) -> u64 {
        match self {
            Self::GlobalCursor { max_offset } => *max_offset,
            Self::PerEntity {
                per_entity_max_offset,
                ..
            } => *per_entity_max_offset,
        }
    }
}

impl Default for PaginationStrategy {
    fn default() -> Self {
        Self::GlobalCursor {
            max_offset: DEFAULT_MAX_OFFSET,
        }
    }
}

/// Shape of the rows written to entity files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputProfile {
    /// Cleaned records
    #[default]
    Cleaned,
    /// Cleaned records plus lag, rolling mean and market id
    WithFeatures,
}

/// Everything the ingestion loop needs, built once at startup
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// API credential
    pub api_key: ApiKey,
    /// API host
    pub base_url: String,
    /// Resource (dataset) id
    pub resource_id: String,
    /// Records per page
    pub page_size: u64,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Retry policy per page
    pub retry: RetryPolicy,
    /// Pause between consecutive non-empty pages
    pub page_delay: Duration,
    /// Directory for per-commodity CSV files
    pub data_dir: PathBuf,
    /// Progress marker file
    pub progress_path: PathBuf,
    /// Pagination strategy
    pub strategy: PaginationStrategy,
    /// Remote field used to filter a commodity walk
    pub entity_filter_field: String,
    /// Cleaning rules
    pub cleaning: CleaningOptions,
    /// Output row shape
    pub profile: OutputProfile,
    /// Stop after this many units of work (pages or commodities)
    pub max_units: Option<u64>,
}

impl IngestConfig {
    /// Start a builder with the credential as found in the environment
    pub fn builder(api_key: Option<String>) -> IngestConfigBuilder {
        IngestConfigBuilder::new(api_key)
    }

    /// Hard ceiling for `offset + limit` of any request
    pub fn request_ceiling(&self) -> u64 {
        self.strategy.max_offset().saturating_add(self.page_size)
    }
}

/// Builder for [`IngestConfig`]
#[derive(Debug, Clone)]
pub struct IngestConfigBuilder {
    api_key: Option<String>,
    base_url: String,
    resource_id: String,
    page_size: u64,
    request_timeout: Duration,
    retry: RetryPolicy,
    page_delay: Duration,
    data_dir: PathBuf,
    progress_path: PathBuf,
    strategy: PaginationStrategy,
    entity_filter_field: String,
    cleaning: CleaningOptions,
    profile: OutputProfile,
    max_units: Option<u64>,
}

impl IngestConfigBuilder {
    fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            resource_id: DEFAULT_RESOURCE_ID.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            page_delay: PAGE_DELAY,
            data_dir: PathBuf::from("data/crops"),
            progress_path: PathBuf::from("data/progress.json"),
            strategy: PaginationStrategy::default(),
            entity_filter_field: DEFAULT_ENTITY_FILTER_FIELD.to_string(),
            cleaning: CleaningOptions::default(),
            profile: OutputProfile::default(),
            max_units: None,
        }
    }

    /// Set the API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the resource id
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    /// Set the page size
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the pause between pages
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Set the output directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the progress file path
    pub fn with_progress_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.progress_path = path.into();
        self
    }

    /// Set the pagination strategy
    pub fn with_strategy(mut self, strategy: PaginationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the remote filter field for commodity walks
    pub fn with_entity_filter_field(mut self, field: impl Into<String>) -> Self {
        self.entity_filter_field = field.into();
        self
    }

    /// Set the cleaning rules
    pub fn with_cleaning(mut self, cleaning: CleaningOptions) -> Self {
        self.cleaning = cleaning;
        self
    }

    /// Set the output profile
    pub fn with_profile(mut self, profile: OutputProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Stop after `units` pages or commodities
    pub fn with_max_units(mut self, units: Option<u64>) -> Self {
        self.max_units = units;
        self
    }

    /// Validate and build. The credential is checked first so a missing key
    /// fails before anything else is looked at.
    pub fn build(self) -> Result<IngestConfig, ConfigError> {
        let api_key = ApiKey::new(self.api_key.ok_or(ConfigError::MissingCredential)?)?;

        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page size must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_base_secs < 2 {
            return Err(ConfigError::Invalid(
                "backoff base must be at least 2 seconds".to_string(),
            ));
        }
        if let PaginationStrategy::PerEntity {
            discovery_pages, ..
        } = self.strategy
        {
            if discovery_pages == 0 {
                return Err(ConfigError::Invalid(
                    "discovery needs at least one page".to_string(),
                ));
            }
        }
        if matches!(self.strategy, PaginationStrategy::GlobalCursor { .. })
            && self.profile == OutputProfile::WithFeatures
        {
            return Err(ConfigError::Invalid(
                "derived features need the per-commodity strategy".to_string(),
            ));
        }
        if self.entity_filter_field.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "entity filter field cannot be empty".to_string(),
            ));
        }

        Ok(IngestConfig {
            api_key,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            resource_id: self.resource_id,
            page_size: self.page_size,
            request_timeout: self.request_timeout,
            retry: self.retry,
            page_delay: self.page_delay,
            data_dir: self.data_dir,
            progress_path: self.progress_path,
            strategy: self.strategy,
            entity_filter_field: self.entity_filter_field,
            cleaning: self.cleaning,
            profile: self.profile,
            max_units: self.max_units,
        })
    }
}
