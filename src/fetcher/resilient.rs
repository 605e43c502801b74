//! Retrying wrapper around a [`PageSource`]
//!
//! A page is attempted up to `max_attempts` times, each failed attempt
//! followed by a `base^attempt` second wait. With long recovery enabled a failed round is followed by
//! a cooldown and a second round, and a failed second round by a final
//! cooldown. Whatever happens, the caller gets a (possibly empty) page.

use crate::fetcher::{FetchOutcome, PageRequest, PageSource};
use crate::ingest::config::RetryPolicy;
use crate::shutdown::SharedShutdown;
use crate::Record;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Which retry round is running, for log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    Initial,
    AfterCooldown,
}

impl Round {
    fn label(self) -> &'static str {
        match self {
            Round::Initial => "initial",
            Round::AfterCooldown => "after_cooldown",
        }
    }
}

/// Fetcher that absorbs every transient failure
pub struct ResilientFetcher<S> {
    source: S,
    policy: RetryPolicy,
    shutdown: Option<SharedShutdown>,
}

impl<S: PageSource> ResilientFetcher<S> {
    /// Wrap a source with a retry policy
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            shutdown: None,
        }
    }

    /// Abort waits early when shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// The wrapped source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The retry policy in force
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch one page. Never fails: exhausted retries give an empty page.
    pub async fn fetch(&self, request: &PageRequest) -> Vec<Record> {
        if let Some(records) = self.retry_round(request, Round::Initial).await {
            return records;
        }

        let Some(recovery) = self.policy.long_recovery else {
            error!(
                offset = request.offset(),
                attempts = self.policy.max_attempts,
                "Retries exhausted, treating page as empty"
            );
            return Vec::new();
        };

        warn!(
            offset = request.offset(),
            cooldown_secs = recovery.first_cooldown.as_secs(),
            "Source unstable, cooling down before another retry round"
        );
        if !self.pause(recovery.first_cooldown).await {
            return Vec::new();
        }

        if let Some(records) = self.retry_round(request, Round::AfterCooldown).await {
            return records;
        }

        error!(
            offset = request.offset(),
            cooldown_secs = recovery.final_cooldown.as_secs(),
            "Source still failing, cooling down before skipping page"
        );
        self.pause(recovery.final_cooldown).await;
        Vec::new()
    }

    /// Run one round of attempts. `None` means every attempt failed.
    async fn retry_round(&self, request: &PageRequest, round: Round) -> Option<Vec<Record>> {
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            let outcome = self.source.fetch_page(request).await;
            let kind = outcome.kind();

            match outcome {
                FetchOutcome::Success(records) => {
                    debug!(
                        offset = request.offset(),
                        attempt,
                        records = records.len(),
                        "Page fetched"
                    );
                    return Some(records);
                }
                FetchOutcome::RemoteError { status, message } => {
                    debug!(offset = request.offset(), ?status, %message, "Remote error");
                }
                FetchOutcome::ParseError(message) => {
                    debug!(offset = request.offset(), %message, "Unparseable response body");
                }
                FetchOutcome::Timeout => {}
            }

            let wait = self.policy.backoff(attempt);
            let message = if attempt == max_attempts {
                "Fetch failed, retry round exhausted"
            } else {
                "Fetch failed, retrying after backoff"
            };
            warn!(
                offset = request.offset(),
                attempt,
                max_attempts,
                round = round.label(),
                outcome = kind,
                wait_secs = wait.as_secs(),
                "{message}"
            );
            if !self.pause(wait).await {
                return None;
            }
        }

        None
    }

    /// Sleep, unless shutdown is requested first. Returns `false` on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        match &self.shutdown {
            Some(shutdown) => {
                if shutdown.is_shutdown_requested() {
                    return false;
                }
                tokio::select! {
                    _ = tokio::time::sleep(duration) => true,
                    _ = shutdown.wait_for_shutdown() => false,
                }
            }
            None => {
                tokio::time::sleep(duration).await;
                true
            }
        }
    }
}
