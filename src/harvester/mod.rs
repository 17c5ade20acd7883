mod cli;
pub mod fetch;
pub mod retry;
pub mod sink;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

pub use cli::HarvesterArgs;
pub use fetch::{OaiPageFetcher, PageFetcher};
pub use retry::{AttemptState, Pause, RetryBudget, TokioPause};
pub use sink::{CsvSink, RecordSink};

use crate::error::{HarvestError, PageError};
use crate::oai::{FieldMapping, PageResponse, parse_list_records};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Server page limit. A shorter page is the last one.
    pub page_size: usize,
    pub max_attempts: u32,
    /// Pause before every attempt.
    pub request_delay: Duration,
    /// Pause after a failed attempt when retries remain.
    pub cooldown: Duration,
    /// Safety valve, unbounded when `None`.
    pub max_pages: Option<u64>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_delay: DEFAULT_REQUEST_DELAY,
            cooldown: DEFAULT_COOLDOWN,
            max_pages: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A page came back shorter than the page size.
    FinalPage,
    /// `max_pages` was reached.
    PageLimit,
}

#[derive(Debug, Clone)]
pub struct HarvestSummary {
    pub pages: u64,
    pub records: usize,
    pub stop: StopReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Pagination state for a single run. Never persisted.
#[derive(Debug)]
pub struct HarvestState {
    pub page: u64,
    pub resumption_token: Option<String>,
    pub records_written: usize,
    pub complete: bool,
}

impl HarvestState {
    fn new() -> Self {
        Self {
            page: 1,
            resumption_token: None,
            records_written: 0,
            complete: false,
        }
    }
}

pub struct Harvester<'a, F, P> {
    fetcher: &'a F,
    pause: &'a P,
    fields: &'a [FieldMapping],
    options: HarvestOptions,
}

impl<'a, F: PageFetcher, P: Pause> Harvester<'a, F, P> {
    pub fn new(
        fetcher: &'a F,
        pause: &'a P,
        fields: &'a [FieldMapping],
        options: HarvestOptions,
    ) -> Self {
        Self {
            fetcher,
            pause,
            fields,
            options,
        }
    }

    /// Harvest every page into `sink`, stopping at the first short page.
    pub async fn run<S: RecordSink>(&self, sink: &mut S) -> Result<HarvestSummary, HarvestError> {
        let started_at = Utc::now();
        let mut state = HarvestState::new();

        info!("Beginning harvest. This could take several hours.");

        let stop = loop {
            if let Some(max_pages) = self.options.max_pages
                && state.page > max_pages
            {
                warn!("Reached page limit of {}, stopping harvest", max_pages);
                break StopReason::PageLimit;
            }

            info!("Page number: {}", state.page);

            let response = self
                .fetch_page(state.page, state.resumption_token.as_deref())
                .await?;
            let count = response.records.len();

            sink.append(&response.records)
                .map_err(|source| HarvestError::Sink {
                    page: state.page,
                    source,
                })?;
            state.records_written += count;

            info!("{} records returned", count);

            if count < self.options.page_size {
                info!("This is the final page. Data fetch is finished.");
                state.complete = true;
                break StopReason::FinalPage;
            }

            if response.resumption_token.is_none() {
                warn!(
                    "Page {} was full but carried no resumption token",
                    state.page
                );
            }
            state.resumption_token = response.resumption_token;
            state.page += 1;
        };

        let pages = if state.complete {
            state.page
        } else {
            state.page - 1
        };

        Ok(HarvestSummary {
            pages,
            records: state.records_written,
            stop,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Fetch and parse one page, retrying with a cooldown until the budget is spent.
    async fn fetch_page(
        &self,
        page: u64,
        token: Option<&str>,
    ) -> Result<PageResponse, HarvestError> {
        let budget = RetryBudget::new(self.options.max_attempts);
        let mut state = budget.start();

        loop {
            state = match state {
                AttemptState::Attempting(attempt) => {
                    info!(
                        "Attempt {} - {} retries remaining",
                        attempt,
                        budget.remaining_after(attempt)
                    );
                    self.pause.pause(self.options.request_delay).await;
                    let outcome = self.attempt(token).await;
                    budget.after_attempt(attempt, outcome)
                }
                AttemptState::Retrying { attempt, error } => {
                    warn!("Attempt {} on page {} failed: {}", attempt, page, error);
                    info!(
                        "Pausing for {} seconds, then retrying the same request",
                        self.options.cooldown.as_secs()
                    );
                    self.pause.pause(self.options.cooldown).await;
                    AttemptState::Attempting(attempt + 1)
                }
                AttemptState::Success(response) => return Ok(response),
                AttemptState::Exhausted(source) => {
                    error!("Ran out of retries on page {}: {}", page, source);
                    return Err(HarvestError::ExhaustedRetries { page, source });
                }
            };
        }
    }

    async fn attempt(&self, token: Option<&str>) -> Result<PageResponse, PageError> {
        let body = self.fetcher.fetch(token).await?;
        parse_list_records(&body, self.fields)
    }
}
