use thiserror::Error;

/// Failure of a single fetch+parse attempt. Both variants are retried.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("parse failed: {0}")]
    ParseFailed(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fatal harvest errors. Rows written before the failure stay in the sink.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("ran out of retries on page {page}, data could not be gathered: {source}")]
    ExhaustedRetries {
        page: u64,
        #[source]
        source: PageError,
    },

    #[error("failed to write records for page {page}: {source}")]
    Sink {
        page: u64,
        #[source]
        source: SinkError,
    },
}

impl HarvestError {
    pub fn page(&self) -> u64 {
        match self {
            HarvestError::ExhaustedRetries { page, .. } | HarvestError::Sink { page, .. } => *page,
        }
    }
}
