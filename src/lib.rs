pub mod error;
mod harvester;
pub mod oai;

use std::path::{Path, PathBuf};

pub use error::{HarvestError, PageError, SinkError};
pub use harvester::{
    AttemptState, CsvSink, HarvestOptions, HarvestState, HarvestSummary, Harvester,
    HarvesterArgs, OaiPageFetcher, PageFetcher, Pause, RecordSink, RetryBudget, StopReason,
    TokioPause, fetch::list_records_url,
};
pub use oai::{DCTERMS_FIELDS, Field, FieldMapping, OaiConfig, PageResponse, Record};

/// Expand `~` and environment variables in a user supplied path.
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
