use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::oai::{DEFAULT_ENDPOINT, DEFAULT_METADATA_PREFIX, OaiConfig};

use super::HarvestOptions;

#[derive(Debug, Args)]
pub struct HarvesterArgs {
    /// OAI endpoint url
    #[arg(long, default_value = DEFAULT_ENDPOINT, env = "OAI_ENDPOINT")]
    pub endpoint: String,

    /// OAI metadata prefix
    #[arg(short, long, default_value = DEFAULT_METADATA_PREFIX, env = "METADATA_PREFIX")]
    pub metadata_prefix: String,

    /// CSV output file (truncated at start)
    #[arg(short, long, default_value = "obit_data.csv", env = "OUTPUT_FILE")]
    pub output: PathBuf,

    /// Records per page served by the endpoint; a shorter page ends the harvest
    #[arg(long, default_value_t = 50, env = "PAGE_SIZE", value_parser = clap::value_parser!(u64).range(1..))]
    pub page_size: u64,

    /// Attempts per page before giving up
    #[arg(long, default_value_t = 3, env = "MAX_ATTEMPTS", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Pause before every request
    #[arg(long, default_value_t = 5, env = "REQUEST_DELAY_SECONDS")]
    pub request_delay_seconds: u64,

    /// Pause after a failed request before retrying it
    #[arg(long, default_value_t = 300, env = "COOLDOWN_SECONDS")]
    pub cooldown_seconds: u64,

    /// Stop after this many pages
    #[arg(long, env = "MAX_PAGES")]
    pub max_pages: Option<u64>,

    /// Per-request timeout
    #[arg(long, default_value_t = 60, env = "OAI_TIMEOUT")]
    pub timeout_seconds: u64,
}

impl HarvesterArgs {
    pub fn oai_config(&self) -> OaiConfig {
        OaiConfig {
            endpoint: self.endpoint.clone(),
            metadata_prefix: self.metadata_prefix.clone(),
            timeout_seconds: self.timeout_seconds,
        }
    }

    pub fn options(&self) -> HarvestOptions {
        HarvestOptions {
            page_size: self.page_size as usize,
            max_attempts: self.max_attempts,
            request_delay: Duration::from_secs(self.request_delay_seconds),
            cooldown: Duration::from_secs(self.cooldown_seconds),
            max_pages: self.max_pages,
        }
    }
}
