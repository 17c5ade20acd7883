use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Url};

use crate::error::PageError;
use crate::oai::OaiConfig;

const LIST_RECORDS_VERB: &str = "ListRecords";

/// Issues one `ListRecords` request per call. No retries here.
pub trait PageFetcher: Sync {
    fn fetch<'a>(&'a self, token: Option<&'a str>) -> BoxFuture<'a, Result<Vec<u8>, PageError>>;
}

pub struct OaiPageFetcher {
    client: Client,
    config: OaiConfig,
}

impl OaiPageFetcher {
    pub fn new(config: OaiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        // Fail fast on a bad endpoint rather than on every attempt
        list_records_url(&config, None)?;
        Ok(Self { client, config })
    }
}

impl PageFetcher for OaiPageFetcher {
    fn fetch<'a>(&'a self, token: Option<&'a str>) -> BoxFuture<'a, Result<Vec<u8>, PageError>> {
        Box::pin(async move {
            let url = list_records_url(&self.config, token)?;

            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| PageError::FetchFailed(e.to_string()))?
                .error_for_status()
                .map_err(|e| PageError::FetchFailed(e.to_string()))?;

            let body = response
                .bytes()
                .await
                .map_err(|e| PageError::FetchFailed(e.to_string()))?;

            Ok(body.to_vec())
        })
    }
}

/// First page selects the metadata format, later pages carry only the token.
pub fn list_records_url(config: &OaiConfig, token: Option<&str>) -> Result<Url, PageError> {
    let mut url = Url::parse(&config.endpoint).map_err(|e| {
        PageError::FetchFailed(format!("invalid endpoint {}: {e}", config.endpoint))
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("verb", LIST_RECORDS_VERB);
        match token {
            Some(token) => query.append_pair("resumptionToken", token),
            None => query.append_pair("metadataPrefix", &config.metadata_prefix),
        };
    }

    Ok(url)
}
