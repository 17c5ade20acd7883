#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    env,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use obit_harvester::{PageError, PageFetcher, Pause, Record, RecordSink, SinkError};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

pub const METADATA_PREFIX: &str = "oai_dcterms";

static TEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// `ListRecords` body with records numbered `first..first + count`.
pub fn list_records_page(first: usize, count: usize, token: Option<&str>) -> String {
    let records = (first..first + count)
        .map(|n| {
            format!(
                r#"<record>
  <header><identifier>oai:obits:{n}</identifier><datestamp>2024-01-01</datestamp></header>
  <metadata>
    <dcterms:dcterms xmlns:dcterms="http://purl.org/dc/terms/">
      <dcterms:title>Record {n}</dcterms:title>
      <dcterms:publisher>Chattanooga Times Free Press</dcterms:publisher>
      <dcterms:date>1999-01-01</dcterms:date>
      <dcterms:identifier>id-{n}</dcterms:identifier>
    </dcterms:dcterms>
  </metadata>
</record>"#
            )
        })
        .collect::<String>();

    let token = match token {
        Some(token) => format!(r#"<resumptionToken cursor="{first}">{token}</resumptionToken>"#),
        None => String::new(),
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <responseDate>2024-01-01T00:00:00Z</responseDate>
  <request verb="ListRecords">https://example.org/oai</request>
  <ListRecords>{records}{token}</ListRecords>
</OAI-PMH>"#
    )
}

pub fn ok_page(first: usize, count: usize, token: Option<&str>) -> Result<Vec<u8>, PageError> {
    Ok(list_records_page(first, count, token).into_bytes())
}

pub fn fetch_failure() -> Result<Vec<u8>, PageError> {
    Err(PageError::FetchFailed("503 Service Unavailable".to_string()))
}

/// Replays canned responses in order and records the token of every request.
pub struct ScriptedFetcher {
    responses: Mutex<VecDeque<Result<Vec<u8>, PageError>>>,
    requests: Mutex<Vec<Option<String>>>,
}

impl ScriptedFetcher {
    pub fn new(responses: Vec<Result<Vec<u8>, PageError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Option<String>> {
        self.requests.lock().unwrap().clone()
    }
}

impl PageFetcher for ScriptedFetcher {
    fn fetch<'a>(&'a self, token: Option<&'a str>) -> BoxFuture<'a, Result<Vec<u8>, PageError>> {
        Box::pin(async move {
            self.requests
                .lock()
                .unwrap()
                .push(token.map(ToString::to_string));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PageError::FetchFailed("no scripted response".to_string())))
        })
    }
}

/// Records requested pauses without sleeping.
#[derive(Default)]
pub struct RecordingPause {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

impl Pause for RecordingPause {
    fn pause(&self, duration: Duration) -> BoxFuture<'_, ()> {
        self.pauses.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}

/// Keeps every appended page in memory.
#[derive(Default)]
pub struct MemorySink {
    pub pages: Vec<Vec<Record>>,
}

impl MemorySink {
    pub fn rows(&self) -> Vec<&Record> {
        self.pages.iter().flatten().collect()
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, records: &[Record]) -> Result<(), SinkError> {
        self.pages.push(records.to_vec());
        Ok(())
    }
}

pub struct FailingSink;

impl RecordSink for FailingSink {
    fn append(&mut self, _records: &[Record]) -> Result<(), SinkError> {
        Err(SinkError::Io(std::io::Error::other("disk full")))
    }
}

pub fn unique_path(name: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    env::temp_dir().join(format!(
        "obit-harvester-{name}-{}-{id}",
        std::process::id()
    ))
}

#[derive(Clone)]
pub struct MockOaiConfig {
    /// Body served for the token-less first request.
    pub first_page: String,
    /// Bodies keyed by resumption token.
    pub pages: HashMap<String, String>,
    /// Number of initial requests answered with 503.
    pub failures: usize,
}

pub struct MockOaiServer {
    pub endpoint: String,
    requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
    handle: JoinHandle<()>,
}

impl MockOaiServer {
    pub fn requests(&self) -> Vec<HashMap<String, String>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockOaiServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn start_mock_oai_server(config: MockOaiConfig) -> anyhow::Result<MockOaiServer> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let endpoint = format!("http://{}/s/obits/oai", address);
    let shared_config = Arc::new(config);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let requests_for_task = requests.clone();
    let served = Arc::new(AtomicUsize::new(0));

    let handle = tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(value) => value,
                Err(_) => break,
            };
            let config = shared_config.clone();
            let requests = requests_for_task.clone();
            let served = served.clone();
            tokio::spawn(async move {
                if let Err(error) =
                    handle_connection(&mut socket, &config, &requests, &served).await
                {
                    eprintln!("mock OAI server request handling failed: {}", error);
                }
            });
        }
    });

    Ok(MockOaiServer {
        endpoint,
        requests,
        handle,
    })
}

async fn handle_connection(
    socket: &mut TcpStream,
    config: &MockOaiConfig,
    requests: &Mutex<Vec<HashMap<String, String>>>,
    served: &AtomicUsize,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; 8192];
    let mut total = 0usize;

    loop {
        let bytes_read = socket.read(&mut buf[total..]).await?;
        if bytes_read == 0 {
            return Ok(());
        }
        total += bytes_read;
        if buf[..total].windows(4).any(|window| window == b"\r\n\r\n") {
            break;
        }
        if total == buf.len() {
            break;
        }
    }

    let request = String::from_utf8_lossy(&buf[..total]);
    let request_line = request.lines().next().unwrap_or_default();
    let path = request_line.split_whitespace().nth(1).unwrap_or("/");
    let params = parse_query_params(path);
    requests.lock().unwrap().push(params.clone());

    let response = if served.fetch_add(1, Ordering::SeqCst) < config.failures {
        let body = "Service Unavailable";
        format!(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    } else {
        let body = build_oai_response(config, &params);
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/xml; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    };

    socket.write_all(response.as_bytes()).await?;
    Ok(())
}

fn parse_query_params(path: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let query = path.split_once('?').map(|(_, query)| query).unwrap_or("");
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(key.to_string(), value.to_string());
    }
    params
}

fn build_oai_response(config: &MockOaiConfig, params: &HashMap<String, String>) -> String {
    if params.get("verb").map(String::as_str) != Some("ListRecords") {
        return error_response("badVerb", "Unknown or missing verb");
    }

    match (params.get("resumptionToken"), params.get("metadataPrefix")) {
        (Some(token), _) => match config.pages.get(token) {
            Some(body) => body.clone(),
            None => error_response("badResumptionToken", "Unknown resumption token"),
        },
        (None, Some(prefix)) if prefix == METADATA_PREFIX => config.first_page.clone(),
        (None, _) => error_response("cannotDisseminateFormat", "Unsupported metadata prefix"),
    }
}

fn error_response(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <responseDate>2024-01-01T00:00:00Z</responseDate>
  <request verb="ListRecords">https://example.org/oai</request>
  <error code="{code}">{message}</error>
</OAI-PMH>"#
    )
}
