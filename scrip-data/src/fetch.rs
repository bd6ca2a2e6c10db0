use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::Client;
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const SAMPLE_ROWS: usize = 5;

/// Where a listing is read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceLocation {
    Url(String),
    Path(PathBuf),
}

impl SourceLocation {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("source location must not be empty"));
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(Self::Url(trimmed.to_string()))
        } else {
            Ok(Self::Path(PathBuf::from(trimmed)))
        }
    }

    fn looks_gzipped(&self) -> bool {
        let name = match self {
            Self::Url(url) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
            Self::Path(path) => path.to_string_lossy().into_owned(),
        };
        name.to_ascii_lowercase().ends_with(".gz")
    }
}

impl FromStr for SourceLocation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Retrieves the raw (decompressed) bytes of a listing.
#[async_trait]
pub trait ListingFetcher: Send + Sync {
    async fn fetch(&self, location: &SourceLocation) -> Result<Vec<u8>>;
}

/// Fetcher backed by `reqwest` for URLs and `tokio::fs` for local files.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "{url} responded with status {status}: {}",
                truncate(&body, 256)
            ));
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body from {url}"))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ListingFetcher for HttpFetcher {
    async fn fetch(&self, location: &SourceLocation) -> Result<Vec<u8>> {
        let payload = match location {
            SourceLocation::Url(url) => self.download(url).await?,
            SourceLocation::Path(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?,
        };
        let compressed_len = payload.len();
        let decoded = decode_payload(location, payload)?;
        info!(
            location = %location,
            bytes = decoded.len(),
            compressed = compressed_len,
            "fetched listing"
        );
        Ok(decoded)
    }
}

/// Inflate gzip payloads; plain payloads pass through unchanged.
///
/// Detection is by magic bytes. A `.gz` name without the magic is treated as
/// plain text because the HTTP layer may already have removed the encoding.
pub fn decode_payload(location: &SourceLocation, payload: Vec<u8>) -> Result<Vec<u8>> {
    if payload.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(payload.as_slice());
        let mut out = Vec::with_capacity(payload.len() * 4);
        decoder
            .read_to_end(&mut out)
            .with_context(|| format!("failed to inflate gzip payload from {location}"))?;
        return Ok(out);
    }
    if location.looks_gzipped() {
        debug!(location = %location, "payload named .gz has no gzip header, reading as plain text");
    }
    Ok(payload)
}

/// Files written by [`write_snapshot`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub raw: PathBuf,
    pub sample: PathBuf,
}

/// Persist the decompressed listing and a short head sample for auditing.
pub fn write_snapshot(raw_dir: &Path, label: &str, payload: &[u8]) -> Result<SnapshotPaths> {
    fs::create_dir_all(raw_dir)
        .with_context(|| format!("failed to create {}", raw_dir.display()))?;
    let raw = raw_dir.join(format!("{label}_raw.csv"));
    let sample = raw_dir.join(format!("{label}_sample.csv"));
    fs::write(&raw, payload).with_context(|| format!("failed to write {}", raw.display()))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(payload);
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(&sample)
        .with_context(|| format!("failed to create {}", sample.display()))?;
    writer.write_record(reader.headers()?)?;
    for record in reader.records().take(SAMPLE_ROWS) {
        writer.write_record(&record?)?;
    }
    writer.flush()?;
    info!(source = %label, raw = %raw.display(), sample = %sample.display(), "saved raw snapshot");
    Ok(SnapshotPaths { raw, sample })
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
