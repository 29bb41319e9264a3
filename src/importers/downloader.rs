use reqwest::Client;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Failed to download {url} (status {status})")]
    Status { url: String, status: u16 },
}

/// Where the plant workbook comes from once it has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpreadsheetSource {
    /// Bytes fetched over HTTP(S).
    Remote { url: String, bytes: Vec<u8> },
    /// A local path, passed through untouched.
    Local(PathBuf),
}

impl SpreadsheetSource {
    /// Human-readable origin for logs.
    pub fn describe(&self) -> String {
        match self {
            SpreadsheetSource::Remote { url, bytes } => format!("{url} ({} bytes)", bytes.len()),
            SpreadsheetSource::Local(path) => path.display().to_string(),
        }
    }

    /// Load the workbook bytes, reading the file for local sources.
    pub fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            SpreadsheetSource::Remote { bytes, .. } => Ok(bytes),
            SpreadsheetSource::Local(path) => fs::read(path),
        }
    }
}

/// True for `http://` and `https://` references, scheme matched case-insensitively.
pub fn is_remote_reference(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolves a spreadsheet reference (URL or local path) into a [`SpreadsheetSource`].
///
/// No retries and no timeout: a failed download is fatal to the run.
#[derive(Clone, Default)]
pub struct SourceFetcher {
    client: Client,
}

impl SourceFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, reference: &str) -> Result<SpreadsheetSource, DownloadError> {
        if !is_remote_reference(reference) {
            debug!("Using local spreadsheet {}", reference);
            return Ok(SpreadsheetSource::Local(Path::new(reference).to_path_buf()));
        }

        info!("Downloading spreadsheet from {}", reference);
        let url = reference.trim().to_string();
        let bytes = self.download_file(&url).await?;
        Ok(SpreadsheetSource::Remote { url, bytes })
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
