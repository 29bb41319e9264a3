// Replace-all upload of the consolidated tables to a PostgREST table store

pub mod serialize;

use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::output::{read_batch_table, read_series_table, OutputError};

pub use serialize::{batch_rows, series_rows};

pub const DEFAULT_CHUNK_SIZE: usize = 500;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} on table '{table}' failed with status {status}: {body}")]
    Status {
        table: String,
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Failed to read table: {0}")]
    Output(#[from] OutputError),

    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("Invalid UTC offset: {0} hours")]
    InvalidOffset(i32),

    #[error("Timestamp {0} cannot be placed in the plant timezone")]
    UnrepresentableTimestamp(NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub table: String,
    pub rows_sent: usize,
    pub chunks: usize,
}

/// Client for a PostgREST endpoint (`{base_url}/rest/v1/{table}`).
#[derive(Clone)]
pub struct RemoteTableStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RemoteTableStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self::with_client(Client::new(), base_url, api_key)
    }

    pub fn with_client(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(
        response: reqwest::Response,
        table: &str,
        operation: &'static str,
    ) -> Result<(), SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Status {
            table: table.to_string(),
            operation,
            status: status.as_u16(),
            body,
        })
    }

    /// Delete every row of `table` (every row has an id other than 0).
    #[instrument(skip(self))]
    pub async fn delete_all(&self, table: &str) -> Result<(), SyncError> {
        let response = self
            .authorized(self.client.delete(self.table_url(table)))
            .query(&[("id", "neq.0")])
            .send()
            .await?;
        Self::check(response, table, "delete").await?;
        debug!("Cleared table {}", table);
        Ok(())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn insert(&self, table: &str, rows: &[Value]) -> Result<(), SyncError> {
        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        Self::check(response, table, "insert").await
    }

    /// Replace the whole content of `table` with `rows`.
    ///
    /// Not transactional: a failed chunk leaves earlier chunks in place.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn replace_all(
        &self,
        table: &str,
        rows: &[Value],
        chunk_size: usize,
    ) -> Result<SyncReport, SyncError> {
        if chunk_size == 0 {
            return Err(SyncError::InvalidChunkSize);
        }

        info!("Clearing remote table {}", table);
        self.delete_all(table).await?;

        let pb = ProgressBar::new(rows.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message(table.to_string());

        let mut chunks = 0;
        for chunk in rows.chunks(chunk_size) {
            self.insert(table, chunk).await?;
            chunks += 1;
            pb.inc(chunk.len() as u64);
        }
        pb.finish_and_clear();

        info!("Uploaded {} rows to {} in {} chunks", rows.len(), table, chunks);
        Ok(SyncReport {
            table: table.to_string(),
            rows_sent: rows.len(),
            chunks,
        })
    }

    pub async fn upload_series_file(
        &self,
        path: &Path,
        table: &str,
        chunk_size: usize,
    ) -> Result<SyncReport, SyncError> {
        let records = read_series_table(path)?;
        info!("Loaded {} series rows from {}", records.len(), path.display());
        let rows = series_rows(&records)?;
        self.replace_all(table, &rows, chunk_size).await
    }

    pub async fn upload_batch_file(
        &self,
        path: &Path,
        table: &str,
        chunk_size: usize,
    ) -> Result<SyncReport, SyncError> {
        let records = read_batch_table(path)?;
        info!("Loaded {} batch rows from {}", records.len(), path.display());
        let rows = batch_rows(&records)?;
        self.replace_all(table, &rows, chunk_size).await
    }
}
