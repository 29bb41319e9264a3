use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::output::{OutputError, TableCompression};
use crate::sync::DEFAULT_CHUNK_SIZE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error(transparent)]
    Compression(#[from] OutputError),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// URL or local path of the plant workbook.
    pub spreadsheet_source: Option<String>,
    pub series_output_path: PathBuf,
    pub batch_output_path: PathBuf,
    pub spec_catalog_path: Option<PathBuf>,
    pub compression: TableCompression,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub series_table: Option<String>,
    pub batch_table: Option<String>,
    pub upload_chunk_size: usize,
    pub log_dir: PathBuf,
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let upload_chunk_size = match optional("UPLOAD_CHUNK_SIZE") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "UPLOAD_CHUNK_SIZE",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_CHUNK_SIZE,
        };

        Ok(Config {
            spreadsheet_source: optional("SPREADSHEET_SOURCE"),
            series_output_path: optional("SERIES_OUTPUT_PATH")
                .unwrap_or_else(|| "consolidado.parquet".to_string())
                .into(),
            batch_output_path: optional("BATCH_OUTPUT_PATH")
                .unwrap_or_else(|| "consolidado_batelada.parquet".to_string())
                .into(),
            spec_catalog_path: optional("SPEC_CATALOG_PATH").map(PathBuf::from),
            compression: optional("PARQUET_COMPRESSION")
                .map(|c| c.parse())
                .transpose()?
                .unwrap_or_default(),
            supabase_url: optional("SUPABASE_URL"),
            supabase_key: optional("SUPABASE_KEY"),
            series_table: optional("SUPABASE_SERIES_TABLE"),
            batch_table: optional("SUPABASE_BATCH_TABLE"),
            upload_chunk_size,
            log_dir: optional("LOG_DIR")
                .unwrap_or_else(|| "logs".to_string())
                .into(),
        })
    }

    pub fn require_source(&self) -> Result<&str, ConfigError> {
        self.spreadsheet_source
            .as_deref()
            .ok_or(ConfigError::Missing("SPREADSHEET_SOURCE"))
    }

    /// Base URL and key of the remote table store.
    pub fn require_remote(&self) -> Result<(&str, &str), ConfigError> {
        let url = self
            .supabase_url
            .as_deref()
            .ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        let key = self
            .supabase_key
            .as_deref()
            .ok_or(ConfigError::Missing("SUPABASE_KEY"))?;
        Ok((url, key))
    }
}
