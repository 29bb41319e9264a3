// Parquet persistence for the consolidated series and batch tables
use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::normalize::{BatchRecord, SeriesRecord};

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected table layout: {0}")]
    Schema(String),

    #[error("Unknown compression codec: {0}")]
    UnknownCompression(String),
}

/// Block compression used for the output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableCompression {
    #[default]
    Snappy,
    Zstd,
    Gzip,
    Uncompressed,
}

impl TableCompression {
    fn codec(self) -> Compression {
        match self {
            TableCompression::Snappy => Compression::SNAPPY,
            TableCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            TableCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            TableCompression::Uncompressed => Compression::UNCOMPRESSED,
        }
    }
}

impl FromStr for TableCompression {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snappy" => Ok(TableCompression::Snappy),
            "zstd" => Ok(TableCompression::Zstd),
            "gzip" => Ok(TableCompression::Gzip),
            "none" | "uncompressed" => Ok(TableCompression::Uncompressed),
            other => Err(OutputError::UnknownCompression(other.to_string())),
        }
    }
}

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}

pub fn series_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("source_tag", DataType::Utf8, false),
        Field::new("timestamp", timestamp_type(), false),
        Field::new("value", DataType::Float64, false),
        Field::new("rolling_mean_6", DataType::Float64, false),
        Field::new("group_tag", DataType::Utf8, true),
    ]))
}

pub fn batch_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("timestamp", timestamp_type(), false),
        Field::new("value", DataType::Float64, false),
        Field::new("batch_number", DataType::Int64, false),
        Field::new("source_tag", DataType::Utf8, false),
        Field::new("group_tag", DataType::Utf8, true),
    ]))
}

fn micros(ts: &NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}

fn from_micros(value: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(value).map(|dt| dt.naive_utc())
}

pub fn series_record_batch(records: &[SeriesRecord]) -> Result<RecordBatch, OutputError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.source_tag.as_str()),
        )),
        Arc::new(TimestampMicrosecondArray::from_iter_values(
            records.iter().map(|r| micros(&r.timestamp)),
        )),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.value))),
        Arc::new(Float64Array::from_iter_values(
            records.iter().map(|r| r.rolling_mean_6),
        )),
        Arc::new(StringArray::from(
            records
                .iter()
                .map(|r| r.group_tag.as_deref())
                .collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(series_schema(), columns)?)
}

pub fn batch_record_batch(records: &[BatchRecord]) -> Result<RecordBatch, OutputError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMicrosecondArray::from_iter_values(
            records.iter().map(|r| micros(&r.timestamp)),
        )),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.value))),
        Arc::new(Int64Array::from_iter_values(
            records.iter().map(|r| r.batch_number),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.source_tag.as_str()),
        )),
        Arc::new(StringArray::from(
            records
                .iter()
                .map(|r| r.group_tag.as_deref())
                .collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(batch_schema(), columns)?)
}

/// Write `batch` to `path` through a temporary file, returning the file size.
fn write_parquet(
    path: &Path,
    batch: &RecordBatch,
    compression: TableCompression,
) -> Result<u64, OutputError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path: PathBuf = path.with_file_name(tmp_name);

    let file = File::create(&tmp_path)?;
    let props = WriterProperties::builder()
        .set_compression(compression.codec())
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    if batch.num_rows() > 0 {
        writer.write(batch)?;
    }
    writer.close()?;

    let size = fs::metadata(&tmp_path)?.len();
    fs::rename(&tmp_path, path)?;
    debug!("Wrote {} rows ({} bytes) to {}", batch.num_rows(), size, path.display());
    Ok(size)
}

#[instrument(skip(records), fields(path = %path.as_ref().display(), rows = records.len()))]
pub fn write_series_table(
    path: impl AsRef<Path>,
    records: &[SeriesRecord],
    compression: TableCompression,
) -> Result<u64, OutputError> {
    let batch = series_record_batch(records)?;
    let size = write_parquet(path.as_ref(), &batch, compression)?;
    info!("Saved series table: {}", path.as_ref().display());
    Ok(size)
}

#[instrument(skip(records), fields(path = %path.as_ref().display(), rows = records.len()))]
pub fn write_batch_table(
    path: impl AsRef<Path>,
    records: &[BatchRecord],
    compression: TableCompression,
) -> Result<u64, OutputError> {
    let batch = batch_record_batch(records)?;
    let size = write_parquet(path.as_ref(), &batch, compression)?;
    info!("Saved batch table: {}", path.as_ref().display());
    Ok(size)
}

fn read_batches(path: &Path) -> Result<Vec<RecordBatch>, OutputError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, OutputError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| OutputError::Schema(format!("missing or mistyped column '{name}'")))
}

fn timestamp_at(array: &TimestampMicrosecondArray, row: usize) -> Result<NaiveDateTime, OutputError> {
    from_micros(array.value(row))
        .ok_or_else(|| OutputError::Schema(format!("timestamp out of range at row {row}")))
}

fn optional_text(array: &StringArray, row: usize) -> Option<String> {
    (!array.is_null(row)).then(|| array.value(row).to_string())
}

pub fn read_series_table(path: impl AsRef<Path>) -> Result<Vec<SeriesRecord>, OutputError> {
    let mut records = Vec::new();
    for batch in read_batches(path.as_ref())? {
        let source = column::<StringArray>(&batch, "source_tag")?;
        let timestamp = column::<TimestampMicrosecondArray>(&batch, "timestamp")?;
        let value = column::<Float64Array>(&batch, "value")?;
        let mean = column::<Float64Array>(&batch, "rolling_mean_6")?;
        let group = column::<StringArray>(&batch, "group_tag")?;

        for row in 0..batch.num_rows() {
            records.push(SeriesRecord {
                source_tag: source.value(row).to_string(),
                timestamp: timestamp_at(timestamp, row)?,
                value: value.value(row),
                rolling_mean_6: mean.value(row),
                group_tag: optional_text(group, row),
            });
        }
    }
    Ok(records)
}

pub fn read_batch_table(path: impl AsRef<Path>) -> Result<Vec<BatchRecord>, OutputError> {
    let mut records = Vec::new();
    for batch in read_batches(path.as_ref())? {
        let timestamp = column::<TimestampMicrosecondArray>(&batch, "timestamp")?;
        let value = column::<Float64Array>(&batch, "value")?;
        let batch_number = column::<Int64Array>(&batch, "batch_number")?;
        let source = column::<StringArray>(&batch, "source_tag")?;
        let group = column::<StringArray>(&batch, "group_tag")?;

        for row in 0..batch.num_rows() {
            records.push(BatchRecord {
                timestamp: timestamp_at(timestamp, row)?,
                value: value.value(row),
                batch_number: batch_number.value(row),
                source_tag: source.value(row).to_string(),
                group_tag: optional_text(group, row),
            });
        }
    }
    Ok(records)
}
